//! Server side handling of a single connection.
//!
//! A connection carries exactly one exchange:
//!
//! 1. The tag byte selects handshake or call handling.
//! 2. A handshake is answered with the capability map.
//! 3. A call is resolved against the registry, its arguments decoded and the
//!    handler invoked.
//! 4. The response follows the method's class: one encoded list of return
//!    values, a proxied read stream, or a proxied write stream.
//!
//! The connection is closed on every exit path, including errors, by
//! dropping it when the handler returns.

use anyhow::anyhow;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, trace, warn};

use crate::protocol::rpc::registry::{Args, Handler};
use crate::protocol::rpc::Context;
use crate::protocol::xdr::rpc::Tag;
use crate::protocol::xdr::value::Value;

/// Processes one accepted connection until its exchange is complete.
///
/// Protocol violations (unknown tag, unknown method, malformed envelope)
/// end the connection with an error and no reply.
pub async fn handle_connection<S>(mut conn: S, context: Context) -> Result<(), anyhow::Error>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let tag = match context.coder.read_tag(&mut conn).await {
        Ok(tag) => tag,
        Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
            warn!("Protocol violation from {}: {}", context.client_addr, e);
            return Err(e.into());
        }
        Err(e) => return Err(e.into()),
    };

    match tag {
        Tag::Handshake => handshake(&mut conn, &context).await,
        Tag::Call => call(&mut conn, &context).await,
    }
}

async fn handshake<S>(conn: &mut S, context: &Context) -> Result<(), anyhow::Error>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let capabilities = context.registry.capabilities();
    debug!("Handshake from {}, {} methods", context.client_addr, capabilities.len());
    context.coder.encode(conn, &capabilities).await?;
    conn.shutdown().await?;
    Ok(())
}

async fn call<S>(conn: &mut S, context: &Context) -> Result<(), anyhow::Error>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let method: String = context.coder.decode(conn).await?;
    let Some(descriptor) = context.registry.get(&method) else {
        warn!("Method {} not recognized, from {}", method, context.client_addr);
        return Err(anyhow!("method not found: {method}"));
    };
    let args: Vec<Value> = context.coder.decode(conn).await?;
    debug!(
        "Call {} ({}) with {} args from {}",
        method,
        descriptor.class(),
        args.len(),
        context.client_addr
    );

    match descriptor.handler() {
        Handler::Normal(f) => {
            let returns = match f(Args::new(args)).await {
                Ok(values) => values,
                Err(e) => {
                    debug!("Method {} failed: {}", method, e);
                    vec![Value::Error(e)]
                }
            };
            context.coder.encode(conn, returns.as_slice()).await?;
            conn.shutdown().await?;
        }
        Handler::Read(f) => match f(Args::new(args)).await {
            Ok(source) => {
                let mut source = BufReader::with_capacity(context.copy_buffer_size, source);
                let copied = tokio::io::copy_buf(&mut source, conn).await?;
                trace!("Streamed {} bytes from {}", copied, method);
                conn.shutdown().await?;
            }
            Err(e) => {
                // No status travels ahead of the stream bytes, so the client
                // only sees an empty stream.
                warn!("Read stream {} failed: {}", method, e);
                conn.shutdown().await?;
            }
        },
        Handler::Write(f) => match f(Args::new(args)).await {
            Ok(mut sink) => {
                let mut source = BufReader::with_capacity(context.copy_buffer_size, &mut *conn);
                let copied = tokio::io::copy_buf(&mut source, &mut sink).await;
                let closed = sink.shutdown().await;
                let copied = copied?;
                closed?;
                trace!("Streamed {} bytes into {}", copied, method);
            }
            Err(e) => {
                warn!("Write stream {} failed: {}", method, e);
            }
        },
    }

    Ok(())
}
