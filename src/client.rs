//! The client side of the protocol.
//!
//! A [`Client`] performs one handshake when it is created to learn which
//! methods the server exposes and with which class. Every call afterwards
//! dials a new connection, sends the call envelope and then follows the
//! class-specific exchange the server will run for that method. There is no
//! multiplexing: concurrent calls from one client each hold their own
//! connection.

use std::future::Future;

use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::{Error, Result};
use crate::protocol::rpc::{Cancellation, Coder};
use crate::protocol::xdr::rpc::{CallEnvelope, CapabilityMap, RpcClass, Tag};
use crate::protocol::xdr::value::Value;
use crate::transport::{Connection, Dialer};

/// Runs `fut` unless `cancel` fires first. Dropping `fut` drops, and so
/// closes, any connection it holds.
async fn cancellable<T>(cancel: &Cancellation, fut: impl Future<Output = Result<T>>) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        res = fut => res,
    }
}

/// A connection-per-call RPC client.
pub struct Client<D> {
    /// Opens one connection per call
    dialer: D,
    /// Coder used for the envelope and normal replies
    coder: Coder,
    /// Snapshot of the server's methods taken at construction
    capabilities: CapabilityMap,
}

impl<D: Dialer> Client<D> {
    /// Connects through `dialer` and performs the handshake.
    pub async fn new(dialer: D) -> Result<Self> {
        Self::with_coder(dialer, Coder::default()).await
    }

    /// Like [`Client::new`], with a coder using custom limits.
    pub async fn with_coder(dialer: D, coder: Coder) -> Result<Self> {
        let capabilities = Self::handshake(&dialer, &coder).await?;
        debug!("Handshake complete, {} methods", capabilities.len());
        Ok(Self { dialer, coder, capabilities })
    }

    async fn handshake(dialer: &D, coder: &Coder) -> Result<CapabilityMap> {
        let mut conn = dialer.dial().await?;
        coder.write_tag(&mut conn, Tag::Handshake).await?;
        let capabilities = coder.decode(&mut conn).await?;
        Ok(capabilities)
    }

    /// Sets the largest normal reply this client accepts.
    pub fn with_max_record_length(mut self, length: usize) -> Self {
        self.coder = Coder::new(length);
        self
    }

    /// The server's methods as learned during the handshake.
    pub fn capabilities(&self) -> &CapabilityMap {
        &self.capabilities
    }

    /// Class of `method`, or `None` if the server did not advertise it.
    pub fn class_of(&self, method: &str) -> Option<RpcClass> {
        self.capabilities.get(method).copied()
    }

    fn expect_class(&self, method: &str, expected: RpcClass) -> Result<()> {
        match self.class_of(method) {
            None => Err(Error::MethodNotFound(method.to_string())),
            Some(actual) if actual != expected => {
                Err(Error::WrongRpcClass { method: method.to_string(), expected, actual })
            }
            Some(_) => Ok(()),
        }
    }

    /// Dials and sends the call envelope.
    async fn open(&self, method: &str, inputs: &[Value]) -> Result<Connection> {
        let mut conn = self.dialer.dial().await?;
        let envelope = CallEnvelope::new(method, inputs.to_vec());
        self.coder.write_call(&mut conn, &envelope).await?;
        Ok(conn)
    }

    /// Calls a [`RpcClass::Normal`] method and returns every value it
    /// produced, without interpreting them.
    pub async fn call_values(
        &self,
        cancel: &Cancellation,
        method: &str,
        inputs: &[Value],
    ) -> Result<Vec<Value>> {
        self.expect_class(method, RpcClass::Normal)?;
        cancellable(cancel, async {
            let mut conn = self.open(method, inputs).await?;
            let returns: Vec<Value> = self.coder.decode(&mut conn).await?;
            Ok(returns)
        })
        .await
    }

    /// Calls a [`RpcClass::Normal`] method.
    ///
    /// `inputs` are sent as the positional arguments. The returned values
    /// are written, in order, into `outputs`, whose length must match the
    /// number of values the method returns. A non-nil [`Value::Error`] as
    /// the last returned value is reported as [`Error::Application`]. On any
    /// error `outputs` is left untouched.
    pub async fn call(
        &self,
        cancel: &Cancellation,
        method: &str,
        inputs: &[Value],
        outputs: &mut [Value],
    ) -> Result<()> {
        let returns = self.call_values(cancel, method, inputs).await?;

        if let Some(Value::Error(e)) = returns.last() {
            if !e.is_nil() {
                return Err(Error::Application(e.clone()));
            }
        }
        if returns.len() != outputs.len() {
            return Err(Error::ArityMismatch {
                method: method.to_string(),
                expected: outputs.len(),
                actual: returns.len(),
            });
        }

        for (slot, value) in outputs.iter_mut().zip(returns) {
            *slot = value;
        }
        Ok(())
    }

    /// Calls a [`RpcClass::ReadStream`] method.
    ///
    /// Returns the open connection with its write half already shut down;
    /// reading it yields the bytes the method's source produces, until EOF.
    /// The caller owns the connection and closes it by dropping it.
    pub async fn call_read(
        &self,
        cancel: &Cancellation,
        method: &str,
        inputs: &[Value],
    ) -> Result<Connection> {
        self.expect_class(method, RpcClass::ReadStream)?;
        cancellable(cancel, async {
            let mut conn = self.open(method, inputs).await?;
            conn.shutdown().await?;
            Ok(conn)
        })
        .await
    }

    /// Calls a [`RpcClass::WriteStream`] method.
    ///
    /// Returns the open connection; bytes written to it are copied into the
    /// method's sink. The caller must `shutdown()` or drop the connection to
    /// signal the end of the data, which makes the server close the sink.
    pub async fn call_write(
        &self,
        cancel: &Cancellation,
        method: &str,
        inputs: &[Value],
    ) -> Result<Connection> {
        self.expect_class(method, RpcClass::WriteStream)?;
        cancellable(cancel, self.open(method, inputs)).await
    }

    /// Releases the client. Calls hold no shared connection, so there is
    /// nothing to flush.
    pub fn close(self) {
        debug!("Client closed");
    }
}
