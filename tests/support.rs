#![allow(dead_code)]

use std::io::{self, Cursor};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use streamrpc::{Args, Cancellation, PipeNet, Registry, Server, Service, StrError, Value};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

async fn add(args: Args) -> Result<Vec<Value>, StrError> {
    let (a, b): (i64, i64) = args.parse()?;
    Ok(vec![Value::Int(a + b)])
}

async fn div(args: Args) -> Result<Vec<Value>, StrError> {
    let (a, b): (i64, i64) = args.parse()?;
    if b == 0 {
        return Err(StrError::new("division by zero"));
    }
    Ok(vec![Value::Int(a / b), Value::Error(StrError::nil())])
}

async fn fail(_args: Args) -> Result<Vec<Value>, StrError> {
    Err(StrError::new("boom"))
}

async fn slow(_args: Args) -> Result<Vec<Value>, StrError> {
    tokio::time::sleep(Duration::from_secs(30)).await;
    Ok(vec![])
}

async fn get(_args: Args) -> Result<Cursor<Vec<u8>>, StrError> {
    Ok(Cursor::new(b"hello".to_vec()))
}

async fn missing(args: Args) -> Result<Cursor<Vec<u8>>, StrError> {
    let name: String = args.get(0)?;
    Err(StrError::new(format!("no such file {name}")))
}

/// Sink that hands everything written to it to a channel once shut down.
pub struct Capture {
    buf: Vec<u8>,
    done: Option<mpsc::UnboundedSender<Vec<u8>>>,
}

impl AsyncWrite for Capture {
    fn poll_write(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.buf.extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        if let Some(done) = self.done.take() {
            let data = std::mem::take(&mut self.buf);
            let _ = done.send(data);
        }
        Poll::Ready(Ok(()))
    }
}

async fn put(_args: Args, done: mpsc::UnboundedSender<Vec<u8>>) -> Result<Capture, StrError> {
    Ok(Capture { buf: Vec::new(), done: Some(done) })
}

/// The `Demo` service used throughout the tests.
pub fn demo_registry(written: mpsc::UnboundedSender<Vec<u8>>) -> Registry {
    let service = Service::new()
        .normal("Add", add)
        .normal("Div", div)
        .normal("Fail", fail)
        .normal("Slow", slow)
        .read("Get", get)
        .read("Missing", missing)
        .write("Put", move |args| put(args, written.clone()));

    let mut builder = Registry::builder();
    builder.register("Demo", service).expect("register Demo");
    builder.build()
}

/// A server accepting on an in-process net.
pub struct Fixture {
    pub net: PipeNet,
    pub server: Arc<Server>,
    pub cancel: Cancellation,
    pub written: mpsc::UnboundedReceiver<Vec<u8>>,
    pub accept_loop: JoinHandle<io::Result<()>>,
}

impl Fixture {
    pub async fn start() -> Fixture {
        Self::start_with(Server::new).await
    }

    pub async fn start_with(configure: impl FnOnce(Registry) -> Server) -> Fixture {
        init_tracing();
        let (written_tx, written) = mpsc::unbounded_channel();
        let server = Arc::new(configure(demo_registry(written_tx)));
        let net = PipeNet::new();
        let cancel = Cancellation::new();

        let accept_loop = {
            let server = server.clone();
            let net = net.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { server.accept(&net, &cancel).await })
        };

        Fixture { net, server, cancel, written, accept_loop }
    }

    /// Waits until every connection endpoint created by the net is dropped.
    pub async fn wait_idle(&self) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.net.open_connections() != 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("connections still open");
    }
}
