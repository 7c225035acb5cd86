//! Serves the files of one directory over streamrpc.
//!
//! Exposes a `Files` service:
//! - `Files.List()` returns the names of the regular files
//! - `Files.Stat(name)` returns a struct with `name`, `size` and `modified`
//! - `Files.Open(name)` streams the file contents to the client
//! - `Files.Create(name)` truncates the file and stores the client's bytes
//! - `Files.Mkdir(name)` creates a directory
//! - `Files.Remove(name)` removes a file or an empty directory

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use streamrpc::{Args, Cancellation, Registry, Server, Service, StrError, Value};

const HOSTPORT: u32 = 11112;

/// Resolves `name` inside `root`, refusing anything but a plain file name.
fn resolve(root: &Path, args: &Args) -> Result<PathBuf, StrError> {
    let name: String = args.get(0)?;
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(StrError::new(format!("invalid file name {name:?}")));
    }
    Ok(root.join(name))
}

async fn list(root: Arc<PathBuf>, _args: Args) -> Result<Vec<Value>, StrError> {
    let mut entries = tokio::fs::read_dir(root.as_path()).await?;
    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            names.push(Value::from(entry.file_name().to_string_lossy().into_owned()));
        }
    }
    Ok(vec![Value::List(names)])
}

async fn stat(root: Arc<PathBuf>, args: Args) -> Result<Vec<Value>, StrError> {
    let path = resolve(&root, &args)?;
    let metadata = tokio::fs::metadata(&path).await?;
    let modified = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs());

    Ok(vec![Value::record([
        ("name", Value::from(args.get::<String>(0)?)),
        ("size", Value::from(metadata.len())),
        ("modified", Value::from(modified)),
    ])])
}

async fn open(root: Arc<PathBuf>, args: Args) -> Result<tokio::fs::File, StrError> {
    let path = resolve(&root, &args)?;
    Ok(tokio::fs::File::open(path).await?)
}

async fn create(root: Arc<PathBuf>, args: Args) -> Result<tokio::fs::File, StrError> {
    let path = resolve(&root, &args)?;
    Ok(tokio::fs::File::create(path).await?)
}

async fn mkdir(root: Arc<PathBuf>, args: Args) -> Result<Vec<Value>, StrError> {
    let path = resolve(&root, &args)?;
    tokio::fs::create_dir(path).await?;
    Ok(vec![])
}

async fn remove(root: Arc<PathBuf>, args: Args) -> Result<Vec<Value>, StrError> {
    let path = resolve(&root, &args)?;
    if tokio::fs::symlink_metadata(&path).await?.is_dir() {
        tokio::fs::remove_dir(path).await?;
    } else {
        tokio::fs::remove_file(path).await?;
    }
    Ok(vec![])
}

fn files_service(root: PathBuf) -> Service {
    let root = Arc::new(root);
    let (r1, r2, r3, r4) = (root.clone(), root.clone(), root.clone(), root.clone());
    let (r5, r6) = (root.clone(), root);
    Service::new()
        .normal("List", move |args| list(r1.clone(), args))
        .normal("Stat", move |args| stat(r2.clone(), args))
        .read("Open", move |args| open(r3.clone(), args))
        .write("Create", move |args| create(r4.clone(), args))
        .normal("Mkdir", move |args| mkdir(r5.clone(), args))
        .normal("Remove", move |args| remove(r6.clone(), args))
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_writer(std::io::stderr)
        .init();

    let mut path: Option<PathBuf> = None;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--help" | "-h" => {
                eprintln!(
                    "Usage: file_server <DIRECTORY>\n\
                     \n\
                     Serves DIRECTORY on 127.0.0.1:{HOSTPORT} as the Files service."
                );
                return;
            }
            _ if arg.starts_with('-') => {
                eprintln!("Unknown flag: {arg}");
                eprintln!("Run with --help for usage.");
                std::process::exit(2);
            }
            _ => {
                if path.is_some() {
                    eprintln!("Unexpected extra argument: {arg}");
                    std::process::exit(2);
                }
                path = Some(PathBuf::from(arg));
            }
        }
    }

    let Some(path) = path else {
        eprintln!("must supply directory to serve");
        std::process::exit(2);
    };

    let mut builder = Registry::builder();
    if let Err(e) = builder.register("Files", files_service(path)) {
        eprintln!("{e}");
        std::process::exit(1);
    }
    let server = Server::new(builder.build());

    let cancel = Cancellation::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancel();
        }
    });

    if let Err(e) = server.listen(&format!("127.0.0.1:{HOSTPORT}"), &cancel).await {
        eprintln!("server failed: {e}");
        std::process::exit(1);
    }
}
