use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use notifier_config::SocketInputConfig;
use notifier_runtime::RuntimeContext;
use socket2::Domain;
use socket2::Protocol;
use socket2::Socket;
use socket2::Type;
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;
use tokio::net::UnixListener;

use crate::enqueue;
use crate::fatal;

enum Listener {
    Tcp(TcpListener),
    Unix(UnixListener),
}

enum Stream {
    Tcp(tokio::net::TcpStream),
    Unix(tokio::net::UnixStream),
}

pub(crate) async fn run(ctx: Arc<RuntimeContext>, cfg: SocketInputConfig) {
    let _guard = ctx.ingress_wg.add();
    tracing::info!(kind = %cfg.kind, address = %cfg.address, "starting socket input");

    if cfg.kind == "udp" {
        fatal("udp sockets are not supported");
    }
    if cfg.kind != "tcp" && cfg.kind != "unix" {
        fatal(format!("unsupported socket input type \"{}\"", cfg.kind));
    }

    let timeout = cfg
        .timeout
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis)
        .unwrap_or(ctx.input_timeout);

    if cfg.kind == "unix" {
        let _ = std::fs::remove_file(&cfg.address);
    }

    let listener = match bind(&cfg, timeout) {
        Ok(listener) => listener,
        Err(err) => fatal(format!(
            "error listening on socket {}: {err}",
            cfg.address
        )),
    };

    let mut stop_rx = ctx.stop.subscribe();
    loop {
        tokio::select! {
            biased;
            _ = stop_rx.recv() => break,
            accepted = accept(&listener) => {
                match accepted {
                    Ok(stream) => {
                        let tx = ctx.tx.clone();
                        tokio::spawn(handle_connection(stream, timeout, tx));
                    }
                    Err(err) => {
                        tracing::warn!(address = %cfg.address, error = %err, "error accepting connection");
                    }
                }
            }
        }
    }

    if cfg.kind == "unix" {
        let _ = std::fs::remove_file(&cfg.address);
    }
    tracing::info!(kind = %cfg.kind, address = %cfg.address, "stopping socket input");
}

fn bind(cfg: &SocketInputConfig, timeout: Duration) -> std::io::Result<Listener> {
    if cfg.kind == "unix" {
        let socket = Socket::new(Domain::UNIX, Type::STREAM, None)?;
        socket.set_reuse_port(true)?;
        socket.set_read_timeout(Some(timeout))?;
        socket.bind(&socket2::SockAddr::unix(&cfg.address)?)?;
        socket.listen(1024)?;
        socket.set_nonblocking(true)?;
        let std_listener: std::os::unix::net::UnixListener = socket.into();
        return Ok(Listener::Unix(UnixListener::from_std(std_listener)?));
    }

    let addr: SocketAddr = cfg
        .address
        .parse()
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidInput, err))?;
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_port(true)?;
    socket.set_read_timeout(Some(timeout))?;
    socket.bind(&addr.into())?;
    socket.listen(1024)?;
    socket.set_nonblocking(true)?;
    let std_listener: std::net::TcpListener = socket.into();
    Ok(Listener::Tcp(TcpListener::from_std(std_listener)?))
}

async fn accept(listener: &Listener) -> std::io::Result<Stream> {
    match listener {
        Listener::Tcp(l) => l.accept().await.map(|(s, _)| Stream::Tcp(s)),
        Listener::Unix(l) => l.accept().await.map(|(s, _)| Stream::Unix(s)),
    }
}

async fn handle_connection(
    stream: Stream,
    timeout: Duration,
    tx: tokio::sync::mpsc::Sender<String>,
) {
    let read = read_to_end(stream);
    match tokio::time::timeout(timeout, read).await {
        Ok(Ok(bytes)) => enqueue(&tx, bytes).await,
        Ok(Err(err)) => tracing::warn!(error = %err, "error reading from connection"),
        Err(_) => tracing::warn!("connection read deadline exceeded"),
    }
}

async fn read_to_end(stream: Stream) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    match stream {
        Stream::Tcp(mut s) => {
            s.read_to_end(&mut buf).await?;
        }
        Stream::Unix(mut s) => {
            s.read_to_end(&mut buf).await?;
        }
    }
    Ok(buf)
}
