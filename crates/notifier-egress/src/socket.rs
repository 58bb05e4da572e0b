use std::time::Duration;

use notifier_config::SocketOutputConfig;
use notifier_proto::MessageContext;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::net::UnixStream;

#[derive(Debug, thiserror::Error)]
pub(crate) enum SocketError {
    #[error("unsupported socket output type \"{0}\"")]
    UnsupportedKind(String),
    #[error("dial timed out")]
    DialTimeout,
    #[error("write timed out")]
    WriteTimeout,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub(crate) async fn send(
    msg: &MessageContext,
    cfg: &SocketOutputConfig,
    timeout: Duration,
) -> Result<(), SocketError> {
    let kind = notifier_tags::expand(msg, &cfg.kind, &cfg.tags.kind);
    let address = notifier_tags::expand(msg, &cfg.address, &cfg.tags.address);
    let message = notifier_tags::expand(msg, &cfg.message, &cfg.tags.message);

    match kind.as_str() {
        "tcp" => {
            let mut stream = tokio::time::timeout(timeout, TcpStream::connect(&address))
                .await
                .map_err(|_| SocketError::DialTimeout)??;
            write_and_close(&mut stream, &message, timeout).await
        }
        "unix" => {
            let mut stream = tokio::time::timeout(timeout, UnixStream::connect(&address))
                .await
                .map_err(|_| SocketError::DialTimeout)??;
            write_and_close(&mut stream, &message, timeout).await
        }
        other => Err(SocketError::UnsupportedKind(other.to_string())),
    }
}

async fn write_and_close<S>(stream: &mut S, message: &str, timeout: Duration) -> Result<(), SocketError>
where
    S: AsyncWriteExt + Unpin,
{
    tokio::time::timeout(timeout, stream.write_all(message.as_bytes()))
        .await
        .map_err(|_| SocketError::WriteTimeout)??;
    Ok(())
}
