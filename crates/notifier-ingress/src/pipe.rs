use std::fs::File;
use std::io::ErrorKind;
use std::io::Read;
use std::os::unix::fs::OpenOptionsExt;
use std::sync::Arc;
use std::time::Duration;

use nix::sys::stat::Mode;
use nix::unistd::mkfifo;
use notifier_config::PipeInputConfig;
use notifier_runtime::RuntimeContext;
use tokio::io::Interest;
use tokio::io::unix::AsyncFd;

use crate::enqueue;
use crate::fatal;

/// Read cap per readiness wakeup, matching the source's fixed-size buffer.
const READ_CAP: usize = 1024 * 1024;
const POLL_TIMEOUT: Duration = Duration::from_millis(100);

pub(crate) async fn run(ctx: Arc<RuntimeContext>, cfg: PipeInputConfig) {
    let _guard = ctx.ingress_wg.add();
    tracing::info!(path = %cfg.path, "starting pipe input");

    if let Err(err) = ensure_fifo(&cfg.path) {
        fatal(format!("error creating fifo {}: {err}", cfg.path));
    }

    let mut stop_rx = ctx.stop.subscribe();

    'reopen: while !ctx.stop.is_stopping() {
        let file = match open_nonblocking(&cfg.path) {
            Ok(file) => file,
            Err(err) => fatal(format!("error opening fifo {}: {err}", cfg.path)),
        };
        let async_fd = match AsyncFd::with_interest(file, Interest::READABLE) {
            Ok(fd) => fd,
            Err(err) => fatal(format!("error registering fifo {}: {err}", cfg.path)),
        };

        loop {
            tokio::select! {
                biased;
                _ = stop_rx.recv() => break 'reopen,
                ready = tokio::time::timeout(POLL_TIMEOUT, async_fd.readable()) => {
                    // A readiness-wait timeout just loops back to recheck
                    // the stop-broadcast; it is not an error.
                    let Ok(ready) = ready else { continue };
                    let mut guard = match ready {
                        Ok(guard) => guard,
                        Err(err) => fatal(format!("error polling fifo {}: {err}", cfg.path)),
                    };

                    let mut buf = vec![0u8; READ_CAP];
                    match guard.try_io(|inner| inner.get_ref().read(&mut buf)) {
                        Ok(Ok(0)) => continue 'reopen,
                        Ok(Ok(n)) => enqueue(&ctx.tx, &buf[..n]).await,
                        Ok(Err(err)) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted) => {}
                        Ok(Err(err)) => fatal(format!("error reading fifo {}: {err}", cfg.path)),
                        Err(_would_block) => {}
                    }
                }
            }
        }
    }

    tracing::info!(path = %cfg.path, "stopping pipe input");
}

fn ensure_fifo(path: &str) -> std::io::Result<()> {
    match mkfifo(path, Mode::from_bits_truncate(0o666)) {
        Ok(()) | Err(nix::errno::Errno::EEXIST) => Ok(()),
        Err(err) => Err(err.into()),
    }
}

fn open_nonblocking(path: &str) -> std::io::Result<File> {
    std::fs::OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_NONBLOCK | libc::O_CLOEXEC)
        .open(path)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use std::os::unix::fs::FileTypeExt;

    use super::*;

    #[test]
    fn ensure_fifo_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.fifo");
        let path = path.to_string_lossy().into_owned();
        ensure_fifo(&path).unwrap();
        ensure_fifo(&path).unwrap();
        assert!(std::fs::metadata(&path).unwrap().file_type().is_fifo());
    }
}
