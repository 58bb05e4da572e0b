//! One task per configured ingress source, all feeding the same bounded
//! message channel on [`notifier_runtime::RuntimeContext`]. Each driver
//! registers with the context's ingress wait-group for the duration of
//! its run and observes the stop-broadcast to exit promptly.

mod folder;
mod http;
mod pipe;
mod socket;

use std::sync::Arc;

use notifier_runtime::RuntimeContext;
use tokio::sync::mpsc;

/// Launches one task per configured source. Does not wait for them: the
/// supervisor observes their collective lifecycle through
/// `ctx.ingress_wg` and the stop-broadcast, matching the fire-and-forget
/// `go inputX(...)` shape this is ported from.
pub fn start_inputs(ctx: Arc<RuntimeContext>) {
    for cfg in ctx.config.inputs.sockets.clone() {
        let ctx = Arc::clone(&ctx);
        tokio::spawn(async move { socket::run(ctx, cfg).await });
    }
    for cfg in ctx.config.inputs.folders.clone() {
        let ctx = Arc::clone(&ctx);
        tokio::spawn(async move { folder::run(ctx, cfg).await });
    }
    for cfg in ctx.config.inputs.pipes.clone() {
        let ctx = Arc::clone(&ctx);
        tokio::spawn(async move { pipe::run(ctx, cfg).await });
    }
    for cfg in ctx.config.inputs.http.clone() {
        let ctx = Arc::clone(&ctx);
        tokio::spawn(async move { http::run(ctx, cfg).await });
    }
}

/// Logs a fatal ingress-setup error and terminates the process, mirroring
/// the source's `log.Fatalf`: a bind/create failure during startup is not
/// recoverable and is not worth a graceful-shutdown dance.
fn fatal(context: impl std::fmt::Display) -> ! {
    tracing::error!("{context}");
    std::process::exit(1);
}

/// Trims whitespace and enqueues the payload if non-empty. Blocks on a
/// full channel: ingress has no drop policy, only natural backpressure.
async fn enqueue(tx: &mpsc::Sender<String>, bytes: impl AsRef<[u8]>) {
    let text = String::from_utf8_lossy(bytes.as_ref());
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return;
    }
    if tx.send(trimmed.to_string()).await.is_err() {
        tracing::warn!("message channel closed while enqueuing payload");
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[tokio::test]
    async fn enqueue_drops_whitespace_only_payload() {
        let (tx, mut rx) = mpsc::channel(1);
        enqueue(&tx, "   \n\t  ").await;
        drop(tx);
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn enqueue_trims_surrounding_whitespace() {
        let (tx, mut rx) = mpsc::channel(1);
        enqueue(&tx, "  hello world  \n").await;
        assert_eq!(rx.recv().await, Some("hello world".to_string()));
    }
}
