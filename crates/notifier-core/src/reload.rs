use std::sync::Arc;

use anyhow::Context;
use notifier_config::Config;
use notifier_runtime::ActiveWorkers;
use notifier_runtime::RuntimeContext;
use tokio::sync::mpsc::error::TryRecvError;

/// Builds a fresh `RuntimeContext` from `<config_name>.yaml`, halts the
/// old context's ingress, and drains whatever the old message channel was
/// still holding into the new one. The old context's in-flight output
/// tasks are untouched: they hold their own `Arc<MessageContext>` and
/// keep running against `notifier-egress` independently of this swap.
///
/// Returns the new context on success. On failure the caller keeps
/// running on the context it already has — nothing here has mutated it.
pub async fn reload(
    config_name: &str,
    old_ctx: &Arc<RuntimeContext>,
    active_workers: ActiveWorkers,
) -> anyhow::Result<Arc<RuntimeContext>> {
    let config = Config::load(config_name)
        .with_context(|| format!("loading config {config_name}.yaml for reload"))?;
    let new_ctx = Arc::new(RuntimeContext::new(config, active_workers));

    old_ctx.stop.trigger();
    old_ctx.ingress_wg.wait().await;

    drain_into(old_ctx, &new_ctx.tx).await;

    tracing::info!("reload accepted; new configuration active");
    Ok(new_ctx)
}

/// Drains whatever is left in `old_ctx`'s message channel, forwarding
/// each message with a blocking send into `new_tx`. Stops at the first
/// empty poll: this runs after the old ingress wait-group has already
/// drained, so nothing is still producing into the old channel.
async fn drain_into(old_ctx: &RuntimeContext, new_tx: &tokio::sync::mpsc::Sender<String>) {
    let mut old_rx = old_ctx.rx.lock().await;
    loop {
        match old_rx.try_recv() {
            Ok(message) => {
                if new_tx.send(message).await.is_err() {
                    break;
                }
            }
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use notifier_config::Config;
    use pretty_assertions::assert_eq;

    use super::*;

    fn empty_config() -> Config {
        Config {
            queue_size: 4,
            workers: 1,
            input_timeout: 1000,
            output_timeout: 1000,
            exec_timeout: 1000,
            inputs: Default::default(),
            methods: Default::default(),
        }
    }

    #[tokio::test]
    async fn drain_into_forwards_queued_messages_in_order() {
        let old_ctx = RuntimeContext::new(empty_config(), ActiveWorkers::new());
        old_ctx.tx.send("one".to_string()).await.unwrap();
        old_ctx.tx.send("two".to_string()).await.unwrap();

        let new_ctx = RuntimeContext::new(empty_config(), ActiveWorkers::new());
        drain_into(&old_ctx, &new_ctx.tx).await;

        let mut rx = new_ctx.rx.lock().await;
        assert_eq!(rx.recv().await, Some("one".to_string()));
        assert_eq!(rx.recv().await, Some("two".to_string()));
    }

    #[tokio::test]
    async fn reload_surfaces_missing_config_as_an_error() {
        let old_ctx = Arc::new(RuntimeContext::new(empty_config(), ActiveWorkers::new()));
        let err = reload(
            "definitely-does-not-exist-notifier-config",
            &old_ctx,
            old_ctx.active_workers.clone(),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("loading config"));
    }
}
