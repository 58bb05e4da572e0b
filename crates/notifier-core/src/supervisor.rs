use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use notifier_config::Config;
use notifier_runtime::ActiveWorkers;
use notifier_runtime::RuntimeContext;
use tokio::signal::unix::SignalKind;
use tokio::signal::unix::signal;

use crate::reload::reload;
use crate::router::route;

const ADMISSION_POLL: Duration = Duration::from_millis(100);
const DRAIN_POLL: Duration = Duration::from_millis(100);

/// Loads `<config_name>.yaml`, starts ingress, and runs the supervisor
/// loop until a graceful shutdown completes. `HUP` triggers a reload in
/// place; `INT`/`TERM` latch a shutdown that waits for ingress to drain
/// and then for `ActiveWorkers` to reach zero before returning.
pub async fn run(config_name: String) -> anyhow::Result<()> {
    let config = Config::load(&config_name)
        .with_context(|| format!("loading config {config_name}.yaml"))?;
    let active_workers = ActiveWorkers::new();
    let mut ctx = Arc::new(RuntimeContext::new(config, active_workers.clone()));
    notifier_ingress::start_inputs(Arc::clone(&ctx));
    tracing::info!(config = %config_name, "notifier started");

    let mut sigint = signal(SignalKind::interrupt()).context("registering SIGINT handler")?;
    let mut sigterm = signal(SignalKind::terminate()).context("registering SIGTERM handler")?;
    let mut sighup = signal(SignalKind::hangup()).context("registering SIGHUP handler")?;

    let mut stopping = false;
    loop {
        if stopping {
            ctx.ingress_wg.wait().await;
            while ctx.active_workers.get() > 0 {
                tokio::time::sleep(DRAIN_POLL).await;
            }
            break;
        }

        let can_dispatch = ctx.active_workers.get() < ctx.config.workers as i64;
        tokio::select! {
            biased;
            _ = sigint.recv() => {
                tracing::info!("received SIGINT; starting graceful shutdown");
                ctx.stop.trigger();
                stopping = true;
            }
            _ = sigterm.recv() => {
                tracing::info!("received SIGTERM; starting graceful shutdown");
                ctx.stop.trigger();
                stopping = true;
            }
            _ = sighup.recv() => {
                tracing::info!("received SIGHUP; reloading configuration");
                match reload(&config_name, &ctx, active_workers.clone()).await {
                    Ok(new_ctx) => {
                        ctx = new_ctx;
                        notifier_ingress::start_inputs(Arc::clone(&ctx));
                    }
                    Err(err) => {
                        tracing::error!(error = %err, "reload failed; continuing on previous configuration");
                    }
                }
            }
            message = recv_message(&ctx), if can_dispatch => {
                if let Some(raw) = message {
                    route(Arc::clone(&ctx), raw);
                }
            }
            _ = tokio::time::sleep(ADMISSION_POLL), if !can_dispatch => {}
        }
    }

    tracing::info!("notifier shut down gracefully");
    Ok(())
}

async fn recv_message(ctx: &RuntimeContext) -> Option<String> {
    let mut rx = ctx.rx.lock().await;
    rx.recv().await
}
