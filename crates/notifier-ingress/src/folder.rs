use std::sync::Arc;
use std::time::Duration;

use notifier_config::FolderInputConfig;
use notifier_runtime::RuntimeContext;
use walkdir::WalkDir;

use crate::enqueue;
use crate::fatal;

pub(crate) async fn run(ctx: Arc<RuntimeContext>, cfg: FolderInputConfig) {
    let _guard = ctx.ingress_wg.add();
    tracing::info!(path = %cfg.path, "starting folder input");

    let scan_interval = Duration::from_millis(cfg.scan_time);
    let mut stop_rx = ctx.stop.subscribe();

    loop {
        if ctx.stop.is_stopping() {
            break;
        }

        if let Err(err) = scan_once(&ctx, &cfg).await {
            fatal(format!("error scanning {}: {err}", cfg.path));
        }

        tokio::select! {
            biased;
            _ = stop_rx.recv() => break,
            _ = tokio::time::sleep(scan_interval) => {}
        }
    }

    tracing::info!(path = %cfg.path, "stopping folder input");
}

async fn scan_once(ctx: &RuntimeContext, cfg: &FolderInputConfig) -> std::io::Result<()> {
    for entry in WalkDir::new(&cfg.path) {
        let entry = entry.map_err(std::io::Error::from)?;
        if entry.file_type().is_dir() {
            continue;
        }

        let name = entry.file_name().to_string_lossy();
        if let Some(prefix) = cfg.file_prefix.as_deref() {
            if !prefix.is_empty() && !name.starts_with(prefix) {
                continue;
            }
        }
        if let Some(suffix) = cfg.file_suffix.as_deref() {
            if !suffix.is_empty() && !name.ends_with(suffix) {
                continue;
            }
        }

        let path = entry.into_path();
        let content = std::fs::read(&path)?;
        std::fs::remove_file(&path)?;
        enqueue(&ctx.tx, content).await;
    }
    Ok(())
}
