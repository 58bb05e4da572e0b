use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::StatusCode;
use notifier_config::HttpInputConfig;
use notifier_runtime::RuntimeContext;
use tokio::net::TcpListener;

use crate::enqueue;
use crate::fatal;

#[derive(Clone)]
struct HandlerState {
    ctx: Arc<RuntimeContext>,
    timeout: Duration,
}

pub(crate) async fn run(ctx: Arc<RuntimeContext>, cfg: HttpInputConfig) {
    let _guard = ctx.ingress_wg.add();
    tracing::info!(address = %cfg.address, "starting http input");

    let timeout = cfg
        .timeout
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis)
        .unwrap_or(ctx.input_timeout);

    let listener = match TcpListener::bind(&cfg.address).await {
        Ok(listener) => listener,
        Err(err) => fatal(format!("error listening on http {}: {err}", cfg.address)),
    };

    let state = HandlerState {
        ctx: Arc::clone(&ctx),
        timeout,
    };
    // Any path, any verb: this is a bare ingress collector, not a routed API.
    let app = axum::Router::new().fallback(handle).with_state(state);

    let mut stop_rx = ctx.stop.subscribe();
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        let _ = stop_rx.recv().await;
    });

    if let Err(err) = server.await {
        tracing::warn!(address = %cfg.address, error = %err, "http input server exited with error");
    }

    tracing::info!(address = %cfg.address, "stopping http input");
}

async fn handle(State(state): State<HandlerState>, body: Body) -> StatusCode {
    let read = axum::body::to_bytes(body, usize::MAX);
    match tokio::time::timeout(state.timeout, read).await {
        Ok(Ok(bytes)) => {
            enqueue(&state.ctx.tx, bytes).await;
            StatusCode::OK
        }
        Ok(Err(err)) => {
            tracing::warn!(error = %err, "error reading http request body");
            StatusCode::INTERNAL_SERVER_ERROR
        }
        Err(_) => {
            tracing::warn!("http request body read deadline exceeded");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
