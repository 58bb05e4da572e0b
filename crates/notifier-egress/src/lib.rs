//! The four egress actions a method's outputs can trigger: email, a raw
//! socket write, an HTTP request, and a spawned command. Every entry
//! point here shares the same preamble — increment
//! [`notifier_runtime::ActiveWorkers`], expand every templated field via
//! [`notifier_tags::expand`], compute the effective per-invocation
//! timeout, perform the action, log on failure — and release the worker
//! slot on every exit path via an RAII guard.

mod email;
mod exec;
mod http;
mod socket;

use std::time::Duration;

use notifier_config::EmailOutputConfig;
use notifier_config::ExecOutputConfig;
use notifier_config::HttpOutputConfig;
use notifier_config::SocketOutputConfig;
use notifier_proto::MessageContext;
use notifier_runtime::RuntimeContext;

/// `out.timeout` (ms, when positive) else the context's default for that
/// action kind. Every egress driver computes this once, up front.
fn effective_timeout(configured: Option<u64>, default: Duration) -> Duration {
    match configured {
        Some(ms) if ms > 0 => Duration::from_millis(ms),
        _ => default,
    }
}

pub async fn send_email(ctx: &RuntimeContext, msg: &MessageContext, cfg: &EmailOutputConfig) {
    let _guard = ctx.active_workers.enter();
    let timeout = effective_timeout(cfg.timeout, ctx.output_timeout);
    if let Err(err) = email::send(msg, cfg, timeout).await {
        tracing::warn!(smtp_host = %cfg.smtp_host, error = %err, "email output failed");
    }
}

pub async fn send_socket(ctx: &RuntimeContext, msg: &MessageContext, cfg: &SocketOutputConfig) {
    let _guard = ctx.active_workers.enter();
    let timeout = effective_timeout(cfg.timeout, ctx.output_timeout);
    if let Err(err) = socket::send(msg, cfg, timeout).await {
        tracing::warn!(address = %cfg.address, error = %err, "socket output failed");
    }
}

pub async fn send_http(ctx: &RuntimeContext, msg: &MessageContext, cfg: &HttpOutputConfig) {
    let _guard = ctx.active_workers.enter();
    let timeout = effective_timeout(cfg.timeout, ctx.output_timeout);
    if let Err(err) = http::send(msg, cfg, timeout).await {
        tracing::warn!(url = %cfg.url, error = %err, "http output failed");
    }
}

/// Falls back to `ctx.output_timeout`, not `ctx.exec_timeout`, on an unset
/// or zero `cfg.timeout` — mirroring the upstream Go source, which parses
/// `exec_timeout` into the context but never reads it from `execCommand`;
/// every output kind including exec shares the same fallback. See
/// DESIGN.md for the source line this is grounded on.
pub async fn run_exec(ctx: &RuntimeContext, msg: &MessageContext, cfg: &ExecOutputConfig) {
    let _guard = ctx.active_workers.enter();
    let timeout = effective_timeout(cfg.timeout, ctx.output_timeout);
    if let Err(err) = exec::run(msg, cfg, timeout).await {
        tracing::warn!(cmd = %cfg.cmd, error = %err, "exec output failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn effective_timeout_prefers_positive_override() {
        let default = Duration::from_millis(1000);
        assert_eq!(effective_timeout(Some(250), default), Duration::from_millis(250));
        assert_eq!(effective_timeout(Some(0), default), default);
        assert_eq!(effective_timeout(None, default), default);
    }
}
