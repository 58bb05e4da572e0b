use std::sync::Arc;

use notifier_proto::JsonRpcRequest;
use notifier_proto::MessageContext;
use notifier_runtime::RuntimeContext;

const DEFAULT_METHOD: &str = "default";

/// Parses one dequeued payload as JSON-RPC, selects its `MethodSpec`
/// (exact match on `method`, falling back to `"default"`), and launches
/// one concurrent task per configured output. Never blocks: every output
/// is `tokio::spawn`ed and this function returns as soon as they are all
/// in flight.
pub fn route(ctx: Arc<RuntimeContext>, raw: String) {
    let request = match JsonRpcRequest::parse(&raw) {
        Ok(Some(request)) => request,
        Ok(None) => return,
        Err(err) => {
            tracing::warn!(error = %err, "dropping message: failed to parse JSON-RPC");
            return;
        }
    };

    let method_name = if ctx.config.methods.contains_key(&request.method) {
        request.method.clone()
    } else if ctx.config.methods.contains_key(DEFAULT_METHOD) {
        DEFAULT_METHOD.to_string()
    } else {
        tracing::warn!(method = %request.method, "dropping message: no method spec and no default");
        return;
    };

    tracing::debug!(method = %method_name, "dispatching message");
    let msg_ctx = Arc::new(MessageContext::new(request));
    dispatch(ctx, method_name, msg_ctx);
}

/// Outputs are spawned in (email, socket, http, exec) order with no
/// ordering requirement between the resulting tasks; each task borrows
/// its spec by re-indexing `ctx.config.methods[&method_name]` so no
/// `Arc<MethodSpec>` wrapper is needed — `ctx` itself already keeps the
/// whole `MethodTable` alive for as long as any output task is running.
fn dispatch(ctx: Arc<RuntimeContext>, method: String, msg: Arc<MessageContext>) {
    let (emails, sockets, https, execs) = {
        let spec = &ctx.config.methods[&method];
        (spec.email.len(), spec.socket.len(), spec.http.len(), spec.exec.len())
    };

    for i in 0..emails {
        let (ctx, method, msg) = (Arc::clone(&ctx), method.clone(), Arc::clone(&msg));
        tokio::spawn(async move {
            let spec = &ctx.config.methods[&method].email[i];
            notifier_egress::send_email(&ctx, &msg, spec).await;
        });
    }
    for i in 0..sockets {
        let (ctx, method, msg) = (Arc::clone(&ctx), method.clone(), Arc::clone(&msg));
        tokio::spawn(async move {
            let spec = &ctx.config.methods[&method].socket[i];
            notifier_egress::send_socket(&ctx, &msg, spec).await;
        });
    }
    for i in 0..https {
        let (ctx, method, msg) = (Arc::clone(&ctx), method.clone(), Arc::clone(&msg));
        tokio::spawn(async move {
            let spec = &ctx.config.methods[&method].http[i];
            notifier_egress::send_http(&ctx, &msg, spec).await;
        });
    }
    for i in 0..execs {
        let (ctx, method, msg) = (Arc::clone(&ctx), method.clone(), Arc::clone(&msg));
        tokio::spawn(async move {
            let spec = &ctx.config.methods[&method].exec[i];
            notifier_egress::run_exec(&ctx, &msg, spec).await;
        });
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use std::collections::HashMap;
    use std::time::Duration;

    use notifier_config::Config;
    use notifier_config::ExecOutputConfig;
    use notifier_config::MethodSpec;
    use notifier_runtime::ActiveWorkers;
    use pretty_assertions::assert_eq;

    use super::*;

    fn config_with(methods: HashMap<String, MethodSpec>) -> Config {
        Config {
            queue_size: 4,
            workers: 4,
            input_timeout: 1000,
            output_timeout: 1000,
            exec_timeout: 1000,
            inputs: Default::default(),
            methods,
        }
    }

    #[tokio::test]
    async fn unparsable_message_is_dropped_without_panicking() {
        let config = config_with(HashMap::new());
        let ctx = Arc::new(RuntimeContext::new(config, ActiveWorkers::new()));
        route(ctx, "not json".to_string());
    }

    #[tokio::test]
    async fn falls_back_to_default_method_and_dispatches_exec() {
        let mut methods = HashMap::new();
        methods.insert(
            "default".to_string(),
            MethodSpec {
                exec: vec![ExecOutputConfig {
                    cmd: "/bin/echo".to_string(),
                    args: vec!["{{$.msg}}".to_string()],
                    timeout: None,
                    tags: Default::default(),
                }],
                ..Default::default()
            },
        );
        let config = config_with(methods);
        let ctx = Arc::new(RuntimeContext::new(config, ActiveWorkers::new()));
        route(
            Arc::clone(&ctx),
            r#"{"jsonrpc":"2.0","method":"unknown","params":{"msg":"hi"},"id":1}"#.to_string(),
        );
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(ctx.active_workers.get(), 0);
    }
}
