use std::process::Stdio;
use std::time::Duration;

use notifier_config::ExecOutputConfig;
use notifier_proto::MessageContext;
use tokio::process::Command;

#[derive(Debug, thiserror::Error)]
pub(crate) enum ExecError {
    #[error("command timed out after {0:?}")]
    Timeout(Duration),
    #[error("command exited with status {0}")]
    NonZeroExit(std::process::ExitStatus),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Expands `cmd` and every element of `args`, spawns the resulting argv
/// under `timeout`, and kills the child if the deadline elapses. Combined
/// stdout+stderr is only logged by the caller on a non-zero exit or error,
/// so it is captured unconditionally here and handed back either way.
pub(crate) async fn run(
    msg: &MessageContext,
    cfg: &ExecOutputConfig,
    timeout: Duration,
) -> Result<(), ExecError> {
    let cmd = notifier_tags::expand(msg, &cfg.cmd, &cfg.tags.cmd);
    let args: Vec<String> = cfg
        .args
        .iter()
        .zip(cfg.tags.args.iter())
        .map(|(arg, slot)| notifier_tags::expand(msg, arg, slot))
        .collect();

    let mut child = Command::new(&cmd)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result?,
        Err(_) => return Err(ExecError::Timeout(timeout)),
    };

    if !output.status.success() {
        tracing::warn!(
            cmd = %cmd,
            args = ?args,
            status = %output.status,
            stdout = %String::from_utf8_lossy(&output.stdout),
            stderr = %String::from_utf8_lossy(&output.stderr),
            "exec output: non-zero exit"
        );
        return Err(ExecError::NonZeroExit(output.status));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use notifier_proto::JsonRpcRequest;

    use super::*;

    fn ctx() -> MessageContext {
        let raw = r#"{"jsonrpc":"2.0","method":"m","params":{"msg":"hi"},"id":1}"#;
        MessageContext::new(JsonRpcRequest::parse(raw).unwrap().unwrap())
    }

    #[tokio::test]
    async fn expands_command_and_args() {
        let cfg = ExecOutputConfig {
            cmd: "/bin/echo".to_string(),
            args: vec!["{{$.msg}}".to_string()],
            timeout: None,
            tags: Default::default(),
        };
        run(&ctx(), &cfg, Duration::from_secs(5)).await.unwrap();
    }

    #[tokio::test]
    async fn non_zero_exit_is_reported() {
        let cfg = ExecOutputConfig {
            cmd: "/bin/false".to_string(),
            args: vec![],
            timeout: None,
            tags: Default::default(),
        };
        let err = run(&ctx(), &cfg, Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, ExecError::NonZeroExit(_)));
    }

    #[tokio::test]
    async fn timeout_kills_the_process() {
        let cfg = ExecOutputConfig {
            cmd: "/bin/sleep".to_string(),
            args: vec!["5".to_string()],
            timeout: None,
            tags: Default::default(),
        };
        let err = run(&ctx(), &cfg, Duration::from_millis(50)).await.unwrap_err();
        assert!(matches!(err, ExecError::Timeout(_)));
    }
}
