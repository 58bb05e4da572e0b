use std::time::Duration;

use lettre::AsyncTransport;
use lettre::Tokio1Executor;
use lettre::address::AddressError;
use lettre::address::Envelope;
use lettre::transport::smtp::AsyncSmtpTransport;
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::authentication::Mechanism;
use lettre::transport::smtp::client::Tls;
use lettre::transport::smtp::client::TlsParameters;
use lettre::transport::smtp::extension::ClientId;
use notifier_config::EmailOutputConfig;
use notifier_proto::MessageContext;

#[derive(Debug, thiserror::Error)]
pub(crate) enum EmailError {
    #[error("invalid smtp port \"{0}\"")]
    InvalidPort(String),
    #[error("invalid address: {0}")]
    Address(#[from] AddressError),
    #[error("failed to build envelope: {0}")]
    Envelope(#[source] lettre::error::Error),
    #[error("failed to configure tls: {0}")]
    Tls(#[source] lettre::transport::smtp::Error),
    #[error("smtp transaction failed: {0}")]
    Send(#[source] lettre::transport::smtp::Error),
}

/// Sends `cfg.body` as the literal wire framing
/// `"From: …\r\nTo: …\r\nSubject: …\r\n\r\n<body>"` rather than letting
/// `lettre`'s `Message` builder derive a MIME envelope, so §6's exact
/// framing is preserved. `AsyncSmtpTransport` opens one connection per
/// `send_raw` call and tears it down on return, so a step-level failure
/// here never leaks a socket.
pub(crate) async fn send(
    msg: &MessageContext,
    cfg: &EmailOutputConfig,
    timeout: Duration,
) -> Result<(), EmailError> {
    let host = notifier_tags::expand(msg, &cfg.smtp_host, &cfg.tags.smtp_host);
    let port_str = notifier_tags::expand(msg, &cfg.smtp_port, &cfg.tags.smtp_port);
    let port: u16 = port_str
        .parse()
        .map_err(|_| EmailError::InvalidPort(port_str.clone()))?;
    let user = cfg
        .smtp_user
        .as_deref()
        .map(|u| notifier_tags::expand(msg, u, &cfg.tags.smtp_user));
    let pass = cfg
        .smtp_pass
        .as_deref()
        .map(|p| notifier_tags::expand(msg, p, &cfg.tags.smtp_pass));
    let from = notifier_tags::expand(msg, &cfg.from, &cfg.tags.from);
    let to = notifier_tags::expand(msg, &cfg.to, &cfg.tags.to);
    let subject = notifier_tags::expand(msg, &cfg.subject, &cfg.tags.subject);
    let body = notifier_tags::expand(msg, &cfg.body, &cfg.tags.body);

    let envelope = Envelope::new(Some(from.parse()?), vec![to.parse()?])
        .map_err(EmailError::Envelope)?;

    let tls = TlsParameters::new(host.clone()).map_err(EmailError::Tls)?;
    let mut builder = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&host)
        .port(port)
        .tls(Tls::Opportunistic(tls))
        .hello_name(ClientId::Domain("localhost".to_string()))
        .timeout(Some(timeout));

    if let (Some(user), Some(pass)) = (user.as_deref(), pass.as_deref()) {
        if !user.is_empty() && !pass.is_empty() {
            builder = builder
                .credentials(Credentials::new(user.to_string(), pass.to_string()))
                .authentication(vec![Mechanism::Plain]);
        }
    }

    let transport = builder.build();
    let raw = format!("From: {from}\r\nTo: {to}\r\nSubject: {subject}\r\n\r\n{body}");
    transport
        .send_raw(&envelope, raw.as_bytes())
        .await
        .map_err(EmailError::Send)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use notifier_config::EmailTagCache;
    use notifier_proto::JsonRpcRequest;
    use pretty_assertions::assert_eq;

    use super::*;

    fn ctx() -> MessageContext {
        let raw = r#"{"jsonrpc":"2.0","method":"alert","params":{"k":"ALARM","v":"disk full"},"id":1}"#;
        MessageContext::new(JsonRpcRequest::parse(raw).unwrap().unwrap())
    }

    #[test]
    fn raw_framing_matches_wire_format() {
        let from = "alerts@example.com";
        let to = "oncall@example.com";
        let subject = "ALARM";
        let body = "disk full";
        let raw = format!("From: {from}\r\nTo: {to}\r\nSubject: {subject}\r\n\r\n{body}");
        assert_eq!(
            raw,
            "From: alerts@example.com\r\nTo: oncall@example.com\r\nSubject: ALARM\r\n\r\ndisk full"
        );
    }

    #[tokio::test]
    async fn invalid_port_is_rejected_before_dialing() {
        let cfg = EmailOutputConfig {
            smtp_host: "smtp.example.com".to_string(),
            smtp_port: "not-a-port".to_string(),
            smtp_user: None,
            smtp_pass: None,
            from: "a@example.com".to_string(),
            to: "b@example.com".to_string(),
            subject: "s".to_string(),
            body: "b".to_string(),
            timeout: None,
            tags: EmailTagCache::default(),
        };
        let err = send(&ctx(), &cfg, Duration::from_millis(100)).await.unwrap_err();
        assert!(matches!(err, EmailError::InvalidPort(_)));
    }
}
