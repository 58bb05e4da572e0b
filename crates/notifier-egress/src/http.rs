use std::time::Duration;

use notifier_config::HttpOutputConfig;
use notifier_proto::MessageContext;
use reqwest::Method;

#[derive(Debug, thiserror::Error)]
pub(crate) enum HttpError {
    #[error("invalid http method \"{0}\"")]
    InvalidMethod(String),
    #[error(transparent)]
    Request(#[from] reqwest::Error),
}

/// Builds and fires one HTTP request with every templated field expanded.
/// A non-2xx response is not an error; the caller only learns about
/// transport-level failures (dial, timeout, malformed method).
pub(crate) async fn send(
    msg: &MessageContext,
    cfg: &HttpOutputConfig,
    timeout: Duration,
) -> Result<(), HttpError> {
    let method_str = notifier_tags::expand(msg, &cfg.method, &cfg.tags.method);
    let method = Method::from_bytes(method_str.as_bytes())
        .map_err(|_| HttpError::InvalidMethod(method_str))?;
    let url = notifier_tags::expand(msg, &cfg.url, &cfg.tags.url);
    let body = notifier_tags::expand(msg, &cfg.body, &cfg.tags.body);

    let client = reqwest::Client::builder().timeout(timeout).build()?;
    let mut request = client.request(method, url);
    for ((header, key_slot), val_slot) in cfg
        .headers
        .iter()
        .zip(cfg.tags.headers_keys.iter())
        .zip(cfg.tags.headers_vals.iter())
    {
        for (key, value) in header {
            let key = notifier_tags::expand(msg, key, key_slot);
            let value = notifier_tags::expand(msg, value, val_slot);
            request = request.header(key, value);
        }
    }

    let response = request.body(body).send().await?;
    let _ = response.bytes().await;
    Ok(())
}
