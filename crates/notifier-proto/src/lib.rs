//! Wire format and per-message state for the router.
//!
//! A [`MessageContext`] is created once a raw payload has parsed as
//! [`JsonRpcRequest`] and is shared (by `Arc`) across every output task
//! spawned for that message; it owns the JSONPath resolution cache so the
//! same tag is evaluated at most once per message regardless of how many
//! output specs reference it.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub id: Value,
}

#[derive(Debug, thiserror::Error)]
#[error("error decoding JSON-RPC: {0}")]
pub struct DecodeError(#[from] serde_json::Error);

impl JsonRpcRequest {
    /// Trims surrounding whitespace and parses the remainder as a
    /// JSON-RPC request object. Returns `Ok(None)` for an all-whitespace
    /// payload, matching the ingress drivers' trim-then-drop behavior so
    /// the router never has to special-case an empty string.
    pub fn parse(raw: &str) -> Result<Option<Self>, DecodeError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(trimmed)?))
    }
}

/// Per-message state shared across all output tasks spawned by the router
/// for a single RPC. Dropped once every task sharing it has returned.
#[derive(Debug)]
pub struct MessageContext {
    pub request: JsonRpcRequest,
    tag_cache: Mutex<HashMap<String, String>>,
}

impl MessageContext {
    pub fn new(request: JsonRpcRequest) -> Self {
        Self {
            request,
            tag_cache: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the cached resolution for `tag`, if any distinct output has
    /// already resolved it for this message.
    pub fn cached(&self, tag: &str) -> Option<String> {
        self.tag_cache.lock().unwrap_or_else(|e| e.into_inner()).get(tag).cloned()
    }

    /// Publishes a resolution for `tag`. Safe to call redundantly under a
    /// race between two output tasks resolving the same tag concurrently:
    /// the JSONPath evaluation is pure, so last-write-wins is harmless.
    pub fn store(&self, tag: &str, value: String) {
        self.tag_cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(tag.to_string(), value);
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parse_trims_and_rejects_blank_payloads() {
        assert!(JsonRpcRequest::parse("   \n\t  ").unwrap().is_none());

        let req = JsonRpcRequest::parse(
            "  {\"jsonrpc\":\"2.0\",\"method\":\"alert\",\"params\":{\"k\":1},\"id\":1}  ",
        )
        .unwrap()
        .unwrap();
        assert_eq!(req.method, "alert");
    }

    #[test]
    fn tag_cache_round_trips() {
        let ctx = MessageContext::new(
            JsonRpcRequest::parse("{\"jsonrpc\":\"2.0\",\"method\":\"m\",\"params\":{},\"id\":1}")
                .unwrap()
                .unwrap(),
        );
        assert_eq!(ctx.cached("$.k"), None);
        ctx.store("$.k", "v".to_string());
        assert_eq!(ctx.cached("$.k"), Some("v".to_string()));
    }
}
