//! Resolves `{{<JSONPath>}}` tokens inside an output spec's templated
//! fields against the RPC `params` payload, with two layers of memoization:
//! the tag list discovered in a given template string (cached once per
//! [`notifier_config::TagSlot`]) and the JSONPath evaluation result for a
//! given tag (cached once per [`notifier_proto::MessageContext`]).

use std::collections::HashSet;

use notifier_config::TagSlot;
use notifier_proto::MessageContext;
use serde_json::Value;

/// Expands every `{{tag}}` occurrence in `template`. `slot` is the
/// spec-owned, write-once cache for the tag list this particular
/// templated field contains; it is populated on the first call and reused
/// on every subsequent one, across every message the spec ever sees.
pub fn expand(ctx: &MessageContext, template: &str, slot: &TagSlot) -> String {
    let tags = slot.get_or_init(|| find_tags(template));
    if tags.is_empty() {
        return template.to_string();
    }

    let mut output = template.to_string();
    for tag in tags {
        let resolved = match ctx.cached(tag) {
            Some(value) => value,
            None => match resolve_tag(&ctx.request.params, tag) {
                Ok(value) => {
                    ctx.store(tag, value.clone());
                    value
                }
                Err(err) => {
                    tracing::warn!(
                        tag = %tag,
                        template = %template,
                        error = %err,
                        "JSONPath: failed to resolve tag"
                    );
                    continue;
                }
            },
        };
        output = output.replace(&format!("{{{{{tag}}}}}"), &resolved);
    }
    output
}

#[derive(Debug, thiserror::Error)]
enum TagError {
    #[error("jsonpath evaluation failed: {0}")]
    Eval(String),
    #[error("jsonpath expression matched no value")]
    NotFound,
    #[error("failed to JSON-encode resolved value: {0}")]
    Encode(#[from] serde_json::Error),
}

fn resolve_tag(params: &Value, tag: &str) -> Result<String, TagError> {
    let matches = jsonpath_lib::select(params, tag).map_err(|err| TagError::Eval(err.to_string()))?;
    let value = matches.into_iter().next().ok_or(TagError::NotFound)?;
    Ok(match value {
        Value::String(s) => s.clone(),
        other => serde_json::to_string(other)?,
    })
}

/// Greedy-forward scan for maximal `{{...}}` substrings, deduplicated.
/// Intentionally does not balance nested braces: `{{a{{b}}c}}` yields the
/// single tag `a{{b`, leaving the literal `c}}` untouched. This mirrors
/// the observable behavior of the scanner this engine is ported from and
/// is the specified, not merely tolerated, behavior.
fn find_tags(input: &str) -> Vec<String> {
    let mut unique = HashSet::new();
    let mut start = 0usize;
    loop {
        let Some(open_rel) = input[start..].find("{{") else {
            break;
        };
        let open = start + open_rel;
        let Some(close_rel) = input[open..].find("}}") else {
            break;
        };
        let close = open + close_rel + 2;
        let tag = &input[open + 2..close - 2];
        start = close;
        if !tag.is_empty() {
            unique.insert(tag.to_string());
        }
    }
    unique.into_iter().collect()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use notifier_proto::JsonRpcRequest;
    use pretty_assertions::assert_eq;
    use std::sync::OnceLock;

    fn ctx(params: Value) -> MessageContext {
        let raw = serde_json::json!({
            "jsonrpc": "2.0",
            "method": "alert",
            "params": params,
            "id": 1,
        })
        .to_string();
        MessageContext::new(JsonRpcRequest::parse(&raw).unwrap().unwrap())
    }

    #[test]
    fn template_without_tags_is_returned_unchanged() {
        let c = ctx(serde_json::json!({}));
        let slot = TagSlot::new();
        assert_eq!(expand(&c, "no tags here", &slot), "no tags here");
        assert_eq!(slot.get().unwrap().len(), 0);
    }

    #[test]
    fn resolves_string_and_nonstring_values() {
        let c = ctx(serde_json::json!({"k": "ALARM", "n": 7}));
        assert_eq!(expand(&c, "{{$.k}}", &TagSlot::new()), "ALARM");
        assert_eq!(expand(&c, "{{$.n}}", &TagSlot::new()), "7");
    }

    #[test]
    fn unresolvable_tag_is_left_in_place() {
        let c = ctx(serde_json::json!({}));
        assert_eq!(expand(&c, "x={{$.missing}}y", &TagSlot::new()), "x={{$.missing}}y");
    }

    #[test]
    fn nested_braces_scan_greedily_forward() {
        let c = ctx(serde_json::json!({}));
        let slot = TagSlot::new();
        let _ = expand(&c, "{{a{{b}}c}}", &slot);
        let tags = slot.get().unwrap();
        assert_eq!(tags, &vec!["a{{b".to_string()]);
    }

    #[test]
    fn tag_list_is_cached_after_first_call() {
        let c = ctx(serde_json::json!({"k": "v"}));
        let slot: TagSlot = OnceLock::new();
        expand(&c, "{{$.k}}", &slot);
        let first = slot.get().unwrap().clone();
        expand(&c, "{{$.k}}", &slot);
        assert_eq!(slot.get().unwrap(), &first);
    }

    #[test]
    fn jsonpath_evaluated_once_per_message_across_outputs() {
        let c = ctx(serde_json::json!({"v": "hit"}));
        let a = expand(&c, "first={{$.v}}", &TagSlot::new());
        let b = expand(&c, "second={{$.v}}", &TagSlot::new());
        assert_eq!(a, "first=hit");
        assert_eq!(b, "second=hit");
        assert_eq!(c.cached("$.v"), Some("hit".to_string()));
    }
}
