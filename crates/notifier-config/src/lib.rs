//! Typed schema for the notifier's YAML configuration file, plus the
//! write-once tag-list caches that the templating engine publishes into
//! each output spec the first time it expands one of that spec's fields.
//!
//! Loading is a two-step process: `serde_yaml` deserializes the raw
//! document, then [`Config::normalize`] clamps the handful of fields that
//! the wire format allows to be zero or absent but the runtime never wants
//! to see that way (queue/worker minimums, millisecond timeout defaults).

use std::collections::HashMap;
use std::sync::OnceLock;

use serde::Deserialize;

const DEFAULT_TIMEOUT_MS: u64 = 1000;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("error reading config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("error parsing config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub queue_size: usize,
    #[serde(default)]
    pub workers: usize,
    #[serde(default)]
    pub input_timeout: u64,
    #[serde(default)]
    pub output_timeout: u64,
    #[serde(default)]
    pub exec_timeout: u64,
    #[serde(default)]
    pub inputs: InputsConfig,
    #[serde(default)]
    pub methods: HashMap<String, MethodSpec>,
}

impl Config {
    /// Loads `<name>.yaml` from the working directory and applies the
    /// defaulting/clamping rules every call site otherwise has to repeat.
    pub fn load(name: &str) -> Result<Self, ConfigError> {
        let path = format!("{name}.yaml");
        let raw = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let mut config: Config =
            serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse { path, source })?;
        config.normalize();
        Ok(config)
    }

    fn normalize(&mut self) {
        if self.queue_size < 1 {
            self.queue_size = 1;
        }
        if self.workers < 1 {
            self.workers = 1;
        }
        self.input_timeout = default_if_zero(self.input_timeout);
        self.output_timeout = default_if_zero(self.output_timeout);
        self.exec_timeout = default_if_zero(self.exec_timeout);
        for spec in self.methods.values_mut() {
            spec.finalize_tag_caches();
        }
    }
}

fn default_if_zero(value: u64) -> u64 {
    if value == 0 { DEFAULT_TIMEOUT_MS } else { value }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InputsConfig {
    #[serde(default)]
    pub sockets: Vec<SocketInputConfig>,
    #[serde(default)]
    pub folders: Vec<FolderInputConfig>,
    #[serde(default)]
    pub pipes: Vec<PipeInputConfig>,
    #[serde(default)]
    pub http: Vec<HttpInputConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SocketInputConfig {
    #[serde(rename = "type")]
    pub kind: String,
    pub address: String,
    pub timeout: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FolderInputConfig {
    pub path: String,
    #[serde(rename = "file-prefix", default)]
    pub file_prefix: Option<String>,
    #[serde(rename = "file-suffix", default)]
    pub file_suffix: Option<String>,
    #[serde(rename = "scan-time")]
    pub scan_time: u64,
    pub timeout: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipeInputConfig {
    pub path: String,
    pub timeout: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpInputConfig {
    pub address: String,
    pub timeout: Option<u64>,
}

/// One method's ordered output lists. A missing `methods` entry for a
/// message's RPC `method` falls back to the `"default"` key, looked up by
/// the caller (notifier-core), not by this type.
#[derive(Debug, Default, Deserialize)]
pub struct MethodSpec {
    #[serde(default)]
    pub email: Vec<EmailOutputConfig>,
    #[serde(default)]
    pub socket: Vec<SocketOutputConfig>,
    #[serde(default)]
    pub http: Vec<HttpOutputConfig>,
    #[serde(default)]
    pub exec: Vec<ExecOutputConfig>,
}

impl MethodSpec {
    /// Sizes every per-field/per-element tag-list cache once, right after
    /// load. The Go source allocates these lazily on first expansion; doing
    /// it eagerly here is equivalent because the cache *slots* only depend
    /// on the (fixed, load-time) shape of the spec, not on any message.
    fn finalize_tag_caches(&mut self) {
        for out in &mut self.http {
            out.tags.headers_keys.resize_with(out.headers.len(), OnceLock::new);
            out.tags.headers_vals.resize_with(out.headers.len(), OnceLock::new);
        }
        for out in &mut self.exec {
            out.tags.args.resize_with(out.args.len(), OnceLock::new);
        }
    }
}

/// A write-once slot holding the deduplicated tag list discovered the
/// first time a templated field is expanded. `OnceLock` gives the
/// first-writer-wins publication safety the spec requires without a
/// dedicated mutex per field.
pub type TagSlot = OnceLock<Vec<String>>;

#[derive(Debug, Clone, Deserialize)]
pub struct EmailOutputConfig {
    #[serde(rename = "smtp-host")]
    pub smtp_host: String,
    #[serde(rename = "smtp-port")]
    pub smtp_port: String,
    #[serde(rename = "smtp-user", default)]
    pub smtp_user: Option<String>,
    #[serde(rename = "smtp-pass", default)]
    pub smtp_pass: Option<String>,
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
    pub timeout: Option<u64>,
    #[serde(default, skip_deserializing)]
    pub tags: EmailTagCache,
}

#[derive(Debug, Default)]
pub struct EmailTagCache {
    pub smtp_host: TagSlot,
    pub smtp_port: TagSlot,
    pub smtp_user: TagSlot,
    pub smtp_pass: TagSlot,
    pub from: TagSlot,
    pub to: TagSlot,
    pub subject: TagSlot,
    pub body: TagSlot,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SocketOutputConfig {
    #[serde(rename = "type")]
    pub kind: String,
    pub address: String,
    pub message: String,
    pub timeout: Option<u64>,
    #[serde(default, skip_deserializing)]
    pub tags: SocketTagCache,
}

#[derive(Debug, Default)]
pub struct SocketTagCache {
    pub kind: TagSlot,
    pub address: TagSlot,
    pub message: TagSlot,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpOutputConfig {
    pub url: String,
    pub method: String,
    #[serde(default)]
    pub headers: Vec<HashMap<String, String>>,
    pub body: String,
    pub timeout: Option<u64>,
    #[serde(default, skip_deserializing)]
    pub tags: HttpTagCache,
}

#[derive(Debug, Default)]
pub struct HttpTagCache {
    pub url: TagSlot,
    pub method: TagSlot,
    pub body: TagSlot,
    pub headers_keys: Vec<TagSlot>,
    pub headers_vals: Vec<TagSlot>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecOutputConfig {
    pub cmd: String,
    #[serde(default)]
    pub args: Vec<String>,
    pub timeout: Option<u64>,
    #[serde(default, skip_deserializing)]
    pub tags: ExecTagCache,
}

#[derive(Debug, Default)]
pub struct ExecTagCache {
    pub cmd: TagSlot,
    pub args: Vec<TagSlot>,
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn clamps_queue_size_and_workers_to_one() {
        let mut config: Config = serde_yaml::from_str("queue_size: 0\nworkers: 0\n").unwrap();
        config.normalize();
        assert_eq!(config.queue_size, 1);
        assert_eq!(config.workers, 1);
        assert_eq!(config.input_timeout, DEFAULT_TIMEOUT_MS);
        assert_eq!(config.output_timeout, DEFAULT_TIMEOUT_MS);
        assert_eq!(config.exec_timeout, DEFAULT_TIMEOUT_MS);
    }

    #[test]
    fn sizes_tag_caches_to_match_headers_and_args() {
        let mut spec = MethodSpec {
            http: vec![HttpOutputConfig {
                url: "{{$.url}}".into(),
                method: "POST".into(),
                headers: vec![HashMap::from([("X-Tag".to_string(), "{{$.v}}".to_string())])],
                body: "{{$.body}}".into(),
                timeout: None,
                tags: HttpTagCache::default(),
            }],
            exec: vec![ExecOutputConfig {
                cmd: "/bin/echo".into(),
                args: vec!["{{$.a}}".into(), "{{$.b}}".into()],
                timeout: None,
                tags: ExecTagCache::default(),
            }],
            ..Default::default()
        };
        spec.finalize_tag_caches();
        assert_eq!(spec.http[0].tags.headers_keys.len(), 1);
        assert_eq!(spec.http[0].tags.headers_vals.len(), 1);
        assert_eq!(spec.exec[0].tags.args.len(), 2);
    }
}
