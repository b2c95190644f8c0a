/// Client configuration, read from the environment the same way the binary is configured

use reqwest::Url;
use std::time::Duration;

use crate::channel::ReconnectPolicy;
use crate::error::ConfigError;

const DEFAULT_WORKER_URL: &str = "http://127.0.0.1:8000";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Path of the push channel, relative to the API prefix
pub const UPDATES_PATH: &str = "/updates";

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Address of the worker UI server, without a trailing path
    pub base_url: Url,
    /// Prefix in front of every route, e.g. `/api` behind a dev proxy
    pub api_prefix: String,
    pub request_timeout: Duration,
    pub reconnect: ReconnectPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: Url::parse(DEFAULT_WORKER_URL).expect("default url is valid"),
            api_prefix: String::new(),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: parse_base_url(base_url)?,
            ..Self::default()
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Result<Self, ConfigError> {
        self.base_url = parse_base_url(base_url)?;
        Ok(self)
    }

    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.api_prefix = normalize_prefix(prefix);
        self
    }

    /// Build from `WORKER_URL`, `WORKER_API_PREFIX`, `WORKER_TIMEOUT_SECS`,
    /// `RECONNECT_INITIAL_MS`, `RECONNECT_MAX_MS` and `RECONNECT_MAX_ATTEMPTS`
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = match lookup("WORKER_URL") {
            Some(url) => Self::new(&url)?,
            None => Self::default(),
        };

        if let Some(prefix) = lookup("WORKER_API_PREFIX") {
            config = config.with_prefix(&prefix);
        }
        if let Some(secs) = parse_var(&lookup, "WORKER_TIMEOUT_SECS")? {
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(ms) = parse_var(&lookup, "RECONNECT_INITIAL_MS")? {
            config.reconnect.initial_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var(&lookup, "RECONNECT_MAX_MS")? {
            config.reconnect.max_delay = Duration::from_millis(ms);
        }
        if let Some(attempts) = parse_var(&lookup, "RECONNECT_MAX_ATTEMPTS")? {
            config.reconnect.max_attempts = Some(attempts);
        }

        Ok(config)
    }

    /// Base the RPC paths are appended to
    pub fn rpc_base(&self) -> String {
        format!("{}{}", self.base_url.as_str().trim_end_matches('/'), self.api_prefix)
    }

    /// WebSocket address of the updates channel
    pub fn updates_url(&self) -> String {
        let mut url = self.base_url.clone();
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        // http(s) -> ws(s) is always an allowed scheme change
        let _ = url.set_scheme(scheme);
        format!(
            "{}{}{}",
            url.as_str().trim_end_matches('/'),
            self.api_prefix,
            UPDATES_PATH
        )
    }
}

fn parse_base_url(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|e| ConfigError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ConfigError::InvalidUrl {
            url: raw.to_string(),
            reason: format!("unsupported scheme {other}"),
        }),
    }
}

fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(key) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { key, value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = ClientConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.rpc_base(), "http://127.0.0.1:8000");
        assert_eq!(config.updates_url(), "ws://127.0.0.1:8000/updates");
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.reconnect.max_attempts, None);
    }

    #[test]
    fn test_dev_prefix_applies_to_both_paths() {
        let config = ClientConfig::from_lookup(lookup_from(&[
            ("WORKER_URL", "https://ui.local:5173/"),
            ("WORKER_API_PREFIX", "api/"),
        ]))
        .unwrap();
        assert_eq!(config.rpc_base(), "https://ui.local:5173/api");
        assert_eq!(config.updates_url(), "wss://ui.local:5173/api/updates");
    }

    #[test]
    fn test_reconnect_overrides() {
        let config = ClientConfig::from_lookup(lookup_from(&[
            ("RECONNECT_INITIAL_MS", "100"),
            ("RECONNECT_MAX_MS", "2000"),
            ("RECONNECT_MAX_ATTEMPTS", "5"),
            ("WORKER_TIMEOUT_SECS", "3"),
        ]))
        .unwrap();
        assert_eq!(config.reconnect.initial_delay, Duration::from_millis(100));
        assert_eq!(config.reconnect.max_delay, Duration::from_millis(2000));
        assert_eq!(config.reconnect.max_attempts, Some(5));
        assert_eq!(config.request_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = ClientConfig::from_lookup(lookup_from(&[("RECONNECT_MAX_ATTEMPTS", "lots")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "RECONNECT_MAX_ATTEMPTS", .. }));

        assert!(ClientConfig::new("ftp://host").is_err());
        assert!(ClientConfig::new("not a url").is_err());
    }
}
