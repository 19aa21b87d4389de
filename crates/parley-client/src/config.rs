//! Client configuration loaded from environment variables.
//!
//! Every setting has a default pointing at a local development backend, so
//! the client starts with zero configuration.

use std::time::Duration;

use parley_net::ReconnectPolicy;
use parley_shared::constants::{
    DEFAULT_API_URL, DEFAULT_PUSH_URL, DEFAULT_RECONNECT_INITIAL_MS, DEFAULT_RECONNECT_MAX_MS,
    DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_SCROLL_THRESHOLD_PX,
};

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// REST API base URL.
    /// Env: `PARLEY_API_URL`
    /// Default: `http://localhost:5001/api/v1`
    pub api_url: String,

    /// Socket.IO WebSocket endpoint.
    /// Env: `PARLEY_PUSH_URL`
    pub push_url: String,

    /// Per-request HTTP timeout.
    /// Env: `PARLEY_REQUEST_TIMEOUT_SECS`
    /// Default: 10 seconds
    pub request_timeout: Duration,

    /// First push reconnect delay.
    /// Env: `PARLEY_RECONNECT_INITIAL_MS`
    pub reconnect_initial: Duration,

    /// Upper bound for the push reconnect delay.
    /// Env: `PARLEY_RECONNECT_MAX_MS`
    pub reconnect_max: Duration,

    /// Drop `newMessage` events authored by the current user. Identifier
    /// de-duplication already covers echoes, so this is off by default.
    /// Env: `PARLEY_FILTER_OWN_ECHOES` (true/false)
    pub filter_own_echoes: bool,

    /// Distance from the bottom, in pixels, still treated as "at bottom".
    /// Env: `PARLEY_SCROLL_THRESHOLD_PX`
    pub scroll_threshold_px: f64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            push_url: DEFAULT_PUSH_URL.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            reconnect_initial: Duration::from_millis(DEFAULT_RECONNECT_INITIAL_MS),
            reconnect_max: Duration::from_millis(DEFAULT_RECONNECT_MAX_MS),
            filter_own_echoes: false,
            scroll_threshold_px: DEFAULT_SCROLL_THRESHOLD_PX,
        }
    }
}

impl ClientConfig {
    /// Load configuration from the process environment, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("PARLEY_API_URL") {
            config.api_url = url;
        }

        if let Some(url) = lookup("PARLEY_PUSH_URL") {
            config.push_url = url;
        }

        if let Some(secs) = parse_number::<u64>(&lookup, "PARLEY_REQUEST_TIMEOUT_SECS") {
            config.request_timeout = Duration::from_secs(secs);
        }

        if let Some(ms) = parse_number::<u64>(&lookup, "PARLEY_RECONNECT_INITIAL_MS") {
            config.reconnect_initial = Duration::from_millis(ms);
        }

        if let Some(ms) = parse_number::<u64>(&lookup, "PARLEY_RECONNECT_MAX_MS") {
            config.reconnect_max = Duration::from_millis(ms);
        }

        if let Some(val) = lookup("PARLEY_FILTER_OWN_ECHOES") {
            config.filter_own_echoes = val == "true" || val == "1";
        }

        if let Some(px) = parse_number::<f64>(&lookup, "PARLEY_SCROLL_THRESHOLD_PX") {
            config.scroll_threshold_px = px;
        }

        if config.reconnect_max < config.reconnect_initial {
            tracing::warn!(
                initial_ms = config.reconnect_initial.as_millis() as u64,
                max_ms = config.reconnect_max.as_millis() as u64,
                "Reconnect max below initial delay, clamping"
            );
            config.reconnect_max = config.reconnect_initial;
        }

        config
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            initial: self.reconnect_initial,
            max: self.reconnect_max,
        }
    }
}

fn parse_number<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Invalid number, using default");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from_pairs(pairs: &[(&str, &str)]) -> ClientConfig {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ClientConfig::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.api_url, "http://localhost:5001/api/v1");
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert!(!config.filter_own_echoes);
    }

    #[test]
    fn test_overrides() {
        let config = from_pairs(&[
            ("PARLEY_API_URL", "https://chat.example/api/v1"),
            ("PARLEY_REQUEST_TIMEOUT_SECS", "3"),
            ("PARLEY_FILTER_OWN_ECHOES", "true"),
            ("PARLEY_SCROLL_THRESHOLD_PX", "20.5"),
        ]);
        assert_eq!(config.api_url, "https://chat.example/api/v1");
        assert_eq!(config.request_timeout, Duration::from_secs(3));
        assert!(config.filter_own_echoes);
        assert_eq!(config.scroll_threshold_px, 20.5);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = from_pairs(&[("PARLEY_REQUEST_TIMEOUT_SECS", "soon")]);
        assert_eq!(config.request_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_reconnect_bounds_are_clamped() {
        let config = from_pairs(&[
            ("PARLEY_RECONNECT_INITIAL_MS", "5000"),
            ("PARLEY_RECONNECT_MAX_MS", "100"),
        ]);
        assert_eq!(config.reconnect_policy().max, Duration::from_millis(5000));
    }
}
