//! Typed, validated configuration for a peer's transport.
//!
//! Mirrors every option named in the external interface: a peer URI template,
//! the signaling server's URI, the expected initial context size and name,
//! and the send/recv timeouts. Can be built programmatically with
//! [`Config::builder`] or loaded from a TOML file with [`Config::from_toml_str`].

use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

const DEFAULT_SEND_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_RECV_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_LOG_FILTER: &str = "info";

/// Validated runtime configuration for one peer.
#[derive(Debug, Clone)]
pub struct Config {
    pub peer_uri: String,
    pub signaling_uri: String,
    pub context_size: usize,
    pub context_name: String,
    pub send_timeout: Duration,
    pub recv_timeout: Duration,
    pub verify_graph_hash: bool,
    pub log_filter: String,
}

impl Config {
    pub fn builder(peer_uri: impl Into<String>, signaling_uri: impl Into<String>) -> ConfigBuilder {
        ConfigBuilder {
            peer_uri: peer_uri.into(),
            signaling_uri: signaling_uri.into(),
            context_size: 1,
            context_name: "default".to_string(),
            send_timeout_ms: DEFAULT_SEND_TIMEOUT_MS,
            recv_timeout_ms: DEFAULT_RECV_TIMEOUT_MS,
            verify_graph_hash: false,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }

    /// Parses and validates a [`Config`] from a TOML document, matching the
    /// on-disk shape of [`RawConfig`].
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(content)
            .map_err(|err| ConfigError::InvalidUri(format!("malformed config: {err}")))?;

        let mut builder = Config::builder(raw.peer_uri, raw.signaling_uri)
            .context_size(raw.context_size)
            .context_name(raw.context_name);

        if let Some(ms) = raw.send_timeout_ms {
            builder = builder.send_timeout_ms(ms);
        }
        if let Some(ms) = raw.recv_timeout_ms {
            builder = builder.recv_timeout_ms(ms);
        }
        if let Some(v) = raw.verify_graph_hash {
            builder = builder.verify_graph_hash(v);
        }
        if let Some(filter) = raw.log_filter {
            builder = builder.log_filter(filter);
        }

        builder.build()
    }
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    peer_uri: String,
    signaling_uri: String,
    context_size: usize,
    context_name: String,
    send_timeout_ms: Option<u64>,
    recv_timeout_ms: Option<u64>,
    verify_graph_hash: Option<bool>,
    log_filter: Option<String>,
}

/// Builder for [`Config`], validating on [`ConfigBuilder::build`].
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    peer_uri: String,
    signaling_uri: String,
    context_size: usize,
    context_name: String,
    send_timeout_ms: u64,
    recv_timeout_ms: u64,
    verify_graph_hash: bool,
    log_filter: String,
}

impl ConfigBuilder {
    pub fn context_size(mut self, size: usize) -> Self {
        self.context_size = size;
        self
    }

    pub fn context_name(mut self, name: impl Into<String>) -> Self {
        self.context_name = name.into();
        self
    }

    pub fn send_timeout_ms(mut self, ms: u64) -> Self {
        self.send_timeout_ms = ms;
        self
    }

    pub fn recv_timeout_ms(mut self, ms: u64) -> Self {
        self.recv_timeout_ms = ms;
        self
    }

    pub fn verify_graph_hash(mut self, verify: bool) -> Self {
        self.verify_graph_hash = verify;
        self
    }

    pub fn log_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = filter.into();
        self
    }

    pub fn build(self) -> Result<Config, ConfigError> {
        if !self.peer_uri.starts_with("tcp://") {
            return Err(ConfigError::InvalidUri(self.peer_uri));
        }
        if !self.signaling_uri.starts_with("tcp://") {
            return Err(ConfigError::InvalidUri(self.signaling_uri));
        }
        if self.send_timeout_ms == 0 {
            return Err(ConfigError::InvalidTimeout {
                field: "send_timeout_ms",
                millis: self.send_timeout_ms,
            });
        }
        if self.recv_timeout_ms == 0 {
            return Err(ConfigError::InvalidTimeout {
                field: "recv_timeout_ms",
                millis: self.recv_timeout_ms,
            });
        }

        Ok(Config {
            peer_uri: self.peer_uri,
            signaling_uri: self.signaling_uri,
            context_size: self.context_size,
            context_name: self.context_name,
            send_timeout: Duration::from_millis(self.send_timeout_ms),
            recv_timeout: Duration::from_millis(self.recv_timeout_ms),
            verify_graph_hash: self.verify_graph_hash,
            log_filter: self.log_filter,
        })
    }
}

/// Parses a `tcp://host:port` URI into its socket address, as used when
/// binding the pull listener.
pub fn parse_peer_addr(uri: &str) -> Result<std::net::SocketAddr, ConfigError> {
    uri.strip_prefix("tcp://")
        .ok_or_else(|| ConfigError::InvalidUri(uri.to_string()))?
        .parse()
        .map_err(|_| ConfigError::InvalidUri(uri.to_string()))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn rejects_non_tcp_uri() {
        let err = Config::builder("udp://127.0.0.1:9000", "tcp://127.0.0.1:9999").build();
        assert_matches!(err, Err(ConfigError::InvalidUri(_)));
    }

    #[test]
    fn rejects_zero_timeout() {
        let err = Config::builder("tcp://127.0.0.1:9000", "tcp://127.0.0.1:9999")
            .send_timeout_ms(0)
            .build();
        assert_matches!(err, Err(ConfigError::InvalidTimeout { .. }));
    }

    #[test]
    fn builds_with_defaults() {
        let config = Config::builder("tcp://127.0.0.1:9000", "tcp://127.0.0.1:9999")
            .build()
            .unwrap();
        assert_eq!(config.send_timeout, Duration::from_millis(DEFAULT_SEND_TIMEOUT_MS));
        assert_eq!(config.context_size, 1);
    }

    #[test]
    fn parses_toml() {
        let toml = r#"
            peer_uri = "tcp://127.0.0.1:9000"
            signaling_uri = "tcp://127.0.0.1:9999"
            context_size = 4
            context_name = "chain-demo"
            send_timeout_ms = 1000
        "#;
        let config = Config::from_toml_str(toml).unwrap();
        assert_eq!(config.context_size, 4);
        assert_eq!(config.send_timeout, Duration::from_millis(1000));
        assert_eq!(config.recv_timeout, Duration::from_millis(DEFAULT_RECV_TIMEOUT_MS));
    }

    #[test]
    fn parses_peer_addr() {
        let addr = parse_peer_addr("tcp://127.0.0.1:9000").unwrap();
        assert_eq!(addr.port(), 9000);
    }
}
