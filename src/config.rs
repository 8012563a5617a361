//! Client configuration and events endpoint derivation.

use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use url::Url;

use crate::core::{DEFAULT_RECONNECT_DELAY, WebSocketBufferConfig};
use crate::protocol::ClassifiedMessage;

/// Path of the events channel, appended to the device base address.
pub const EVENTS_PATH: &str = "/api/v2/events";

/// Upper bound for a single connect handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// How long `start()` waits for the socket to become active.
pub const DEFAULT_AWAIT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Construction-time configuration failures. These are the only fatal errors of the client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("the base address {0:?} must not end with a trailing \"/\"")]
    TrailingSeparator(String),

    #[error("invalid base address {address:?}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("unsupported scheme {scheme:?} in base address {address:?}")]
    UnsupportedScheme { address: String, scheme: String },

    #[error("base address {address:?} must not carry a {component}")]
    UnexpectedComponent {
        address: String,
        component: &'static str,
    },
}

/// Derive the events socket URI from the device base address.
///
/// `http` becomes `ws` and `https` becomes `wss` (`ws`/`wss` are accepted as-is), then
/// [`EVENTS_PATH`] is appended to whatever path the base address carries. A base address that
/// already points at the events path is returned with the scheme rewritten only.
pub fn events_url(base_address: &str) -> Result<String, ConfigError> {
    if base_address.ends_with('/') {
        return Err(ConfigError::TrailingSeparator(base_address.to_string()));
    }

    let mut url = Url::parse(base_address).map_err(|err| ConfigError::InvalidAddress {
        address: base_address.to_string(),
        reason: err.to_string(),
    })?;

    let ws_scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(ConfigError::UnsupportedScheme {
                address: base_address.to_string(),
                scheme: other.to_string(),
            });
        }
    };
    if url.host_str().is_none_or(str::is_empty) {
        return Err(ConfigError::InvalidAddress {
            address: base_address.to_string(),
            reason: "missing host".to_string(),
        });
    }
    if url.query().is_some() {
        return Err(ConfigError::UnexpectedComponent {
            address: base_address.to_string(),
            component: "query",
        });
    }
    if url.fragment().is_some() {
        return Err(ConfigError::UnexpectedComponent {
            address: base_address.to_string(),
            component: "fragment",
        });
    }

    url.set_scheme(ws_scheme)
        .map_err(|()| ConfigError::InvalidAddress {
            address: base_address.to_string(),
            reason: format!("cannot switch scheme to {ws_scheme}"),
        })?;

    let path = match url.path() {
        "/" | "" => EVENTS_PATH.to_string(),
        existing if existing.ends_with(EVENTS_PATH) => existing.to_string(),
        existing => format!("{existing}{EVENTS_PATH}"),
    };
    url.set_path(&path);
    Ok(url.to_string())
}

/// Configuration for [`crate::RenosClient`].
#[derive(Clone, Debug)]
pub struct RenosClientConfig {
    /// Device base address, e.g. `http://device.local:8081`. No trailing `/`.
    pub base_url: String,
    /// Authentication token sent after every successful connect. Empty means "no auth".
    pub token: Option<String>,
    pub reconnect_delay: Duration,
    pub connect_timeout: Duration,
    pub await_connect_timeout: Duration,
    pub ws_buffers: WebSocketBufferConfig,
    /// Optional application channel receiving every classified inbound message.
    pub message_sink: Option<mpsc::UnboundedSender<ClassifiedMessage>>,
}

impl RenosClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: None,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            await_connect_timeout: DEFAULT_AWAIT_CONNECT_TIMEOUT,
            ws_buffers: WebSocketBufferConfig::default(),
            message_sink: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_await_connect_timeout(mut self, timeout: Duration) -> Self {
        self.await_connect_timeout = timeout;
        self
    }

    pub fn with_ws_buffers(mut self, buffers: WebSocketBufferConfig) -> Self {
        self.ws_buffers = buffers;
        self
    }

    pub fn with_message_sink(mut self, sink: mpsc::UnboundedSender<ClassifiedMessage>) -> Self {
        self.message_sink = Some(sink);
        self
    }

    /// Validated events socket URI for this configuration.
    pub fn events_url(&self) -> Result<String, ConfigError> {
        events_url(&self.base_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_base_maps_to_ws_events_endpoint() {
        assert_eq!(
            events_url("http://device.local:8081").unwrap(),
            "ws://device.local:8081/api/v2/events"
        );
    }

    #[test]
    fn https_base_maps_to_wss() {
        assert_eq!(
            events_url("https://10.0.0.7").unwrap(),
            "wss://10.0.0.7/api/v2/events"
        );
    }

    #[test]
    fn existing_path_is_preserved_before_the_suffix() {
        assert_eq!(
            events_url("http://gateway:9000/renos").unwrap(),
            "ws://gateway:9000/renos/api/v2/events"
        );
    }

    #[test]
    fn suffix_appears_exactly_once() {
        for base in [
            "http://device.local:8081",
            "ws://device.local",
            "https://device.local:443",
            "http://device.local:8081/api/v2/events",
        ] {
            let url = events_url(base).unwrap();
            assert_eq!(url.matches(EVENTS_PATH).count(), 1, "{url}");
            assert!(url.starts_with("ws://") || url.starts_with("wss://"), "{url}");
        }
    }

    #[test]
    fn trailing_separator_is_rejected() {
        assert_eq!(
            events_url("http://device.local:8081/"),
            Err(ConfigError::TrailingSeparator(
                "http://device.local:8081/".to_string()
            ))
        );
    }

    #[test]
    fn unsupported_scheme_is_rejected() {
        assert!(matches!(
            events_url("ftp://device.local"),
            Err(ConfigError::UnsupportedScheme { .. })
        ));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(matches!(
            events_url("device.local:8081"),
            Err(ConfigError::UnsupportedScheme { .. } | ConfigError::InvalidAddress { .. })
        ));
        assert!(matches!(
            events_url("not a url"),
            Err(ConfigError::InvalidAddress { .. })
        ));
    }

    #[test]
    fn query_is_rejected() {
        assert!(matches!(
            events_url("http://device.local?x=1"),
            Err(ConfigError::UnexpectedComponent {
                component: "query",
                ..
            })
        ));
    }

    #[test]
    fn config_defaults_match_the_protocol_timings() {
        let cfg = RenosClientConfig::new("http://device.local:8081");
        assert_eq!(cfg.reconnect_delay, Duration::from_secs(5));
        assert_eq!(cfg.await_connect_timeout, Duration::from_secs(10));
        assert!(cfg.token.is_none());
        assert_eq!(
            cfg.events_url().unwrap(),
            "ws://device.local:8081/api/v2/events"
        );
    }
}
