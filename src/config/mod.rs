//! Client Configuration
//!
//! Typed configuration for a [`Client`](crate::client::Client): endpoint,
//! protocol version, credentials, last-will message, TLS material, and the
//! timeout/retry governors. Hosts can come from an explicit value, a
//! `mqtt://`/`mqtts://` connection URI, or the `MQTT_SERVER` environment
//! variable (read once, at construction).

use std::path::PathBuf;
use std::time::Duration;

use bytes::Bytes;
use serde::Deserialize;

use crate::protocol::{ProtocolVersion, QoS, Will};

#[cfg(test)]
mod tests;

/// Default port for plain MQTT
pub const DEFAULT_PORT: u16 = 1883;
/// Default port for MQTT over TLS
pub const DEFAULT_TLS_PORT: u16 = 8883;

/// Environment variable consulted by [`ClientConfig::from_env`]
pub const SERVER_ENV_VAR: &str = "MQTT_SERVER";

/// Configuration error types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// URI scheme other than mqtt/mqtts
    UnsupportedScheme(String),
    /// URI could not be parsed
    InvalidUri(String),
    /// No host configured
    MissingHost,
    /// Persistent sessions need a stable client identifier
    MissingClientId,
    /// The MQTT_SERVER environment variable is not set
    EnvironmentNotSet,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::UnsupportedScheme(s) => write!(f, "unsupported URI scheme: {}", s),
            ConfigError::InvalidUri(msg) => write!(f, "invalid URI: {}", msg),
            ConfigError::MissingHost => write!(f, "no host configured"),
            ConfigError::MissingClientId => {
                write!(f, "a client id is required when clean_session is false")
            }
            ConfigError::EnvironmentNotSet => {
                write!(f, "{} environment variable is not set", SERVER_ENV_VAR)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// TLS mode for the connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TlsMode {
    /// Plain TCP
    #[default]
    Disabled,
    /// TLS, version negotiated
    Enabled,
    /// TLS restricted to TLS 1.2
    Tls12,
    /// TLS restricted to TLS 1.3
    Tls13,
}

impl TlsMode {
    /// Check if this mode uses TLS
    pub fn uses_tls(&self) -> bool {
        !matches!(self, TlsMode::Disabled)
    }
}

/// Configuration for a single client connection
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    /// Broker host name or address
    pub host: Option<String>,

    /// Broker port; defaults to 1883, or 8883 when TLS is enabled
    pub port: Option<u16>,

    /// Protocol version ("3.1.0" or "3.1.1")
    pub version: ProtocolVersion,

    /// TLS mode
    #[serde(alias = "ssl")]
    pub tls: TlsMode,

    /// Keep-alive interval in seconds (0 disables pings)
    pub keep_alive: u16,

    /// Clean session flag
    pub clean_session: bool,

    /// Client identifier; autogenerated for 3.1.0 when empty
    pub client_id: Option<String>,

    /// Seconds to wait for an acknowledgement before retransmitting
    pub ack_timeout: f64,

    /// Retransmissions allowed per pending acknowledgement
    pub resend_limit: u32,

    /// Reconnection attempts before giving up (0 disables reconnection)
    pub reconnect_limit: u32,

    /// Base of the exponential reconnect backoff, in seconds
    pub reconnect_backoff: f64,

    /// Username for authentication
    pub username: Option<String>,

    /// Password for authentication
    pub password: Option<String>,

    /// Last-will topic
    pub will_topic: Option<String>,

    /// Last-will payload
    pub will_payload: Option<Bytes>,

    /// Last-will QoS
    pub will_qos: QoS,

    /// Last-will retain flag
    pub will_retain: bool,

    /// Path to the client certificate chain (PEM)
    pub cert_file: Option<PathBuf>,

    /// Path to the client private key (PEM)
    pub key_file: Option<PathBuf>,

    /// Path to the CA certificate file (PEM); system roots when absent
    pub ca_file: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: None,
            version: ProtocolVersion::default(),
            tls: TlsMode::default(),
            keep_alive: 15,
            clean_session: true,
            client_id: None,
            ack_timeout: 5.0,
            resend_limit: 5,
            reconnect_limit: 5,
            reconnect_backoff: 5.0,
            username: None,
            password: None,
            will_topic: None,
            will_payload: None,
            will_qos: QoS::AtMostOnce,
            will_retain: false,
            cert_file: None,
            key_file: None,
            ca_file: None,
        }
    }
}

impl ClientConfig {
    /// Configuration for the given host with everything else defaulted
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: Some(host.into()),
            ..Default::default()
        }
    }

    /// Parse a `mqtt://[user[:pass]@]host[:port]` or `mqtts://…` URI
    pub fn from_uri(uri: &str) -> Result<Self, ConfigError> {
        let (scheme, rest) = uri
            .split_once("://")
            .ok_or_else(|| ConfigError::InvalidUri(format!("missing scheme: {}", uri)))?;

        let tls = match scheme {
            "mqtt" => TlsMode::Disabled,
            "mqtts" => TlsMode::Enabled,
            other => return Err(ConfigError::UnsupportedScheme(other.to_string())),
        };

        let rest = rest.trim_end_matches('/');

        let (userinfo, authority) = match rest.rsplit_once('@') {
            Some((userinfo, authority)) => (Some(userinfo), authority),
            None => (None, rest),
        };

        let (username, password) = match userinfo {
            Some(info) => match info.split_once(':') {
                Some((user, pass)) => {
                    (Some(percent_decode(user)?), Some(percent_decode(pass)?))
                }
                None => (Some(percent_decode(info)?), None),
            },
            None => (None, None),
        };

        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port_str)) => {
                let port = port_str
                    .parse::<u16>()
                    .map_err(|_| ConfigError::InvalidUri(format!("bad port: {}", port_str)))?;
                (host, Some(port))
            }
            None => (authority, None),
        };

        if host.is_empty() {
            return Err(ConfigError::InvalidUri("empty host".to_string()));
        }

        Ok(Self {
            host: Some(host.to_string()),
            port,
            tls,
            username,
            password,
            ..Default::default()
        })
    }

    /// Build a configuration from the `MQTT_SERVER` environment variable
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var(SERVER_ENV_VAR) {
            Ok(uri) => Self::from_uri(&uri),
            Err(_) => Err(ConfigError::EnvironmentNotSet),
        }
    }

    /// Set the protocol version
    pub fn with_version(mut self, version: ProtocolVersion) -> Self {
        self.version = version;
        self
    }

    /// Set the client identifier
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Set username and password
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Set the last-will message
    pub fn with_will(
        mut self,
        topic: impl Into<String>,
        payload: impl Into<Bytes>,
        qos: QoS,
        retain: bool,
    ) -> Self {
        self.will_topic = Some(topic.into());
        self.will_payload = Some(payload.into());
        self.will_qos = qos;
        self.will_retain = retain;
        self
    }

    /// Port to connect to, accounting for the TLS default
    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or(if self.tls.uses_tls() {
            DEFAULT_TLS_PORT
        } else {
            DEFAULT_PORT
        })
    }

    /// Get the ack timeout as Duration
    pub fn ack_timeout_duration(&self) -> Duration {
        Duration::from_secs_f64(self.ack_timeout.max(0.0))
    }

    /// Backoff before the next reconnect attempt, `backoff ** attempt`
    pub fn reconnect_backoff_duration(&self, attempt: u32) -> Duration {
        Duration::from_secs_f64(self.reconnect_backoff.max(0.0).powi(attempt as i32))
    }

    /// Will message for the CONNECT packet, when fully configured
    pub fn will(&self) -> Option<Will> {
        let topic = self.will_topic.clone()?;
        Some(Will {
            topic,
            payload: self.will_payload.clone().unwrap_or_default(),
            qos: self.will_qos,
            retain: self.will_retain,
        })
    }
}

/// Decode %XX escapes in a URI component
fn percent_decode(s: &str) -> Result<String, ConfigError> {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = s
                .get(i + 1..i + 3)
                .ok_or_else(|| ConfigError::InvalidUri(format!("truncated escape in {}", s)))?;
            let value = u8::from_str_radix(hex, 16)
                .map_err(|_| ConfigError::InvalidUri(format!("bad escape in {}", s)))?;
            out.push(value);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).map_err(|_| ConfigError::InvalidUri(format!("bad escape in {}", s)))
}
