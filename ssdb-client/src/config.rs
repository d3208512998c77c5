//! # Client Configuration
//!
//! Everything is fixed when the pool is opened; there is no runtime
//! reconfiguration. The struct deserializes with serde so it can live in an
//! application config file, with durations given in milliseconds:
//!
//! ```text
//! { "host": "10.0.0.5", "port": 8888, "password": "secret",
//!   "pool_size": 32, "read_timeout_ms": 500 }
//! ```

use std::time::Duration;

use serde::{Deserialize, Deserializer};

/// Configuration for the client and its connection pool.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Server host name or IP address.
    pub host: String,
    /// Server TCP port.
    pub port: u16,
    /// Password sent with `auth` after every dial; `None` or empty skips it.
    pub password: Option<String>,
    /// Maximum number of connections the pool may hold (clamped to >= 1).
    pub pool_size: usize,
    /// Optional TCP connect timeout. Zero means no timeout, as for the
    /// read and write deadlines.
    #[serde(rename = "connect_timeout_ms", deserialize_with = "millis")]
    pub connect_timeout: Option<Duration>,
    /// Optional socket read deadline; hitting it breaks the connection.
    #[serde(rename = "read_timeout_ms", deserialize_with = "millis")]
    pub read_timeout: Option<Duration>,
    /// Optional socket write deadline; hitting it breaks the connection.
    #[serde(rename = "write_timeout_ms", deserialize_with = "millis")]
    pub write_timeout: Option<Duration>,
    /// Emit a `trace!` event for every frame sent and received.
    pub trace_frames: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            host: "127.0.0.1".to_string(),
            port: 8888,
            password: None,
            pool_size: 8,
            connect_timeout: None,
            read_timeout: None,
            write_timeout: None,
            trace_frames: false,
        }
    }
}

impl ClientConfig {
    /// Config for `host:port` with every other field defaulted.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        ClientConfig {
            host: host.into(),
            port,
            ..ClientConfig::default()
        }
    }

    /// `host:port`, as used for dialing and in log fields.
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Password to authenticate with, if one is configured and non-empty.
    pub fn auth_password(&self) -> Option<&str> {
        self.password.as_deref().filter(|p| !p.is_empty())
    }
}

/// Socket deadline for `timeout`; the OS rejects a zero duration, so zero
/// is treated as no deadline.
pub(crate) fn deadline(timeout: Option<Duration>) -> Option<Duration> {
    timeout.filter(|d| !d.is_zero())
}

fn millis<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(deadline(
        Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis),
    ))
}
