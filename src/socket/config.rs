//! Configuration consumed by the socket client lifecycle.
//!
//! [`SocketOptions`] mirrors the loosely typed options object callers hand to
//! the client (every field optional, camelCase keys). The
//! [`EphemeralSocketBuilder`](crate::EphemeralSocketBuilder) validates those
//! options and produces a [`SocketConfig`] for runtime use.

use std::{path::PathBuf, time::Duration};

use serde::Deserialize;

use crate::{builder::BuildError, rate_limited_warner::DEFAULT_WARN_INTERVAL};

use super::transport::{SocketTransport, TcpTransport};

/// Default destination host.
pub const DEFAULT_HOST: &str = "localhost";
/// Default destination port (the statsd port).
pub const DEFAULT_PORT: u16 = 8125;
/// Default timer period in milliseconds.
pub const DEFAULT_SOCKET_TIMEOUT_MS: i64 = 1000;
/// Default byte threshold that forces an eager flush.
pub const DEFAULT_MAX_BUFFER_SIZE: usize = 1200;
/// Consecutive idle intervals tolerated before the connection is closed.
pub const DEFAULT_IDLE_TICKS_LIMIT: u32 = 10;
/// Delay between `close()` and the forced termination of the connection.
pub const DEFAULT_CLOSE_GRACE: Duration = Duration::from_millis(10);
/// Default connection timeout applied when establishing sockets.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default write timeout applied to socket writes.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(1);
/// Default bounded channel capacity used by the client worker.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Options object accepted by the client.
///
/// Unknown keys are rejected so that typos surface at construction time
/// rather than silently falling back to defaults.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct SocketOptions {
    pub host: String,
    pub port: u16,
    pub debug: bool,
    /// Timer period in milliseconds; zero or negative disables batching.
    pub socket_timeout: i64,
    /// Eager-flush threshold in bytes; zero disables batching.
    pub max_buffer_size: usize,
    pub idle_ticks_limit: u32,
    pub close_grace_ms: u64,
    pub connect_timeout_ms: u64,
    pub write_timeout_ms: u64,
    pub capacity: usize,
    pub unix_path: Option<PathBuf>,
    pub tls: bool,
    pub tls_domain: Option<String>,
    pub tls_insecure: bool,
}

impl Default for SocketOptions {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.into(),
            port: DEFAULT_PORT,
            debug: false,
            socket_timeout: DEFAULT_SOCKET_TIMEOUT_MS,
            max_buffer_size: DEFAULT_MAX_BUFFER_SIZE,
            idle_ticks_limit: DEFAULT_IDLE_TICKS_LIMIT,
            close_grace_ms: duration_ms(DEFAULT_CLOSE_GRACE),
            connect_timeout_ms: duration_ms(DEFAULT_CONNECT_TIMEOUT),
            write_timeout_ms: duration_ms(DEFAULT_WRITE_TIMEOUT),
            capacity: DEFAULT_CHANNEL_CAPACITY,
            unix_path: None,
            tls: false,
            tls_domain: None,
            tls_insecure: false,
        }
    }
}

impl SocketOptions {
    /// Parse an options object from JSON. Missing keys take their defaults.
    pub fn from_json(json: &str) -> Result<Self, BuildError> {
        Ok(serde_json::from_str(json)?)
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Convert the signed timer period into an optional interval.
pub(crate) fn interval_from_millis(ms: i64) -> Option<Duration> {
    u64::try_from(ms)
        .ok()
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis)
}

/// Validated runtime configuration for an [`EphemeralSocket`](super::EphemeralSocket).
#[derive(Clone, Debug)]
pub struct SocketConfig {
    pub transport: SocketTransport,
    pub debug: bool,
    /// Recurring timer period. `None` disables batching and idle teardown.
    pub flush_interval: Option<Duration>,
    pub max_buffer_bytes: usize,
    pub idle_ticks_limit: u32,
    pub close_grace: Duration,
    pub connect_timeout: Duration,
    pub write_timeout: Duration,
    pub capacity: usize,
    pub warn_interval: Duration,
}

/// Defaults match an options object with no keys set.
impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            transport: SocketTransport::Tcp(TcpTransport {
                host: DEFAULT_HOST.into(),
                port: DEFAULT_PORT,
                tls: None,
            }),
            debug: false,
            flush_interval: interval_from_millis(DEFAULT_SOCKET_TIMEOUT_MS),
            max_buffer_bytes: DEFAULT_MAX_BUFFER_SIZE,
            idle_ticks_limit: DEFAULT_IDLE_TICKS_LIMIT,
            close_grace: DEFAULT_CLOSE_GRACE,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            capacity: DEFAULT_CHANNEL_CAPACITY,
            warn_interval: DEFAULT_WARN_INTERVAL,
        }
    }
}

impl SocketConfig {
    /// Override the transport configuration.
    pub fn with_transport(mut self, transport: SocketTransport) -> Self {
        self.transport = transport;
        self
    }

    /// Whether messages are buffered at all. Without a positive timer period
    /// or a non-zero threshold, every message is transmitted on its own.
    pub fn batching_enabled(&self) -> bool {
        self.flush_interval.is_some() && self.max_buffer_bytes > 0
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(1000, Some(Duration::from_millis(1000)))]
    #[case(1, Some(Duration::from_millis(1)))]
    #[case(0, None)]
    #[case(-5, None)]
    fn socket_timeout_maps_to_interval(#[case] ms: i64, #[case] expected: Option<Duration>) {
        assert_eq!(interval_from_millis(ms), expected);
    }

    #[rstest]
    fn empty_json_yields_defaults() {
        let options = SocketOptions::from_json("{}").expect("parse empty object");
        assert_eq!(options, SocketOptions::default());
        assert_eq!(options.host, "localhost");
        assert_eq!(options.port, 8125);
        assert_eq!(options.socket_timeout, 1000);
        assert_eq!(options.max_buffer_size, 1200);
    }

    #[rstest]
    fn json_uses_camel_case_keys() {
        let options = SocketOptions::from_json(
            r#"{"host":"metrics.local","port":9125,"debug":true,"socketTimeout":-1,"maxBufferSize":0}"#,
        )
        .expect("parse options");
        assert_eq!(options.host, "metrics.local");
        assert_eq!(options.port, 9125);
        assert!(options.debug);
        assert_eq!(options.socket_timeout, -1);
        assert_eq!(options.max_buffer_size, 0);
    }

    #[rstest]
    fn json_rejects_unknown_keys() {
        let err = SocketOptions::from_json(r#"{"maxBuferSize":10}"#).expect_err("typo must fail");
        assert!(matches!(err, BuildError::Json(_)));
    }

    #[rstest]
    #[case(Some(Duration::from_secs(1)), 1200, true)]
    #[case(None, 1200, false)]
    #[case(Some(Duration::from_secs(1)), 0, false)]
    fn batching_requires_interval_and_threshold(
        #[case] interval: Option<Duration>,
        #[case] max_bytes: usize,
        #[case] expected: bool,
    ) {
        let config = SocketConfig {
            flush_interval: interval,
            max_buffer_bytes: max_bytes,
            ..SocketConfig::default()
        };
        assert_eq!(config.batching_enabled(), expected);
    }
}
