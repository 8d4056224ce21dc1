//! Builder for [`EphemeralSocket`](crate::EphemeralSocket).
//!
//! Exposes destination selection, batching and idle tuning, timeouts and TLS
//! configuration. Every setting is optional; an empty builder targets
//! `localhost:8125` with one-second batching.

use std::{io, path::PathBuf, time::Duration};

use thiserror::Error;

use crate::socket::{
    EphemeralSocket, SocketConfig, SocketOptions, SocketTransport, TcpTransport, TlsOptions,
    UnixTransport, config::interval_from_millis,
};

/// Errors that may occur while building a client.
#[derive(Debug, Error)]
pub enum BuildError {
    /// Invalid user supplied configuration.
    #[error("invalid socket configuration: {0}")]
    InvalidConfig(String),
    /// The options object could not be parsed.
    #[error("invalid socket options: {0}")]
    Json(#[from] serde_json::Error),
    /// Underlying I/O error whilst starting the client.
    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Clone, Debug)]
enum TransportConfig {
    Tcp { host: String, port: u16 },
    Unix { path: PathBuf },
}

#[derive(Clone, Debug, Default)]
struct TlsConfig {
    domain: Option<String>,
    insecure: bool,
}

macro_rules! ensure_positive {
    ($value:expr, $field:expr) => {{
        if $value == 0 {
            Err(BuildError::InvalidConfig(format!(
                "{} must be greater than zero",
                $field
            )))
        } else {
            Ok($value)
        }
    }};
}

macro_rules! option_setter {
    ($(#[$meta:meta])* $fn_name:ident, $field:ident, $ty:ty) => {
        $(#[$meta])*
        pub fn $fn_name(mut self, value: $ty) -> Self {
            self.$field = Some(value);
            self
        }
    };
}

/// Builder for constructing [`EphemeralSocket`] instances.
#[derive(Clone, Debug, Default)]
pub struct EphemeralSocketBuilder {
    transport: Option<TransportConfig>,
    tls: Option<TlsConfig>,
    debug: bool,
    socket_timeout_ms: Option<i64>,
    max_buffer_size: Option<usize>,
    idle_ticks_limit: Option<u32>,
    close_grace_ms: Option<u64>,
    connect_timeout_ms: Option<u64>,
    write_timeout_ms: Option<u64>,
    capacity: Option<usize>,
}

impl EphemeralSocketBuilder {
    /// Create a builder using the defaults for every setting.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a builder from an options object.
    pub fn from_options(options: &SocketOptions) -> Self {
        let mut builder = match &options.unix_path {
            Some(path) => Self::new().with_unix_path(path.clone()),
            None => Self::new().with_tcp(options.host.clone(), options.port),
        };
        if options.tls {
            builder = builder.with_tls(options.tls_domain.clone(), options.tls_insecure);
        }
        builder
            .with_debug(options.debug)
            .with_socket_timeout_ms(options.socket_timeout)
            .with_max_buffer_size(options.max_buffer_size)
            .with_idle_ticks_limit(options.idle_ticks_limit)
            .with_close_grace_ms(options.close_grace_ms)
            .with_connect_timeout_ms(options.connect_timeout_ms)
            .with_write_timeout_ms(options.write_timeout_ms)
            .with_capacity(options.capacity)
    }

    /// Configure the builder to use TCP.
    pub fn with_tcp(mut self, host: impl Into<String>, port: u16) -> Self {
        self.transport = Some(TransportConfig::Tcp {
            host: host.into(),
            port,
        });
        self
    }

    /// Configure the builder to use a Unix domain socket.
    pub fn with_unix_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.transport = Some(TransportConfig::Unix { path: path.into() });
        self
    }

    /// Configure TLS using the provided domain and validation policy.
    pub fn with_tls(mut self, domain: Option<String>, insecure: bool) -> Self {
        self.tls = Some(TlsConfig { domain, insecure });
        self
    }

    /// Echo every outgoing payload to the `ephemeral_socket::wire` log target.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    option_setter!(
        #[doc = "Set the timer period; zero or negative disables batching."]
        with_socket_timeout_ms,
        socket_timeout_ms,
        i64
    );
    option_setter!(
        #[doc = "Set the eager-flush threshold in bytes; zero disables batching."]
        with_max_buffer_size,
        max_buffer_size,
        usize
    );
    option_setter!(with_idle_ticks_limit, idle_ticks_limit, u32);
    option_setter!(with_close_grace_ms, close_grace_ms, u64);
    option_setter!(with_connect_timeout_ms, connect_timeout_ms, u64);
    option_setter!(with_write_timeout_ms, write_timeout_ms, u64);
    option_setter!(
        #[doc = "Set the bounded command queue capacity."]
        with_capacity,
        capacity,
        usize
    );

    fn validate(&self) -> Result<(), BuildError> {
        self.validate_transport()?;
        if let Some(capacity) = self.capacity {
            ensure_positive!(capacity, "capacity")?;
        }
        if let Some(limit) = self.idle_ticks_limit {
            ensure_positive!(limit, "idle_ticks_limit")?;
        }
        if let Some(timeout) = self.connect_timeout_ms {
            ensure_positive!(timeout, "connect_timeout_ms")?;
        }
        if let Some(timeout) = self.write_timeout_ms {
            ensure_positive!(timeout, "write_timeout_ms")?;
        }
        Ok(())
    }

    fn validate_transport(&self) -> Result<(), BuildError> {
        match &self.transport {
            Some(TransportConfig::Unix { .. }) if self.tls.is_some() => Err(
                BuildError::InvalidConfig("tls is only supported for tcp transports".into()),
            ),
            Some(TransportConfig::Tcp { host, .. }) if host.trim().is_empty() => Err(
                BuildError::InvalidConfig("tcp host must not be empty".into()),
            ),
            _ => Ok(()),
        }
    }

    /// Validate the settings and produce the runtime configuration.
    pub fn build_config(&self) -> Result<SocketConfig, BuildError> {
        self.validate()?;
        let mut config = SocketConfig::default();
        self.apply_optional_fields(&mut config);
        if let Some(transport) = &self.transport {
            config.transport = self.build_transport_config(transport);
        } else if self.tls.is_some() {
            config.transport = self.build_transport_config(&TransportConfig::Tcp {
                host: crate::socket::config::DEFAULT_HOST.into(),
                port: crate::socket::config::DEFAULT_PORT,
            });
        }
        Ok(config)
    }

    /// Validate the settings and start the client.
    pub fn build(&self) -> Result<EphemeralSocket, BuildError> {
        EphemeralSocket::with_config(&self.build_config()?)
    }

    fn apply_optional_fields(&self, config: &mut SocketConfig) {
        config.debug = self.debug;
        if let Some(ms) = self.socket_timeout_ms {
            config.flush_interval = interval_from_millis(ms);
        }
        if let Some(size) = self.max_buffer_size {
            config.max_buffer_bytes = size;
        }
        if let Some(limit) = self.idle_ticks_limit {
            config.idle_ticks_limit = limit;
        }
        if let Some(grace) = self.close_grace_ms {
            config.close_grace = Duration::from_millis(grace);
        }
        if let Some(timeout) = self.connect_timeout_ms {
            config.connect_timeout = Duration::from_millis(timeout);
        }
        if let Some(timeout) = self.write_timeout_ms {
            config.write_timeout = Duration::from_millis(timeout);
        }
        if let Some(capacity) = self.capacity {
            config.capacity = capacity;
        }
    }

    fn build_transport_config(&self, transport: &TransportConfig) -> SocketTransport {
        match transport {
            TransportConfig::Tcp { host, port } => SocketTransport::Tcp(TcpTransport {
                host: host.clone(),
                port: *port,
                tls: self.build_tls_options(host),
            }),
            TransportConfig::Unix { path } => {
                SocketTransport::Unix(UnixTransport { path: path.clone() })
            }
        }
    }

    fn build_tls_options(&self, host: &str) -> Option<TlsOptions> {
        self.tls.as_ref().map(|tls_cfg| {
            let domain = tls_cfg
                .domain
                .clone()
                .filter(|d| !d.trim().is_empty())
                .unwrap_or_else(|| host.to_owned());
            TlsOptions {
                domain,
                insecure_skip_verify: tls_cfg.insecure,
            }
        })
    }
}
