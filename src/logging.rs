//! Logging setup for the `pmtrace` binary and embedding applications.
//!
//! Logs go to stderr so that JSON written to stdout by the CLI stays
//! machine-readable. `RUST_LOG` takes precedence over the configured level.

use tracing_subscriber::{fmt, EnvFilter};

/// Log level configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    /// Disable logging entirely
    Off,
}

impl LogLevel {
    fn as_directive(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Off => "off",
        }
    }
}

impl From<u8> for LogLevel {
    /// 0 = Info, 1 = Debug, 2+ = Trace
    fn from(verbosity: u8) -> Self {
        match verbosity {
            0 => LogLevel::Info,
            1 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }
}

/// Configuration for the tracing subscriber.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub with_timestamps: bool,
    /// Include the module path of each event
    pub with_target: bool,
    /// Also log HTTP requests handled by the diagnostics server
    pub with_http_requests: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            with_timestamps: true,
            with_target: true,
            with_http_requests: false,
        }
    }
}

impl LoggingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_timestamps(mut self, enabled: bool) -> Self {
        self.with_timestamps = enabled;
        self
    }

    pub fn with_target(mut self, enabled: bool) -> Self {
        self.with_target = enabled;
        self
    }

    pub fn with_http_requests(mut self, enabled: bool) -> Self {
        self.with_http_requests = enabled;
        self
    }

    /// Create a configuration from verbosity level (0 = info, 1 = debug, 2+ = trace).
    pub fn from_verbosity(verbosity: u8) -> Self {
        Self::default()
            .with_level(LogLevel::from(verbosity))
            .with_http_requests(verbosity >= 1)
    }

    /// Build the filter directive used when `RUST_LOG` is unset.
    pub fn filter_directive(&self) -> String {
        let level = self.level.as_directive();
        let http = if self.with_http_requests && self.level != LogLevel::Off {
            "debug"
        } else {
            "off"
        };
        format!("{level},tower_http={http},hyper=warn,reqwest=warn")
    }
}

/// Initialize the global subscriber.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_logging(config: LoggingConfig) {
    let env_filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new(config.filter_directive())
    };

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(config.with_target);

    let result = if config.with_timestamps {
        subscriber.try_init()
    } else {
        subscriber.without_time().try_init()
    };

    if let Err(err) = result {
        tracing::debug!("Logging already initialized: {}", err);
    }
}
