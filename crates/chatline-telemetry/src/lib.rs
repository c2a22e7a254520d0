mod log_sink;

pub use log_sink::{LogQuery, LogRecord, SqliteLogLayer, SqliteLogSink};

use std::path::PathBuf;
use std::sync::Arc;

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Configuration for logging.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Default log level. `RUST_LOG` wins when set.
    pub log_level: Level,
    /// Per-module overrides, e.g. `("chatline_llm", DEBUG)`.
    pub module_levels: Vec<(String, Level)>,
    /// JSON lines instead of the human-readable format.
    pub json: bool,
    /// Persist warn+ events to SQLite.
    pub log_to_sqlite: bool,
    pub log_db_path: PathBuf,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Level::INFO,
            module_levels: Vec::new(),
            json: false,
            log_to_sqlite: true,
            log_db_path: data_dir().join("logs.db"),
        }
    }
}

impl TelemetryConfig {
    fn filter_directive(&self) -> String {
        let mut directive = self.log_level.to_string().to_lowercase();
        for (module, level) in &self.module_levels {
            directive.push_str(&format!(",{}={}", module, level.to_string().to_lowercase()));
        }
        directive
    }
}

/// Keeps the log sink alive for the lifetime of the process.
pub struct TelemetryGuard {
    log_sink: Option<Arc<SqliteLogSink>>,
}

impl TelemetryGuard {
    /// Persisted warn+ logs, if SQLite logging is enabled.
    pub fn logs(&self) -> Option<&SqliteLogSink> {
        self.log_sink.as_deref()
    }
}

/// Install the global subscriber. Call once at startup; later calls keep the
/// first subscriber.
pub fn init_telemetry(config: TelemetryConfig) -> TelemetryGuard {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.filter_directive()));

    // Logs go to stderr so the interactive client keeps stdout for the chat.
    let fmt_layer: Box<dyn Layer<Registry> + Send + Sync> = if config.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_span_list(true)
            .with_writer(std::io::stderr)
            .with_filter(env_filter)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_writer(std::io::stderr)
            .with_filter(env_filter)
            .boxed()
    };

    let (sqlite_layer, log_sink) = if config.log_to_sqlite {
        match SqliteLogSink::new(&config.log_db_path) {
            Ok(sink) => {
                let sink = Arc::new(sink);
                (Some(SqliteLogLayer::new(sink.clone())), Some(sink))
            }
            Err(e) => {
                eprintln!("chatline-telemetry: failed to open log DB: {e}");
                (None, None)
            }
        }
    } else {
        (None, None)
    };

    let _ = tracing_subscriber::registry()
        .with(fmt_layer)
        .with(sqlite_layer)
        .try_init();

    TelemetryGuard { log_sink }
}

/// `$HOME/.chatline`, or `/tmp/.chatline` without a home directory.
pub fn data_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
        .join(".chatline")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_directive_includes_module_overrides() {
        let config = TelemetryConfig {
            log_level: Level::WARN,
            module_levels: vec![("chatline_llm".into(), Level::DEBUG)],
            ..Default::default()
        };
        assert_eq!(config.filter_directive(), "warn,chatline_llm=debug");
    }

    #[test]
    fn default_paths_live_under_data_dir() {
        let config = TelemetryConfig::default();
        assert!(config.log_db_path.starts_with(data_dir()));
        assert!(config.log_to_sqlite);
    }

    #[test]
    fn init_without_sqlite_has_no_log_sink() {
        let guard = init_telemetry(TelemetryConfig {
            log_to_sqlite: false,
            ..Default::default()
        });
        assert!(guard.logs().is_none());
    }
}
