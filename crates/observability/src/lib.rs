//! Tracing/logging setup shared by the service binary and tests.

use serde::Deserialize;

/// Subscriber construction (filters, output format).
pub mod subscriber;

/// Output encoding for log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per line.
    #[default]
    Json,
    /// Human-readable, for local development.
    Pretty,
}

/// Initialize process-wide observability (tracing/logging).
///
/// `filter` is an `EnvFilter` directive string used when `RUST_LOG` is unset.
/// Safe to call multiple times; subsequent calls become no-ops.
pub fn init(filter: &str, format: LogFormat) {
    subscriber::init(filter, format);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_format_parses_lowercase_names() {
        let json: LogFormat = serde_json::from_str("\"json\"").unwrap();
        let pretty: LogFormat = serde_json::from_str("\"pretty\"").unwrap();
        assert_eq!(json, LogFormat::Json);
        assert_eq!(pretty, LogFormat::Pretty);
        assert!(serde_json::from_str::<LogFormat>("\"xml\"").is_err());
    }

    #[test]
    fn init_twice_is_harmless() {
        init("debug", LogFormat::Pretty);
        init("info", LogFormat::Json);
        tracing::info!("still logging");
    }
}
