//! Tracing subscriber setup shared by the Director binaries.

use std::{env, io, path::PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::writer::{BoxMakeWriter, MakeWriterExt},
    prelude::*,
    registry, EnvFilter,
};

const DEFAULT_LOG_FILE: &str = "/tmp/director.log";

/// Noisy dependencies are capped at `warn` unless `RUST_LOG` says otherwise.
const QUIET_DIRECTIVES: &str = "tokio=warn,hyper=warn,sqlx=warn,tower_http=info";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Human,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutput {
    Console,
    File,
    Both,
}

impl LogOutput {
    fn console(&self) -> bool {
        matches!(self, LogOutput::Console | LogOutput::Both)
    }

    fn file(&self) -> bool {
        matches!(self, LogOutput::File | LogOutput::Both)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub level: String,
    pub format: LogFormat,
    pub output: LogOutput,
    pub file_path: PathBuf,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Human,
            output: LogOutput::Console,
            file_path: PathBuf::from(DEFAULT_LOG_FILE),
        }
    }
}

impl LogSettings {
    /// Reads `LOG_LEVEL`, `LOG_FORMAT`, `LOG_OUTPUT` and `LOG_FILE_PATH`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Unknown values fall back to the defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let format = match lookup("LOG_FORMAT").as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Human,
        };
        let output = match lookup("LOG_OUTPUT").as_deref() {
            Some("file") => LogOutput::File,
            Some("both") => LogOutput::Both,
            _ => LogOutput::Console,
        };

        Self {
            level: lookup("LOG_LEVEL")
                .filter(|l| !l.trim().is_empty())
                .unwrap_or(defaults.level),
            format,
            output,
            file_path: lookup("LOG_FILE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.file_path),
        }
    }

    fn filter_directives(&self) -> String {
        format!("{},{}", self.level, QUIET_DIRECTIVES)
    }
}

/// Initializes the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `LOG_LEVEL`. The returned guard must be
/// held for the lifetime of the process when logging to a file.
pub fn init_subscriber(settings: &LogSettings) -> Option<WorkerGuard> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.filter_directives()));

    let mut guard = None;
    let file_writer = if settings.output.file() {
        let dir = settings
            .file_path
            .parent()
            .map(PathBuf::from)
            .unwrap_or_else(env::temp_dir);
        let file_name = settings
            .file_path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "director.log".into());
        let appender = tracing_appender::rolling::daily(dir, file_name);
        let (non_blocking, worker_guard) = tracing_appender::non_blocking(appender);
        guard = Some(worker_guard);
        Some(non_blocking)
    } else {
        None
    };

    let writer = match (settings.output.console(), file_writer) {
        (true, Some(file)) => BoxMakeWriter::new(io::stdout.and(file)),
        (false, Some(file)) => BoxMakeWriter::new(file),
        (_, None) => BoxMakeWriter::new(io::stdout),
    };

    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(writer);
    let subscriber = registry().with(env_filter);
    match settings.format {
        LogFormat::Json => subscriber.with(fmt_layer.json()).init(),
        LogFormat::Human => subscriber.with(fmt_layer.pretty()).init(),
    }

    guard
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> LogSettings {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        LogSettings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        assert_eq!(settings(&[]), LogSettings::default());
    }

    #[test]
    fn test_json_file_output() {
        let s = settings(&[
            ("LOG_LEVEL", "debug"),
            ("LOG_FORMAT", "json"),
            ("LOG_OUTPUT", "both"),
            ("LOG_FILE_PATH", "/var/log/director/api.log"),
        ]);

        assert_eq!(s.level, "debug");
        assert_eq!(s.format, LogFormat::Json);
        assert_eq!(s.output, LogOutput::Both);
        assert!(s.output.console() && s.output.file());
        assert_eq!(s.file_path, PathBuf::from("/var/log/director/api.log"));
    }

    #[test]
    fn test_unknown_values_fall_back() {
        let s = settings(&[("LOG_FORMAT", "xml"), ("LOG_OUTPUT", "syslog"), ("LOG_LEVEL", " ")]);

        assert_eq!(s.format, LogFormat::Human);
        assert_eq!(s.output, LogOutput::Console);
        assert_eq!(s.level, "info");
    }

    #[test]
    fn test_filter_directives_quiet_dependencies() {
        let s = settings(&[("LOG_LEVEL", "director_api=trace")]);
        let directives = s.filter_directives();

        assert!(directives.starts_with("director_api=trace,"));
        assert!(directives.contains("sqlx=warn"));
        EnvFilter::try_new(directives).unwrap();
    }
}
