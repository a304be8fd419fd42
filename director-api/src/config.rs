use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Externally reachable base URL of this service.
    #[serde(default = "default_app_url")]
    pub app_url: String,

    #[serde(default = "default_operation_path")]
    pub operation_path: String,

    #[serde(default = "default_disable_async_mode")]
    pub disable_async_mode: bool,

    #[serde(default = "default_executor_interval")]
    pub executor_interval_secs: u64,

    #[serde(default = "default_webhook_timeout")]
    pub webhook_timeout_secs: u64,
}

fn default_bind_addr() -> String {
    std::env::var("DIRECTOR_BIND").unwrap_or_else(|_| "0.0.0.0:3000".to_string())
}

fn default_db_path() -> PathBuf {
    if let Ok(path) = std::env::var("DIRECTOR_DB_PATH") {
        return PathBuf::from(path);
    }

    if cfg!(windows) {
        let appdata = std::env::var("APPDATA").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(appdata).join("director").join("director.db")
    } else {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(".director").join("director.db")
    }
}

fn default_app_url() -> String {
    std::env::var("DIRECTOR_APP_URL").unwrap_or_else(|_| "http://127.0.0.1:3000".to_string())
}

fn default_operation_path() -> String {
    std::env::var("DIRECTOR_OPERATION_PATH").unwrap_or_else(|_| "/operation".to_string())
}

fn default_disable_async_mode() -> bool {
    std::env::var("DIRECTOR_DISABLE_ASYNC_MODE")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(false)
}

fn default_executor_interval() -> u64 {
    std::env::var("DIRECTOR_EXECUTOR_INTERVAL")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(5)
}

fn default_webhook_timeout() -> u64 {
    std::env::var("DIRECTOR_WEBHOOK_TIMEOUT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(10)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            db_path: default_db_path(),
            app_url: default_app_url(),
            operation_path: default_operation_path(),
            disable_async_mode: default_disable_async_mode(),
            executor_interval_secs: default_executor_interval(),
            webhook_timeout_secs: default_webhook_timeout(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::default()
    }

    /// Base of the `locations` handed out for asynchronous operations. A
    /// location is this URL followed by `/{resource_type}/{resource_id}`.
    pub fn director_url(&self) -> String {
        format!(
            "{}{}",
            self.app_url.trim_end_matches('/'),
            self.operation_path
        )
    }
}
