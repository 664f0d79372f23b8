use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Deployment mode. Controls how much error detail reaches clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "production" | "prod" => Environment::Production,
            _ => Environment::Development,
        }
    }

    pub fn is_production(self) -> bool {
        self == Environment::Production
    }
}

/// Service configuration, built once at startup and handed to every component
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Listening port (default: 3000)
    pub port: u16,

    /// Directory holding per-request upload files (default: "uploads")
    pub upload_dir: PathBuf,

    /// Maximum upload size in bytes (default: 10 MiB)
    pub max_file_size: usize,

    /// Maximum number of records produced per conversion (default: 100,000)
    pub max_rows: usize,

    /// Deployment mode (default: development)
    pub environment: Environment,

    /// How long in-flight requests may run after a shutdown signal (default: 10s)
    pub shutdown_grace: Duration,

    /// Delay before exiting after an unrecoverable server error (default: 1s)
    pub crash_exit_delay: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            upload_dir: PathBuf::from("uploads"),
            max_file_size: 10 * 1024 * 1024, // 10 MiB
            max_rows: 100_000,
            environment: Environment::Development,
            shutdown_grace: Duration::from_secs(10),
            crash_exit_delay: Duration::from_millis(1000),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.port),

            upload_dir: env::var("UPLOAD_DIR")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(default.upload_dir),

            max_file_size: env::var("MAX_FILE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_file_size),

            max_rows: env::var("MAX_ROWS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_rows),

            environment: env::var("APP_ENV")
                .map(|v| Environment::parse(&v))
                .unwrap_or(default.environment),

            shutdown_grace: env::var("SHUTDOWN_GRACE_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(default.shutdown_grace),

            crash_exit_delay: env::var("CRASH_EXIT_DELAY_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(default.crash_exit_delay),
        }
    }

    /// Default limits with the store rooted at `upload_dir`
    pub fn with_upload_dir(upload_dir: impl Into<PathBuf>) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            ..Self::default()
        }
    }
}
