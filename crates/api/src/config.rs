use std::path::PathBuf;
use std::time::Duration;

use rawbatch_pipeline::coordinator::default_concurrency;
use rawbatch_pipeline::CoordinatorConfig;

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `300`). Uploads of large
    /// RAW folders need the headroom.
    pub request_timeout_secs: u64,
    /// How long shutdown waits for running batches, in seconds (default: `30`).
    pub shutdown_timeout_secs: u64,
    /// Largest accepted request body in bytes (default: 500 MB).
    pub max_upload_bytes: usize,
    /// Parallel conversions per batch (default: available parallelism).
    pub conversion_concurrency: usize,
    /// Per-file conversion timeout in seconds (default: `120`).
    pub job_timeout_secs: u64,
    /// Directory for transient upload copies (default: `uploads`).
    pub staging_dir: PathBuf,
    /// Directory holding finished archives (default: `uploads/archives`).
    pub archive_dir: PathBuf,
    /// Number of archives kept on disk (default: `16`).
    pub archive_retention: usize,
    /// Optional directory of static front-end files served at `/`.
    pub static_dir: Option<PathBuf>,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                  | Default                    |
    /// |--------------------------|----------------------------|
    /// | `HOST`                   | `0.0.0.0`                  |
    /// | `PORT`                   | `3000`                     |
    /// | `CORS_ORIGINS`           | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS`   | `300`                      |
    /// | `SHUTDOWN_TIMEOUT_SECS`  | `30`                       |
    /// | `MAX_UPLOAD_BYTES`       | `524288000`                |
    /// | `CONVERSION_CONCURRENCY` | available parallelism      |
    /// | `JOB_TIMEOUT_SECS`       | `120`                      |
    /// | `STAGING_DIR`            | `uploads`                  |
    /// | `ARCHIVE_DIR`            | `uploads/archives`         |
    /// | `ARCHIVE_RETENTION`      | `16`                       |
    /// | `STATIC_DIR`             | unset                      |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "300".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let shutdown_timeout_secs: u64 = std::env::var("SHUTDOWN_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("SHUTDOWN_TIMEOUT_SECS must be a valid u64");

        let max_upload_bytes: usize = std::env::var("MAX_UPLOAD_BYTES")
            .unwrap_or_else(|_| (500 * 1024 * 1024).to_string())
            .parse()
            .expect("MAX_UPLOAD_BYTES must be a valid usize");

        let conversion_concurrency: usize = std::env::var("CONVERSION_CONCURRENCY")
            .ok()
            .map(|v| {
                v.parse()
                    .expect("CONVERSION_CONCURRENCY must be a valid usize")
            })
            .unwrap_or_else(default_concurrency)
            .max(1);

        let job_timeout_secs: u64 = std::env::var("JOB_TIMEOUT_SECS")
            .unwrap_or_else(|_| "120".into())
            .parse()
            .expect("JOB_TIMEOUT_SECS must be a valid u64");

        let staging_dir = PathBuf::from(
            std::env::var("STAGING_DIR").unwrap_or_else(|_| "uploads".into()),
        );

        let archive_dir = PathBuf::from(
            std::env::var("ARCHIVE_DIR").unwrap_or_else(|_| "uploads/archives".into()),
        );

        let archive_retention: usize = std::env::var("ARCHIVE_RETENTION")
            .unwrap_or_else(|_| "16".into())
            .parse()
            .expect("ARCHIVE_RETENTION must be a valid usize");

        let static_dir = std::env::var("STATIC_DIR")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            shutdown_timeout_secs,
            max_upload_bytes,
            conversion_concurrency,
            job_timeout_secs,
            staging_dir,
            archive_dir,
            archive_retention,
            static_dir,
        }
    }

    /// Pool settings for the batch coordinator.
    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            concurrency: self.conversion_concurrency,
            job_timeout: Duration::from_secs(self.job_timeout_secs),
        }
    }
}
