use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use reel_pipeline::PipelineConfig;

/// A configuration variable that is set but cannot be parsed.
#[derive(Debug, thiserror::Error)]
#[error("{key} has invalid value '{value}'")]
pub struct ConfigError {
    pub key: &'static str,
    pub value: String,
}

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `8000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS`.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`). Not applied to the
    /// progress stream.
    pub request_timeout_secs: u64,
    /// Stage worker tunables. `output_root` is also served under `/output`.
    pub pipeline: PipelineConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                   | Default                 |
    /// |---------------------------|-------------------------|
    /// | `HOST`                    | `0.0.0.0`               |
    /// | `PORT`                    | `8000`                  |
    /// | `CORS_ORIGINS`            | `http://localhost:3000` |
    /// | `REQUEST_TIMEOUT_SECS`    | `30`                    |
    /// | `OUTPUT_DIR`              | `./output`              |
    /// | `IMAGE_CONCURRENCY`       | `5`                     |
    /// | `VIDEO_REGEN_CONCURRENCY` | `3`                     |
    /// | `VOICE_CONCURRENCY`       | `1`                     |
    /// | `VIDEO_POLL_INTERVAL_SECS`| `5`                     |
    /// | `VIDEO_POLL_BUDGET_SECS`  | `600`                   |
    /// | `PROGRESS_KEEPALIVE_SECS` | `30`                    |
    /// | `FRAME_WIDTH`             | `1080`                  |
    /// | `FRAME_HEIGHT`            | `1920`                  |
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port = env_or("PORT", 8000)?;

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3000".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs = env_or("REQUEST_TIMEOUT_SECS", 30)?;

        let defaults = PipelineConfig::default();
        let pipeline = PipelineConfig {
            output_root: std::env::var("OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_root),
            image_concurrency: env_or("IMAGE_CONCURRENCY", defaults.image_concurrency)?,
            video_regen_concurrency: env_or(
                "VIDEO_REGEN_CONCURRENCY",
                defaults.video_regen_concurrency,
            )?,
            voice_concurrency: env_or("VOICE_CONCURRENCY", defaults.voice_concurrency)?,
            video_poll_interval: env_secs("VIDEO_POLL_INTERVAL_SECS", defaults.video_poll_interval)?,
            video_poll_budget: env_secs("VIDEO_POLL_BUDGET_SECS", defaults.video_poll_budget)?,
            progress_keepalive: env_secs("PROGRESS_KEEPALIVE_SECS", defaults.progress_keepalive)?,
            frame_width: env_or("FRAME_WIDTH", defaults.frame_width)?,
            frame_height: env_or("FRAME_HEIGHT", defaults.frame_height)?,
            image_retry: defaults.image_retry,
        };

        Ok(Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            pipeline,
        })
    }
}

fn env_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError { key, value }),
        Err(_) => Ok(default),
    }
}

fn env_secs(key: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    env_or(key, default.as_secs()).map(Duration::from_secs)
}
