use chrono_tz::Tz;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub cache: CacheConfig,
    pub scheduler: SchedulerConfig,
    pub scraper: ScraperConfig,
    pub sources: SourcesConfig,
    pub metrics: MetricsConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub request_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Age after which the listing snapshot is stale, in seconds.
    pub snapshot_ttl_secs: u64,
    /// Lifetime of a cached detail record, in seconds.
    pub detail_ttl_secs: u64,
    /// Upper bound on cached detail records.
    pub detail_max_entries: usize,
    /// `sqlite:<path>` for SQLite, anything else is a JSON file path.
    pub storage: String,
    /// After a refresh where every source failed, stale reads wait this
    /// long before starting another background run.
    pub refresh_backoff_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub cron: String,
    pub timezone: String,
    pub refresh_on_start: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperConfig {
    pub user_agent: String,
    pub request_timeout: u64,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
    pub pool_workers: usize,
    pub pool_request_timeout_ms: u64,
    pub pool_result_ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// Provider ids to register, in display order.
    pub enabled: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub directory: Option<String>,
    pub file_prefix: String,
}

impl CacheConfig {
    pub fn snapshot_ttl(&self) -> Duration {
        Duration::from_secs(self.snapshot_ttl_secs)
    }

    pub fn detail_ttl(&self) -> Duration {
        Duration::from_secs(self.detail_ttl_secs)
    }

    pub fn refresh_backoff(&self) -> Duration {
        Duration::from_secs(self.refresh_backoff_secs)
    }
}

impl SchedulerConfig {
    /// The cron expression in the six-field form the job scheduler expects.
    pub fn normalized_cron(&self) -> String {
        let parts: Vec<&str> = self.cron.split_whitespace().collect();
        if parts.len() == 5 {
            format!("0 {}", parts.join(" "))
        } else {
            parts.join(" ")
        }
    }

    pub fn tz(&self) -> Result<Tz, ConfigError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| ConfigError::Message(format!("Unknown timezone: {}", self.timezone)))
    }
}

impl ScraperConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    pub fn pool_request_timeout(&self) -> Duration {
        Duration::from_millis(self.pool_request_timeout_ms)
    }

    pub fn pool_result_ttl(&self) -> Duration {
        Duration::from_secs(self.pool_result_ttl_secs)
    }
}

/// Checks a five-field cron expression, or six fields with leading seconds.
pub fn is_valid_cron(expression: &str) -> bool {
    let parts: Vec<&str> = expression.split_whitespace().collect();
    if parts.len() != 5 && parts.len() != 6 {
        return false;
    }

    parts.iter().all(|part| {
        part.chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '*' | '-' | ',' | '/'))
    })
}

impl AppConfig {
    pub fn from_dir(dir: &str) -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            // Start with default configuration
            .add_source(File::with_name(&format!("{}/default", dir)))
            // Add environment-specific config
            .add_source(File::with_name(&format!("{}/{}", dir, run_mode)).required(false))
            // Add local config (ignored by git)
            .add_source(File::with_name(&format!("{}/local", dir)).required(false))
            // Add environment variables, e.g. SCAN_CAR__SERVER__PORT
            .add_source(
                Environment::with_prefix("SCAN_CAR")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("sources.enabled")
                    .try_parsing(true),
            )
            .build()?;

        let mut config: AppConfig = s.try_deserialize()?;

        // The original deployment was configured with PORT and CACHE_TTL_MS
        config.apply_legacy_overrides(env::var("PORT").ok(), env::var("CACHE_TTL_MS").ok())?;

        config.validate()?;
        Ok(config)
    }

    pub fn apply_legacy_overrides(
        &mut self,
        port: Option<String>,
        cache_ttl_ms: Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(port) = port {
            self.server.port = port
                .trim()
                .parse()
                .map_err(|_| ConfigError::Message(format!("Invalid PORT: {}", port)))?;
        }
        if let Some(ttl) = cache_ttl_ms {
            let ms: u64 = ttl
                .trim()
                .parse()
                .map_err(|_| ConfigError::Message(format!("Invalid CACHE_TTL_MS: {}", ttl)))?;
            self.cache.snapshot_ttl_secs = (ms / 1000).max(1);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Message("Server port must be greater than 0".into()));
        }

        if self.cache.snapshot_ttl_secs == 0 {
            return Err(ConfigError::Message("cache.snapshot_ttl_secs must be greater than 0".into()));
        }

        if self.cache.detail_ttl_secs == 0 {
            return Err(ConfigError::Message("cache.detail_ttl_secs must be greater than 0".into()));
        }

        if self.cache.storage.trim().is_empty() {
            return Err(ConfigError::Message("cache.storage must not be empty".into()));
        }

        if self.cache.detail_max_entries == 0 {
            return Err(ConfigError::Message("cache.detail_max_entries must be at least 1".into()));
        }

        if !is_valid_cron(&self.scheduler.cron) {
            return Err(ConfigError::Message(format!(
                "Invalid cron expression: {}",
                self.scheduler.cron
            )));
        }

        self.scheduler.tz()?;

        if self.scraper.pool_workers == 0 {
            return Err(ConfigError::Message("scraper.pool_workers must be at least 1".into()));
        }

        if self.scraper.request_timeout == 0 || self.scraper.pool_request_timeout_ms == 0 {
            return Err(ConfigError::Message("Scraper timeouts must be greater than 0".into()));
        }

        if self.sources.enabled.is_empty() {
            return Err(ConfigError::Message("At least one source must be enabled".into()));
        }

        if self.metrics.enabled && self.metrics.port == self.server.port {
            return Err(ConfigError::Message("Metrics port must differ from server port".into()));
        }

        Ok(())
    }
}
