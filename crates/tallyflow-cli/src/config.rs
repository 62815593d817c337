use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tallyflow_fetch::{ChunkLimits, FetchOptions, RetryPolicy};
use tallyflow_observability::LogFormat;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TallyflowConfig {
    #[serde(default)]
    pub fetch: FetchConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Endpoint name mixed into request signatures
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_max_entities_per_chunk")]
    pub max_entities_per_chunk: usize,

    #[serde(default = "default_max_dates_per_chunk")]
    pub max_dates_per_chunk: usize,

    #[serde(default = "default_inter_chunk_delay_ms")]
    pub inter_chunk_delay_ms: u64,

    /// Total attempts per chunk
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,

    /// Background purge interval; 0 disables the sweeper
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_false")]
    pub json: bool,

    /// Extra filter directives, e.g. `tallyflow_fetch=debug`
    #[serde(default)]
    pub directives: Vec<String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            max_entities_per_chunk: default_max_entities_per_chunk(),
            max_dates_per_chunk: default_max_dates_per_chunk(),
            inter_chunk_delay_ms: default_inter_chunk_delay_ms(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_cache_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            directives: Vec::new(),
        }
    }
}

impl LoggingConfig {
    pub fn format(&self) -> LogFormat {
        if self.json {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    }
}

fn default_endpoint() -> String {
    "daily-totals".to_string()
}

fn default_max_entities_per_chunk() -> usize {
    5
}

fn default_max_dates_per_chunk() -> usize {
    7
}

fn default_inter_chunk_delay_ms() -> u64 {
    200
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    1000
}

fn default_cache_ttl_secs() -> u64 {
    300
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_false() -> bool {
    false
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    let val = std::env::var(name).ok()?;
    match val.parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            eprintln!("Warning: Invalid {} '{}', keeping configured value", name, val);
            None
        }
    }
}

impl TallyflowConfig {
    /// Load from a YAML file, or TOML when the extension is `.toml`
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let config = if path.extension().and_then(|s| s.to_str()) == Some("toml") {
            toml::from_str(&contents)
                .with_context(|| format!("Invalid TOML in {}", path.display()))?
        } else {
            // Default to YAML
            serde_yaml::from_str(&contents)
                .with_context(|| format!("Invalid YAML in {}", path.display()))?
        };

        Ok(config)
    }

    /// Merge environment variables into config (env vars take precedence)
    pub fn merge_env(&mut self) {
        if let Ok(val) = std::env::var("TALLYFLOW_LOG_LEVEL") {
            self.logging.level = val;
        }

        if let Some(max_retries) = env_parse("TALLYFLOW_MAX_RETRIES") {
            self.fetch.max_retries = max_retries;
        }

        if let Some(ttl_secs) = env_parse("TALLYFLOW_CACHE_TTL_SECS") {
            self.cache.ttl_secs = ttl_secs;
        }

        if let Some(max_entities) = env_parse("TALLYFLOW_MAX_ENTITIES_PER_CHUNK") {
            self.fetch.max_entities_per_chunk = max_entities;
        }

        if let Some(max_dates) = env_parse("TALLYFLOW_MAX_DATES_PER_CHUNK") {
            self.fetch.max_dates_per_chunk = max_dates;
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl_secs)
    }

    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.cache.sweep_interval_secs > 0)
            .then(|| Duration::from_secs(self.cache.sweep_interval_secs))
    }

    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions::default()
            .with_limits(ChunkLimits::new(
                self.fetch.max_entities_per_chunk,
                self.fetch.max_dates_per_chunk,
            ))
            .with_retry(RetryPolicy::new(
                self.fetch.max_retries,
                Duration::from_millis(self.fetch.retry_base_delay_ms),
            ))
            .with_inter_chunk_delay(Duration::from_millis(self.fetch.inter_chunk_delay_ms))
            .with_cache_ttl(self.cache_ttl())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const ENV_VARS: [&str; 5] = [
        "TALLYFLOW_LOG_LEVEL",
        "TALLYFLOW_MAX_RETRIES",
        "TALLYFLOW_CACHE_TTL_SECS",
        "TALLYFLOW_MAX_ENTITIES_PER_CHUNK",
        "TALLYFLOW_MAX_DATES_PER_CHUNK",
    ];

    fn clear_env() {
        for name in ENV_VARS {
            unsafe {
                std::env::remove_var(name);
            }
        }
    }

    fn write_config(suffix: &str, contents: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let config = TallyflowConfig::default();
        assert_eq!(config.fetch.endpoint, "daily-totals");
        assert_eq!(config.fetch.max_entities_per_chunk, 5);
        assert_eq!(config.fetch.max_dates_per_chunk, 7);
        assert_eq!(config.fetch.inter_chunk_delay_ms, 200);
        assert_eq!(config.fetch.max_retries, 3);
        assert_eq!(config.fetch.retry_base_delay_ms, 1000);
        assert_eq!(config.cache_ttl(), Duration::from_secs(300));
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format(), LogFormat::Text);
    }

    #[test]
    fn test_from_yaml_with_partial_sections() {
        let file = write_config(
            ".yaml",
            "fetch:\n  max_dates_per_chunk: 14\n  inter_chunk_delay_ms: 50\nlogging:\n  json: true\n",
        );
        let config = TallyflowConfig::from_file(file.path()).unwrap();

        assert_eq!(config.fetch.max_dates_per_chunk, 14);
        assert_eq!(config.fetch.inter_chunk_delay_ms, 50);
        assert_eq!(config.fetch.max_entities_per_chunk, 5);
        assert_eq!(config.cache.ttl_secs, 300);
        assert_eq!(config.logging.format(), LogFormat::Json);
    }

    #[test]
    fn test_from_toml() {
        let file = write_config(
            ".toml",
            "[fetch]\nendpoint = \"stock-totals\"\nmax_retries = 5\n\n[cache]\nttl_secs = 60\nsweep_interval_secs = 0\n",
        );
        let config = TallyflowConfig::from_file(file.path()).unwrap();

        assert_eq!(config.fetch.endpoint, "stock-totals");
        assert_eq!(config.fetch.max_retries, 5);
        assert_eq!(config.cache_ttl(), Duration::from_secs(60));
        assert_eq!(config.sweep_interval(), None);
    }

    #[test]
    fn test_invalid_file_reports_path() {
        let file = write_config(".yaml", "fetch: [not, a, map]\n");
        let err = TallyflowConfig::from_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("Invalid YAML"));

        let missing = TallyflowConfig::from_file("/nonexistent/tallyflow.yaml").unwrap_err();
        assert!(missing.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_fetch_options_conversion() {
        let mut config = TallyflowConfig::default();
        config.fetch.max_entities_per_chunk = 2;
        config.fetch.retry_base_delay_ms = 10;

        let options = config.fetch_options();
        assert_eq!(options.limits, ChunkLimits::new(2, 7));
        assert_eq!(options.retry.base_delay, Duration::from_millis(10));
        assert_eq!(options.retry.max_retries, 3);
        assert_eq!(options.inter_chunk_delay, Duration::from_millis(200));
        assert_eq!(options.cache_ttl, Some(Duration::from_secs(300)));
        assert!(options.on_progress.is_none());
    }

    #[test]
    #[serial_test::serial]
    fn test_merge_env_overrides_file_values() {
        clear_env();
        unsafe {
            std::env::set_var("TALLYFLOW_LOG_LEVEL", "debug");
            std::env::set_var("TALLYFLOW_MAX_RETRIES", "7");
            std::env::set_var("TALLYFLOW_CACHE_TTL_SECS", "30");
            std::env::set_var("TALLYFLOW_MAX_ENTITIES_PER_CHUNK", "10");
            std::env::set_var("TALLYFLOW_MAX_DATES_PER_CHUNK", "31");
        }

        let mut config = TallyflowConfig::default();
        config.merge_env();

        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.fetch.max_retries, 7);
        assert_eq!(config.cache.ttl_secs, 30);
        assert_eq!(config.fetch.max_entities_per_chunk, 10);
        assert_eq!(config.fetch.max_dates_per_chunk, 31);

        clear_env();
    }

    #[test]
    #[serial_test::serial]
    fn test_merge_env_ignores_unparseable_values() {
        clear_env();
        unsafe {
            std::env::set_var("TALLYFLOW_MAX_RETRIES", "many");
        }

        let mut config = TallyflowConfig::default();
        config.fetch.max_retries = 4;
        config.merge_env();
        assert_eq!(config.fetch.max_retries, 4);

        clear_env();
    }
}
