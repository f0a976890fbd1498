use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Failed to read config: {0}")]
    ReadError(String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main configuration for GeoQuery
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GeoQueryConfig {
    /// Feature service endpoint
    #[serde(default)]
    pub service: ServiceConfig,

    /// HTTP timeouts, retries and pooling
    #[serde(default)]
    pub network: NetworkConfig,

    /// Feature response caching
    #[serde(default)]
    pub cache: CacheSettings,

    /// Query defaults and safety caps
    #[serde(default)]
    pub query: QueryConfig,

    /// Natural-language translation backend
    #[serde(default)]
    pub llm: LLMConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Feature layer URL (the `/query` suffix is appended by the client)
    #[serde(default = "default_service_url")]
    pub url: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            url: default_service_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,

    /// Retries after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base backoff delay; doubles on every retry
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    #[serde(default = "default_true")]
    pub retry_jitter: bool,

    /// Idle connections kept per host
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
            read_timeout_secs: default_read_timeout_secs(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            retry_jitter: true,
            max_connections: default_max_connections(),
            keepalive_secs: default_keepalive_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,

    #[serde(default = "default_cache_max_entries")]
    pub max_entries: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: default_cache_ttl_secs(),
            max_entries: default_cache_max_entries(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    #[serde(default = "default_page_size")]
    pub default_page_size: usize,

    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,

    #[serde(default = "default_out_fields")]
    pub default_out_fields: String,

    #[serde(default = "default_true")]
    pub enable_pagination: bool,

    /// Safety cap on pages per query
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,

    #[serde(default = "default_spatial_reference_wkid")]
    pub spatial_reference_wkid: u32,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
            default_out_fields: default_out_fields(),
            enable_pagination: true,
            max_pages: default_max_pages(),
            spatial_reference_wkid: default_spatial_reference_wkid(),
        }
    }
}

/// LLM configuration for natural-language translation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMConfig {
    /// LLM provider: "anthropic", "openai", "gemini"
    #[serde(default = "default_llm_provider")]
    pub provider: String,

    /// Model identifier; provider default when unset
    #[serde(default)]
    pub model: Option<String>,

    #[serde(default)]
    pub anthropic_api_key: Option<String>,

    #[serde(default)]
    pub openai_api_key: Option<String>,

    #[serde(default)]
    pub gemini_api_key: Option<String>,

    /// Override for the provider's API base URL
    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default = "default_llm_max_tokens")]
    pub max_tokens: usize,

    #[serde(default)]
    pub temperature: f32,

    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_true")]
    pub cache_enabled: bool,

    #[serde(default = "default_llm_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: None,
            anthropic_api_key: None,
            openai_api_key: None,
            gemini_api_key: None,
            base_url: None,
            max_tokens: default_llm_max_tokens(),
            temperature: 0.0,
            timeout_secs: default_llm_timeout_secs(),
            cache_enabled: true,
            cache_ttl_secs: default_llm_cache_ttl_secs(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "pretty", "json", "compact"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// Default value functions
fn default_service_url() -> String {
    "https://services.arcgis.com/P3ePLMYs2RVChkJx/ArcGIS/rest/services/USA_Census_Counties/FeatureServer/0"
        .to_string()
}
fn default_true() -> bool {
    true
}
fn default_connect_timeout_secs() -> u64 {
    10
}
fn default_read_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    3
}
fn default_retry_backoff_ms() -> u64 {
    500
}
fn default_max_backoff_ms() -> u64 {
    8_000
}
fn default_max_connections() -> usize {
    10
}
fn default_keepalive_secs() -> u64 {
    30
}
fn default_cache_ttl_secs() -> u64 {
    300
}
fn default_cache_max_entries() -> usize {
    1000
}
fn default_page_size() -> usize {
    1000
}
fn default_max_page_size() -> usize {
    2000
}
fn default_out_fields() -> String {
    "*".to_string()
}
fn default_max_pages() -> usize {
    100
}
fn default_spatial_reference_wkid() -> u32 {
    4326
}
fn default_llm_provider() -> String {
    "anthropic".to_string()
}
fn default_llm_max_tokens() -> usize {
    1536
}
fn default_llm_timeout_secs() -> u64 {
    60
}
fn default_llm_cache_ttl_secs() -> u64 {
    3600
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "pretty".to_string()
}

const KNOWN_PROVIDERS: &[&str] = &["anthropic", "openai", "gemini"];

/// Configuration manager: .env, TOML file, environment overrides, validation
pub struct ConfigManager {
    config: GeoQueryConfig,
    config_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Load configuration with the following precedence:
    /// 1. Environment variables (.env file)
    /// 2. Config file (.geoquery.toml)
    /// 3. Sensible defaults
    pub fn load() -> Result<Self, ConfigError> {
        info!("Loading GeoQuery configuration");

        Self::load_dotenv();

        let (config, config_path) = Self::load_config_file()?;
        let config = Self::apply_env_overrides(config);
        Self::validate_config(&config)?;

        Self::log_summary(&config, config_path.as_deref());

        Ok(Self {
            config,
            config_path,
        })
    }

    /// Load an explicit config file, still honouring environment overrides
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }

        Self::load_dotenv();

        let config = Self::apply_env_overrides(Self::read_toml_file(path)?);
        Self::validate_config(&config)?;

        Self::log_summary(&config, Some(path));

        Ok(Self {
            config,
            config_path: Some(path.to_path_buf()),
        })
    }

    /// Wrap an already-built configuration after validating it
    pub fn from_config(config: GeoQueryConfig) -> Result<Self, ConfigError> {
        Self::validate_config(&config)?;
        Ok(Self {
            config,
            config_path: None,
        })
    }

    fn log_summary(config: &GeoQueryConfig, path: Option<&Path>) {
        match path {
            Some(path) => info!(config_file = %path.display(), "Configuration loaded"),
            None => info!("Configuration loaded (no config file, using defaults)"),
        }
        info!(
            service_url = %config.service.url,
            cache_enabled = config.cache.enabled,
            max_pages = config.query.max_pages,
            llm_provider = %config.llm.provider,
            "Effective settings"
        );
    }

    /// Load .env file if it exists
    fn load_dotenv() {
        if Path::new(".env").exists() {
            if let Err(e) = dotenv::from_filename(".env") {
                warn!("Failed to load .env file: {}", e);
            } else {
                info!("Loaded .env file from current directory");
            }
            return;
        }

        if let Some(home) = dirs::home_dir() {
            let home_env = home.join(".geoquery.env");
            if home_env.exists() {
                if let Err(e) = dotenv::from_path(&home_env) {
                    warn!("Failed to load .geoquery.env: {}", e);
                } else {
                    info!("Loaded .geoquery.env from home directory");
                }
            }
        }
    }

    /// Find and load config file
    /// Search order:
    /// 1. ./.geoquery.toml (current directory)
    /// 2. ~/.geoquery/config.toml (user config)
    /// 3. Use defaults
    fn load_config_file() -> Result<(GeoQueryConfig, Option<PathBuf>), ConfigError> {
        let local_config = Path::new(".geoquery.toml");
        if local_config.exists() {
            let config = Self::read_toml_file(local_config)?;
            return Ok((config, Some(local_config.to_path_buf())));
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".geoquery").join("config.toml");
            if user_config.exists() {
                let config = Self::read_toml_file(&user_config)?;
                return Ok((config, Some(user_config)));
            }
        }

        info!("No config file found, using defaults");
        Ok((GeoQueryConfig::default(), None))
    }

    fn read_toml_file(path: &Path) -> Result<GeoQueryConfig, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError(e.to_string()))?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(mut config: GeoQueryConfig) -> GeoQueryConfig {
        fn parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
            std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
        }
        fn flag(name: &str) -> Option<bool> {
            std::env::var(name)
                .ok()
                .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
        }

        if let Ok(url) = std::env::var("ARCGIS_SERVICE_URL") {
            config.service.url = url;
        }

        // Network
        if let Some(v) = parsed("ARCGIS_CONNECT_TIMEOUT") {
            config.network.connect_timeout_secs = v;
        }
        if let Some(v) = parsed("ARCGIS_READ_TIMEOUT") {
            config.network.read_timeout_secs = v;
        }
        if let Some(v) = parsed("ARCGIS_MAX_RETRIES") {
            config.network.max_retries = v;
        }
        if let Some(v) = parsed("ARCGIS_RETRY_BACKOFF_MS") {
            config.network.retry_backoff_ms = v;
        }
        if let Some(v) = parsed("ARCGIS_MAX_CONNECTIONS") {
            config.network.max_connections = v;
        }

        // Cache
        if let Some(v) = flag("ARCGIS_CACHE_ENABLED") {
            config.cache.enabled = v;
        }
        if let Some(v) = parsed("ARCGIS_CACHE_TTL") {
            config.cache.ttl_secs = v;
        }
        if let Some(v) = parsed("ARCGIS_CACHE_MAX_SIZE") {
            config.cache.max_entries = v;
        }

        // Query
        if let Some(v) = parsed("ARCGIS_DEFAULT_PAGE_SIZE") {
            config.query.default_page_size = v;
        }
        if let Some(v) = parsed("ARCGIS_MAX_PAGE_SIZE") {
            config.query.max_page_size = v;
        }
        if let Some(v) = parsed("ARCGIS_MAX_PAGES") {
            config.query.max_pages = v;
        }
        if let Some(v) = parsed("ARCGIS_SPATIAL_REF_WKID") {
            config.query.spatial_reference_wkid = v;
        }

        // LLM
        if let Ok(provider) = std::env::var("GEOQUERY_LLM_PROVIDER") {
            config.llm.provider = provider.to_lowercase();
        }
        if let Ok(model) = std::env::var("GEOQUERY_LLM_MODEL") {
            config.llm.model = Some(model);
        }
        if let Ok(key) = std::env::var("ANTHROPIC_API_KEY") {
            config.llm.anthropic_api_key = Some(key);
        }
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            config.llm.openai_api_key = Some(key);
        }
        if let Ok(key) = std::env::var("GEMINI_API_KEY") {
            config.llm.gemini_api_key = Some(key);
        }

        // Logging
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            config.logging.level = level.to_lowercase();
        }
        if let Ok(format) = std::env::var("LOG_FORMAT") {
            config.logging.format = format.to_lowercase();
        }

        config
    }

    /// Validate configuration
    pub fn validate_config(config: &GeoQueryConfig) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::ValidationError(msg.to_string()));

        if config.service.url.trim().is_empty() {
            return invalid("service.url must not be empty");
        }
        if config.network.connect_timeout_secs == 0 {
            return invalid("network.connect_timeout_secs must be positive");
        }
        if config.network.read_timeout_secs == 0 {
            return invalid("network.read_timeout_secs must be positive");
        }
        if config.query.default_page_size == 0 {
            return invalid("query.default_page_size must be positive");
        }
        if config.query.max_page_size < config.query.default_page_size {
            return invalid("query.max_page_size must be >= query.default_page_size");
        }
        if config.query.max_pages == 0 {
            return invalid("query.max_pages must be positive");
        }
        if config.cache.max_entries == 0 {
            return invalid("cache.max_entries must be positive");
        }

        if !KNOWN_PROVIDERS.contains(&config.llm.provider.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid LLM provider: {}. Must be one of: {}",
                config.llm.provider,
                KNOWN_PROVIDERS.join(", ")
            )));
        }

        match config.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                    other
                )))
            }
        }

        match config.logging.format.as_str() {
            "pretty" | "json" | "compact" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log format: {}. Must be one of: pretty, json, compact",
                    other
                )))
            }
        }

        Ok(())
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &GeoQueryConfig {
        &self.config
    }

    pub fn into_config(self) -> GeoQueryConfig {
        self.config
    }

    /// Get the path to the config file that was loaded, if any
    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    /// Create a default config file
    pub fn create_default_config(path: &Path) -> Result<(), ConfigError> {
        let config = GeoQueryConfig::default();
        let toml_str =
            toml::to_string_pretty(&config).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::ReadError(e.to_string()))?;
        }

        std::fs::write(path, toml_str).map_err(|e| ConfigError::ReadError(e.to_string()))?;

        Ok(())
    }
}
