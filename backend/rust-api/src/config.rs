use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub bind_addr: String,
    pub mongo_uri: String,
    pub mongo_database: String,
    /// `username:password` for Basic auth on /metrics.
    pub metrics_auth: String,
    pub ai: AiConfig,
    pub sync: SyncClientConfig,
}

/// Generative AI provider (Gemini-compatible `generateContent` API).
#[derive(Debug, Clone, Deserialize)]
pub struct AiConfig {
    pub api_url: String,
    /// AI routes answer 503 while this is unset.
    pub api_key: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub max_attempts: usize,
}

/// Settings for the offline sync client (`sync-agent`).
#[derive(Debug, Clone, Deserialize)]
pub struct SyncClientConfig {
    pub server_url: String,
    pub db_path: String,
    pub max_attempts: u32,
    pub request_timeout_secs: u64,
    pub probe_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8081".to_string(),
            mongo_uri: "mongodb://localhost:27017".to_string(),
            mongo_database: "studynest".to_string(),
            metrics_auth: "admin:changeme".to_string(),
            ai: AiConfig::default(),
            sync: SyncClientConfig::default(),
        }
    }
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            api_url: "https://generativelanguage.googleapis.com".to_string(),
            api_key: None,
            model: "gemini-1.5-flash".to_string(),
            timeout_secs: 30,
            max_attempts: 3,
        }
    }
}

impl Default for SyncClientConfig {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:8081".to_string(),
            db_path: "studynest-offline.db".to_string(),
            max_attempts: 5,
            request_timeout_secs: 15,
            probe_interval_secs: 10,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        // Load environment variables from root .env file (two levels up)
        // Try root .env first, then fallback to local .env
        let skip_root_env = env::var("SKIP_ROOT_ENV").is_ok();
        if skip_root_env {
            dotenvy::dotenv().ok();
        } else if dotenvy::from_path("../../.env").is_err() {
            dotenvy::dotenv().ok();
        }

        // Determine environment (defaults to dev)
        let app_env = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        // Build configuration from config/*.toml + ENV overrides
        let settings = config::Config::builder()
            .add_source(config::File::with_name(&format!("config/{}", app_env)).required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        let defaults = Config::default();

        let bind_addr = string_setting(&settings, "server.bind_addr", "BIND_ADDR")
            .unwrap_or(defaults.bind_addr);

        let mongo_uri = string_setting(&settings, "database.mongo_uri", "MONGO_URI")
            .unwrap_or(defaults.mongo_uri);

        let mongo_database =
            string_setting(&settings, "database.mongo_database", "MONGO_DATABASE")
                .unwrap_or(defaults.mongo_database);

        let metrics_auth = string_setting(&settings, "metrics.auth", "METRICS_AUTH")
            .unwrap_or_else(|| {
                if app_env == "prod" {
                    tracing::warn!("METRICS_AUTH not set in production, using default credentials");
                }
                defaults.metrics_auth
            });

        let ai = AiConfig {
            api_url: string_setting(&settings, "ai.api_url", "AI_API_URL")
                .unwrap_or(defaults.ai.api_url),
            api_key: string_setting(&settings, "ai.api_key", "AI_API_KEY")
                .filter(|key| !key.trim().is_empty()),
            model: string_setting(&settings, "ai.model", "AI_MODEL").unwrap_or(defaults.ai.model),
            timeout_secs: number_setting(&settings, "ai.timeout_secs", "AI_TIMEOUT_SECS")?
                .unwrap_or(defaults.ai.timeout_secs),
            max_attempts: number_setting(&settings, "ai.max_attempts", "AI_MAX_ATTEMPTS")?
                .unwrap_or(defaults.ai.max_attempts),
        };

        let sync = SyncClientConfig {
            server_url: string_setting(&settings, "sync.server_url", "SYNC_SERVER_URL")
                .unwrap_or(defaults.sync.server_url),
            db_path: string_setting(&settings, "sync.db_path", "SYNC_DB_PATH")
                .unwrap_or(defaults.sync.db_path),
            max_attempts: number_setting(&settings, "sync.max_attempts", "SYNC_MAX_ATTEMPTS")?
                .unwrap_or(defaults.sync.max_attempts),
            request_timeout_secs: number_setting(
                &settings,
                "sync.request_timeout_secs",
                "SYNC_REQUEST_TIMEOUT_SECS",
            )?
            .unwrap_or(defaults.sync.request_timeout_secs),
            probe_interval_secs: number_setting(
                &settings,
                "sync.probe_interval_secs",
                "SYNC_PROBE_INTERVAL_SECS",
            )?
            .unwrap_or(defaults.sync.probe_interval_secs),
        };

        Ok(Config {
            bind_addr,
            mongo_uri,
            mongo_database,
            metrics_auth,
            ai,
            sync,
        })
    }
}

/// Layered lookup: config file / `APP__*` first, then the plain env var.
fn string_setting(settings: &config::Config, key: &str, env_var: &str) -> Option<String> {
    settings
        .get_string(key)
        .ok()
        .or_else(|| env::var(env_var).ok())
}

fn number_setting<T>(
    settings: &config::Config,
    key: &str,
    env_var: &str,
) -> Result<Option<T>, config::ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match string_setting(settings, key, env_var) {
        None => Ok(None),
        Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|e| {
            config::ConfigError::Message(format!("Invalid value for {} ({}): {}", key, raw, e))
        }),
    }
}
