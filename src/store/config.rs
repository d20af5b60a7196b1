use config::{Config, ConfigError, Environment, File};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

const CONFIG_FILE: &str = "config/config.toml";
const ENV_PREFIX: &str = "HALO";
const MAX_TIMEOUT_SECONDS: u64 = 3_600;
const MAX_RETRY_BACKOFF_MILLIS: u64 = 60_000;

/// Collection names used by listings, claims and profiles
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct StoreConfig {
    #[serde(default = "default_food_items_collection")]
    pub food_items_collection: String,
    #[serde(default = "default_users_collection")]
    pub users_collection: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            food_items_collection: default_food_items_collection(),
            users_collection: default_users_collection(),
        }
    }
}

/// Retry budget for claim arbitration
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ClaimConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "default_retry_backoff_millis")]
    pub retry_backoff_millis: u64,
}

impl Default for ClaimConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            timeout_seconds: default_timeout_seconds(),
            retry_backoff_millis: default_retry_backoff_millis(),
        }
    }
}

impl ClaimConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_millis)
    }
}

fn default_food_items_collection() -> String {
    "sharedFoodItems".to_string()
}

fn default_users_collection() -> String {
    "users".to_string()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_timeout_seconds() -> u64 {
    10
}

fn default_retry_backoff_millis() -> u64 {
    25
}

impl StoreConfig {
    /// Load the `store` section from `config/config.toml`, falling back to env vars.
    pub fn load() -> Result<Self, ConfigError> {
        load_section("store")
    }
}

impl ClaimConfig {
    /// Load the `claims` section from `config/config.toml`, falling back to env vars.
    pub fn load() -> Result<Self, ConfigError> {
        let cfg: ClaimConfig = load_section("claims")?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject retry budgets that cannot describe a user-facing claim
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::Message(
                "claims.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.timeout_seconds > MAX_TIMEOUT_SECONDS {
            return Err(ConfigError::Message(format!(
                "claims.timeout_seconds must be at most {MAX_TIMEOUT_SECONDS}, got {}",
                self.timeout_seconds
            )));
        }
        if self.retry_backoff_millis > MAX_RETRY_BACKOFF_MILLIS {
            return Err(ConfigError::Message(format!(
                "claims.retry_backoff_millis must be at most {MAX_RETRY_BACKOFF_MILLIS}, got {}",
                self.retry_backoff_millis
            )));
        }
        Ok(())
    }
}

fn settings() -> Result<Config, ConfigError> {
    // Build configuration by reading the TOML file (optional) and environment variables
    let builder = Config::builder()
        .add_source(File::with_name(CONFIG_FILE).required(false))
        .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    match builder.build() {
        Ok(cfg) => Ok(cfg),
        Err(err) => {
            // The file existed but was unreadable: warn and retry with env only
            if std::path::Path::new(CONFIG_FILE).exists() {
                log::warn!("failed to load config file, falling back to env. Error: {err}");
            }
            Config::builder()
                .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
                .build()
                .map_err(|env_err| {
                    ConfigError::Message(format!(
                        "Failed to load configuration from file and env: {err}, then env-only error: {env_err}"
                    ))
                })
        }
    }
}

/// A missing section yields the section's defaults; a malformed one is an error.
fn load_section<T>(section: &str) -> Result<T, ConfigError>
where
    T: DeserializeOwned + Default,
{
    let settings = settings()?;
    match settings.get::<T>(section) {
        Ok(value) => Ok(value),
        Err(ConfigError::NotFound(_)) => {
            log::debug!("no `{section}` configuration found, using defaults");
            Ok(T::default())
        }
        Err(e) => Err(ConfigError::Message(format!(
            "`{section}` configuration could not be loaded from file or environment: {e}"
        ))),
    }
}
