use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    pub amm_subgraph_url: String,
    pub staking_subgraph_url: String,
    pub request_timeout: Duration,
    pub retry_max_elapsed: Duration,
    pub staking_token: StakingTokenConfig,
    /// Second reward token of the staking pools, when configured.
    pub staking_reward_token: Option<StakingTokenConfig>,
}

/// The asset staked on the staking platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StakingTokenConfig {
    pub address: String,
    pub symbol: String,
    pub decimals: u8,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let port = env_map
            .get("PORT")
            .map(|s| s.as_str())
            .unwrap_or("8080")
            .parse::<u16>()
            .map_err(|_| {
                ConfigError::InvalidValue("PORT".to_string(), "must be a valid u16".to_string())
            })?;

        let database_path = required(&env_map, "DATABASE_PATH")?;
        let amm_subgraph_url = required(&env_map, "AMM_SUBGRAPH_URL")?;
        let staking_subgraph_url = required(&env_map, "STAKING_SUBGRAPH_URL")?;

        let request_timeout = Duration::from_millis(millis(&env_map, "REQUEST_TIMEOUT_MS", "30000")?);
        let retry_max_elapsed =
            Duration::from_millis(millis(&env_map, "RETRY_MAX_ELAPSED_MS", "30000")?);

        let staking_token = StakingTokenConfig {
            address: required(&env_map, "STAKING_TOKEN_ADDRESS")?,
            symbol: symbol(&env_map, "STAKING_TOKEN_SYMBOL", "ADX"),
            decimals: decimals(&env_map, "STAKING_TOKEN_DECIMALS")?,
        };
        let staking_reward_token = match env_map.get("STAKING_REWARD_TOKEN_ADDRESS") {
            Some(address) => Some(StakingTokenConfig {
                address: address.clone(),
                symbol: symbol(&env_map, "STAKING_REWARD_TOKEN_SYMBOL", "DAI"),
                decimals: decimals(&env_map, "STAKING_REWARD_TOKEN_DECIMALS")?,
            }),
            None => None,
        };

        Ok(Config {
            port,
            database_path,
            amm_subgraph_url,
            staking_subgraph_url,
            request_timeout,
            retry_max_elapsed,
            staking_token,
            staking_reward_token,
        })
    }
}

fn required(env_map: &HashMap<String, String>, key: &str) -> Result<String, ConfigError> {
    env_map
        .get(key)
        .cloned()
        .ok_or_else(|| ConfigError::MissingEnv(key.to_string()))
}

fn symbol(env_map: &HashMap<String, String>, key: &str, default: &str) -> String {
    env_map
        .get(key)
        .cloned()
        .unwrap_or_else(|| default.to_string())
}

fn decimals(env_map: &HashMap<String, String>, key: &str) -> Result<u8, ConfigError> {
    env_map
        .get(key)
        .map(|s| s.as_str())
        .unwrap_or("18")
        .parse::<u8>()
        .map_err(|_| ConfigError::InvalidValue(key.to_string(), "must be a valid u8".to_string()))
}

fn millis(env_map: &HashMap<String, String>, key: &str, default: &str) -> Result<u64, ConfigError> {
    env_map
        .get(key)
        .map(|s| s.as_str())
        .unwrap_or(default)
        .parse::<u64>()
        .map_err(|_| ConfigError::InvalidValue(key.to_string(), "must be a valid u64".to_string()))
}
