use std::{collections::HashMap, fmt::Display, str::FromStr};

use anyhow::{Result, anyhow};
use dotenv::*;

/// Key under which the durable state file path is configured.
pub const STORE_PATH: &str = "HOMEZONE_STORE_PATH";
/// Seconds between two background position checks.
pub const POLL_INTERVAL_SECS: &str = "HOMEZONE_POLL_INTERVAL_SECS";
pub const RUST_LOG: &str = "RUST_LOG";

pub trait Config: Send + Sync {
    fn get(&self, key: &str) -> Result<String>;
}

/// Looks up `key` and parses it into `T`.
pub fn get_parsed<T>(config: &dyn Config, key: &str) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    let raw = config.get(key)?;
    raw.trim()
        .parse::<T>()
        .map_err(|e| anyhow!("invalid value '{raw}' for {key}: {e}"))
}

/// Asks each layer in turn, the first one that knows the key wins.
pub struct CompositeConfig {
    layers: Vec<Box<dyn Config>>,
}

impl CompositeConfig {
    pub fn new(layers: Vec<Box<dyn Config>>) -> CompositeConfig {
        CompositeConfig { layers }
    }
}

impl Config for CompositeConfig {
    fn get(&self, key: &str) -> Result<String> {
        self.layers
            .iter()
            .find_map(|layer| layer.get(key).ok())
            .ok_or_else(|| anyhow!("{key} is not configured"))
    }
}

/// Process environment, after loading a `.env` file if there is one.
pub struct EnvConfig;

impl EnvConfig {
    pub fn from_env() -> EnvConfig {
        // logging is not up yet, so report on stdout
        match dotenv() {
            Ok(path) => {
                let path = path.to_string_lossy();
                println!("additional environment variables loaded from {path}");
            }
            Err(e) => {
                println!("no .env file loaded: {e}");
            }
        }

        EnvConfig
    }
}

impl Config for EnvConfig {
    fn get(&self, key: &str) -> Result<String> {
        std::env::var(key).map_err(|_| anyhow!("no such environment variable {key}"))
    }
}

pub fn default_config() -> HashMapConfig {
    HashMapConfig::from_pairs(&[
        (STORE_PATH, "homezone-state.json"),
        (POLL_INTERVAL_SECS, "10"),
        (RUST_LOG, "info"),
    ])
}

pub struct HashMapConfig {
    map: HashMap<String, String>,
}

impl HashMapConfig {
    pub fn new(map: HashMap<String, String>) -> HashMapConfig {
        Self { map }
    }

    pub fn from_pairs(pairs: &[(&str, &str)]) -> HashMapConfig {
        Self::new(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }
}

impl Config for HashMapConfig {
    fn get(&self, key: &str) -> Result<String> {
        self.map
            .get(key)
            .cloned()
            .ok_or_else(|| anyhow!("key '{key}' not found"))
    }
}
