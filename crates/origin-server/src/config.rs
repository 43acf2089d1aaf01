use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub limit: LimitConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PoolConfig {
    /// 0 means auto-size from the CPU count.
    #[serde(default)]
    pub workers: usize,
    #[serde(default = "default_backlog")]
    pub backlog: usize,
    #[serde(default = "default_grace_ms")]
    pub grace_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: u64,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LimitConfig {
    #[serde(default = "default_rate")]
    pub rate_per_second: f64,
    #[serde(default = "default_burst")]
    pub burst: f64,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    pub fn default_config() -> Self {
        Config {
            server: ServerConfig::default(),
            pool: PoolConfig::default(),
            cache: CacheConfig::default(),
            limit: LimitConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            read_timeout_ms: default_read_timeout_ms(),
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            backlog: default_backlog(),
            grace_ms: default_grace_ms(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            ttl_seconds: default_ttl_seconds(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl Default for LimitConfig {
    fn default() -> Self {
        Self {
            rate_per_second: default_rate(),
            burst: default_burst(),
        }
    }
}

fn default_port() -> u16 {
    8080
}

fn default_read_timeout_ms() -> u64 {
    15_000
}

fn default_backlog() -> usize {
    1024
}

fn default_grace_ms() -> u64 {
    5_000
}

fn default_capacity() -> usize {
    1024
}

fn default_ttl_seconds() -> u64 {
    30
}

fn default_max_body_bytes() -> usize {
    1_000_000
}

fn default_rate() -> f64 {
    50.0
}

fn default_burst() -> f64 {
    100.0
}
