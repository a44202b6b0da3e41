// src/config.rs
use dotenvy::dotenv;
use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use thiserror::Error;

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3030";
const DEFAULT_SCYLLA_NODE: &str = "127.0.0.1:9042";
const DEFAULT_KEYSPACE: &str = "stock_tracker";
const DEFAULT_BCRYPT_COST: u32 = 10;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StoreBackend {
    Scylla,
    /// Nothing survives a restart.
    Memory,
}

impl FromStr for StoreBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "scylla" => Ok(StoreBackend::Scylla),
            "memory" => Ok(StoreBackend::Memory),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub jwt_secret: String,
    pub store: StoreBackend,
    pub scylla_node: String,
    pub keyspace: String,
    pub bcrypt_cost: u32,
}

impl Config {
    /// Reads `.env` when present, then the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let jwt_secret = lookup("JWT_SECRET")
            .filter(|secret| !secret.is_empty())
            .ok_or(ConfigError::Missing("JWT_SECRET"))?;

        let bind_addr = parse(&lookup, "BIND_ADDR", DEFAULT_BIND_ADDR)?;
        let store = parse(&lookup, "STORE_BACKEND", "scylla")?;
        let bcrypt_cost: u32 = parse(&lookup, "BCRYPT_COST", &DEFAULT_BCRYPT_COST.to_string())?;
        if !(4..=31).contains(&bcrypt_cost) {
            return Err(ConfigError::Invalid {
                name: "BCRYPT_COST",
                value: bcrypt_cost.to_string(),
            });
        }

        let keyspace = lookup("SCYLLA_KEYSPACE").unwrap_or_else(|| DEFAULT_KEYSPACE.to_string());
        // Interpolated into CQL statements.
        if keyspace.is_empty() || !keyspace.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(ConfigError::Invalid {
                name: "SCYLLA_KEYSPACE",
                value: keyspace,
            });
        }

        Ok(Config {
            bind_addr,
            jwt_secret,
            store,
            scylla_node: lookup("SCYLLA_NODE").unwrap_or_else(|| DEFAULT_SCYLLA_NODE.to_string()),
            keyspace,
            bcrypt_cost,
        })
    }
}

fn parse<F, T>(lookup: &F, name: &'static str, default: &str) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    let raw = lookup(name).unwrap_or_else(|| default.to_string());
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::Invalid { name, value: raw })
}
