//! Environment configuration
//!
//! The stores never read the environment themselves; everything they need is
//! resolved here and handed to their constructors.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use tt_core::PoolSettings;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} value not set")]
    Missing(&'static str),

    #[error("{name} has invalid value '{value}'")]
    Invalid { name: &'static str, value: String },
}

/// Which backend to run against
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreKind {
    Postgres { url: String },
    Sqlite { path: PathBuf, init_script: Option<PathBuf> },
    Memory,
}

impl StoreKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Postgres { .. } => "postgres",
            Self::Sqlite { .. } => "sqlite",
            Self::Memory => "memory",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub store: StoreKind,
    pub pool: PoolSettings,
    pub op_timeout: Duration,
    pub addr: SocketAddr,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &'static str| -> Option<String> {
            lookup(name)
                .map(|raw| raw.trim().to_string())
                .filter(|raw| !raw.is_empty())
        };

        let store = match get("TIMETRACKER_STORE").as_deref().unwrap_or("sqlite") {
            "postgres" => StoreKind::Postgres {
                url: postgres_url(&get)?,
            },
            "sqlite" => StoreKind::Sqlite {
                path: get("TIMETRACKER_SQLITE_PATH")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("./timetracker.db")),
                init_script: get("TIMETRACKER_SQLITE_INIT").map(PathBuf::from),
            },
            "memory" => StoreKind::Memory,
            other => {
                return Err(ConfigError::Invalid {
                    name: "TIMETRACKER_STORE",
                    value: other.to_string(),
                })
            }
        };

        let op_timeout = Duration::from_millis(parse_or(&get, "TIMETRACKER_OP_TIMEOUT_MS", 5000u64)?);
        let pool = PoolSettings {
            max_connections: parse_or(&get, "TIMETRACKER_DB_MAX_CONNECTIONS", 5u32)?,
            acquire_timeout: op_timeout,
        };

        let ip: IpAddr = parse_or(&get, "TIMETRACKER_BIND", IpAddr::from([127, 0, 0, 1]))?;
        let port: u16 = parse_or(&get, "TIMETRACKER_PORT", 4000u16)?;

        Ok(Self {
            store,
            pool,
            op_timeout,
            addr: SocketAddr::new(ip, port),
        })
    }
}

fn parse_or<G, T>(get: &G, name: &'static str, default: T) -> Result<T, ConfigError>
where
    G: Fn(&'static str) -> Option<String>,
    T: FromStr,
{
    match get(name) {
        Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid { name, value: raw }),
        None => Ok(default),
    }
}

fn postgres_url<G>(get: &G) -> Result<String, ConfigError>
where
    G: Fn(&'static str) -> Option<String>,
{
    if let Some(url) = get("TIMETRACKER_DATABASE_URL") {
        return Ok(url);
    }

    let host = get("TIMETRACKER_DB_HOST").ok_or(ConfigError::Missing("TIMETRACKER_DB_HOST"))?;
    let port: u16 = get("TIMETRACKER_DB_PORT")
        .ok_or(ConfigError::Missing("TIMETRACKER_DB_PORT"))
        .and_then(|raw| {
            raw.parse().map_err(|_| ConfigError::Invalid {
                name: "TIMETRACKER_DB_PORT",
                value: raw,
            })
        })?;
    let user = get("TIMETRACKER_DB_USER").ok_or(ConfigError::Missing("TIMETRACKER_DB_USER"))?;
    let dbname = get("TIMETRACKER_DB_NAME").ok_or(ConfigError::Missing("TIMETRACKER_DB_NAME"))?;
    let user = urlencoding::encode(&user);
    let credentials = match get("TIMETRACKER_DB_PASSWORD") {
        Some(password) => format!("{user}:{}", urlencoding::encode(&password)),
        None => user.into_owned(),
    };

    Ok(format!(
        "postgres://{credentials}@{host}:{port}/{}?sslmode=disable",
        urlencoding::encode(&dbname)
    ))
}
