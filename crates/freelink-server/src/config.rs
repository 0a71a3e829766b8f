use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::warn;

const DEV_SECRET: &str = "dev-secret-change-me";

/// Server settings, read from the environment (and `.env` if present).
#[derive(Debug, Clone)]
pub struct Config {
    pub jwt_secret: String,
    pub db_path: PathBuf,
    pub host: String,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let jwt_secret = lookup("FREELINK_JWT_SECRET").unwrap_or_else(|| DEV_SECRET.into());
        if jwt_secret == DEV_SECRET {
            warn!("FREELINK_JWT_SECRET is not set, using the development secret");
        }

        let db_path = lookup("FREELINK_DB_PATH").unwrap_or_else(|| "freelink.db".into());
        let host = lookup("FREELINK_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port = match lookup("FREELINK_PORT") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("FREELINK_PORT is not a valid port: {raw}"))?,
            None => 3000,
        };

        Ok(Self {
            jwt_secret,
            db_path: PathBuf::from(db_path),
            host,
            port,
        })
    }

    pub fn addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }
}
