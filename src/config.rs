// config.rs
// Runtime settings read from the environment (after dotenv has loaded .env).

use std::{env, net::SocketAddr, path::PathBuf};

use anyhow::{Context, Result};

use crate::ledger::reconciler::DEFAULT_WRITE_RETRIES;

#[derive(Debug, Clone)]
pub struct Config {
    pub mongodb_uri: String,
    pub mongodb_db: String,
    pub courses_file: PathBuf,
    pub bind_addr: SocketAddr,
    pub ledger_write_retries: u32,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mongodb_uri =
            lookup("MONGODB_URI").unwrap_or_else(|| "mongodb://localhost:27017".to_string());
        let mongodb_db = lookup("MONGODB_DB").unwrap_or_else(|| "coachdesk".to_string());
        let courses_file = lookup("COURSES_FILE")
            .unwrap_or_else(|| "./data/courses.json".to_string())
            .into();

        let bind_addr = match lookup("BIND_ADDR") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("BIND_ADDR is not a socket address: {raw}"))?,
            None => SocketAddr::from(([0, 0, 0, 0], 8080)),
        };
        let ledger_write_retries = match lookup("LEDGER_WRITE_RETRIES") {
            Some(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("LEDGER_WRITE_RETRIES must be a number: {raw}"))?,
            None => DEFAULT_WRITE_RETRIES,
        };

        Ok(Config {
            mongodb_uri,
            mongodb_db,
            courses_file,
            bind_addr,
            ledger_write_retries,
        })
    }
}
