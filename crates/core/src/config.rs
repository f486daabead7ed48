use std::env;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub clickhouse_addr: String,
    pub clickhouse_db: String,
    pub clickhouse_username: String,
    pub clickhouse_password: String,
    pub receiver_addr: String,
    pub api_addr: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            clickhouse_addr: "localhost:8123".to_string(),
            clickhouse_db: "default".to_string(),
            clickhouse_username: "default".to_string(),
            clickhouse_password: String::new(),
            receiver_addr: "0.0.0.0:4318".to_string(),
            api_addr: "0.0.0.0:3000".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(v) = env::var("CLICKHOUSE_ADDR") {
            cfg.clickhouse_addr = v;
        }
        if let Ok(v) = env::var("CLICKHOUSE_DB") {
            cfg.clickhouse_db = v;
        }
        if let Ok(v) = env::var("CLICKHOUSE_USERNAME") {
            cfg.clickhouse_username = v;
        }
        if let Ok(v) = env::var("CLICKHOUSE_PASSWORD") {
            cfg.clickhouse_password = v;
        }
        if let Ok(v) = env::var("RECEIVER_ADDR") {
            cfg.receiver_addr = v;
        }
        if let Ok(v) = env::var("API_ADDR") {
            cfg.api_addr = v;
        }

        cfg
    }

    /// The store client speaks HTTP; a bare host:port gets the scheme
    /// prepended.
    pub fn clickhouse_url(&self) -> String {
        if self.clickhouse_addr.starts_with("http://")
            || self.clickhouse_addr.starts_with("https://")
        {
            self.clickhouse_addr.clone()
        } else {
            format!("http://{}", self.clickhouse_addr)
        }
    }
}
