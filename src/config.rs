use anyhow::Context;

pub const DEFAULT_MAX_TABLE_BYTES: usize = 50 * 1024 * 1024;
pub const DEFAULT_GRID_PATH: &str = "/bid-simulation";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: Option<String>,
    pub max_table_bytes: usize,
    pub grid_path: String,
    pub max_connections: u32,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let max_table_bytes = match lookup("BID_RCA_MAX_TABLE_BYTES") {
            Some(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("BID_RCA_MAX_TABLE_BYTES must be a byte count, got {raw:?}"))?,
            None => DEFAULT_MAX_TABLE_BYTES,
        };
        let max_connections = match lookup("BID_RCA_MAX_CONNECTIONS") {
            Some(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("BID_RCA_MAX_CONNECTIONS must be a number, got {raw:?}"))?,
            None => DEFAULT_MAX_CONNECTIONS,
        };

        Ok(Self {
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            max_table_bytes,
            grid_path: lookup("BID_RCA_GRID_PATH").unwrap_or_else(|| DEFAULT_GRID_PATH.to_string()),
            max_connections,
        })
    }

    pub fn database_url(&self) -> anyhow::Result<&str> {
        self.database_url
            .as_deref()
            .context("DATABASE_URL must be set to a Postgres instance")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> anyhow::Result<AppConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = config(&[]).unwrap();
        assert_eq!(config.max_table_bytes, DEFAULT_MAX_TABLE_BYTES);
        assert_eq!(config.grid_path, DEFAULT_GRID_PATH);
        assert_eq!(config.max_connections, 5);
        assert!(config.database_url().is_err());
    }

    #[test]
    fn reads_overrides() {
        let config = config(&[
            ("DATABASE_URL", "postgres://localhost/bids"),
            ("BID_RCA_MAX_TABLE_BYTES", "1024"),
            ("BID_RCA_GRID_PATH", "/grid"),
        ])
        .unwrap();
        assert_eq!(config.database_url().unwrap(), "postgres://localhost/bids");
        assert_eq!(config.max_table_bytes, 1024);
        assert_eq!(config.grid_path, "/grid");
    }

    #[test]
    fn rejects_bad_numbers() {
        assert!(config(&[("BID_RCA_MAX_TABLE_BYTES", "lots")]).is_err());
    }
}
