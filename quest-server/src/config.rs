use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{QuestError, QuestResult};

/// Environment variable naming the config file
pub const CONFIG_PATH_ENV: &str = "REVERIE_QUESTS_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/server.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    pub database_url: String,
    /// Seed quests live under `<data_dir>/quests`
    pub data_dir: PathBuf,
    pub hot_reload: bool,
    /// Directive added to the `RUST_LOG` filter
    pub log_directive: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 2568)),
            database_url: "sqlite:quests.db?mode=rwc".to_string(),
            data_dir: PathBuf::from("data"),
            hot_reload: cfg!(debug_assertions),
            log_directive: "reverie_quest_server=info".to_string(),
        }
    }
}

impl ServerConfig {
    /// Path from `REVERIE_QUESTS_CONFIG`, or `config/server.toml`
    pub fn path() -> PathBuf {
        std::env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
    }

    /// A missing file gives the defaults. Unset keys keep their defaults.
    pub fn try_load_from(path: &Path) -> QuestResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|source| QuestError::Io {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&content).map_err(|e| QuestError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let config = ServerConfig::try_load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.listen_addr.port(), 2568);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("server.toml");
        fs::write(
            &path,
            "listen_addr = \"127.0.0.1:9000\"\ndata_dir = \"seeds\"\nhot_reload = false\n",
        )
        .unwrap();

        let config = ServerConfig::try_load_from(&path).unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:9000".parse().unwrap());
        assert_eq!(config.data_dir, PathBuf::from("seeds"));
        assert!(!config.hot_reload);
        assert_eq!(config.database_url, "sqlite:quests.db?mode=rwc");
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("server.toml");
        fs::write(&path, "listen_addr = [not valid").unwrap();
        assert!(matches!(
            ServerConfig::try_load_from(&path),
            Err(QuestError::Parse { .. })
        ));
    }
}
