use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};
use crate::schema::EntityConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub entities: EntitiesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntitiesConfig {
    /// Directory scanned for `*.json` entity definitions
    pub dir: PathBuf,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            database: DatabaseConfig {
                url: env::var("DATABASE_URL")
                    .unwrap_or_else(|_| "sqlite:data/entities.db".to_string()),
            },
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("SERVER_PORT")
                    .unwrap_or_else(|_| "3000".to_string())
                    .parse()
                    .unwrap_or(3000),
            },
            entities: EntitiesConfig {
                dir: env::var("ENTITY_CONFIG_DIR")
                    .unwrap_or_else(|_| "entities".to_string())
                    .into(),
            },
        })
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

/// Read every `*.json` file in `dir` as an entity definition, sorted by file name
pub fn load_entity_configs(dir: &Path) -> AppResult<Vec<EntityConfig>> {
    let entries = std::fs::read_dir(dir).map_err(|e| {
        AppError::ConfigurationError(format!("cannot read entity directory {}: {}", dir.display(), e))
    })?;

    let mut paths = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|e| AppError::ConfigurationError(format!("cannot list {}: {}", dir.display(), e)))?
            .path();
        if path.extension().is_some_and(|ext| ext == "json") {
            paths.push(path);
        }
    }
    paths.sort();

    let mut configs = Vec::with_capacity(paths.len());
    for path in paths {
        let raw = std::fs::read_to_string(&path).map_err(|e| {
            AppError::ConfigurationError(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: EntityConfig = serde_json::from_str(&raw).map_err(|e| {
            AppError::ConfigurationError(format!("invalid entity config {}: {}", path.display(), e))
        })?;
        tracing::debug!("Loaded entity config {} from {}", config.entity_name, path.display());
        configs.push(config);
    }

    Ok(configs)
}
