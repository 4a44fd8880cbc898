use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::pipeline::aggregate::DEFAULT_MAX_TILES;
use crate::pipeline::geometry::DEFAULT_TILE_EDGE;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable {0}")]
    Missing(&'static str),
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Tiling parameters handed to the analysis pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub tile_edge: u32,
    pub max_tiles: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            tile_edge: DEFAULT_TILE_EDGE,
            max_tiles: DEFAULT_MAX_TILES,
        }
    }
}

impl AnalysisConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let config_str = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&config_str)
    }

    pub fn from_yaml(config_str: &str) -> Result<Self, ConfigError> {
        let config: AnalysisConfig = serde_yaml::from_str(config_str)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tile_edge == 0 {
            return Err(ConfigError::InvalidValue {
                key: "tile_edge",
                value: self.tile_edge.to_string(),
            });
        }
        if self.max_tiles == 0 {
            return Err(ConfigError::InvalidValue {
                key: "max_tiles",
                value: self.max_tiles.to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub jwt_secret: String,
    pub token_expiry_minutes: i64,
    /// Reject requests without a valid token instead of treating them as the guest.
    pub require_login: bool,
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub allowed_origins: Vec<String>,
    pub analysis: AnalysisConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let jwt_secret = lookup("JWT_SECRET")
            .filter(|s| !s.trim().is_empty())
            .ok_or(ConfigError::Missing("JWT_SECRET"))?;

        let mut analysis = match lookup("ANALYSIS_CONFIG") {
            Some(path) => AnalysisConfig::load(path)?,
            None => AnalysisConfig::default(),
        };
        if let Some(tile_edge) = parse_var(&lookup, "TILE_EDGE")? {
            analysis.tile_edge = tile_edge;
        }
        if let Some(max_tiles) = parse_var(&lookup, "MAX_TILES")? {
            analysis.max_tiles = max_tiles;
        }
        analysis.validate()?;

        let max_upload_mb: usize = parse_var(&lookup, "MAX_UPLOAD_MB")?.unwrap_or(50);
        let max_upload_bytes = max_upload_mb.checked_mul(1024 * 1024).ok_or_else(|| {
            ConfigError::InvalidValue {
                key: "MAX_UPLOAD_MB",
                value: max_upload_mb.to_string(),
            }
        })?;

        let allowed_origins = lookup("ALLOWED_ORIGINS")
            .unwrap_or_else(|| "http://localhost:3000,http://127.0.0.1:3000".to_string())
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(String::from)
            .collect();

        Ok(Self {
            port: parse_var(&lookup, "PORT")?.unwrap_or(8081),
            jwt_secret,
            token_expiry_minutes: parse_var(&lookup, "ACCESS_TOKEN_EXPIRE_MINUTES")?.unwrap_or(60),
            require_login: parse_var(&lookup, "REQUIRE_LOGIN")?.unwrap_or(false),
            upload_dir: lookup("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./uploads")),
            max_upload_bytes,
            allowed_origins,
            analysis,
        })
    }
}

fn parse_var<F, T>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { key, value }),
        None => Ok(None),
    }
}
