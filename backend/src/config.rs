use crate::error::ConfigError;
use crate::inference::DetectorConfig;
use std::path::PathBuf;

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Process settings taken from the environment (and `.env`).
#[derive(Debug, Clone, PartialEq)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub config_path: PathBuf,
    pub model_path: Option<PathBuf>,
    pub labels_path: Option<PathBuf>,
    pub static_dir: Option<PathBuf>,
    pub max_upload_bytes: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8081,
            config_path: PathBuf::from("config/detector.yaml"),
            model_path: None,
            labels_path: None,
            static_dir: None,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl ServerSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port = match var("PORT") {
            Some(value) => value
                .trim()
                .parse()
                .map_err(|_| ConfigError::Env { key: "PORT", value })?,
            None => defaults.port,
        };
        let max_upload_bytes = match var("MAX_UPLOAD_BYTES") {
            Some(value) => match value.trim().parse::<usize>() {
                Ok(limit) if limit > 0 => limit,
                _ => {
                    return Err(ConfigError::Env {
                        key: "MAX_UPLOAD_BYTES",
                        value,
                    });
                }
            },
            None => defaults.max_upload_bytes,
        };

        Ok(Self {
            host: var("HOST").unwrap_or(defaults.host),
            port,
            config_path: var("DETECTOR_CONFIG")
                .map(PathBuf::from)
                .unwrap_or(defaults.config_path),
            model_path: var("MODEL_PATH").map(PathBuf::from),
            labels_path: var("LABELS_PATH").map(PathBuf::from),
            static_dir: var("STATIC_DIR").map(PathBuf::from),
            max_upload_bytes,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Environment wins over the YAML file for the paths it names.
    pub fn apply_overrides(&self, config: &mut DetectorConfig) {
        if let Some(path) = &self.model_path {
            config.model.path = path.clone();
        }
        if let Some(path) = &self.labels_path {
            config.model.labels_path = Some(path.clone());
        }
    }
}
