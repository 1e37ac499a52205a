//! # Configuration Sources

use crate::config::InferenceConfig;
use crate::errors::{InferError, InferResult};
use burn::config::Config;
use serde_json::Value;
use std::path::{Path, PathBuf};

/// A configuration file path, or an already-parsed configuration.
#[derive(Debug, Clone)]
pub enum ConfigSource {
    /// Path to a JSON config file.
    Path(PathBuf),

    /// An in-memory config.
    Config(InferenceConfig),
}

impl ConfigSource {
    /// Load the source into an [`InferenceConfig`].
    pub fn load(self) -> InferResult<InferenceConfig> {
        match self {
            Self::Config(config) => Ok(config),
            Self::Path(path) => {
                tracing::debug!(path = %path.display(), "loading config");
                InferenceConfig::load(&path).map_err(|err| InferError::ConfigLoad {
                    message: err.to_string(),
                    path,
                })
            }
        }
    }
}

impl From<InferenceConfig> for ConfigSource {
    fn from(config: InferenceConfig) -> Self {
        Self::Config(config)
    }
}

impl From<PathBuf> for ConfigSource {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

impl From<&Path> for ConfigSource {
    fn from(path: &Path) -> Self {
        Self::Path(path.to_path_buf())
    }
}

impl From<&str> for ConfigSource {
    fn from(path: &str) -> Self {
        Self::Path(PathBuf::from(path))
    }
}

impl From<String> for ConfigSource {
    fn from(path: String) -> Self {
        Self::Path(PathBuf::from(path))
    }
}

/// Dynamically typed sources: strings are paths, objects are configs.
///
/// Any other JSON type is an [`InferError::ConfigType`] error.
impl TryFrom<Value> for ConfigSource {
    type Error = InferError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::String(path) => Ok(Self::Path(PathBuf::from(path))),
            Value::Object(_) => Ok(Self::Config(serde_json::from_value(value).map_err(
                |err| InferError::ConfigLoad {
                    path: PathBuf::from("<object>"),
                    message: err.to_string(),
                },
            )?)),
            other => Err(InferError::ConfigType {
                found: json_type_name(&other).to_string(),
            }),
        }
    }
}

/// Name a JSON value's type the way a config author would read it.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "NoneType",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "str",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}
