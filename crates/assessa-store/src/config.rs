//! Configuration loading and engine factory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use assessa_core::{AssessmentEngine, EngineConfig, ResubmitPolicy};

use crate::json_dir::JsonDirStore;

/// Top-level assessa configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssessaConfig {
    /// Directory holding surveys, banks, entitlements and responses.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Whether a second submit of the same response is rejected.
    #[serde(default)]
    pub resubmission: ResubmitPolicy,
    /// Default tracing filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./assessa-data")
}
fn default_log_filter() -> String {
    "assessa=info".to_string()
}

impl Default for AssessaConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            resubmission: ResubmitPolicy::default(),
            log_filter: default_log_filter(),
        }
    }
}

impl AssessaConfig {
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            resubmission: self.resubmission,
        }
    }

    /// Open the data directory and build an engine over it.
    pub async fn open_engine(&self) -> Result<(AssessmentEngine, Arc<JsonDirStore>)> {
        let store = Arc::new(JsonDirStore::open(&self.data_dir).await.with_context(|| {
            format!("failed to open data directory {}", self.data_dir.display())
        })?);
        let engine = AssessmentEngine::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            self.engine_config(),
        );
        Ok((engine, store))
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
///
/// Substituted values are not scanned again.
fn resolve_env_vars(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find("${") {
        let Some(end) = rest[start..].find('}') else {
            break;
        };
        result.push_str(&rest[..start]);
        let name = &rest[start + 2..start + end];
        result.push_str(&std::env::var(name).unwrap_or_default());
        rest = &rest[start + end + 1..];
    }
    result.push_str(rest);
    result
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `assessa.toml` in the current directory
/// 2. `~/.config/assessa/config.toml`
///
/// `ASSESSA_DATA_DIR` overrides `data_dir`.
pub fn load_config() -> Result<AssessaConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<AssessaConfig> {
    let config_path = match path {
        Some(p) if p.exists() => Some(p.to_path_buf()),
        Some(p) => anyhow::bail!("config file not found: {}", p.display()),
        None => {
            let local = PathBuf::from("assessa.toml");
            if local.exists() {
                Some(local)
            } else {
                dirs_path()
                    .map(|home| home.join("config.toml"))
                    .filter(|global| global.exists())
            }
        }
    };

    let mut config = match &config_path {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            toml::from_str::<AssessaConfig>(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => AssessaConfig::default(),
    };

    if let Ok(dir) = std::env::var("ASSESSA_DATA_DIR") {
        config.data_dir = PathBuf::from(dir);
    }

    config.data_dir = PathBuf::from(resolve_env_vars(&config.data_dir.to_string_lossy()));
    config.log_filter = resolve_env_vars(&config.log_filter);

    tracing::debug!(
        path = ?config_path,
        data_dir = %config.data_dir.display(),
        "configuration loaded"
    );
    Ok(config)
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("assessa"))
}
