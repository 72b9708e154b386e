use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::error::{IndexError, Result};
use crate::storage::log::LogOptions;

/// forward index 配置（TOML）
///
/// ```toml
/// path = "/var/lib/fwd-index/forward.log"
/// compaction_garbage_ratio = 0.5
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ForwardIndexConfig {
    pub path: PathBuf,
    /// 垃圾字节占 log 的比例超过该值时触发 compaction
    pub compaction_garbage_ratio: f64,
    /// log 小于该值时不做 compaction
    pub compaction_min_bytes: u64,
    /// force() 是否 fsync
    pub sync_on_force: bool,
}

impl Default for ForwardIndexConfig {
    fn default() -> Self {
        Self {
            path: default_log_path(),
            compaction_garbage_ratio: 0.5,
            compaction_min_bytes: 1024 * 1024,
            sync_on_force: true,
        }
    }
}

fn default_log_path() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("fwd-index").join("forward.log"))
        .unwrap_or_else(|| PathBuf::from("forward.log"))
}

impl ForwardIndexConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let cfg = Self::from_toml_str(&text)?;
        tracing::info!("Loaded forward index config from {}", path.display());
        Ok(cfg)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let cfg: Self = toml::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.compaction_garbage_ratio > 0.0 && self.compaction_garbage_ratio <= 1.0) {
            return Err(IndexError::Config(format!(
                "compaction_garbage_ratio must be in (0, 1], got {}",
                self.compaction_garbage_ratio
            )));
        }
        Ok(())
    }

    pub fn log_options(&self) -> LogOptions {
        LogOptions {
            compaction_garbage_ratio: self.compaction_garbage_ratio,
            compaction_min_bytes: self.compaction_min_bytes,
            sync_on_force: self.sync_on_force,
        }
    }
}
