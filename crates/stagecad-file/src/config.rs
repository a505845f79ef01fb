//! 交换设置
//!
//! 以 JSON 存储，缺失字段取默认值。

use crate::archive::DEFAULT_COMPRESSION_LEVEL;
use crate::error::FileError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterchangeConfig {
    /// 场景自身未填写时写入的提供方
    pub provider: String,
    pub provider_version: String,
    /// 导入时按型号名套用本地配置文件字典
    pub apply_dictionary: bool,
    /// 与字典冲突时逐个型号询问
    pub prompt_conflicts: bool,
    pub dictionary_path: Option<PathBuf>,
    pub compression_level: i64,
    pub log_file: PathBuf,
}

impl Default for InterchangeConfig {
    fn default() -> Self {
        Self {
            provider: "stagecad".to_string(),
            provider_version: env!("CARGO_PKG_VERSION").to_string(),
            apply_dictionary: false,
            prompt_conflicts: false,
            dictionary_path: None,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            log_file: PathBuf::from("stagecad.log"),
        }
    }
}

impl InterchangeConfig {
    pub fn load(path: &Path) -> Result<Self, FileError> {
        let text = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&text)?;
        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), FileError> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}
