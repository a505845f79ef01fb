//! 本地灯具配置文件字典
//!
//! 型号名 -> 配置文件路径。导入时可以用字典中的规范配置文件替换
//! 文档自带的配置文件，或者在冲突时交给调用方逐个型号选择。

use crate::error::FileError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileDictionary {
    entries: BTreeMap<String, PathBuf>,
}

impl ProfileDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// 读取 JSON 字典，相对路径按字典文件所在目录解析
    pub fn load(path: &Path) -> Result<Self, FileError> {
        let text = std::fs::read_to_string(path)?;
        let base = path.parent().unwrap_or_else(|| Path::new(""));
        let entries: BTreeMap<String, PathBuf> = serde_json::from_str::<BTreeMap<String, PathBuf>>(&text)?
            .into_iter()
            .map(|(name, profile)| {
                let profile = if profile.is_relative() { base.join(profile) } else { profile };
                (name, profile)
            })
            .collect();
        tracing::info!("Loaded {} profile dictionary entries from {}", entries.len(), path.display());
        Ok(Self { entries })
    }

    pub fn save(&self, path: &Path) -> Result<(), FileError> {
        std::fs::write(path, serde_json::to_string_pretty(&self.entries)?)?;
        Ok(())
    }

    pub fn insert(&mut self, type_name: impl Into<String>, profile: impl Into<PathBuf>) {
        self.entries.insert(type_name.into(), profile.into());
    }

    pub fn lookup(&self, type_name: &str) -> Option<&Path> {
        self.entries.get(type_name).map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// 冲突时的选择
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileChoice {
    /// 保留文档自带的配置文件
    Bundled,
    /// 使用字典中的配置文件
    Dictionary,
}

/// 由调用方（通常是界面）决定每个冲突型号使用哪份配置文件
pub trait ConflictResolver {
    fn choose(&mut self, type_name: &str, bundled: &Path, dictionary: &Path) -> ProfileChoice;
}

/// 总是保留文档自带的配置文件
#[derive(Debug, Default)]
pub struct PreferBundled;

impl ConflictResolver for PreferBundled {
    fn choose(&mut self, _type_name: &str, _bundled: &Path, _dictionary: &Path) -> ProfileChoice {
        ProfileChoice::Bundled
    }
}

/// 总是使用字典中的配置文件
#[derive(Debug, Default)]
pub struct PreferDictionary;

impl ConflictResolver for PreferDictionary {
    fn choose(&mut self, _type_name: &str, _bundled: &Path, _dictionary: &Path) -> ProfileChoice {
        ProfileChoice::Dictionary
    }
}
