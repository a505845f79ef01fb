//! 资源登记表
//!
//! 把任意源文件路径映射为压缩包内唯一、无冲突的条目路径：
//! - 按规范化后的绝对源路径去重，首次登记的条目路径生效；
//! - 条目路径冲突时在文件名主干后追加 ` (n)`，n 从 1 递增；
//! - 冲突比较不区分大小写（解压到不区分大小写的文件系统时不会互相覆盖）。

use std::collections::{HashMap, HashSet};
use std::path::{Component, Path, PathBuf};

/// 一条待写入压缩包的资源
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceEntry {
    pub source: PathBuf,
    pub archive_path: String,
}

#[derive(Debug, Default)]
pub struct ResourceRegistry {
    base_dir: PathBuf,
    by_source: HashMap<PathBuf, String>,
    used: HashSet<String>,
    entries: Vec<ResourceEntry>,
}

impl ResourceRegistry {
    /// `base_dir` 用于解析相对源路径
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            ..Default::default()
        }
    }

    /// 登记源文件，返回其在压缩包中的路径
    ///
    /// 空源路径返回空字符串。
    pub fn register(&mut self, source: &Path, preferred: &str) -> String {
        if source.as_os_str().is_empty() {
            return String::new();
        }

        let normalized = self.normalize(source);
        if let Some(existing) = self.by_source.get(&normalized) {
            return existing.clone();
        }

        let archive_path = self.unique_archive_path(preferred);
        self.used.insert(archive_path.to_lowercase());
        self.by_source.insert(normalized.clone(), archive_path.clone());
        self.entries.push(ResourceEntry {
            source: normalized,
            archive_path: archive_path.clone(),
        });

        tracing::debug!("Registered resource {} as {}", source.display(), archive_path);
        archive_path
    }

    /// 已登记的源文件对应的条目路径
    pub fn lookup(&self, source: &Path) -> Option<&str> {
        self.by_source.get(&self.normalize(source)).map(String::as_str)
    }

    pub fn entries(&self) -> &[ResourceEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn normalize(&self, source: &Path) -> PathBuf {
        let joined = if source.is_absolute() {
            source.to_path_buf()
        } else if self.base_dir.as_os_str().is_empty() {
            std::env::current_dir()
                .map(|cwd| cwd.join(source))
                .unwrap_or_else(|_| source.to_path_buf())
        } else {
            self.base_dir.join(source)
        };

        joined
            .canonicalize()
            .unwrap_or_else(|_| lexical_normalize(&joined))
    }

    fn unique_archive_path(&self, preferred: &str) -> String {
        if !self.used.contains(&preferred.to_lowercase()) {
            return preferred.to_string();
        }

        let (dir, file_name) = match preferred.rfind('/') {
            Some(slash) => preferred.split_at(slash + 1),
            None => ("", preferred),
        };
        let (stem, extension) = match file_name.rfind('.') {
            Some(dot) if dot > 0 => file_name.split_at(dot),
            _ => (file_name, ""),
        };

        let mut n = 1u32;
        loop {
            let candidate = format!("{}{} ({}){}", dir, stem, n, extension);
            if !self.used.contains(&candidate.to_lowercase()) {
                return candidate;
            }
            n += 1;
        }
    }
}

/// 不访问文件系统的路径规范化（处理 `.` 与 `..`）
fn lexical_normalize(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                result.pop();
            }
            other => result.push(other.as_os_str()),
        }
    }
    result
}

/// 压缩包内首选路径：`<folder>/<源文件名>`
pub fn preferred_archive_path(folder: &str, source: &Path) -> String {
    let file_name = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("{}/{}", folder, file_name)
}
