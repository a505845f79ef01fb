//! ZIP 容器读写
//!
//! 场景文档（`.mvr`）与灯具配置文件（`.gdtf`）都是 ZIP 包。

use crate::error::FileError;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, Write};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// 默认 deflate 压缩级别
pub const DEFAULT_COMPRESSION_LEVEL: i64 = 6;

/// 将整个压缩包解到 `dest`
///
/// 包内越界路径（`..`、绝对路径）由 zip 库拒绝。
pub fn extract_archive(archive_path: &Path, dest: &Path) -> Result<(), FileError> {
    let file = File::open(archive_path)?;
    let mut archive = ZipArchive::new(BufReader::new(file))?;
    archive.extract(dest)?;
    tracing::debug!(
        "Extracted {} entries from {} to {}",
        archive.len(),
        archive_path.display(),
        dest.display()
    );
    Ok(())
}

/// 在目录顶层按文件名（不区分大小写）查找文件
pub fn find_file_ci(dir: &Path, file_name: &str) -> Result<Option<PathBuf>, FileError> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file()
            && entry.file_name().to_string_lossy().eq_ignore_ascii_case(file_name)
        {
            return Ok(Some(entry.path()));
        }
    }
    Ok(None)
}

/// 直接读取压缩包中的单个文本条目（名称不区分大小写）
pub fn read_entry_to_string(archive_path: &Path, entry_name: &str) -> Result<Option<String>, FileError> {
    let file = File::open(archive_path)?;
    let mut archive = ZipArchive::new(BufReader::new(file))?;

    let index = (0..archive.len()).find(|&i| {
        archive
            .name_for_index(i)
            .map(|name| name.eq_ignore_ascii_case(entry_name))
            .unwrap_or(false)
    });

    match index {
        Some(i) => {
            let mut entry = archive.by_index(i)?;
            let mut text = String::new();
            entry.read_to_string(&mut text)?;
            Ok(Some(text))
        }
        None => Ok(None),
    }
}

/// ZIP 写入器封装，所有条目使用 deflate 压缩
pub struct ArchiveWriter<W: Write + Seek> {
    inner: ZipWriter<W>,
    options: SimpleFileOptions,
    written: Vec<String>,
}

impl<W: Write + Seek> ArchiveWriter<W> {
    pub fn new(writer: W, compression_level: i64) -> Self {
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .compression_level(Some(compression_level));
        Self {
            inner: ZipWriter::new(writer),
            options,
            written: Vec::new(),
        }
    }

    pub fn add_bytes(&mut self, name: &str, data: &[u8]) -> Result<(), FileError> {
        self.inner.start_file(name, self.options)?;
        self.inner.write_all(data)?;
        self.written.push(name.to_string());
        Ok(())
    }

    pub fn add_file(&mut self, name: &str, source: &Path) -> Result<(), FileError> {
        let mut file = File::open(source)?;
        self.inner.start_file(name, self.options)?;
        std::io::copy(&mut file, &mut self.inner)?;
        self.written.push(name.to_string());
        Ok(())
    }

    /// 已写入的条目名
    pub fn written(&self) -> &[String] {
        &self.written
    }

    pub fn finish(self) -> Result<W, FileError> {
        Ok(self.inner.finish()?)
    }
}

/// 将目录内容重新打包为压缩包（条目名使用 `/` 分隔的相对路径）
pub fn pack_directory(dir: &Path, output: &Path, compression_level: i64) -> Result<(), FileError> {
    let file = File::create(output)?;
    let mut writer = ArchiveWriter::new(BufWriter::new(file), compression_level);

    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(dir)
            .map_err(|e| FileError::InvalidFormat(e.to_string()))?;
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        writer.add_file(&name, entry.path())?;
    }

    let mut inner = writer.finish()?;
    inner.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_pack_and_extract() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("source");
        std::fs::create_dir_all(source.join("models")).unwrap();
        std::fs::write(source.join("Description.XML"), "<GDTF/>").unwrap();
        std::fs::write(source.join("models").join("body.3ds"), [1u8, 2, 3]).unwrap();

        let archive = temp_dir.path().join("profile.gdtf");
        pack_directory(&source, &archive, DEFAULT_COMPRESSION_LEVEL).unwrap();

        // 条目名查找不区分大小写
        let text = read_entry_to_string(&archive, "description.xml").unwrap();
        assert_eq!(text.as_deref(), Some("<GDTF/>"));
        assert!(read_entry_to_string(&archive, "missing.xml").unwrap().is_none());

        let out = temp_dir.path().join("out");
        std::fs::create_dir_all(&out).unwrap();
        extract_archive(&archive, &out).unwrap();
        assert_eq!(std::fs::read(out.join("models").join("body.3ds")).unwrap(), vec![1, 2, 3]);
        assert!(find_file_ci(&out, "description.xml").unwrap().is_some());
    }

    #[test]
    fn test_extract_rejects_non_zip() {
        let temp_dir = TempDir::new().unwrap();
        let bogus = temp_dir.path().join("bogus.mvr");
        std::fs::write(&bogus, b"not a zip").unwrap();
        assert!(extract_archive(&bogus, temp_dir.path()).is_err());
    }
}
