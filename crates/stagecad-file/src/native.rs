//! 工程快照格式（.stagecad）
//!
//! MessagePack + Zstd 的二进制格式，保存完整的场景模型，
//! 包括交换格式不保存的信息（图层成员列表、覆盖值原文等）。
//!
//! 文件头 16 字节：魔数、版本、标志位、压缩后长度（均为小端 u32）。

use crate::error::FileError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stagecad_core::scene::Scene;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

/// 快照文件扩展名
pub const SNAPSHOT_EXTENSION: &str = "stagecad";

/// 文件魔数 "STGC"
const MAGIC: &[u8; 4] = b"STGC";

/// 当前文件格式版本
const FORMAT_VERSION: u32 = 1;

/// Zstd 压缩级别
const COMPRESSION_LEVEL: i32 = 3;

/// 文件头长度：魔数 + 版本 + 标志 + 压缩数据长度
const HEADER_SIZE: u64 = 16;

#[derive(Debug)]
struct FileHeader {
    magic: [u8; 4],
    version: u32,
    /// 预留
    flags: u32,
    compressed_size: u32,
}

impl FileHeader {
    fn new(compressed_size: u32) -> Self {
        Self {
            magic: *MAGIC,
            version: FORMAT_VERSION,
            flags: 0,
            compressed_size,
        }
    }

    fn write(&self, writer: &mut impl Write) -> Result<(), std::io::Error> {
        writer.write_all(&self.magic)?;
        writer.write_all(&self.version.to_le_bytes())?;
        writer.write_all(&self.flags.to_le_bytes())?;
        writer.write_all(&self.compressed_size.to_le_bytes())?;
        Ok(())
    }

    fn read(reader: &mut impl Read) -> Result<Self, FileError> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(FileError::InvalidFormat(
                "Invalid magic number, not a stagecad snapshot".to_string(),
            ));
        }

        let mut buf = [0u8; 4];
        reader.read_exact(&mut buf)?;
        let version = u32::from_le_bytes(buf);
        reader.read_exact(&mut buf)?;
        let flags = u32::from_le_bytes(buf);
        reader.read_exact(&mut buf)?;
        let compressed_size = u32::from_le_bytes(buf);

        Ok(Self {
            magic,
            version,
            flags,
            compressed_size,
        })
    }
}

/// 快照元数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub saved_at: DateTime<Utc>,
    pub generator: String,
}

impl Default for SnapshotMetadata {
    fn default() -> Self {
        Self {
            saved_at: Utc::now(),
            generator: format!("stagecad {}", env!("CARGO_PKG_VERSION")),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct FileContent {
    metadata: SnapshotMetadata,
    scene: Scene,
}

/// 保存场景快照
pub fn save(scene: &Scene, path: &Path) -> Result<(), FileError> {
    let content = FileContent {
        metadata: SnapshotMetadata::default(),
        scene: scene.clone(),
    };

    let msgpack_data = rmp_serde::to_vec(&content)?;
    let compressed_data = zstd::encode_all(msgpack_data.as_slice(), COMPRESSION_LEVEL)?;
    let compressed_size = u32::try_from(compressed_data.len())
        .map_err(|_| FileError::InvalidFormat("Snapshot exceeds 4 GiB".to_string()))?;

    let mut writer = BufWriter::new(File::create(path)?);
    FileHeader::new(compressed_size).write(&mut writer)?;
    writer.write_all(&compressed_data)?;
    writer.flush()?;

    tracing::info!(
        "Saved snapshot with {} entities, {} layers to {} ({} bytes compressed)",
        scene.entity_count(),
        scene.layers.len(),
        path.display(),
        compressed_data.len()
    );
    Ok(())
}

/// 读取场景快照
pub fn load(path: &Path) -> Result<(Scene, SnapshotMetadata), FileError> {
    let file = File::open(path)?;
    let file_len = file.metadata()?.len();
    let mut reader = BufReader::new(file);
    let header = FileHeader::read(&mut reader)?;

    if header.version > FORMAT_VERSION {
        return Err(FileError::UnsupportedVersion(format!(
            "Snapshot version {} is newer than supported version {}",
            header.version, FORMAT_VERSION
        )));
    }

    let available = file_len.saturating_sub(HEADER_SIZE);
    if u64::from(header.compressed_size) > available {
        return Err(FileError::InvalidFormat(format!(
            "Snapshot header declares {} bytes but only {} follow",
            header.compressed_size, available
        )));
    }

    let mut compressed_data = vec![0u8; header.compressed_size as usize];
    reader.read_exact(&mut compressed_data)?;
    let msgpack_data = zstd::decode_all(compressed_data.as_slice())?;
    let content: FileContent = rmp_serde::from_slice(&msgpack_data)?;

    let mut scene = content.scene;
    scene.ensure_default_layer();

    tracing::info!(
        "Loaded snapshot with {} entities, {} layers from {} (saved {})",
        scene.entity_count(),
        scene.layers.len(),
        path.display(),
        content.metadata.saved_at.to_rfc3339()
    );
    Ok((scene, content.metadata))
}

#[cfg(test)]
mod tests {
    use super::*;
    use stagecad_core::entity::{Fixture, Truss};
    use stagecad_core::layer::Layer;
    use stagecad_core::transform::Transform3;
    use tempfile::TempDir;

    #[test]
    fn test_save_load_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("show.stagecad");

        let mut scene = Scene::new();
        scene.add_layer(Layer::new("Truss 1").with_color("#123456"));
        let mut fixture = Fixture::new("Spot")
            .with_layer("Truss 1")
            .with_transform(Transform3::from_rotation_z(45.0).with_origin(1.0, 2.0, 3.0));
        fixture.weight_kg = Some(21.5);
        fixture.address = "2.17".to_string();
        scene.add_fixture(fixture);
        scene.add_truss(Truss::new("Main"));
        scene.add_position("FOH");

        save(&scene, &path).unwrap();
        let (loaded, metadata) = load(&path).unwrap();

        assert_eq!(loaded, scene);
        assert!(metadata.generator.starts_with("stagecad"));
    }

    #[test]
    fn test_invalid_magic() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("invalid.stagecad");
        std::fs::write(&path, b"INVALID_DATA_HERE").unwrap();

        assert!(matches!(load(&path), Err(FileError::InvalidFormat(_))));
    }

    #[test]
    fn test_newer_version_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("future.stagecad");

        let mut bytes = Vec::new();
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&(FORMAT_VERSION + 1).to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        std::fs::write(&path, bytes).unwrap();

        assert!(matches!(load(&path), Err(FileError::UnsupportedVersion(_))));
    }

    #[test]
    fn test_declared_size_beyond_file_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("truncated.stagecad");

        let mut bytes = Vec::new();
        FileHeader::new(u32::MAX).write(&mut bytes).unwrap();
        bytes.extend_from_slice(b"short body");
        assert_eq!(bytes.len() as u64, HEADER_SIZE + 10);
        std::fs::write(&path, bytes).unwrap();

        assert!(matches!(load(&path), Err(FileError::InvalidFormat(_))));
    }
}
