//! StageCAD 文件格式处理
//!
//! 支持：
//! - `.mvr` 场景交换文档（ZIP + `GeneralSceneDescription.xml`）的导入导出
//! - `.gdtf` 灯具配置文件的读取与实例级补丁
//! - `.stagecad` 工程快照（MessagePack + Zstd）

pub mod archive;
pub mod config;
pub mod dictionary;
pub mod error;
pub mod export;
pub mod gdtf;
pub mod ids;
pub mod import;
pub mod native;
pub mod registry;
pub mod session;
pub mod validate;
pub mod xml;

pub use config::InterchangeConfig;
pub use dictionary::{ConflictResolver, PreferBundled, PreferDictionary, ProfileChoice, ProfileDictionary};
pub use error::FileError;
pub use export::{export_scene, ExportSummary, SCENE_DESCRIPTION_ENTRY};
pub use import::{import_scene, ImportOptions, ImportedScene};
pub use session::Session;
pub use validate::{validate_document, ValidationReport};
