//! 文档会话
//!
//! 持有当前场景、交换设置、配置文件字典与冲突选择回调。
//! 所有入口都通过会话对象进行，同一进程内可以存在多个互不影响的会话。
//!
//! `export_to_file` / `import_from_file` 只返回成败，原因写入日志；
//! 需要错误详情的调用方可以直接使用 [`export_scene`] / [`import_scene`]。

use crate::config::InterchangeConfig;
use crate::dictionary::{ConflictResolver, PreferBundled, ProfileDictionary};
use crate::error::FileError;
use crate::export::{export_scene, ExportSummary};
use crate::import::{import_scene, ImportOptions};
use crate::native;
use stagecad_core::scene::Scene;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub struct Session {
    scene: Scene,
    config: InterchangeConfig,
    dictionary: Option<ProfileDictionary>,
    resolver: Box<dyn ConflictResolver>,
    /// 最近一次导入的解包目录，场景中的资源路径依赖它
    import_dir: Option<TempDir>,
    file_path: Option<PathBuf>,
    last_export: Option<ExportSummary>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(InterchangeConfig::default())
    }
}

impl Session {
    pub fn new(config: InterchangeConfig) -> Self {
        Self {
            scene: Scene::new(),
            config,
            dictionary: None,
            resolver: Box::new(PreferBundled),
            import_dir: None,
            file_path: None,
            last_export: None,
        }
    }

    pub fn with_dictionary(mut self, dictionary: ProfileDictionary) -> Self {
        self.dictionary = Some(dictionary);
        self
    }

    pub fn with_resolver(mut self, resolver: Box<dyn ConflictResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// 按设置中的路径加载字典；未配置时不做任何事
    pub fn load_configured_dictionary(&mut self) -> Result<(), FileError> {
        if let Some(path) = self.config.dictionary_path.clone() {
            self.dictionary = Some(ProfileDictionary::load(&path)?);
        }
        Ok(())
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut Scene {
        &mut self.scene
    }

    pub fn config(&self) -> &InterchangeConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut InterchangeConfig {
        &mut self.config
    }

    pub fn dictionary(&self) -> Option<&ProfileDictionary> {
        self.dictionary.as_ref()
    }

    /// 最近一次打开或保存的文件
    pub fn file_path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }

    pub fn last_export(&self) -> Option<&ExportSummary> {
        self.last_export.as_ref()
    }

    /// 丢弃当前场景
    pub fn reset(&mut self) {
        self.scene.reset();
        self.import_dir = None;
        self.file_path = None;
    }

    /// 导出当前场景
    pub fn export_to_file(&mut self, path: &Path) -> bool {
        match export_scene(&mut self.scene, path, &self.config) {
            Ok(summary) => {
                self.last_export = Some(summary);
                self.file_path = Some(path.to_path_buf());
                true
            }
            Err(e) => {
                tracing::error!("Export to {} failed: {}", path.display(), e);
                false
            }
        }
    }

    /// 导入场景，成功时替换当前场景；失败时当前场景保持不变
    pub fn import_from_file(&mut self, path: &Path, prompt_conflicts: bool, apply_dictionary: bool) -> bool {
        let options = ImportOptions {
            apply_dictionary,
            prompt_conflicts,
        };
        match import_scene(path, &options, self.dictionary.as_ref(), self.resolver.as_mut()) {
            Ok(imported) => {
                self.scene = imported.scene;
                // 旧的解包目录在此释放
                self.import_dir = Some(imported.resources);
                self.file_path = Some(path.to_path_buf());
                true
            }
            Err(e) => {
                tracing::error!("Import from {} failed: {}", path.display(), e);
                false
            }
        }
    }

    /// 按设置中的开关导入
    pub fn import_with_config(&mut self, path: &Path) -> bool {
        let (prompt, apply) = (self.config.prompt_conflicts, self.config.apply_dictionary);
        self.import_from_file(path, prompt, apply)
    }

    /// 保存工程快照
    pub fn save_snapshot(&mut self, path: &Path) -> Result<(), FileError> {
        if let Some(dir) = &self.import_dir {
            if self.scene.base_path.starts_with(dir.path()) {
                tracing::warn!(
                    "Snapshot resources point into the temporary import directory {} and will not outlive this session",
                    dir.path().display()
                );
            }
        }
        native::save(&self.scene, path)?;
        self.file_path = Some(path.to_path_buf());
        Ok(())
    }

    /// 读取工程快照，替换当前场景
    pub fn load_snapshot(&mut self, path: &Path) -> Result<(), FileError> {
        let (scene, _metadata) = native::load(path)?;
        self.scene = scene;
        self.import_dir = None;
        self.file_path = Some(path.to_path_buf());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stagecad_core::entity::{Fixture, Truss};
    use tempfile::TempDir;

    #[test]
    fn test_export_import_through_session() {
        let temp_dir = TempDir::new().unwrap();
        let profile = crate::gdtf::tests::write_profile(temp_dir.path(), "Spot.gdtf");
        let path = temp_dir.path().join("show.mvr");

        let mut session = Session::default();
        session
            .scene_mut()
            .add_fixture(Fixture::new("Spot").with_profile(&profile, "Standard"));
        session.scene_mut().add_truss(Truss::new("Truss"));
        assert!(session.export_to_file(&path));
        assert_eq!(session.last_export().map(|s| s.resources_written), Some(1));

        let mut other = Session::default();
        assert!(other.import_from_file(&path, false, false));
        assert_eq!(other.scene().fixtures.len(), 1);
        assert_eq!(other.file_path(), Some(path.as_path()));

        // 导入的配置文件在会话存活期间可用
        let fixture = other.scene().fixtures.values().next().unwrap();
        let resolved = other.scene().resolve_path(fixture.gdtf_spec.as_deref().unwrap());
        assert!(resolved.is_file());
    }

    #[test]
    fn test_failed_import_keeps_scene() {
        let temp_dir = TempDir::new().unwrap();
        let mut session = Session::default();
        let uuid = session.scene_mut().add_truss(Truss::new("Keep me"));

        assert!(!session.import_from_file(&temp_dir.path().join("missing.mvr"), false, false));
        assert!(session.scene().trusses.contains_key(&uuid));
    }

    #[test]
    fn test_failed_export_returns_false() {
        let temp_dir = TempDir::new().unwrap();
        let mut session = Session::default();
        session
            .scene_mut()
            .add_fixture(Fixture::new("Ghost").with_profile(temp_dir.path().join("ghost.gdtf"), "M"));

        let path = temp_dir.path().join("show.mvr");
        assert!(!session.export_to_file(&path));
        assert!(!path.exists());
        assert!(session.file_path().is_none());
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("show.stagecad");

        let mut session = Session::default();
        session.scene_mut().add_fixture(Fixture::new("Spot"));
        session.save_snapshot(&path).unwrap();

        let mut restored = Session::default();
        restored.load_snapshot(&path).unwrap();
        assert_eq!(restored.scene(), session.scene());
    }
}
