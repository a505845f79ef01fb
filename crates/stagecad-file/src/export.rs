//! MVR 场景导出
//!
//! 流程：
//! 1. 修复命名位置表；
//! 2. 分配数字编号；
//! 3. 构建辅助数据（命名位置、符号定义）；
//! 4. 按图层构建实体树，登记配置文件与模型资源（必要时先打补丁）；
//! 5. 合规检查，失败则不写任何文件；
//! 6. 写入压缩包：场景描述 + 源文件仍存在的资源（缺失的资源跳过）。
//!
//! 每个实体只写一个完全组合后的世界矩阵，不会把它拆回符号层级。

use crate::archive::ArchiveWriter;
use crate::config::InterchangeConfig;
use crate::error::FileError;
use crate::gdtf::{ProfileOverrides, ProfilePatcher, ProfileSummary};
use crate::ids::{allocate_ids, is_numbered, IdAllocation};
use crate::registry::{preferred_archive_path, ResourceEntry, ResourceRegistry};
use crate::validate::{validate_document, SUPPORTED_VERSION};
use crate::xml::XmlElement;
use stagecad_core::color::Rgb;
use stagecad_core::entity::{new_uuid, EntityRef, Fixture, GeometryRef, SceneEntity, SceneObject};
use stagecad_core::input_parser::InputParser;
use stagecad_core::layer::LayerIndex;
use stagecad_core::scene::{position_id_by_name, Scene};
use stagecad_core::transform::Transform3;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

/// 场景描述在压缩包中的条目名
pub const SCENE_DESCRIPTION_ENTRY: &str = "GeneralSceneDescription.xml";
/// 配置文件目录
pub const PROFILE_FOLDER: &str = "gdtf";
/// 模型文件目录
pub const MODEL_FOLDER: &str = "models";

/// 导出统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportSummary {
    pub entities: usize,
    pub resources_written: usize,
    pub resources_skipped: usize,
    pub patched_profiles: usize,
}

/// 导出场景到 `path`
///
/// 会修改场景：补全命名位置、写回分配的数字编号。
pub fn export_scene(
    scene: &mut Scene,
    path: &Path,
    config: &InterchangeConfig,
) -> Result<ExportSummary, FileError> {
    repair_positions(scene);
    let ids = allocate_ids(scene);
    ids.apply_to(scene);
    let scene: &Scene = scene;

    // 补丁文件放在暂存目录，函数返回时（无论成败）自动删除
    let staging = tempfile::Builder::new().prefix("stagecad-export-").tempdir()?;

    let mut builder = DocumentBuilder {
        scene,
        ids: &ids,
        registry: ResourceRegistry::new(&scene.base_path),
        patcher: ProfilePatcher::new(staging.path(), config.compression_level),
    };
    let root = builder.build(config);

    let mut manifest = vec![SCENE_DESCRIPTION_ENTRY.to_string()];
    let mut resources: Vec<&ResourceEntry> = Vec::new();
    let mut skipped = 0;
    for entry in builder.registry.entries() {
        if entry.source.is_file() {
            manifest.push(entry.archive_path.clone());
            resources.push(entry);
        } else {
            tracing::warn!(
                "Resource {} not found, skipping {}",
                entry.source.display(),
                entry.archive_path
            );
            skipped += 1;
        }
    }

    validate_document(&root, &manifest).map_err(FileError::Validation)?;

    let xml = root.to_xml_string()?;
    write_archive(path, &xml, &resources, config.compression_level)?;

    let summary = ExportSummary {
        entities: scene.entity_count(),
        resources_written: resources.len(),
        resources_skipped: skipped,
        patched_profiles: builder.patcher.patched_count(),
    };
    tracing::info!(
        "Exported {} entities, {} resources ({} skipped, {} patched profiles) to {}",
        summary.entities,
        summary.resources_written,
        summary.resources_skipped,
        summary.patched_profiles,
        path.display()
    );
    Ok(summary)
}

/// 修复命名位置表
///
/// - 只有位置名的实体：按名字匹配已有位置，没有则新建；
/// - 已有位置标识符的实体：用实体上的位置名刷新表中的名字。
pub fn repair_positions(scene: &mut Scene) {
    let mut positions = std::mem::take(&mut scene.positions);

    for entity in scene.entities_mut() {
        let Some(position) = entity.position_mut() else {
            continue;
        };
        let name = position.name.trim().to_string();

        if position.id.is_empty() {
            if name.is_empty() {
                continue;
            }
            let existing = position_id_by_name(&positions, &name).map(str::to_string);
            position.id = match existing {
                Some(id) => id,
                None => {
                    let id = new_uuid();
                    positions.insert(id.clone(), name);
                    id
                }
            };
        } else {
            match positions.get_mut(&position.id) {
                Some(stored) if !name.is_empty() => *stored = name,
                Some(_) => {}
                None => {
                    positions.insert(position.id.clone(), name);
                }
            }
        }
    }

    scene.positions = positions;
}

fn matrix_element(transform: &Transform3) -> XmlElement {
    XmlElement::new("Matrix").with_text(transform.to_string())
}

struct DocumentBuilder<'a> {
    scene: &'a Scene,
    ids: &'a IdAllocation,
    registry: ResourceRegistry,
    patcher: ProfilePatcher,
}

impl<'a> DocumentBuilder<'a> {
    fn build(&mut self, config: &InterchangeConfig) -> XmlElement {
        let provider = non_empty_or(&self.scene.provider, &config.provider);
        let provider_version = non_empty_or(&self.scene.provider_version, &config.provider_version);

        let mut root = XmlElement::new("GeneralSceneDescription")
            .with_attr("verMajor", SUPPORTED_VERSION.0.to_string())
            .with_attr("verMinor", SUPPORTED_VERSION.1.to_string())
            .with_attr("provider", provider)
            .with_attr("providerVersion", provider_version);

        let scene_element = root.push(XmlElement::new("Scene"));
        scene_element.push(self.build_aux_data());
        scene_element.push(self.build_layers());
        root
    }

    fn build_aux_data(&mut self) -> XmlElement {
        let mut aux = XmlElement::new("AUXData");

        for (id, name) in &self.scene.positions {
            aux.push(
                XmlElement::new("Position")
                    .with_attr("uuid", id)
                    .with_attr("name", name),
            );
        }

        for symbol in self.scene.symbols.values() {
            let mut symdef = XmlElement::new("Symdef")
                .with_attr("uuid", &symbol.uuid)
                .with_attr("name", &symbol.name);
            if !symbol.kind.is_empty() {
                symdef.set_attr("type", symbol.kind.as_str());
            }
            let mut child_list = XmlElement::new("ChildList");
            for geometry in &symbol.geometries {
                child_list.push(self.geometry_element(geometry));
            }
            symdef.push(child_list);
            aux.push(symdef);
        }

        aux
    }

    fn build_layers(&mut self) -> XmlElement {
        let index = LayerIndex::build(self.scene);

        let mut layers = XmlElement::new("Layers");
        for layer in self.scene.layers.values().filter(|l| !l.is_default()) {
            let mut element = XmlElement::new("Layer")
                .with_attr("uuid", &layer.uuid)
                .with_attr("name", &layer.name);
            if let Some(color) = &layer.color {
                element.set_attr("color", color.as_str());
            }
            element.push(self.member_list(index.members(&layer.name)));
            layers.push(element);
        }

        // 悬空的图层名按名字各补一个图层，成员照常写出
        for name in index.orphaned_names(self.scene) {
            tracing::warn!("Entities reference undefined layer '{}', exporting it as a new layer", name);
            let element = XmlElement::new("Layer")
                .with_attr("uuid", new_uuid())
                .with_attr("name", name)
                .with_child(self.member_list(index.members(name)));
            layers.push(element);
        }

        let unassigned = index.unassigned();
        if !unassigned.is_empty() {
            layers.push(self.member_list(unassigned));
        }

        layers
    }

    fn member_list(&mut self, members: &[EntityRef<'a>]) -> XmlElement {
        let mut child_list = XmlElement::new("ChildList");
        for entity in members {
            child_list.push(self.entity_element(*entity));
        }
        child_list
    }

    fn entity_element(&mut self, entity: EntityRef<'a>) -> XmlElement {
        match entity {
            EntityRef::Fixture(fixture) => self.fixture_element(fixture),
            EntityRef::Truss(truss) => {
                self.rigging_element(truss, &truss.gdtf_mode, truss.model_file.as_deref())
            }
            EntityRef::Support(support) => {
                self.rigging_element(support, &support.gdtf_mode, support.model_file.as_deref())
            }
            EntityRef::SceneObject(object) => self.scene_object_element(object),
        }
    }

    /// 实体公共部分：标识符、名称、矩阵
    ///
    /// `name` 保存原样的显示名；分配器的文本标识只用于日志。
    fn entity_header(&self, entity: &dyn SceneEntity) -> XmlElement {
        if let Some(id) = self.ids.get(&entity.key()) {
            tracing::debug!("{} '{}' exported as #{}", entity.kind().tag(), id.label, id.numeric);
        }
        XmlElement::new(entity.kind().tag())
            .with_attr("uuid", entity.uuid())
            .with_attr("name", entity.name())
            .with_child(matrix_element(entity.transform()))
    }

    fn push_position(&self, element: &mut XmlElement, entity: &dyn SceneEntity) {
        if let Some(position) = entity.position().filter(|p| !p.id.is_empty()) {
            element.push(XmlElement::new("Position").with_text(position.id.as_str()));
        }
    }

    fn push_identifiers(&self, element: &mut XmlElement, entity: &dyn SceneEntity) {
        if !is_numbered(entity.kind()) {
            return;
        }
        if let Some(id) = self.ids.get(&entity.key()) {
            element.push(XmlElement::new("FixtureID").with_text(id.numeric.to_string()));
            element.push(XmlElement::new("FixtureIDNumeric").with_text(id.numeric.to_string()));
        }
    }

    fn fixture_element(&mut self, fixture: &Fixture) -> XmlElement {
        let mut element = self.entity_header(fixture);
        if let Some(parent) = fixture.multipatch.as_deref().filter(|m| !m.trim().is_empty()) {
            element.set_attr("multipatch", parent);
        }

        if let Some(reference) = self.fixture_profile(fixture) {
            element.push(XmlElement::new("GDTFSpec").with_text(reference));
            element.push(XmlElement::new("GDTFMode").with_text(fixture.gdtf_mode.as_str()));
        }
        self.push_position(&mut element, fixture);
        self.push_identifiers(&mut element, fixture);
        element.push(XmlElement::new("UnitNumber").with_text(fixture.unit_number.to_string()));

        if !fixture.address.trim().is_empty() {
            match InputParser::parse_address(&fixture.address) {
                Ok(address) => {
                    let addresses = XmlElement::new("Addresses").with_child(
                        XmlElement::new("Address")
                            .with_attr("break", "0")
                            .with_text(address.to_absolute().to_string()),
                    );
                    element.push(addresses);
                }
                Err(e) => tracing::warn!(
                    "Fixture '{}' has an invalid address '{}': {}",
                    fixture.name,
                    fixture.address,
                    e
                ),
            }
        }

        if let Some(rgb) = fixture.color.as_deref().and_then(|hex| Rgb::from_hex(hex).ok()) {
            element.push(XmlElement::new("Color").with_text(rgb.to_cie().to_string()));
        }

        element
    }

    /// 桁架与支撑
    fn rigging_element(&mut self, entity: &dyn SceneEntity, mode: &str, model: Option<&Path>) -> XmlElement {
        let mut element = self.entity_header(entity);

        if let Some(profile) = entity.profile() {
            let reference = self.register_profile(profile);
            element.push(XmlElement::new("GDTFSpec").with_text(reference));
            element.push(XmlElement::new("GDTFMode").with_text(mode));
        }
        self.push_position(&mut element, entity);
        self.push_identifiers(&mut element, entity);

        if let Some(model) = model {
            let geometries = XmlElement::new("Geometries")
                .with_child(self.geometry_element(&GeometryRef::new(model)));
            element.push(geometries);
        }
        element
    }

    fn scene_object_element(&mut self, object: &SceneObject) -> XmlElement {
        let mut element = self.entity_header(object);
        if !object.kind.is_empty() {
            element.set_attr("type", object.kind.as_str());
        }
        if !object.geometries.is_empty() {
            let mut geometries = XmlElement::new("Geometries");
            for geometry in &object.geometries {
                geometries.push(self.geometry_element(geometry));
            }
            element.push(geometries);
        }
        element
    }

    fn geometry_element(&mut self, geometry: &GeometryRef) -> XmlElement {
        let archive_path = self
            .registry
            .register(&geometry.file, &preferred_archive_path(MODEL_FOLDER, &geometry.file));
        let mut element = XmlElement::new("Geometry3D").with_attr("fileName", archive_path);
        if !geometry.kind.is_empty() {
            element.set_attr("type", geometry.kind.as_str());
        }
        element.with_child(matrix_element(&geometry.local))
    }

    fn register_profile(&mut self, profile: &Path) -> String {
        self.registry
            .register(profile, &preferred_archive_path(PROFILE_FOLDER, profile))
    }

    /// 登记灯具配置文件；带有与共享文件不同的覆盖值时登记补丁副本
    fn fixture_profile(&mut self, fixture: &Fixture) -> Option<String> {
        let profile = fixture.gdtf_spec.as_deref()?;
        let overrides = ProfileOverrides::from_fixture(fixture);
        if overrides.is_empty() {
            return Some(self.register_profile(profile));
        }

        let source = self.scene.resolve_path(profile);
        let chosen = self.patched_profile(&fixture.name, &source, &overrides);
        Some(self.register_profile(chosen.as_deref().unwrap_or(profile)))
    }

    fn patched_profile(&mut self, fixture_name: &str, source: &Path, overrides: &ProfileOverrides) -> Option<PathBuf> {
        match ProfileSummary::read(source) {
            Ok(summary) if !summary.differs_from(overrides) => return None,
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(
                    "Cannot read profile {} for '{}', exporting it unmodified: {}",
                    source.display(),
                    fixture_name,
                    e
                );
                return None;
            }
        }

        match self.patcher.patch(source, overrides) {
            Ok(patched) => Some(patched),
            Err(e) => {
                tracing::warn!(
                    "Patching profile {} for '{}' failed, exporting it unmodified: {}",
                    source.display(),
                    fixture_name,
                    e
                );
                None
            }
        }
    }
}

fn non_empty_or(value: &str, fallback: &str) -> String {
    if value.trim().is_empty() {
        fallback.to_string()
    } else {
        value.to_string()
    }
}

/// 写入临时文件，全部条目写完后再原子替换到目标路径
fn write_archive(
    path: &Path,
    xml: &str,
    resources: &[&ResourceEntry],
    compression_level: i64,
) -> Result<(), FileError> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let temp = tempfile::NamedTempFile::new_in(dir)?;

    let mut writer = ArchiveWriter::new(BufWriter::new(temp), compression_level);
    writer.add_bytes(SCENE_DESCRIPTION_ENTRY, xml.as_bytes())?;
    for resource in resources {
        writer.add_file(&resource.archive_path, &resource.source)?;
    }

    let temp = writer
        .finish()?
        .into_inner()
        .map_err(|e| FileError::Io(e.into_error()))?;
    temp.persist(path).map_err(|e| FileError::Io(e.error))?;
    Ok(())
}
