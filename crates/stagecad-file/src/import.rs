//! MVR 场景导入
//!
//! 导入在一个全新的 [`Scene`] 上进行，任何硬失败（文件不存在、扩展名不符、
//! 解包失败、缺少场景描述、XML 无根元素）都发生在构建场景之前，
//! 调用方手里的场景不会被部分修改。
//!
//! 解包目录随结果一起返回，导入的场景通过 `base_path` 引用其中的资源，
//! 目录在结果被丢弃时删除。

use crate::archive::{extract_archive, find_file_ci};
use crate::dictionary::{ConflictResolver, ProfileChoice, ProfileDictionary};
use crate::error::FileError;
use crate::export::SCENE_DESCRIPTION_ENTRY;
use crate::gdtf::ProfileSummary;
use crate::validate::SUPPORTED_VERSION;
use crate::xml::XmlElement;
use stagecad_core::color::CieColor;
use stagecad_core::entity::{Fixture, GeometryRef, PositionRef, SceneObject, Support, Truss};
use stagecad_core::input_parser::InputParser;
use stagecad_core::layer::{is_default_layer_name, Layer, DEFAULT_LAYER_NAME};
use stagecad_core::scene::Scene;
use stagecad_core::symbol::SymbolDefinition;
use stagecad_core::transform::Transform3;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// 场景文档扩展名
pub const SCENE_EXTENSION: &str = "mvr";

/// 场景物体被视为支撑的几何类型
const SUPPORT_KIND: &str = "support";

/// 导入选项
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportOptions {
    /// 按型号名用字典中的配置文件替换文档自带的配置文件
    pub apply_dictionary: bool,
    /// 冲突时逐个型号询问，否则直接使用字典
    pub prompt_conflicts: bool,
}

/// 导入结果
#[derive(Debug)]
pub struct ImportedScene {
    pub scene: Scene,
    /// 解包目录，场景中的相对资源路径以它为基准
    pub resources: TempDir,
}

/// 从 `path` 导入场景
pub fn import_scene(
    path: &Path,
    options: &ImportOptions,
    dictionary: Option<&ProfileDictionary>,
    resolver: &mut dyn ConflictResolver,
) -> Result<ImportedScene, FileError> {
    check_input(path)?;

    let resources = tempfile::Builder::new().prefix("stagecad-import-").tempdir()?;
    extract_archive(path, resources.path())?;

    let description = find_file_ci(resources.path(), SCENE_DESCRIPTION_ENTRY)?
        .ok_or_else(|| FileError::MissingSceneDescription(path.display().to_string()))?;
    let root = XmlElement::parse(&std::fs::read_to_string(&description)?)?;
    if root.name != "GeneralSceneDescription" {
        return Err(FileError::InvalidFormat(format!(
            "Unexpected root element <{}> in {}",
            root.name,
            path.display()
        )));
    }

    let mut scene = Scene::new();
    scene.base_path = resources.path().to_path_buf();

    let mut parser = SceneParser::new(&mut scene);
    parser.read_header(&root);
    if let Some(scene_element) = root.child("Scene") {
        if let Some(aux) = scene_element.child("AUXData") {
            parser.read_aux_data(aux);
        }
        if let Some(layers) = scene_element.child("Layers") {
            parser.read_layers(layers);
        }
    }

    if options.apply_dictionary {
        match dictionary {
            Some(dictionary) => reconcile_profiles(&mut scene, dictionary, options.prompt_conflicts, resolver),
            None => tracing::warn!("Profile dictionary requested but none is loaded"),
        }
    }
    scene.ensure_default_layer();

    tracing::info!(
        "Imported {} fixtures, {} trusses, {} supports, {} scene objects, {} layers from {}",
        scene.fixtures.len(),
        scene.trusses.len(),
        scene.supports.len(),
        scene.scene_objects.len(),
        scene.layers.len(),
        path.display()
    );
    Ok(ImportedScene { scene, resources })
}

fn check_input(path: &Path) -> Result<(), FileError> {
    if !path.is_file() {
        return Err(FileError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{} does not exist", path.display()),
        )));
    }
    let extension_ok = path
        .extension()
        .is_some_and(|ext| ext.to_string_lossy().eq_ignore_ascii_case(SCENE_EXTENSION));
    if !extension_ok {
        return Err(FileError::InvalidFormat(format!(
            "{} is not a .{} file",
            path.display(),
            SCENE_EXTENSION
        )));
    }
    Ok(())
}

/// 读取元素的 `Matrix` 子元素；缺失或为空时为单位矩阵，格式错误时记录警告后退回单位矩阵
fn matrix_of(element: &XmlElement) -> Transform3 {
    let Some(text) = element.child_text("Matrix").filter(|t| !t.is_empty()) else {
        return Transform3::identity();
    };
    match Transform3::parse(text) {
        Ok(transform) => transform,
        Err(e) => {
            tracing::warn!(
                "Malformed matrix on <{}> '{}', using identity: {}",
                element.name,
                element.attr("name").unwrap_or_default(),
                e
            );
            Transform3::identity()
        }
    }
}

fn non_empty_attr<'e>(element: &'e XmlElement, key: &str) -> Option<&'e str> {
    element.attr(key).map(str::trim).filter(|v| !v.is_empty())
}

fn numeric_id(element: &XmlElement) -> u32 {
    ["FixtureIDNumeric", "FixtureID"]
        .iter()
        .filter_map(|tag| element.child_text(tag))
        .find_map(|text| InputParser::parse_numeric_id(text).ok())
        .unwrap_or(0)
}

/// 子元素种类，每个元素只解析一次
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeKind {
    Fixture,
    Truss,
    Support,
    SceneObject,
    Group,
}

impl NodeKind {
    fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "Fixture" => Some(Self::Fixture),
            "Truss" => Some(Self::Truss),
            "Support" => Some(Self::Support),
            "SceneObject" | "VideoScreen" | "Projector" => Some(Self::SceneObject),
            "GroupObject" => Some(Self::Group),
            _ => None,
        }
    }
}

/// 符号定义的递归展开
///
/// 结果按标识符缓存；正在展开的符号再次出现视为循环引用，按空几何处理。
struct SymdefResolver<'x> {
    definitions: HashMap<&'x str, &'x XmlElement>,
    resolved: HashMap<String, Vec<GeometryRef>>,
    visiting: HashSet<String>,
}

impl<'x> SymdefResolver<'x> {
    fn new(aux: &'x XmlElement) -> Self {
        let definitions = aux
            .children_named("Symdef")
            .filter_map(|def| non_empty_attr(def, "uuid").map(|uuid| (uuid, def)))
            .collect();
        Self {
            definitions,
            resolved: HashMap::new(),
            visiting: HashSet::new(),
        }
    }

    fn resolve(&mut self, uuid: &str) -> Vec<GeometryRef> {
        if let Some(done) = self.resolved.get(uuid) {
            return done.clone();
        }
        let Some(definition) = self.definitions.get(uuid).copied() else {
            tracing::warn!("Reference to unknown symbol definition {}", uuid);
            return Vec::new();
        };
        if !self.visiting.insert(uuid.to_string()) {
            tracing::warn!("Symbol definition {} references itself", uuid);
            return Vec::new();
        }

        let mut geometries = Vec::new();
        self.collect(definition, &Transform3::identity(), &mut geometries);

        self.visiting.remove(uuid);
        self.resolved.insert(uuid.to_string(), geometries.clone());
        geometries
    }

    fn collect(&mut self, element: &'x XmlElement, parent: &Transform3, out: &mut Vec<GeometryRef>) {
        for child in &element.children {
            match child.name.as_str() {
                "ChildList" => self.collect(child, parent, out),
                "Geometry3D" => {
                    let Some(file) = non_empty_attr(child, "fileName") else {
                        continue;
                    };
                    out.push(GeometryRef {
                        file: PathBuf::from(file),
                        kind: child.attr("type").unwrap_or_default().to_string(),
                        local: parent.compose(&matrix_of(child)),
                    });
                }
                "Symbol" => {
                    let Some(target) = non_empty_attr(child, "symdef") else {
                        continue;
                    };
                    let placement = parent.compose(&matrix_of(child));
                    let inherited = self
                        .definitions
                        .get(target)
                        .and_then(|def| def.attr("type"))
                        .unwrap_or_default()
                        .to_string();
                    for geometry in self.resolve(target) {
                        out.push(GeometryRef {
                            kind: if geometry.kind.is_empty() {
                                inherited.clone()
                            } else {
                                geometry.kind
                            },
                            local: placement.compose(&geometry.local),
                            file: geometry.file,
                        });
                    }
                }
                _ => {}
            }
        }
    }
}

struct SceneParser<'s> {
    scene: &'s mut Scene,
    /// 配置文件路径 -> 型号名
    profile_types: HashMap<PathBuf, String>,
}

impl<'s> SceneParser<'s> {
    fn new(scene: &'s mut Scene) -> Self {
        Self {
            scene,
            profile_types: HashMap::new(),
        }
    }

    fn read_header(&mut self, root: &XmlElement) {
        let version = |key: &str| root.attr(key).and_then(|v| v.trim().parse::<u32>().ok());
        let (major, minor) = SUPPORTED_VERSION;
        match (version("verMajor"), version("verMinor")) {
            (Some(ma), Some(mi)) if ma == major && mi <= minor => {}
            (ma, mi) => tracing::warn!(
                "Document version {}.{} is not {}.{}, importing anyway",
                ma.map(|v| v.to_string()).unwrap_or_else(|| "?".to_string()),
                mi.map(|v| v.to_string()).unwrap_or_else(|| "?".to_string()),
                major,
                minor
            ),
        }

        self.scene.provider = root.attr("provider").unwrap_or_default().to_string();
        self.scene.provider_version = root.attr("providerVersion").unwrap_or_default().to_string();
    }

    fn read_aux_data(&mut self, aux: &XmlElement) {
        for position in aux.children_named("Position") {
            if let Some(uuid) = non_empty_attr(position, "uuid") {
                let name = position.attr("name").unwrap_or_default();
                self.scene.positions.insert(uuid.to_string(), name.to_string());
            }
        }

        let mut resolver = SymdefResolver::new(aux);
        for definition in aux.children_named("Symdef") {
            let Some(uuid) = non_empty_attr(definition, "uuid") else {
                continue;
            };
            let symbol = SymbolDefinition {
                uuid: uuid.to_string(),
                name: definition.attr("name").unwrap_or_default().to_string(),
                kind: definition.attr("type").unwrap_or_default().to_string(),
                geometries: resolver.resolve(uuid),
            };
            self.scene.add_symbol(symbol);
        }
    }

    fn read_layers(&mut self, layers: &XmlElement) {
        for child in &layers.children {
            match child.name.as_str() {
                "Layer" => {
                    let name = child.attr("name").unwrap_or_default().trim();
                    let layer_name = if is_default_layer_name(name) {
                        DEFAULT_LAYER_NAME
                    } else {
                        name
                    };
                    if !is_default_layer_name(name) && self.scene.layer_by_name(name).is_none() {
                        let mut layer = Layer::new(name);
                        if let Some(uuid) = non_empty_attr(child, "uuid") {
                            layer.uuid = uuid.to_string();
                        }
                        layer.color = non_empty_attr(child, "color").map(str::to_string);
                        self.scene.add_layer(layer);
                    }

                    let frame = matrix_of(child);
                    if let Some(list) = child.child("ChildList") {
                        self.walk(list, &frame, layer_name);
                    }
                }
                "ChildList" => self.walk(child, &Transform3::identity(), DEFAULT_LAYER_NAME),
                other => tracing::debug!("Skipping <{}> in Layers", other),
            }
        }
    }

    /// 递归遍历子列表，`parent` 为上层世界变换
    fn walk(&mut self, list: &XmlElement, parent: &Transform3, layer: &str) {
        for node in &list.children {
            let Some(kind) = NodeKind::from_tag(&node.name) else {
                tracing::debug!("Skipping unsupported element <{}>", node.name);
                continue;
            };
            let world = parent.compose(&matrix_of(node));

            match kind {
                NodeKind::Fixture => self.read_fixture(node, &world, layer),
                NodeKind::Truss => self.read_truss(node, &world, layer),
                NodeKind::Support => self.read_support(node, &world, layer),
                NodeKind::SceneObject => self.read_scene_object(node, &world, layer),
                NodeKind::Group => {}
            }

            if let Some(children) = node.child("ChildList") {
                self.walk(children, &world, layer);
            }
        }
    }

    fn position_ref(&self, node: &XmlElement) -> PositionRef {
        let id = node.child_text("Position").unwrap_or_default().to_string();
        let name = self.scene.positions.get(&id).cloned().unwrap_or_default();
        PositionRef { id, name }
    }

    fn profile_ref(node: &XmlElement) -> Option<PathBuf> {
        node.child_text("GDTFSpec")
            .filter(|spec| !spec.is_empty())
            .map(PathBuf::from)
    }

    /// 配置文件的型号名，读不到时使用文件名
    fn profile_type(&mut self, profile: &Path) -> String {
        if let Some(known) = self.profile_types.get(profile) {
            return known.clone();
        }
        let summary_name = match ProfileSummary::read(&self.scene.resolve_path(profile)) {
            Ok(summary) => summary.type_name,
            Err(e) => {
                tracing::debug!("Cannot read profile {}: {}", profile.display(), e);
                String::new()
            }
        };
        let type_name = if summary_name.trim().is_empty() {
            profile
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default()
        } else {
            summary_name
        };
        self.profile_types.insert(profile.to_path_buf(), type_name.clone());
        type_name
    }

    /// 实体的几何：`Geometries` 下的模型与符号实例，局部变换相对于实体
    fn geometries_of(&self, node: &XmlElement) -> Vec<GeometryRef> {
        let Some(geometries) = node.child("Geometries") else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for child in &geometries.children {
            match child.name.as_str() {
                "Geometry3D" => {
                    if let Some(file) = non_empty_attr(child, "fileName") {
                        out.push(GeometryRef {
                            file: PathBuf::from(file),
                            kind: child.attr("type").unwrap_or_default().to_string(),
                            local: matrix_of(child),
                        });
                    }
                }
                "Symbol" => {
                    let target = child.attr("symdef").unwrap_or_default();
                    match self.scene.symbols.get(target) {
                        Some(symbol) => out.extend(symbol.instantiate(&matrix_of(child))),
                        None => tracing::warn!(
                            "<{}> '{}' references unknown symbol definition {}",
                            node.name,
                            node.attr("name").unwrap_or_default(),
                            target
                        ),
                    }
                }
                _ => {}
            }
        }
        out
    }

    fn read_fixture(&mut self, node: &XmlElement, world: &Transform3, layer: &str) {
        let mut fixture = Fixture::new(node.attr("name").unwrap_or_default());
        if let Some(uuid) = non_empty_attr(node, "uuid") {
            fixture.uuid = uuid.to_string();
        }
        fixture.layer = layer.to_string();
        fixture.transform = *world;
        fixture.gdtf_spec = Self::profile_ref(node);
        fixture.gdtf_mode = node.child_text("GDTFMode").unwrap_or_default().to_string();
        fixture.position = self.position_ref(node);
        fixture.fixture_id = numeric_id(node);
        fixture.unit_number = node
            .child_text("UnitNumber")
            .and_then(|text| text.parse().ok())
            .unwrap_or(0);
        fixture.multipatch = non_empty_attr(node, "multipatch").map(str::to_string);

        let address = node
            .child("Addresses")
            .and_then(|addresses| addresses.child("Address"))
            .map(|address| address.text.trim())
            .filter(|text| !text.is_empty());
        if let Some(text) = address {
            match InputParser::parse_address(text) {
                Ok(address) => fixture.address = address.to_string(),
                Err(e) => tracing::warn!("Fixture '{}' has an invalid address: {}", fixture.name, e),
            }
        }

        if let Some(text) = node.child_text("Color").filter(|c| !c.is_empty()) {
            match CieColor::parse(text) {
                Ok(cie) => fixture.color = Some(cie.to_rgb().to_hex()),
                Err(e) => tracing::warn!("Fixture '{}' has an invalid color: {}", fixture.name, e),
            }
        }

        if let Some(profile) = fixture.gdtf_spec.clone() {
            fixture.type_name = self.profile_type(&profile);
        }

        tracing::debug!("Fixture '{}' ({})", fixture.name, fixture.uuid);
        self.scene.add_fixture(fixture);
    }

    fn read_truss(&mut self, node: &XmlElement, world: &Transform3, layer: &str) {
        let mut truss = Truss::new(node.attr("name").unwrap_or_default());
        if let Some(uuid) = non_empty_attr(node, "uuid") {
            truss.uuid = uuid.to_string();
        }
        truss.layer = layer.to_string();
        truss.transform = *world;
        truss.gdtf_spec = Self::profile_ref(node);
        truss.gdtf_mode = node.child_text("GDTFMode").unwrap_or_default().to_string();
        truss.numeric_id = numeric_id(node);
        truss.position = self.position_ref(node);
        truss.model_file = self.geometries_of(node).into_iter().next().map(|g| g.file);

        tracing::debug!("Truss '{}' ({})", truss.name, truss.uuid);
        self.scene.add_truss(truss);
    }

    fn read_support(&mut self, node: &XmlElement, world: &Transform3, layer: &str) {
        let support = self.support_from(node, world, layer, self.geometries_of(node));
        tracing::debug!("Support '{}' ({})", support.name, support.uuid);
        self.scene.add_support(support);
    }

    fn support_from(&self, node: &XmlElement, world: &Transform3, layer: &str, geometries: Vec<GeometryRef>) -> Support {
        let mut support = Support::new(node.attr("name").unwrap_or_default());
        if let Some(uuid) = non_empty_attr(node, "uuid") {
            support.uuid = uuid.to_string();
        }
        support.layer = layer.to_string();
        support.transform = *world;
        support.gdtf_spec = Self::profile_ref(node);
        support.gdtf_mode = node.child_text("GDTFMode").unwrap_or_default().to_string();
        support.numeric_id = numeric_id(node);
        support.position = self.position_ref(node);
        support.model_file = geometries.into_iter().next().map(|g| g.file);
        support
    }

    /// 场景物体；自身类型或（符号继承的）几何类型为 support 时改为支撑
    fn read_scene_object(&mut self, node: &XmlElement, world: &Transform3, layer: &str) {
        let geometries = self.geometries_of(node);
        let kind = non_empty_attr(node, "type")
            .map(str::to_string)
            .or_else(|| {
                geometries
                    .iter()
                    .map(|g| g.kind.trim())
                    .find(|k| !k.is_empty())
                    .map(str::to_string)
            })
            .unwrap_or_default();

        if kind.eq_ignore_ascii_case(SUPPORT_KIND) {
            let support = self.support_from(node, world, layer, geometries);
            tracing::debug!("<{}> '{}' reclassified as support", node.name, support.name);
            self.scene.add_support(support);
            return;
        }

        let mut object = SceneObject::new(node.attr("name").unwrap_or_default());
        if let Some(uuid) = non_empty_attr(node, "uuid") {
            object.uuid = uuid.to_string();
        }
        object.layer = layer.to_string();
        object.transform = *world;
        object.kind = if kind.is_empty() && node.name != "SceneObject" {
            node.name.clone()
        } else {
            kind
        };
        object.geometries = geometries;

        tracing::debug!("Scene object '{}' ({})", object.name, object.uuid);
        self.scene.add_scene_object(object);
    }
}

/// 按型号名用字典核对灯具配置文件
///
/// 不询问时直接替换；询问时每个冲突型号只问一次。
fn reconcile_profiles(
    scene: &mut Scene,
    dictionary: &ProfileDictionary,
    prompt_conflicts: bool,
    resolver: &mut dyn ConflictResolver,
) {
    let mut conflicts: BTreeMap<String, (PathBuf, PathBuf)> = BTreeMap::new();
    for fixture in scene.fixtures.values() {
        if fixture.type_name.trim().is_empty() {
            continue;
        }
        let Some(canonical) = dictionary.lookup(&fixture.type_name) else {
            continue;
        };
        let bundled = fixture
            .gdtf_spec
            .as_deref()
            .map(|p| scene.resolve_path(p))
            .unwrap_or_default();
        if bundled == canonical {
            continue;
        }
        conflicts
            .entry(fixture.type_name.clone())
            .or_insert_with(|| (bundled, canonical.to_path_buf()));
    }

    let mut substitutions: HashMap<String, PathBuf> = HashMap::new();
    for (type_name, (bundled, canonical)) in conflicts {
        let choice = if prompt_conflicts {
            resolver.choose(&type_name, &bundled, &canonical)
        } else {
            ProfileChoice::Dictionary
        };
        tracing::debug!("Profile for '{}': {:?}", type_name, choice);
        if choice == ProfileChoice::Dictionary {
            substitutions.insert(type_name, canonical);
        }
    }

    let mut replaced = 0;
    for fixture in scene.fixtures.values_mut() {
        if let Some(canonical) = substitutions.get(&fixture.type_name) {
            fixture.gdtf_spec = Some(canonical.clone());
            replaced += 1;
        }
    }
    if replaced > 0 {
        tracing::info!("Replaced {} fixture profiles from the dictionary", replaced);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{ArchiveWriter, DEFAULT_COMPRESSION_LEVEL};
    use crate::config::InterchangeConfig;
    use crate::dictionary::{PreferBundled, PreferDictionary};
    use crate::export::export_scene;
    use crate::gdtf::tests::write_profile;
    use std::fs::File;

    const TOLERANCE: f64 = 1e-6;

    /// 写一个场景文档，`extra` 为额外条目（条目名，源文件）
    fn write_mvr(dir: &Path, xml: &str, extra: &[(&str, &Path)]) -> PathBuf {
        let path = dir.join("scene.mvr");
        let mut writer = ArchiveWriter::new(File::create(&path).unwrap(), DEFAULT_COMPRESSION_LEVEL);
        writer.add_bytes(SCENE_DESCRIPTION_ENTRY, xml.as_bytes()).unwrap();
        for (name, source) in extra {
            writer.add_file(name, source).unwrap();
        }
        writer.finish().unwrap();
        path
    }

    fn document(aux: &str, layers: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<GeneralSceneDescription verMajor="1" verMinor="6" provider="Test" providerVersion="1">
  <Scene>
    <AUXData>{}</AUXData>
    <Layers>{}</Layers>
  </Scene>
</GeneralSceneDescription>"#,
            aux, layers
        )
    }

    fn import(path: &Path) -> ImportedScene {
        import_scene(path, &ImportOptions::default(), None, &mut PreferBundled).unwrap()
    }

    #[test]
    fn test_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let profile = write_profile(temp_dir.path(), "Spot.gdtf");

        let mut scene = Scene::new();
        scene.add_layer(Layer::new("Truss 1").with_color("#00FF00"));
        scene.add_layer(Layer::new("Floor"));

        let mut spot = Fixture::new("Spot 1")
            .with_profile(&profile, "Standard")
            .with_layer("Truss 1")
            .with_transform(Transform3::from_rotation_z(90.0).with_origin(1000.0, 2500.0, 6000.0));
        spot.address = "3.1".to_string();
        spot.position.name = "FOH".to_string();
        let spot_uuid = scene.add_fixture(spot);

        let mut truss = Truss::new("Main truss");
        truss.layer = "Truss 1".to_string();
        truss.transform = Transform3::from_translation(0.0, 2500.0, 6200.0);
        let truss_uuid = scene.add_truss(truss);

        let mut hoist = Support::new("Hoist A");
        hoist.layer = "Floor".to_string();
        scene.add_support(hoist);

        let mut set_piece = SceneObject::new("Riser");
        set_piece.transform = Transform3::from_translation(-500.0, 0.0, 0.0);
        set_piece.geometries.push(GeometryRef::new("models/riser.3ds"));
        let riser_uuid = scene.add_scene_object(set_piece);

        let path = temp_dir.path().join("show.mvr");
        export_scene(&mut scene, &path, &InterchangeConfig::default()).unwrap();

        let imported = import(&path);
        let loaded = &imported.scene;
        assert_eq!(loaded.fixtures.len(), 1);
        assert_eq!(loaded.trusses.len(), 1);
        assert_eq!(loaded.supports.len(), 1);
        assert_eq!(loaded.scene_objects.len(), 1);

        for entity in scene.entities() {
            let found = loaded
                .entities()
                .find(|e| e.uuid() == entity.uuid())
                .unwrap();
            assert_eq!(found.kind(), entity.kind());
            assert_eq!(found.name(), entity.name());
            assert_eq!(
                is_default_layer_name(found.layer()),
                is_default_layer_name(entity.layer())
            );
            if !is_default_layer_name(entity.layer()) {
                assert_eq!(found.layer(), entity.layer());
            }
            assert!(found
                .as_entity()
                .transform()
                .approx_eq(entity.as_entity().transform(), TOLERANCE));
        }

        let spot = &loaded.fixtures[&spot_uuid];
        assert_eq!(spot.address, "3.1");
        assert_eq!(spot.type_name, "Spot 500");
        assert_eq!(spot.position.name, "FOH");
        assert_eq!(spot.fixture_id, scene.fixtures[&spot_uuid].fixture_id);
        assert!(loaded.resolve_path(spot.gdtf_spec.as_deref().unwrap()).is_file());

        assert_eq!(loaded.trusses[&truss_uuid].numeric_id, scene.trusses[&truss_uuid].numeric_id);
        assert_eq!(loaded.layer_by_name("Truss 1").and_then(|l| l.color.as_deref()), Some("#00FF00"));
        assert_eq!(
            loaded.scene_objects[&riser_uuid].geometries[0].file,
            PathBuf::from("models/riser.3ds")
        );
        assert!(loaded.layer_by_name(DEFAULT_LAYER_NAME).is_some());
    }

    #[test]
    fn test_exported_ids_are_unique_and_positive() {
        let temp_dir = TempDir::new().unwrap();
        let mut scene = Scene::new();
        for i in 0..4 {
            let mut fixture = Fixture::new(format!("F{}", i));
            fixture.fixture_id = 7;
            scene.add_fixture(fixture);
        }
        scene.add_truss(Truss::new("T"));
        scene.add_support(Support::new("S"));

        let path = temp_dir.path().join("ids.mvr");
        export_scene(&mut scene, &path, &InterchangeConfig::default()).unwrap();

        let loaded = import(&path).scene;
        let mut ids: Vec<u32> = loaded
            .fixtures
            .values()
            .map(|f| f.fixture_id)
            .chain(loaded.trusses.values().map(|t| t.numeric_id))
            .chain(loaded.supports.values().map(|s| s.numeric_id))
            .collect();
        assert!(ids.iter().all(|&id| id > 0));
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 6);
    }

    #[test]
    fn test_display_names_survive_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let mut scene = Scene::new();
        let truss = scene.add_truss(Truss::new(""));
        let fixture = scene.add_fixture(Fixture::new("  Spot  "));

        let path = temp_dir.path().join("names.mvr");
        export_scene(&mut scene, &path, &InterchangeConfig::default()).unwrap();

        let loaded = import(&path).scene;
        assert_eq!(loaded.trusses[&truss].name, "");
        assert_eq!(loaded.fixtures[&fixture].name, "  Spot  ");
    }

    #[test]
    fn test_renamed_layer_keeps_members() {
        let temp_dir = TempDir::new().unwrap();
        let mut scene = Scene::new();
        let layer_id = scene.add_layer(Layer::new("Truss 1"));
        let fixture = scene.add_fixture(Fixture::new("A").with_layer("Truss 1"));
        if let Some(layer) = scene.layers.get_mut(&layer_id) {
            layer.name = "Renamed away".to_string();
        }

        let path = temp_dir.path().join("renamed.mvr");
        export_scene(&mut scene, &path, &InterchangeConfig::default()).unwrap();

        let loaded = import(&path).scene;
        assert_eq!(loaded.fixtures.len(), 1);
        assert_eq!(loaded.fixtures[&fixture].layer, "Truss 1");
        assert!(loaded.layer_by_name("Truss 1").is_some());
        assert!(loaded.layer_by_name("Renamed away").is_some());
    }

    #[test]
    fn test_absolute_address_becomes_universe_channel() {
        let temp_dir = TempDir::new().unwrap();
        let layers = r#"<ChildList>
            <Fixture uuid="F1" name="Spot">
              <FixtureID>1</FixtureID><FixtureIDNumeric>1</FixtureIDNumeric>
              <Addresses><Address break="0">1025</Address></Addresses>
            </Fixture>
        </ChildList>"#;
        let path = write_mvr(temp_dir.path(), &document("", layers), &[]);

        let scene = import(&path).scene;
        assert_eq!(scene.fixtures["F1"].address, "3.1");
        assert_eq!(scene.fixtures["F1"].layer, DEFAULT_LAYER_NAME);
    }

    #[test]
    fn test_disguised_supports() {
        let temp_dir = TempDir::new().unwrap();
        let aux = r#"<Symdef uuid="HOIST" name="Hoist" type="Support">
            <ChildList><Geometry3D fileName="hoist.3ds"/></ChildList>
        </Symdef>"#;
        let layers = r#"<ChildList>
            <SceneObject uuid="A" name="Typed" type="SUPPORT"/>
            <SceneObject uuid="B" name="Geometry typed">
              <Geometries><Geometry3D fileName="motor.3ds" type="support"/></Geometries>
            </SceneObject>
            <SceneObject uuid="C" name="Via symbol">
              <Geometries><Symbol symdef="HOIST"/></Geometries>
            </SceneObject>
            <SceneObject uuid="D" name="Plain">
              <Geometries><Geometry3D fileName="riser.3ds"/></Geometries>
            </SceneObject>
        </ChildList>"#;
        let path = write_mvr(temp_dir.path(), &document(aux, layers), &[]);

        let scene = import(&path).scene;
        assert_eq!(scene.supports.len(), 3);
        assert_eq!(scene.scene_objects.len(), 1);
        assert!(scene.scene_objects.contains_key("D"));
        assert_eq!(scene.supports["C"].model_file, Some(PathBuf::from("hoist.3ds")));
    }

    #[test]
    fn test_nested_symbols_compose_transforms() {
        let temp_dir = TempDir::new().unwrap();
        let aux = r#"<Symdef uuid="INNER" name="Inner">
            <ChildList><Geometry3D fileName="box.3ds"><Matrix>{1,0,0}{0,1,0}{0,0,1}{0,0,5}</Matrix></Geometry3D></ChildList>
        </Symdef>
        <Symdef uuid="OUTER" name="Outer" type="Set">
            <ChildList><Symbol symdef="INNER"><Matrix>{1,0,0}{0,1,0}{0,0,1}{10,0,0}</Matrix></Symbol></ChildList>
        </Symdef>
        <Symdef uuid="LOOP" name="Loop"><ChildList><Symbol symdef="LOOP"/></ChildList></Symdef>"#;
        let layers = r#"<ChildList>
            <SceneObject uuid="S" name="Set">
              <Matrix>{1,0,0}{0,1,0}{0,0,1}{100,0,0}</Matrix>
              <Geometries><Symbol symdef="OUTER"><Matrix>{1,0,0}{0,1,0}{0,0,1}{0,20,0}</Matrix></Symbol></Geometries>
            </SceneObject>
        </ChildList>"#;
        let path = write_mvr(temp_dir.path(), &document(aux, layers), &[]);

        let scene = import(&path).scene;
        assert_eq!(scene.symbols.len(), 3);
        assert_eq!(scene.symbols["OUTER"].geometries.len(), 1);
        assert!(scene.symbols["LOOP"].geometries.is_empty());

        let object = &scene.scene_objects["S"];
        assert_eq!(object.kind, "Set");
        let expected = Transform3::from_translation(10.0, 20.0, 5.0);
        assert!(object.geometries[0].local.approx_eq(&expected, TOLERANCE));
        assert!(object
            .transform
            .approx_eq(&Transform3::from_translation(100.0, 0.0, 0.0), TOLERANCE));
    }

    #[test]
    fn test_group_objects_compose_and_malformed_matrix_is_identity() {
        let temp_dir = TempDir::new().unwrap();
        let layers = r#"<Layer uuid="L1" name="Stage">
          <ChildList>
            <GroupObject uuid="G" name="Group">
              <Matrix>{1,0,0}{0,1,0}{0,0,1}{0,0,1000}</Matrix>
              <ChildList>
                <Truss uuid="T" name="Truss"><Matrix>{1,0,0}{0,1,0}{0,0,1}{500,0,0}</Matrix></Truss>
                <Truss uuid="BAD" name="Broken"><Matrix>{1,0}{nonsense}</Matrix></Truss>
              </ChildList>
            </GroupObject>
          </ChildList>
        </Layer>"#;
        let path = write_mvr(temp_dir.path(), &document("", layers), &[]);

        let scene = import(&path).scene;
        assert_eq!(scene.trusses.len(), 2);
        assert_eq!(scene.trusses["T"].layer, "Stage");
        assert!(scene.trusses["T"]
            .transform
            .approx_eq(&Transform3::from_translation(500.0, 0.0, 1000.0), TOLERANCE));
        // 格式错误的局部矩阵退回单位矩阵，仍继承组变换
        assert!(scene.trusses["BAD"]
            .transform
            .approx_eq(&Transform3::from_translation(0.0, 0.0, 1000.0), TOLERANCE));
        assert_eq!(scene.layer_by_name("Stage").map(|l| l.uuid.as_str()), Some("L1"));
    }

    #[test]
    fn test_newer_minor_version_still_imports() {
        let temp_dir = TempDir::new().unwrap();
        let xml = document("", r#"<ChildList><Truss uuid="T" name="T"/></ChildList>"#)
            .replace(r#"verMinor="6""#, r#"verMinor="9""#);
        let path = write_mvr(temp_dir.path(), &xml, &[]);

        assert_eq!(import(&path).scene.trusses.len(), 1);
    }

    #[test]
    fn test_video_screen_is_scene_object() {
        let temp_dir = TempDir::new().unwrap();
        let layers = r#"<ChildList><VideoScreen uuid="V" name="LED wall"/></ChildList>"#;
        let path = write_mvr(temp_dir.path(), &document("", layers), &[]);

        let scene = import(&path).scene;
        assert_eq!(scene.scene_objects["V"].kind, "VideoScreen");
    }

    #[test]
    fn test_hard_failures() {
        let temp_dir = TempDir::new().unwrap();
        let options = ImportOptions::default();

        let missing = temp_dir.path().join("missing.mvr");
        assert!(import_scene(&missing, &options, None, &mut PreferBundled).is_err());

        let wrong_extension = temp_dir.path().join("scene.zip");
        std::fs::write(&wrong_extension, b"whatever").unwrap();
        assert!(matches!(
            import_scene(&wrong_extension, &options, None, &mut PreferBundled),
            Err(FileError::InvalidFormat(_))
        ));

        let not_zip = temp_dir.path().join("broken.mvr");
        std::fs::write(&not_zip, b"not a zip").unwrap();
        assert!(matches!(
            import_scene(&not_zip, &options, None, &mut PreferBundled),
            Err(FileError::Zip(_))
        ));

        let readme = temp_dir.path().join("readme.txt");
        std::fs::write(&readme, b"hello").unwrap();
        let path = temp_dir.path().join("empty.mvr");
        let mut writer = ArchiveWriter::new(File::create(&path).unwrap(), DEFAULT_COMPRESSION_LEVEL);
        writer.add_file("readme.txt", &readme).unwrap();
        writer.finish().unwrap();
        assert!(matches!(
            import_scene(&path, &options, None, &mut PreferBundled),
            Err(FileError::MissingSceneDescription(_))
        ));
    }

    #[test]
    fn test_scene_description_found_case_insensitively() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("upper.MVR");
        let mut writer = ArchiveWriter::new(File::create(&path).unwrap(), DEFAULT_COMPRESSION_LEVEL);
        writer
            .add_bytes("generalscenedescription.XML", document("", "").as_bytes())
            .unwrap();
        writer.finish().unwrap();

        let scene = import(&path).scene;
        assert_eq!(scene.provider, "Test");
    }

    fn dictionary_fixture_document(dir: &Path) -> (PathBuf, PathBuf) {
        let bundled = write_profile(dir, "Spot.gdtf");
        let layers = r#"<ChildList>
            <Fixture uuid="F1" name="Spot"><GDTFSpec>gdtf/Spot.gdtf</GDTFSpec></Fixture>
            <Fixture uuid="F2" name="Spot 2"><GDTFSpec>gdtf/Spot.gdtf</GDTFSpec></Fixture>
        </ChildList>"#;
        let path = write_mvr(dir, &document("", layers), &[("gdtf/Spot.gdtf", bundled.as_path())]);
        let canonical = dir.join("library").join("Acme@Spot_500.gdtf");
        (path, canonical)
    }

    #[test]
    fn test_dictionary_substitutes_silently() {
        let temp_dir = TempDir::new().unwrap();
        let (path, canonical) = dictionary_fixture_document(temp_dir.path());
        let mut dictionary = ProfileDictionary::new();
        dictionary.insert("Spot 500", &canonical);

        let options = ImportOptions {
            apply_dictionary: true,
            prompt_conflicts: false,
        };
        let scene = import_scene(&path, &options, Some(&dictionary), &mut PreferBundled)
            .unwrap()
            .scene;
        assert!(scene
            .fixtures
            .values()
            .all(|f| f.gdtf_spec.as_deref() == Some(canonical.as_path())));
    }

    #[test]
    fn test_dictionary_conflicts_ask_once_per_type() {
        struct Counting(usize, ProfileChoice);
        impl ConflictResolver for Counting {
            fn choose(&mut self, type_name: &str, _bundled: &Path, _dictionary: &Path) -> ProfileChoice {
                assert_eq!(type_name, "Spot 500");
                self.0 += 1;
                self.1
            }
        }

        let temp_dir = TempDir::new().unwrap();
        let (path, canonical) = dictionary_fixture_document(temp_dir.path());
        let mut dictionary = ProfileDictionary::new();
        dictionary.insert("Spot 500", &canonical);
        let options = ImportOptions {
            apply_dictionary: true,
            prompt_conflicts: true,
        };

        let mut keep = Counting(0, ProfileChoice::Bundled);
        let scene = import_scene(&path, &options, Some(&dictionary), &mut keep).unwrap().scene;
        assert_eq!(keep.0, 1);
        assert!(scene
            .fixtures
            .values()
            .all(|f| f.gdtf_spec.as_deref() == Some(Path::new("gdtf/Spot.gdtf"))));

        let scene = import_scene(&path, &options, Some(&dictionary), &mut PreferDictionary)
            .unwrap()
            .scene;
        assert!(scene
            .fixtures
            .values()
            .all(|f| f.gdtf_spec.as_deref() == Some(canonical.as_path())));
    }
}
