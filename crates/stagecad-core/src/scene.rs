//! 场景根容器
//!
//! 场景拥有全部实体、图层、命名位置与符号定义的映射（标识符 -> 实体），
//! 以及用于解析相对资源路径的基准目录和交换格式元数据。

use crate::entity::{new_uuid, EntityRef, Fixture, SceneEntity, SceneObject, Support, Truss};
use crate::layer::{Layer, DEFAULT_LAYER_NAME};
use crate::symbol::SymbolDefinition;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// 按名字查找命名位置的标识符
pub fn position_id_by_name<'a>(positions: &'a BTreeMap<String, String>, name: &str) -> Option<&'a str> {
    positions
        .iter()
        .find(|(_, n)| n.as_str() == name)
        .map(|(id, _)| id.as_str())
}

/// 场景文档
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub fixtures: BTreeMap<String, Fixture>,
    pub trusses: BTreeMap<String, Truss>,
    pub supports: BTreeMap<String, Support>,
    pub scene_objects: BTreeMap<String, SceneObject>,
    pub layers: BTreeMap<String, Layer>,
    /// 位置标识符 -> 位置名
    pub positions: BTreeMap<String, String>,
    pub symbols: BTreeMap<String, SymbolDefinition>,

    /// 相对资源路径的解析基准
    pub base_path: PathBuf,
    pub provider: String,
    pub provider_version: String,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    /// 创建只含默认图层的空场景
    pub fn new() -> Self {
        let mut scene = Self {
            fixtures: BTreeMap::new(),
            trusses: BTreeMap::new(),
            supports: BTreeMap::new(),
            scene_objects: BTreeMap::new(),
            layers: BTreeMap::new(),
            positions: BTreeMap::new(),
            symbols: BTreeMap::new(),
            base_path: PathBuf::new(),
            provider: String::new(),
            provider_version: String::new(),
        };
        scene.ensure_default_layer();
        scene
    }

    /// 清空场景，保留默认图层
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn add_fixture(&mut self, fixture: Fixture) -> String {
        let uuid = fixture.uuid.clone();
        self.fixtures.insert(uuid.clone(), fixture);
        uuid
    }

    pub fn add_truss(&mut self, truss: Truss) -> String {
        let uuid = truss.uuid.clone();
        self.trusses.insert(uuid.clone(), truss);
        uuid
    }

    pub fn add_support(&mut self, support: Support) -> String {
        let uuid = support.uuid.clone();
        self.supports.insert(uuid.clone(), support);
        uuid
    }

    pub fn add_scene_object(&mut self, object: SceneObject) -> String {
        let uuid = object.uuid.clone();
        self.scene_objects.insert(uuid.clone(), object);
        uuid
    }

    pub fn add_layer(&mut self, layer: Layer) -> String {
        let uuid = layer.uuid.clone();
        self.layers.insert(uuid.clone(), layer);
        uuid
    }

    pub fn add_symbol(&mut self, symbol: SymbolDefinition) -> String {
        let uuid = symbol.uuid.clone();
        self.symbols.insert(uuid.clone(), symbol);
        uuid
    }

    /// 添加命名位置，返回新标识符
    pub fn add_position(&mut self, name: impl Into<String>) -> String {
        let uuid = new_uuid();
        self.positions.insert(uuid.clone(), name.into());
        uuid
    }

    pub fn layer_by_name(&self, name: &str) -> Option<&Layer> {
        self.layers.values().find(|layer| layer.name == name)
    }

    /// 保证默认图层存在
    pub fn ensure_default_layer(&mut self) {
        if self.layer_by_name(DEFAULT_LAYER_NAME).is_none() {
            self.add_layer(Layer::default_layer());
        }
    }

    /// 所有实体（灯具、桁架、支撑、场景物体顺序）
    pub fn entities(&self) -> impl Iterator<Item = EntityRef<'_>> {
        self.fixtures
            .values()
            .map(EntityRef::Fixture)
            .chain(self.trusses.values().map(EntityRef::Truss))
            .chain(self.supports.values().map(EntityRef::Support))
            .chain(self.scene_objects.values().map(EntityRef::SceneObject))
    }

    /// 可变遍历所有实体
    pub fn entities_mut(&mut self) -> impl Iterator<Item = &mut dyn SceneEntity> {
        self.fixtures
            .values_mut()
            .map(|f| f as &mut dyn SceneEntity)
            .chain(self.trusses.values_mut().map(|t| t as &mut dyn SceneEntity))
            .chain(self.supports.values_mut().map(|s| s as &mut dyn SceneEntity))
            .chain(self.scene_objects.values_mut().map(|o| o as &mut dyn SceneEntity))
    }

    pub fn entity_count(&self) -> usize {
        self.fixtures.len() + self.trusses.len() + self.supports.len() + self.scene_objects.len()
    }

    /// 将相对路径解析到基准目录
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() || self.base_path.as_os_str().is_empty() {
            path.to_path_buf()
        } else {
            self.base_path.join(path)
        }
    }
}
