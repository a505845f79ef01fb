//! 图层
//!
//! 序列化时的图层归属按实体的图层名字符串比较得出，
//! 而不是 [`Layer::members`]（后者只用于界面记账）。
//! 该规则封装在 [`LayerIndex`] 中，以后可替换为基于标识符的索引。
//!
//! 已知风险：重命名图层不会修正已有成员的图层名。

use crate::entity::{new_uuid, EntityRef};
use crate::scene::Scene;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 默认图层名
pub const DEFAULT_LAYER_NAME: &str = "Default";

/// 空名或默认图层名都视为默认图层
pub fn is_default_layer_name(name: &str) -> bool {
    let name = name.trim();
    name.is_empty() || name == DEFAULT_LAYER_NAME
}

/// 图层定义
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub uuid: String,
    pub name: String,
    /// `#RRGGBB`
    pub color: Option<String>,
    /// 成员标识符（仅供界面使用）
    pub members: Vec<String>,
}

impl Layer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            uuid: new_uuid(),
            name: name.into(),
            color: None,
            members: Vec::new(),
        }
    }

    pub fn default_layer() -> Self {
        Self::new(DEFAULT_LAYER_NAME)
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    pub fn is_default(&self) -> bool {
        is_default_layer_name(&self.name)
    }
}

/// 按图层名分组的实体索引
#[derive(Debug)]
pub struct LayerIndex<'a> {
    by_name: HashMap<&'a str, Vec<EntityRef<'a>>>,
    unassigned: Vec<EntityRef<'a>>,
}

impl<'a> LayerIndex<'a> {
    pub fn build(scene: &'a Scene) -> Self {
        let mut by_name: HashMap<&'a str, Vec<EntityRef<'a>>> = HashMap::new();
        let mut unassigned = Vec::new();

        for entity in scene.entities() {
            let layer = entity.layer();
            if is_default_layer_name(layer) {
                unassigned.push(entity);
            } else {
                by_name.entry(layer).or_default().push(entity);
            }
        }

        Self { by_name, unassigned }
    }

    /// 图层名与 `name` 完全相同的实体
    pub fn members(&self, name: &str) -> &[EntityRef<'a>] {
        self.by_name.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// 图层为空或为默认图层的实体
    pub fn unassigned(&self) -> &[EntityRef<'a>] {
        &self.unassigned
    }

    /// 引用了不存在图层的图层名（悬空归属）
    pub fn orphaned_names(&self, scene: &Scene) -> Vec<&'a str> {
        let mut names: Vec<&'a str> = self
            .by_name
            .keys()
            .copied()
            .filter(|name| scene.layer_by_name(name).is_none())
            .collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Fixture, Truss};

    #[test]
    fn test_membership_by_name() {
        let mut scene = Scene::new();
        scene.add_layer(Layer::new("Front Truss"));
        scene.add_fixture(Fixture::new("A").with_layer("Front Truss"));
        scene.add_fixture(Fixture::new("B"));
        scene.add_fixture(Fixture::new("C").with_layer(DEFAULT_LAYER_NAME));
        let mut truss = Truss::new("T");
        truss.layer = "Front Truss".to_string();
        scene.add_truss(truss);

        let index = LayerIndex::build(&scene);
        assert_eq!(index.members("Front Truss").len(), 2);
        assert_eq!(index.unassigned().len(), 2);
        assert!(index.members("Missing").is_empty());
    }

    #[test]
    fn test_rename_does_not_repair_members() {
        let mut scene = Scene::new();
        let layer_id = scene.add_layer(Layer::new("Old"));
        scene.add_fixture(Fixture::new("A").with_layer("Old"));

        if let Some(layer) = scene.layers.get_mut(&layer_id) {
            layer.name = "New".to_string();
        }

        let index = LayerIndex::build(&scene);
        assert!(index.members("New").is_empty());
        assert_eq!(index.orphaned_names(&scene), vec!["Old"]);
    }
}
