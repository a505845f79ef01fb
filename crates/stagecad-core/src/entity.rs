//! 场景实体
//!
//! 四类可定位实体：灯具（Fixture）、桁架（Truss）、支撑（Support）、
//! 场景物体（SceneObject）。它们共享一组能力：
//! 标识符、图层名、世界变换、可选的灯具配置文件引用。
//!
//! 图层归属以 **图层名字符串** 表示，而不是图层实体的外键。
//! 重命名图层不会自动修正已有成员的归属，调用方需要显式更新每个成员。

use crate::transform::Transform3;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// 生成新的实体标识符
pub fn new_uuid() -> String {
    Uuid::new_v4().to_string().to_uppercase()
}

/// 实体类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityKind {
    Fixture,
    Truss,
    Support,
    SceneObject,
}

impl EntityKind {
    /// 交换格式中的元素名
    pub fn tag(&self) -> &'static str {
        match self {
            EntityKind::Fixture => "Fixture",
            EntityKind::Truss => "Truss",
            EntityKind::Support => "Support",
            EntityKind::SceneObject => "SceneObject",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// 实体的全局身份（类型 + 标识符）
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityKey {
    pub kind: EntityKind,
    pub uuid: String,
}

impl EntityKey {
    pub fn new(kind: EntityKind, uuid: impl Into<String>) -> Self {
        Self {
            kind,
            uuid: uuid.into(),
        }
    }
}

/// 命名位置引用
///
/// `id` 为空时按 `name` 匹配位置表。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PositionRef {
    pub id: String,
    pub name: String,
}

impl PositionRef {
    pub fn is_empty(&self) -> bool {
        self.id.is_empty() && self.name.trim().is_empty()
    }
}

/// 几何引用：模型文件 + 几何类型 + 相对实体的局部变换
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeometryRef {
    pub file: PathBuf,
    /// 几何类型，例如 `"support"`；空表示普通几何
    pub kind: String,
    pub local: Transform3,
}

impl GeometryRef {
    pub fn new(file: impl Into<PathBuf>) -> Self {
        Self {
            file: file.into(),
            kind: String::new(),
            local: Transform3::identity(),
        }
    }
}

/// 实体共享能力
pub trait SceneEntity {
    fn kind(&self) -> EntityKind;
    fn uuid(&self) -> &str;
    fn name(&self) -> &str;
    fn layer(&self) -> &str;
    fn set_layer(&mut self, layer: &str);
    /// 世界坐标系下的变换
    fn transform(&self) -> &Transform3;
    fn set_transform(&mut self, transform: Transform3);

    /// 灯具配置文件（GDTF）引用
    fn profile(&self) -> Option<&Path> {
        None
    }

    fn position(&self) -> Option<&PositionRef> {
        None
    }

    fn position_mut(&mut self) -> Option<&mut PositionRef> {
        None
    }

    fn key(&self) -> EntityKey {
        EntityKey::new(self.kind(), self.uuid())
    }
}

/// 灯具
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fixture {
    pub uuid: String,
    pub name: String,
    pub layer: String,
    pub transform: Transform3,
    pub gdtf_spec: Option<PathBuf>,
    pub gdtf_mode: String,
    /// 灯具型号名，用于配置文件字典匹配
    pub type_name: String,
    /// 数字编号，0 表示未分配
    pub fixture_id: u32,
    pub unit_number: u32,
    /// 用户输入的地址文本，例如 `"3.1"`
    pub address: String,
    pub position: PositionRef,
    /// `#RRGGBB`
    pub color: Option<String>,
    pub weight_kg: Option<f64>,
    pub power_w: Option<f64>,
    /// 多重配接的主灯具标识符
    pub multipatch: Option<String>,
}

impl Fixture {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            uuid: new_uuid(),
            name: name.into(),
            layer: String::new(),
            transform: Transform3::identity(),
            gdtf_spec: None,
            gdtf_mode: String::new(),
            type_name: String::new(),
            fixture_id: 0,
            unit_number: 0,
            address: String::new(),
            position: PositionRef::default(),
            color: None,
            weight_kg: None,
            power_w: None,
            multipatch: None,
        }
    }

    pub fn with_profile(mut self, path: impl Into<PathBuf>, mode: impl Into<String>) -> Self {
        self.gdtf_spec = Some(path.into());
        self.gdtf_mode = mode.into();
        self
    }

    pub fn with_layer(mut self, layer: impl Into<String>) -> Self {
        self.layer = layer.into();
        self
    }

    pub fn with_transform(mut self, transform: Transform3) -> Self {
        self.transform = transform;
        self
    }
}

/// 桁架
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Truss {
    pub uuid: String,
    pub name: String,
    pub layer: String,
    pub transform: Transform3,
    pub model_file: Option<PathBuf>,
    pub gdtf_spec: Option<PathBuf>,
    pub gdtf_mode: String,
    /// 每次导出都会重新分配
    pub numeric_id: u32,
    pub position: PositionRef,
}

impl Truss {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            uuid: new_uuid(),
            name: name.into(),
            layer: String::new(),
            transform: Transform3::identity(),
            model_file: None,
            gdtf_spec: None,
            gdtf_mode: String::new(),
            numeric_id: 0,
            position: PositionRef::default(),
        }
    }
}

/// 吊点/支撑
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Support {
    pub uuid: String,
    pub name: String,
    pub layer: String,
    pub transform: Transform3,
    pub model_file: Option<PathBuf>,
    pub gdtf_spec: Option<PathBuf>,
    pub gdtf_mode: String,
    pub numeric_id: u32,
    pub position: PositionRef,
}

impl Support {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            uuid: new_uuid(),
            name: name.into(),
            layer: String::new(),
            transform: Transform3::identity(),
            model_file: None,
            gdtf_spec: None,
            gdtf_mode: String::new(),
            numeric_id: 0,
            position: PositionRef::default(),
        }
    }
}

/// 通用场景物体（布景、屏幕、投影等）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneObject {
    pub uuid: String,
    pub name: String,
    pub layer: String,
    pub transform: Transform3,
    /// 几何类型
    pub kind: String,
    pub geometries: Vec<GeometryRef>,
}

impl SceneObject {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            uuid: new_uuid(),
            name: name.into(),
            layer: String::new(),
            transform: Transform3::identity(),
            kind: String::new(),
            geometries: Vec::new(),
        }
    }
}

macro_rules! entity_accessors {
    ($kind:expr) => {
        fn kind(&self) -> EntityKind {
            $kind
        }
        fn uuid(&self) -> &str {
            &self.uuid
        }
        fn name(&self) -> &str {
            &self.name
        }
        fn layer(&self) -> &str {
            &self.layer
        }
        fn set_layer(&mut self, layer: &str) {
            self.layer = layer.to_string();
        }
        fn transform(&self) -> &Transform3 {
            &self.transform
        }
        fn set_transform(&mut self, transform: Transform3) {
            self.transform = transform;
        }
    };
}

macro_rules! impl_scene_entity {
    ($ty:ident, $kind:expr, positioned) => {
        impl SceneEntity for $ty {
            entity_accessors!($kind);

            fn profile(&self) -> Option<&Path> {
                self.gdtf_spec.as_deref()
            }
            fn position(&self) -> Option<&PositionRef> {
                Some(&self.position)
            }
            fn position_mut(&mut self) -> Option<&mut PositionRef> {
                Some(&mut self.position)
            }
        }
    };
    ($ty:ident, $kind:expr) => {
        impl SceneEntity for $ty {
            entity_accessors!($kind);
        }
    };
}

impl_scene_entity!(Fixture, EntityKind::Fixture, positioned);
impl_scene_entity!(Truss, EntityKind::Truss, positioned);
impl_scene_entity!(Support, EntityKind::Support, positioned);
impl_scene_entity!(SceneObject, EntityKind::SceneObject);

/// 实体借用，按类型分派
#[derive(Debug, Clone, Copy)]
pub enum EntityRef<'a> {
    Fixture(&'a Fixture),
    Truss(&'a Truss),
    Support(&'a Support),
    SceneObject(&'a SceneObject),
}

impl<'a> EntityRef<'a> {
    pub fn as_entity(&self) -> &'a dyn SceneEntity {
        match *self {
            EntityRef::Fixture(f) => f,
            EntityRef::Truss(t) => t,
            EntityRef::Support(s) => s,
            EntityRef::SceneObject(o) => o,
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.as_entity().kind()
    }

    pub fn uuid(&self) -> &'a str {
        self.as_entity().uuid()
    }

    pub fn name(&self) -> &'a str {
        self.as_entity().name()
    }

    pub fn layer(&self) -> &'a str {
        self.as_entity().layer()
    }
}
