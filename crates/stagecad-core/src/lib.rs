//! StageCAD 场景模型
//!
//! 灯光/吊挂设计文档的内存表示：灯具、桁架、支撑、场景物体、
//! 图层、命名位置与符号定义，以及 4x3 变换的解析、格式化与组合。
//!
//! 模型本身只是数据容器，除访问器外不包含业务行为；
//! 导入导出见 `stagecad-file`。
//!
//! # 示例
//!
//! ```rust
//! use stagecad_core::prelude::*;
//!
//! let mut scene = Scene::new();
//! let fixture = Fixture::new("Spot 1")
//!     .with_layer("Front Truss")
//!     .with_transform(Transform3::from_translation(1000.0, 0.0, 5000.0));
//! scene.add_fixture(fixture);
//!
//! assert_eq!(scene.entity_count(), 1);
//! ```

pub mod color;
pub mod entity;
pub mod input_parser;
pub mod layer;
pub mod scene;
pub mod symbol;
pub mod transform;

pub mod prelude {
    //! 常用类型的便捷导入
    pub use crate::color::{CieColor, Rgb};
    pub use crate::entity::{
        EntityKey, EntityKind, EntityRef, Fixture, GeometryRef, PositionRef, SceneEntity,
        SceneObject, Support, Truss,
    };
    pub use crate::input_parser::{DmxAddress, InputParser, ParseError};
    pub use crate::layer::{is_default_layer_name, Layer, LayerIndex, DEFAULT_LAYER_NAME};
    pub use crate::scene::Scene;
    pub use crate::symbol::SymbolDefinition;
    pub use crate::transform::{Decomposition, Transform3};
}
