//! 符号定义
//!
//! 一个符号是一组可复用的几何引用，实体通过标识符间接引用它，
//! 以便多个实体共享同一份模型文件。

use crate::entity::{new_uuid, GeometryRef};
use crate::transform::Transform3;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolDefinition {
    pub uuid: String,
    pub name: String,
    /// 符号级几何类型，几何自身未声明类型时继承
    pub kind: String,
    /// 已展开的几何，局部变换相对于符号原点
    pub geometries: Vec<GeometryRef>,
}

impl SymbolDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            uuid: new_uuid(),
            name: name.into(),
            kind: String::new(),
            geometries: Vec::new(),
        }
    }

    pub fn with_geometry(mut self, geometry: GeometryRef) -> Self {
        self.geometries.push(geometry);
        self
    }

    /// 解析后的几何类型：第一个声明了类型的几何，否则为符号自身的类型
    pub fn resolved_kind(&self) -> &str {
        self.geometries
            .iter()
            .map(|g| g.kind.as_str())
            .find(|kind| !kind.trim().is_empty())
            .unwrap_or(&self.kind)
    }

    /// 以 `placement` 放置符号后得到的几何（局部变换已组合）
    pub fn instantiate(&self, placement: &Transform3) -> Vec<GeometryRef> {
        self.geometries
            .iter()
            .map(|geometry| GeometryRef {
                file: geometry.file.clone(),
                kind: if geometry.kind.is_empty() {
                    self.kind.clone()
                } else {
                    geometry.kind.clone()
                },
                local: placement.compose(&geometry.local),
            })
            .collect()
    }
}
