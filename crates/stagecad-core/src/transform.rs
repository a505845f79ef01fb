//! 4x3 仿射变换
//!
//! 交换格式中的矩阵写作 `{u1,u2,u3}{v1,v2,v3}{w1,w2,w3}{o1,o2,o3}`：
//! 三个基向量加原点，长度单位为毫米。
//!
//! 组合规则为 `world = parent * local`，逐层自上而下应用。

use crate::input_parser::{InputParser, ParseError};
use nalgebra::{Matrix3, Rotation3, Vector3};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Mul;

/// 基向量 + 原点
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform3 {
    /// 列向量依次为 u、v、w
    pub basis: Matrix3<f64>,
    pub origin: Vector3<f64>,
}

impl Default for Transform3 {
    fn default() -> Self {
        Self::identity()
    }
}

impl Transform3 {
    pub fn identity() -> Self {
        Self {
            basis: Matrix3::identity(),
            origin: Vector3::zeros(),
        }
    }

    pub fn new(basis: Matrix3<f64>, origin: Vector3<f64>) -> Self {
        Self { basis, origin }
    }

    pub fn from_translation(x: f64, y: f64, z: f64) -> Self {
        Self {
            basis: Matrix3::identity(),
            origin: Vector3::new(x, y, z),
        }
    }

    /// 绕Z轴旋转（角度制），常用于舞台平面图
    pub fn from_rotation_z(degrees: f64) -> Self {
        let rotation = Rotation3::from_axis_angle(&Vector3::z_axis(), degrees.to_radians());
        Self {
            basis: *rotation.matrix(),
            origin: Vector3::zeros(),
        }
    }

    pub fn with_origin(mut self, x: f64, y: f64, z: f64) -> Self {
        self.origin = Vector3::new(x, y, z);
        self
    }

    /// 组合：先应用 `local`，再应用 `self`
    pub fn compose(&self, local: &Transform3) -> Transform3 {
        Transform3 {
            basis: self.basis * local.basis,
            origin: self.basis * local.origin + self.origin,
        }
    }

    /// 逐分量比较（浮点容差）
    pub fn approx_eq(&self, other: &Transform3, tolerance: f64) -> bool {
        (self.basis - other.basis).amax() <= tolerance
            && (self.origin - other.origin).amax() <= tolerance
    }

    /// 解析矩阵文本
    ///
    /// 需要恰好四组、每组三个数值。失败时由调用方决定是否退回单位矩阵。
    pub fn parse(text: &str) -> Result<Transform3, ParseError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ParseError::MissingValue("matrix".to_string()));
        }

        let mut rows: Vec<[f64; 3]> = Vec::with_capacity(4);
        for group in text.split('}') {
            let group = group.trim();
            if group.is_empty() {
                continue;
            }
            let inner = group
                .strip_prefix('{')
                .ok_or_else(|| ParseError::InvalidFormat(format!("Expected '{{' in matrix: {}", text)))?;

            let values = inner
                .split(',')
                .map(InputParser::parse_number)
                .collect::<Result<Vec<f64>, ParseError>>()?;
            if values.len() != 3 {
                return Err(ParseError::InvalidFormat(format!(
                    "Matrix row needs 3 values, got {}",
                    values.len()
                )));
            }
            rows.push([values[0], values[1], values[2]]);
        }

        if rows.len() != 4 {
            return Err(ParseError::InvalidFormat(format!(
                "Matrix needs 4 rows, got {}",
                rows.len()
            )));
        }

        let column = |r: &[f64; 3]| Vector3::new(r[0], r[1], r[2]);
        Ok(Transform3 {
            basis: Matrix3::from_columns(&[column(&rows[0]), column(&rows[1]), column(&rows[2])]),
            origin: column(&rows[3]),
        })
    }

    /// 分解为缩放与旋转，仅用于诊断输出
    pub fn decompose(&self) -> Decomposition {
        let mut scale = Vector3::zeros();
        let mut rotation = self.basis;
        for i in 0..3 {
            let norm = self.basis.column(i).norm();
            scale[i] = norm;
            if norm > f64::EPSILON {
                rotation.set_column(i, &(self.basis.column(i) / norm));
            }
        }

        let (roll, pitch, yaw) = Rotation3::from_matrix_unchecked(rotation).euler_angles();
        Decomposition {
            scale,
            rotation_degrees: Vector3::new(roll.to_degrees(), pitch.to_degrees(), yaw.to_degrees()),
            translation: self.origin,
        }
    }
}

impl Mul for Transform3 {
    type Output = Transform3;

    fn mul(self, rhs: Transform3) -> Transform3 {
        self.compose(&rhs)
    }
}

impl fmt::Display for Transform3 {
    /// 与 [`Transform3::parse`] 互逆
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for i in 0..3 {
            let c = self.basis.column(i);
            write!(f, "{{{},{},{}}}", c[0], c[1], c[2])?;
        }
        write!(f, "{{{},{},{}}}", self.origin.x, self.origin.y, self.origin.z)
    }
}

/// 矩阵分解结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decomposition {
    pub scale: Vector3<f64>,
    /// 绕 X、Y、Z 的欧拉角（度）
    pub rotation_degrees: Vector3<f64>,
    pub translation: Vector3<f64>,
}
