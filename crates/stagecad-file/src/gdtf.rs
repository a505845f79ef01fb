//! 灯具配置文件（GDTF）
//!
//! 只处理导入导出需要的部分：
//! - 读取型号名、重量、功率与模型颜色；
//! - 把实例级覆盖（颜色、重量、功率）写入配置文件的副本。
//!
//! 原始配置文件永远不会被修改：补丁在独立的临时目录中解包、改写，
//! 再打包到调用方给出的输出目录。

use crate::archive::{extract_archive, find_file_ci, pack_directory, read_entry_to_string};
use crate::error::FileError;
use crate::xml::XmlElement;
use stagecad_core::color::Rgb;
use stagecad_core::entity::Fixture;
use stagecad_core::input_parser::InputParser;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// 配置文件内的描述条目
pub const DESCRIPTION_ENTRY: &str = "description.xml";

/// 数值比较容差
const VALUE_TOLERANCE: f64 = 1e-6;

/// 实例级覆盖
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileOverrides {
    pub color: Option<Rgb>,
    pub weight_kg: Option<f64>,
    pub power_w: Option<f64>,
}

impl ProfileOverrides {
    /// 从灯具读取覆盖值；无效颜色记录警告后忽略
    pub fn from_fixture(fixture: &Fixture) -> Self {
        let color = fixture.color.as_deref().and_then(|hex| match Rgb::from_hex(hex) {
            Ok(rgb) => Some(rgb),
            Err(e) => {
                tracing::warn!("Fixture '{}' has an invalid color override: {}", fixture.name, e);
                None
            }
        });
        Self {
            color,
            weight_kg: fixture.weight_kg,
            power_w: fixture.power_w,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.color.is_none() && self.weight_kg.is_none() && self.power_w.is_none()
    }

    /// 用作补丁缓存键
    fn cache_key(&self) -> String {
        format!(
            "{}|{}|{}",
            self.color.map(|c| c.to_hex()).unwrap_or_default(),
            self.weight_kg.map(|w| w.to_string()).unwrap_or_default(),
            self.power_w.map(|p| p.to_string()).unwrap_or_default()
        )
    }
}

/// 配置文件摘要
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileSummary {
    pub type_name: String,
    pub manufacturer: String,
    pub weight_kg: Option<f64>,
    pub power_w: Option<f64>,
    /// 每个 Model 元素的 `Color` 属性（缺失为空串）
    pub model_colors: Vec<String>,
}

impl ProfileSummary {
    pub fn read(profile: &Path) -> Result<Self, FileError> {
        let description = read_description(profile)?;
        Ok(Self::from_description(&description))
    }

    pub fn from_description(description: &XmlElement) -> Self {
        let fixture_type = fixture_type(description);
        let properties = fixture_type
            .child("PhysicalDescriptions")
            .and_then(|p| p.child("Properties"));
        let property = |name: &str| {
            properties
                .and_then(|p| p.child(name))
                .and_then(|e| e.attr("Value"))
                .and_then(|v| InputParser::parse_number(v).ok())
        };

        Self {
            type_name: fixture_type.attr("Name").unwrap_or_default().to_string(),
            manufacturer: fixture_type.attr("Manufacturer").unwrap_or_default().to_string(),
            weight_kg: property("Weight"),
            power_w: property("PowerConsumption"),
            model_colors: fixture_type
                .child("Models")
                .map(|models| {
                    models
                        .children_named("Model")
                        .map(|m| m.attr("Color").unwrap_or_default().to_string())
                        .collect()
                })
                .unwrap_or_default(),
        }
    }

    /// 覆盖值是否与共享配置文件不同（需要打补丁）
    pub fn differs_from(&self, overrides: &ProfileOverrides) -> bool {
        let value_differs = |wanted: Option<f64>, current: Option<f64>| match (wanted, current) {
            (Some(w), Some(c)) => (w - c).abs() > VALUE_TOLERANCE,
            (Some(_), None) => true,
            (None, _) => false,
        };

        let color_differs = overrides.color.is_some_and(|rgb| {
            let wanted = rgb.to_cie().to_string();
            self.model_colors.iter().any(|current| *current != wanted)
        });

        color_differs
            || value_differs(overrides.weight_kg, self.weight_kg)
            || value_differs(overrides.power_w, self.power_w)
    }
}

/// 读取配置文件中的 `description.xml`
pub fn read_description(profile: &Path) -> Result<XmlElement, FileError> {
    let text = read_entry_to_string(profile, DESCRIPTION_ENTRY)?.ok_or_else(|| {
        FileError::InvalidFormat(format!("{} has no {}", profile.display(), DESCRIPTION_ENTRY))
    })?;
    XmlElement::parse(&text)
}

fn fixture_type(description: &XmlElement) -> &XmlElement {
    description.child("FixtureType").unwrap_or(description)
}

fn fixture_type_mut(description: &mut XmlElement) -> &mut XmlElement {
    if description.child("FixtureType").is_some() {
        description.ensure_child("FixtureType")
    } else {
        description
    }
}

/// 把覆盖值写入描述树
pub fn apply_overrides(description: &mut XmlElement, overrides: &ProfileOverrides) {
    let fixture_type = fixture_type_mut(description);

    if let Some(rgb) = overrides.color {
        let cie = rgb.to_cie().to_string();
        if let Some(models) = fixture_type.child_mut("Models") {
            for model in models.children.iter_mut().filter(|m| m.name == "Model") {
                model.set_attr("Color", cie.as_str());
            }
        }
    }

    if overrides.weight_kg.is_none() && overrides.power_w.is_none() {
        return;
    }

    let properties = fixture_type
        .ensure_child("PhysicalDescriptions")
        .ensure_child("Properties");
    if let Some(weight) = overrides.weight_kg {
        properties.ensure_child("Weight").set_attr("Value", weight.to_string());
    }
    if let Some(power) = overrides.power_w {
        properties
            .ensure_child("PowerConsumption")
            .set_attr("Value", power.to_string());
    }
}

/// 配置文件补丁器
///
/// 输出目录由调用方管理（导出时为导出暂存目录）；
/// 相同源文件 + 相同覆盖值只打一次补丁。
pub struct ProfilePatcher {
    output_dir: PathBuf,
    compression_level: i64,
    cache: HashMap<(PathBuf, String), PathBuf>,
}

impl ProfilePatcher {
    pub fn new(output_dir: impl Into<PathBuf>, compression_level: i64) -> Self {
        Self {
            output_dir: output_dir.into(),
            compression_level,
            cache: HashMap::new(),
        }
    }

    /// 生成带覆盖值的配置文件副本，返回其路径
    ///
    /// 失败时调用方应退回未修改的原始配置文件。
    pub fn patch(&mut self, profile: &Path, overrides: &ProfileOverrides) -> Result<PathBuf, FileError> {
        let key = (profile.to_path_buf(), overrides.cache_key());
        if let Some(existing) = self.cache.get(&key) {
            return Ok(existing.clone());
        }

        let work_dir = tempfile::Builder::new().prefix("stagecad-gdtf-").tempdir()?;
        extract_archive(profile, work_dir.path())?;

        let description_path = find_file_ci(work_dir.path(), DESCRIPTION_ENTRY)?
            .ok_or_else(|| FileError::Patch(format!("{} has no {}", profile.display(), DESCRIPTION_ENTRY)))?;
        let mut description = XmlElement::parse(&std::fs::read_to_string(&description_path)?)?;
        apply_overrides(&mut description, overrides);
        std::fs::write(&description_path, description.to_xml_string()?)?;

        // 每个补丁放在独立子目录，保持原文件名
        let file_name = profile
            .file_name()
            .ok_or_else(|| FileError::Patch(format!("{} has no file name", profile.display())))?;
        let target_dir = self.output_dir.join(format!("patch-{}", self.cache.len() + 1));
        std::fs::create_dir_all(&target_dir)?;
        let output = target_dir.join(file_name);
        pack_directory(work_dir.path(), &output, self.compression_level)?;

        tracing::debug!("Patched profile {} -> {}", profile.display(), output.display());
        self.cache.insert(key, output.clone());
        Ok(output)
    }

    /// 已生成的补丁数
    pub fn patched_count(&self) -> usize {
        self.cache.len()
    }
}
