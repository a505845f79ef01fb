//! 导出前的合规检查
//!
//! 对已构建的场景描述树与即将写入的条目清单做纯检查，不修改任何数据。
//! 检查项：
//! - 根元素版本号为支持的组合，提供方信息非空；
//! - 灯具、桁架、支撑、屏幕、投影（多重配接子灯具除外）带有纯数字的
//!   文本编号，与数字编号相等，且数字编号为全局唯一的正整数；
//! - 配置文件引用不含盘符、反斜杠或前导斜杠，并且确实写入了压缩包；
//! - 条目名非空。

use crate::xml::XmlElement;
use stagecad_core::input_parser::InputParser;
use std::collections::HashSet;
use std::fmt;

/// 支持的格式版本
pub const SUPPORTED_VERSION: (u32, u32) = (1, 6);

/// 需要编号检查的元素
const NUMBERED_TAGS: [&str; 5] = ["Fixture", "Truss", "Support", "VideoScreen", "Projector"];

/// 检查结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub issues: Vec<String>,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.issues.is_empty()
    }

    fn push(&mut self, issue: String) {
        self.issues.push(issue);
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} issue(s): {}", self.issues.len(), self.issues.join("; "))
    }
}

/// 检查场景描述树与条目清单
pub fn validate_document(root: &XmlElement, entries: &[String]) -> Result<(), ValidationReport> {
    let mut report = ValidationReport::default();

    validate_header(root, &mut report);
    validate_identifiers(root, &mut report);
    validate_profile_references(root, entries, &mut report);
    validate_entry_names(entries, &mut report);

    if report.is_ok() {
        Ok(())
    } else {
        Err(report)
    }
}

fn validate_header(root: &XmlElement, report: &mut ValidationReport) {
    let (major, minor) = SUPPORTED_VERSION;
    if root.attr("verMajor") != Some(major.to_string().as_str())
        || root.attr("verMinor") != Some(minor.to_string().as_str())
    {
        report.push(format!(
            "Unsupported version {}.{} (expected {}.{})",
            root.attr("verMajor").unwrap_or("?"),
            root.attr("verMinor").unwrap_or("?"),
            major,
            minor
        ));
    }

    for key in ["provider", "providerVersion"] {
        if root.attr(key).map(str::trim).unwrap_or_default().is_empty() {
            report.push(format!("Root attribute '{}' is empty", key));
        }
    }
}

fn validate_identifiers(root: &XmlElement, report: &mut ValidationReport) {
    let mut seen = HashSet::new();

    for node in root.descendants() {
        if !NUMBERED_TAGS.contains(&node.name.as_str()) {
            continue;
        }
        if node.attr("multipatch").is_some_and(|m| !m.trim().is_empty()) {
            continue;
        }

        let label = format!("{} '{}'", node.name, node.attr("uuid").unwrap_or_default());
        let text_id = node.child_text("FixtureID").unwrap_or_default();
        let numeric_text = node.child_text("FixtureIDNumeric").unwrap_or_default();

        let text_value = match InputParser::parse_numeric_id(text_id) {
            Ok(value) => value,
            Err(e) => {
                report.push(format!("{} has an invalid FixtureID: {}", label, e));
                continue;
            }
        };
        let numeric = match InputParser::parse_numeric_id(numeric_text) {
            Ok(value) => value,
            Err(e) => {
                report.push(format!("{} has an invalid FixtureIDNumeric: {}", label, e));
                continue;
            }
        };

        if text_value != numeric {
            report.push(format!(
                "{} FixtureID {} does not match FixtureIDNumeric {}",
                label, text_value, numeric
            ));
        }
        if !seen.insert(numeric) {
            report.push(format!("{} reuses numeric identifier {}", label, numeric));
        }
    }
}

/// 压缩包内引用必须是 `/` 分隔的相对路径
pub fn is_portable_reference(reference: &str) -> bool {
    let bytes = reference.as_bytes();
    let has_drive = bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':';
    !reference.is_empty() && !has_drive && !reference.contains('\\') && !reference.starts_with('/')
}

fn validate_profile_references(root: &XmlElement, entries: &[String], report: &mut ValidationReport) {
    let written: HashSet<&str> = entries.iter().map(String::as_str).collect();

    for node in root.descendants() {
        if node.name != "GDTFSpec" {
            continue;
        }
        let reference = node.text.trim();
        if reference.is_empty() {
            continue;
        }
        if !is_portable_reference(reference) {
            report.push(format!("Profile reference '{}' is not a relative archive path", reference));
        } else if !written.contains(reference) {
            report.push(format!("Profile reference '{}' is not in the archive", reference));
        }
    }
}

fn validate_entry_names(entries: &[String], report: &mut ValidationReport) {
    if entries.iter().any(|name| name.trim().is_empty()) {
        report.push("Archive contains an entry with an empty name".to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture(uuid: &str, text_id: &str, numeric: &str, spec: &str) -> XmlElement {
        XmlElement::new("Fixture")
            .with_attr("uuid", uuid)
            .with_child(XmlElement::new("GDTFSpec").with_text(spec))
            .with_child(XmlElement::new("FixtureID").with_text(text_id))
            .with_child(XmlElement::new("FixtureIDNumeric").with_text(numeric))
    }

    fn document(children: Vec<XmlElement>) -> XmlElement {
        let mut child_list = XmlElement::new("ChildList");
        child_list.children = children;
        XmlElement::new("GeneralSceneDescription")
            .with_attr("verMajor", "1")
            .with_attr("verMinor", "6")
            .with_attr("provider", "stagecad")
            .with_attr("providerVersion", "0.1.0")
            .with_child(
                XmlElement::new("Scene").with_child(XmlElement::new("Layers").with_child(child_list)),
            )
    }

    fn entries(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_valid_document() {
        let root = document(vec![
            fixture("A", "1", "1", "gdtf/Spot.gdtf"),
            fixture("B", "2", "2", "gdtf/Spot.gdtf"),
        ]);
        let names = entries(&["GeneralSceneDescription.xml", "gdtf/Spot.gdtf"]);
        assert!(validate_document(&root, &names).is_ok());
    }

    #[test]
    fn test_header_checks() {
        let mut root = document(vec![]);
        root.set_attr("verMinor", "5");
        root.set_attr("provider", " ");
        let report = validate_document(&root, &[]).unwrap_err();
        assert_eq!(report.issues.len(), 2);
    }

    #[test]
    fn test_identifier_checks() {
        let root = document(vec![
            fixture("A", "Spot", "1", ""),
            fixture("B", "2", "3", ""),
            fixture("C", "4", "4", ""),
            fixture("D", "4", "4", ""),
            fixture("E", "0", "0", ""),
        ]);
        let report = validate_document(&root, &[]).unwrap_err();
        assert_eq!(report.issues.len(), 4, "{}", report);
    }

    #[test]
    fn test_multipatch_is_exempt() {
        let child = XmlElement::new("Fixture").with_attr("multipatch", "PARENT");
        let root = document(vec![child]);
        assert!(validate_document(&root, &[]).is_ok());
    }

    #[test]
    fn test_profile_reference_checks() {
        let names = entries(&["gdtf/Spot.gdtf"]);
        for bad in ["gdtf\\Spot.gdtf", "C:/gdtf/Spot.gdtf", "/gdtf/Spot.gdtf", "gdtf/Missing.gdtf"] {
            let root = document(vec![fixture("A", "1", "1", bad)]);
            assert!(validate_document(&root, &names).is_err(), "{} should fail", bad);
        }
    }

    #[test]
    fn test_empty_entry_name() {
        let root = document(vec![]);
        assert!(validate_document(&root, &entries(&["", "x"])).is_err());
    }
}
