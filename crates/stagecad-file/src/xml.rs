//! 轻量 XML 元素树
//!
//! 场景描述与灯具配置文件都需要"读入 -> 修改 -> 写回"，
//! 这里用 quick-xml 的事件流构建一棵简单的元素树。
//! 不保留注释、处理指令与混合内容中的文本顺序。

use crate::error::FileError;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::io::Write;

/// XML 元素
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmlElement {
    pub name: String,
    /// 保持声明顺序
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlElement>,
    pub text: String,
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_attr(mut self, key: &str, value: impl Into<String>) -> Self {
        self.set_attr(key, value);
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn with_child(mut self, child: XmlElement) -> Self {
        self.children.push(child);
        self
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// 设置属性（已存在则覆盖）
    pub fn set_attr(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| k == key) {
            Some((_, existing)) => *existing = value,
            None => self.attributes.push((key.to_string(), value)),
        }
    }

    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut XmlElement> {
        self.children.iter_mut().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// 子元素的文本（已去除首尾空白）
    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name).map(|c| c.text.trim())
    }

    /// 获取子元素，不存在时追加一个
    pub fn ensure_child(&mut self, name: &str) -> &mut XmlElement {
        match self.children.iter().position(|c| c.name == name) {
            Some(index) => &mut self.children[index],
            None => self.push(XmlElement::new(name)),
        }
    }

    /// 追加子元素并返回其可变引用
    pub fn push(&mut self, child: XmlElement) -> &mut XmlElement {
        self.children.push(child);
        let last = self.children.len() - 1;
        &mut self.children[last]
    }

    /// 深度优先列出自身与全部后代
    pub fn descendants(&self) -> Vec<&XmlElement> {
        let mut result = Vec::new();
        let mut stack = vec![self];
        while let Some(element) = stack.pop() {
            result.push(element);
            stack.extend(element.children.iter().rev());
        }
        result
    }

    /// 解析 XML 文本，返回根元素
    pub fn parse(xml: &str) -> Result<XmlElement, FileError> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<XmlElement> = Vec::new();
        let mut root: Option<XmlElement> = None;

        loop {
            match reader.read_event()? {
                Event::Start(ref e) => stack.push(element_from_start(e)?),
                Event::Empty(ref e) => {
                    let element = element_from_start(e)?;
                    attach(&mut stack, &mut root, element);
                }
                Event::End(_) => {
                    if let Some(element) = stack.pop() {
                        attach(&mut stack, &mut root, element);
                    }
                }
                Event::Text(ref t) => {
                    if let Some(current) = stack.last_mut() {
                        current.text.push_str(&t.unescape()?);
                    }
                }
                Event::CData(c) => {
                    if let Some(current) = stack.last_mut() {
                        current.text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !stack.is_empty() {
            return Err(FileError::InvalidFormat("Unclosed XML element".to_string()));
        }
        root.ok_or_else(|| FileError::InvalidFormat("XML root element missing".to_string()))
    }

    /// 序列化为带声明的 UTF-8 文本（两空格缩进）
    pub fn to_xml_string(&self) -> Result<String, FileError> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        self.write_into(&mut writer)?;
        String::from_utf8(writer.into_inner())
            .map_err(|e| FileError::InvalidFormat(format!("Non UTF-8 XML output: {}", e)))
    }

    fn write_into<W: Write>(&self, writer: &mut Writer<W>) -> Result<(), FileError> {
        let mut start = BytesStart::new(self.name.as_str());
        for (key, value) in &self.attributes {
            start.push_attribute((key.as_str(), value.as_str()));
        }

        if self.children.is_empty() && self.text.is_empty() {
            writer.write_event(Event::Empty(start))?;
            return Ok(());
        }

        writer.write_event(Event::Start(start))?;
        if !self.text.is_empty() {
            writer.write_event(Event::Text(BytesText::new(&self.text)))?;
        }
        for child in &self.children {
            child.write_into(writer)?;
        }
        writer.write_event(Event::End(BytesEnd::new(self.name.as_str())))?;
        Ok(())
    }
}

fn element_from_start(start: &BytesStart<'_>) -> Result<XmlElement, FileError> {
    let name = std::str::from_utf8(start.name().as_ref())
        .map_err(|e| FileError::InvalidFormat(format!("Invalid element name: {}", e)))?
        .to_string();

    let mut element = XmlElement::new(name);
    for attribute in start.attributes() {
        let attribute = attribute.map_err(quick_xml::Error::from)?;
        let key = std::str::from_utf8(attribute.key.as_ref())
            .map_err(|e| FileError::InvalidFormat(format!("Invalid attribute name: {}", e)))?
            .to_string();
        let value = attribute.unescape_value()?.into_owned();
        element.attributes.push((key, value));
    }
    Ok(element)
}

fn attach(stack: &mut [XmlElement], root: &mut Option<XmlElement>, element: XmlElement) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => {
            if root.is_none() {
                *root = Some(element);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tree() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
            <Root a="1" b="x &amp; y">
                <Child>  hello  </Child>
                <Empty flag="true"/>
                <Child>second</Child>
            </Root>"#;

        let root = XmlElement::parse(xml).unwrap();
        assert_eq!(root.name, "Root");
        assert_eq!(root.attr("b"), Some("x & y"));
        assert_eq!(root.child_text("Child"), Some("hello"));
        assert_eq!(root.children_named("Child").count(), 2);
        assert_eq!(root.child("Empty").and_then(|e| e.attr("flag")), Some("true"));
    }

    #[test]
    fn test_write_then_parse() {
        let mut root = XmlElement::new("Scene").with_attr("name", "A <B>");
        root.push(XmlElement::new("Matrix").with_text("{1,0,0}{0,1,0}{0,0,1}{0,0,0}"));
        root.ensure_child("Layers").push(XmlElement::new("Layer").with_attr("name", "L"));
        root.ensure_child("Layers").push(XmlElement::new("Layer").with_attr("name", "M"));

        let text = root.to_xml_string().unwrap();
        assert!(text.starts_with("<?xml"));

        let parsed = XmlElement::parse(&text).unwrap();
        assert_eq!(parsed, root);
        assert_eq!(parsed.child("Layers").map(|l| l.children.len()), Some(2));
    }

    #[test]
    fn test_missing_root() {
        assert!(matches!(
            XmlElement::parse("<?xml version=\"1.0\"?>"),
            Err(FileError::InvalidFormat(_))
        ));
        assert!(XmlElement::parse("<Open><Inner></Open>").is_err());
    }

    #[test]
    fn test_descendants_order() {
        let root = XmlElement::new("A")
            .with_child(XmlElement::new("B").with_child(XmlElement::new("C")))
            .with_child(XmlElement::new("D"));
        let names: Vec<&str> = root.descendants().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B", "C", "D"]);
    }
}
