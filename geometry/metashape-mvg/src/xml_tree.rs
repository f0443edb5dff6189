use std::io::Read;

use xml::reader::{EventReader, XmlEvent};

use crate::{MetashapeMvgError, Result};

/// An element of a parsed XML document.
///
/// Children and attributes keep document order. Only the local part of
/// element and attribute names is kept.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct XmlNode {
    tag: String,
    attributes: Vec<(String, String)>,
    text: Option<String>,
    children: Vec<XmlNode>,
}

impl XmlNode {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Default::default()
        }
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((name.into(), value.into()));
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_child(mut self, child: XmlNode) -> Self {
        self.children.push(child);
        self
    }

    /// Parse a whole document and return its root element.
    pub fn from_reader<Rd: Read>(reader: Rd) -> Result<Self> {
        let mut stack: Vec<XmlNode> = Vec::new();
        let mut root = None;
        for event in EventReader::new(reader) {
            match event? {
                XmlEvent::StartElement {
                    name, attributes, ..
                } => {
                    let attributes = attributes
                        .into_iter()
                        .map(|attr| (attr.name.local_name, attr.value))
                        .collect();
                    stack.push(XmlNode {
                        tag: name.local_name,
                        attributes,
                        text: None,
                        children: Vec::new(),
                    });
                }
                XmlEvent::Characters(s) | XmlEvent::CData(s) => {
                    if let Some(node) = stack.last_mut() {
                        node.text.get_or_insert_with(String::new).push_str(&s);
                    }
                }
                XmlEvent::EndElement { .. } => {
                    let node = stack
                        .pop()
                        .ok_or_else(|| MetashapeMvgError::schema("unbalanced end element"))?;
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(node),
                        None => root = Some(node),
                    }
                }
                _ => {}
            }
        }
        root.ok_or_else(|| MetashapeMvgError::schema("document has no root element"))
    }

    pub fn from_xml_str(buf: &str) -> Result<Self> {
        Self::from_reader(buf.as_bytes())
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn children(&self) -> &[XmlNode] {
        &self.children
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// The first child with the given tag.
    pub fn find(&self, tag: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.tag == tag)
    }

    /// Like [`Self::find`] but a missing child is a schema error.
    pub fn child(&self, tag: &str) -> Result<&XmlNode> {
        self.find(tag).ok_or_else(|| {
            MetashapeMvgError::schema(format!("missing <{tag}> in <{}>", self.tag))
        })
    }

    pub fn required_attr(&self, name: &str) -> Result<&str> {
        self.attr(name).ok_or_else(|| {
            MetashapeMvgError::schema(format!("missing attribute {name} on <{}>", self.tag))
        })
    }

    pub fn required_text(&self) -> Result<&str> {
        self.text()
            .ok_or_else(|| MetashapeMvgError::schema(format!("<{}> has no text", self.tag)))
    }

    /// Parse an attribute as an integer of type `T`.
    pub(crate) fn parse_attr<T>(&self, name: &str) -> Result<T>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        let raw = self.required_attr(name)?;
        raw.trim().parse::<T>().map_err(|e| {
            MetashapeMvgError::malformed(format!("<{}> attribute {name}", self.tag), e.to_string())
        })
    }

    /// Parse the text of a leaf element as a real number.
    pub(crate) fn parse_real(&self) -> Result<f64> {
        let raw = self.required_text()?;
        raw.trim()
            .parse::<f64>()
            .map_err(|e| {
                MetashapeMvgError::malformed(format!("<{}>", self.tag), format!("{raw:?}: {e}"))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tree() {
        let buf = r#"<?xml version="1.0" encoding="UTF-8"?>
<document version="1.5.0">
  <chunk label="a">
    <sensors>
      <sensor id="3"/>
    </sensors>
    <scale> 2.5 </scale>
    <scale>7</scale>
  </chunk>
</document>"#;
        let root = XmlNode::from_xml_str(buf).unwrap();
        assert_eq!(root.tag(), "document");
        assert_eq!(root.attr("version"), Some("1.5.0"));
        let chunk = root.child("chunk").unwrap();
        assert_eq!(chunk.children().len(), 3);
        assert_eq!(chunk.attr("label"), Some("a"));
        let sensor = &chunk.child("sensors").unwrap().children()[0];
        assert_eq!(sensor.parse_attr::<i64>("id").unwrap(), 3);
        // `find` returns the first match.
        assert_eq!(chunk.child("scale").unwrap().parse_real().unwrap(), 2.5);
    }

    #[test]
    fn test_missing_child_names_parent() {
        let root = XmlNode::new("document").with_child(XmlNode::new("chunk"));
        let err = root.child("chunk").unwrap().child("components").unwrap_err();
        assert_eq!(err.to_string(), "schema error: missing <components> in <chunk>");
    }

    #[test]
    fn test_bad_numbers() {
        let node = XmlNode::new("f").with_text("abc").with_attr("id", "x1");
        assert!(matches!(
            node.parse_real(),
            Err(MetashapeMvgError::MalformedInput { .. })
        ));
        assert!(matches!(
            node.parse_attr::<i64>("id"),
            Err(MetashapeMvgError::MalformedInput { .. })
        ));
        assert!(matches!(
            XmlNode::new("f").parse_real(),
            Err(MetashapeMvgError::Schema { .. })
        ));
    }

    #[test]
    fn test_invalid_xml() {
        assert!(matches!(
            XmlNode::from_xml_str("<document><chunk></document>"),
            Err(MetashapeMvgError::Xml(_))
        ));
        assert!(XmlNode::from_xml_str("").is_err());
    }
}
