//! Thin event writer over `quick_xml` for building OOXML parts.

use deck_core::{Error, Result};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::Cursor;

pub const NS_P: &str = "http://schemas.openxmlformats.org/presentationml/2006/main";
pub const NS_A: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";
pub const NS_R: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
pub const NS_RELS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";

/// Relationship type URI for a part kind (`slide`, `theme`, `image`, ...).
pub fn rel_type(kind: &str) -> String {
    format!(
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/{}",
        kind
    )
}

fn xml_err(e: quick_xml::Error) -> Error {
    Error::ExportFailed(format!("Failed to write XML: {}", e))
}

/// Builder for one XML part.
pub struct XmlPart {
    writer: Writer<Cursor<Vec<u8>>>,
}

impl XmlPart {
    /// Start a standalone UTF-8 document.
    pub fn new() -> Result<Self> {
        let mut writer = Writer::new(Cursor::new(Vec::new()));
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))
            .map_err(xml_err)?;
        Ok(Self { writer })
    }

    pub fn start(&mut self, name: &str, attrs: &[(&str, &str)]) -> Result<&mut Self> {
        let elem = BytesStart::new(name).with_attributes(attrs.iter().copied());
        self.writer.write_event(Event::Start(elem)).map_err(xml_err)?;
        Ok(self)
    }

    pub fn end(&mut self, name: &str) -> Result<&mut Self> {
        self.writer
            .write_event(Event::End(BytesEnd::new(name)))
            .map_err(xml_err)?;
        Ok(self)
    }

    pub fn empty(&mut self, name: &str, attrs: &[(&str, &str)]) -> Result<&mut Self> {
        let elem = BytesStart::new(name).with_attributes(attrs.iter().copied());
        self.writer.write_event(Event::Empty(elem)).map_err(xml_err)?;
        Ok(self)
    }

    /// Escaped text content.
    pub fn text(&mut self, text: &str) -> Result<&mut Self> {
        self.writer
            .write_event(Event::Text(BytesText::new(text)))
            .map_err(xml_err)?;
        Ok(self)
    }

    /// `<name attrs>text</name>`.
    pub fn text_element(
        &mut self,
        name: &str,
        attrs: &[(&str, &str)],
        text: &str,
    ) -> Result<&mut Self> {
        self.start(name, attrs)?;
        self.text(text)?;
        self.end(name)
    }

    pub fn finish(self) -> Vec<u8> {
        self.writer.into_inner().into_inner()
    }
}

/// A `_rels/*.rels` part.
#[derive(Debug, Default)]
pub struct Relationships {
    entries: Vec<(String, String, String)>,
}

impl Relationships {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a relationship and return its id (`rId1`, `rId2`, ...).
    pub fn add(&mut self, rel_type: impl Into<String>, target: impl Into<String>) -> String {
        let id = format!("rId{}", self.entries.len() + 1);
        self.entries.push((id.clone(), rel_type.into(), target.into()));
        id
    }

    pub fn to_xml(&self) -> Result<Vec<u8>> {
        let mut xml = XmlPart::new()?;
        xml.start("Relationships", &[("xmlns", NS_RELS)])?;
        for (id, rel_type, target) in &self.entries {
            xml.empty(
                "Relationship",
                &[
                    ("Id", id.as_str()),
                    ("Type", rel_type.as_str()),
                    ("Target", target.as_str()),
                ],
            )?;
        }
        xml.end("Relationships")?;
        Ok(xml.finish())
    }
}
