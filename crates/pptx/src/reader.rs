//! Reads a written PPTX back into per-slide text, in slide order.

use deck_core::{Error, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::io::{Read, Seek};
use zip::ZipArchive;

/// Text content of one slide.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SlideText {
    /// 1-based position in the deck.
    pub number: usize,
    /// Shape text, top-to-bottom then left-to-right. Paragraphs within a
    /// shape are joined with newlines.
    pub shapes: Vec<String>,
    /// `descr` of every picture on the slide.
    pub picture_descriptions: Vec<String>,
    /// Speaker notes, when the slide has a notes part.
    pub notes: Option<String>,
}

/// Reader for PPTX archives.
pub struct PptxReader;

impl PptxReader {
    pub fn new() -> Self {
        Self
    }

    pub fn read<R: Read + Seek>(&self, reader: R) -> Result<Vec<SlideText>> {
        let mut archive = ZipArchive::new(reader)
            .map_err(|e| Error::ExportFailed(format!("Failed to open ZIP: {}", e)))?;

        let slide_order = self.slide_order(&mut archive)?;
        let mut slides = Vec::with_capacity(slide_order.len());
        for (idx, slide_path) in slide_order.iter().enumerate() {
            let content = read_file_from_archive(&mut archive, slide_path)?;
            let (shapes, picture_descriptions) = extract_shapes(&content)?;

            let notes_path = notes_path_for(&mut archive, slide_path)?;
            let notes = match notes_path {
                Some(path) => {
                    let content = read_file_from_archive(&mut archive, &path)?;
                    let (shapes, _) = extract_shapes(&content)?;
                    Some(shapes.into_iter().map(|s| s.text).collect::<Vec<_>>().join("\n"))
                }
                None => None,
            };

            slides.push(SlideText {
                number: idx + 1,
                shapes: shapes.into_iter().map(|s| s.text).collect(),
                picture_descriptions,
                notes,
            });
        }
        Ok(slides)
    }

    /// Slide part paths ordered by relationship id.
    fn slide_order<R: Read + Seek>(&self, archive: &mut ZipArchive<R>) -> Result<Vec<String>> {
        let rels = read_relationships(archive, "ppt/_rels/presentation.xml.rels")?;
        let mut slides: Vec<(String, Option<usize>)> = rels
            .into_iter()
            .filter(|rel| rel.rel_type.ends_with("/slide"))
            .map(|rel| {
                let order = extract_slide_number(&rel.id).or_else(|| extract_slide_number(&rel.target));
                (resolve_target("ppt", &rel.target), order)
            })
            .collect();

        slides.sort_by(|a, b| match (a.1, b.1) {
            (Some(na), Some(nb)) => na.cmp(&nb),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => a.0.cmp(&b.0),
        });

        Ok(slides.into_iter().map(|(path, _)| path).collect())
    }
}

impl Default for PptxReader {
    fn default() -> Self {
        Self::new()
    }
}

struct Relationship {
    id: String,
    rel_type: String,
    target: String,
}

#[derive(Debug, Default)]
struct ShapeInfo {
    text: String,
    x: i64,
    y: i64,
}

fn read_relationships<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    path: &str,
) -> Result<Vec<Relationship>> {
    let content = read_file_from_archive(archive, path)?;
    let mut reader = Reader::from_str(&content);
    reader.trim_text(true);

    let mut rels = Vec::new();
    loop {
        match reader.read_event() {
            Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e))
                if e.name().as_ref() == b"Relationship" =>
            {
                rels.push(Relationship {
                    id: attribute(e, b"Id").unwrap_or_default(),
                    rel_type: attribute(e, b"Type").unwrap_or_default(),
                    target: attribute(e, b"Target").unwrap_or_default(),
                });
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::ExportFailed(format!(
                    "Error parsing relationships: {}",
                    e
                )));
            }
            _ => {}
        }
    }
    Ok(rels)
}

/// The notes part of a slide, found through the slide's own relationships.
fn notes_path_for<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    slide_path: &str,
) -> Result<Option<String>> {
    let (dir, file) = slide_path.rsplit_once('/').unwrap_or(("", slide_path));
    let rels_path = format!("{}/_rels/{}.rels", dir, file);
    if archive.by_name(&rels_path).is_err() {
        return Ok(None);
    }
    let rels = read_relationships(archive, &rels_path)?;
    Ok(rels
        .into_iter()
        .find(|rel| rel.rel_type.ends_with("/notesSlide"))
        .map(|rel| resolve_target(dir, &rel.target)))
}

/// Resolve a relationship target against the directory of its source part.
fn resolve_target(base_dir: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }
    let mut parts: Vec<&str> = base_dir.split('/').filter(|p| !p.is_empty()).collect();
    for segment in target.split('/') {
        match segment {
            ".." => {
                parts.pop();
            }
            "." | "" => {}
            other => parts.push(other),
        }
    }
    parts.join("/")
}

fn attribute(e: &BytesStart, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|attr| attr.key.as_ref() == key)
        .map(|attr| String::from_utf8_lossy(&attr.value).to_string())
}

fn set_offset(shape: &mut Option<ShapeInfo>, e: &BytesStart) {
    if let Some(shape) = shape {
        if let Some(x) = attribute(e, b"x").and_then(|v| v.parse().ok()) {
            shape.x = x;
        }
        if let Some(y) = attribute(e, b"y").and_then(|v| v.parse().ok()) {
            shape.y = y;
        }
    }
}

/// Text shapes sorted by position, plus picture descriptions.
fn extract_shapes(xml_content: &str) -> Result<(Vec<ShapeInfo>, Vec<String>)> {
    let mut shapes = Vec::new();
    let mut pictures = Vec::new();
    let mut reader = Reader::from_str(xml_content);
    reader.trim_text(true);

    let mut current_shape: Option<ShapeInfo> = None;
    let mut in_picture = false;
    let mut in_text_body = false;
    let mut in_paragraph = false;
    let mut current_text = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => match local_name(e.name().as_ref()) {
                b"sp" => current_shape = Some(ShapeInfo::default()),
                b"pic" => in_picture = true,
                b"txBody" => in_text_body = true,
                b"p" if in_text_body => {
                    in_paragraph = true;
                    if !current_text.is_empty() {
                        current_text.push('\n');
                    }
                }
                _ => {}
            },
            Ok(Event::Empty(ref e)) => match local_name(e.name().as_ref()) {
                b"off" => set_offset(&mut current_shape, e),
                b"cNvPr" if in_picture => {
                    if let Some(descr) = attribute(e, b"descr") {
                        pictures.push(descr);
                    }
                }
                _ => {}
            },
            Ok(Event::Text(ref e)) => {
                if in_paragraph {
                    let text = e.unescape().unwrap_or_default();
                    current_text.push_str(&text);
                }
            }
            Ok(Event::End(ref e)) => match local_name(e.name().as_ref()) {
                b"sp" => {
                    if let Some(mut shape) = current_shape.take() {
                        shape.text = current_text.trim().to_string();
                        if !shape.text.is_empty() {
                            shapes.push(shape);
                        }
                    }
                    current_text.clear();
                    in_text_body = false;
                    in_paragraph = false;
                }
                b"pic" => in_picture = false,
                b"txBody" => in_text_body = false,
                b"p" => in_paragraph = false,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::ExportFailed(format!("Malformed slide XML: {}", e)));
            }
            _ => {}
        }
    }

    shapes.sort_by_key(|shape| (shape.y, shape.x));
    Ok((shapes, pictures))
}

fn read_file_from_archive<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    path: &str,
) -> Result<String> {
    let mut file = archive.by_name(path).map_err(|e| {
        Error::ExportFailed(format!("File not found in archive '{}': {}", path, e))
    })?;

    let mut content = String::new();
    file.read_to_string(&mut content)
        .map_err(|e| Error::ExportFailed(format!("Failed to read '{}': {}", path, e)))?;

    Ok(content)
}

/// Extract the local name from a potentially namespaced XML element name.
fn local_name(name: &[u8]) -> &[u8] {
    if let Some(pos) = name.iter().position(|&b| b == b':') {
        &name[pos + 1..]
    } else {
        name
    }
}

/// Extract a number from a string like "rId2" or "slide3.xml".
fn extract_slide_number(s: &str) -> Option<usize> {
    let s = s.trim_end_matches(".xml").trim_end_matches(".rels");

    let digits: String = s.chars().rev().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    let digits: String = digits.chars().rev().collect();
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_slide_number() {
        assert_eq!(extract_slide_number("rId1"), Some(1));
        assert_eq!(extract_slide_number("rId12"), Some(12));
        assert_eq!(extract_slide_number("slide123.xml"), Some(123));
        assert_eq!(extract_slide_number("nodigits"), None);
    }

    #[test]
    fn test_local_name() {
        assert_eq!(local_name(b"p:sp"), b"sp");
        assert_eq!(local_name(b"sp"), b"sp");
    }

    #[test]
    fn test_resolve_target() {
        assert_eq!(resolve_target("ppt", "slides/slide1.xml"), "ppt/slides/slide1.xml");
        assert_eq!(
            resolve_target("ppt/slides", "../notesSlides/notesSlide2.xml"),
            "ppt/notesSlides/notesSlide2.xml"
        );
        assert_eq!(resolve_target("ppt", "/docProps/app.xml"), "docProps/app.xml");
    }

    #[test]
    fn test_shapes_sorted_by_position() {
        let xml = r#"<p:sld xmlns:p="p" xmlns:a="a"><p:cSld><p:spTree>
            <p:sp><p:spPr><a:xfrm><a:off x="0" y="500"/></a:xfrm></p:spPr>
              <p:txBody><a:p><a:r><a:t>Lower</a:t></a:r></a:p></p:txBody></p:sp>
            <p:sp><p:spPr><a:xfrm><a:off x="0" y="100"/></a:xfrm></p:spPr>
              <p:txBody><a:p><a:r><a:t>Upper</a:t></a:r></a:p><a:p><a:r><a:t>Line 2</a:t></a:r></a:p></p:txBody></p:sp>
            <p:pic><p:nvPicPr><p:cNvPr id="4" name="Visual" descr="A chart"/></p:nvPicPr></p:pic>
            </p:spTree></p:cSld></p:sld>"#;
        let (shapes, pictures) = extract_shapes(xml).unwrap();
        let texts: Vec<&str> = shapes.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["Upper\nLine 2", "Lower"]);
        assert_eq!(pictures, vec!["A chart"]);
    }
}
