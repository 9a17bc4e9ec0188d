//! Slide and notes-slide parts.

use crate::parts::{sp_tree_header, SLIDE_CX, SLIDE_CY};
use crate::xml::{rel_type, Relationships, XmlPart, NS_A, NS_P, NS_R};
use deck_core::{ContentBlock, RenderedAsset, Result, Rgb, Slide, SlideKind, TemplateStyle};

const MARGIN: i64 = 457_200;
const CONTENT_W: i64 = SLIDE_CX - 2 * MARGIN;
const TITLE_Y: i64 = MARGIN;
const TITLE_H: i64 = 1_005_840;
const BODY_Y: i64 = 1_600_200;
const BODY_H: i64 = SLIDE_CY - BODY_Y - MARGIN;
const COLUMN_GAP: i64 = 274_320;
const ACCENT_BAR_H: i64 = 91_440;

/// An image file to store under `ppt/media/`.
#[derive(Debug, Clone)]
pub struct MediaFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Serialized slide with its relationships and embedded images.
#[derive(Debug)]
pub struct SlidePart {
    pub xml: Vec<u8>,
    pub rels: Vec<u8>,
    pub media: Vec<MediaFile>,
}

/// Paragraph alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Align {
    Left,
    Center,
    Right,
}

impl Align {
    fn attr(&self) -> &'static str {
        match self {
            Self::Left => "l",
            Self::Center => "ctr",
            Self::Right => "r",
        }
    }
}

/// Character formatting for one run.
#[derive(Debug, Clone, Copy)]
struct RunStyle {
    size_pt: u32,
    color: Rgb,
    bold: bool,
    italic: bool,
}

/// Writes the shapes of one slide.
struct SlideComposer<'a> {
    style: &'a TemplateStyle,
    xml: XmlPart,
    rels: Relationships,
    media: Vec<MediaFile>,
    next_shape_id: u32,
    next_media: usize,
}

impl<'a> SlideComposer<'a> {
    fn new(style: &'a TemplateStyle, first_media: usize) -> Result<Self> {
        let mut rels = Relationships::new();
        rels.add(rel_type("slideLayout"), "../slideLayouts/slideLayout1.xml");
        Ok(Self {
            style,
            xml: XmlPart::new()?,
            rels,
            media: Vec::new(),
            next_shape_id: 2,
            next_media: first_media,
        })
    }

    fn shape_id(&mut self) -> String {
        let id = self.next_shape_id;
        self.next_shape_id += 1;
        id.to_string()
    }

    fn xfrm(&mut self, x: i64, y: i64, cx: i64, cy: i64) -> Result<()> {
        let (x, y, cx, cy) = (x.to_string(), y.to_string(), cx.to_string(), cy.to_string());
        self.xml.start("a:xfrm", &[])?;
        self.xml.empty("a:off", &[("x", x.as_str()), ("y", y.as_str())])?;
        self.xml.empty("a:ext", &[("cx", cx.as_str()), ("cy", cy.as_str())])?;
        self.xml.end("a:xfrm")?;
        Ok(())
    }

    fn solid_fill(&mut self, color: Rgb) -> Result<()> {
        let hex = color.hex();
        self.xml.start("a:solidFill", &[])?;
        self.xml.empty("a:srgbClr", &[("val", hex.as_str())])?;
        self.xml.end("a:solidFill")?;
        Ok(())
    }

    fn begin(&mut self) -> Result<()> {
        self.xml
            .start("p:sld", &[("xmlns:a", NS_A), ("xmlns:r", NS_R), ("xmlns:p", NS_P)])?;
        self.xml.start("p:cSld", &[])?;
        self.xml.start("p:bg", &[])?;
        self.xml.start("p:bgPr", &[])?;
        self.solid_fill(self.style.background)?;
        self.xml.empty("a:effectLst", &[])?;
        self.xml.end("p:bgPr")?;
        self.xml.end("p:bg")?;
        self.xml.start("p:spTree", &[])?;
        sp_tree_header(&mut self.xml)
    }

    fn accent_bar(&mut self) -> Result<()> {
        let id = self.shape_id();
        self.xml.start("p:sp", &[])?;
        self.xml.start("p:nvSpPr", &[])?;
        self.xml.empty("p:cNvPr", &[("id", id.as_str()), ("name", "Accent Bar")])?;
        self.xml.empty("p:cNvSpPr", &[])?;
        self.xml.empty("p:nvPr", &[])?;
        self.xml.end("p:nvSpPr")?;
        self.xml.start("p:spPr", &[])?;
        self.xfrm(0, 0, SLIDE_CX, ACCENT_BAR_H)?;
        self.preset_rect()?;
        self.solid_fill(self.style.accent)?;
        self.xml.start("a:ln", &[])?;
        self.xml.empty("a:noFill", &[])?;
        self.xml.end("a:ln")?;
        self.xml.end("p:spPr")?;
        self.xml.end("p:sp")?;
        Ok(())
    }

    fn preset_rect(&mut self) -> Result<()> {
        self.xml.start("a:prstGeom", &[("prst", "rect")])?;
        self.xml.empty("a:avLst", &[])?;
        self.xml.end("a:prstGeom")?;
        Ok(())
    }

    /// A text box holding `paragraphs`.
    fn text_box(
        &mut self,
        name: &str,
        (x, y, cx, cy): (i64, i64, i64, i64),
        paragraphs: &[Paragraph],
    ) -> Result<()> {
        let id = self.shape_id();
        self.xml.start("p:sp", &[])?;
        self.xml.start("p:nvSpPr", &[])?;
        self.xml.empty("p:cNvPr", &[("id", id.as_str()), ("name", name)])?;
        self.xml.empty("p:cNvSpPr", &[("txBox", "1")])?;
        self.xml.empty("p:nvPr", &[])?;
        self.xml.end("p:nvSpPr")?;
        self.xml.start("p:spPr", &[])?;
        self.xfrm(x, y, cx, cy)?;
        self.preset_rect()?;
        self.xml.empty("a:noFill", &[])?;
        self.xml.end("p:spPr")?;
        self.xml.start("p:txBody", &[])?;
        self.xml.start("a:bodyPr", &[("wrap", "square"), ("rtlCol", "0")])?;
        self.xml.empty("a:normAutofit", &[])?;
        self.xml.end("a:bodyPr")?;
        self.xml.empty("a:lstStyle", &[])?;
        for paragraph in paragraphs {
            self.paragraph(paragraph)?;
        }
        if paragraphs.is_empty() {
            self.xml.empty("a:p", &[])?;
        }
        self.xml.end("p:txBody")?;
        self.xml.end("p:sp")?;
        Ok(())
    }

    fn paragraph(&mut self, paragraph: &Paragraph) -> Result<()> {
        self.xml.start("a:p", &[])?;
        if paragraph.bullet {
            self.xml.start(
                "a:pPr",
                &[("marL", "342900"), ("indent", "-342900"), ("algn", paragraph.align.attr())],
            )?;
            self.xml.empty("a:buFont", &[("typeface", "Arial")])?;
            self.xml.empty("a:buChar", &[("char", "\u{2022}")])?;
        } else {
            self.xml.start("a:pPr", &[("algn", paragraph.align.attr())])?;
            self.xml.empty("a:buNone", &[])?;
        }
        self.xml.end("a:pPr")?;

        let size = (paragraph.run.size_pt * 100).to_string();
        let mut attrs = vec![("lang", "en-US"), ("sz", size.as_str()), ("dirty", "0")];
        if paragraph.run.bold {
            attrs.push(("b", "1"));
        }
        if paragraph.run.italic {
            attrs.push(("i", "1"));
        }
        self.xml.start("a:r", &[])?;
        self.xml.start("a:rPr", &attrs)?;
        self.solid_fill(paragraph.run.color)?;
        let font = self.style.font_family.clone();
        self.xml.empty("a:latin", &[("typeface", font.as_str())])?;
        self.xml.end("a:rPr")?;
        self.xml.text_element("a:t", &[], &paragraph.text)?;
        self.xml.end("a:r")?;
        self.xml.end("a:p")?;
        Ok(())
    }

    /// Embed a rendered image, fitted and centered in the box. Falls back to
    /// a caption with the alt text when the image file cannot be read.
    fn picture(
        &mut self,
        asset: &RenderedAsset,
        alt_text: &str,
        (x, y, cx, cy): (i64, i64, i64, i64),
    ) -> Result<()> {
        let bytes = match std::fs::read(&asset.path) {
            Ok(bytes) => bytes,
            Err(e) => {
                log::warn!(
                    "Image {} unavailable, using alt text instead: {}",
                    asset.path.display(),
                    e
                );
                let caption = vec![Paragraph::plain(alt_text, self.caption_style(), Align::Center)];
                return self.text_box("Alt Text", (x, y, cx, cy), &caption);
            }
        };

        let name = format!("image{}.png", self.next_media);
        self.next_media += 1;
        let rid = self.rels.add(rel_type("image"), format!("../media/{}", name));
        self.media.push(MediaFile { name, bytes });

        let (w, h) = fit(asset.width.max(1) as i64, asset.height.max(1) as i64, cx, cy);
        let id = self.shape_id();
        self.xml.start("p:pic", &[])?;
        self.xml.start("p:nvPicPr", &[])?;
        self.xml.empty(
            "p:cNvPr",
            &[("id", id.as_str()), ("name", "Visual"), ("descr", alt_text)],
        )?;
        self.xml.start("p:cNvPicPr", &[])?;
        self.xml.empty("a:picLocks", &[("noChangeAspect", "1")])?;
        self.xml.end("p:cNvPicPr")?;
        self.xml.empty("p:nvPr", &[])?;
        self.xml.end("p:nvPicPr")?;
        self.xml.start("p:blipFill", &[])?;
        self.xml.empty("a:blip", &[("r:embed", rid.as_str())])?;
        self.xml.start("a:stretch", &[])?;
        self.xml.empty("a:fillRect", &[])?;
        self.xml.end("a:stretch")?;
        self.xml.end("p:blipFill")?;
        self.xml.start("p:spPr", &[])?;
        self.xfrm(x + (cx - w) / 2, y + (cy - h) / 2, w, h)?;
        self.preset_rect()?;
        self.xml.end("p:spPr")?;
        self.xml.end("p:pic")?;
        Ok(())
    }

    fn title_style(&self) -> RunStyle {
        RunStyle {
            size_pt: self.style.title_size,
            color: self.style.title_color,
            bold: true,
            italic: false,
        }
    }

    fn body_style(&self) -> RunStyle {
        RunStyle {
            size_pt: self.style.body_size,
            color: self.style.body_color,
            bold: false,
            italic: false,
        }
    }

    fn caption_style(&self) -> RunStyle {
        RunStyle {
            size_pt: (self.style.body_size * 3 / 4).max(10),
            italic: true,
            ..self.body_style()
        }
    }

    /// Paragraphs for the text-bearing blocks.
    fn block_paragraphs(&self, block: &ContentBlock, out: &mut Vec<Paragraph>) {
        let body = self.body_style();
        match block {
            ContentBlock::Text { text } => out.push(Paragraph::plain(text, body, Align::Left)),
            ContentBlock::BulletList { items } => {
                out.extend(items.iter().map(|item| Paragraph::bullet(item, body)))
            }
            ContentBlock::Quote { text, attribution } => {
                let quote = RunStyle {
                    size_pt: body.size_pt + 6,
                    color: self.style.accent,
                    italic: true,
                    ..body
                };
                out.push(Paragraph::plain(
                    &format!("\u{201C}{}\u{201D}", text),
                    quote,
                    Align::Center,
                ));
                if let Some(attribution) = attribution {
                    out.push(Paragraph::plain(attribution, body, Align::Right));
                }
            }
            ContentBlock::ImageRef { alt_text, .. } => {
                out.push(Paragraph::plain(alt_text, self.caption_style(), Align::Center))
            }
            ContentBlock::ChartRef { spec, .. } => {
                out.push(Paragraph::plain(&spec.alt_text, self.caption_style(), Align::Center))
            }
            ContentBlock::DiagramRef { spec, .. } => {
                out.push(Paragraph::plain(&spec.alt_text, self.caption_style(), Align::Center))
            }
        }
    }

    fn compose(mut self, slide: &Slide) -> Result<SlidePart> {
        self.begin()?;
        self.accent_bar()?;

        match slide.kind {
            SlideKind::Title => {
                let heading = RunStyle {
                    size_pt: self.style.title_size + 12,
                    ..self.title_style()
                };
                let title = vec![Paragraph::plain(&slide.heading, heading, Align::Center)];
                self.text_box("Title", (MARGIN, 2_011_680, CONTENT_W, 1_371_600), &title)?;
                let mut subtitle = Vec::new();
                for block in &slide.body {
                    self.block_paragraphs(block, &mut subtitle);
                }
                for p in &mut subtitle {
                    p.align = Align::Center;
                }
                self.text_box("Subtitle", (MARGIN, 3_474_720, CONTENT_W, 1_828_800), &subtitle)?;
            }
            SlideKind::Comparison => {
                self.heading(&slide.heading)?;
                let columns = slide.body.len().max(1) as i64;
                let width = (CONTENT_W - COLUMN_GAP * (columns - 1)) / columns;
                for (idx, block) in slide.body.iter().enumerate() {
                    let mut paragraphs = Vec::new();
                    self.block_paragraphs(block, &mut paragraphs);
                    let x = MARGIN + idx as i64 * (width + COLUMN_GAP);
                    self.text_box(&format!("Column {}", idx + 1), (x, BODY_Y, width, BODY_H), &paragraphs)?;
                }
            }
            SlideKind::Agenda
            | SlideKind::Content
            | SlideKind::Chart
            | SlideKind::Diagram
            | SlideKind::ImageHeavy
            | SlideKind::Quote => {
                self.heading(&slide.heading)?;
                self.body(slide)?;
            }
        }

        self.xml.end("p:spTree")?;
        self.xml.end("p:cSld")?;
        self.xml.start("p:clrMapOvr", &[])?;
        self.xml.empty("a:masterClrMapping", &[])?;
        self.xml.end("p:clrMapOvr")?;
        self.xml.end("p:sld")?;

        Ok(SlidePart {
            xml: self.xml.finish(),
            rels: self.rels.to_xml()?,
            media: self.media,
        })
    }

    fn heading(&mut self, heading: &str) -> Result<()> {
        let title = vec![Paragraph::plain(heading, self.title_style(), Align::Left)];
        self.text_box("Title", (MARGIN, TITLE_Y, CONTENT_W, TITLE_H), &title)
    }

    /// Text blocks in one box; visuals as pictures below it.
    fn body(&mut self, slide: &Slide) -> Result<()> {
        let visuals: Vec<(&RenderedAsset, &str)> = slide
            .body
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ImageRef { asset, alt_text } => Some((asset, alt_text.as_str())),
                ContentBlock::ChartRef { spec, asset } => {
                    asset.as_ref().map(|a| (a, spec.alt_text.as_str()))
                }
                ContentBlock::DiagramRef { spec, asset } => {
                    asset.as_ref().map(|a| (a, spec.alt_text.as_str()))
                }
                ContentBlock::Text { .. }
                | ContentBlock::BulletList { .. }
                | ContentBlock::Quote { .. } => None,
            })
            .collect();

        let mut paragraphs = Vec::new();
        for block in &slide.body {
            let has_picture = match block {
                ContentBlock::ImageRef { .. } => true,
                ContentBlock::ChartRef { asset, .. } | ContentBlock::DiagramRef { asset, .. } => {
                    asset.is_some()
                }
                ContentBlock::Text { .. }
                | ContentBlock::BulletList { .. }
                | ContentBlock::Quote { .. } => false,
            };
            if !has_picture {
                self.block_paragraphs(block, &mut paragraphs);
            }
        }

        let text_h = match (paragraphs.is_empty(), visuals.is_empty()) {
            (true, _) => 0,
            (false, true) => BODY_H,
            (false, false) => BODY_H / 5,
        };
        if text_h > 0 {
            self.text_box("Body", (MARGIN, BODY_Y, CONTENT_W, text_h), &paragraphs)?;
        }
        if !visuals.is_empty() {
            let count = visuals.len() as i64;
            let width = (CONTENT_W - COLUMN_GAP * (count - 1)) / count;
            let top = BODY_Y + text_h;
            for (idx, (asset, alt_text)) in visuals.into_iter().enumerate() {
                let x = MARGIN + idx as i64 * (width + COLUMN_GAP);
                self.picture(asset, alt_text, (x, top, width, BODY_H - text_h))?;
            }
        }
        Ok(())
    }
}

/// One formatted paragraph.
#[derive(Debug, Clone)]
struct Paragraph {
    text: String,
    run: RunStyle,
    align: Align,
    bullet: bool,
}

impl Paragraph {
    fn plain(text: &str, run: RunStyle, align: Align) -> Self {
        Self {
            text: text.to_string(),
            run,
            align,
            bullet: false,
        }
    }

    fn bullet(text: &str, run: RunStyle) -> Self {
        Self {
            text: text.to_string(),
            run,
            align: Align::Left,
            bullet: true,
        }
    }
}

/// Largest `w x h` with the source aspect ratio that fits the box.
fn fit(src_w: i64, src_h: i64, box_w: i64, box_h: i64) -> (i64, i64) {
    if src_w * box_h > src_h * box_w {
        (box_w, box_w * src_h / src_w)
    } else {
        (box_h * src_w / src_h, box_h)
    }
}

/// Serialize one slide. Media files are numbered from `first_media`.
pub fn slide_part(
    slide: &Slide,
    style: &TemplateStyle,
    first_media: usize,
    notes_slide: Option<usize>,
) -> Result<SlidePart> {
    let mut composer = SlideComposer::new(style, first_media)?;
    if let Some(number) = notes_slide {
        composer.rels.add(
            rel_type("notesSlide"),
            format!("../notesSlides/notesSlide{}.xml", number),
        );
    }
    composer.compose(slide)
}

/// Notes slide for slide `number`, plus its relationships.
pub fn notes_part(notes: &str, number: usize) -> Result<(Vec<u8>, Vec<u8>)> {
    let mut rels = Relationships::new();
    rels.add(rel_type("notesMaster"), "../notesMasters/notesMaster1.xml");
    rels.add(rel_type("slide"), format!("../slides/slide{}.xml", number));

    let mut xml = XmlPart::new()?;
    xml.start("p:notes", &[("xmlns:a", NS_A), ("xmlns:r", NS_R), ("xmlns:p", NS_P)])?;
    xml.start("p:cSld", &[])?;
    xml.start("p:spTree", &[])?;
    sp_tree_header(&mut xml)?;
    xml.start("p:sp", &[])?;
    xml.start("p:nvSpPr", &[])?;
    xml.empty("p:cNvPr", &[("id", "2"), ("name", "Notes Placeholder 1")])?;
    xml.start("p:cNvSpPr", &[])?;
    xml.empty("a:spLocks", &[("noGrp", "1")])?;
    xml.end("p:cNvSpPr")?;
    xml.start("p:nvPr", &[])?;
    xml.empty("p:ph", &[("type", "body"), ("idx", "1")])?;
    xml.end("p:nvPr")?;
    xml.end("p:nvSpPr")?;
    xml.empty("p:spPr", &[])?;
    xml.start("p:txBody", &[])?;
    xml.empty("a:bodyPr", &[])?;
    xml.empty("a:lstStyle", &[])?;
    for line in notes.lines() {
        xml.start("a:p", &[])?;
        xml.start("a:r", &[])?;
        xml.empty("a:rPr", &[("lang", "en-US"), ("dirty", "0")])?;
        xml.text_element("a:t", &[], line)?;
        xml.end("a:r")?;
        xml.end("a:p")?;
    }
    xml.end("p:txBody")?;
    xml.end("p:sp")?;
    xml.end("p:spTree")?;
    xml.end("p:cSld")?;
    xml.start("p:clrMapOvr", &[])?;
    xml.empty("a:masterClrMapping", &[])?;
    xml.end("p:clrMapOvr")?;
    xml.end("p:notes")?;
    Ok((xml.finish(), rels.to_xml()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use deck_core::{AssetKind, Template};

    fn text(bytes: &[u8]) -> String {
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn test_fit_keeps_aspect() {
        assert_eq!(fit(800, 600, 8000, 3000), (4000, 3000));
        assert_eq!(fit(800, 600, 4000, 9000), (4000, 3000));
    }

    #[test]
    fn test_bullets_and_style() {
        let style = Template::Bold.style();
        let slide = Slide::new(SlideKind::Content, "Why it matters")
            .with_block(ContentBlock::bullets(["First", "Second & third"]));
        let part = slide_part(&slide, &style, 1, None).unwrap();
        let xml = text(&part.xml);

        assert!(xml.contains("<a:t>Why it matters</a:t>"));
        assert!(xml.contains("<a:t>Second &amp; third</a:t>"));
        assert!(xml.contains("a:buChar"));
        assert!(xml.contains("typeface=\"Arial Black\""));
        assert!(xml.contains(&format!("val=\"{}\"", style.background.hex())));
        assert!(part.media.is_empty());
    }

    #[test]
    fn test_picture_embeds_media() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chart.png");
        std::fs::write(&path, b"\x89PNG fake").unwrap();
        let spec = deck_core::ChartSpec::illustrative(deck_core::ChartKind::Bar, "Growth");
        let slide = Slide::new(SlideKind::Chart, "Growth").with_block(ContentBlock::ChartRef {
            asset: Some(RenderedAsset {
                path,
                kind: AssetKind::Chart,
                width: 800,
                height: 600,
                fallback: false,
                error: None,
            }),
            spec,
        });
        let part = slide_part(&slide, &Template::Minimal.style(), 3, Some(2)).unwrap();

        assert_eq!(part.media.len(), 1);
        assert_eq!(part.media[0].name, "image3.png");
        let xml = text(&part.xml);
        assert!(xml.contains("r:embed=\"rId3\""));
        assert!(xml.contains("descr=\"Bar chart of Growth"));
        let rels = text(&part.rels);
        assert!(rels.contains("../media/image3.png"));
        assert!(rels.contains("../notesSlides/notesSlide2.xml"));
    }

    #[test]
    fn test_missing_image_uses_alt_text() {
        let spec = deck_core::DiagramSpec::sequence_for("login");
        let alt = spec.alt_text.clone();
        let slide = Slide::new(SlideKind::Diagram, "Login").with_block(ContentBlock::DiagramRef {
            spec,
            asset: Some(RenderedAsset {
                path: "/nonexistent/diagram.png".into(),
                kind: AssetKind::Diagram,
                width: 400,
                height: 300,
                fallback: true,
                error: None,
            }),
        });
        let part = slide_part(&slide, &Template::Minimal.style(), 1, None).unwrap();
        assert!(part.media.is_empty());
        assert!(text(&part.xml).contains(&alt));
    }

    #[test]
    fn test_notes_part() {
        let (xml, rels) = notes_part("Open strong.\nThen pause.", 4).unwrap();
        let xml = text(&xml);
        assert!(xml.contains("<a:t>Open strong.</a:t>"));
        assert!(xml.contains("<a:t>Then pause.</a:t>"));
        assert!(text(&rels).contains("../slides/slide4.xml"));
    }
}
