//! Writes a [`Deck`] as a PPTX package.

use crate::parts;
use crate::slide::{notes_part, slide_part};
use deck_core::{Deck, Error, Result, TemplateStyle};
use std::fs::File;
use std::io::{BufWriter, Seek, Write};
use std::path::Path;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

/// PPTX writer.
pub struct PptxWriter {
    style: Option<TemplateStyle>,
    with_notes: bool,
}

impl PptxWriter {
    /// Writer styled by each deck's own template, with speaker notes.
    pub fn new() -> Self {
        Self {
            style: None,
            with_notes: true,
        }
    }

    /// Override the deck template's style.
    pub fn with_style(mut self, style: TemplateStyle) -> Self {
        self.style = Some(style);
        self
    }

    pub fn with_notes(mut self, with_notes: bool) -> Self {
        self.with_notes = with_notes;
        self
    }

    /// Write the package to `path`, replacing any existing file.
    pub fn write_file(&self, deck: &Deck, path: &Path) -> Result<()> {
        let file = File::create(path).map_err(|e| {
            Error::ExportFailed(format!("Failed to create {}: {}", path.display(), e))
        })?;
        let mut out = BufWriter::new(file);
        self.write(deck, &mut out)?;
        out.flush()
            .map_err(|e| Error::ExportFailed(format!("Failed to flush {}: {}", path.display(), e)))
    }

    pub fn write<W: Write + Seek>(&self, deck: &Deck, out: W) -> Result<()> {
        let style = self.style.clone().unwrap_or_else(|| deck.template.style());
        let notes: Vec<usize> = if self.with_notes {
            deck.slides
                .iter()
                .enumerate()
                .filter(|(_, slide)| slide.notes.as_deref().is_some_and(|n| !n.trim().is_empty()))
                .map(|(idx, _)| idx + 1)
                .collect()
        } else {
            Vec::new()
        };
        let slide_count = deck.slides.len();

        let mut package = Package::new(out);
        package.add("[Content_Types].xml", &parts::content_types(slide_count, &notes)?)?;
        package.add("_rels/.rels", &parts::root_rels()?)?;
        package.add("docProps/core.xml", &parts::core_properties(deck)?)?;
        package.add("docProps/app.xml", &parts::app_properties(slide_count, notes.len())?)?;

        let (presentation, presentation_rels) = parts::presentation(slide_count, !notes.is_empty())?;
        package.add("ppt/presentation.xml", &presentation)?;
        package.add("ppt/_rels/presentation.xml.rels", &presentation_rels)?;

        let (master, master_rels) = parts::slide_master()?;
        package.add("ppt/slideMasters/slideMaster1.xml", &master)?;
        package.add("ppt/slideMasters/_rels/slideMaster1.xml.rels", &master_rels)?;
        let (layout, layout_rels) = parts::slide_layout()?;
        package.add("ppt/slideLayouts/slideLayout1.xml", &layout)?;
        package.add("ppt/slideLayouts/_rels/slideLayout1.xml.rels", &layout_rels)?;
        package.add("ppt/theme/theme1.xml", &parts::theme(&style, deck.template.as_str())?)?;

        if !notes.is_empty() {
            let (master, master_rels) = parts::notes_master()?;
            package.add("ppt/notesMasters/notesMaster1.xml", &master)?;
            package.add("ppt/notesMasters/_rels/notesMaster1.xml.rels", &master_rels)?;
            package.add("ppt/theme/theme2.xml", &parts::theme(&style, "notes")?)?;
        }

        let mut next_media = 1;
        for (idx, slide) in deck.slides.iter().enumerate() {
            let number = idx + 1;
            let has_notes = notes.contains(&number);
            let part = slide_part(slide, &style, next_media, has_notes.then_some(number))?;
            next_media += part.media.len();

            package.add(&format!("ppt/slides/slide{}.xml", number), &part.xml)?;
            package.add(&format!("ppt/slides/_rels/slide{}.xml.rels", number), &part.rels)?;
            for media in &part.media {
                package.add_stored(&format!("ppt/media/{}", media.name), &media.bytes)?;
            }

            if has_notes {
                let text = slide.notes.as_deref().unwrap_or_default();
                let (xml, rels) = notes_part(text, number)?;
                package.add(&format!("ppt/notesSlides/notesSlide{}.xml", number), &xml)?;
                package.add(
                    &format!("ppt/notesSlides/_rels/notesSlide{}.xml.rels", number),
                    &rels,
                )?;
            }
        }

        package.finish()?;
        log::debug!(
            "Wrote PPTX with {} slides, {} notes, {} images",
            slide_count,
            notes.len(),
            next_media - 1
        );
        Ok(())
    }
}

impl Default for PptxWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// ZIP container for the package parts.
struct Package<W: Write + Seek> {
    zip: ZipWriter<W>,
}

impl<W: Write + Seek> Package<W> {
    fn new(out: W) -> Self {
        Self {
            zip: ZipWriter::new(out),
        }
    }

    fn add(&mut self, name: &str, bytes: &[u8]) -> Result<()> {
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
        self.write_entry(name, bytes, options)
    }

    /// PNG data is already compressed.
    fn add_stored(&mut self, name: &str, bytes: &[u8]) -> Result<()> {
        let options = FileOptions::default().compression_method(CompressionMethod::Stored);
        self.write_entry(name, bytes, options)
    }

    fn write_entry(&mut self, name: &str, bytes: &[u8], options: FileOptions) -> Result<()> {
        self.zip
            .start_file(name, options)
            .map_err(|e| Error::ExportFailed(format!("Failed to add '{}': {}", name, e)))?;
        self.zip
            .write_all(bytes)
            .map_err(|e| Error::ExportFailed(format!("Failed to write '{}': {}", name, e)))
    }

    fn finish(mut self) -> Result<()> {
        self.zip
            .finish()
            .map_err(|e| Error::ExportFailed(format!("Failed to finish archive: {}", e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::PptxReader;
    use chrono::TimeZone;
    use chrono::Utc;
    use deck_core::{ContentBlock, Slide, SlideKind, Template};
    use std::io::{Cursor, Read};

    fn sample_deck() -> Deck {
        let created = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        let mut deck = Deck::new("Q3 Results", Template::Corporate, created);
        deck.add_slide(
            Slide::new(SlideKind::Title, "Q3 Results")
                .with_block(ContentBlock::text("For the board"))
                .with_notes("Welcome everyone."),
        );
        deck.add_slide(
            Slide::new(SlideKind::Content, "Highlights")
                .with_block(ContentBlock::bullets(["Revenue up", "Costs flat"])),
        );
        deck.add_slide(
            Slide::new(SlideKind::Quote, "Takeaway")
                .with_block(ContentBlock::Quote {
                    text: "Growth continues".into(),
                    attribution: Some("CFO".into()),
                })
                .with_notes("Close on the quote."),
        );
        deck
    }

    fn write_to_vec(writer: &PptxWriter, deck: &Deck) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        writer.write(deck, &mut buf).unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_package_round_trips_through_reader() {
        let bytes = write_to_vec(&PptxWriter::new(), &sample_deck());
        let slides = PptxReader::new().read(Cursor::new(bytes)).unwrap();

        assert_eq!(slides.len(), 3);
        assert_eq!(slides[0].shapes, vec!["Q3 Results", "For the board"]);
        assert_eq!(slides[1].shapes, vec!["Highlights", "Revenue up\nCosts flat"]);
        assert!(slides[2].shapes.iter().any(|s| s.contains("Growth continues")));
        assert_eq!(slides[0].notes.as_deref(), Some("Welcome everyone."));
        assert_eq!(slides[1].notes, None);
        assert_eq!(slides[2].notes.as_deref(), Some("Close on the quote."));
    }

    #[test]
    fn test_required_parts_present() {
        let bytes = write_to_vec(&PptxWriter::new(), &sample_deck());
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        for name in [
            "[Content_Types].xml",
            "_rels/.rels",
            "ppt/presentation.xml",
            "ppt/slideMasters/slideMaster1.xml",
            "ppt/slideLayouts/slideLayout1.xml",
            "ppt/theme/theme1.xml",
            "ppt/notesMasters/notesMaster1.xml",
            "ppt/slides/slide3.xml",
            "ppt/notesSlides/notesSlide3.xml",
            "docProps/core.xml",
        ] {
            assert!(archive.by_name(name).is_ok(), "missing {}", name);
        }
        assert!(archive.by_name("ppt/notesSlides/notesSlide2.xml").is_err());

        let mut content_types = String::new();
        archive
            .by_name("[Content_Types].xml")
            .unwrap()
            .read_to_string(&mut content_types)
            .unwrap();
        assert!(content_types.contains("/ppt/notesSlides/notesSlide1.xml"));
    }

    #[test]
    fn test_without_notes() {
        let bytes = write_to_vec(&PptxWriter::new().with_notes(false), &sample_deck());
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes.clone())).unwrap();
        assert!(archive.by_name("ppt/notesMasters/notesMaster1.xml").is_err());
        let slides = PptxReader::new().read(Cursor::new(bytes)).unwrap();
        assert!(slides.iter().all(|s| s.notes.is_none()));
    }

    #[test]
    fn test_write_file_embeds_images() {
        let dir = tempfile::tempdir().unwrap();
        let image_path = dir.path().join("diagram.png");
        std::fs::write(&image_path, b"\x89PNG data").unwrap();

        let mut deck = sample_deck();
        let spec = deck_core::DiagramSpec::flowchart_for("onboarding");
        let alt = spec.alt_text.clone();
        deck.add_slide(Slide::new(SlideKind::Diagram, "Onboarding").with_block(
            ContentBlock::DiagramRef {
                spec,
                asset: Some(deck_core::RenderedAsset {
                    path: image_path,
                    kind: deck_core::AssetKind::Diagram,
                    width: 800,
                    height: 600,
                    fallback: false,
                    error: None,
                }),
            },
        ));

        let out = dir.path().join("deck.pptx");
        PptxWriter::new().write_file(&deck, &out).unwrap();

        let file = File::open(&out).unwrap();
        let mut archive = zip::ZipArchive::new(file).unwrap();
        let mut media = Vec::new();
        archive
            .by_name("ppt/media/image1.png")
            .unwrap()
            .read_to_end(&mut media)
            .unwrap();
        assert_eq!(media, b"\x89PNG data");

        let slides = PptxReader::new().read(File::open(&out).unwrap()).unwrap();
        assert_eq!(slides[3].picture_descriptions, vec![alt]);
    }
}
