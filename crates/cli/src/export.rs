//! Writes the three output artifacts of a deck.

use deck_core::{slug, Deck, Error, MarkdownFormatter, RequestDir, Result};
use deck_pptx::{PptxReader, PptxWriter};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Paths of the files written for one deck.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifacts {
    pub pptx: PathBuf,
    pub markdown: PathBuf,
    pub json: PathBuf,
}

/// Serializes a finished deck as PPTX, Markdown and JSON.
pub struct Exporter {
    pptx: PptxWriter,
    markdown: MarkdownFormatter,
}

impl Exporter {
    pub fn new() -> Self {
        Self {
            pptx: PptxWriter::new(),
            markdown: MarkdownFormatter::new(),
        }
    }

    /// Write `<slug>-<short-id>.{pptx,md,json}` into the request directory.
    pub fn export(&self, deck: &Deck, dir: &RequestDir) -> Result<Artifacts> {
        let stem = format!("{}-{}", slug(&deck.title), dir.short_id());
        let artifacts = Artifacts {
            pptx: dir.file_path(&format!("{}.pptx", stem))?,
            markdown: dir.file_path(&format!("{}.md", stem))?,
            json: dir.file_path(&format!("{}.json", stem))?,
        };

        self.pptx.write_file(deck, &artifacts.pptx)?;
        verify_pptx(&artifacts.pptx, deck.slides.len())?;
        write_text(&artifacts.markdown, &self.markdown.format(deck))?;
        let json = serde_json::to_string_pretty(deck)
            .map_err(|e| Error::ExportFailed(format!("Failed to serialize deck: {}", e)))?;
        write_text(&artifacts.json, &json)?;

        log::info!("Exported deck to {}", dir.path().display());
        Ok(artifacts)
    }
}

impl Default for Exporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Reopen a written package and check that every slide made it in.
fn verify_pptx(path: &Path, expected: usize) -> Result<()> {
    let file = File::open(path)
        .map_err(|e| Error::ExportFailed(format!("Failed to reopen {}: {}", path.display(), e)))?;
    let slides = PptxReader::new().read(BufReader::new(file))?;
    if slides.len() != expected {
        return Err(Error::ExportFailed(format!(
            "{} holds {} slides, expected {}",
            path.display(),
            slides.len(),
            expected
        )));
    }
    Ok(())
}

fn write_text(path: &Path, content: &str) -> Result<()> {
    std::fs::write(path, content)
        .map_err(|e| Error::ExportFailed(format!("Failed to write {}: {}", path.display(), e)))
}
