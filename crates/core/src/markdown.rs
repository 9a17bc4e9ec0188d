//! Markdown output.
//!
//! One `##` section per slide, separated by horizontal rules, with speaker
//! notes as blockquotes and rendered assets linked by file name.

use crate::types::{ContentBlock, Deck, RenderedAsset, Slide};

/// Formatter for the Markdown rendering of a deck.
#[derive(Debug, Clone)]
pub struct MarkdownFormatter {
    /// Emit speaker notes.
    include_notes: bool,
}

impl Default for MarkdownFormatter {
    fn default() -> Self {
        Self {
            include_notes: true,
        }
    }
}

impl MarkdownFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Leave speaker notes out of the output.
    pub fn with_notes(mut self, include: bool) -> Self {
        self.include_notes = include;
        self
    }

    /// Format a deck as Markdown, ending with a newline.
    ///
    /// # Example output
    /// ```text
    /// # AI cybersecurity
    ///
    /// *Template: corporate | Tone: Investor-facing*
    ///
    /// ---
    ///
    /// ## 1. AI cybersecurity
    /// ```
    pub fn format(&self, deck: &Deck) -> String {
        let mut sections = vec![format!(
            "# {}\n\n*Template: {} | Tone: {} | Created: {}*",
            escape_inline(&deck.title),
            deck.template.as_str(),
            deck.tone,
            deck.created_at.format("%Y-%m-%d %H:%M UTC")
        )];
        sections.extend(
            deck.slides
                .iter()
                .enumerate()
                .map(|(idx, slide)| self.format_slide(idx + 1, slide)),
        );
        format!("{}\n", sections.join("\n\n---\n\n"))
    }

    fn format_slide(&self, number: usize, slide: &Slide) -> String {
        let mut parts = vec![format!("## {}. {}", number, escape_inline(&slide.heading))];
        parts.extend(slide.body.iter().map(format_block));
        if self.include_notes {
            if let Some(notes) = &slide.notes {
                parts.push(format!("> **Notes:** {}", escape_inline(notes)));
            }
        }
        parts.join("\n\n")
    }
}

fn format_block(block: &ContentBlock) -> String {
    match block {
        ContentBlock::Text { text } => escape_inline(text),
        ContentBlock::BulletList { items } => items
            .iter()
            .map(|item| format!("- {}", escape_inline(item)))
            .collect::<Vec<_>>()
            .join("\n"),
        ContentBlock::ImageRef { asset, alt_text } => image_link(alt_text, asset),
        ContentBlock::ChartRef { spec, asset } => {
            let mut lines = match asset {
                Some(asset) => vec![image_link(&spec.alt_text, asset)],
                None => vec![format!("*{}*", escape_inline(&spec.alt_text))],
            };
            lines.push(String::new());
            lines.push(format!("| {} | {} |", spec.category_field, spec.value_field));
            lines.push("|---|---:|".to_string());
            lines.extend(
                spec.data
                    .iter()
                    .map(|p| format!("| {} | {} |", escape_inline(&p.category), p.value)),
            );
            lines.join("\n")
        }
        ContentBlock::DiagramRef { spec, asset } => {
            let mut lines = Vec::new();
            if let Some(asset) = asset {
                lines.push(image_link(&spec.alt_text, asset));
                lines.push(String::new());
            }
            lines.push("```mermaid".to_string());
            lines.push(spec.source.clone());
            lines.push("```".to_string());
            lines.join("\n")
        }
        ContentBlock::Quote { text, attribution } => {
            let mut quote = format!("> {}", escape_inline(text));
            if let Some(attribution) = attribution {
                quote.push_str(&format!("\n>\n> *{}*", escape_inline(attribution)));
            }
            quote
        }
    }
}

fn image_link(alt_text: &str, asset: &RenderedAsset) -> String {
    let file = asset
        .path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut link = format!("![{}]({})", escape_inline(alt_text).replace(['[', ']'], ""), file);
    if asset.fallback {
        link.push_str("\n\n*Visual could not be rendered; placeholder shown.*");
    }
    link
}

/// Keep user text from opening a fence or a raw HTML block.
fn escape_inline(text: &str) -> String {
    text.replace("```", "'''")
        .lines()
        .map(str::trim)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AssetKind, SlideKind, StoryStage, Template};
    use crate::visual::{ChartKind, ChartSpec, DiagramSpec};
    use chrono::{TimeZone, Utc};
    use std::path::PathBuf;

    fn deck() -> Deck {
        let mut deck = Deck::new(
            "AI cybersecurity",
            Template::Corporate,
            Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
        );
        deck.add_slide(Slide::new(SlideKind::Title, "AI cybersecurity").with_notes("Open"));
        deck.add_slide(
            Slide::new(SlideKind::Content, "Why")
                .with_stage(StoryStage::Hook)
                .with_block(ContentBlock::bullets(["One", "Two"])),
        );
        deck
    }

    #[test]
    fn test_format_header_and_slides() {
        let md = MarkdownFormatter::new().format(&deck());
        assert!(md.starts_with("# AI cybersecurity\n"));
        assert!(md.contains("Template: corporate"));
        assert!(md.contains("## 1. AI cybersecurity"));
        assert!(md.contains("## 2. Why\n\n- One\n- Two"));
        assert!(md.contains("> **Notes:** Open"));
        assert!(md.ends_with('\n'));
    }

    #[test]
    fn test_without_notes() {
        let md = MarkdownFormatter::new().with_notes(false).format(&deck());
        assert!(!md.contains("Notes:"));
    }

    #[test]
    fn test_chart_with_fallback_asset() {
        let mut deck = deck();
        deck.add_slide(Slide::new(SlideKind::Chart, "Growth").with_block(
            ContentBlock::ChartRef {
                spec: ChartSpec::illustrative(ChartKind::Bar, "Growth"),
                asset: Some(RenderedAsset {
                    path: PathBuf::from("/tmp/req/chart-1.png"),
                    kind: AssetKind::Chart,
                    width: 400,
                    height: 300,
                    fallback: true,
                    error: Some("backend down".into()),
                }),
            },
        ));
        let md = MarkdownFormatter::new().format(&deck);
        assert!(md.contains("(chart-1.png)"));
        assert!(md.contains("placeholder shown"));
        assert!(md.contains("| Market Size | 85 |"));
    }

    #[test]
    fn test_diagram_source_fenced() {
        let mut deck = deck();
        deck.add_slide(Slide::new(SlideKind::Diagram, "Login").with_block(
            ContentBlock::DiagramRef {
                spec: DiagramSpec::sequence_for("login"),
                asset: None,
            },
        ));
        let md = MarkdownFormatter::new().format(&deck);
        assert!(md.contains("```mermaid\nsequenceDiagram"));
    }

    #[test]
    fn test_user_text_cannot_open_fence() {
        let mut deck = deck();
        deck.add_slide(
            Slide::new(SlideKind::Content, "x").with_block(ContentBlock::text("```sh\nls")),
        );
        let md = MarkdownFormatter::new().format(&deck);
        assert!(!md.contains("```sh"));
    }
}
