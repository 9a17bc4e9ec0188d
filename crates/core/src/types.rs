//! Domain types for representing requested and generated decks.

use crate::llm::LlmProvider;
use crate::visual::{ChartKind, ChartSpec, DiagramKind, DiagramSpec};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

/// Visual template applied to the whole deck.
///
/// The template only affects rendering (fonts, colors), never slide structure.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Template {
    #[default]
    Minimal,
    Corporate,
    Bold,
}

impl Template {
    /// Resolve a template from a free-form name.
    ///
    /// Unknown names resolve to [`Template::Minimal`].
    pub fn from_name(name: &str) -> Self {
        let name = name.trim().to_lowercase();
        let name = name.trim_end_matches(" template");
        match name {
            "corporate" | "corporate_blue" | "business" => Self::Corporate,
            "bold" | "modern_gradient" | "startup_pitch" | "colorful" => Self::Bold,
            _ => Self::Minimal,
        }
    }

    /// Canonical lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Minimal => "minimal",
            Self::Corporate => "corporate",
            Self::Bold => "bold",
        }
    }
}

/// A chart or diagram the user asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", content = "kind", rename_all = "lowercase")]
pub enum VisualKind {
    Diagram(DiagramKind),
    Chart(ChartKind),
}

/// A requested visual plus whatever subject was named with it
/// (e.g. "login process" in "sequence diagram of login process").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VisualRequest {
    pub kind: VisualKind,
    pub subject: Option<String>,
}

impl VisualRequest {
    pub fn new(kind: VisualKind, subject: Option<String>) -> Self {
        Self { kind, subject }
    }
}

/// Where an intent came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSource {
    /// The sanitized chat message.
    pub message: String,

    /// Provider the request asked for.
    pub llm_provider: LlmProvider,

    /// When the request was received. Used as the deck's creation time so
    /// that building stays a pure function of the intent.
    pub received_at: DateTime<Utc>,
}

/// Normalized representation of what the user asked for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    /// Presentation topic. Never empty.
    pub topic: String,
    pub audience: Option<String>,
    pub context: Option<String>,
    pub key_message: Option<String>,
    pub template: Template,

    /// Ordered set so that building does not depend on the order in which
    /// requests were mentioned.
    pub visual_requests: BTreeSet<VisualRequest>,
    pub raw_source: RawSource,
}

impl Intent {
    /// Create an intent with only a topic.
    pub fn new(topic: impl Into<String>, raw_source: RawSource) -> Self {
        Self {
            topic: topic.into(),
            audience: None,
            context: None,
            key_message: None,
            template: Template::default(),
            visual_requests: BTreeSet::new(),
            raw_source,
        }
    }
}

/// Fixed four-stage narrative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoryStage {
    Hook,
    Problem,
    Solution,
    Conclusion,
}

impl StoryStage {
    /// All stages in narrative order.
    pub const ALL: [StoryStage; 4] = [Self::Hook, Self::Problem, Self::Solution, Self::Conclusion];

    /// Hook and Conclusion are always emitted.
    pub fn is_mandatory(&self) -> bool {
        matches!(self, Self::Hook | Self::Conclusion)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Hook => "Hook",
            Self::Problem => "Problem",
            Self::Solution => "Solution",
            Self::Conclusion => "Conclusion",
        }
    }
}

/// Layout family of a slide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlideKind {
    Title,
    Agenda,
    Content,
    Comparison,
    Chart,
    Diagram,
    ImageHeavy,
    Quote,
}

/// Kind of a rendered image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Chart,
    Diagram,
}

/// An image produced by the renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderedAsset {
    /// Absolute path of the PNG file.
    pub path: PathBuf,
    pub kind: AssetKind,
    pub width: u32,
    pub height: u32,

    /// True when the real render failed and this is the placeholder image.
    #[serde(default)]
    pub fallback: bool,

    /// Why the real render failed, if it did.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One piece of slide content. Blocks are owned by exactly one slide.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    BulletList {
        items: Vec<String>,
    },
    ImageRef {
        asset: RenderedAsset,
        alt_text: String,
    },
    ChartRef {
        spec: ChartSpec,
        #[serde(default)]
        asset: Option<RenderedAsset>,
    },
    DiagramRef {
        spec: DiagramSpec,
        #[serde(default)]
        asset: Option<RenderedAsset>,
    },
    Quote {
        text: String,
        attribution: Option<String>,
    },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn bullets<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::BulletList {
            items: items.into_iter().map(Into::into).collect(),
        }
    }

    /// Every piece of text carried by this block.
    pub fn texts(&self) -> Vec<&str> {
        match self {
            Self::Text { text } => vec![text.as_str()],
            Self::BulletList { items } => items.iter().map(String::as_str).collect(),
            Self::ImageRef { alt_text, .. } => vec![alt_text.as_str()],
            Self::ChartRef { spec, .. } => {
                let mut texts = vec![spec.title.as_str(), spec.alt_text.as_str()];
                texts.extend(spec.data.iter().map(|p| p.category.as_str()));
                texts
            }
            Self::DiagramRef { spec, .. } => vec![spec.source.as_str(), spec.alt_text.as_str()],
            Self::Quote { text, attribution } => {
                let mut texts = vec![text.as_str()];
                texts.extend(attribution.as_deref());
                texts
            }
        }
    }
}

/// A single generated slide.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slide {
    pub kind: SlideKind,
    pub heading: String,
    pub body: Vec<ContentBlock>,
    pub notes: Option<String>,

    /// Story-arc stage this slide belongs to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<StoryStage>,
}

impl Slide {
    /// Create a new empty slide.
    pub fn new(kind: SlideKind, heading: impl Into<String>) -> Self {
        Self {
            kind,
            heading: heading.into(),
            body: Vec::new(),
            notes: None,
            stage: None,
        }
    }

    pub fn with_stage(mut self, stage: StoryStage) -> Self {
        self.stage = Some(stage);
        self
    }

    pub fn with_block(mut self, block: ContentBlock) -> Self {
        self.body.push(block);
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// Number of chart and diagram blocks in the body.
    fn visual_counts(&self) -> (usize, usize) {
        self.body.iter().fold((0, 0), |(charts, diagrams), block| match block {
            ContentBlock::ChartRef { .. } => (charts + 1, diagrams),
            ContentBlock::DiagramRef { .. } => (charts, diagrams + 1),
            ContentBlock::Text { .. }
            | ContentBlock::BulletList { .. }
            | ContentBlock::ImageRef { .. }
            | ContentBlock::Quote { .. } => (charts, diagrams),
        })
    }

    /// Check the kind/body invariants of this slide.
    pub fn check(&self) -> std::result::Result<(), String> {
        let (charts, diagrams) = self.visual_counts();
        match self.kind {
            SlideKind::Chart if charts != 1 || diagrams != 0 => Err(format!(
                "chart slide '{}' has {} chart(s) and {} diagram(s)",
                self.heading, charts, diagrams
            )),
            SlideKind::Diagram if diagrams != 1 || charts != 0 => Err(format!(
                "diagram slide '{}' has {} diagram(s) and {} chart(s)",
                self.heading, diagrams, charts
            )),
            SlideKind::Chart
            | SlideKind::Diagram
            | SlideKind::Title
            | SlideKind::Agenda
            | SlideKind::Content
            | SlideKind::Comparison
            | SlideKind::ImageHeavy
            | SlideKind::Quote => Ok(()),
        }
    }

    /// Every piece of text on the slide, including notes.
    pub fn texts(&self) -> Vec<&str> {
        let mut texts = vec![self.heading.as_str()];
        texts.extend(self.body.iter().flat_map(ContentBlock::texts));
        texts.extend(self.notes.as_deref());
        texts
    }
}

/// Mutable handle on a chart or diagram slot inside a deck.
#[derive(Debug)]
pub enum VisualSlot<'a> {
    Chart {
        spec: &'a ChartSpec,
        asset: &'a mut Option<RenderedAsset>,
    },
    Diagram {
        spec: &'a DiagramSpec,
        asset: &'a mut Option<RenderedAsset>,
    },
}

/// The full structured presentation, independent of output format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deck {
    pub title: String,
    pub template: Template,
    pub created_at: DateTime<Utc>,

    /// Speaking tone derived from the audience.
    pub tone: String,
    pub slides: Vec<Slide>,
}

impl Deck {
    /// Create a new deck with no slides.
    pub fn new(title: impl Into<String>, template: Template, created_at: DateTime<Utc>) -> Self {
        Self {
            title: title.into(),
            template,
            created_at,
            tone: String::from("Professional"),
            slides: Vec::new(),
        }
    }

    /// Add a slide to the deck.
    pub fn add_slide(&mut self, slide: Slide) {
        self.slides.push(slide);
    }

    /// Check the structural invariants: title first, conclusion last,
    /// bounded size, one visual per chart/diagram slide.
    pub fn check(&self, max_slides: usize) -> std::result::Result<(), String> {
        match self.slides.first() {
            Some(slide) if slide.kind == SlideKind::Title => {}
            Some(slide) => return Err(format!("first slide is {:?}, not a title", slide.kind)),
            None => return Err("deck has no slides".to_string()),
        }
        match self.slides.last() {
            Some(slide) if slide.stage == Some(StoryStage::Conclusion) => {}
            _ => return Err("last slide is not the conclusion".to_string()),
        }
        if !self
            .slides
            .iter()
            .any(|slide| slide.stage == Some(StoryStage::Hook))
        {
            return Err("hook stage is missing".to_string());
        }
        if self.slides.len() > max_slides {
            return Err(format!(
                "{} slides exceeds the maximum of {}",
                self.slides.len(),
                max_slides
            ));
        }
        self.slides.iter().try_for_each(Slide::check)
    }

    /// All chart and diagram slots, in slide order.
    pub fn visual_slots_mut(&mut self) -> Vec<VisualSlot<'_>> {
        self.slides
            .iter_mut()
            .flat_map(|slide| slide.body.iter_mut())
            .filter_map(|block| match block {
                ContentBlock::ChartRef { spec, asset } => Some(VisualSlot::Chart {
                    spec: &*spec,
                    asset,
                }),
                ContentBlock::DiagramRef { spec, asset } => Some(VisualSlot::Diagram {
                    spec: &*spec,
                    asset,
                }),
                ContentBlock::Text { .. }
                | ContentBlock::BulletList { .. }
                | ContentBlock::ImageRef { .. }
                | ContentBlock::Quote { .. } => None,
            })
            .collect()
    }

    /// All rendered assets, in slide order.
    pub fn assets(&self) -> Vec<&RenderedAsset> {
        self.slides
            .iter()
            .flat_map(|slide| slide.body.iter())
            .filter_map(|block| match block {
                ContentBlock::ChartRef { asset, .. } | ContentBlock::DiagramRef { asset, .. } => {
                    asset.as_ref()
                }
                ContentBlock::ImageRef { asset, .. } => Some(asset),
                ContentBlock::Text { .. }
                | ContentBlock::BulletList { .. }
                | ContentBlock::Quote { .. } => None,
            })
            .collect()
    }

    /// Every piece of text in the deck.
    pub fn texts(&self) -> Vec<&str> {
        let mut texts = vec![self.title.as_str()];
        texts.extend(self.slides.iter().flat_map(Slide::texts));
        texts
    }

    /// Count slides of a given kind.
    pub fn count_kind(&self, kind: SlideKind) -> usize {
        self.slides.iter().filter(|s| s.kind == kind).count()
    }
}

impl From<DiagramKind> for VisualKind {
    fn from(kind: DiagramKind) -> Self {
        Self::Diagram(kind)
    }
}

impl From<ChartKind> for VisualKind {
    fn from(kind: ChartKind) -> Self {
        Self::Chart(kind)
    }
}
