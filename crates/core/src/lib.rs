//! Core deck model, input sanitizing, intent extraction and deterministic
//! deck building for chat-driven slide generation.

pub mod builder;
pub mod config;
pub mod error;
pub mod intent;
pub mod llm;
pub mod markdown;
pub mod sanitize;
pub mod template;
pub mod types;
pub mod visual;
pub mod workdir;

pub use builder::{DocumentBuilder, Tone};
pub use config::{PipelineConfig, RenderSettings};
pub use error::{Error, LlmError, RenderError, Result};
pub use intent::IntentExtractor;
pub use llm::{ChatRequest, LlmCompleter, LlmOutput, LlmProvider, StaticCompleter};
pub use markdown::MarkdownFormatter;
pub use sanitize::Sanitizer;
pub use template::{Rgb, TemplateStyle};
pub use types::{
    AssetKind, ContentBlock, Deck, Intent, RawSource, RenderedAsset, Slide, SlideKind,
    StoryStage, Template, VisualKind, VisualRequest, VisualSlot,
};
pub use visual::{ChartKind, ChartSpec, DataPoint, DiagramGraph, DiagramKind, DiagramSpec};
pub use workdir::{slug, CancelToken, RequestDir, WorkDir};
