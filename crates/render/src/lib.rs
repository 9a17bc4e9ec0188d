//! Chart and diagram rendering for generated decks.
//!
//! Charts (Vega-Lite specs) and diagrams (Mermaid sources) are rasterized
//! locally to PNG. Any failure is replaced by a placeholder image so that a
//! deck always has an asset for every visual slot.

pub mod backend;
pub mod draw;
pub mod renderer;

pub use backend::{PixelBackend, RasterBackend};
pub use renderer::{placeholder_image, RenderSummary, Renderer, VisualSpec};
