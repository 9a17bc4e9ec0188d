//! Chart and diagram rendering with placeholder fallback.
//!
//! [`Renderer::try_render`] reports failures as [`RenderError`];
//! [`Renderer::render`] is the one place where a failure is turned into a
//! placeholder asset. Rendering is local: sources never leave the process.

use crate::backend::{PixelBackend, RasterBackend};
use crate::draw::{fill_rect, stroke_rect};
use deck_core::{
    AssetKind, CancelToken, ChartSpec, Deck, DiagramSpec, Error, RenderError, RenderSettings,
    RenderedAsset, TemplateStyle, VisualSlot,
};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use rayon::prelude::*;
use serde_json::Value;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

/// Placeholder image size.
pub const PLACEHOLDER_WIDTH: u32 = 400;
pub const PLACEHOLDER_HEIGHT: u32 = 300;

/// A spec to render.
#[derive(Debug, Clone, Copy)]
pub enum VisualSpec<'a> {
    Chart(&'a ChartSpec),
    Diagram(&'a DiagramSpec),
}

impl VisualSpec<'_> {
    fn asset_kind(&self) -> AssetKind {
        match self {
            Self::Chart(_) => AssetKind::Chart,
            Self::Diagram(_) => AssetKind::Diagram,
        }
    }
}

/// Outcome of rendering every visual in a deck.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderSummary {
    pub rendered: usize,
    pub fallbacks: usize,
}

/// Renders specs to PNG files.
#[derive(Clone)]
pub struct Renderer {
    backend: Arc<dyn RasterBackend>,
    settings: RenderSettings,
    style: TemplateStyle,
}

impl std::fmt::Debug for Renderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer")
            .field("backend", &self.backend.name())
            .field("settings", &self.settings)
            .finish()
    }
}

impl Renderer {
    /// Create a renderer using the built-in pixel backend.
    pub fn new(settings: RenderSettings) -> Self {
        Self {
            backend: Arc::new(PixelBackend),
            settings,
            style: TemplateStyle::for_template(Default::default()),
        }
    }

    /// Use a different rasterization backend.
    pub fn with_backend(mut self, backend: Arc<dyn RasterBackend>) -> Self {
        self.backend = backend;
        self
    }

    /// Draw with a template's colors.
    pub fn with_style(mut self, style: TemplateStyle) -> Self {
        self.style = style;
        self
    }

    /// Render a spec, substituting the placeholder on any failure.
    ///
    /// Always returns an asset. The only case without a file on disk is
    /// when the placeholder itself cannot be written; that is logged and
    /// the asset is still returned with `fallback` set.
    pub fn render(&self, spec: VisualSpec<'_>, output_dir: &Path) -> RenderedAsset {
        match self.try_render(spec, output_dir) {
            Ok(asset) => asset,
            Err(err) => {
                log::warn!(
                    "Rendering {:?} with {} backend failed, using placeholder: {}",
                    spec.asset_kind(),
                    self.backend.name(),
                    err
                );
                self.placeholder(spec.asset_kind(), output_dir, err.to_string())
            }
        }
    }

    /// Render a spec, reporting failure to the caller.
    pub fn try_render(
        &self,
        spec: VisualSpec<'_>,
        output_dir: &Path,
    ) -> Result<RenderedAsset, RenderError> {
        match spec {
            VisualSpec::Chart(chart) => {
                // Round-trip through the grammar so that only a valid
                // Vega-Lite spec is ever drawn.
                self.try_render_vega_lite(&chart.to_vega_lite(), output_dir)
            }
            VisualSpec::Diagram(diagram) => {
                let lines = diagram.line_count();
                if lines > self.settings.max_diagram_lines {
                    return Err(RenderError::TooComplex(format!(
                        "{} lines exceeds the limit of {}",
                        lines, self.settings.max_diagram_lines
                    )));
                }
                let graph = diagram.parse()?;
                let img = self.backend.rasterize_diagram(
                    diagram.kind,
                    &graph,
                    &self.style,
                    self.settings.width,
                    self.settings.height,
                )?;
                self.write_png(&img, AssetKind::Diagram, output_dir)
            }
        }
    }

    /// Render a raw Vega-Lite value, reporting failure to the caller.
    pub fn try_render_vega_lite(
        &self,
        grammar: &Value,
        output_dir: &Path,
    ) -> Result<RenderedAsset, RenderError> {
        let chart = ChartSpec::from_vega_lite(grammar, self.settings.max_chart_points)?;
        let img = self.backend.rasterize_chart(
            &chart,
            &self.style,
            self.settings.width,
            self.settings.height,
        )?;
        self.write_png(&img, AssetKind::Chart, output_dir)
    }

    /// Render every chart and diagram slot of a deck, concurrently.
    ///
    /// Each slot is written by exactly one render. Stops picking up new
    /// work once `cancel` is set and then reports [`Error::Cancelled`].
    pub fn render_deck(
        &self,
        deck: &mut Deck,
        output_dir: &Path,
        cancel: &CancelToken,
    ) -> deck_core::Result<RenderSummary> {
        let renderer = self.clone().with_style(deck.template.style());
        let slots = deck.visual_slots_mut();
        let total = slots.len();

        let outcomes: Vec<Option<bool>> = slots
            .into_par_iter()
            .map(|slot| {
                if cancel.is_cancelled() {
                    return None;
                }
                let (spec, asset) = match slot {
                    VisualSlot::Chart { spec, asset } => (VisualSpec::Chart(spec), asset),
                    VisualSlot::Diagram { spec, asset } => (VisualSpec::Diagram(spec), asset),
                };
                let rendered = renderer.render(spec, output_dir);
                let fallback = rendered.fallback;
                *asset = Some(rendered);
                Some(fallback)
            })
            .collect();

        if cancel.is_cancelled() {
            log::warn!(
                "Rendering cancelled after {} of {} visuals",
                outcomes.iter().flatten().count(),
                total
            );
            return Err(Error::Cancelled);
        }

        let summary = RenderSummary {
            rendered: outcomes.iter().flatten().filter(|fallback| !**fallback).count(),
            fallbacks: outcomes.iter().flatten().filter(|fallback| **fallback).count(),
        };
        log::debug!(
            "Rendered {} visuals ({} placeholders)",
            summary.rendered + summary.fallbacks,
            summary.fallbacks
        );
        Ok(summary)
    }

    fn placeholder(&self, kind: AssetKind, output_dir: &Path, error: String) -> RenderedAsset {
        let img = placeholder_image();
        let mut asset = match self.write_png(&img, kind, output_dir) {
            Ok(asset) => asset,
            Err(write_err) => {
                log::error!("Could not write placeholder image: {}", write_err);
                RenderedAsset {
                    path: output_dir.join(file_name(kind)),
                    kind,
                    width: PLACEHOLDER_WIDTH,
                    height: PLACEHOLDER_HEIGHT,
                    fallback: true,
                    error: None,
                }
            }
        };
        asset.fallback = true;
        asset.error = Some(error);
        asset
    }

    fn write_png(
        &self,
        img: &RgbaImage,
        kind: AssetKind,
        output_dir: &Path,
    ) -> Result<RenderedAsset, RenderError> {
        let mut buffer = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(img.clone())
            .write_to(&mut buffer, ImageFormat::Png)
            .map_err(|e| RenderError::Backend(format!("Failed to encode image: {}", e)))?;

        let path = output_dir.join(file_name(kind));
        std::fs::write(&path, buffer.into_inner())?;
        Ok(RenderedAsset {
            path,
            kind,
            width: img.width(),
            height: img.height(),
            fallback: false,
            error: None,
        })
    }
}

fn file_name(kind: AssetKind) -> PathBuf {
    let prefix = match kind {
        AssetKind::Chart => "chart",
        AssetKind::Diagram => "diagram",
    };
    PathBuf::from(format!("{}-{}.png", prefix, Uuid::new_v4().simple()))
}

/// Light-gray placeholder with a border and an empty picture frame.
pub fn placeholder_image() -> RgbaImage {
    let (w, h) = (PLACEHOLDER_WIDTH, PLACEHOLDER_HEIGHT);
    let mut img = RgbaImage::from_pixel(w, h, Rgba([211, 211, 211, 255]));
    let border = Rgba([128, 128, 128, 255]);
    stroke_rect(&mut img, 0, 0, w as i64, h as i64, 2, border);
    // Empty picture frame in the middle.
    stroke_rect(&mut img, 150, 100, 100, 80, 3, border);
    fill_rect(&mut img, 165, 150, 70, 15, border);
    img
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use deck_core::{
        ChartKind, ContentBlock, DiagramGraph, DiagramKind, Slide, SlideKind, Template,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Backend that always fails, standing in for a broken converter.
    struct FailingBackend {
        calls: AtomicUsize,
    }

    impl RasterBackend for FailingBackend {
        fn name(&self) -> &str {
            "failing"
        }

        fn rasterize_chart(
            &self,
            _: &ChartSpec,
            _: &TemplateStyle,
            _: u32,
            _: u32,
        ) -> Result<RgbaImage, RenderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(RenderError::Backend("converter not installed".into()))
        }

        fn rasterize_diagram(
            &self,
            _: DiagramKind,
            _: &DiagramGraph,
            _: &TemplateStyle,
            _: u32,
            _: u32,
        ) -> Result<RgbaImage, RenderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(RenderError::Backend("converter not installed".into()))
        }
    }

    fn png_count(dir: &Path) -> usize {
        std::fs::read_dir(dir)
            .unwrap()
            .filter(|e| {
                e.as_ref()
                    .unwrap()
                    .path()
                    .extension()
                    .is_some_and(|ext| ext == "png")
            })
            .count()
    }

    #[test]
    fn test_render_chart() {
        let dir = tempfile::tempdir().unwrap();
        let spec = ChartSpec::illustrative(ChartKind::Bar, "Growth");
        let asset = Renderer::new(RenderSettings::default())
            .render(VisualSpec::Chart(&spec), dir.path());

        assert!(!asset.fallback);
        assert_eq!(asset.kind, AssetKind::Chart);
        assert_eq!((asset.width, asset.height), (800, 600));
        let img = image::open(&asset.path).unwrap();
        assert_eq!((img.width(), img.height()), (800, 600));
        assert_eq!(png_count(dir.path()), 1);
    }

    #[test]
    fn test_render_diagram() {
        let dir = tempfile::tempdir().unwrap();
        let spec = DiagramSpec::sequence_for("login process");
        let asset = Renderer::new(RenderSettings::default())
            .render(VisualSpec::Diagram(&spec), dir.path());
        assert!(!asset.fallback);
        assert_eq!(asset.kind, AssetKind::Diagram);
        assert!(asset.path.file_name().unwrap().to_string_lossy().starts_with("diagram-"));
    }

    #[test]
    fn test_invalid_chart_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let mut spec = ChartSpec::illustrative(ChartKind::Bar, "Growth");
        spec.data.clear();
        let asset = Renderer::new(RenderSettings::default())
            .render(VisualSpec::Chart(&spec), dir.path());

        assert!(asset.fallback);
        assert!(asset.error.is_some());
        assert_eq!((asset.width, asset.height), (400, 300));
        assert!(asset.path.exists());
        assert_eq!(png_count(dir.path()), 1);
    }

    #[test]
    fn test_too_many_points_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let mut spec = ChartSpec::illustrative(ChartKind::Line, "Daily");
        spec.data = (0..51)
            .map(|i| deck_core::DataPoint::new(format!("d{}", i), i as f64))
            .collect();
        let renderer = Renderer::new(RenderSettings::default());
        assert!(matches!(
            renderer.try_render(VisualSpec::Chart(&spec), dir.path()),
            Err(RenderError::TooComplex(_))
        ));
        assert!(renderer.render(VisualSpec::Chart(&spec), dir.path()).fallback);
    }

    #[test]
    fn test_long_diagram_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = String::from("sequenceDiagram");
        for i in 0..25 {
            source.push_str(&format!("\n    A->>B: step {}", i));
        }
        let spec = DiagramSpec {
            kind: DiagramKind::Sequence,
            source,
            alt_text: "long".into(),
        };
        let renderer = Renderer::new(RenderSettings::default());
        assert!(matches!(
            renderer.try_render(VisualSpec::Diagram(&spec), dir.path()),
            Err(RenderError::TooComplex(_))
        ));
        assert!(renderer.render(VisualSpec::Diagram(&spec), dir.path()).fallback);
    }

    #[test]
    fn test_failing_backend_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(FailingBackend {
            calls: AtomicUsize::new(0),
        });
        let renderer = Renderer::new(RenderSettings::default()).with_backend(backend.clone());
        let spec = ChartSpec::illustrative(ChartKind::Pie, "Share");
        let asset = renderer.render(VisualSpec::Chart(&spec), dir.path());

        assert!(asset.fallback);
        assert!(asset.error.unwrap().contains("converter not installed"));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        assert_eq!(png_count(dir.path()), 1);
    }

    #[test]
    fn test_rerender_is_structurally_identical() {
        let dir = tempfile::tempdir().unwrap();
        let spec = DiagramSpec::flowchart_for("review");
        let renderer = Renderer::new(RenderSettings::default());
        let a = renderer.render(VisualSpec::Diagram(&spec), dir.path());
        let b = renderer.render(VisualSpec::Diagram(&spec), dir.path());

        assert_ne!(a.path, b.path);
        assert_eq!((a.width, a.height, a.kind), (b.width, b.height, b.kind));
        let pixels_a = image::open(&a.path).unwrap().to_rgba8();
        let pixels_b = image::open(&b.path).unwrap().to_rgba8();
        assert_eq!(pixels_a, pixels_b);
    }

    #[test]
    fn test_render_vega_lite_requires_schema() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = Renderer::new(RenderSettings::default());
        let mut grammar = ChartSpec::illustrative(ChartKind::Bar, "x").to_vega_lite();
        assert!(renderer.try_render_vega_lite(&grammar, dir.path()).is_ok());
        grammar.as_object_mut().unwrap().remove("$schema");
        assert!(matches!(
            renderer.try_render_vega_lite(&grammar, dir.path()),
            Err(RenderError::InvalidSpec(_))
        ));
    }

    fn visual_deck() -> Deck {
        let mut deck = Deck::new("Demo", Template::Bold, Utc::now());
        deck.add_slide(Slide::new(SlideKind::Title, "Demo"));
        for kind in [ChartKind::Bar, ChartKind::Line, ChartKind::Pie] {
            deck.add_slide(Slide::new(SlideKind::Chart, kind.label()).with_block(
                ContentBlock::ChartRef {
                    spec: ChartSpec::illustrative(kind, "Demo"),
                    asset: None,
                },
            ));
        }
        deck.add_slide(Slide::new(SlideKind::Diagram, "Flow").with_block(
            ContentBlock::DiagramRef {
                spec: DiagramSpec::flowchart_for("Demo"),
                asset: None,
            },
        ));
        deck
    }

    #[test]
    fn test_render_deck_fills_every_slot() {
        let dir = tempfile::tempdir().unwrap();
        let mut deck = visual_deck();
        let summary = Renderer::new(RenderSettings::default())
            .render_deck(&mut deck, dir.path(), &CancelToken::new())
            .unwrap();

        assert_eq!(summary, RenderSummary { rendered: 4, fallbacks: 0 });
        assert_eq!(deck.assets().len(), 4);
        assert_eq!(png_count(dir.path()), 4);
    }

    #[test]
    fn test_render_deck_with_failing_backend() {
        let dir = tempfile::tempdir().unwrap();
        let mut deck = visual_deck();
        let summary = Renderer::new(RenderSettings::default())
            .with_backend(Arc::new(FailingBackend {
                calls: AtomicUsize::new(0),
            }))
            .render_deck(&mut deck, dir.path(), &CancelToken::new())
            .unwrap();

        assert_eq!(summary.fallbacks, 4);
        assert!(deck.assets().iter().all(|a| a.fallback));
    }

    #[test]
    fn test_render_deck_cancelled() {
        let dir = tempfile::tempdir().unwrap();
        let mut deck = visual_deck();
        let cancel = CancelToken::new();
        cancel.cancel();
        let result =
            Renderer::new(RenderSettings::default()).render_deck(&mut deck, dir.path(), &cancel);

        assert!(matches!(result, Err(Error::Cancelled)));
        assert_eq!(png_count(dir.path()), 0);
    }

    #[test]
    fn test_placeholder_image() {
        let img = placeholder_image();
        assert_eq!(img.dimensions(), (400, 300));
        assert_eq!(*img.get_pixel(200, 20), Rgba([211, 211, 211, 255]));
        assert_eq!(*img.get_pixel(0, 0), Rgba([128, 128, 128, 255]));
    }
}
