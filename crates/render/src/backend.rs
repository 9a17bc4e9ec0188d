//! Rasterization backends.
//!
//! A backend turns a validated chart or parsed diagram into pixels. It never
//! touches the file system; encoding and file naming belong to the renderer.

use crate::draw::{draw_arrow, draw_line, fill_rect, fill_sector, rgba, stroke_rect};
use deck_core::{ChartKind, ChartSpec, DiagramGraph, DiagramKind, RenderError, TemplateStyle};
use image::RgbaImage;
use std::collections::VecDeque;

/// Something that can rasterize charts and diagrams locally.
pub trait RasterBackend: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    fn rasterize_chart(
        &self,
        spec: &ChartSpec,
        style: &TemplateStyle,
        width: u32,
        height: u32,
    ) -> Result<RgbaImage, RenderError>;

    fn rasterize_diagram(
        &self,
        kind: DiagramKind,
        graph: &DiagramGraph,
        style: &TemplateStyle,
        width: u32,
        height: u32,
    ) -> Result<RgbaImage, RenderError>;
}

/// Built-in backend drawing shapes straight into an RGBA buffer.
///
/// Text is not drawn; titles and labels reach the audience through the
/// slide heading and alt text.
#[derive(Debug, Clone, Copy, Default)]
pub struct PixelBackend;

/// Margins around the plot area, in pixels.
const MARGIN_LEFT: i64 = 60;
const MARGIN_RIGHT: i64 = 40;
const MARGIN_TOP: i64 = 48;
const MARGIN_BOTTOM: i64 = 60;

impl PixelBackend {
    fn canvas(style: &TemplateStyle, width: u32, height: u32) -> RgbaImage {
        let mut img = RgbaImage::from_pixel(width, height, rgba(style.background));
        // Accent band across the top, as on the slides.
        fill_rect(&mut img, 0, 0, width as i64, 8, rgba(style.accent));
        img
    }

    fn draw_axes(img: &mut RgbaImage, style: &TemplateStyle) {
        let (w, h) = (img.width() as i64, img.height() as i64);
        let color = rgba(style.body_color);
        let origin = (MARGIN_LEFT, h - MARGIN_BOTTOM);
        draw_line(img, origin, (w - MARGIN_RIGHT, h - MARGIN_BOTTOM), 2, 0, color);
        draw_line(img, origin, (MARGIN_LEFT, MARGIN_TOP), 2, 0, color);
    }

    fn draw_bars(img: &mut RgbaImage, spec: &ChartSpec, style: &TemplateStyle) {
        let (w, h) = (img.width() as i64, img.height() as i64);
        let plot_w = w - MARGIN_LEFT - MARGIN_RIGHT;
        let plot_h = h - MARGIN_TOP - MARGIN_BOTTOM;
        let max = max_value(spec);
        let slot = plot_w / spec.data.len() as i64;
        let bar_w = (slot * 7 / 10).max(1);
        let color = rgba(style.accent);

        for (idx, point) in spec.data.iter().enumerate() {
            let bar_h = ((point.value.max(0.0) / max) * plot_h as f64).round() as i64;
            let x = MARGIN_LEFT + idx as i64 * slot + (slot - bar_w) / 2;
            fill_rect(img, x, h - MARGIN_BOTTOM - bar_h, bar_w, bar_h, color);
        }
    }

    fn draw_line_series(img: &mut RgbaImage, spec: &ChartSpec, style: &TemplateStyle) {
        let (w, h) = (img.width() as i64, img.height() as i64);
        let plot_w = w - MARGIN_LEFT - MARGIN_RIGHT;
        let plot_h = h - MARGIN_TOP - MARGIN_BOTTOM;
        let max = max_value(spec);
        let steps = (spec.data.len() as i64 - 1).max(1);
        let color = rgba(style.accent);

        let points: Vec<(i64, i64)> = spec
            .data
            .iter()
            .enumerate()
            .map(|(idx, point)| {
                let x = MARGIN_LEFT + idx as i64 * plot_w / steps;
                let y = h - MARGIN_BOTTOM - ((point.value.max(0.0) / max) * plot_h as f64) as i64;
                (x, y)
            })
            .collect();
        for pair in points.windows(2) {
            draw_line(img, pair[0], pair[1], 3, 0, color);
        }
        for (x, y) in points {
            fill_rect(img, x - 4, y - 4, 9, 9, rgba(style.title_color));
        }
    }

    fn draw_pie(
        img: &mut RgbaImage,
        spec: &ChartSpec,
        style: &TemplateStyle,
    ) -> Result<(), RenderError> {
        let total: f64 = spec.data.iter().map(|p| p.value).sum();
        if total <= 0.0 {
            return Err(RenderError::InvalidSpec("pie values sum to zero".into()));
        }
        let (w, h) = (img.width() as i64, img.height() as i64);
        let center = (w / 2, (h + MARGIN_TOP / 2) / 2);
        let radius = ((w.min(h) - MARGIN_TOP - MARGIN_BOTTOM) / 2).max(10);
        let colors = style.palette(spec.data.len());

        let mut start = 0.0;
        for (point, color) in spec.data.iter().zip(colors) {
            let sweep = point.value / total * std::f64::consts::TAU;
            fill_sector(img, center, radius, start, start + sweep, rgba(color));
            start += sweep;
        }
        Ok(())
    }

    fn draw_sequence(img: &mut RgbaImage, graph: &DiagramGraph, style: &TemplateStyle) {
        let (w, h) = (img.width() as i64, img.height() as i64);
        let count = graph.nodes.len() as i64;
        let column = (w - 40) / count;
        let box_w = (column * 7 / 10).clamp(20, 160);
        let box_h = 40;
        let top = MARGIN_TOP;
        let centers: Vec<i64> = (0..count).map(|i| 20 + i * column + column / 2).collect();

        for &cx in &centers {
            fill_rect(img, cx - box_w / 2, top, box_w, box_h, rgba(style.accent));
            stroke_rect(img, cx - box_w / 2, top, box_w, box_h, 2, rgba(style.title_color));
            draw_line(img, (cx, top + box_h), (cx, h - 20), 1, 5, rgba(style.body_color));
        }

        let first_y = top + box_h + 30;
        let step = ((h - 40 - first_y) / (graph.edges.len() as i64).max(1)).clamp(8, 60);
        for (idx, edge) in graph.edges.iter().enumerate() {
            let y = first_y + idx as i64 * step;
            let (from, to) = (centers[edge.from], centers[edge.to]);
            let color = rgba(style.title_color);
            if from == to {
                draw_line(img, (from, y), (from + 30, y), 2, 0, color);
                draw_line(img, (from + 30, y), (from + 30, y + step / 2), 2, 0, color);
                draw_arrow(img, (from + 30, y + step / 2), (from, y + step / 2), 2, edge.dashed, color);
            } else {
                draw_arrow(img, (from, y), (to, y), 2, edge.dashed, color);
            }
        }
    }

    fn draw_flowchart(img: &mut RgbaImage, graph: &DiagramGraph, style: &TemplateStyle) {
        let (w, h) = (img.width() as i64, img.height() as i64);
        let ranks = flow_ranks(graph);
        let rank_count = ranks.iter().copied().max().unwrap_or(0) as i64 + 1;

        // Position of each node within its rank.
        let mut rows = vec![0i64; graph.nodes.len()];
        let mut per_rank = vec![0i64; rank_count as usize];
        for (node, &rank) in ranks.iter().enumerate() {
            rows[node] = per_rank[rank];
            per_rank[rank] += 1;
        }

        let column = (w - 40) / rank_count;
        let box_w = (column * 6 / 10).clamp(20, 180);
        let box_h = 50;
        let center = |node: usize| -> (i64, i64) {
            let rank = ranks[node];
            let in_rank = per_rank[rank].max(1);
            let row_h = (h - MARGIN_TOP - 20) / in_rank;
            (
                20 + rank as i64 * column + column / 2,
                MARGIN_TOP + rows[node] * row_h + row_h / 2,
            )
        };

        for edge in &graph.edges {
            let (fx, fy) = center(edge.from);
            let (tx, ty) = center(edge.to);
            let color = rgba(style.body_color);
            if edge.from == edge.to {
                continue;
            }
            if tx > fx {
                draw_arrow(img, (fx + box_w / 2, fy), (tx - box_w / 2, ty), 2, edge.dashed, color);
            } else {
                // Back edge: route below the boxes.
                let drop = box_h / 2 + 14;
                draw_line(img, (fx, fy + box_h / 2), (fx, fy + drop), 2, 0, color);
                draw_line(img, (fx, fy + drop), (tx, fy + drop), 2, 0, color);
                draw_arrow(img, (tx, fy + drop), (tx, ty + box_h / 2), 2, edge.dashed, color);
            }
        }
        for node in 0..graph.nodes.len() {
            let (cx, cy) = center(node);
            fill_rect(img, cx - box_w / 2, cy - box_h / 2, box_w, box_h, rgba(style.accent));
            stroke_rect(img, cx - box_w / 2, cy - box_h / 2, box_w, box_h, 2, rgba(style.title_color));
        }
    }
}

impl RasterBackend for PixelBackend {
    fn name(&self) -> &str {
        "pixel"
    }

    fn rasterize_chart(
        &self,
        spec: &ChartSpec,
        style: &TemplateStyle,
        width: u32,
        height: u32,
    ) -> Result<RgbaImage, RenderError> {
        if spec.data.is_empty() {
            return Err(RenderError::InvalidSpec("chart has no data".into()));
        }
        let mut img = Self::canvas(style, width, height);
        match spec.kind {
            ChartKind::Bar => {
                Self::draw_axes(&mut img, style);
                Self::draw_bars(&mut img, spec, style);
            }
            ChartKind::Line => {
                Self::draw_axes(&mut img, style);
                Self::draw_line_series(&mut img, spec, style);
            }
            ChartKind::Pie => Self::draw_pie(&mut img, spec, style)?,
        }
        Ok(img)
    }

    fn rasterize_diagram(
        &self,
        kind: DiagramKind,
        graph: &DiagramGraph,
        style: &TemplateStyle,
        width: u32,
        height: u32,
    ) -> Result<RgbaImage, RenderError> {
        if graph.nodes.is_empty() {
            return Err(RenderError::InvalidSpec("diagram has no nodes".into()));
        }
        if let Some(edge) = graph
            .edges
            .iter()
            .find(|e| e.from >= graph.nodes.len() || e.to >= graph.nodes.len())
        {
            return Err(RenderError::InvalidSpec(format!(
                "edge refers to unknown node {}",
                edge.from.max(edge.to)
            )));
        }
        let mut img = Self::canvas(style, width, height);
        match kind {
            DiagramKind::Sequence => Self::draw_sequence(&mut img, graph, style),
            DiagramKind::Flowchart => Self::draw_flowchart(&mut img, graph, style),
        }
        Ok(img)
    }
}

/// Largest positive value, or 1 when there is none.
fn max_value(spec: &ChartSpec) -> f64 {
    let max = spec.data.iter().map(|p| p.value).fold(0.0, f64::max);
    if max > 0.0 {
        max
    } else {
        1.0
    }
}

/// Column of each flowchart node: breadth-first distance from the nodes
/// without incoming edges (or from the first node if every node has one).
fn flow_ranks(graph: &DiagramGraph) -> Vec<usize> {
    let count = graph.nodes.len();
    let mut incoming = vec![0usize; count];
    for edge in &graph.edges {
        if edge.from != edge.to {
            incoming[edge.to] += 1;
        }
    }

    let mut ranks: Vec<Option<usize>> = vec![None; count];
    let mut queue = VecDeque::new();
    for (node, &n) in incoming.iter().enumerate() {
        if n == 0 {
            ranks[node] = Some(0);
            queue.push_back(node);
        }
    }
    if queue.is_empty() && count > 0 {
        ranks[0] = Some(0);
        queue.push_back(0);
    }

    while let Some(node) = queue.pop_front() {
        let next_rank = ranks[node].unwrap_or(0) + 1;
        for edge in graph.edges.iter().filter(|e| e.from == node) {
            if ranks[edge.to].is_none() {
                ranks[edge.to] = Some(next_rank);
                queue.push_back(edge.to);
            }
        }
    }

    ranks.into_iter().map(|r| r.unwrap_or(0)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use deck_core::{DiagramSpec, Template};

    fn has_color(img: &RgbaImage, color: deck_core::Rgb) -> bool {
        img.pixels().any(|p| *p == rgba(color))
    }

    #[test]
    fn test_bar_chart_uses_accent() {
        let style = Template::Corporate.style();
        let spec = ChartSpec::illustrative(ChartKind::Bar, "Growth");
        let img = PixelBackend.rasterize_chart(&spec, &style, 800, 600).unwrap();
        assert_eq!(img.dimensions(), (800, 600));
        assert!(has_color(&img, style.accent));
        // Tallest bar reaches the top of the plot area.
        let x = (MARGIN_LEFT + (800 - MARGIN_LEFT - MARGIN_RIGHT) / 6) as u32;
        assert_eq!(*img.get_pixel(x, (MARGIN_TOP + 2) as u32), rgba(style.accent));
    }

    #[test]
    fn test_pie_chart_uses_palette() {
        let style = Template::Bold.style();
        let spec = ChartSpec::illustrative(ChartKind::Pie, "Share");
        let img = PixelBackend.rasterize_chart(&spec, &style, 800, 600).unwrap();
        for color in style.palette(spec.data.len()) {
            assert!(has_color(&img, color));
        }
    }

    #[test]
    fn test_zero_pie_is_invalid() {
        let style = Template::Minimal.style();
        let mut spec = ChartSpec::illustrative(ChartKind::Pie, "Share");
        spec.data.iter_mut().for_each(|p| p.value = 0.0);
        assert!(matches!(
            PixelBackend.rasterize_chart(&spec, &style, 800, 600),
            Err(RenderError::InvalidSpec(_))
        ));
    }

    #[test]
    fn test_line_chart() {
        let style = Template::Minimal.style();
        let spec = ChartSpec::illustrative(ChartKind::Line, "Revenue");
        let img = PixelBackend.rasterize_chart(&spec, &style, 640, 480).unwrap();
        assert_eq!(img.dimensions(), (640, 480));
        assert!(has_color(&img, style.title_color));
    }

    #[test]
    fn test_sequence_and_flowchart() {
        let style = Template::Minimal.style();
        for spec in [DiagramSpec::sequence_for("login"), DiagramSpec::flowchart_for("review")] {
            let graph = spec.parse().unwrap();
            let img = PixelBackend
                .rasterize_diagram(spec.kind, &graph, &style, 800, 600)
                .unwrap();
            assert!(has_color(&img, style.accent));
        }
    }

    #[test]
    fn test_flow_ranks() {
        let graph = DiagramSpec::flowchart_for("review").parse().unwrap();
        // Request -> step -> decision -> deliver, with a back edge to step.
        assert_eq!(flow_ranks(&graph), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_empty_diagram_is_invalid() {
        let style = Template::Minimal.style();
        let graph = DiagramGraph::default();
        assert!(PixelBackend
            .rasterize_diagram(DiagramKind::Flowchart, &graph, &style, 800, 600)
            .is_err());
    }
}
