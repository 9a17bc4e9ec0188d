//! Chart and diagram specifications.
//!
//! Charts follow the Vega-Lite grammar (a spec converts to and from a
//! Vega-Lite JSON value). Diagrams carry a Mermaid source in the
//! `sequenceDiagram` or `flowchart` dialect. Both are inputs to the renderer,
//! never rendered bytes.

use crate::error::RenderError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::LazyLock;

/// Schema URL stamped on every generated chart.
pub const VEGA_LITE_SCHEMA: &str = "https://vega.github.io/schema/vega-lite/v5.json";

/// Matches a sequence message such as `User->>System: Login`.
static SEQUENCE_MESSAGE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z0-9_]+)\s*(-->>|->>|--x|-x|-->|->)\s*([A-Za-z0-9_]+)\s*(?::\s*(.*))?$")
        .unwrap()
});

/// Matches a participant declaration, with optional alias.
static PARTICIPANT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:participant|actor)\s+([A-Za-z0-9_]+)(?:\s+as\s+(.+))?$").unwrap()
});

/// Splits a flowchart line on its arrows, capturing optional edge labels.
static FLOW_ARROW_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*(?:-->|---|-\.->|==>)(?:\|([^|]*)\|)?\s*").unwrap());

/// A flowchart node: id plus optional `[label]`, `(label)` or `{label}`.
static FLOW_NODE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z0-9_]+)\s*(?:\[([^\]]*)\]|\(([^)]*)\)|\{([^}]*)\})?$").unwrap()
});

/// Characters allowed in generated Mermaid labels.
fn mermaid_label(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_' | '\'' | '&'))
        .collect();
    let cleaned = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    cleaned.chars().take(40).collect()
}

/// Chart mark type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    Bar,
    Line,
    Pie,
}

impl ChartKind {
    /// Vega-Lite mark name.
    pub fn mark(&self) -> &'static str {
        match self {
            Self::Bar => "bar",
            Self::Line => "line",
            Self::Pie => "arc",
        }
    }

    /// Parse a Vega-Lite mark (or a loose chart name).
    pub fn from_mark(mark: &str) -> Option<Self> {
        match mark.trim().to_lowercase().as_str() {
            "bar" | "column" => Some(Self::Bar),
            "line" | "area" | "trend" => Some(Self::Line),
            "arc" | "pie" | "donut" => Some(Self::Pie),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Bar => "Bar chart",
            Self::Line => "Line chart",
            Self::Pie => "Pie chart",
        }
    }
}

/// One category/value pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub category: String,
    pub value: f64,
}

impl DataPoint {
    pub fn new(category: impl Into<String>, value: f64) -> Self {
        Self {
            category: category.into(),
            value,
        }
    }
}

/// Declarative chart configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSpec {
    pub kind: ChartKind,
    pub title: String,
    pub category_field: String,
    pub value_field: String,
    pub data: Vec<DataPoint>,
    pub alt_text: String,
}

impl ChartSpec {
    /// A chart with illustrative values, to be replaced by real data.
    pub fn illustrative(kind: ChartKind, subject: &str) -> Self {
        let subject = mermaid_label(subject);
        let (title, data) = match kind {
            ChartKind::Bar => (
                if subject.is_empty() {
                    "Key metrics".to_string()
                } else {
                    subject
                },
                vec![
                    DataPoint::new("Market Size", 85.0),
                    DataPoint::new("Growth Rate", 45.0),
                    DataPoint::new("Adoption", 60.0),
                ],
            ),
            ChartKind::Line => (
                if subject.is_empty() {
                    "Trend".to_string()
                } else {
                    format!("{} trend", subject)
                },
                vec![
                    DataPoint::new("Q1", 20.0),
                    DataPoint::new("Q2", 35.0),
                    DataPoint::new("Q3", 50.0),
                    DataPoint::new("Q4", 72.0),
                ],
            ),
            ChartKind::Pie => (
                if subject.is_empty() {
                    "Breakdown".to_string()
                } else {
                    format!("{} breakdown", subject)
                },
                vec![
                    DataPoint::new("Segment A", 45.0),
                    DataPoint::new("Segment B", 30.0),
                    DataPoint::new("Segment C", 25.0),
                ],
            ),
        };
        let alt_text = format!(
            "{} of {} with illustrative values; replace with real data.",
            kind.label(),
            title
        );
        Self {
            kind,
            title,
            category_field: "category".to_string(),
            value_field: "value".to_string(),
            data,
            alt_text,
        }
    }

    /// Build the Vega-Lite grammar object for this chart.
    pub fn to_vega_lite(&self) -> Value {
        let values: Vec<Value> = self
            .data
            .iter()
            .map(|point| {
                let mut row = Map::new();
                row.insert(self.category_field.clone(), json!(point.category));
                row.insert(self.value_field.clone(), json!(point.value));
                Value::Object(row)
            })
            .collect();

        let encoding = match self.kind {
            ChartKind::Bar | ChartKind::Line => json!({
                "x": {"field": self.category_field, "type": "nominal"},
                "y": {"field": self.value_field, "type": "quantitative"}
            }),
            ChartKind::Pie => json!({
                "theta": {"field": self.value_field, "type": "quantitative"},
                "color": {"field": self.category_field, "type": "nominal"}
            }),
        };

        json!({
            "$schema": VEGA_LITE_SCHEMA,
            "title": self.title,
            "description": self.alt_text,
            "data": {"values": values},
            "mark": self.kind.mark(),
            "encoding": encoding
        })
    }

    /// Parse and validate a Vega-Lite value.
    ///
    /// Requires `$schema`, a supported `mark`, field encodings and inline
    /// `data.values` with at most `max_points` rows.
    pub fn from_vega_lite(value: &Value, max_points: usize) -> Result<Self, RenderError> {
        let obj = value
            .as_object()
            .ok_or_else(|| RenderError::InvalidSpec("chart spec is not an object".into()))?;

        match obj.get("$schema").and_then(Value::as_str) {
            Some(schema) if schema.contains("vega-lite") => {}
            _ => return Err(RenderError::InvalidSpec("missing Vega-Lite $schema".into())),
        }

        let mark = obj
            .get("mark")
            .and_then(|m| m.as_str().or_else(|| m.get("type").and_then(Value::as_str)))
            .ok_or_else(|| RenderError::InvalidSpec("missing mark".into()))?;
        let kind = ChartKind::from_mark(mark)
            .ok_or_else(|| RenderError::InvalidSpec("unsupported mark".into()))?;

        let encoding = obj
            .get("encoding")
            .ok_or_else(|| RenderError::InvalidSpec("missing encoding".into()))?;
        let field = |channel: &str| -> Result<String, RenderError> {
            encoding
                .get(channel)
                .and_then(|c| c.get("field"))
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| RenderError::InvalidSpec(format!("missing {} field", channel)))
        };
        let (category_field, value_field) = match kind {
            ChartKind::Bar | ChartKind::Line => (field("x")?, field("y")?),
            ChartKind::Pie => (field("color")?, field("theta")?),
        };

        let rows = obj
            .get("data")
            .and_then(|d| d.get("values"))
            .and_then(Value::as_array)
            .ok_or_else(|| RenderError::InvalidSpec("missing inline data values".into()))?;
        if rows.is_empty() {
            return Err(RenderError::InvalidSpec("chart has no data".into()));
        }
        if rows.len() > max_points {
            return Err(RenderError::TooComplex(format!(
                "{} data points exceeds the limit of {}",
                rows.len(),
                max_points
            )));
        }

        let mut data = Vec::with_capacity(rows.len());
        for (idx, row) in rows.iter().enumerate() {
            let category = match row.get(&category_field) {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Number(n)) => n.to_string(),
                _ => {
                    return Err(RenderError::InvalidSpec(format!(
                        "row {} has no category",
                        idx + 1
                    )))
                }
            };
            let value = row
                .get(&value_field)
                .and_then(Value::as_f64)
                .filter(|v| v.is_finite())
                .ok_or_else(|| {
                    RenderError::InvalidSpec(format!("row {} has no numeric value", idx + 1))
                })?;
            if kind == ChartKind::Pie && value < 0.0 {
                return Err(RenderError::InvalidSpec("negative pie slice".into()));
            }
            data.push(DataPoint { category, value });
        }

        Ok(Self {
            kind,
            title: obj
                .get("title")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            category_field,
            value_field,
            data,
            alt_text: obj
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        })
    }
}

/// Diagram dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagramKind {
    Sequence,
    Flowchart,
}

impl DiagramKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Sequence => "Sequence diagram",
            Self::Flowchart => "Flowchart",
        }
    }
}

/// Declarative diagram configuration: a Mermaid source plus its kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagramSpec {
    pub kind: DiagramKind,
    pub source: String,
    pub alt_text: String,
}

/// Nodes and edges recovered from a diagram source.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DiagramGraph {
    /// Node labels, in declaration order.
    pub nodes: Vec<String>,
    pub edges: Vec<DiagramEdge>,
}

/// A message (sequence) or arrow (flowchart) between two nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct DiagramEdge {
    pub from: usize,
    pub to: usize,
    pub label: String,
    /// Dashed arrow (reply message or dotted link).
    pub dashed: bool,
}

impl DiagramGraph {
    fn node_index(&mut self, ids: &mut Vec<String>, id: &str, label: Option<&str>) -> usize {
        if let Some(idx) = ids.iter().position(|known| known == id) {
            if let Some(label) = label {
                self.nodes[idx] = label.trim().to_string();
            }
            return idx;
        }
        ids.push(id.to_string());
        self.nodes.push(label.unwrap_or(id).trim().to_string());
        self.nodes.len() - 1
    }
}

impl DiagramSpec {
    /// Three-party request/response flow for a named process.
    pub fn sequence_for(subject: &str) -> Self {
        let subject = match mermaid_label(subject) {
            s if s.is_empty() => "request".to_string(),
            s => s,
        };
        let source = format!(
            "sequenceDiagram\n    participant User\n    participant System\n    participant Database\n    User->>System: Start {subject}\n    System->>Database: Validate {subject}\n    Database-->>System: Return result\n    System-->>User: Complete {subject}"
        );
        Self {
            kind: DiagramKind::Sequence,
            alt_text: format!(
                "Sequence diagram of {}: User, System and Database exchange four messages.",
                subject
            ),
            source,
        }
    }

    /// Request, step, decision, delivery.
    pub fn flowchart_for(subject: &str) -> Self {
        let subject = match mermaid_label(subject) {
            s if s.is_empty() => "Process".to_string(),
            s => s,
        };
        let source = format!(
            "flowchart LR\n    A[Request] --> B[{subject}]\n    B --> C{{Approved}}\n    C -->|yes| D[Deliver]\n    C -->|no| B"
        );
        Self {
            kind: DiagramKind::Flowchart,
            alt_text: format!(
                "Flowchart of {}: request, review decision, then delivery or rework.",
                subject
            ),
            source,
        }
    }

    /// Meaningful source lines (blank lines and `%%` comments excluded).
    pub fn line_count(&self) -> usize {
        significant_lines(&self.source).count()
    }

    /// Parse the Mermaid source into nodes and edges.
    pub fn parse(&self) -> Result<DiagramGraph, RenderError> {
        let mut lines = significant_lines(&self.source);
        let header = lines
            .next()
            .ok_or_else(|| RenderError::InvalidSpec("empty diagram source".into()))?;
        let header_word = header.split_whitespace().next().unwrap_or_default();

        match (self.kind, header_word) {
            (DiagramKind::Sequence, "sequenceDiagram") => parse_sequence(lines),
            (DiagramKind::Flowchart, "flowchart" | "graph") => parse_flowchart(lines),
            _ => Err(RenderError::InvalidSpec(format!(
                "source header does not match a {}",
                self.kind.label().to_lowercase()
            ))),
        }
    }
}

fn significant_lines(source: &str) -> impl Iterator<Item = &str> {
    source
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("%%"))
}

/// Sequence keywords that carry no nodes or messages.
const SEQUENCE_IGNORED: &[&str] = &[
    "note", "loop", "alt", "else", "opt", "par", "and", "end", "rect", "activate", "deactivate",
    "autonumber",
];

fn parse_sequence<'a>(lines: impl Iterator<Item = &'a str>) -> Result<DiagramGraph, RenderError> {
    let mut graph = DiagramGraph::default();
    let mut ids = Vec::new();

    for (idx, line) in lines.enumerate() {
        if let Some(caps) = PARTICIPANT_REGEX.captures(line) {
            let alias = caps.get(2).map(|m| m.as_str());
            graph.node_index(&mut ids, &caps[1], alias);
        } else if let Some(caps) = SEQUENCE_MESSAGE_REGEX.captures(line) {
            let from = graph.node_index(&mut ids, &caps[1], None);
            let to = graph.node_index(&mut ids, &caps[3], None);
            graph.edges.push(DiagramEdge {
                from,
                to,
                label: caps.get(4).map(|m| m.as_str().trim()).unwrap_or_default().to_string(),
                dashed: caps[2].starts_with("--"),
            });
        } else {
            let keyword = line
                .split_whitespace()
                .next()
                .unwrap_or_default()
                .to_lowercase();
            if !SEQUENCE_IGNORED.contains(&keyword.as_str()) {
                return Err(RenderError::InvalidSpec(format!(
                    "unrecognized sequence statement on line {}",
                    idx + 2
                )));
            }
        }
    }

    Ok(graph)
}

fn parse_flowchart<'a>(lines: impl Iterator<Item = &'a str>) -> Result<DiagramGraph, RenderError> {
    let mut graph = DiagramGraph::default();
    let mut ids = Vec::new();

    for (idx, line) in lines.enumerate() {
        let line = line.trim_end_matches(';');
        let mut previous: Option<usize> = None;
        let mut pending_label = String::new();
        let mut pending_dashed = false;
        let mut cursor = 0;

        let mut segments = Vec::new();
        for arrow in FLOW_ARROW_REGEX.captures_iter(line) {
            let Some(whole) = arrow.get(0) else { continue };
            segments.push((
                &line[cursor..whole.start()],
                arrow.get(1).map(|m| m.as_str().trim().to_string()),
                whole.as_str().contains('.'),
            ));
            cursor = whole.end();
        }
        segments.push((&line[cursor..], None, false));

        for (token, label, dashed) in segments {
            let caps = FLOW_NODE_REGEX.captures(token.trim()).ok_or_else(|| {
                RenderError::InvalidSpec(format!(
                    "unrecognized flowchart node on line {}",
                    idx + 2
                ))
            })?;
            let node_label = caps
                .get(2)
                .or_else(|| caps.get(3))
                .or_else(|| caps.get(4))
                .map(|m| m.as_str());
            let node = graph.node_index(&mut ids, &caps[1], node_label);

            if let Some(from) = previous {
                graph.edges.push(DiagramEdge {
                    from,
                    to: node,
                    label: std::mem::take(&mut pending_label),
                    dashed: pending_dashed,
                });
            }
            previous = Some(node);
            pending_label = label.unwrap_or_default();
            pending_dashed = dashed;
        }
    }

    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vega_lite_contains_schema_and_data() {
        let spec = ChartSpec::illustrative(ChartKind::Bar, "Market");
        let value = spec.to_vega_lite();
        assert_eq!(value["$schema"], VEGA_LITE_SCHEMA);
        assert_eq!(value["mark"], "bar");
        assert_eq!(value["data"]["values"].as_array().unwrap().len(), 3);
        assert_eq!(value["encoding"]["x"]["field"], "category");
    }

    #[test]
    fn test_vega_lite_parse_restores_spec() {
        let spec = ChartSpec::illustrative(ChartKind::Pie, "Revenue");
        let parsed = ChartSpec::from_vega_lite(&spec.to_vega_lite(), 50).unwrap();
        assert_eq!(parsed, spec);
    }

    #[test]
    fn test_vega_lite_requires_schema() {
        let value = json!({
            "data": {"values": [{"a": "A", "b": 28}]},
            "mark": "bar",
            "encoding": {"x": {"field": "a"}, "y": {"field": "b"}}
        });
        assert!(matches!(
            ChartSpec::from_vega_lite(&value, 50),
            Err(RenderError::InvalidSpec(_))
        ));
    }

    #[test]
    fn test_vega_lite_accepts_mark_object() {
        let value = json!({
            "$schema": VEGA_LITE_SCHEMA,
            "data": {"values": [{"a": "A", "b": 28}, {"a": "B", "b": 55}]},
            "mark": {"type": "line"},
            "encoding": {"x": {"field": "a", "type": "ordinal"}, "y": {"field": "b"}}
        });
        let spec = ChartSpec::from_vega_lite(&value, 50).unwrap();
        assert_eq!(spec.kind, ChartKind::Line);
        assert_eq!(spec.data[1], DataPoint::new("B", 55.0));
    }

    #[test]
    fn test_vega_lite_rejects_too_many_points() {
        let mut spec = ChartSpec::illustrative(ChartKind::Bar, "");
        spec.data = (0..51).map(|i| DataPoint::new(format!("c{}", i), i as f64)).collect();
        assert!(matches!(
            ChartSpec::from_vega_lite(&spec.to_vega_lite(), 50),
            Err(RenderError::TooComplex(_))
        ));
    }

    #[test]
    fn test_vega_lite_rejects_non_numeric_value() {
        let value = json!({
            "$schema": VEGA_LITE_SCHEMA,
            "data": {"values": [{"a": "A", "b": "lots"}]},
            "mark": "bar",
            "encoding": {"x": {"field": "a"}, "y": {"field": "b"}}
        });
        assert!(ChartSpec::from_vega_lite(&value, 50).is_err());
    }

    #[test]
    fn test_sequence_for_parses() {
        let spec = DiagramSpec::sequence_for("login process");
        let graph = spec.parse().unwrap();
        assert_eq!(graph.nodes, vec!["User", "System", "Database"]);
        assert_eq!(graph.edges.len(), 4);
        assert_eq!(graph.edges[0].label, "Start login process");
        assert!(!graph.edges[0].dashed);
        assert!(graph.edges[2].dashed);
    }

    #[test]
    fn test_flowchart_for_parses() {
        let spec = DiagramSpec::flowchart_for("Onboarding");
        let graph = spec.parse().unwrap();
        assert_eq!(graph.nodes, vec!["Request", "Onboarding", "Approved", "Deliver"]);
        assert_eq!(graph.edges.len(), 4);
        assert_eq!(graph.edges[2].label, "yes");
    }

    #[test]
    fn test_flowchart_chain() {
        let spec = DiagramSpec {
            kind: DiagramKind::Flowchart,
            source: "graph TD\n  A --> B --> C\n  %% comment\n  C -.-> A".to_string(),
            alt_text: String::new(),
        };
        let graph = spec.parse().unwrap();
        assert_eq!(graph.nodes.len(), 3);
        assert_eq!(graph.edges.len(), 3);
        assert!(graph.edges[2].dashed);
        assert_eq!(spec.line_count(), 3);
    }

    #[test]
    fn test_header_must_match_kind() {
        let spec = DiagramSpec {
            kind: DiagramKind::Sequence,
            source: "flowchart LR\n A --> B".to_string(),
            alt_text: String::new(),
        };
        assert!(spec.parse().is_err());
    }

    #[test]
    fn test_unrecognized_sequence_line() {
        let spec = DiagramSpec {
            kind: DiagramKind::Sequence,
            source: "sequenceDiagram\n  participant A\n  this is not mermaid".to_string(),
            alt_text: String::new(),
        };
        assert!(matches!(spec.parse(), Err(RenderError::InvalidSpec(_))));
    }

    #[test]
    fn test_mermaid_label_strips_syntax() {
        assert_eq!(mermaid_label("login: <b>process</b>;"), "login bprocessb");
        assert_eq!(mermaid_label("  a   b  "), "a b");
    }
}
