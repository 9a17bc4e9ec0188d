//! Intent extraction.
//!
//! Turns a chat message, plus an optional LLM response, into a validated
//! [`Intent`]. The LLM response is treated as untrusted data: every field it
//! provides is re-checked with the same rules as offline extraction, and
//! anything unusable falls back to the rule-based result.

use crate::config::{ExtractionRules, PipelineConfig};
use crate::error::{Error, Result};
use crate::llm::{LlmOutput, LlmProvider};
use crate::sanitize::Sanitizer;
use crate::types::{Intent, RawSource, Template, VisualKind, VisualRequest};
use crate::visual::{ChartKind, DiagramKind};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashMap};
use std::sync::LazyLock;

/// Topic used when the message names none.
pub const DEFAULT_TOPIC: &str = "Untitled Presentation";

/// "Generate a pitch deck for X" and similar lead-ins.
static REQUEST_LEAD_IN_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:please\s+)?(?:(?:can|could|would)\s+you\s+)?(?:generate|create|make|build|prepare|write|draft|design|produce|give\s+me|i\s+need)\b.*?\b(?:for|about|on|covering)\s+(.+)$",
    )
    .unwrap()
});

/// "A deck about X" without a verb.
static DECK_NOUN_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:an?\s+|the\s+)?(?:[\w-]+\s+)?(?:deck|presentation|slides?|slideshow|talk)\s+(?:for|about|on|covering)\s+(.+)$",
    )
    .unwrap()
});

/// Subject following a visual keyword: "... of login process".
static SUBJECT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(?:of|for|showing|about|on|covering|describing)\s+(?:the\s+|an?\s+|our\s+)?(.+?)\s*$",
    )
    .unwrap()
});

/// Words that join a marker value to the next request.
const CONNECTOR_WORDS: &[&str] = &[
    "a", "an", "the", "and", "with", "plus", "also", "including", "include", "add",
];

/// Which intent field a marker fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MarkerField {
    Audience,
    Context,
    KeyMessage,
    Template,
}

/// Fields recovered from `key: value` markers.
#[derive(Debug, Default)]
struct Markers {
    audience: Option<String>,
    context: Option<String>,
    key_message: Option<String>,
    template: Option<String>,
}

impl Markers {
    fn slot(&mut self, field: MarkerField) -> &mut Option<String> {
        match field {
            MarkerField::Audience => &mut self.audience,
            MarkerField::Context => &mut self.context,
            MarkerField::KeyMessage => &mut self.key_message,
            MarkerField::Template => &mut self.template,
        }
    }
}

/// Build a case-insensitive, word-bounded alternation of keywords.
fn keyword_regex(words: &[String]) -> Result<Option<Regex>> {
    let mut words: Vec<String> = words
        .iter()
        .map(|w| w.trim().to_lowercase())
        .filter(|w| !w.is_empty())
        .collect();
    if words.is_empty() {
        return Ok(None);
    }
    // Longest first so that "key message" wins over a shorter overlap.
    words.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    let alternation = words
        .iter()
        .map(|w| regex::escape(w).replace(' ', r"\s+"))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"(?i)\b(?:{})\b", alternation))
        .map(Some)
        .map_err(|e| Error::Config(format!("invalid keyword: {}", e)))
}

fn normalize_keyword(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Strip surrounding punctuation and quotes from an extracted value.
fn trim_value(text: &str) -> &str {
    text.trim()
        .trim_matches(|c: char| matches!(c, '"' | '\'' | '`' | '“' | '”'))
        .trim_end_matches(['.', '!', '?', ':'])
        .trim()
}

/// Drop filler words left between a marker value and a following request,
/// as in "audience: investors with a sequence diagram".
fn trim_connectors(text: &str) -> &str {
    let mut text = text.trim_end();
    loop {
        let Some((head, last)) = text.rsplit_once(char::is_whitespace) else {
            return text;
        };
        let word = last.to_lowercase();
        if !CONNECTOR_WORDS.contains(&word.as_str()) {
            return text;
        }
        text = head.trim_end();
    }
}

/// Rule-based and LLM-assisted intent extractor.
#[derive(Debug, Clone)]
pub struct IntentExtractor {
    sanitizer: Sanitizer,
    max_field_chars: usize,
    marker_regex: Regex,
    marker_fields: HashMap<String, MarkerField>,
    visual_patterns: Vec<(VisualKind, Regex)>,
    generic_chart: Option<Regex>,
}

impl IntentExtractor {
    /// Compile the extractor from configuration.
    pub fn new(config: &PipelineConfig) -> Result<Self> {
        Self::with_rules(Sanitizer::from_config(config), &config.extraction)
    }

    /// Compile the extractor from explicit parts.
    pub fn with_rules(sanitizer: Sanitizer, rules: &ExtractionRules) -> Result<Self> {
        let mut marker_fields = HashMap::new();
        for (words, field) in [
            (&rules.markers.audience, MarkerField::Audience),
            (&rules.markers.context, MarkerField::Context),
            (&rules.markers.key_message, MarkerField::KeyMessage),
            (&rules.markers.template, MarkerField::Template),
        ] {
            for word in words {
                marker_fields
                    .entry(normalize_keyword(word))
                    .or_insert(field);
            }
        }
        marker_fields.remove("");

        let mut keys: Vec<&String> = marker_fields.keys().collect();
        keys.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        let alternation = keys
            .iter()
            .map(|w| regex::escape(w).replace(' ', r"\s+"))
            .collect::<Vec<_>>()
            .join("|");
        let marker_regex = Regex::new(&format!(r"(?i)\b({})\s*:\s*", alternation))
            .map_err(|e| Error::Config(format!("invalid marker keyword: {}", e)))?;

        let mut visual_patterns = Vec::new();
        for (kind, words) in [
            (VisualKind::Diagram(DiagramKind::Sequence), &rules.visuals.sequence_diagram),
            (VisualKind::Diagram(DiagramKind::Flowchart), &rules.visuals.flowchart),
            (VisualKind::Chart(ChartKind::Bar), &rules.visuals.bar_chart),
            (VisualKind::Chart(ChartKind::Line), &rules.visuals.line_chart),
            (VisualKind::Chart(ChartKind::Pie), &rules.visuals.pie_chart),
        ] {
            if let Some(regex) = keyword_regex(words)? {
                visual_patterns.push((kind, regex));
            }
        }

        Ok(Self {
            sanitizer,
            max_field_chars: rules.max_field_chars,
            marker_regex,
            marker_fields,
            visual_patterns,
            generic_chart: keyword_regex(&rules.visuals.generic_chart)?,
        })
    }

    /// Extract an intent.
    ///
    /// With a usable LLM response its fields win after re-validation;
    /// otherwise the rule-based result is returned. Fails only when the
    /// message is empty after sanitization (or too large to sanitize).
    pub fn extract(
        &self,
        message: &str,
        llm_response: Option<&LlmOutput>,
        provider: LlmProvider,
        received_at: DateTime<Utc>,
    ) -> Result<Intent> {
        let message = self.sanitizer.sanitize(message)?;
        if message.trim().is_empty() {
            return Err(Error::IntentExtractionFailed(
                "message is empty after removing unsafe content".into(),
            ));
        }

        let raw_source = RawSource {
            message: message.clone(),
            llm_provider: provider,
            received_at,
        };
        let offline = self.extract_offline(&message, raw_source);

        match llm_response.map(|output| (output, output.json_object())) {
            Some((_, Some(map))) => {
                log::debug!("Using structured LLM response for intent");
                Ok(self.merge_llm_fields(&map, offline))
            }
            Some((output, None)) => {
                log::warn!(
                    "LLM response ({} characters) is not a JSON object, using offline extraction",
                    output.len()
                );
                Ok(offline)
            }
            None => Ok(offline),
        }
    }

    /// Deterministic rule-based extraction on a sanitized message.
    fn extract_offline(&self, message: &str, raw_source: RawSource) -> Intent {
        let flattened = message.replace('\n', ", ");
        let (markers, remainder) = self.take_markers(&flattened);

        // Visuals may be named anywhere, marker values included.
        let visual_requests: BTreeSet<VisualRequest> = flattened
            .split([',', ';'])
            .flat_map(|clause| self.detect_visuals(clause.trim()))
            .collect();
        let plain_clauses: Vec<&str> = remainder
            .split([',', ';'])
            .map(str::trim)
            .filter(|clause| !clause.is_empty() && *clause != self.sanitizer.code_placeholder())
            .filter(|clause| self.detect_visuals(clause).is_empty())
            .collect();

        let topic = plain_clauses
            .first()
            .map(|clause| self.topic_from_clause(clause))
            .filter(|topic| !topic.is_empty())
            .unwrap_or_else(|| DEFAULT_TOPIC.to_string());

        let context = markers.context.clone().or_else(|| {
            let rest: Vec<&str> = plain_clauses.iter().skip(1).copied().collect();
            self.field(&rest.join(", "))
        });

        let mut intent = Intent::new(topic, raw_source);
        intent.audience = markers.audience.as_deref().and_then(|v| self.field(v));
        intent.context = context;
        intent.key_message = markers.key_message.as_deref().and_then(|v| self.field(v));
        intent.template = markers
            .template
            .as_deref()
            .map(Template::from_name)
            .unwrap_or_default();
        intent.visual_requests = visual_requests;
        intent
    }

    /// Pull `key: value` markers out of the text.
    ///
    /// A value ends at the next marker, at a clause separator or where a
    /// visual request starts. The returned remainder has every marker and
    /// its value replaced by a clause separator.
    fn take_markers(&self, text: &str) -> (Markers, String) {
        let keys: Vec<(usize, usize, String)> = self
            .marker_regex
            .captures_iter(text)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                Some((whole.start(), whole.end(), normalize_keyword(&caps[1])))
            })
            .collect();

        let mut markers = Markers::default();
        let mut remainder = String::with_capacity(text.len());
        let mut cursor = 0;
        for (idx, (start, value_start, key)) in keys.iter().enumerate() {
            let region_end = keys.get(idx + 1).map_or(text.len(), |next| next.0);
            let region = &text[*value_start..region_end];
            let cut = self.value_end(region);

            let value = trim_value(trim_connectors(&region[..cut]));
            if let Some(field) = self.marker_fields.get(key) {
                let slot = markers.slot(*field);
                if slot.is_none() && !value.is_empty() {
                    *slot = Some(value.to_string());
                }
            }

            remainder.push_str(&text[cursor..*start]);
            remainder.push(',');
            cursor = value_start + cut;
        }
        remainder.push_str(&text[cursor..]);
        (markers, remainder)
    }

    /// Length of a marker value at the start of `region`.
    fn value_end(&self, region: &str) -> usize {
        let separator = region.find([',', ';', '\n']).unwrap_or(region.len());
        self.visual_patterns
            .iter()
            .map(|(_, regex)| regex)
            .chain(self.generic_chart.as_ref())
            .filter_map(|regex| regex.find(&region[..separator]))
            .map(|found| found.start())
            .min()
            .unwrap_or(separator)
    }

    /// Visual requests named in one clause.
    fn detect_visuals(&self, clause: &str) -> Vec<VisualRequest> {
        let mut requests = Vec::new();
        for (kind, regex) in &self.visual_patterns {
            if let Some(found) = regex.find(clause) {
                requests.push(VisualRequest::new(
                    *kind,
                    self.subject_after(&clause[found.end()..]),
                ));
            }
        }
        if requests.is_empty() {
            if let Some(found) = self.generic_chart.as_ref().and_then(|r| r.find(clause)) {
                requests.push(VisualRequest::new(
                    VisualKind::Chart(ChartKind::Bar),
                    self.subject_after(&clause[found.end()..]),
                ));
            }
        }
        requests
    }

    fn subject_after(&self, tail: &str) -> Option<String> {
        SUBJECT_REGEX
            .captures(tail)
            .and_then(|caps| self.field(trim_value(&caps[1])))
    }

    fn topic_from_clause(&self, clause: &str) -> String {
        let topic = REQUEST_LEAD_IN_REGEX
            .captures(clause)
            .or_else(|| DECK_NOUN_REGEX.captures(clause))
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
            .unwrap_or(clause);
        self.field(trim_value(topic)).unwrap_or_default()
    }

    /// Normalize a single field value; `None` when nothing usable remains.
    fn field(&self, value: &str) -> Option<String> {
        let cleaned = self.sanitizer.sanitize_field(value, self.max_field_chars);
        (!cleaned.is_empty()).then_some(cleaned)
    }

    /// Overlay validated LLM fields onto the offline result.
    fn merge_llm_fields(&self, map: &Map<String, Value>, offline: Intent) -> Intent {
        let mut intent = offline;
        let text = |key: &str| -> Option<String> {
            match map.get(key) {
                Some(Value::String(s)) => self.field(s),
                Some(Value::Null) | None => None,
                Some(_) => {
                    log::warn!("Ignoring LLM field '{}' with unexpected type", key);
                    None
                }
            }
        };

        if let Some(topic) = text("topic") {
            intent.topic = topic;
        }
        if let Some(audience) = text("audience") {
            intent.audience = Some(audience);
        }
        if let Some(context) = text("context") {
            intent.context = Some(context);
        }
        if let Some(key_message) = text("key_message") {
            intent.key_message = Some(key_message);
        }
        if let Some(template) = text("template") {
            intent.template = Template::from_name(&template);
        }
        if let Some(Value::Array(items)) = map.get("visual_requests") {
            intent.visual_requests = items
                .iter()
                .filter_map(|item| self.visual_from_value(item))
                .collect();
        }
        intent
    }

    /// Decode one LLM visual request: a phrase or `{type, kind, subject}`.
    fn visual_from_value(&self, value: &Value) -> Option<VisualRequest> {
        match value {
            Value::String(phrase) => {
                let phrase = self.field(phrase)?;
                self.detect_visuals(&phrase).into_iter().next()
            }
            Value::Object(obj) => {
                let get = |key: &str| obj.get(key).and_then(Value::as_str).map(str::to_lowercase);
                let kind_name = get("kind").unwrap_or_default();
                let kind = match get("type").as_deref() {
                    Some("diagram") => match kind_name.as_str() {
                        "sequence" | "sequencediagram" => VisualKind::Diagram(DiagramKind::Sequence),
                        "flowchart" | "flow" | "graph" => VisualKind::Diagram(DiagramKind::Flowchart),
                        _ => return None,
                    },
                    Some("chart") => VisualKind::Chart(ChartKind::from_mark(&kind_name)?),
                    _ => return None,
                };
                let subject = obj
                    .get("subject")
                    .and_then(Value::as_str)
                    .and_then(|s| self.field(s));
                Some(VisualRequest::new(kind, subject))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn extractor() -> IntentExtractor {
        IntentExtractor::new(&PipelineConfig::default()).unwrap()
    }

    fn offline(message: &str) -> Result<Intent> {
        extractor().extract(message, None, LlmProvider::Offline, Utc::now())
    }

    #[test]
    fn test_pitch_deck_scenario() {
        let intent = offline(
            "Generate a pitch deck for AI cybersecurity, audience: investors, template: corporate, include a sequence diagram of login process",
        )
        .unwrap();

        assert_eq!(intent.topic, "AI cybersecurity");
        assert_eq!(intent.audience.as_deref(), Some("investors"));
        assert_eq!(intent.template, Template::Corporate);
        assert_eq!(intent.context, None);
        assert_eq!(
            intent.visual_requests.into_iter().collect::<Vec<_>>(),
            vec![VisualRequest::new(
                VisualKind::Diagram(DiagramKind::Sequence),
                Some("login process".to_string())
            )]
        );
    }

    #[test]
    fn test_markers_without_commas() {
        let intent = offline(
            "Generate a pitch deck for AI cybersecurity audience: investors template: corporate",
        )
        .unwrap();
        assert_eq!(intent.topic, "AI cybersecurity");
        assert_eq!(intent.audience.as_deref(), Some("investors"));
        assert_eq!(intent.template, Template::Corporate);
    }

    #[test]
    fn test_visual_after_marker_value() {
        let intent = offline(
            "Generate a pitch deck for AI cybersecurity, audience: investors with a sequence diagram of login process",
        )
        .unwrap();
        assert_eq!(intent.audience.as_deref(), Some("investors"));
        assert_eq!(
            intent.visual_requests.into_iter().collect::<Vec<_>>(),
            vec![VisualRequest::new(
                VisualKind::Diagram(DiagramKind::Sequence),
                Some("login process".to_string())
            )]
        );
    }

    #[test]
    fn test_trim_connectors() {
        assert_eq!(trim_connectors("investors with a"), "investors");
        assert_eq!(trim_connectors("sales and marketing"), "sales and marketing");
        assert_eq!(trim_connectors("with"), "with");
    }

    #[test]
    fn test_all_markers() {
        let intent = offline(
            "Create a presentation about remote work. Audience: Executives; context: board meeting, key message: Adopt hybrid now.",
        )
        .unwrap();
        assert_eq!(intent.topic, "remote work");
        assert_eq!(intent.audience.as_deref(), Some("Executives"));
        assert_eq!(intent.context.as_deref(), Some("board meeting"));
        assert_eq!(intent.key_message.as_deref(), Some("Adopt hybrid now"));
        assert_eq!(intent.template, Template::Minimal);
    }

    #[test]
    fn test_unknown_template_defaults_to_minimal() {
        let intent = offline("Deck about rust, template: holographic").unwrap();
        assert_eq!(intent.template, Template::Minimal);
        assert_eq!(intent.topic, "rust");
    }

    #[test]
    fn test_visual_keywords() {
        let intent = offline(
            "Slides on Q3 results, add a pie chart of revenue by region, also a flowchart for the hiring process",
        )
        .unwrap();
        let kinds: Vec<VisualKind> = intent.visual_requests.iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            vec![
                VisualKind::Diagram(DiagramKind::Flowchart),
                VisualKind::Chart(ChartKind::Pie)
            ]
        );
        let pie = intent
            .visual_requests
            .iter()
            .find(|r| r.kind == VisualKind::Chart(ChartKind::Pie))
            .unwrap();
        assert_eq!(pie.subject.as_deref(), Some("revenue by region"));
    }

    #[test]
    fn test_generic_chart_is_bar() {
        let intent = offline("Deck about sales, include a chart").unwrap();
        let kinds: Vec<VisualKind> = intent.visual_requests.iter().map(|r| r.kind).collect();
        assert_eq!(kinds, vec![VisualKind::Chart(ChartKind::Bar)]);
    }

    #[test]
    fn test_word_boundaries() {
        let intent = offline("A talk about the charter school paragraph style").unwrap();
        assert!(intent.visual_requests.is_empty());
    }

    #[test]
    fn test_extra_clauses_become_context() {
        let intent = offline("Make a deck on Rust adoption, focusing on memory safety").unwrap();
        assert_eq!(intent.topic, "Rust adoption");
        assert_eq!(intent.context.as_deref(), Some("focusing on memory safety"));
    }

    #[test]
    fn test_markers_only_gets_default_topic() {
        let intent = offline("audience: engineers").unwrap();
        assert_eq!(intent.topic, DEFAULT_TOPIC);
        assert_eq!(intent.audience.as_deref(), Some("engineers"));
    }

    #[test]
    fn test_empty_message_fails() {
        assert!(matches!(offline("   "), Err(Error::IntentExtractionFailed(_))));
        assert!(matches!(
            offline("<script>alert(1)</script>"),
            Err(Error::IntentExtractionFailed(_))
        ));
    }

    #[test]
    fn test_executable_block_not_in_intent() {
        let intent = offline("Deck about DevOps\n```sh\nrm -rf ~\n```").unwrap();
        assert_eq!(intent.topic, "DevOps");
        assert!(!intent.raw_source.message.contains("rm -rf"));
        assert_eq!(intent.context, None);
    }

    #[test]
    fn test_llm_json_overrides_fields() {
        let response = LlmOutput::Json(json!({
            "topic": "AI Cybersecurity Pitch",
            "audience": "<b>Investors</b><script>x()</script>",
            "template": "bold",
            "visual_requests": [
                {"type": "chart", "kind": "line", "subject": "ARR growth"},
                "sequence diagram of login",
                {"type": "hologram"}
            ],
            "unexpected": 42
        }));
        let intent = extractor()
            .extract("deck for ai security", Some(&response), LlmProvider::Gemini, Utc::now())
            .unwrap();
        assert_eq!(intent.topic, "AI Cybersecurity Pitch");
        assert_eq!(intent.audience.as_deref(), Some("<b>Investors</b>"));
        assert_eq!(intent.template, Template::Bold);
        assert_eq!(intent.raw_source.llm_provider, LlmProvider::Gemini);
        assert_eq!(intent.visual_requests.len(), 2);
        assert!(intent.visual_requests.contains(&VisualRequest::new(
            VisualKind::Chart(ChartKind::Line),
            Some("ARR growth".into())
        )));
    }

    #[test]
    fn test_llm_wrong_types_fall_back_per_field() {
        let response = LlmOutput::Json(json!({
            "topic": 17,
            "audience": ["a"],
            "template": null
        }));
        let intent = extractor()
            .extract(
                "Deck about cloud costs, audience: CFOs, template: corporate",
                Some(&response),
                LlmProvider::OpenAi,
                Utc::now(),
            )
            .unwrap();
        assert_eq!(intent.topic, "cloud costs");
        assert_eq!(intent.audience.as_deref(), Some("CFOs"));
        assert_eq!(intent.template, Template::Corporate);
    }

    #[test]
    fn test_llm_text_unparseable_falls_back() {
        let response = LlmOutput::Text("Sorry, I can't help with that.".into());
        let intent = extractor()
            .extract("Deck about tides", Some(&response), LlmProvider::OpenAi, Utc::now())
            .unwrap();
        assert_eq!(intent.topic, "tides");
    }

    #[test]
    fn test_llm_without_visuals_keeps_detected() {
        let response = LlmOutput::Text("```json\n{\"topic\": \"Tides\"}\n```".into());
        let intent = extractor()
            .extract(
                "Deck about tides, with a line chart",
                Some(&response),
                LlmProvider::OpenAi,
                Utc::now(),
            )
            .unwrap();
        assert_eq!(intent.topic, "Tides");
        assert_eq!(intent.visual_requests.len(), 1);
    }

    #[test]
    fn test_custom_keywords() {
        let mut config = PipelineConfig::default();
        config.extraction.markers.audience = vec!["for whom".into()];
        config.extraction.visuals.pie_chart = vec!["donut".into()];
        let extractor = IntentExtractor::new(&config).unwrap();
        let intent = extractor
            .extract(
                "Deck about budgets, for whom: finance, add a donut",
                None,
                LlmProvider::Offline,
                Utc::now(),
            )
            .unwrap();
        assert_eq!(intent.audience.as_deref(), Some("finance"));
        assert!(intent
            .visual_requests
            .iter()
            .any(|r| r.kind == VisualKind::Chart(ChartKind::Pie)));
    }
}
