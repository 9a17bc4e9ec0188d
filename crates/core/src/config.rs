//! Pipeline configuration.
//!
//! Loaded from an optional TOML file; every field has a default. The
//! resolved value is passed explicitly into each stage.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Smallest deck the builder can produce: title, hook, conclusion.
pub const MIN_SLIDES: usize = 3;

/// Top-level configuration shared read-only by every request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Upper bound on slides per deck.
    pub max_slides: usize,

    /// Longest chat message accepted, in characters.
    pub max_input_chars: usize,

    /// Longest LLM response accepted, in characters.
    pub max_llm_response_chars: usize,

    /// How long to wait for the LLM collaborator.
    pub llm_timeout_secs: u64,

    pub render: RenderSettings,
    pub sanitizer: SanitizerRules,
    pub extraction: ExtractionRules,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_slides: 8,
            max_input_chars: 8192,
            max_llm_response_chars: 10_000,
            llm_timeout_secs: 60,
            render: RenderSettings::default(),
            sanitizer: SanitizerRules::default(),
            extraction: ExtractionRules::default(),
        }
    }
}

impl PipelineConfig {
    /// Load a configuration file, then validate it.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    /// Parse TOML text, then validate it.
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| Error::Config(format!("invalid TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the pipeline cannot honor.
    pub fn validate(&self) -> Result<()> {
        if self.max_slides < MIN_SLIDES {
            return Err(Error::Config(format!(
                "max_slides must be at least {}, got {}",
                MIN_SLIDES, self.max_slides
            )));
        }
        if self.max_input_chars == 0 {
            return Err(Error::Config("max_input_chars must be positive".into()));
        }
        if self.llm_timeout_secs == 0 {
            return Err(Error::Config("llm_timeout_secs must be positive".into()));
        }
        if self.render.width < 64 || self.render.height < 64 {
            return Err(Error::Config(format!(
                "render size {}x{} is too small",
                self.render.width, self.render.height
            )));
        }
        if self.render.max_chart_points == 0 || self.render.max_diagram_lines == 0 {
            return Err(Error::Config("render limits must be positive".into()));
        }
        if self.extraction.max_field_chars == 0 {
            return Err(Error::Config("max_field_chars must be positive".into()));
        }
        if self.extraction.markers.audience.is_empty()
            || self.extraction.markers.context.is_empty()
            || self.extraction.markers.key_message.is_empty()
            || self.extraction.markers.template.is_empty()
        {
            return Err(Error::Config("every intent marker needs a keyword".into()));
        }
        Ok(())
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm_timeout_secs)
    }
}

/// Raster output settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    pub width: u32,
    pub height: u32,

    /// Charts with more rows are rejected and replaced by the placeholder.
    pub max_chart_points: usize,

    /// Diagram sources with more lines are rejected.
    pub max_diagram_lines: usize,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            max_chart_points: 50,
            max_diagram_lines: 20,
        }
    }
}

/// What the sanitizer lets through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SanitizerRules {
    /// HTML tags kept (with attributes stripped). Everything else is removed.
    pub allowed_tags: Vec<String>,

    /// Fence labels that mark a code block as executable.
    pub executable_languages: Vec<String>,

    /// Text substituted for a removed executable block.
    pub code_placeholder: String,
}

impl Default for SanitizerRules {
    fn default() -> Self {
        Self {
            allowed_tags: ["b", "i", "em", "strong"]
                .into_iter()
                .map(String::from)
                .collect(),
            executable_languages: [
                "python", "py", "python3", "sh", "bash", "shell", "zsh", "fish", "console",
                "powershell", "ps1", "pwsh", "bat", "cmd", "batch", "javascript", "js", "node",
                "typescript", "ts", "ruby", "rb", "perl", "pl", "php", "lua", "r", "sql",
                "applescript", "vbscript", "vbs",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            code_placeholder: "[code block removed]".to_string(),
        }
    }
}

/// Keyword markers recognized in offline extraction (`key: value`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkerKeywords {
    pub audience: Vec<String>,
    pub context: Vec<String>,
    pub key_message: Vec<String>,
    pub template: Vec<String>,
}

impl Default for MarkerKeywords {
    fn default() -> Self {
        fn words(list: &[&str]) -> Vec<String> {
            list.iter().map(|s| s.to_string()).collect()
        }
        Self {
            audience: words(&["audience"]),
            context: words(&["context", "setting", "event"]),
            key_message: words(&["key message", "cta", "call to action"]),
            template: words(&["template", "theme"]),
        }
    }
}

/// Phrases that request a particular visual.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisualKeywords {
    pub sequence_diagram: Vec<String>,
    pub flowchart: Vec<String>,
    pub bar_chart: Vec<String>,
    pub line_chart: Vec<String>,
    pub pie_chart: Vec<String>,

    /// Generic chart words; map to a bar chart when no specific chart matched.
    pub generic_chart: Vec<String>,
}

impl Default for VisualKeywords {
    fn default() -> Self {
        fn words(list: &[&str]) -> Vec<String> {
            list.iter().map(|s| s.to_string()).collect()
        }
        Self {
            sequence_diagram: words(&["sequence diagram", "sequencediagram"]),
            flowchart: words(&["flowchart", "flow chart", "flow diagram", "process diagram"]),
            bar_chart: words(&["bar chart", "bar graph", "column chart"]),
            line_chart: words(&["line chart", "line graph", "trend chart"]),
            pie_chart: words(&["pie chart", "donut chart"]),
            generic_chart: words(&["chart", "graph"]),
        }
    }
}

/// Offline extraction keyword sets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionRules {
    pub markers: MarkerKeywords,
    pub visuals: VisualKeywords,

    /// Longest accepted field value, in characters. Longer values are cut.
    pub max_field_chars: usize,
}

impl Default for ExtractionRules {
    fn default() -> Self {
        Self {
            markers: MarkerKeywords::default(),
            visuals: VisualKeywords::default(),
            max_field_chars: 200,
        }
    }
}
