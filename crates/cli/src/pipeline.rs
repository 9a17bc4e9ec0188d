//! One chat request in, one exported deck out.

use crate::export::{Artifacts, Exporter};
use chrono::Utc;
use deck_core::llm::{complete_with_timeout, intent_prompt};
use deck_core::{
    CancelToken, ChatRequest, Deck, DocumentBuilder, IntentExtractor, LlmCompleter, LlmOutput,
    LlmProvider, PipelineConfig, Result, Sanitizer, WorkDir,
};
use deck_render::{RenderSummary, Renderer};
use std::sync::Arc;
use uuid::Uuid;

/// Result of a successful run.
#[derive(Debug)]
pub struct PipelineOutput {
    pub request_id: Uuid,
    pub deck: Deck,
    pub artifacts: Artifacts,
    pub render: RenderSummary,
    /// Whether the intent came from an LLM response.
    pub used_llm: bool,
}

/// The request pipeline: sanitize, extract, build, render, export.
///
/// Holds only read-only configuration, so one pipeline can serve
/// concurrent requests. Each run writes into its own request directory.
pub struct Pipeline {
    config: PipelineConfig,
    work_dir: WorkDir,
    sanitizer: Sanitizer,
    extractor: IntentExtractor,
    builder: DocumentBuilder,
    renderer: Renderer,
    exporter: Exporter,
    completer: Option<Arc<dyn LlmCompleter>>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, work_dir: WorkDir) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            sanitizer: Sanitizer::from_config(&config),
            extractor: IntentExtractor::new(&config)?,
            builder: DocumentBuilder::from_config(&config),
            renderer: Renderer::new(config.render.clone()),
            exporter: Exporter::new(),
            completer: None,
            config,
            work_dir,
        })
    }

    /// Consult `completer` for requests naming its provider.
    pub fn with_completer(mut self, completer: Arc<dyn LlmCompleter>) -> Self {
        self.completer = Some(completer);
        self
    }

    pub fn with_renderer(mut self, renderer: Renderer) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn run(&self, request: &ChatRequest, cancel: &CancelToken) -> Result<PipelineOutput> {
        request.validate()?;
        let received_at = Utc::now();
        let message = self.sanitizer.sanitize(&request.message)?;

        let llm_output = self.consult_llm(request.llm_provider, &message);
        cancel.check()?;

        let intent = self.extractor.extract(
            &request.message,
            llm_output.as_ref(),
            request.llm_provider,
            received_at,
        )?;
        log::info!(
            "Extracted intent: topic={:?}, template={}, {} visual(s)",
            intent.topic,
            intent.template.as_str(),
            intent.visual_requests.len()
        );

        let mut deck = self.builder.build(&intent)?;
        cancel.check()?;

        let request_id = Uuid::new_v4();
        let dir = self.work_dir.request_dir(request_id)?;
        let render = self.renderer.render_deck(&mut deck, dir.path(), cancel)?;
        if render.fallbacks > 0 {
            log::warn!("{} visual(s) replaced by placeholders", render.fallbacks);
        }
        cancel.check()?;

        let artifacts = self.exporter.export(&deck, &dir)?;
        Ok(PipelineOutput {
            request_id,
            deck,
            artifacts,
            render,
            used_llm: llm_output.is_some(),
        })
    }

    /// Ask the collaborator for structured intent. Any failure is logged and
    /// yields `None`, leaving extraction to the offline rules.
    fn consult_llm(&self, provider: LlmProvider, message: &str) -> Option<LlmOutput> {
        if provider == LlmProvider::Offline {
            return None;
        }
        let completer = match &self.completer {
            Some(completer) if completer.provider() == provider => Arc::clone(completer),
            _ => {
                log::warn!(
                    "No {} client configured, extracting intent offline",
                    provider.as_str()
                );
                return None;
            }
        };

        match complete_with_timeout(
            completer,
            intent_prompt(message),
            self.config.llm_timeout(),
            self.config.max_llm_response_chars,
        ) {
            Ok(output) => {
                log::debug!("Received {} characters from {}", output.len(), provider.as_str());
                Some(output)
            }
            Err(e) => {
                log::warn!("LLM call failed, extracting intent offline: {}", e);
                None
            }
        }
    }
}
