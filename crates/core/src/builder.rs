//! Document builder: `Intent -> Deck`.
//!
//! Building is a pure function of the intent. Slides are laid out as
//! title, optional agenda, the story-arc stages, the requested visuals,
//! then the conclusion. When the deck would exceed the slide cap, optional
//! slides are dropped in a fixed priority order.

use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::types::{
    ContentBlock, Deck, Intent, Slide, SlideKind, StoryStage, VisualKind, VisualRequest,
};
use crate::visual::{ChartSpec, DiagramKind, DiagramSpec};

/// Diagrams with more edges than this get a note suggesting a split.
const BUSY_DIAGRAM_EDGES: usize = 10;

/// Audience engagement cue appended to each slide's speaker notes.
fn engagement(notes: impl Into<String>, technique: &str) -> String {
    format!("{} Engagement: {}", notes.into(), technique)
}

/// Speaking tone and visual style suited to an audience.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tone {
    pub voice: &'static str,
    pub style: &'static str,
}

impl Tone {
    /// Derive the tone from a free-form audience description.
    pub fn for_audience(audience: Option<&str>) -> Self {
        let audience = audience.unwrap_or_default().to_lowercase();
        let tone = |voice, style| Self { voice, style };
        if audience.contains("executive") || audience.contains("board") {
            tone("Formal", "Clean & minimal")
        } else if audience.contains("investor") {
            tone("Investor-facing", "Clean & minimal")
        } else if audience.contains("sales") {
            tone("Energetic", "Bold & colorful")
        } else if audience.contains("developer") || audience.contains("engineer") {
            tone("Technical", "Data-driven")
        } else if audience.contains("training") || audience.contains("onboarding") {
            tone("Energetic", "Visual-first")
        } else {
            tone("Professional", "Clean & minimal")
        }
    }
}

/// Builds decks from intents.
#[derive(Debug, Clone)]
pub struct DocumentBuilder {
    max_slides: usize,
}

impl DocumentBuilder {
    /// Create a builder with a slide cap.
    pub fn new(max_slides: usize) -> Self {
        Self { max_slides }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.max_slides)
    }

    /// Build the deck for an intent.
    ///
    /// Fails with [`Error::BuildInvariantViolation`] only if the result
    /// breaks a structural invariant, which indicates a bug.
    pub fn build(&self, intent: &Intent) -> Result<Deck> {
        let tone = Tone::for_audience(intent.audience.as_deref());
        let topic = intent.topic.as_str();

        let mut optional_stages: Vec<Slide> = Vec::new();
        if let Some(context) = &intent.context {
            optional_stages.push(problem_slide(topic, context, tone));
        }
        if let Some(key_message) = &intent.key_message {
            optional_stages.push(solution_slide(intent, key_message, tone));
        }
        let mut visuals: Vec<Slide> = intent
            .visual_requests
            .iter()
            .map(|request| visual_slide(topic, request))
            .collect();

        // Hook and conclusion always count as sections.
        let sections = 2 + optional_stages.len() + visuals.len();
        let mut with_agenda = sections > 2;
        let total =
            |agenda: bool, stages: usize, visuals: usize| 3 + agenda as usize + stages + visuals;

        // Visuals go from the end, so the first two outlive the rest.
        while total(with_agenda, optional_stages.len(), visuals.len()) > self.max_slides {
            if with_agenda {
                log::warn!("Dropping agenda to stay within {} slides", self.max_slides);
                with_agenda = false;
            } else if let Some(slide) = visuals.pop() {
                log::warn!(
                    "Dropping visual slide '{}' to stay within {} slides",
                    slide.heading,
                    self.max_slides
                );
            } else if let Some(slide) = optional_stages.pop() {
                log::warn!(
                    "Dropping {} slide to stay within {} slides",
                    slide.stage.map(|s| s.label()).unwrap_or("optional"),
                    self.max_slides
                );
            } else {
                break;
            }
        }

        let hook = hook_slide(intent, tone);
        let conclusion = conclusion_slide(intent, tone);

        let mut deck = Deck::new(topic, intent.template, intent.raw_source.received_at);
        deck.tone = tone.voice.to_string();
        deck.add_slide(title_slide(intent, tone));
        if with_agenda {
            let sections: Vec<&str> = std::iter::once(&hook)
                .chain(optional_stages.iter())
                .chain(visuals.iter())
                .chain(std::iter::once(&conclusion))
                .map(|slide| slide.heading.as_str())
                .collect();
            deck.add_slide(agenda_slide(&sections));
        }
        deck.add_slide(hook);
        optional_stages.into_iter().for_each(|s| deck.add_slide(s));
        visuals.into_iter().for_each(|s| deck.add_slide(s));
        deck.add_slide(conclusion);

        if let Err(reason) = deck.check(self.max_slides) {
            log::error!(
                "Built deck '{}' breaks an invariant: {} ({} slides, cap {}, {} visual requests)",
                deck.title,
                reason,
                deck.slides.len(),
                self.max_slides,
                intent.visual_requests.len()
            );
            return Err(Error::BuildInvariantViolation(reason));
        }

        log::debug!(
            "Built deck '{}' with {} slides ({} template)",
            deck.title,
            deck.slides.len(),
            deck.template.as_str()
        );
        Ok(deck)
    }
}

fn title_slide(intent: &Intent, tone: Tone) -> Slide {
    let mut slide = Slide::new(SlideKind::Title, &intent.topic);
    if let Some(key_message) = &intent.key_message {
        slide = slide.with_block(ContentBlock::text(key_message));
    }
    if let Some(audience) = &intent.audience {
        slide = slide.with_block(ContentBlock::text(format!("Prepared for {}", audience)));
    }
    slide.with_notes(engagement(
        format!(
            "Introduce {}. Tone: {}. Style: {}.",
            intent.topic, tone.voice, tone.style
        ),
        "make eye contact and pause before the first slide.",
    ))
}

fn agenda_slide(sections: &[&str]) -> Slide {
    Slide::new(SlideKind::Agenda, "Agenda")
        .with_block(ContentBlock::bullets(sections.iter().copied()))
        .with_notes(engagement(
            "Walk through what the audience will see.",
            "ask which section matters most to them.",
        ))
}

fn hook_slide(intent: &Intent, tone: Tone) -> Slide {
    let topic = &intent.topic;
    let who = intent.audience.as_deref().unwrap_or("your team");
    Slide::new(SlideKind::Content, format!("Why {} matters", topic))
        .with_stage(StoryStage::Hook)
        .with_block(ContentBlock::bullets([
            format!("{} is reshaping how {} work", topic, who),
            "The cost of waiting keeps growing".to_string(),
            "Early movers set the standard".to_string(),
        ]))
        .with_notes(engagement(
            format!(
                "Open strong and make the stakes concrete for {}. Keep it {}.",
                who,
                tone.voice.to_lowercase()
            ),
            "open with a question or a quick show of hands.",
        ))
}

fn problem_slide(topic: &str, context: &str, tone: Tone) -> Slide {
    Slide::new(SlideKind::Content, "The challenge")
        .with_stage(StoryStage::Problem)
        .with_block(ContentBlock::text(context))
        .with_block(ContentBlock::bullets([
            format!("Current approaches to {} fall short", topic),
            "Gaps are costly and hard to see".to_string(),
        ]))
        .with_notes(engagement(
            format!(
                "Ground the problem in the setting: {}. Tone: {}.",
                context, tone.voice
            ),
            "tell a short story the audience will recognize.",
        ))
}

fn solution_slide(intent: &Intent, key_message: &str, tone: Tone) -> Slide {
    let slide = if intent.context.is_some() {
        Slide::new(SlideKind::Comparison, "Our approach")
            .with_block(ContentBlock::bullets([
                "Today: fragmented effort",
                "Today: slow feedback",
            ]))
            .with_block(ContentBlock::bullets([
                format!("With {}: one clear path", intent.topic),
                key_message.to_string(),
            ]))
    } else {
        Slide::new(SlideKind::Content, "Our approach").with_block(ContentBlock::bullets([
            format!("A focused plan for {}", intent.topic),
            key_message.to_string(),
        ]))
    };
    slide
        .with_stage(StoryStage::Solution)
        .with_notes(engagement(
            format!(
                "Show how the approach answers the challenge. Style: {}.",
                tone.style
            ),
            "show a live demo or a concrete example.",
        ))
}

fn conclusion_slide(intent: &Intent, tone: Tone) -> Slide {
    let slide = match &intent.key_message {
        Some(key_message) => Slide::new(SlideKind::Quote, "Next steps").with_block(
            ContentBlock::Quote {
                text: key_message.clone(),
                attribution: intent.audience.as_ref().map(|a| format!("For {}", a)),
            },
        ),
        None => Slide::new(SlideKind::Content, "Next steps").with_block(ContentBlock::bullets([
            format!("Recap: why {} matters", intent.topic),
            "Agree on an owner and a first milestone".to_string(),
        ])),
    };
    slide
        .with_stage(StoryStage::Conclusion)
        .with_notes(engagement(
            format!("Close with a clear call to action. Tone: {}.", tone.voice),
            "invite questions and agree on one next step.",
        ))
}

fn visual_slide(topic: &str, request: &VisualRequest) -> Slide {
    let subject = request.subject.as_deref().unwrap_or(topic);
    match request.kind {
        VisualKind::Diagram(kind) => {
            let spec = match kind {
                DiagramKind::Sequence => DiagramSpec::sequence_for(subject),
                DiagramKind::Flowchart => DiagramSpec::flowchart_for(subject),
            };
            let mut notes = spec.alt_text.clone();
            if spec
                .parse()
                .is_ok_and(|graph| graph.edges.len() > BUSY_DIAGRAM_EDGES)
            {
                notes.push_str(" Consider splitting complex diagram across multiple slides.");
            }
            Slide::new(SlideKind::Diagram, format!("{}: {}", kind.label(), subject))
                .with_block(ContentBlock::DiagramRef { spec, asset: None })
                .with_notes(engagement(notes, "trace the flow step by step with a pointer."))
        }
        VisualKind::Chart(kind) => {
            let spec = ChartSpec::illustrative(kind, subject);
            let notes = engagement(
                spec.alt_text.clone(),
                "ask the audience what stands out before explaining it.",
            );
            Slide::new(SlideKind::Chart, spec.title.clone())
                .with_block(ContentBlock::ChartRef { spec, asset: None })
                .with_notes(notes)
        }
    }
}
