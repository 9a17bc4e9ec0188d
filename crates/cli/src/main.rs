//! CLI tool that turns a chat request into a slide deck.

mod export;
mod pipeline;

use anyhow::{Context, Result};
use clap::Parser;
use deck_core::{
    CancelToken, ChatRequest, LlmOutput, LlmProvider, MarkdownFormatter, PipelineConfig,
    StaticCompleter, WorkDir,
};
use pipeline::Pipeline;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Generate a slide deck (PPTX, Markdown and JSON) from a chat message.
#[derive(Parser, Debug)]
#[command(name = "deck-architect")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Chat message describing the deck
    #[arg(required_unless_present = "request", conflicts_with = "request")]
    message: Option<String>,

    /// JSON file holding a chat request ({"message", "llm_provider", "api_key"})
    #[arg(short, long)]
    request: Option<PathBuf>,

    /// LLM provider used to interpret the message
    #[arg(long, value_parser = parse_provider)]
    provider: Option<LlmProvider>,

    /// API key for the LLM provider
    #[arg(long, env = "LLM_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// File holding a provider response to use instead of calling the provider
    #[arg(long)]
    llm_response: Option<PathBuf>,

    /// Pipeline configuration (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Root directory for generated files
    #[arg(short, long, env = "SLIDE_WORK_DIR")]
    work_dir: Option<PathBuf>,

    /// Also print the Markdown rendering to stdout
    #[arg(short, long)]
    print: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn parse_provider(name: &str) -> std::result::Result<LlmProvider, String> {
    LlmProvider::from_name(name)
        .ok_or_else(|| format!("unknown provider '{}' (expected offline, gemini or openai)", name))
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    if args.verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    }

    let config = match &args.config {
        Some(path) => PipelineConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => PipelineConfig::default(),
    };

    let root = args
        .work_dir
        .clone()
        .unwrap_or_else(|| std::env::temp_dir().join("deck-architect"));
    let work_dir = WorkDir::new(&root)
        .with_context(|| format!("Failed to prepare work directory {}", root.display()))?;

    let request = load_request(&args)?;
    let mut pipeline = Pipeline::new(config, work_dir).context("Invalid configuration")?;
    if let Some(path) = &args.llm_response {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read LLM response {}", path.display()))?;
        let completer = StaticCompleter::new(request.llm_provider, LlmOutput::Text(text));
        pipeline = pipeline.with_completer(Arc::new(completer));
    }

    if args.verbose {
        eprintln!("Generating deck with provider: {}", request.llm_provider.as_str());
    }

    let output = pipeline
        .run(&request, &CancelToken::new())
        .context("Failed to generate deck")?;

    if args.print {
        print!("{}", MarkdownFormatter::new().format(&output.deck));
    }
    if args.verbose {
        eprintln!(
            "  Request {}: intent from {}, {} slides, {} visuals rendered, {} placeholders",
            output.request_id,
            if output.used_llm { "LLM response" } else { "offline rules" },
            output.deck.slides.len(),
            output.render.rendered,
            output.render.fallbacks
        );
    }

    println!(
        "Your slide deck '{}' is ready! PowerPoint: {}, Markdown: {}, JSON: {}",
        output.deck.title,
        display(&output.artifacts.pptx),
        display(&output.artifacts.markdown),
        display(&output.artifacts.json)
    );

    Ok(())
}

/// Build the chat request from a request file or the positional message.
/// Flags override the file's provider and key.
fn load_request(args: &Args) -> Result<ChatRequest> {
    let mut request = match (&args.request, &args.message) {
        (Some(path), _) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read request {}", path.display()))?;
            serde_json::from_str::<ChatRequest>(&text)
                .with_context(|| format!("Failed to parse request {}", path.display()))?
        }
        (None, Some(message)) => ChatRequest::offline(message.clone()),
        (None, None) => anyhow::bail!("Either a message or --request is required"),
    };
    if let Some(provider) = args.provider {
        request.llm_provider = provider;
    }
    if args.api_key.is_some() {
        request.api_key = args.api_key.clone();
    }
    Ok(request)
}

fn display(path: &Path) -> String {
    path.display().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_message_and_flags() {
        let args = Args::try_parse_from([
            "deck-architect",
            "Pitch deck for robotics",
            "--provider",
            "openai",
            "--api-key",
            "sk-1",
            "--print",
        ])
        .unwrap();
        let request = load_request(&args).unwrap();
        assert_eq!(request.message, "Pitch deck for robotics");
        assert_eq!(request.llm_provider, LlmProvider::OpenAi);
        assert_eq!(request.api_key.as_deref(), Some("sk-1"));
        assert!(args.print);
    }

    #[test]
    fn test_args_reject_unknown_provider() {
        let result = Args::try_parse_from(["deck-architect", "hello", "--provider", "claude"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_request_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("request.json");
        std::fs::write(
            &path,
            r#"{"message": "Roadmap review", "llm_provider": "gemini", "api_key": "k"}"#,
        )
        .unwrap();
        let args = Args::try_parse_from([
            "deck-architect",
            "--request",
            path.to_str().unwrap(),
        ])
        .unwrap();
        let request = load_request(&args).unwrap();
        assert_eq!(request.message, "Roadmap review");
        assert_eq!(request.llm_provider, LlmProvider::Gemini);
    }

    #[test]
    fn test_message_or_request_required() {
        assert!(Args::try_parse_from(["deck-architect"]).is_err());
    }
}
