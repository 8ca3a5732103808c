//! advisor-council - ask a council of LLM advisors from the command line

use advisor_council::llm::{ChatCompletionOptions, ChatMessage, Phase};
use advisor_council::{sanitize, Config, Council, CouncilContext, LlmRouter, TracingMetrics};
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Question for the advisors (e.g., "how should we price our API?")
    #[arg(short, long)]
    prompt: String,

    /// Background about the company, sent along with the question
    #[arg(long)]
    context: Option<String>,

    /// Run a single routed call for this phase instead of the full council
    #[arg(long, value_parser = parse_phase)]
    phase: Option<Phase>,

    /// Config file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the full result as JSON
    #[arg(long, default_value_t = false)]
    json: bool,

    /// Enable debug logging
    #[arg(long, default_value_t = false)]
    debug: bool,
}

fn parse_phase(value: &str) -> std::result::Result<Phase, String> {
    value.parse::<Phase>().map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter = if args.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let config = Config::load(args.config.as_deref()).context("failed to load configuration")?;
    let router = Arc::new(LlmRouter::from_config(&config, Arc::new(TracingMetrics)));

    match args.phase {
        Some(phase) => run_phase(&router, phase, &args).await,
        None => run_council(router, &config, &args).await,
    }
}

async fn run_phase(router: &LlmRouter, phase: Phase, args: &Args) -> Result<()> {
    let mut messages = Vec::new();
    if let Some(context) = &args.context {
        messages.push(ChatMessage::system(format!("Company context:\n{}", context)));
    }
    messages.push(ChatMessage::user(args.prompt.as_str()));

    let mut result = router
        .chat_for_phase(phase, &messages, &ChatCompletionOptions::default())
        .await
        .with_context(|| format!("{:?} call failed", phase))?;
    result.content = sanitize(&result.content);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("{}", result.content);
    }
    Ok(())
}

async fn run_council(router: Arc<LlmRouter>, config: &Config, args: &Args) -> Result<()> {
    let council = Council::new(router, &config.models, config.council.clone());
    let context = args.context.as_deref().map(CouncilContext::new);

    let token = CancellationToken::new();
    let on_interrupt = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing with the answers gathered so far");
            on_interrupt.cancel();
        }
    });

    let result = council
        .run_with_cancel(&args.prompt, context.as_ref(), &token)
        .await
        .context("council run failed")?;

    info!(
        "{} responses, {} critiques, {} tokens in {}ms",
        result.responses.len(),
        result.critiques.len(),
        result.metadata.total_tokens,
        result.metadata.processing_time_ms
    );

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("{}", result.final_response);
    }
    Ok(())
}
