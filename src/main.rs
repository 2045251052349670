//! # Save Me A Click
//!
//! An article summarizer and clickbait detector. Given a URL, it fetches the
//! article, asks an OpenAI-compatible model for a structured analysis and
//! returns the parsed result as JSON.
//!
//! ## Features
//!
//! - `POST /summarize` and `GET /health` over HTTP, with CORS for a browser UI
//! - Article extraction from raw HTML (title and body paragraphs)
//! - Chat completions with retry/backoff and optional streaming
//! - Tolerant parsing of the model reply into summary, key points and scores
//! - Optional Reddit and Instagram bots that answer mentions with a summary
//!
//! ## Usage
//!
//! ```sh
//! OPENAI_API_KEY=sk-... save_me_a_click -p 3000
//! ```
//!
//! ## Architecture
//!
//! Every request runs the same pipeline:
//! 1. **Extraction**: Download the page and pull out its title and text
//! 2. **Generation**: Send both to the model with the analysis prompt
//! 3. **Parsing**: Split the reply into sections and compute the scores
//!
//! The bots are plain HTTP clients of the same server.

use clap::Parser;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod bots;
mod cli;
mod config;
mod error;
mod extract;
mod llm;
mod models;
mod parser;
mod prompt;
mod server;
mod summarize;
mod utils;

use bots::{ApiClient, Bot, instagram::InstagramClient, reddit::RedditClient};
use cli::Cli;
use config::AppConfig;
use extract::HttpArticleExtractor;
use llm::{OpenAiClient, RetryAsk};
use summarize::Summarizer;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv::dotenv().ok();

    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    info!("save_me_a_click starting up");

    let args = Cli::parse();
    let config = AppConfig::from_cli(&args)?;
    debug!(
        port = config.port,
        model = %config.llm.model,
        base_url = %config.llm.base_url,
        stream = config.llm.stream,
        "Resolved configuration"
    );

    // --- Analysis pipeline ---
    let llm = RetryAsk::new(
        OpenAiClient::new(&config.llm, &config.openai_api_key)?,
        config.llm.max_retries,
        Duration::from_secs(1),
    );
    let summarizer = Arc::new(Summarizer::new(HttpArticleExtractor::new()?, llm));

    spawn_bots(&config)?;

    let app = server::create_router(summarizer, server::cors_layer(&config.cors_origin)?);
    server::serve(app, config.port).await?;
    Ok(())
}

/// Start a polling task for every bot whose credentials are configured.
fn spawn_bots(config: &AppConfig) -> Result<(), Box<dyn Error>> {
    if let Some(credentials) = config.reddit.clone() {
        let bot = Bot::new(
            RedditClient::new(credentials)?,
            ApiClient::new(&config.api_url)?,
            &config.bots,
        );
        tokio::spawn(bot.run());
        info!("Reddit bot started");
    }

    if let Some(credentials) = config.instagram.clone() {
        let bot = Bot::new(
            InstagramClient::new(credentials)?,
            ApiClient::new(&config.api_url)?,
            &config.bots,
        );
        tokio::spawn(bot.run());
        info!("Instagram bot started");
    }

    Ok(())
}
