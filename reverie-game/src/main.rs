//! Terminal game loop.
//!
//! Usage:
//!   reverie [--config reverie.toml]
//!
//! Requires `GEMINI_API_KEY` in the environment. Type `quit` to exit.

use std::io::{BufRead, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::Context as _;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use reverie_core::config::ReverieConfig;
use reverie_core::context::ContextManager;
use reverie_core::index::VectorIndex;
use reverie_core::search::SemanticSearch;
use reverie_game::{GameSession, GameTools};
use reverie_llm::{GenAiClient, RemoteEmbeddingProvider};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config()?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.general.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let api_key = std::env::var("GEMINI_API_KEY")
        .context("GEMINI_API_KEY is not set; the generation service needs a key")?;

    let index = Arc::new(VectorIndex::open(
        &config.memory.db_path,
        &config.memory.collection,
        config.memory.dimension_policy,
    )?);
    info!(
        collection = %config.memory.collection,
        db = %config.memory.db_path,
        "Opened memory index"
    );

    let provider = Arc::new(RemoteEmbeddingProvider::new(
        &config.llm.base_url,
        &config.llm.embedding_model,
        &api_key,
        config.llm.embedding_dimensions,
        config.llm.timeout_ms,
    )?);
    let client = Arc::new(GenAiClient::new(
        &config.llm.base_url,
        &config.llm.generation_model,
        &api_key,
        config.llm.timeout_ms,
        config.llm.max_retries,
    )?);

    let context = ContextManager::new(
        Arc::clone(&provider),
        Arc::clone(&index),
        config.memory.write_policy,
    );
    let search = SemanticSearch::new(provider, index);
    let tools = Arc::new(GameTools::new(context, search, config.retrieval.max_results));

    let mut session = GameSession::new(
        client,
        tools,
        config.window.max_rounds,
        config.retrieval.max_results,
    );

    println!("The story begins. Type your actions; 'quit' to leave.");
    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    loop {
        print!("> ");
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input.eq_ignore_ascii_case("quit") || input.eq_ignore_ascii_case("exit") {
            break;
        }

        match session.play_turn(input).await {
            Ok(update) => {
                println!("\n{}\n", update.narrator_response);
            }
            Err(e) => {
                eprintln!("The story falters: {e}");
            }
        }
    }

    println!("The story rests, for now.");
    Ok(())
}

fn load_config() -> anyhow::Result<ReverieConfig> {
    let args: Vec<String> = std::env::args().collect();
    let mut config_path: Option<String> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(args[i + 1].clone());
                    i += 1;
                }
            }
            other => {
                anyhow::bail!("unknown argument '{other}'");
            }
        }
        i += 1;
    }

    match config_path {
        Some(path) => ReverieConfig::from_file(Path::new(&path))
            .with_context(|| format!("failed to load config from {path}")),
        None => {
            let default = Path::new("reverie.toml");
            if default.exists() {
                ReverieConfig::from_file(default).context("failed to load reverie.toml")
            } else {
                Ok(ReverieConfig::default())
            }
        }
    }
}
