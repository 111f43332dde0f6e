//! Support bot - a rule-driven chat companion
//!
//! Routes chat messages to a dialogue engine, keeps per-thread conversation
//! state, and runs named subroutines (media, quotes, saved messages) on the
//! engine's behalf.

mod config;
mod db;
mod engine;
mod fetch;
mod random;
mod router;
mod runtime;
mod state_machine;
mod subroutines;
mod transport;

use config::{BotConfig, RuntimeConfigHandle};
use db::Database;
use engine::{BrainEngine, DialogueEngine};
use fetch::{GiphyClient, QuotesRestClient};
use random::{RandomSource, StdRandom};
use router::{MessageRouter, ProfanityFilter};
use runtime::RouterManager;
use state_machine::SharedState;
use std::sync::Arc;
use subroutines::Collaborators;
use transport::{ConsoleTransport, Transport};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr; the console transport owns stdout
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "support_bot=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let config = BotConfig::from_env();

    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    tracing::info!(path = %config.db_path.display(), "Opening database");
    let db = Database::open(&config.db_path)?;

    let random: Arc<dyn RandomSource> = match config.random_seed {
        Some(seed) => {
            tracing::info!(seed, "Using seeded randomness");
            Arc::new(StdRandom::seeded(seed))
        }
        None => Arc::new(StdRandom::from_entropy()),
    };

    let runtime_config = Arc::new(RuntimeConfigHandle::load_or_default(&config.runtime_config_path).await);

    let engine = Arc::new(BrainEngine::new(&config.rules_dir, Arc::clone(&random)));
    match engine.reload().await {
        Ok(()) => tracing::debug!(
            subroutines = ?engine.referenced_subroutines(),
            "Rules reference subroutines"
        ),
        Err(e) => tracing::error!(
            rules_dir = %config.rules_dir.display(),
            error = %e,
            "Failed to load rules, replies disabled until reload"
        ),
    }

    if config.giphy_api_key.is_none() {
        tracing::warn!("GIPHY_API_KEY not set; media search is disabled");
    }

    let transport: Arc<dyn Transport> = Arc::new(ConsoleTransport::new());
    let deps = Collaborators {
        state: Arc::new(SharedState::new()),
        transport: Arc::clone(&transport),
        engine,
        config: runtime_config,
        media: Arc::new(GiphyClient::new(config.giphy_api_key.clone())?),
        quotes: Arc::new(QuotesRestClient::new()?),
        saved: Arc::new(db),
        random,
        media_dir: config.media_dir.clone(),
        bot_id: config.bot_user_id.clone(),
    };
    let profanity = match &config.profanity_words {
        Some(words) => ProfanityFilter::with_words(words.iter().map(String::as_str))?,
        None => ProfanityFilter::default(),
    };
    let router = Arc::new(MessageRouter::new(deps, profanity));

    tracing::info!(bot_id = %config.bot_user_id, "Support bot started");
    RouterManager::new(router).run(transport).await?;
    tracing::info!("Support bot stopped");

    Ok(())
}
