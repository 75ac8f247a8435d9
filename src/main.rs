mod ollama_client;
mod cli;

use std::io;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use dotenv::dotenv;
use eyre::Result;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

use crate::cli::chat::context::ContextManager;
use crate::cli::chat::history::FileHistoryStore;
use crate::cli::chat::search::{self, DuckDuckGoAugmenter, UNKNOWN_LOCATION};
use crate::cli::chat::translate::{GoogleTranslator, LanguagePreference};
use crate::cli::chat::voice::CommandSpeech;
use crate::cli::chat::{ChatBackends, ChatContext};
use crate::ollama_client::OllamaClient;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Input to send to the chat
    #[arg(short, long)]
    input: Option<String>,

    /// Language for voice and replies (locale tag or code, e.g. fr-FR or fr)
    #[arg(short, long, default_value = "en-US")]
    lang: String,

    /// Ollama model name (overrides OLLAMA_MODEL)
    #[arg(short, long)]
    model: Option<String>,

    /// Ollama generate endpoint (overrides OLLAMA_URL)
    #[arg(short, long)]
    url: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a chat session
    Chat {
        /// Input to send to the chat
        #[arg(short, long)]
        input: Option<String>,

        /// Enable verbose logging
        #[arg(short, long)]
        verbose: bool,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Load environment variables from .env file
    dotenv().ok();

    let cli = Cli::parse();

    // Initialize tracing with appropriate level
    let verbose = match &cli.command {
        Some(Commands::Chat { verbose, .. }) => *verbose,
        None => cli.verbose,
    };

    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");

    info!("Starting Ollama Voice Chat");

    let language = match LanguagePreference::resolve(&cli.lang) {
        Ok(language) => language,
        Err(e) => {
            eprintln!("{e}");
            return Ok(ExitCode::FAILURE);
        }
    };

    let history = match FileHistoryStore::new() {
        Ok(store) => store,
        Err(e) => {
            eprintln!("Could not set up the history directory: {e}");
            return Ok(ExitCode::FAILURE);
        }
    };

    // Rough location for the prompt context and local news; the placeholder
    // is fine when the lookup fails.
    let geo_client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(5))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new());
    let location = match search::geolocate(&geo_client).await {
        Ok(geo) => geo.display(),
        Err(e) => {
            info!(error = %e, "geolocation failed; using placeholder location");
            UNKNOWN_LOCATION.to_string()
        }
    };

    let backends = ChatBackends {
        generator: Box::new(OllamaClient::new(cli.url.clone(), cli.model.clone())),
        translator: Box::new(GoogleTranslator::new()),
        augmenter: Box::new(DuckDuckGoAugmenter::new()),
        capture: Box::new(CommandSpeech::new()),
        synthesizer: Box::new(CommandSpeech::new()),
        history: Box::new(history),
    };

    let input = match cli.command {
        Some(Commands::Chat { input, .. }) => input,
        None => cli.input,
    };

    let interactive = input.is_none();
    let mut chat_context = ChatContext::new(
        Box::new(io::stdout()),
        input,
        interactive,
        language,
        ContextManager::new(location),
        backends,
    );
    chat_context.run().await
}
