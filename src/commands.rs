use anyhow::{Context, Result};
use console::style;
use dialoguer::Input;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use crate::agent::{AgentExecutor, ChatService, Chatbot, RetrievalTool, UnavailableReason};
use crate::config::settings::mask_key;
use crate::config::{Config, api_key};
use crate::database::{VectorIndex, VectorStoreGateway};
use crate::ingest::PdfProcessor;
use crate::markdown::clean_markdown;
use crate::memory::ConversationMemory;
use crate::provider::{ChatModel, GeminiClient};
use crate::server::{self, AppState};

pub use crate::config::show_config;

const EXIT_WORDS: [&str; 4] = ["exit", "quit", "bye", "goodbye"];

/// Assemble the chat service for a configuration.
///
/// Never fails: a missing API key or a setup error yields `ChatService::Unavailable`.
#[inline]
pub async fn build_chat_service(config: &Config) -> ChatService {
    let key = match api_key() {
        Ok(key) => key,
        Err(e) => {
            error!("No API key found: {}", e);
            return ChatService::Unavailable(UnavailableReason::MissingApiKey);
        }
    };
    info!("API key loaded (first 5 chars: {})", mask_key(&key));

    match initialize_chatbot(config, key).await {
        Ok(chatbot) => {
            info!(
                "Backend initialized, agent executor ready: {}",
                chatbot.has_agent_executor()
            );
            ChatService::Ready(chatbot)
        }
        Err(e) => {
            error!("Failed to initialize backend: {:#}", e);
            ChatService::Unavailable(UnavailableReason::InitializationFailed(format!("{:#}", e)))
        }
    }
}

/// Load or build the index, then wire the agent around it
#[inline]
pub async fn initialize_chatbot(config: &Config, api_key: String) -> Result<Chatbot> {
    let client = Arc::new(
        GeminiClient::new(&config.provider, api_key).context("Failed to create provider client")?,
    );

    let gateway = VectorStoreGateway::new(config.vector_store_path(), client.clone());
    let processor = PdfProcessor::new(&config.chunking);
    let index = gateway
        .ensure_index(&processor, &config.pdf_path())
        .await
        .context("Failed to prepare knowledge base")?;

    Ok(assemble_chatbot(config, index, client))
}

/// Chatbot with a retrieval tool over `index` and a fresh conversation memory
#[inline]
pub fn assemble_chatbot(config: &Config, index: VectorIndex, model: Arc<dyn ChatModel>) -> Chatbot {
    let tool = RetrievalTool::new(Arc::new(index), config.agent.retrieval_k);
    let executor = AgentExecutor::new(model, vec![Arc::new(tool)])
        .with_temperature(config.provider.temperature)
        .with_max_iterations(config.agent.max_iterations);

    Chatbot::new(ConversationMemory::new(config.memory.window_size)).with_agent_executor(executor)
}

/// Start the HTTP server
#[inline]
pub async fn serve(config_dir: &Path, host: Option<String>, port: Option<u16>) -> Result<()> {
    let mut config = load_config(config_dir)?;
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    config.server.validate().context("Invalid server configuration")?;

    let service = build_chat_service(&config).await;
    let state = Arc::new(AppState::new(service));
    server::run(state, &config.server).await
}

/// Interactive terminal chat session
#[inline]
pub async fn run_chat(config_dir: &Path) -> Result<()> {
    let config = load_config(config_dir)?;
    eprintln!("{}", style("🤖 Initializing LAMA Customer Support AI...").bold());

    let key = api_key().context("Cannot start chat")?;
    let mut chatbot = initialize_chatbot(&config, key).await?;

    println!();
    println!("{}", "=".repeat(65));
    println!("{}", style("🤖 LAMA Customer Support AI").bold().cyan());
    println!("💬 Start typing your question");
    println!("❌ Type 'exit' or 'quit' to stop");
    println!("{}", "=".repeat(65));

    loop {
        let input = match Input::<String>::new()
            .with_prompt("You")
            .allow_empty(true)
            .interact_text()
        {
            Ok(input) => input,
            Err(e) => {
                info!("Input closed: {}", e);
                println!("\n👋 Interrupted. Exiting.");
                break;
            }
        };

        let question = input.trim();
        if question.is_empty() {
            continue;
        }
        if is_exit_word(question) {
            println!("👋 Goodbye!");
            break;
        }

        let bar = spinner("🔍 Searching knowledge base...");
        let response = chatbot.ask(question).await;
        bar.finish_and_clear();

        println!();
        println!("{}", style("🤖 LAMA Support:").bold().green());
        println!("{}", clean_markdown(&response));
        println!();
    }

    Ok(())
}

/// Clear the index and rebuild it from the knowledge base PDF
#[inline]
pub async fn ingest(config_dir: &Path, pdf: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_dir)?;
    let pdf = pdf.unwrap_or_else(|| config.pdf_path());

    println!("📚 Setting up knowledge base from {}", pdf.display());

    let key = api_key().context("Cannot embed the knowledge base")?;
    let client = Arc::new(
        GeminiClient::new(&config.provider, key).context("Failed to create provider client")?,
    );
    let gateway = VectorStoreGateway::new(config.vector_store_path(), client);
    let processor = PdfProcessor::new(&config.chunking);

    let bar = spinner("Embedding knowledge base...");
    let result = gateway.rebuild(&processor, &pdf).await;
    bar.finish_and_clear();

    let index = result.context("Failed to build vector store")?;
    let count = index.count().await?;

    println!(
        "{} Indexed {} chunks into {}",
        style("✅").green(),
        count,
        gateway.path().display()
    );
    Ok(())
}

fn load_config(config_dir: &Path) -> Result<Config> {
    let config = Config::load(config_dir).context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn is_exit_word(input: &str) -> bool {
    EXIT_WORDS.contains(&input.to_lowercase().as_str())
}

fn spinner(message: &'static str) -> ProgressBar {
    if !console::user_attended_stderr() {
        return ProgressBar::hidden();
    }

    let style = ProgressStyle::with_template("{spinner} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    let bar = ProgressBar::new_spinner().with_style(style).with_message(message);
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}
