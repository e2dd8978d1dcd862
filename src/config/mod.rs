// Configuration management module
// TOML settings, defaults and provider credentials

pub mod settings;


pub use settings::{
    AgentConfig, Config, ConfigError, KnowledgeBaseConfig, MemoryConfig, ProviderConfig,
    ServerConfig, api_key,
};

use anyhow::{Context, Result};
use console::style;
use std::path::Path;

/// Print the effective configuration for a configuration directory
#[inline]
pub fn show_config(config_dir: &Path) -> Result<()> {
    let config = Config::load(config_dir).context("Failed to load configuration")?;

    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Provider:").bold().yellow());
    eprintln!("  Base URL: {}", style(&config.provider.base_url).cyan());
    eprintln!("  Chat Model: {}", style(&config.provider.chat_model).cyan());
    eprintln!(
        "  Embedding Model: {}",
        style(&config.provider.embedding_model).cyan()
    );
    eprintln!("  Temperature: {}", style(config.provider.temperature).cyan());
    match api_key() {
        Ok(key) => eprintln!("  API Key: {}", style(settings::mask_key(&key)).cyan()),
        Err(e) => eprintln!("  API Key: {} ({})", style("Missing").red(), e),
    }

    eprintln!();
    eprintln!("{}", style("Knowledge Base:").bold().yellow());
    eprintln!("  PDF: {}", style(config.pdf_path().display()).cyan());
    eprintln!(
        "  Vector Store: {}",
        style(config.vector_store_path().display()).cyan()
    );
    eprintln!(
        "  Chunking: {} chars, {} overlap",
        style(config.chunking.chunk_size).cyan(),
        style(config.chunking.chunk_overlap).cyan()
    );

    eprintln!();
    eprintln!("{}", style("Agent:").bold().yellow());
    eprintln!("  Retrieval k: {}", style(config.agent.retrieval_k).cyan());
    eprintln!(
        "  Max Iterations: {}",
        style(config.agent.max_iterations).cyan()
    );
    eprintln!(
        "  Memory Window: {} exchanges",
        style(config.memory.window_size).cyan()
    );

    eprintln!();
    eprintln!("{}", style("Server:").bold().yellow());
    eprintln!(
        "  Listen: {}",
        style(format!("{}:{}", config.server.host, config.server.port)).cyan()
    );
    eprintln!(
        "  CORS Origins: {}",
        style(config.server.cors_origins.join(", ")).cyan()
    );

    eprintln!();
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );

    Ok(())
}
