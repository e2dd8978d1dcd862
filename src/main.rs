use clap::{Parser, Subcommand};
use lama_support::commands::{ingest, run_chat, serve, show_config};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "lama-support")]
#[command(about = "LAMA customer support assistant backed by a PDF knowledge base")]
#[command(version)]
struct Cli {
    /// Directory holding config.toml; relative knowledge base paths resolve against it
    #[arg(long, global = true, default_value = ".")]
    config_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Address to bind, overrides the configuration file
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on, overrides the configuration file
        #[arg(long)]
        port: Option<u16>,
    },
    /// Chat with the assistant in the terminal
    Chat,
    /// Clear the vector store and rebuild it from the knowledge base PDF
    Ingest {
        /// PDF to ingest instead of the configured one
        #[arg(long)]
        pdf: Option<PathBuf>,
    },
    /// Inspect the configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { host, port } => {
            serve(&cli.config_dir, host, port).await?;
        }
        Commands::Chat => {
            run_chat(&cli.config_dir).await?;
        }
        Commands::Ingest { pdf } => {
            ingest(&cli.config_dir, pdf).await?;
        }
        Commands::Config { show } => {
            if show {
                show_config(&cli.config_dir)?;
            } else {
                eprintln!(
                    "Edit {} to change settings, or run `lama-support config --show`",
                    cli.config_dir
                        .join(lama_support::config::settings::CONFIG_FILE_NAME)
                        .display()
                );
            }
        }
    }

    Ok(())
}
