use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SupportError>;

#[derive(Error, Debug)]
pub enum SupportError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Failed to ingest document: {0}")]
    Ingest(String),

    #[error("No chunks provided to create vector store")]
    EmptyInput,

    #[error("Vector store not found at {}", .0.display())]
    NotFound(PathBuf),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod agent;
pub mod commands;
pub mod config;
pub mod database;
pub mod ingest;
pub mod markdown;
pub mod memory;
pub mod provider;
pub mod server;
