// Document ingestion module
// Reads the PDF knowledge base and turns each page into overlapping chunks

pub mod chunking;


use lopdf::Document;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::{Result, SupportError};
use chunking::{ChunkingConfig, TextSplitter};

/// A bounded span of page text, the unit that gets embedded and retrieved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    /// Path of the PDF the text came from
    pub source: PathBuf,
    /// 1-based page number
    pub page: u32,
    /// Position of this chunk within its page
    pub chunk_index: u32,
}

/// Extracted text of a single non-empty page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    pub page: u32,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct PdfProcessor {
    splitter: TextSplitter,
}

impl PdfProcessor {
    #[inline]
    pub fn new(config: &ChunkingConfig) -> Self {
        Self {
            splitter: TextSplitter::new(config),
        }
    }

    /// Extract text and split it into chunks in one call.
    ///
    /// Returns an empty vector when the document has no extractable text.
    #[inline]
    pub fn process(&self, path: &Path) -> Result<Vec<Chunk>> {
        let pages = self.extract_pages(path)?;
        let chunks = self.split_pages(path, &pages);
        info!(
            "Processed {}: {} pages with text, {} chunks",
            path.display(),
            pages.len(),
            chunks.len()
        );
        Ok(chunks)
    }

    /// Read the text of every page, skipping pages that are blank
    #[inline]
    pub fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>> {
        debug!("Loading knowledge base from {}", path.display());

        let document = Document::load(path).map_err(|e| {
            SupportError::Ingest(format!("Failed to open PDF {}: {}", path.display(), e))
        })?;

        let mut pages = Vec::new();
        for page in document.get_pages().into_keys() {
            let text = match document.extract_text(&[page]) {
                Ok(text) => text,
                Err(e) => {
                    warn!("Skipping page {} of {}: {}", page, path.display(), e);
                    continue;
                }
            };

            if text.trim().is_empty() {
                debug!("Page {} has no text, skipping", page);
                continue;
            }

            pages.push(PageText { page, text });
        }

        info!("Loaded {} pages from {}", pages.len(), path.display());
        Ok(pages)
    }

    /// Split each page on its own so chunks never span a page boundary
    #[inline]
    pub fn split_pages(&self, source: &Path, pages: &[PageText]) -> Vec<Chunk> {
        pages
            .iter()
            .flat_map(|page| {
                self.splitter
                    .split_text(&page.text)
                    .into_iter()
                    .enumerate()
                    .map(move |(index, text)| Chunk {
                        text,
                        source: source.to_path_buf(),
                        page: page.page,
                        chunk_index: index as u32,
                    })
            })
            .collect()
    }
}
