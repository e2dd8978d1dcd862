
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{debug, warn};

/// Separators tried in order, from paragraph breaks down to raw characters
pub const DEFAULT_SEPARATORS: [&str; 5] = ["\n\n", "\n", ". ", " ", ""];

/// Configuration for text chunking
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum chunk length in characters
    pub chunk_size: usize,
    /// Characters shared between consecutive chunks
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 100,
        }
    }
}

/// Recursive character splitter.
///
/// Splits on the coarsest separator present in the text, recursing into
/// finer separators for any piece still longer than `chunk_size`, then greedily
/// merges neighbouring pieces back together up to `chunk_size`, carrying up to
/// `chunk_overlap` characters of trailing context into the next chunk.
#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl TextSplitter {
    #[inline]
    pub fn new(config: &ChunkingConfig) -> Self {
        Self {
            chunk_size: config.chunk_size.max(1),
            chunk_overlap: config.chunk_overlap.min(config.chunk_size.saturating_sub(1)),
            separators: DEFAULT_SEPARATORS.iter().map(|s| (*s).to_string()).collect(),
        }
    }

    #[inline]
    pub fn with_separators(mut self, separators: &[&str]) -> Self {
        self.separators = separators.iter().map(|s| (*s).to_string()).collect();
        self
    }

    #[inline]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    #[inline]
    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split text into chunks of at most `chunk_size` characters
    #[inline]
    pub fn split_text(&self, text: &str) -> Vec<String> {
        let chunks = self.split_recursive(text, &self.separators);
        debug!(
            "Split {} characters into {} chunks",
            char_len(text),
            chunks.len()
        );
        chunks
    }

    fn split_recursive(&self, text: &str, separators: &[String]) -> Vec<String> {
        // Coarsest separator that actually occurs; "" always matches
        let position = separators
            .iter()
            .position(|sep| sep.is_empty() || text.contains(sep.as_str()))
            .unwrap_or(separators.len().saturating_sub(1));
        let separator = separators.get(position).map_or("", String::as_str);
        let finer = separators.get(position + 1..).unwrap_or_default();

        let splits: Vec<String> = if separator.is_empty() {
            text.chars().map(String::from).collect()
        } else {
            // Separators stay on the end of the piece they close, so no text is lost
            text.split_inclusive(separator)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        };

        let mut chunks = Vec::new();
        let mut good_splits: Vec<String> = Vec::new();

        for split in splits {
            if char_len(&split) < self.chunk_size {
                good_splits.push(split);
                continue;
            }

            if !good_splits.is_empty() {
                chunks.extend(self.merge_splits(&good_splits));
                good_splits.clear();
            }

            if finer.is_empty() {
                chunks.push(split);
            } else {
                chunks.extend(self.split_recursive(&split, finer));
            }
        }

        if !good_splits.is_empty() {
            chunks.extend(self.merge_splits(&good_splits));
        }

        chunks
    }

    fn merge_splits(&self, splits: &[String]) -> Vec<String> {
        let mut docs = Vec::new();
        let mut current: VecDeque<&str> = VecDeque::new();
        let mut total = 0;

        for split in splits {
            let len = char_len(split);

            if total + len > self.chunk_size {
                if total > self.chunk_size {
                    warn!(
                        "Created a chunk of size {}, which is longer than the specified {}",
                        total, self.chunk_size
                    );
                }

                if !current.is_empty() {
                    if let Some(doc) = join_docs(&current) {
                        docs.push(doc);
                    }

                    // Drop leading pieces until what remains fits as overlap
                    while total > self.chunk_overlap || (total > 0 && total + len > self.chunk_size) {
                        let Some(front) = current.pop_front() else {
                            break;
                        };
                        total -= char_len(front);
                    }
                }
            }

            current.push_back(split);
            total += len;
        }

        if let Some(doc) = join_docs(&current) {
            docs.push(doc);
        }

        docs
    }
}

fn join_docs(docs: &VecDeque<&str>) -> Option<String> {
    let joined: String = docs.iter().copied().collect();
    let trimmed = joined.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Length in characters, the unit for chunk sizes and overlaps
#[inline]
pub fn char_len(text: &str) -> usize {
    text.chars().count()
}
