// LanceDB vector database module
// Handles vector storage and similarity search for knowledge base chunks


pub mod vector_store;

use serde::{Deserialize, Serialize};

use crate::ingest::Chunk;

/// Embedding record stored in LanceDB
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    /// Unique identifier for this record
    pub id: String,
    /// The embedding of `chunk.text`
    pub vector: Vec<f32>,
    pub chunk: Chunk,
    /// RFC 3339 timestamp of the index build
    pub created_at: String,
}

impl VectorRecord {
    #[inline]
    pub fn new(chunk: Chunk, vector: Vec<f32>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            vector,
            chunk,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}
