// Database module
// Persistent vector index for the knowledge base (LanceDB)

pub mod lancedb;

pub use lancedb::VectorRecord;
pub use lancedb::vector_store::{SearchResult, VectorIndex, VectorStoreGateway};
