
use super::VectorRecord;
use crate::ingest::{Chunk, PdfProcessor};
use crate::provider::Embedder;
use crate::{Result, SupportError};
use arrow::array::{
    Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray, UInt32Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use futures::TryStreamExt;
use lancedb::{
    Connection, DistanceType, Table,
    query::{ExecutableQuery, QueryBase},
};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const TABLE_NAME: &str = "chunks";

/// Owns the on-disk location of the knowledge base index and the embedder used to fill it
pub struct VectorStoreGateway {
    path: PathBuf,
    embedder: Arc<dyn Embedder>,
}

/// Handle to a live, populated index
pub struct VectorIndex {
    table: Table,
    embedder: Arc<dyn Embedder>,
}

/// Search result from vector similarity search
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub chunk: Chunk,
    /// Cosine distance to the query, lower is closer
    pub distance: f32,
}

impl fmt::Debug for VectorStoreGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VectorStoreGateway")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for VectorIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VectorIndex")
            .field("table", &self.table.name())
            .finish_non_exhaustive()
    }
}

impl VectorStoreGateway {
    #[inline]
    pub fn new<P: Into<PathBuf>>(path: P, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            path: path.into(),
            embedder,
        }
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True iff a persisted index is present. Does not open a connection.
    #[inline]
    pub fn exists(&self) -> bool {
        self.path.join(format!("{}.lance", TABLE_NAME)).is_dir()
    }

    /// Embed every chunk and persist the records, replacing any previous table.
    ///
    /// All embeddings are computed before the store is touched, so a provider
    /// failure leaves the previous state in place.
    #[inline]
    pub async fn build(&self, chunks: &[Chunk]) -> Result<VectorIndex> {
        if chunks.is_empty() {
            return Err(SupportError::EmptyInput);
        }

        info!("Embedding {} chunks", chunks.len());
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self
            .embedder
            .embed_documents(&texts)
            .map_err(|e| SupportError::Provider(format!("{:#}", e)))?;

        if vectors.len() != chunks.len() {
            return Err(SupportError::Provider(format!(
                "Expected {} embeddings, received {}",
                chunks.len(),
                vectors.len()
            )));
        }

        let records: Vec<VectorRecord> = chunks
            .iter()
            .cloned()
            .zip(vectors)
            .map(|(chunk, vector)| VectorRecord::new(chunk, vector))
            .collect();
        let vector_dim = vector_dimension(&records)?;

        let record_batch = create_record_batch(&records, vector_dim)?;
        let schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);

        let connection = self.connect().await?;
        drop_table_if_exists(&connection).await?;

        // Table and rows are written in one commit, so a failed write leaves no empty table
        let table = connection
            .create_table(TABLE_NAME, reader)
            .execute()
            .await
            .map_err(|e| SupportError::Database(format!("Failed to create table: {}", e)))?;

        info!(
            "Vector store created at {} with {} records ({} dimensions)",
            self.path.display(),
            records.len(),
            vector_dim
        );

        Ok(VectorIndex {
            table,
            embedder: Arc::clone(&self.embedder),
        })
    }

    /// Open the persisted index
    #[inline]
    pub async fn load(&self) -> Result<VectorIndex> {
        if !self.exists() {
            return Err(SupportError::NotFound(self.path.clone()));
        }

        let connection = self.connect().await?;
        let table = connection
            .open_table(TABLE_NAME)
            .execute()
            .await
            .map_err(|e| SupportError::Database(format!("Failed to open table: {}", e)))?;

        info!("Loaded vector store from {}", self.path.display());
        Ok(VectorIndex {
            table,
            embedder: Arc::clone(&self.embedder),
        })
    }

    /// Delete the persisted index, read-only files included. No-op when absent.
    #[inline]
    pub fn clear(&self) -> Result<()> {
        if !self.path.exists() {
            debug!("Nothing to clear at {}", self.path.display());
            return Ok(());
        }

        make_writable(&self.path)?;
        fs::remove_dir_all(&self.path).map_err(|e| {
            SupportError::Database(format!(
                "Failed to remove vector store at {}: {}",
                self.path.display(),
                e
            ))
        })?;

        info!("Cleared vector store at {}", self.path.display());
        Ok(())
    }

    /// Load the index if it exists, otherwise build it from the PDF.
    ///
    /// Never rebuilds an existing index.
    #[inline]
    pub async fn ensure_index(&self, processor: &PdfProcessor, pdf: &Path) -> Result<VectorIndex> {
        if self.exists() {
            info!("Loading existing vector store");
            let index = self.load().await?;
            if index.count().await? > 0 {
                return Ok(index);
            }

            warn!(
                "Vector store at {} holds no records, rebuilding",
                self.path.display()
            );
            let chunks = Self::read_chunks(processor, pdf)?;
            drop(index);
            self.clear()?;
            return self.build(&chunks).await;
        }

        info!("No vector store found, building from {}", pdf.display());
        self.build_from_pdf(processor, pdf).await
    }

    /// Clear the index and build it again from the PDF
    #[inline]
    pub async fn rebuild(&self, processor: &PdfProcessor, pdf: &Path) -> Result<VectorIndex> {
        let chunks = Self::read_chunks(processor, pdf)?;
        self.clear()?;
        self.build(&chunks).await
    }

    async fn build_from_pdf(&self, processor: &PdfProcessor, pdf: &Path) -> Result<VectorIndex> {
        let chunks = Self::read_chunks(processor, pdf)?;
        self.build(&chunks).await
    }

    fn read_chunks(processor: &PdfProcessor, pdf: &Path) -> Result<Vec<Chunk>> {
        if !pdf.exists() {
            return Err(SupportError::Ingest(format!(
                "Knowledge base PDF not found at {}",
                pdf.display()
            )));
        }

        let chunks = processor.process(pdf)?;
        if chunks.is_empty() {
            warn!("No text could be extracted from {}", pdf.display());
            return Err(SupportError::EmptyInput);
        }
        Ok(chunks)
    }

    async fn connect(&self) -> Result<Connection> {
        fs::create_dir_all(&self.path).map_err(|e| {
            SupportError::Database(format!("Failed to create vector store directory: {}", e))
        })?;

        // A relative path would be read as the host part of the URI
        let absolute = std::path::absolute(&self.path).map_err(|e| {
            SupportError::Database(format!(
                "Failed to resolve vector store path {}: {}",
                self.path.display(),
                e
            ))
        })?;
        let uri = format!("file://{}", absolute.display());
        debug!("Connecting to LanceDB at {}", uri);
        lancedb::connect(&uri)
            .execute()
            .await
            .map_err(|e| SupportError::Database(format!("Failed to connect to LanceDB: {}", e)))
    }
}

impl VectorIndex {
    /// The `k` chunks nearest to `query`, nearest first
    #[inline]
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchResult>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        debug!("Searching for {} nearest chunks", k);
        let query_vector = self
            .embedder
            .embed_query(query)
            .map_err(|e| SupportError::Provider(format!("{:#}", e)))?;

        let mut results = self
            .table
            .vector_search(query_vector)
            .map_err(|e| SupportError::Database(format!("Failed to create vector search: {}", e)))?
            .column("vector")
            .distance_type(DistanceType::Cosine)
            .limit(k)
            .execute()
            .await
            .map_err(|e| SupportError::Database(format!("Failed to execute search: {}", e)))?;

        let mut search_results = Vec::new();
        while let Some(batch) = results
            .try_next()
            .await
            .map_err(|e| SupportError::Database(format!("Failed to read result stream: {}", e)))?
        {
            search_results.extend(parse_search_batch(&batch)?);
        }

        // Batches may arrive in any order
        search_results.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        search_results.truncate(k);

        debug!("Found {} results", search_results.len());
        Ok(search_results)
    }

    /// Number of persisted records
    #[inline]
    pub async fn count(&self) -> Result<usize> {
        self.table
            .count_rows(None)
            .await
            .map_err(|e| SupportError::Database(format!("Failed to count rows: {}", e)))
    }
}

fn vector_dimension(records: &[VectorRecord]) -> Result<usize> {
    let vector_dim = records.first().map_or(0, |r| r.vector.len());
    if vector_dim == 0 {
        return Err(SupportError::Provider(
            "Embedding provider returned empty vectors".to_string(),
        ));
    }
    if let Some(bad) = records.iter().find(|r| r.vector.len() != vector_dim) {
        return Err(SupportError::Provider(format!(
            "Inconsistent embedding dimensions: {} vs {}",
            vector_dim,
            bad.vector.len()
        )));
    }
    Ok(vector_dim)
}

fn create_schema(vector_dim: usize) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, false)),
                vector_dim as i32,
            ),
            false,
        ),
        Field::new("text", DataType::Utf8, false),
        Field::new("source", DataType::Utf8, false),
        Field::new("page", DataType::UInt32, false),
        Field::new("chunk_index", DataType::UInt32, false),
        Field::new("created_at", DataType::Utf8, false),
    ]))
}

fn create_record_batch(records: &[VectorRecord], vector_dim: usize) -> Result<RecordBatch> {
    let len = records.len();

    let mut ids = Vec::with_capacity(len);
    let mut flat_values = Vec::with_capacity(len * vector_dim);
    let mut texts = Vec::with_capacity(len);
    let mut sources = Vec::with_capacity(len);
    let mut pages = Vec::with_capacity(len);
    let mut chunk_indices = Vec::with_capacity(len);
    let mut created_ats = Vec::with_capacity(len);

    for record in records {
        ids.push(record.id.as_str());
        flat_values.extend_from_slice(&record.vector);
        texts.push(record.chunk.text.as_str());
        sources.push(record.chunk.source.to_string_lossy().into_owned());
        pages.push(record.chunk.page);
        chunk_indices.push(record.chunk.chunk_index);
        created_ats.push(record.created_at.as_str());
    }

    let values_array = Float32Array::from(flat_values);
    let field = Arc::new(Field::new("item", DataType::Float32, false));
    let vector_array =
        FixedSizeListArray::try_new(field, vector_dim as i32, Arc::new(values_array), None)
            .map_err(|e| SupportError::Database(format!("Failed to create vector array: {}", e)))?;

    let arrays: Vec<Arc<dyn Array>> = vec![
        Arc::new(StringArray::from(ids)),
        Arc::new(vector_array),
        Arc::new(StringArray::from(texts)),
        Arc::new(StringArray::from(sources)),
        Arc::new(UInt32Array::from(pages)),
        Arc::new(UInt32Array::from(chunk_indices)),
        Arc::new(StringArray::from(created_ats)),
    ];

    RecordBatch::try_new(create_schema(vector_dim), arrays)
        .map_err(|e| SupportError::Database(format!("Failed to create record batch: {}", e)))
}

fn column<'a, T: Array + 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    batch
        .column_by_name(name)
        .ok_or_else(|| SupportError::Database(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| SupportError::Database(format!("Invalid {} column type", name)))
}

fn parse_search_batch(batch: &RecordBatch) -> Result<Vec<SearchResult>> {
    let texts = column::<StringArray>(batch, "text")?;
    let sources = column::<StringArray>(batch, "source")?;
    let pages = column::<UInt32Array>(batch, "page")?;
    let chunk_indices = column::<UInt32Array>(batch, "chunk_index")?;
    let distances = batch
        .column_by_name("_distance")
        .and_then(|col| col.as_any().downcast_ref::<Float32Array>());

    let results = (0..batch.num_rows())
        .map(|row| SearchResult {
            chunk: Chunk {
                text: texts.value(row).to_string(),
                source: PathBuf::from(sources.value(row)),
                page: pages.value(row),
                chunk_index: chunk_indices.value(row),
            },
            distance: distances.map_or(0.0, |d| if d.is_null(row) { 0.0 } else { d.value(row) }),
        })
        .collect();

    Ok(results)
}

async fn drop_table_if_exists(connection: &Connection) -> Result<()> {
    let table_names = connection
        .table_names()
        .execute()
        .await
        .map_err(|e| SupportError::Database(format!("Failed to list tables for drop: {}", e)))?;

    if table_names.iter().any(|name| name == TABLE_NAME) {
        info!("Dropping existing {} table", TABLE_NAME);
        connection
            .drop_table(TABLE_NAME)
            .await
            .map_err(|e| SupportError::Database(format!("Failed to drop table: {}", e)))?;
    }

    Ok(())
}

/// Clear read-only bits below `path` so the tree can be removed
fn make_writable(path: &Path) -> Result<()> {
    let metadata = fs::symlink_metadata(path)?;
    if metadata.file_type().is_symlink() {
        return Ok(());
    }

    let mut permissions = metadata.permissions();
    if permissions.readonly() {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            permissions.set_mode(permissions.mode() | 0o200);
        }
        #[cfg(not(unix))]
        {
            #[expect(
                clippy::permissions_set_readonly_false,
                reason = "only the owner matters on this platform"
            )]
            permissions.set_readonly(false);
        }
        fs::set_permissions(path, permissions)?;
    }

    if metadata.is_dir() {
        for entry in fs::read_dir(path)? {
            make_writable(&entry?.path())?;
        }
    }

    Ok(())
}
