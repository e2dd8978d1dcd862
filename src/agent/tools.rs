// Tools the agent may call

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use super::prompt::{NO_RESULTS, TOOL_DESCRIPTION, TOOL_NAME, query_parameters};
use crate::database::VectorIndex;
use crate::provider::ToolDefinition;

#[async_trait]
pub trait Tool: Send + Sync {
    fn definition(&self) -> ToolDefinition;

    async fn call(&self, args: &Value) -> Result<String>;

    #[inline]
    fn name(&self) -> String {
        self.definition().name
    }
}

/// Knowledge base search over the vector index
pub struct RetrievalTool {
    index: Arc<VectorIndex>,
    k: usize,
}

impl RetrievalTool {
    #[inline]
    pub fn new(index: Arc<VectorIndex>, k: usize) -> Self {
        Self { index, k }
    }
}

#[async_trait]
impl Tool for RetrievalTool {
    #[inline]
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: TOOL_NAME.to_string(),
            description: TOOL_DESCRIPTION.to_string(),
            parameters: query_parameters(),
        }
    }

    #[inline]
    async fn call(&self, args: &Value) -> Result<String> {
        let query = query_argument(args)?;
        debug!("Knowledge base search: {}", query);

        let results = self
            .index
            .search(query, self.k)
            .await
            .context("Knowledge base search failed")?;

        if results.is_empty() {
            return Ok(NO_RESULTS.to_string());
        }

        Ok(results
            .into_iter()
            .map(|r| r.chunk.text)
            .collect::<Vec<_>>()
            .join("\n\n"))
    }
}

/// Extract the `query` argument. A bare string is accepted as the query itself.
pub(crate) fn query_argument(args: &Value) -> Result<&str> {
    let query = match args {
        Value::String(query) => Some(query.as_str()),
        Value::Object(map) => map.get("query").and_then(Value::as_str),
        _ => None,
    };

    query
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .ok_or_else(|| anyhow::anyhow!("missing required string argument `query`"))
}
