//! Query knowledge tool - keyword search over the knowledge base, or direct
//! lookup of one document by id

use crate::knowledge::{KnowledgeEngine, SearchOptions};
use crate::tool::{Tool, ToolContext, ToolDefinition, ToolError, ToolOutput};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
struct Args {
    query: String,
    #[serde(default)]
    category: Option<String>,
    #[serde(default, alias = "docId")]
    doc_id: Option<String>,
}

pub struct QueryKnowledgeTool {
    engine: Arc<KnowledgeEngine>,
    target_version: Option<String>,
    max_results: usize,
}

impl QueryKnowledgeTool {
    pub fn new(engine: Arc<KnowledgeEngine>) -> Self {
        Self {
            engine,
            target_version: None,
            max_results: 3,
        }
    }

    pub fn with_target_version(mut self, version: impl Into<String>) -> Self {
        self.target_version = Some(version.into());
        self
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    fn lookup(&self, doc_id: &str) -> Result<ToolOutput, ToolError> {
        let doc = self
            .engine
            .get_document(doc_id)
            .ok_or_else(|| ToolError::Failed(format!("Document \"{}\" not found.", doc_id)))?;

        let meta = &doc.metadata;
        let source = if meta.source.is_empty() {
            "internal knowledge"
        } else {
            meta.source.as_str()
        };
        let verified = if meta.source_verified_at.is_empty() {
            meta.updated_at.as_str()
        } else {
            meta.source_verified_at.as_str()
        };

        let output = format!(
            "## {}\nMC versions: {} - {}\nSource: {}\nLast verified: {}\n\n{}",
            meta.title, meta.version_min, meta.version_max, source, verified, doc.raw_content
        );
        Ok(ToolOutput::new(output).with_metadata(json!({ "doc_id": meta.id })))
    }
}

#[async_trait]
impl Tool for QueryKnowledgeTool {
    fn name(&self) -> &str {
        "query_knowledge"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "query_knowledge".to_string(),
            description: "Search the knowledge base of Bedrock add-on specifications: components, \
                          format_version values, constraints, vanilla ids. Do not guess; check \
                          with this tool."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Search keywords, e.g. \"minecraft:damage item\" or \"block light\""
                    },
                    "category": {
                        "type": "string",
                        "description": "Category filter: component, structure, reference, constraint"
                    },
                    "doc_id": {
                        "type": "string",
                        "description": "Return one document directly by id, e.g. \"items\""
                    }
                },
                "required": ["query"]
            }),
        }
    }

    async fn execute(&self, args: serde_json::Value, _ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
        let args: Args = serde_json::from_value(args)?;

        if let Some(doc_id) = args.doc_id.as_deref().filter(|id| !id.is_empty()) {
            return self.lookup(doc_id);
        }

        let mut options = SearchOptions::new().with_max_results(self.max_results);
        if let Some(category) = args.category.filter(|c| !c.is_empty()) {
            options = options.with_category(category);
        }
        if let Some(version) = &self.target_version {
            options = options.with_target_version(version.clone());
        }

        let results = self.engine.search(&args.query, &options);
        tracing::debug!(query = %args.query, results = results.len(), "Knowledge queried");

        Ok(ToolOutput::new(KnowledgeEngine::format_search_results(&results)).with_metadata(json!({
            "result_count": results.len(),
            "query": args.query,
        })))
    }
}
