//! Knowledge engine
//!
//! Owns the knowledge directory and the current index generation. `reload`
//! builds a complete new index and swaps it in; searches already running
//! keep the generation they started with.

use super::{
    load_dir, KnowledgeDocument, KnowledgeIndex, SearchOptions, SearchResult, Tokenizer,
};
use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One row of `list_documents`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentSummary {
    pub id: String,
    pub title: String,
    pub category: String,
    pub version_max: String,
    pub updated_at: String,
}

pub struct KnowledgeEngine {
    dir: PathBuf,
    tokenizer: Tokenizer,
    current: RwLock<Arc<KnowledgeIndex>>,
}

impl KnowledgeEngine {
    /// Engine over `dir` with nothing loaded yet
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            tokenizer: Tokenizer::default(),
            current: RwLock::new(Arc::new(KnowledgeIndex::default())),
        }
    }

    /// Engine over `dir`, loaded immediately
    pub fn load(dir: impl Into<PathBuf>) -> Self {
        let engine = Self::new(dir);
        engine.reload();
        engine
    }

    pub fn with_tokenizer(mut self, tokenizer: Tokenizer) -> Self {
        self.tokenizer = tokenizer;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Re-read the directory and swap in a fresh index. Returns the number
    /// of documents loaded.
    pub fn reload(&self) -> usize {
        let documents = load_dir(&self.dir);
        let index = KnowledgeIndex::build_with(documents, self.tokenizer.clone());
        let count = index.len();

        tracing::info!(
            dir = %self.dir.display(),
            documents = count,
            tokens = index.token_count(),
            "Knowledge loaded"
        );

        *self.current.write() = Arc::new(index);
        count
    }

    /// The current index generation
    pub fn snapshot(&self) -> Arc<KnowledgeIndex> {
        self.current.read().clone()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    pub fn search(&self, query: &str, options: &SearchOptions) -> Vec<SearchResult> {
        self.snapshot().search(query, options)
    }

    pub fn get_document(&self, id: &str) -> Option<KnowledgeDocument> {
        self.snapshot().get_document(id).cloned()
    }

    pub fn list_documents(&self) -> Vec<DocumentSummary> {
        self.snapshot()
            .documents()
            .iter()
            .map(|d| DocumentSummary {
                id: d.metadata.id.clone(),
                title: d.metadata.title.clone(),
                category: d.metadata.category.clone(),
                version_max: d.metadata.version_max.clone(),
                updated_at: d.metadata.updated_at.clone(),
            })
            .collect()
    }

    /// Human-readable digest of every document with a freshness warning
    pub fn freshness_report(&self, target_version: Option<&str>) -> String {
        let warnings = self.snapshot().check_all_freshness(target_version, Utc::now());
        if warnings.is_empty() {
            return "All knowledge documents are current.".to_string();
        }

        let mut lines = vec!["The following knowledge documents may need updating:\n".to_string()];
        for w in warnings {
            lines.push(format!("- **{}** ({}): {}", w.title, w.doc_id, w.warning));
        }
        lines.join("\n")
    }

    /// Render results as one prompt-ready text block
    pub fn format_search_results(results: &[SearchResult]) -> String {
        if results.is_empty() {
            return "No matching knowledge found.".to_string();
        }

        let mut lines: Vec<String> = Vec::new();
        for r in results {
            lines.push(format!(
                "## {} (MC {} - {})",
                r.title, r.metadata.version_min, r.metadata.version_max
            ));
            let source = if r.metadata.source.is_empty() {
                "internal knowledge"
            } else {
                r.metadata.source.as_str()
            };
            lines.push(format!("Source: {}", source));
            let verified = if r.metadata.source_verified_at.is_empty() {
                &r.metadata.updated_at
            } else {
                &r.metadata.source_verified_at
            };
            lines.push(format!("Last verified: {}", verified));

            if let Some(warning) = &r.freshness_warning {
                lines.push(format!("\n{}", warning));
            }

            lines.push(String::new());
            for section in &r.matched_sections {
                if !section.heading.is_empty() {
                    lines.push(format!("### {}", section.heading));
                }
                lines.push(section.content.clone());
                lines.push(String::new());
            }
            lines.push("---".to_string());
        }

        lines.join("\n")
    }

    /// Drop all loaded documents
    pub fn dispose(&self) {
        *self.current.write() = Arc::new(KnowledgeIndex::default());
    }
}
