//! Knowledge base
//!
//! Curated Markdown documents with a metadata block, loaded from a directory,
//! indexed into an in-memory inverted index and searched by keyword. Every
//! search result carries a freshness annotation computed at query time.
//!
//! - `loader`: metadata block and section parsing
//! - `index`: tokenizer, inverted index, scoring, freshness checks
//! - `engine`: reload/search façade shared by the prompt builder and tools

mod engine;
mod index;
mod loader;

pub use engine::{DocumentSummary, KnowledgeEngine};
pub use index::{
    check_freshness, parse_version, FreshnessWarning, KnowledgeIndex, SearchOptions, SearchResult,
    Tokenizer,
};
pub use loader::{load_dir, load_file, parse_document};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Days after which a document is considered possibly stale
pub const DEFAULT_FRESHNESS_DAYS: u32 = 180;

/// Default cap on search results
pub const DEFAULT_MAX_RESULTS: usize = 5;

/// Errors raised while loading a single document
#[derive(Debug, thiserror::Error)]
pub enum KnowledgeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("No metadata block found in {0}")]
    MissingMetadata(String),
}

/// Metadata block of a knowledge document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeMetadata {
    pub id: String,
    pub title: String,
    pub category: String,
    pub tags: Vec<String>,
    /// Oldest product version the document covers
    pub version_min: String,
    /// Newest product version the document was verified against
    pub version_max: String,
    pub created_at: String,
    pub updated_at: String,
    pub source: String,
    pub source_verified_at: String,
    pub freshness_days: u32,
}

impl Default for KnowledgeMetadata {
    fn default() -> Self {
        Self {
            id: String::new(),
            title: String::new(),
            category: String::new(),
            tags: Vec::new(),
            version_min: String::new(),
            version_max: String::new(),
            created_at: String::new(),
            updated_at: String::new(),
            source: String::new(),
            source_verified_at: String::new(),
            freshness_days: DEFAULT_FRESHNESS_DAYS,
        }
    }
}

/// A heading-delimited part of a document body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeSection {
    /// Empty for text before the first heading
    pub heading: String,
    /// Number of `#` markers, 0 for the preamble
    pub level: u8,
    pub content: String,
}

/// A loaded document; immutable until the next reload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeDocument {
    pub metadata: KnowledgeMetadata,
    pub sections: Vec<KnowledgeSection>,
    /// Body text after the metadata block
    pub raw_content: String,
    pub file_path: PathBuf,
}
