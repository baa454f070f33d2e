//! Inverted index over knowledge documents
//!
//! Built once per load from a fixed document set and never mutated
//! afterwards; a reload builds a new index.

use super::{
    KnowledgeDocument, KnowledgeMetadata, KnowledgeSection, DEFAULT_MAX_RESULTS,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

const TAG_WEIGHT: u32 = 3;
const TITLE_WEIGHT: u32 = 2;
const HEADING_WEIGHT: u32 = 2;
const BODY_WEIGHT: u32 = 1;

const EXACT_FACTOR: f64 = 2.0;
const PREFIX_FACTOR: f64 = 0.5;

/// Sections returned when a hit matched no specific section
const FALLBACK_SECTIONS: usize = 3;

/// Splits text into index keys: namespaced ids (`minecraft:stone`), ASCII
/// words of two or more characters, and runs of two or more CJK characters.
#[derive(Debug, Clone)]
pub struct Tokenizer {
    namespaced_id: Regex,
    punctuation: Regex,
    word: Regex,
    cjk: Regex,
}

impl Tokenizer {
    /// Tokenizer preserving `<namespace>:<id>` identifiers
    pub fn new(namespace: &str) -> Self {
        let namespaced_id = format!(r"{}:\S+", regex::escape(namespace));
        Self {
            namespaced_id: Regex::new(&namespaced_id).expect("escaped namespace is a valid regex"),
            punctuation: Regex::new(r#"[`*#\-|>{}()\[\]"']"#).expect("valid punctuation regex"),
            word: Regex::new(r"[a-z_][a-z0-9_]+").expect("valid word regex"),
            cjk: Regex::new(r"[\x{3040}-\x{309F}\x{30A0}-\x{30FF}\x{4E00}-\x{9FFF}]{2,}")
                .expect("valid cjk regex"),
        }
    }

    pub fn tokenize(&self, text: &str) -> Vec<String> {
        if text.is_empty() {
            return Vec::new();
        }

        let mut tokens: Vec<String> = self
            .namespaced_id
            .find_iter(text)
            .map(|m| m.as_str().to_lowercase())
            .collect();

        let without_ids = self.namespaced_id.replace_all(text, "");
        let cleaned = self.punctuation.replace_all(&without_ids, " ").to_lowercase();

        tokens.extend(self.word.find_iter(&cleaned).map(|m| m.as_str().to_string()));
        tokens.extend(self.cjk.find_iter(&cleaned).map(|m| m.as_str().to_string()));
        tokens
    }
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::new("minecraft")
    }
}

/// One posting: a token's accumulated weight in a document or one of its
/// sections. `section == None` is a document-level (title/tag) hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Posting {
    doc: usize,
    section: Option<usize>,
    weight: u32,
}

/// Search options
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchOptions {
    /// Only documents in this category
    pub category: Option<String>,
    /// Result cap, 5 when unset
    pub max_results: Option<usize>,
    /// Version the caller is targeting, for drift warnings
    pub target_version: Option<String>,
}

impl SearchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = Some(max_results);
        self
    }

    pub fn with_target_version(mut self, version: impl Into<String>) -> Self {
        self.target_version = Some(version.into());
        self
    }
}

/// A scored search hit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub doc_id: String,
    pub title: String,
    pub score: f64,
    pub matched_sections: Vec<KnowledgeSection>,
    pub metadata: KnowledgeMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub freshness_warning: Option<String>,
}

/// A document whose freshness check produced a warning
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FreshnessWarning {
    pub doc_id: String,
    pub title: String,
    pub warning: String,
}

/// In-memory inverted index owning its documents
#[derive(Debug, Clone, Default)]
pub struct KnowledgeIndex {
    documents: Vec<KnowledgeDocument>,
    by_id: HashMap<String, usize>,
    postings: BTreeMap<String, Vec<Posting>>,
    tokenizer: Tokenizer,
}

impl KnowledgeIndex {
    /// Build an index with the default tokenizer
    pub fn build(documents: Vec<KnowledgeDocument>) -> Self {
        Self::build_with(documents, Tokenizer::default())
    }

    pub fn build_with(documents: Vec<KnowledgeDocument>, tokenizer: Tokenizer) -> Self {
        let mut index = Self {
            documents: Vec::with_capacity(documents.len()),
            by_id: HashMap::new(),
            postings: BTreeMap::new(),
            tokenizer,
        };

        for doc in documents {
            if index.by_id.contains_key(&doc.metadata.id) {
                tracing::warn!(
                    id = %doc.metadata.id,
                    path = %doc.file_path.display(),
                    "Duplicate knowledge document id; keeping the first"
                );
                continue;
            }
            index.add_document(doc);
        }

        index
    }

    fn add_document(&mut self, doc: KnowledgeDocument) {
        let pos = self.documents.len();

        let mut entries: Vec<(String, Option<usize>, u32)> = Vec::new();
        for tag in &doc.metadata.tags {
            for token in self.tokenizer.tokenize(tag) {
                entries.push((token, None, TAG_WEIGHT));
            }
        }
        for token in self.tokenizer.tokenize(&doc.metadata.title) {
            entries.push((token, None, TITLE_WEIGHT));
        }
        for (i, section) in doc.sections.iter().enumerate() {
            for token in self.tokenizer.tokenize(&section.heading) {
                entries.push((token, Some(i), HEADING_WEIGHT));
            }
            for token in self.tokenizer.tokenize(&section.content) {
                entries.push((token, Some(i), BODY_WEIGHT));
            }
        }

        for (token, section, weight) in entries {
            let list = self.postings.entry(token).or_default();
            match list.iter_mut().find(|p| p.doc == pos && p.section == section) {
                Some(existing) => existing.weight += weight,
                None => list.push(Posting {
                    doc: pos,
                    section,
                    weight,
                }),
            }
        }

        self.by_id.insert(doc.metadata.id.clone(), pos);
        self.documents.push(doc);
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn documents(&self) -> &[KnowledgeDocument] {
        &self.documents
    }

    pub fn get_document(&self, id: &str) -> Option<&KnowledgeDocument> {
        self.by_id.get(id).map(|&pos| &self.documents[pos])
    }

    /// Number of distinct index keys
    pub fn token_count(&self) -> usize {
        self.postings.len()
    }

    pub fn search(&self, query: &str, options: &SearchOptions) -> Vec<SearchResult> {
        self.search_at(query, options, Utc::now())
    }

    /// Search with freshness evaluated at `now`
    pub fn search_at(
        &self,
        query: &str,
        options: &SearchOptions,
        now: DateTime<Utc>,
    ) -> Vec<SearchResult> {
        let mut scores: HashMap<usize, (f64, BTreeSet<usize>)> = HashMap::new();

        let mut credit = |postings: &[Posting], factor: f64| {
            for posting in postings {
                let entry = scores.entry(posting.doc).or_default();
                entry.0 += posting.weight as f64 * factor;
                if let Some(section) = posting.section {
                    entry.1.insert(section);
                }
            }
        };

        for word in self.tokenizer.tokenize(query) {
            if let Some(postings) = self.postings.get(&word) {
                credit(postings.as_slice(), EXACT_FACTOR);
            }

            for (key, postings) in &self.postings {
                if key != &word && (key.starts_with(&word) || word.starts_with(key.as_str())) {
                    credit(postings.as_slice(), PREFIX_FACTOR);
                }
            }
        }

        let mut results: Vec<SearchResult> = scores
            .into_iter()
            .filter_map(|(pos, (score, sections))| {
                let doc = &self.documents[pos];
                if let Some(category) = &options.category {
                    if &doc.metadata.category != category {
                        return None;
                    }
                }

                let matched: Vec<KnowledgeSection> = sections
                    .into_iter()
                    .filter_map(|i| doc.sections.get(i).cloned())
                    .collect();
                let matched_sections = if matched.is_empty() {
                    doc.sections.iter().take(FALLBACK_SECTIONS).cloned().collect()
                } else {
                    matched
                };

                Some(SearchResult {
                    doc_id: doc.metadata.id.clone(),
                    title: doc.metadata.title.clone(),
                    score,
                    matched_sections,
                    metadata: doc.metadata.clone(),
                    freshness_warning: check_freshness(
                        &doc.metadata,
                        options.target_version.as_deref(),
                        now,
                    ),
                })
            })
            .collect();

        results.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.doc_id.cmp(&b.doc_id))
        });
        results.truncate(options.max_results.unwrap_or(DEFAULT_MAX_RESULTS));
        results
    }

    /// Freshness warnings for every document, in load order
    pub fn check_all_freshness(
        &self,
        target_version: Option<&str>,
        now: DateTime<Utc>,
    ) -> Vec<FreshnessWarning> {
        self.documents
            .iter()
            .filter_map(|doc| {
                check_freshness(&doc.metadata, target_version, now).map(|warning| FreshnessWarning {
                    doc_id: doc.metadata.id.clone(),
                    title: doc.metadata.title.clone(),
                    warning,
                })
            })
            .collect()
    }
}

/// Parse `major.minor.patch[...]`; fewer than three parts or any
/// non-numeric part yields `None`.
pub fn parse_version(version: &str) -> Option<(u64, u64, u64)> {
    let parts: Vec<u64> = version
        .trim()
        .split('.')
        .map(|p| p.parse::<u64>().ok())
        .collect::<Option<Vec<_>>>()?;
    if parts.len() < 3 {
        return None;
    }
    Some((parts[0], parts[1], parts[2]))
}

/// Accepts RFC 3339, `YYYY-MM-DDTHH:MM:SS` and plain dates (midnight UTC)
fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S") {
        return Some(ts.and_utc());
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|ts| ts.and_utc())
}

/// Staleness and version-drift warnings for one document, joined by newlines
pub fn check_freshness(
    metadata: &KnowledgeMetadata,
    target_version: Option<&str>,
    now: DateTime<Utc>,
) -> Option<String> {
    let mut warnings = Vec::new();

    if let Some(updated) = parse_timestamp(&metadata.updated_at) {
        let days = now.signed_duration_since(updated).num_days();
        if days > metadata.freshness_days as i64 {
            warnings.push(format!(
                "This information is {} days old (last updated: {}). It may have changed in the latest version.",
                days, metadata.updated_at
            ));
        }
    }

    if let Some(target) = target_version.filter(|t| !t.is_empty()) {
        if !metadata.version_max.is_empty() {
            if let (Some(wanted), Some(covered)) =
                (parse_version(target), parse_version(&metadata.version_max))
            {
                if wanted.0 > covered.0 || (wanted.0 == covered.0 && wanted.1 > covered.1) {
                    warnings.push(format!(
                        "This information was verified up to version {}. Behavior may differ in target version {}.",
                        metadata.version_max, target
                    ));
                }
            }
        }
    }

    if warnings.is_empty() {
        None
    } else {
        Some(warnings.join("\n"))
    }
}
