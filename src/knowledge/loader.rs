//! Knowledge document loading
//!
//! A document is a `---` delimited metadata block of `key: value` lines
//! followed by a Markdown body split into sections at `#`..`####` headings.

use super::{KnowledgeDocument, KnowledgeError, KnowledgeMetadata, KnowledgeSection, DEFAULT_FRESHNESS_DAYS};
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;
use walkdir::WalkDir;

fn metadata_block() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)\A---\r?\n(.*?)\r?\n---(?:\r?\n(.*))?\z").expect("valid metadata regex")
    })
}

fn heading_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(#{1,4})\s+(.+)").expect("valid heading regex"))
}

/// Load every `.md` file directly inside `dir`, in file-name order.
///
/// A missing directory yields no documents. Files that fail to load are
/// skipped with a warning.
pub fn load_dir(dir: &Path) -> Vec<KnowledgeDocument> {
    if !dir.is_dir() {
        tracing::debug!(dir = %dir.display(), "Knowledge directory not found");
        return Vec::new();
    }

    let mut documents = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if !entry.file_type().is_file() || path.extension().and_then(|e| e.to_str()) != Some("md") {
            continue;
        }

        match load_file(path) {
            Ok(doc) => documents.push(doc),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Skipping knowledge file");
            }
        }
    }

    documents
}

/// Load and parse a single document
pub fn load_file(path: &Path) -> Result<KnowledgeDocument, KnowledgeError> {
    let raw = std::fs::read_to_string(path)?;
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();

    let mut doc = parse_document(&raw, stem)
        .ok_or_else(|| KnowledgeError::MissingMetadata(path.display().to_string()))?;
    doc.file_path = path.to_path_buf();
    Ok(doc)
}

/// Parse document text. `fallback_id` is used when the metadata has no `id`.
/// Returns `None` when there is no metadata block.
pub fn parse_document(raw: &str, fallback_id: &str) -> Option<KnowledgeDocument> {
    let captures = metadata_block().captures(raw)?;
    let block = captures.get(1).map_or("", |m| m.as_str());
    let body = captures.get(2).map_or("", |m| m.as_str());

    let mut metadata = parse_metadata(block);
    if metadata.id.is_empty() {
        metadata.id = fallback_id.to_string();
    }

    Some(KnowledgeDocument {
        metadata,
        sections: parse_sections(body),
        raw_content: body.to_string(),
        file_path: Default::default(),
    })
}

fn strip_quotes(value: &str) -> &str {
    let value = value.strip_prefix(['"', '\'']).unwrap_or(value);
    value.strip_suffix(['"', '\'']).unwrap_or(value)
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .trim_start_matches('[')
        .trim_end_matches(']')
        .split(',')
        .map(|item| strip_quotes(item.trim()).trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

fn parse_metadata(block: &str) -> KnowledgeMetadata {
    let mut metadata = KnowledgeMetadata::default();

    for line in block.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();

        match key.trim() {
            "tags" => metadata.tags = parse_list(value),
            key => {
                let value = strip_quotes(value).to_string();
                match key {
                    "id" => metadata.id = value,
                    "title" => metadata.title = value,
                    "category" => metadata.category = value,
                    "version_min" | "mc_version_min" => metadata.version_min = value,
                    "version_max" | "mc_version_max" => metadata.version_max = value,
                    "created_at" => metadata.created_at = value,
                    "updated_at" => metadata.updated_at = value,
                    "source" => metadata.source = value,
                    "source_verified_at" => metadata.source_verified_at = value,
                    "freshness_days" => {
                        metadata.freshness_days = value.parse().unwrap_or(DEFAULT_FRESHNESS_DAYS)
                    }
                    _ => {}
                }
            }
        }
    }

    metadata
}

fn parse_sections(body: &str) -> Vec<KnowledgeSection> {
    let mut sections = Vec::new();
    let mut heading = String::new();
    let mut level = 0u8;
    let mut content: Vec<&str> = Vec::new();

    let mut flush = |heading: &str, level: u8, content: &[&str]| {
        let text = content.join("\n").trim().to_string();
        // Whitespace-only preamble is not a section
        if !heading.is_empty() || !text.is_empty() {
            sections.push(KnowledgeSection {
                heading: heading.to_string(),
                level,
                content: text,
            });
        }
    };

    for line in body.split('\n') {
        match heading_line().captures(line) {
            Some(caps) => {
                flush(&heading, level, &content);
                level = caps[1].len() as u8;
                heading = caps[2].trim().to_string();
                content.clear();
            }
            None => content.push(line),
        }
    }
    flush(&heading, level, &content);

    sections
}
