//! Shared models used across crates

use serde::{Deserialize, Serialize};

/// Label used when a page carries neither a page label nor a page index.
pub const UNKNOWN_PAGE: &str = "unknown";

/// Where a piece of text came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageMeta {
    /// File name of the source document.
    pub source: String,
    /// Zero-based page index within the source, when known.
    #[serde(default)]
    pub page: Option<u32>,
    /// Human-facing page label (e.g. "iv" or "12"), when known.
    #[serde(default)]
    pub page_label: Option<String>,
}

impl PageMeta {
    pub fn new(source: impl Into<String>) -> Self {
        Self { source: source.into(), page: None, page_label: None }
    }

    /// Metadata for page `index` (zero-based), labelled with its one-based number.
    pub fn for_page(source: impl Into<String>, index: u32) -> Self {
        Self {
            source: source.into(),
            page: Some(index),
            page_label: Some((index + 1).to_string()),
        }
    }

    /// Page shown to the user: `page_label`, then `page`, then "unknown".
    pub fn display_page(&self) -> String {
        match (&self.page_label, self.page) {
            (Some(label), _) if !label.trim().is_empty() => label.trim().to_string(),
            (_, Some(p)) => p.to_string(),
            _ => UNKNOWN_PAGE.to_string(),
        }
    }

    pub fn citation(&self) -> Citation {
        Citation { source: self.source.clone(), page: self.display_page() }
    }
}

/// Text of one PDF page plus its metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentPage {
    pub meta: PageMeta,
    pub content: String,
}

impl DocumentPage {
    pub fn new(meta: PageMeta, content: impl Into<String>) -> Self {
        Self { meta, content: content.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkId(pub String);

impl std::fmt::Display for ChunkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single chunk of text derived from one cleaned page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRecord {
    /// Unique id for this chunk within an index.
    pub chunk_id: ChunkId,
    /// Metadata inherited from the page the chunk was cut from.
    pub meta: PageMeta,
    /// Stable order of the chunk within its source file.
    pub order: u32,
    /// Character offset (inclusive) of the chunk within the cleaned page text.
    pub char_start: usize,
    /// Character offset (exclusive) of the chunk within the cleaned page text.
    pub char_end: usize,
    /// Text content of the chunk.
    pub text: String,
}

impl ChunkRecord {
    pub fn new(
        meta: PageMeta,
        order: u32,
        char_start: usize,
        char_end: usize,
        text: impl Into<String>,
    ) -> Self {
        let page = meta.page.map(|p| p.to_string()).unwrap_or_else(|| "-".into());
        Self {
            chunk_id: ChunkId(format!("{}#p{}#{}", meta.source, page, order)),
            meta,
            order,
            char_start,
            char_end,
            text: text.into(),
        }
    }

    pub fn char_len(&self) -> usize {
        self.char_end - self.char_start
    }
}

/// A (source, page) pair identifying where retrieved content originated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Citation {
    pub source: String,
    pub page: String,
}

impl std::fmt::Display for Citation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}, Page {}", self.source, self.page)
    }
}

/// Deduplicate citations by the (source, page) pair, keeping first-seen order.
pub fn dedup_citations<I>(citations: I) -> Vec<Citation>
where
    I: IntoIterator<Item = Citation>,
{
    let mut seen = std::collections::HashSet::new();
    citations
        .into_iter()
        .filter(|c| seen.insert(c.clone()))
        .collect()
}
