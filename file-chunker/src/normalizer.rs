//! Line-level cleanup of extracted page text.
//!
//! PDF text layers repeat running headers and footers and leave short OCR
//! fragments behind. Within one page we keep each distinct line once
//! (case-insensitive, first occurrence wins) and drop lines that are too short
//! to carry content, then flatten the page into a single space-joined line.

use std::collections::HashSet;

use chunk_model::DocumentPage;

/// Lines with fewer characters than this (after trimming) are dropped.
pub const MIN_LINE_CHARS: usize = 5;

/// Clean one page worth of raw text.
pub fn clean_text(raw: &str) -> String {
    let mut seen: HashSet<String> = HashSet::new();
    let mut kept: Vec<&str> = Vec::new();

    for line in raw.lines() {
        let line = line.trim();
        if line.chars().count() < MIN_LINE_CHARS {
            continue;
        }
        if !seen.insert(line.to_lowercase()) {
            continue;
        }
        kept.push(line);
    }

    kept.join(" ")
}

/// Clean a page's content, keeping its metadata.
pub fn clean_page(page: DocumentPage) -> DocumentPage {
    let content = clean_text(&page.content);
    DocumentPage { meta: page.meta, content }
}

pub fn clean_pages(pages: Vec<DocumentPage>) -> Vec<DocumentPage> {
    pages.into_iter().map(clean_page).collect()
}
