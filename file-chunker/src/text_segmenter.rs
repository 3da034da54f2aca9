//! Overlapping window segmenter over cleaned page text.
//!
//! All offsets are in characters, not bytes. A window ends at the best scored
//! boundary in `[start + min_chunk_chars, start + chunk_size]` (hard cut when
//! there is none) and the next window starts at the latest word start that
//! still leaves `chunk_overlap` characters of shared context.

use chunk_model::{ChunkRecord, DocumentPage};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextChunkParams {
    /// Hard cap on characters per chunk.
    pub chunk_size: usize,
    /// Minimum characters repeated between consecutive chunks.
    pub chunk_overlap: usize,
    /// Prefer chunk lengths >= this many characters before looking for a boundary.
    pub min_chunk_chars: usize,
}

impl Default for TextChunkParams {
    fn default() -> Self {
        Self { chunk_size: 800, chunk_overlap: 150, min_chunk_chars: 400 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SegmentError {
    #[error("chunk_size must be greater than zero")]
    ZeroChunkSize,
    #[error("chunk_overlap ({overlap}) must be smaller than chunk_size ({size})")]
    OverlapTooLarge { overlap: usize, size: usize },
}

impl TextChunkParams {
    pub fn validate(&self) -> Result<(), SegmentError> {
        if self.chunk_size == 0 {
            return Err(SegmentError::ZeroChunkSize);
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(SegmentError::OverlapTooLarge {
                overlap: self.chunk_overlap,
                size: self.chunk_size,
            });
        }
        Ok(())
    }

    /// Effective lower bound of the boundary search window; always past the overlap.
    fn min_len(&self) -> usize {
        self.min_chunk_chars.clamp(self.chunk_overlap + 1, self.chunk_size)
    }
}

/// One window of the input: `text` is exactly `chars[start..end]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub start: usize,
    pub end: usize,
    pub text: String,
}

#[derive(Debug, Clone, Copy)]
struct Boundary { idx: usize, base_score: f32 }

/// Cut positions, each placed right after a whitespace character.
fn collect_boundaries(chars: &[char]) -> Vec<Boundary> {
    let mut boundaries: Vec<Boundary> = Vec::new();
    let mut i = 0usize;
    while i < chars.len() {
        let ch = chars[i];
        if ch == '\n' {
            if i + 1 < chars.len() && chars[i + 1] == '\n' {
                boundaries.push(Boundary { idx: i + 2, base_score: 1.0 });
                i += 2;
                continue;
            }
            boundaries.push(Boundary { idx: i + 1, base_score: 0.8 });
        } else if ch.is_whitespace() {
            let after_sentence = i > 0 && matches!(chars[i - 1], '.' | '!' | '?' | ':' | ';');
            let score = if after_sentence { 0.6 } else { 0.3 };
            boundaries.push(Boundary { idx: i + 1, base_score: score });
        }
        i += 1;
    }

    // Sort and dedup by idx (keep highest base_score)
    boundaries.sort_by_key(|b| b.idx);
    boundaries.dedup_by(|a, b| {
        if a.idx == b.idx {
            if a.base_score > b.base_score { b.base_score = a.base_score; }
            true
        } else { false }
    });
    boundaries
}

fn pick_boundary_in_range(
    scored: &[Boundary],
    lo: usize,
    hi: usize,
    prefer: usize,
) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for b in scored {
        if b.idx < lo || b.idx > hi { continue; }
        let dist = b.idx.abs_diff(prefer) as f32;
        let span = (hi.saturating_sub(lo)) as f32 + 1.0;
        let eff = b.base_score - dist / span;
        match best {
            Some((_, s)) if eff <= s => {}
            _ => best = Some((b.idx, eff)),
        }
    }
    best.map(|(i, _)| i)
}

/// Split `text` into overlapping windows. Empty or whitespace-only text yields nothing.
pub fn split_text(text: &str, params: &TextChunkParams) -> Result<Vec<Segment>, SegmentError> {
    params.validate()?;
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let chars: Vec<char> = text.chars().collect();
    let total = chars.len();
    let make = |start: usize, end: usize| Segment {
        start,
        end,
        text: chars[start..end].iter().collect(),
    };

    if total <= params.chunk_size {
        return Ok(vec![make(0, total)]);
    }

    let boundaries = collect_boundaries(&chars);
    let min_len = params.min_len();
    let mut out = Vec::new();
    let mut start = 0usize;
    loop {
        if total - start <= params.chunk_size {
            out.push(make(start, total));
            break;
        }
        let lo = start + min_len;
        let hi = start + params.chunk_size;
        let end = pick_boundary_in_range(&boundaries, lo, hi, hi).unwrap_or(hi);
        out.push(make(start, end));

        // end >= start + min_len > start + overlap, so `limit` is past `start`
        let limit = end - params.chunk_overlap;
        start = boundaries
            .iter()
            .rev()
            .map(|b| b.idx)
            .find(|&idx| idx > start && idx <= limit)
            .unwrap_or(limit);
    }
    Ok(out)
}

/// Chunk each page independently; chunk `order` counts up per source file.
pub fn chunk_pages(
    pages: &[DocumentPage],
    params: &TextChunkParams,
) -> Result<Vec<ChunkRecord>, SegmentError> {
    params.validate()?;
    let mut order_by_source: HashMap<&str, u32> = HashMap::new();
    let mut out = Vec::new();
    for page in pages {
        for seg in split_text(&page.content, params)? {
            let order = order_by_source.entry(page.meta.source.as_str()).or_insert(0);
            out.push(ChunkRecord::new(page.meta.clone(), *order, seg.start, seg.end, seg.text));
            *order += 1;
        }
    }
    Ok(out)
}

/// Rebuild the original text from consecutive overlapping segments.
pub fn stitch_segments(segments: &[Segment]) -> String {
    let mut out = String::new();
    let mut covered = 0usize;
    for seg in segments {
        let skip = covered.saturating_sub(seg.start);
        out.extend(seg.text.chars().skip(skip));
        covered = covered.max(seg.end);
    }
    out
}
