pub mod normalizer;
pub mod reader_pdf;
pub mod text_segmenter;

use std::path::Path;

use chunk_model::ChunkRecord;
use text_segmenter::{SegmentError, TextChunkParams};

pub use normalizer::{clean_page, clean_pages, clean_text};
pub use reader_pdf::{list_pdf_files, read_pdf, read_pdf_pages, PdfFile, ReadError};

/// Result bundle for one PDF: the loaded file (pages already cleaned) and its chunks.
#[derive(Debug, Clone)]
pub struct ChunkOutput {
    pub file: PdfFile,
    pub chunks: Vec<ChunkRecord>,
}

#[derive(Debug, thiserror::Error)]
pub enum ChunkFileError {
    #[error(transparent)]
    Read(#[from] ReadError),
    #[error(transparent)]
    Segment(#[from] SegmentError),
}

/// High-level entry: read a PDF, clean every page, chunk the cleaned pages.
pub fn chunk_pdf_file(
    path: &Path,
    params: &TextChunkParams,
) -> Result<ChunkOutput, ChunkFileError> {
    let mut file = read_pdf(path)?;
    file.pages = clean_pages(std::mem::take(&mut file.pages));
    let chunks = text_segmenter::chunk_pages(&file.pages, params)?;
    Ok(ChunkOutput { file, chunks })
}
