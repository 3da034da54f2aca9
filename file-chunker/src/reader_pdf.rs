//! Pure-Rust PDF reader backed by `lopdf`: one [`DocumentPage`] per PDF page.

use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use chunk_model::{DocumentPage, PageMeta};
use lopdf::Document;
use sha2::Digest;

#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error("corpus directory `{0}` does not exist")]
    MissingDirectory(PathBuf),
    #[error("io error on `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse PDF `{path}`: {message}")]
    Pdf { path: PathBuf, message: String },
}

/// A loaded PDF file: name, content fingerprint and raw page texts.
#[derive(Debug, Clone)]
pub struct PdfFile {
    /// File name used as the citation source.
    pub name: String,
    pub sha256: String,
    pub pages: Vec<DocumentPage>,
}

/// List `*.pdf` files (extension case-insensitive) directly inside `dir`, sorted by name.
pub fn list_pdf_files(dir: &Path) -> Result<Vec<PathBuf>, ReadError> {
    if !dir.is_dir() {
        return Err(ReadError::MissingDirectory(dir.to_path_buf()));
    }
    let entries = fs::read_dir(dir).map_err(|source| ReadError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut out = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| ReadError::Io { path: dir.to_path_buf(), source })?;
        let path = entry.path();
        let is_pdf = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("pdf"))
            .unwrap_or(false);
        if is_pdf && path.is_file() {
            out.push(path);
        }
    }
    out.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(out)
}

/// Read every page of a PDF. Pages whose text cannot be extracted come back empty.
pub fn read_pdf(path: &Path) -> Result<PdfFile, ReadError> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let sha256 = compute_sha256_hex(path)?;

    let doc = Document::load(path).map_err(|err| ReadError::Pdf {
        path: path.to_path_buf(),
        message: err.to_string(),
    })?;

    let mut pages = Vec::new();
    // get_pages is keyed by one-based page number, already in page order
    for (index, page_num) in doc.get_pages().into_keys().enumerate() {
        let text = match doc.extract_text(&[page_num]) {
            Ok(t) => t,
            Err(err) => {
                tracing::warn!(file = %name, page = page_num, "text extraction failed: {err}");
                String::new()
            }
        };
        pages.push(DocumentPage::new(PageMeta::for_page(name.clone(), index as u32), text));
    }
    tracing::debug!(file = %name, pages = pages.len(), "read pdf");

    Ok(PdfFile { name, sha256, pages })
}

/// Page texts of a PDF without the file-level fingerprint.
pub fn read_pdf_pages(path: &Path) -> Result<Vec<DocumentPage>, ReadError> {
    read_pdf(path).map(|file| file.pages)
}

fn compute_sha256_hex(path: &Path) -> Result<String, ReadError> {
    let io_err = |source| ReadError::Io { path: path.to_path_buf(), source };
    let f = File::open(path).map_err(io_err)?;
    let mut reader = BufReader::new(f);
    let mut hasher = sha2::Sha256::new();
    let mut buf = [0u8; 32 * 1024];
    loop {
        let n = reader.read(&mut buf).map_err(io_err)?;
        if n == 0 { break; }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}
