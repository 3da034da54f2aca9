//! Directory snapshots of a [`VectorIndex`].
//!
//! Layout:
//! - `manifest.json`: [`IndexManifest`]
//! - `chunks.jsonl`: one [`ChunkRecord`] per line, in label order
//! - `vectors.bin`: `[u32 dim][f32; dim]` per vector, little-endian, in label order
//!
//! [`save`] writes into a sibling temp directory and swaps it into place, so a
//! reader sees either the previous snapshot or the new one.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use chunk_model::ChunkRecord;
use serde::{Deserialize, Serialize};

use crate::{IndexBackend, IndexError, Metric, VectorIndex};

pub const FORMAT_VERSION: u32 = 1;

const MANIFEST_FILE: &str = "manifest.json";
const CHUNKS_FILE: &str = "chunks.jsonl";
const VECTORS_FILE: &str = "vectors.bin";

/// One ingested PDF as recorded in the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceEntry {
    pub name: String,
    pub sha256: String,
    pub pages: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexManifest {
    pub format_version: u32,
    pub backend: IndexBackend,
    pub metric: Metric,
    pub dimension: usize,
    pub embedding_model_id: String,
    pub text_repr_version: String,
    pub chunk_count: usize,
    /// RFC 3339 timestamp of the build.
    pub created_at: String,
    pub sources: Vec<SourceEntry>,
}

impl IndexManifest {
    /// Describe `index` as built by the named embedding model right now.
    pub fn for_index(
        index: &VectorIndex,
        embedding_model_id: impl Into<String>,
        text_repr_version: impl Into<String>,
        sources: Vec<SourceEntry>,
    ) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            backend: index.backend(),
            metric: index.metric(),
            dimension: index.dimension(),
            embedding_model_id: embedding_model_id.into(),
            text_repr_version: text_repr_version.into(),
            chunk_count: index.len(),
            created_at: chrono::Utc::now().to_rfc3339(),
            sources,
        }
    }
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> IndexError + '_ {
    move |source| IndexError::Io { path: path.to_path_buf(), source }
}

fn corrupt(path: &Path, message: impl Into<String>) -> IndexError {
    IndexError::Corrupt { path: path.to_path_buf(), message: message.into() }
}

/// Write `index` and `manifest` to `dir`, replacing whatever was there.
pub fn save(index: &VectorIndex, manifest: &IndexManifest, dir: &Path) -> Result<(), IndexError> {
    if manifest.dimension != index.dimension() || manifest.chunk_count != index.len() {
        return Err(IndexError::InvalidConfig(format!(
            "manifest describes {} chunks of dimension {}, index holds {} of dimension {}",
            manifest.chunk_count,
            manifest.dimension,
            index.len(),
            index.dimension()
        )));
    }

    let tmp = sibling(dir, "tmp");
    if tmp.exists() {
        fs::remove_dir_all(&tmp).map_err(io_err(&tmp))?;
    }
    fs::create_dir_all(&tmp).map_err(io_err(&tmp))?;

    if let Err(err) = write_files(index, manifest, &tmp) {
        let _ = fs::remove_dir_all(&tmp);
        return Err(err);
    }
    swap_into_place(&tmp, dir)?;
    tracing::info!(
        dir = %dir.display(),
        chunks = index.len(),
        backend = %index.backend(),
        "saved index"
    );
    Ok(())
}

fn write_files(
    index: &VectorIndex,
    manifest: &IndexManifest,
    dir: &Path,
) -> Result<(), IndexError> {
    let manifest_path = dir.join(MANIFEST_FILE);
    let json = serde_json::to_vec_pretty(manifest)
        .map_err(|e| corrupt(&manifest_path, e.to_string()))?;
    fs::write(&manifest_path, json).map_err(io_err(&manifest_path))?;

    let chunks_path = dir.join(CHUNKS_FILE);
    {
        let mut w = BufWriter::new(File::create(&chunks_path).map_err(io_err(&chunks_path))?);
        for chunk in index.chunks() {
            serde_json::to_writer(&mut w, chunk).map_err(|e| corrupt(&chunks_path, e.to_string()))?;
            w.write_all(b"\n").map_err(io_err(&chunks_path))?;
        }
        w.flush().map_err(io_err(&chunks_path))?;
    }

    let vectors_path = dir.join(VECTORS_FILE);
    {
        let mut w = BufWriter::new(File::create(&vectors_path).map_err(io_err(&vectors_path))?);
        for v in index.vectors() {
            let dim = v.len() as u32;
            w.write_all(&dim.to_le_bytes()).map_err(io_err(&vectors_path))?;
            w.write_all(bytemuck::cast_slice(&v[..])).map_err(io_err(&vectors_path))?;
        }
        w.flush().map_err(io_err(&vectors_path))?;
    }
    Ok(())
}

fn swap_into_place(tmp: &Path, dir: &Path) -> Result<(), IndexError> {
    if !dir.exists() {
        return fs::rename(tmp, dir).map_err(io_err(dir));
    }
    let old = sibling(dir, "old");
    if old.exists() {
        fs::remove_dir_all(&old).map_err(io_err(&old))?;
    }
    fs::rename(dir, &old).map_err(io_err(dir))?;
    if let Err(source) = fs::rename(tmp, dir) {
        // put the previous snapshot back
        let _ = fs::rename(&old, dir);
        return Err(IndexError::Io { path: dir.to_path_buf(), source });
    }
    if let Err(err) = fs::remove_dir_all(&old) {
        tracing::warn!(path = %old.display(), "failed to remove previous index: {err}");
    }
    Ok(())
}

fn sibling(dir: &Path, suffix: &str) -> PathBuf {
    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "index".into());
    dir.with_file_name(format!(".{name}.{suffix}"))
}

/// Read only the manifest of the snapshot in `dir`.
pub fn load_manifest(dir: &Path) -> Result<IndexManifest, IndexError> {
    let path = dir.join(MANIFEST_FILE);
    if !path.is_file() {
        return Err(IndexError::Missing(dir.to_path_buf()));
    }
    let bytes = fs::read(&path).map_err(io_err(&path))?;
    let manifest: IndexManifest =
        serde_json::from_slice(&bytes).map_err(|e| corrupt(&path, e.to_string()))?;
    if manifest.format_version != FORMAT_VERSION {
        return Err(IndexError::UnsupportedFormat {
            found: manifest.format_version,
            expected: FORMAT_VERSION,
        });
    }
    Ok(manifest)
}

/// Load the snapshot in `dir`, rebuilding the search structure it was saved with.
pub fn load(dir: &Path) -> Result<(VectorIndex, IndexManifest), IndexError> {
    let manifest = load_manifest(dir)?;
    let chunks = read_chunks(&dir.join(CHUNKS_FILE))?;
    let vectors = read_vectors(&dir.join(VECTORS_FILE), manifest.dimension)?;

    if chunks.len() != manifest.chunk_count || vectors.len() != manifest.chunk_count {
        return Err(corrupt(
            dir,
            format!(
                "manifest lists {} chunks, found {} chunks and {} vectors",
                manifest.chunk_count,
                chunks.len(),
                vectors.len()
            ),
        ));
    }

    let mut index = VectorIndex::with_capacity(
        manifest.backend,
        manifest.metric,
        manifest.dimension,
        chunks.len(),
    )?;
    for (chunk, vector) in chunks.into_iter().zip(vectors) {
        index.add(chunk, vector)?;
    }
    tracing::debug!(dir = %dir.display(), chunks = index.len(), "loaded index");
    Ok((index, manifest))
}

fn read_chunks(path: &Path) -> Result<Vec<ChunkRecord>, IndexError> {
    let f = File::open(path).map_err(io_err(path))?;
    let mut out = Vec::new();
    for (line_no, line) in BufReader::new(f).lines().enumerate() {
        let line = line.map_err(io_err(path))?;
        if line.trim().is_empty() {
            continue;
        }
        let chunk: ChunkRecord =
            serde_json::from_str(&line).map_err(|e| {
                corrupt(path, format!("line {}: {e}", line_no + 1))
            })?;
        out.push(chunk);
    }
    Ok(out)
}

fn read_vectors(path: &Path, dimension: usize) -> Result<Vec<Vec<f32>>, IndexError> {
    let f = File::open(path).map_err(io_err(path))?;
    let file_len = f.metadata().map_err(io_err(path))?.len();
    let record_len = 4 + (dimension as u64) * 4;
    if file_len % record_len != 0 {
        return Err(corrupt(
            path,
            format!("{file_len} bytes is not a whole number of {dimension}-d vectors"),
        ));
    }
    let mut r = BufReader::new(f);
    let mut out = Vec::with_capacity((file_len / record_len) as usize);
    loop {
        let mut len_buf = [0u8; 4];
        match r.read_exact(&mut len_buf) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(IndexError::Io { path: path.to_path_buf(), source: e }),
        }
        let dim = u32::from_le_bytes(len_buf) as usize;
        if dim != dimension {
            return Err(corrupt(
                path,
                format!("vector #{} has dimension {dim}, manifest says {dimension}", out.len()),
            ));
        }
        let mut v = vec![0f32; dim];
        r.read_exact(bytemuck::cast_slice_mut(&mut v[..]))
            .map_err(|_| corrupt(path, format!("truncated vector #{}", out.len())))?;
        out.push(v);
    }
    Ok(out)
}
