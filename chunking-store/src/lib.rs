pub mod flat_index;
pub mod hnsw_index;
pub mod snapshot;

use std::path::PathBuf;

use chunk_model::ChunkRecord;
use serde::{Deserialize, Serialize};

use flat_index::FlatIndex;
use hnsw_index::HnswIndex;

pub use snapshot::{IndexManifest, SourceEntry, FORMAT_VERSION};

/// Distance used to rank neighbours. Smaller is closer for both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// Squared Euclidean distance.
    L2,
    /// `1 - cos(a, b)`. A zero vector is at distance 1.0 from everything.
    Cosine,
}

impl Metric {
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Metric::L2 => a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum(),
            Metric::Cosine => {
                let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
                let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
                let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
                if na == 0.0 || nb == 0.0 {
                    1.0
                } else {
                    1.0 - dot / (na * nb)
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexBackend {
    /// Exact brute-force search.
    Flat,
    /// Approximate search over an HNSW graph, rebuilt from the stored vectors on load.
    Hnsw,
}

impl std::fmt::Display for IndexBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            IndexBackend::Flat => "flat",
            IndexBackend::Hnsw => "hnsw",
        })
    }
}

/// One retrieved chunk and its distance to the query.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub chunk: ChunkRecord,
    pub distance: f32,
}

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("invalid index configuration: {0}")]
    InvalidConfig(String),
    #[error("vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("vector contains non-finite values")]
    NonFiniteVector,
    #[error("no index found at `{0}`")]
    Missing(PathBuf),
    #[error("io error on `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed index file `{path}`: {message}")]
    Corrupt { path: PathBuf, message: String },
    #[error("unsupported index format version {found} (expected {expected})")]
    UnsupportedFormat { found: u32, expected: u32 },
}

/// Nearest-neighbour engine over labelled vectors; labels are insertion positions.
pub trait VectorSearcher {
    fn name(&self) -> &'static str;
    fn dimension(&self) -> usize;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    /// Store `vector` under label `self.len()`. Callers check the dimension.
    fn insert(&mut self, vector: Vec<f32>);
    /// Up to `k` `(label, distance)` pairs, closest first.
    fn knn(&self, query: &[f32], k: usize) -> Vec<(usize, f32)>;
    /// Stored vectors in label order, for persistence.
    fn vectors(&self) -> &[Vec<f32>];
}

/// Chunks paired with their embedding vectors, searchable by similarity.
pub struct VectorIndex {
    backend: IndexBackend,
    metric: Metric,
    chunks: Vec<ChunkRecord>,
    searcher: Box<dyn VectorSearcher>,
}

impl std::fmt::Debug for VectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorIndex")
            .field("backend", &self.searcher.name())
            .field("metric", &self.metric)
            .field("dimension", &self.searcher.dimension())
            .field("len", &self.chunks.len())
            .finish()
    }
}

impl VectorIndex {
    pub fn new(
        backend: IndexBackend,
        metric: Metric,
        dimension: usize,
    ) -> Result<Self, IndexError> {
        Self::with_capacity(backend, metric, dimension, 0)
    }

    /// `expected` sizes the HNSW graph; the flat backend ignores it.
    pub fn with_capacity(
        backend: IndexBackend,
        metric: Metric,
        dimension: usize,
        expected: usize,
    ) -> Result<Self, IndexError> {
        if dimension == 0 {
            return Err(IndexError::InvalidConfig("dimension must be greater than zero".into()));
        }
        let searcher: Box<dyn VectorSearcher> = match backend {
            IndexBackend::Flat => Box::new(FlatIndex::new(dimension, metric)),
            IndexBackend::Hnsw => Box::new(HnswIndex::new(dimension, metric, expected)),
        };
        Ok(Self { backend, metric, chunks: Vec::with_capacity(expected), searcher })
    }

    pub fn add(&mut self, chunk: ChunkRecord, vector: Vec<f32>) -> Result<(), IndexError> {
        let expected = self.searcher.dimension();
        if vector.len() != expected {
            return Err(IndexError::DimensionMismatch { expected, actual: vector.len() });
        }
        if vector.iter().any(|x| !x.is_finite()) {
            return Err(IndexError::NonFiniteVector);
        }
        self.searcher.insert(vector);
        self.chunks.push(chunk);
        Ok(())
    }

    /// The `k` chunks closest to `query`, closest first. On the flat backend ties
    /// keep insertion order.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, IndexError> {
        let expected = self.searcher.dimension();
        if query.len() != expected {
            return Err(IndexError::DimensionMismatch { expected, actual: query.len() });
        }
        if k == 0 || self.searcher.is_empty() {
            return Ok(Vec::new());
        }
        let hits = self
            .searcher
            .knn(query, k)
            .into_iter()
            .filter_map(|(label, distance)| {
                self.chunks.get(label).map(|chunk| SearchHit { chunk: chunk.clone(), distance })
            })
            .collect();
        Ok(hits)
    }

    pub fn backend(&self) -> IndexBackend {
        self.backend
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    pub fn dimension(&self) -> usize {
        self.searcher.dimension()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn chunks(&self) -> &[ChunkRecord] {
        &self.chunks
    }

    pub fn vectors(&self) -> &[Vec<f32>] {
        self.searcher.vectors()
    }

    pub fn save(&self, manifest: &IndexManifest, dir: &std::path::Path) -> Result<(), IndexError> {
        snapshot::save(self, manifest, dir)
    }

    pub fn load(dir: &std::path::Path) -> Result<(Self, IndexManifest), IndexError> {
        snapshot::load(dir)
    }
}

/// Sort `(label, distance)` pairs closest first, breaking ties by label.
pub(crate) fn sort_neighbours(pairs: &mut [(usize, f32)]) {
    pairs.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
}
