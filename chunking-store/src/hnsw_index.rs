use hnsw_rs::prelude::*;

use crate::{sort_neighbours, Metric, VectorSearcher};

const MAX_NB_CONN: usize = 16;
const EF_CONSTRUCTION: usize = 200;
const NUM_LAYERS: usize = 16;
const MIN_EF_SEARCH: usize = 64;

enum Graph {
    L2(Hnsw<'static, f32, DistL2>),
    Cosine(Hnsw<'static, f32, DistCosine>),
}

/// HNSW-based approximate index. Keeps the raw vectors so snapshots can be
/// written and the graph rebuilt on load.
///
/// The graph only proposes candidates; reported distances come from
/// [`Metric::distance`] so they agree with the flat index.
pub struct HnswIndex {
    dim: usize,
    metric: Metric,
    graph: Graph,
    vectors: Vec<Vec<f32>>,
}

impl HnswIndex {
    pub fn new(dim: usize, metric: Metric, expected: usize) -> Self {
        let expected = expected.max(1000);
        let graph = match metric {
            Metric::L2 => Graph::L2(Hnsw::<f32, DistL2>::new(
                MAX_NB_CONN,
                expected,
                NUM_LAYERS,
                EF_CONSTRUCTION,
                DistL2 {},
            )),
            Metric::Cosine => Graph::Cosine(Hnsw::<f32, DistCosine>::new(
                MAX_NB_CONN,
                expected,
                NUM_LAYERS,
                EF_CONSTRUCTION,
                DistCosine {},
            )),
        };
        Self { dim, metric, graph, vectors: Vec::new() }
    }
}

impl VectorSearcher for HnswIndex {
    fn name(&self) -> &'static str {
        "hnsw"
    }

    fn dimension(&self) -> usize {
        self.dim
    }

    fn len(&self) -> usize {
        self.vectors.len()
    }

    fn insert(&mut self, vector: Vec<f32>) {
        let label = self.vectors.len();
        match &self.graph {
            Graph::L2(h) => h.insert((&vector[..], label)),
            Graph::Cosine(h) => h.insert((&vector[..], label)),
        }
        self.vectors.push(vector);
    }

    fn knn(&self, query: &[f32], k: usize) -> Vec<(usize, f32)> {
        if self.vectors.is_empty() || k == 0 {
            return Vec::new();
        }
        let ef_s = k.saturating_mul(10).max(MIN_EF_SEARCH);
        let candidates = match &self.graph {
            Graph::L2(h) => h.search(query, k, ef_s),
            Graph::Cosine(h) => h.search(query, k, ef_s),
        };
        let mut out: Vec<(usize, f32)> = candidates
            .into_iter()
            .filter_map(|n| {
                let v = self.vectors.get(n.d_id)?;
                Some((n.d_id, self.metric.distance(query, v)))
            })
            .collect();
        sort_neighbours(&mut out);
        out.truncate(k);
        out
    }

    fn vectors(&self) -> &[Vec<f32>] {
        &self.vectors
    }
}
