use crate::{sort_neighbours, Metric, VectorSearcher};

/// Exact search: every query is compared against every stored vector.
pub struct FlatIndex {
    dim: usize,
    metric: Metric,
    vectors: Vec<Vec<f32>>,
}

impl FlatIndex {
    pub fn new(dim: usize, metric: Metric) -> Self {
        Self { dim, metric, vectors: Vec::new() }
    }
}

impl VectorSearcher for FlatIndex {
    fn name(&self) -> &'static str {
        "flat"
    }

    fn dimension(&self) -> usize {
        self.dim
    }

    fn len(&self) -> usize {
        self.vectors.len()
    }

    fn insert(&mut self, vector: Vec<f32>) {
        self.vectors.push(vector);
    }

    fn knn(&self, query: &[f32], k: usize) -> Vec<(usize, f32)> {
        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(label, v)| (label, self.metric.distance(query, v)))
            .collect();
        sort_neighbours(&mut scored);
        scored.truncate(k);
        scored
    }

    fn vectors(&self) -> &[Vec<f32>] {
        &self.vectors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_all_vectors_when_k_exceeds_len() {
        let mut idx = FlatIndex::new(2, Metric::L2);
        idx.insert(vec![1.0, 0.0]);
        idx.insert(vec![0.0, 1.0]);
        let out = idx.knn(&[0.9, 0.1], 10);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].0, 0);
        assert!(out[0].1 < out[1].1);
    }
}
