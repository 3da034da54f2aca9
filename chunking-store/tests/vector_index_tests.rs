use std::fs;

use chunk_model::{ChunkRecord, PageMeta};
use chunking_store::snapshot::{load_manifest, FORMAT_VERSION};
use chunking_store::{IndexBackend, IndexError, IndexManifest, Metric, SourceEntry, VectorIndex};
use tempfile::tempdir;

fn chunk(source: &str, page: u32, order: u32, text: &str) -> ChunkRecord {
    ChunkRecord::new(PageMeta::for_page(source, page), order, 0, text.chars().count(), text)
}

/// Four unit-ish vectors in 3D with distinct texts.
fn sample_index(backend: IndexBackend, metric: Metric) -> VectorIndex {
    let mut idx = VectorIndex::new(backend, metric, 3).unwrap();
    idx.add(chunk("ch1.pdf", 0, 0, "software specification"), vec![1.0, 0.0, 0.0]).unwrap();
    idx.add(chunk("ch1.pdf", 1, 1, "software validation"), vec![0.0, 1.0, 0.0]).unwrap();
    idx.add(chunk("ch2.pdf", 0, 0, "software evolution"), vec![0.0, 0.0, 1.0]).unwrap();
    idx.add(chunk("ch2.pdf", 1, 1, "validation and testing"), vec![0.1, 0.9, 0.0]).unwrap();
    idx
}

fn manifest_for(idx: &VectorIndex) -> IndexManifest {
    IndexManifest::for_index(
        idx,
        "hashing-bow",
        "v1",
        vec![
            SourceEntry { name: "ch1.pdf".into(), sha256: "aa".into(), pages: 2 },
            SourceEntry { name: "ch2.pdf".into(), sha256: "bb".into(), pages: 2 },
        ],
    )
}

fn texts(hits: &[chunking_store::SearchHit]) -> Vec<&str> {
    hits.iter().map(|h| h.chunk.text.as_str()).collect()
}

#[test]
fn flat_search_orders_closest_first() {
    let idx = sample_index(IndexBackend::Flat, Metric::L2);
    let hits = idx.search(&[0.0, 1.0, 0.0], 2).unwrap();
    assert_eq!(texts(&hits), vec!["software validation", "validation and testing"]);
    assert_eq!(hits[0].distance, 0.0);
    assert!(hits[0].distance <= hits[1].distance);
}

#[test]
fn result_length_is_min_of_k_and_size() {
    let idx = sample_index(IndexBackend::Flat, Metric::Cosine);
    assert_eq!(idx.search(&[1.0, 1.0, 1.0], 10).unwrap().len(), 4);
    assert!(idx.search(&[1.0, 1.0, 1.0], 0).unwrap().is_empty());

    let empty = VectorIndex::new(IndexBackend::Flat, Metric::L2, 3).unwrap();
    assert!(empty.search(&[1.0, 0.0, 0.0], 4).unwrap().is_empty());
}

#[test]
fn dimension_is_enforced() {
    let mut idx = VectorIndex::new(IndexBackend::Flat, Metric::L2, 3).unwrap();
    let err = idx.add(chunk("a.pdf", 0, 0, "x"), vec![1.0, 2.0]).unwrap_err();
    assert!(matches!(err, IndexError::DimensionMismatch { expected: 3, actual: 2 }));
    assert!(matches!(idx.add(chunk("a.pdf", 0, 0, "x"), vec![f32::NAN, 0.0, 0.0]), Err(IndexError::NonFiniteVector)));
    assert!(matches!(idx.search(&[1.0], 1), Err(IndexError::DimensionMismatch { .. })));
    assert!(matches!(VectorIndex::new(IndexBackend::Flat, Metric::L2, 0), Err(IndexError::InvalidConfig(_))));
}

#[test]
fn hnsw_finds_the_same_nearest_neighbour() {
    for metric in [Metric::L2, Metric::Cosine] {
        let flat = sample_index(IndexBackend::Flat, metric);
        let hnsw = sample_index(IndexBackend::Hnsw, metric);
        let query = [0.0, 1.0, 0.2];
        let a = flat.search(&query, 1).unwrap();
        let b = hnsw.search(&query, 1).unwrap();
        assert_eq!(a[0].chunk.text, "software validation", "{metric:?}");
        assert_eq!(a[0].chunk, b[0].chunk, "{metric:?}");
        assert!((a[0].distance - b[0].distance).abs() < 1e-4, "{metric:?}");
    }
}

#[test]
fn zero_vector_is_equally_far_under_cosine_on_both_backends() {
    for backend in [IndexBackend::Flat, IndexBackend::Hnsw] {
        let idx = sample_index(backend, Metric::Cosine);
        let hits = idx.search(&[0.0, 0.0, 0.0], 2).unwrap();
        assert_eq!(hits.len(), 2, "{backend}");
        assert!(hits.iter().all(|h| h.distance == 1.0), "{backend}: {hits:?}");
    }
}

#[test]
fn save_then_load_gives_identical_results() {
    for backend in [IndexBackend::Flat, IndexBackend::Hnsw] {
        let dir = tempdir().unwrap();
        let target = dir.path().join("embeddings");
        let idx = sample_index(backend, Metric::L2);
        let manifest = manifest_for(&idx);
        idx.save(&manifest, &target).unwrap();

        assert!(target.join("manifest.json").is_file());
        assert!(target.join("chunks.jsonl").is_file());
        assert!(target.join("vectors.bin").is_file());

        let (loaded, loaded_manifest) = VectorIndex::load(&target).unwrap();
        assert_eq!(loaded.backend(), backend);
        assert_eq!(loaded_manifest, manifest);
        assert_eq!(loaded.chunks(), idx.chunks());
        assert_eq!(loaded.vectors(), idx.vectors());

        for query in [[1.0, 0.0, 0.0], [0.2, 0.7, 0.1], [0.0, 0.0, -1.0]] {
            assert_eq!(idx.search(&query, 3).unwrap(), loaded.search(&query, 3).unwrap(), "{backend}");
        }
    }
}

#[test]
fn hnsw_snapshot_of_many_vectors_searches_like_the_original() {
    let dir = tempdir().unwrap();
    let target = dir.path().join("embeddings");
    let mut idx = VectorIndex::with_capacity(IndexBackend::Hnsw, Metric::Cosine, 8, 500).unwrap();
    for i in 0..500u32 {
        let vector: Vec<f32> = (0..8u32).map(|j| (((i * 31 + j * 17) % 97) as f32) - 48.0).collect();
        idx.add(chunk("big.pdf", i / 10, i % 10, &format!("chunk {i}")), vector).unwrap();
    }
    idx.save(&IndexManifest::for_index(&idx, "hashing-bow", "v1", Vec::new()), &target).unwrap();

    let (loaded, _) = VectorIndex::load(&target).unwrap();
    assert_eq!(loaded.vectors(), idx.vectors());
    for i in (0..500usize).step_by(25) {
        let query = idx.vectors()[i].clone();
        let before = idx.search(&query, 5).unwrap();
        let after = loaded.search(&query, 5).unwrap();
        assert_eq!(before.len(), 5);
        assert_eq!(before[0].distance, after[0].distance);
        assert!(after[0].distance < 1e-5);
    }
}

#[test]
fn manifest_records_build_settings() {
    let idx = sample_index(IndexBackend::Hnsw, Metric::Cosine);
    let manifest = manifest_for(&idx);
    assert_eq!(manifest.format_version, FORMAT_VERSION);
    assert_eq!(manifest.backend, IndexBackend::Hnsw);
    assert_eq!(manifest.metric, Metric::Cosine);
    assert_eq!(manifest.dimension, 3);
    assert_eq!(manifest.chunk_count, 4);
    assert!(chrono::DateTime::parse_from_rfc3339(&manifest.created_at).is_ok());

    let json = serde_json::to_value(&manifest).unwrap();
    assert_eq!(json["backend"], "hnsw");
    assert_eq!(json["metric"], "cosine");
}

#[test]
fn save_replaces_previous_snapshot_completely() {
    let dir = tempdir().unwrap();
    let target = dir.path().join("embeddings");
    let idx = sample_index(IndexBackend::Flat, Metric::L2);
    idx.save(&manifest_for(&idx), &target).unwrap();
    fs::write(target.join("stale.txt"), "left over").unwrap();

    let mut smaller = VectorIndex::new(IndexBackend::Flat, Metric::L2, 3).unwrap();
    smaller.add(chunk("new.pdf", 0, 0, "only chunk"), vec![1.0, 1.0, 1.0]).unwrap();
    smaller.save(&manifest_for(&smaller), &target).unwrap();

    assert!(!target.join("stale.txt").exists());
    let (loaded, manifest) = VectorIndex::load(&target).unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(manifest.chunk_count, 1);

    let leftovers: Vec<_> = fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(leftovers, vec!["embeddings".to_string()]);
}

#[test]
fn missing_directory_is_reported() {
    let dir = tempdir().unwrap();
    let target = dir.path().join("nope");
    assert!(matches!(VectorIndex::load(&target), Err(IndexError::Missing(p)) if p == target));
}

#[test]
fn truncated_snapshot_is_corrupt() {
    let dir = tempdir().unwrap();
    let target = dir.path().join("embeddings");
    let idx = sample_index(IndexBackend::Flat, Metric::L2);
    idx.save(&manifest_for(&idx), &target).unwrap();

    let jsonl = fs::read_to_string(target.join("chunks.jsonl")).unwrap();
    let first_line = jsonl.lines().next().unwrap().to_string();
    fs::write(target.join("chunks.jsonl"), first_line + "\n").unwrap();

    assert!(matches!(VectorIndex::load(&target), Err(IndexError::Corrupt { .. })));
}

#[test]
fn vector_header_disagreeing_with_manifest_is_corrupt() {
    let dir = tempdir().unwrap();
    let target = dir.path().join("embeddings");
    let idx = sample_index(IndexBackend::Flat, Metric::L2);
    idx.save(&manifest_for(&idx), &target).unwrap();

    fs::write(target.join("vectors.bin"), 0xFFFF_FFF0u32.to_le_bytes()).unwrap();
    assert!(matches!(VectorIndex::load(&target), Err(IndexError::Corrupt { .. })));

    // whole records, but each claims a dimension of 4
    let mut bytes = Vec::new();
    for _ in 0..4 {
        bytes.extend_from_slice(&4u32.to_le_bytes());
        bytes.extend_from_slice(&[0u8; 8]);
    }
    fs::write(target.join("vectors.bin"), bytes).unwrap();
    assert!(matches!(VectorIndex::load(&target), Err(IndexError::Corrupt { .. })));
}

#[test]
fn unknown_format_version_is_rejected() {
    let dir = tempdir().unwrap();
    let target = dir.path().join("embeddings");
    let idx = sample_index(IndexBackend::Flat, Metric::L2);
    let mut manifest = manifest_for(&idx);
    manifest.format_version = FORMAT_VERSION + 1;
    idx.save(&manifest, &target).unwrap();

    assert!(matches!(
        load_manifest(&target),
        Err(IndexError::UnsupportedFormat { found, expected }) if found == FORMAT_VERSION + 1 && expected == FORMAT_VERSION
    ));
}

#[test]
fn mismatched_manifest_is_not_saved() {
    let dir = tempdir().unwrap();
    let target = dir.path().join("embeddings");
    let idx = sample_index(IndexBackend::Flat, Metric::L2);
    let mut manifest = manifest_for(&idx);
    manifest.chunk_count = 99;
    assert!(matches!(idx.save(&manifest, &target), Err(IndexError::InvalidConfig(_))));
    assert!(!target.exists());
}
