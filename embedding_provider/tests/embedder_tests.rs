use embedding_provider::config::{default_hashing_config, default_stdio_config, ONNX_STDIO_DEFAULTS};
use embedding_provider::embedder::{
    Embedder, EmbedderError, HashingConfig, HashingEmbedder, OnnxStdIoConfig, OnnxStdIoEmbedder,
    ProviderKind,
};

fn stdio_config(max_input_length: usize, truncate: bool) -> OnnxStdIoConfig {
    let mut config = default_stdio_config();
    config.max_input_length = max_input_length;
    config.truncate = truncate;
    config
}

fn assert_vectors_close(lhs: &[f32], rhs: &[f32]) {
    assert_eq!(lhs.len(), rhs.len(), "vector lengths differ");
    for (index, (a, b)) in lhs.iter().zip(rhs.iter()).enumerate() {
        let diff = (a - b).abs();
        assert!(
            diff <= 1e-4,
            "vectors diverge at position {index}: {a} vs {b} (diff {diff})"
        );
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[test]
#[ignore = "needs models/all-MiniLM-L6-v2 and the ONNX Runtime library"]
fn stdio_embedder_produces_deterministic_unit_vectors() {
    let embedder = OnnxStdIoEmbedder::new(stdio_config(ONNX_STDIO_DEFAULTS.max_input_tokens, true))
        .expect("configuration is valid and model loads");

    let sentence = "Software validation shows that a system conforms to its specification.";
    let vector_a = embedder.embed(sentence).expect("first embedding succeeds");
    let vector_b = embedder.embed(sentence).expect("second embedding succeeds");

    assert_eq!(vector_a.len(), ONNX_STDIO_DEFAULTS.embedding_dimension);
    assert_vectors_close(&vector_a, &vector_b);
    assert!((cosine(&vector_a, &vector_a) - 1.0).abs() < 1e-3, "vectors are L2-normalized");

    let info = embedder.info();
    assert_eq!(info.provider, ProviderKind::OnnxStdIo);
    assert_eq!(info.dimension, ONNX_STDIO_DEFAULTS.embedding_dimension);
    assert_eq!(
        info.embedding_model_id,
        ONNX_STDIO_DEFAULTS.embedding_model_id
    );
}

#[test]
#[ignore = "needs models/all-MiniLM-L6-v2 and the ONNX Runtime library"]
fn embed_batch_matches_individual_embeddings() {
    let embedder = OnnxStdIoEmbedder::new(stdio_config(ONNX_STDIO_DEFAULTS.max_input_tokens, true))
        .expect("configuration is valid and model loads");

    let inputs = [
        "requirements engineering produces a specification",
        "software evolution keeps systems useful",
    ];
    let batch_vectors = embedder
        .embed_batch(&inputs)
        .expect("batch embedding succeeds");

    assert_eq!(batch_vectors.len(), inputs.len());

    for (input, batch_vector) in inputs.iter().zip(batch_vectors.iter()) {
        let single = embedder.embed(input).expect("single embedding succeeds");
        assert_vectors_close(&single, batch_vector);
    }
}

#[test]
#[ignore = "needs models/all-MiniLM-L6-v2 and the ONNX Runtime library"]
fn enforcing_max_input_length_returns_error() {
    let embedder =
        OnnxStdIoEmbedder::new(stdio_config(8, false)).expect("configuration is valid and model loads");
    let too_long = "notes ".repeat(64);

    let err = embedder
        .embed(&too_long)
        .expect_err("inputs exceeding max tokens should fail");

    match err {
        EmbedderError::InputTooLong {
            max_length,
            actual_length,
        } => {
            assert_eq!(max_length, 8);
            assert!(actual_length > max_length);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn stdio_embedder_reports_missing_runtime() {
    let mut config = stdio_config(ONNX_STDIO_DEFAULTS.max_input_tokens, true);
    config.runtime_library_path = "does/not/exist/libonnxruntime.so".into();
    let err = OnnxStdIoEmbedder::new(config).expect_err("missing runtime must fail");
    assert!(matches!(err, EmbedderError::InvalidConfiguration { .. }), "{err:?}");
}

#[test]
fn hashing_embedder_is_deterministic_and_normalized() {
    let embedder = HashingEmbedder::new(default_hashing_config()).expect("configuration is valid");
    let a = embedder.embed("Software validation and verification").unwrap();
    let b = embedder.embed("Software validation and verification").unwrap();
    assert_eq!(a, b);
    assert_eq!(a.len(), 384);
    assert!((cosine(&a, &a) - 1.0).abs() < 1e-5);

    let info = embedder.info();
    assert_eq!(info.provider, ProviderKind::Hashing);
    assert_eq!(info.embedding_model_id, "hashing-bow");
}

#[test]
fn hashing_embedder_ignores_case_and_punctuation() {
    let embedder = HashingEmbedder::new(default_hashing_config()).unwrap();
    let a = embedder.embed("What is software VALIDATION?").unwrap();
    let b = embedder.embed("what is software validation").unwrap();
    assert_vectors_close(&a, &b);
}

#[test]
fn hashing_embedder_places_related_text_closer() {
    let embedder = HashingEmbedder::new(default_hashing_config()).unwrap();
    let query = embedder.embed("software validation testing").unwrap();
    let related = embedder.embed("validation testing shows the software meets its requirements").unwrap();
    let unrelated = embedder.embed("the waterfall model has separate phases").unwrap();
    assert!(cosine(&query, &related) > cosine(&query, &unrelated));
}

#[test]
fn hashing_embedder_handles_batches_and_limits() {
    let config = HashingConfig { max_input_length: 10, ..default_hashing_config() };
    let embedder = HashingEmbedder::new(config).unwrap();

    let empty: [&str; 0] = [];
    assert!(embedder.embed_batch(&empty).unwrap().is_empty());

    let batch = embedder.embed_batch(&["short", "tiny"]).unwrap();
    assert_eq!(batch.len(), 2);

    match embedder.embed("this input is too long") {
        Err(EmbedderError::InputTooLong { max_length, actual_length }) => {
            assert_eq!(max_length, 10);
            assert_eq!(actual_length, 22);
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn invalid_hashing_config_is_rejected() {
    let config = HashingConfig { dimension: 0, ..default_hashing_config() };
    assert!(matches!(
        HashingEmbedder::new(config),
        Err(EmbedderError::InvalidConfiguration { .. })
    ));
}

#[test]
fn hashing_embedder_buckets_are_fixed() {
    // saved hashing indexes depend on these staying put
    let embedder = HashingEmbedder::new(default_hashing_config()).unwrap();

    let validation = embedder.embed("Validation").unwrap();
    assert_eq!(validation[310], -1.0);
    assert_eq!(validation.iter().filter(|x| **x != 0.0).count(), 1);

    let software = embedder.embed("software").unwrap();
    assert_eq!(software[339], 1.0);
    assert_eq!(software.iter().filter(|x| **x != 0.0).count(), 1);
}
