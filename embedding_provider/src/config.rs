use std::path::PathBuf;

use crate::embedder::{HashingConfig, OnnxStdIoConfig};

/// Default settings for the local ONNX embedder.
#[derive(Debug, Clone, Copy)]
pub struct OnnxStdIoDefaults {
    pub model_path: &'static str,
    pub tokenizer_path: &'static str,
    pub runtime_library_path: &'static str,
    pub embedding_dimension: usize,
    pub max_input_tokens: usize,
    pub embedding_model_id: &'static str,
    pub text_repr_version: &'static str,
    pub pad_token: &'static str,
}

#[cfg(target_os = "windows")]
const RUNTIME_LIBRARY: &str = "lib/onnxruntime.dll";
#[cfg(target_os = "macos")]
const RUNTIME_LIBRARY: &str = "lib/libonnxruntime.dylib";
#[cfg(not(any(target_os = "windows", target_os = "macos")))]
const RUNTIME_LIBRARY: &str = "lib/libonnxruntime.so";

/// Shared defaults so the CLI and tests stay in sync with the ingestion model.
pub const ONNX_STDIO_DEFAULTS: OnnxStdIoDefaults = OnnxStdIoDefaults {
    model_path: "models/all-MiniLM-L6-v2/model.onnx",
    tokenizer_path: "models/all-MiniLM-L6-v2/tokenizer.json",
    runtime_library_path: RUNTIME_LIBRARY,
    embedding_dimension: 384,
    max_input_tokens: 256,
    embedding_model_id: "sentence-transformers/all-MiniLM-L6-v2",
    text_repr_version: "v1",
    pad_token: "[PAD]",
};

/// Build an [`OnnxStdIoConfig`] from the shared defaults, with asset paths
/// resolved against `base` (usually the working directory).
pub fn default_stdio_config_in(base: impl Into<PathBuf>) -> OnnxStdIoConfig {
    let base = base.into();

    OnnxStdIoConfig {
        model_path: base.join(ONNX_STDIO_DEFAULTS.model_path),
        tokenizer_path: base.join(ONNX_STDIO_DEFAULTS.tokenizer_path),
        runtime_library_path: base.join(ONNX_STDIO_DEFAULTS.runtime_library_path),
        dimension: ONNX_STDIO_DEFAULTS.embedding_dimension,
        max_input_length: ONNX_STDIO_DEFAULTS.max_input_tokens,
        embedding_model_id: ONNX_STDIO_DEFAULTS.embedding_model_id.into(),
        text_repr_version: ONNX_STDIO_DEFAULTS.text_repr_version.into(),
        pad_token: ONNX_STDIO_DEFAULTS.pad_token.into(),
        truncate: true,
        normalize: true,
    }
}

pub fn default_stdio_config() -> OnnxStdIoConfig {
    default_stdio_config_in(".")
}

pub fn default_hashing_config() -> HashingConfig {
    HashingConfig {
        dimension: 384,
        max_input_length: 100_000,
        embedding_model_id: "hashing-bow".into(),
        text_repr_version: "v1".into(),
    }
}
