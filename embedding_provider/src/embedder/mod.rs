use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

use ndarray::Array2;
use ort::{Error as OrtError, session::Session, value::Tensor};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokenizers::{Encoding, Tokenizer, TruncationParams};

/// Identifies the backing implementation that powers an embedder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    OnnxStdIo,
    Hashing,
}

/// Static metadata describing a particular embedder instance.
///
/// An index built with one embedder can only be queried with an embedder
/// reporting the same `embedding_model_id`, `dimension` and `text_repr_version`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedderInfo {
    pub provider: ProviderKind,
    pub embedding_model_id: String,
    pub dimension: usize,
    pub text_repr_version: String,
}

/// Errors that can be produced by embedder operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EmbedderError {
    #[error("invalid embedder configuration: {message}")]
    InvalidConfiguration { message: String },
    #[error("input text exceeds max length of {max_length} tokens, actual length: {actual_length}")]
    InputTooLong {
        max_length: usize,
        actual_length: usize,
    },
    #[error("provider failure: {message}")]
    ProviderFailure { message: String },
}

/// Core interface for all embedder implementations.
///
/// Implementations must be deterministic: identical text yields an identical vector.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError>;
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError>;
    fn info(&self) -> &EmbedderInfo;
}

/// Configuration for a local ONNX sentence-embedding model.
#[derive(Debug, Clone)]
pub struct OnnxStdIoConfig {
    pub model_path: PathBuf,
    pub runtime_library_path: PathBuf,
    pub tokenizer_path: PathBuf,
    pub dimension: usize,
    pub max_input_length: usize,
    pub embedding_model_id: String,
    pub text_repr_version: String,
    /// Padding token declared by the tokenizer (`[PAD]` for BERT-style vocabularies).
    pub pad_token: String,
    /// Truncate inputs to `max_input_length` tokens instead of rejecting them.
    pub truncate: bool,
    /// L2-normalize pooled vectors.
    pub normalize: bool,
}

/// ONNX-based embedder that executes models through the ONNX Runtime shared library.
#[derive(Debug)]
pub struct OnnxStdIoEmbedder {
    info: EmbedderInfo,
    session: Mutex<Session>,
    tokenizer: Arc<Tokenizer>,
    pad_id: i64,
    max_input_length: usize,
    /// BERT exports take `token_type_ids` as a third input.
    needs_token_types: bool,
    normalize: bool,
}

#[derive(Debug)]
struct PreparedBatch {
    input_ids: Tensor<i64>,
    attention_mask: Tensor<i64>,
    token_type_ids: Tensor<i64>,
    attention_rows: Vec<Vec<i64>>,
}

static ORT_RUNTIME_PATH: OnceLock<PathBuf> = OnceLock::new();

impl OnnxStdIoEmbedder {
    pub fn new(config: OnnxStdIoConfig) -> Result<Self, EmbedderError> {
        if config.dimension == 0 {
            return Err(EmbedderError::InvalidConfiguration {
                message: "dimension must be greater than zero".into(),
            });
        }

        if config.max_input_length == 0 {
            return Err(EmbedderError::InvalidConfiguration {
                message: "max_input_length must be greater than zero".into(),
            });
        }

        let runtime_library_path =
            resolve_existing_path(&config.runtime_library_path, "ONNX Runtime shared library")?;

        ensure_ort_initialized(&runtime_library_path)?;

        let model_path = resolve_existing_path(&config.model_path, "ONNX model")?;
        let tokenizer_path = resolve_existing_path(&config.tokenizer_path, "tokenizer config")?;

        let session = Session::builder()
            .map_err(|err| map_ort_error("create session builder", err))?
            .commit_from_file(&model_path)
            .map_err(|err| map_ort_error("load ONNX model", err))?;
        let needs_token_types = session.inputs.len() >= 3;

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|err| map_tokenizer_error("load tokenizer", err))?;
        if config.truncate {
            tokenizer
                .with_truncation(Some(TruncationParams {
                    max_length: config.max_input_length,
                    ..Default::default()
                }))
                .map_err(|err| map_tokenizer_error("configure truncation", err))?;
        }

        let pad_id =
            tokenizer
                .token_to_id(&config.pad_token)
                .ok_or_else(|| EmbedderError::InvalidConfiguration {
                    message: format!(
                        "tokenizer `{}` does not declare a `{}` token",
                        tokenizer_path.display(),
                        config.pad_token
                    ),
                })? as i64;

        tracing::info!(
            model = %model_path.display(),
            dimension = config.dimension,
            needs_token_types,
            "loaded ONNX embedder"
        );

        let info = EmbedderInfo {
            provider: ProviderKind::OnnxStdIo,
            embedding_model_id: config.embedding_model_id,
            dimension: config.dimension,
            text_repr_version: config.text_repr_version,
        };

        Ok(Self {
            info,
            session: Mutex::new(session),
            tokenizer: Arc::new(tokenizer),
            pad_id,
            max_input_length: config.max_input_length,
            needs_token_types,
            normalize: config.normalize,
        })
    }

    fn prepare_encodings(&self, texts: &[&str]) -> Result<Vec<Encoding>, EmbedderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let tokenizer = &self.tokenizer;
        let encodings = texts
            .iter()
            .map(|t| tokenizer.encode(*t, true))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| map_tokenizer_error("tokenize inputs", err))?;

        let max_len = encodings.iter().map(Encoding::len).max().unwrap_or(0);
        if max_len > self.max_input_length {
            return Err(EmbedderError::InputTooLong {
                max_length: self.max_input_length,
                actual_length: max_len,
            });
        }

        Ok(encodings)
    }

    fn build_input_tensors(&self, encodings: &[Encoding]) -> Result<PreparedBatch, EmbedderError> {
        let batch = encodings.len();
        let seq_len = encodings.iter().map(Encoding::len).max().unwrap_or(0);

        let mut input_ids = Array2::<i64>::from_elem((batch, seq_len), self.pad_id);
        let mut attention_mask = Array2::<i64>::zeros((batch, seq_len));
        let mut token_type_ids = Array2::<i64>::zeros((batch, seq_len));
        let mut attention_rows = Vec::with_capacity(batch);

        for (row, encoding) in encodings.iter().enumerate() {
            let ids = encoding.get_ids();
            let mask = encoding.get_attention_mask();
            let types = encoding.get_type_ids();

            for (col, (&id, &m)) in ids.iter().zip(mask.iter()).enumerate() {
                input_ids[(row, col)] = id as i64;
                attention_mask[(row, col)] = m as i64;
                token_type_ids[(row, col)] = types.get(col).copied().unwrap_or(0) as i64;
            }

            attention_rows.push(attention_mask.row(row).to_vec());
        }

        let input_ids = Tensor::from_array(input_ids)
            .map_err(|err| map_ort_error("prepare input_ids", err))?;
        let attention_mask = Tensor::from_array(attention_mask)
            .map_err(|err| map_ort_error("prepare attention_mask", err))?;
        let token_type_ids = Tensor::from_array(token_type_ids)
            .map_err(|err| map_ort_error("prepare token_type_ids", err))?;

        Ok(PreparedBatch {
            input_ids,
            attention_mask,
            token_type_ids,
            attention_rows,
        })
    }

    fn run_session(
        &self,
        prepared: PreparedBatch,
    ) -> Result<(Vec<f32>, usize, usize, usize, Vec<Vec<i64>>), EmbedderError> {
        let PreparedBatch {
            input_ids,
            attention_mask,
            token_type_ids,
            attention_rows,
        } = prepared;
        let mut session = self.session.lock().map_err(|_| EmbedderError::ProviderFailure {
            message: "ONNX session lock poisoned".into(),
        })?;
        let outputs = if self.needs_token_types {
            session.run(ort::inputs![input_ids, attention_mask, token_type_ids])
        } else {
            session.run(ort::inputs![input_ids, attention_mask])
        }
        .map_err(|err| map_ort_error("execute ONNX session", err))?;

        // First output is the token embedding tensor [batch, seq_len, hidden]
        let output = &outputs[0];
        let (shape, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|err| map_ort_error("extract output tensor", err))?;

        if shape.len() != 3 {
            let dims: Vec<i64> = shape.iter().copied().collect();
            return Err(EmbedderError::ProviderFailure {
                message: format!(
                    "model output must be rank-3 [batch, seq_len, hidden], got shape {:?}",
                    dims
                ),
            });
        }

        let dim = |i: usize| -> Result<usize, EmbedderError> {
            usize::try_from(shape[i]).map_err(|_| EmbedderError::ProviderFailure {
                message: format!("model output has negative dimension {}", shape[i]),
            })
        };
        let batch = dim(0)?;
        let seq_len = dim(1)?;
        let hidden = dim(2)?;

        Ok((data.to_vec(), batch, seq_len, hidden, attention_rows))
    }

    fn mean_pool(
        &self,
        data: &[f32],
        attention_rows: &[Vec<i64>],
        seq_len: usize,
        hidden: usize,
    ) -> Vec<Vec<f32>> {
        let mut results = Vec::with_capacity(attention_rows.len());
        for (b, row) in attention_rows.iter().enumerate() {
            let mut sum = vec![0f32; hidden];
            let mut count = 0f32;

            for (t, &m) in row.iter().enumerate().take(seq_len) {
                if m == 1 {
                    let base = (b * seq_len + t) * hidden;
                    for (h, acc) in sum.iter_mut().enumerate() {
                        *acc += data[base + h];
                    }
                    count += 1.0;
                }
            }

            if count > 0.0 {
                for v in sum.iter_mut() {
                    *v /= count;
                }
            }
            if self.normalize {
                l2_normalize(&mut sum);
            }

            results.push(sum);
        }
        results
    }

    fn embed_encoded(&self, encodings: &[Encoding]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        let expected_batch = encodings.len();
        let expected_seq_len = encodings.iter().map(Encoding::len).max().unwrap_or(0);
        let prepared = self.build_input_tensors(encodings)?;
        let (raw_data, batch, seq_len, hidden, attention_rows) = self.run_session(prepared)?;

        if batch != expected_batch {
            return Err(EmbedderError::ProviderFailure {
                message: format!("model returned batch size {batch}, but prepared {expected_batch} inputs"),
            });
        }
        if seq_len != expected_seq_len {
            return Err(EmbedderError::ProviderFailure {
                message: format!("model returned sequence length {seq_len}, expected {expected_seq_len}"),
            });
        }
        if hidden != self.info.dimension {
            return Err(EmbedderError::ProviderFailure {
                message: format!(
                    "pooled embedding dimension {} does not match configured dimension {}",
                    hidden, self.info.dimension
                ),
            });
        }

        Ok(self.mean_pool(&raw_data, &attention_rows, seq_len, hidden))
    }
}

impl Embedder for OnnxStdIoEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        let encodings = self.prepare_encodings(&[text])?;
        self.embed_encoded(&encodings)?
            .into_iter()
            .next()
            .ok_or_else(|| EmbedderError::ProviderFailure {
                message: "missing pooled output".into(),
            })
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let encodings = self.prepare_encodings(texts)?;
        self.embed_encoded(&encodings)
    }

    fn info(&self) -> &EmbedderInfo {
        &self.info
    }
}

/// Configuration for the offline feature-hashing embedder.
#[derive(Debug, Clone)]
pub struct HashingConfig {
    pub dimension: usize,
    /// Maximum input length in characters.
    pub max_input_length: usize,
    pub embedding_model_id: String,
    pub text_repr_version: String,
}

/// Deterministic bag-of-words embedder: each lowercase word is hashed into a
/// signed bucket and the result is L2-normalized. Texts sharing vocabulary end
/// up close together, which is enough for offline use and tests.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    info: EmbedderInfo,
    max_input_length: usize,
    base_seed: [u8; 32],
}

impl HashingEmbedder {
    pub fn new(config: HashingConfig) -> Result<Self, EmbedderError> {
        if config.dimension == 0 {
            return Err(EmbedderError::InvalidConfiguration {
                message: "dimension must be greater than zero".into(),
            });
        }

        if config.max_input_length == 0 {
            return Err(EmbedderError::InvalidConfiguration {
                message: "max_input_length must be greater than zero".into(),
            });
        }

        let base_seed = compute_seed(&config.embedding_model_id, &config.text_repr_version);
        let info = EmbedderInfo {
            provider: ProviderKind::Hashing,
            embedding_model_id: config.embedding_model_id,
            dimension: config.dimension,
            text_repr_version: config.text_repr_version,
        };

        Ok(Self {
            info,
            max_input_length: config.max_input_length,
            base_seed,
        })
    }

    fn validate_length(&self, text: &str) -> Result<(), EmbedderError> {
        let actual_length = text.chars().count();
        if actual_length > self.max_input_length {
            return Err(EmbedderError::InputTooLong {
                max_length: self.max_input_length,
                actual_length,
            });
        }
        Ok(())
    }

    fn generate_embedding(&self, text: &str) -> Vec<f32> {
        let mut output = vec![0f32; self.info.dimension];
        for word in text.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
            let digest = Sha256::new()
                .chain_update(self.base_seed)
                .chain_update(word.to_lowercase().as_bytes())
                .finalize();
            let mut head = [0u8; 8];
            head.copy_from_slice(&digest[..8]);
            let hash = u64::from_le_bytes(head);
            let bucket = (hash % self.info.dimension as u64) as usize;
            let sign = if hash >> 63 == 1 { -1.0 } else { 1.0 };
            output[bucket] += sign;
        }
        l2_normalize(&mut output);
        output
    }
}

impl Embedder for HashingEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        self.validate_length(text)?;
        Ok(self.generate_embedding(text))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        texts
            .iter()
            .map(|text| self.embed(text))
            .collect::<Result<Vec<_>, _>>()
    }

    fn info(&self) -> &EmbedderInfo {
        &self.info
    }
}

/// Scale `v` to unit length; zero vectors are left untouched.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

fn ensure_ort_initialized(runtime_library_path: &Path) -> Result<(), EmbedderError> {
    if let Some(existing) = ORT_RUNTIME_PATH.get() {
        if !paths_equal(existing, runtime_library_path) {
            return Err(EmbedderError::InvalidConfiguration {
                message: format!(
                    "ONNX Runtime already initialized with library `{}`; cannot reinitialize with `{}`",
                    existing.display(),
                    runtime_library_path.display()
                ),
            });
        }
    } else {
        let _ = ORT_RUNTIME_PATH.set(runtime_library_path.to_path_buf());
    }

    ort::init_from(runtime_library_path.to_string_lossy().to_string())
        .with_name("study-assistant")
        .commit()
        .map_err(|err| map_ort_error("initialize ONNX Runtime environment", err))?;

    Ok(())
}

fn resolve_existing_path(path: &Path, description: &str) -> Result<PathBuf, EmbedderError> {
    fs::metadata(path).map_err(|_| EmbedderError::InvalidConfiguration {
        message: format!("{description} `{}` does not exist", path.display()),
    })?;

    path.canonicalize()
        .map_err(|err| EmbedderError::ProviderFailure {
            message: format!(
                "failed to canonicalize {description} `{}`: {err}",
                path.display()
            ),
        })
}

fn map_ort_error(context: &str, err: OrtError) -> EmbedderError {
    EmbedderError::ProviderFailure {
        message: format!("{context} failed: {err}"),
    }
}

fn map_tokenizer_error(context: &str, err: tokenizers::Error) -> EmbedderError {
    EmbedderError::ProviderFailure {
        message: format!("{context} failed: {err}"),
    }
}

/// Stable across builds, since hashing vectors end up in saved indexes.
fn compute_seed(embedding_model_id: &str, text_repr_version: &str) -> [u8; 32] {
    let digest = Sha256::new()
        .chain_update(b"hashing\0")
        .chain_update(embedding_model_id.as_bytes())
        .chain_update(b"\0")
        .chain_update(text_repr_version.as_bytes())
        .finalize();
    let mut seed = [0u8; 32];
    seed.copy_from_slice(&digest);
    seed
}

fn paths_equal(a: &Path, b: &Path) -> bool {
    if let (Ok(a), Ok(b)) = (fs::canonicalize(a), fs::canonicalize(b)) {
        a == b
    } else {
        a == b
    }
}
