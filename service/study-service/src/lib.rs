//! Study-notes assistant: builds a vector index from a folder of PDFs and
//! answers questions from it.
//!
//! Ingestion reads, cleans and chunks every PDF, embeds the chunks and writes a
//! snapshot to [`StudyConfig::index_dir`]. Each [`StudyService::ask`] reloads
//! that snapshot, retrieves the nearest chunks and either asks the generator
//! for a grounded answer or lists topic excerpts, depending on the mode.

pub mod excerpts;
pub mod modes;
pub mod prompt;

use std::path::{Path, PathBuf};

use chunk_model::{dedup_citations, Citation, ChunkRecord, DocumentPage};
use chunking_store::{
    IndexBackend, IndexError, IndexManifest, Metric, SearchHit, SourceEntry, VectorIndex,
};
use embedding_provider::{Embedder, EmbedderError};
use file_chunker::text_segmenter::{chunk_pages, TextChunkParams};
use file_chunker::{chunk_pdf_file, clean_pages, list_pdf_files, ChunkFileError, ReadError};
use generation_provider::{Generator, GeneratorError};

pub use excerpts::{Excerpt, TopicSection};
pub use modes::{AnswerLength, AnswerMode, ModeBehavior, ModeProfile};

pub const DEFAULT_TOPICS: [&str; 4] =
    ["software specification", "software development", "software validation", "software evolution"];

#[derive(Debug, thiserror::Error)]
pub enum AssistantError {
    #[error("please enter a question")]
    EmptyQuestion,
    #[error("corpus directory `{0}` does not exist")]
    CorpusMissing(PathBuf),
    #[error("no readable PDF files in `{0}`")]
    NoDocuments(PathBuf),
    #[error("the documents produced no text chunks")]
    NoChunks,
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("no index at `{0}`; run ingestion first")]
    IndexUnavailable(PathBuf),
    #[error("index at `{path}` was built with {index}, but the embedder is {embedder}; re-run ingestion")]
    IndexIncompatible { path: PathBuf, index: String, embedder: String },
    #[error("failed to read corpus: {0}")]
    Read(#[from] ReadError),
    #[error("embedding failed: {0}")]
    Embed(#[from] EmbedderError),
    #[error("generation failed: {0}")]
    Generate(#[from] GeneratorError),
    #[error("index error: {0}")]
    Index(#[from] IndexError),
}

#[derive(Debug, Clone)]
pub struct StudyConfig {
    /// Folder scanned for `*.pdf` notes.
    pub corpus_dir: PathBuf,
    /// Where the index snapshot lives.
    pub index_dir: PathBuf,
    pub chunk_params: TextChunkParams,
    pub backend: IndexBackend,
    pub metric: Metric,
    /// Max number of chunks to embed per batch to control memory usage.
    pub embed_batch_size: usize,
    /// Retrieved chunks placed in the prompt for generative modes.
    pub max_context_chunks: usize,
    /// Excerpts shorter than this (trimmed, in characters) are not shown.
    pub min_excerpt_chars: usize,
    /// Topics listed by the excerpt modes, in display order.
    pub topics: Vec<String>,
}

impl Default for StudyConfig {
    fn default() -> Self {
        Self {
            corpus_dir: PathBuf::from("data/raw_docs"),
            index_dir: PathBuf::from("embeddings"),
            chunk_params: TextChunkParams::default(),
            backend: IndexBackend::Flat,
            metric: Metric::L2,
            embed_batch_size: 64,
            max_context_chunks: 4,
            min_excerpt_chars: 50,
            topics: DEFAULT_TOPICS.iter().map(|t| t.to_string()).collect(),
        }
    }
}

impl StudyConfig {
    pub fn validate(&self) -> Result<(), AssistantError> {
        self.chunk_params
            .validate()
            .map_err(|e| AssistantError::InvalidConfig(e.to_string()))?;
        if self.embed_batch_size == 0 {
            return Err(AssistantError::InvalidConfig(
                "embed_batch_size must be greater than zero".into(),
            ));
        }
        if self.max_context_chunks == 0 {
            return Err(AssistantError::InvalidConfig(
                "max_context_chunks must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Progress events emitted during ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Start { total_chunks: usize },
    EmbedBatch { done: usize, total: usize, batch: usize },
    IndexVector { total: usize },
    SaveIndex,
    Finished { total: usize },
}

pub type ProgressFn = Box<dyn FnMut(ProgressEvent) + Send>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub files: usize,
    pub pages: usize,
    pub chunks: usize,
    /// PDFs that could not be read and were left out.
    pub skipped_files: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Answer { text: String, citations: Vec<Citation> },
    TopicNotes { sections: Vec<TopicSection>, citations: Vec<Citation> },
}

impl Response {
    pub fn citations(&self) -> &[Citation] {
        match self {
            Response::Answer { citations, .. } | Response::TopicNotes { citations, .. } => {
                citations
            }
        }
    }
}

pub struct StudyService {
    cfg: StudyConfig,
    embedder: Box<dyn Embedder>,
    generator: Box<dyn Generator>,
}

impl StudyService {
    pub fn new(
        cfg: StudyConfig,
        embedder: Box<dyn Embedder>,
        generator: Box<dyn Generator>,
    ) -> Result<Self, AssistantError> {
        cfg.validate()?;
        Ok(Self { cfg, embedder, generator })
    }

    pub fn config(&self) -> &StudyConfig {
        &self.cfg
    }

    /// Rebuild the index from every PDF in `dir`.
    pub fn ingest_corpus(&self, dir: &Path) -> Result<IngestReport, AssistantError> {
        self.ingest_corpus_with_progress(dir, None)
    }

    pub fn ingest_corpus_with_progress(
        &self,
        dir: &Path,
        progress: Option<ProgressFn>,
    ) -> Result<IngestReport, AssistantError> {
        let files = list_pdf_files(dir).map_err(|e| match e {
            ReadError::MissingDirectory(p) => AssistantError::CorpusMissing(p),
            other => AssistantError::Read(other),
        })?;
        if files.is_empty() {
            return Err(AssistantError::NoDocuments(dir.to_path_buf()));
        }
        tracing::info!(dir = %dir.display(), files = files.len(), "ingesting corpus");

        let mut sources = Vec::new();
        let mut chunks = Vec::new();
        let mut pages = 0usize;
        let mut skipped_files = Vec::new();
        for path in &files {
            match chunk_pdf_file(path, &self.cfg.chunk_params) {
                Ok(out) => {
                    tracing::debug!(
                        file = %out.file.name,
                        pages = out.file.pages.len(),
                        chunks = out.chunks.len(),
                        "chunked"
                    );
                    pages += out.file.pages.len();
                    sources.push(SourceEntry {
                        name: out.file.name,
                        sha256: out.file.sha256,
                        pages: out.file.pages.len(),
                    });
                    chunks.extend(out.chunks);
                }
                Err(ChunkFileError::Read(err)) => {
                    tracing::warn!(file = %path.display(), "skipping unreadable PDF: {err}");
                    skipped_files.push(path.clone());
                }
                Err(ChunkFileError::Segment(err)) => {
                    return Err(AssistantError::InvalidConfig(err.to_string()));
                }
            }
        }
        if sources.is_empty() {
            return Err(AssistantError::NoDocuments(dir.to_path_buf()));
        }

        let mut report = self.build_and_save(chunks, sources, progress)?;
        report.pages = pages;
        report.skipped_files = skipped_files;
        Ok(report)
    }

    /// Rebuild the index from pages that were already read; `sources` goes into the manifest.
    pub fn ingest_pages(
        &self,
        pages: Vec<DocumentPage>,
        sources: Vec<SourceEntry>,
        progress: Option<ProgressFn>,
    ) -> Result<IngestReport, AssistantError> {
        let page_count = pages.len();
        let cleaned = clean_pages(pages);
        let chunks = chunk_pages(&cleaned, &self.cfg.chunk_params)
            .map_err(|e| AssistantError::InvalidConfig(e.to_string()))?;
        let mut report = self.build_and_save(chunks, sources, progress)?;
        report.pages = page_count;
        Ok(report)
    }

    fn build_and_save(
        &self,
        chunks: Vec<ChunkRecord>,
        sources: Vec<SourceEntry>,
        mut progress: Option<ProgressFn>,
    ) -> Result<IngestReport, AssistantError> {
        if chunks.is_empty() {
            return Err(AssistantError::NoChunks);
        }
        let total = chunks.len();
        emit(&mut progress, ProgressEvent::Start { total_chunks: total });

        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let vectors = self.embed_texts_batched(&texts, &mut progress)?;

        let info = self.embedder.info();
        let mut index =
            VectorIndex::with_capacity(self.cfg.backend, self.cfg.metric, info.dimension, total)?;
        for (chunk, vector) in chunks.into_iter().zip(vectors) {
            index.add(chunk, vector)?;
        }
        emit(&mut progress, ProgressEvent::IndexVector { total });

        let files = sources.len();
        let manifest = IndexManifest::for_index(
            &index,
            info.embedding_model_id.clone(),
            info.text_repr_version.clone(),
            sources,
        );
        emit(&mut progress, ProgressEvent::SaveIndex);
        index.save(&manifest, &self.cfg.index_dir)?;
        emit(&mut progress, ProgressEvent::Finished { total });

        tracing::info!(
            files,
            chunks = total,
            index = %self.cfg.index_dir.display(),
            "ingestion finished"
        );
        Ok(IngestReport { files, pages: 0, chunks: total, skipped_files: Vec::new() })
    }

    fn embed_texts_batched(
        &self,
        texts: &[&str],
        progress: &mut Option<ProgressFn>,
    ) -> Result<Vec<Vec<f32>>, AssistantError> {
        let bsz = self.cfg.embed_batch_size.max(1);
        let dim = self.embedder.info().dimension;
        let mut out: Vec<Vec<f32>> = Vec::with_capacity(texts.len());
        let mut done = 0usize;
        for batch in texts.chunks(bsz) {
            let vecs = self.embedder.embed_batch(batch)?;
            if vecs.len() != batch.len() || vecs.iter().any(|v| v.len() != dim) {
                return Err(AssistantError::Embed(EmbedderError::ProviderFailure {
                    message: format!(
                        "embedder returned malformed batch (expected {} vectors of dimension {dim})",
                        batch.len()
                    ),
                }));
            }
            out.extend(vecs);
            done += batch.len();
            tracing::debug!(done, total = texts.len(), "embedded batch");
            emit(
                progress,
                ProgressEvent::EmbedBatch {
                    done,
                    total: texts.len(),
                    batch: batch.len(),
                },
            );
        }
        Ok(out)
    }

    /// Load the snapshot and make sure it lives in the embedder's vector space.
    fn open_index(&self) -> Result<VectorIndex, AssistantError> {
        let dir = &self.cfg.index_dir;
        let (index, manifest) = VectorIndex::load(dir).map_err(|e| match e {
            IndexError::Missing(p) => AssistantError::IndexUnavailable(p),
            other => AssistantError::Index(other),
        })?;
        let info = self.embedder.info();
        if manifest.embedding_model_id != info.embedding_model_id
            || manifest.text_repr_version != info.text_repr_version
            || manifest.dimension != info.dimension
        {
            return Err(AssistantError::IndexIncompatible {
                path: dir.clone(),
                index: format!(
                    "{}@{} ({}d)",
                    manifest.embedding_model_id, manifest.text_repr_version, manifest.dimension
                ),
                embedder: format!(
                    "{}@{} ({}d)",
                    info.embedding_model_id, info.text_repr_version, info.dimension
                ),
            });
        }
        Ok(index)
    }

    fn search(
        &self,
        index: &VectorIndex,
        query: &str,
        k: usize,
    ) -> Result<Vec<SearchHit>, AssistantError> {
        let vector = self.embedder.embed(query)?;
        Ok(index.search(&vector, k)?)
    }

    /// The `k` chunks nearest to `question`, closest first.
    pub fn retrieve(&self, question: &str, k: usize) -> Result<Vec<SearchHit>, AssistantError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(AssistantError::EmptyQuestion);
        }
        let index = self.open_index()?;
        self.search(&index, question, k)
    }

    pub fn ask(&self, question: &str, mode: AnswerMode) -> Result<Response, AssistantError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(AssistantError::EmptyQuestion);
        }
        let index = self.open_index()?;
        let profile = mode.profile();
        tracing::info!(%mode, top_k = profile.top_k, "answering");

        match profile.behavior {
            ModeBehavior::Generative(length) => {
                let hits = self.search(&index, question, profile.top_k)?;
                let used = &hits[..hits.len().min(self.cfg.max_context_chunks)];
                let context = prompt::join_context(
                    used.iter().map(|h| &h.chunk),
                    self.cfg.max_context_chunks,
                );
                let prompt = prompt::build_prompt(question, &context, length);
                let text = self.generator.generate(&prompt, profile.max_new_tokens)?;
                let citations = dedup_citations(used.iter().map(|h| h.chunk.meta.citation()));
                Ok(Response::Answer { text: text.trim().to_string(), citations })
            }
            ModeBehavior::TopicExcerpts => {
                let mut results = Vec::with_capacity(self.cfg.topics.len());
                for topic in &self.cfg.topics {
                    results.push((topic.clone(), self.search(&index, topic, profile.top_k)?));
                }
                let sections = excerpts::group_by_topic(results, self.cfg.min_excerpt_chars);
                let citations = dedup_citations(
                    sections.iter().flat_map(|s| s.excerpts.iter().map(|e| e.citation.clone())),
                );
                Ok(Response::TopicNotes { sections, citations })
            }
        }
    }
}

fn emit(progress: &mut Option<ProgressFn>, event: ProgressEvent) {
    if let Some(cb) = progress.as_deref_mut() {
        cb(event);
    }
}
