use std::path::PathBuf;

use chunking_store::{IndexBackend, Metric};
use clap::{Parser, Subcommand, ValueEnum};
use generation_provider::config::OLLAMA_DEFAULTS;
use study_service::AnswerMode;

#[derive(Parser, Debug)]
#[command(name = "study-assistant", version, about = "Ask questions about your PDF study notes")]
pub struct Cli {
    /// Increase log verbosity (-v debug, -vv trace); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Directory holding the index snapshot
    #[arg(long, env = "STUDY_INDEX_DIR", default_value = "embeddings", global = true)]
    pub index: PathBuf,

    /// Embedding backend used for chunks and questions
    #[arg(long, env = "STUDY_EMBEDDER", value_enum, default_value_t = EmbedderKind::Onnx, global = true)]
    pub embedder: EmbedderKind,

    /// Base directory for `models/` and `lib/` when using the ONNX embedder
    #[arg(long, env = "STUDY_MODEL_DIR", default_value = ".", global = true)]
    pub model_dir: PathBuf,

    /// Base URL of the Ollama-compatible generation server
    #[arg(long, env = "STUDY_LLM_URL", default_value = OLLAMA_DEFAULTS.endpoint, global = true)]
    pub llm_url: String,

    /// Generation model name
    #[arg(long, env = "STUDY_LLM_MODEL", default_value = OLLAMA_DEFAULTS.model, global = true)]
    pub llm_model: String,

    /// Generation request timeout in seconds
    #[arg(long, env = "STUDY_LLM_TIMEOUT", default_value_t = OLLAMA_DEFAULTS.timeout_secs, global = true)]
    pub llm_timeout: u64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Rebuild the index from every PDF in the corpus folder
    Ingest {
        /// Folder containing the PDF notes
        #[arg(long, env = "STUDY_CORPUS_DIR", default_value = "data/raw_docs")]
        corpus: PathBuf,

        /// Search structure written to the snapshot
        #[arg(long, value_enum, default_value_t = BackendArg::Flat)]
        backend: BackendArg,

        /// Distance used for similarity search
        #[arg(long, value_enum, default_value_t = MetricArg::L2)]
        metric: MetricArg,

        /// Chunks embedded per batch
        #[arg(long, default_value_t = 64)]
        batch_size: usize,
    },
    /// Answer a question from the indexed notes
    Ask {
        /// 2-mark, 5-mark, 10-mark, show-all or build-notes
        #[arg(long, short, default_value = "2-mark")]
        mode: AnswerMode,

        /// The question; several words are joined with spaces
        #[arg(num_args = 0.., trailing_var_arg = true)]
        question: Vec<String>,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedderKind {
    /// all-MiniLM-L6-v2 through ONNX Runtime
    Onnx,
    /// Offline feature hashing, no model files needed
    Hashing,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendArg {
    Flat,
    Hnsw,
}

impl From<BackendArg> for IndexBackend {
    fn from(b: BackendArg) -> Self {
        match b {
            BackendArg::Flat => IndexBackend::Flat,
            BackendArg::Hnsw => IndexBackend::Hnsw,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricArg {
    L2,
    Cosine,
}

impl From<MetricArg> for Metric {
    fn from(m: MetricArg) -> Self {
        match m {
            MetricArg::L2 => Metric::L2,
            MetricArg::Cosine => Metric::Cosine,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ask_joins_trailing_words() {
        let cli = Cli::try_parse_from([
            "study-assistant",
            "ask",
            "--mode",
            "5-mark",
            "What",
            "is",
            "validation?",
        ])
        .unwrap();
        match cli.command {
            Command::Ask { mode, question } => {
                assert_eq!(mode, AnswerMode::FiveMark);
                assert_eq!(question.join(" "), "What is validation?");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn ingest_defaults() {
        let cli =
            Cli::try_parse_from(["study-assistant", "--embedder", "hashing", "ingest"]).unwrap();
        assert_eq!(cli.embedder, EmbedderKind::Hashing);
        match cli.command {
            Command::Ingest { corpus, backend, metric, batch_size } => {
                assert_eq!(corpus, PathBuf::from("data/raw_docs"));
                assert_eq!(backend, BackendArg::Flat);
                assert_eq!(metric, MetricArg::L2);
                assert_eq!(batch_size, 64);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn unknown_mode_is_rejected() {
        assert!(Cli::try_parse_from(["study-assistant", "ask", "--mode", "7-mark", "q"]).is_err());
    }
}
