mod cli;

use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use embedding_provider::config::{default_hashing_config, default_stdio_config_in};
use embedding_provider::embedder::{Embedder, HashingEmbedder, OnnxStdIoEmbedder};
use generation_provider::generator::{OllamaConfig, OllamaGenerator};
use study_service::{AssistantError, ProgressEvent, Response, StudyConfig, StudyService};
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command, EmbedderKind};

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(filter) = EnvFilter::try_from_default_env() {
        filter
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn build_embedder(cli: &Cli) -> Result<Box<dyn Embedder>> {
    Ok(match cli.embedder {
        EmbedderKind::Onnx => Box::new(
            OnnxStdIoEmbedder::new(default_stdio_config_in(&cli.model_dir))
                .context("failed to load the ONNX embedding model")?,
        ),
        EmbedderKind::Hashing => Box::new(HashingEmbedder::new(default_hashing_config())?),
    })
}

fn build_service(cli: &Cli, mut cfg: StudyConfig) -> Result<StudyService> {
    cfg.index_dir = cli.index.clone();
    let embedder = build_embedder(cli)?;
    let generator = OllamaGenerator::new(OllamaConfig {
        endpoint: cli.llm_url.clone(),
        model: cli.llm_model.clone(),
        timeout: Duration::from_secs(cli.llm_timeout),
        ..OllamaConfig::default()
    })?;
    Ok(StudyService::new(cfg, embedder, Box::new(generator))?)
}

fn log_progress(event: ProgressEvent) {
    match event {
        ProgressEvent::Start { total_chunks } => tracing::info!(total_chunks, "embedding chunks"),
        ProgressEvent::EmbedBatch { done, total, .. } => tracing::debug!(done, total, "embedded"),
        ProgressEvent::IndexVector { total } => tracing::info!(total, "built vector index"),
        ProgressEvent::SaveIndex => tracing::info!("saving index"),
        ProgressEvent::Finished { total } => tracing::info!(total, "done"),
    }
}

fn render(response: &Response) {
    match response {
        Response::Answer { text, citations } => {
            println!("{text}");
            if !citations.is_empty() {
                println!("\nSources:");
                for c in citations {
                    println!("- {c}");
                }
            }
        }
        Response::TopicNotes { sections, citations } => {
            for section in sections {
                println!("## {}\n", section.topic);
                if section.excerpts.is_empty() {
                    println!("(no new excerpts)\n");
                }
                for excerpt in &section.excerpts {
                    println!("{}\n  [{}]\n", excerpt.text, excerpt.citation);
                }
            }
            if !citations.is_empty() {
                println!("Sources:");
                for c in citations {
                    println!("- {c}");
                }
            }
        }
    }
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    match &cli.command {
        Command::Ingest { corpus, backend, metric, batch_size } => {
            let cfg = StudyConfig {
                corpus_dir: corpus.clone(),
                backend: (*backend).into(),
                metric: (*metric).into(),
                embed_batch_size: *batch_size,
                ..StudyConfig::default()
            };
            let service = build_service(&cli, cfg)?;
            let report = service
                .ingest_corpus_with_progress(corpus, Some(Box::new(log_progress)))
                .with_context(|| format!("ingestion of `{}` failed", corpus.display()))?;
            if !report.skipped_files.is_empty() {
                println!("Skipped {} unreadable file(s)", report.skipped_files.len());
            }
            println!(
                "Indexed {} chunks from {} pages in {} files into {}",
                report.chunks,
                report.pages,
                report.files,
                cli.index.display()
            );
        }
        Command::Ask { mode, question } => {
            let question = question.join(" ");
            // no model is loaded for an empty question
            if question.trim().is_empty() {
                tracing::warn!("{}", AssistantError::EmptyQuestion);
                return Ok(ExitCode::from(2));
            }
            let service = build_service(&cli, StudyConfig::default())?;
            match service.ask(&question, *mode) {
                Ok(response) => render(&response),
                Err(AssistantError::EmptyQuestion) => {
                    tracing::warn!("{}", AssistantError::EmptyQuestion);
                    return Ok(ExitCode::from(2));
                }
                Err(err) => return Err(err).context("could not answer the question"),
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}
