use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

use ragdb_core::config::{resolve_with_base, Config, Settings};
use ragdb_core::{Document, RerankService};
use ragdb_embed::get_default_embedder;
use ragdb_hybrid::persist;
use ragdb_hybrid::{Retriever, RetrieverConfig};
use ragdb_rerank::{CohereReranker, TermOverlapReranker};

#[derive(Parser)]
#[command(name = "ragdb", about = "Hybrid lexical + dense retrieval over text files")]
struct Cli {
    /// Index directory (defaults to storage.index_dir from config)
    #[arg(long, global = true)]
    index_dir: Option<String>,
    /// Use the hashing embedder and term-overlap reranker instead of hosted services
    #[arg(long, global = true)]
    offline: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Chunk and index .txt files, replacing any existing index
    Ingest {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Search the index
    Query {
        text: String,
        /// Print the fused ranking without calling the rerank service
        #[arg(long)]
        no_rerank: bool,
    },
    /// Print the manifest of the saved index
    Status,
}

fn collect_documents(paths: &[PathBuf]) -> anyhow::Result<Vec<Document>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            for entry in WalkDir::new(path).sort_by_file_name() {
                let entry = entry.with_context(|| format!("walking {}", path.display()))?;
                if entry.file_type().is_file() && entry.path().extension().is_some_and(|e| e == "txt") {
                    files.push(entry.into_path());
                }
            }
        } else if path.is_file() {
            files.push(path.clone());
        } else {
            bail!("no such file or directory: {}", path.display());
        }
    }
    files.iter().map(|f| Document::from_path(f).with_context(|| format!("reading {}", f.display()))).collect()
}

fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

fn retriever(settings: &Settings, offline: bool) -> anyhow::Result<Retriever> {
    let embedder = get_default_embedder(&settings.embedding, offline)?;
    let rerank: Arc<dyn RerankService> = if offline {
        Arc::new(TermOverlapReranker)
    } else {
        Arc::new(CohereReranker::from_config(&settings.rerank)?)
    };
    Ok(Retriever::new(RetrieverConfig::from(settings), embedder, rerank)?)
}

async fn ingest(settings: &Settings, offline: bool, dir: &Path, paths: &[PathBuf]) -> anyhow::Result<()> {
    let documents = collect_documents(paths)?;
    if documents.is_empty() {
        bail!("no .txt files found");
    }
    info!(documents = documents.len(), dir = %dir.display(), "ingesting");
    let mut retriever = retriever(settings, offline)?;
    let pb = spinner(&format!("Indexing {} documents", documents.len()));
    let result = retriever.build(&documents, dir).await;
    pb.finish_and_clear();
    let manifest = result.context("building indexes")?;
    println!("Indexed {} documents into {} chunks at {}", documents.len(), manifest.chunk_count, dir.display());
    Ok(())
}

async fn query(settings: &Settings, offline: bool, dir: &Path, text: &str, no_rerank: bool) -> anyhow::Result<()> {
    let mut retriever = retriever(settings, offline)?;
    retriever.load(dir).await.with_context(|| format!("loading index from {}", dir.display()))?;
    if no_rerank {
        for (i, hit) in retriever.search(text).await?.iter().enumerate() {
            println!("{:>2}. [{:.4}] {}#{}", i + 1, hit.score, hit.chunk.source, hit.chunk.ordinal);
            println!("    {}", preview(&hit.chunk.text));
        }
    } else {
        for (i, ranked) in retriever.retrieve(text).await?.iter().enumerate() {
            println!("{:>2}. [{:.4}] {}#{}", i + 1, ranked.relevance, ranked.chunk.source, ranked.chunk.ordinal);
            println!("    {}", preview(&ranked.chunk.text));
        }
    }
    Ok(())
}

fn preview(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    match flat.char_indices().nth(160) {
        Some((cut, _)) => format!("{}...", &flat[..cut]),
        None => flat,
    }
}

fn status(dir: &Path) -> anyhow::Result<()> {
    let manifest = persist::read_manifest(dir).with_context(|| format!("reading {}", dir.display()))?;
    println!("{}", serde_json::to_string_pretty(&manifest)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = Config::load().and_then(|c| c.settings()).context("loading configuration")?;
    let cwd = std::env::current_dir().context("reading working directory")?;
    let dir = match cli.index_dir.as_deref() {
        Some(d) => resolve_with_base(&cwd, d),
        None => settings.storage.resolve_index_dir(&cwd),
    };
    if cli.offline {
        warn!("offline mode: hashing embedder and term-overlap reranker");
    }

    match cli.command {
        Command::Ingest { paths } => ingest(&settings, cli.offline, &dir, &paths).await,
        Command::Query { text, no_rerank } => query(&settings, cli.offline, &dir, &text, no_rerank).await,
        Command::Status => status(&dir),
    }
}
