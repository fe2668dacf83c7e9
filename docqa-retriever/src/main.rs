use clap::{Parser, Subcommand};
use docqa_embed::{EmbedConfig, EmbeddingBackend, FeatureHashProvider, embed_text_within};
use docqa_retriever::{
    loader::FileLoader,
    retrieval::{
        chunking_strategy::ChunkingConfig,
        ingestion::{DEFAULT_INTAKE_DIR, IngestionConfig, IngestionPipeline},
    },
    storage::{
        VectorStore,
        metadata::EmbeddingModelMetadata,
        sqlite_store::{DEFAULT_INDEX_DIR, INDEX_FILE_NAME, SqliteVectorIndex},
    },
};
use serde::Serialize;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// A CLI tool to build and inspect a docqa vector index.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory holding the docqa-index.db database file
    #[arg(short, long, default_value = DEFAULT_INDEX_DIR)]
    index_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Initialize an empty index
    Init,
    /// Load, chunk, embed and store documents
    Ingest {
        /// Files to ingest; the intake directory when empty
        paths: Vec<PathBuf>,
        #[arg(long, default_value = DEFAULT_INTAKE_DIR)]
        intake_dir: PathBuf,
        #[command(flatten)]
        embedding: EmbeddingArgs,
        #[arg(long, default_value_t = 500)]
        chunk_size: usize,
        #[arg(long, default_value_t = 50)]
        chunk_overlap: usize,
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
    /// List chunks in insertion order
    List {
        /// Only chunks whose source starts with this prefix
        #[arg(long)]
        source: Option<String>,
        /// Limit number of results
        #[arg(short, long, default_value_t = 100)]
        limit: usize,
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
    /// Get a specific chunk by ID
    Get {
        /// Chunk ID (hex)
        id: String,
        /// Output format
        #[arg(short, long, default_value = "full")]
        format: OutputFormat,
    },
    /// Embed a text and show the closest chunks
    Search {
        text: String,
        /// Maximum number of results
        #[arg(short, long, default_value_t = 3)]
        limit: usize,
        #[command(flatten)]
        embedding: EmbeddingArgs,
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
    /// Show index statistics
    Stats {
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
}

#[derive(clap::Args, Debug)]
struct EmbeddingArgs {
    /// fastembed or feature-hash
    #[arg(long, default_value = "fastembed")]
    provider: EmbeddingBackend,
    /// Model name for fastembed
    #[arg(long, default_value = docqa_embed::DEFAULT_MODEL_NAME)]
    model: String,
    /// Vector size for feature-hash
    #[arg(long, default_value_t = FeatureHashProvider::DEFAULT_DIMENSION)]
    hash_dimension: usize,
    /// Seconds allowed for one embedding call
    #[arg(long, default_value_t = 60)]
    embed_timeout: u64,
}

impl EmbeddingArgs {
    async fn build(&self) -> anyhow::Result<Arc<dyn docqa_embed::EmbeddingProvider>> {
        Ok(self
            .provider
            .build(&EmbedConfig::new(&self.model), self.hash_dimension)
            .await?)
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.embed_timeout)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum OutputFormat {
    Summary,
    Full,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "summary" => Ok(OutputFormat::Summary),
            "full" => Ok(OutputFormat::Full),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Invalid format: {s}")),
        }
    }
}

#[derive(Serialize)]
struct SearchHit {
    similarity: f32,
    chunk_id: String,
    source_id: String,
    start_offset: usize,
    end_offset: usize,
    content: String,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let args = Args::parse();

    match args.command {
        Commands::Init => {
            SqliteVectorIndex::open(&args.index_dir).await?;
            println!("Initialized vector index at {}", args.index_dir.display());
            println!(
                "Database location: {}",
                args.index_dir.join(INDEX_FILE_NAME).display()
            );
            Ok(())
        }
        Commands::Ingest {
            paths,
            intake_dir,
            embedding,
            chunk_size,
            chunk_overlap,
            format,
        } => {
            let index = Arc::new(SqliteVectorIndex::open(&args.index_dir).await?);
            let embedder = embedding.build().await?;
            index
                .register_model(&EmbeddingModelMetadata::from_provider(embedder.as_ref()))
                .await?;

            let config = IngestionConfig::default()
                .with_chunking(ChunkingConfig::new(chunk_size, chunk_overlap))
                .with_embed_timeout(embedding.timeout());
            let pipeline = IngestionPipeline::new(Arc::new(FileLoader), embedder, index, config)?;

            let report = if paths.is_empty() {
                pipeline.ingest_directory(&intake_dir).await?
            } else {
                pipeline.ingest(&paths).await?
            };

            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
                OutputFormat::Summary | OutputFormat::Full => {
                    let (documents, chunks) = report.counts();
                    println!("Ingested {documents} documents into {chunks} chunks");
                    println!(
                        "  New chunks: {} | Already indexed: {}",
                        report.chunks_inserted, report.duplicates_skipped
                    );
                    for issue in report.skipped.iter().chain(&report.failed) {
                        println!("  Skipped {}: {}", issue.path.display(), issue.reason);
                    }
                }
            }
            Ok(())
        }
        Commands::List {
            source,
            limit,
            format,
        } => {
            let index = SqliteVectorIndex::open_existing(&args.index_dir).await?;
            let chunks = index.list_chunks(source.as_deref(), limit).await?;

            match format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&chunks)?);
                }
                OutputFormat::Summary => {
                    println!("Found {} chunks:", chunks.len());
                    for summary in chunks {
                        println!(
                            "  #{} | ID: {} | Source: {} | Chars: {}-{}",
                            summary.seq,
                            summary.chunk_id.get(..12).unwrap_or(&summary.chunk_id),
                            summary.source_id,
                            summary.start_offset,
                            summary.end_offset
                        );
                    }
                }
                OutputFormat::Full => {
                    for summary in chunks {
                        if let Some(chunk) = index.get_chunk(&summary.chunk_id).await? {
                            println!("Chunk ID: {}", chunk.chunk_id);
                            println!("Source: {}", chunk.source_id);
                            println!("Chars: {}-{}", chunk.start_offset, chunk.end_offset);
                            println!("Content:\n{}", chunk.text);
                            println!("---");
                        }
                    }
                }
            }
            Ok(())
        }
        Commands::Get { id, format } => {
            let index = SqliteVectorIndex::open_existing(&args.index_dir).await?;

            if let Some(chunk) = index.get_chunk(&id).await? {
                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&chunk)?);
                    }
                    OutputFormat::Summary => {
                        println!("Chunk ID: {}", chunk.chunk_id);
                        println!("Source: {}", chunk.source_id);
                        println!("Chars: {}-{}", chunk.start_offset, chunk.end_offset);
                        println!(
                            "Content preview: {}",
                            chunk.text.chars().take(100).collect::<String>()
                        );
                    }
                    OutputFormat::Full => {
                        println!("Chunk ID: {}", chunk.chunk_id);
                        println!("Source: {}", chunk.source_id);
                        println!("Chars: {}-{}", chunk.start_offset, chunk.end_offset);
                        println!("Content:\n{}", chunk.text);
                    }
                }
            } else {
                println!("Chunk with ID {id} not found");
            }
            Ok(())
        }
        Commands::Search {
            text,
            limit,
            embedding,
            format,
        } => {
            if text.trim().is_empty() {
                return Err(anyhow::anyhow!("Search text cannot be empty"));
            }

            let index = SqliteVectorIndex::open_existing(&args.index_dir).await?;
            let embedder = embedding.build().await?;
            index
                .check_model(&EmbeddingModelMetadata::from_provider(embedder.as_ref()))
                .await?;

            let query = embed_text_within(embedder.as_ref(), &text, embedding.timeout()).await?;
            let results = index.search(&query, limit).await?;

            match format {
                OutputFormat::Json => {
                    let hits: Vec<SearchHit> = results
                        .into_iter()
                        .map(|r| SearchHit {
                            similarity: r.similarity_score,
                            chunk_id: r.chunk.chunk_id,
                            source_id: r.chunk.source_id,
                            start_offset: r.chunk.start_offset,
                            end_offset: r.chunk.end_offset,
                            content: r.chunk.text,
                        })
                        .collect();
                    println!("{}", serde_json::to_string_pretty(&hits)?);
                }
                OutputFormat::Summary => {
                    println!("Found {} similar chunks:", results.len());
                    for result in results {
                        println!(
                            "  Similarity: {:.3} | Source: {} | Chars: {}-{}",
                            result.similarity_score,
                            result.chunk.source_id,
                            result.chunk.start_offset,
                            result.chunk.end_offset
                        );
                    }
                }
                OutputFormat::Full => {
                    for result in results {
                        println!("Similarity: {:.3}", result.similarity_score);
                        println!("Chunk ID: {}", result.chunk.chunk_id);
                        println!("Source: {}", result.chunk.source_id);
                        println!("Content:\n{}", result.chunk.text);
                        println!("---");
                    }
                }
            }
            Ok(())
        }
        Commands::Stats { format } => {
            let index = SqliteVectorIndex::open_existing(&args.index_dir).await?;
            let stats = index.stats().await?;

            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&stats)?),
                OutputFormat::Summary | OutputFormat::Full => {
                    println!("Index Statistics:");
                    println!("  Documents: {}", stats.documents);
                    println!("  Chunks: {}", stats.chunks);
                    match stats.dimension {
                        Some(dimension) => println!("  Dimension: {dimension}"),
                        None => println!("  Dimension: (not yet established)"),
                    }
                    if let Some(model) = &stats.embedding_model {
                        println!("  Embedding model: {model}");
                    }
                    if let Some(size) = stats.database_size_bytes {
                        println!("  Database size: {size} bytes");
                    }
                    if format == OutputFormat::Full {
                        for model in index.embedding_models().await? {
                            println!("  Registered model: {}", model.model_id());
                        }
                    }
                }
            }
            Ok(())
        }
    }
}
