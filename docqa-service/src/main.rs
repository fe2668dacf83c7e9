use clap::{Parser, Subcommand};
use docqa_embed::EmbeddingBackend;
use docqa_retriever::storage::sqlite_store::SqliteVectorIndex;
use docqa_service::session::{self, ReplCommand, Session};
use docqa_service::{DocqaConfig, GeneratorBackend, IndexAccess, QueryError, RagService};
use std::io::Write;
use std::path::PathBuf;
use std::process;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

/// Ask questions about your own documents.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (default: ./docqa.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding the vector index
    #[arg(long, global = true)]
    index_dir: Option<PathBuf>,

    /// Directory of uploaded documents
    #[arg(long, global = true)]
    intake_dir: Option<PathBuf>,

    /// Embedding provider: fastembed or feature-hash
    #[arg(long, global = true)]
    provider: Option<EmbeddingBackend>,

    /// Answer generator: http or extractive
    #[arg(long, global = true)]
    generator: Option<GeneratorBackend>,

    /// Number of chunks retrieved per question
    #[arg(long, global = true)]
    top_k: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Add documents to the index
    Ingest {
        /// Files to ingest; the intake directory when empty
        paths: Vec<PathBuf>,
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },
    /// Interactive question session
    Ask,
    /// Answer a single question
    Query {
        question: String,
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },
    /// Show index statistics
    Stats {
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum OutputFormat {
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Invalid format: {s}")),
        }
    }
}

impl Args {
    fn load_config(&self) -> anyhow::Result<DocqaConfig> {
        let mut config = DocqaConfig::load(self.config.as_deref())?;
        if let Some(dir) = &self.index_dir {
            config.paths.index_dir = dir.clone();
        }
        if let Some(dir) = &self.intake_dir {
            config.paths.intake_dir = dir.clone();
        }
        if let Some(provider) = self.provider {
            config.embedding.provider = provider;
        }
        if let Some(generator) = self.generator {
            config.generation.backend = generator;
        }
        if let Some(top_k) = self.top_k {
            config.query.top_k = top_k;
        }
        config.validate()?;
        Ok(config)
    }
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
    let config = args.load_config()?;

    match args.command {
        Commands::Ingest { paths, format } => {
            let service = RagService::open(config, IndexAccess::CreateIfMissing).await?;
            let report = if paths.is_empty() {
                service.ingest_intake().await?
            } else {
                service.ingest(&paths).await?
            };

            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
                OutputFormat::Text => {
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
        Commands::Query { question, format } => {
            let service = RagService::open(config, IndexAccess::ExistingOnly).await?;
            let record = service.answer(&question).await?;

            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&record)?),
                OutputFormat::Text => println!("{}", session::format_answer(&record)),
            }
            Ok(())
        }
        Commands::Ask => {
            let service = RagService::open(config, IndexAccess::ExistingOnly).await?;
            repl(&service).await
        }
        Commands::Stats { format } => {
            let index = SqliteVectorIndex::open_existing(&config.paths.index_dir).await?;
            let stats = index.stats().await?;

            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&stats)?),
                OutputFormat::Text => {
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
                }
            }
            Ok(())
        }
    }
}

async fn repl(service: &RagService) -> anyhow::Result<()> {
    let mut session = Session::default();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    if service.is_empty().await? {
        println!("The index is empty; run `docqa ingest` to add documents.");
    }
    println!(
        "Ask a question about your documents. Type 'history' to review, 'clear' to forget, \
         'exit' to leave."
    );

    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            println!();
            break;
        };
        let question = match ReplCommand::parse(&line) {
            ReplCommand::Exit => break,
            ReplCommand::History => {
                println!("{}", session::format_history(&session));
                continue;
            }
            ReplCommand::Clear => {
                session.clear();
                println!("History cleared.");
                continue;
            }
            ReplCommand::Ask(question) => question,
        };

        match service.answer(question).await {
            Ok(record) => {
                println!("{}\n", session::format_answer(&record));
                session.record(record);
            }
            Err(QueryError::EmptyQuestion) => println!("Please enter a question first!"),
            Err(e) => {
                tracing::error!("Query failed: {e}");
                println!("Sorry, that question could not be answered: {e}");
            }
        }
    }
    Ok(())
}
