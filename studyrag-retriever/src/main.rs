use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use studyrag_retriever::{
    config::{IndexRecovery, RetrieverConfig},
    context::RetrieverContext,
    retrieval::{DEFAULT_TOP_K, IngestOutcome, IngestionPipeline, QueryEngine},
    status::index_status,
    RetrieverError,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Exit code for a directory ingest where some files failed.
const PARTIAL_FAILURE_EXIT_CODE: i32 = 2;

/// Ingest study notes into a local vector index and query them.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (defaults to ./studyrag.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory that relative ingest paths and fragment sources refer to
    #[arg(long)]
    knowledge_dir: Option<PathBuf>,

    /// Directory holding the persisted index
    #[arg(long)]
    vector_dir: Option<PathBuf>,

    /// Embed with feature hashing instead of downloading a model
    #[arg(long)]
    offline: bool,

    /// Move an unreadable index aside and start empty instead of failing
    #[arg(long)]
    recreate_corrupt: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the index directory with an empty index
    Init,
    /// Ingest a file or directory (relative to the knowledge directory)
    Ingest {
        path: PathBuf,
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
    /// Copy a file into the knowledge directory and ingest it
    Add {
        file: PathBuf,
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
    /// Retrieve the fragments closest to a question
    Query {
        question: String,
        /// Number of fragments to retrieve
        #[arg(short, default_value_t = DEFAULT_TOP_K)]
        k: usize,
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
    /// Show index type, dimension and fragment count
    Status {
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum OutputFormat {
    Summary,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "summary" => Ok(OutputFormat::Summary),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Invalid format: {s}")),
        }
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

    match run().await {
        Ok(code) => process::exit(code),
        Err(e) => {
            match e.downcast_ref::<RetrieverError>() {
                Some(err) => eprintln!("Error: [{}] {err}", err.kind()),
                None => eprintln!("Error: {e}"),
            }
            process::exit(1);
        }
    }
}

async fn build_config(args: &Args) -> anyhow::Result<RetrieverConfig> {
    let mut config = RetrieverConfig::load(args.config.as_deref()).await?;
    if let Some(dir) = &args.knowledge_dir {
        config.knowledge_dir = dir.clone();
    }
    if let Some(dir) = &args.vector_dir {
        config.vector_dir = dir.clone();
    }
    if args.recreate_corrupt {
        config.recovery = IndexRecovery::Recreate;
    }
    config.validate()?;
    Ok(config)
}

async fn run() -> anyhow::Result<i32> {
    let args = Args::parse();
    let config = build_config(&args).await?;
    let context = if args.offline {
        RetrieverContext::offline(config)?
    } else {
        RetrieverContext::with_fastembed(config)?
    };
    info!("Using embedding model {}", context.provider().model_name());

    match args.command {
        Commands::Init => {
            context.initialize().await?;
            let status = index_status(&context).await?;
            println!(
                "Initialized index at {}",
                context.persistence().directory().display()
            );
            println!("{status}");
            Ok(0)
        }
        Commands::Ingest { path, format } => {
            let outcome = IngestionPipeline::new(&context).ingest_path(&path).await?;
            print_outcome(&outcome, format)?;
            if outcome.errors.is_empty() {
                Ok(0)
            } else {
                Ok(PARTIAL_FAILURE_EXIT_CODE)
            }
        }
        Commands::Add { file, format } => {
            let file_name = file
                .file_name()
                .map(|name| name.to_string_lossy().to_string())
                .ok_or_else(|| anyhow::anyhow!("Not a file path: {}", file.display()))?;
            let content = tokio::fs::read(&file)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", file.display(), e))?;
            let outcome = IngestionPipeline::new(&context)
                .ingest_upload(&file_name, &content)
                .await?;
            print_outcome(&outcome, format)?;
            Ok(0)
        }
        Commands::Query {
            question,
            k,
            format,
        } => {
            let response = QueryEngine::new(&context).query(&question, k).await?;
            match format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&response)?);
                }
                OutputFormat::Summary => {
                    println!("{}", response.answer);
                    if !response.retrieved.is_empty() {
                        println!();
                        println!("Sources:");
                        for (i, fragment) in response.retrieved.iter().enumerate() {
                            println!(
                                "  [{}] {} (chunk {})",
                                i + 1,
                                fragment.source,
                                fragment.chunk_id
                            );
                        }
                    }
                }
            }
            Ok(0)
        }
        Commands::Status { format } => {
            let status = index_status(&context).await?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&status)?),
                OutputFormat::Summary => println!("{status}"),
            }
            Ok(0)
        }
    }
}

fn print_outcome(outcome: &IngestOutcome, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(outcome)?);
        }
        OutputFormat::Summary => {
            println!("{}", outcome.detail);
            println!("Chunks added: {}", outcome.chunks_added);
            if !outcome.errors.is_empty() {
                println!("Failed files: {}", outcome.errors.len());
                for error in &outcome.errors {
                    println!("  {} [{}]: {}", error.path.display(), error.kind, error.message);
                }
            }
        }
    }
    Ok(())
}
