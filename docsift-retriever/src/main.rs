use clap::{Parser, Subcommand};
use docsift_retriever::config::EmbedderKind;
use docsift_retriever::retrieval::engine::ResultRow;
use docsift_retriever::retrieval::expansion::SynonymExpander;
use docsift_retriever::{DocumentText, RetrievalEngine, RetrieverConfig};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

/// A CLI tool to index documents and query them with citations.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Base directory holding docsift.toml and the .docsift index
    #[arg(short, long, default_value = ".")]
    base_dir: PathBuf,

    /// Override the configured embedder (fastembed or hash)
    #[arg(long)]
    embedder: Option<EmbedderKind>,

    /// More log output (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Add text files to the index. Form feeds separate pages.
    Ingest {
        /// Files to index
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Search the index
    Query {
        /// Question to search for
        text: String,
        /// Maximum number of results
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
        /// Minimum relevance score (0.0 to 1.0)
        #[arg(short, long)]
        min_score: Option<f32>,
        /// Leave out surrounding context
        #[arg(long)]
        no_context: bool,
        /// Also search common medical synonyms of query terms
        #[arg(long)]
        synonyms: bool,
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
    /// Show the chunk at a position
    Get {
        position: usize,
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
    /// Show index statistics
    Stats,
    /// Delete the index
    Clear,
}

#[derive(Debug, Clone, PartialEq)]
enum OutputFormat {
    Summary,
    Table,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "summary" => Ok(OutputFormat::Summary),
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Invalid format: {s}")),
        }
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = match args.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        _ => tracing::Level::DEBUG,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let mut config = RetrieverConfig::load(&args.base_dir)?;
    if let Some(kind) = args.embedder {
        config.embedding.provider = kind;
    }
    let embedder = config.embedding.create_provider().await?;
    let engine = RetrievalEngine::open_unloaded(&args.base_dir, config, embedder).await?;
    if let Err(e) = engine.load().await {
        // ingest and clear overwrite the stored snapshot, so they can run past it
        let replaces_index = matches!(args.command, Commands::Ingest { .. } | Commands::Clear);
        if !(replaces_index && e.requires_rebuild()) {
            return Err(e.into());
        }
        tracing::warn!("Stored index is unusable and will be replaced: {}", e);
    }

    match args.command {
        Commands::Ingest { files } => {
            let mut documents = Vec::with_capacity(files.len());
            for path in &files {
                let text = tokio::fs::read_to_string(path)
                    .await
                    .map_err(|e| anyhow::anyhow!("Failed to read {}: {e}", path.display()))?;
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string());
                documents.push(DocumentText::from_form_feeds(name, &text));
            }

            let summary = engine.ingest(documents).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::Query {
            text,
            top_k,
            min_score,
            no_context,
            synonyms,
            format,
        } => {
            let engine = if synonyms {
                engine.with_expander(Arc::new(SynonymExpander::default()))
            } else {
                engine
            };

            let mut request = engine.request(text).with_context(!no_context);
            if let Some(top_k) = top_k {
                request = request.with_top_k(top_k);
            }
            if let Some(min_score) = min_score {
                request = request.with_min_score(min_score);
            }

            let response = engine.query(&request).await?;
            match format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&response)?);
                }
                OutputFormat::Table => print_table(&response.rows()),
                OutputFormat::Summary => {
                    println!("Query: {}", response.query);
                    println!("Processed: {}", response.processed_query);
                    println!("Found {} matches:", response.total_matches);
                    for result in &response.results {
                        println!(
                            "  [{:.3}] {} {} (position {})",
                            result.relevance_score,
                            result.chunk.document_id,
                            result.citation,
                            result.position
                        );
                        println!("    {}", result.chunk.text);
                        if !result.context.is_empty() {
                            println!("    Context: {}", result.context);
                        }
                    }
                }
            }
        }
        Commands::Get { position, format } => match engine.get(position).await? {
            Some(view) => match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&view)?),
                OutputFormat::Summary | OutputFormat::Table => {
                    println!("Position: {}", view.chunk.position);
                    println!("Document: {}", view.chunk.document_id);
                    println!("Citation: {}", view.citation);
                    println!("Text:\n{}", view.chunk.text);
                    println!("Context:\n{}", view.context);
                }
            },
            None => println!("No chunk at position {position}"),
        },
        Commands::Stats => match engine.stats().await {
            Some(stats) => {
                println!("Index Statistics:");
                println!("  Entries: {}", stats.entries);
                println!("  Documents: {}", stats.documents);
                println!("  Dimension: {}", stats.dimension);
                println!("  Embedder: {}", stats.embedder);
                println!("  Version: {}", stats.version);
                println!("  Built: {}", stats.built_at.to_rfc3339());
            }
            None => println!("No index available. Upload documents first"),
        },
        Commands::Clear => {
            engine.clear().await?;
            println!("Cleared index in {}", args.base_dir.display());
        }
    }

    Ok(())
}

fn print_table(rows: &[ResultRow]) {
    println!("Document\tExtracted Answer\tCitation");
    for row in rows {
        let answer = row.extracted_answer.replace(['\n', '\t'], " ");
        println!("{}\t{}\t{}", row.document, answer, row.citation);
    }
}
