//! `rustyrag` command-line entrypoint.
//!
//! Every subcommand runs sequentially on a single-threaded runtime. Answers and retrieval
//! output go to stdout; logs go to stderr and the log file.
use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use rustyrag::{
    answer::{AnswerGenerator, MultimodalAnswerer},
    config::{self, Config, SplitterStrategy},
    conversation::{ConversationSession, ConversationalRag, QueryRewriter, policy_from_kind},
    embedding::get_embedding_client,
    llm::get_chat_client,
    logging,
    metrics::PipelineMetrics,
    partition::{
        ElementsFilePartitioner, Partitioner, UnstructuredPartitioner, UnstructuredSettings,
    },
    processing::{IngestionService, PdfIngestOptions, Summarizer, splitter::TextSplitter},
    retrieval::{MultiQueryRetriever, RetrievalOptions, Retriever, SearchMode},
    store::{ScoredDocument, get_vector_store},
};
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser)]
#[command(
    name = "rustyrag",
    version,
    about = "Retrieval-augmented generation over text and PDF documents"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Split, embed, and index every .txt file in a directory.
    Ingest {
        #[arg(long, default_value = "docs")]
        docs: PathBuf,
        /// Clear the store before indexing.
        #[arg(long)]
        reset: bool,
    },
    /// Print the documents retrieved for a query.
    Search {
        query: String,
        #[arg(long, value_enum, default_value_t = Method::Similarity)]
        method: Method,
        #[arg(long)]
        k: Option<usize>,
        #[arg(long)]
        score_threshold: Option<f32>,
        #[arg(long)]
        fetch_k: Option<usize>,
        #[arg(long)]
        lambda_mult: Option<f32>,
    },
    /// Retrieve and answer a single question.
    Answer {
        query: String,
        #[arg(long)]
        k: Option<usize>,
    },
    /// Retrieve with several model-generated rephrasings of a query.
    MultiQuery {
        query: String,
        #[arg(long)]
        k: Option<usize>,
        #[arg(long)]
        variations: Option<usize>,
    },
    /// Interactive history-aware question answering; type `exit` to quit.
    Chat {
        #[arg(long)]
        k: Option<usize>,
    },
    /// Show how a file is split with the configured or overridden splitter.
    Split {
        #[arg(long)]
        file: PathBuf,
        #[arg(long, value_enum)]
        strategy: Option<StrategyArg>,
        #[arg(long)]
        chunk_size: Option<usize>,
        #[arg(long)]
        chunk_overlap: Option<usize>,
        #[arg(long)]
        separator: Option<String>,
    },
    /// Multi-modal PDF pipeline.
    #[command(subcommand)]
    Multimodal(MultimodalCommand),
}

#[derive(Subcommand)]
enum MultimodalCommand {
    /// Partition, chunk, summarize, and index a PDF.
    Ingest {
        #[arg(long)]
        pdf: PathBuf,
        /// Replay a saved element export instead of calling the partitioning service.
        #[arg(long)]
        elements: Option<PathBuf>,
        /// Write processed chunks to this JSON file.
        #[arg(long)]
        export: Option<PathBuf>,
        #[arg(long)]
        reset: bool,
    },
    /// Answer a question from indexed text, tables, and images.
    Ask {
        query: String,
        #[arg(long)]
        k: Option<usize>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Method {
    Similarity,
    Threshold,
    Mmr,
}

#[derive(Clone, Copy, ValueEnum)]
enum StrategyArg {
    Character,
    Recursive,
    Semantic,
}

impl From<StrategyArg> for SplitterStrategy {
    fn from(value: StrategyArg) -> Self {
        match value {
            StrategyArg::Character => Self::Character,
            StrategyArg::Recursive => Self::Recursive,
            StrategyArg::Semantic => Self::Semantic,
        }
    }
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init_tracing();
    let config = config::init_config().context("failed to load configuration")?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    let metrics = Arc::new(PipelineMetrics::new());
    let outcome = runtime.block_on(dispatch(cli.command, config, metrics.clone()));

    let snapshot = metrics.snapshot();
    tracing::info!(
        documents_ingested = snapshot.documents_ingested,
        chunks_indexed = snapshot.chunks_indexed,
        summaries_generated = snapshot.summaries_generated,
        summary_fallbacks = snapshot.summary_fallbacks,
        questions_answered = snapshot.questions_answered,
        "Run metrics"
    );
    outcome
}

async fn dispatch(
    command: Command,
    config: &'static Config,
    metrics: Arc<PipelineMetrics>,
) -> Result<()> {
    match command {
        Command::Ingest { docs, reset } => {
            let service = IngestionService::from_config(config, metrics)?;
            let report = service
                .ingest_directory(&docs, reset)
                .await
                .with_context(|| format!("failed to ingest {}", docs.display()))?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Search {
            query,
            method,
            k,
            score_threshold,
            fetch_k,
            lambda_mult,
        } => {
            let k = k.unwrap_or(config.retrieval.k);
            let mode = match method {
                Method::Similarity => SearchMode::Similarity,
                Method::Threshold => SearchMode::ScoreThreshold(
                    score_threshold.unwrap_or(config.retrieval.score_threshold),
                ),
                Method::Mmr => SearchMode::Mmr {
                    fetch_k: fetch_k.unwrap_or(config.retrieval.fetch_k),
                    lambda_mult: lambda_mult.unwrap_or(config.retrieval.lambda_mult),
                },
            };
            let documents = retriever(config)?
                .retrieve(&query, &RetrievalOptions { k, mode })
                .await?;
            println!("Query: {query}\n");
            print_documents(&documents, None);
        }
        Command::Answer { query, k } => {
            let documents = retriever(config)?
                .retrieve(&query, &retrieval_options(config, k))
                .await?;
            let generator = AnswerGenerator::new(get_chat_client(config)?).with_metrics(metrics);
            let answer = generator.answer(&query, &documents).await?;
            println!("User Query: {query}\n");
            println!("--- Model Response ---\n{answer}");
        }
        Command::MultiQuery {
            query,
            k,
            variations,
        } => {
            let multi = MultiQueryRetriever::new(get_chat_client(config)?, retriever(config)?);
            let variations = multi
                .generate_variations(&query, variations.unwrap_or(config.multi_query_count))
                .await?;
            println!("Original Query: {query}\n\nGenerated Query Variations:");
            for (index, variation) in variations.iter().enumerate() {
                println!("{}. {variation}", index + 1);
            }
            let results = multi
                .retrieve_all(&variations, &retrieval_options(config, k))
                .await?;
            for (index, result) in results.iter().enumerate() {
                println!("\n=== RESULTS FOR QUERY {}: {} ===", index + 1, result.query);
                println!("Retrieved {} documents:\n", result.documents.len());
                print_documents(&result.documents, Some(150));
            }
        }
        Command::Chat { k } => run_chat(config, metrics, k).await?,
        Command::Split {
            file,
            strategy,
            chunk_size,
            chunk_overlap,
            separator,
        } => {
            let mut settings = config.splitter.clone();
            if let Some(strategy) = strategy {
                settings.strategy = strategy.into();
            }
            if let Some(chunk_size) = chunk_size {
                settings.chunk_size = chunk_size;
            }
            if let Some(chunk_overlap) = chunk_overlap {
                settings.chunk_overlap = chunk_overlap;
            }
            if let Some(separator) = separator {
                settings.separator = separator;
            }
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let splitter = TextSplitter::from_settings(&settings, get_embedding_client(config)?)?;
            let chunks = splitter.split_text(&text).await?;
            println!("Split {} into {} chunks", file.display(), chunks.len());
            for (index, chunk) in chunks.iter().enumerate() {
                println!(
                    "\n--- Chunk {} ({} chars) ---\n{chunk}",
                    index + 1,
                    chunk.chars().count()
                );
            }
        }
        Command::Multimodal(MultimodalCommand::Ingest {
            pdf,
            elements,
            export,
            reset,
        }) => {
            let partitioner: Box<dyn Partitioner> = match elements {
                Some(path) => Box::new(ElementsFilePartitioner::new(path)),
                None => Box::new(UnstructuredPartitioner::new(UnstructuredSettings::from_config(
                    config,
                ))?),
            };
            let summarizer =
                Summarizer::new(get_chat_client(config)?).with_metrics(metrics.clone());
            let service = IngestionService::from_config(config, metrics)?;
            let report = service
                .ingest_pdf(
                    &pdf,
                    partitioner.as_ref(),
                    &summarizer,
                    PdfIngestOptions {
                        export: export.as_deref(),
                        reset,
                    },
                )
                .await
                .with_context(|| format!("failed to ingest {}", pdf.display()))?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Multimodal(MultimodalCommand::Ask { query, k }) => {
            let documents = retriever(config)?
                .retrieve(&query, &retrieval_options(config, k))
                .await?;
            let answerer = MultimodalAnswerer::new(get_chat_client(config)?).with_metrics(metrics);
            let answer = answerer.answer(&query, &documents).await;
            println!("Query: {query}\n\nRetrieved {} documents\n", documents.len());
            println!("--- Answer ---\n{answer}");
        }
    }
    Ok(())
}

async fn run_chat(config: &Config, metrics: Arc<PipelineMetrics>, k: Option<usize>) -> Result<()> {
    let chat = get_chat_client(config)?;
    let rag = ConversationalRag::new(
        QueryRewriter::new(chat.clone()),
        retriever(config)?,
        AnswerGenerator::new(chat).with_metrics(metrics),
        retrieval_options(config, k),
    );
    let mut session = ConversationSession::new(policy_from_kind(config.history_policy)?);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("Ask question, and type 'exit' to quit.");
    loop {
        print!("Enter question: ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let utterance = line.trim();
        if utterance.eq_ignore_ascii_case("exit") {
            println!("Exiting chat.");
            break;
        }
        if utterance.is_empty() {
            continue;
        }

        println!("\nUser Query: {utterance}\n");
        let outcome = rag.ask(&mut session, utterance).await?;
        if outcome.standalone_query != utterance {
            println!("Searching for: {}\n", outcome.standalone_query);
        }
        println!("Found {} relevant documents:", outcome.documents.len());
        for (index, document) in outcome.documents.iter().enumerate() {
            let preview = document.text.lines().take(3).collect::<Vec<_>>().join("\n");
            println!("Document {} Preview:\n{preview}\n", index + 1);
        }
        println!("Answer: {}", outcome.answer);
    }
    Ok(())
}

fn retriever(config: &Config) -> Result<Retriever> {
    Ok(Retriever::new(
        get_embedding_client(config)?,
        get_vector_store(config)?,
    ))
}

fn retrieval_options(config: &Config, k: Option<usize>) -> RetrievalOptions {
    RetrievalOptions::similarity(k.unwrap_or(config.retrieval.k))
}

fn print_documents(documents: &[ScoredDocument], max_chars: Option<usize>) {
    for (index, document) in documents.iter().enumerate() {
        let text = match max_chars {
            Some(limit) => format!("{}...", document.text.chars().take(limit).collect::<String>()),
            None => document.text.clone(),
        };
        println!("Document {} (score {:.3}):\n{text}\n", index + 1, document.score);
    }
}
