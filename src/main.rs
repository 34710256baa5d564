use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use gale::config::Config;
use gale::embedder::Embedder;
use gale::embedder::openai::OpenAiEmbedder;
use gale::ingest::{self, Ingestor};
use gale::llm::openai::OpenAiChatFactory;
use gale::server::{self, AppContext};
use gale::tokenizer;
use gale::vectorstore::VectorStore;
use gale::vectorstore::pinecone::{PineconeControl, PineconeEndpoints, PineconeOptions, PineconeStore};
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Parser)]
#[command(name = "gale", version, about = "Retrieval-augmented question answering over a Pinecone index")]
struct Cli {
    /// Settings file loaded into the environment before startup
    #[arg(long, global = true, default_value = ".env")]
    env_file: PathBuf,

    /// Do not expect a settings file; read the environment only
    #[arg(long, global = true)]
    no_env_file: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the web UI and the /run endpoint (default)
    Serve,
    /// Manage the Pinecone index
    Index(IndexArgs),
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct IndexArgs {
    /// File path of a document to upload
    #[arg(short, long)]
    load: Option<PathBuf>,

    /// Delete all vectors in the index
    #[arg(short, long)]
    delete_all: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. Load settings (before logging, so RUST_LOG may come from the file)
    if !cli.no_env_file {
        Config::load_env_file(&cli.env_file)?;
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    if !cli.no_env_file {
        info!("Loaded settings from {}", cli.env_file.display());
    }
    let config = Config::from_env().context("failed to load configuration")?;

    // 2. Embedding function shared by the store
    let embedder: Arc<dyn Embedder> = Arc::new(
        OpenAiEmbedder::new(
            &config.openai.api_key,
            &config.openai.base_url,
            &config.openai.embedding_model,
        )
        .context("error getting embeddings")?,
    );

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => run_server(config, embedder).await,
        Command::Index(args) => run_index(config, embedder, args).await,
    }
}

async fn run_server(config: Config, embedder: Arc<dyn Embedder>) -> Result<()> {
    let port = config.server_port().context("failed to load configuration")?;
    let store: Arc<dyn VectorStore> = Arc::new(
        PineconeStore::new(pinecone_options(&config), embedder)
            .await
            .context("error setting up Pinecone store")?,
    );

    let ctx = Arc::new(AppContext {
        store,
        chat: Arc::new(OpenAiChatFactory::new(
            &config.openai.api_key,
            &config.openai.base_url,
            &config.openai.model,
        )?),
        token_counter: tokenizer::load_counter(config.tokenizer_path.as_deref())?,
        pipeline: config.pipeline.clone(),
        static_dir: config.static_dir.clone(),
        request_timeout: config.request_timeout(),
        shutdown: CancellationToken::new(),
    });

    server::serve(ctx, port).await
}

async fn run_index(config: Config, embedder: Arc<dyn Embedder>, args: IndexArgs) -> Result<()> {
    info!("Pinecone management tool");
    let opts = pinecone_options(&config);
    let endpoints =
        PineconeEndpoints::hosted(&opts.environment, &opts.index_name, &opts.project_name);

    let control = PineconeControl::new(&opts.api_key, &endpoints.controller)?;
    ingest::ensure_index(&control, &opts.index_name, ingest::INDEX_DIMENSION)
        .await
        .context("failed to prepare index")?;

    let store: Arc<dyn VectorStore> = Arc::new(
        PineconeStore::with_endpoints(opts, endpoints, embedder)
            .await
            .context("error setting up Pinecone store")?,
    );
    let ingestor = Ingestor::new(store);

    if args.delete_all {
        ingestor.delete_all().await?;
    } else if let Some(path) = args.load {
        let result = ingestor
            .load_file(&path)
            .await
            .with_context(|| format!("failed to load {}", path.display()))?;
        info!(chunks = result.chunks, "Document added");
    }

    info!("End");
    Ok(())
}

fn pinecone_options(config: &Config) -> PineconeOptions {
    PineconeOptions {
        api_key: config.pinecone.api_key.clone(),
        environment: config.pinecone.environment.clone(),
        index_name: config.pinecone.index_name.clone(),
        project_name: config.pinecone.project_name.clone(),
        namespace: config.pinecone.namespace.clone(),
    }
}
