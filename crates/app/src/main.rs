use anyhow::Context;
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use papersync_core::{
    classify, engine_from_config, format_context, provider_from_config, store_from_config,
    Difficulty, Embedder, PaperFormat, PipelineConfig, RequestSection, RetrievalRequest,
    Retriever, RetryPolicy, StoreBackend, SyncOptions, SyncOrchestrator, TextExtractor,
    VectorStore,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "papersync", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    settings: Settings,
}

#[derive(Args)]
struct Settings {
    /// TOML configuration file. Defaults apply when omitted.
    #[arg(long, env = "PAPERSYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Directory of source PDFs.
    #[arg(long, env = "PAPERSYNC_SOURCE_DIR")]
    source_dir: Option<PathBuf>,

    /// Directory for extracted text artifacts.
    #[arg(long, env = "PAPERSYNC_ARTIFACT_DIR")]
    artifact_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Extract, chunk, embed and index every classifiable PDF.
    Sync {
        /// Reprocess files even when their artifacts are up to date.
        #[arg(long, default_value_t = false)]
        force: bool,
        /// Only sync files whose name matches this glob.
        #[arg(long)]
        filter: Option<String>,
    },
    /// Show source, artifact and index counts.
    Status,
    /// Delete indexed chunks for one file, or all of them.
    Clear {
        /// Source filename whose chunks should be removed.
        #[arg(long)]
        source_file: Option<String>,
    },
    /// Retrieve ranked context chunks for a generation request.
    Retrieve {
        /// paper_1, paper_2 or oral.
        #[arg(long)]
        format: PaperFormat,
        /// section_a/b/c, reading_aloud, sbc or conversation.
        #[arg(long)]
        section: Option<RequestSection>,
        /// Comma-separated topics.
        #[arg(long, value_delimiter = ',')]
        topics: Vec<String>,
        #[arg(long, default_value = "standard")]
        difficulty: Difficulty,
        #[arg(long)]
        top_k: Option<usize>,
        /// Print the formatted prompt context instead of JSON.
        #[arg(long, default_value_t = false)]
        context: bool,
    },
    /// Classify a filename without touching any files.
    Classify { filename: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "papersync boot"
    );

    match cli.command {
        Command::Classify { filename } => {
            println!("{}", serde_json::to_string_pretty(&classify(&filename))?);
        }
        Command::Sync { force, filter } => {
            let services = Services::build(&cli.settings)?;
            let options = SyncOptions {
                force_reprocess: force,
                file_filter: filter,
            };
            let summary = services.orchestrator()?.run(&options).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Status => {
            let status = Services::build(&cli.settings)?.orchestrator()?.status().await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Command::Clear { source_file } => {
            let orchestrator = Services::build(&cli.settings)?.orchestrator()?;
            let removed = orchestrator.clear(source_file.as_deref()).await?;
            println!("{removed} chunks removed");
        }
        Command::Retrieve {
            format,
            section,
            topics,
            difficulty,
            top_k,
            context,
        } => {
            let services = Services::build(&cli.settings)?;
            let max_context_chars = services.config.retrieval.max_context_chars;
            let retriever = Retriever::new(
                services.embedder,
                services.store,
                services.config.retrieval,
            );
            let request = RetrievalRequest {
                difficulty,
                paper_format: format,
                section,
                topics,
                top_k,
            };

            if context {
                let ranked = retriever.retrieve_or_empty(&request).await;
                println!("{}", format_context(&ranked, max_context_chars));
            } else {
                let ranked = retriever.retrieve(&request).await?;
                println!("{}", serde_json::to_string_pretty(&ranked)?);
            }
        }
    }

    Ok(())
}

struct Services {
    config: PipelineConfig,
    embedder: Arc<Embedder>,
    store: Arc<dyn VectorStore>,
}

impl Services {
    fn build(settings: &Settings) -> anyhow::Result<Self> {
        let config = load_config(settings)?;
        let embedder = Arc::new(Embedder::new(
            provider_from_config(&config.embedding).context("embedding provider")?,
            RetryPolicy::from(&config.embedding),
        ));
        let store = store_from_config(&config.store, config.embedding.dimensions)
            .context("vector store")?;
        if config.store.backend == StoreBackend::Memory {
            warn!("memory store selected; indexed chunks last only for this process");
        }

        Ok(Self {
            config,
            embedder,
            store,
        })
    }

    fn orchestrator(self) -> anyhow::Result<SyncOrchestrator> {
        let engine = engine_from_config(&self.config.ocr).context("ocr engine")?;
        let extractor = TextExtractor::new(engine, &self.config.ocr);
        Ok(SyncOrchestrator::new(
            self.config,
            extractor,
            self.embedder,
            self.store,
        ))
    }
}

fn load_config(settings: &Settings) -> anyhow::Result<PipelineConfig> {
    let mut config = match &settings.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    config.apply_env_overrides();

    if let Some(source_dir) = &settings.source_dir {
        config.paths.source_dir = source_dir.clone();
    }
    if let Some(artifact_dir) = &settings.artifact_dir {
        config.paths.artifact_dir = artifact_dir.clone();
    }
    Ok(config)
}
