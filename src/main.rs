use anyhow::{Context, Result};
use arxiv_research_mcp::server::handler::format_search_results;
use arxiv_research_mcp::{
    Config, ConfigOverrides, LogFormat, PaperPipeline, Server, WorkspaceStore,
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// arXiv paper pipeline: search, download, extract, served over MCP
#[derive(Parser, Debug)]
#[command(name = "arxiv-research-mcp")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Fetch arXiv papers, extract their text and cache the results", long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, short, global = true, env = "ARXIV_MCP_CONFIG")]
    config: Option<PathBuf>,

    /// Workspace directory for cached artifacts
    #[arg(long, global = true)]
    work_dir: Option<PathBuf>,

    /// Log level or filter directive (overridden by RUST_LOG)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log output format
    #[arg(long, global = true, value_enum)]
    log_format: Option<LogFormat>,

    /// Print search results and run records as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve MCP tools on stdio (default)
    Serve,

    /// Search the arXiv catalog
    Search {
        query: String,

        /// Maximum number of results
        #[arg(long, short, default_value_t = 5)]
        max_results: i64,
    },

    /// Download a paper's PDF into the workspace
    Download {
        /// arXiv id or abstract-page URL
        paper_id: String,
    },

    /// Extract text from a downloaded PDF
    Extract {
        /// arXiv id or abstract-page URL
        paper_id: String,
    },

    /// Run the whole pipeline for one paper
    Process {
        /// arXiv id or abstract-page URL
        paper_id: String,

        /// Skip the metadata lookup
        #[arg(long)]
        no_metadata: bool,
    },

    /// Delete every cached artifact
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let overrides = ConfigOverrides {
        work_dir: cli.work_dir.clone(),
        log_level: cli.log_level.clone(),
        log_format: cli.log_format,
    };
    let config = Config::load(cli.config.as_deref())
        .and_then(|c| c.with_overrides(&overrides))
        .context("failed to load configuration")?;

    init_tracing(&config)?;
    info!(
        "arxiv-research-mcp {} (workspace: {})",
        env!("CARGO_PKG_VERSION"),
        config.workspace.root.display()
    );

    let command = cli.command.unwrap_or(Commands::Serve);
    run_command(Arc::new(config), command, cli.json).await
}

async fn pipeline(config: &Arc<Config>) -> Result<PaperPipeline> {
    let workspace = Arc::new(WorkspaceStore::open(&config.workspace.root).await?);
    Ok(PaperPipeline::new(Arc::clone(config), workspace)?)
}

async fn run_command(config: Arc<Config>, command: Commands, json: bool) -> Result<()> {
    match command {
        Commands::Serve => {
            Server::new_with_arc(config)
                .run()
                .await
                .context("MCP server failed")?;
        }
        Commands::Search { query, max_results } => {
            let results = pipeline(&config).await?.search().search(&query, max_results).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else {
                println!("{}", format_search_results(&query, &results));
            }
        }
        Commands::Download { paper_id } => {
            let outcome = pipeline(&config).await?.downloader().download(&paper_id).await?;
            println!("{}", outcome.path.display());
        }
        Commands::Extract { paper_id } => {
            let text = pipeline(&config).await?.extractor().extract_for(&paper_id).await?;
            println!("{text}");
        }
        Commands::Process {
            paper_id,
            no_metadata,
        } => match pipeline(&config)
            .await?
            .process_paper(&paper_id, !no_metadata)
            .await
        {
            Ok(run) if json => println!("{}", serde_json::to_string_pretty(&run)?),
            Ok(run) => {
                for line in run.log() {
                    println!("{line}");
                }
            }
            Err(e) => {
                for line in e.run_log().unwrap_or_default() {
                    eprintln!("{line}");
                }
                return Err(e.into());
            }
        },
        Commands::Clear => {
            let report = pipeline(&config).await?.workspace().clear_all().await?;
            println!("{}", report.message);
        }
    }
    Ok(())
}

/// Logs go to stderr; stdout carries the MCP protocol
fn init_tracing(config: &Config) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .context("invalid log filter")?;

    let registry = tracing_subscriber::registry().with(filter);
    match config.logging.format {
        LogFormat::Pretty => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false),
            )
            .try_init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init(),
    }
    .context("failed to initialize logging")
}
