use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use depex::config::{CacheKind, Config, SolverKind};
use depex::graph::{FileGraphProvider, GraphProvider};
use depex::operations::{
    ConfigByImpactRequest, ConfigRequest, Engine, FileRequest, FilterConfigsRequest,
    ImpactRequest, OperationResponse, ResponseCode,
};
use depex::translate::Aggregator;
use depex::versions::Ecosystem;

#[derive(Parser)]
#[command(name = "depex")]
#[command(about = "Dependency configuration analysis over SMT", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (TOML, or JSON when the extension is .json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Keep translated formulas in memory only
    #[arg(long, global = true)]
    no_cache: bool,

    /// Override the configured solver backend
    #[arg(long, global = true)]
    solver: Option<SolverChoice>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum SolverChoice {
    Z3,
    Exhaustive,
}

#[derive(Args)]
struct GraphArgs {
    /// Graph document to analyse
    #[arg(short, long, conflicts_with_all = ["graph_dir", "file_id"])]
    graph: Option<PathBuf>,

    /// Directory of `<file id>.json` graph documents
    #[arg(long, requires = "file_id")]
    graph_dir: Option<PathBuf>,

    /// File id to read from --graph-dir
    #[arg(long, requires = "graph_dir")]
    file_id: Option<String>,

    /// Requirement depth to project the graph to
    #[arg(short, long, default_value = "3")]
    depth: u32,

    /// Ecosystem tag (PyPI, NPM, Maven, Cargo, RubyGems, NuGet)
    #[arg(short, long)]
    ecosystem: Ecosystem,

    /// Aggregator (mean, weighted_mean)
    #[arg(short, long, default_value = "mean")]
    aggregator: Aggregator,
}

#[derive(Subcommand)]
enum Commands {
    /// List direct and indirect requirements with the versions they admit
    FileInfo(GraphArgs),
    /// Check that the graph admits at least one configuration
    ValidGraph(GraphArgs),
    /// Same as valid-graph
    ValidFile(GraphArgs),
    /// Check that a partial configuration extends to a valid one
    ValidConfig {
        #[command(flatten)]
        graph: GraphArgs,
        /// Pinned version, as PACKAGE=VERSION (repeatable)
        #[arg(short, long = "pin", value_parser = parse_pin)]
        pins: Vec<(String, String)>,
    },
    /// List configurations with the lowest file risk
    MinimiseImpact {
        #[command(flatten)]
        graph: GraphArgs,
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// List configurations with the highest file risk
    MaximiseImpact {
        #[command(flatten)]
        graph: GraphArgs,
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Complete a partial configuration with minimal file risk
    CompleteConfig {
        #[command(flatten)]
        graph: GraphArgs,
        /// Pinned version, as PACKAGE=VERSION (repeatable)
        #[arg(short, long = "pin", value_parser = parse_pin)]
        pins: Vec<(String, String)>,
    },
    /// Find the configuration whose file risk is closest to a target
    ConfigByImpact {
        #[command(flatten)]
        graph: GraphArgs,
        #[arg(short, long)]
        impact: f64,
    },
    /// List configurations whose file risk lies within bounds
    FilterConfigs {
        #[command(flatten)]
        graph: GraphArgs,
        #[arg(long, default_value = "0")]
        min: f64,
        #[arg(long)]
        max: f64,
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Count the distinct configurations
    NumberOfProducts(GraphArgs),
    /// Answer newline-delimited JSON requests on stdin
    Serve {
        /// Directory of `<file id>.json` graph documents
        #[arg(long, default_value = ".")]
        graph_dir: PathBuf,
    },
}

fn parse_pin(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((package, version)) if !package.is_empty() && !version.is_empty() => {
            Ok((package.trim().to_string(), version.trim().to_string()))
        }
        _ => Err(format!("expected PACKAGE=VERSION, got `{raw}`")),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let mut config = Config::load_or_default(cli.config.as_deref())
        .context("failed to load configuration")?;
    if cli.no_cache {
        config.cache.backend = CacheKind::Memory;
    }
    if let Some(choice) = cli.solver {
        config.solver.backend = match choice {
            SolverChoice::Z3 => SolverKind::Z3,
            SolverChoice::Exhaustive => SolverKind::Exhaustive,
        };
    }

    let response = match cli.command {
        Commands::Serve { graph_dir } => {
            let graphs = Arc::new(FileGraphProvider::new(graph_dir));
            let engine = Arc::new(Engine::from_config(&config, graphs)?);
            depex::server::serve_stdio(engine).await?;
            return Ok(ExitCode::SUCCESS);
        }
        Commands::FileInfo(args) => {
            let (engine, file) = open(&config, &args)?;
            engine.file_info(&file).await?
        }
        Commands::ValidGraph(args) => {
            let (engine, file) = open(&config, &args)?;
            engine.valid_graph(&file).await?
        }
        Commands::ValidFile(args) => {
            let (engine, file) = open(&config, &args)?;
            engine.valid_file(&file).await?
        }
        Commands::ValidConfig { graph, pins } => {
            let (engine, file) = open(&config, &graph)?;
            let config = pins.into_iter().collect::<BTreeMap<_, _>>();
            engine.valid_config(&ConfigRequest { file, config }).await?
        }
        Commands::MinimiseImpact { graph, limit } => {
            let (engine, file) = open(&config, &graph)?;
            engine.minimise_impact(&ImpactRequest { file, limit }).await?
        }
        Commands::MaximiseImpact { graph, limit } => {
            let (engine, file) = open(&config, &graph)?;
            engine.maximise_impact(&ImpactRequest { file, limit }).await?
        }
        Commands::CompleteConfig { graph, pins } => {
            let (engine, file) = open(&config, &graph)?;
            let config = pins.into_iter().collect::<BTreeMap<_, _>>();
            engine.complete_config(&ConfigRequest { file, config }).await?
        }
        Commands::ConfigByImpact { graph, impact } => {
            let (engine, file) = open(&config, &graph)?;
            engine
                .config_by_impact(&ConfigByImpactRequest { file, impact })
                .await?
        }
        Commands::FilterConfigs {
            graph,
            min,
            max,
            limit,
        } => {
            let (engine, file) = open(&config, &graph)?;
            engine
                .filter_configs(&FilterConfigsRequest {
                    file,
                    max_threshold: max,
                    min_threshold: min,
                    limit,
                })
                .await?
        }
        Commands::NumberOfProducts(args) => {
            let (engine, file) = open(&config, &args)?;
            engine.number_of_products(&file).await?
        }
    };

    print_response(&response)?;
    Ok(match response.code {
        ResponseCode::SmtTimeout => ExitCode::from(2),
        ResponseCode::OperationSuccess | ResponseCode::NoDependencies => ExitCode::SUCCESS,
        ResponseCode::InvalidRequest | ResponseCode::InternalError => ExitCode::FAILURE,
    })
}

/// Engine over the graph source named by `args`, plus the request fields
fn open(config: &Config, args: &GraphArgs) -> anyhow::Result<(Engine, FileRequest)> {
    let (graphs, file_id): (Arc<dyn GraphProvider>, String) =
        match (&args.graph, &args.graph_dir, &args.file_id) {
            (Some(path), _, _) => {
                let (provider, file_id) = FileGraphProvider::for_document(path)?;
                (Arc::new(provider), file_id)
            }
            (None, Some(dir), Some(file_id)) => (
                Arc::new(FileGraphProvider::new(dir)),
                file_id.clone(),
            ),
            _ => bail!("either --graph or --graph-dir with --file-id is required"),
        };
    ensure_exists(args.graph.as_deref())?;

    let engine = Engine::from_config(config, graphs)?;
    let file = FileRequest::new(file_id, args.depth, args.ecosystem).with_aggregator(args.aggregator);
    Ok((engine, file))
}

fn ensure_exists(graph: Option<&Path>) -> anyhow::Result<()> {
    if let Some(path) = graph
        && !path.is_file()
    {
        bail!("graph document {} not found", path.display());
    }
    Ok(())
}

fn print_response(response: &OperationResponse) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(response).context("failed to serialize response")?;
    println!("{}", json);
    Ok(())
}
