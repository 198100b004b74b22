use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand, ValueEnum};

use scaffold_versions::config::{DEFAULT_REGISTRY_URL, ResolverConfig, Transport, log_path};
use scaffold_versions::logging;
use scaffold_versions::version::crawler::Crawler;
use scaffold_versions::version::planner::{PlanRequest, VersionPlanner};
use scaffold_versions::version::registries::{NpmCliRegistry, NpmRegistry};
use scaffold_versions::version::registry::Registry;
use scaffold_versions::version::retry::RetryPolicy;
use scaffold_versions::version::timeline::parse_instant;
use scaffold_versions::version::types::ProjectType;

#[derive(Parser)]
#[command(name = "scaffold-versions")]
#[command(
    version,
    about = "Resolve matching scaffold and scripts package versions from npm registry history"
)]
struct Cli {
    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Registry base URL
    #[arg(long, global = true)]
    registry: Option<String>,

    /// How the registry is queried
    #[arg(long, global = true, value_enum)]
    transport: Option<TransportArg>,

    /// Write logs to the default log file instead of stderr
    #[arg(long, global = true)]
    log_to_file: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum TransportArg {
    Http,
    Cli,
}

impl From<TransportArg> for Transport {
    fn from(arg: TransportArg) -> Self {
        match arg {
            TransportArg::Http => Transport::Http,
            TransportArg::Cli => Transport::Cli,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Resolve the scaffold/scripts version pair of a project
    Plan {
        /// The project's package.json
        #[arg(long, default_value = "package.json")]
        manifest: PathBuf,

        /// `normal` or `ejected`
        #[arg(long, default_value = "normal")]
        project_type: ProjectType,

        /// Use this scaffold version for the project instead of deriving it
        #[arg(long)]
        scaffold_version: Option<String>,

        /// Scripts version to update to; also resolves the end pair
        #[arg(long)]
        to: Option<String>,

        /// Also list companion package ranges current at this instant
        #[arg(long)]
        at: Option<String>,
    },
    /// Print the version of a package that was current at an instant
    AsOf { package: String, instant: String },
    /// Find the newest parent version that depends on a child version
    Crawl {
        #[arg(long)]
        parent: String,
        #[arg(long)]
        child: String,
        /// Child version or range the parent must depend on
        #[arg(long)]
        target: String,
    },
    /// Print companion package ranges current at an instant
    Companions { instant: String },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ResolverConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => ResolverConfig::default(),
    };
    if let Some(url) = cli.registry {
        config.registry.url = url;
    }
    if let Some(transport) = cli.transport {
        config.registry.transport = transport.into();
    }
    if cli.log_to_file && config.log.file.is_none() {
        config.log.file = Some(log_path());
    }

    let _guard = logging::init(&config.log)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(run(cli.command, config))
}

fn build_registry(config: &ResolverConfig) -> anyhow::Result<Arc<dyn Registry>> {
    let registry: Arc<dyn Registry> = match config.registry.transport {
        Transport::Http => Arc::new(NpmRegistry::new(&config.registry.url)?),
        Transport::Cli if config.registry.url == DEFAULT_REGISTRY_URL => {
            Arc::new(NpmCliRegistry::new())
        }
        Transport::Cli => Arc::new(NpmCliRegistry::new().with_registry(&config.registry.url)),
    };
    Ok(registry)
}

async fn run(command: Command, config: ResolverConfig) -> anyhow::Result<()> {
    let registry = build_registry(&config)?;
    let planner = VersionPlanner::new(registry.clone(), &config);

    match command {
        Command::Plan {
            manifest,
            project_type,
            scaffold_version,
            to,
            at,
        } => {
            let content = std::fs::read_to_string(&manifest)
                .with_context(|| format!("failed to read {}", manifest.display()))?;
            let package_json: serde_json::Value = serde_json::from_str(&content)
                .with_context(|| format!("failed to parse {}", manifest.display()))?;

            let mut start = PlanRequest::from_package_json(&package_json, project_type);
            start.scaffold_version = scaffold_version;

            let mut output = match to {
                Some(to) => {
                    let end = PlanRequest::for_scripts_version(&planner.packages().scripts, &to);
                    serde_json::to_value(planner.plan_update(&start, &end).await?)?
                }
                None => serde_json::to_value(planner.plan_version_pair(&start).await?)?,
            };

            if let Some(at) = at {
                let companions = planner.companion_versions(parse_instant(&at)?).await?;
                if let Some(object) = output.as_object_mut() {
                    object.insert("companions".to_string(), serde_json::to_value(companions)?);
                }
            }

            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Command::AsOf { package, instant } => {
            let instant = parse_instant(&instant)?;
            match planner.version_as_of(&package, instant).await? {
                Some(version) => println!("{version}"),
                None => bail!("no version of {package} was published before {instant}"),
            }
        }
        Command::Crawl {
            parent,
            child,
            target,
        } => {
            let crawler = Crawler::new(
                registry.clone(),
                RetryPolicy::from_config(&config.crawl),
                config.crawl.concurrency,
            );
            let resolved = crawler.resolve_for_packages(&parent, &child, &target).await?;

            match resolved {
                Some(version) => println!("{version}"),
                None => bail!("no version of {parent} depends on {child}@{target}"),
            }
        }
        Command::Companions { instant } => {
            let companions = planner.companion_versions(parse_instant(&instant)?).await?;
            println!("{}", serde_json::to_string_pretty(&companions)?);
        }
    }

    Ok(())
}
