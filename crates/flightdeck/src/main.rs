mod commands;
mod utils;

use clap::{ArgAction, Args, Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "flightdeck")]
#[command(about = "Launch and tear down HPC clusters on AWS", long_about = None)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Commands,
}

/// Flags shared by every command
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Configuration file (default: discovered)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
    /// AWS region
    #[arg(long, global = true)]
    pub region: Option<String>,
    /// AWS access key ID
    #[arg(long, global = true)]
    pub access_key: Option<String>,
    /// AWS secret access key
    #[arg(long, global = true)]
    pub secret_key: Option<String>,
    /// Template set under the template root
    #[arg(long, global = true)]
    pub template_set: Option<String>,
    /// Keep the domain registry in a local directory instead of DynamoDB
    #[arg(long, global = true, value_name = "DIR")]
    pub local_store: Option<PathBuf>,
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,
    /// Write logs to a file instead of stderr
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage domains
    #[command(subcommand)]
    Domain(DomainCommands),
    /// Manage clusters
    #[command(subcommand)]
    Cluster(ClusterCommands),
    /// Manage infrastructure appliances
    #[command(subcommand)]
    Infra(InfraCommands),
    /// List Flight stacks
    Stacks {
        /// Only stacks whose expiry has passed
        #[arg(long)]
        expired: bool,
        /// Stacks not launched by Flightdeck
        #[arg(long, conflicts_with = "expired")]
        other: bool,
    },
    /// Remove event topics and queues left behind by interrupted operations
    Cleanup {
        /// Show what would be removed without removing anything
        #[arg(long)]
        dry_run: bool,
    },
    /// Inspect configuration
    #[command(subcommand)]
    Config(ConfigCommands),
    /// Show version information
    Version,
}

#[derive(Subcommand)]
enum DomainCommands {
    /// Create a domain
    Create {
        domain: String,
        /// Short prefix used in resource names (default: the domain name)
        #[arg(long)]
        prefix: Option<String>,
        /// File containing parameters to use when creating the domain
        #[arg(short, long, value_name = "FILE")]
        params: Option<PathBuf>,
    },
    /// Destroy a domain
    Destroy {
        domain: String,
        /// Destroy all clusters and appliances along with the domain
        #[arg(short, long)]
        force: bool,
    },
    /// Destroy every cluster and appliance in a domain, keeping the domain
    Purge {
        domain: String,
        /// Confirm this dangerous operation
        #[arg(long)]
        yes: bool,
    },
    /// Show what is running in a domain
    Status { domain: Option<String> },
    /// List domains
    List,
}

#[derive(Subcommand)]
enum ClusterCommands {
    /// Launch a cluster
    Launch {
        cluster: String,
        #[arg(short, long)]
        domain: Option<String>,
        /// Launch a self-contained solo cluster outside any domain
        #[arg(short, long, conflicts_with = "domain")]
        solo: bool,
        /// Master instance type
        #[arg(short = 'm', long, value_name = "TYPE")]
        master_instance_type: Option<String>,
        /// Compute instance type
        #[arg(short = 'c', long, value_name = "TYPE")]
        compute_instance_type: Option<String>,
        /// SSH key pair registered in the region
        #[arg(short, long)]
        key_pair: Option<String>,
        /// Compute queue to create once the master is up
        #[arg(short, long, conflicts_with = "solo")]
        queue: Option<String>,
    },
    /// Destroy a cluster
    Destroy {
        cluster: String,
        #[arg(short, long)]
        domain: Option<String>,
        #[arg(short, long, conflicts_with = "domain")]
        solo: bool,
    },
    /// Destroy a cluster's children in parallel, then its network
    Purge {
        cluster: String,
        #[arg(short, long)]
        domain: Option<String>,
    },
    /// Add a compute queue to a cluster
    Addq {
        cluster: String,
        queue: String,
        #[arg(short, long)]
        domain: Option<String>,
        /// File containing parameters to use for launching the queue
        #[arg(short, long, value_name = "FILE")]
        params: Option<PathBuf>,
        /// Compute instance type
        #[arg(short = 't', long, value_name = "TYPE")]
        queue_instance_type: Option<String>,
        /// Time after which the queue may be reaped (RFC 3339)
        #[arg(long, value_name = "TIME")]
        expiry: Option<String>,
    },
    /// Remove a compute queue from a cluster
    Delq {
        cluster: String,
        queue: String,
        #[arg(short, long)]
        domain: Option<String>,
    },
    /// Attach a component to a cluster
    Expand {
        cluster: String,
        component: String,
        #[arg(short, long)]
        domain: Option<String>,
        /// Name for the component
        #[arg(short, long)]
        name: Option<String>,
        /// File containing parameters to use for launching the component
        #[arg(short, long, value_name = "FILE")]
        params: Option<PathBuf>,
    },
    /// Remove a component from a cluster
    Reduce {
        cluster: String,
        component: String,
        #[arg(short, long)]
        domain: Option<String>,
        #[arg(short, long)]
        name: Option<String>,
    },
    /// List clusters
    List {
        #[arg(short, long)]
        domain: Option<String>,
        #[arg(short, long, conflicts_with = "domain")]
        solo: bool,
    },
    /// Show a cluster's access details
    Show {
        cluster: String,
        #[arg(short, long)]
        domain: Option<String>,
        #[arg(short, long, conflicts_with = "domain")]
        solo: bool,
    },
    /// Show queue capacity
    Qstat {
        cluster: String,
        queue: Option<String>,
        #[arg(short, long)]
        domain: Option<String>,
    },
}

#[derive(Subcommand)]
enum InfraCommands {
    /// Launch an appliance (directory, storage-manager, access-manager)
    Launch {
        #[arg(required_unless_present = "all")]
        appliance: Option<String>,
        /// Launch every appliance
        #[arg(short, long, conflicts_with = "appliance")]
        all: bool,
        #[arg(short, long)]
        domain: Option<String>,
        /// Appliance instance type
        #[arg(short, long, value_name = "TYPE")]
        instance_type: Option<String>,
        #[arg(short, long)]
        key_pair: Option<String>,
    },
    /// Destroy an appliance
    Destroy {
        appliance: String,
        #[arg(short, long)]
        domain: Option<String>,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the default configuration as YAML
    Defaults,
    /// Print the resolved configuration
    Show,
    /// Write the default parameter tables into a directory
    Params { dir: PathBuf },
    /// List the instance type catalogs
    Catalog,
}

fn init_logging(global: &GlobalArgs) -> anyhow::Result<()> {
    let level = match global.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    match &global.log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            tracing_subscriber::fmt()
                .with_writer(std::sync::Mutex::new(file))
                .with_env_filter(filter)
                .with_ansi(false)
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_writer(std::io::stderr)
                .with_env_filter(filter)
                .init();
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    init_logging(&cli.global)?;

    // Version needs no configuration
    if matches!(cli.command, Commands::Version) {
        println!("flightdeck {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    // Config commands never touch the cloud
    if let Commands::Config(cmd) = &cli.command {
        return match cmd {
            ConfigCommands::Defaults => commands::config::defaults(),
            ConfigCommands::Show => commands::config::show(&cli.global),
            ConfigCommands::Params { dir } => commands::config::params(dir),
            ConfigCommands::Catalog => commands::config::catalogs(),
        };
    }

    let config = utils::load_configuration(&cli.global)?;

    match cli.command {
        Commands::Domain(cmd) => {
            let orchestrator = utils::connect(config, &cli.global).await?;
            match cmd {
                DomainCommands::Create {
                    domain,
                    prefix,
                    params,
                } => {
                    commands::domain::create(
                        &orchestrator,
                        &domain,
                        prefix.as_deref(),
                        params.as_deref(),
                    )
                    .await
                }
                DomainCommands::Destroy { domain, force } => {
                    commands::domain::destroy(&orchestrator, &domain, force).await
                }
                DomainCommands::Purge { domain, yes } => {
                    commands::domain::purge(&orchestrator, &domain, yes).await
                }
                DomainCommands::Status { domain } => {
                    commands::domain::status(&orchestrator, domain.as_deref()).await
                }
                DomainCommands::List => commands::domain::list(&orchestrator).await,
            }
        }
        Commands::Cluster(cmd) => commands::cluster::handle(cmd, config, &cli.global).await,
        Commands::Infra(cmd) => commands::infra::handle(cmd, config, &cli.global).await,
        Commands::Stacks { expired, other } => {
            let orchestrator = utils::connect(config, &cli.global).await?;
            commands::stacks::handle(&orchestrator, expired, other).await
        }
        Commands::Cleanup { dry_run } => {
            let orchestrator = utils::connect(config, &cli.global).await?;
            commands::cleanup::handle(&orchestrator, dry_run).await
        }
        Commands::Config(_) | Commands::Version => Ok(()),
    }
}
