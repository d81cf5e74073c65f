use clap::{Parser, Subcommand};
use nsg_harvester::cli::inspect::InspectOptions;
use nsg_harvester::config::resolve_config_path;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "nsg-harvester")]
#[command(about = "Forward Azure NSG and Application Gateway logs as CEF", long_about = None)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Harvest on every poll interval until interrupted
    Run {
        /// Perform a single run and exit
        #[arg(long)]
        once: bool,
    },
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Print the CEF lines of one object without touching checkpoints
    Inspect {
        key: String,

        /// Byte offset to start decoding at
        #[arg(long, default_value_t = 0)]
        start: u64,

        /// Frame each line as the syslog sink would, with this hostname
        #[arg(long)]
        syslog_hostname: Option<String>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    Init {
        #[arg(long)]
        stdout: bool,
    },
    Validate,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "nsg_harvester=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config_path = resolve_config_path(cli.config.as_deref());

    match cli.command {
        Some(Commands::Run { once }) => {
            nsg_harvester::cli::run::run(config_path, once).await?;
        }
        None => {
            nsg_harvester::cli::run::run(config_path, false).await?;
        }
        Some(Commands::Config { action }) => match action {
            ConfigAction::Init { stdout } => {
                nsg_harvester::cli::config::init(stdout)?;
            }
            ConfigAction::Validate => {
                nsg_harvester::cli::config::validate(config_path)?;
            }
        },
        Some(Commands::Inspect {
            key,
            start,
            syslog_hostname,
        }) => {
            let options = InspectOptions {
                start,
                syslog_hostname,
            };
            nsg_harvester::cli::inspect::inspect(config_path, &key, options).await?;
        }
    }

    Ok(())
}
