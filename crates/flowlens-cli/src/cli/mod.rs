//! CLI entry and dispatch.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use flowlens_core::config;

use crate::logging;

mod commands;

#[derive(Parser)]
#[command(name = "flowlens")]
#[command(version)]
#[command(about = "Inspect live and recorded agent-workflow execution streams")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Feed a recorded stream through the engine and summarize the run
    Replay {
        /// Workflow graph JSON file
        #[arg(long, value_name = "FILE")]
        graph: PathBuf,

        /// Recorded event stream
        #[arg(value_name = "STREAM_FILE")]
        stream: PathBuf,

        /// Deliver the recording in chunks of this many bytes
        #[arg(long, default_value_t = 4096, value_parser = clap::value_parser!(u32).range(1..))]
        chunk_size: u32,

        /// Initial input recorded for the run
        #[arg(long)]
        input: Option<String>,

        /// Print each node's output as classified messages
        #[arg(long)]
        logs: bool,

        /// Print the summary and node states as JSON
        #[arg(long)]
        json: bool,
    },

    /// Start a run on the server and follow its stream
    Watch {
        /// Workflow graph JSON file (sent with the run request)
        #[arg(long, value_name = "FILE")]
        graph: PathBuf,

        /// Initial input for the run
        #[arg(long)]
        input: Option<String>,

        /// Run endpoint (defaults to server_url + stream_path from config)
        #[arg(long)]
        url: Option<String>,
    },

    /// Classify log text into structured messages (reads stdin without FILE)
    Classify {
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Check or preview node task templates
    Template {
        #[command(subcommand)]
        command: TemplateCommands,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(clap::Subcommand)]
enum TemplateCommands {
    /// Report placeholders that do not refer to a known node
    Check {
        #[arg(long, value_name = "FILE")]
        graph: PathBuf,
    },
    /// Show a node's task with example values for referenced nodes
    Preview {
        #[arg(long, value_name = "FILE")]
        graph: PathBuf,

        /// Node whose task to preview
        #[arg(long)]
        node: String,

        /// Example value for {{input}}
        #[arg(long)]
        input: Option<String>,
    },
}

#[derive(clap::Subcommand)]
enum ConfigCommands {
    /// Show the path to the config file
    Path,
    /// Initialize a default config file (if not present)
    Init,
    /// Print the effective configuration
    Show,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    let config = config::Config::load().context("load config")?;
    logging::init(&config.log_level);

    // one tokio runtime for everything
    let rt = tokio::runtime::Runtime::new().context("create tokio runtime")?;

    rt.block_on(async move { dispatch(cli, config).await })
}

async fn dispatch(cli: Cli, config: config::Config) -> Result<()> {
    match cli.command {
        Commands::Replay {
            graph,
            stream,
            chunk_size,
            input,
            logs,
            json,
        } => {
            commands::replay::run(commands::replay::ReplayOptions {
                graph: &graph,
                stream: &stream,
                chunk_size: chunk_size as usize,
                input: input.as_deref(),
                logs,
                json,
                config: &config,
            })
            .await
        }
        Commands::Watch { graph, input, url } => {
            commands::watch::run(&graph, input, url.as_deref(), &config).await
        }
        Commands::Classify { file } => commands::classify::run(file.as_deref()),
        Commands::Template { command } => match command {
            TemplateCommands::Check { graph } => commands::template::check(&graph),
            TemplateCommands::Preview { graph, node, input } => {
                commands::template::preview(&graph, &node, input.as_deref())
            }
        },
        Commands::Config { command } => match command {
            ConfigCommands::Path => {
                commands::config::path();
                Ok(())
            }
            ConfigCommands::Init => commands::config::init(),
            ConfigCommands::Show => commands::config::show(&config),
        },
    }
}
