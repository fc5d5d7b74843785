mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "deskpilot")]
#[command(about = "Desktop assistant runtime with pluggable capability modules", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Data directory (default: ~/.deskpilot)
    #[arg(long, global = true)]
    home: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Route a message to a module and print its reply
    Ask {
        message: String,

        /// Ask the routing model instead of keyword scoring
        #[arg(long)]
        assisted: bool,

        /// Record the exchange as a new conversation
        #[arg(long)]
        save: bool,
    },

    /// Stream a reply from a model, token by token
    Stream {
        message: String,

        /// Model id (default: the defaultModel preference)
        #[arg(short, long)]
        model: Option<String>,
    },

    /// Show how a message would be routed without handling it
    Route {
        message: String,

        #[arg(long)]
        assisted: bool,
    },

    /// List registered modules
    Modules,

    /// List or run module tools
    Tools {
        #[command(subcommand)]
        command: Option<ToolsCommands>,
    },

    /// List models across all backends
    Models,

    /// Show configuration and backend status
    Status,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ToolsCommands {
    /// List tools and quick actions of enabled modules
    List,
    /// Execute a tool with JSON arguments
    Run {
        name: String,
        /// JSON arguments (e.g. '{"text":"hello"}')
        #[arg(default_value = "{}")]
        params: String,
    },
    /// Run a quick action by id
    Action { id: String },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration
    Show,
    /// Store an API key for a backend (anthropic, openai)
    SetKey { backend: String, key: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let paths = commands::paths(cli.home);

    match cli.command {
        Commands::Ask { message, assisted, save } => {
            commands::ask::run(&paths, &message, assisted, save).await?;
        }
        Commands::Stream { message, model } => {
            commands::stream::run(&paths, &message, model).await?;
        }
        Commands::Route { message, assisted } => {
            commands::route::run(&paths, &message, assisted).await?;
        }
        Commands::Modules => {
            commands::modules::run(&paths).await?;
        }
        Commands::Tools { command } => match command.unwrap_or(ToolsCommands::List) {
            ToolsCommands::List => commands::tools::list(&paths).await?,
            ToolsCommands::Run { name, params } => commands::tools::run(&paths, &name, &params).await?,
            ToolsCommands::Action { id } => commands::tools::action(&paths, &id).await?,
        },
        Commands::Models => {
            commands::models::run(&paths).await?;
        }
        Commands::Status => {
            commands::status::run(&paths).await?;
        }
        Commands::Config { command } => match command {
            ConfigCommands::Show => commands::config_cmd::show(&paths).await?,
            ConfigCommands::SetKey { backend, key } => commands::config_cmd::set_key(&paths, &backend, &key).await?,
        },
    }

    Ok(())
}
