use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

mod cmd;

#[derive(Parser)]
#[command(name = "ideation")]
#[command(version, about = "Time-budgeted ideation pipeline orchestrator")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit console logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the pipeline once and exit (0 on success, 1 otherwise)
    Once(RunArgs),
    /// Run the pipeline at the top of every hour until interrupted
    Loop(RunArgs),
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
    /// Build daily or weekly summaries from the run artifact
    Report {
        #[command(subcommand)]
        command: ReportCommands,
    },
}

#[derive(Args, Clone, Debug)]
pub struct RunArgs {
    /// Use canned reasoning and signal sources instead of external commands
    #[arg(long)]
    pub dry_run: bool,

    /// Use this text as the only signal instead of collecting
    #[arg(long, conflicts_with = "assumptions")]
    pub manual_signals: Option<String>,

    /// Expand these assumption statements into signals
    #[arg(long)]
    pub assumptions: Option<String>,

    /// Print the full run record as JSON instead of a summary
    #[arg(long)]
    pub json: bool,
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Initialize a default ideation.toml file
    Init,
}

#[derive(Subcommand, Clone)]
pub enum ReportCommands {
    /// Grade counts for one day (defaults to today)
    Daily {
        /// Date as YYYY-MM-DD
        #[arg(long)]
        date: Option<String>,
    },
    /// Grade counts and top ideas for the seven days ending today
    Weekly,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    let code = match &cli.command {
        Commands::Once(args) => cmd::cmd_once(&cli, project_dir, args).await?,
        Commands::Loop(args) => {
            cmd::cmd_loop(&cli, project_dir, args).await?;
            0
        }
        Commands::Config { command } => {
            cmd::cmd_config(&project_dir, command.clone())?;
            0
        }
        Commands::Report { command } => {
            cmd::cmd_report(&cli, project_dir, command.clone())?;
            0
        }
    };

    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
