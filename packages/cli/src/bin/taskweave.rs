use clap::{Parser, Subcommand};
use colored::*;
use std::path::PathBuf;
use std::process;
use taskweave_cli::commands;
use taskweave_config::TaskweaveConfig;

#[derive(Parser)]
#[command(name = "taskweave")]
#[command(about = "Taskweave - run AI-planned tasks in sandboxed containers")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a batch of tasks from a JSON file
    Run {
        /// JSON array of {id?, description, language?, context_query?}
        #[arg(long)]
        tasks: PathBuf,
        /// Worker count (defaults to TASKWEAVE_MAX_CONCURRENCY)
        #[arg(long)]
        concurrency: Option<usize>,
    },
    /// Execute one source file in a sandbox container
    Exec {
        #[arg(long, short)]
        language: String,
        file: PathBuf,
    },
    /// List supported languages and their images
    Languages,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    taskweave_cli::init_tracing();

    let cli = Cli::parse();
    if let Err(e) = handle_command(cli.command).await {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        process::exit(1);
    }
}

async fn handle_command(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Languages => {
            commands::list_languages();
            Ok(())
        }
        Commands::Run { tasks, concurrency } => {
            let config = TaskweaveConfig::from_env()?;
            commands::run_batch(&config, &tasks, concurrency).await
        }
        Commands::Exec { language, file } => {
            let config = TaskweaveConfig::from_env()?;
            commands::exec_file(&config, &language, &file).await
        }
    }
}
