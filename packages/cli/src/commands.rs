// ABOUTME: Implementations of the taskweave subcommands
// ABOUTME: Batch runs through the distributor, one-off sandbox execution, and the language table

use anyhow::{bail, Context, Result};
use colored::*;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, ContentArrangement, Table};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use taskweave_config::TaskweaveConfig;
use taskweave_core::{Task, TaskStatus};
use taskweave_sandbox::{ExecutionRequest, Language};
use taskweave_tasks::{DistributorError, ShutdownSummary, TaskDistributor};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::app;
use crate::input::load_tasks;
use crate::tracker::CompletionTracker;

const RESUBMIT_INTERVAL: Duration = Duration::from_millis(100);

pub async fn run_batch(
    config: &TaskweaveConfig,
    tasks_file: &Path,
    concurrency: Option<usize>,
) -> Result<()> {
    let tasks = load_tasks(tasks_file).await?;
    if tasks.is_empty() {
        println!("{}", "No tasks to run".yellow());
        return Ok(());
    }
    let total = tasks.len();
    let concurrency = concurrency.unwrap_or(config.pool.max_concurrency);
    if concurrency == 0 {
        bail!("--concurrency must be at least 1");
    }

    let tracker = Arc::new(CompletionTracker::new(app::result_store(config)));
    let distributor = app::distributor_builder(config, concurrency)?
        .persistence(tracker.clone())
        .build()?;

    let shutdown = CancellationToken::new();
    distributor.start(shutdown.clone())?;
    info!(tasks = total, workers = concurrency, "Running task batch");

    let interrupted = tokio::select! {
        result = async {
            submit_all(&distributor, tasks).await?;
            tracker.wait_for(total).await;
            Ok::<_, DistributorError>(())
        } => {
            result?;
            false
        }
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, letting in-flight tasks finish");
            shutdown.cancel();
            true
        }
    };

    let summary = distributor.stop().await;
    print_report(&tracker.finished(), total, &summary);

    if interrupted {
        bail!("Batch interrupted before all tasks finished");
    }
    Ok(())
}

/// Keep feeding the queue, waiting for room whenever it is full
async fn submit_all(distributor: &TaskDistributor, mut pending: Vec<Task>) -> Result<(), DistributorError> {
    while !pending.is_empty() {
        match distributor.distribute_tasks(pending.clone()) {
            Ok(_) => return Ok(()),
            Err(DistributorError::QueueFull { enqueued, .. }) => {
                pending.drain(..enqueued);
                debug!(remaining = pending.len(), "Queue full, waiting to resubmit");
                tokio::time::sleep(RESUBMIT_INTERVAL).await;
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

fn print_report(finished: &[Task], total: usize, summary: &ShutdownSummary) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["ID", "Status", "Attempts", "Result"]);

    for task in finished {
        let outcome = match task.status {
            TaskStatus::Completed => task.result.clone().unwrap_or_default(),
            _ => task.error.clone().unwrap_or_default(),
        };
        table.add_row(vec![
            task.id.clone(),
            task.status.to_string(),
            task.attempts.to_string(),
            truncate(&outcome, 80),
        ]);
    }
    println!("{}", table);

    let completed = finished
        .iter()
        .filter(|t| t.status == TaskStatus::Completed)
        .count();
    let failed = finished.len() - completed;
    println!(
        "{} {}  {} {}  {} {}",
        "Completed:".green().bold(),
        completed,
        "Failed:".red().bold(),
        failed,
        "Unfinished:".yellow().bold(),
        total - finished.len()
    );
    if summary.abandoned > 0 {
        println!(
            "{} {} worker(s) were still busy when the shutdown grace period ran out",
            "Warning:".yellow().bold(),
            summary.abandoned
        );
    }
    if !summary.undelivered.is_empty() {
        println!(
            "{} {} queued task(s) never started: {}",
            "Warning:".yellow().bold(),
            summary.undelivered.len(),
            summary.undelivered.join(", ")
        );
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    let first_line = text.lines().next().unwrap_or_default();
    if first_line.chars().count() > max_chars {
        let cut: String = first_line.chars().take(max_chars).collect();
        format!("{}...", cut)
    } else {
        first_line.to_string()
    }
}

pub async fn exec_file(config: &TaskweaveConfig, language: &str, file: &Path) -> Result<()> {
    let language: Language = language.parse()?;
    let source = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;

    let executor = app::sandbox_executor(config)?;
    app::check_docker(&executor).await;

    let deadline = tokio::time::Instant::now() + config.worker.task_timeout;
    let output = executor
        .run(&ExecutionRequest { language, source }, deadline)
        .await?;

    print!("{}", output.output);
    match output.exit_code {
        Some(0) => Ok(()),
        Some(code) => bail!("Program exited with status {}", code),
        None => Ok(()),
    }
}

pub fn list_languages() {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec!["Language", "Image", "Entrypoint", "Command"]);

    for language in Language::ALL {
        let spec = language.spec();
        table.add_row(vec![
            language.name().to_string(),
            spec.image.to_string(),
            spec.file_name.to_string(),
            spec.command.join(" "),
        ]);
    }
    println!("{}", table);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_keeps_first_line() {
        assert_eq!(truncate("short\nsecond line", 80), "short");
        assert_eq!(truncate("abcdef", 3), "abc...");
        assert_eq!(truncate("", 3), "");
    }
}
