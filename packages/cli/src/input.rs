// ABOUTME: Task batch file loading
// ABOUTME: Accepts a JSON array of task descriptions; missing ids are generated

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use taskweave_core::{generate_task_id, Task};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskInput {
    #[serde(default)]
    pub id: Option<String>,
    pub description: String,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub context_query: Option<String>,
}

impl TaskInput {
    pub fn into_task(self) -> Task {
        let id = self.id.unwrap_or_else(generate_task_id);
        let mut task = Task::new(id, self.description);
        task.language = self.language;
        task.context_query = self.context_query;
        task
    }
}

pub fn parse_tasks(json: &str) -> Result<Vec<Task>> {
    let inputs: Vec<TaskInput> =
        serde_json::from_str(json).context("Task file must be a JSON array of tasks")?;

    let mut seen = HashSet::new();
    let mut tasks = Vec::with_capacity(inputs.len());
    for input in inputs {
        if input.description.trim().is_empty() {
            bail!("Task descriptions must not be empty");
        }
        let task = input.into_task();
        if !seen.insert(task.id.clone()) {
            bail!("Duplicate task id: {}", task.id);
        }
        tasks.push(task);
    }
    Ok(tasks)
}

pub async fn load_tasks(path: &Path) -> Result<Vec<Task>> {
    let json = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read task file {}", path.display()))?;
    parse_tasks(&json).with_context(|| format!("Invalid task file {}", path.display()))
}
