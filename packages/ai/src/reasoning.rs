// ABOUTME: Reasoning service that asks Claude for an action plan per task attempt
// ABOUTME: Optionally prepends cached web search results when a task names a context query

use std::sync::Arc;

use async_trait::async_trait;
use taskweave_core::{ActionPlan, ReasoningError, ReasoningService, Task};
use taskweave_search::{SearchCache, SearchError};
use tracing::{debug, info};

use crate::service::{AIService, AIServiceError};

const SYSTEM_PROMPT: &str = "You plan the execution of automated work items. \
Reply with a single JSON object and nothing else. Fields: \
requires_execution (bool), generated_code (string, complete program source), \
language (string, one of go, python, javascript, ruby, rust, java, cpp, php, csharp, swift), \
requires_file_operation (bool), file_operation (object with op \"read\" or \"write\", path, content), \
result (string, the answer when no execution is needed).";

pub struct AnthropicReasoningService {
    ai: AIService,
    search: Option<Arc<SearchCache>>,
}

impl AnthropicReasoningService {
    pub fn new(ai: AIService) -> Self {
        Self { ai, search: None }
    }

    pub fn with_search(mut self, search: Arc<SearchCache>) -> Self {
        self.search = Some(search);
        self
    }

    async fn search_context(&self, task: &Task) -> Result<Option<String>, ReasoningError> {
        let (Some(query), Some(search)) = (task.context_query.as_deref(), self.search.as_ref())
        else {
            return Ok(None);
        };

        match search.search(query).await {
            Ok(text) if text.is_empty() => Ok(None),
            Ok(text) => Ok(Some(text)),
            Err(SearchError::MissingApiKey) => Err(ReasoningError::NotConfigured(
                SearchError::MissingApiKey.to_string(),
            )),
            Err(e) => Err(ReasoningError::Service(format!("context search failed: {}", e))),
        }
    }
}

fn build_prompt(task: &Task, context: Option<&str>) -> String {
    let mut prompt = format!("Task {}:\n{}\n", task.id, task.description);
    if let Some(language) = &task.language {
        prompt.push_str(&format!("\nPreferred language: {}\n", language));
    }
    if let Some(category) = &task.category {
        prompt.push_str(&format!("Category: {}\n", category));
    }
    if let Some(context) = context {
        prompt.push_str("\nWeb search results:\n");
        prompt.push_str(context);
        prompt.push('\n');
    }
    prompt
}

fn map_ai_error(e: AIServiceError) -> ReasoningError {
    match e {
        AIServiceError::NoApiKey => {
            ReasoningError::NotConfigured("ANTHROPIC_API_KEY is not configured".to_string())
        }
        other => ReasoningError::Service(other.to_string()),
    }
}

#[async_trait]
impl ReasoningService for AnthropicReasoningService {
    async fn process_task(&self, task: &Task) -> Result<ActionPlan, ReasoningError> {
        if !self.ai.has_api_key() {
            return Err(map_ai_error(AIServiceError::NoApiKey));
        }

        let context = self.search_context(task).await?;
        let prompt = build_prompt(task, context.as_deref());
        debug!(task_id = %task.id, "Requesting action plan");

        let response = self
            .ai
            .generate_structured::<ActionPlan>(prompt, Some(SYSTEM_PROMPT.to_string()))
            .await
            .map_err(map_ai_error)?;

        info!(
            task_id = %task.id,
            tokens = response.usage.total_tokens(),
            requires_execution = response.data.requires_execution,
            requires_file_operation = response.data.requires_file_operation,
            "Received action plan"
        );
        Ok(response.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskweave_core::TaskCategory;

    #[test]
    fn test_prompt_includes_hints_and_context() {
        let mut task = Task::new("t-1", "Sum the numbers 1 to 10").with_language("python");
        task.category = Some(TaskCategory::Code);

        let prompt = build_prompt(&task, Some("Gauss\nhttps://example.com"));
        assert!(prompt.starts_with("Task t-1:\nSum the numbers 1 to 10\n"));
        assert!(prompt.contains("Preferred language: python"));
        assert!(prompt.contains("Category: code"));
        assert!(prompt.contains("Web search results:\nGauss\nhttps://example.com"));
    }

    #[test]
    fn test_prompt_without_extras() {
        let prompt = build_prompt(&Task::new("t-2", "Say hi"), None);
        assert_eq!(prompt, "Task t-2:\nSay hi\n");
    }

    #[test]
    fn test_error_mapping() {
        assert!(matches!(
            map_ai_error(AIServiceError::NoApiKey),
            ReasoningError::NotConfigured(_)
        ));
        let parse = map_ai_error(AIServiceError::ParseError("bad".into()));
        assert!(matches!(parse, ReasoningError::Service(_)));
        assert!(parse.is_retriable());
    }
}
