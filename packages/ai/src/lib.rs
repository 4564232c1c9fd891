// ABOUTME: AI service integration for task planning
// ABOUTME: Anthropic API client and the reasoning service workers consult

pub mod reasoning;
pub mod service;

pub use reasoning::AnthropicReasoningService;
pub use service::{
    AIResponse, AIService, AIServiceError, AIServiceResult, Usage, DEFAULT_BASE_URL,
    DEFAULT_MODEL,
};
