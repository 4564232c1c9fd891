// ABOUTME: Deterministic task categorisation from an ordered list of pattern rules
// ABOUTME: The first matching rule wins, so rule order is the priority

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskCategory {
    Code,
    File,
    Research,
    General,
}

impl fmt::Display for TaskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskCategory::Code => "code",
            TaskCategory::File => "file",
            TaskCategory::Research => "research",
            TaskCategory::General => "general",
        };
        f.write_str(s)
    }
}

/// Ordered `(pattern, category)` rules
#[derive(Debug, Clone)]
pub struct Categorizer {
    rules: Vec<(Regex, TaskCategory)>,
}

impl Categorizer {
    pub fn new(rules: Vec<(Regex, TaskCategory)>) -> Self {
        Self { rules }
    }

    /// Build from string patterns, failing on the first invalid regex
    pub fn from_patterns(patterns: &[(&str, TaskCategory)]) -> Result<Self, regex::Error> {
        let rules = patterns
            .iter()
            .map(|(pattern, category)| Ok((Regex::new(pattern)?, *category)))
            .collect::<Result<Vec<_>, regex::Error>>()?;
        Ok(Self { rules })
    }

    pub fn categorize(&self, text: &str) -> TaskCategory {
        self.rules
            .iter()
            .find(|(pattern, _)| pattern.is_match(text))
            .map(|(_, category)| *category)
            .unwrap_or(TaskCategory::General)
    }

    pub fn rules(&self) -> impl Iterator<Item = (&str, TaskCategory)> {
        self.rules.iter().map(|(r, c)| (r.as_str(), *c))
    }
}

const DEFAULT_RULES: &[(&str, TaskCategory)] = &[
    (
        r"(?i)\b(code|script|program|function|compile|execute|run)\b",
        TaskCategory::Code,
    ),
    (
        r"(?i)\b(file|directory|folder|write|save|read)\b",
        TaskCategory::File,
    ),
    (
        r"(?i)\b(search|research|find out|look up|latest)\b",
        TaskCategory::Research,
    ),
];

impl Default for Categorizer {
    fn default() -> Self {
        let rules = DEFAULT_RULES
            .iter()
            .filter_map(|(pattern, category)| Regex::new(pattern).ok().map(|r| (r, *category)))
            .collect();
        Self { rules }
    }
}
