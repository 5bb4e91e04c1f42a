//! Prompt classification and model selection
//!
//! Pure functions: no registry access, no network.

use crate::config::InferenceConfig;
use crate::errors::{Result, RouterError};
use serde::{Deserialize, Serialize};

const CODE_KEYWORDS: &[&str] = &[
    "code",
    "function",
    "class",
    "variable",
    "algorithm",
    "programming",
    "javascript",
    "python",
    "typescript",
    "react",
    "api",
    "debug",
];

const REASONING_KEYWORDS: &[&str] = &[
    "analyze",
    "explain",
    "compare",
    "evaluate",
    "strategy",
    "plan",
    "complex",
    "reasoning",
];

/// Prompts shorter than this never count as complex reasoning
pub const REASONING_MIN_CHARS: usize = 200;

/// Coarse task class of a prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptCategory {
    Code,
    Reasoning,
    General,
}

/// Classify a prompt by keyword
///
/// Code wins over reasoning; reasoning also needs a long prompt.
pub fn classify(prompt: &str) -> PromptCategory {
    let lower = prompt.to_lowercase();

    if CODE_KEYWORDS.iter().any(|k| lower.contains(k)) {
        return PromptCategory::Code;
    }

    if is_complex_reasoning(&lower) {
        return PromptCategory::Reasoning;
    }

    PromptCategory::General
}

/// Long prompt with a reasoning keyword, regardless of code keywords
pub fn is_complex_reasoning(prompt: &str) -> bool {
    let lower = prompt.to_lowercase();
    REASONING_KEYWORDS.iter().any(|k| lower.contains(k))
        && lower.chars().count() > REASONING_MIN_CHARS
}

/// Preferred model names per category, most preferred first
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelPriorities {
    pub code: Vec<String>,
    pub reasoning: Vec<String>,
    pub general: Vec<String>,
}

impl ModelPriorities {
    pub fn from_config(config: &InferenceConfig) -> Self {
        Self {
            code: config.code_models.clone(),
            reasoning: config.reasoning_models.clone(),
            general: config.general_models.clone(),
        }
    }

    fn for_category(&self, category: PromptCategory) -> &[String] {
        match category {
            PromptCategory::Code => &self.code,
            PromptCategory::Reasoning => &self.reasoning,
            PromptCategory::General => &self.general,
        }
    }
}

/// Pick a model for `prompt` from `available`
///
/// Order: the category's list, then the reasoning list for a code prompt
/// that is also complex reasoning, then the general list, then the first
/// registered model. Fails only when `available` is empty.
pub fn select_model(
    prompt: &str,
    available: &[String],
    priorities: &ModelPriorities,
) -> Result<String> {
    let category = classify(prompt);
    let reasoning: &[String] = if category == PromptCategory::Code && is_complex_reasoning(prompt) {
        &priorities.reasoning
    } else {
        &[]
    };

    let preferred = priorities
        .for_category(category)
        .iter()
        .chain(reasoning.iter())
        .chain(priorities.general.iter())
        .find(|candidate| available.contains(candidate));

    preferred
        .or_else(|| available.first())
        .cloned()
        .ok_or(RouterError::NoModelAvailable)
}

/// Rough token count: one token per four characters, rounded up
///
/// An approximation for reporting, not a billing-grade count.
pub fn estimate_tokens(text: &str) -> u64 {
    (text.chars().count() as u64).div_ceil(4)
}
