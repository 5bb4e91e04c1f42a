//! Dependency-free fallbacks
//!
//! Pure and deterministic: the same request always yields the same payload,
//! and nothing here touches the network or the filesystem. Quality is not
//! the goal, availability is.

use crate::inference::selection::{classify, PromptCategory};
use crate::router::types::{AiRequest, RequestKind};
use serde_json::{json, Value};

/// Dimensions of the pseudo-embedding
pub const EMBEDDING_DIMENSIONS: usize = 384;

const DEFAULT_SEARCH_LIMIT: usize = 10;

const POSITIVE_WORDS: &[&str] = &["good", "great", "excellent", "amazing"];

/// Result of one fallback run
#[derive(Debug, Clone, PartialEq)]
pub struct FallbackOutcome {
    /// Name of the technique, reported in response metadata
    pub method: &'static str,
    pub result: Result<Value, String>,
}

/// Run the fallback for the request's kind
pub fn run(request: &AiRequest) -> FallbackOutcome {
    match request.kind {
        RequestKind::Embedding => FallbackOutcome {
            method: "simple_hash",
            result: Ok(simple_embeddings(&request.input.texts())),
        },
        RequestKind::Generation => FallbackOutcome {
            method: "rule_based",
            result: Ok(rule_based_reply(&request.input.joined())),
        },
        RequestKind::VectorSearch => FallbackOutcome {
            method: "text_matching",
            result: text_search(
                &request.input.joined(),
                request.options.get("documents"),
                request.option_usize("limit").unwrap_or(DEFAULT_SEARCH_LIMIT),
            ),
        },
        RequestKind::SemanticAnalysis => FallbackOutcome {
            method: "basic_nlp",
            result: Ok(basic_analysis(&request.input.joined())),
        },
    }
}

/// Deterministic 384-dim vector derived from the text's code points
///
/// Empty text maps to the zero vector.
pub fn pseudo_embedding(text: &str) -> Vec<f32> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return vec![0.0; EMBEDDING_DIMENSIONS];
    }

    (0..EMBEDDING_DIMENSIONS)
        .map(|i| {
            let code = chars[i % chars.len()] as u32 as f64;
            ((code * (i + 1) as f64).sin() * 0.1) as f32
        })
        .collect()
}

fn simple_embeddings(texts: &[String]) -> Value {
    let embeddings: Vec<Vec<f32>> = texts.iter().map(|t| pseudo_embedding(t)).collect();
    json!({
        "embeddings": embeddings,
        "model": "simple_hash",
        "dimensions": EMBEDDING_DIMENSIONS,
    })
}

/// Canned reply keyed by prompt category
pub fn rule_based_reply(prompt: &str) -> Value {
    let category = classify(prompt);
    let text = match category {
        PromptCategory::Code => format!(
            "Local code models are unavailable. Based on your input \"{}\", check the relevant \
             function signatures and error output, then retry once the local model server is back.",
            prompt
        ),
        PromptCategory::Reasoning => format!(
            "Detailed analysis needs a local model. Based on your input \"{}\", break the question \
             into smaller parts and compare the options one at a time.",
            prompt
        ),
        PromptCategory::General => {
            format!("Based on your input \"{}\", here is a rule-based response.", prompt)
        }
    };

    json!({
        "text": text,
        "model": "rule_based",
        "category": category,
        "tokensUsed": prompt.split_whitespace().count() + 10,
    })
}

/// Rank caller-supplied documents by overlap with the query
///
/// `documents` items are strings or objects with a `text` field and an
/// optional `id`. A whole-query substring match scores 1.0; otherwise the
/// score is the share of query terms present.
pub fn text_search(query: &str, documents: Option<&Value>, limit: usize) -> Result<Value, String> {
    let Some(documents) = documents else {
        return Ok(json!({
            "results": [],
            "message": "Text search functionality requires vector database",
            "query": query,
        }));
    };

    let items = documents
        .as_array()
        .ok_or_else(|| "Option 'documents' must be an array".to_string())?;

    let query_lower = query.to_lowercase();
    let terms: Vec<&str> = query_lower.split_whitespace().collect();

    let mut scored = Vec::new();
    for (index, item) in items.iter().enumerate() {
        let (id, text) = match item {
            Value::String(text) => (json!(index), text.as_str()),
            Value::Object(fields) => {
                let text = fields.get("text").and_then(Value::as_str).ok_or_else(|| {
                    format!("Document {} has no string 'text' field", index)
                })?;
                (fields.get("id").cloned().unwrap_or(json!(index)), text)
            }
            _ => return Err(format!("Document {} must be a string or an object", index)),
        };

        let score = overlap_score(&query_lower, &terms, &text.to_lowercase());
        if score > 0.0 {
            scored.push((score, id, text));
        }
    }

    // Stable: equal scores keep document order
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));

    let results: Vec<Value> = scored
        .into_iter()
        .take(limit)
        .map(|(score, id, text)| json!({ "id": id, "score": score, "text": text }))
        .collect();

    Ok(json!({ "results": results, "query": query }))
}

fn overlap_score(query: &str, terms: &[&str], text: &str) -> f64 {
    if terms.is_empty() {
        return 0.0;
    }
    if text.contains(query) {
        return 1.0;
    }
    let matched = terms.iter().filter(|term| text.contains(*term)).count();
    matched as f64 / terms.len() as f64
}

/// Word counts, naive sentiment and long words as key phrases
pub fn basic_analysis(text: &str) -> Value {
    let words: Vec<&str> = text.split_whitespace().collect();

    let positive = words.iter().any(|word| {
        let bare = word
            .trim_matches(|c: char| !c.is_alphanumeric())
            .to_lowercase();
        POSITIVE_WORDS.contains(&bare.as_str())
    });

    let key_phrases: Vec<&str> = words
        .iter()
        .copied()
        .filter(|word| word.chars().count() > 4)
        .collect();

    json!({
        "word_count": words.len(),
        "sentiment": if positive { "positive" } else { "neutral" },
        "key_phrases": key_phrases,
        "confidence": 0.6,
        "method": "basic_nlp",
    })
}
