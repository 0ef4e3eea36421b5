//! Stage Agents
//!
//! One agent per pipeline stage. Each turns the job input, the website
//! configuration and the outputs of earlier stages into its own output:
//!
//! ```text
//!  keyword
//!     │
//!     ▼
//! ┌──────────┐   ┌──────────┐   ┌──────────┐   ┌──────────┐
//! │ Research │ → │ Outline  │ → │  Draft   │ → │   Tone   │
//! └──────────┘   └──────────┘   └──────────┘   └──────────┘
//!                                                   │
//!     ┌─────────────────────────────────────────────┘
//!     ▼
//! ┌──────────┐   ┌──────────┐   ┌──────────┐
//! │   SEO    │ → │ Metadata │ → │  Image   │ → article
//! └──────────┘   └──────────┘   └──────────┘
//! ```
//!
//! All agents except [`SeoAgent`] call a generative provider. None of them
//! persist anything.

pub mod draft;
pub mod image;
pub mod metadata;
pub mod outline;
pub mod research;
pub mod seo;
pub mod tone;

pub use draft::DraftAgent;
pub use image::ImageAgent;
pub use metadata::{ArticleMetadata, MetadataAgent};
pub use outline::{Outline, OutlineAgent, OutlineSection};
pub use research::{ResearchAgent, ResearchBrief};
pub use seo::{SeoAgent, SeoReport};
pub use tone::ToneAgent;

use serde::de::DeserializeOwned;

use crate::queue::Stage;
use crate::types::{AppError, AppResult};

/// Parse JSON out of a model reply that may wrap it in a code fence.
pub(crate) fn extract_json<T: DeserializeOwned>(response: &str) -> AppResult<T> {
    let json_str = if response.contains("```json") {
        response
            .split("```json")
            .nth(1)
            .and_then(|s| s.split("```").next())
            .unwrap_or(response)
            .trim()
    } else if response.contains("```") {
        response.split("```").nth(1).unwrap_or(response).trim()
    } else {
        response.trim()
    };

    // Models sometimes add prose around the object
    let json_str = match (json_str.find('{'), json_str.rfind('}')) {
        (Some(start), Some(end)) if end > start => &json_str[start..=end],
        _ => json_str,
    };

    serde_json::from_str(json_str)
        .map_err(|e| AppError::LLMApi(format!("Model returned malformed JSON: {}", e)))
}

/// Strip a surrounding ```markdown fence if the model added one.
pub(crate) fn strip_markdown_fence(response: &str) -> String {
    let trimmed = response.trim();
    if let Some(rest) = trimmed.strip_prefix("```") {
        let body = rest.split_once('\n').map(|(_, b)| b).unwrap_or("");
        return body.trim_end().trim_end_matches("```").trim().to_string();
    }
    trimmed.to_string()
}

/// Output of an earlier stage, or a permanent error naming what is missing.
pub(crate) fn require<'a, T>(value: Option<&'a T>, stage: Stage, what: &str) -> AppResult<&'a T> {
    value.ok_or_else(|| {
        AppError::InvalidRequest(format!("{} stage requires {} from an earlier stage", stage, what))
    })
}

pub fn word_count(text: &str) -> u32 {
    text.split_whitespace()
        .filter(|w| w.chars().any(|c| c.is_alphanumeric()))
        .count() as u32
}

pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_dash = false;
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            slug.push(c.to_ascii_lowercase());
            pending_dash = false;
        } else {
            pending_dash = true;
        }
    }
    slug
}

/// Cut `text` to at most `max` characters, preferring a word boundary.
pub fn truncate_chars(text: &str, max: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max).collect();
    match cut.rfind(' ') {
        Some(idx) if idx > max / 2 => cut[..idx].trim_end_matches([',', ';', ':', '-']).to_string(),
        _ => cut,
    }
}
