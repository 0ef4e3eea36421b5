//! SEO Agent
//!
//! Deterministic on-page optimisation, no provider call:
//! - guarantees a single H1 and the keyword in the opening paragraph
//! - links up to [`MAX_INTERNAL_LINKS`] entries of the website's internal
//!   link inventory at the first plain-text mention of their title
//! - scores the result from 0 to 100

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::agents::word_count;
use crate::content::InternalLink;
use crate::pipeline::{StageAgent, StageInput, StageOutput};
use crate::queue::Stage;
use crate::types::{AppError, AppResult};

pub const MAX_INTERNAL_LINKS: usize = 3;

const DENSITY_MIN: f32 = 0.5;
const DENSITY_MAX: f32 = 2.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeoReport {
    pub content: String,
    pub score: u8,
    /// Keyword words as a percentage of all words
    pub keyword_density: f32,
    /// URLs linked by this pass
    pub links_added: Vec<String>,
    pub word_count: u32,
    /// Human-readable hints for checks that did not pass
    pub suggestions: Vec<String>,
}

#[derive(Default)]
pub struct SeoAgent;

impl SeoAgent {
    pub fn new() -> Self {
        Self
    }

    pub fn optimize(
        content: &str,
        keyword: &str,
        fallback_title: &str,
        links: &[InternalLink],
    ) -> SeoReport {
        let keyword = keyword.trim();
        let mut lines: Vec<String> = content.lines().map(str::to_string).collect();

        let h1_index = match lines.iter().position(|l| is_h1(l)) {
            Some(idx) => idx,
            None => {
                lines.insert(0, format!("# {}", fallback_title.trim()));
                lines.insert(1, String::new());
                0
            }
        };

        ensure_keyword_in_intro(&mut lines, h1_index, keyword);
        let links_added = insert_internal_links(&mut lines, links);

        let content = lines.join("\n");
        let (score, keyword_density, suggestions) = score(&content, keyword, links);

        SeoReport {
            word_count: word_count(&content),
            content,
            score,
            keyword_density,
            links_added,
            suggestions,
        }
    }
}

fn is_h1(line: &str) -> bool {
    line.starts_with("# ")
}

fn is_heading(line: &str) -> bool {
    line.trim_start().starts_with('#')
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    !needle.is_empty() && haystack.to_ascii_lowercase().contains(&needle.to_ascii_lowercase())
}

fn count_ci(haystack: &str, needle: &str) -> usize {
    if needle.is_empty() {
        return 0;
    }
    haystack
        .to_ascii_lowercase()
        .matches(&needle.to_ascii_lowercase())
        .count()
}

/// Line range of the first paragraph after the H1.
fn intro_block(lines: &[String], h1_index: usize) -> Option<(usize, usize)> {
    let start = (h1_index + 1..lines.len())
        .find(|&i| !lines[i].trim().is_empty() && !is_heading(&lines[i]))?;
    if lines[h1_index + 1..start].iter().any(|l| is_heading(l)) {
        // The article opens straight into a section
        return None;
    }
    let end = (start..lines.len())
        .find(|&i| lines[i].trim().is_empty() || is_heading(&lines[i]))
        .unwrap_or(lines.len());
    Some((start, end))
}

fn ensure_keyword_in_intro(lines: &mut Vec<String>, h1_index: usize, keyword: &str) {
    if keyword.is_empty() {
        return;
    }
    match intro_block(lines, h1_index) {
        Some((start, end)) => {
            if !lines[start..end].iter().any(|l| contains_ci(l, keyword)) {
                let last = &mut lines[end - 1];
                last.push_str(&format!(" This guide covers {} in detail.", keyword));
            }
        }
        None => {
            lines.insert(h1_index + 1, String::new());
            lines.insert(
                h1_index + 2,
                format!("This guide covers {} in detail.", keyword),
            );
        }
    }
}

/// Byte offset of the first standalone mention of `title` in `line` that
/// is not already part of a markdown link.
fn find_linkable(line: &str, title: &str) -> Option<usize> {
    let lower = line.to_ascii_lowercase();
    let needle = title.to_ascii_lowercase();
    let mut from = 0;

    while let Some(rel) = lower[from..].find(&needle) {
        let pos = from + rel;
        let end = pos + needle.len();
        let prefix = &line[..pos];

        let boundary_before = prefix.chars().last().map_or(true, |c| !c.is_alphanumeric());
        let boundary_after = line[end..].chars().next().map_or(true, |c| !c.is_alphanumeric());
        let in_link_text = prefix.rfind('[') > prefix.rfind(']');
        let in_link_url = prefix
            .rfind("](")
            .is_some_and(|i| !prefix[i..].contains(')'));

        if boundary_before && boundary_after && !in_link_text && !in_link_url {
            return Some(pos);
        }
        from = end;
    }
    None
}

fn insert_internal_links(lines: &mut [String], links: &[InternalLink]) -> Vec<String> {
    let mut added = Vec::new();

    for link in links {
        if added.len() >= MAX_INTERNAL_LINKS {
            break;
        }
        let title = link.title.trim();
        if title.is_empty() || lines.iter().any(|l| l.contains(&format!("]({})", link.url))) {
            continue;
        }

        for line in lines.iter_mut().filter(|l| !is_heading(l)) {
            if let Some(pos) = find_linkable(line, title) {
                let end = pos + title.len();
                let linked = format!("[{}]({})", &line[pos..end], link.url);
                line.replace_range(pos..end, &linked);
                added.push(link.url.clone());
                break;
            }
        }
    }
    added
}

fn score(content: &str, keyword: &str, links: &[InternalLink]) -> (u8, f32, Vec<String>) {
    let mut score = 0u8;
    let mut suggestions = Vec::new();
    let lines: Vec<&str> = content.lines().collect();

    match lines.iter().find(|l| is_h1(l)) {
        Some(h1) => {
            score += 10;
            if contains_ci(h1, keyword) {
                score += 20;
            } else {
                suggestions.push("Include the keyword in the title".to_string());
            }
        }
        None => suggestions.push("Add an H1 title".to_string()),
    }

    let owned: Vec<String> = lines.iter().map(|l| l.to_string()).collect();
    let intro_has_keyword = owned
        .iter()
        .position(|l| is_h1(l))
        .and_then(|h1| intro_block(&owned, h1))
        .is_some_and(|(s, e)| owned[s..e].iter().any(|l| contains_ci(l, keyword)));
    if intro_has_keyword {
        score += 15;
    } else {
        suggestions.push("Mention the keyword in the opening paragraph".to_string());
    }

    let total_words = word_count(content);
    let keyword_words = word_count(keyword).max(1);
    let density = if total_words == 0 {
        0.0
    } else {
        (count_ci(content, keyword) as u32 * keyword_words) as f32 / total_words as f32 * 100.0
    };
    if (DENSITY_MIN..=DENSITY_MAX).contains(&density) {
        score += 20;
    } else if density > 0.0 {
        score += 10;
        suggestions.push(format!(
            "Keyword density {:.1}% is outside {}-{}%",
            density, DENSITY_MIN, DENSITY_MAX
        ));
    } else {
        suggestions.push("The keyword never appears in the body".to_string());
    }

    let h2_count = lines.iter().filter(|l| l.starts_with("## ")).count();
    if h2_count >= 3 {
        score += 15;
    } else {
        suggestions.push("Use at least three H2 sections".to_string());
    }

    if total_words >= 600 {
        score += 10;
    } else if total_words >= 300 {
        score += 5;
        suggestions.push("Articles over 600 words tend to rank better".to_string());
    } else {
        suggestions.push("The article is very short".to_string());
    }

    let has_internal_link = links
        .iter()
        .any(|link| content.contains(&format!("]({})", link.url)));
    if has_internal_link {
        score += 10;
    } else {
        suggestions.push("Link to at least one other page on the site".to_string());
    }

    (score, density, suggestions)
}

#[async_trait]
impl StageAgent for SeoAgent {
    fn stage(&self) -> Stage {
        Stage::Seo
    }

    async fn run(&self, input: StageInput<'_>) -> AppResult<StageOutput> {
        let body = input
            .context
            .toned
            .as_deref()
            .or(input.context.draft.as_deref())
            .ok_or_else(|| {
                AppError::InvalidRequest("seo stage requires a draft from an earlier stage".to_string())
            })?;
        let keyword = &input.job.input.keyword;
        let fallback_title = input
            .context
            .outline
            .as_ref()
            .map(|o| o.title.clone())
            .unwrap_or_else(|| keyword.clone());

        let report = Self::optimize(body, keyword, &fallback_title, &input.website.internal_links);
        info!(
            job_id = %input.job.id,
            score = report.score,
            links_added = report.links_added.len(),
            "SEO pass complete"
        );
        Ok(StageOutput::Seo(report))
    }
}
