//! Theme summaries derived from image captions.
//!
//! Summary format (the contract with the presentation layer):
//! `Key themes: term1 (3), term2 (2), ...`
//! Styles without any repeated caption word get [`NO_THEMES_SUMMARY`].

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

/// Prefix of a theme summary
pub const KEY_THEMES_PREFIX: &str = "Key themes:";

/// Summary used when no word repeats across captions
pub const NO_THEMES_SUMMARY: &str = "Visual style analysis completed";

/// Candidate words considered before filtering singletons
const TOP_WORDS: usize = 10;

/// Themes kept in the summary
const MAX_THEMES: usize = 5;

static WORD_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\w+\b").expect("valid word regex"));

const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by", "is",
    "are", "was", "were", "be", "been", "being", "have", "has", "had", "do", "does", "did", "will",
    "would", "could", "should", "may", "might", "must", "can", "this", "that", "these", "those",
    "i", "you", "he", "she", "it", "we", "they", "me", "him", "her", "us", "them",
];

/// A theme parsed back out of a summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Theme {
    pub term: String,
    pub count: Option<u32>,
}

/// Summarize concatenated captions into their most frequent repeated words.
pub fn summarize_captions(captions: &str) -> String {
    let lowered = captions.to_lowercase();

    // word -> (count, first position)
    let mut freq: HashMap<&str, (u32, usize)> = HashMap::new();
    for (position, word) in WORD_REGEX
        .find_iter(&lowered)
        .map(|m| m.as_str())
        .filter(|w| w.chars().count() > 2 && !STOP_WORDS.contains(w))
        .enumerate()
    {
        freq.entry(word).or_insert((0, position)).0 += 1;
    }

    let mut ranked: Vec<(&str, u32, usize)> = freq
        .into_iter()
        .map(|(word, (count, first))| (word, count, first))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));

    let themes: Vec<String> = ranked
        .into_iter()
        .take(TOP_WORDS)
        .filter(|(_, count, _)| *count > 1)
        .take(MAX_THEMES)
        .map(|(word, count, _)| format!("{} ({})", word, count))
        .collect();

    if themes.is_empty() {
        NO_THEMES_SUMMARY.to_string()
    } else {
        format!("{} {}", KEY_THEMES_PREFIX, themes.join(", "))
    }
}

/// Parse a `Key themes: ...` summary into its terms.
///
/// Returns an empty list for summaries without the prefix.
pub fn parse_key_themes(summary: &str) -> Vec<Theme> {
    let Some(rest) = summary.trim().strip_prefix(KEY_THEMES_PREFIX) else {
        return vec![];
    };

    rest.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(parse_theme)
        .collect()
}

fn parse_theme(part: &str) -> Theme {
    if let Some(open) = part.rfind('(') {
        if let Some(inner) = part[open + 1..].strip_suffix(')') {
            if let Ok(count) = inner.trim().parse::<u32>() {
                return Theme {
                    term: part[..open].trim().to_string(),
                    count: Some(count),
                };
            }
        }
    }

    Theme {
        term: part.to_string(),
        count: None,
    }
}
