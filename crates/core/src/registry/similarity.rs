//! String similarity backends for catalogue search.
//!
//! Scores are 0..=100 and only comparable within one backend.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub trait Similarity: Send + Sync {
    fn name(&self) -> &'static str;

    fn score(&self, query: &str, candidate: &str) -> f64;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimilarityKind {
    #[default]
    Weighted,
    Overlap,
}

impl SimilarityKind {
    pub fn build(self) -> Box<dyn Similarity> {
        match self {
            SimilarityKind::Weighted => Box::new(WeightedRatio),
            SimilarityKind::Overlap => Box::new(CharOverlap),
        }
    }
}

impl FromStr for SimilarityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "weighted" | "wratio" => Ok(SimilarityKind::Weighted),
            "overlap" | "simple" => Ok(SimilarityKind::Overlap),
            other => Err(format!("unknown similarity backend '{other}'")),
        }
    }
}

impl fmt::Display for SimilarityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SimilarityKind::Weighted => "weighted",
            SimilarityKind::Overlap => "overlap",
        })
    }
}

// ── Weighted ratio ──────────────────────────────────────────────

/// Blend of whole-string, best-window, and token-order-insensitive ratios.
///
/// Similar-length strings take the best of the plain ratio and the token
/// ratios (scaled by 0.95). When one string is 1.5x longer or more, the
/// best-window ratio is used instead, scaled by 0.9 (or 0.6 past 8x).
#[derive(Debug, Clone, Copy, Default)]
pub struct WeightedRatio;

const UNBASE_SCALE: f64 = 0.95;

impl Similarity for WeightedRatio {
    fn name(&self) -> &'static str {
        "weighted"
    }

    fn score(&self, query: &str, candidate: &str) -> f64 {
        let a = normalize(query);
        let b = normalize(candidate);
        if a.is_empty() || b.is_empty() {
            return 0.0;
        }

        let (len_a, len_b) = (a.chars().count() as f64, b.chars().count() as f64);
        let len_ratio = len_a.max(len_b) / len_a.min(len_b);
        let base = ratio(&a, &b);

        if len_ratio < 1.5 {
            return base
                .max(token_sort_ratio(&a, &b) * UNBASE_SCALE)
                .max(token_set_ratio(&a, &b) * UNBASE_SCALE);
        }

        let partial_scale = if len_ratio < 8.0 { 0.9 } else { 0.6 };
        let (sorted_a, sorted_b) = (sorted_tokens(&a), sorted_tokens(&b));
        base.max(partial_ratio(&a, &b) * partial_scale)
            .max(partial_ratio(&sorted_a, &sorted_b) * UNBASE_SCALE * partial_scale)
    }
}

/// Lowercase, punctuation and underscores to spaces, collapse whitespace.
fn normalize(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_alphanumeric() { c.to_lowercase().next().unwrap_or(c) } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn ratio(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(a, b) * 100.0
}

/// Best ratio of the shorter string against every equal-length window of the longer.
fn partial_ratio(a: &str, b: &str) -> f64 {
    let (short, long) = if a.chars().count() <= b.chars().count() { (a, b) } else { (b, a) };
    let short_len = short.chars().count();
    let long_chars: Vec<char> = long.chars().collect();
    if short_len == 0 {
        return 0.0;
    }
    if short_len == long_chars.len() {
        return ratio(short, long);
    }
    long_chars
        .windows(short_len)
        .map(|w| ratio(short, &w.iter().collect::<String>()))
        .fold(0.0, f64::max)
}

fn sorted_tokens(s: &str) -> String {
    let mut tokens: Vec<&str> = s.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

fn token_sort_ratio(a: &str, b: &str) -> f64 {
    ratio(&sorted_tokens(a), &sorted_tokens(b))
}

fn token_set_ratio(a: &str, b: &str) -> f64 {
    use std::collections::BTreeSet;
    let ta: BTreeSet<&str> = a.split_whitespace().collect();
    let tb: BTreeSet<&str> = b.split_whitespace().collect();
    let common: Vec<&str> = ta.intersection(&tb).copied().collect();
    let only_a: Vec<&str> = ta.difference(&tb).copied().collect();
    let only_b: Vec<&str> = tb.difference(&ta).copied().collect();

    if !common.is_empty() && (only_a.is_empty() || only_b.is_empty()) {
        return 100.0;
    }

    let sect = common.join(" ");
    let join = |rest: &[&str]| {
        if sect.is_empty() {
            rest.join(" ")
        } else if rest.is_empty() {
            sect.clone()
        } else {
            format!("{sect} {}", rest.join(" "))
        }
    };
    let combined_a = join(&only_a);
    let combined_b = join(&only_b);

    let mut best = ratio(&combined_a, &combined_b);
    if !sect.is_empty() {
        best = best.max(ratio(&sect, &combined_a)).max(ratio(&sect, &combined_b));
    }
    best
}

// ── Character overlap ───────────────────────────────────────────

/// Share of the query's characters that occur anywhere in the candidate,
/// relative to the longer string. Equal strings (ignoring case) score 100.
#[derive(Debug, Clone, Copy, Default)]
pub struct CharOverlap;

impl Similarity for CharOverlap {
    fn name(&self) -> &'static str {
        "overlap"
    }

    fn score(&self, query: &str, candidate: &str) -> f64 {
        let a = query.to_lowercase();
        let b = candidate.to_lowercase();
        if a == b {
            return 100.0;
        }
        let longest = a.chars().count().max(b.chars().count());
        if longest == 0 {
            return 0.0;
        }
        let common = a.chars().filter(|c| b.contains(*c)).count();
        (common as f64 / longest as f64 * 100.0).floor()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_strings_score_full() {
        assert_eq!(WeightedRatio.score("set_cabin_temperature", "set cabin temperature"), 100.0);
        assert_eq!(CharOverlap.score("Volume", "volume"), 100.0);
    }

    #[test]
    fn weighted_ranks_closer_name_higher() {
        let w = WeightedRatio;
        let close = w.score("cabin temperature", "set_cabin_temperature");
        let far = w.score("cabin temperature", "adjust_volume");
        assert!(close > far, "{close} <= {far}");
        assert!(close >= 60.0);
    }

    #[test]
    fn token_order_does_not_matter_much() {
        let w = WeightedRatio;
        assert!(w.score("mode driving set", "set_driving_mode") >= 90.0);
    }

    #[test]
    fn empty_scores_zero() {
        assert_eq!(WeightedRatio.score("", "battery_module"), 0.0);
        assert_eq!(WeightedRatio.score("!!!", "battery_module"), 0.0);
        assert_eq!(CharOverlap.score("", "x"), 0.0);
    }

    #[test]
    fn overlap_counts_shared_characters() {
        // 'a', 'b' present in "abcd"; 'z' is not: 2 / 4.
        assert_eq!(CharOverlap.score("abz", "abcd"), 50.0);
    }

    #[test]
    fn kind_parses() {
        assert_eq!("Weighted".parse::<SimilarityKind>().unwrap(), SimilarityKind::Weighted);
        assert_eq!("overlap".parse::<SimilarityKind>().unwrap(), SimilarityKind::Overlap);
        assert!("cosine".parse::<SimilarityKind>().is_err());
        assert_eq!(SimilarityKind::Overlap.build().name(), "overlap");
    }
}
