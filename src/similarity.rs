//! String similarity used by the matcher.
//!
//! The matcher only sees the `Similarity` trait, so a stricter or looser
//! comparison can be swapped in from config without touching its control flow.

use rustc_hash::FxHashSet;
use serde::Deserialize;

use crate::normalize::tokens;

/// Similarity of two normalized strings in `[0, 1]`.
pub trait Similarity {
    fn similarity(&self, a: &str, b: &str) -> f64;

    fn name(&self) -> &'static str;

    /// True when a positive score implies at least one shared token
    fn is_token_based(&self) -> bool {
        false
    }
}

/// 1.0 for equal strings, otherwise the token-overlap (Jaccard) ratio.
/// Empty strings never match anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenOverlap;

impl Similarity for TokenOverlap {
    fn similarity(&self, a: &str, b: &str) -> f64 {
        if a.is_empty() || b.is_empty() {
            return 0.0;
        }
        if a == b {
            return 1.0;
        }
        token_overlap_ratio(a, b)
    }

    fn name(&self) -> &'static str {
        "token-overlap"
    }

    fn is_token_based(&self) -> bool {
        true
    }
}

/// Jaro-Winkler on the full string, for libraries with frequent typos.
/// Looser than `TokenOverlap`: "strobe" vs "strobes" scores ~0.97.
#[derive(Debug, Clone, Copy, Default)]
pub struct JaroWinkler;

impl Similarity for JaroWinkler {
    fn similarity(&self, a: &str, b: &str) -> f64 {
        if a.is_empty() || b.is_empty() {
            return 0.0;
        }
        if a == b {
            return 1.0;
        }
        strsim::jaro_winkler(a, b)
    }

    fn name(&self) -> &'static str {
        "jaro-winkler"
    }
}

/// Jaccard similarity on word tokens.
pub fn token_overlap_ratio(a: &str, b: &str) -> f64 {
    let tokens_a: FxHashSet<&str> = tokens(a).collect();
    let tokens_b: FxHashSet<&str> = tokens(b).collect();

    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0.0;
    }

    let intersection = tokens_a.intersection(&tokens_b).count();
    let union = tokens_a.union(&tokens_b).count();

    intersection as f64 / union as f64
}

/// Config-selectable similarity function
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SimilarityKind {
    #[default]
    TokenOverlap,
    JaroWinkler,
}

impl SimilarityKind {
    pub fn build(self) -> Box<dyn Similarity> {
        match self {
            SimilarityKind::TokenOverlap => Box::new(TokenOverlap),
            SimilarityKind::JaroWinkler => Box::new(JaroWinkler),
        }
    }
}
