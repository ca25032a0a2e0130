//! Matching a djay track against the library snapshot.
//!
//! A candidate has to clear every gate (title, artist, duration) to be
//! eligible; there is no single best-score-wins path. Near-ties between
//! eligible candidates are reported as ambiguous instead of guessed.

use log::debug;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Deserialize;

use crate::error::{Result, SyncError};
use crate::models::{
    MatchCandidate, MatchResult, SourceTrack, TargetId, TargetTrack, UnmatchedReason,
};
use crate::normalize::{comparison_key, normalize_title, tokens, NormalizedKey};
use crate::similarity::{Similarity, SimilarityKind};

// ============================================================================
// Configuration
// ============================================================================

/// Duration component used when either side has no duration
pub const UNKNOWN_DURATION_SCORE: f64 = 0.5;

/// Matcher tunables. Loaded from the `[matching]` table of the config file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    pub title_threshold: f64,
    pub artist_threshold: f64,
    /// Largest accepted |source - target| duration in seconds
    pub max_duration_delta_secs: f64,
    /// Top two candidates closer than this on duration delta...
    pub tie_epsilon_secs: f64,
    /// ...and on combined similarity are ambiguous
    pub tie_epsilon_similarity: f64,
    /// Confidence multiplier when a near-tie was broken
    pub tie_break_penalty: f64,
    pub similarity: SimilarityKind,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            title_threshold: 0.8,
            artist_threshold: 0.8,
            max_duration_delta_secs: 3.0,
            tie_epsilon_secs: 1.0,
            tie_epsilon_similarity: 0.05,
            tie_break_penalty: 0.9,
            similarity: SimilarityKind::TokenOverlap,
        }
    }
}

impl MatchConfig {
    /// Reject values that would make every track match or none.
    pub fn validate(&self) -> Result<()> {
        let unit = |name: &str, v: f64| {
            if (0.0..=1.0).contains(&v) {
                Ok(())
            } else {
                Err(SyncError::Config(format!("{} must be within [0, 1], got {}", name, v)))
            }
        };
        unit("title_threshold", self.title_threshold)?;
        unit("artist_threshold", self.artist_threshold)?;
        unit("tie_epsilon_similarity", self.tie_epsilon_similarity)?;

        if !(self.max_duration_delta_secs >= 0.0) || !(self.tie_epsilon_secs >= 0.0) {
            return Err(SyncError::Config(
                "duration tolerances must be non-negative".to_string(),
            ));
        }
        if !(self.tie_break_penalty > 0.0 && self.tie_break_penalty <= 1.0) {
            return Err(SyncError::Config(format!(
                "tie_break_penalty must be within (0, 1], got {}",
                self.tie_break_penalty
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Duration Scoring
// ============================================================================

/// Graduated duration score in `[0, 1]`.
pub fn duration_score(delta: Option<f64>) -> f64 {
    let Some(delta) = delta else {
        return UNKNOWN_DURATION_SCORE;
    };
    match delta.abs() {
        d if d <= 2.0 => 1.0,  // Near-perfect
        d if d <= 5.0 => 0.8,  // Excellent
        d if d <= 10.0 => 0.5, // Good
        d if d <= 15.0 => 0.25,
        d if d <= 30.0 => 0.1,
        _ => 0.0,
    }
}

/// Absolute duration difference, None when either side is unknown
pub fn duration_delta(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(a), Some(b)) if a.is_finite() && b.is_finite() => Some((a - b).abs()),
        _ => None,
    }
}

// ============================================================================
// Matcher
// ============================================================================

pub struct Matcher {
    config: MatchConfig,
    similarity: Box<dyn Similarity>,
}

impl Matcher {
    pub fn new(config: MatchConfig) -> Self {
        let similarity = config.similarity.build();
        Self { config, similarity }
    }

    /// Use a custom similarity function instead of the configured one.
    pub fn with_similarity(config: MatchConfig, similarity: Box<dyn Similarity>) -> Self {
        Self { config, similarity }
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    /// Whether a title-token index can preselect candidates without hiding
    /// any eligible one.
    pub fn can_use_token_index(&self) -> bool {
        self.similarity.is_token_based() && self.config.title_threshold > 0.0
    }

    /// Score one candidate against an already-normalized source key.
    pub fn score(
        &self,
        source_key: &NormalizedKey,
        source: &SourceTrack,
        target: &TargetTrack,
    ) -> MatchCandidate {
        let target_key = comparison_key(Some(target.title.as_str()), Some(target.artist.as_str()));
        MatchCandidate {
            target: target.clone(),
            title_similarity: self
                .similarity
                .similarity(&source_key.title, &target_key.title),
            artist_similarity: self
                .similarity
                .similarity(&source_key.artist, &target_key.artist),
            duration_delta: duration_delta(source.duration_sec, target.duration_sec),
        }
    }

    /// Title, artist and duration gates all pass
    pub fn is_eligible(&self, candidate: &MatchCandidate) -> bool {
        candidate.title_similarity >= self.config.title_threshold
            && candidate.artist_similarity >= self.config.artist_threshold
            && candidate
                .duration_delta
                .map_or(true, |d| d <= self.config.max_duration_delta_secs)
    }

    /// Minimum of the three component scores
    pub fn confidence(&self, candidate: &MatchCandidate) -> f64 {
        candidate
            .title_similarity
            .min(candidate.artist_similarity)
            .min(duration_score(candidate.duration_delta))
    }

    /// Duration delta used for ranking; unknown ranks like the worst accepted delta
    fn rank_delta(&self, candidate: &MatchCandidate) -> f64 {
        candidate
            .duration_delta
            .unwrap_or(self.config.max_duration_delta_secs)
    }

    fn is_near_tie(&self, a: &MatchCandidate, b: &MatchCandidate) -> bool {
        (self.rank_delta(a) - self.rank_delta(b)).abs() <= self.config.tie_epsilon_secs
            && (a.combined_similarity() - b.combined_similarity()).abs()
                <= self.config.tie_epsilon_similarity
    }

    /// Find the match for `source` among `candidates`, ignoring targets
    /// already claimed this run.
    pub fn match_track<'a>(
        &self,
        source: &SourceTrack,
        candidates: impl IntoIterator<Item = &'a TargetTrack>,
        consumed: &FxHashSet<TargetId>,
    ) -> MatchResult {
        let source_key = comparison_key(Some(source.title.as_str()), Some(source.artist.as_str()));

        let mut eligible: Vec<MatchCandidate> = Vec::new();
        let mut eligible_consumed = 0usize;

        for target in candidates {
            let candidate = self.score(&source_key, source, target);
            if !self.is_eligible(&candidate) {
                continue;
            }
            if consumed.contains(&target.id) {
                eligible_consumed += 1;
            } else {
                eligible.push(candidate);
            }
        }

        if eligible.is_empty() {
            let reason = if eligible_consumed > 0 {
                UnmatchedReason::AllCandidatesConsumed
            } else {
                UnmatchedReason::NoEligibleCandidate
            };
            debug!("unmatched: {} - {} ({})", source.artist, source.title, reason);
            return MatchResult::Unmatched {
                source: source.clone(),
                reason,
            };
        }

        if eligible.len() == 1 {
            let candidate = eligible.remove(0);
            let confidence = self.confidence(&candidate);
            return MatchResult::Matched {
                source: source.clone(),
                target: candidate.target,
                confidence,
                tie_broken: false,
            };
        }

        // Primary: duration delta ascending. Tiebreaker: combined similarity descending.
        eligible.sort_by(|a, b| {
            self.rank_delta(a)
                .total_cmp(&self.rank_delta(b))
                .then_with(|| b.combined_similarity().total_cmp(&a.combined_similarity()))
        });

        if self.is_near_tie(&eligible[0], &eligible[1]) {
            debug!(
                "ambiguous: {} - {} ({} eligible candidates)",
                source.artist,
                source.title,
                eligible.len()
            );
            return MatchResult::Ambiguous {
                source: source.clone(),
                candidates: eligible,
            };
        }

        let candidate = eligible.swap_remove(0);
        let confidence = self.confidence(&candidate) * self.config.tie_break_penalty;
        debug!(
            "tie broken: {} - {} -> {} (confidence {:.2})",
            source.artist, source.title, candidate.target.id, confidence
        );
        MatchResult::Matched {
            source: source.clone(),
            target: candidate.target,
            confidence,
            tie_broken: true,
        }
    }
}

// ============================================================================
// Candidate Index
// ============================================================================

/// Normalized title token → positions in the library snapshot.
pub struct TargetIndex<'a> {
    tracks: &'a [TargetTrack],
    by_token: FxHashMap<String, Vec<usize>>,
}

impl<'a> TargetIndex<'a> {
    pub fn new(tracks: &'a [TargetTrack]) -> Self {
        let mut by_token: FxHashMap<String, Vec<usize>> = FxHashMap::default();
        for (idx, track) in tracks.iter().enumerate() {
            let title_norm = normalize_title(Some(track.title.as_str()));
            let unique: FxHashSet<&str> = tokens(&title_norm).collect();
            for token in unique {
                by_token.entry(token.to_string()).or_default().push(idx);
            }
        }
        Self { tracks, by_token }
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn token_count(&self) -> usize {
        self.by_token.len()
    }

    /// Targets sharing at least one title token with `title`, in library order.
    pub fn candidates(&self, title: &str) -> Vec<&'a TargetTrack> {
        let title_norm = normalize_title(Some(title));
        let mut positions: Vec<usize> = tokens(&title_norm)
            .filter_map(|t| self.by_token.get(t))
            .flatten()
            .copied()
            .collect();
        positions.sort_unstable();
        positions.dedup();
        positions.into_iter().map(|i| &self.tracks[i]).collect()
    }

    /// Every target, for similarity functions the token index cannot serve.
    pub fn all(&self) -> Vec<&'a TargetTrack> {
        self.tracks.iter().collect()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AnalysisSource;

    fn source(title: &str, artist: &str, duration: Option<f64>) -> SourceTrack {
        SourceTrack {
            id: format!("src-{}", title),
            title: title.to_string(),
            artist: artist.to_string(),
            album: None,
            duration_sec: duration,
            bpm: Some(128.0),
            key: Some("8A - A - 1m".to_string()),
            analysis_source: AnalysisSource::SecondaryIndex,
        }
    }

    fn target(id: &str, title: &str, artist: &str, duration: Option<f64>) -> TargetTrack {
        TargetTrack {
            id: id.to_string(),
            title: title.to_string(),
            artist: artist.to_string(),
            album: None,
            duration_sec: duration,
            bpm: None,
            comment: None,
        }
    }

    #[test]
    fn test_duration_score_ladder() {
        assert_eq!(duration_score(Some(0.0)), 1.0);
        assert_eq!(duration_score(Some(2.0)), 1.0);
        assert_eq!(duration_score(Some(3.0)), 0.8);
        assert_eq!(duration_score(Some(70.0)), 0.0);
        assert_eq!(duration_score(None), UNKNOWN_DURATION_SCORE);
    }

    #[test]
    fn test_duration_delta_unknown() {
        assert_eq!(duration_delta(Some(630.0), Some(628.0)), Some(2.0));
        assert_eq!(duration_delta(None, Some(628.0)), None);
        assert_eq!(duration_delta(Some(f64::NAN), Some(628.0)), None);
    }

    #[test]
    fn test_strobe_exact_beats_live_version() {
        let matcher = Matcher::new(MatchConfig::default());
        let src = source("Strobe", "deadmau5", Some(630.0));
        let targets = vec![
            target("exact", "Strobe", "deadmau5", Some(628.0)),
            target("live", "Strobe (Live)", "deadmau5", Some(700.0)),
        ];

        let result = matcher.match_track(&src, &targets, &FxHashSet::default());
        match result {
            MatchResult::Matched {
                target,
                confidence,
                tie_broken,
                ..
            } => {
                assert_eq!(target.id, "exact");
                assert!(confidence >= 0.95);
                assert!(!tie_broken);
            }
            other => panic!("expected match, got {:?}", other),
        }
    }

    #[test]
    fn test_unmatched_when_nothing_similar() {
        let matcher = Matcher::new(MatchConfig::default());
        let src = source("Strobe", "deadmau5", Some(630.0));
        let targets = vec![target("t1", "Ghosts n Stuff", "deadmau5", Some(630.0))];

        let result = matcher.match_track(&src, &targets, &FxHashSet::default());
        assert_eq!(
            result,
            MatchResult::Unmatched {
                source: src.clone(),
                reason: UnmatchedReason::NoEligibleCandidate,
            }
        );
    }

    #[test]
    fn test_same_title_different_artist_is_not_merged() {
        let matcher = Matcher::new(MatchConfig::default());
        let src = source("Intro", "The xx", Some(128.0));
        let targets = vec![target("t1", "Intro", "M83", Some(128.0))];

        let result = matcher.match_track(&src, &targets, &FxHashSet::default());
        assert!(matches!(result, MatchResult::Unmatched { .. }));
    }

    #[test]
    fn test_duration_gate() {
        let matcher = Matcher::new(MatchConfig::default());
        let src = source("Strobe", "deadmau5", Some(630.0));
        let targets = vec![target("t1", "Strobe", "deadmau5", Some(634.0))];

        let result = matcher.match_track(&src, &targets, &FxHashSet::default());
        assert!(matches!(result, MatchResult::Unmatched { .. }));
    }

    #[test]
    fn test_unknown_duration_is_neutral() {
        let matcher = Matcher::new(MatchConfig::default());
        let src = source("Strobe", "deadmau5", None);
        let targets = vec![target("t1", "Strobe", "deadmau5", Some(634.0))];

        match matcher.match_track(&src, &targets, &FxHashSet::default()) {
            MatchResult::Matched { confidence, .. } => {
                assert_eq!(confidence, UNKNOWN_DURATION_SCORE)
            }
            other => panic!("expected match, got {:?}", other),
        }
    }

    #[test]
    fn test_consumed_candidates_are_skipped() {
        let matcher = Matcher::new(MatchConfig::default());
        let src = source("Strobe", "deadmau5", Some(630.0));
        let targets = vec![target("t1", "Strobe", "deadmau5", Some(630.0))];
        let mut consumed = FxHashSet::default();
        consumed.insert("t1".to_string());

        let result = matcher.match_track(&src, &targets, &consumed);
        assert_eq!(
            result,
            MatchResult::Unmatched {
                source: src.clone(),
                reason: UnmatchedReason::AllCandidatesConsumed,
            }
        );
    }

    #[test]
    fn test_near_tie_is_ambiguous() {
        let matcher = Matcher::new(MatchConfig::default());
        let src = source("Intro", "Unknown Artist", None);
        let targets = vec![
            target("a", "Intro", "Unknown Artist", None),
            target("b", "Intro", "Unknown Artist", None),
        ];

        match matcher.match_track(&src, &targets, &FxHashSet::default()) {
            MatchResult::Ambiguous { candidates, .. } => assert_eq!(candidates.len(), 2),
            other => panic!("expected ambiguous, got {:?}", other),
        }
    }

    #[test]
    fn test_clear_winner_breaks_tie_with_penalty() {
        let matcher = Matcher::new(MatchConfig::default());
        let src = source("Strobe", "deadmau5", Some(630.0));
        let targets = vec![
            target("far", "Strobe", "deadmau5", Some(633.0)),
            target("close", "Strobe", "deadmau5", Some(630.5)),
        ];

        match matcher.match_track(&src, &targets, &FxHashSet::default()) {
            MatchResult::Matched {
                target,
                confidence,
                tie_broken,
                ..
            } => {
                assert_eq!(target.id, "close");
                assert!(tie_broken);
                assert!((confidence - 0.9).abs() < 1e-9);
            }
            other => panic!("expected match, got {:?}", other),
        }
    }

    #[test]
    fn test_tie_epsilon_is_configurable() {
        let config = MatchConfig {
            tie_epsilon_secs: 5.0,
            ..MatchConfig::default()
        };
        let matcher = Matcher::new(config);
        let src = source("Strobe", "deadmau5", Some(630.0));
        let targets = vec![
            target("far", "Strobe", "deadmau5", Some(633.0)),
            target("close", "Strobe", "deadmau5", Some(630.5)),
        ];

        let result = matcher.match_track(&src, &targets, &FxHashSet::default());
        assert!(matches!(result, MatchResult::Ambiguous { .. }));
    }

    #[test]
    fn test_combined_similarity_breaks_equal_deltas() {
        let matcher = Matcher::new(MatchConfig::default());
        let src = source("One More Time Tonight", "Daft Punk", Some(300.0));
        // 4/5 token overlap → 0.8, still eligible
        let targets = vec![
            target("longer", "One More Time Tonight Again", "Daft Punk", Some(300.0)),
            target("exact", "One More Time Tonight", "Daft Punk", Some(300.0)),
        ];

        match matcher.match_track(&src, &targets, &FxHashSet::default()) {
            MatchResult::Matched {
                target,
                confidence,
                tie_broken,
                ..
            } => {
                assert_eq!(target.id, "exact");
                assert!(tie_broken);
                assert!((confidence - 0.9).abs() < 1e-9);
            }
            other => panic!("expected match, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_duration_ranks_as_max_delta() {
        let matcher = Matcher::new(MatchConfig::default());
        let src = source("Strobe", "deadmau5", Some(300.0));

        // 0.5s vs unknown (ranked as 3.0s): clear winner
        let targets = vec![
            target("unknown", "Strobe", "deadmau5", None),
            target("close", "Strobe", "deadmau5", Some(300.5)),
        ];
        match matcher.match_track(&src, &targets, &FxHashSet::default()) {
            MatchResult::Matched {
                target, tie_broken, ..
            } => {
                assert_eq!(target.id, "close");
                assert!(tie_broken);
            }
            other => panic!("expected match, got {:?}", other),
        }

        // 2.5s vs unknown (3.0s): within the 1s epsilon
        let targets = vec![
            target("unknown", "Strobe", "deadmau5", None),
            target("far", "Strobe", "deadmau5", Some(302.5)),
        ];
        let result = matcher.match_track(&src, &targets, &FxHashSet::default());
        assert!(matches!(result, MatchResult::Ambiguous { .. }));
    }

    #[test]
    fn test_partial_title_overlap_below_threshold() {
        let matcher = Matcher::new(MatchConfig::default());
        let src = source("One More Time", "Daft Punk", Some(320.0));
        // 3/4 token overlap → 0.75 < 0.8
        let targets = vec![target("t1", "One More Time Reprise", "Daft Punk", Some(320.0))];

        let result = matcher.match_track(&src, &targets, &FxHashSet::default());
        assert!(matches!(result, MatchResult::Unmatched { .. }));
    }

    #[test]
    fn test_index_candidates_share_a_token() {
        let targets = vec![
            target("a", "Strobe", "deadmau5", None),
            target("b", "Ghosts n Stuff", "deadmau5", None),
            target("c", "Strobe (Radio Edit)", "deadmau5", None),
        ];
        let index = TargetIndex::new(&targets);
        let ids: Vec<&str> = index
            .candidates("Strobe")
            .iter()
            .map(|t| t.id.as_str())
            .collect();
        assert_eq!(ids, vec!["a", "c"]);
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn test_custom_similarity() {
        struct CaseSensitive;
        impl Similarity for CaseSensitive {
            fn similarity(&self, a: &str, b: &str) -> f64 {
                if !a.is_empty() && a == b {
                    1.0
                } else {
                    0.0
                }
            }
            fn name(&self) -> &'static str {
                "exact"
            }
        }

        let matcher = Matcher::with_similarity(MatchConfig::default(), Box::new(CaseSensitive));
        assert!(!matcher.can_use_token_index());
        let src = source("Strobe", "deadmau5", Some(630.0));
        let targets = vec![target("t1", "Strobe (Radio Edit)", "deadmau5", Some(630.0))];
        let result = matcher.match_track(&src, &targets, &FxHashSet::default());
        assert!(matches!(result, MatchResult::Matched { .. }));
    }

    #[test]
    fn test_validate_config() {
        assert!(MatchConfig::default().validate().is_ok());
        let bad = MatchConfig {
            title_threshold: 1.5,
            ..MatchConfig::default()
        };
        assert!(bad.validate().is_err());
        let bad = MatchConfig {
            tie_break_penalty: 0.0,
            ..MatchConfig::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_token_index_disabled_for_jaro_winkler() {
        let config = MatchConfig {
            similarity: SimilarityKind::JaroWinkler,
            ..MatchConfig::default()
        };
        assert!(!Matcher::new(config).can_use_token_index());
        assert!(Matcher::new(MatchConfig::default()).can_use_token_index());
    }
}
