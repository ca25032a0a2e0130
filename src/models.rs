//! Core data models for the djay → library sync.
//!
//! Source and target records, match results, update decisions and the
//! per-run statistics accumulator.

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Type Aliases
// ============================================================================

/// Library persistent ID
pub type TargetId = String;

// ============================================================================
// Source / Target Records
// ============================================================================

/// Track from the djay database (one playlist entry)
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SourceTrack {
    pub id: String, // djay titleID
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    pub duration_sec: Option<f64>,
    pub bpm: Option<f64>,
    pub key: Option<String>, // Camelot comment string, e.g. "8A - A - 1m"
    pub analysis_source: AnalysisSource,
}

/// Where the BPM/key values of a source track were read from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum AnalysisSource {
    SecondaryIndex,
    AnalyzedData,
    None,
}

impl AnalysisSource {
    pub fn as_str(self) -> &'static str {
        match self {
            AnalysisSource::SecondaryIndex => "secondaryIndex_mediaItemIndex",
            AnalysisSource::AnalyzedData => "mediaItemAnalyzedData",
            AnalysisSource::None => "none",
        }
    }
}

/// Track from the music library snapshot
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TargetTrack {
    pub id: TargetId,
    pub title: String,
    pub artist: String,
    #[serde(default)]
    pub album: Option<String>,
    #[serde(default)]
    pub duration_sec: Option<f64>,
    #[serde(default)]
    pub bpm: Option<f64>, // None when the library holds 0
    #[serde(default)]
    pub comment: Option<String>,
}

// ============================================================================
// Matching Models
// ============================================================================

/// A scored candidate produced while matching one source track
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MatchCandidate {
    pub target: TargetTrack,
    pub title_similarity: f64,
    pub artist_similarity: f64,
    pub duration_delta: Option<f64>, // None = unknown on either side
}

impl MatchCandidate {
    /// Mean of title and artist similarity, used as the second ranking key
    pub fn combined_similarity(&self) -> f64 {
        (self.title_similarity + self.artist_similarity) / 2.0
    }
}

/// Why a source track found no match
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum UnmatchedReason {
    /// Some candidates were scored but none passed every gate
    NoEligibleCandidate,
    /// Every eligible target was already claimed earlier in the run
    AllCandidatesConsumed,
}

impl fmt::Display for UnmatchedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnmatchedReason::NoEligibleCandidate => {
                f.write_str("no candidate satisfied thresholds")
            }
            UnmatchedReason::AllCandidatesConsumed => {
                f.write_str("all matching candidates already claimed this run")
            }
        }
    }
}

/// Outcome of matching one source track. Exactly one per processed track.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum MatchResult {
    Matched {
        source: SourceTrack,
        target: TargetTrack,
        confidence: f64,
        /// More than one candidate was eligible and the runner-up was beaten
        tie_broken: bool,
    },
    Ambiguous {
        source: SourceTrack,
        candidates: Vec<MatchCandidate>,
    },
    Unmatched {
        source: SourceTrack,
        reason: UnmatchedReason,
    },
}

impl MatchResult {
    pub fn source(&self) -> &SourceTrack {
        match self {
            MatchResult::Matched { source, .. }
            | MatchResult::Ambiguous { source, .. }
            | MatchResult::Unmatched { source, .. } => source,
        }
    }

    pub fn target(&self) -> Option<&TargetTrack> {
        match self {
            MatchResult::Matched { target, .. } => Some(target),
            _ => None,
        }
    }

    /// Short status label used in reports
    pub fn label(&self) -> &'static str {
        match self {
            MatchResult::Matched { .. } => "matched",
            MatchResult::Ambiguous { .. } => "ambiguous",
            MatchResult::Unmatched { .. } => "unmatched",
        }
    }
}

// ============================================================================
// Update Models
// ============================================================================

/// Editable library field written by the sync
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum Field {
    Bpm,
    Key,
}

impl Field {
    pub const ALL: [Field; 2] = [Field::Bpm, Field::Key];

    pub fn as_str(self) -> &'static str {
        match self {
            Field::Bpm => "bpm",
            Field::Key => "key",
        }
    }
}

/// Value copied verbatim from the source track
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum FieldValue {
    Bpm(f64),
    Key(String),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Bpm(bpm) => write!(f, "{}", bpm),
            FieldValue::Key(key) => f.write_str(key),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum SkipReason {
    SourceEmpty,
    PreservingExisting,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::SourceEmpty => f.write_str("source has no value"),
            SkipReason::PreservingExisting => f.write_str("preserving existing value"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum UpdateDecision {
    Apply { field: Field, value: FieldValue },
    Skip { field: Field, reason: SkipReason },
}

impl UpdateDecision {
    pub fn field(&self) -> Field {
        match self {
            UpdateDecision::Apply { field, .. } | UpdateDecision::Skip { field, .. } => *field,
        }
    }

    pub fn is_apply(&self) -> bool {
        matches!(self, UpdateDecision::Apply { .. })
    }
}

/// Fields handed to the library writer in a single call
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct FieldUpdate {
    pub bpm: Option<f64>,
    pub key_comment: Option<String>,
}

impl FieldUpdate {
    /// Collect the Apply decisions; None when nothing is to be written
    pub fn from_decisions(decisions: &[UpdateDecision]) -> Option<Self> {
        let mut update = FieldUpdate::default();
        for decision in decisions {
            if let UpdateDecision::Apply { value, .. } = decision {
                match value {
                    FieldValue::Bpm(bpm) => update.bpm = Some(*bpm),
                    FieldValue::Key(key) => update.key_comment = Some(key.clone()),
                }
            }
        }
        if update.bpm.is_none() && update.key_comment.is_none() {
            None
        } else {
            Some(update)
        }
    }
}

// ============================================================================
// Run Configuration
// ============================================================================

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum OverwriteMode {
    #[default]
    OverwriteAll,
    PreserveExisting,
}

// ============================================================================
// Per-track Outcome
// ============================================================================

/// What the orchestrator did with a track after matching
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum TrackOutcome {
    /// At least one field written (or would be, in a dry run)
    Applied { dry_run: bool },
    /// Matched, but every field was skipped
    SkippedAllFields,
    Ambiguous,
    Unmatched,
    WriteFailed(String),
}

impl TrackOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            TrackOutcome::Applied { dry_run: true } => "would_apply",
            TrackOutcome::Applied { dry_run: false } => "applied",
            TrackOutcome::SkippedAllFields => "skipped",
            TrackOutcome::Ambiguous => "ambiguous",
            TrackOutcome::Unmatched => "unmatched",
            TrackOutcome::WriteFailed(_) => "write_failed",
        }
    }

    /// Belongs in the "skipped/unmatched only" report view
    pub fn is_skipped(&self) -> bool {
        !matches!(self, TrackOutcome::Applied { .. })
    }
}

/// Full record for one processed source track
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TrackReport {
    pub result: MatchResult,
    pub decisions: Vec<UpdateDecision>,
    pub outcome: TrackOutcome,
}

// ============================================================================
// Statistics
// ============================================================================

/// Per-run counters. Threaded through the orchestrator and returned in the
/// summary; never global.
#[derive(Default, Debug, Clone, PartialEq, Serialize)]
pub struct RunStats {
    pub playlist_tracks: usize,
    pub processed: usize,

    pub matched_applied: usize,
    pub matched_skipped: usize,
    pub ambiguous: usize,
    pub unmatched: usize,
    pub write_failures: usize,
    pub writes_issued: usize,

    pub tie_breaks: usize,
    pub fields_applied: usize,
    pub fields_skipped: usize,

    // Duration delta of accepted matches
    pub duration_matches_0_to_1: usize,
    pub duration_matches_1_to_2: usize,
    pub duration_matches_2_to_3: usize,
    pub duration_matches_over_3: usize,
    pub duration_matches_unknown: usize,

    pub elapsed_seconds: f64,
}

impl RunStats {
    /// Matched tracks (applied or skipped) as a percentage of processed
    pub fn match_rate(&self) -> f64 {
        if self.processed == 0 {
            0.0
        } else {
            100.0 * (self.matched_applied + self.matched_skipped + self.write_failures) as f64
                / self.processed as f64
        }
    }

    /// Log stats to stderr in JSON format
    pub fn log_phase(&self, phase: &str) {
        if let Ok(json) = serde_json::to_string_pretty(self) {
            eprintln!("[STATS:{}]\n{}", phase, json);
        }
    }

    /// Write stats to a JSON file
    pub fn write_to_file(&self, path: &std::path::Path) -> crate::error::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Record duration bucket for an accepted match
    pub fn record_duration_bucket(&mut self, delta: Option<f64>) {
        match delta.map(f64::abs) {
            None => self.duration_matches_unknown += 1,
            Some(d) if d <= 1.0 => self.duration_matches_0_to_1 += 1,
            Some(d) if d <= 2.0 => self.duration_matches_1_to_2 += 1,
            Some(d) if d <= 3.0 => self.duration_matches_2_to_3 += 1,
            Some(_) => self.duration_matches_over_3 += 1,
        }
    }
}

/// Everything a run produced
#[derive(Default, Debug, Clone, Serialize)]
pub struct RunSummary {
    pub playlist: Option<String>,
    pub dry_run: bool,
    pub stats: RunStats,
    pub tracks: Vec<TrackReport>,
    /// Populated only in list-playlists mode
    pub playlists: Vec<String>,
}
