//! Run orchestration: one playlist against one library snapshot.
//!
//! Flow per source track, in playlist order:
//!   candidates (title-token index) → match → per-field decisions → one write
//!
//! A target claimed by one source track is never matched again in the same
//! run. Write failures are recorded on the track and the run continues.

use log::{debug, info, warn};
use rustc_hash::FxHashSet;
use std::path::PathBuf;
use std::time::Instant;

use crate::djay::{DjayLibrary, SourceReader};
use crate::error::{Result, SyncError};
use crate::library::{LibraryCatalog, LibraryWriter, TargetLibrary};
use crate::matcher::{duration_delta, MatchConfig, Matcher, TargetIndex};
use crate::models::{
    FieldUpdate, MatchResult, OverwriteMode, RunStats, RunSummary, SourceTrack, TargetId,
    TrackOutcome, TrackReport, UpdateDecision,
};
use crate::policy;
use crate::progress::{create_progress_bar, create_spinner, log_progress};

/// `[matching] n/total` cadence in log-only mode
const PROGRESS_LOG_INTERVAL: u64 = 25;

#[derive(Debug, Clone, Default)]
pub struct RunConfig {
    pub db_path: PathBuf,
    pub playlist: Option<String>,
    /// Dry run unless set
    pub apply: bool,
    pub overwrite_mode: OverwriteMode,
    /// Stop after this many processed tracks; None or 0 means no limit
    pub limit: Option<usize>,
    pub list_playlists: bool,
    pub matching: MatchConfig,
}

/// Open the djay database at `config.db_path` and run.
pub fn run_sync(config: &RunConfig, library: &mut dyn TargetLibrary) -> Result<RunSummary> {
    let source = DjayLibrary::open(&config.db_path)?;
    run_sync_with(config, &source, library)
}

/// Run against an already-open source.
pub fn run_sync_with(
    config: &RunConfig,
    source: &dyn SourceReader,
    library: &mut dyn TargetLibrary,
) -> Result<RunSummary> {
    let start = Instant::now();

    if config.list_playlists {
        let playlists = source.list_playlists()?;
        info!("{} playlists", playlists.len());
        return Ok(RunSummary {
            dry_run: !config.apply,
            playlists,
            ..RunSummary::default()
        });
    }

    config.matching.validate()?;

    let playlist = config
        .playlist
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .ok_or_else(|| {
            SyncError::Config("provide a playlist name, or list playlists instead".to_string())
        })?;

    let source_tracks = source.load_playlist_tracks(playlist)?;

    let spinner = create_spinner("Reading library...");
    let targets = library.load_library_tracks();
    spinner.finish_and_clear();
    let targets = targets?;

    let matcher = Matcher::new(config.matching.clone());
    let index = TargetIndex::new(&targets);
    info!(
        "Matching {} playlist tracks against {} library tracks ({} title tokens, {} similarity)",
        source_tracks.len(),
        index.len(),
        index.token_count(),
        config.matching.similarity.build().name()
    );

    let to_process = match config.limit {
        Some(n) if n > 0 => n.min(source_tracks.len()),
        _ => source_tracks.len(),
    };

    let mut run = RunState {
        apply: config.apply,
        overwrite_mode: config.overwrite_mode,
        consumed: FxHashSet::default(),
        stats: RunStats {
            playlist_tracks: source_tracks.len(),
            ..RunStats::default()
        },
        tracks: Vec::with_capacity(to_process),
    };

    let pb = create_progress_bar(to_process as u64, "Matching");
    for (i, source_track) in source_tracks.iter().take(to_process).enumerate() {
        let candidates = if matcher.can_use_token_index() {
            index.candidates(&source_track.title)
        } else {
            index.all()
        };
        let result = matcher.match_track(source_track, candidates, &run.consumed);
        run.record(source_track, result, library);

        pb.inc(1);
        log_progress("matching", (i + 1) as u64, to_process as u64, PROGRESS_LOG_INTERVAL);
    }
    pb.finish_and_clear();

    run.stats.elapsed_seconds = start.elapsed().as_secs_f64();
    info!(
        "Processed {} tracks: {} applied, {} skipped, {} ambiguous, {} unmatched, {} write failures",
        run.stats.processed,
        run.stats.matched_applied,
        run.stats.matched_skipped,
        run.stats.ambiguous,
        run.stats.unmatched,
        run.stats.write_failures
    );

    Ok(RunSummary {
        playlist: Some(playlist.to_string()),
        dry_run: !config.apply,
        stats: run.stats,
        tracks: run.tracks,
        playlists: Vec::new(),
    })
}

/// Mutable state threaded through one run
struct RunState {
    apply: bool,
    overwrite_mode: OverwriteMode,
    consumed: FxHashSet<TargetId>,
    stats: RunStats,
    tracks: Vec<TrackReport>,
}

impl RunState {
    fn record(&mut self, source: &SourceTrack, result: MatchResult, library: &mut dyn TargetLibrary) {
        self.stats.processed += 1;

        let (decisions, outcome) = match &result {
            MatchResult::Matched {
                target, tie_broken, ..
            } => {
                self.consumed.insert(target.id.clone());
                self.stats
                    .record_duration_bucket(duration_delta(source.duration_sec, target.duration_sec));
                if *tie_broken {
                    self.stats.tie_breaks += 1;
                }

                let decisions = policy::decide(target, source, self.overwrite_mode);
                let applied = decisions.iter().filter(|d| d.is_apply()).count();
                self.stats.fields_applied += applied;
                self.stats.fields_skipped += decisions.len() - applied;

                let outcome = self.apply_decisions(&target.id, &decisions, library);
                (decisions, outcome)
            }
            MatchResult::Ambiguous { candidates, .. } => {
                debug!(
                    "{} - {}: {} candidates too close to call",
                    source.artist,
                    source.title,
                    candidates.len()
                );
                self.stats.ambiguous += 1;
                (Vec::new(), TrackOutcome::Ambiguous)
            }
            MatchResult::Unmatched { .. } => {
                self.stats.unmatched += 1;
                (Vec::new(), TrackOutcome::Unmatched)
            }
        };

        self.tracks.push(TrackReport {
            result,
            decisions,
            outcome,
        });
    }

    fn apply_decisions(
        &mut self,
        target_id: &str,
        decisions: &[UpdateDecision],
        library: &mut dyn TargetLibrary,
    ) -> TrackOutcome {
        let Some(update) = FieldUpdate::from_decisions(decisions) else {
            self.stats.matched_skipped += 1;
            return TrackOutcome::SkippedAllFields;
        };

        if !self.apply {
            self.stats.matched_applied += 1;
            return TrackOutcome::Applied { dry_run: true };
        }

        self.stats.writes_issued += 1;
        match library.write_fields(target_id, &update) {
            Ok(()) => {
                debug!("{}: wrote {:?}", target_id, update);
                self.stats.matched_applied += 1;
                TrackOutcome::Applied { dry_run: false }
            }
            Err(e) => {
                warn!("{}: write failed: {}", target_id, e);
                self.stats.write_failures += 1;
                TrackOutcome::WriteFailed(e.to_string())
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WriteError;
    use crate::models::{AnalysisSource, Field, SkipReason, TargetTrack};

    struct FakeSource {
        tracks: Vec<SourceTrack>,
    }

    impl SourceReader for FakeSource {
        fn list_playlists(&self) -> Result<Vec<String>> {
            Ok(vec!["Peak Time".to_string(), "Warmup".to_string()])
        }

        fn load_playlist_tracks(&self, name: &str) -> Result<Vec<SourceTrack>> {
            if name == "Peak Time" {
                Ok(self.tracks.clone())
            } else {
                Err(SyncError::PlaylistNotFound(name.to_string()))
            }
        }
    }

    /// In-memory library that applies writes to its own tracks
    #[derive(Default)]
    struct FakeLibrary {
        tracks: Vec<TargetTrack>,
        writes: Vec<(String, FieldUpdate)>,
        fail_ids: Vec<String>,
    }

    impl LibraryCatalog for FakeLibrary {
        fn load_library_tracks(&mut self) -> Result<Vec<TargetTrack>> {
            Ok(self.tracks.clone())
        }
    }

    impl LibraryWriter for FakeLibrary {
        fn write_fields(
            &mut self,
            target_id: &str,
            update: &FieldUpdate,
        ) -> std::result::Result<(), WriteError> {
            if self.fail_ids.iter().any(|id| id == target_id) {
                return Err(WriteError::Rejected("locked".to_string()));
            }
            self.writes.push((target_id.to_string(), update.clone()));
            let track = self
                .tracks
                .iter_mut()
                .find(|t| t.id == target_id)
                .ok_or_else(|| WriteError::NotFound(target_id.to_string()))?;
            if let Some(bpm) = update.bpm {
                track.bpm = Some(bpm);
            }
            if let Some(key) = &update.key_comment {
                track.comment = Some(key.clone());
            }
            Ok(())
        }
    }

    fn src(id: &str, title: &str, artist: &str, duration: Option<f64>) -> SourceTrack {
        SourceTrack {
            id: id.to_string(),
            title: title.to_string(),
            artist: artist.to_string(),
            album: None,
            duration_sec: duration,
            bpm: Some(128.0),
            key: Some("5A - C - 10m".to_string()),
            analysis_source: AnalysisSource::SecondaryIndex,
        }
    }

    fn tgt(id: &str, title: &str, artist: &str, duration: Option<f64>) -> TargetTrack {
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

    fn config(apply: bool) -> RunConfig {
        RunConfig {
            playlist: Some("Peak Time".to_string()),
            apply,
            ..RunConfig::default()
        }
    }

    #[test]
    fn test_list_playlists_mode() {
        let source = FakeSource { tracks: Vec::new() };
        let mut library = FakeLibrary::default();
        let cfg = RunConfig {
            list_playlists: true,
            ..RunConfig::default()
        };
        let summary = run_sync_with(&cfg, &source, &mut library).unwrap();
        assert_eq!(summary.playlists, vec!["Peak Time", "Warmup"]);
        assert!(summary.tracks.is_empty());
    }

    #[test]
    fn test_missing_playlist_name() {
        let source = FakeSource { tracks: Vec::new() };
        let mut library = FakeLibrary::default();
        let cfg = RunConfig {
            playlist: Some("  ".to_string()),
            ..RunConfig::default()
        };
        let err = run_sync_with(&cfg, &source, &mut library).unwrap_err();
        assert!(matches!(err, SyncError::Config(_)));
    }

    #[test]
    fn test_unknown_playlist() {
        let source = FakeSource { tracks: Vec::new() };
        let mut library = FakeLibrary::default();
        let cfg = RunConfig {
            playlist: Some("Nope".to_string()),
            ..RunConfig::default()
        };
        let err = run_sync_with(&cfg, &source, &mut library).unwrap_err();
        assert!(matches!(err, SyncError::PlaylistNotFound(_)));
    }

    #[test]
    fn test_apply_writes_matched_track() {
        let source = FakeSource {
            tracks: vec![src("s1", "Strobe", "deadmau5", Some(630.0))],
        };
        let mut library = FakeLibrary {
            tracks: vec![
                tgt("exact", "Strobe", "deadmau5", Some(628.0)),
                tgt("live", "Strobe (Live)", "deadmau5", Some(700.0)),
            ],
            ..FakeLibrary::default()
        };

        let summary = run_sync_with(&config(true), &source, &mut library).unwrap();
        assert_eq!(summary.stats.matched_applied, 1);
        assert_eq!(summary.stats.writes_issued, 1);
        assert_eq!(library.writes.len(), 1);
        assert_eq!(library.writes[0].0, "exact");
        assert_eq!(library.writes[0].1.bpm, Some(128.0));
        assert_eq!(summary.tracks[0].outcome, TrackOutcome::Applied { dry_run: false });
    }

    #[test]
    fn test_dry_run_issues_no_writes() {
        let source = FakeSource {
            tracks: vec![src("s1", "Strobe", "deadmau5", Some(630.0))],
        };
        let mut library = FakeLibrary {
            tracks: vec![tgt("exact", "Strobe", "deadmau5", Some(628.0))],
            ..FakeLibrary::default()
        };

        let summary = run_sync_with(&config(false), &source, &mut library).unwrap();
        assert!(summary.dry_run);
        assert!(library.writes.is_empty());
        assert_eq!(summary.stats.writes_issued, 0);
        assert_eq!(summary.tracks[0].outcome, TrackOutcome::Applied { dry_run: true });
    }

    #[test]
    fn test_target_matched_at_most_once() {
        let source = FakeSource {
            tracks: vec![
                src("s1", "Strobe", "deadmau5", Some(630.0)),
                src("s2", "Strobe", "deadmau5", Some(630.0)),
            ],
        };
        let mut library = FakeLibrary {
            tracks: vec![tgt("only", "Strobe", "deadmau5", Some(630.0))],
            ..FakeLibrary::default()
        };

        let summary = run_sync_with(&config(true), &source, &mut library).unwrap();
        let matched: Vec<&str> = summary
            .tracks
            .iter()
            .filter_map(|t| t.result.target())
            .map(|t| t.id.as_str())
            .collect();
        assert_eq!(matched, vec!["only"]);
        assert_eq!(summary.stats.unmatched, 1);
        assert_eq!(library.writes.len(), 1);
    }

    #[test]
    fn test_ambiguous_tracks_are_never_written() {
        let source = FakeSource {
            tracks: vec![
                src("s1", "Intro", "Unknown Artist", None),
                src("s2", "Intro", "Unknown Artist", None),
            ],
        };
        let mut library = FakeLibrary {
            tracks: vec![
                tgt("a", "Intro", "Unknown Artist", None),
                tgt("b", "Intro", "Unknown Artist", None),
            ],
            ..FakeLibrary::default()
        };

        let summary = run_sync_with(&config(true), &source, &mut library).unwrap();
        assert_eq!(summary.stats.ambiguous, 2);
        assert!(summary
            .tracks
            .iter()
            .all(|t| t.outcome == TrackOutcome::Ambiguous));
        assert!(library.writes.is_empty());
    }

    #[test]
    fn test_preserve_existing_is_idempotent() {
        let source = FakeSource {
            tracks: vec![src("s1", "Strobe", "deadmau5", Some(630.0))],
        };
        let mut library = FakeLibrary {
            tracks: vec![tgt("exact", "Strobe", "deadmau5", Some(628.0))],
            ..FakeLibrary::default()
        };
        let cfg = RunConfig {
            overwrite_mode: OverwriteMode::PreserveExisting,
            ..config(true)
        };

        let first = run_sync_with(&cfg, &source, &mut library).unwrap();
        assert_eq!(first.stats.matched_applied, 1);

        let second = run_sync_with(&cfg, &source, &mut library).unwrap();
        assert_eq!(second.stats.writes_issued, 0);
        assert_eq!(second.tracks[0].outcome, TrackOutcome::SkippedAllFields);
        assert!(second.tracks[0].decisions.iter().all(|d| matches!(
            d,
            UpdateDecision::Skip {
                reason: SkipReason::PreservingExisting,
                ..
            }
        )));
        assert_eq!(library.writes.len(), 1);
    }

    #[test]
    fn test_preserve_existing_mixed_fields() {
        let source = FakeSource {
            tracks: vec![src("s1", "Strobe", "deadmau5", Some(630.0))],
        };
        let mut existing = tgt("exact", "Strobe", "deadmau5", Some(628.0));
        existing.bpm = Some(120.0);
        let mut library = FakeLibrary {
            tracks: vec![existing],
            ..FakeLibrary::default()
        };
        let cfg = RunConfig {
            overwrite_mode: OverwriteMode::PreserveExisting,
            ..config(true)
        };

        let summary = run_sync_with(&cfg, &source, &mut library).unwrap();
        let decisions = &summary.tracks[0].decisions;
        assert_eq!(decisions[0].field(), Field::Bpm);
        assert!(!decisions[0].is_apply());
        assert!(decisions[1].is_apply());
        assert_eq!(library.writes[0].1.bpm, None);
        assert_eq!(library.writes[0].1.key_comment.as_deref(), Some("5A - C - 10m"));
    }

    #[test]
    fn test_limit_caps_processed_tracks() {
        let source = FakeSource {
            tracks: vec![
                src("s1", "Strobe", "deadmau5", None),
                src("s2", "Ghosts n Stuff", "deadmau5", None),
                src("s3", "Raise Your Weapon", "deadmau5", None),
            ],
        };
        let mut library = FakeLibrary::default();
        let cfg = RunConfig {
            limit: Some(2),
            ..config(false)
        };

        let summary = run_sync_with(&cfg, &source, &mut library).unwrap();
        assert_eq!(summary.stats.playlist_tracks, 3);
        assert_eq!(summary.stats.processed, 2);
        assert_eq!(summary.tracks.len(), 2);
    }

    #[test]
    fn test_write_failure_does_not_abort() {
        let source = FakeSource {
            tracks: vec![
                src("s1", "Strobe", "deadmau5", Some(630.0)),
                src("s2", "Ghosts n Stuff", "deadmau5", Some(300.0)),
            ],
        };
        let mut library = FakeLibrary {
            tracks: vec![
                tgt("t1", "Strobe", "deadmau5", Some(630.0)),
                tgt("t2", "Ghosts 'n' Stuff", "deadmau5", Some(301.0)),
            ],
            fail_ids: vec!["t1".to_string()],
            ..FakeLibrary::default()
        };

        let summary = run_sync_with(&config(true), &source, &mut library).unwrap();
        assert!(matches!(summary.tracks[0].outcome, TrackOutcome::WriteFailed(_)));
        assert_eq!(summary.tracks[1].outcome, TrackOutcome::Applied { dry_run: false });
        assert_eq!(summary.stats.write_failures, 1);
        assert_eq!(summary.stats.writes_issued, 2);
    }

    #[test]
    fn test_every_processed_track_has_one_result() {
        let source = FakeSource {
            tracks: vec![
                src("s1", "Strobe", "deadmau5", Some(630.0)),
                src("s2", "Nothing Like It", "Nobody", Some(200.0)),
            ],
        };
        let mut library = FakeLibrary {
            tracks: vec![tgt("t1", "Strobe", "deadmau5", Some(630.0))],
            ..FakeLibrary::default()
        };

        let summary = run_sync_with(&config(false), &source, &mut library).unwrap();
        assert_eq!(summary.tracks.len(), summary.stats.processed);
        let sources: Vec<&str> = summary
            .tracks
            .iter()
            .map(|t| t.result.source().id.as_str())
            .collect();
        assert_eq!(sources, vec!["s1", "s2"]);
    }

    #[test]
    fn test_run_sync_opens_djay_database() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("MediaLibrary.db");
        crate::djay::fixtures::create_db(&db_path);

        let mut library = FakeLibrary {
            tracks: vec![tgt("exact", "Strobe", "deadmau5", None)],
            ..FakeLibrary::default()
        };
        let cfg = RunConfig {
            db_path,
            ..config(false)
        };
        let summary = run_sync(&cfg, &mut library).unwrap();
        assert_eq!(summary.stats.processed, 2);
        assert_eq!(summary.stats.matched_applied, 1);
        assert_eq!(summary.stats.unmatched, 1);
    }
}
