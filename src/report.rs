//! Flat report rows and their CSV / stdout sinks.

use serde::Serialize;
use std::path::Path;

use crate::error::Result;
use crate::keymap::camelot_code;
use crate::models::{Field, MatchResult, RunSummary, TrackOutcome, TrackReport, UpdateDecision};

/// One processed track, flattened for CSV
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRow {
    pub status: String,
    pub outcome: String,
    pub artist: String,
    pub title: String,
    pub album: String,
    pub source_id: String,
    pub target_id: String,
    pub confidence: Option<f64>,
    pub tie_broken: bool,
    pub bpm: Option<f64>,
    pub key: String,
    pub camelot: String,
    pub analysis_source: String,
    pub bpm_decision: String,
    pub key_decision: String,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaylistRow {
    pub name: String,
}

fn decision_text(decision: &UpdateDecision) -> String {
    match decision {
        UpdateDecision::Apply { value, .. } => format!("apply {}", value),
        UpdateDecision::Skip { reason, .. } => format!("skip: {}", reason),
    }
}

fn detail_text(track: &TrackReport) -> String {
    match (&track.result, &track.outcome) {
        (_, TrackOutcome::WriteFailed(e)) => e.clone(),
        (MatchResult::Unmatched { reason, .. }, _) => reason.to_string(),
        (MatchResult::Ambiguous { candidates, .. }, _) => {
            let ids: Vec<&str> = candidates.iter().map(|c| c.target.id.as_str()).collect();
            format!("{} candidates: {}", candidates.len(), ids.join(" "))
        }
        _ => String::new(),
    }
}

pub fn row(track: &TrackReport) -> ReportRow {
    let source = track.result.source();
    let (target_id, confidence, tie_broken) = match &track.result {
        MatchResult::Matched {
            target,
            confidence,
            tie_broken,
            ..
        } => (target.id.clone(), Some(*confidence), *tie_broken),
        _ => (String::new(), None, false),
    };

    let mut bpm_decision = String::new();
    let mut key_decision = String::new();
    for decision in &track.decisions {
        match decision.field() {
            Field::Bpm => bpm_decision = decision_text(decision),
            Field::Key => key_decision = decision_text(decision),
        }
    }

    let key = source.key.clone().unwrap_or_default();
    ReportRow {
        status: track.result.label().to_string(),
        outcome: track.outcome.label().to_string(),
        artist: source.artist.clone(),
        title: source.title.clone(),
        album: source.album.clone().unwrap_or_default(),
        source_id: source.id.clone(),
        target_id,
        confidence,
        tie_broken,
        bpm: source.bpm,
        camelot: camelot_code(&key).to_string(),
        key,
        analysis_source: source.analysis_source.as_str().to_string(),
        bpm_decision,
        key_decision,
        detail: detail_text(track),
    }
}

/// One row per processed track, in playlist order.
pub fn all_rows(summary: &RunSummary) -> Vec<ReportRow> {
    summary.tracks.iter().map(row).collect()
}

/// Tracks that were not (or would not be) written.
pub fn skipped_rows(summary: &RunSummary) -> Vec<ReportRow> {
    summary
        .tracks
        .iter()
        .filter(|t| t.outcome.is_skipped())
        .map(row)
        .collect()
}

pub fn playlist_rows(playlists: &[String]) -> Vec<PlaylistRow> {
    playlists
        .iter()
        .map(|name| PlaylistRow { name: name.clone() })
        .collect()
}

/// Write rows with a header line; an empty slice produces an empty file.
pub fn write_csv<T: Serialize>(rows: &[T], path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for r in rows {
        writer.serialize(r)?;
    }
    writer.flush()?;
    Ok(())
}

/// Text block listing skipped tracks, at most `limit` of them (0 = all).
pub fn format_skipped_report(summary: &RunSummary, limit: usize) -> String {
    let rows = skipped_rows(summary);
    let limit = if limit == 0 { rows.len() } else { limit };
    let mut out = format!("Skipped / unmatched tracks: {}\n", rows.len());
    for r in rows.iter().take(limit) {
        let why = [r.detail.as_str(), r.bpm_decision.as_str(), r.key_decision.as_str()]
            .into_iter()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("; ");
        out.push_str(&format!("  [{}] {} - {}: {}\n", r.outcome, r.artist, r.title, why));
    }
    if rows.len() > limit {
        out.push_str(&format!("  ... {} more\n", rows.len() - limit));
    }
    out
}

pub fn print_skipped_report(summary: &RunSummary, limit: usize) {
    print!("{}", format_skipped_report(summary, limit));
}

/// First `n` tracks as one line each.
pub fn format_preview(summary: &RunSummary, n: usize) -> String {
    let mut out = String::new();
    for r in all_rows(summary).iter().take(n) {
        let bpm = r.bpm.map(|b| format!("{:.2}", b)).unwrap_or_else(|| "-".to_string());
        let camelot = if r.camelot.is_empty() { "-" } else { r.camelot.as_str() };
        out.push_str(&format!(
            "{:<12} {} - {} | bpm {} | key {} | {}\n",
            r.outcome, r.artist, r.title, bpm, camelot, r.analysis_source
        ));
    }
    out
}
