//! Apple Music library access through `osascript`.
//!
//! The snapshot is fetched with one script that returns each property list
//! joined by ASCII record separators, which is far faster than walking tracks
//! one by one. Writes address a single track by persistent ID.

use log::{debug, info};
use std::process::Command;

use crate::error::{Result, SyncError, WriteError};
use crate::library::{LibraryCatalog, LibraryWriter};
use crate::models::{FieldUpdate, TargetTrack};

/// Separates the property lists in the snapshot output
const GROUP_SEP: char = '\u{1d}';
/// Separates values within one property list
const RECORD_SEP: char = '\u{1e}';

const SNAPSHOT_FIELDS: usize = 7;

const SNAPSHOT_SCRIPT: &str = r#"
set gs to (ASCII character 29)
set rs to (ASCII character 30)
tell application "Music"
    set lib to library playlist 1
    set ids to persistent ID of every track of lib
    set names to name of every track of lib
    set artists to artist of every track of lib
    set albums to album of every track of lib
    set durations to duration of every track of lib
    set bpms to bpm of every track of lib
    set comments to comment of every track of lib
end tell
set AppleScript's text item delimiters to rs
set out to (ids as text) & gs & (names as text) & gs & (artists as text) & gs & (albums as text) & gs & (durations as text) & gs & (bpms as text) & gs & (comments as text)
set AppleScript's text item delimiters to ""
return out
"#;

/// Escape a value for an AppleScript string literal.
pub fn escape_applescript(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

fn optional_text(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

/// AppleScript renders reals with the user's decimal separator
fn parse_real(s: &str) -> Option<f64> {
    s.trim().replace(',', ".").parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse the snapshot script output into tracks. Music stores "no BPM" as 0.
pub fn parse_snapshot(output: &str) -> Result<Vec<TargetTrack>> {
    let output = output.trim_end_matches(&['\r', '\n'][..]);
    let groups: Vec<Vec<&str>> = output
        .split(GROUP_SEP)
        .map(|g| g.split(RECORD_SEP).collect())
        .collect();
    if groups.len() != SNAPSHOT_FIELDS {
        return Err(SyncError::Library(format!(
            "unexpected snapshot layout: {} property lists",
            groups.len()
        )));
    }

    let ids = &groups[0];
    if ids.len() == 1 && ids[0].is_empty() {
        return Ok(Vec::new());
    }
    if let Some(g) = groups.iter().find(|g| g.len() != ids.len()) {
        return Err(SyncError::Library(format!(
            "snapshot property lists differ in length ({} vs {})",
            g.len(),
            ids.len()
        )));
    }

    let tracks = (0..ids.len())
        .map(|i| TargetTrack {
            id: ids[i].trim().to_string(),
            title: groups[1][i].to_string(),
            artist: groups[2][i].to_string(),
            album: optional_text(groups[3][i]),
            duration_sec: parse_real(groups[4][i]),
            bpm: parse_real(groups[5][i]).filter(|b| *b > 0.0),
            comment: optional_text(groups[6][i]),
        })
        .collect();
    Ok(tracks)
}

/// Script setting BPM and/or comment of the track with `target_id`.
/// Music's BPM property is an integer, so the value is rounded here.
pub fn write_script(target_id: &str, update: &FieldUpdate) -> String {
    let mut sets = String::new();
    if let Some(bpm) = update.bpm {
        sets.push_str(&format!("        set bpm of t to {}\n", bpm.round() as i64));
    }
    if let Some(comment) = &update.key_comment {
        sets.push_str(&format!(
            "        set comment of t to \"{}\"\n",
            escape_applescript(comment)
        ));
    }
    format!(
        r#"tell application "Music"
    try
        set matches to (every track of library playlist 1 whose persistent ID is "{id}")
        if (count of matches) is 0 then return "NOTFOUND"
        set t to item 1 of matches
{sets}        return "OK"
    on error errMsg number errNum
        return "ERR " & errNum & ": " & errMsg
    end try
end tell"#,
        id = escape_applescript(target_id),
        sets = sets
    )
}

/// Driver for the Music app. Nothing is executed until a method is called.
#[derive(Debug)]
pub struct MusicApp {
    osascript: String,
}

impl Default for MusicApp {
    fn default() -> Self {
        Self::new()
    }
}

impl MusicApp {
    pub fn new() -> Self {
        Self {
            osascript: "osascript".to_string(),
        }
    }

    fn run_script(&self, script: &str) -> std::result::Result<String, String> {
        let output = Command::new(&self.osascript)
            .arg("-e")
            .arg(script)
            .output()
            .map_err(|e| format!("failed to launch {}: {}", self.osascript, e))?;
        if !output.status.success() {
            return Err(String::from_utf8_lossy(&output.stderr).trim().to_string());
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

impl LibraryCatalog for MusicApp {
    fn load_library_tracks(&mut self) -> Result<Vec<TargetTrack>> {
        let output = self
            .run_script(SNAPSHOT_SCRIPT)
            .map_err(|e| SyncError::Library(format!("reading Music library: {}", e)))?;
        let tracks = parse_snapshot(&output)?;
        info!("Music library snapshot: {} tracks", tracks.len());
        Ok(tracks)
    }
}

impl LibraryWriter for MusicApp {
    fn write_fields(
        &mut self,
        target_id: &str,
        update: &FieldUpdate,
    ) -> std::result::Result<(), WriteError> {
        let output = self
            .run_script(&write_script(target_id, update))
            .map_err(WriteError::Unavailable)?;
        let reply = output.trim();
        debug!("{}: osascript replied {:?}", target_id, reply);
        match reply {
            "OK" => Ok(()),
            "NOTFOUND" => Err(WriteError::NotFound(target_id.to_string())),
            other => Err(WriteError::Rejected(other.to_string())),
        }
    }
}
