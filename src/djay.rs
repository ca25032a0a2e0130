//! Reading playlists and analyzed tracks out of djay's `MediaLibrary.db`.
//!
//! Most of djay's data lives in the `database2` key/value table as compact
//! TLV-like blobs: `0x08 <value> 0x00 0x08 <fieldName> 0x00 ...`, so a field's
//! value is the string immediately before its name. The database is opened
//! read-only.

use log::{debug, info};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::path::Path;

use crate::error::{Result, SyncError};
use crate::keymap::{key_comment, MAX_KEY_INDEX};
use crate::models::{AnalysisSource, SourceTrack};

const ROOT_PLAYLIST_KEY: &str = "mediaItemPlaylist-root";

const BPM_MARKER: &[u8] = b"\x08bpm\x00";
const KEYSIG_MARKER: &[u8] = b"\x08keySignatureIndex\x00";
const DURATION_MARKER: &[u8] = b"\x08duration\x00";

/// How far back from the key marker to look for a `0x0F <key>` pair
const KEYSIG_SCAN_WINDOW: usize = 32;

// ============================================================================
// Source Reader Interface
// ============================================================================

/// Where the orchestrator gets its playlist and source tracks from.
pub trait SourceReader {
    /// Playlist names, sorted case-insensitively
    fn list_playlists(&self) -> Result<Vec<String>>;

    /// Tracks of the named playlist in playlist order.
    /// Fails with `SyncError::PlaylistNotFound` for an unknown name.
    fn load_playlist_tracks(&self, playlist_name: &str) -> Result<Vec<SourceTrack>>;
}

// ============================================================================
// Blob Parsing
// ============================================================================

fn find_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Value stored immediately before field `key`, or None when absent.
pub fn value_before_key(blob: &[u8], key: &str) -> Option<String> {
    let mut marker = Vec::with_capacity(key.len() + 2);
    marker.push(0x08);
    marker.extend_from_slice(key.as_bytes());
    marker.push(0x00);

    // Position of the field name itself (just past its 0x08 tag)
    let pos = find_bytes(blob, &marker)? + 1;
    let end = blob[..pos].iter().rposition(|&b| b == 0x00)?;
    let start = blob[..end].iter().rposition(|&b| b == 0x08)? + 1;
    String::from_utf8(blob[start..end].to_vec()).ok()
}

fn f32_before(blob: &[u8], marker: &[u8]) -> Option<f64> {
    let p = find_bytes(blob, marker)?;
    if p < 4 {
        return None;
    }
    let bytes: [u8; 4] = blob[p - 4..p].try_into().ok()?;
    let value = f32::from_le_bytes(bytes) as f64;
    value.is_finite().then_some(value)
}

fn key_byte(b: u8) -> Option<i64> {
    let v = i64::from(b);
    (v <= MAX_KEY_INDEX).then_some(v)
}

/// Values parsed from a `mediaItemAnalyzedData` blob
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AnalyzedData {
    pub bpm: Option<f64>,
    pub key_index: Option<i64>,
    pub duration_sec: Option<f64>,
}

/// Parse BPM (f32 LE before its marker), key signature index (0..=23) and,
/// when present, duration from an analyzed-data blob.
///
/// The key index has been seen in two encodings:
///   A) `... 0x0F <key> 0x08 "keySignatureIndex" 0x00 ...`
///   B) `... 0x08 "keySignatureIndex" 0x00 <key> 0x08 "isStraight" 0x00 ...`
///
/// Tried in order: byte after the marker, byte before it, then the byte after
/// the last `0x0F` in a small window before it.
pub fn parse_analyzed_data(blob: &[u8]) -> AnalyzedData {
    let bpm = f32_before(blob, BPM_MARKER);
    let duration_sec = f32_before(blob, DURATION_MARKER).filter(|d| *d > 0.0);

    let mut key_index = None;
    if let Some(ks) = find_bytes(blob, KEYSIG_MARKER) {
        let after = ks + KEYSIG_MARKER.len();
        if after < blob.len() {
            key_index = key_byte(blob[after]);
        }

        if key_index.is_none() && ks >= 1 {
            key_index = key_byte(blob[ks - 1]);
        }

        if key_index.is_none() {
            let start = ks.saturating_sub(KEYSIG_SCAN_WINDOW);
            if let Some(idx) = blob[start..ks].iter().rposition(|&b| b == 0x0F) {
                let pos = start + idx + 1;
                if pos < ks {
                    key_index = key_byte(blob[pos]);
                }
            }
        }
    }

    AnalyzedData {
        bpm,
        key_index,
        duration_sec,
    }
}

// ============================================================================
// djay Database
// ============================================================================

#[derive(Debug)]
pub struct DjayLibrary {
    conn: Connection,
    has_secondary_index: bool,
}

impl DjayLibrary {
    /// Open a djay database read-only.
    pub fn open(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(SyncError::Config(format!(
                "djay database not found: {}",
                path.display()
            )));
        }
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| SyncError::Config(format!("cannot open {}: {}", path.display(), e)))?;
        // SQLite opens lazily; a non-database file only fails on first read
        let library = Self::from_connection(conn).map_err(|e| match e {
            SyncError::Config(_) => e,
            other => SyncError::Config(format!("cannot read {}: {}", path.display(), other)),
        })?;
        info!("Opened djay database: {}", path.display());
        Ok(library)
    }

    pub fn from_connection(conn: Connection) -> Result<Self> {
        let has_database2: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type = 'table' AND name = 'database2'",
            [],
            |row| row.get(0),
        )?;
        if !has_database2 {
            return Err(SyncError::Config(
                "not a djay database: table database2 is missing".to_string(),
            ));
        }
        let has_secondary_index: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM sqlite_master
             WHERE type = 'table' AND name = 'secondaryIndex_mediaItemIndex'",
            [],
            |row| row.get(0),
        )?;
        Ok(Self {
            conn,
            has_secondary_index,
        })
    }

    /// (playlist key, name) pairs, root excluded, sorted by lower-cased name
    pub fn playlists(&self) -> Result<Vec<(String, String)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT key, data FROM database2 WHERE collection = 'mediaItemPlaylists'")?;
        let mut rows = stmt.query([])?;

        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let key: String = row.get(0)?;
            let blob: Vec<u8> = row.get(1)?;
            if key == ROOT_PLAYLIST_KEY {
                continue;
            }
            if let Some(name) = value_before_key(&blob, "name").filter(|n| !n.is_empty()) {
                out.push((key, name));
            }
        }
        out.sort_by_key(|(_, name)| name.to_lowercase());
        Ok(out)
    }

    fn playlist_key_by_name(&self, playlist_name: &str) -> Result<Option<String>> {
        Ok(self
            .playlists()?
            .into_iter()
            .find(|(_, name)| name == playlist_name)
            .map(|(key, _)| key))
    }

    /// Track ids (titleID) of a playlist in stored order
    pub fn track_ids_in_playlist(&self, playlist_key: &str) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT data FROM database2 WHERE collection = 'mediaItemPlaylistItems' ORDER BY rowid",
        )?;
        let mut rows = stmt.query([])?;

        let mut ids = Vec::new();
        while let Some(row) = rows.next()? {
            let blob: Vec<u8> = row.get(0)?;
            if value_before_key(&blob, "playlistUUID").as_deref() == Some(playlist_key) {
                if let Some(id) = value_before_key(&blob, "mediaItemUUID").filter(|i| !i.is_empty()) {
                    ids.push(id);
                }
            }
        }
        Ok(ids)
    }

    fn analyzed_blob(&self, title_id: &str) -> Result<Option<Vec<u8>>> {
        Ok(self
            .conn
            .query_row(
                "SELECT data FROM database2 WHERE collection = 'mediaItemAnalyzedData' AND key = ?1",
                params![title_id],
                |row| row.get(0),
            )
            .optional()?)
    }

    /// BPM, key index, duration and where BPM/key came from.
    /// The secondary index wins; the analyzed-data blob is the fallback.
    pub fn analysis(&self, title_id: &str) -> Result<(AnalyzedData, AnalysisSource)> {
        let blob = self.analyzed_blob(title_id)?;
        let parsed = blob.as_deref().map(parse_analyzed_data).unwrap_or_default();

        if self.has_secondary_index {
            let row: Option<(Option<f64>, Option<f64>)> = self
                .conn
                .query_row(
                    "SELECT bpm, musicalKeySignatureIndex FROM secondaryIndex_mediaItemIndex
                     WHERE titleID = ?1",
                    params![title_id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            if let Some((bpm, key_idx)) = row {
                if bpm.is_some() || key_idx.is_some() {
                    let data = AnalyzedData {
                        bpm,
                        key_index: key_idx.map(|k| k as i64),
                        duration_sec: parsed.duration_sec,
                    };
                    return Ok((data, AnalysisSource::SecondaryIndex));
                }
            }
        }

        if parsed.bpm.is_none() && parsed.key_index.is_none() {
            return Ok((parsed, AnalysisSource::None));
        }
        Ok((parsed, AnalysisSource::AnalyzedData))
    }

    /// (title, artist, album name) from the mediaItems collection
    pub fn metadata(
        &self,
        title_id: &str,
    ) -> Result<Option<(Option<String>, Option<String>, Option<String>)>> {
        let blob: Option<Vec<u8>> = self
            .conn
            .query_row(
                "SELECT data FROM database2 WHERE collection = 'mediaItems' AND key = ?1",
                params![title_id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(blob) = blob else {
            return Ok(None);
        };

        let title = value_before_key(&blob, "title");
        let artist = value_before_key(&blob, "artist");

        let mut album_name = None;
        if let Some(album_id) = value_before_key(&blob, "album") {
            let album_blob: Option<Vec<u8>> = self
                .conn
                .query_row(
                    "SELECT data FROM database2 WHERE collection = 'mediaAlbums' AND key = ?1",
                    params![album_id],
                    |row| row.get(0),
                )
                .optional()?;
            album_name = album_blob.and_then(|b| value_before_key(&b, "name"));
        }

        Ok(Some((title, artist, album_name)))
    }

    fn load_track(&self, title_id: &str) -> Result<Option<SourceTrack>> {
        let Some((title, artist, album)) = self.metadata(title_id)? else {
            debug!("{}: no mediaItems row, skipping", title_id);
            return Ok(None);
        };
        let (Some(title), Some(artist)) = (
            title.filter(|t| !t.trim().is_empty()),
            artist.filter(|a| !a.trim().is_empty()),
        ) else {
            debug!("{}: missing title or artist, skipping", title_id);
            return Ok(None);
        };

        let (data, analysis_source) = self.analysis(title_id)?;
        Ok(Some(SourceTrack {
            id: title_id.to_string(),
            title,
            artist,
            album,
            duration_sec: data.duration_sec,
            bpm: data.bpm,
            key: data
                .key_index
                .and_then(key_comment)
                .map(str::to_string),
            analysis_source,
        }))
    }
}

impl SourceReader for DjayLibrary {
    fn list_playlists(&self) -> Result<Vec<String>> {
        Ok(self.playlists()?.into_iter().map(|(_, name)| name).collect())
    }

    fn load_playlist_tracks(&self, playlist_name: &str) -> Result<Vec<SourceTrack>> {
        let key = self
            .playlist_key_by_name(playlist_name)?
            .ok_or_else(|| SyncError::PlaylistNotFound(playlist_name.to_string()))?;

        let ids = self.track_ids_in_playlist(&key)?;
        let mut tracks = Vec::with_capacity(ids.len());
        for id in &ids {
            if let Some(track) = self.load_track(id)? {
                tracks.push(track);
            }
        }
        info!(
            "Playlist '{}': {} entries, {} with title and artist",
            playlist_name,
            ids.len(),
            tracks.len()
        );
        Ok(tracks)
    }
}

// ============================================================================
// Test Fixtures
// ============================================================================


// ============================================================================
// TESTS
// ============================================================================
