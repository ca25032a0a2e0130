//! Music library collaborators: the snapshot reader, the field writer and a
//! JSON-file library used for offline runs and exported snapshots.

use log::{debug, info};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Result, SyncError, WriteError};
use crate::models::{FieldUpdate, TargetId, TargetTrack};

/// Reads the whole library once per run.
pub trait LibraryCatalog {
    fn load_library_tracks(&mut self) -> Result<Vec<TargetTrack>>;
}

/// Writes BPM and/or key comment to a single library track.
pub trait LibraryWriter {
    fn write_fields(&mut self, target_id: &str, update: &FieldUpdate)
        -> std::result::Result<(), WriteError>;
}

/// A library that can be both snapshotted and written to.
pub trait TargetLibrary: LibraryCatalog + LibraryWriter {}

impl<T: LibraryCatalog + LibraryWriter> TargetLibrary for T {}

// ============================================================================
// JSON Snapshot Library
// ============================================================================

/// Library stored as a JSON array of tracks. Writes are persisted to the
/// file immediately.
#[derive(Debug)]
pub struct JsonLibrary {
    path: PathBuf,
    tracks: Vec<TargetTrack>,
}

impl JsonLibrary {
    pub fn open(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            SyncError::Library(format!("cannot read {}: {}", path.display(), e))
        })?;
        let tracks: Vec<TargetTrack> = serde_json::from_str(&text)?;
        info!("Loaded {} tracks from {}", tracks.len(), path.display());
        Ok(Self {
            path: path.to_path_buf(),
            tracks,
        })
    }

    pub fn tracks(&self) -> &[TargetTrack] {
        &self.tracks
    }

    fn save(&self) -> Result<()> {
        save_snapshot(&self.tracks, &self.path)
    }
}

/// Write tracks as a pretty-printed JSON array.
pub fn save_snapshot(tracks: &[TargetTrack], path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(tracks)?;
    fs::write(path, json)?;
    Ok(())
}

impl LibraryCatalog for JsonLibrary {
    fn load_library_tracks(&mut self) -> Result<Vec<TargetTrack>> {
        Ok(self.tracks.clone())
    }
}

impl LibraryWriter for JsonLibrary {
    fn write_fields(
        &mut self,
        target_id: &str,
        update: &FieldUpdate,
    ) -> std::result::Result<(), WriteError> {
        let track = self
            .tracks
            .iter_mut()
            .find(|t| t.id == target_id)
            .ok_or_else(|| WriteError::NotFound(TargetId::from(target_id)))?;

        if let Some(bpm) = update.bpm {
            track.bpm = Some(bpm);
        }
        if let Some(comment) = &update.key_comment {
            track.comment = Some(comment.clone());
        }
        debug!("{}: bpm={:?} comment={:?}", target_id, update.bpm, update.key_comment);

        self.save()
            .map_err(|e| WriteError::Unavailable(e.to_string()))
    }
}
