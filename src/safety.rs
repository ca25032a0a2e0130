//! Guards for report output paths.
//!
//! Reports are written with create-or-truncate, so a mistyped path must never
//! land on the djay database or its sidecar files.

use anyhow::{bail, Result};
use std::path::Path;

/// File names that belong to djay's database directory
const PROTECTED_NAMES: [&str; 3] = ["MediaLibrary.db", "MediaLibrary.db-wal", "MediaLibrary.db-shm"];

/// Check that a report path is safe to create or overwrite.
///
/// - must have a `.csv` extension
/// - must not be the source database
/// - must not be named like a djay database file
pub fn validate_report_path(output: &Path, source_db: &Path) -> Result<()> {
    let output_name = output.file_name().and_then(|n| n.to_str()).unwrap_or("");

    let is_csv = output
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("csv"));
    if !is_csv {
        bail!(
            "Safety check failed: report file '{}' must have a .csv extension",
            output.display()
        );
    }

    if output == source_db {
        bail!(
            "Safety check failed: report '{}' cannot be the source database",
            output.display()
        );
    }

    if PROTECTED_NAMES.iter().any(|p| output_name.starts_with(p)) {
        bail!(
            "Safety check failed: report '{}' looks like a djay database file",
            output.display()
        );
    }

    Ok(())
}
