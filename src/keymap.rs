//! djay key signature index → Camelot comment string.
//!
//! The table was verified against djay's own key display. Index order is
//! djay's, not the Camelot wheel's.

pub const KEY_MAP: [&str; 24] = [
    "8B - C - 1d",
    "8A - A - 1m",
    "3B - C# - 8d",
    "3A - A# - 8m",
    "10B - D - 3d",
    "10A - B - 3m",
    "5B - Eb / D# - 10d",
    "5A - C - 10m",
    "12B - E - 5d",
    "12A - Dbm - 5m",
    "7B - F - 12d",
    "7A - D - 12m",
    "2B - F# / Gb - 7d",
    "2A - Ebm - 7m",
    "9B - G - 2d",
    "9A - E - 2m",
    "4B - Ab / G# - 9d",
    "4A - F - 9m",
    "11B - A - 4d",
    "11A - F# / Gb - 4m",
    "6B - Bb / A# - 11d",
    "6A - G - 11m",
    "1B - B - 6d",
    "1A - Abm - 6m",
];

/// Highest valid djay key index
pub const MAX_KEY_INDEX: i64 = 23;

/// Comment string for a djay key index; None outside 0..=23.
pub fn key_comment(index: i64) -> Option<&'static str> {
    usize::try_from(index).ok().and_then(|i| KEY_MAP.get(i)).copied()
}

/// Leading Camelot code of a comment string ("8A - A - 1m" → "8A").
pub fn camelot_code(comment: &str) -> &str {
    comment.split(" - ").next().unwrap_or(comment).trim()
}
