//! Record normalization for djay ↔ library matching.
//!
//! Both catalogs are normalized with the same functions, so any change here
//! shifts what the matcher considers equal. Run the tests after changes.

use any_ascii::any_ascii;
use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

// ============================================================================
// REGEX PATTERNS
// ============================================================================

/// Title cleanup patterns (applied in order).
pub static TITLE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        // Remaster variants: "- Remastered 2021", "(2021 Remaster)", "/ 1997 Remastered"
        Regex::new(r"(?i)\s*[-–—/]\s*(?:remaster(?:ed)?(?:\s+\d{4})?|(?:\d{4}\s+)?(?:digital\s+)?remaster(?:ed)?)\s*$").unwrap(),
        Regex::new(r"(?i)\s*[\(\[](?:remaster(?:ed)?(?:\s+\d{4})?|(?:\d{4}\s+)?(?:digital\s+)?remaster(?:ed)?(?:\s+version)?)[\)\]]").unwrap(),
        // Live/acoustic: "(Live at Wembley)", "- Acoustic Version"
        Regex::new(r"(?i)\s*[\(\[](?:live(?:\s+(?:at|from|in)\s+[^)\]]+)?|acoustic(?:\s+version)?|unplugged)[\)\]]").unwrap(),
        Regex::new(r"(?i)\s*[-–—]\s*(?:live(?:\s+(?:at|from|in)\s+.+)?|acoustic(?:\s+version)?)\s*$").unwrap(),
        // Mix/version variants: "(Radio Edit)", "[Album Version]", "(Mono)", "(Original Mix)"
        Regex::new(r"(?i)\s*[\(\[](?:radio\s+edit|single\s+version|album\s+version|extended(?:\s+(?:mix|version))?|original\s+mix|mono|stereo)[\)\]]").unwrap(),
        // Same, dash form: "- Radio Edit", "- Single Version", "- Extended Mix"
        Regex::new(r"(?i)\s*[-–—]\s*(?:radio\s+edit|(?:single|lp|album)\s+version|extended(?:\s+(?:mix|version))?|original\s+mix|mono|stereo)\s*$").unwrap(),
        // Content variants: "(Explicit)", "[Clean]"
        Regex::new(r"(?i)\s*[\(\[](?:explicit|clean|censored)[\)\]]").unwrap(),
        // Year suffix: "- 2021", "- 1997 Version"
        Regex::new(r"(?i)\s*[-–—]\s*\d{4}(?:\s+(?:version|mix|edit))?$").unwrap(),
        // Featured artists: "(feat. Artist)", "[ft. Someone]"
        Regex::new(r"(?i)\s*[\(\[](?:feat\.?|ft\.?|featuring)\s+[^)\]]+[\)\]]").unwrap(),
        // Feat without brackets: "Song feat. Artist"
        Regex::new(r"(?i)\s+(?:feat\.?|ft\.?|featuring)\s+.+$").unwrap(),
        // Disc/CD markers: "(Disc 1)", "[CD 2]"
        Regex::new(r"(?i)\s*[\(\[](?:disc|cd)\s*\d+[\)\]]").unwrap(),
        // Bonus track markers: "(Bonus Track)", "[Bonus]"
        Regex::new(r"(?i)\s*[\(\[](?:bonus(?:\s+track)?|hidden\s+track)[\)\]]").unwrap(),
    ]
});

/// Matches track number prefixes like "03 - ", "Track 5 - ", "01. ", etc.
pub static TRACK_NUMBER_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(?:track\s*)?\d{1,3}\s*[-–—.]\s+").unwrap());

/// Matches bracket suffixes like [Mono], [RM1], [take 2], [Live], etc.
pub static BRACKET_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*\[[^\]]+\]\s*$").unwrap());

/// Matches file extensions in titles
pub static FILE_EXTENSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\.(flac|mp3|wav|m4a|aiff?|ogg|aac)$").unwrap());

/// Matches year suffix like (1964), (2009), etc.
pub static YEAR_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*\(\d{4}\)\s*$").unwrap());

/// Artist cleanup patterns
pub static ARTIST_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"(?i)\s*[\(\[](?:feat\.?|ft\.?|featuring)[^\)\]]*[\)\]]").unwrap(),
        Regex::new(r"(?i)\s+(?:feat\.?|ft\.?|featuring|with)\s+.*").unwrap(),
    ]
});

/// Anything that is not a letter, digit or whitespace after ASCII folding
pub static NON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9\s]+").unwrap());

/// Regex to collapse multiple whitespace into single space
pub static MULTI_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s{2,}").unwrap());

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

/// Check if a character is a Unicode combining mark (diacritical mark).
pub fn is_combining_mark(c: char) -> bool {
    matches!(c as u32, 0x0300..=0x036F | 0x1AB0..=0x1AFF | 0x1DC0..=0x1DFF | 0x20D0..=0x20FF | 0xFE20..=0xFE2F)
}

/// Fold Unicode text to lower-case ASCII by applying NFKD decomposition and
/// removing combining marks.
/// e.g., "Beyoncé" → "beyonce", "naïve" → "naive"
pub fn fold_to_ascii(s: &str) -> String {
    let stripped: String = s.nfkd().filter(|c| !is_combining_mark(*c)).collect();
    // Then transliterate any remaining non-ASCII (Cyrillic, Hebrew, CJK, etc.)
    any_ascii(&stripped).to_lowercase()
}

/// Normalize punctuation: curly quotes to straight quotes and & to and.
pub fn normalize_punctuation(s: &str) -> String {
    let result = s
        .replace(['\u{2018}', '\u{2019}'], "'")
        .replace(['\u{201C}', '\u{201D}'], "\"")
        .replace(['\u{00B4}', '\u{0060}'], "'")
        .replace(" & ", " and ");
    MULTI_SPACE.replace_all(&result, " ").to_string()
}

/// Drop apostrophes, turn other punctuation into spaces, collapse whitespace.
/// Expects already-folded lower-case ASCII.
pub fn strip_punctuation(s: &str) -> String {
    let without_apostrophes = s.replace('\'', "");
    let spaced = NON_WORD.replace_all(&without_apostrophes, " ");
    MULTI_SPACE.replace_all(spaced.trim(), " ").to_string()
}

// ============================================================================
// NORMALIZATION FUNCTIONS
// ============================================================================

/// Normalize a title for matching.
/// Strips track numbers, version suffixes, file extensions, punctuation.
pub fn normalize_title(title: Option<&str>) -> String {
    let Some(title) = title else {
        return String::new();
    };
    let mut result = normalize_punctuation(title.trim());

    result = FILE_EXTENSION.replace(&result, "").to_string();
    result = TRACK_NUMBER_PREFIX.replace(&result, "").to_string();

    // Patterns first so "Song [Live] (2021 Remaster)" loses both tags
    for pattern in TITLE_PATTERNS.iter() {
        result = pattern.replace_all(&result, "").to_string();
    }
    result = BRACKET_SUFFIX.replace(&result, "").to_string();
    result = YEAR_SUFFIX.replace(&result, "").to_string();

    let normalized = strip_punctuation(&fold_to_ascii(&result));

    // A title that was nothing but a tag ("(Live)") keeps its folded text
    if normalized.is_empty() {
        return strip_punctuation(&fold_to_ascii(title));
    }
    normalized
}

/// Normalize an artist name for matching.
/// Strips featured artists and handles a "The" prefix/suffix.
pub fn normalize_artist(artist: Option<&str>) -> String {
    let Some(artist) = artist else {
        return String::new();
    };
    let mut result = normalize_punctuation(artist.trim());
    for pattern in ARTIST_PATTERNS.iter() {
        result = pattern.replace_all(&result, "").to_string();
    }

    let mut normalized = fold_to_ascii(&result).trim().to_string();

    // Strip ", the" suffix (e.g., "Scorpions, The" → "scorpions")
    if let Some(stripped) = normalized.strip_suffix(", the") {
        normalized = stripped.to_string();
    }

    let mut normalized = strip_punctuation(&normalized);

    // Strip "the " prefix (e.g., "The Beatles" → "beatles")
    if normalized.starts_with("the ") && normalized.len() > 4 {
        normalized = normalized[4..].to_string();
    }

    normalized
}

/// Normalized (title, artist) pair used as the comparison key
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct NormalizedKey {
    pub title: String,
    pub artist: String,
}

/// Build the comparison key for a raw title/artist pair.
pub fn comparison_key(title: Option<&str>, artist: Option<&str>) -> NormalizedKey {
    NormalizedKey {
        title: normalize_title(title),
        artist: normalize_artist(artist),
    }
}

/// Whitespace tokens of an already-normalized string
pub fn tokens(normalized: &str) -> impl Iterator<Item = &str> {
    normalized.split_whitespace()
}

// ============================================================================
// TESTS
// ============================================================================
