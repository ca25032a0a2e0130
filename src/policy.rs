//! Per-field update decisions for a matched pair.

use crate::models::{Field, FieldValue, OverwriteMode, SkipReason, SourceTrack, TargetTrack, UpdateDecision};

/// Usable BPM from the source; rejects missing, non-finite and non-positive values
fn source_bpm(source: &SourceTrack) -> Option<f64> {
    source.bpm.filter(|b| b.is_finite() && *b > 0.0)
}

fn source_key(source: &SourceTrack) -> Option<&str> {
    source.key.as_deref().filter(|k| !k.trim().is_empty())
}

/// The library treats a BPM of 0 as unset
fn target_has_bpm(target: &TargetTrack) -> bool {
    target.bpm.is_some_and(|b| b > 0.0)
}

fn target_has_comment(target: &TargetTrack) -> bool {
    target.comment.as_deref().is_some_and(|c| !c.trim().is_empty())
}

/// Decide one field.
pub fn decide_field(
    field: Field,
    target: &TargetTrack,
    source: &SourceTrack,
    mode: OverwriteMode,
) -> UpdateDecision {
    let (value, target_filled) = match field {
        Field::Bpm => (source_bpm(source).map(FieldValue::Bpm), target_has_bpm(target)),
        Field::Key => (
            source_key(source).map(|k| FieldValue::Key(k.to_string())),
            target_has_comment(target),
        ),
    };

    let Some(value) = value else {
        return UpdateDecision::Skip {
            field,
            reason: SkipReason::SourceEmpty,
        };
    };

    if mode == OverwriteMode::PreserveExisting && target_filled {
        return UpdateDecision::Skip {
            field,
            reason: SkipReason::PreservingExisting,
        };
    }

    UpdateDecision::Apply { field, value }
}

/// One decision per field (BPM, then key), each decided independently.
pub fn decide(target: &TargetTrack, source: &SourceTrack, mode: OverwriteMode) -> Vec<UpdateDecision> {
    Field::ALL
        .iter()
        .map(|&field| decide_field(field, target, source, mode))
        .collect()
}
