//! Span merge for finalization: folds all eligible micro-batches into one
//! finalized batch covering their collective timestamp range.

use tidemark_batch_types::{FinalizedBatch, MicroBatchHandle};

/// Merges the spans of the given micro-batches into one finalized batch.
///
/// The result runs from the minimum `from_timestamp` (and that batch's
/// `from_link`) to the maximum `to_timestamp` (and that batch's `to_link`).
/// Ties go to the earliest-numbered batch on the low end and the
/// latest-numbered on the high end. Returns `None` for an empty set; the
/// scheduler emits a placeholder in that case instead.
pub(crate) fn merge_span(
    batch_number: u64,
    handles: &[MicroBatchHandle],
) -> Option<FinalizedBatch> {
    let earliest = handles.iter().min_by_key(|h| h.from_timestamp())?;
    let latest = handles.iter().max_by_key(|h| h.to_timestamp())?;

    Some(FinalizedBatch::new(
        batch_number,
        earliest.from_link(),
        earliest.from_timestamp(),
        latest.to_link(),
        latest.to_timestamp(),
    ))
}
