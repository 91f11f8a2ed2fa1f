use arbitrary::Arbitrary;
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::batch::{MicroBatchHandle, RoundOutcome};

/// The single durable record of engine progress.
///
/// Both monotonic counters, the pending index, and the last round's output
/// live here so that every state transition is one conditional write against
/// one versioned record. Absence of the record is the cold-start state.
#[derive(
    Clone,
    Debug,
    PartialEq,
    Eq,
    Default,
    Arbitrary,
    BorshDeserialize,
    BorshSerialize,
    Deserialize,
    Serialize,
)]
pub struct ControlRecord {
    next_micro_batch: u64,
    next_round: u64,
    pending: Vec<MicroBatchHandle>,
    consumed_through: Option<u64>,
    last_outcome: Option<RoundOutcome>,
}

impl ControlRecord {
    /// Number the next created micro-batch will take.
    pub fn next_micro_batch(&self) -> u64 {
        self.next_micro_batch
    }

    /// Number the next scheduling round will take.
    pub fn next_round(&self) -> u64 {
        self.next_round
    }

    /// Batch number of the last completed round, `-1` if none has run.
    pub fn last_batch_number(&self) -> i64 {
        self.next_round as i64 - 1
    }

    /// Unconsumed micro-batches, ascending by number.
    pub fn pending(&self) -> &[MicroBatchHandle] {
        &self.pending
    }

    /// Highest micro-batch number folded into a finalized batch so far.
    pub fn consumed_through(&self) -> Option<u64> {
        self.consumed_through
    }

    pub fn last_outcome(&self) -> Option<&RoundOutcome> {
        self.last_outcome.as_ref()
    }

    /// Registers a freshly created micro-batch, advancing the number counter.
    ///
    /// The handle must carry the number the counter was about to assign.
    pub fn record_created(&mut self, handle: MicroBatchHandle) {
        debug_assert_eq!(handle.number(), self.next_micro_batch);
        self.next_micro_batch += 1;
        self.pending.push(handle);
    }

    /// Splits the pending set by eligibility at the given round.
    pub fn partition_pending(&self, round_number: u64, safety_buffer: u64) -> PendingPartition {
        let (eligible, waiting) = self
            .pending
            .iter()
            .cloned()
            .partition(|h| h.is_eligible(round_number, safety_buffer));
        PendingPartition { eligible, waiting }
    }

    /// Removes the given micro-batch numbers from the pending set and records
    /// the highest of them as consumed.
    pub fn consume(&mut self, numbers: &[u64]) {
        self.pending.retain(|h| !numbers.contains(&h.number()));
        let highest = numbers.iter().max().copied();
        self.consumed_through = self.consumed_through.max(highest);
    }

    /// Records one round's output and advances the round counter.
    pub fn seal_round(&mut self, outcome: RoundOutcome) {
        debug_assert_eq!(outcome.batch_number(), self.next_round);
        self.last_outcome = Some(outcome);
        self.next_round += 1;
    }
}

/// The pending set split by round eligibility, for finalization and for
/// observability accessors.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct PendingPartition {
    pub eligible: Vec<MicroBatchHandle>,
    pub waiting: Vec<MicroBatchHandle>,
}
