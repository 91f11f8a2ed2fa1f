use arbitrary::Arbitrary;
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use tidemark_primitives::Buf32;

/// A link waiting to be sealed, produced upstream by the resource-change
/// pipeline.
///
/// `time` is a monotonically-comparable timestamp used only for span
/// bookkeeping; it carries no ordering guarantee between micro-batches.
#[derive(
    Clone, Debug, PartialEq, Eq, Arbitrary, BorshDeserialize, BorshSerialize, Deserialize, Serialize,
)]
pub struct PendingItem {
    link: String,
    time: u64,
}

impl PendingItem {
    pub fn new(link: impl Into<String>, time: u64) -> Self {
        Self {
            link: link.into(),
            time,
        }
    }

    pub fn link(&self) -> &str {
        &self.link
    }

    pub fn time(&self) -> u64 {
        self.time
    }
}

/// An immutable, numbered group of links recorded as they arrived, tagged
/// with the scheduling round that was current at creation.
///
/// This is the record persisted to blob storage (as gzipped JSON), so its
/// wire field names are fixed.
#[derive(
    Clone, Debug, PartialEq, Eq, Arbitrary, BorshDeserialize, BorshSerialize, Deserialize, Serialize,
)]
#[serde(rename_all = "camelCase")]
pub struct MicroBatch {
    number: u64,
    round: u64,
    links: Vec<String>,
    from_timestamp: u64,
    to_timestamp: u64,
    fingerprint: Buf32,
}

impl MicroBatch {
    pub fn new(
        number: u64,
        round: u64,
        links: Vec<String>,
        from_timestamp: u64,
        to_timestamp: u64,
        fingerprint: Buf32,
    ) -> Self {
        Self {
            number,
            round,
            links,
            from_timestamp,
            to_timestamp,
            fingerprint,
        }
    }

    pub fn number(&self) -> u64 {
        self.number
    }

    /// Value of the round counter at the moment this micro-batch was created.
    pub fn round(&self) -> u64 {
        self.round
    }

    pub fn links(&self) -> &[String] {
        &self.links
    }

    pub fn from_timestamp(&self) -> u64 {
        self.from_timestamp
    }

    pub fn to_timestamp(&self) -> u64 {
        self.to_timestamp
    }

    pub fn fingerprint(&self) -> &Buf32 {
        &self.fingerprint
    }

    /// Link at the earliest timestamp.
    pub fn from_link(&self) -> &str {
        &self.links[0]
    }

    /// Link at the latest timestamp.
    pub fn to_link(&self) -> &str {
        &self.links[self.links.len() - 1]
    }
}

/// Index entry the control record keeps for an unconsumed micro-batch.
///
/// Carries everything the compactor needs so finalization never has to read
/// blobs back.
#[derive(
    Clone, Debug, PartialEq, Eq, Arbitrary, BorshDeserialize, BorshSerialize, Deserialize, Serialize,
)]
pub struct MicroBatchHandle {
    number: u64,
    round: u64,
    from_timestamp: u64,
    to_timestamp: u64,
    from_link: String,
    to_link: String,
    key: String,
}

impl MicroBatchHandle {
    pub fn new(batch: &MicroBatch, key: impl Into<String>) -> Self {
        Self {
            number: batch.number(),
            round: batch.round(),
            from_timestamp: batch.from_timestamp(),
            to_timestamp: batch.to_timestamp(),
            from_link: batch.from_link().to_owned(),
            to_link: batch.to_link().to_owned(),
            key: key.into(),
        }
    }

    pub fn number(&self) -> u64 {
        self.number
    }

    pub fn round(&self) -> u64 {
        self.round
    }

    pub fn from_timestamp(&self) -> u64 {
        self.from_timestamp
    }

    pub fn to_timestamp(&self) -> u64 {
        self.to_timestamp
    }

    pub fn from_link(&self) -> &str {
        &self.from_link
    }

    pub fn to_link(&self) -> &str {
        &self.to_link
    }

    /// Blob storage key of the persisted micro-batch record.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Whether this micro-batch has waited out the safety window by the given
    /// round: a batch created in round `C` is eligible at round `R` iff
    /// `R >= C + safety_buffer`.
    pub fn is_eligible(&self, round_number: u64, safety_buffer: u64) -> bool {
        round_number >= self.round.saturating_add(safety_buffer)
    }
}

/// Merged result of all micro-batches consumed in one round, the unit handed
/// to external ledger anchoring.
#[derive(
    Clone, Debug, PartialEq, Eq, Arbitrary, BorshDeserialize, BorshSerialize, Deserialize, Serialize,
)]
#[serde(rename_all = "camelCase")]
pub struct FinalizedBatch {
    batch_number: u64,
    from_link: String,
    from_timestamp: u64,
    to_link: String,
    to_timestamp: u64,
}

impl FinalizedBatch {
    pub fn new(
        batch_number: u64,
        from_link: impl Into<String>,
        from_timestamp: u64,
        to_link: impl Into<String>,
        to_timestamp: u64,
    ) -> Self {
        Self {
            batch_number,
            from_link: from_link.into(),
            from_timestamp,
            to_link: to_link.into(),
            to_timestamp,
        }
    }

    pub fn batch_number(&self) -> u64 {
        self.batch_number
    }

    pub fn from_link(&self) -> &str {
        &self.from_link
    }

    pub fn from_timestamp(&self) -> u64 {
        self.from_timestamp
    }

    pub fn to_link(&self) -> &str {
        &self.to_link
    }

    pub fn to_timestamp(&self) -> u64 {
        self.to_timestamp
    }
}

/// Output of one scheduling round.
///
/// Every invocation of the scheduler produces exactly one of these,
/// regardless of whether anything was finalized, so round numbers stay
/// gap-free.
#[derive(
    Clone, Debug, PartialEq, Eq, Arbitrary, BorshDeserialize, BorshSerialize, Deserialize, Serialize,
)]
pub enum RoundOutcome {
    /// Checked, nothing was ready: the round number was still consumed.
    Placeholder { batch_number: u64 },
    /// All eligible micro-batches were merged into one finalized batch.
    Finalized(FinalizedBatch),
}

impl RoundOutcome {
    pub fn batch_number(&self) -> u64 {
        match self {
            Self::Placeholder { batch_number } => *batch_number,
            Self::Finalized(batch) => batch.batch_number(),
        }
    }

    pub fn as_finalized(&self) -> Option<&FinalizedBatch> {
        match self {
            Self::Placeholder { .. } => None,
            Self::Finalized(batch) => Some(batch),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_batch() -> MicroBatch {
        MicroBatch::new(
            3,
            1,
            vec!["1234".to_owned(), "abcd".to_owned()],
            123,
            456,
            Buf32::zero(),
        )
    }

    #[test]
    fn test_micro_batch_endpoints() {
        let mb = sample_batch();
        assert_eq!(mb.from_link(), "1234");
        assert_eq!(mb.to_link(), "abcd");
    }

    #[test]
    fn test_micro_batch_wire_field_names() {
        let json = serde_json::to_value(sample_batch()).unwrap();
        assert!(json.get("fromTimestamp").is_some());
        assert!(json.get("toTimestamp").is_some());
        assert!(json.get("fingerprint").is_some());
    }

    #[test]
    fn test_handle_eligibility_window() {
        let mb = sample_batch();
        let handle = MicroBatchHandle::new(&mb, "k");
        // Created in round 1 with buffer 2: eligible from round 3 on.
        assert!(!handle.is_eligible(1, 2));
        assert!(!handle.is_eligible(2, 2));
        assert!(handle.is_eligible(3, 2));
        assert!(handle.is_eligible(7, 2));
    }

    #[test]
    fn test_outcome_batch_number() {
        let placeholder = RoundOutcome::Placeholder { batch_number: 4 };
        assert_eq!(placeholder.batch_number(), 4);
        assert!(placeholder.as_finalized().is_none());

        let fin = RoundOutcome::Finalized(FinalizedBatch::new(5, "a", 1, "b", 2));
        assert_eq!(fin.batch_number(), 5);
        assert!(fin.as_finalized().is_some());
    }
}
