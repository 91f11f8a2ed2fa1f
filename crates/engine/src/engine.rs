//! The batching engine: micro-batch ledger, finalization scheduler, and
//! read accessors, all driven off the single versioned control record.

use std::{fmt, sync::Arc};

use tidemark_batch_types::{
    ControlRecord, MicroBatch, MicroBatchHandle, PendingItem, PendingPartition, RoundOutcome,
};
use tidemark_db_types::{BlobStore, ControlStore, DbError, Version};
use tidemark_primitives::merkle;
use tracing::{debug, info};

use crate::{
    codec, compactor,
    config::EngineConfig,
    errors::{EngineError, EngineResult},
    keys,
};

/// Result of recording one micro-batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreatedMicroBatch {
    pub batch: MicroBatch,
    pub number: u64,
    pub key: String,
}

/// The batching/compaction engine.
///
/// Stateless between calls: every operation is a read-compute-conditional-write
/// cycle against the control store, so the engine can be dropped and rebuilt
/// at any time, and multiple producers (or even schedulers) can race safely —
/// the loser of a conditional write re-reads and recomputes.
///
/// Generic over the storage ports to support different backends and testing
/// with in-memory stubs.
pub struct BatchEngine<B, C> {
    blobs: Arc<B>,
    control: Arc<C>,
    config: EngineConfig,
}

impl<B, C> fmt::Debug for BatchEngine<B, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<B: BlobStore, C: ControlStore> BatchEngine<B, C> {
    /// Constructs the engine. The config is already validated at its own
    /// construction, so this cannot fail and touches no storage.
    pub fn new(blobs: Arc<B>, control: Arc<C>, config: EngineConfig) -> Self {
        Self {
            blobs,
            control,
            config,
        }
    }

    /// Records a group of pending items as the next numbered micro-batch and
    /// persists its record to blob storage.
    ///
    /// `items` must be non-empty and ordered ascending by time. The assigned
    /// number and the creation-round tag both come from the control record,
    /// reserved with a conditional write so concurrent producers can never
    /// take the same number.
    pub fn create_micro_batch(&self, items: &[PendingItem]) -> EngineResult<CreatedMicroBatch> {
        if items.is_empty() {
            return Err(EngineError::EmptyItems);
        }
        if items.windows(2).any(|w| w[0].time() > w[1].time()) {
            return Err(EngineError::UnsortedItems);
        }

        let links: Vec<String> = items.iter().map(|it| it.link().to_owned()).collect();
        let from_timestamp = items[0].time();
        let to_timestamp = items[items.len() - 1].time();
        let fingerprint = merkle::commit_links(&links);

        let mut attempt = 0;
        let (batch, key) = loop {
            let (version, mut record) = self.read_control()?;

            let number = record.next_micro_batch();
            let round = record.next_round();
            let batch = MicroBatch::new(
                number,
                round,
                links.clone(),
                from_timestamp,
                to_timestamp,
                fingerprint,
            );
            let key = keys::micro_batch_key(number, from_timestamp, &fingerprint);

            // Blob first, handle second: a failed put surfaces before anything
            // is enqueued, and a lost conditional write below leaves only an
            // orphan blob under a never-referenced key. Re-puts under the same
            // content-addressed key on retry are idempotent.
            let raw = codec::encode_micro_batch(&batch)?;
            self.blobs.put(&key, &raw, codec::JSON_CONTENT_TYPE)?;

            record.record_created(MicroBatchHandle::new(&batch, &key));

            match self.control.put_conditional(version, &record) {
                Ok(_) => break (batch, key),
                Err(DbError::VersionConflict) => self.note_conflict(&mut attempt)?,
                Err(e) => return Err(e.into()),
            }
        };

        debug!(
            number = batch.number(),
            round = batch.round(),
            links = batch.links().len(),
            %key,
            "recorded micro-batch"
        );

        Ok(CreatedMicroBatch {
            number: batch.number(),
            batch,
            key,
        })
    }

    /// Runs one scheduling round: merges every micro-batch that has waited
    /// out the safety window, or records a placeholder if none has.
    ///
    /// Safe to call repeatedly and periodically. Every invocation consumes
    /// exactly one round number, placeholder or not, so the audit trail of
    /// rounds stays gap-free.
    pub fn gen_next_batch(&self) -> EngineResult<RoundOutcome> {
        let mut attempt = 0;
        loop {
            let (version, mut record) = self.read_control()?;

            let round_number = record.next_round();
            let partition = record.partition_pending(round_number, self.config.safety_buffer());

            let outcome = match compactor::merge_span(round_number, &partition.eligible) {
                None => {
                    debug!(
                        round = round_number,
                        waiting = partition.waiting.len(),
                        "no eligible micro-batches, recording placeholder"
                    );
                    RoundOutcome::Placeholder {
                        batch_number: round_number,
                    }
                }
                Some(finalized) => {
                    let consumed: Vec<u64> =
                        partition.eligible.iter().map(|h| h.number()).collect();
                    record.consume(&consumed);
                    info!(
                        round = round_number,
                        merged = consumed.len(),
                        from_timestamp = finalized.from_timestamp(),
                        to_timestamp = finalized.to_timestamp(),
                        "finalized batch"
                    );
                    RoundOutcome::Finalized(finalized)
                }
            };
            record.seal_round(outcome.clone());

            match self.control.put_conditional(version, &record) {
                Ok(_) => return Ok(outcome),
                Err(DbError::VersionConflict) => self.note_conflict(&mut attempt)?,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Batch number of the last completed round, `-1` before any round ran.
    pub fn last_batch_number(&self) -> EngineResult<i64> {
        Ok(self.read_control()?.1.last_batch_number())
    }

    /// Round number the next scheduler invocation will take.
    pub fn next_batch_number(&self) -> EngineResult<u64> {
        Ok(self.read_control()?.1.next_round())
    }

    /// Output of the last round, if any round has run.
    pub fn last_batch(&self) -> EngineResult<Option<RoundOutcome>> {
        Ok(self.read_control()?.1.last_outcome().cloned())
    }

    /// The unconsumed micro-batch set, split by eligibility at the next
    /// round. For observability and tests, not production control flow.
    pub fn micro_batches_for_next_batch(&self) -> EngineResult<PendingPartition> {
        let record = self.read_control()?.1;
        Ok(record.partition_pending(record.next_round(), self.config.safety_buffer()))
    }

    /// Fetches and decodes a persisted micro-batch record by storage key.
    pub fn get_micro_batch(&self, key: &str) -> EngineResult<Option<MicroBatch>> {
        let Some(obj) = self.blobs.get(key)? else {
            return Ok(None);
        };
        Ok(Some(codec::decode_micro_batch(obj.data())?))
    }

    fn read_control(&self) -> EngineResult<(Option<Version>, ControlRecord)> {
        // An absent record is the cold-start state, not an error.
        Ok(match self.control.get()? {
            Some((version, record)) => (Some(version), record),
            None => (None, ControlRecord::default()),
        })
    }

    fn note_conflict(&self, attempt: &mut u32) -> EngineResult<()> {
        *attempt += 1;
        if *attempt > self.config.max_occ_retries() {
            return Err(DbError::VersionConflict.into());
        }
        debug!(attempt = *attempt, "lost control record race, retrying");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use proptest::prelude::*;
    use tidemark_db_types::stubs::{StubBlobStore, StubControlStore};

    use super::*;
    use crate::config::MIN_SAFETY_BUFFER;

    type StubEngine = BatchEngine<StubBlobStore, StubControlStore>;

    fn setup_engine(safety_buffer: u64) -> StubEngine {
        let blobs = Arc::new(StubBlobStore::new());
        let control = Arc::new(StubControlStore::new());
        let config = EngineConfig::new(safety_buffer).unwrap();
        BatchEngine::new(blobs, control, config)
    }

    fn items(pairs: &[(&str, u64)]) -> Vec<PendingItem> {
        pairs
            .iter()
            .map(|(link, time)| PendingItem::new(*link, *time))
            .collect()
    }

    #[test]
    fn test_empty_items_rejected() {
        let engine = setup_engine(MIN_SAFETY_BUFFER);
        let err = engine.create_micro_batch(&[]).unwrap_err();
        assert!(matches!(err, EngineError::EmptyItems));
        assert!(err.is_invalid_input());
    }

    #[test]
    fn test_unsorted_items_rejected() {
        let engine = setup_engine(MIN_SAFETY_BUFFER);
        let err = engine
            .create_micro_batch(&items(&[("a", 10), ("b", 5)]))
            .unwrap_err();
        assert!(matches!(err, EngineError::UnsortedItems));
        // Nothing was persisted.
        assert_eq!(engine.micro_batches_for_next_batch().unwrap().waiting, vec![]);
    }

    #[test]
    fn test_cold_start_accessors() {
        let engine = setup_engine(MIN_SAFETY_BUFFER);
        assert_eq!(engine.last_batch_number().unwrap(), -1);
        assert_eq!(engine.next_batch_number().unwrap(), 0);
        assert!(engine.last_batch().unwrap().is_none());
    }

    #[test]
    fn test_creation_is_deterministic_and_content_addressed() {
        let engine = setup_engine(MIN_SAFETY_BUFFER);
        let created = engine
            .create_micro_batch(&items(&[("1234", 123), ("abcd", 456)]))
            .unwrap();

        assert_eq!(created.number, 0);
        assert_eq!(created.batch.round(), 0);
        assert_eq!(created.batch.from_timestamp(), 123);
        assert_eq!(created.batch.to_timestamp(), 456);

        let expected_fp = merkle::commit_links(&["1234", "abcd"]);
        assert_eq!(*created.batch.fingerprint(), expected_fp);
        assert_eq!(
            created.key,
            format!("000000000000/123/{}.json", expected_fp.short_hex(6))
        );

        // The same input on a fresh deployment produces the same key.
        let other = setup_engine(MIN_SAFETY_BUFFER);
        let repeat = other
            .create_micro_batch(&items(&[("1234", 123), ("abcd", 456)]))
            .unwrap();
        assert_eq!(repeat.key, created.key);
        assert_eq!(repeat.batch, created.batch);

        // And the persisted blob decodes back to the record.
        let stored = engine.get_micro_batch(&created.key).unwrap().unwrap();
        assert_eq!(stored, created.batch);
    }

    #[test]
    fn test_interleaved_creation_delays_finalization_per_round() {
        let engine = setup_engine(2);

        let first = engine
            .create_micro_batch(&items(&[("aa", 100), ("bb", 200)]))
            .unwrap();
        assert_eq!(first.batch.round(), 0);

        let outcome = engine.gen_next_batch().unwrap();
        assert_eq!(outcome, RoundOutcome::Placeholder { batch_number: 0 });

        let second = engine.create_micro_batch(&items(&[("cc", 300)])).unwrap();
        assert_eq!(second.batch.round(), 1);

        let outcome = engine.gen_next_batch().unwrap();
        assert_eq!(outcome, RoundOutcome::Placeholder { batch_number: 1 });

        let third = engine.create_micro_batch(&items(&[("dd", 400)])).unwrap();
        assert_eq!(third.batch.round(), 2);

        // Only the round-0 micro-batch has waited out the buffer; the round
        // spans its endpoints alone.
        let outcome = engine.gen_next_batch().unwrap();
        let finalized = outcome.as_finalized().unwrap();
        assert_eq!(finalized.batch_number(), 2);
        assert_eq!(finalized.from_link(), "aa");
        assert_eq!(finalized.from_timestamp(), 100);
        assert_eq!(finalized.to_link(), "bb");
        assert_eq!(finalized.to_timestamp(), 200);

        // At the next round (3) the round-1 micro-batch has waited out the
        // buffer already; the round-2 one is still waiting.
        let partition = engine.micro_batches_for_next_batch().unwrap();
        assert_eq!(partition.eligible.len(), 1);
        assert_eq!(partition.eligible[0].number(), second.number);
        assert_eq!(partition.waiting.len(), 1);
        assert_eq!(partition.waiting[0].number(), third.number);
    }

    #[test]
    fn test_simultaneous_arrival_merges_together() {
        let engine = setup_engine(2);

        engine
            .create_micro_batch(&items(&[("m", 10), ("n", 20)]))
            .unwrap();
        engine
            .create_micro_batch(&items(&[("e", 5), ("f", 15)]))
            .unwrap();
        engine
            .create_micro_batch(&items(&[("x", 7), ("y", 30)]))
            .unwrap();

        assert_eq!(
            engine.gen_next_batch().unwrap(),
            RoundOutcome::Placeholder { batch_number: 0 }
        );
        assert_eq!(
            engine.gen_next_batch().unwrap(),
            RoundOutcome::Placeholder { batch_number: 1 }
        );

        // All three were stamped with round 0, so the third call merges all
        // of them into the globally-widest span.
        let outcome = engine.gen_next_batch().unwrap();
        let finalized = outcome.as_finalized().unwrap();
        assert_eq!(finalized.batch_number(), 2);
        assert_eq!(finalized.from_link(), "e");
        assert_eq!(finalized.from_timestamp(), 5);
        assert_eq!(finalized.to_link(), "y");
        assert_eq!(finalized.to_timestamp(), 30);

        assert_eq!(engine.last_batch_number().unwrap(), 2);
        assert_eq!(engine.next_batch_number().unwrap(), 3);
        assert!(engine.micro_batches_for_next_batch().unwrap().waiting.is_empty());
    }

    #[test]
    fn test_idempotent_reinvocation_after_drain() {
        let engine = setup_engine(2);
        engine.create_micro_batch(&items(&[("a", 1)])).unwrap();
        for _ in 0..3 {
            engine.gen_next_batch().unwrap();
        }

        // Consumed micro-batches are never reconsidered; further ticks just
        // append placeholders.
        let outcome = engine.gen_next_batch().unwrap();
        assert_eq!(outcome, RoundOutcome::Placeholder { batch_number: 3 });
        assert_eq!(engine.last_batch().unwrap(), Some(outcome));
        let partition = engine.micro_batches_for_next_batch().unwrap();
        assert!(partition.eligible.is_empty());
        assert!(partition.waiting.is_empty());
    }

    #[test]
    fn test_engine_is_resumable_across_instances() {
        let blobs = Arc::new(StubBlobStore::new());
        let control = Arc::new(StubControlStore::new());
        let config = EngineConfig::new(2).unwrap();

        let engine = BatchEngine::new(blobs.clone(), control.clone(), config);
        engine.create_micro_batch(&items(&[("a", 1), ("b", 2)])).unwrap();
        engine.gen_next_batch().unwrap();
        drop(engine);

        // A fresh instance over the same stores picks up exactly where the
        // old one stopped.
        let engine = BatchEngine::new(blobs, control, config);
        assert_eq!(engine.next_batch_number().unwrap(), 1);
        assert_eq!(
            engine.gen_next_batch().unwrap(),
            RoundOutcome::Placeholder { batch_number: 1 }
        );
        let outcome = engine.gen_next_batch().unwrap();
        assert_eq!(outcome.as_finalized().unwrap().from_link(), "a");
    }

    #[test]
    fn test_failed_blob_put_leaves_nothing_pending() {
        use std::sync::atomic::{AtomicBool, Ordering};

        // A blob store whose next put fails with a transient backend error.
        #[derive(Debug, Default)]
        struct FlakyBlobStore {
            inner: StubBlobStore,
            fail_next: AtomicBool,
        }

        impl BlobStore for FlakyBlobStore {
            fn put(
                &self,
                key: &str,
                data: &[u8],
                content_type: &str,
            ) -> tidemark_db_types::DbResult<()> {
                if self.fail_next.swap(false, Ordering::SeqCst) {
                    return Err(DbError::Backend("transient put failure".to_owned()));
                }
                self.inner.put(key, data, content_type)
            }

            fn get(&self, key: &str) -> tidemark_db_types::DbResult<Option<tidemark_db_types::BlobObject>> {
                self.inner.get(key)
            }
        }

        let blobs = Arc::new(FlakyBlobStore::default());
        blobs.fail_next.store(true, Ordering::SeqCst);
        let engine = BatchEngine::new(
            blobs,
            Arc::new(StubControlStore::new()),
            EngineConfig::new(2).unwrap(),
        );

        let err = engine
            .create_micro_batch(&items(&[("aaaa", 1), ("bbbb", 2)]))
            .unwrap_err();
        assert!(matches!(err, EngineError::Db(DbError::Backend(_))));

        // The failed call enqueued nothing, so no phantom handle can ever be
        // finalized.
        let partition = engine.micro_batches_for_next_batch().unwrap();
        assert!(partition.eligible.is_empty());
        assert!(partition.waiting.is_empty());

        // The caller's retry records the links exactly once, under the same
        // number the failed call would have taken.
        let created = engine
            .create_micro_batch(&items(&[("aaaa", 1), ("bbbb", 2)]))
            .unwrap();
        assert_eq!(created.number, 0);

        engine.gen_next_batch().unwrap();
        engine.gen_next_batch().unwrap();
        let outcome = engine.gen_next_batch().unwrap();
        let finalized = outcome.as_finalized().unwrap();
        assert_eq!(finalized.from_link(), "aaaa");
        assert_eq!(finalized.to_link(), "bbbb");

        // One finalization total, and the blob really exists under the
        // recorded key.
        assert!(engine.gen_next_batch().unwrap().as_finalized().is_none());
        assert!(engine.get_micro_batch(&created.key).unwrap().is_some());
    }

    #[test]
    fn test_exhausted_occ_retries_surface_conflict() {
        // A control store whose version moved underneath the engine between
        // read and write on every attempt.
        #[derive(Debug, Default)]
        struct ContendedControlStore(StubControlStore);

        impl ControlStore for ContendedControlStore {
            fn get(&self) -> tidemark_db_types::DbResult<Option<(Version, ControlRecord)>> {
                self.0.get()
            }

            fn put_conditional(
                &self,
                expected: Option<Version>,
                _record: &ControlRecord,
            ) -> tidemark_db_types::DbResult<Version> {
                // Another writer always gets there first.
                self.0.put_conditional(expected, &ControlRecord::default())?;
                Err(DbError::VersionConflict)
            }
        }

        let engine = BatchEngine::new(
            Arc::new(StubBlobStore::new()),
            Arc::new(ContendedControlStore::default()),
            EngineConfig::new(2).unwrap().with_max_occ_retries(2),
        );

        let err = engine.gen_next_batch().unwrap_err();
        assert!(matches!(err, EngineError::Db(DbError::VersionConflict)));
    }

    // Reference model for the round-trip law: the union of links across all
    // finalized batches must equal the union of links across all eligible
    // micro-batches ever created, with nothing dropped or double-consumed.

    #[derive(Clone, Debug)]
    enum Op {
        Create(Vec<u64>),
        Tick,
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            prop::collection::vec(0u64..1000, 1..4).prop_map(Op::Create),
            Just(Op::Tick),
        ]
    }

    #[derive(Clone, Debug)]
    struct ModelBatch {
        number: u64,
        round: u64,
        from: (u64, String),
        to: (u64, String),
        links: Vec<String>,
    }

    proptest! {
        #[test]
        fn prop_round_trip_law(ops in prop::collection::vec(op_strategy(), 1..40)) {
            let engine = setup_engine(2);

            let mut next_link = 0u64;
            let mut next_number = 0u64;
            let mut next_round = 0u64;
            let mut pending: Vec<ModelBatch> = Vec::new();
            let mut created_links = BTreeSet::new();
            let mut finalized_links = BTreeSet::new();
            let mut finalized_count = 0usize;

            for op in ops {
                match op {
                    Op::Create(mut times) => {
                        times.sort_unstable();
                        let batch_items: Vec<PendingItem> = times
                            .iter()
                            .map(|t| {
                                let link = format!("{next_link:08x}");
                                next_link += 1;
                                created_links.insert(link.clone());
                                PendingItem::new(link, *t)
                            })
                            .collect();

                        let created = engine.create_micro_batch(&batch_items).unwrap();
                        prop_assert_eq!(created.number, next_number);
                        prop_assert_eq!(created.batch.round(), next_round);

                        pending.push(ModelBatch {
                            number: next_number,
                            round: next_round,
                            from: (batch_items[0].time(), batch_items[0].link().to_owned()),
                            to: (
                                batch_items[batch_items.len() - 1].time(),
                                batch_items[batch_items.len() - 1].link().to_owned(),
                            ),
                            links: created.batch.links().to_vec(),
                        });
                        next_number += 1;
                    }
                    Op::Tick => {
                        let round = next_round;
                        let eligible: Vec<ModelBatch> = pending
                            .iter()
                            .filter(|b| b.round + 2 <= round)
                            .cloned()
                            .collect();

                        let outcome = engine.gen_next_batch().unwrap();
                        prop_assert_eq!(outcome.batch_number(), round);

                        if eligible.is_empty() {
                            prop_assert!(outcome.as_finalized().is_none());
                        } else {
                            let fin = outcome.as_finalized().unwrap();
                            let earliest = eligible.iter().min_by_key(|b| b.from.0).unwrap();
                            let latest = eligible.iter().max_by_key(|b| b.to.0).unwrap();
                            prop_assert_eq!(fin.from_timestamp(), earliest.from.0);
                            prop_assert_eq!(fin.from_link(), earliest.from.1.as_str());
                            prop_assert_eq!(fin.to_timestamp(), latest.to.0);
                            prop_assert_eq!(fin.to_link(), latest.to.1.as_str());

                            for batch in &eligible {
                                for link in &batch.links {
                                    // No link consumed twice across rounds.
                                    prop_assert!(finalized_links.insert(link.clone()));
                                    finalized_count += 1;
                                }
                            }
                            let consumed: BTreeSet<u64> =
                                eligible.iter().map(|b| b.number).collect();
                            pending.retain(|b| !consumed.contains(&b.number));
                        }
                        next_round += 1;
                    }
                }
            }

            // What the engine still holds pending matches the model, and
            // created = finalized ∪ still-pending with no drops.
            let partition = engine.micro_batches_for_next_batch().unwrap();
            let engine_pending: BTreeSet<u64> = partition
                .eligible
                .iter()
                .chain(partition.waiting.iter())
                .map(|h| h.number())
                .collect();
            let model_pending: BTreeSet<u64> = pending.iter().map(|b| b.number).collect();
            prop_assert_eq!(engine_pending, model_pending);

            let pending_links: BTreeSet<String> = pending
                .iter()
                .flat_map(|b| b.links.iter().cloned())
                .collect();
            let mut accounted = finalized_links.clone();
            accounted.extend(pending_links);
            prop_assert_eq!(&accounted, &created_links);
            prop_assert_eq!(finalized_count, finalized_links.len());
        }
    }
}
