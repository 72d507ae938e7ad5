use crate::data_sources::TransferSource;
use crate::sinks::{FindingSink, VecSink};
use crate::types::{Finding, Fraction};
use alloy_primitives::{Address, aliases::U256};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors surfaced by a trace run.
#[derive(Debug, Error)]
pub enum TraceError {
    #[error("invalid trace configuration: {0}")]
    InvalidConfig(String),

    #[error("transfer source failed for {address}: {reason}")]
    SourceUnavailable { address: Address, reason: anyhow::Error },

    #[error("trace cancelled")]
    Cancelled,

    #[error("finding sink failed: {reason}")]
    Sink { reason: anyhow::Error },
}

/// FailurePolicy
///
/// What to do when the transfer source fails for an address mid-walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Stop the whole trace and propagate the failure.
    #[default]
    Abort,
    /// Treat the failed fetch as an empty transfer list for that address
    /// and keep walking its siblings. Skipped addresses are reported in
    /// TraceStats, not swallowed.
    SkipSubtree,
}

/// TraceConfig
///
/// Bounds and policy for one trace. `max_depth` must be at least 1;
/// HopTracer::new rejects anything else before the walk starts.
#[derive(Debug, Clone)]
pub struct TraceConfig {
    pub max_depth: usize,
    pub min_fraction: Fraction,
    pub on_source_error: FailurePolicy,
}

/// TraceStats
///
/// Counters for a completed trace. `skipped` holds the addresses whose
/// fetch failed under FailurePolicy::SkipSubtree, with the source's error
/// message.
#[derive(Debug, Default)]
pub struct TraceStats {
    pub addresses_visited: usize,
    pub transfers_seen: usize,
    pub findings_emitted: usize,
    pub skipped: Vec<(Address, String)>,
}

///
/// HopTracer
///
/// Walks an outgoing-transfer graph outward from a seed address up to a
/// fixed depth, depth-first. At each hop, every transfer carrying at least
/// `min_fraction` of the amount that funded the hop is emitted as a
/// Finding, and the walk continues into its receiver.
///
/// A visited set guarantees no address is entered as a recursion root
/// twice within one run, which also terminates cyclic transfer graphs.
/// Transfers into an already-visited address (self-transfers included)
/// still emit findings; they just don't extend the walk.
///
/// A seed amount of zero makes every threshold zero, so every transfer at
/// depth 1 qualifies. That is the intended baseline behavior, not guarded
/// against.
///
pub struct HopTracer {
    config: TraceConfig,
    cancel: Arc<AtomicBool>,
}

impl HopTracer {
    pub fn new(config: TraceConfig) -> Result<Self, TraceError> {
        if config.max_depth < 1 {
            return Err(TraceError::InvalidConfig(format!(
                "max_depth must be at least 1, got {}",
                config.max_depth
            )));
        }
        Ok(Self {
            config,
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Flag that aborts the walk when set. Checked on entry to every step,
    /// so a long walk over a large graph can be stopped externally.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    /// Run the trace, handing each finding to `sink` as it is emitted.
    pub fn trace<S, K>(
        &self,
        seed: Address,
        seed_amount: U256,
        source: &S,
        sink: &mut K,
    ) -> Result<TraceStats, TraceError>
    where
        S: TransferSource,
        K: FindingSink,
    {
        let mut visited: HashSet<Address> = HashSet::new();
        let mut stats = TraceStats::default();

        self.step(seed, 1, seed_amount, &mut visited, source, sink, &mut stats)?;

        stats.addresses_visited = visited.len();
        Ok(stats)
    }

    /// Run the trace and collect the findings in emission order.
    pub fn trace_collect<S: TransferSource>(
        &self,
        seed: Address,
        seed_amount: U256,
        source: &S,
    ) -> Result<Vec<Finding>, TraceError> {
        let mut sink = VecSink::new();
        self.trace(seed, seed_amount, source, &mut sink)?;
        Ok(sink.into_findings())
    }

    #[allow(clippy::too_many_arguments)]
    fn step<S, K>(
        &self,
        address: Address,
        depth: usize,
        funding: U256,
        visited: &mut HashSet<Address>,
        source: &S,
        sink: &mut K,
        stats: &mut TraceStats,
    ) -> Result<(), TraceError>
    where
        S: TransferSource,
        K: FindingSink,
    {
        if self.cancel.load(Ordering::Relaxed) {
            return Err(TraceError::Cancelled);
        }
        if depth > self.config.max_depth || visited.contains(&address) {
            return Ok(());
        }
        // Insert before fetching, so a failed fetch still counts the
        // address as visited
        visited.insert(address);

        let transfers = match source.list_outgoing(&address) {
            Ok(transfers) => transfers,
            Err(reason) => match self.config.on_source_error {
                FailurePolicy::Abort => {
                    return Err(TraceError::SourceUnavailable { address, reason });
                }
                FailurePolicy::SkipSubtree => {
                    warn!("skipping subtree at {address}: {reason}");
                    stats.skipped.push((address, reason.to_string()));
                    Vec::new()
                }
            },
        };

        let threshold = self.config.min_fraction.threshold_of(funding);
        debug!(
            "depth {depth}: {} outgoing transfers from {address}, threshold {threshold}",
            transfers.len()
        );

        // Transfers stay in source order. Each edge derives its threshold
        // from this node's funding, never from a sibling transfer.
        for transfer in transfers {
            stats.transfers_seen += 1;
            if transfer.amount < threshold {
                continue;
            }

            let receiver = transfer.receiver;
            let amount = transfer.amount;
            sink.record(Finding {
                depth,
                threshold,
                transfer,
            })
            .map_err(|reason| TraceError::Sink { reason })?;
            stats.findings_emitted += 1;

            if !visited.contains(&receiver) {
                self.step(receiver, depth + 1, amount, visited, source, sink, stats)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_sources::MemoryTransferSource;
    use crate::types::Transfer;
    use alloy_primitives::aliases::TxHash;

    fn addr(byte: u8) -> Address {
        Address::repeat_byte(byte)
    }

    fn transfer(sender: Address, receiver: Address, amount: u64) -> Transfer {
        Transfer::new(
            sender,
            receiver,
            U256::from(amount),
            TxHash::repeat_byte(amount as u8),
            1_700_000_000,
        )
    }

    fn tracer(max_depth: usize, min_fraction: f64) -> HopTracer {
        HopTracer::new(TraceConfig {
            max_depth,
            min_fraction: Fraction::new(min_fraction).unwrap(),
            on_source_error: FailurePolicy::Abort,
        })
        .unwrap()
    }

    /// Source that errors for one address and delegates everything else.
    struct FailingSource {
        inner: MemoryTransferSource,
        fail_on: Address,
    }

    impl TransferSource for FailingSource {
        fn list_outgoing(&self, address: &Address) -> anyhow::Result<Vec<Transfer>> {
            if *address == self.fail_on {
                anyhow::bail!("source offline");
            }
            self.inner.list_outgoing(address)
        }
    }

    #[test]
    fn emits_qualifying_transfers_and_recurses() {
        let a = addr(0xaa);
        let b = addr(0xbb);
        let c = addr(0xcc);

        let mut source = MemoryTransferSource::new();
        source.push(transfer(a, b, 40));
        source.push(transfer(a, c, 10));
        source.push(transfer(b, a, 50));

        let findings = tracer(2, 0.3)
            .trace_collect(a, U256::from(100), &source)
            .unwrap();

        assert_eq!(findings.len(), 2);
        // 40 >= 100 * 0.3
        assert_eq!(findings[0].depth, 1);
        assert_eq!(findings[0].transfer.receiver, b);
        assert_eq!(findings[0].threshold, U256::from(30));
        // the transfer back into A clears B's threshold (50 >= 40 * 0.3)
        // but A is already visited, so the walk stops there
        assert_eq!(findings[1].depth, 2);
        assert_eq!(findings[1].transfer.receiver, a);
        assert_eq!(findings[1].threshold, U256::from(12));
    }

    #[test]
    fn subthreshold_edges_are_neither_emitted_nor_walked() {
        let a = addr(0xaa);
        let b = addr(0xbb);
        let c = addr(0xcc);

        let mut source = MemoryTransferSource::new();
        source.push(transfer(a, c, 10));
        // would qualify if C were ever walked
        source.push(transfer(c, b, 1_000));

        let findings = tracer(3, 0.3)
            .trace_collect(a, U256::from(100), &source)
            .unwrap();

        assert!(findings.is_empty());
    }

    #[test]
    fn cycle_terminates_via_visited_set() {
        let a = addr(0xaa);
        let b = addr(0xbb);

        let mut source = MemoryTransferSource::new();
        source.push(transfer(a, b, 100));
        source.push(transfer(b, a, 100));

        // max_depth far larger than the cycle; the visited set bounds it
        let mut sink = VecSink::new();
        let stats = tracer(5, 0.5)
            .trace(a, U256::from(100), &source, &mut sink)
            .unwrap();

        assert_eq!(sink.findings().len(), 2);
        assert_eq!(stats.addresses_visited, 2);
    }

    #[test]
    fn empty_source_produces_no_findings() {
        let source = MemoryTransferSource::new();

        let mut sink = VecSink::new();
        let stats = tracer(3, 0.3)
            .trace(addr(0x01), U256::from(100), &source, &mut sink)
            .unwrap();

        assert!(sink.findings().is_empty());
        assert_eq!(stats.addresses_visited, 1);
        assert_eq!(stats.transfers_seen, 0);
    }

    #[test]
    fn depth_never_exceeds_max_depth() {
        let chain: Vec<Address> = (1..=5).map(addr).collect();

        let mut source = MemoryTransferSource::new();
        for pair in chain.windows(2) {
            source.push(transfer(pair[0], pair[1], 100));
        }

        let findings = tracer(2, 0.5)
            .trace_collect(chain[0], U256::from(100), &source)
            .unwrap();

        assert_eq!(findings.len(), 2);
        assert!(findings.iter().all(|finding| finding.depth <= 2));
    }

    #[test]
    fn raising_min_fraction_never_adds_findings() {
        let a = addr(0xaa);
        let b = addr(0xbb);
        let c = addr(0xcc);
        let d = addr(0xdd);

        let mut source = MemoryTransferSource::new();
        source.push(transfer(a, b, 80));
        source.push(transfer(a, c, 25));
        source.push(transfer(b, d, 30));
        source.push(transfer(c, d, 20));

        let loose = tracer(3, 0.1)
            .trace_collect(a, U256::from(100), &source)
            .unwrap();
        let strict = tracer(3, 0.5)
            .trace_collect(a, U256::from(100), &source)
            .unwrap();

        assert!(strict.len() < loose.len());
        // thresholds differ between the runs, so compare the emitted
        // transfers themselves
        assert!(strict.iter().all(|finding| {
            loose
                .iter()
                .any(|other| other.transfer == finding.transfer && other.depth == finding.depth)
        }));
    }

    #[test]
    fn trace_is_deterministic_for_a_deterministic_source() {
        let a = addr(0xaa);
        let b = addr(0xbb);
        let c = addr(0xcc);

        let mut source = MemoryTransferSource::new();
        source.push(transfer(a, b, 60));
        source.push(transfer(a, c, 40));
        source.push(transfer(b, c, 30));

        let tracer = tracer(3, 0.3);
        let first = tracer.trace_collect(a, U256::from(100), &source).unwrap();
        let second = tracer.trace_collect(a, U256::from(100), &source).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn zero_seed_amount_lets_every_first_hop_through() {
        let a = addr(0xaa);
        let b = addr(0xbb);
        let c = addr(0xcc);

        let mut source = MemoryTransferSource::new();
        source.push(transfer(a, b, 1));
        source.push(transfer(a, c, 0));

        let findings = tracer(1, 0.3)
            .trace_collect(a, U256::ZERO, &source)
            .unwrap();

        // threshold is 0, so both qualify, the zero-amount one included
        assert_eq!(findings.len(), 2);
        assert!(findings.iter().all(|finding| finding.threshold == U256::ZERO));
    }

    #[test]
    fn self_transfer_emits_but_does_not_recurse() {
        let a = addr(0xaa);
        let b = addr(0xbb);

        let mut source = MemoryTransferSource::new();
        source.push(transfer(a, a, 60));
        source.push(transfer(a, b, 40));

        let mut sink = VecSink::new();
        let stats = tracer(3, 0.3)
            .trace(a, U256::from(100), &source, &mut sink)
            .unwrap();

        let findings = sink.findings();
        assert_eq!(findings[0].transfer.receiver, a);
        assert_eq!(findings[0].depth, 1);
        // A appears once as a root even though it funded itself
        assert_eq!(stats.addresses_visited, 2);
    }

    #[test]
    fn abort_policy_propagates_source_failures() {
        let a = addr(0xaa);
        let b = addr(0xbb);
        let c = addr(0xcc);

        let mut inner = MemoryTransferSource::new();
        inner.push(transfer(a, b, 50));
        inner.push(transfer(a, c, 50));
        let source = FailingSource { inner, fail_on: b };

        let result = tracer(3, 0.3).trace_collect(a, U256::from(100), &source);

        assert!(matches!(
            result,
            Err(TraceError::SourceUnavailable { address, .. }) if address == b
        ));
    }

    #[test]
    fn skip_policy_reports_the_subtree_and_continues() {
        let a = addr(0xaa);
        let b = addr(0xbb);
        let c = addr(0xcc);
        let d = addr(0xdd);

        let mut inner = MemoryTransferSource::new();
        inner.push(transfer(a, b, 50));
        inner.push(transfer(a, c, 50));
        inner.push(transfer(c, d, 40));
        let source = FailingSource { inner, fail_on: b };

        let tracer = HopTracer::new(TraceConfig {
            max_depth: 3,
            min_fraction: Fraction::new(0.3).unwrap(),
            on_source_error: FailurePolicy::SkipSubtree,
        })
        .unwrap();

        let mut sink = VecSink::new();
        let stats = tracer.trace(a, U256::from(100), &source, &mut sink).unwrap();

        // B's subtree is gone but its funding finding and C's whole
        // subtree survive
        assert_eq!(sink.findings().len(), 3);
        assert_eq!(stats.skipped.len(), 1);
        assert_eq!(stats.skipped[0].0, b);
    }

    #[test]
    fn cancellation_aborts_before_walking() {
        let a = addr(0xaa);
        let b = addr(0xbb);

        let mut source = MemoryTransferSource::new();
        source.push(transfer(a, b, 100));

        let tracer = tracer(3, 0.3);
        tracer.cancel_flag().store(true, Ordering::Relaxed);

        let result = tracer.trace_collect(a, U256::from(100), &source);
        assert!(matches!(result, Err(TraceError::Cancelled)));
    }

    #[test]
    fn zero_max_depth_is_rejected_up_front() {
        let result = HopTracer::new(TraceConfig {
            max_depth: 0,
            min_fraction: Fraction::new(0.3).unwrap(),
            on_source_error: FailurePolicy::Abort,
        });

        assert!(matches!(result, Err(TraceError::InvalidConfig(_))));
    }
}
