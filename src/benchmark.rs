//! Capability benchmark.
//!
//! Probes every transport with a synthetic `eth_getLogs` query over increasingly wide ranges that
//! end at a known-good block, to learn the largest range each transport accepts before real work
//! starts. The attempts are ordinary [`RequestStat`]s and are fed to the strategy engine like any
//! other outcome.

use std::{
    collections::{BTreeMap, HashMap},
    time::Duration,
};

use alloy::{
    primitives::Address,
    rpc::types::Filter,
    sol,
    sol_types::SolEvent,
};
use futures::future::join_all;
use tokio::time::Instant;

use crate::{
    strategy::{MaxBlocks, RequestStat, RequestStatus},
    transport::{RequestOptions, Transport, TransportRegistry, hints},
};

sol! {
    #[derive(Debug)]
    event Approval(address indexed owner, address indexed spender, uint256 value);
}

/// Candidate range sizes, tested in ascending order.
pub const BENCHMARK_RANGES: [MaxBlocks; 4] = [
    MaxBlocks::Limited(1_000),
    MaxBlocks::Limited(10_000),
    MaxBlocks::Limited(100_000),
    MaxBlocks::Unconstrained,
];

/// How long a benchmark result stays fresh in a [`BenchmarkCache`].
pub const DEFAULT_BENCHMARK_TTL: Duration = Duration::from_secs(600);

pub const DEFAULT_BENCHMARK_OPTIONS: RequestOptions = RequestOptions {
    timeout: Duration::from_secs(6),
    retry_count: 1,
    retry_delay: Duration::from_millis(200),
};

/// Outcome of a benchmark run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BenchmarkReport {
    /// Largest accepted candidate per transport id, `None` when even the smallest one failed.
    pub per_transport: BTreeMap<String, Option<MaxBlocks>>,
    /// Largest range accepted by any transport.
    pub nominal: Option<MaxBlocks>,
    /// Every attempt, in completion order per transport.
    pub attempts: Vec<RequestStat>,
}

impl BenchmarkReport {
    #[must_use]
    pub fn nominal_for(&self, transport_id: &str) -> Option<MaxBlocks> {
        self.per_transport.get(transport_id).copied().flatten()
    }
}

/// Synthetic filter used by the benchmark: ERC-20 `Approval` events from the zero address.
///
/// Cheap for nodes to answer since it virtually never matches.
#[must_use]
pub fn benchmark_filter() -> Filter {
    Filter::new().event_signature(Approval::SIGNATURE_HASH).topic1(Address::ZERO.into_word())
}

#[derive(Clone, Debug)]
pub struct CapabilityBenchmark {
    options: RequestOptions,
}

impl Default for CapabilityBenchmark {
    fn default() -> Self {
        Self::new()
    }
}

impl CapabilityBenchmark {
    #[must_use]
    pub fn new() -> Self {
        Self { options: DEFAULT_BENCHMARK_OPTIONS }
    }

    /// Sets the per-attempt budget.
    #[must_use]
    pub fn options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }

    /// Benchmarks all `transports` concurrently with ranges ending at `to_block`.
    pub async fn run(&self, transports: &[Transport], to_block: u64) -> BenchmarkReport {
        let runs = join_all(transports.iter().map(|t| self.run_transport(t, to_block))).await;

        let mut report = BenchmarkReport::default();
        for (transport, (nominal, attempts)) in transports.iter().zip(runs) {
            report.per_transport.insert(transport.id().to_owned(), nominal);
            report.nominal = report.nominal.max(nominal);
            report.attempts.extend(attempts);
        }

        info!(
            to_block,
            nominal = ?report.nominal,
            attempts = report.attempts.len(),
            "Capability benchmark finished"
        );
        report
    }

    async fn run_transport(
        &self,
        transport: &Transport,
        to_block: u64,
    ) -> (Option<MaxBlocks>, Vec<RequestStat>) {
        let filter = benchmark_filter();
        let mut nominal = None;
        let mut attempts = Vec::with_capacity(BENCHMARK_RANGES.len());

        for candidate in BENCHMARK_RANGES {
            if hints::supports_num_blocks(transport.id(), candidate) == Some(false) {
                break;
            }

            let from_block = match candidate {
                MaxBlocks::Limited(n) => to_block.saturating_sub(n.saturating_sub(1)),
                MaxBlocks::Unconstrained => 0,
            };
            let query = filter.clone().from_block(from_block).to_block(to_block);

            let started_at = Instant::now();
            let result = transport.request_logs(&query, self.options).await;
            let latency = started_at.elapsed();

            attempts.push(RequestStat {
                transport_id: transport.id().into(),
                status: if result.is_ok() { RequestStatus::Success } else { RequestStatus::Failure },
                started_at,
                latency,
                num_blocks: (to_block - from_block).saturating_add(1),
                max_blocks: candidate,
            });

            if let Err(e) = result {
                debug!(transport = %transport.id(), candidate = %candidate, error = %e, "Benchmark candidate rejected");
                break;
            }
            nominal = Some(candidate);
        }

        (nominal, attempts)
    }
}

/// Cache key of a benchmark: chain id and the registry's transport ids.
#[must_use]
pub fn benchmark_key(registry: &TransportRegistry) -> (u64, String) {
    let ids: Vec<_> = registry.ids().collect();
    (registry.chain_id(), format!("fallback({})", ids.join(", ")))
}

/// Benchmark reports, kept fresh for a fixed time per registry.
#[derive(Debug)]
pub struct BenchmarkCache {
    benchmark: CapabilityBenchmark,
    ttl: Duration,
    reports: HashMap<(u64, String), (Instant, BenchmarkReport)>,
}

impl Default for BenchmarkCache {
    fn default() -> Self {
        Self::new(CapabilityBenchmark::new(), DEFAULT_BENCHMARK_TTL)
    }
}

impl BenchmarkCache {
    #[must_use]
    pub fn new(benchmark: CapabilityBenchmark, ttl: Duration) -> Self {
        Self { benchmark, ttl, reports: HashMap::new() }
    }

    /// Returns the cached report for `registry`, running the benchmark when there is none, it is
    /// stale, or `force` is set.
    ///
    /// The flag is `true` when the benchmark actually ran, in which case the report's attempts
    /// are new and should be folded into request statistics.
    pub async fn get_or_run(
        &mut self,
        registry: &TransportRegistry,
        to_block: u64,
        force: bool,
    ) -> (BenchmarkReport, bool) {
        let key = benchmark_key(registry);
        if !force
            && let Some((ran_at, report)) = self.reports.get(&key)
            && ran_at.elapsed() < self.ttl
        {
            return (report.clone(), false);
        }

        let report = self.benchmark.run(registry.transports(), to_block).await;
        self.reports.insert(key, (Instant::now(), report.clone()));
        (report, true)
    }
}
