//! Per-job counters and the aggregate run summary.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crossbeam_utils::CachePadded;
use itertools::Itertools;
use serde_with::serde_as;

use crate::config::MIB;

const LATENCY_PERCENTILES: [f64; 5] = [50.0, 90.0, 99.0, 99.9, 99.99];

/// Per-job counters, cache-line padded so jobs don't contend.
///
/// `bytes_this_tick` is drained by the monitor once a second; the totals are
/// left alone until the final summary.
pub(crate) struct StatsState {
    bytes_total: Vec<CachePadded<AtomicU64>>,
    blocks_total: Vec<CachePadded<AtomicU64>>,
    bytes_this_tick: Vec<CachePadded<AtomicU64>>,
    block_latencies: Vec<CachePadded<Mutex<hdrhistogram::Histogram<u64>>>>,
}

impl StatsState {
    pub(crate) fn new(num_jobs: usize) -> Self {
        Self {
            bytes_total: (0..num_jobs)
                .map(|_| CachePadded::new(AtomicU64::new(0)))
                .collect(),
            blocks_total: (0..num_jobs)
                .map(|_| CachePadded::new(AtomicU64::new(0)))
                .collect(),
            bytes_this_tick: (0..num_jobs)
                .map(|_| CachePadded::new(AtomicU64::new(0)))
                .collect(),
            block_latencies: (0..num_jobs)
                .map(|_| CachePadded::new(Mutex::new(Self::make_latency_histogram())))
                .collect(),
        }
    }

    // Block latencies in microseconds. A 1 GiB block off a slow mount can
    // take tens of seconds, so the upper bound is one hour.
    fn make_latency_histogram() -> hdrhistogram::Histogram<u64> {
        hdrhistogram::Histogram::new_with_bounds(1, 3_600_000_000, 3).unwrap()
    }

    pub(crate) fn record_block(&self, slot: usize, bytes: u64, latency: Duration) {
        self.bytes_total[slot].fetch_add(bytes, Ordering::Relaxed);
        self.blocks_total[slot].fetch_add(1, Ordering::Relaxed);
        self.bytes_this_tick[slot].fetch_add(bytes, Ordering::Relaxed);
        let mut h = self.block_latencies[slot].lock().unwrap();
        h.saturating_record(u64::try_from(latency.as_micros()).unwrap_or(u64::MAX));
    }

    /// Drains and sums the per-tick byte counters.
    pub(crate) fn take_tick_bytes(&self) -> u64 {
        self.bytes_this_tick
            .iter()
            .map(|c| c.swap(0, Ordering::Relaxed))
            .sum()
    }

    pub(crate) fn per_job_bytes(&self) -> Vec<u64> {
        self.bytes_total
            .iter()
            .map(|c| c.load(Ordering::Relaxed))
            .collect()
    }

    pub(crate) fn summarize(&self, elapsed: Duration) -> RunSummary {
        let per_job_bytes = self.per_job_bytes();
        let total_bytes: u64 = per_job_bytes.iter().sum();
        let total_blocks: u64 = self
            .blocks_total
            .iter()
            .map(|c| c.load(Ordering::Relaxed))
            .sum();
        let mut histo = Self::make_latency_histogram();
        for h in &self.block_latencies {
            let h = h.lock().unwrap();
            histo += &*h;
        }
        RunSummary {
            elapsed,
            total_bytes,
            total_blocks,
            throughput_mibps: total_bytes as f64 / MIB as f64 / elapsed.as_secs_f64(),
            block_latency_min_us: histo.min() as f64,
            block_latency_mean_us: histo.mean(),
            block_latency_max_us: histo.max() as f64,
            block_latency_percentiles: {
                let mut values = [0.0; LATENCY_PERCENTILES.len()];
                for (i, value_ref) in values.iter_mut().enumerate() {
                    *value_ref = histo.value_at_percentile(LATENCY_PERCENTILES[i]) as f64;
                }
                values
            },
            sorted_per_job_bytes: per_job_bytes.into_iter().sorted().collect(),
        }
    }
}

fn latency_percentiles_serialize<S>(
    values: &[f64; LATENCY_PERCENTILES.len()],
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serde::Serialize::serialize(
        &LATENCY_PERCENTILES
            .iter()
            .map(|p| format!("p{p}"))
            .zip(values.iter().cloned())
            .collect::<HashMap<_, _>>(),
        serializer,
    )
}

#[serde_as]
#[derive(Debug, serde::Serialize)]
pub struct RunSummary {
    #[serde_as(as = "serde_with::DurationMicroSeconds")]
    pub elapsed: Duration,
    pub total_bytes: u64,
    pub total_blocks: u64,
    pub throughput_mibps: f64,
    pub block_latency_min_us: f64,
    pub block_latency_mean_us: f64,
    pub block_latency_max_us: f64,
    #[serde(serialize_with = "latency_percentiles_serialize")]
    pub block_latency_percentiles: [f64; LATENCY_PERCENTILES.len()],
    /// Bytes read by each job, sorted ascending. Useful to judge whether
    /// the jobs got an even share of the run.
    pub sorted_per_job_bytes: Vec<u64>,
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "elapsed={} read={:.2}GiB blocks={} TP: bw={:.2}MiB/s BLOCK-LAT(us): min={:.0} mean={:.0} max={:.0} {}",
            humantime::format_duration(Duration::from_millis(
                u64::try_from(self.elapsed.as_millis()).unwrap_or(u64::MAX)
            )),
            self.total_bytes as f64 / (1u64 << 30) as f64,
            self.total_blocks,
            self.throughput_mibps,
            self.block_latency_min_us,
            self.block_latency_mean_us,
            self.block_latency_max_us,
            self.block_latency_percentiles
                .iter()
                .zip(LATENCY_PERCENTILES.iter())
                .map(|(v, p)| format!("p{p}={v:.0}"))
                .join(" "),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summarize_sums_jobs() {
        let stats = StatsState::new(2);
        stats.record_block(0, 100, Duration::from_micros(10));
        stats.record_block(1, 50, Duration::from_micros(30));
        stats.record_block(1, 50, Duration::from_micros(20));
        let s = stats.summarize(Duration::from_secs(1));
        assert_eq!(s.total_bytes, 200);
        assert_eq!(s.total_blocks, 3);
        assert_eq!(s.sorted_per_job_bytes, vec![100, 100]);
    }

    #[test]
    fn tick_counters_drain_without_touching_totals() {
        let stats = StatsState::new(1);
        stats.record_block(0, 7, Duration::from_micros(1));
        assert_eq!(stats.take_tick_bytes(), 7);
        assert_eq!(stats.take_tick_bytes(), 0);
        assert_eq!(stats.per_job_bytes(), vec![7]);
    }

    #[test]
    fn summary_serializes_with_named_percentiles() {
        let stats = StatsState::new(1);
        stats.record_block(0, 1024, Duration::from_micros(100));
        let json = serde_json::to_string(&stats.summarize(Duration::from_secs(1))).unwrap();
        assert!(json.contains("\"p50\""));
        assert!(json.contains("\"total_bytes\":1024"));
    }
}
