//! Benchmark orchestration: bounded job fan-out plus a progress monitor.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::info;

use crate::config::{Config, MIB};
use crate::error::BenchError;
use crate::pool;
use crate::reader::{self, AlignedBuf};
use crate::stats::{RunSummary, StatsState};

const MONITOR_PERIOD: Duration = Duration::from_secs(1);

/// Runs the whole benchmark: validates the configuration, then issues one
/// sequential scan per target file with at most `num_jobs` scans in flight,
/// and returns the aggregate summary.
///
/// `stop` may be set from the outside (e.g. a ctrl-c handler); jobs notice
/// it at their next block boundary and the run is reported as interrupted.
/// The first failing job sets `stop` itself, so siblings wind down instead
/// of burning I/O on an already-invalid measurement.
pub fn run(config: Config, stop: Arc<AtomicBool>) -> Result<RunSummary, BenchError> {
    config.validate()?;

    let jobs: Vec<u64> = config.job_indices().collect();
    let stats = Arc::new(StatsState::new(jobs.len()));
    let config = Arc::new(config);

    info!(
        mount_dir = %config.mount_dir.display(),
        num_jobs = config.num_jobs.get(),
        files = jobs.len(),
        io_mode = ?config.io_mode,
        block_size_mib = config.block_size_mib.get(),
        max_blocks = config.max_blocks.get(),
        "starting benchmark"
    );

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .max_blocking_threads(config.num_jobs.get() as usize)
        .build()
        .map_err(BenchError::Runtime)?;

    let start = Instant::now();
    let result = rt.block_on({
        let config = Arc::clone(&config);
        let stats = Arc::clone(&stats);
        let stop = Arc::clone(&stop);
        async move {
            let (monitor_stop_tx, monitor_stop_rx) = tokio::sync::oneshot::channel();
            let monitor = tokio::spawn(monitor(Arc::clone(&stats), monitor_stop_rx));

            let result = pool::join_bounded(
                config.num_jobs.get() as usize,
                jobs,
                |slot, job_index| {
                    let config = Arc::clone(&config);
                    let stats = Arc::clone(&stats);
                    let stop = Arc::clone(&stop);
                    async move {
                        let res = tokio::task::spawn_blocking({
                            let stop = Arc::clone(&stop);
                            move || read_job(slot, job_index, &config, &stats, &stop)
                        })
                        .await
                        .expect("read worker panicked");
                        if res.is_err() {
                            // make the sibling jobs bail at their next block
                            stop.store(true, Ordering::Relaxed);
                        }
                        res
                    }
                },
            )
            .await;

            let _ = monitor_stop_tx.send(());
            monitor.await.expect("monitor task panicked");
            result
        }
    });
    let elapsed = start.elapsed();

    result?;
    if stop.load(Ordering::Relaxed) {
        return Err(BenchError::Interrupted);
    }
    Ok(stats.summarize(elapsed))
}

/// One job: a sequential full-block scan of the first
/// `max_blocks * block_size` bytes of its target file, or to EOF if the
/// file is shorter.
fn read_job(
    slot: usize,
    job_index: u64,
    config: &Config,
    stats: &StatsState,
    stop: &AtomicBool,
) -> Result<(), BenchError> {
    let path = config.target_path(job_index);
    let mut file = reader::open_target(&path, config.io_mode).map_err(|source| BenchError::Open {
        path: path.clone(),
        source,
    })?;
    let block_size = config.block_size_bytes() as usize;
    let mut buf = AlignedBuf::new(block_size);

    info!(job = job_index, path = %path.display(), "job starting");
    let mut bytes_read = 0u64;
    for _ in 0..config.max_blocks.get() {
        if stop.load(Ordering::Relaxed) {
            break;
        }
        let block_start = Instant::now();
        let n = reader::read_full_block(&mut file, buf.as_mut_slice()).map_err(|source| {
            BenchError::Read {
                path: path.clone(),
                source,
            }
        })?;
        if n == 0 {
            break;
        }
        stats.record_block(slot, n as u64, block_start.elapsed());
        bytes_read += n as u64;
        if n < block_size {
            // EOF inside this block; shorter files end here without error
            break;
        }
    }
    info!(job = job_index, bytes_read, "job finished");
    Ok(())
}

async fn monitor(stats: Arc<StatsState>, mut stop: tokio::sync::oneshot::Receiver<()>) {
    let mut ticker = tokio::time::interval(MONITOR_PERIOD);
    // the first tick completes immediately
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let bytes = stats.take_tick_bytes();
                let mib = bytes as f64 / MIB as f64;
                info!(
                    "interval: read {:.0} MiB ({:.0} MiB/s)",
                    mib,
                    mib / MONITOR_PERIOD.as_secs_f64(),
                );
            }
            _ = &mut stop => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{target_file_name, IoMode};
    use std::num::NonZeroU64;
    use std::path::Path;

    fn write_target(dir: &Path, index: u64, len: usize) {
        std::fs::write(dir.join(target_file_name(index)), vec![0xa5u8; len]).unwrap();
    }

    fn test_config(dir: &Path, num_jobs: u64) -> Config {
        Config {
            mount_dir: dir.to_path_buf(),
            num_jobs: NonZeroU64::new(num_jobs).unwrap(),
            io_mode: IoMode::Cached,
            block_size_mib: NonZeroU64::new(1).unwrap(),
            max_blocks: NonZeroU64::new(2).unwrap(),
        }
    }

    fn no_stop() -> Arc<AtomicBool> {
        Arc::new(AtomicBool::new(false))
    }

    #[test]
    fn reads_every_target_file_to_the_cap() {
        let dir = tempfile::tempdir().unwrap();
        // three files for num_jobs = 2, each larger than the 2 MiB cap
        for i in 0..3 {
            write_target(dir.path(), i, 3 << 20);
        }
        let summary = run(test_config(dir.path(), 2), no_stop()).unwrap();
        assert_eq!(summary.total_bytes, 3 * (2 << 20));
        assert_eq!(summary.total_blocks, 6);
        assert_eq!(summary.sorted_per_job_bytes, vec![2 << 20; 3]);
    }

    #[test]
    fn short_files_end_at_eof_without_error() {
        let dir = tempfile::tempdir().unwrap();
        write_target(dir.path(), 0, 1 << 20); // one full block, then EOF
        write_target(dir.path(), 1, (1 << 20) + 512); // EOF inside block two
        let summary = run(test_config(dir.path(), 1), no_stop()).unwrap();
        assert_eq!(summary.total_bytes, (2 << 20) + 512);
        assert_eq!(summary.total_blocks, 3);
        assert_eq!(summary.sorted_per_job_bytes, vec![1 << 20, (1 << 20) + 512]);
    }

    #[test]
    fn missing_target_file_fails_before_any_read() {
        let dir = tempfile::tempdir().unwrap();
        write_target(dir.path(), 0, 1 << 20);
        // j1 and j2 missing
        let err = run(test_config(dir.path(), 2), no_stop()).unwrap_err();
        assert!(matches!(err, BenchError::MissingTargetFile(_)));
    }

    #[test]
    fn preset_stop_flag_reports_interrupted() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..2 {
            write_target(dir.path(), i, 1 << 20);
        }
        let err = run(test_config(dir.path(), 1), Arc::new(AtomicBool::new(true))).unwrap_err();
        assert!(matches!(err, BenchError::Interrupted));
    }
}
