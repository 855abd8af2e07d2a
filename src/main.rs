use std::num::NonZeroU64;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use seqread_bench::config::Config;
use seqread_bench::{run, setup, BenchError, IoMode, RunSummary};

/// Parallel sequential-read throughput benchmark.
///
/// Scans the first `max_blocks * block_size` bytes of each target file
/// under MOUNT_DIR, with at most NUM_JOBS scans in flight, and reports
/// aggregate throughput.
#[derive(serde::Serialize, clap::Parser, Clone)]
struct Args {
    /// Mount point holding the `j<N>_100GiB_nochecksum.bin` target files.
    mount_dir: PathBuf,
    /// Bound on concurrent reads; files j0 through j<NUM_JOBS> are scanned.
    num_jobs: NonZeroU64,
    /// The literal "true" enables O_DIRECT; any other value reads through
    /// the page cache.
    io_mode: IoMode,
    /// Size of each sequential read, in MiB.
    #[clap(long, default_value = "1024")]
    block_size_mib: NonZeroU64,
    /// Cap on blocks read per file; shorter files stop at EOF.
    #[clap(long, default_value = "10")]
    max_blocks: NonZeroU64,
    /// Create or extend missing target files before the run.
    #[clap(long)]
    setup: bool,
    /// Write the run summary and the arguments that produced it to this
    /// path as JSON.
    #[clap(long)]
    output_json: Option<PathBuf>,
}

#[derive(serde::Serialize)]
struct BenchmarkOutput {
    args: Args,
    summary: RunSummary,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_file(true)
        .with_line_number(true)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    match main_impl(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("benchmark failed: {e}");
            ExitCode::FAILURE
        }
    }
}

fn main_impl(args: Args) -> Result<(), BenchError> {
    let config = Config {
        mount_dir: args.mount_dir.clone(),
        num_jobs: args.num_jobs,
        io_mode: args.io_mode,
        block_size_mib: args.block_size_mib,
        max_blocks: args.max_blocks,
    };

    if args.setup {
        setup::ensure_target_files(&config)?;
    }

    let stop = Arc::new(AtomicBool::new(false));
    ctrlc::set_handler({
        let stop = Arc::clone(&stop);
        move || {
            if stop.fetch_or(true, Ordering::Relaxed) {
                error!("stop flag was already set, aborting");
                std::process::abort();
            } else {
                info!("ctrl-c, stopping jobs at the next block boundary");
            }
        }
    })
    .expect("ctrl-c handler is set once");

    let summary = run(config, stop)?;
    info!("{summary}");

    if let Some(path) = args.output_json.clone() {
        let output = BenchmarkOutput { args, summary };
        let json = serde_json::to_string(&output).expect("summary serializes");
        std::fs::write(&path, json).map_err(|source| BenchError::Output {
            path: path.clone(),
            source,
        })?;
        info!("wrote results to {}", path.display());
    }
    Ok(())
}
