//! Parallel sequential-read throughput benchmark for mounted filesystems.
//!
//! The benchmark scans a set of pre-provisioned target files
//! (`j<N>_100GiB_nochecksum.bin`) under a mount point, one sequential scan
//! per file with a configurable bound on how many run at once, and reports
//! aggregate throughput plus per-block latency percentiles. Reads either go
//! through the page cache or bypass it with `O_DIRECT`.
//!
//! Any anomaly invalidates a measurement, so there are no retries: the first
//! failing job stops the others and the run exits non-zero.

pub mod config;
pub mod error;
mod pool;
mod reader;
pub mod run;
pub mod setup;
pub mod stats;

pub use config::{Config, IoMode};
pub use error::BenchError;
pub use run::run;
pub use stats::RunSummary;
