use std::num::NonZeroU64;
use std::ops::RangeInclusive;
use std::path::PathBuf;

use crate::error::BenchError;

pub const MIB: u64 = 1024 * 1024;

/// How reads hit the storage device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
pub enum IoMode {
    /// `O_DIRECT`, bypassing the page cache. Measures raw device/mount
    /// throughput.
    Direct,
    /// Plain buffered reads through the page cache.
    Cached,
}

impl IoMode {
    pub fn is_direct(self) -> bool {
        matches!(self, IoMode::Direct)
    }
}

impl std::str::FromStr for IoMode {
    type Err = std::convert::Infallible;

    /// The literal `true` enables direct I/O; any other value reads through
    /// the page cache. This mirrors the historical flag parsing so recorded
    /// invocations keep their meaning.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(if s == "true" {
            IoMode::Direct
        } else {
            IoMode::Cached
        })
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    /// Mount point holding the target files.
    pub mount_dir: PathBuf,
    /// Upper bound on concurrent reads. Target files `j0` through
    /// `j{num_jobs}` are scanned, i.e. `num_jobs + 1` files: the job list
    /// has always been inclusive of its upper bound and existing file sets
    /// were provisioned to match, so the extra file is kept rather than
    /// silently dropped. It queues like any other job.
    pub num_jobs: NonZeroU64,
    pub io_mode: IoMode,
    /// Size of each sequential read, in MiB.
    pub block_size_mib: NonZeroU64,
    /// Cap on blocks read per file; shorter files stop at EOF.
    pub max_blocks: NonZeroU64,
}

impl Config {
    pub fn block_size_bytes(&self) -> u64 {
        self.block_size_mib.get() * MIB
    }

    /// Bytes read per target file, unless EOF cuts the scan short.
    pub fn per_file_cap_bytes(&self) -> u64 {
        self.block_size_bytes() * self.max_blocks.get()
    }

    /// Job indices, inclusive of the upper bound. See [`Config::num_jobs`].
    pub fn job_indices(&self) -> RangeInclusive<u64> {
        0..=self.num_jobs.get()
    }

    pub fn target_path(&self, index: u64) -> PathBuf {
        self.mount_dir.join(target_file_name(index))
    }

    /// Rejects bad input before any I/O: the mount dir must be a directory
    /// and every target file must exist. Files shorter than the read cap
    /// are allowed (the scan stops at EOF) but logged, so a mis-provisioned
    /// mount is visible.
    pub fn validate(&self) -> Result<(), BenchError> {
        match std::fs::metadata(&self.mount_dir) {
            Ok(md) if md.is_dir() => {}
            _ => return Err(BenchError::BadMountDir(self.mount_dir.clone())),
        }
        for index in self.job_indices() {
            let path = self.target_path(index);
            match std::fs::metadata(&path) {
                Ok(md) => {
                    if md.len() < self.per_file_cap_bytes() {
                        tracing::warn!(
                            path = %path.display(),
                            len = md.len(),
                            cap = self.per_file_cap_bytes(),
                            "target file is shorter than the read cap, job will stop at EOF"
                        );
                    }
                }
                Err(_) => return Err(BenchError::MissingTargetFile(path)),
            }
        }
        Ok(())
    }
}

/// File naming convention shared with the provisioning side: nominally
/// 100 GiB files, uploaded without checksums, one per job index.
pub fn target_file_name(index: u64) -> String {
    format!("j{index}_100GiB_nochecksum.bin")
}
