//! Provisioning of target files, for hosts where the data set does not
//! pre-exist. Produces what the upload side would: one file per job index,
//! filled with pseudo-random bytes.

use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

use rand::RngCore;
use tracing::info;

use crate::config::{Config, MIB};
use crate::error::BenchError;

/// Creates or extends every target file up to the read cap
/// (`block_size * max_blocks`). Files that are already large enough are
/// left alone. Writes go through the page cache; setup is off the measured
/// path.
pub fn ensure_target_files(config: &Config) -> Result<(), BenchError> {
    let needed = config.per_file_cap_bytes();
    std::thread::scope(|scope| {
        let mut fillers = Vec::new();
        for index in config.job_indices() {
            let path = config.target_path(index);
            let (append_offset, append_mibs) = match std::fs::metadata(&path) {
                Ok(md) if md.len() >= needed => continue,
                Ok(md) => {
                    // extend from the last whole MiB
                    let rounded_down_mibs = md.len() / MIB;
                    (rounded_down_mibs * MIB, needed / MIB - rounded_down_mibs)
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => (0, needed / MIB),
                Err(source) => return Err(BenchError::Setup { path, source }),
            };
            info!(path = %path.display(), append_mibs, "filling target file");
            fillers.push(scope.spawn(move || fill(&path, append_offset, append_mibs)));
        }
        for filler in fillers {
            filler.join().expect("setup thread panicked")?;
        }
        Ok(())
    })
}

fn fill(path: &Path, offset: u64, mibs: u64) -> Result<(), BenchError> {
    let write = || -> std::io::Result<()> {
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .open(path)?;
        file.seek(SeekFrom::Start(offset))?;
        let mut chunk = vec![0u8; MIB as usize];
        for _ in 0..mibs {
            rand::thread_rng().fill_bytes(&mut chunk);
            file.write_all(&chunk)?;
        }
        Ok(())
    };
    write().map_err(|source| BenchError::Setup {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{target_file_name, IoMode};
    use std::num::NonZeroU64;

    #[test]
    fn creates_missing_files_and_extends_short_ones() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config {
            mount_dir: dir.path().to_path_buf(),
            num_jobs: NonZeroU64::new(1).unwrap(),
            io_mode: IoMode::Cached,
            block_size_mib: NonZeroU64::new(1).unwrap(),
            max_blocks: NonZeroU64::new(2).unwrap(),
        };
        // j0 exists but is short of the 2 MiB cap; j1 is missing entirely
        std::fs::write(
            dir.path().join(target_file_name(0)),
            vec![1u8; MIB as usize / 2],
        )
        .unwrap();

        ensure_target_files(&cfg).unwrap();
        for index in cfg.job_indices() {
            let md = std::fs::metadata(cfg.target_path(index)).unwrap();
            assert_eq!(md.len(), 2 * MIB);
        }

        // a second call finds nothing to do
        ensure_target_files(&cfg).unwrap();
        cfg.validate().unwrap();
    }
}
