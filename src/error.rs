use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum BenchError {
    #[error("mount directory {0:?} is not an accessible directory")]
    BadMountDir(PathBuf),
    #[error("target file {0:?} is missing")]
    MissingTargetFile(PathBuf),
    #[error("open {path:?}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("read {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("setup of {path:?} failed: {source}")]
    Setup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("write {path:?}: {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("benchmark interrupted before all jobs completed")]
    Interrupted,
    #[error("failed to start runtime: {0}")]
    Runtime(#[source] std::io::Error),
}
