//! Mines a vanity git commit: searches author/committer timestamp pairs
//! until the SHA-1 of the commit object shares a long common substring
//! with the BLAKE2b hash of the same object, then recreates the commit
//! with the winning timestamps via `git commit-tree`.

mod commit;
mod cpu;
mod hashes;
mod invoker;
mod report;

#[cfg(feature = "opencl")]
mod device;
#[cfg(feature = "opencl")]
mod gpu;

#[cfg(test)]
mod tests;

pub use commit::{read_commit, CommitMessage};
pub use cpu::{CpuConfig, CpuMiner, Tick};
pub use hashes::{blake2_digest, longest_match, sha1_digest, Blake2Digest, MatchResult, Sha1Digest};
pub use invoker::create_commit;
pub use report::{finish_commit, print_winning_state, WinningState};

#[cfg(feature = "opencl")]
pub use gpu::{GpuMiner, WorkAllocator};

use std::io;

/// Matches shorter than this are noise and are never reported by either
/// engine.
pub const MIN_MATCH_LEN: usize = 4;

/// Match length (in digest bytes) at which a search completes. Both
/// engines read the same knob; the CPU engine stops the moment a worker
/// reaches it, the GPU engine keeps batching until a candidate of this
/// length survives CPU re-verification.
pub const DEFAULT_TERMINATE_AT: usize = 5;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Io(#[from] io::Error),

    #[error("malformed commit: {0}")]
    Parse(String),

    #[cfg(feature = "opencl")]
    #[error("OpenCL: {0}")]
    Gpu(#[from] ocl::Error),

    #[cfg(feature = "opencl")]
    #[error("OpenCL: {0}")]
    Device(String),

    #[error("git: {0}")]
    Git(String),

    #[error("BUG: {0}")]
    Bug(String),
}

pub type Result<T> = std::result::Result<T, Error>;
