//! Error type for the SpMV engine
//!
//! Every error here is a configuration or shape violation found before the
//! lanes of a block start. None of them is recoverable; the caller is expected
//! to abort the operation. Invariant violations inside a running pipeline are
//! assertions, not errors.

use thiserror::Error;

/// Errors reported by the engine and the stream builder
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpmvError {
    /// A configuration parameter is out of range
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A block count or block size does not decompose into bank/group units
    #[error("block size mismatch: {what} is {actual}, expected {expected}")]
    BlockSize {
        /// Which quantity was wrong
        what: &'static str,
        /// Value supplied
        actual: usize,
        /// Value implied by the geometry
        expected: usize,
    },

    /// More blocks than the descriptor table can hold
    #[error("descriptor table overflow: {needed} blocks exceed capacity {capacity}")]
    DescriptorOverflow {
        /// Number of (K-block, C-block) pairs requested
        needed: usize,
        /// Configured table capacity
        capacity: usize,
    },

    /// An offset or count is not a multiple of its required unit
    #[error("{what} = {value} is not a multiple of {unit}")]
    Misaligned {
        /// Which quantity was misaligned
        what: &'static str,
        /// Value supplied
        value: usize,
        /// Required unit
        unit: usize,
    },

    /// A descriptor points past the end of the entry stream
    #[error("block ({k_block}, {c_block}) reads words {start}..{end} past stream end {len}")]
    StreamOutOfRange {
        /// K-block index
        k_block: usize,
        /// C-block index
        c_block: usize,
        /// First word of the block
        start: usize,
        /// One past the last word of the block
        end: usize,
        /// Words available in the stream
        len: usize,
    },

    /// A vector or slice has the wrong length
    #[error("dimension mismatch: {what} has length {actual}, expected {expected}")]
    DimensionMismatch {
        /// Which operand was wrong
        what: &'static str,
        /// Length supplied
        actual: usize,
        /// Length expected
        expected: usize,
    },

    /// A triplet lies outside the matrix
    #[error("entry ({row}, {col}) outside {m}x{k} matrix")]
    EntryOutOfBounds {
        row: usize,
        col: usize,
        m: usize,
        k: usize,
    },

    /// A lane could not forward because its downstream lane is gone
    #[error("{stage} lane {lane} lost its downstream queue")]
    LaneDisconnected {
        /// Pipeline stage name
        stage: &'static str,
        /// Lane index within the stage
        lane: usize,
    },

    /// The host thread pool could not be built
    #[error("host thread pool: {0}")]
    ThreadPool(String),
}

/// Result alias used throughout the crate
pub type SpmvResult<T> = Result<T, SpmvError>;
