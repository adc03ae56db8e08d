//! Streaming stages of the SpMV pipeline
//!
//! Items flowing between stages are small `Copy` records. Every stage is a
//! lane that reads from bounded queues and writes to bounded queues; a queue
//! whose senders are all dropped carries the end-of-stream token.

pub mod accumulator;
pub mod aggregate;
pub mod codec;
pub mod interleave;
pub mod multiply;
pub mod queue;
pub mod router;

/// One nonzero of A with block-local coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Entry<T> {
    /// Matrix value
    pub value: T,
    /// Row within the C-block
    pub row: u32,
    /// Column within the K-block
    pub col: u32,
}

impl<T> Entry<T> {
    pub fn new(value: T, row: u32, col: u32) -> Self {
        Self { value, row, col }
    }
}

/// `A[row][col] * B[col]`, no longer carrying the column
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PartialProduct<T> {
    pub value: T,
    /// Row within the C-block, or the in-bank offset after interleaving
    pub row: u32,
}

/// A completed run of products for one row offset
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RowSum<T> {
    /// Offset within the (bank, group) C bank
    pub row: u32,
    pub sum: T,
}
