//! Run-length row accumulator, one per (bank, group)
//!
//! Products for one lane arrive grouped by row. The accumulator keeps a
//! running sum for the row it currently holds and emits `(row, sum)` as soon
//! as a different row shows up, in the same way a sort-then-reduce pass
//! merges adjacent duplicates.
//!
//! Rows are expected non-decreasing within a lane. If they are not, a row is
//! simply emitted more than once; the aggregator adds every emission into C,
//! so the totals stay exact and only the number of flushes grows.

use crossbeam_channel::{Receiver, Sender};
use tracing::trace;

use crate::error::SpmvResult;
use crate::scalar::SpmvScalar;
use crate::stream::queue::forward;
use crate::stream::{PartialProduct, RowSum};

/// State of a row accumulator
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RowState<T> {
    /// Nothing received yet
    Idle,
    /// Summing products of `row`
    Holding { row: u32, sum: T },
}

/// Streaming run-length reducer over `(value, row)` pairs
#[derive(Debug, Clone)]
pub struct RowAccumulator<T> {
    state: RowState<T>,
}

impl<T: SpmvScalar> Default for RowAccumulator<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: SpmvScalar> RowAccumulator<T> {
    /// Start idle, so the first product never flushes a phantom row
    pub fn new() -> Self {
        Self {
            state: RowState::Idle,
        }
    }

    pub fn state(&self) -> RowState<T> {
        self.state
    }

    /// Add a product; returns the completed run when the row changes
    pub fn accumulate(&mut self, product: PartialProduct<T>) -> Option<RowSum<T>> {
        match &mut self.state {
            RowState::Holding { row, sum } if *row == product.row => {
                *sum += product.value;
                None
            }
            state => {
                let completed = match *state {
                    RowState::Holding { row, sum } => Some(RowSum { row, sum }),
                    RowState::Idle => None,
                };
                *state = RowState::Holding {
                    row: product.row,
                    sum: product.value,
                };
                completed
            }
        }
    }

    /// Flush the held row, if any
    ///
    /// A held row is flushed even when its sum is zero.
    pub fn finish(self) -> Option<RowSum<T>> {
        match self.state {
            RowState::Holding { row, sum } => Some(RowSum { row, sum }),
            RowState::Idle => None,
        }
    }
}

/// Reduce a whole sequence at once
pub fn run_length_sums<T, I>(products: I) -> Vec<RowSum<T>>
where
    T: SpmvScalar,
    I: IntoIterator<Item = PartialProduct<T>>,
{
    let mut accumulator = RowAccumulator::new();
    let mut sums: Vec<RowSum<T>> = products
        .into_iter()
        .filter_map(|p| accumulator.accumulate(p))
        .collect();
    sums.extend(accumulator.finish());
    sums
}

/// Run one accumulator lane until its input is quiescent
///
/// Returns the number of row sums emitted.
pub fn accumulator_lane<T: SpmvScalar>(
    lane: usize,
    input: Receiver<PartialProduct<T>>,
    output: Sender<RowSum<T>>,
) -> SpmvResult<usize> {
    let mut accumulator = RowAccumulator::new();
    let mut flushes = 0;

    for product in input.iter() {
        if let Some(done) = accumulator.accumulate(product) {
            forward(&output, done, "row accumulate", lane)?;
            flushes += 1;
        }
    }
    if let Some(done) = accumulator.finish() {
        forward(&output, done, "row accumulate", lane)?;
        flushes += 1;
    }

    trace!(lane, flushes, "row accumulator quiescent");
    Ok(flushes)
}
