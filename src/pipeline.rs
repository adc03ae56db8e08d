//! One block invocation of the streaming pipeline
//!
//! ```text
//! decoder -> column split -> column merge -> multiply
//!         -> row split -> row merge -> row interleave
//!         -> row accumulate -> aggregate
//! ```
//!
//! Every box is one scoped thread per lane, wired with bounded queues for the
//! duration of one (K-block, C-block) pair. The graph drains itself: each lane
//! ends at quiescence of its inputs and drops its outputs, which is the
//! end-of-stream token for the next stage.

use std::any::Any;
use std::ops::AddAssign;
use std::panic;
use std::thread::{self, ScopedJoinHandle};

use tracing::trace;

use crate::error::{SpmvError, SpmvResult};
use crate::matrix::banks::{ResidentVector, ResultBlock};
use crate::matrix::config::SpmvConfig;
use crate::scalar::SpmvScalar;
use crate::stream::accumulator::accumulator_lane;
use crate::stream::aggregate::aggregate_lane;
use crate::stream::codec::decoder_lane;
use crate::stream::interleave::RowInterleaver;
use crate::stream::multiply::multiply_lane;
use crate::stream::queue::{crossbar, lane_queues};
use crate::stream::router::{col_bank, merge, row_bank, split};
use crate::stream::{Entry, PartialProduct, RowSum};

/// Work counted by the lanes of one block
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockReport {
    /// Entries decoded from the stream
    pub entries: usize,
    /// Products emitted by the multiply lanes
    pub products: usize,
    /// Row sums emitted by the accumulators
    pub row_flushes: usize,
    /// Additions performed into the result block
    pub aggregator_adds: usize,
}

impl AddAssign for BlockReport {
    fn add_assign(&mut self, other: Self) {
        self.entries += other.entries;
        self.products += other.products;
        self.row_flushes += other.row_flushes;
        self.aggregator_adds += other.aggregator_adds;
    }
}

/// Collects lane outcomes, remembering the first panic and the first error
#[derive(Default)]
struct LaneJoin {
    panic: Option<Box<dyn Any + Send + 'static>>,
    error: Option<SpmvError>,
}

impl LaneJoin {
    /// Join every lane of a stage and sum their counts
    fn stage(&mut self, handles: Vec<ScopedJoinHandle<'_, SpmvResult<usize>>>) -> usize {
        let mut total = 0;
        for handle in handles {
            match handle.join() {
                Ok(Ok(count)) => total += count,
                Ok(Err(e)) => {
                    self.error.get_or_insert(e);
                }
                Err(payload) => {
                    self.panic.get_or_insert(payload);
                }
            }
        }
        total
    }
}

/// Run the pipeline over one block's words
///
/// `b` must hold the K-block and `c` the loaded C-block. The block is done
/// when this returns; every lane has been joined. A lane that panicked is
/// re-raised here after the others have drained.
///
/// # Arguments
///
/// * `config` - Bank geometry and queue depths
/// * `b` - Resident B banks, read-only for the whole block
/// * `c` - Result banks, one disjoint lane per aggregator
/// * `words` - The block's wide words, whole entries only
pub fn run_block<T: SpmvScalar>(
    config: &SpmvConfig,
    b: &ResidentVector<T>,
    c: &mut ResultBlock<T>,
    words: &[T],
) -> SpmvResult<BlockReport> {
    let width = config.width;
    let groups = config.mac_groups;
    let layout = config.layout;
    let deep = config.fifo_depth_deep;
    let shallow = config.fifo_depth_shallow;
    let active_offsets = c.active_offsets();

    let (decode_tx, decode_rx) = lane_queues::<Entry<T>>(width, shallow);
    let (col_split_tx, col_merge_rx) = crossbar::<Entry<T>>(width, deep);
    let (multiply_tx, multiply_rx) = lane_queues::<Entry<T>>(width, shallow);
    let (product_tx, product_rx) = lane_queues::<PartialProduct<T>>(width, shallow);
    let (row_split_tx, row_merge_rx) = crossbar::<PartialProduct<T>>(width, deep);
    let (interleave_tx, interleave_rx) = lane_queues::<PartialProduct<T>>(width, shallow);
    let (accumulate_tx, accumulate_rx) = lane_queues::<PartialProduct<T>>(width * groups, shallow);
    let (aggregate_tx, aggregate_rx) = lane_queues::<RowSum<T>>(width * groups, shallow);
    let c_lanes = c.lanes_mut();

    let (report, join) = thread::scope(|s| {
        let decoder = s.spawn(move || decoder_lane(words, layout, decode_tx));

        let col_splits: Vec<_> = decode_rx
            .into_iter()
            .zip(col_split_tx)
            .enumerate()
            .map(|(source, (input, outputs))| {
                s.spawn(move || split("column split", source, input.iter(), outputs, |e| col_bank(e, width)))
            })
            .collect();

        let col_merges: Vec<_> = col_merge_rx
            .into_iter()
            .zip(multiply_tx)
            .enumerate()
            .map(|(bank, (inputs, output))| s.spawn(move || merge("column merge", bank, inputs, output)))
            .collect();

        let multiplies: Vec<_> = multiply_rx
            .into_iter()
            .zip(product_tx)
            .enumerate()
            .map(|(bank, (input, output))| {
                let b_bank = b.bank(bank);
                s.spawn(move || multiply_lane(bank, width, b_bank, input, output))
            })
            .collect();

        let row_splits: Vec<_> = product_rx
            .into_iter()
            .zip(row_split_tx)
            .enumerate()
            .map(|(source, (input, outputs))| {
                s.spawn(move || split("row split", source, input.iter(), outputs, |p| row_bank(p, width)))
            })
            .collect();

        let row_merges: Vec<_> = row_merge_rx
            .into_iter()
            .zip(interleave_tx)
            .enumerate()
            .map(|(bank, (inputs, output))| s.spawn(move || merge("row merge", bank, inputs, output)))
            .collect();

        // Interleaver `bank` feeds accumulator lanes `bank * groups ..`
        let mut group_tx = accumulate_tx.into_iter();
        let interleavers: Vec<_> = interleave_rx
            .into_iter()
            .enumerate()
            .map(|(bank, input)| {
                let outputs: Vec<_> = group_tx.by_ref().take(groups).collect();
                let interleaver = RowInterleaver::new(bank, width, groups, active_offsets);
                s.spawn(move || interleaver.run(input, outputs))
            })
            .collect();

        let accumulators: Vec<_> = accumulate_rx
            .into_iter()
            .zip(aggregate_tx)
            .enumerate()
            .map(|(lane, (input, output))| s.spawn(move || accumulator_lane(lane, input, output)))
            .collect();

        let aggregators: Vec<_> = aggregate_rx
            .into_iter()
            .zip(c_lanes)
            .enumerate()
            .map(|(lane, (input, c_bank))| s.spawn(move || Ok::<_, SpmvError>(aggregate_lane(lane, c_bank, input))))
            .collect();

        let mut join = LaneJoin::default();
        let entries = join.stage(vec![decoder]);
        join.stage(col_splits);
        join.stage(col_merges);
        let products = join.stage(multiplies);
        join.stage(row_splits);
        join.stage(row_merges);
        join.stage(interleavers);
        let row_flushes = join.stage(accumulators);
        let aggregator_adds = join.stage(aggregators);

        let report = BlockReport {
            entries,
            products,
            row_flushes,
            aggregator_adds,
        };
        (report, join)
    });

    if let Some(payload) = join.panic {
        panic::resume_unwind(payload);
    }
    if let Some(e) = join.error {
        return Err(e);
    }

    trace!(?report, "block pipeline drained");
    Ok(report)
}
