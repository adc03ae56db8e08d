//! Aggregators, one per (bank, group)
//!
//! Each aggregator owns a disjoint mutable view of the result block, so no
//! two lanes ever write the same address.

use crossbeam_channel::Receiver;
use ndarray::ArrayViewMut1;
use tracing::trace;

use crate::scalar::SpmvScalar;
use crate::stream::RowSum;

/// Add one row sum into the lane's C bank
pub fn add_row_sum<T: SpmvScalar>(lane: usize, c_bank: &mut ArrayViewMut1<'_, T>, row_sum: RowSum<T>) {
    let offset = row_sum.row as usize;
    assert!(
        offset < c_bank.len(),
        "aggregator lane {} got offset {} outside its {} active offsets",
        lane,
        offset,
        c_bank.len()
    );
    c_bank[offset] += row_sum.sum;
}

/// Run one aggregator until its input is quiescent
///
/// Returns the number of additions performed.
pub fn aggregate_lane<T: SpmvScalar>(
    lane: usize,
    mut c_bank: ArrayViewMut1<'_, T>,
    input: Receiver<RowSum<T>>,
) -> usize {
    let mut adds = 0;
    for row_sum in input.iter() {
        add_row_sum(lane, &mut c_bank, row_sum);
        adds += 1;
    }
    trace!(lane, adds, "aggregator quiescent");
    adds
}
