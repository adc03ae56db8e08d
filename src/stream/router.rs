//! Crossbar routers between lane stages
//!
//! The column router and the row router share one shape. A split reads items
//! from its source lanes and writes each to the crossbar queue
//! `[source][dest]`, where `dest` is the item's key modulo the width. Having
//! one queue per (source, dest) pair means two sources heading for the same
//! bank never contend for a queue. A merge per destination bank then drains
//! its column of the crossbar into one lane.
//!
//! Order is only kept per (source, dest) queue. How items from different
//! sources interleave at a merge depends on arrival timing.

use crossbeam_channel::{Receiver, Sender};
use tracing::trace;

use crate::error::SpmvResult;
use crate::stream::queue::{forward, poll, wait_any, Poll};
use crate::stream::{Entry, PartialProduct};

/// Bank key of an item routed by column
pub fn col_bank<T>(entry: &Entry<T>, width: usize) -> usize {
    entry.col as usize % width
}

/// Bank key of an item routed by row
pub fn row_bank<T>(product: &PartialProduct<T>, width: usize) -> usize {
    product.row as usize % width
}

/// Route one source lane's items into its row of the crossbar
///
/// `outputs[dest]` is the queue from this source to bank `dest`. Returns the
/// number of items routed. `outputs` is dropped on return, which closes
/// every queue of this source.
pub fn split<T, I, K>(
    stage: &'static str,
    source: usize,
    input: I,
    outputs: Vec<Sender<T>>,
    key: K,
) -> SpmvResult<usize>
where
    I: IntoIterator<Item = T>,
    K: Fn(&T) -> usize,
{
    let mut routed = 0;
    for item in input {
        let dest = key(&item) % outputs.len();
        forward(&outputs[dest], item, stage, source)?;
        routed += 1;
    }
    trace!(stage, source, routed, "split quiescent");
    Ok(routed)
}

/// Drain one destination bank's column of the crossbar into `output`
///
/// Polls the candidate queues round-robin, starting at the bank's own index
/// so that bank `b` favours source `b` first, and moves the cursor past
/// each source it serves. Parks on a select when every live queue is empty.
/// Ends once every candidate queue is closed and drained; dropping `output`
/// then closes this bank's lane.
pub fn merge<T>(
    stage: &'static str,
    bank: usize,
    inputs: Vec<Receiver<T>>,
    output: Sender<T>,
) -> SpmvResult<usize> {
    let width = inputs.len();
    let mut live = vec![true; width];
    let mut cursor = bank % width.max(1);
    let mut forwarded = 0;

    loop {
        let mut served = false;
        for step in 0..width {
            let source = (cursor + step) % width;
            if !live[source] {
                continue;
            }
            match poll(&inputs[source]) {
                Poll::Ready(item) => {
                    forward(&output, item, stage, bank)?;
                    forwarded += 1;
                    cursor = (source + 1) % width;
                    served = true;
                    break;
                }
                Poll::Idle => {}
                Poll::Quiescent => live[source] = false,
            }
        }

        if served {
            continue;
        }
        if !live.iter().any(|&l| l) {
            break;
        }

        let waiting: Vec<&Receiver<T>> = inputs
            .iter()
            .zip(&live)
            .filter(|(_, l)| **l)
            .map(|(rx, _)| rx)
            .collect();
        wait_any(&waiting);
    }

    trace!(stage, bank, forwarded, "merge quiescent");
    Ok(forwarded)
}
