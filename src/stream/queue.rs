//! Bounded lane queues and the quiescence protocol
//!
//! A queue is a crossbeam bounded channel. Writers block once it is full,
//! which is the backpressure between lanes. Dropping the last sender of a
//! queue is its end-of-stream token.
//!
//! Quiescence means "token received AND queue empty". crossbeam reports a
//! disconnected channel only after its buffer has been drained, so a token
//! can never overtake data still sitting in the queue. Single-input lanes get
//! this for free from `Receiver::iter`, which ends exactly at quiescence.

use crossbeam_channel::{bounded, Receiver, Select, Sender, TryRecvError};

use crate::error::{SpmvError, SpmvResult};

/// Outcome of a non-blocking read
#[derive(Debug, PartialEq)]
pub enum Poll<T> {
    /// An item was taken from the queue
    Ready(T),
    /// Nothing queued yet, the writer is still live
    Idle,
    /// Writer gone and queue drained
    Quiescent,
}

/// Read without blocking
pub fn poll<T>(rx: &Receiver<T>) -> Poll<T> {
    match rx.try_recv() {
        Ok(item) => Poll::Ready(item),
        Err(TryRecvError::Empty) => Poll::Idle,
        Err(TryRecvError::Disconnected) => Poll::Quiescent,
    }
}

/// Park until any of the given queues has an item or becomes quiescent
pub fn wait_any<T>(inputs: &[&Receiver<T>]) {
    if inputs.is_empty() {
        return;
    }
    let mut select = Select::new();
    for rx in inputs {
        select.recv(rx);
    }
    select.ready();
}

/// Blocking write, mapping a vanished reader to a lane error
pub fn forward<T>(tx: &Sender<T>, item: T, stage: &'static str, lane: usize) -> SpmvResult<()> {
    tx.send(item)
        .map_err(|_| SpmvError::LaneDisconnected { stage, lane })
}

/// One bounded queue per lane
pub fn lane_queues<T>(lanes: usize, depth: usize) -> (Vec<Sender<T>>, Vec<Receiver<T>>) {
    (0..lanes).map(|_| bounded(depth)).unzip()
}

/// `width x width` crossbar of bounded queues
///
/// Returns senders indexed `[source][dest]` and receivers indexed
/// `[dest][source]`, so each split lane owns one sender row and each merge
/// lane owns one receiver row.
#[allow(clippy::type_complexity)]
pub fn crossbar<T>(width: usize, depth: usize) -> (Vec<Vec<Sender<T>>>, Vec<Vec<Receiver<T>>>) {
    let mut senders: Vec<Vec<Sender<T>>> = (0..width).map(|_| Vec::with_capacity(width)).collect();
    let mut receivers: Vec<Vec<Receiver<T>>> = (0..width).map(|_| Vec::with_capacity(width)).collect();

    for source in senders.iter_mut() {
        for dest in receivers.iter_mut() {
            let (tx, rx) = bounded(depth);
            source.push(tx);
            dest.push(rx);
        }
    }

    (senders, receivers)
}
