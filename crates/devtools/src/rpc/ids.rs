//! Request id allocation

use std::sync::atomic::{AtomicU64, Ordering};

use super::protocol::RequestId;

/// Hands out 1, 2, 3, ... up to `ceiling`, then starts over at 1.
///
/// Ids are not checked against requests still in flight. A collision needs
/// `ceiling` requests outstanding at once.
#[derive(Debug)]
pub struct IdSequence {
    last: AtomicU64,
    ceiling: RequestId,
}

impl IdSequence {
    pub fn new(ceiling: RequestId) -> Self {
        Self {
            last: AtomicU64::new(0),
            ceiling: ceiling.max(1),
        }
    }

    pub fn next_id(&self) -> RequestId {
        let ceiling = self.ceiling;
        let step = move |last: RequestId| if last >= ceiling { 1 } else { last + 1 };
        // fetch_update only fails when the closure returns None
        let previous = self
            .last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| Some(step(last)))
            .unwrap_or_else(|last| last);
        step(previous)
    }
}
