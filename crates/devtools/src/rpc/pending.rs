//! Waiter registry and unmatched-message buffer
//!
//! The reader's "find a waiter, else buffer it" and a caller's "check the
//! buffer, else register" both run under the buffer lock, so a message can
//! never fall between the two.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{oneshot, Notify};
use tokio::time::Instant;

use super::protocol::{InboundMessage, RequestId};
use super::skip_buffer::{Arrival, SkipBuffer};
use crate::error::{Error, Result, UsageError};

/// Lifecycle of a correlator's connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Open,
    /// No new sends or waits; the reader is winding down.
    Closing,
    Closed,
}

impl ConnectionState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => ConnectionState::Open,
            1 => ConnectionState::Closing,
            _ => ConnectionState::Closed,
        }
    }
}

pub(crate) struct Inbox {
    /// Key: request id, Value: oneshot sender for the stamped response
    waiters: DashMap<RequestId, oneshot::Sender<(Arrival, InboundMessage)>>,
    skipped: Mutex<SkipBuffer>,
    /// Signalled whenever something lands in `skipped`, and on shutdown
    arrivals: Notify,
    state: AtomicU8,
}

/// Outcome of registering interest in an id
pub(crate) enum Registration {
    /// Already sitting in the buffer
    Ready(InboundMessage),
    Waiting(PendingWait),
}

impl Registration {
    pub(crate) async fn resolve(self, timeout: Duration) -> Result<InboundMessage> {
        match self {
            Registration::Ready(message) => Ok(message),
            Registration::Waiting(wait) => wait.wait(timeout).await,
        }
    }
}

impl Inbox {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            waiters: DashMap::new(),
            skipped: Mutex::new(SkipBuffer::new(capacity)),
            arrivals: Notify::new(),
            state: AtomicU8::new(ConnectionState::Open as u8),
        }
    }

    fn buffer(&self) -> MutexGuard<'_, SkipBuffer> {
        self.skipped.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub(crate) fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Open -> Closing. Returns false if already past Open.
    pub(crate) fn begin_closing(&self) -> bool {
        self.state
            .compare_exchange(
                ConnectionState::Open as u8,
                ConnectionState::Closing as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }

    /// Fail every pending wait and go terminal. Idempotent.
    pub(crate) fn shut_down(&self) {
        self.begin_closing();
        {
            let _buffer = self.buffer();
            // Dropping the senders wakes each waiter with ConnectionClosed
            self.waiters.clear();
        }
        self.state.store(ConnectionState::Closed as u8, Ordering::SeqCst);
        self.arrivals.notify_waiters();
    }

    /// Take a buffered message for `id`, or register a waiter for it.
    pub(crate) fn register(self: &Arc<Self>, id: RequestId) -> Result<Registration> {
        let rx = {
            let mut buffer = self.buffer();
            if !self.is_open() {
                return Err(Error::ConnectionClosed);
            }
            if let Some(message) = buffer.take(id) {
                tracing::debug!(id, "Response found in skip buffer");
                return Ok(Registration::Ready(message));
            }

            let (tx, rx) = oneshot::channel();
            match self.waiters.entry(id) {
                Entry::Occupied(mut entry) => {
                    // A closed sender is a leftover from a dropped wait
                    if !entry.get().is_closed() {
                        return Err(UsageError::AlreadyAwaiting(id).into());
                    }
                    entry.insert(tx);
                }
                Entry::Vacant(entry) => {
                    entry.insert(tx);
                }
            }
            rx
        };

        Ok(Registration::Waiting(PendingWait {
            id,
            rx,
            inbox: Arc::clone(self),
        }))
    }

    /// Route one inbound message: to its waiter if there is one, otherwise
    /// into the skip buffer.
    pub(crate) fn deliver(&self, message: InboundMessage) {
        let mut buffer = self.buffer();
        let arrival = buffer.stamp();
        let message = match message.id().and_then(|id| self.waiters.remove(&id)) {
            Some((_, tx)) => match tx.send((arrival, message)) {
                Ok(()) => return,
                // Waiter gave up between lookup and send
                Err((_, message)) => message,
            },
            None => message,
        };
        self.file(&mut buffer, arrival, message);
        drop(buffer);
        self.arrivals.notify_waiters();
    }

    fn file(&self, buffer: &mut SkipBuffer, arrival: Arrival, message: InboundMessage) {
        if let Some(error) = message.error() {
            tracing::warn!(
                id = ?message.id(),
                code = error.code,
                message = %error.message,
                "Unmatched message carries an error"
            );
        }
        if let Some(evicted) = buffer.insert(arrival, message) {
            tracing::debug!(
                id = ?evicted.id(),
                method = ?evicted.method(),
                capacity = buffer.capacity(),
                "Skip buffer full, evicted oldest message"
            );
        }
    }

    fn file_unmatched(&self, arrival: Arrival, message: InboundMessage) {
        {
            let mut buffer = self.buffer();
            self.file(&mut buffer, arrival, message);
        }
        self.arrivals.notify_waiters();
    }

    /// Remove and return the oldest buffered message matching `pred`,
    /// waiting for new arrivals until `timeout` runs out.
    pub(crate) async fn next_unmatched<F>(
        &self,
        timeout: Duration,
        mut pred: F,
    ) -> Result<InboundMessage>
    where
        F: FnMut(&InboundMessage) -> bool,
    {
        // None when the timeout is too large to represent: wait without one
        let deadline = Instant::now().checked_add(timeout);
        loop {
            let notified = self.arrivals.notified();
            tokio::pin!(notified);
            // Register before checking so an arrival in between still wakes us
            notified.as_mut().enable();

            if !self.is_open() {
                return Err(Error::ConnectionClosed);
            }
            let found = self.buffer().take_first(&mut pred);
            if let Some(message) = found {
                return Ok(message);
            }
            match deadline {
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        return Err(Error::Timeout(timeout));
                    }
                }
                None => notified.await,
            }
        }
    }

    pub(crate) fn drain(&self) -> Vec<InboundMessage> {
        self.buffer().drain()
    }

    pub(crate) fn buffered(&self) -> usize {
        self.buffer().len()
    }

    #[cfg(test)]
    fn waiting(&self) -> usize {
        self.waiters.len()
    }
}

/// A registered wait for one request id.
///
/// Dropping it (timeout, cancellation) unregisters the id. A response that
/// was handed over but never read goes back into the skip buffer at the
/// position its arrival earned it.
pub(crate) struct PendingWait {
    id: RequestId,
    rx: oneshot::Receiver<(Arrival, InboundMessage)>,
    inbox: Arc<Inbox>,
}

impl PendingWait {
    pub(crate) async fn wait(mut self, timeout: Duration) -> Result<InboundMessage> {
        match tokio::time::timeout(timeout, &mut self.rx).await {
            Ok(Ok((_, message))) => Ok(message),
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) => {
                tracing::debug!(id = self.id, ?timeout, "Timed out waiting for response");
                Err(Error::Timeout(timeout))
            }
        }
    }
}

impl Drop for PendingWait {
    fn drop(&mut self) {
        self.rx.close();
        let unread = self.rx.try_recv().ok();
        self.inbox
            .waiters
            .remove_if(&self.id, |_, tx| tx.is_closed());
        if let Some((arrival, message)) = unread {
            self.inbox.file_unmatched(arrival, message);
        }
    }
}
