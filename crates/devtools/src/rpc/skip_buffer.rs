//! Bounded FIFO of messages nobody was waiting for

use std::collections::VecDeque;

use super::protocol::{InboundMessage, RequestId};

/// Arrival stamp. Lower means read from the transport earlier.
pub type Arrival = u64;

#[derive(Debug)]
pub struct SkipBuffer {
    messages: VecDeque<(Arrival, InboundMessage)>,
    capacity: usize,
    next_arrival: Arrival,
}

impl SkipBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            messages: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
            next_arrival: 0,
        }
    }

    /// Hand out the next arrival stamp.
    pub fn stamp(&mut self) -> Arrival {
        let arrival = self.next_arrival;
        self.next_arrival += 1;
        arrival
    }

    /// Stamp and append at the tail. Returns the evicted head when full.
    pub fn push(&mut self, message: InboundMessage) -> Option<InboundMessage> {
        let arrival = self.stamp();
        self.insert(arrival, message)
    }

    /// File a message at its arrival position. Usually that is the tail; a
    /// message that was handed to a waiter and given back lands behind
    /// everything that arrived before it and ahead of everything after.
    pub fn insert(&mut self, arrival: Arrival, message: InboundMessage) -> Option<InboundMessage> {
        let index = self
            .messages
            .iter()
            .rposition(|(stamp, _)| *stamp < arrival)
            .map_or(0, |i| i + 1);
        self.messages.insert(index, (arrival, message));

        if self.messages.len() > self.capacity {
            self.messages.pop_front().map(|(_, evicted)| evicted)
        } else {
            None
        }
    }

    /// Remove the oldest message with this id. Order of the rest is kept.
    pub fn take(&mut self, id: RequestId) -> Option<InboundMessage> {
        self.take_first(|message| message.id() == Some(id))
    }

    pub fn take_first<F>(&mut self, mut matches: F) -> Option<InboundMessage>
    where
        F: FnMut(&InboundMessage) -> bool,
    {
        let index = self.messages.iter().position(|(_, message)| matches(message))?;
        self.messages.remove(index).map(|(_, message)| message)
    }

    pub fn drain(&mut self) -> Vec<InboundMessage> {
        self.messages.drain(..).map(|(_, message)| message).collect()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
