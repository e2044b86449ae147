//! In-memory transport
//!
//! Both halves live in-process. The `RemoteEnd` plays the remote peer: it
//! sees every frame the correlator writes and decides what comes back, in
//! which order, and when the connection dies. Used by tests and demos.

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;

use super::{FrameSink, Transport, TransportError};

type Inbound = Result<String, TransportError>;

/// Create a connected transport / remote pair.
pub fn pair() -> (Transport, RemoteEnd) {
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<Inbound>();

    let inbound = stream::unfold(inbound_rx, |mut rx| async move {
        rx.recv().await.map(|frame| (frame, rx))
    })
    .boxed();

    let transport = Transport::new(
        MemorySink {
            outbound: Some(outbound_tx),
        },
        inbound,
    );
    let remote = RemoteEnd {
        outbound: outbound_rx,
        inbound: Some(inbound_tx),
    };
    (transport, remote)
}

struct MemorySink {
    outbound: Option<mpsc::UnboundedSender<String>>,
}

#[async_trait]
impl FrameSink for MemorySink {
    async fn send(&mut self, frame: String) -> Result<(), TransportError> {
        let outbound = self.outbound.as_ref().ok_or(TransportError::Closed)?;
        outbound.send(frame).map_err(|_| TransportError::Closed)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.outbound = None;
        Ok(())
    }
}

/// The far side of a [`pair`]
pub struct RemoteEnd {
    outbound: mpsc::UnboundedReceiver<String>,
    inbound: Option<mpsc::UnboundedSender<Inbound>>,
}

impl RemoteEnd {
    /// Next frame written by the local side, decoded. `None` once the local
    /// sink is closed and drained.
    pub async fn recv(&mut self) -> Option<Value> {
        let frame = self.outbound.recv().await?;
        serde_json::from_str(&frame).ok()
    }

    /// Like `recv` but never waits.
    pub fn try_recv(&mut self) -> Option<Value> {
        let frame = self.outbound.try_recv().ok()?;
        serde_json::from_str(&frame).ok()
    }

    /// Deliver a message to the local side.
    pub fn push(&self, message: Value) {
        self.push_raw(message.to_string());
    }

    /// Deliver a frame verbatim, e.g. to test malformed input.
    pub fn push_raw(&self, frame: impl Into<String>) {
        if let Some(inbound) = &self.inbound {
            let _ = inbound.send(Ok(frame.into()));
        }
    }

    /// Reply to a request with `result`, echoing its id.
    pub fn respond(&self, request: &Value, result: Value) {
        self.push(serde_json::json!({ "id": request["id"], "result": result }));
    }

    /// End the inbound stream with an error.
    pub fn fail(&mut self, reason: impl Into<String>) {
        if let Some(inbound) = self.inbound.take() {
            let _ = inbound.send(Err(TransportError::Aborted(reason.into())));
        }
    }

    /// End the inbound stream cleanly.
    pub fn hang_up(&mut self) {
        self.inbound = None;
    }
}
