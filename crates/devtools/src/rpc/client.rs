//! Correlator - request/response matching over one shared connection
//!
//! Design decisions:
//! 1. One transport per correlator, one background reader per transport
//! 2. Per-id oneshot waiters; the reader wakes exactly the right caller
//! 3. Messages nobody waits for go into a bounded skip buffer, oldest evicted
//! 4. Timeouts are ordinary results. Transport death is fatal.
//! 5. Protocol `error` fields are logged, not raised, unless `strict_errors`

use futures_util::StreamExt;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::ids::IdSequence;
use super::pending::{ConnectionState, Inbox};
use super::protocol::{InboundMessage, OutboundRequest, RequestId};
use crate::config::CorrelatorConfig;
use crate::error::{Error, Result, UsageError};
use crate::transport::{self, FrameSink, FrameStream, Transport};

/// What `send` produced
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Fire-and-forget: the id that went out, nothing registered for it
    Sent(RequestId),
    /// The matched reply, unmodified
    Response(InboundMessage),
}

impl Reply {
    pub fn into_response(self) -> Option<InboundMessage> {
        match self {
            Reply::Response(message) => Some(message),
            Reply::Sent(_) => None,
        }
    }
}

/// Correlator - owns the transport and matches replies to requests
pub struct Correlator {
    ids: IdSequence,

    inbox: Arc<Inbox>,

    /// Transport write half
    sink: tokio::sync::Mutex<Box<dyn FrameSink>>,

    shutdown_tx: mpsc::Sender<()>,

    reader: Mutex<Option<JoinHandle<()>>>,

    /// Set by `close()`, as opposed to the transport dying
    closed_by_caller: AtomicBool,

    config: CorrelatorConfig,
}

impl Correlator {
    /// Take ownership of an opened transport and spawn its reader on `runtime`.
    pub fn start(runtime: &Handle, transport: Transport, config: CorrelatorConfig) -> Arc<Self> {
        let config = config.normalized();
        let inbox = Arc::new(Inbox::new(config.skip_buffer_capacity));
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);

        let reader = runtime.spawn(read_loop(inbox.clone(), transport.stream, shutdown_rx));

        Arc::new(Self {
            ids: IdSequence::new(config.id_ceiling),
            inbox,
            sink: tokio::sync::Mutex::new(transport.sink),
            shutdown_tx,
            reader: Mutex::new(Some(reader)),
            closed_by_caller: AtomicBool::new(false),
            config,
        })
    }

    /// Open a WebSocket endpoint and start correlating on it.
    pub async fn connect(
        runtime: &Handle,
        endpoint: &str,
        config: CorrelatorConfig,
    ) -> Result<Arc<Self>> {
        let transport = transport::websocket::connect(endpoint).await?;
        Ok(Self::start(runtime, transport, config))
    }

    pub fn config(&self) -> &CorrelatorConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        self.inbox.state()
    }

    pub fn next_id(&self) -> RequestId {
        self.ids.next_id()
    }

    /// Send a request. With `wants_response` this waits for the reply using
    /// the default timeout; without it the id is returned right away.
    pub async fn send(
        &self,
        method: impl Into<String>,
        params: Option<Value>,
        wants_response: bool,
    ) -> Result<Reply> {
        if wants_response {
            self.call(method, params).await.map(Reply::Response)
        } else {
            self.notify(method, params).await.map(Reply::Sent)
        }
    }

    /// Send and wait for the reply with the default timeout.
    pub async fn call(
        &self,
        method: impl Into<String>,
        params: Option<Value>,
    ) -> Result<InboundMessage> {
        self.call_with_timeout(method, params, self.config.default_timeout())
            .await
    }

    pub async fn call_with_timeout(
        &self,
        method: impl Into<String>,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<InboundMessage> {
        if self.closed_by_caller.load(Ordering::SeqCst) {
            return Err(UsageError::SendAfterClose.into());
        }
        self.ensure_open()?;

        let id = self.next_id();
        // Registered before writing so even an instant reply finds its waiter
        let registration = self.inbox.register(id)?;
        self.write(OutboundRequest::new(id, method, params)).await?;

        let message = registration.resolve(timeout).await?;
        self.check_error(id, message)
    }

    /// Fire-and-forget. A reply, if the remote sends one, ends up unmatched.
    pub async fn notify(
        &self,
        method: impl Into<String>,
        params: Option<Value>,
    ) -> Result<RequestId> {
        self.ensure_open()?;

        let id = self.next_id();
        self.write(OutboundRequest::new(id, method, params)).await?;
        Ok(id)
    }

    /// Wait for the reply to `id`, checking already-buffered messages first.
    pub async fn await_response(
        &self,
        id: RequestId,
        timeout: Duration,
    ) -> Result<InboundMessage> {
        let message = self.inbox.register(id)?.resolve(timeout).await?;
        self.check_error(id, message)
    }

    /// Oldest unmatched message, waiting up to `timeout` for one to arrive.
    pub async fn wait_message(&self, timeout: Duration) -> Result<InboundMessage> {
        self.inbox.next_unmatched(timeout, |_| true).await
    }

    /// Oldest unmatched message whose `method` is `method`. Everything else
    /// stays buffered in order.
    pub async fn wait_event(&self, method: &str, timeout: Duration) -> Result<InboundMessage> {
        self.inbox
            .next_unmatched(timeout, |message| message.method() == Some(method))
            .await
    }

    /// Drain every unmatched message, oldest first.
    pub fn pop_messages(&self) -> Vec<InboundMessage> {
        self.inbox.drain()
    }

    /// Number of unmatched messages currently held
    pub fn buffered(&self) -> usize {
        self.inbox.buffered()
    }

    /// Stop the reader and close the transport. Pending waits fail with
    /// ConnectionClosed.
    pub async fn close(&self) {
        self.closed_by_caller.store(true, Ordering::SeqCst);
        self.inbox.begin_closing();
        let _ = self.shutdown_tx.try_send(());

        if let Err(e) = self.sink.lock().await.close().await {
            tracing::debug!(error = %e, "Transport sink close failed");
        }

        let reader = self
            .reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(reader) = reader {
            if let Err(e) = reader.await {
                tracing::error!(error = %e, "Reader task failed");
            }
        }

        self.inbox.shut_down();
    }

    fn ensure_open(&self) -> Result<()> {
        if self.inbox.is_open() {
            Ok(())
        } else {
            Err(Error::ConnectionClosed)
        }
    }

    async fn write(&self, request: OutboundRequest) -> Result<()> {
        let frame = request.encode()?;

        let mut sink = self.sink.lock().await;
        // close() may have won the race for the sink
        self.ensure_open()?;
        if let Err(e) = sink.send(frame).await {
            drop(sink);
            tracing::error!(id = request.id, error = %e, "Transport write failed");
            self.inbox.begin_closing();
            let _ = self.shutdown_tx.try_send(());
            return Err(Error::ConnectionClosed);
        }
        drop(sink);

        tracing::debug!(id = request.id, method = %request.method, "Request sent");
        Ok(())
    }

    fn check_error(&self, id: RequestId, message: InboundMessage) -> Result<InboundMessage> {
        let Some(error) = message.error() else {
            return Ok(message);
        };

        if self.config.strict_errors {
            return Err(Error::Protocol {
                code: error.code,
                message: error.message,
            });
        }

        tracing::warn!(
            id,
            code = error.code,
            message = %error.message,
            "Response carries a protocol error"
        );
        Ok(message)
    }
}

/// Single reader of the inbound stream. Runs until the stream ends, errors,
/// or the correlator asks it to stop.
async fn read_loop(
    inbox: Arc<Inbox>,
    mut stream: FrameStream,
    mut shutdown_rx: mpsc::Receiver<()>,
) {
    tracing::debug!("Reader started");
    loop {
        tokio::select! {
            frame = stream.next() => {
                match frame {
                    Some(Ok(text)) => match InboundMessage::decode(&text) {
                        Ok(message) => inbox.deliver(message),
                        Err(e) => {
                            tracing::warn!(
                                error = %e,
                                frame_len = text.len(),
                                "Skipping malformed frame"
                            );
                        }
                    },
                    Some(Err(e)) => {
                        tracing::error!(error = %e, "Transport failed");
                        break;
                    }
                    None => {
                        tracing::info!("Transport closed");
                        break;
                    }
                }
            }
            _ = shutdown_rx.recv() => {
                tracing::info!("Shutdown signal received");
                break;
            }
        }
    }

    inbox.shut_down();
}
