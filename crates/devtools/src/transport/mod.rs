//! Transport - the duplex frame channel under the correlator
//!
//! A transport is split in two halves up front: a sink that callers write
//! through, and a stream that exactly one reader task consumes. The
//! correlator never hands either half out.

pub mod memory;
pub mod websocket;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Invalid endpoint: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Unsupported endpoint scheme: {0}")]
    UnsupportedScheme(String),

    #[error("Connection closed")]
    Closed,

    #[error("Connection aborted: {0}")]
    Aborted(String),
}

/// Write half. Frames are complete JSON texts.
#[async_trait]
pub trait FrameSink: Send {
    async fn send(&mut self, frame: String) -> Result<(), TransportError>;

    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Read half. `None` is an orderly close, `Err` an abnormal one.
pub type FrameStream = BoxStream<'static, Result<String, TransportError>>;

/// An opened connection, ready to be handed to a correlator
pub struct Transport {
    pub sink: Box<dyn FrameSink>,
    pub stream: FrameStream,
}

impl Transport {
    pub fn new(sink: impl FrameSink + 'static, stream: FrameStream) -> Self {
        Self {
            sink: Box::new(sink),
            stream,
        }
    }
}
