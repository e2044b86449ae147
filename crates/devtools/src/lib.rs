//! Correlated request/response client for remote-control protocols
//!
//! Drives a JSON-RPC-2.0 style endpoint (a browser's DevTools socket, for
//! instance) over one persistent duplex connection. Requests get ids,
//! replies are matched back to the caller that asked, and everything else
//! lands in a bounded buffer callers can drain or wait on.
//!
//! ```text
//! caller ─▶ Correlator::send ─▶ FrameSink
//!                 ▲
//!   waiter ◀──────┴── reader task ◀── FrameStream
//!                         └──▶ SkipBuffer (unmatched)
//! ```

pub mod config;
pub mod error;
pub mod rpc;
pub mod transport;

pub use config::CorrelatorConfig;
pub use error::{Error, Result, UsageError};
pub use rpc::{
    ConnectionState, Correlator, Domain, InboundMessage, MethodCall, ProtocolError, Reply,
    RequestId,
};
pub use transport::{FrameSink, FrameStream, Transport, TransportError};
