//! Correlated JSON-RPC over a single connection
//!
//! Core principle: one reader, per-id waiters, bounded buffer for the rest.

pub mod client;
pub mod dispatch;
pub mod ids;
mod pending;
pub mod protocol;
pub mod skip_buffer;

pub use client::{Correlator, Reply};
pub use dispatch::{translate, Domain, MethodCall};
pub use pending::ConnectionState;
pub use protocol::{InboundMessage, OutboundRequest, ProtocolError, RequestId};
