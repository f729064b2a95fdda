//! Duplex connection plumbing for the OpenAI Realtime API.
//!
//! The connection is split into an outbound [`EventSink`] and an inbound
//! [`EventStream`] so a single protocol loop can receive and send without
//! sharing the handle. [`WebSocketConnector`] opens the real connection;
//! [`memory`] provides an in-process transport with the same contract.

pub mod diagnostics;
pub mod error;
pub mod keepalive;
pub mod memory;
pub mod registry;
pub mod transport;
pub mod websocket;

pub use error::ConnectionError;
pub use keepalive::KeepAlive;
pub use registry::{Dispatch, EventRegistry, Handler};
pub use transport::{Connection, Connector, EventSink, EventStream, InboundFrame};
pub use websocket::WebSocketConnector;
