//! Websocket connections used as plain byte streams.
//!
//! [`WsStream`] wraps a [`WsConnection`] and hides message boundaries, control frames and
//! opcodes from the caller: writes become binary messages, reads return the payload of inbound
//! binary messages.

pub mod connection;
pub mod frame;
pub mod http;
pub mod message;
pub mod stream;

pub use connection::{is_closed, is_timeout, Transport, WsConfig, WsConnection};
pub use message::WsMessageKind;
pub use stream::{WsStream, WsStreamError};
