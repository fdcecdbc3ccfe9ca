use crate::http::same_origin;
use http::{HeaderMap, Request};
use std::time::Duration;

const DEFAULT_BUFFER_SIZE: usize = 4096;

pub struct WsConfig {
    /// Mask outgoing frames. Required for clients, forbidden for servers.
    pub mask: bool,
    /// Capacity of the buffered reader sitting between the transport and the frame decoder.
    pub read_buffer_size: usize,
    /// Payload bytes collected before an outgoing message is flushed as a frame.
    pub write_buffer_size: usize,
    /// Upper bound for sending the close frame when closing.
    pub close_timeout: Duration,
    /// Headers attached verbatim to the upgrade response (server only).
    pub extra_headers: HeaderMap,
    /// Decides whether an upgrade request is accepted based on its origin (server only).
    pub check_origin: fn(&Request<()>) -> bool,
    _private: (),
}

impl WsConfig {
    pub fn client() -> Self {
        Self {
            mask: true,
            read_buffer_size: DEFAULT_BUFFER_SIZE,
            write_buffer_size: DEFAULT_BUFFER_SIZE,
            close_timeout: Duration::from_secs(1),
            extra_headers: HeaderMap::new(),
            check_origin: same_origin,
            _private: (),
        }
    }
    pub fn server() -> Self {
        Self {
            mask: false,
            ..Self::client()
        }
    }
    /// Sets both buffer sizes. Zero selects the default size.
    pub fn with_buffer_sizes(mut self, read_buffer_size: usize, write_buffer_size: usize) -> Self {
        self.read_buffer_size = read_buffer_size;
        self.write_buffer_size = write_buffer_size;
        self
    }
    pub(crate) fn read_capacity(&self) -> usize {
        match self.read_buffer_size {
            0 => DEFAULT_BUFFER_SIZE,
            n => n,
        }
    }
    pub(crate) fn write_capacity(&self) -> usize {
        match self.write_buffer_size {
            0 => DEFAULT_BUFFER_SIZE,
            n => n,
        }
    }
}
