use crate::frame::{FrameHead, FrameHeadParseError};
use futures::prelude::*;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

#[derive(thiserror::Error, Debug)]
pub enum FrameDecodeError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("parse error: {0}")]
    ParseErr(#[from] FrameHeadParseError),
}

/// Resumable frame head decoder. Bytes read so far are kept across `Poll::Pending`, so an
/// interrupted decode continues where it left off.
#[derive(Debug)]
pub struct FrameHeadDecodeState {
    buffer: [u8; 14],
    buffer_len: usize,
}

impl FrameHeadDecodeState {
    pub fn new() -> Self {
        Self {
            buffer: [0u8; 14],
            buffer_len: 0,
        }
    }
    // True if no byte of the next head has been consumed yet.
    pub fn is_empty(&self) -> bool {
        self.buffer_len == 0
    }
    pub fn poll<T: AsyncRead + Unpin>(
        &mut self,
        transport: &mut T,
        cx: &mut Context<'_>,
    ) -> Poll<Result<FrameHead, FrameDecodeError>> {
        loop {
            let min = match FrameHead::parse(&self.buffer[0..self.buffer_len]) {
                Ok(head) => {
                    self.buffer_len = 0;
                    return Poll::Ready(Ok(head));
                }
                Err(FrameHeadParseError::Incomplete(min)) => min,
                Err(err) => return Poll::Ready(Err(err.into())),
            };
            let buffer_len = self.buffer_len;
            let read_window = &mut self.buffer[buffer_len..min];
            match Pin::new(&mut *transport).poll_read(cx, read_window) {
                Poll::Ready(Ok(0)) => {
                    return Poll::Ready(Err(FrameDecodeError::Io(
                        io::ErrorKind::UnexpectedEof.into(),
                    )))
                }
                Poll::Ready(Ok(n)) => self.buffer_len += n,
                Poll::Ready(Err(err)) => return Poll::Ready(Err(err.into())),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

impl Default for FrameHeadDecodeState {
    fn default() -> Self {
        Self::new()
    }
}
