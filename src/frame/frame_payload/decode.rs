use crate::frame::mask;
use futures::prelude::*;
use std::convert::TryFrom;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Resumable reader for a single frame payload. Unmasks the bytes it hands out.
#[derive(Debug)]
pub struct FramePayloadReaderState {
    mask: [u8; 4],
    payload_len: u64,
    completion: u64,
}

impl FramePayloadReaderState {
    pub fn new(mask: [u8; 4], payload_len: u64) -> Self {
        Self {
            mask,
            payload_len,
            completion: 0,
        }
    }
    pub fn poll_read<T: AsyncRead + Unpin>(
        &mut self,
        transport: &mut T,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<io::Result<usize>> {
        if self.payload_len <= self.completion || buf.is_empty() {
            return Poll::Ready(Ok(0));
        }
        let max = match usize::try_from(self.payload_len - self.completion) {
            Ok(remainder) => remainder.min(buf.len()),
            Err(_) => buf.len(),
        };
        match Pin::new(transport).poll_read(cx, &mut buf[0..max]) {
            Poll::Ready(Ok(0)) => Poll::Ready(Err(io::ErrorKind::UnexpectedEof.into())),
            Poll::Ready(Ok(n)) => {
                mask(self.mask, self.completion as usize, &mut buf[0..n]);
                self.completion += n as u64;
                Poll::Ready(Ok(n))
            }
            p => p,
        }
    }
    pub fn finished(&self) -> bool {
        self.payload_len == self.completion
    }
}

#[cfg(test)]
mod tests {
    use crate::frame::{mask, FramePayloadReaderState};
    use futures::executor::block_on;
    use futures::future::poll_fn;

    #[test]
    fn unmasks_across_partial_reads() {
        let key = [9, 8, 7, 6];
        let mut wire = b"payload!tail".to_vec();
        mask(key, 0, &mut wire[0..8]);
        let mut transport: &[u8] = &wire;
        let mut state = FramePayloadReaderState::new(key, 8);
        let mut out = Vec::new();
        while !state.finished() {
            let mut buf = [0u8; 3];
            let n = block_on(poll_fn(|cx| state.poll_read(&mut transport, cx, &mut buf))).unwrap();
            out.extend_from_slice(&buf[0..n]);
        }
        assert_eq!(out, b"payload!");
        assert_eq!(transport, b"tail");
    }
}
