use crate::connection::{Transport, WsConnection, WsConnectionError};
use crate::frame::{FrameEncoder, Opcode, WsControlFramePayload};
use crate::message::WsMessageKind;
use futures::future::poll_fn;
use futures::io::WriteHalf;
use futures::lock::MutexGuard;
use futures::prelude::*;
use futures::ready;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Sending half of a connection. Encoded frames wait in `pending` until fully written, so a write
/// interrupted by a deadline never leaves a torn frame behind: the next flush completes it.
pub(crate) struct WriteSide<T: Transport> {
    pub(crate) transport: WriteHalf<T>,
    encoder: FrameEncoder,
    pending: Vec<u8>,
    written: usize,
    close_sent: bool,
}

impl<T: Transport> WriteSide<T> {
    pub fn new(transport: WriteHalf<T>, mask: bool) -> Self {
        Self {
            transport,
            encoder: FrameEncoder::new(mask),
            pending: Vec::new(),
            written: 0,
            close_sent: false,
        }
    }
    fn poll_flush_pending(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        while self.written < self.pending.len() {
            let remaining = &self.pending[self.written..];
            match ready!(Pin::new(&mut self.transport).poll_write(cx, remaining))? {
                0 => return Poll::Ready(Err(io::ErrorKind::WriteZero.into())),
                n => self.written += n,
            }
        }
        if !self.pending.is_empty() {
            ready!(Pin::new(&mut self.transport).poll_flush(cx))?;
            self.pending.clear();
            self.written = 0;
        }
        Poll::Ready(Ok(()))
    }
    pub async fn flush_pending(&mut self) -> io::Result<()> {
        poll_fn(|cx| self.poll_flush_pending(cx)).await
    }
    // Queues a frame behind whatever is still pending. Nothing may follow a close frame.
    fn queue_frame(&mut self, opcode: Opcode, fin: bool, payload: &[u8]) -> io::Result<()> {
        if self.close_sent {
            return Err(WsConnectionError::Closed.into_io());
        }
        self.close_sent = opcode == Opcode::Close;
        self.encoder.encode(opcode, fin, payload, &mut self.pending);
        Ok(())
    }
    pub async fn send_control(
        &mut self,
        opcode: Opcode,
        payload: WsControlFramePayload,
    ) -> io::Result<()> {
        self.queue_frame(opcode, true, payload.data())?;
        self.flush_pending().await
    }
    // Sends a close frame unless one went out already.
    pub async fn send_close(&mut self, payload: WsControlFramePayload) -> io::Result<()> {
        if self.close_sent {
            return self.flush_pending().await;
        }
        self.send_control(Opcode::Close, payload).await
    }
    // Ends a message whose writer was dropped after sending non-final frames.
    pub async fn terminate_message(&mut self) -> io::Result<()> {
        self.flush_pending().await?;
        self.queue_frame(Opcode::Continuation, true, &[])?;
        self.flush_pending().await
    }
}

/// One outbound message. Payload is buffered up to the configured write buffer size and flushed
/// as a non-final frame whenever the buffer fills. [`close`][Self::close] sends the final frame.
///
/// Only one writer exists per connection at a time; dropping a writer without closing it makes the
/// next [`WsConnection::next_writer`] terminate the abandoned message first.
pub struct WsMessageWriter<'a, T: Transport> {
    conn: &'a WsConnection<T>,
    unterminated: MutexGuard<'a, bool>,
    kind: WsMessageKind,
    opcode: Opcode,
    buffer: Vec<u8>,
    capacity: usize,
}

impl<'a, T: Transport> WsMessageWriter<'a, T> {
    pub(crate) fn new(
        conn: &'a WsConnection<T>,
        unterminated: MutexGuard<'a, bool>,
        kind: WsMessageKind,
        capacity: usize,
    ) -> Self {
        Self {
            conn,
            unterminated,
            kind,
            opcode: kind.opcode(),
            buffer: Vec::with_capacity(capacity),
            capacity,
        }
    }
    pub fn kind(&self) -> WsMessageKind {
        self.kind
    }
    /// Buffers as much of `buf` as fits, flushing a frame first if the buffer is full.
    pub async fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let conn = self.conn;
        conn.guard(&conn.write_deadline, async move {
            if self.buffer.len() == self.capacity {
                self.send_frame(false).await?;
            }
            let n = (self.capacity - self.buffer.len()).min(buf.len());
            self.buffer.extend_from_slice(&buf[0..n]);
            Ok(n)
        })
        .await
    }
    pub async fn write_all(&mut self, mut buf: &[u8]) -> io::Result<()> {
        while !buf.is_empty() {
            let n = self.write(buf).await?;
            buf = &buf[n..];
        }
        Ok(())
    }
    /// Sends the final frame of the message.
    pub async fn close(mut self) -> io::Result<()> {
        let conn = self.conn;
        conn.guard(&conn.write_deadline, self.send_frame(true)).await
    }
    async fn send_frame(&mut self, fin: bool) -> io::Result<()> {
        let mut side = self.conn.write_side.lock().await;
        side.flush_pending().await?;
        // encoding and clearing the buffer happen together, so an interrupted send is not repeated
        side.queue_frame(self.opcode, fin, &self.buffer)?;
        self.buffer.clear();
        self.opcode = Opcode::Continuation;
        *self.unterminated = !fin;
        side.flush_pending().await
    }
}
