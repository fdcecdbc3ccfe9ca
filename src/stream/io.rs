use crate::connection::Transport;
use crate::stream::{read_message, write_message, WsStream};
use futures::prelude::*;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

// Pending operations own their buffers. If a retried poll passes a smaller buffer than the one
// the operation started with, the excess bytes of that message are dropped like any other
// remainder.
impl<T: Transport> AsyncRead for WsStream<T> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let conn = &this.conn;
        let len = buf.len();
        let op = this.read_op.get_or_insert_with(|| {
            let conn = conn.clone();
            async move {
                let mut data = vec![0u8; len];
                let n = read_message(&conn, &mut data).await?;
                data.truncate(n);
                Ok(data)
            }
            .boxed()
        });
        let data = futures::ready!(op.as_mut().poll(cx));
        this.read_op = None;
        let data = data?;
        let n = data.len().min(buf.len());
        buf[..n].copy_from_slice(&data[..n]);
        Poll::Ready(Ok(n))
    }
}

impl<T: Transport> AsyncWrite for WsStream<T> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let conn = &this.conn;
        let op = this.write_op.get_or_insert_with(|| {
            let conn = conn.clone();
            let data = buf.to_vec();
            async move { write_message(&conn, &data).await }.boxed()
        });
        let result = futures::ready!(op.as_mut().poll(cx));
        this.write_op = None;
        Poll::Ready(result)
    }

    // Every completed write has already been flushed as a whole message.
    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        // an abandoned operation may still hold a side of the connection locked
        this.read_op = None;
        this.write_op = None;
        let conn = &this.conn;
        let op = this.close_op.get_or_insert_with(|| {
            let conn = conn.clone();
            async move { conn.close().await }.boxed()
        });
        let result = futures::ready!(op.as_mut().poll(cx));
        this.close_op = None;
        Poll::Ready(result)
    }
}
