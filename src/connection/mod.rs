//! Message level websocket connection: the per-message reader/writer cycle, deadlines and close.

mod config;
mod deadline;
mod read;
mod transport;
mod write;

pub use config::*;
pub use read::WsMessageReader;
pub use transport::*;
pub use write::WsMessageWriter;

use crate::connection::deadline::Deadline;
use crate::connection::read::{ReadEvent, ReadSide};
use crate::connection::write::WriteSide;
use crate::frame::{FrameHeadParseError, Opcode, WsControlFramePayload};
use crate::message::WsMessageKind;
use async_io::Timer;
use futures::channel::oneshot;
use futures::future::{poll_fn, Shared};
use futures::lock::Mutex;
use futures::prelude::*;
use futures_lite::future;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::{Mutex as SyncMutex, PoisonError};
use std::task::Poll;
use std::time::{Duration, Instant};

const NORMAL_CLOSURE: u16 = 1000;

#[derive(thiserror::Error, Debug)]
pub enum WsConnectionError {
    #[error("parse error: {0}")]
    FrameDecodeError(#[from] FrameHeadParseError),
    #[error("unexpected {0} frame")]
    UnexpectedFrame(Opcode),
    #[error("{0} messages cannot be written")]
    UnwritableKind(WsMessageKind),
    #[error("connection closed")]
    Closed,
    #[error("i/o deadline exceeded")]
    Timeout,
}

impl WsConnectionError {
    pub(crate) fn into_io(self) -> io::Error {
        let kind = match &self {
            WsConnectionError::FrameDecodeError(_) | WsConnectionError::UnexpectedFrame(_) => {
                io::ErrorKind::InvalidData
            }
            WsConnectionError::UnwritableKind(_) => io::ErrorKind::InvalidInput,
            WsConnectionError::Closed => io::ErrorKind::BrokenPipe,
            WsConnectionError::Timeout => io::ErrorKind::TimedOut,
        };
        io::Error::new(kind, self)
    }
}

/// True for errors caused by an expired deadline. The connection stays usable after them.
pub fn is_timeout(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::TimedOut
}

/// True for errors returned because the connection was closed locally.
pub fn is_closed(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::BrokenPipe
}

/// A websocket connection on top of an upgraded transport.
///
/// All methods take `&self`: one task may read while another writes, and any task may close the
/// connection, which fails every pending read or write.
pub struct WsConnection<T: Transport> {
    read_side: Mutex<ReadSide<T>>,
    write_side: Mutex<WriteSide<T>>,
    writer_slot: Mutex<bool>,
    read_deadline: Deadline,
    write_deadline: Deadline,
    close_trigger: SyncMutex<Option<oneshot::Sender<()>>>,
    close_signal: Shared<oneshot::Receiver<()>>,
    local_addr: Option<SocketAddr>,
    peer_addr: Option<SocketAddr>,
    write_capacity: usize,
    close_timeout: Duration,
}

impl<T: Transport> WsConnection<T> {
    pub fn with_config(transport: T, config: &WsConfig) -> Self {
        let local_addr = transport.local_addr().ok();
        let peer_addr = transport.peer_addr().ok();
        let (read_half, write_half) = transport.split();
        let (close_trigger, close_signal) = oneshot::channel();
        Self {
            read_side: Mutex::new(ReadSide::new(read_half, config.read_capacity())),
            write_side: Mutex::new(WriteSide::new(write_half, config.mask)),
            writer_slot: Mutex::new(false),
            read_deadline: Deadline::new(),
            write_deadline: Deadline::new(),
            close_trigger: SyncMutex::new(Some(close_trigger)),
            close_signal: close_signal.shared(),
            local_addr,
            peer_addr,
            write_capacity: config.write_capacity(),
            close_timeout: config.close_timeout,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.close_trigger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    // Runs `f` until it completes, the deadline passes or the connection is closed.
    pub(crate) async fn guard<R, F: Future<Output = io::Result<R>>>(
        &self,
        deadline: &Deadline,
        f: F,
    ) -> io::Result<R> {
        if self.is_closed() {
            return Err(WsConnectionError::Closed.into_io());
        }
        let mut closed = self.close_signal.clone();
        let mut expiry = deadline.expiry();
        futures::pin_mut!(f);
        poll_fn(|cx| {
            if Pin::new(&mut closed).poll(cx).is_ready() {
                return Poll::Ready(Err(WsConnectionError::Closed.into_io()));
            }
            if Pin::new(&mut expiry).poll(cx).is_ready() {
                return Poll::Ready(Err(WsConnectionError::Timeout.into_io()));
            }
            f.as_mut().poll(cx)
        })
        .await
    }

    // Next decoded event. Pings are answered and close frames echoed before they are passed on.
    pub(crate) async fn read_event(
        &self,
        side: &mut ReadSide<T>,
        buf: &mut [u8],
    ) -> io::Result<ReadEvent> {
        let event = poll_fn(|cx| side.poll_event(cx, buf)).await?;
        match &event {
            ReadEvent::Control(Opcode::Ping, payload) => {
                log::debug!("ping with {} bytes", payload.len());
                let mut write_side = self.write_side.lock().await;
                write_side.send_control(Opcode::Pong, *payload).await?;
            }
            ReadEvent::Control(Opcode::Close, payload) => {
                log::info!("close frame received: {:?}", payload.close_code());
                side.finish();
                let mut write_side = self.write_side.lock().await;
                if let Err(err) = write_side.send_close(*payload).await {
                    log::debug!("close frame not echoed: {}", err);
                }
            }
            _ => {}
        }
        Ok(event)
    }

    /// Waits for the next inbound message. Any unread remainder of the previous message is
    /// skipped. Returns `None` once the peer has closed the connection.
    pub async fn next_reader(&self) -> io::Result<Option<WsMessageReader<'_, T>>> {
        self.guard(&self.read_deadline, async move {
            let mut side = self.read_side.lock().await;
            let mut discard = [0u8; 512];
            loop {
                match self.read_event(&mut side, &mut discard).await? {
                    ReadEvent::Data(_) | ReadEvent::MessageEnd => {}
                    ReadEvent::MessageStart(kind) => {
                        return Ok(Some(WsMessageReader::data(self, side, kind)))
                    }
                    ReadEvent::Control(Opcode::Ping, _) => {}
                    ReadEvent::Control(Opcode::Pong, payload) => {
                        let kind = WsMessageKind::Pong;
                        return Ok(Some(WsMessageReader::control(self, side, kind, payload)));
                    }
                    ReadEvent::Control(_, payload) => {
                        let kind = WsMessageKind::Close;
                        return Ok(Some(WsMessageReader::control(self, side, kind, payload)));
                    }
                    ReadEvent::Eof => return Ok(None),
                }
            }
        })
        .await
    }

    /// Opens an outbound data message. Waits while another writer is open.
    pub async fn next_writer(&self, kind: WsMessageKind) -> io::Result<WsMessageWriter<'_, T>> {
        if !kind.is_data() {
            return Err(WsConnectionError::UnwritableKind(kind).into_io());
        }
        self.guard(&self.write_deadline, async move {
            let mut slot = self.writer_slot.lock().await;
            if *slot {
                log::warn!("terminating message abandoned by its writer");
                self.write_side.lock().await.terminate_message().await?;
                *slot = false;
            }
            Ok(WsMessageWriter::new(self, slot, kind, self.write_capacity))
        })
        .await
    }

    pub fn set_read_deadline(&self, deadline: Option<Instant>) -> io::Result<()> {
        if self.is_closed() {
            return Err(WsConnectionError::Closed.into_io());
        }
        self.read_deadline.set(deadline);
        Ok(())
    }

    pub fn set_write_deadline(&self, deadline: Option<Instant>) -> io::Result<()> {
        if self.is_closed() {
            return Err(WsConnectionError::Closed.into_io());
        }
        self.write_deadline.set(deadline);
        Ok(())
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.local_addr.ok_or_else(|| io::ErrorKind::NotConnected.into())
    }

    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.peer_addr.ok_or_else(|| io::ErrorKind::NotConnected.into())
    }

    /// Closes the connection. Pending reads and writes fail with a broken pipe error, a close
    /// frame is sent if possible within the close timeout and the transport is shut down.
    /// Closing twice is an error, as is a write side that stays locked past the close timeout.
    pub async fn close(&self) -> io::Result<()> {
        let trigger = self
            .close_trigger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match trigger {
            None => return Err(WsConnectionError::Closed.into_io()),
            Some(trigger) => {
                let _ = trigger.send(());
            }
        }
        let deadline = Instant::now() + self.close_timeout;
        let mut side = match future::or(self.write_side.lock().map(Some), expire_at(deadline)).await
        {
            Some(side) => side,
            None => {
                log::warn!("write side still busy after {:?}", self.close_timeout);
                return Err(WsConnectionError::Timeout.into_io());
            }
        };
        let payload = WsControlFramePayload::close(NORMAL_CLOSURE, "");
        match future::or(side.send_close(payload).map(Some), expire_at(deadline)).await {
            Some(Ok(())) => {}
            Some(Err(err)) => log::debug!("close frame not sent: {}", err),
            None => log::debug!("close frame not sent within {:?}", self.close_timeout),
        }
        side.transport.close().await
    }
}

async fn expire_at<R>(deadline: Instant) -> Option<R> {
    Timer::at(deadline).await;
    None
}
