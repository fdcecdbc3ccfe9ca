use crate::connection::{Transport, WsConnection, WsConnectionError};
use crate::frame::{
    FrameDecodeError, FrameHead, FrameHeadDecodeState, FramePayloadReaderState, Opcode,
    WsControlFramePayload, MAX_CONTROL_PAYLOAD,
};
use crate::message::WsMessageKind;
use futures::io::{BufReader, ReadHalf};
use futures::lock::MutexGuard;
use futures::ready;
use std::io;
use std::task::{Context, Poll};

#[derive(Debug)]
pub(crate) enum ReadEvent {
    MessageStart(WsMessageKind),
    Data(usize),
    MessageEnd,
    Control(Opcode, WsControlFramePayload),
    Eof,
}

struct Fragment {
    payload: FramePayloadReaderState,
    fin: bool,
}

struct ControlRead {
    opcode: Opcode,
    payload: FramePayloadReaderState,
    buffer: [u8; MAX_CONTROL_PAYLOAD],
    filled: usize,
}

/// Receiving half of a connection. All decoding progress lives here, so a read interrupted by a
/// deadline or by dropping the future resumes on the next call.
pub(crate) struct ReadSide<T: Transport> {
    transport: BufReader<ReadHalf<T>>,
    head: FrameHeadDecodeState,
    message: Option<Fragment>,
    control: Option<ControlRead>,
    finished: bool,
    failed: bool,
}

impl<T: Transport> ReadSide<T> {
    pub fn new(transport: ReadHalf<T>, capacity: usize) -> Self {
        Self {
            transport: BufReader::with_capacity(capacity, transport),
            head: FrameHeadDecodeState::new(),
            message: None,
            control: None,
            finished: false,
            failed: false,
        }
    }
    pub fn finish(&mut self) {
        self.finished = true;
    }
    pub fn poll_event(
        &mut self,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<io::Result<ReadEvent>> {
        if self.failed {
            return Poll::Ready(Err(WsConnectionError::Closed.into_io()));
        }
        match self.poll_event_inner(cx, buf) {
            Poll::Ready(Err(err)) => {
                if err.kind() != io::ErrorKind::TimedOut {
                    self.failed = true;
                }
                Poll::Ready(Err(err))
            }
            p => p,
        }
    }
    fn poll_event_inner(
        &mut self,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<io::Result<ReadEvent>> {
        loop {
            if let Some(control) = &mut self.control {
                while !control.payload.finished() {
                    let window = &mut control.buffer[control.filled..];
                    let n = ready!(control.payload.poll_read(&mut self.transport, cx, window))?;
                    control.filled += n;
                }
                let opcode = control.opcode;
                let payload = WsControlFramePayload::new(&control.buffer[0..control.filled]);
                self.control = None;
                return Poll::Ready(Ok(ReadEvent::Control(opcode, payload)));
            }
            if let Some(fragment) = &mut self.message {
                if !fragment.payload.finished() {
                    let n = ready!(fragment.payload.poll_read(&mut self.transport, cx, buf))?;
                    return Poll::Ready(Ok(ReadEvent::Data(n)));
                }
                if fragment.fin {
                    self.message = None;
                    return Poll::Ready(Ok(ReadEvent::MessageEnd));
                }
            }
            if self.finished {
                return Poll::Ready(Ok(ReadEvent::Eof));
            }
            let head = match ready!(self.head.poll(&mut self.transport, cx)) {
                Ok(head) => head,
                Err(FrameDecodeError::Io(err))
                    if err.kind() == io::ErrorKind::UnexpectedEof
                        && self.head.is_empty()
                        && self.message.is_none() =>
                {
                    log::debug!("transport closed without close frame");
                    self.finished = true;
                    return Poll::Ready(Ok(ReadEvent::Eof));
                }
                Err(FrameDecodeError::Io(err)) => return Poll::Ready(Err(err)),
                Err(FrameDecodeError::ParseErr(err)) => {
                    return Poll::Ready(Err(WsConnectionError::from(err).into_io()))
                }
            };
            if let Some(event) = self.start_frame(head)? {
                return Poll::Ready(Ok(event));
            }
        }
    }
    fn start_frame(&mut self, head: FrameHead) -> io::Result<Option<ReadEvent>> {
        let payload = FramePayloadReaderState::new(head.mask, head.payload_len);
        let kind = match (head.opcode, &mut self.message) {
            (opcode, _) if opcode.is_control() => {
                self.control = Some(ControlRead {
                    opcode,
                    payload,
                    buffer: [0u8; MAX_CONTROL_PAYLOAD],
                    filled: 0,
                });
                return Ok(None);
            }
            (Opcode::Continuation, Some(fragment)) => {
                *fragment = Fragment {
                    payload,
                    fin: head.fin,
                };
                return Ok(None);
            }
            (Opcode::Text, None) => WsMessageKind::Text,
            (Opcode::Binary, None) => WsMessageKind::Binary,
            (opcode, _) => return Err(WsConnectionError::UnexpectedFrame(opcode).into_io()),
        };
        self.message = Some(Fragment {
            payload,
            fin: head.fin,
        });
        Ok(Some(ReadEvent::MessageStart(kind)))
    }
}

enum Body {
    Data { ended: bool },
    Control { payload: WsControlFramePayload, offset: usize },
}

/// Payload of one inbound message. Dropping it early is fine: the unread remainder is skipped by
/// the next [`WsConnection::next_reader`] call.
pub struct WsMessageReader<'a, T: Transport> {
    conn: &'a WsConnection<T>,
    side: MutexGuard<'a, ReadSide<T>>,
    kind: WsMessageKind,
    body: Body,
}

impl<'a, T: Transport> WsMessageReader<'a, T> {
    pub(crate) fn data(
        conn: &'a WsConnection<T>,
        side: MutexGuard<'a, ReadSide<T>>,
        kind: WsMessageKind,
    ) -> Self {
        Self {
            conn,
            side,
            kind,
            body: Body::Data { ended: false },
        }
    }
    pub(crate) fn control(
        conn: &'a WsConnection<T>,
        side: MutexGuard<'a, ReadSide<T>>,
        kind: WsMessageKind,
        payload: WsControlFramePayload,
    ) -> Self {
        Self {
            conn,
            side,
            kind,
            body: Body::Control { payload, offset: 0 },
        }
    }
    pub fn kind(&self) -> WsMessageKind {
        self.kind
    }
    /// Reads payload bytes into `buf`. Returns `Ok(0)` once the message is exhausted.
    pub async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let Self {
            conn, side, body, ..
        } = self;
        match body {
            Body::Control { payload, offset } => {
                let n = (payload.len() - *offset).min(buf.len());
                buf[0..n].copy_from_slice(&payload.data()[*offset..*offset + n]);
                *offset += n;
                Ok(n)
            }
            Body::Data { ended: true } => Ok(0),
            Body::Data { ended } => {
                if buf.is_empty() {
                    return Ok(0);
                }
                let conn = *conn;
                conn.guard(&conn.read_deadline, async move {
                    loop {
                        match conn.read_event(side, buf).await? {
                            ReadEvent::Data(n) => return Ok(n),
                            ReadEvent::MessageEnd => {
                                *ended = true;
                                return Ok(0);
                            }
                            ReadEvent::Control(Opcode::Ping, _)
                            | ReadEvent::Control(Opcode::Pong, _) => {}
                            ReadEvent::Control(opcode, _) => {
                                log::debug!("{} frame inside a message", opcode);
                                return Err(io::ErrorKind::UnexpectedEof.into());
                            }
                            ReadEvent::Eof | ReadEvent::MessageStart(_) => {
                                return Err(io::ErrorKind::UnexpectedEof.into())
                            }
                        }
                    }
                })
                .await
            }
        }
    }
}
