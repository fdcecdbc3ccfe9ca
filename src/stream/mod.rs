//! Byte stream view of a websocket connection.
//!
//! Every [`WsStream::write`] goes out as exactly one binary message. [`WsStream::read`] copies
//! from the next binary message, skipping pongs and text messages. A read only ever sees one
//! message: if the buffer is smaller than the message, the rest of that message is discarded
//! and the following read starts with the next message. Size read buffers for the largest
//! message the peer sends.

mod io;

use crate::connection::{Transport, WsConfig, WsConnection};
use crate::http::{
    error_response, is_upgrade_request, read_response_head, upgrade_request, upgrade_response,
    validate_upgrade_response, write_request_head, write_response_head, HandshakeError,
};
use crate::message::WsMessageKind;
use async_io::Async;
use futures::future::BoxFuture;
use futures::prelude::*;
use http::uri::InvalidUri;
use http::{Request, Response, StatusCode, Uri};
use std::io as std_io;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Instant;

#[derive(thiserror::Error, Debug)]
pub enum WsStreamError {
    #[error("io error: {0}")]
    Io(#[from] std_io::Error),
    #[error("handshake failed: {0}")]
    Handshake(HandshakeError),
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] InvalidUri),
    #[error("url has no host")]
    MissingHost,
    #[error("unsupported url scheme {0:?}")]
    UnsupportedScheme(String),
    #[error("invalid upgrade request: {0}")]
    Request(#[from] http::Error),
}

impl From<HandshakeError> for WsStreamError {
    fn from(err: HandshakeError) -> Self {
        match err {
            HandshakeError::Io(err) => WsStreamError::Io(err),
            err => WsStreamError::Handshake(err),
        }
    }
}

impl WsStreamError {
    pub fn is_handshake(&self) -> bool {
        matches!(self, WsStreamError::Handshake(_))
    }
}

/// Websocket connection used as a plain bidirectional byte stream.
pub struct WsStream<T: Transport = Async<TcpStream>> {
    conn: Arc<WsConnection<T>>,
    read_op: Option<BoxFuture<'static, std_io::Result<Vec<u8>>>>,
    write_op: Option<BoxFuture<'static, std_io::Result<usize>>>,
    close_op: Option<BoxFuture<'static, std_io::Result<()>>>,
}

impl WsStream<Async<TcpStream>> {
    /// Connects to `url` (`ws://` or `http://`) and performs the client handshake, declaring the
    /// url itself as origin. Returns the stream and the server's handshake response.
    pub async fn connect(
        url: &str,
        config: WsConfig,
    ) -> Result<(Self, Response<()>), WsStreamError> {
        let uri: Uri = url.parse()?;
        let default_port = match uri.scheme_str() {
            Some("ws") | Some("http") | None => 80,
            Some(scheme) => return Err(WsStreamError::UnsupportedScheme(scheme.to_string())),
        };
        let authority = uri.authority().ok_or(WsStreamError::MissingHost)?.clone();
        let port = authority.port_u16().unwrap_or(default_port);
        let mut transport = dial(authority.host(), port).await?;
        let request = upgrade_request()
            .uri(uri)
            .header("Host", authority.as_str())
            .header("Origin", url)
            .body(())?;
        match client_handshake(&mut transport, &request).await {
            Ok(response) => {
                log::debug!("connected to {}", url);
                let conn = WsConnection::with_config(transport, &config);
                Ok((Self::from_connection(conn), response))
            }
            Err(err) => {
                log::info!("handshake with {} failed: {}", url, err);
                let _ = transport.close().await;
                Err(err.into())
            }
        }
    }
}

// Name resolution blocks, so it runs on the blocking thread pool.
async fn dial(host: &str, port: u16) -> std_io::Result<Async<TcpStream>> {
    let host = host.trim_start_matches('[').trim_end_matches(']').to_string();
    let addrs = blocking::unblock(move || {
        (host.as_str(), port)
            .to_socket_addrs()
            .map(|addrs| addrs.collect::<Vec<_>>())
    })
    .await?;
    let mut last_err = None;
    for addr in addrs {
        match Async::<TcpStream>::connect(addr).await {
            Ok(transport) => return Ok(transport),
            Err(err) => last_err = Some(err),
        }
    }
    Err(last_err.unwrap_or_else(|| std_io::ErrorKind::AddrNotAvailable.into()))
}

async fn client_handshake<T: Transport>(
    transport: &mut T,
    request: &Request<()>,
) -> Result<Response<()>, HandshakeError> {
    write_request_head(transport, request).await?;
    let response = read_response_head(transport).await?;
    validate_upgrade_response(request, &response)?;
    Ok(response)
}

impl<T: Transport> WsStream<T> {
    /// Completes the server side of the handshake for `request`, which has already been read
    /// from `transport`. `config.extra_headers` are attached to the upgrade response.
    ///
    /// Requests that are not websocket upgrades or fail `config.check_origin` are answered with
    /// an HTTP error, the transport is closed and a handshake error is returned.
    pub async fn accept(
        mut transport: T,
        request: &Request<()>,
        config: WsConfig,
    ) -> Result<Self, WsStreamError> {
        let rejection = if !is_upgrade_request(request) {
            Some((StatusCode::BAD_REQUEST, HandshakeError::NotUpgradeRequest))
        } else if !(config.check_origin)(request) {
            Some((StatusCode::FORBIDDEN, HandshakeError::OriginNotAllowed))
        } else {
            None
        };
        if let Some((status, err)) = rejection {
            log::info!("rejecting upgrade of {}: {}", request.uri(), err);
            if let Err(io_err) = write_response_head(&mut transport, &error_response(status)).await
            {
                log::debug!("rejection not delivered: {}", io_err);
            }
            if let Err(io_err) = transport.close().await {
                log::debug!("closing rejected transport: {}", io_err);
            }
            return Err(err.into());
        }
        let response = upgrade_response(request, &config.extra_headers)?;
        write_response_head(&mut transport, &response).await?;
        log::debug!("upgraded {}", request.uri());
        Ok(Self::from_connection(WsConnection::with_config(
            transport, &config,
        )))
    }

    pub fn from_connection(conn: WsConnection<T>) -> Self {
        Self {
            conn: Arc::new(conn),
            read_op: None,
            write_op: None,
            close_op: None,
        }
    }

    /// Reads bytes of the next binary message into `buf`. `Ok(0)` means the peer closed the
    /// connection.
    pub async fn read(&self, buf: &mut [u8]) -> std_io::Result<usize> {
        read_message(&self.conn, buf).await
    }

    /// Sends `buf` as one binary message.
    pub async fn write(&self, buf: &[u8]) -> std_io::Result<usize> {
        write_message(&self.conn, buf).await
    }

    /// Closes the connection, failing any read or write still pending on it.
    pub async fn close(&self) -> std_io::Result<()> {
        self.conn.close().await
    }

    pub fn local_addr(&self) -> std_io::Result<SocketAddr> {
        self.conn.local_addr()
    }

    pub fn peer_addr(&self) -> std_io::Result<SocketAddr> {
        self.conn.peer_addr()
    }

    /// Sets the read and write deadlines. `None` disables the timeout.
    pub fn set_deadline(&self, deadline: Option<Instant>) -> std_io::Result<()> {
        self.conn.set_read_deadline(deadline)?;
        self.conn.set_write_deadline(deadline)
    }

    pub fn set_read_deadline(&self, deadline: Option<Instant>) -> std_io::Result<()> {
        self.conn.set_read_deadline(deadline)
    }

    /// A write that times out may already have sent part of its message.
    pub fn set_write_deadline(&self, deadline: Option<Instant>) -> std_io::Result<()> {
        self.conn.set_write_deadline(deadline)
    }
}

async fn read_message<T: Transport>(
    conn: &WsConnection<T>,
    buf: &mut [u8],
) -> std_io::Result<usize> {
    if buf.is_empty() {
        return Ok(0);
    }
    loop {
        let mut reader = match conn.next_reader().await? {
            None => return Ok(0),
            Some(reader) => reader,
        };
        match reader.kind() {
            WsMessageKind::Binary => {}
            WsMessageKind::Pong => continue,
            WsMessageKind::Close => return Ok(0),
            WsMessageKind::Text => {
                log::debug!("skipping text message");
                continue;
            }
        }
        let mut filled = 0;
        while filled < buf.len() {
            match reader.read(&mut buf[filled..]).await? {
                0 => break,
                n => filled += n,
            }
        }
        // an empty message is not the end of the stream
        if filled > 0 {
            return Ok(filled);
        }
    }
}

async fn write_message<T: Transport>(conn: &WsConnection<T>, buf: &[u8]) -> std_io::Result<usize> {
    let mut writer = conn.next_writer(WsMessageKind::Binary).await?;
    writer.write_all(buf).await?;
    writer.close().await?;
    Ok(buf.len())
}
