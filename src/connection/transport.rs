use async_io::Async;
use futures::{AsyncRead, AsyncWrite};
use std::io;
use std::net::{SocketAddr, TcpStream};

/// Byte transport underneath a websocket connection.
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send + 'static {
    fn local_addr(&self) -> io::Result<SocketAddr>;
    fn peer_addr(&self) -> io::Result<SocketAddr>;
}

impl Transport for Async<TcpStream> {
    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.get_ref().local_addr()
    }
    fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.get_ref().peer_addr()
    }
}
