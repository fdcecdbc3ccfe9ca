#![allow(dead_code)]

use async_io::Async;
use async_ws_stream::frame::{FrameEncoder, Opcode};
use async_ws_stream::http::{
    read_request_head, read_response_head, upgrade_request, validate_upgrade_response,
    write_request_head,
};
use async_ws_stream::{WsConfig, WsStream, WsStreamError};
use futures::future::join;
use futures::prelude::*;
use http::Response;
use std::net::{Ipv4Addr, TcpListener, TcpStream};

pub fn init_logger() {
    let _ = simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Debug)
        .init();
}

pub fn bind() -> (Async<TcpListener>, u16) {
    let listener = Async::<TcpListener>::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
    let port = listener.get_ref().local_addr().unwrap().port();
    (listener, port)
}

pub async fn accept_ws(
    listener: &Async<TcpListener>,
    config: WsConfig,
) -> Result<WsStream, WsStreamError> {
    let (mut transport, _) = listener.accept().await?;
    let request = read_request_head(&mut transport).await?;
    WsStream::accept(transport, &request, config).await
}

pub async fn connect_ws(port: u16) -> Result<(WsStream, Response<()>), WsStreamError> {
    WsStream::connect(&format!("ws://127.0.0.1:{}/", port), WsConfig::client()).await
}

/// Connected server and client streams, plus the handshake response seen by the client.
pub async fn ws_pair(server_config: WsConfig) -> (WsStream, WsStream, Response<()>) {
    let (listener, port) = bind();
    let (server, client) = join(accept_ws(&listener, server_config), connect_ws(port)).await;
    let (client, response) = client.unwrap();
    (server.unwrap(), client, response)
}

/// Client that completes the handshake and then writes hand encoded frames.
pub struct RawClient {
    pub transport: Async<TcpStream>,
    encoder: FrameEncoder,
}

impl RawClient {
    pub async fn connect(port: u16) -> anyhow::Result<Self> {
        let mut transport = Async::<TcpStream>::connect((Ipv4Addr::LOCALHOST, port)).await?;
        let request = upgrade_request()
            .uri("/")
            .header("Host", format!("127.0.0.1:{}", port))
            .body(())?;
        write_request_head(&mut transport, &request).await?;
        let response = read_response_head(&mut transport).await?;
        validate_upgrade_response(&request, &response)?;
        Ok(Self {
            transport,
            encoder: FrameEncoder::client(),
        })
    }
    pub async fn send(&mut self, opcode: Opcode, fin: bool, payload: &[u8]) -> anyhow::Result<()> {
        let mut frame = Vec::new();
        self.encoder.encode(opcode, fin, payload, &mut frame);
        self.transport.write_all(&frame).await?;
        Ok(())
    }
}

/// Server stream and raw client connected to each other.
pub async fn raw_pair() -> (WsStream, RawClient) {
    let (listener, port) = bind();
    let (server, client) = join(
        accept_ws(&listener, WsConfig::server()),
        RawClient::connect(port),
    )
    .await;
    (server.unwrap(), client.unwrap())
}
