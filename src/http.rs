//! Opening handshake: building, validating and (de)serializing the HTTP/1.1 upgrade exchange.

use async_http_codec::{RequestHead, ResponseHead};
use futures::prelude::*;
use http::request::Builder;
use http::{HeaderMap, HeaderValue, Method, Request, Response, StatusCode, Uri, Version};
use rand::{thread_rng, Rng};
use ring::digest::{Context, SHA1_FOR_LEGACY_USE_ONLY};
use std::borrow::Cow;
use std::convert::TryFrom;
use std::io;

#[derive(thiserror::Error, Debug)]
pub enum HandshakeError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("not a websocket upgrade request")]
    NotUpgradeRequest,
    #[error("origin not allowed")]
    OriginNotAllowed,
    #[error("unexpected response status: {0}")]
    BadStatus(StatusCode),
    #[error("response lacks websocket upgrade headers")]
    MissingUpgradeHeaders,
    #[error("invalid Sec-WebSocket-Accept")]
    InvalidAccept,
}

pub fn upgrade_request() -> Builder {
    let mut nonce = [0u8; 16];
    thread_rng().fill(&mut nonce);
    Request::builder()
        .method(Method::GET)
        .version(Version::HTTP_11)
        .header("Connection", "Upgrade")
        .header("Upgrade", "websocket")
        .header("Sec-WebSocket-Version", "13")
        .header("Sec-WebSocket-Key", base64::encode(nonce))
}

fn has_token(headers: &HeaderMap, name: &str, token: &[u8]) -> bool {
    headers
        .get_all(name)
        .iter()
        .flat_map(|v| v.as_bytes().split(|&c| c == b' ' || c == b','))
        .any(|h| h.eq_ignore_ascii_case(token))
}

pub fn is_upgrade_request<T>(request: &Request<T>) -> bool {
    request.method() == Method::GET
        && has_token(request.headers(), "Connection", b"Upgrade")
        && has_token(request.headers(), "Upgrade", b"websocket")
        && request
            .headers()
            .get("Sec-WebSocket-Version")
            .map(HeaderValue::as_bytes)
            == Some(b"13")
        && request.headers().get("Sec-WebSocket-Key").is_some()
}

/// Accepts requests without an `Origin` header and requests whose origin authority equals the
/// `Host` header.
pub fn same_origin<T>(request: &Request<T>) -> bool {
    let origin = match request.headers().get("Origin") {
        None => return true,
        Some(origin) => origin,
    };
    let origin = match Uri::try_from(origin.as_bytes()) {
        Ok(origin) => origin,
        Err(_) => return false,
    };
    match (origin.authority(), request.headers().get("Host")) {
        (Some(authority), Some(host)) => authority
            .as_str()
            .as_bytes()
            .eq_ignore_ascii_case(host.as_bytes()),
        _ => false,
    }
}

/// Builds the `101 Switching Protocols` response for `request`, with `extra_headers` appended
/// verbatim.
pub fn upgrade_response<T>(
    request: &Request<T>,
    extra_headers: &HeaderMap,
) -> Result<Response<()>, HandshakeError> {
    let challenge = match (
        is_upgrade_request(request),
        request.headers().get("Sec-WebSocket-Key"),
    ) {
        (true, Some(challenge)) => challenge.as_bytes(),
        _ => return Err(HandshakeError::NotUpgradeRequest),
    };
    let accept = HeaderValue::from_str(&upgrade_challenge_response(challenge))
        .map_err(|_| HandshakeError::NotUpgradeRequest)?;
    let mut response = Response::new(());
    *response.status_mut() = StatusCode::SWITCHING_PROTOCOLS;
    *response.version_mut() = request.version();
    let headers = response.headers_mut();
    headers.insert("Connection", HeaderValue::from_static("Upgrade"));
    headers.insert("Upgrade", HeaderValue::from_static("websocket"));
    headers.insert("Sec-WebSocket-Accept", accept);
    for (name, value) in extra_headers {
        headers.append(name, value.clone());
    }
    Ok(response)
}

/// Plain HTTP rejection sent instead of the upgrade response.
pub fn error_response(status: StatusCode) -> Response<()> {
    let mut response = Response::new(());
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert("Content-Length", HeaderValue::from_static("0"));
    headers.insert("Connection", HeaderValue::from_static("close"));
    headers.insert("Sec-WebSocket-Version", HeaderValue::from_static("13"));
    response
}

pub fn validate_upgrade_response<T, U>(
    request: &Request<T>,
    response: &Response<U>,
) -> Result<(), HandshakeError> {
    if response.status() != StatusCode::SWITCHING_PROTOCOLS {
        return Err(HandshakeError::BadStatus(response.status()));
    }
    if !has_token(response.headers(), "Connection", b"Upgrade")
        || !has_token(response.headers(), "Upgrade", b"websocket")
    {
        return Err(HandshakeError::MissingUpgradeHeaders);
    }
    let challenge = request
        .headers()
        .get("Sec-WebSocket-Key")
        .ok_or(HandshakeError::NotUpgradeRequest)?;
    match response.headers().get("Sec-WebSocket-Accept") {
        Some(accept) if accept == &upgrade_challenge_response(challenge.as_bytes()) => Ok(()),
        _ => Err(HandshakeError::InvalidAccept),
    }
}

pub fn upgrade_challenge_response(challenge: &[u8]) -> String {
    let mut ctx = Context::new(&SHA1_FOR_LEGACY_USE_ONLY);
    ctx.update(challenge);
    ctx.update(b"258EAFA5-E914-47DA-95CA-C5AB0DC85B11");
    base64::encode(ctx.finish())
}

/// Writes the request head, with the request target reduced to its origin form.
pub async fn write_request_head<T: AsyncWrite + Unpin, B>(
    transport: &mut T,
    request: &Request<B>,
) -> io::Result<()> {
    let target = match request.uri().path_and_query() {
        Some(path) => Uri::from(path.clone()),
        None => Uri::from_static("/"),
    };
    let head = RequestHead::new(
        request.method().clone(),
        Cow::Owned(target),
        request.version(),
        Cow::Borrowed(request.headers()),
    );
    head.encode(&mut *transport).await?;
    transport.flush().await
}

pub async fn write_response_head<T: AsyncWrite + Unpin, B>(
    transport: &mut T,
    response: &Response<B>,
) -> io::Result<()> {
    ResponseHead::ref_response(response)
        .encode(&mut *transport)
        .await?;
    transport.flush().await
}

/// Reads an HTTP/1.x request head. The body, if any, is left on the transport.
pub async fn read_request_head<T: AsyncRead + Unpin>(
    transport: &mut T,
) -> Result<Request<()>, HandshakeError> {
    let (_, head) = RequestHead::decode(&mut *transport).await?;
    Ok(head.into())
}

/// Reads an HTTP/1.x response head. The body, if any, is left on the transport.
pub async fn read_response_head<T: AsyncRead + Unpin>(
    transport: &mut T,
) -> Result<Response<()>, HandshakeError> {
    let (_, head) = ResponseHead::decode(&mut *transport).await?;
    Ok(head.into())
}

#[cfg(test)]
mod tests {
    use crate::http::*;
    use futures::executor::block_on;

    #[test]
    fn challenge_response() {
        assert_eq!(
            upgrade_challenge_response(b"dGhlIHNhbXBsZSBub25jZQ=="),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }

    fn request(origin: Option<&str>) -> Request<()> {
        let mut builder = upgrade_request().uri("/ws").header("Host", "example.com:8080");
        if let Some(origin) = origin {
            builder = builder.header("Origin", origin);
        }
        builder.body(()).unwrap()
    }

    #[test]
    fn upgrade_request_is_recognized() {
        assert!(is_upgrade_request(&request(None)));
        let mut post = request(None);
        *post.method_mut() = Method::POST;
        assert!(!is_upgrade_request(&post));
        let mut no_key = request(None);
        no_key.headers_mut().remove("Sec-WebSocket-Key");
        assert!(!is_upgrade_request(&no_key));
    }

    #[test]
    fn origin_policy() {
        assert!(same_origin(&request(None)));
        assert!(same_origin(&request(Some("http://example.com:8080"))));
        assert!(same_origin(&request(Some("http://EXAMPLE.com:8080/ws"))));
        assert!(!same_origin(&request(Some("http://evil.com"))));
    }

    #[test]
    fn response_carries_extra_headers_and_validates() {
        let request = request(None);
        let mut extra = HeaderMap::new();
        extra.append("Set-Cookie", HeaderValue::from_static("sessionId=1234"));
        let response = upgrade_response(&request, &extra).unwrap();
        assert_eq!(response.status(), StatusCode::SWITCHING_PROTOCOLS);
        assert_eq!(response.headers()["Set-Cookie"], "sessionId=1234");
        validate_upgrade_response(&request, &response).unwrap();
        let other = upgrade_request().body(()).unwrap();
        assert!(matches!(
            validate_upgrade_response(&other, &response),
            Err(HandshakeError::InvalidAccept)
        ));
    }

    #[test]
    fn rejects_non_upgrade_response() {
        let request = request(None);
        let response = error_response(StatusCode::FORBIDDEN);
        match validate_upgrade_response(&request, &response) {
            Err(HandshakeError::BadStatus(StatusCode::FORBIDDEN)) => {}
            r => panic!("unexpected: {:?}", r),
        }
    }

    #[test]
    fn request_head_round_trip() {
        let request = request(Some("http://example.com:8080"));
        let mut wire = Vec::new();
        block_on(write_request_head(&mut wire, &request)).unwrap();
        wire.extend_from_slice(b"frame bytes");
        let mut transport: &[u8] = &wire;
        let decoded = block_on(read_request_head(&mut transport)).unwrap();
        assert_eq!(decoded.method(), Method::GET);
        assert_eq!(decoded.uri(), "/ws");
        assert_eq!(decoded.headers(), request.headers());
        assert_eq!(transport, b"frame bytes");
    }

    #[test]
    fn response_head_parses() {
        let mut transport: &[u8] =
            b"HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\nSet-Cookie: a=b\r\n\r\n";
        let response = block_on(read_response_head(&mut transport)).unwrap();
        assert_eq!(response.status(), StatusCode::SWITCHING_PROTOCOLS);
        assert_eq!(response.headers()["set-cookie"], "a=b");
    }

    #[test]
    fn truncated_head() {
        let mut transport: &[u8] = b"HTTP/1.1 101 Switching";
        match block_on(read_response_head(&mut transport)) {
            Err(HandshakeError::Io(err)) => assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof),
            r => panic!("unexpected: {:?}", r),
        }
    }
}
