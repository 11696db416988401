use std::net::SocketAddr;

use async_trait::async_trait;
use base64::engine::{Engine, general_purpose::STANDARD as BASE64};
use sha1::{Digest, Sha1};
use tokio::io::AsyncWriteExt;

use crate::{
    error::HandshakeError,
    ws::{Connection, Transport},
};

type Result<T> = std::result::Result<T, HandshakeError>;

const GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// An HTTP request that may be switched over to the WebSocket protocol.
///
/// This is the seam to whatever HTTP layer accepted the request. After a successful
/// [`hijack`](Upgradeable::hijack) the HTTP layer must not touch the transport again.
#[async_trait]
pub trait Upgradeable: Send {
    type Transport: Transport;

    /// Looks up a request header. Names are matched case-insensitively.
    fn header(&self, name: &str) -> Option<&str>;

    fn peer_addr(&self) -> Option<SocketAddr> { None }

    /// Takes exclusive ownership of the underlying transport.
    async fn hijack(&mut self) -> Result<Self::Transport>;
}

/// `Sec-WebSocket-Accept` value for a client's `Sec-WebSocket-Key`.
#[must_use]
pub fn accept_key(key: &str) -> String {
    let mut sha = Sha1::new();
    sha.update(key.as_bytes());
    sha.update(GUID.as_bytes());
    BASE64.encode(sha.finalize())
}

/// Upgrades `request` to a WebSocket [`Connection`] accepting payloads up to
/// [`DEFAULT_MAX_PAYLOAD`](crate::DEFAULT_MAX_PAYLOAD).
pub async fn upgrade<R: Upgradeable>(request: &mut R) -> Result<Connection<R::Transport>> {
    upgrade_limited(request, Some(crate::DEFAULT_MAX_PAYLOAD)).await
}

/// Validates the upgrade headers, takes over the transport and answers with
/// `101 Switching Protocols`.
///
/// Nothing is taken from `request` unless every header check passes, so on a header error the
/// caller can still reply over HTTP.
pub async fn upgrade_limited<R: Upgradeable>(
    request: &mut R,
    max_payload: Option<usize>,
) -> Result<Connection<R::Transport>> {
    validate_header(request, "Connection", "Upgrade")?;
    validate_header(request, "Upgrade", "websocket")?;

    let key = match request.header("Sec-WebSocket-Key") {
        Some(k) if !k.is_empty() => k,
        _ => return Err(HandshakeError::MissingKey),
    };
    let accept = accept_key(key);
    let peer = request.peer_addr();

    let mut transport = request.hijack().await?;

    let response = format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Connection: Upgrade\r\n\
         Upgrade: websocket\r\n\
         Sec-WebSocket-Accept: {accept}\r\n\r\n",
    );
    transport.write_all(response.as_bytes()).await?;
    transport.flush().await?;

    tracing::debug!(peer = ?peer, "switched protocols");
    Ok(Connection::new(transport, peer, max_payload))
}

fn validate_header<R: Upgradeable>(
    request: &R,
    field: &'static str,
    expected: &'static str,
) -> Result<()> {
    match request.header(field) {
        Some(x) if x == expected => Ok(()),
        got => Err(HandshakeError::Header {
            field,
            expected,
            got: got.map(str::to_owned),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        sync::{
            Arc,
            atomic::{AtomicBool, Ordering},
        },
    };

    use tokio::io::{AsyncReadExt, DuplexStream, duplex};

    use super::*;
    use crate::Frame;

    const SAMPLE_RESPONSE: &str = "HTTP/1.1 101 Switching Protocols\r\n\
                                   Connection: Upgrade\r\n\
                                   Upgrade: websocket\r\n\
                                   Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n\r\n";

    struct MockRequest {
        headers: HashMap<String, String>,
        transport: Option<DuplexStream>,
        hijacked: Arc<AtomicBool>,
    }

    impl MockRequest {
        fn new(headers: &[(&str, &str)], transport: Option<DuplexStream>) -> Self {
            Self {
                headers: headers
                    .iter()
                    .map(|(k, v)| (k.to_ascii_lowercase(), (*v).to_owned()))
                    .collect(),
                transport,
                hijacked: Arc::new(AtomicBool::new(false)),
            }
        }

        fn valid(transport: Option<DuplexStream>) -> Self {
            Self::new(
                &[
                    ("Connection", "Upgrade"),
                    ("Upgrade", "websocket"),
                    ("Sec-WebSocket-Key", "dGhlIHNhbXBsZSBub25jZQ=="),
                ],
                transport,
            )
        }
    }

    #[async_trait]
    impl Upgradeable for MockRequest {
        type Transport = DuplexStream;

        fn header(&self, name: &str) -> Option<&str> {
            self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
        }

        async fn hijack(&mut self) -> Result<DuplexStream> {
            self.hijacked.store(true, Ordering::SeqCst);
            self.transport.take().ok_or(HandshakeError::NotHijackable)
        }
    }

    #[test]
    fn rfc_accept_key() {
        assert_eq!(accept_key("dGhlIHNhbXBsZSBub25jZQ=="), "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
    }

    #[tokio::test]
    async fn writes_exact_switching_response() {
        let (mut client, server) = duplex(1024);
        let mut req = MockRequest::valid(Some(server));
        let conn = upgrade(&mut req).await.unwrap();

        let mut buf = vec![0; SAMPLE_RESPONSE.len()];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), SAMPLE_RESPONSE);

        // connection speaks frames right after the response
        conn.send(&Frame::text("ok")).await.unwrap();
        let mut frame = [0; 4];
        client.read_exact(&mut frame).await.unwrap();
        assert_eq!(frame, [0x81, 0x02, b'o', b'k']);
    }

    #[tokio::test]
    async fn missing_key_is_rejected_before_hijack() {
        let (_client, server) = duplex(64);
        let mut req = MockRequest::new(
            &[("Connection", "Upgrade"), ("Upgrade", "websocket")],
            Some(server),
        );
        let err = upgrade(&mut req).await.err().unwrap();
        assert!(matches!(err, HandshakeError::MissingKey));
        assert!(!req.hijacked.load(Ordering::SeqCst));
        assert!(req.transport.is_some());
    }

    #[tokio::test]
    async fn empty_key_is_rejected() {
        let mut req = MockRequest::new(
            &[
                ("Connection", "Upgrade"),
                ("Upgrade", "websocket"),
                ("Sec-WebSocket-Key", ""),
            ],
            None,
        );
        assert!(matches!(upgrade(&mut req).await, Err(HandshakeError::MissingKey)));
        assert!(!req.hijacked.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn keep_alive_connection_is_rejected() {
        let (_client, server) = duplex(64);
        let mut req = MockRequest::new(
            &[
                ("Connection", "keep-alive"),
                ("Upgrade", "websocket"),
                ("Sec-WebSocket-Key", "dGhlIHNhbXBsZSBub25jZQ=="),
            ],
            Some(server),
        );
        match upgrade(&mut req).await {
            Err(HandshakeError::Header { field, got, .. }) => {
                assert_eq!(field, "Connection");
                assert_eq!(got.as_deref(), Some("keep-alive"));
            }
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
        assert!(!req.hijacked.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn upgrade_value_must_match_exactly() {
        let mut req = MockRequest::new(
            &[
                ("Connection", "Upgrade"),
                ("Upgrade", "WebSocket"),
                ("Sec-WebSocket-Key", "dGhlIHNhbXBsZSBub25jZQ=="),
            ],
            None,
        );
        assert!(matches!(
            upgrade(&mut req).await,
            Err(HandshakeError::Header { field: "Upgrade", .. })
        ));
    }

    #[tokio::test]
    async fn not_hijackable_is_reported() {
        let mut req = MockRequest::valid(None);
        assert!(matches!(upgrade(&mut req).await, Err(HandshakeError::NotHijackable)));
        assert!(req.hijacked.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn limit_applies_to_received_frames() {
        let (mut client, server) = duplex(1024);
        let mut req = MockRequest::valid(Some(server));
        let conn = upgrade_limited(&mut req, Some(4)).await.unwrap();

        let mut response = vec![0; SAMPLE_RESPONSE.len()];
        client.read_exact(&mut response).await.unwrap();

        client
            .write_all(&[0x81, 0x05, b'h', b'e', b'l', b'l', b'o'])
            .await
            .unwrap();
        let err = conn.receive().await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn default_upgrade_refuses_forged_length() {
        let (mut client, server) = duplex(1024);
        let mut req = MockRequest::valid(Some(server));
        let conn = upgrade(&mut req).await.unwrap();

        let mut response = vec![0; SAMPLE_RESPONSE.len()];
        client.read_exact(&mut response).await.unwrap();

        let mut header = vec![0x82, 127];
        header.extend_from_slice(&(1u64 << 62).to_be_bytes());
        client.write_all(&header).await.unwrap();
        let err = conn.receive().await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }
}
