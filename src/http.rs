use std::{collections::HashMap, io, net::SocketAddr};

use async_trait::async_trait;
use tokio::{
    io::{
        AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt,
        BufReader,
    },
    net::TcpStream,
};

use crate::{error::HandshakeError, ws::Transport};

const MAX_HEAD_LEN: usize = 8 * 1024;

/// The head of an HTTP/1.x request, still holding the stream it was read from.
///
/// Bytes the client sent after the head stay buffered in the stream and are handed over with it
/// on [`hijack`](crate::Upgradeable::hijack).
pub struct Request<S = TcpStream> {
    method: String,
    path: String,
    version: String,
    headers: HashMap<String, String>,
    peer: Option<SocketAddr>,
    stream: Option<BufReader<S>>,
}

impl Request<TcpStream> {
    pub async fn read(stream: TcpStream) -> io::Result<Self> {
        let peer = stream.peer_addr().ok();
        Self::read_from(stream, peer).await
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> Request<S> {
    pub async fn read_from(stream: S, peer: Option<SocketAddr>) -> io::Result<Self> {
        let mut reader = BufReader::new(stream);
        let mut read = 0;

        let request_line = read_head_line(&mut reader, &mut read).await?;
        let mut parts = request_line.split_whitespace();
        let (Some(method), Some(path), Some(version)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid(format!("malformed request line {request_line:?}")));
        };
        let (method, path, version) = (method.to_owned(), path.to_owned(), version.to_owned());

        // collect headers, keyed by lowercase name
        let mut headers = HashMap::new();
        loop {
            let line = read_head_line(&mut reader, &mut read).await?;
            let line = line.trim_end();
            if line.is_empty() {
                break;
            }
            if let Some((name, value)) = line.split_once(':') {
                headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_owned());
            }
        }

        tracing::trace!(%method, %path, %version, headers = headers.len(), "read request head");
        Ok(Self {
            method,
            path,
            version,
            headers,
            peer,
            stream: Some(reader),
        })
    }

    #[must_use]
    pub fn method(&self) -> &str { &self.method }

    #[must_use]
    pub fn path(&self) -> &str { &self.path }

    /// Answers with `400 Bad Request` and a plain-text body, unless the stream was already taken.
    pub async fn reject(&mut self, err: &HandshakeError) -> io::Result<()> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(());
        };
        let body = format!("{err}\n");
        let response = format!(
            "HTTP/1.1 400 Bad Request\r\n\
             Content-Type: text/plain; charset=utf-8\r\n\
             Content-Length: {}\r\n\
             Connection: close\r\n\r\n\
             {body}",
            body.len(),
        );
        stream.write_all(response.as_bytes()).await?;
        stream.flush().await
    }
}

#[async_trait]
impl<S> crate::Upgradeable for Request<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    BufReader<S>: Transport,
{
    type Transport = BufReader<S>;

    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    fn peer_addr(&self) -> Option<SocketAddr> { self.peer }

    async fn hijack(&mut self) -> Result<BufReader<S>, HandshakeError> {
        // protocol switching only exists in HTTP/1.1
        if self.version != "HTTP/1.1" {
            return Err(HandshakeError::NotHijackable);
        }
        self.stream.take().ok_or_else(|| {
            HandshakeError::Hijack(io::Error::new(
                io::ErrorKind::NotConnected,
                "stream already taken",
            ))
        })
    }
}

/// Reads one `\n`-terminated line, never buffering past what is left of the head budget.
async fn read_head_line<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    read: &mut usize,
) -> io::Result<String> {
    let budget = MAX_HEAD_LEN.saturating_sub(*read);
    let mut line = String::new();
    let n = (&mut *reader)
        .take(u64::try_from(budget).unwrap_or(u64::MAX))
        .read_line(&mut line)
        .await?;
    *read += n;

    if !line.ends_with('\n') {
        if n == budget {
            return Err(invalid("request head too large".to_owned()));
        }
        return Err(io::ErrorKind::UnexpectedEof.into());
    }
    Ok(line)
}

fn invalid(msg: String) -> io::Error { io::Error::new(io::ErrorKind::InvalidData, msg) }
