use std::{
    fmt, io,
    net::SocketAddr,
    sync::atomic::{AtomicBool, AtomicU64, Ordering},
};

use tokio::{
    io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufWriter, ReadHalf, WriteHalf},
    sync::Mutex,
};

use crate::{
    error::Error,
    frames::{Frame, FrameReader},
};

/// Byte stream a [`Connection`] can run over once the handshake has finished.
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

impl<T> Transport for T where T: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique connection identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnId(u64);

impl ConnId {
    fn next() -> Self { Self(NEXT_ID.fetch_add(1, Ordering::Relaxed)) }
}

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "#{}", self.0) }
}

/// A handshaked WebSocket session over an exclusively owned transport.
///
/// The read and write sides are locked separately, so one task may block in
/// [`receive`](Connection::receive) while another calls [`send`](Connection::send). Each side
/// still serves one caller at a time.
pub struct Connection<T: Transport> {
    id: ConnId,
    peer: Option<SocketAddr>,
    reader: Mutex<FrameReader<ReadHalf<T>>>,
    writer: Mutex<BufWriter<WriteHalf<T>>>,
    closed: AtomicBool,
}

impl<T: Transport> Connection<T> {
    pub(crate) fn new(transport: T, peer: Option<SocketAddr>, max_payload: Option<usize>) -> Self {
        let (reader, writer) = tokio::io::split(transport);
        Self {
            id: ConnId::next(),
            peer,
            reader: Mutex::new(FrameReader::new(reader, max_payload)),
            writer: Mutex::new(BufWriter::new(writer)),
            closed: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn id(&self) -> ConnId { self.id }

    #[must_use]
    pub fn peer_addr(&self) -> Option<SocketAddr> { self.peer }

    #[must_use]
    pub fn is_closed(&self) -> bool { self.closed.load(Ordering::Acquire) }

    /// Encodes `frame` and writes it out in one write followed by a flush.
    pub async fn send(&self, frame: &Frame) -> Result<(), Error> {
        let bytes = frame.encode()?;
        if self.is_closed() {
            return Err(io::Error::from(io::ErrorKind::NotConnected).into());
        }
        let mut ws = self.writer.lock().await;
        ws.write_all(&bytes).await?;
        ws.flush().await?;
        Ok(())
    }

    /// Blocks until a whole frame has been read.
    pub async fn receive(&self) -> io::Result<Frame> { self.reader.lock().await.read_frame().await }

    /// Sends a Close frame, ignoring any error, then shuts the write side down.
    ///
    /// The read side is released when the last reference to the connection is dropped. Only the
    /// first call has any effect.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let mut ws = self.writer.lock().await;
        if let Ok(bytes) = Frame::close().encode() {
            let _ = ws.write_all(&bytes).await;
        }
        let _ = ws.flush().await;
        let _ = ws.shutdown().await;
        tracing::info!(id = %self.id, "connection closed");
    }
}
