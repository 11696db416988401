use std::{io, sync::Arc};

use tracing::Instrument;

use super::{Connection, Transport};
use crate::{Opcode, hub::HubHandle};

/// Runs one connection against the hub until the peer goes away.
///
/// The connection is subscribed, every Text payload it sends is forwarded for broadcast, and on
/// a Close frame or any read error it is unsubscribed and closed.
pub async fn serve<T: Transport>(conn: Connection<T>, hub: HubHandle<T>) {
    let conn = Arc::new(conn);
    let span = tracing::info_span!("conn", id = %conn.id(), peer = ?conn.peer_addr());

    async move {
        if hub.subscribe(Arc::clone(&conn)).await.is_err() {
            tracing::warn!("hub is gone, dropping connection");
            conn.close().await;
            return;
        }
        tracing::info!("connected");

        loop {
            let frame = match conn.receive().await {
                Ok(frame) => frame,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    tracing::info!("peer hung up");
                    break;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "receiving message error");
                    break;
                }
            };

            match frame.opcode {
                Opcode::Close => {
                    let code = frame
                        .payload
                        .first_chunk::<2>()
                        .map(|b| u16::from_be_bytes(*b));
                    tracing::info!(code = ?code, "received Close frame");
                    break;
                }
                Opcode::Text => {
                    tracing::info!(len = frame.payload.len(), "received message");
                    if hub.ingoing(frame.payload).await.is_err() {
                        tracing::warn!("hub is gone, dropping connection");
                        break;
                    }
                }
                opcode => tracing::debug!(?opcode, len = frame.payload.len(), "ignoring frame"),
            }
        }

        let _ = hub.unsubscribe(&conn).await;
        conn.close().await;
        tracing::info!("disconnected");
    }
    .instrument(span)
    .await;
}
