//! Broadcast hub.
//!
//! All membership changes and every broadcast pass go through one coordination task, fed by a
//! single ordered channel. That task is the only code that touches the member set, so no locks
//! are needed around it and events are handled strictly in the order they were queued.

use std::{collections::HashMap, sync::Arc};

use bytes::Bytes;
use tokio::sync::mpsc::{self, Receiver, Sender};

use crate::{
    Frame,
    error::HubClosed,
    ws::{ConnId, Connection, Transport},
};

pub const DEFAULT_CAPACITY: usize = 1024;

enum HubEvent<T: Transport> {
    Subscribe(Arc<Connection<T>>),
    Unsubscribe(ConnId),
    Ingoing(Bytes),
}

/// The coordination side of the hub. Owns the member set.
pub struct Hub<T: Transport> {
    members: HashMap<ConnId, Arc<Connection<T>>>,
    events: Receiver<HubEvent<T>>,
}

/// Cloneable producer side of the hub.
pub struct HubHandle<T: Transport> {
    tx: Sender<HubEvent<T>>,
}

impl<T: Transport> Clone for HubHandle<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T: Transport> Hub<T> {
    /// Creates a hub whose event queue holds up to `capacity` pending events.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, HubHandle<T>) {
        let (tx, events) = mpsc::channel(capacity.max(1));
        let hub = Self {
            members: HashMap::new(),
            events,
        };
        (hub, HubHandle { tx })
    }

    /// Creates a hub and starts its coordination task on the current runtime.
    #[must_use]
    pub fn spawn(capacity: usize) -> HubHandle<T> {
        let (hub, handle) = Self::new(capacity);
        tokio::spawn(hub.run());
        handle
    }

    /// Processes events one at a time until every [`HubHandle`] has been dropped.
    pub async fn run(mut self) {
        tracing::debug!("hub running");
        while let Some(event) = self.events.recv().await {
            self.handle(event).await;
        }
        tracing::debug!(members = self.members.len(), "hub stopped");
    }

    async fn handle(&mut self, event: HubEvent<T>) {
        match event {
            HubEvent::Subscribe(conn) => {
                let id = conn.id();
                self.members.insert(id, conn);
                tracing::debug!(%id, members = self.members.len(), "subscribed");
            }
            HubEvent::Unsubscribe(id) => {
                if self.members.remove(&id).is_some() {
                    tracing::debug!(%id, members = self.members.len(), "unsubscribed");
                }
            }
            HubEvent::Ingoing(payload) => self.broadcast(payload).await,
        }
    }

    // Sends are awaited one member at a time, so a stalled peer holds up everyone after it in
    // this pass.
    async fn broadcast(&self, payload: Bytes) {
        let frame = Frame::text(payload);
        for (id, conn) in &self.members {
            if let Err(e) = conn.send(&frame).await {
                tracing::warn!(%id, error = %e, "failed to deliver broadcast");
            }
        }
        tracing::trace!(
            recipients = self.members.len(),
            len = frame.payload.len(),
            "broadcast"
        );
    }
}

impl<T: Transport> HubHandle<T> {
    /// Adds `conn` to the member set. Subscribing the same connection again is a no-op.
    pub async fn subscribe(&self, conn: Arc<Connection<T>>) -> Result<(), HubClosed> {
        self.send(HubEvent::Subscribe(conn)).await
    }

    /// Removes `conn` from the member set, if present.
    pub async fn unsubscribe(&self, conn: &Connection<T>) -> Result<(), HubClosed> {
        self.send(HubEvent::Unsubscribe(conn.id())).await
    }

    /// Queues `payload` to be sent as a Text frame to every member.
    ///
    /// Returns once the event is queued. Delivery failures are never reported back.
    pub async fn ingoing(&self, payload: impl Into<Bytes>) -> Result<(), HubClosed> {
        self.send(HubEvent::Ingoing(payload.into())).await
    }

    async fn send(&self, event: HubEvent<T>) -> Result<(), HubClosed> {
        self.tx.send(event).await.map_err(|_| HubClosed)
    }
}
