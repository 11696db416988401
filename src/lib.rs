#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::empty_docs,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions
)]

mod error;
mod frames;
mod handshake;
mod http;
pub mod hub;
mod server;
mod ws;

/// Largest frame payload accepted unless configured otherwise.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

pub use error::{EncodeError, Error, HandshakeError, HubClosed};
pub use frames::{Frame, Opcode};
pub use handshake::{Upgradeable, accept_key, upgrade, upgrade_limited};
pub use http::Request;
pub use hub::{Hub, HubHandle};
pub use server::{ServerConfig, ServerTransport, WebSocketServer};
pub use ws::{ConnId, Connection, Transport, serve};
