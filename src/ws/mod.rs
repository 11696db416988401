mod connection;
mod serve;

pub use connection::{ConnId, Connection, Transport};
pub use serve::serve;
