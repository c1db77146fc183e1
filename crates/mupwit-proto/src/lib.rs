pub mod config;
pub mod connection;
pub mod error;
pub mod platform;
pub mod protocol;
pub mod types;

pub use connection::{Connection, Picture};
pub use error::ProtocolError;
pub use protocol::ChangeMask;
