pub mod action;
pub mod artwork;
pub mod cache;
pub mod client;
mod engine;
pub mod error;
pub mod event;
pub mod idle;
pub mod lifecycle;
pub mod queue;
pub mod request;

pub use action::Action;
pub use cache::Playback;
pub use client::Client;
pub use error::EngineError;
pub use event::{Color, Event};
pub use lifecycle::Lifecycle;
pub use request::RequestId;
