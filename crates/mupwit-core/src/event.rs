//! Events flow from the engine to the presentation layer.

use image::RgbaImage;
use mupwit_proto::types::{Album, Queue};

use crate::request::RequestId;

/// 8-bit RGBA colour.  The default (all zeros) is what an artwork response
/// carries when there is no image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }
}

#[derive(Debug, Clone)]
pub enum Event {
    /// The periodic status refresh ran; elapsed time moved on
    Elapsed,
    /// Playback status changed (pause, resume, seek, ...)
    StatusChanged,
    /// The current song changed
    SongChanged,
    /// The queue changed on the server; carries the new snapshot
    QueueChanged(Queue),
    /// The album list changed; carries the new snapshot
    AlbumsListChanged(Vec<Album>),
    /// Result of `Client::request_artwork`.  `image` is `None` when the song
    /// has no usable artwork, in which case `color` is `Color::default()`.
    ArtworkResponse {
        id: RequestId,
        image: Option<RgbaImage>,
        color: Color,
    },
}
