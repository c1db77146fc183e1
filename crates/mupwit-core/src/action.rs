//! Actions flow from the presentation layer to the engine.

/// A presentation-originated command destined for the server connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Pause or resume
    Toggle,
    Next,
    Prev,
    /// Seek the current song to an absolute position
    SeekSeconds(u32),
    /// Play a queue entry by song id
    PlaySong(u32),
    /// Move the queue entry at `from` to position `to`
    ReorderQueue { from: u32, to: u32 },
    /// Close the connection and stop the engine thread
    Close,
}
