use crate::error::{ProtocolError, Result};

/// Prefix of the line the server sends right after accepting a connection.
pub const GREETING_PREFIX: &str = "OK MPD ";

/// Commands sent from the engine to the server.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Status,
    CurrentSong,
    /// Queue entry lookup by song id
    PlaylistId { id: u32 },
    /// Full queue listing
    PlaylistInfo,
    /// `list Album group Artist`
    ListAlbums,
    /// First song of an album (`find Album <title> window 0:1`)
    FindFirstInAlbum { album: String },
    ReadPicture { uri: String, offset: usize },
    /// Toggles pause when sent without an argument
    Pause,
    Next,
    Previous,
    SeekCur { seconds: u32 },
    PlayId { id: u32 },
    Move { from: u32, to: u32 },
    Idle(ChangeMask),
    NoIdle,
    Close,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Status => "status",
            Command::CurrentSong => "currentsong",
            Command::PlaylistId { .. } => "playlistid",
            Command::PlaylistInfo => "playlistinfo",
            Command::ListAlbums => "list",
            Command::FindFirstInAlbum { .. } => "find",
            Command::ReadPicture { .. } => "readpicture",
            Command::Pause => "pause",
            Command::Next => "next",
            Command::Previous => "previous",
            Command::SeekCur { .. } => "seekcur",
            Command::PlayId { .. } => "playid",
            Command::Move { .. } => "move",
            Command::Idle(_) => "idle",
            Command::NoIdle => "noidle",
            Command::Close => "close",
        }
    }

    fn args(&self) -> Vec<String> {
        match self {
            Command::PlaylistId { id } | Command::PlayId { id } => vec![id.to_string()],
            Command::ListAlbums => vec!["Album".into(), "group".into(), "Artist".into()],
            Command::FindFirstInAlbum { album } => vec![
                "Album".into(),
                album.clone(),
                "window".into(),
                "0:1".into(),
            ],
            Command::ReadPicture { uri, offset } => vec![uri.clone(), offset.to_string()],
            Command::SeekCur { seconds } => vec![seconds.to_string()],
            Command::Move { from, to } => vec![from.to_string(), to.to_string()],
            Command::Idle(mask) => mask.subsystems().map(str::to_string).collect(),
            _ => Vec::new(),
        }
    }

    /// Encode as a single protocol line, including the trailing newline.
    pub fn encode(&self) -> String {
        let mut line = self.name().to_string();
        for arg in self.args() {
            line.push(' ');
            line.push_str(&quote(&arg));
        }
        line.push('\n');
        line
    }
}

/// Double-quote an argument, escaping `\` and `"`.
pub fn quote(arg: &str) -> String {
    let mut out = String::with_capacity(arg.len() + 2);
    out.push('"');
    for c in arg.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

/// Set of idle subsystems the engine cares about.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChangeMask(u8);

impl ChangeMask {
    pub const NONE: ChangeMask = ChangeMask(0);
    /// Playback state, current song, elapsed time
    pub const PLAYER: ChangeMask = ChangeMask(1);
    /// The queue (`playlist` subsystem)
    pub const QUEUE: ChangeMask = ChangeMask(1 << 1);
    /// The song database
    pub const DATABASE: ChangeMask = ChangeMask(1 << 2);
    pub const ALL: ChangeMask = ChangeMask(0b111);

    const NAMES: [(ChangeMask, &'static str); 3] = [
        (ChangeMask::DATABASE, "database"),
        (ChangeMask::QUEUE, "playlist"),
        (ChangeMask::PLAYER, "player"),
    ];

    pub fn from_subsystem(name: &str) -> Option<ChangeMask> {
        Self::NAMES
            .iter()
            .find(|(_, n)| *n == name)
            .map(|(mask, _)| *mask)
    }

    pub fn subsystems(self) -> impl Iterator<Item = &'static str> {
        Self::NAMES
            .into_iter()
            .filter(move |(mask, _)| self.contains(*mask))
            .map(|(_, name)| name)
    }

    pub fn contains(self, other: ChangeMask) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: ChangeMask) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: ChangeMask) {
        self.0 &= !other.0;
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Returns the current mask and leaves it empty.
    pub fn take(&mut self) -> ChangeMask {
        std::mem::take(self)
    }
}

impl std::ops::BitOr for ChangeMask {
    type Output = ChangeMask;

    fn bitor(self, rhs: ChangeMask) -> ChangeMask {
        ChangeMask(self.0 | rhs.0)
    }
}

/// One `key: value` line of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pair {
    pub key: String,
    pub value: String,
}

impl Pair {
    pub fn parse(line: &str) -> Result<Pair> {
        let (key, value) = line
            .split_once(": ")
            .or_else(|| line.strip_suffix(':').map(|key| (key, "")))
            .ok_or_else(|| ProtocolError::Malformed(line.to_string()))?;
        Ok(Pair {
            key: key.to_string(),
            value: value.to_string(),
        })
    }
}

/// Fold `changed: <subsystem>` pairs into a mask.  Unknown subsystems are ignored.
pub fn changes_from_pairs(pairs: &[Pair]) -> ChangeMask {
    let mut mask = ChangeMask::NONE;
    for pair in pairs.iter().filter(|p| p.key == "changed") {
        if let Some(m) = ChangeMask::from_subsystem(&pair.value) {
            mask.insert(m);
        }
    }
    mask
}

/// Extract the server version from the greeting line.
pub fn parse_greeting(line: &str) -> Result<String> {
    line.strip_prefix(GREETING_PREFIX)
        .map(|v| v.trim().to_string())
        .ok_or_else(|| ProtocolError::Greeting(line.to_string()))
}
