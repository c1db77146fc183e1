//! Server-side objects as the engine caches them: playback status, songs,
//! the queue and the album list.  Each is built from the `key: value` pairs
//! of one response.

use serde::{Deserialize, Serialize};

use crate::protocol::Pair;

/// Placeholder for missing tags.
pub const UNKNOWN: &str = "<unknown>";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum PlayState {
    Play,
    Pause,
    #[default]
    Stop,
}

impl PlayState {
    fn parse(value: &str) -> Self {
        match value {
            "play" => PlayState::Play,
            "pause" => PlayState::Pause,
            _ => PlayState::Stop,
        }
    }
}

/// Reply to `status`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Status {
    pub state: PlayState,
    pub elapsed_ms: u64,
    pub duration_s: u32,
    pub song_position: Option<u32>,
    pub song_id: Option<u32>,
    pub volume: Option<u8>,
    pub queue_length: u32,
}

impl Status {
    pub fn from_pairs(pairs: &[Pair]) -> Self {
        let mut status = Status::default();
        let mut elapsed: Option<f64> = None;
        let mut duration: Option<f64> = None;
        let mut legacy_time: Option<(u64, u32)> = None;

        for pair in pairs {
            let v = pair.value.as_str();
            match pair.key.as_str() {
                "state" => status.state = PlayState::parse(v),
                "elapsed" => elapsed = v.parse().ok(),
                "duration" => duration = v.parse().ok(),
                // Older servers only send `time: <elapsed>:<total>`
                "time" => {
                    legacy_time = v
                        .split_once(':')
                        .and_then(|(e, t)| Some((e.parse().ok()?, t.parse().ok()?)));
                }
                "song" => status.song_position = v.parse().ok(),
                "songid" => status.song_id = v.parse().ok(),
                "volume" => status.volume = v.parse::<i32>().ok().and_then(|v| u8::try_from(v).ok()),
                "playlistlength" => status.queue_length = v.parse().unwrap_or(0),
                _ => {}
            }
        }

        status.elapsed_ms = match (elapsed, legacy_time) {
            (Some(secs), _) => (secs * 1000.0).round() as u64,
            (None, Some((secs, _))) => secs * 1000,
            (None, None) => 0,
        };
        status.duration_s = match (duration, legacy_time) {
            (Some(secs), _) => secs.round() as u32,
            (None, Some((_, total))) => total,
            (None, None) => 0,
        };
        status
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Song {
    pub id: Option<u32>,
    pub position: Option<u32>,
    pub uri: String,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub duration_s: u32,
}

impl Song {
    /// Build a song from the pairs of one entry.  Returns `None` when there
    /// is no `file` key (e.g. `currentsong` with nothing playing).
    pub fn from_pairs(pairs: &[Pair]) -> Option<Self> {
        let mut song = Song::default();
        let mut has_file = false;
        let mut duration: Option<f64> = None;
        let mut time: Option<u32> = None;

        for pair in pairs {
            let v = &pair.value;
            match pair.key.as_str() {
                "file" => {
                    song.uri = v.clone();
                    has_file = true;
                }
                "Title" => song.title = Some(v.clone()),
                "Artist" => song.artist = Some(v.clone()),
                "Album" => song.album = Some(v.clone()),
                "Id" => song.id = v.parse().ok(),
                "Pos" => song.position = v.parse().ok(),
                "duration" => duration = v.parse().ok(),
                "Time" => time = v.parse().ok(),
                _ => {}
            }
        }

        if !has_file {
            return None;
        }
        song.duration_s = duration
            .map(|d| d.round() as u32)
            .or(time)
            .unwrap_or(0);
        Some(song)
    }

    /// Split a multi-song listing on its `file` keys.
    pub fn list_from_pairs(pairs: &[Pair]) -> Vec<Song> {
        let mut songs = Vec::new();
        let mut start = None;
        for (i, pair) in pairs.iter().enumerate() {
            if pair.key == "file" {
                if let Some(s) = start {
                    songs.extend(Song::from_pairs(&pairs[s..i]));
                }
                start = Some(i);
            }
        }
        if let Some(s) = start {
            songs.extend(Song::from_pairs(&pairs[s..]));
        }
        songs
    }

    /// Last path component of the uri.
    pub fn filename(&self) -> &str {
        path_basename(&self.uri)
    }

    pub fn title_or_filename(&self) -> &str {
        self.title.as_deref().unwrap_or_else(|| self.filename())
    }

    pub fn artist_or_unknown(&self) -> &str {
        self.artist.as_deref().unwrap_or(UNKNOWN)
    }

    pub fn album_or_unknown(&self) -> &str {
        self.album.as_deref().unwrap_or(UNKNOWN)
    }
}

pub fn path_basename(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueItem {
    /// 0-based position in the queue
    pub number: u32,
    pub song: Song,
}

/// Snapshot of the server queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Queue {
    pub items: Vec<QueueItem>,
    pub total_duration_s: u64,
}

impl Queue {
    pub fn from_songs(songs: Vec<Song>) -> Self {
        let items: Vec<QueueItem> = songs
            .into_iter()
            .enumerate()
            .map(|(i, song)| QueueItem {
                number: i as u32,
                song,
            })
            .collect();
        let total_duration_s = items.iter().map(|i| u64::from(i.song.duration_s)).sum();
        Self {
            items,
            total_duration_s,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Mirror a server-side `move from to`.  Returns false when either
    /// position is out of range.
    pub fn move_item(&mut self, from: usize, to: usize) -> bool {
        if from >= self.items.len() || to >= self.items.len() {
            return false;
        }
        let item = self.items.remove(from);
        self.items.insert(to, item);
        for (i, item) in self.items.iter_mut().enumerate() {
            item.number = i as u32;
            item.song.position = Some(i as u32);
        }
        true
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Album {
    pub title: String,
    pub artist: Option<String>,
    pub first_song_uri: Option<String>,
}

impl Album {
    /// Parse the reply of `list Album group Artist`.  The grouped reply
    /// emits an `Artist` line before the albums that belong to it, so the
    /// latest artist seen is carried forward.  Result is sorted by title.
    pub fn list_from_pairs(pairs: &[Pair]) -> Vec<Album> {
        let mut albums = Vec::new();
        let mut artist: Option<&str> = None;
        for pair in pairs {
            match pair.key.as_str() {
                "Artist" => artist = Some(&pair.value),
                "Album" if !pair.value.is_empty() => albums.push(Album {
                    title: pair.value.clone(),
                    artist: artist.map(str::to_string),
                    first_song_uri: None,
                }),
                _ => {}
            }
        }
        albums.sort_by(|a, b| a.title.as_bytes().cmp(b.title.as_bytes()));
        albums
    }
}
