//! Fake music server for engine tests.
//!
//! Serves one client over TCP on `127.0.0.1` from a plain thread, keeps a
//! small in-memory library, and records every command line it receives.
//! Commands that change something queue the matching idle subsystem, which
//! is reported on the next `idle` (or immediately when one is outstanding).
//! Any command other than `noidle` arriving during an `idle` is recorded as
//! a protocol violation.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Write};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use mupwit_core::{Client, Event};
use mupwit_proto::config::Config;

/// Bytes per `readpicture` chunk.
pub const CHUNK: usize = 64;

#[derive(Clone)]
pub struct FakeSong {
    pub id: u32,
    pub file: String,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub duration: u32,
}

pub fn song(id: u32, artist: &str, album: &str, duration: u32) -> FakeSong {
    FakeSong {
        id,
        file: format!("{}/{}/{:02}.flac", artist, album, id),
        title: format!("Track {}", id),
        artist: artist.to_string(),
        album: album.to_string(),
        duration,
    }
}

pub struct Library {
    pub state: &'static str,
    pub elapsed: f64,
    pub current: usize,
    pub songs: Vec<FakeSong>,
    /// uri -> (mime, bytes)
    pub pictures: HashMap<String, (String, Vec<u8>)>,
}

impl Default for Library {
    fn default() -> Self {
        Self {
            state: "play",
            elapsed: 12.5,
            current: 0,
            songs: vec![
                song(1, "Can", "Tago Mago", 300),
                song(2, "Can", "Tago Mago", 420),
                song(3, "Neu!", "Neu! 75", 250),
            ],
            pictures: HashMap::new(),
        }
    }
}

#[derive(Default)]
struct State {
    log: Vec<String>,
    violations: Vec<String>,
    idle: bool,
    pending: Vec<&'static str>,
    writer: Option<TcpStream>,
}

impl State {
    fn send(&mut self, bytes: &[u8]) {
        if let Some(w) = self.writer.as_mut() {
            let _ = w.write_all(bytes);
            let _ = w.flush();
        }
    }

    fn changes_reply(&mut self) -> Vec<u8> {
        let mut out = String::new();
        for subsystem in self.pending.drain(..) {
            out.push_str(&format!("changed: {}\n", subsystem));
        }
        out.push_str("OK\n");
        out.into_bytes()
    }

    fn notify(&mut self, subsystem: &'static str) {
        if !self.pending.contains(&subsystem) {
            self.pending.push(subsystem);
        }
        if self.idle {
            self.idle = false;
            let reply = self.changes_reply();
            self.send(&reply);
        }
    }
}

pub struct FakeServer {
    pub port: u16,
    state: Arc<Mutex<State>>,
    pub library: Arc<Mutex<Library>>,
}

impl FakeServer {
    pub fn start(library: Library) -> FakeServer {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let state = Arc::new(Mutex::new(State::default()));
        let library = Arc::new(Mutex::new(library));

        let (st, lib) = (state.clone(), library.clone());
        std::thread::spawn(move || {
            let Ok((stream, _)) = listener.accept() else {
                return;
            };
            serve(stream, st, lib);
        });

        FakeServer {
            port,
            state,
            library,
        }
    }

    pub fn config(&self) -> Config {
        let mut config = Config::default();
        config.server.host = Some("127.0.0.1".into());
        config.server.port = Some(self.port);
        config.server.timeout_ms = Some(2000);
        config
    }

    pub fn log(&self) -> Vec<String> {
        self.state.lock().unwrap().log.clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.log().iter().filter(|l| l.starts_with(prefix)).count()
    }

    pub fn violations(&self) -> Vec<String> {
        self.state.lock().unwrap().violations.clone()
    }

    pub fn is_idle(&self) -> bool {
        self.state.lock().unwrap().idle
    }

    /// Report a change made by some other client.
    pub fn notify(&self, subsystem: &'static str) {
        self.state.lock().unwrap().notify(subsystem);
    }

    /// Drop the connection from the server side.
    pub fn kill(&self) {
        if let Some(w) = self.state.lock().unwrap().writer.take() {
            let _ = w.shutdown(Shutdown::Both);
        }
    }
}

fn serve(stream: TcpStream, state: Arc<Mutex<State>>, library: Arc<Mutex<Library>>) {
    let Ok(writer) = stream.try_clone() else {
        return;
    };
    {
        let mut st = state.lock().unwrap();
        st.writer = Some(writer);
        st.send(b"OK MPD 0.23.5\n");
    }

    let reader = BufReader::new(stream);
    for line in reader.lines() {
        let Ok(line) = line else { break };
        let mut st = state.lock().unwrap();
        st.log.push(line.clone());

        if line.starts_with("idle") {
            if st.idle {
                st.violations.push(line.clone());
            }
            st.idle = true;
            if !st.pending.is_empty() {
                st.idle = false;
                let reply = st.changes_reply();
                st.send(&reply);
            }
            continue;
        }
        if line == "noidle" {
            // A noidle outside idle gets no answer
            if st.idle {
                st.idle = false;
                let reply = st.changes_reply();
                st.send(&reply);
            }
            continue;
        }
        if st.idle {
            st.violations.push(line.clone());
        }
        if line == "close" {
            break;
        }

        let mut lib = library.lock().unwrap();
        let (reply, changed) = respond(&line, &mut lib);
        st.send(&reply);
        if let Some(subsystem) = changed {
            st.notify(subsystem);
        }
    }
}

fn args(line: &str) -> (String, Vec<String>) {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut chars = line.chars();
    while let Some(c) = chars.next() {
        match c {
            '"' => quoted = !quoted,
            '\\' if quoted => current.extend(chars.next()),
            ' ' if !quoted => {
                if !current.is_empty() {
                    parts.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        parts.push(current);
    }
    let name = if parts.is_empty() {
        String::new()
    } else {
        parts.remove(0)
    };
    (name, parts)
}

fn song_pairs(song: &FakeSong, pos: usize) -> String {
    format!(
        "file: {}\nTitle: {}\nArtist: {}\nAlbum: {}\nduration: {}.000\nPos: {}\nId: {}\n",
        song.file, song.title, song.artist, song.album, song.duration, pos, song.id
    )
}

fn ack(code: u32, cmd: &str, msg: &str) -> Vec<u8> {
    format!("ACK [{}@0] {{{}}} {}\n", code, cmd, msg).into_bytes()
}

fn respond(line: &str, lib: &mut Library) -> (Vec<u8>, Option<&'static str>) {
    let (name, args) = args(line);
    let ok = || b"OK\n".to_vec();
    let arg_u32 = |i: usize| args.get(i).and_then(|a| a.parse::<u32>().ok());

    match name.as_str() {
        "status" => {
            let mut out = format!(
                "volume: 80\nstate: {}\nplaylistlength: {}\n",
                lib.state,
                lib.songs.len()
            );
            if let Some(song) = lib.songs.get(lib.current) {
                out.push_str(&format!(
                    "song: {}\nsongid: {}\nelapsed: {:.3}\nduration: {}.000\n",
                    lib.current, song.id, lib.elapsed, song.duration
                ));
            }
            out.push_str("OK\n");
            (out.into_bytes(), None)
        }
        "currentsong" => {
            let mut out = lib
                .songs
                .get(lib.current)
                .map(|s| song_pairs(s, lib.current))
                .unwrap_or_default();
            out.push_str("OK\n");
            (out.into_bytes(), None)
        }
        "playlistinfo" => {
            let mut out = String::new();
            for (pos, song) in lib.songs.iter().enumerate() {
                out.push_str(&song_pairs(song, pos));
            }
            out.push_str("OK\n");
            (out.into_bytes(), None)
        }
        "playlistid" => match lib.songs.iter().position(|s| Some(s.id) == arg_u32(0)) {
            Some(pos) => {
                let out = song_pairs(&lib.songs[pos], pos) + "OK\n";
                (out.into_bytes(), None)
            }
            None => (ack(50, "playlistid", "No such song"), None),
        },
        "list" => {
            let mut grouped: Vec<(String, String)> = lib
                .songs
                .iter()
                .map(|s| (s.artist.clone(), s.album.clone()))
                .collect();
            grouped.sort();
            grouped.dedup();
            let mut out = String::new();
            let mut last_artist = None;
            for (artist, album) in grouped {
                if last_artist.as_ref() != Some(&artist) {
                    out.push_str(&format!("Artist: {}\n", artist));
                    last_artist = Some(artist);
                }
                out.push_str(&format!("Album: {}\n", album));
            }
            out.push_str("OK\n");
            (out.into_bytes(), None)
        }
        "find" => {
            let album = args.get(1).cloned().unwrap_or_default();
            let mut out = lib
                .songs
                .iter()
                .enumerate()
                .find(|(_, s)| s.album == album)
                .map(|(pos, s)| song_pairs(s, pos))
                .unwrap_or_default();
            out.push_str("OK\n");
            (out.into_bytes(), None)
        }
        "readpicture" => {
            let uri = args.first().cloned().unwrap_or_default();
            let offset: usize = args.get(1).and_then(|a| a.parse().ok()).unwrap_or(0);
            if !lib.songs.iter().any(|s| s.file == uri) {
                return (ack(50, "readpicture", "No such file"), None);
            }
            let Some((mime, data)) = lib.pictures.get(&uri) else {
                return (ok(), None);
            };
            let start = offset.min(data.len());
            let end = (start + CHUNK).min(data.len());
            let mut out =
                format!("size: {}\ntype: {}\nbinary: {}\n", data.len(), mime, end - start)
                    .into_bytes();
            out.extend_from_slice(&data[start..end]);
            out.extend_from_slice(b"\nOK\n");
            (out, None)
        }
        "pause" => {
            lib.state = if lib.state == "play" { "pause" } else { "play" };
            (ok(), Some("player"))
        }
        "seekcur" => match arg_u32(0) {
            Some(s) => {
                lib.elapsed = f64::from(s);
                (ok(), Some("player"))
            }
            None => (ack(2, "seekcur", "Number expected"), None),
        },
        "playid" => match lib.songs.iter().position(|s| Some(s.id) == arg_u32(0)) {
            Some(pos) => {
                lib.current = pos;
                lib.elapsed = 0.0;
                lib.state = "play";
                (ok(), Some("player"))
            }
            None => (ack(50, "playid", "No such song"), None),
        },
        "next" | "previous" => {
            let len = lib.songs.len();
            lib.current = if name == "next" {
                (lib.current + 1) % len
            } else {
                (lib.current + len - 1) % len
            };
            lib.elapsed = 0.0;
            (ok(), Some("player"))
        }
        "move" => match (arg_u32(0), arg_u32(1)) {
            (Some(from), Some(to))
                if (from as usize) < lib.songs.len() && (to as usize) < lib.songs.len() =>
            {
                let song = lib.songs.remove(from as usize);
                lib.songs.insert(to as usize, song);
                (ok(), Some("playlist"))
            }
            _ => (ack(2, "move", "Bad song index"), None),
        },
        other => (ack(5, other, "unknown command"), None),
    }
}

// ── client helpers ────────────────────────────────────────────────────────────

pub const WAIT: Duration = Duration::from_secs(5);

pub fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    false
}

/// Pop events until one matches.  Everything popped is returned, the match
/// last.
pub fn events_until(client: &mut Client, mut pred: impl FnMut(&Event) -> bool) -> Vec<Event> {
    let deadline = Instant::now() + WAIT;
    let mut seen = Vec::new();
    while Instant::now() < deadline {
        while let Some(event) = client.pop_event() {
            let done = pred(&event);
            seen.push(event);
            if done {
                return seen;
            }
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    panic!("no matching event within {:?}, saw {:?}", WAIT, seen);
}

/// Pop everything that arrives within `window`.
pub fn events_for(client: &mut Client, window: Duration) -> Vec<Event> {
    let deadline = Instant::now() + window;
    let mut seen = Vec::new();
    while Instant::now() < deadline {
        while let Some(event) = client.pop_event() {
            seen.push(event);
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    seen
}

pub fn ready_client(server: &FakeServer) -> Client {
    let mut client = Client::new(server.config());
    client.connect().unwrap();
    assert!(
        wait_until(|| client.lifecycle() == mupwit_core::Lifecycle::Ready),
        "engine did not become ready: {:?}",
        client.lifecycle()
    );
    client
}

pub fn png(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
    let image = image::RgbaImage::from_pixel(width, height, image::Rgba(rgba));
    let mut bytes = std::io::Cursor::new(Vec::new());
    image
        .write_to(&mut bytes, image::ImageFormat::Png)
        .unwrap();
    bytes.into_inner()
}
