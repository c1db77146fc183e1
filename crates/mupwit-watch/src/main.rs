//! Headless front end: prints engine events and turns stdin lines into
//! actions.
//!
//! ```text
//!   toggle | next | prev | seek <s> | play <song id> | move <from> <to>
//!   art <uri> | cancel <request> | status | queue | albums | quit
//! ```

use std::collections::HashMap;
use std::io::BufRead;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::time::Duration;

use mupwit_core::{Action, Client, Event, Lifecycle, RequestId};
use mupwit_proto::config::Config;
use tracing::{info, warn};

const FRAME: Duration = Duration::from_millis(1000 / 60);

fn main() -> anyhow::Result<()> {
    let data_dir = mupwit_proto::platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("mupwit.log");
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,mupwit_core=debug")),
        )
        .init();

    info!("Log file: {:?}", log_path);

    let config = Config::load()?;
    info!("Config loaded from: {:?}", Config::config_path());
    info!("Server: {}", config.server.address());

    let mut client = Client::new(config);
    client.connect()?;

    let lines = spawn_stdin_reader()?;
    let mut watch = Watch::default();

    loop {
        while let Some(event) = client.pop_event() {
            watch.print_event(&client, event);
        }

        match lines.try_recv() {
            Ok(line) => {
                if !watch.handle_line(&mut client, line.trim()) {
                    break;
                }
            }
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => {
                client.push_action(Action::Close);
                break;
            }
        }

        match client.lifecycle() {
            Lifecycle::Error => {
                client.join();
                anyhow::bail!("connection to the server failed, see {:?}", log_path);
            }
            Lifecycle::Dead => break,
            Lifecycle::Connecting | Lifecycle::Ready => {}
        }

        std::thread::sleep(FRAME);
    }

    client.join();
    info!("Bye");
    Ok(())
}

fn spawn_stdin_reader() -> std::io::Result<Receiver<String>> {
    let (tx, rx) = mpsc::channel();
    std::thread::Builder::new()
        .name("mupwit-stdin".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        })?;
    Ok(rx)
}

#[derive(Default)]
struct Watch {
    /// Outstanding artwork requests by their printed number
    requests: HashMap<u64, RequestId>,
}

impl Watch {
    /// Returns false once the user asked to quit.
    fn handle_line(&mut self, client: &mut Client, line: &str) -> bool {
        let mut words = line.split_whitespace();
        let Some(cmd) = words.next() else {
            return true;
        };
        let rest: Vec<&str> = words.collect();
        let num = |i: usize| rest.get(i).and_then(|w| w.parse::<u32>().ok());

        let action = match (cmd, rest.len()) {
            ("toggle", 0) => Some(Action::Toggle),
            ("next", 0) => Some(Action::Next),
            ("prev", 0) => Some(Action::Prev),
            ("seek", 1) => num(0).map(Action::SeekSeconds).or_else(|| unknown(line)),
            ("play", 1) => num(0).map(Action::PlaySong).or_else(|| unknown(line)),
            ("move", 2) => num(0)
                .zip(num(1))
                .map(|(from, to)| Action::ReorderQueue { from, to })
                .or_else(|| unknown(line)),
            ("quit", 0) => {
                client.push_action(Action::Close);
                return false;
            }
            ("art", n) if n > 0 => {
                let id = client.request_artwork(rest.join(" "));
                self.requests.insert(id.get(), id);
                say(&format!("artwork {} requested", id));
                None
            }
            ("cancel", 1) => {
                let id = rest[0].trim_start_matches('#').parse::<u64>().ok();
                match id.and_then(|n| self.requests.remove(&n)) {
                    Some(id) if client.cancel_request(id) => say(&format!("artwork {} canceled", id)),
                    _ => say("no such request"),
                }
                None
            }
            ("status", 0) => {
                self.print_status(client);
                None
            }
            ("queue", 0) => {
                self.print_queue(client);
                None
            }
            ("albums", 0) => {
                self.print_albums(client);
                None
            }
            _ => unknown(line),
        };

        if let Some(action) = action {
            if !client.push_action(action) {
                warn!("action {:?} dropped", action);
                say("busy, action dropped");
            }
        }
        true
    }

    fn print_event(&mut self, client: &Client, event: Event) {
        match event {
            // Too chatty for a terminal
            Event::Elapsed => {}
            Event::StatusChanged => {
                let playback = client.playback();
                if let Some(status) = playback.status.as_ref() {
                    say(&format!(
                        "{:?} {} / {}",
                        status.state,
                        format_time(status.elapsed_ms / 1000),
                        format_time(u64::from(status.duration_s))
                    ));
                }
            }
            Event::SongChanged => {
                let playback = client.playback();
                match playback.song.as_ref() {
                    Some(song) => say(&format!(
                        "now playing: {} - {} ({})",
                        song.artist_or_unknown(),
                        song.title_or_filename(),
                        song.album_or_unknown()
                    )),
                    None => say("nothing playing"),
                }
            }
            Event::QueueChanged(queue) => say(&format!(
                "queue: {} songs, {}",
                queue.len(),
                format_time(queue.total_duration_s)
            )),
            Event::AlbumsListChanged(albums) => say(&format!("albums: {}", albums.len())),
            Event::ArtworkResponse { id, image, color } => {
                self.requests.remove(&id.get());
                match image {
                    Some(image) => say(&format!(
                        "artwork {}: {}x{}, colour #{:02x}{:02x}{:02x}",
                        id,
                        image.width(),
                        image.height(),
                        color.r,
                        color.g,
                        color.b
                    )),
                    None => say(&format!("artwork {}: none", id)),
                }
            }
        }
    }

    fn print_status(&self, client: &Client) {
        let playback = client.playback();
        let snapshot = serde_json::json!({
            "lifecycle": client.lifecycle(),
            "status": playback.status,
            "song": playback.song,
            "queue_length": client.queue().len(),
            "albums": client.albums().len(),
            "pending_artwork": self.requests.len(),
        });
        match serde_json::to_string_pretty(&snapshot) {
            Ok(text) => println!("{}", text),
            Err(e) => warn!("status serialisation failed: {}", e),
        }
    }

    fn print_queue(&self, client: &Client) {
        let current = client.playback().status.as_ref().and_then(|s| s.song_id);
        let queue = client.queue();
        for item in &queue.items {
            let marker = if item.song.id.is_some() && item.song.id == current {
                '>'
            } else {
                ' '
            };
            println!(
                "{} {:>3} [{}] {} - {} {}",
                marker,
                item.number,
                item.song.id.map_or_else(|| "?".to_string(), |id| id.to_string()),
                item.song.artist_or_unknown(),
                item.song.title_or_filename(),
                format_time(u64::from(item.song.duration_s))
            );
        }
        println!("  {} songs, {}", queue.len(), format_time(queue.total_duration_s));
    }

    fn print_albums(&self, client: &Client) {
        for album in client.albums().iter() {
            println!(
                "{} - {}  {}",
                album.artist.as_deref().unwrap_or(mupwit_proto::types::UNKNOWN),
                album.title,
                album.first_song_uri.as_deref().unwrap_or("")
            );
        }
    }
}

fn unknown(line: &str) -> Option<Action> {
    say(&format!("unknown command: {}", line));
    None
}

fn say(message: &str) {
    println!("{} {}", chrono::Local::now().format("%H:%M:%S"), message);
}

/// `m:ss`, or `h:mm:ss` from one hour on.
fn format_time(secs: u64) -> String {
    let (h, m, s) = (secs / 3600, secs / 60 % 60, secs % 60);
    if h > 0 {
        format!("{}:{:02}:{:02}", h, m, s)
    } else {
        format!("{}:{:02}", m, s)
    }
}
