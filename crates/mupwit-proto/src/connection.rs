//! Line-protocol connection to the music server.
//!
//! ```text
//!   Connection::connect(address)
//!         │
//!         ├── writer  ← Command::encode() lines
//!         └── reader  ← BufReader over the socket
//!                         ├── `key: value` pairs until `OK` / `ACK`
//!                         └── `binary: N` + N raw bytes (readpicture)
//! ```
//!
//! The connection tracks whether an `idle` is outstanding.  While it is,
//! the only command the server accepts is `noidle`; anything else would be
//! answered out of order and desync the stream, so it panics instead.
use std::time::Duration;

use futures_util::FutureExt;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

use crate::config::ServerAddress;
use crate::error::{ProtocolError, Result};
use crate::protocol::{changes_from_pairs, parse_greeting, ChangeMask, Command, Pair};
use crate::types::{Album, Queue, Song, Status};

type BoxedReader = BufReader<Box<dyn AsyncRead + Send + Unpin>>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Initial artwork buffer size; grows geometrically.
const PICTURE_INITIAL_CAPACITY: usize = 256 * 1024;

/// Largest `binary` chunk accepted from the server.
pub const MAX_CHUNK_LEN: usize = 16 * 1024 * 1024;

/// Raw artwork bytes as sent by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Picture {
    /// `type` field of the first chunk, e.g. `image/png`
    pub mime: Option<String>,
    pub data: Vec<u8>,
}

pub struct Connection {
    reader: BoxedReader,
    writer: BoxedWriter,
    timeout: Duration,
    version: String,
    idle: bool,
}

impl Connection {
    pub async fn connect(address: &ServerAddress, timeout: Duration) -> Result<Self> {
        info!("connecting to {}", address);
        match address {
            ServerAddress::Tcp { host, port } => {
                let stream = with_timeout(
                    timeout,
                    tokio::net::TcpStream::connect((host.as_str(), *port)),
                )
                .await??;
                stream.set_nodelay(true)?;
                Self::from_stream(stream, timeout).await
            }
            #[cfg(unix)]
            ServerAddress::Unix(path) => {
                let stream =
                    with_timeout(timeout, tokio::net::UnixStream::connect(path)).await??;
                Self::from_stream(stream, timeout).await
            }
        }
    }

    /// Wrap an already-connected stream and consume the greeting.
    pub async fn from_stream<S>(stream: S, timeout: Duration) -> Result<Self>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let reader: Box<dyn AsyncRead + Send + Unpin> = Box::new(read_half);
        let mut conn = Self {
            reader: BufReader::new(reader),
            writer: Box::new(write_half),
            timeout,
            version: String::new(),
            idle: false,
        };
        let greeting = conn.read_line().await?;
        conn.version = parse_greeting(&greeting)?;
        info!("connected, server protocol {}", conn.version);
        Ok(conn)
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// True while an `idle` command is outstanding.
    pub fn is_idle(&self) -> bool {
        self.idle
    }

    // ── framing ───────────────────────────────────────────────────────────────

    async fn write_command(&mut self, cmd: &Command) -> Result<()> {
        if self.idle && *cmd != Command::NoIdle {
            panic!(
                "protocol violation: `{}` sent while an idle command is outstanding",
                cmd.name()
            );
        }
        let line = cmd.encode();
        debug!("send {}", line.trim_end());
        with_timeout(self.timeout, async {
            self.writer.write_all(line.as_bytes()).await?;
            self.writer.flush().await
        })
        .await??;
        Ok(())
    }

    async fn read_line(&mut self) -> Result<String> {
        let mut line = String::new();
        let n = with_timeout(self.timeout, self.reader.read_line(&mut line)).await??;
        if n == 0 {
            return Err(ProtocolError::Closed);
        }
        if line.ends_with('\n') {
            line.pop();
        }
        Ok(line)
    }

    /// Read pairs up to the terminating `OK`.
    async fn read_pairs(&mut self) -> Result<Vec<Pair>> {
        let mut pairs = Vec::new();
        loop {
            let line = self.read_line().await?;
            if line == "OK" {
                return Ok(pairs);
            }
            if line.starts_with("ACK ") {
                return Err(ProtocolError::from_ack_line(&line));
            }
            pairs.push(Pair::parse(&line)?);
        }
    }

    /// Send a command and collect its reply.
    pub async fn run(&mut self, cmd: Command) -> Result<Vec<Pair>> {
        self.write_command(&cmd).await?;
        self.read_pairs().await
    }

    /// Send a command whose reply carries no data.
    pub async fn run_ok(&mut self, cmd: Command) -> Result<()> {
        self.run(cmd).await.map(|_| ())
    }

    // ── idle / noidle ─────────────────────────────────────────────────────────

    /// Send `idle` without waiting for the reply.
    pub async fn send_idle(&mut self, mask: ChangeMask) -> Result<()> {
        assert!(!self.idle, "protocol violation: idle sent twice");
        self.write_command(&Command::Idle(mask)).await?;
        self.idle = true;
        Ok(())
    }

    /// Check, without blocking, whether the server has sent anything.
    pub fn has_pending_input(&mut self) -> Result<bool> {
        match self.reader.fill_buf().now_or_never() {
            None => Ok(false),
            Some(Ok([])) => Err(ProtocolError::Closed),
            Some(Ok(_)) => Ok(true),
            Some(Err(e)) => Err(e.into()),
        }
    }

    /// Read the reply to an outstanding `idle`.  Only call this once
    /// `has_pending_input` returned true: the server answers idle only when
    /// something changed.
    pub async fn read_idle_changes(&mut self) -> Result<ChangeMask> {
        assert!(self.idle, "protocol violation: no idle outstanding");
        let result = self.read_pairs().await;
        self.idle = false;
        Ok(changes_from_pairs(&result?))
    }

    /// Cancel an outstanding `idle`.  The server replies immediately, either
    /// with the changes it was about to report or with a bare `OK`.
    pub async fn noidle(&mut self) -> Result<ChangeMask> {
        assert!(self.idle, "protocol violation: noidle without idle");
        self.write_command(&Command::NoIdle).await?;
        let result = self.read_pairs().await;
        self.idle = false;
        Ok(changes_from_pairs(&result?))
    }

    // ── queries ───────────────────────────────────────────────────────────────

    pub async fn status(&mut self) -> Result<Status> {
        let pairs = self.run(Command::Status).await?;
        Ok(Status::from_pairs(&pairs))
    }

    pub async fn current_song(&mut self) -> Result<Option<Song>> {
        let pairs = self.run(Command::CurrentSong).await?;
        Ok(Song::from_pairs(&pairs))
    }

    pub async fn song_by_id(&mut self, id: u32) -> Result<Option<Song>> {
        let pairs = self.run(Command::PlaylistId { id }).await?;
        Ok(Song::from_pairs(&pairs))
    }

    pub async fn queue(&mut self) -> Result<Queue> {
        let pairs = self.run(Command::PlaylistInfo).await?;
        Ok(Queue::from_songs(Song::list_from_pairs(&pairs)))
    }

    /// List all albums, then look up the first song of each.  A failed
    /// lookup leaves that album without a uri.
    pub async fn albums(&mut self) -> Result<Vec<Album>> {
        let pairs = self.run(Command::ListAlbums).await?;
        let mut albums = Album::list_from_pairs(&pairs);

        for album in albums.iter_mut() {
            let cmd = Command::FindFirstInAlbum {
                album: album.title.clone(),
            };
            match self.run(cmd).await {
                Ok(pairs) => {
                    album.first_song_uri = pairs
                        .into_iter()
                        .find(|p| p.key == "file")
                        .map(|p| p.value);
                }
                Err(e) if !e.is_fatal() => {
                    warn!("first song of album {:?}: {}", album.title, e);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(albums)
    }

    /// Chunked `readpicture` transfer.
    ///
    /// Returns `Ok(None)` when the song has no embedded artwork.
    pub async fn read_picture(&mut self, uri: &str) -> Result<Option<Picture>> {
        let mut data: Vec<u8> = Vec::with_capacity(PICTURE_INITIAL_CAPACITY);
        let mut mime: Option<String> = None;
        let mut total: Option<usize> = None;

        loop {
            self.write_command(&Command::ReadPicture {
                uri: uri.to_string(),
                offset: data.len(),
            })
            .await?;

            let mut chunk_len: Option<usize> = None;
            loop {
                let line = self.read_line().await?;
                if line == "OK" {
                    break;
                }
                if line.starts_with("ACK ") {
                    return Err(ProtocolError::from_ack_line(&line));
                }
                let pair = Pair::parse(&line)?;
                match pair.key.as_str() {
                    "type" if mime.is_none() => mime = Some(pair.value),
                    "size" => total = pair.value.parse().ok(),
                    "binary" => {
                        let len: usize = pair
                            .value
                            .parse()
                            .map_err(|_| ProtocolError::Malformed(line.clone()))?;
                        if len > MAX_CHUNK_LEN {
                            return Err(ProtocolError::Malformed(format!(
                                "binary chunk of {} bytes",
                                len
                            )));
                        }
                        chunk_len = Some(len);
                        break;
                    }
                    _ => {}
                }
            }

            let Some(len) = chunk_len else {
                // No binary field: nothing embedded, or the server has
                // nothing past our offset.
                if data.is_empty() {
                    return Ok(None);
                }
                break;
            };

            if data.len() + len > data.capacity() {
                data.reserve((data.len() + len) * 2 - data.len());
            }
            let start = data.len();
            data.resize(start + len, 0);
            with_timeout(self.timeout, self.reader.read_exact(&mut data[start..])).await??;

            // Binary payload is followed by a newline, then the rest of the reply.
            let sep = self.read_line().await?;
            if !sep.is_empty() {
                return Err(ProtocolError::Malformed(format!(
                    "expected newline after binary chunk, got {:?}",
                    sep
                )));
            }
            self.read_pairs().await?;

            if len == 0 || total.is_some_and(|t| data.len() >= t) {
                break;
            }
        }

        debug!(
            "readpicture {}: {} bytes ({})",
            uri,
            data.len(),
            mime.as_deref().unwrap_or("no type")
        );
        if data.is_empty() {
            return Ok(None);
        }
        Ok(Some(Picture { mime, data }))
    }

    /// Say goodbye.  The server closes the socket without replying.
    pub async fn close(mut self) -> Result<()> {
        if self.idle {
            self.noidle().await?;
        }
        self.write_command(&Command::Close).await
    }
}

async fn with_timeout<F: std::future::Future>(timeout: Duration, fut: F) -> Result<F::Output> {
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| ProtocolError::Timeout)
}
