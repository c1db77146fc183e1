//! Snapshots shared between the engine and the presentation thread.
//!
//! The engine is the only writer.  Every refresh fetches from the server
//! first and takes the write lock only to swap the new value in, so a reader
//! never sees a half-written snapshot and no guard is held across an await.

use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

use mupwit_proto::error::Result;
use mupwit_proto::types::{Album, Queue, Song, Status};
use mupwit_proto::Connection;
use tracing::{debug, info};

use crate::lifecycle::Lifecycle;
use crate::request::RequestRegistry;

/// Playback status and the song it refers to.  Kept under one lock so the
/// pair is always read consistently.
#[derive(Debug, Clone, Default)]
pub struct Playback {
    pub status: Option<Status>,
    pub song: Option<Song>,
}

#[derive(Default)]
pub struct Shared {
    lifecycle: RwLock<Lifecycle>,
    playback: RwLock<Playback>,
    queue: RwLock<Queue>,
    albums: RwLock<Vec<Album>>,
    requests: Mutex<RequestRegistry>,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    pub fn lifecycle(&self) -> Lifecycle {
        *read(&self.lifecycle)
    }

    pub fn set_lifecycle(&self, state: Lifecycle) {
        let mut current = write(&self.lifecycle);
        if *current != state {
            info!("lifecycle {} -> {}", *current, state);
            *current = state;
        }
    }

    pub fn playback(&self) -> RwLockReadGuard<'_, Playback> {
        read(&self.playback)
    }

    pub fn queue(&self) -> RwLockReadGuard<'_, Queue> {
        read(&self.queue)
    }

    pub fn albums(&self) -> RwLockReadGuard<'_, Vec<Album>> {
        read(&self.albums)
    }

    pub fn requests(&self) -> MutexGuard<'_, RequestRegistry> {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fetch the status.  Returns true when it points at a different song
    /// than the cached one.
    pub(crate) async fn refresh_status(&self, conn: &mut Connection) -> Result<bool> {
        let status = conn.status().await?;
        let mut playback = write(&self.playback);
        let cached_id = playback.song.as_ref().and_then(|s| s.id);
        let song_changed = status.song_id != cached_id;
        playback.status = Some(status);
        Ok(song_changed)
    }

    pub(crate) async fn refresh_song(&self, conn: &mut Connection) -> Result<()> {
        let song = conn.current_song().await?;
        debug!(
            "current song: {}",
            song.as_ref().map_or("none", |s| s.title_or_filename())
        );
        write(&self.playback).song = song;
        Ok(())
    }

    /// Look up the song the cached status points at by its queue id.
    pub(crate) async fn refresh_song_by_id(&self, conn: &mut Connection) -> Result<()> {
        let id = read(&self.playback).status.as_ref().and_then(|s| s.song_id);
        let song = match id {
            Some(id) => conn.song_by_id(id).await?,
            None => None,
        };
        debug!(
            "song {:?}: {}",
            id,
            song.as_ref().map_or("none", |s| s.title_or_filename())
        );
        write(&self.playback).song = song;
        Ok(())
    }

    /// Refresh the queue and hand back a copy for the event.
    pub(crate) async fn refresh_queue(&self, conn: &mut Connection) -> Result<Queue> {
        let started = Instant::now();
        let queue = conn.queue().await?;
        info!(
            "queue refreshed in {} ms ({} songs)",
            started.elapsed().as_millis(),
            queue.len()
        );
        *write(&self.queue) = queue.clone();
        Ok(queue)
    }

    pub(crate) async fn refresh_albums(&self, conn: &mut Connection) -> Result<Vec<Album>> {
        let started = Instant::now();
        let albums = conn.albums().await?;
        info!(
            "albums refreshed in {} ms ({} albums)",
            started.elapsed().as_millis(),
            albums.len()
        );
        *write(&self.albums) = albums.clone();
        Ok(albums)
    }

    /// Mirror a successful `move` in the cached queue.
    pub(crate) fn apply_move(&self, from: u32, to: u32) -> bool {
        write(&self.queue).move_item(from as usize, to as usize)
    }

    pub(crate) fn release_playback(&self) {
        *write(&self.playback) = Playback::default();
    }
}
