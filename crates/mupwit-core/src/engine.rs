//! The engine thread: sole owner of the server connection.
//!
//! ```text
//!   presentation ──Action──▶ [bounded] ──▶ Engine::tick ──▶ Connection
//!        ▲                                   │    ▲
//!        └──────Event────── [bounded] ◀──────┘    └── decode workers
//! ```
//!
//! One tick:
//!   1. count the status timer down, flush finished decodes
//!   2. nothing to do: poll the outstanding idle, or enter idle
//!      otherwise: interrupt the idle and run every queued action
//!   3. service one artwork request
//!   4. turn accumulated idle changes into refreshes and events
//!   5. refresh the status when the timer ran out

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use mupwit_proto::config::{Config, ServerAddress};
use mupwit_proto::error::Result;
use mupwit_proto::protocol::Command;
use mupwit_proto::{ChangeMask, Connection};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::action::Action;
use crate::artwork::{self, Decoded};
use crate::cache::Shared;
use crate::event::{Color, Event};
use crate::idle::{IdleState, Idler};
use crate::lifecycle::Lifecycle;
use crate::queue::{QueueReceiver, QueueSender};
use crate::request::{RequestId, Service};

pub(crate) struct Engine {
    conn: Connection,
    shared: Arc<Shared>,
    actions: QueueReceiver<Action>,
    events: QueueSender<Event>,
    idler: Idler,
    decoded_tx: UnboundedSender<Decoded>,
    decoded_rx: UnboundedReceiver<Decoded>,
    status_interval: Duration,
    /// Time left until the next status refresh
    status_timer: Duration,
    /// Set after our own `move` so its queue change echo is ignored
    queue_changed_by_us: bool,
    should_close: bool,
}

/// Ack errors are logged and the command is treated as not having happened.
/// Anything else leaves the connection unusable and is passed on.
fn tolerate<T>(what: &str, result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if !e.is_fatal() => {
            warn!("Engine: {} failed: {}", what, e);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

impl Engine {
    fn new(
        conn: Connection,
        shared: Arc<Shared>,
        actions: QueueReceiver<Action>,
        events: QueueSender<Event>,
        status_interval: Duration,
    ) -> Self {
        let (decoded_tx, decoded_rx) = mpsc::unbounded_channel();
        Self {
            conn,
            shared,
            actions,
            events,
            idler: Idler::new(ChangeMask::ALL),
            decoded_tx,
            decoded_rx,
            status_interval,
            status_timer: status_interval,
            queue_changed_by_us: false,
            should_close: false,
        }
    }

    fn emit(&self, event: Event) {
        self.events.push(event);
    }

    /// Fill every cache once and announce it.
    async fn initial_fetch(&mut self) -> Result<()> {
        self.shared.refresh_status(&mut self.conn).await?;
        self.shared.refresh_song(&mut self.conn).await?;
        let queue = self.shared.refresh_queue(&mut self.conn).await?;
        let albums = self.shared.refresh_albums(&mut self.conn).await?;

        self.emit(Event::StatusChanged);
        self.emit(Event::SongChanged);
        self.emit(Event::QueueChanged(queue));
        self.emit(Event::AlbumsListChanged(albums));
        Ok(())
    }

    async fn run(&mut self, tick: Duration) -> Result<()> {
        info!("Engine: starting loop ({} ms tick)", tick.as_millis());
        let mut interval = tokio::time::interval(tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last = Instant::now();

        loop {
            interval.tick().await;
            let now = Instant::now();
            let dt = now - last;
            last = now;

            self.tick(dt).await?;

            if self.should_close {
                info!("Engine: close requested");
                return Ok(());
            }
            if self.actions.is_disconnected() {
                info!("Engine: client dropped, closing");
                return Ok(());
            }
        }
    }

    async fn tick(&mut self, dt: Duration) -> Result<()> {
        self.status_timer = self.status_timer.saturating_sub(dt);
        self.flush_decoded();

        let first = self.actions.pop();
        let refresh_due = self.status_timer.is_zero();
        let requests_waiting = self.shared.requests().has_pending();

        if first.is_none() && !refresh_due && !requests_waiting {
            match self.idler.state() {
                IdleState::Idle => {
                    self.idler.poll(&mut self.conn).await?;
                }
                IdleState::Active if self.idler.changes().is_empty() => {
                    self.idler.enter(&mut self.conn).await?;
                }
                IdleState::Active => {}
            }
        } else {
            self.idler.interrupt(&mut self.conn).await?;
            let mut next = first;
            while let Some(action) = next {
                self.execute(action).await?;
                if self.should_close {
                    return Ok(());
                }
                next = self.actions.pop();
            }
        }

        if self.idler.state() == IdleState::Idle {
            return Ok(());
        }

        self.service_request().await?;
        self.apply_changes().await?;

        if self.status_timer.is_zero() {
            tolerate("status", self.shared.refresh_status(&mut self.conn).await)?;
            self.emit(Event::Elapsed);
            self.status_timer = self.status_interval;
        }
        Ok(())
    }

    // ── actions ───────────────────────────────────────────────────────────────

    async fn execute(&mut self, action: Action) -> Result<()> {
        debug!("Engine: action {:?}", action);
        match action {
            Action::Toggle => self.run_then_refresh(Command::Pause).await?,
            Action::SeekSeconds(seconds) => {
                self.run_then_refresh(Command::SeekCur { seconds }).await?
            }
            Action::PlaySong(id) => self.run_then_refresh(Command::PlayId { id }).await?,
            Action::Next => self.change_song(Command::Next).await?,
            Action::Prev => self.change_song(Command::Previous).await?,
            Action::ReorderQueue { from, to } => self.reorder(from, to).await?,
            Action::Close => self.should_close = true,
        }
        Ok(())
    }

    /// Run a playback command; on success the status is refreshed on this
    /// tick instead of waiting for the timer.
    async fn run_then_refresh(&mut self, cmd: Command) -> Result<()> {
        let name = cmd.name();
        if tolerate(name, self.conn.run_ok(cmd).await)?.is_some() {
            self.status_timer = Duration::ZERO;
        }
        Ok(())
    }

    async fn change_song(&mut self, cmd: Command) -> Result<()> {
        let name = cmd.name();
        if tolerate(name, self.conn.run_ok(cmd).await)?.is_none() {
            return Ok(());
        }
        if tolerate("status", self.shared.refresh_status(&mut self.conn).await)?.is_none() {
            return Ok(());
        }
        if tolerate("currentsong", self.shared.refresh_song(&mut self.conn).await)?.is_some() {
            self.emit(Event::SongChanged);
        }
        Ok(())
    }

    async fn reorder(&mut self, from: u32, to: u32) -> Result<()> {
        if from == to {
            debug!("Engine: reorder {} -> {} is a no-op", from, to);
            return Ok(());
        }
        if tolerate("move", self.conn.run_ok(Command::Move { from, to }).await)?.is_none() {
            return Ok(());
        }
        if !self.shared.apply_move(from, to) {
            warn!("Engine: cached queue out of range for move {} -> {}", from, to);
        }
        self.queue_changed_by_us = true;
        Ok(())
    }

    // ── artwork ───────────────────────────────────────────────────────────────

    async fn service_request(&mut self) -> Result<()> {
        let service = self.shared.requests().next_service();
        let (id, uri) = match service {
            Service::Nothing => return Ok(()),
            Service::Dropped(id) => {
                debug!("Engine: artwork {} canceled before service", id);
                return Ok(());
            }
            Service::Fetch { id, uri } => (id, uri),
        };

        let picture = tolerate("readpicture", self.conn.read_picture(&uri).await)?.flatten();
        let Some(picture) = picture else {
            debug!("Engine: artwork {}: none for {}", id, uri);
            self.deliver(id, None);
            return Ok(());
        };

        let format = picture.mime.as_deref().and_then(artwork::image_format);
        let Some(format) = format else {
            debug!(
                "Engine: artwork {}: unsupported type {:?}",
                id,
                picture.mime.as_deref().unwrap_or("none")
            );
            self.deliver(id, None);
            return Ok(());
        };

        if let Err(e) = artwork::spawn_decode(id, picture.data, format, self.decoded_tx.clone()) {
            error!("Engine: failed to spawn decode worker: {}", e);
            self.deliver(id, None);
        }
        Ok(())
    }

    fn flush_decoded(&mut self) {
        while let Ok(decoded) = self.decoded_rx.try_recv() {
            self.deliver(decoded.id, decoded.artwork);
        }
    }

    /// Retire a serviced request and emit its response unless it was
    /// canceled in the meantime.
    fn deliver(&self, id: RequestId, artwork: Option<(image::RgbaImage, Color)>) {
        if !self.shared.requests().finish(id) {
            debug!("Engine: artwork {} canceled, dropping result", id);
            return;
        }
        let (image, color) = match artwork {
            Some((image, color)) => (Some(image), color),
            None => (None, Color::default()),
        };
        self.emit(Event::ArtworkResponse { id, image, color });
    }

    // ── server changes ────────────────────────────────────────────────────────

    async fn apply_changes(&mut self) -> Result<()> {
        let mut changes = self.idler.take_changes();
        if changes.is_empty() {
            return Ok(());
        }
        debug!("Engine: applying {:?}", changes);

        if changes.contains(ChangeMask::QUEUE) && self.queue_changed_by_us {
            debug!("Engine: ignoring echo of our own queue change");
            changes.remove(ChangeMask::QUEUE);
            self.queue_changed_by_us = false;
        }

        if changes.contains(ChangeMask::PLAYER) {
            if let Some(song_changed) =
                tolerate("status", self.shared.refresh_status(&mut self.conn).await)?
            {
                self.emit(Event::StatusChanged);
                if song_changed
                    && tolerate(
                        "playlistid",
                        self.shared.refresh_song_by_id(&mut self.conn).await,
                    )?
                    .is_some()
                {
                    self.emit(Event::SongChanged);
                }
            }
        }
        if changes.contains(ChangeMask::QUEUE) {
            if let Some(queue) =
                tolerate("playlistinfo", self.shared.refresh_queue(&mut self.conn).await)?
            {
                self.emit(Event::QueueChanged(queue));
            }
        }
        if changes.contains(ChangeMask::DATABASE) {
            if let Some(albums) =
                tolerate("list", self.shared.refresh_albums(&mut self.conn).await)?
            {
                self.emit(Event::AlbumsListChanged(albums));
            }
        }
        Ok(())
    }

    // ── shutdown ──────────────────────────────────────────────────────────────

    async fn shutdown(mut self) {
        if let Err(e) = self.idler.interrupt(&mut self.conn).await {
            warn!("Engine: noidle on shutdown: {}", e);
        }
        if let Err(e) = self.conn.close().await {
            debug!("Engine: close: {}", e);
        }
        self.shared.release_playback();
        self.shared.set_lifecycle(Lifecycle::Dead);
    }
}

/// Sets the lifecycle to `Error` if the engine thread unwinds.
struct PanicGuard(Arc<Shared>);

impl Drop for PanicGuard {
    fn drop(&mut self) {
        if std::thread::panicking() {
            error!("Engine: thread panicked");
            self.0.release_playback();
            self.0.set_lifecycle(Lifecycle::Error);
        }
    }
}

/// Start the engine thread.  The lifecycle must already be `Connecting`.
pub(crate) fn spawn(
    config: &Config,
    shared: Arc<Shared>,
    actions: QueueReceiver<Action>,
    events: QueueSender<Event>,
) -> std::io::Result<JoinHandle<()>> {
    let address = config.server.address();
    let timeout = config.server.timeout();
    let tick = config.engine.tick();
    let status_interval = config.engine.status_interval();

    std::thread::Builder::new()
        .name("mupwit-engine".into())
        .spawn(move || {
            let _guard = PanicGuard(shared.clone());
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    error!("Engine: failed to build runtime: {}", e);
                    shared.set_lifecycle(Lifecycle::Error);
                    return;
                }
            };
            runtime.block_on(engine_main(
                address,
                timeout,
                tick,
                status_interval,
                shared,
                actions,
                events,
            ));
        })
}

async fn engine_main(
    address: ServerAddress,
    timeout: Duration,
    tick: Duration,
    status_interval: Duration,
    shared: Arc<Shared>,
    actions: QueueReceiver<Action>,
    events: QueueSender<Event>,
) {
    let conn = match Connection::connect(&address, timeout).await {
        Ok(conn) => conn,
        Err(e) => {
            error!("Engine: connection to {} failed: {}", address, e);
            shared.set_lifecycle(Lifecycle::Error);
            return;
        }
    };

    let mut engine = Engine::new(conn, shared.clone(), actions, events, status_interval);
    if let Err(e) = engine.initial_fetch().await {
        error!("Engine: initial fetch failed: {}", e);
        shared.release_playback();
        shared.set_lifecycle(Lifecycle::Error);
        return;
    }
    shared.set_lifecycle(Lifecycle::Ready);

    match engine.run(tick).await {
        Ok(()) => engine.shutdown().await,
        Err(e) => {
            error!("Engine: connection lost: {}", e);
            shared.release_playback();
            shared.set_lifecycle(Lifecycle::Error);
        }
    }
}
