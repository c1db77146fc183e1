//! Presentation-facing handle.
//!
//! Every call is synchronous and returns immediately; the only thing that
//! waits is `join`.

use std::sync::{Arc, RwLockReadGuard};
use std::thread::JoinHandle;

use mupwit_proto::config::Config;
use mupwit_proto::types::{Album, Queue};
use tracing::{debug, error};

use crate::action::Action;
use crate::cache::{Playback, Shared};
use crate::engine;
use crate::error::{EngineError, Result};
use crate::event::Event;
use crate::lifecycle::Lifecycle;
use crate::queue::{self, QueueReceiver, QueueSender};
use crate::request::RequestId;

pub struct Client {
    config: Config,
    shared: Arc<Shared>,
    actions: QueueSender<Action>,
    events: QueueReceiver<Event>,
    /// Engine ends of the queues until `connect` hands them over
    engine_side: Option<(QueueReceiver<Action>, QueueSender<Event>)>,
    thread: Option<JoinHandle<()>>,
}

impl Client {
    pub fn new(config: Config) -> Self {
        let (action_tx, action_rx) = queue::bounded("action", config.engine.action_capacity);
        let (event_tx, event_rx) = queue::bounded("event", config.engine.event_capacity);
        Self {
            config,
            shared: Arc::new(Shared::default()),
            actions: action_tx,
            events: event_rx,
            engine_side: Some((action_rx, event_tx)),
            thread: None,
        }
    }

    /// Start the engine thread.  A client connects at most once; reconnecting
    /// takes a fresh `Client`.
    pub fn connect(&mut self) -> Result<()> {
        let Some((actions, events)) = self.engine_side.take() else {
            return Err(EngineError::AlreadyStarted);
        };
        self.shared.set_lifecycle(Lifecycle::Connecting);
        match engine::spawn(&self.config, self.shared.clone(), actions, events) {
            Ok(handle) => {
                self.thread = Some(handle);
                Ok(())
            }
            Err(e) => {
                error!("failed to start engine thread: {}", e);
                self.shared.set_lifecycle(Lifecycle::Error);
                Err(EngineError::Spawn(e))
            }
        }
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.shared.lifecycle()
    }

    /// Queue an action for the engine.  Returns false when the queue is full
    /// and the action was dropped.
    pub fn push_action(&self, action: Action) -> bool {
        self.actions.push(action)
    }

    pub fn pop_event(&mut self) -> Option<Event> {
        self.events.pop()
    }

    /// Ask for the artwork of a song.  The answer arrives later as an
    /// `Event::ArtworkResponse` carrying the returned id.
    pub fn request_artwork(&self, uri: impl Into<String>) -> RequestId {
        let uri = uri.into();
        let id = self.shared.requests().insert(uri.clone());
        debug!("artwork {} requested for {}", id, uri);
        id
    }

    /// Returns false when the id is unknown or its response was already
    /// delivered.
    pub fn cancel_request(&self, id: RequestId) -> bool {
        self.shared.requests().cancel(id)
    }

    pub fn playback(&self) -> RwLockReadGuard<'_, Playback> {
        self.shared.playback()
    }

    pub fn queue(&self) -> RwLockReadGuard<'_, Queue> {
        self.shared.queue()
    }

    pub fn albums(&self) -> RwLockReadGuard<'_, Vec<Album>> {
        self.shared.albums()
    }

    /// Wait for the engine thread to exit.  Push `Action::Close` first,
    /// otherwise this only returns once the connection fails.
    pub fn join(&mut self) {
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                error!("engine thread panicked");
            }
        }
    }
}
