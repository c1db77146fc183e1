//! Idle/noidle long-poll state machine.
//!
//! ```text
//!            enter (send idle)
//!   Active ───────────────────▶ Idle
//!     ▲                          │
//!     ├── poll: reply arrived ◀──┤
//!     └── interrupt (noidle) ◀───┘
//! ```
//!
//! Changes reported by either path accumulate until the engine takes them.

use mupwit_proto::error::Result;
use mupwit_proto::{ChangeMask, Connection};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleState {
    /// No long-poll outstanding; regular commands may be sent
    Active,
    /// The server is holding an `idle`; only `noidle` may be sent
    Idle,
}

pub struct Idler {
    state: IdleState,
    subscribe: ChangeMask,
    changes: ChangeMask,
}

impl Idler {
    pub fn new(subscribe: ChangeMask) -> Self {
        Self {
            state: IdleState::Active,
            subscribe,
            changes: ChangeMask::NONE,
        }
    }

    pub fn state(&self) -> IdleState {
        self.state
    }

    /// Changes seen but not yet taken.
    pub fn changes(&self) -> ChangeMask {
        self.changes
    }

    pub fn take_changes(&mut self) -> ChangeMask {
        self.changes.take()
    }

    /// Start a long-poll.  Does not wait for the reply.
    pub async fn enter(&mut self, conn: &mut Connection) -> Result<()> {
        assert_eq!(self.state, IdleState::Active, "idle entered twice");
        conn.send_idle(self.subscribe).await?;
        self.state = IdleState::Idle;
        Ok(())
    }

    /// Non-blocking check for an idle reply.  Returns true when the server
    /// answered and the machine is back to `Active`.
    pub async fn poll(&mut self, conn: &mut Connection) -> Result<bool> {
        if self.state != IdleState::Idle || !conn.has_pending_input()? {
            return Ok(false);
        }
        let changes = conn.read_idle_changes().await?;
        debug!("idle woke up: {:?}", changes);
        self.changes.insert(changes);
        self.state = IdleState::Active;
        Ok(true)
    }

    /// Leave the long-poll so regular commands can be sent.  A no-op when
    /// already `Active`.  Blocks until the server acknowledges, which it
    /// does immediately.
    pub async fn interrupt(&mut self, conn: &mut Connection) -> Result<()> {
        if self.state == IdleState::Active {
            return Ok(());
        }
        let changes = conn.noidle().await?;
        if !changes.is_empty() {
            debug!("noidle collected: {:?}", changes);
        }
        self.changes.insert(changes);
        self.state = IdleState::Active;
        Ok(())
    }
}
