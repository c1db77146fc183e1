//! Connection lifecycle as seen by the presentation layer.
//!
//! ```text
//!   Dead ──connect()──▶ Connecting ──greeting + initial fetch──▶ Ready
//!                           │                                     │
//!                           └──────────── fatal error ────────────┴──▶ Error
//!   Ready ──Close──▶ Dead
//! ```

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Lifecycle {
    #[default]
    Dead,
    Connecting,
    Ready,
    Error,
}

impl std::fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Lifecycle::Dead => "dead",
            Lifecycle::Connecting => "connecting",
            Lifecycle::Ready => "ready",
            Lifecycle::Error => "error",
        };
        f.write_str(s)
    }
}
