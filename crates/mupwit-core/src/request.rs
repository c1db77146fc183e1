//! Registry of in-flight artwork requests.
//!
//! Ids grow monotonically and are never reused within one client.  The
//! engine services one entry per tick through a persistent round-robin
//! cursor.  An entry stays in the registry, marked in flight, until its
//! result has been delivered, so a cancel that lands while the image is
//! still decoding suppresses the response.

use std::collections::BTreeMap;
use std::ops::Bound;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(u64);

impl RequestId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug)]
pub struct Request {
    pub id: RequestId,
    pub song_uri: String,
    pub canceled: bool,
    in_flight: bool,
}

/// What the engine should do on this tick.
#[derive(Debug, PartialEq, Eq)]
pub enum Service {
    /// No request is waiting
    Nothing,
    /// A canceled request was removed without touching the connection
    Dropped(RequestId),
    /// Read artwork for this uri
    Fetch { id: RequestId, uri: String },
}

#[derive(Debug, Default)]
pub struct RequestRegistry {
    requests: BTreeMap<RequestId, Request>,
    cursor: Option<RequestId>,
    last_id: u64,
}

impl RequestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, song_uri: String) -> RequestId {
        self.last_id += 1;
        let id = RequestId(self.last_id);
        self.requests.insert(
            id,
            Request {
                id,
                song_uri,
                canceled: false,
                in_flight: false,
            },
        );
        id
    }

    /// Mark a request canceled.  Returns false for unknown (or already
    /// delivered) ids.
    pub fn cancel(&mut self, id: RequestId) -> bool {
        match self.requests.get_mut(&id) {
            Some(req) => {
                req.canceled = true;
                true
            }
            None => false,
        }
    }

    /// True when some request still needs a service turn.
    pub fn has_pending(&self) -> bool {
        self.requests.values().any(|r| !r.in_flight)
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Advance the cursor to the next request that has not been serviced
    /// yet, wrapping around at the end.
    pub fn next_service(&mut self) -> Service {
        let after = match self.cursor {
            Some(id) => Bound::Excluded(id),
            None => Bound::Unbounded,
        };
        let next = self
            .requests
            .range((after, Bound::Unbounded))
            .chain(self.requests.iter())
            .find(|(_, r)| !r.in_flight)
            .map(|(id, _)| *id);

        let Some(id) = next else {
            return Service::Nothing;
        };
        self.cursor = Some(id);

        let Some(req) = self.requests.get_mut(&id) else {
            return Service::Nothing;
        };
        if req.canceled {
            self.requests.remove(&id);
            return Service::Dropped(id);
        }
        req.in_flight = true;
        Service::Fetch {
            id,
            uri: req.song_uri.clone(),
        }
    }

    /// Remove a serviced request.  Returns true when its result should be
    /// delivered, false when it was canceled in the meantime.
    pub fn finish(&mut self, id: RequestId) -> bool {
        self.requests.remove(&id).is_some_and(|r| !r.canceled)
    }
}
