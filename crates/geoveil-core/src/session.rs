//! Origin sessions
//!
//! One session per consumer context (window, tab). A session exclusively
//! owns its requests; everything else refers to them by [`RequestHandle`].

use std::collections::HashMap;

use geoveil_privacy::origin_of;

use crate::request::{GeolocationRequest, RequestKind, RequestState};
use crate::timer::TimerKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(pub u64);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(pub u64);

/// Non-owning reference to a request. Stale handles resolve to nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestHandle {
    pub session: SessionId,
    pub request: RequestId,
}

pub type LivenessCheck = Box<dyn Fn() -> bool + Send>;

pub struct SessionOptions {
    pub origin: String,
    /// Internal consumers skip the permission prompt
    pub privileged: bool,
    pub liveness: Option<LivenessCheck>,
}

impl SessionOptions {
    pub fn for_origin(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            privileged: false,
            liveness: None,
        }
    }

    pub fn for_document(url: &str) -> Self {
        Self::for_origin(origin_of(url))
    }

    pub fn privileged(mut self) -> Self {
        self.privileged = true;
        self
    }

    pub fn with_liveness<F>(mut self, check: F) -> Self
    where
        F: Fn() -> bool + Send + 'static,
    {
        self.liveness = Some(Box::new(check));
        self
    }
}

impl std::fmt::Debug for SessionOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionOptions")
            .field("origin", &self.origin)
            .field("privileged", &self.privileged)
            .field("liveness", &self.liveness.is_some())
            .finish()
    }
}

pub struct OriginSession {
    id: SessionId,
    origin: String,
    privileged: bool,
    liveness: Option<LivenessCheck>,
    requests: HashMap<RequestId, GeolocationRequest>,
    /// Queued while the service is initialising, in creation order
    deferred: Vec<RequestId>,
    /// Allowed one-shot requests, oldest first
    pending: Vec<RequestId>,
    /// Allowed watch requests, oldest first
    watching: Vec<RequestId>,
    next_watch_id: i32,
    closed: bool,
}

impl std::fmt::Debug for OriginSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OriginSession")
            .field("id", &self.id)
            .field("origin", &self.origin)
            .field("privileged", &self.privileged)
            .field("requests", &self.requests.len())
            .field("pending", &self.pending)
            .field("watching", &self.watching)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl OriginSession {
    pub(crate) fn new(id: SessionId, options: SessionOptions) -> Self {
        Self {
            id,
            origin: options.origin,
            privileged: options.privileged,
            liveness: options.liveness,
            requests: HashMap::new(),
            deferred: Vec::new(),
            pending: Vec::new(),
            watching: Vec::new(),
            next_watch_id: 0,
            closed: false,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn is_privileged(&self) -> bool {
        self.privileged
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Whether the consumer context is still valid.
    pub fn is_alive(&self) -> bool {
        !self.closed && self.liveness.as_ref().map_or(true, |check| check())
    }

    pub(crate) fn next_watch_id(&mut self) -> i32 {
        let id = self.next_watch_id;
        self.next_watch_id = self.next_watch_id.wrapping_add(1);
        id
    }

    /// Number of allowed requests of the same kind as `kind`.
    pub fn active_count(&self, kind: RequestKind) -> usize {
        if kind.is_watch() {
            self.watching.len()
        } else {
            self.pending.len()
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn watch_count(&self) -> usize {
        self.watching.len()
    }

    pub fn request_count(&self) -> usize {
        self.requests.len()
    }

    pub(crate) fn insert(&mut self, request: GeolocationRequest) {
        self.requests.insert(request.id(), request);
    }

    pub(crate) fn request(&self, id: RequestId) -> Option<&GeolocationRequest> {
        self.requests.get(&id)
    }

    pub(crate) fn request_mut(&mut self, id: RequestId) -> Option<&mut GeolocationRequest> {
        self.requests.get_mut(&id)
    }

    pub(crate) fn defer(&mut self, id: RequestId) {
        self.deferred.push(id);
    }

    pub(crate) fn take_deferred(&mut self) -> Vec<RequestId> {
        std::mem::take(&mut self.deferred)
    }

    /// Record an allowed request in the pending or watching set.
    pub(crate) fn register_allowed(&mut self, id: RequestId) {
        let Some(request) = self.requests.get(&id) else {
            return;
        };
        let set = if request.kind().is_watch() {
            &mut self.watching
        } else {
            &mut self.pending
        };
        if !set.contains(&id) {
            set.push(id);
        }
    }

    /// Drop a request from every set. The caller cancels the returned
    /// request's timer.
    pub(crate) fn remove_request(&mut self, id: RequestId) -> Option<GeolocationRequest> {
        self.deferred.retain(|r| *r != id);
        self.pending.retain(|r| *r != id);
        self.watching.retain(|r| *r != id);
        self.requests.remove(&id)
    }

    /// Allowed one-shot requests, oldest first.
    pub(crate) fn pending_ids(&self) -> Vec<RequestId> {
        self.pending.clone()
    }

    pub(crate) fn watching_ids(&self) -> Vec<RequestId> {
        self.watching.clone()
    }

    pub(crate) fn request_ids(&self) -> Vec<RequestId> {
        let mut ids: Vec<RequestId> = self.requests.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn has_active_callbacks(&self) -> bool {
        !self.pending.is_empty() || !self.watching.is_empty()
    }

    pub fn high_accuracy_requested(&self) -> bool {
        self.pending
            .iter()
            .chain(self.watching.iter())
            .filter_map(|id| self.requests.get(id))
            .any(|r| r.wants_high_accuracy())
    }

    /// Locate a watch by id, allowed or still awaiting permission.
    pub fn find_watch(&self, watch_id: i32) -> Option<RequestId> {
        let matches = |id: &RequestId| {
            self.requests
                .get(id)
                .is_some_and(|r| r.kind() == RequestKind::Watch(watch_id) && !r.is_terminal())
        };

        if let Some(id) = self.watching.iter().copied().find(|id| matches(id)) {
            return Some(id);
        }

        self.requests
            .values()
            .filter(|r| r.state() == RequestState::AwaitingPermission)
            .map(|r| r.id())
            .find(|id| matches(id))
    }

    /// Shut every request down without firing callbacks and go inert.
    /// Returns the timers that must be cancelled.
    pub(crate) fn teardown(&mut self) -> Vec<TimerKey> {
        if self.closed {
            return Vec::new();
        }
        self.closed = true;

        let timers: Vec<TimerKey> = self
            .requests
            .values_mut()
            .filter_map(|r| r.shutdown())
            .collect();

        tracing::info!(
            session_id = %self.id,
            origin = %self.origin,
            requests = self.requests.len(),
            "Geolocation session torn down"
        );

        self.requests.clear();
        self.deferred.clear();
        self.pending.clear();
        self.watching.clear();
        timers
    }
}
