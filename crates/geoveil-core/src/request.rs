//! Geolocation request lifecycle
//!
//! ```text
//! AwaitingPermission
//!   ↓ allow
//! Active ──(watch: delivery / transient error)──┐
//!   ↓ delivery, timeout, error, clear, teardown │
//! ShuttingDown  ◄───────────────────────────────┘ (clear / teardown only)
//! ```
//!
//! `ShuttingDown` is terminal: no callback fires once a request reaches it.

use serde::{Deserialize, Serialize};

use geoveil_privacy::{PolicySet, Position};

use crate::error::PositionError;
use crate::session::RequestId;
use crate::timer::TimerKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    OneShot,
    /// Continuous watch with its per-session id
    Watch(i32),
}

impl RequestKind {
    pub fn is_watch(&self) -> bool {
        matches!(self, RequestKind::Watch(_))
    }

    pub fn watch_id(&self) -> Option<i32> {
        match self {
            RequestKind::Watch(id) => Some(*id),
            RequestKind::OneShot => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PositionOptions {
    pub enable_high_accuracy: bool,
    /// 0 disables the timeout
    pub timeout_ms: i32,
    /// 0 never uses the cache
    pub maximum_age_ms: u32,
}

impl PositionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn high_accuracy(mut self) -> Self {
        self.enable_high_accuracy = true;
        self
    }

    pub fn with_timeout(mut self, timeout_ms: i32) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_maximum_age(mut self, maximum_age_ms: u32) -> Self {
        self.maximum_age_ms = maximum_age_ms;
        self
    }

    /// Timeout to arm, if any. Negative values fire on the next tick and
    /// small positive values are raised to `min_timeout_ms`.
    pub fn effective_timeout_ms(&self, min_timeout_ms: u32) -> Option<u64> {
        match self.timeout_ms {
            0 => None,
            t if t < 0 => Some(0),
            t => Some(u64::from(t.unsigned_abs().max(min_timeout_ms))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestState {
    AwaitingPermission,
    Active,
    ShuttingDown,
}

impl RequestState {
    pub fn can_transition_to(&self, target: RequestState) -> bool {
        match (self, target) {
            (RequestState::AwaitingPermission, RequestState::Active) => true,
            (RequestState::AwaitingPermission, RequestState::ShuttingDown) => true,
            (RequestState::Active, RequestState::ShuttingDown) => true,
            (a, b) if *a == b => true,
            _ => false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestState::ShuttingDown)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestState::AwaitingPermission => "awaiting_permission",
            RequestState::Active => "active",
            RequestState::ShuttingDown => "shutting_down",
        }
    }
}

impl std::fmt::Display for RequestState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

pub type SuccessCallback = Box<dyn FnMut(&Position) + Send>;
pub type ErrorCallback = Box<dyn FnMut(PositionError) + Send>;

/// Consumer callback pair. The error callback is optional.
pub struct RequestCallbacks {
    on_success: SuccessCallback,
    on_error: Option<ErrorCallback>,
}

impl RequestCallbacks {
    pub fn new<F>(on_success: F) -> Self
    where
        F: FnMut(&Position) + Send + 'static,
    {
        Self {
            on_success: Box::new(on_success),
            on_error: None,
        }
    }

    pub fn with_error<F>(mut self, on_error: F) -> Self
    where
        F: FnMut(PositionError) + Send + 'static,
    {
        self.on_error = Some(Box::new(on_error));
        self
    }
}

impl std::fmt::Debug for RequestCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestCallbacks")
            .field("on_error", &self.on_error.is_some())
            .finish_non_exhaustive()
    }
}

/// What happened to a position offered to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Request is not active; nothing fired
    Ignored,
    /// Older than `maximum_age_ms`; nothing fired
    Stale,
    /// Success callback fired
    Delivered,
    /// Policy withheld the position; error callback fired
    Unavailable,
}

#[derive(Debug)]
pub struct GeolocationRequest {
    id: RequestId,
    kind: RequestKind,
    options: PositionOptions,
    origin: String,
    state: RequestState,
    callbacks: RequestCallbacks,
    timeout_timer: Option<TimerKey>,
}

impl GeolocationRequest {
    pub(crate) fn new(
        id: RequestId,
        kind: RequestKind,
        options: PositionOptions,
        origin: String,
        callbacks: RequestCallbacks,
    ) -> Self {
        Self {
            id,
            kind,
            options,
            origin,
            state: RequestState::AwaitingPermission,
            callbacks,
            timeout_timer: None,
        }
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn kind(&self) -> RequestKind {
        self.kind
    }

    pub fn options(&self) -> &PositionOptions {
        &self.options
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn wants_high_accuracy(&self) -> bool {
        !self.is_terminal() && self.options.enable_high_accuracy
    }

    fn transition(&mut self, target: RequestState) -> bool {
        if !self.state.can_transition_to(target) {
            return false;
        }
        if self.state != target {
            tracing::debug!(
                request_id = self.id.0,
                from = %self.state,
                to = %target,
                "Request state change"
            );
        }
        self.state = target;
        true
    }

    pub(crate) fn activate(&mut self) -> bool {
        self.state == RequestState::AwaitingPermission && self.transition(RequestState::Active)
    }

    /// Terminate without firing anything. Returns the timer to cancel.
    pub(crate) fn shutdown(&mut self) -> Option<TimerKey> {
        self.transition(RequestState::ShuttingDown);
        self.timeout_timer.take()
    }

    pub(crate) fn timeout_timer(&self) -> Option<TimerKey> {
        self.timeout_timer
    }

    pub(crate) fn set_timeout_timer(&mut self, key: Option<TimerKey>) -> Option<TimerKey> {
        std::mem::replace(&mut self.timeout_timer, key)
    }

    /// Offer a raw position. The origin's policy is applied before the
    /// consumer sees it. A one-shot request is terminal before its success
    /// callback runs.
    pub(crate) fn deliver(
        &mut self,
        position: &Position,
        policies: &PolicySet,
        now_ms: u64,
    ) -> DeliveryOutcome {
        if self.state != RequestState::Active {
            return DeliveryOutcome::Ignored;
        }

        let max_age = u64::from(self.options.maximum_age_ms);
        if max_age > 0 && position.age_ms(now_ms) > max_age {
            tracing::debug!(request_id = self.id.0, "Dropping stale position");
            return DeliveryOutcome::Stale;
        }

        let Some(transformed) = policies.resolve(&self.origin).apply(position) else {
            self.notify_error(PositionError::PositionUnavailable, false);
            return DeliveryOutcome::Unavailable;
        };

        if !self.kind.is_watch() {
            self.transition(RequestState::ShuttingDown);
        }
        (self.callbacks.on_success)(&transformed);
        DeliveryOutcome::Delivered
    }

    /// Fire the error callback. One-shot requests always terminate; watch
    /// requests only when `terminal` is set. Returns false if the request
    /// was already terminated and nothing fired.
    pub(crate) fn notify_error(&mut self, error: PositionError, terminal: bool) -> bool {
        if self.is_terminal() {
            return false;
        }

        if terminal || !self.kind.is_watch() {
            self.transition(RequestState::ShuttingDown);
        }

        tracing::debug!(request_id = self.id.0, code = error.code(), "Request error");
        if let Some(on_error) = self.callbacks.on_error.as_mut() {
            on_error(error);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geoveil_privacy::{BlurMode, PrivacyPolicy};
    use parking_lot::Mutex;
    use std::sync::Arc;

    type Log = Arc<Mutex<Vec<String>>>;

    fn recording(kind: RequestKind, options: PositionOptions) -> (GeolocationRequest, Log) {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let ok = Arc::clone(&log);
        let err = Arc::clone(&log);
        let callbacks = RequestCallbacks::new(move |p: &Position| {
            ok.lock().push(format!("ok {} {}", p.latitude, p.longitude))
        })
        .with_error(move |e| err.lock().push(format!("err {}", e.code())));

        let request = GeolocationRequest::new(
            RequestId(1),
            kind,
            options,
            "https://maps.example".to_string(),
            callbacks,
        );
        (request, log)
    }

    #[test]
    fn test_state_transitions() {
        assert!(RequestState::AwaitingPermission.can_transition_to(RequestState::Active));
        assert!(RequestState::Active.can_transition_to(RequestState::ShuttingDown));
        assert!(!RequestState::ShuttingDown.can_transition_to(RequestState::Active));
        assert!(!RequestState::Active.can_transition_to(RequestState::AwaitingPermission));
        assert_eq!(RequestState::Active.to_string(), "active");
    }

    #[test]
    fn test_effective_timeout() {
        let options = PositionOptions::new();
        assert_eq!(options.effective_timeout_ms(10), None);
        assert_eq!(options.with_timeout(-5).effective_timeout_ms(10), Some(0));
        assert_eq!(options.with_timeout(3).effective_timeout_ms(10), Some(10));
        assert_eq!(options.with_timeout(2500).effective_timeout_ms(10), Some(2500));
    }

    #[test]
    fn test_options_deserialize_camel_case() {
        let options: PositionOptions =
            serde_json::from_str(r#"{"enableHighAccuracy": true}"#).unwrap();
        assert!(options.enable_high_accuracy);
        assert_eq!(options.timeout_ms, 0);

        let options: PositionOptions =
            serde_json::from_str(r#"{"timeoutMs": 50, "maximumAgeMs": 700}"#).unwrap();
        assert_eq!(options.timeout_ms, 50);
        assert_eq!(options.maximum_age_ms, 700);
    }

    #[test]
    fn test_one_shot_delivers_once() {
        let (mut request, log) = recording(RequestKind::OneShot, PositionOptions::new());
        let policies = PolicySet::default();
        let position = Position::new(10.0, 20.0, 1_000);

        assert_eq!(request.deliver(&position, &policies, 1_000), DeliveryOutcome::Ignored);
        assert!(request.activate());

        assert_eq!(request.deliver(&position, &policies, 1_000), DeliveryOutcome::Delivered);
        assert!(request.is_terminal());
        assert_eq!(request.deliver(&position, &policies, 1_000), DeliveryOutcome::Ignored);
        assert!(!request.notify_error(PositionError::Timeout, true));

        assert_eq!(*log.lock(), vec!["ok 10 20".to_string()]);
    }

    #[test]
    fn test_stale_position_dropped_silently() {
        let (mut request, log) = recording(
            RequestKind::Watch(0),
            PositionOptions::new().with_maximum_age(1_000),
        );
        request.activate();
        let policies = PolicySet::default();

        let stale = Position::new(1.0, 2.0, 5_000);
        assert_eq!(request.deliver(&stale, &policies, 6_001), DeliveryOutcome::Stale);
        assert!(log.lock().is_empty());

        let fresh = Position::new(1.0, 2.0, 5_500);
        assert_eq!(request.deliver(&fresh, &policies, 6_001), DeliveryOutcome::Delivered);
        assert!(!request.is_terminal());
    }

    #[test]
    fn test_policy_applied_before_callback() {
        let (mut request, log) = recording(RequestKind::Watch(0), PositionOptions::new());
        request.activate();

        let fake = PrivacyPolicy::for_origin("https://maps.example")
            .with_mode(BlurMode::Fake)
            .with_coords_str("@1.5,2.5");
        let policies = PolicySet::default().with_exception(fake);

        request.deliver(&Position::new(48.0, 11.0, 0), &policies, 0);
        assert_eq!(*log.lock(), vec!["ok 1.5 2.5".to_string()]);
    }

    #[test]
    fn test_suppressed_origin_reports_unavailable() {
        let (mut request, log) = recording(RequestKind::Watch(3), PositionOptions::new());
        request.activate();
        let policies = PolicySet::default().with_suppressed(["https://maps.example"]);

        let outcome = request.deliver(&Position::new(48.0, 11.0, 0), &policies, 0);
        assert_eq!(outcome, DeliveryOutcome::Unavailable);
        assert!(!request.is_terminal());
        assert_eq!(*log.lock(), vec!["err 2".to_string()]);
    }

    #[test]
    fn test_watch_survives_transient_error() {
        let (mut request, log) = recording(RequestKind::Watch(0), PositionOptions::new());
        request.activate();

        assert!(request.notify_error(PositionError::PositionUnavailable, false));
        assert_eq!(request.state(), RequestState::Active);

        assert!(request.notify_error(PositionError::PermissionDenied, true));
        assert!(request.is_terminal());
        assert_eq!(log.lock().len(), 2);
    }

    #[test]
    fn test_shutdown_is_silent() {
        let (mut request, log) = recording(RequestKind::OneShot, PositionOptions::new());
        request.activate();
        request.shutdown();

        let outcome = request.deliver(&Position::new(0.0, 0.0, 0), &PolicySet::default(), 0);
        assert_eq!(outcome, DeliveryOutcome::Ignored);
        assert!(log.lock().is_empty());
        assert!(!request.wants_high_accuracy());
    }
}
