//! Coordination context
//!
//! [`GeolocationService`] owns every session, the provider controller, the
//! current policy generation and all timers. Every mutation goes through
//! `&mut self`, so one task drives it: consumer calls, provider events,
//! timer fires and permission decisions are serialized by the caller (see
//! [`crate::runtime::GeolocationRuntime`]).
//!
//! Automatic permission decisions are queued rather than applied inline, so
//! no consumer callback ever fires from inside `get_current_position` or
//! `watch_position`. Call [`GeolocationService::run_pending_tasks`] to apply
//! them.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use tokio::sync::broadcast;

use geoveil_privacy::{PermissionManager, PermissionState, PolicySet, PolicyStore, Position};
use geoveil_storage::Database;

use crate::clock::{Clock, SystemClock};
use crate::config::GeoConfig;
use crate::error::{GeoError, PositionError};
use crate::prompt::{PermissionDecision, PermissionPrompt, PermissionPrompter};
use crate::provider::{
    DeviceEvent, LocationProvider, ProviderController, ProviderEvent, ProviderEvents, ProviderSink,
};
use crate::request::{
    DeliveryOutcome, GeolocationRequest, PositionOptions, RequestCallbacks, RequestKind,
    RequestState,
};
use crate::session::{OriginSession, RequestHandle, RequestId, SessionId, SessionOptions};
use crate::settings::{keys, GeoSettings, SettingChange, SettingKey};
use crate::timer::{TimerEvent, TimerKey, TimerQueue};
use crate::Result;

pub struct GeolocationServiceBuilder {
    config: GeoConfig,
    provider: Option<Box<dyn LocationProvider>>,
    prompter: Option<Box<dyn PermissionPrompter>>,
    clock: Option<Arc<dyn Clock>>,
    database: Option<Database>,
}

impl GeolocationServiceBuilder {
    pub fn provider<P: LocationProvider + 'static>(mut self, provider: P) -> Self {
        self.provider = Some(Box::new(provider));
        self
    }

    pub fn prompter<P: PermissionPrompter + 'static>(mut self, prompter: P) -> Self {
        self.prompter = Some(Box::new(prompter));
        self
    }

    pub fn clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }

    /// Attach a settings store. The service then stays initialisation
    /// pending until [`GeolocationService::load_settings`] runs.
    pub fn settings_store(mut self, db: Database) -> Self {
        self.database = Some(db);
        self
    }

    /// Build the service and the receiver for provider events.
    pub fn build(self) -> (GeolocationService, ProviderEvents) {
        let (sink, events) = ProviderSink::channel();

        let mut controller =
            ProviderController::new(self.provider, sink, self.config.provider_timeout_ms.max(1));
        controller.set_enabled(self.config.enabled);
        controller.set_init_pending(self.database.is_some());

        let settings = GeoSettings::default();
        let service = GeolocationService {
            clock: self
                .clock
                .unwrap_or_else(|| Arc::new(SystemClock) as Arc<dyn Clock>),
            controller,
            policies: PolicyStore::new(settings.policy_set()),
            permissions: PermissionManager::new(),
            prompter: self.prompter,
            settings,
            database: self.database,
            sessions: BTreeMap::new(),
            timers: TimerQueue::new(),
            decisions: VecDeque::new(),
            next_session_id: 1,
            next_request_id: 1,
            shut_down: false,
            config: self.config,
        };

        tracing::info!(
            enabled = service.config.enabled,
            init_pending = service.controller.is_init_pending(),
            "Geolocation service created"
        );
        (service, events)
    }
}

pub struct GeolocationService {
    config: GeoConfig,
    clock: Arc<dyn Clock>,
    controller: ProviderController,
    policies: PolicyStore,
    permissions: PermissionManager,
    prompter: Option<Box<dyn PermissionPrompter>>,
    settings: GeoSettings,
    database: Option<Database>,
    /// Keyed by monotonic id, so iteration follows registration order
    sessions: BTreeMap<SessionId, OriginSession>,
    timers: TimerQueue,
    decisions: VecDeque<(RequestHandle, PermissionDecision)>,
    next_session_id: u64,
    next_request_id: u64,
    shut_down: bool,
}

fn session_entry(
    sessions: &mut BTreeMap<SessionId, OriginSession>,
    next_session_id: u64,
    id: SessionId,
) -> Result<&mut OriginSession> {
    if !sessions.contains_key(&id) {
        return Err(missing_session(next_session_id, id));
    }
    sessions.get_mut(&id).ok_or(GeoError::SessionNotFound(id))
}

fn missing_session(next_session_id: u64, id: SessionId) -> GeoError {
    if id.0 > 0 && id.0 < next_session_id {
        GeoError::SessionClosed(id)
    } else {
        GeoError::SessionNotFound(id)
    }
}

fn arm_request_timeout(
    timers: &mut TimerQueue,
    request: &mut GeolocationRequest,
    handle: RequestHandle,
    now_ms: u64,
    min_timeout_ms: u32,
) {
    if request.state() != RequestState::Active {
        return;
    }
    let Some(timeout) = request.options().effective_timeout_ms(min_timeout_ms) else {
        return;
    };

    let key = timers.schedule(
        now_ms.saturating_add(timeout),
        TimerEvent::RequestTimeout(handle),
    );
    if let Some(previous) = request.set_timeout_timer(Some(key)) {
        timers.cancel(previous);
    }
}

fn retire(session: &mut OriginSession, timers: &mut TimerQueue, id: RequestId) {
    if let Some(mut request) = session.remove_request(id) {
        if let Some(key) = request.shutdown() {
            timers.cancel(key);
        }
        tracing::debug!(session_id = %session.id(), request_id = id.0, "Request finished");
    }
}

impl GeolocationService {
    pub fn builder(config: GeoConfig) -> GeolocationServiceBuilder {
        GeolocationServiceBuilder {
            config,
            provider: None,
            prompter: None,
            clock: None,
            database: None,
        }
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    // ---- consumer API ----

    pub fn open_session(&mut self, options: SessionOptions) -> Result<SessionId> {
        if self.shut_down {
            return Err(GeoError::ServiceShutdown);
        }

        let id = SessionId(self.next_session_id);
        self.next_session_id += 1;

        tracing::info!(
            session_id = %id,
            origin = %options.origin,
            privileged = options.privileged,
            "Geolocation session opened"
        );
        self.sessions.insert(id, OriginSession::new(id, options));
        Ok(id)
    }

    /// One-shot request. Callbacks fire later from the coordination context.
    pub fn get_current_position(
        &mut self,
        session: SessionId,
        callbacks: RequestCallbacks,
        options: PositionOptions,
    ) -> Result<()> {
        self.create_request(session, false, callbacks, options)
            .map(|_| ())
    }

    /// Continuous request. Returns the watch id for [`Self::clear_watch`].
    pub fn watch_position(
        &mut self,
        session: SessionId,
        callbacks: RequestCallbacks,
        options: PositionOptions,
    ) -> Result<i32> {
        let (_, kind) = self.create_request(session, true, callbacks, options)?;
        Ok(kind.watch_id().unwrap_or(-1))
    }

    /// Cancel a watch. Unknown or already cleared ids are ignored.
    pub fn clear_watch(&mut self, session_id: SessionId, watch_id: i32) -> Result<()> {
        let session = session_entry(&mut self.sessions, self.next_session_id, session_id)?;
        if watch_id < 0 {
            return Ok(());
        }

        let Some(request_id) = session.find_watch(watch_id) else {
            tracing::debug!(session_id = %session_id, watch_id, "clear_watch: no such watch");
            return Ok(());
        };

        retire(session, &mut self.timers, request_id);
        tracing::debug!(session_id = %session_id, watch_id, "Watch cleared");
        self.update_accuracy(false);
        Ok(())
    }

    /// Tear a session down. No callback of its requests fires afterwards.
    pub fn close_session(&mut self, session_id: SessionId) -> Result<()> {
        if !self.sessions.contains_key(&session_id) {
            return Err(missing_session(self.next_session_id, session_id));
        }
        self.teardown_session(session_id);
        Ok(())
    }

    /// Answer a permission prompt. Tickets for cleared requests or closed
    /// sessions are ignored.
    pub fn resolve_permission(&mut self, ticket: RequestHandle, decision: PermissionDecision) {
        tracing::debug!(
            session_id = %ticket.session,
            request_id = ticket.request.0,
            ?decision,
            "Permission resolved"
        );
        self.apply_decision(ticket, decision);
    }

    pub fn set_site_permission(&mut self, origin: &str, state: PermissionState) -> Result<()> {
        self.permissions.set_site_permission(origin, state);
        self.settings.permissions = self.permissions.export_permissions();

        if let Some(db) = &self.database {
            let value = serde_json::to_value(&self.settings.permissions)?;
            db.set_setting(keys::PERMISSIONS, &value)?;
        }
        Ok(())
    }

    pub fn subscribe_device_events(&self) -> broadcast::Receiver<DeviceEvent> {
        self.controller.subscribe_device_events()
    }

    /// Tear every session down and stop the provider. The service is inert
    /// afterwards.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }

        let ids: Vec<SessionId> = self.sessions.keys().copied().collect();
        for id in ids {
            self.teardown_session(id);
        }
        self.controller.stop(&mut self.timers);
        self.timers.clear();
        self.decisions.clear();
        self.shut_down = true;

        tracing::info!("Geolocation service shut down");
    }

    // ---- event inputs ----

    pub fn handle_provider_event(&mut self, event: ProviderEvent) {
        if self.shut_down {
            return;
        }

        match event {
            ProviderEvent::Update(position) => {
                if !self.controller.is_running() {
                    tracing::debug!("Dropping update from stopped provider");
                    return;
                }
                self.controller.on_update(position);
                match position {
                    Some(position) => self.fan_out_position(&position),
                    None => self.fan_out_error(PositionError::PositionUnavailable),
                }
            }
            ProviderEvent::Error { reason } => {
                if !self.controller.is_running() {
                    return;
                }
                tracing::warn!(reason = %reason, "Location provider error");
                self.fan_out_error(PositionError::PositionUnavailable);
            }
            ProviderEvent::UpdatePending => self.rearm_watch_timeouts(),
        }
    }

    /// Earliest armed timer deadline.
    pub fn next_deadline(&self) -> Option<u64> {
        self.timers.next_deadline()
    }

    pub fn fire_due_timers(&mut self) {
        let now = self.now_ms();
        while let Some((key, event)) = self.timers.pop_due(now) {
            match event {
                TimerEvent::RequestTimeout(handle) => self.on_request_timeout(handle, key),
                TimerEvent::IdleDisconnect => self.on_idle_disconnect(now),
            }
        }
    }

    /// Apply queued permission decisions in the order they were made.
    pub fn run_pending_tasks(&mut self) {
        while let Some((handle, decision)) = self.decisions.pop_front() {
            self.apply_decision(handle, decision);
        }
    }

    pub fn has_pending_tasks(&self) -> bool {
        !self.decisions.is_empty()
    }

    // ---- settings ----

    /// Read the attached settings store and apply it. Without a store the
    /// defaults are applied.
    pub fn load_settings(&mut self) {
        let settings = match &self.database {
            Some(db) => GeoSettings::load(db),
            None => GeoSettings::default(),
        };
        self.apply_settings(settings);
    }

    /// Install a complete settings snapshot and leave initialisation.
    pub fn apply_settings(&mut self, settings: GeoSettings) {
        self.permissions
            .import_permissions(settings.permissions.clone());
        self.policies.replace(settings.policy_set());
        let enabled = settings.enabled;
        self.settings = settings;
        self.set_enabled(enabled);

        if self.controller.is_init_pending() {
            self.controller.set_init_pending(false);
            tracing::info!("Geolocation settings ready");
            self.replay_deferred();
        }
    }

    /// Apply a `{"key", "value"}` change notification. Malformed documents,
    /// unknown keys and mistyped values are ignored.
    pub fn apply_setting_change(&mut self, json: &str) -> Result<()> {
        match SettingChange::parse(json) {
            Some(change) => self.apply_change(change),
            None => Ok(()),
        }
    }

    pub fn apply_change(&mut self, change: SettingChange) -> Result<()> {
        let Some(key) = self.settings.apply_change(&change) else {
            return Ok(());
        };

        // The live state follows the change even if the store rejects it
        match key {
            SettingKey::Enabled => self.set_enabled(self.settings.enabled),
            SettingKey::Permissions => self
                .permissions
                .import_permissions(self.settings.permissions.clone()),
            _ => self.policies.replace(self.settings.policy_set()),
        }

        if let Some(db) = &self.database {
            if let Err(e) = change.persist(db) {
                tracing::warn!(key = %key, error = %e, "Failed to persist setting change");
                return Err(e.into());
            }
            if key == SettingKey::BlurRadius {
                db.remove_setting(keys::BLUR_COORDS)?;
            }
        }
        Ok(())
    }

    // ---- introspection ----

    pub fn config(&self) -> &GeoConfig {
        &self.config
    }

    pub fn settings(&self) -> &GeoSettings {
        &self.settings
    }

    pub fn permissions(&self) -> &PermissionManager {
        &self.permissions
    }

    pub fn policies(&self) -> Arc<PolicySet> {
        self.policies.snapshot()
    }

    pub fn policy_generation(&self) -> u64 {
        self.policies.generation()
    }

    pub fn session(&self, id: SessionId) -> Option<&OriginSession> {
        self.sessions.get(&id)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_enabled(&self) -> bool {
        self.controller.is_enabled()
    }

    pub fn is_init_pending(&self) -> bool {
        self.controller.is_init_pending()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    pub fn is_provider_running(&self) -> bool {
        self.controller.is_running()
    }

    pub fn is_high_accuracy(&self) -> bool {
        self.controller.is_high_accuracy()
    }

    pub fn cached_position(&self) -> Option<Position> {
        self.controller.cache().position
    }

    // ---- internals ----

    fn create_request(
        &mut self,
        session_id: SessionId,
        watch: bool,
        callbacks: RequestCallbacks,
        options: PositionOptions,
    ) -> Result<(RequestHandle, RequestKind)> {
        if self.shut_down {
            return Err(GeoError::ServiceShutdown);
        }
        self.ensure_alive(session_id)?;

        let max_requests = self.config.max_requests_per_session;
        let request_id = RequestId(self.next_request_id);
        let session = session_entry(&mut self.sessions, self.next_session_id, session_id)?;

        let probe = if watch {
            RequestKind::Watch(0)
        } else {
            RequestKind::OneShot
        };
        if session.active_count(probe) > max_requests {
            tracing::warn!(
                session_id = %session_id,
                origin = %session.origin(),
                "Too many outstanding geolocation requests"
            );
            return Err(GeoError::TooManyRequests(session_id));
        }

        let kind = if watch {
            RequestKind::Watch(session.next_watch_id())
        } else {
            RequestKind::OneShot
        };
        let origin = session.origin().to_string();
        session.insert(GeolocationRequest::new(
            request_id, kind, options, origin, callbacks,
        ));
        self.next_request_id += 1;

        let handle = RequestHandle {
            session: session_id,
            request: request_id,
        };
        tracing::debug!(
            session_id = %session_id,
            request_id = request_id.0,
            watch_id = kind.watch_id(),
            high_accuracy = options.enable_high_accuracy,
            "Geolocation request created"
        );

        if !self.controller.is_enabled() {
            self.decisions
                .push_back((handle, PermissionDecision::Deny));
        } else if self.controller.is_init_pending() {
            session.defer(request_id);
        } else {
            self.request_permission(handle);
        }
        Ok((handle, kind))
    }

    /// Fails with `SessionClosed` (after tearing it down) if the consumer
    /// context is gone.
    fn ensure_alive(&mut self, session_id: SessionId) -> Result<()> {
        let alive = match self.sessions.get(&session_id) {
            Some(session) => session.is_alive(),
            None => return Err(missing_session(self.next_session_id, session_id)),
        };
        if !alive {
            self.teardown_session(session_id);
            return Err(GeoError::SessionClosed(session_id));
        }
        Ok(())
    }

    fn request_permission(&mut self, handle: RequestHandle) {
        let Some(session) = self.sessions.get(&handle.session) else {
            return;
        };
        let Some(request) = session.request(handle.request) else {
            return;
        };

        let origin = session.origin().to_string();
        let watch = request.kind().is_watch();
        let high_accuracy = request.options().enable_high_accuracy;

        let automatic = if session.is_privileged() {
            Some(PermissionDecision::Allow)
        } else if let Some(allow) = self.config.prompt_testing {
            Some(PermissionDecision::from(allow))
        } else if self.permissions.is_allowed(&origin) {
            Some(PermissionDecision::Allow)
        } else if self.permissions.is_denied(&origin) {
            Some(PermissionDecision::Deny)
        } else {
            None
        };

        if let Some(decision) = automatic {
            self.decisions.push_back((handle, decision));
            return;
        }

        match self.prompter.as_mut() {
            Some(prompter) => prompter.prompt(PermissionPrompt {
                ticket: handle,
                origin,
                watch,
                high_accuracy,
            }),
            None => {
                tracing::warn!(origin = %origin, "No permission prompter attached, denying");
                self.decisions
                    .push_back((handle, PermissionDecision::Deny));
            }
        }
    }

    fn apply_decision(&mut self, handle: RequestHandle, decision: PermissionDecision) {
        let Some(session) = self.sessions.get(&handle.session) else {
            return;
        };
        if !session.is_alive() {
            self.teardown_session(handle.session);
            return;
        }

        let awaiting = session
            .request(handle.request)
            .is_some_and(|r| r.state() == RequestState::AwaitingPermission);
        if !awaiting {
            return;
        }

        match decision {
            PermissionDecision::Allow => self.allow(handle),
            PermissionDecision::Deny => self.deny(handle),
        }
    }

    fn deny(&mut self, handle: RequestHandle) {
        let Some(session) = self.sessions.get_mut(&handle.session) else {
            return;
        };
        if let Some(request) = session.request_mut(handle.request) {
            request.notify_error(PositionError::PermissionDenied, true);
        }
        retire(session, &mut self.timers, handle.request);
    }

    fn allow(&mut self, handle: RequestHandle) {
        let now = self.now_ms();
        let min_timeout = self.config.min_timeout_ms;
        let policies = self.policies.snapshot();

        let Some(session) = self.sessions.get_mut(&handle.session) else {
            return;
        };
        let Some(request) = session.request_mut(handle.request) else {
            return;
        };
        if !request.activate() {
            return;
        }

        let kind = request.kind();
        let options = *request.options();
        let wants_high = request.wants_high_accuracy();
        let cached = self
            .controller
            .cached_if_fresh(options.maximum_age_ms, wants_high, now);

        // A one-shot answered from the cache never powers the device up
        let started = match (cached, kind) {
            (Some(_), RequestKind::OneShot) => self.controller.check_available(),
            _ => self.controller.start_if_needed(&mut self.timers, now),
        };
        if let Err(e) = started {
            tracing::warn!(error = %e, origin = %request.origin(), "Cannot acquire position");
            request.notify_error(PositionError::PositionUnavailable, true);
            retire(session, &mut self.timers, handle.request);
            self.update_accuracy(false);
            return;
        }

        if let Some(position) = cached {
            tracing::debug!(request_id = handle.request.0, "Serving cached position");
            request.deliver(&position, &policies, now);
            if request.is_terminal() {
                retire(session, &mut self.timers, handle.request);
                return;
            }
        }

        arm_request_timeout(&mut self.timers, request, handle, now, min_timeout);
        session.register_allowed(handle.request);
        self.update_accuracy(wants_high);
    }

    fn on_request_timeout(&mut self, handle: RequestHandle, key: TimerKey) {
        let Some(session) = self.sessions.get_mut(&handle.session) else {
            return;
        };
        let Some(request) = session.request_mut(handle.request) else {
            return;
        };
        if request.timeout_timer() != Some(key) {
            return;
        }
        request.set_timeout_timer(None);

        tracing::debug!(request_id = handle.request.0, "Request timed out");
        request.notify_error(PositionError::Timeout, false);
        if request.is_terminal() {
            retire(session, &mut self.timers, handle.request);
            self.update_accuracy(false);
        }
    }

    fn on_idle_disconnect(&mut self, now: u64) {
        self.controller.idle_timer_fired();

        if self.sessions.values().any(|s| s.has_active_callbacks()) {
            self.controller.arm_idle(&mut self.timers, now);
        } else {
            tracing::info!("No active geolocation consumers, stopping provider");
            self.controller.stop(&mut self.timers);
        }
    }

    /// Ids of live sessions in registration order. Dead ones are torn down.
    fn live_session_ids(&mut self) -> Vec<SessionId> {
        let mut alive = Vec::new();
        let mut dead = Vec::new();
        for session in self.sessions.values() {
            if session.is_alive() {
                alive.push(session.id());
            } else {
                dead.push(session.id());
            }
        }

        for id in dead {
            self.teardown_session(id);
        }
        alive
    }

    fn fan_out_position(&mut self, position: &Position) {
        let now = self.now_ms();
        let policies = self.policies.snapshot();

        for session_id in self.live_session_ids() {
            let Some(session) = self.sessions.get_mut(&session_id) else {
                continue;
            };

            // One-shots first, oldest first
            for request_id in session.pending_ids() {
                let Some(request) = session.request_mut(request_id) else {
                    continue;
                };
                request.deliver(position, &policies, now);
                if request.is_terminal() {
                    retire(session, &mut self.timers, request_id);
                }
            }

            for request_id in session.watching_ids() {
                let Some(request) = session.request_mut(request_id) else {
                    continue;
                };
                if request.deliver(position, &policies, now) == DeliveryOutcome::Delivered {
                    if let Some(key) = request.set_timeout_timer(None) {
                        self.timers.cancel(key);
                    }
                }
            }
        }

        self.update_accuracy(false);
    }

    fn fan_out_error(&mut self, error: PositionError) {
        for session_id in self.live_session_ids() {
            let Some(session) = self.sessions.get_mut(&session_id) else {
                continue;
            };

            for request_id in session.pending_ids() {
                if let Some(request) = session.request_mut(request_id) {
                    request.notify_error(error, false);
                }
                retire(session, &mut self.timers, request_id);
            }

            for request_id in session.watching_ids() {
                if let Some(request) = session.request_mut(request_id) {
                    request.notify_error(error, false);
                }
            }
        }

        self.update_accuracy(false);
    }

    fn rearm_watch_timeouts(&mut self) {
        let now = self.now_ms();
        let min_timeout = self.config.min_timeout_ms;

        for (session_id, session) in self.sessions.iter_mut() {
            for request_id in session.watching_ids() {
                let Some(request) = session.request_mut(request_id) else {
                    continue;
                };
                if request.timeout_timer().is_some() {
                    continue;
                }
                let handle = RequestHandle {
                    session: *session_id,
                    request: request_id,
                };
                arm_request_timeout(&mut self.timers, request, handle, now, min_timeout);
            }
        }
    }

    /// Recompute the aggregate accuracy requirement over every session.
    fn update_accuracy(&mut self, force_high: bool) {
        let high = force_high || self.sessions.values().any(|s| s.high_accuracy_requested());
        self.controller.apply_accuracy(high);
    }

    fn teardown_session(&mut self, session_id: SessionId) {
        if let Some(mut session) = self.sessions.remove(&session_id) {
            for key in session.teardown() {
                self.timers.cancel(key);
            }
        }
        self.update_accuracy(false);
    }

    fn set_enabled(&mut self, settings_enabled: bool) {
        let enabled = self.config.enabled && settings_enabled;
        if enabled == self.controller.is_enabled() {
            return;
        }

        self.controller.set_enabled(enabled);
        tracing::info!(enabled, "Geolocation availability changed");
        if enabled {
            return;
        }

        self.controller.stop(&mut self.timers);
        for session in self.sessions.values_mut() {
            for request_id in session.request_ids() {
                if let Some(request) = session.request_mut(request_id) {
                    request.notify_error(PositionError::PermissionDenied, true);
                }
                retire(session, &mut self.timers, request_id);
            }
        }
        self.update_accuracy(false);
    }

    fn replay_deferred(&mut self) {
        let mut handles = Vec::new();
        for (session_id, session) in self.sessions.iter_mut() {
            for request_id in session.take_deferred() {
                handles.push(RequestHandle {
                    session: *session_id,
                    request: request_id,
                });
            }
        }

        for handle in handles {
            if self.controller.is_enabled() {
                self.request_permission(handle);
            } else {
                self.decisions
                    .push_back((handle, PermissionDecision::Deny));
            }
        }
    }
}

impl std::fmt::Debug for GeolocationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeolocationService")
            .field("config", &self.config)
            .field("controller", &self.controller)
            .field("sessions", &self.sessions.len())
            .field("timers", &self.timers.len())
            .field("shut_down", &self.shut_down)
            .finish_non_exhaustive()
    }
}
