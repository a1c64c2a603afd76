//! Location provider control
//!
//! [`ProviderController`] is the only owner of the device provider and of the
//! last known position. Providers push into a [`ProviderSink`]; the events
//! are drained by whoever runs the coordination context.

use tokio::sync::{broadcast, mpsc};

use geoveil_privacy::Position;

use crate::error::ProviderError;
use crate::timer::{TimerEvent, TimerKey, TimerQueue};

/// Device-level location source (GPS, network positioning, platform API).
pub trait LocationProvider: Send {
    fn startup(&mut self) -> Result<(), ProviderError>;

    /// Begin pushing updates into `sink`.
    fn watch(&mut self, sink: ProviderSink) -> Result<(), ProviderError>;

    fn shutdown(&mut self);

    fn set_high_accuracy(&mut self, high: bool);
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProviderEvent {
    /// `None` means the provider lost its fix
    Update(Option<Position>),
    Error { reason: String },
    /// A fix is on its way; watchers re-arm their timeouts
    UpdatePending,
}

pub type ProviderEvents = mpsc::UnboundedReceiver<ProviderEvent>;

/// Write end handed to the provider. Sends after the service is gone are
/// dropped.
#[derive(Debug, Clone)]
pub struct ProviderSink {
    tx: mpsc::UnboundedSender<ProviderEvent>,
}

impl ProviderSink {
    pub fn channel() -> (Self, ProviderEvents) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn update(&self, position: Option<Position>) {
        let _ = self.tx.send(ProviderEvent::Update(position));
    }

    pub fn error(&self, reason: impl Into<String>) {
        let _ = self.tx.send(ProviderEvent::Error {
            reason: reason.into(),
        });
    }

    pub fn update_pending(&self) {
        let _ = self.tx.send(ProviderEvent::UpdatePending);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceEvent {
    Starting,
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CachedPosition {
    pub position: Option<Position>,
    pub captured_at_high_accuracy: bool,
}

pub struct ProviderController {
    provider: Option<Box<dyn LocationProvider>>,
    sink: ProviderSink,
    running: bool,
    high_accuracy: bool,
    cache: CachedPosition,
    idle_timer: Option<TimerKey>,
    idle_timeout_ms: u64,
    device_events: broadcast::Sender<DeviceEvent>,
    enabled: bool,
    init_pending: bool,
}

impl ProviderController {
    pub(crate) fn new(
        provider: Option<Box<dyn LocationProvider>>,
        sink: ProviderSink,
        idle_timeout_ms: u64,
    ) -> Self {
        let (device_events, _) = broadcast::channel(16);
        Self {
            provider,
            sink,
            running: false,
            high_accuracy: false,
            cache: CachedPosition::default(),
            idle_timer: None,
            idle_timeout_ms,
            device_events,
            enabled: true,
            init_pending: false,
        }
    }

    pub fn subscribe_device_events(&self) -> broadcast::Receiver<DeviceEvent> {
        self.device_events.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_high_accuracy(&self) -> bool {
        self.high_accuracy
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_init_pending(&self) -> bool {
        self.init_pending
    }

    pub(crate) fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub(crate) fn set_init_pending(&mut self, pending: bool) {
        self.init_pending = pending;
    }

    pub fn cache(&self) -> &CachedPosition {
        &self.cache
    }

    /// Fails when the feature is disabled or settings have not loaded yet.
    pub fn check_available(&self) -> Result<(), ProviderError> {
        if !self.enabled || self.init_pending {
            return Err(ProviderError::ServiceDisabled);
        }
        Ok(())
    }

    /// Ensure the provider is running and restart the idle countdown.
    pub(crate) fn start_if_needed(
        &mut self,
        timers: &mut TimerQueue,
        now_ms: u64,
    ) -> Result<(), ProviderError> {
        self.check_available()?;
        self.arm_idle(timers, now_ms);

        if self.running {
            return Ok(());
        }

        let provider = self.provider.as_mut().ok_or(ProviderError::NoProvider)?;
        provider.startup()?;
        if let Err(e) = provider.watch(self.sink.clone()) {
            provider.shutdown();
            return Err(e);
        }
        if self.high_accuracy {
            provider.set_high_accuracy(true);
        }

        self.running = true;
        tracing::info!(high_accuracy = self.high_accuracy, "Location provider started");
        let _ = self.device_events.send(DeviceEvent::Starting);
        Ok(())
    }

    pub(crate) fn arm_idle(&mut self, timers: &mut TimerQueue, now_ms: u64) {
        if let Some(key) = self.idle_timer.take() {
            timers.cancel(key);
        }
        let deadline = now_ms.saturating_add(self.idle_timeout_ms);
        self.idle_timer = Some(timers.schedule(deadline, TimerEvent::IdleDisconnect));
    }

    /// Forget the idle timer after it fired.
    pub(crate) fn idle_timer_fired(&mut self) {
        self.idle_timer = None;
    }

    /// Reconfigure the provider if the aggregate requirement changed.
    pub(crate) fn apply_accuracy(&mut self, high: bool) {
        if self.high_accuracy == high {
            return;
        }
        self.high_accuracy = high;
        tracing::debug!(high_accuracy = high, "Provider accuracy changed");

        if self.running {
            if let Some(provider) = self.provider.as_mut() {
                provider.set_high_accuracy(high);
            }
        }
    }

    pub(crate) fn on_update(&mut self, position: Option<Position>) {
        if let Some(p) = &position {
            tracing::debug!(accuracy = p.accuracy, high_accuracy = self.high_accuracy, "Position update");
        }
        self.cache = CachedPosition {
            position,
            captured_at_high_accuracy: self.high_accuracy,
        };
    }

    /// Cached position if it is young enough and of a sufficient tier.
    pub fn cached_if_fresh(
        &self,
        maximum_age_ms: u32,
        wants_high_accuracy: bool,
        now_ms: u64,
    ) -> Option<Position> {
        if maximum_age_ms == 0 {
            return None;
        }
        let position = self.cache.position?;
        if wants_high_accuracy && !self.cache.captured_at_high_accuracy {
            return None;
        }
        (position.age_ms(now_ms) <= u64::from(maximum_age_ms)).then_some(position)
    }

    pub(crate) fn clear_cache(&mut self) {
        self.cache = CachedPosition::default();
    }

    /// Power the provider down and drop the cache.
    pub(crate) fn stop(&mut self, timers: &mut TimerQueue) {
        if let Some(key) = self.idle_timer.take() {
            timers.cancel(key);
        }
        self.clear_cache();

        if !self.running {
            return;
        }
        if let Some(provider) = self.provider.as_mut() {
            provider.shutdown();
        }
        self.running = false;
        tracing::info!("Location provider stopped");
        let _ = self.device_events.send(DeviceEvent::Shutdown);
    }
}

impl std::fmt::Debug for ProviderController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderController")
            .field("has_provider", &self.provider.is_some())
            .field("running", &self.running)
            .field("high_accuracy", &self.high_accuracy)
            .field("cache", &self.cache)
            .field("enabled", &self.enabled)
            .field("init_pending", &self.init_pending)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ProviderLog, RecordingProvider};

    fn controller() -> (ProviderController, ProviderLog, ProviderEvents) {
        let (provider, log) = RecordingProvider::new();
        let (sink, events) = ProviderSink::channel();
        (
            ProviderController::new(Some(Box::new(provider)), sink, 6000),
            log,
            events,
        )
    }

    #[test]
    fn test_start_is_idempotent() {
        let (mut controller, log, _events) = controller();
        let mut timers = TimerQueue::new();
        let mut device = controller.subscribe_device_events();

        controller.start_if_needed(&mut timers, 0).unwrap();
        controller.start_if_needed(&mut timers, 100).unwrap();

        assert_eq!(log.lock().startups, 1);
        assert_eq!(device.try_recv().unwrap(), DeviceEvent::Starting);
        assert!(device.try_recv().is_err());
        // Only the latest idle timer is armed
        assert_eq!(timers.len(), 1);
        assert_eq!(timers.next_deadline(), Some(6100));
    }

    #[test]
    fn test_start_refused_when_unavailable() {
        let (mut controller, log, _events) = controller();
        let mut timers = TimerQueue::new();

        controller.set_init_pending(true);
        assert_eq!(
            controller.start_if_needed(&mut timers, 0),
            Err(ProviderError::ServiceDisabled)
        );
        controller.set_init_pending(false);
        controller.set_enabled(false);
        assert_eq!(
            controller.start_if_needed(&mut timers, 0),
            Err(ProviderError::ServiceDisabled)
        );
        assert_eq!(log.lock().startups, 0);

        let (sink, _rx) = ProviderSink::channel();
        let mut empty = ProviderController::new(None, sink, 6000);
        assert_eq!(
            empty.start_if_needed(&mut timers, 0),
            Err(ProviderError::NoProvider)
        );
    }

    #[test]
    fn test_watch_failure_shuts_provider_down() {
        let (mut provider, log) = RecordingProvider::new();
        provider.fail_watch = true;
        let (sink, _rx) = ProviderSink::channel();
        let mut controller = ProviderController::new(Some(Box::new(provider)), sink, 6000);

        let result = controller.start_if_needed(&mut TimerQueue::new(), 0);
        assert!(matches!(result, Err(ProviderError::Watch(_))));
        assert!(!controller.is_running());
        assert_eq!(log.lock().shutdowns, 1);
    }

    #[test]
    fn test_cache_freshness() {
        let (mut controller, _log, _events) = controller();
        controller.on_update(Some(Position::new(1.0, 2.0, 10_000)));

        assert!(controller.cached_if_fresh(5000, false, 14_000).is_some());
        assert!(controller.cached_if_fresh(5000, false, 15_000).is_some());
        assert!(controller.cached_if_fresh(5000, false, 16_000).is_none());
        assert!(controller.cached_if_fresh(0, false, 10_000).is_none());
        // Captured at low accuracy cannot satisfy a high accuracy request
        assert!(controller.cached_if_fresh(5000, true, 10_000).is_none());

        controller.apply_accuracy(true);
        controller.on_update(Some(Position::new(1.0, 2.0, 10_000)));
        assert!(controller.cached_if_fresh(5000, true, 10_000).is_some());
    }

    #[test]
    fn test_accuracy_reconfigures_running_provider() {
        let (mut controller, log, _events) = controller();
        let mut timers = TimerQueue::new();

        controller.apply_accuracy(true);
        assert!(log.lock().accuracy.is_empty());

        controller.start_if_needed(&mut timers, 0).unwrap();
        controller.apply_accuracy(true);
        controller.apply_accuracy(false);
        assert_eq!(log.lock().accuracy, vec![true, false]);
    }

    #[test]
    fn test_stop_clears_cache() {
        let (mut controller, log, _events) = controller();
        let mut timers = TimerQueue::new();
        let mut device = controller.subscribe_device_events();

        controller.start_if_needed(&mut timers, 0).unwrap();
        controller.on_update(Some(Position::new(1.0, 2.0, 0)));
        controller.stop(&mut timers);

        assert!(!controller.is_running());
        assert_eq!(controller.cache().position, None);
        assert_eq!(timers.len(), 0);
        assert_eq!(log.lock().shutdowns, 1);
        assert_eq!(device.try_recv().unwrap(), DeviceEvent::Starting);
        assert_eq!(device.try_recv().unwrap(), DeviceEvent::Shutdown);
    }
}
