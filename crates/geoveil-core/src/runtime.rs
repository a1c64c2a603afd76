//! Async driver for the coordination context
//!
//! The service lives inside one tokio task. Consumer commands, provider
//! events and timer deadlines all reach it through that task's select loop,
//! so it is never touched concurrently.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::GeoError;
use crate::prompt::PermissionDecision;
use crate::provider::ProviderEvents;
use crate::request::{PositionOptions, RequestCallbacks};
use crate::service::GeolocationService;
use crate::session::{RequestHandle, SessionId, SessionOptions};
use crate::Result;

enum Command {
    OpenSession {
        options: SessionOptions,
        reply: oneshot::Sender<Result<SessionId>>,
    },
    GetCurrentPosition {
        session: SessionId,
        callbacks: RequestCallbacks,
        options: PositionOptions,
        reply: oneshot::Sender<Result<()>>,
    },
    WatchPosition {
        session: SessionId,
        callbacks: RequestCallbacks,
        options: PositionOptions,
        reply: oneshot::Sender<Result<i32>>,
    },
    ClearWatch {
        session: SessionId,
        watch_id: i32,
        reply: oneshot::Sender<Result<()>>,
    },
    CloseSession {
        session: SessionId,
        reply: oneshot::Sender<Result<()>>,
    },
    ResolvePermission {
        ticket: RequestHandle,
        decision: PermissionDecision,
    },
    ApplySettingChange {
        json: String,
        reply: oneshot::Sender<Result<()>>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

pub struct GeolocationRuntime {
    service: GeolocationService,
    commands: mpsc::UnboundedReceiver<Command>,
    events: ProviderEvents,
}

impl GeolocationRuntime {
    /// Move `service` into a new task. If it is waiting for its settings
    /// they are loaded before the first command is handled.
    pub fn spawn(
        service: GeolocationService,
        events: ProviderEvents,
    ) -> (GeolocationHandle, JoinHandle<()>) {
        let (tx, commands) = mpsc::unbounded_channel();
        let runtime = Self {
            service,
            commands,
            events,
        };
        let task = tokio::spawn(runtime.run());
        (GeolocationHandle { tx }, task)
    }

    async fn run(mut self) {
        if self.service.is_init_pending() {
            self.service.load_settings();
        }
        tracing::debug!("Geolocation runtime started");

        loop {
            self.service.run_pending_tasks();
            self.service.fire_due_timers();
            self.service.run_pending_tasks();

            let sleep_for = self
                .service
                .next_deadline()
                .map(|deadline| Duration::from_millis(deadline.saturating_sub(self.service.now_ms())));

            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => {
                        if self.handle_command(command) {
                            break;
                        }
                    }
                    // Every handle dropped
                    None => {
                        self.service.shutdown();
                        break;
                    }
                },
                Some(event) = self.events.recv() => {
                    self.service.handle_provider_event(event);
                }
                _ = sleep_or_forever(sleep_for) => {}
            }
        }

        tracing::debug!("Geolocation runtime stopped");
    }

    /// Returns true when the loop should stop.
    fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::OpenSession { options, reply } => {
                let _ = reply.send(self.service.open_session(options));
            }
            Command::GetCurrentPosition {
                session,
                callbacks,
                options,
                reply,
            } => {
                let result = self
                    .service
                    .get_current_position(session, callbacks, options);
                let _ = reply.send(result);
            }
            Command::WatchPosition {
                session,
                callbacks,
                options,
                reply,
            } => {
                let result = self.service.watch_position(session, callbacks, options);
                let _ = reply.send(result);
            }
            Command::ClearWatch {
                session,
                watch_id,
                reply,
            } => {
                let _ = reply.send(self.service.clear_watch(session, watch_id));
            }
            Command::CloseSession { session, reply } => {
                let _ = reply.send(self.service.close_session(session));
            }
            Command::ResolvePermission { ticket, decision } => {
                self.service.resolve_permission(ticket, decision);
            }
            Command::ApplySettingChange { json, reply } => {
                let _ = reply.send(self.service.apply_setting_change(&json));
            }
            Command::Shutdown { reply } => {
                self.service.shutdown();
                let _ = reply.send(());
                return true;
            }
        }
        false
    }
}

async fn sleep_or_forever(duration: Option<Duration>) {
    match duration {
        Some(duration) => tokio::time::sleep(duration).await,
        None => std::future::pending::<()>().await,
    }
}

/// Cloneable entry point to a running [`GeolocationRuntime`].
#[derive(Clone)]
pub struct GeolocationHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl GeolocationHandle {
    async fn call<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T>>) -> Command,
    ) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(build(reply))
            .map_err(|_| GeoError::RuntimeClosed)?;
        rx.await.map_err(|_| GeoError::RuntimeClosed)?
    }

    pub async fn open_session(&self, options: SessionOptions) -> Result<SessionId> {
        self.call(|reply| Command::OpenSession { options, reply })
            .await
    }

    pub async fn get_current_position(
        &self,
        session: SessionId,
        callbacks: RequestCallbacks,
        options: PositionOptions,
    ) -> Result<()> {
        self.call(|reply| Command::GetCurrentPosition {
            session,
            callbacks,
            options,
            reply,
        })
        .await
    }

    pub async fn watch_position(
        &self,
        session: SessionId,
        callbacks: RequestCallbacks,
        options: PositionOptions,
    ) -> Result<i32> {
        self.call(|reply| Command::WatchPosition {
            session,
            callbacks,
            options,
            reply,
        })
        .await
    }

    pub async fn clear_watch(&self, session: SessionId, watch_id: i32) -> Result<()> {
        self.call(|reply| Command::ClearWatch {
            session,
            watch_id,
            reply,
        })
        .await
    }

    pub async fn close_session(&self, session: SessionId) -> Result<()> {
        self.call(|reply| Command::CloseSession { session, reply })
            .await
    }

    pub fn resolve_permission(
        &self,
        ticket: RequestHandle,
        decision: PermissionDecision,
    ) -> Result<()> {
        self.tx
            .send(Command::ResolvePermission { ticket, decision })
            .map_err(|_| GeoError::RuntimeClosed)
    }

    pub async fn apply_setting_change(&self, json: impl Into<String>) -> Result<()> {
        let json = json.into();
        self.call(|reply| Command::ApplySettingChange { json, reply })
            .await
    }

    pub async fn shutdown(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Shutdown { reply })
            .map_err(|_| GeoError::RuntimeClosed)?;
        rx.await.map_err(|_| GeoError::RuntimeClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, SystemClock};
    use crate::config::GeoConfig;
    use crate::error::PositionError;
    use crate::prompt::ChannelPrompter;
    use crate::testing::{ProviderLog, RecordingProvider};
    use geoveil_privacy::Position;
    use geoveil_storage::Database;

    const ORIGIN: &str = "https://maps.example";
    const WAIT: Duration = Duration::from_secs(5);

    #[derive(Debug, PartialEq)]
    enum Outcome {
        Position(f64, f64),
        Error(PositionError),
    }

    fn channel_callbacks(tx: mpsc::UnboundedSender<Outcome>) -> RequestCallbacks {
        let err_tx = tx.clone();
        RequestCallbacks::new(move |p: &Position| {
            let _ = tx.send(Outcome::Position(p.latitude, p.longitude));
        })
        .with_error(move |e| {
            let _ = err_tx.send(Outcome::Error(e));
        })
    }

    fn spawn(config: GeoConfig) -> (GeolocationHandle, JoinHandle<()>, ProviderLog) {
        let (provider, log) = RecordingProvider::new();
        let (service, events) = GeolocationService::builder(config)
            .provider(provider)
            .build();
        let (handle, task) = GeolocationRuntime::spawn(service, events);
        (handle, task, log)
    }

    fn auto_allow() -> GeoConfig {
        GeoConfig {
            prompt_testing: Some(true),
            ..GeoConfig::default()
        }
    }

    /// Wait until the provider has been handed its sink.
    async fn provider_sink(log: &ProviderLog) -> crate::provider::ProviderSink {
        loop {
            if let Some(sink) = log.lock().sink.clone() {
                return sink;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn test_position_delivered_through_runtime() {
        let (handle, task, log) = spawn(auto_allow());
        let session = handle
            .open_session(SessionOptions::for_origin(ORIGIN))
            .await
            .unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        handle
            .get_current_position(session, channel_callbacks(tx), PositionOptions::new())
            .await
            .unwrap();

        let sink = tokio::time::timeout(WAIT, provider_sink(&log)).await.unwrap();
        sink.update(Some(Position::new(52.5, 13.4, SystemClock.now_ms())));

        let outcome = tokio::time::timeout(WAIT, rx.recv()).await.unwrap();
        assert_eq!(outcome, Some(Outcome::Position(52.5, 13.4)));

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_timeout_fires_in_runtime() {
        let (handle, task, _log) = spawn(auto_allow());
        let session = handle
            .open_session(SessionOptions::for_origin(ORIGIN))
            .await
            .unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        handle
            .get_current_position(
                session,
                channel_callbacks(tx),
                PositionOptions::new().with_timeout(20),
            )
            .await
            .unwrap();

        let outcome = tokio::time::timeout(WAIT, rx.recv()).await.unwrap();
        assert_eq!(outcome, Some(Outcome::Error(PositionError::Timeout)));

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_prompt_resolved_through_handle() {
        let (provider, _log) = RecordingProvider::new();
        let (prompter, mut prompts) = ChannelPrompter::channel();
        let (service, events) = GeolocationService::builder(GeoConfig::default())
            .provider(provider)
            .prompter(prompter)
            .build();
        let (handle, task) = GeolocationRuntime::spawn(service, events);

        let session = handle
            .open_session(SessionOptions::for_document("https://maps.example/route"))
            .await
            .unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        handle
            .watch_position(session, channel_callbacks(tx), PositionOptions::new())
            .await
            .unwrap();

        let prompt = tokio::time::timeout(WAIT, prompts.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(prompt.origin, ORIGIN);
        assert!(prompt.watch);

        handle
            .resolve_permission(prompt.ticket, PermissionDecision::Deny)
            .unwrap();
        let outcome = tokio::time::timeout(WAIT, rx.recv()).await.unwrap();
        assert_eq!(outcome, Some(Outcome::Error(PositionError::PermissionDenied)));

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_settings_loaded_on_start() {
        let db = Database::open_in_memory().unwrap();
        db.set_setting(
            crate::settings::keys::SUPPRESSED,
            &serde_json::json!([ORIGIN]),
        )
        .unwrap();

        let (provider, log) = RecordingProvider::new();
        let (service, events) = GeolocationService::builder(auto_allow())
            .provider(provider)
            .settings_store(db)
            .build();
        let (handle, task) = GeolocationRuntime::spawn(service, events);

        let session = handle
            .open_session(SessionOptions::for_origin(ORIGIN))
            .await
            .unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        handle
            .get_current_position(session, channel_callbacks(tx), PositionOptions::new())
            .await
            .unwrap();

        let sink = tokio::time::timeout(WAIT, provider_sink(&log)).await.unwrap();
        sink.update(Some(Position::new(1.0, 2.0, SystemClock.now_ms())));

        let outcome = tokio::time::timeout(WAIT, rx.recv()).await.unwrap();
        assert_eq!(
            outcome,
            Some(Outcome::Error(PositionError::PositionUnavailable))
        );

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_handle_after_shutdown() {
        let (handle, task, _log) = spawn(GeoConfig::default());
        handle.shutdown().await.unwrap();
        task.await.unwrap();

        assert!(matches!(
            handle.open_session(SessionOptions::for_origin(ORIGIN)).await,
            Err(GeoError::RuntimeClosed)
        ));
        assert!(matches!(
            handle.apply_setting_change("{}").await,
            Err(GeoError::RuntimeClosed)
        ));
    }
}
