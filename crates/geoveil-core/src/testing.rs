//! Test doubles shared by the module tests

use parking_lot::Mutex;
use std::sync::Arc;

use geoveil_privacy::Position;

use crate::error::{PositionError, ProviderError};
use crate::prompt::{PermissionPrompt, PermissionPrompter};
use crate::provider::{LocationProvider, ProviderSink};
use crate::request::RequestCallbacks;

#[derive(Debug, Default)]
pub struct ProviderCalls {
    pub startups: usize,
    pub shutdowns: usize,
    pub accuracy: Vec<bool>,
    pub sink: Option<ProviderSink>,
}

pub type ProviderLog = Arc<Mutex<ProviderCalls>>;

pub struct RecordingProvider {
    log: ProviderLog,
    pub fail_startup: bool,
    pub fail_watch: bool,
}

impl RecordingProvider {
    pub fn new() -> (Self, ProviderLog) {
        let log: ProviderLog = Arc::default();
        (
            Self {
                log: Arc::clone(&log),
                fail_startup: false,
                fail_watch: false,
            },
            log,
        )
    }
}

impl LocationProvider for RecordingProvider {
    fn startup(&mut self) -> Result<(), ProviderError> {
        self.log.lock().startups += 1;
        if self.fail_startup {
            return Err(ProviderError::Startup("no fix source".to_string()));
        }
        Ok(())
    }

    fn watch(&mut self, sink: ProviderSink) -> Result<(), ProviderError> {
        if self.fail_watch {
            return Err(ProviderError::Watch("sink rejected".to_string()));
        }
        self.log.lock().sink = Some(sink);
        Ok(())
    }

    fn shutdown(&mut self) {
        let mut log = self.log.lock();
        log.shutdowns += 1;
        log.sink = None;
    }

    fn set_high_accuracy(&mut self, high: bool) {
        self.log.lock().accuracy.push(high);
    }
}

pub type PromptLog = Arc<Mutex<Vec<PermissionPrompt>>>;

pub struct RecordingPrompter {
    log: PromptLog,
}

impl RecordingPrompter {
    pub fn new() -> (Self, PromptLog) {
        let log: PromptLog = Arc::default();
        (
            Self {
                log: Arc::clone(&log),
            },
            log,
        )
    }
}

impl PermissionPrompter for RecordingPrompter {
    fn prompt(&mut self, prompt: PermissionPrompt) {
        self.log.lock().push(prompt);
    }
}

/// Ordered log of every callback fired, shared by many requests.
#[derive(Debug, Clone, Default)]
pub struct CallbackLog(Arc<Mutex<Vec<String>>>);

impl CallbackLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Callbacks recording `"<label> ok <lat>,<lon>"` and `"<label> err <code>"`.
    pub fn callbacks(&self, label: &str) -> RequestCallbacks {
        let ok_log = Arc::clone(&self.0);
        let err_log = Arc::clone(&self.0);
        let ok_label = label.to_string();
        let err_label = label.to_string();

        RequestCallbacks::new(move |p: &Position| {
            ok_log
                .lock()
                .push(format!("{} ok {},{}", ok_label, p.latitude, p.longitude))
        })
        .with_error(move |e: PositionError| {
            err_log.lock().push(format!("{} err {}", err_label, e.code()))
        })
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub fn clear(&self) {
        self.0.lock().clear();
    }
}
