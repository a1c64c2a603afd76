//! Permission prompting
//!
//! The prompt UI is asynchronous: a prompt goes out with a ticket and the
//! answer comes back later through `resolve_permission`.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::session::RequestHandle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionPrompt {
    pub ticket: RequestHandle,
    pub origin: String,
    pub watch: bool,
    pub high_accuracy: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionDecision {
    Allow,
    Deny,
}

impl From<bool> for PermissionDecision {
    fn from(allow: bool) -> Self {
        if allow {
            PermissionDecision::Allow
        } else {
            PermissionDecision::Deny
        }
    }
}

pub trait PermissionPrompter: Send {
    fn prompt(&mut self, prompt: PermissionPrompt);
}

/// Forwards prompts to a channel read by the UI.
#[derive(Debug, Clone)]
pub struct ChannelPrompter {
    tx: mpsc::UnboundedSender<PermissionPrompt>,
}

impl ChannelPrompter {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<PermissionPrompt>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl PermissionPrompter for ChannelPrompter {
    fn prompt(&mut self, prompt: PermissionPrompt) {
        if self.tx.send(prompt).is_err() {
            tracing::warn!("Permission prompt receiver dropped");
        }
    }
}
