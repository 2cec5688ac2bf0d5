use chrono::{DateTime, Utc};

use crate::common::{BackendCommand, BackendEvent, ChatMessage, SubmissionId};
use crate::error::SubmitError;
use crate::sync::{Composer, SessionState};

use super::components::chat_area::{self, Bubble};

const MAX_DIAGNOSTICS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    Session,
    Feed,
    FeedError,
    Sent,
    SendError,
}

/// Entry in the diagnostics panel.
#[derive(Debug, Clone)]
pub struct DiagnosticEvent {
    pub timestamp: DateTime<Utc>,
    pub kind: DiagnosticKind,
    pub message: String,
}

/// Local UI state, changed only through the methods below.
pub struct AppState {
    pub session: SessionState,
    pub messages: Vec<ChatMessage>,
    pub composer: Composer,
    /// Last feed delivery failed; `messages` is the last good snapshot.
    pub feed_error: Option<String>,
    pub send_error: Option<String>,
    pub diagnostics: Vec<DiagnosticEvent>,
    scroll_to_latest: bool,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

impl AppState {
    pub fn new() -> Self {
        Self {
            session: SessionState::Loading,
            messages: Vec::new(),
            composer: Composer::new(),
            feed_error: None,
            send_error: None,
            diagnostics: Vec::new(),
            scroll_to_latest: false,
        }
    }

    pub fn apply(&mut self, event: BackendEvent) {
        match event {
            BackendEvent::SessionResolved(session) => {
                let message = match &session {
                    SessionState::Ready { user_id } => format!("Signed in as {user_id}"),
                    SessionState::Degraded { reason } => format!("Not connected: {reason}"),
                    SessionState::Loading => "Still loading".to_string(),
                };
                self.add_diagnostic(DiagnosticKind::Session, message);
                self.session = session;
            }
            BackendEvent::SnapshotReceived(messages) => {
                self.add_diagnostic(
                    DiagnosticKind::Feed,
                    format!("Snapshot with {} messages", messages.len()),
                );
                self.messages = messages;
                self.feed_error = None;
                self.scroll_to_latest = true;
            }
            BackendEvent::FeedFailed(reason) => {
                self.add_diagnostic(DiagnosticKind::FeedError, reason.clone());
                self.feed_error = Some(reason);
            }
            BackendEvent::SubmitSucceeded {
                submission,
                message_id,
            } => {
                self.composer.finish(submission, true);
                self.send_error = None;
                self.add_diagnostic(DiagnosticKind::Sent, format!("Stored message {message_id}"));
            }
            BackendEvent::SubmitFailed { submission, reason } => {
                self.abandon_submit(submission, reason);
            }
        }
    }

    /// Turn the composer buffer into a write command, if it is sendable.
    pub fn begin_submit(&mut self) -> Result<BackendCommand, SubmitError> {
        let (submission, text) = self.composer.begin_submit(&self.session)?;
        Ok(BackendCommand::Submit { submission, text })
    }

    /// The submission will not be stored; the buffer stays for a manual retry.
    pub fn abandon_submit(&mut self, submission: SubmissionId, reason: String) {
        self.composer.finish(submission, false);
        self.add_diagnostic(DiagnosticKind::SendError, reason.clone());
        self.send_error = Some(reason);
    }

    /// The sync client is gone: nothing in flight will ever be answered.
    pub fn sync_stopped(&mut self) {
        let abandoned = self.composer.abandon_all();
        let reason = "sync client stopped".to_string();
        if abandoned > 0 {
            self.send_error = Some(reason.clone());
        }
        self.add_diagnostic(
            DiagnosticKind::SendError,
            format!("{reason}; {abandoned} message(s) not confirmed"),
        );
    }

    pub fn bubbles(&self) -> Vec<Bubble> {
        chat_area::layout(&self.messages, self.session.user_id())
    }

    /// True once after each new snapshot.
    pub fn take_scroll_request(&mut self) -> bool {
        std::mem::take(&mut self.scroll_to_latest)
    }

    pub fn add_diagnostic(&mut self, kind: DiagnosticKind, message: String) {
        self.diagnostics.push(DiagnosticEvent {
            timestamp: Utc::now(),
            kind,
            message,
        });

        if self.diagnostics.len() > MAX_DIAGNOSTICS {
            self.diagnostics.remove(0);
        }
    }
}
