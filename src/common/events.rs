use crate::sync::session::SessionState;

use super::types::{ChatMessage, SubmissionId};

/// Events sent from the sync client up to the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendEvent {
    /// Startup finished, with or without a usable identity.
    SessionResolved(SessionState),
    /// Full ordered message list as delivered by the store.
    SnapshotReceived(Vec<ChatMessage>),
    FeedFailed(String),
    SubmitSucceeded {
        submission: SubmissionId,
        message_id: String,
    },
    SubmitFailed {
        submission: SubmissionId,
        reason: String,
    },
}
