use super::types::SubmissionId;

/// Commands sent from the UI down to the sync client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCommand {
    /// Append one message authored by the current session.
    /// - submission: tag echoed back in the matching result event
    /// - text: already trimmed and validated by the composer
    Submit {
        submission: SubmissionId,
        text: String,
    },
}
