use std::collections::HashMap;

use crate::backend::ChatBackend;
use crate::common::{NewMessage, SubmissionId};
use crate::error::SubmitError;

use super::session::SessionState;

/// Check a draft before it may be written. Returns the trimmed text.
pub fn validate(text: &str, session: &SessionState) -> Result<String, SubmitError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(SubmitError::Empty);
    }
    if !session.is_ready() {
        return Err(SubmitError::NotReady);
    }
    Ok(text.to_string())
}

/// Append one message authored by the session user. Returns the store id.
///
/// The record carries no timestamp; the store assigns `createdAt`. No retry.
pub async fn submit(
    backend: &dyn ChatBackend,
    collection: &str,
    session: &SessionState,
    text: &str,
) -> Result<String, SubmitError> {
    let text = validate(text, session)?;
    let author_id = session.user_id().ok_or(SubmitError::NotReady)?;

    let record = NewMessage {
        text,
        author_id: author_id.to_string(),
    };
    let id = backend.append(collection, record).await?;
    log::debug!("Stored message {id} in {collection}");
    Ok(id)
}

/// The input buffer and its in-flight submissions.
#[derive(Debug, Default)]
pub struct Composer {
    pub input: String,
    /// Raw buffer contents at the time each submission started.
    pending: HashMap<SubmissionId, String>,
}

impl Composer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the buffer and start tracking a submission of it.
    pub fn begin_submit(
        &mut self,
        session: &SessionState,
    ) -> Result<(SubmissionId, String), SubmitError> {
        let text = validate(&self.input, session)?;
        let submission = SubmissionId::new();
        self.pending.insert(submission, self.input.clone());
        Ok((submission, text))
    }

    /// Settle a submission.
    ///
    /// Success clears the buffer unless the user already typed something
    /// else; failure leaves it as it is.
    pub fn finish(&mut self, submission: SubmissionId, succeeded: bool) {
        let Some(sent) = self.pending.remove(&submission) else {
            log::debug!("Ignoring result for unknown submission {submission:?}");
            return;
        };
        if succeeded && self.input == sent {
            self.input.clear();
        }
    }

    /// Drop every in-flight submission as failed; the buffer is kept.
    pub fn abandon_all(&mut self) -> usize {
        let abandoned = self.pending.len();
        self.pending.clear();
        abandoned
    }

    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }
}
