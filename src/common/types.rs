use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A chat message as shown in the thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: String,
    pub text: String,
    pub author_id: String,
    pub created_at: DateTime<Utc>,
}

/// A message document as the store returns it.
///
/// `created_at` is `None` while the store has not committed its server
/// timestamp yet (a write still in flight).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredDocument {
    pub id: String,
    pub text: String,
    pub author_id: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl StoredDocument {
    /// Converts into the view model, using `now` for a missing timestamp.
    pub fn into_message(self, now: DateTime<Utc>) -> ChatMessage {
        ChatMessage {
            id: self.id,
            text: self.text,
            author_id: self.author_id,
            created_at: self.created_at.unwrap_or(now),
        }
    }
}

/// Record handed to the store on submit.
///
/// Carries no timestamp: `createdAt` is always assigned by the store, never
/// by the local clock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMessage {
    pub text: String,
    pub author_id: String,
}

/// Tags one in-flight submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubmissionId(Uuid);

impl SubmissionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn committed_timestamp_is_kept() {
        let committed = Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let doc = StoredDocument {
            id: "m1".to_string(),
            text: "hi".to_string(),
            author_id: "A".to_string(),
            created_at: Some(committed),
        };

        assert_eq!(doc.into_message(now).created_at, committed);
    }

    #[test]
    fn pending_timestamp_falls_back_to_now() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let doc: StoredDocument =
            serde_json::from_str(r#"{"id":"m1","text":"hi","authorId":"A","createdAt":null}"#)
                .unwrap();

        let message = doc.into_message(now);
        assert_eq!(message.created_at, now);
        assert_eq!(message.author_id, "A");
    }

    #[test]
    fn new_message_never_serializes_a_timestamp() {
        let record = NewMessage {
            text: "hello".to_string(),
            author_id: "A".to_string(),
        };
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json, serde_json::json!({ "text": "hello", "authorId": "A" }));
    }
}
