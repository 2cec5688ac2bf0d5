use chrono::{DateTime, Utc};

use crate::backend::{ChatBackend, Snapshot, Subscription};
use crate::common::ChatMessage;
use crate::config::ORDER_FIELD;
use crate::error::BackendError;

pub type FeedUpdate = Result<Vec<ChatMessage>, BackendError>;

/// Holds the one live query over the message collection.
pub struct FeedSubscriber {
    collection: String,
    subscription: Subscription,
}

impl FeedSubscriber {
    pub async fn open(backend: &dyn ChatBackend, collection: &str) -> Result<Self, BackendError> {
        let subscription = backend.subscribe(collection, ORDER_FIELD).await?;
        log::info!("Subscribed to {collection} ordered by {ORDER_FIELD}");
        Ok(Self {
            collection: collection.to_string(),
            subscription,
        })
    }

    /// Next snapshot as view models, in the order the store returned them.
    pub async fn next_update(&mut self) -> Option<FeedUpdate> {
        let delivery = self.subscription.next().await?;
        Some(delivery.map(|snapshot| to_messages(snapshot, Utc::now())))
    }

    pub fn close(self) {
        log::info!("Unsubscribing from {}", self.collection);
        self.subscription.cancel();
    }
}

pub fn to_messages(snapshot: Snapshot, now: DateTime<Utc>) -> Vec<ChatMessage> {
    snapshot
        .into_iter()
        .map(|doc| doc.into_message(now))
        .collect()
}
