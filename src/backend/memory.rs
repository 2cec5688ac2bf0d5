use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use uuid::Uuid;

use crate::common::{NewMessage, StoredDocument};
use crate::config::ORDER_FIELD;
use crate::error::BackendError;

use super::{ChatBackend, Snapshot, Subscription};

type Delivery = Result<Snapshot, BackendError>;

/// Source of store-assigned timestamps.
pub trait ServerClock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl ServerClock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Counters exposed for diagnostics and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackendStats {
    pub writes: usize,
    pub subscriptions_opened: usize,
    pub subscriptions_cancelled: usize,
}

impl BackendStats {
    pub fn active_subscriptions(&self) -> usize {
        self.subscriptions_opened - self.subscriptions_cancelled
    }
}

struct Collection {
    /// (insertion sequence, document), kept sorted by (createdAt, sequence).
    documents: Vec<(u64, StoredDocument)>,
    feed: watch::Sender<Delivery>,
}

impl Collection {
    fn new() -> Self {
        let (feed, _) = watch::channel(Ok(Vec::new()));
        Self {
            documents: Vec::new(),
            feed,
        }
    }

    fn snapshot(&self) -> Snapshot {
        self.documents.iter().map(|(_, doc)| doc.clone()).collect()
    }

    fn publish(&self) {
        self.feed.send_replace(Ok(self.snapshot()));
    }
}

#[derive(Default)]
struct Inner {
    collections: HashMap<String, Collection>,
    tokens: HashMap<String, String>,
    next_sequence: u64,
    stats: BackendStats,
    auth_failure: Option<String>,
    write_failure: Option<String>,
}

impl Inner {
    fn collection(&mut self, path: &str) -> &mut Collection {
        self.collections
            .entry(path.to_string())
            .or_insert_with(Collection::new)
    }
}

/// Document store living inside the process.
///
/// Used when no remote endpoint is configured; it keeps the same contract as
/// a remote store: server-side timestamps, ordering by `createdAt`, a full
/// snapshot to every subscriber on each write.
#[derive(Clone)]
pub struct MemoryBackend {
    inner: Arc<Mutex<Inner>>,
    clock: Arc<dyn ServerClock>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn ServerClock>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            clock,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        lock_inner(&self.inner)
    }

    /// Accept `token` as a credential for `user_id`.
    pub fn register_token(&self, token: impl Into<String>, user_id: impl Into<String>) {
        self.lock().tokens.insert(token.into(), user_id.into());
    }

    /// Make every following authentication fail with `reason` (or succeed again with `None`).
    pub fn set_auth_failure(&self, reason: Option<String>) {
        self.lock().auth_failure = reason;
    }

    pub fn set_write_failure(&self, reason: Option<String>) {
        self.lock().write_failure = reason;
    }

    /// Deliver a failure to every subscriber of `collection`.
    pub fn inject_feed_error(&self, collection: &str, reason: impl Into<String>) {
        let mut inner = self.lock();
        inner
            .collection(collection)
            .feed
            .send_replace(Err(BackendError::Subscription(reason.into())));
    }

    pub fn stats(&self) -> BackendStats {
        self.lock().stats
    }

    pub fn documents(&self, collection: &str) -> Snapshot {
        self.lock()
            .collections
            .get(collection)
            .map(Collection::snapshot)
            .unwrap_or_default()
    }
}

fn lock_inner(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl ChatBackend for MemoryBackend {
    async fn authenticate(&self, credential: Option<&str>) -> Result<String, BackendError> {
        let inner = self.lock();
        if let Some(reason) = &inner.auth_failure {
            return Err(BackendError::Auth(reason.clone()));
        }

        match credential {
            Some(token) => inner
                .tokens
                .get(token)
                .cloned()
                .ok_or_else(|| BackendError::Auth("unknown credential".to_string())),
            None => Ok(format!("anon-{}", Uuid::new_v4().simple())),
        }
    }

    async fn subscribe(
        &self,
        collection: &str,
        order_by: &str,
    ) -> Result<Subscription, BackendError> {
        if order_by != ORDER_FIELD {
            return Err(BackendError::Unsupported(format!(
                "ordering by `{order_by}`"
            )));
        }

        let mut receiver = {
            let mut inner = self.lock();
            inner.stats.subscriptions_opened += 1;
            inner.collection(collection).feed.subscribe()
        };
        log::debug!("Opened in-process subscription on {collection}");

        let stream = async_stream::stream! {
            let current = receiver.borrow_and_update().clone();
            yield current;
            while receiver.changed().await.is_ok() {
                let delivery = receiver.borrow_and_update().clone();
                yield delivery;
            }
        };

        let inner = Arc::clone(&self.inner);
        let path = collection.to_string();
        Ok(Subscription::new(stream, move || {
            lock_inner(&inner).stats.subscriptions_cancelled += 1;
            log::debug!("Cancelled in-process subscription on {path}");
        }))
    }

    async fn append(&self, collection: &str, record: NewMessage) -> Result<String, BackendError> {
        let mut inner = self.lock();
        if let Some(reason) = &inner.write_failure {
            return Err(BackendError::Network(reason.clone()));
        }
        if record.author_id.trim().is_empty() {
            return Err(BackendError::Rejected {
                status: 400,
                message: "authorId must not be empty".to_string(),
            });
        }

        let id = Uuid::new_v4().to_string();
        let document = StoredDocument {
            id: id.clone(),
            text: record.text,
            author_id: record.author_id,
            created_at: Some(self.clock.now()),
        };
        let sequence = inner.next_sequence;
        inner.next_sequence += 1;
        inner.stats.writes += 1;

        let target = inner.collection(collection);
        target.documents.push((sequence, document));
        target
            .documents
            .sort_by_key(|(sequence, doc)| (doc.created_at, *sequence));
        target.publish();

        Ok(id)
    }
}
