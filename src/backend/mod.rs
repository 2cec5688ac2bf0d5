pub mod http;
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{BoxStream, Stream, StreamExt};

use crate::common::{NewMessage, StoredDocument};
use crate::config::BackendDescriptor;
use crate::error::BackendError;

pub use http::HttpBackend;
pub use memory::MemoryBackend;

/// Full ordered contents of a collection at one point in time.
pub type Snapshot = Vec<StoredDocument>;

/// The document backend: identity provider plus message store.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Resolve a user id, with the given credential or anonymously.
    async fn authenticate(&self, credential: Option<&str>) -> Result<String, BackendError>;

    /// Open a live query over `collection`, ordered ascending by `order_by`.
    async fn subscribe(&self, collection: &str, order_by: &str)
    -> Result<Subscription, BackendError>;

    /// Append one record; the store assigns its id and `createdAt`.
    async fn append(&self, collection: &str, record: NewMessage) -> Result<String, BackendError>;
}

/// A standing live query.
///
/// Yields a complete snapshot on every change. The cancel hook runs exactly
/// once, on [`Subscription::cancel`] or on drop, whichever comes first.
pub struct Subscription {
    stream: BoxStream<'static, Result<Snapshot, BackendError>>,
    on_cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new<S, F>(stream: S, on_cancel: F) -> Self
    where
        S: Stream<Item = Result<Snapshot, BackendError>> + Send + 'static,
        F: FnOnce() + Send + 'static,
    {
        Self {
            stream: stream.boxed(),
            on_cancel: Some(Box::new(on_cancel)),
        }
    }

    /// Next delivery; `None` once the backend closed the query.
    pub async fn next(&mut self) -> Option<Result<Snapshot, BackendError>> {
        self.stream.next().await
    }

    pub fn cancel(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(on_cancel) = self.on_cancel.take() {
            on_cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

/// Build the backend described by the configuration.
///
/// Falls back to the in-process store when no endpoint is set or the HTTP
/// client cannot be constructed.
pub fn connect(descriptor: &BackendDescriptor) -> Arc<dyn ChatBackend> {
    let Some(endpoint) = descriptor.endpoint.as_deref() else {
        log::warn!("No backend endpoint configured; messages stay in this process");
        return Arc::new(MemoryBackend::new());
    };

    match HttpBackend::new(
        endpoint,
        descriptor.api_key.clone(),
        descriptor.request_timeout(),
    ) {
        Ok(backend) => {
            log::info!("Using HTTP backend at {endpoint}");
            Arc::new(backend)
        }
        Err(err) => {
            log::error!("Failed to build HTTP backend for {endpoint}: {err}; using in-process store");
            Arc::new(MemoryBackend::new())
        }
    }
}
