use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::mpsc;

use crate::backend::ChatBackend;
use crate::common::{BackendCommand, BackendEvent, SubmissionId};
use crate::error::BackendError;

use super::composer;
use super::feed::{FeedSubscriber, FeedUpdate};
use super::session::{self, SessionState};

pub const FEED_CLOSED: &str = "message feed closed by the backend";

/// Background half of the app: owns the session, the feed and the writes.
pub struct SyncClient {
    backend: Arc<dyn ChatBackend>,
    collection: String,
    credential: Option<String>,
    event_sender: mpsc::Sender<BackendEvent>,
    command_receiver: mpsc::Receiver<BackendCommand>,
}

impl SyncClient {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        collection: String,
        credential: Option<String>,
        event_sender: mpsc::Sender<BackendEvent>,
        command_receiver: mpsc::Receiver<BackendCommand>,
    ) -> Self {
        Self {
            backend,
            collection,
            credential,
            event_sender,
            command_receiver,
        }
    }

    /// Run until the UI drops its command sender.
    pub async fn run(mut self) {
        let session =
            session::bootstrap(self.backend.as_ref(), self.credential.as_deref()).await;
        self.emit(BackendEvent::SessionResolved(session.clone())).await;

        // Writes are served while the subscription is still being opened.
        let mut feed = if session.is_ready() {
            FeedState::Opening(self.open_feed())
        } else {
            log::warn!("No identity; message feed not opened");
            FeedState::Closed
        };

        log::info!("Sync event loop started");
        loop {
            tokio::select! {
                command = self.command_receiver.recv() => {
                    match command {
                        Some(command) => self.handle_command(command, &session),
                        None => break,
                    }
                }
                step = next_step(&mut feed) => {
                    match step {
                        FeedStep::Opened(Ok(subscriber)) => {
                            feed = FeedState::Live(subscriber);
                        }
                        FeedStep::Opened(Err(err)) => {
                            log::error!("Failed to subscribe to {}: {err}", self.collection);
                            self.emit(BackendEvent::FeedFailed(err.to_string())).await;
                            feed = FeedState::Closed;
                        }
                        FeedStep::Update(Some(Ok(messages))) => {
                            log::debug!("Snapshot with {} messages", messages.len());
                            self.emit(BackendEvent::SnapshotReceived(messages)).await;
                        }
                        FeedStep::Update(Some(Err(err))) => {
                            log::warn!("Feed delivery failed: {err}");
                            self.emit(BackendEvent::FeedFailed(err.to_string())).await;
                        }
                        FeedStep::Update(None) => {
                            log::warn!("Message feed closed by the backend");
                            feed.close();
                            self.emit(BackendEvent::FeedFailed(FEED_CLOSED.to_string()))
                                .await;
                        }
                    }
                }
            }
        }

        feed.close();
        log::info!("Sync client stopped");
    }

    fn open_feed(&self) -> BoxFuture<'static, Result<FeedSubscriber, BackendError>> {
        let backend = Arc::clone(&self.backend);
        let collection = self.collection.clone();
        async move { FeedSubscriber::open(backend.as_ref(), &collection).await }.boxed()
    }

    fn handle_command(&self, command: BackendCommand, session: &SessionState) {
        match command {
            BackendCommand::Submit { submission, text } => {
                self.spawn_submit(submission, text, session.clone());
            }
        }
    }

    /// Writes run concurrently; each reports back on its own.
    fn spawn_submit(&self, submission: SubmissionId, text: String, session: SessionState) {
        let backend = Arc::clone(&self.backend);
        let collection = self.collection.clone();
        let event_sender = self.event_sender.clone();

        tokio::spawn(async move {
            let event =
                match composer::submit(backend.as_ref(), &collection, &session, &text).await {
                    Ok(message_id) => BackendEvent::SubmitSucceeded {
                        submission,
                        message_id,
                    },
                    Err(err) => {
                        log::warn!("Failed to send message: {err}");
                        BackendEvent::SubmitFailed {
                            submission,
                            reason: err.to_string(),
                        }
                    }
                };
            if let Err(err) = event_sender.send(event).await {
                log::warn!("Failed to report submit result to UI: {err}");
            }
        });
    }

    async fn emit(&self, event: BackendEvent) {
        if let Err(err) = self.event_sender.send(event).await {
            log::warn!("Failed to notify UI: {err}");
        }
    }
}

/// Lifecycle of the one message subscription.
enum FeedState {
    Opening(BoxFuture<'static, Result<FeedSubscriber, BackendError>>),
    Live(FeedSubscriber),
    Closed,
}

impl FeedState {
    /// Release the subscription, if any. Safe to call repeatedly.
    fn close(&mut self) {
        if let FeedState::Live(subscriber) = std::mem::replace(self, FeedState::Closed) {
            subscriber.close();
        }
    }
}

enum FeedStep {
    Opened(Result<FeedSubscriber, BackendError>),
    Update(Option<FeedUpdate>),
}

/// Progress of a pending open survives when `select!` drops this future.
async fn next_step(feed: &mut FeedState) -> FeedStep {
    match feed {
        FeedState::Opening(opening) => FeedStep::Opened(opening.await),
        FeedState::Live(subscriber) => FeedStep::Update(subscriber.next_update().await),
        FeedState::Closed => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::timeout;

    use super::*;
    use crate::backend::MemoryBackend;
    use crate::sync::Composer;

    const ROOM: &str = "artifacts/client/public/data/messages";

    struct Harness {
        backend: MemoryBackend,
        commands: mpsc::Sender<BackendCommand>,
        events: mpsc::Receiver<BackendEvent>,
        task: tokio::task::JoinHandle<()>,
    }

    /// How the feed of a [`ScriptedFeedBackend`] misbehaves.
    #[derive(Clone, Copy)]
    enum FeedScript {
        /// The listen request is accepted but never answers.
        Stalls,
        /// One empty snapshot, then the stream ends.
        EndsAfterFirstSnapshot,
    }

    /// Memory store for sign-in and writes, with a scripted feed.
    struct ScriptedFeedBackend {
        store: MemoryBackend,
        feed: FeedScript,
    }

    #[async_trait::async_trait]
    impl ChatBackend for ScriptedFeedBackend {
        async fn authenticate(&self, credential: Option<&str>) -> Result<String, BackendError> {
            self.store.authenticate(credential).await
        }

        async fn subscribe(
            &self,
            _collection: &str,
            _order_by: &str,
        ) -> Result<crate::backend::Subscription, BackendError> {
            match self.feed {
                FeedScript::Stalls => std::future::pending().await,
                FeedScript::EndsAfterFirstSnapshot => Ok(crate::backend::Subscription::new(
                    futures::stream::iter(vec![Ok(Vec::new())]),
                    || {},
                )),
            }
        }

        async fn append(
            &self,
            collection: &str,
            record: crate::common::NewMessage,
        ) -> Result<String, BackendError> {
            self.store.append(collection, record).await
        }
    }

    fn start(backend: MemoryBackend, credential: Option<&str>) -> Harness {
        spawn_client(Arc::new(backend.clone()), backend, credential)
    }

    fn start_scripted(feed: FeedScript) -> Harness {
        let store = MemoryBackend::new();
        let backend = ScriptedFeedBackend {
            store: store.clone(),
            feed,
        };
        spawn_client(Arc::new(backend), store, None)
    }

    fn spawn_client(
        client_backend: Arc<dyn ChatBackend>,
        backend: MemoryBackend,
        credential: Option<&str>,
    ) -> Harness {
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        let (event_tx, event_rx) = mpsc::channel(16);
        let client = SyncClient::new(
            client_backend,
            ROOM.to_string(),
            credential.map(str::to_string),
            event_tx,
            cmd_rx,
        );
        Harness {
            backend,
            commands: cmd_tx,
            events: event_rx,
            task: tokio::spawn(client.run()),
        }
    }

    async fn next_event(events: &mut mpsc::Receiver<BackendEvent>) -> BackendEvent {
        timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("event within deadline")
            .expect("channel open")
    }

    #[tokio::test]
    async fn ready_session_streams_snapshots_and_writes() {
        let mut h = start(MemoryBackend::new(), None);

        let BackendEvent::SessionResolved(session) = next_event(&mut h.events).await else {
            panic!("expected session first");
        };
        let user_id = session.user_id().unwrap().to_string();
        assert_eq!(
            next_event(&mut h.events).await,
            BackendEvent::SnapshotReceived(Vec::new())
        );

        let mut composer = Composer::new();
        composer.input = "hello".to_string();
        let (submission, text) = composer.begin_submit(&session).unwrap();
        h.commands
            .send(BackendCommand::Submit { submission, text })
            .await
            .unwrap();

        let mut saw_success = false;
        let mut saw_snapshot = false;
        while !(saw_success && saw_snapshot) {
            match next_event(&mut h.events).await {
                BackendEvent::SubmitSucceeded {
                    submission: done, ..
                } => {
                    assert_eq!(done, submission);
                    composer.finish(done, true);
                    saw_success = true;
                }
                BackendEvent::SnapshotReceived(messages) => {
                    assert_eq!(messages.len(), 1);
                    assert_eq!(messages[0].author_id, user_id);
                    assert_eq!(messages[0].text, "hello");
                    saw_snapshot = true;
                }
                other => panic!("unexpected event {other:?}"),
            }
        }
        assert!(composer.input.is_empty());
    }

    #[tokio::test]
    async fn failed_write_reports_and_keeps_input() {
        let backend = MemoryBackend::new();
        backend.set_write_failure(Some("offline".to_string()));
        let mut h = start(backend, None);

        let BackendEvent::SessionResolved(session) = next_event(&mut h.events).await else {
            panic!("expected session first");
        };
        next_event(&mut h.events).await;

        let mut composer = Composer::new();
        composer.input = "keep me".to_string();
        let (submission, text) = composer.begin_submit(&session).unwrap();
        h.commands
            .send(BackendCommand::Submit { submission, text })
            .await
            .unwrap();

        match next_event(&mut h.events).await {
            BackendEvent::SubmitFailed { submission: done, .. } => composer.finish(done, false),
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(composer.input, "keep me");
        assert_eq!(h.backend.stats().writes, 0);
    }

    #[tokio::test]
    async fn auth_failure_resolves_promptly_without_feed() {
        let backend = MemoryBackend::new();
        backend.set_auth_failure(Some("unreachable".to_string()));
        let mut h = start(backend, None);

        let event = next_event(&mut h.events).await;

        assert!(matches!(
            event,
            BackendEvent::SessionResolved(SessionState::Degraded { .. })
        ));
        assert_eq!(h.backend.stats().subscriptions_opened, 0);
    }

    #[tokio::test]
    async fn dropping_the_ui_side_cancels_feed_once() {
        let mut h = start(MemoryBackend::new(), None);
        next_event(&mut h.events).await;
        next_event(&mut h.events).await;
        assert_eq!(h.backend.stats().active_subscriptions(), 1);

        drop(h.commands);
        timeout(Duration::from_secs(2), h.task)
            .await
            .expect("client stops")
            .unwrap();

        let stats = h.backend.stats();
        assert_eq!(stats.subscriptions_opened, 1);
        assert_eq!(stats.subscriptions_cancelled, 1);
    }

    #[tokio::test]
    async fn feed_error_is_surfaced_and_feed_keeps_running() {
        let mut h = start(MemoryBackend::new(), None);
        next_event(&mut h.events).await;
        next_event(&mut h.events).await;

        h.backend.inject_feed_error(ROOM, "permission denied");
        assert!(matches!(
            next_event(&mut h.events).await,
            BackendEvent::FeedFailed(reason) if reason.contains("permission denied")
        ));

        h.backend
            .append(
                ROOM,
                crate::common::NewMessage {
                    text: "back".to_string(),
                    author_id: "B".to_string(),
                },
            )
            .await
            .unwrap();
        match next_event(&mut h.events).await {
            BackendEvent::SnapshotReceived(messages) => assert_eq!(messages[0].text, "back"),
            other => panic!("unexpected event {other:?}"),
        }
    }

    async fn submit_text(
        h: &mut Harness,
        session: &SessionState,
        input: &str,
    ) -> (Composer, SubmissionId) {
        let mut composer = Composer::new();
        composer.input = input.to_string();
        let (submission, text) = composer.begin_submit(session).unwrap();
        h.commands
            .send(BackendCommand::Submit { submission, text })
            .await
            .unwrap();
        (composer, submission)
    }

    #[tokio::test]
    async fn ended_feed_marks_ui_stale_and_writes_still_work() {
        let mut h = start_scripted(FeedScript::EndsAfterFirstSnapshot);
        let mut state = crate::ui::state::AppState::new();

        let event = next_event(&mut h.events).await;
        let BackendEvent::SessionResolved(session) = event.clone() else {
            panic!("expected session first");
        };
        state.apply(event);
        state.apply(next_event(&mut h.events).await);
        assert!(state.feed_error.is_none());

        let event = next_event(&mut h.events).await;
        assert_eq!(event, BackendEvent::FeedFailed(FEED_CLOSED.to_string()));
        state.apply(event);
        assert_eq!(state.feed_error.as_deref(), Some(FEED_CLOSED));

        let (_composer, submission) = submit_text(&mut h, &session, "still here").await;
        match next_event(&mut h.events).await {
            BackendEvent::SubmitSucceeded { submission: done, .. } => assert_eq!(done, submission),
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(h.backend.stats().writes, 1);
    }

    #[tokio::test]
    async fn writes_are_served_while_subscribe_is_pending() {
        let mut h = start_scripted(FeedScript::Stalls);

        let BackendEvent::SessionResolved(session) = next_event(&mut h.events).await else {
            panic!("expected session first");
        };
        let (mut composer, submission) = submit_text(&mut h, &session, "hello").await;

        match next_event(&mut h.events).await {
            BackendEvent::SubmitSucceeded { submission: done, .. } => {
                assert_eq!(done, submission);
                composer.finish(done, true);
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(h.backend.stats().writes, 1);
        assert!(composer.input.is_empty());

        drop(h.commands);
        timeout(Duration::from_secs(2), h.task)
            .await
            .expect("client stops while subscribe is pending")
            .unwrap();
    }
}
