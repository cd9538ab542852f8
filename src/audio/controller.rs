use dashmap::{mapref::entry::Entry, DashMap};
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    audio::{
        events::PlaybackEvents,
        queue::GuildQueueStore,
        voice::{StreamOutcome, VoiceConnector},
    },
    error::{PlayOutcome, PlaybackError},
    sources::TrackResolver,
};

/// Where a live session currently is. `Idle` has no variant here: an idle
/// guild simply has no session, so absence of a session *is* the idle state
/// and the single source of truth for "is anything playing".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Joining,
    Streaming,
    /// A skip/stop arrived and is being honored.
    Cancelling,
    Leaving,
}

/// Live state of one guild's drain loop.
struct PlaybackSession {
    guild_id: GuildId,
    state: Mutex<SessionState>,
    /// Session-level cancellation: set by `stop`, ends the whole loop.
    stop: CancellationToken,
    /// Cancellation scope of the in-flight track: set by `skip`, child of
    /// `stop` so stopping also tears the current stream down.
    current: Mutex<Option<CancellationToken>>,
    now_playing: Mutex<Option<String>>,
}

impl PlaybackSession {
    fn new(guild_id: GuildId) -> Self {
        Self {
            guild_id,
            state: Mutex::new(SessionState::Joining),
            stop: CancellationToken::new(),
            current: Mutex::new(None),
            now_playing: Mutex::new(None),
        }
    }
}

/// Sequential drain-and-play per guild: exactly one consumer loop per guild,
/// popping the shared queue, resolving entries on the way, streaming them
/// through the voice connector, and cooperating with skip/stop signals.
pub struct QueuePlaybackController {
    store: Arc<GuildQueueStore>,
    voice: Arc<dyn VoiceConnector>,
    resolver: Arc<dyn TrackResolver>,
    events: Arc<dyn PlaybackEvents>,
    sessions: DashMap<GuildId, Arc<PlaybackSession>>,
}

impl QueuePlaybackController {
    pub fn new(
        store: Arc<GuildQueueStore>,
        voice: Arc<dyn VoiceConnector>,
        resolver: Arc<dyn TrackResolver>,
        events: Arc<dyn PlaybackEvents>,
    ) -> Self {
        Self {
            store,
            voice,
            resolver,
            events,
            sessions: DashMap::new(),
        }
    }

    /// Starts the drain loop for `guild_id`, joining `channel_id` first.
    ///
    /// Joining precedes the first dequeue: when the join fails the queue is
    /// left untouched and a retry resumes cleanly. A second call while a
    /// session is live reports `AlreadyRunning` without starting a second
    /// consumer.
    pub async fn play(
        self: &Arc<Self>,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<PlayOutcome, PlaybackError> {
        // An active session wins over an empty queue: it may be streaming
        // the very last entry right now.
        if self.sessions.contains_key(&guild_id) {
            return Ok(PlayOutcome::AlreadyRunning);
        }
        if self.store.is_empty(guild_id) {
            return Err(PlaybackError::AlreadyEmpty);
        }

        let session = Arc::new(PlaybackSession::new(guild_id));
        match self.sessions.entry(guild_id) {
            Entry::Occupied(_) => {
                debug!(guild = guild_id.get(), "play requested while already draining");
                return Ok(PlayOutcome::AlreadyRunning);
            }
            Entry::Vacant(slot) => {
                slot.insert(session.clone());
            }
        }

        if let Err(e) = self.voice.join(guild_id, channel_id).await {
            self.sessions.remove(&guild_id);
            warn!(guild = guild_id.get(), error = %e, "voice join failed");
            return Err(PlaybackError::Join(e));
        }

        let controller = Arc::clone(self);
        tokio::spawn(async move {
            controller.drain(session).await;
        });

        Ok(PlayOutcome::Started)
    }

    /// Cancels only the in-flight track; the loop advances to the next
    /// queued entry without leaving the voice channel. No-op when idle.
    pub fn skip(&self, guild_id: GuildId) {
        if let Some(session) = self.sessions.get(&guild_id) {
            let current = session.current.lock().clone();
            if let Some(token) = current {
                *session.state.lock() = SessionState::Cancelling;
                token.cancel();
                info!(guild = guild_id.get(), "⏭️ skipping current track");
            }
        }
    }

    /// Ends the whole session: the in-flight track is torn down, the loop
    /// exits and leaves the channel. The queue is deliberately not cleared.
    /// No-op when idle.
    pub fn stop(&self, guild_id: GuildId) {
        if let Some(session) = self.sessions.get(&guild_id) {
            *session.state.lock() = SessionState::Cancelling;
            session.stop.cancel();
            info!(guild = guild_id.get(), "⏹️ stopping playback");
        }
    }

    pub fn is_active(&self, guild_id: GuildId) -> bool {
        self.sessions.contains_key(&guild_id)
    }

    #[allow(dead_code)]
    pub fn state(&self, guild_id: GuildId) -> Option<SessionState> {
        self.sessions
            .get(&guild_id)
            .map(|session| *session.state.lock())
    }

    pub fn now_playing(&self, guild_id: GuildId) -> Option<String> {
        self.sessions
            .get(&guild_id)
            .and_then(|session| session.now_playing.lock().clone())
    }

    /// The loop body. Every exit path funnels through the teardown at the
    /// bottom: transition to `Leaving`, release the voice channel, drop the
    /// session. A session must never outlive its task.
    async fn drain(self: Arc<Self>, session: Arc<PlaybackSession>) {
        let guild_id = session.guild_id;
        let mut drained_naturally = true;

        loop {
            // Stop takes effect before the next entry is even popped.
            if session.stop.is_cancelled() {
                drained_naturally = false;
                break;
            }

            let request = match self.store.pop_front(guild_id) {
                Ok(request) => request,
                Err(_) => break,
            };

            let track_scope = session.stop.child_token();
            *session.current.lock() = Some(track_scope.clone());

            let resolved = match self.resolver.resolve(&request.reference).await {
                Ok(resolved) => resolved,
                Err(e) => {
                    // One bad link must not abandon the rest of the queue.
                    warn!(guild = guild_id.get(), reference = %request.reference, error = %e, "resolution failed");
                    self.events
                        .track_failed(guild_id, request.display_title(), &e.to_string())
                        .await;
                    continue;
                }
            };

            // A skip that raced the resolution: this entry is already
            // cancelled, move on before touching the driver.
            if track_scope.is_cancelled() {
                if session.stop.is_cancelled() {
                    drained_naturally = false;
                    break;
                }
                continue;
            }

            *session.state.lock() = SessionState::Streaming;
            *session.now_playing.lock() = Some(resolved.title.clone());

            let up_next = self
                .store
                .snapshot(guild_id)
                .first()
                .map(|next| next.display_title().to_string());
            let remaining = self.store.len(guild_id);
            self.events
                .now_playing(guild_id, &resolved.title, up_next.as_deref(), remaining)
                .await;
            info!(guild = guild_id.get(), title = %resolved.title, "🎵 streaming");

            let outcome = self
                .voice
                .stream(guild_id, resolved.playable, track_scope)
                .await;

            *session.now_playing.lock() = None;
            *session.current.lock() = None;

            match outcome {
                Ok(StreamOutcome::Completed) => {
                    debug!(guild = guild_id.get(), title = %resolved.title, "track finished");
                }
                Ok(StreamOutcome::Cancelled) => {
                    if session.stop.is_cancelled() {
                        drained_naturally = false;
                        break;
                    }
                    // Plain skip: advance without leaving the channel.
                }
                Err(e) if e.is_connection_fatal() => {
                    error!(guild = guild_id.get(), error = %e, "voice connection lost, ending session");
                    self.events
                        .track_failed(guild_id, &resolved.title, &e.to_string())
                        .await;
                    drained_naturally = false;
                    break;
                }
                Err(e) => {
                    warn!(guild = guild_id.get(), title = %resolved.title, error = %e, "stream failed");
                    self.events
                        .track_failed(guild_id, &resolved.title, &e.to_string())
                        .await;
                }
            }
        }

        *session.state.lock() = SessionState::Leaving;
        if let Err(e) = self.voice.leave(guild_id).await {
            warn!(guild = guild_id.get(), error = %e, "leave failed");
        }
        self.sessions.remove(&guild_id);
        info!(guild = guild_id.get(), "playback session ended");

        if drained_naturally {
            self.events.queue_finished(guild_id).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audio::queue::TrackRequest,
        error::{ResolveError, VoiceError},
        sources::{MockTrackResolver, Playable, ResolvedTrack},
    };
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::{
        collections::HashSet,
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };
    use serenity::model::id::UserId;
    use tokio::sync::Notify;

    fn test_guild() -> GuildId {
        GuildId::new(100)
    }

    fn test_channel() -> ChannelId {
        ChannelId::new(200)
    }

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum StreamMode {
        /// Streams complete on their own after a few millis.
        Auto,
        /// Streams run until `complete` is notified or they are cancelled.
        Manual,
    }

    struct FakeConnector {
        mode: StreamMode,
        joins: Mutex<Vec<(GuildId, ChannelId)>>,
        leaves: AtomicUsize,
        streamed: Mutex<Vec<String>>,
        fail_join: bool,
        failing_urls: Mutex<HashSet<String>>,
        fatal_urls: Mutex<HashSet<String>>,
        complete: Notify,
    }

    impl FakeConnector {
        fn raw(mode: StreamMode) -> Self {
            Self {
                mode,
                joins: Mutex::new(Vec::new()),
                leaves: AtomicUsize::new(0),
                streamed: Mutex::new(Vec::new()),
                fail_join: false,
                failing_urls: Mutex::new(HashSet::new()),
                fatal_urls: Mutex::new(HashSet::new()),
                complete: Notify::new(),
            }
        }

        fn new(mode: StreamMode) -> Arc<Self> {
            Arc::new(Self::raw(mode))
        }

        fn failing_join() -> Arc<Self> {
            Arc::new(Self {
                fail_join: true,
                ..Self::raw(StreamMode::Auto)
            })
        }

        fn streamed(&self) -> Vec<String> {
            self.streamed.lock().clone()
        }
    }

    #[async_trait]
    impl VoiceConnector for FakeConnector {
        async fn join(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<(), VoiceError> {
            if self.fail_join {
                return Err(VoiceError::PermissionDenied);
            }
            self.joins.lock().push((guild_id, channel_id));
            Ok(())
        }

        async fn leave(&self, _guild_id: GuildId) -> Result<(), VoiceError> {
            self.leaves.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn stream(
            &self,
            _guild_id: GuildId,
            playable: Playable,
            cancel: CancellationToken,
        ) -> Result<StreamOutcome, VoiceError> {
            let url = match playable {
                Playable::Remote { url } => url,
                Playable::Local { path } => path.display().to_string(),
            };
            self.streamed.lock().push(url.clone());

            if self.fatal_urls.lock().contains(&url) {
                return Err(VoiceError::ConnectionLost);
            }
            if self.failing_urls.lock().contains(&url) {
                return Err(VoiceError::Stream("boom".to_string()));
            }

            match self.mode {
                StreamMode::Auto => {
                    tokio::select! {
                        _ = cancel.cancelled() => Ok(StreamOutcome::Cancelled),
                        _ = tokio::time::sleep(Duration::from_millis(5)) => Ok(StreamOutcome::Completed),
                    }
                }
                StreamMode::Manual => {
                    tokio::select! {
                        _ = cancel.cancelled() => Ok(StreamOutcome::Cancelled),
                        _ = self.complete.notified() => Ok(StreamOutcome::Completed),
                    }
                }
            }
        }
    }

    #[derive(Default)]
    struct RecordingEvents {
        playing: Mutex<Vec<(String, Option<String>, usize)>>,
        failed: Mutex<Vec<String>>,
        finished: AtomicUsize,
    }

    #[async_trait]
    impl PlaybackEvents for RecordingEvents {
        async fn now_playing(
            &self,
            _guild_id: GuildId,
            title: &str,
            up_next: Option<&str>,
            remaining: usize,
        ) {
            self.playing.lock().push((
                title.to_string(),
                up_next.map(str::to_string),
                remaining,
            ));
        }

        async fn track_failed(&self, _guild_id: GuildId, title: &str, _reason: &str) {
            self.failed.lock().push(title.to_string());
        }

        async fn queue_finished(&self, _guild_id: GuildId) {
            self.finished.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Resolver where `bad*` references fail and everything else maps to
    /// `<REF>` / `<ref>-url`.
    fn resolver() -> MockTrackResolver {
        let mut resolver = MockTrackResolver::new();
        resolver.expect_resolve().returning(|reference| {
            if reference.starts_with("bad") {
                Err(ResolveError::NotFound(reference.to_string()))
            } else {
                Ok(ResolvedTrack {
                    title: reference.to_uppercase(),
                    playable: Playable::Remote {
                        url: format!("{reference}-url"),
                    },
                })
            }
        });
        resolver
    }

    fn harness(
        connector: Arc<FakeConnector>,
    ) -> (
        Arc<GuildQueueStore>,
        Arc<QueuePlaybackController>,
        Arc<RecordingEvents>,
    ) {
        let store = Arc::new(GuildQueueStore::new());
        let events = Arc::new(RecordingEvents::default());
        let controller = Arc::new(QueuePlaybackController::new(
            store.clone(),
            connector,
            Arc::new(resolver()),
            events.clone(),
        ));
        (store, controller, events)
    }

    fn enqueue(store: &GuildQueueStore, references: &[&str]) {
        for reference in references {
            store.append(test_guild(), TrackRequest::new(*reference, UserId::new(1)));
        }
    }

    async fn wait_until(mut cond: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !cond() {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("condition not reached within 2s");
    }

    #[tokio::test]
    async fn drains_the_queue_in_order_then_goes_idle() {
        let connector = FakeConnector::new(StreamMode::Auto);
        let (store, controller, events) = harness(connector.clone());
        enqueue(&store, &["a", "b", "c"]);

        let outcome = controller.play(test_guild(), test_channel()).await.unwrap();
        assert_eq!(outcome, PlayOutcome::Started);

        wait_until(|| !controller.is_active(test_guild())).await;

        assert_eq!(connector.streamed(), vec!["a-url", "b-url", "c-url"]);
        assert_eq!(connector.joins.lock().len(), 1);
        assert_eq!(connector.leaves.load(Ordering::SeqCst), 1);
        assert_eq!(store.len(test_guild()), 0);
        assert_eq!(events.finished.load(Ordering::SeqCst), 1);

        let playing = events.playing.lock().clone();
        let titles: Vec<_> = playing.iter().map(|(t, _, _)| t.clone()).collect();
        assert_eq!(titles, vec!["A", "B", "C"]);
        // The first announcement peeks at the next queued entry.
        assert_eq!(playing[0].1.as_deref(), Some("b"));
        assert_eq!(playing[0].2, 2);
        assert_eq!(playing[2].1, None);
        assert_eq!(playing[2].2, 0);
    }

    #[tokio::test]
    async fn second_play_reports_already_running() {
        let connector = FakeConnector::new(StreamMode::Manual);
        let (store, controller, _events) = harness(connector.clone());
        enqueue(&store, &["a", "b"]);

        assert_eq!(
            controller.play(test_guild(), test_channel()).await.unwrap(),
            PlayOutcome::Started
        );
        wait_until(|| controller.state(test_guild()) == Some(SessionState::Streaming)).await;

        assert_eq!(
            controller.play(test_guild(), test_channel()).await.unwrap(),
            PlayOutcome::AlreadyRunning
        );
        // Still a single consumer: only the head track is streaming.
        assert_eq!(connector.streamed(), vec!["a-url"]);
        assert_eq!(connector.joins.lock().len(), 1);

        controller.stop(test_guild());
        wait_until(|| !controller.is_active(test_guild())).await;
    }

    #[tokio::test]
    async fn play_on_an_empty_queue_fails() {
        let connector = FakeConnector::new(StreamMode::Auto);
        let (_store, controller, _events) = harness(connector.clone());

        let err = controller.play(test_guild(), test_channel()).await.unwrap_err();
        assert!(matches!(err, PlaybackError::AlreadyEmpty));
        assert!(connector.joins.lock().is_empty());
    }

    #[tokio::test]
    async fn join_failure_leaves_the_queue_untouched() {
        let connector = FakeConnector::failing_join();
        let (store, controller, _events) = harness(connector.clone());
        enqueue(&store, &["a", "b", "c"]);

        let err = controller.play(test_guild(), test_channel()).await.unwrap_err();
        assert!(matches!(err, PlaybackError::Join(_)));
        assert_eq!(store.len(test_guild()), 3);
        assert!(!controller.is_active(test_guild()));
        assert_eq!(connector.leaves.load(Ordering::SeqCst), 0);

        // A retry is not poisoned by the failed attempt.
        assert!(connector.streamed().is_empty());
    }

    #[tokio::test]
    async fn skip_advances_without_replaying_the_skipped_track() {
        let connector = FakeConnector::new(StreamMode::Manual);
        let (store, controller, _events) = harness(connector.clone());
        enqueue(&store, &["a", "b"]);

        controller.play(test_guild(), test_channel()).await.unwrap();
        wait_until(|| connector.streamed() == vec!["a-url".to_string()]).await;

        controller.skip(test_guild());
        wait_until(|| connector.streamed().len() == 2).await;

        // The skipped track never restarts and the channel is not left.
        assert_eq!(connector.streamed(), vec!["a-url", "b-url"]);
        assert_eq!(connector.leaves.load(Ordering::SeqCst), 0);
        assert_eq!(controller.now_playing(test_guild()).as_deref(), Some("B"));

        controller.stop(test_guild());
        wait_until(|| !controller.is_active(test_guild())).await;
    }

    #[tokio::test]
    async fn clear_during_playback_starts_no_further_tracks() {
        let connector = FakeConnector::new(StreamMode::Manual);
        let (store, controller, _events) = harness(connector.clone());
        enqueue(&store, &["a", "b", "c"]);

        controller.play(test_guild(), test_channel()).await.unwrap();
        wait_until(|| connector.streamed() == vec!["a-url".to_string()]).await;

        store.clear(test_guild());
        // The in-flight track is allowed to finish.
        connector.complete.notify_one();

        wait_until(|| !controller.is_active(test_guild())).await;
        assert_eq!(connector.streamed(), vec!["a-url"]);
        assert_eq!(connector.leaves.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stop_keeps_the_queue_and_releases_the_channel() {
        let connector = FakeConnector::new(StreamMode::Manual);
        let (store, controller, events) = harness(connector.clone());
        enqueue(&store, &["a", "b"]);

        controller.play(test_guild(), test_channel()).await.unwrap();
        wait_until(|| connector.streamed() == vec!["a-url".to_string()]).await;

        controller.stop(test_guild());
        wait_until(|| !controller.is_active(test_guild())).await;

        assert_eq!(connector.streamed(), vec!["a-url"]);
        assert_eq!(store.len(test_guild()), 1);
        assert_eq!(connector.leaves.load(Ordering::SeqCst), 1);
        // Stopping is not a natural drain.
        assert_eq!(events.finished.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn resolution_failure_skips_only_that_entry() {
        let connector = FakeConnector::new(StreamMode::Auto);
        let (store, controller, events) = harness(connector.clone());
        enqueue(&store, &["a", "bad-link", "c"]);

        controller.play(test_guild(), test_channel()).await.unwrap();
        wait_until(|| !controller.is_active(test_guild())).await;

        assert_eq!(connector.streamed(), vec!["a-url", "c-url"]);
        assert_eq!(events.failed.lock().clone(), vec!["bad-link"]);
        assert_eq!(events.finished.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stream_error_continues_with_the_next_track() {
        let connector = FakeConnector::new(StreamMode::Auto);
        connector
            .failing_urls
            .lock()
            .insert("a-url".to_string());
        let (store, controller, events) = harness(connector.clone());
        enqueue(&store, &["a", "b"]);

        controller.play(test_guild(), test_channel()).await.unwrap();
        wait_until(|| !controller.is_active(test_guild())).await;

        assert_eq!(connector.streamed(), vec!["a-url", "b-url"]);
        assert_eq!(events.failed.lock().clone(), vec!["A"]);
    }

    #[tokio::test]
    async fn connection_loss_ends_the_session() {
        let connector = FakeConnector::new(StreamMode::Auto);
        connector.fatal_urls.lock().insert("a-url".to_string());
        let (store, controller, events) = harness(connector.clone());
        enqueue(&store, &["a", "b"]);

        controller.play(test_guild(), test_channel()).await.unwrap();
        wait_until(|| !controller.is_active(test_guild())).await;

        // The session died on the first track; the rest stays queued for a
        // later retry and the channel is still released.
        assert_eq!(connector.streamed(), vec!["a-url"]);
        assert_eq!(store.len(test_guild()), 1);
        assert_eq!(connector.leaves.load(Ordering::SeqCst), 1);
        assert_eq!(events.finished.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn guild_sessions_are_independent() {
        let connector = FakeConnector::new(StreamMode::Manual);
        let (store, controller, _events) = harness(connector.clone());
        let other_guild = GuildId::new(101);

        enqueue(&store, &["a"]);
        store.append(other_guild, TrackRequest::new("x", UserId::new(1)));

        controller.play(test_guild(), test_channel()).await.unwrap();
        controller.play(other_guild, test_channel()).await.unwrap();
        wait_until(|| connector.streamed().len() == 2).await;

        // Stopping one guild leaves the other streaming.
        controller.stop(test_guild());
        wait_until(|| !controller.is_active(test_guild())).await;
        assert!(controller.is_active(other_guild));

        controller.stop(other_guild);
        wait_until(|| !controller.is_active(other_guild)).await;
    }
}
