//! Session coordinator — drives the full capture → channel → parse/track →
//! playback loop.
//!
//! [`SessionCoordinator`] owns the connection state machine and responds to
//! [`SessionCommand`]s received over a `tokio::sync::mpsc` channel.  While a
//! session is live, a single `select!` loop consumes commands, inbound
//! channel events, outbound capture chunks and the two periodic timers —
//! one writer domain for the tracker, the history and the playback
//! scheduler, so no cross-domain locking beyond the shared snapshots.
//!
//! # Event routing
//!
//! ```text
//! SessionCommand::Start
//!   └─▶ acquire mic → open channel            [Connecting]
//!         └─▶ ChannelEvent::Opened            [Connected]
//!               ├─ OutputTranscriptDelta → DetectionParser → IdentityTracker
//!               │                         └─▶ output turn buffer
//!               ├─ InputTranscriptDelta  → input turn buffer
//!               ├─ TurnComplete          → flush buffers into history
//!               ├─ AudioSegment          → decode_pcm16 → PlaybackScheduler
//!               ├─ Interrupted           → PlaybackScheduler::interrupt
//!               ├─ Error                 → teardown                [Error]
//!               └─ Closed                → teardown         [Disconnected]
//!
//! SessionCommand::Stop ─▶ teardown                          [Disconnected]
//! ```
//!
//! Teardown releases the capture device, stops all playback, clears the
//! tracked set and discards any in-flight events.  It is idempotent: a
//! `Stop` while already disconnected is a no-op.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use crate::audio::{
    decode_pcm16, CaptureError, CaptureGuard, CaptureSource, OutputSink, PlaybackScheduler,
};
use crate::config::SessionConfig;
use crate::parse::DetectionParser;
use crate::track::IdentityTracker;
use crate::video::VideoSource;

use super::channel::{AudioPacket, ChannelError, ChannelEvent, ChannelFactory, RealtimeChannel};
use super::state::{ConnectionState, Role, SharedSessionState};

// ---------------------------------------------------------------------------
// SessionCommand / SessionError
// ---------------------------------------------------------------------------

/// Control commands accepted by [`SessionCoordinator::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    /// Begin a session: acquire devices, open the channel.
    Start,
    /// Tear the session down.  No-op when already disconnected.
    Stop,
}

/// Fatal session-start failures.
///
/// Both abort the connecting attempt and leave the state machine in
/// `Error`; recovery requires an explicit new `Start`.
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    #[error("channel open failed: {0}")]
    ChannelOpen(#[from] ChannelError),

    #[error("device acquisition failed: {0}")]
    Device(#[from] CaptureError),
}

/// How a live session ended — decides the final connection state.
enum Exit {
    /// Explicit `Stop`, or the command channel closed.
    Stopped,
    /// The remote closed the channel cleanly.
    Closed,
    /// Channel runtime failure.
    Failed(String),
}

// ---------------------------------------------------------------------------
// SessionCoordinator
// ---------------------------------------------------------------------------

/// Orchestrates one session at a time against the remote model channel.
///
/// Create with [`SessionCoordinator::new`], grab the shared handles a
/// presentation layer needs ([`tracker`](Self::tracker)), then call
/// [`run`](Self::run) inside a tokio task and drive it with
/// [`SessionCommand`]s.
pub struct SessionCoordinator {
    config: SessionConfig,
    state: SharedSessionState,
    factory: Arc<dyn ChannelFactory>,
    video: Arc<dyn VideoSource>,
    capture: Arc<dyn CaptureSource>,
    tracker: Arc<Mutex<IdentityTracker>>,
    parser: DetectionParser,
    scheduler: PlaybackScheduler,
    /// Accumulated transcription of the user's speech for the current turn.
    input_buf: String,
    /// Accumulated model output text for the current turn.  The detection
    /// parser keeps its own independent trailing buffer.
    output_buf: String,
}

impl SessionCoordinator {
    pub fn new(
        config: SessionConfig,
        state: SharedSessionState,
        factory: Arc<dyn ChannelFactory>,
        video: Arc<dyn VideoSource>,
        capture: Arc<dyn CaptureSource>,
        sink: Arc<dyn OutputSink>,
    ) -> Self {
        let tracker = IdentityTracker::new(
            config.match_threshold,
            Duration::from_millis(config.object_ttl_ms),
        );
        let parser = DetectionParser::new(config.parser_buffer_chars);

        Self {
            state,
            factory,
            video,
            capture,
            tracker: Arc::new(Mutex::new(tracker)),
            parser,
            scheduler: PlaybackScheduler::new(sink),
            input_buf: String::new(),
            output_buf: String::new(),
            config,
        }
    }

    /// Shared handle to the tracked-object set, for read-only snapshots.
    pub fn tracker(&self) -> Arc<Mutex<IdentityTracker>> {
        Arc::clone(&self.tracker)
    }

    // -----------------------------------------------------------------------
    // Main async loop
    // -----------------------------------------------------------------------

    /// Run the coordinator until `commands` is closed.
    ///
    /// Spawn as a tokio task.  Each `Start` runs one full session; the loop
    /// then waits for the next command.
    pub async fn run(mut self, mut commands: mpsc::Receiver<SessionCommand>) {
        while let Some(cmd) = commands.recv().await {
            match cmd {
                SessionCommand::Start => {
                    let current = self.state.lock().unwrap().connection;
                    if current.is_active() {
                        log::warn!("session: Start while {}, ignoring", current.label());
                        continue;
                    }
                    match self.connect().await {
                        Ok((channel, events, guard, audio_rx)) => {
                            self.run_session(&mut commands, channel, events, guard, audio_rx)
                                .await;
                        }
                        Err(e) => self.fail(e.to_string()),
                    }
                }
                SessionCommand::Stop => {
                    // Already disconnected — idempotent, nothing to release.
                    log::debug!("session: Stop while disconnected, no-op");
                }
            }
        }

        log::info!("session: command channel closed, coordinator shutting down");
    }

    // -----------------------------------------------------------------------
    // Connect / teardown
    // -----------------------------------------------------------------------

    /// Acquire the capture device and open the channel.
    ///
    /// On channel-open failure the already-acquired capture guard is dropped
    /// before returning, so no device leaks out of a failed start.
    async fn connect(
        &mut self,
    ) -> Result<
        (
            Arc<dyn RealtimeChannel>,
            mpsc::Receiver<ChannelEvent>,
            CaptureGuard,
            mpsc::UnboundedReceiver<Vec<u8>>,
        ),
        SessionError,
    > {
        {
            let mut st = self.state.lock().unwrap();
            st.connection = ConnectionState::Connecting;
            st.error_message = None;
        }
        log::info!("session: connecting (model {})", self.config.model);

        let (audio_tx, audio_rx) = mpsc::unbounded_channel();
        let guard = self.capture.start(audio_tx)?;

        let (channel, events) = self.factory.open(&self.config).await?;
        Ok((channel, events, guard, audio_rx))
    }

    fn fail(&self, message: String) {
        let mut st = self.state.lock().unwrap();
        st.connection = ConnectionState::Error;
        st.error_message = Some(message.clone());
        log::error!("session error: {message}");
    }

    /// Release everything a live session held and settle the state machine.
    ///
    /// The event and audio receivers are dropped by the caller returning, so
    /// events arriving after teardown are discarded, not replayed.
    async fn teardown(&mut self, channel: &Arc<dyn RealtimeChannel>, guard: CaptureGuard, exit: Exit) {
        drop(guard); // releases the capture device
        self.scheduler.stop_all();
        self.tracker.lock().unwrap().clear();
        self.input_buf.clear();
        self.output_buf.clear();

        if let Err(e) = channel.close().await {
            log::debug!("session: channel close during teardown: {e}");
        }

        let mut st = self.state.lock().unwrap();
        match exit {
            Exit::Stopped | Exit::Closed => {
                st.connection = ConnectionState::Disconnected;
                log::info!("session: disconnected");
            }
            Exit::Failed(message) => {
                st.connection = ConnectionState::Error;
                log::error!("session error: {message}");
                st.error_message = Some(message);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Live session loop
    // -----------------------------------------------------------------------

    async fn run_session(
        &mut self,
        commands: &mut mpsc::Receiver<SessionCommand>,
        channel: Arc<dyn RealtimeChannel>,
        mut events: mpsc::Receiver<ChannelEvent>,
        guard: CaptureGuard,
        mut audio_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    ) {
        let mut frame_timer =
            tokio::time::interval(Duration::from_millis(self.config.frame_interval_ms));
        frame_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut prune_timer =
            tokio::time::interval(Duration::from_millis(self.config.prune_interval_ms));
        prune_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        // Outbound streaming starts on the Opened event, not at connect.
        let mut connected = false;
        let mut capture_open = true;

        let exit = loop {
            tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(SessionCommand::Stop) | None => break Exit::Stopped,
                    Some(SessionCommand::Start) => {
                        log::warn!("session: Start while running, ignoring");
                    }
                },

                ev = events.recv() => match ev {
                    Some(ChannelEvent::Opened) => {
                        connected = true;
                        self.state.lock().unwrap().connection = ConnectionState::Connected;
                        log::info!("session: channel open");
                    }
                    Some(ChannelEvent::OutputTranscriptDelta(text)) => {
                        self.on_output_delta(&text);
                    }
                    Some(ChannelEvent::InputTranscriptDelta(text)) => {
                        self.input_buf.push_str(&text);
                    }
                    Some(ChannelEvent::TurnComplete) => self.flush_turn(),
                    Some(ChannelEvent::AudioSegment { data, sample_rate, channels }) => {
                        self.on_audio_segment(&data, sample_rate, channels);
                    }
                    Some(ChannelEvent::Interrupted) => {
                        log::debug!("session: barge-in");
                        self.scheduler.interrupt();
                    }
                    Some(ChannelEvent::Error(detail)) => {
                        break Exit::Failed(format!("channel failure: {detail}"));
                    }
                    Some(ChannelEvent::Closed) | None => break Exit::Closed,
                },

                chunk = audio_rx.recv(), if capture_open => match chunk {
                    Some(pcm) => {
                        if connected {
                            let packet =
                                AudioPacket::from_pcm(&pcm, self.config.target_sample_rate);
                            if let Err(e) = channel.send_audio(packet).await {
                                break Exit::Failed(format!("audio send failed: {e}"));
                            }
                        }
                        // Pre-open chunks are dropped: streaming begins at Opened.
                    }
                    None => {
                        log::warn!("session: capture stream ended");
                        capture_open = false;
                    }
                },

                _ = frame_timer.tick(), if connected => {
                    match self.video.capture_frame() {
                        Ok(frame) => {
                            if let Err(e) = channel.send_video(frame).await {
                                break Exit::Failed(format!("video send failed: {e}"));
                            }
                        }
                        // One bad frame is not a session failure.
                        Err(e) => log::warn!("session: frame capture failed: {e}"),
                    }
                },

                _ = prune_timer.tick() => {
                    self.tracker.lock().unwrap().prune(Instant::now());
                },
            }
        };

        self.teardown(&channel, guard, exit).await;
    }

    // -----------------------------------------------------------------------
    // Event handlers
    // -----------------------------------------------------------------------

    /// Model output text: accumulate for the transcript and feed the parser;
    /// any detections go straight to the tracker.
    fn on_output_delta(&mut self, text: &str) {
        self.output_buf.push_str(text);

        let detections = self.parser.push_delta(text);
        if !detections.is_empty() {
            self.tracker.lock().unwrap().observe(&detections);
        }
    }

    /// Turn boundary: move the accumulated buffers into history, user side
    /// first.  The parser's trailing buffer is independent and not touched.
    fn flush_turn(&mut self) {
        let mut st = self.state.lock().unwrap();
        if !self.input_buf.trim().is_empty() {
            st.push_transcript(Role::User, std::mem::take(&mut self.input_buf));
        } else {
            self.input_buf.clear();
        }
        if !self.output_buf.trim().is_empty() {
            st.push_transcript(Role::Model, std::mem::take(&mut self.output_buf));
        } else {
            self.output_buf.clear();
        }
    }

    /// Inbound model audio: decode and schedule.  A malformed segment is
    /// dropped without advancing the playback cursor.
    fn on_audio_segment(&mut self, data: &[u8], sample_rate: u32, channels: u16) {
        match decode_pcm16(data, sample_rate, channels) {
            Ok(segment) => {
                self.scheduler.enqueue(segment);
            }
            Err(e) => log::warn!("session: dropping undecodable segment: {e}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::NullSink;
    use crate::session::channel::EVENT_QUEUE_DEPTH;
    use crate::session::state::new_shared_state;
    use crate::video::{VideoError, VideoFrame};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    // -----------------------------------------------------------------------
    // Test doubles
    // -----------------------------------------------------------------------

    /// Channel that records everything sent to it.
    struct MockChannel {
        audio_sent: AtomicUsize,
        video_sent: AtomicUsize,
        closed: AtomicUsize,
    }

    impl MockChannel {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                audio_sent: AtomicUsize::new(0),
                video_sent: AtomicUsize::new(0),
                closed: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl RealtimeChannel for MockChannel {
        async fn send_audio(&self, packet: AudioPacket) -> Result<(), ChannelError> {
            assert!(!packet.payload.is_empty());
            self.audio_sent.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn send_video(&self, _frame: VideoFrame) -> Result<(), ChannelError> {
            self.video_sent.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn close(&self) -> Result<(), ChannelError> {
            self.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Factory handing out one prepared channel + event stream.
    struct MockFactory {
        channel: Arc<MockChannel>,
        events: Mutex<Option<mpsc::Receiver<ChannelEvent>>>,
    }

    impl MockFactory {
        fn new(channel: Arc<MockChannel>, events: mpsc::Receiver<ChannelEvent>) -> Arc<Self> {
            Arc::new(Self {
                channel,
                events: Mutex::new(Some(events)),
            })
        }
    }

    #[async_trait]
    impl ChannelFactory for MockFactory {
        async fn open(
            &self,
            _config: &SessionConfig,
        ) -> Result<(Arc<dyn RealtimeChannel>, mpsc::Receiver<ChannelEvent>), ChannelError>
        {
            let events = self
                .events
                .lock()
                .unwrap()
                .take()
                .ok_or_else(|| ChannelError::Open("mock factory exhausted".into()))?;
            Ok((Arc::clone(&self.channel) as Arc<dyn RealtimeChannel>, events))
        }
    }

    /// Factory that always refuses to connect.
    struct RefusingFactory;

    #[async_trait]
    impl ChannelFactory for RefusingFactory {
        async fn open(
            &self,
            _config: &SessionConfig,
        ) -> Result<(Arc<dyn RealtimeChannel>, mpsc::Receiver<ChannelEvent>), ChannelError>
        {
            Err(ChannelError::Open("connection refused".into()))
        }
    }

    /// Capture source that acquires nothing and sends nothing.
    struct SilentCapture;

    impl CaptureSource for SilentCapture {
        fn start(
            &self,
            _tx: mpsc::UnboundedSender<Vec<u8>>,
        ) -> Result<CaptureGuard, CaptureError> {
            Ok(CaptureGuard::noop())
        }
    }

    /// Capture source whose sender is handed to the test for manual feeding.
    struct ManualCapture {
        slot: Mutex<Option<std::sync::mpsc::Sender<mpsc::UnboundedSender<Vec<u8>>>>>,
    }

    impl ManualCapture {
        fn new(slot: std::sync::mpsc::Sender<mpsc::UnboundedSender<Vec<u8>>>) -> Arc<Self> {
            Arc::new(Self {
                slot: Mutex::new(Some(slot)),
            })
        }
    }

    impl CaptureSource for ManualCapture {
        fn start(
            &self,
            tx: mpsc::UnboundedSender<Vec<u8>>,
        ) -> Result<CaptureGuard, CaptureError> {
            if let Some(slot) = self.slot.lock().unwrap().take() {
                let _ = slot.send(tx);
            }
            Ok(CaptureGuard::noop())
        }
    }

    /// Capture source with no device.
    struct NoMic;

    impl CaptureSource for NoMic {
        fn start(
            &self,
            _tx: mpsc::UnboundedSender<Vec<u8>>,
        ) -> Result<CaptureGuard, CaptureError> {
            Err(CaptureError::NoDevice)
        }
    }

    struct FixedVideo;

    impl VideoSource for FixedVideo {
        fn capture_frame(&self) -> Result<VideoFrame, VideoError> {
            Ok(VideoFrame {
                data: vec![0xFF, 0xD8, 0xFF],
                mime_type: "image/jpeg".into(),
            })
        }
    }

    /// Sink recording flush count.
    struct TestSink {
        flushes: AtomicUsize,
    }

    impl TestSink {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                flushes: AtomicUsize::new(0),
            })
        }
    }

    impl OutputSink for TestSink {
        fn submit(&self, _samples: &[f32], _sample_rate: u32) {}
        fn flush(&self) {
            self.flushes.fetch_add(1, Ordering::SeqCst);
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    struct Harness {
        channel: Arc<MockChannel>,
        events_tx: mpsc::Sender<ChannelEvent>,
        commands_tx: mpsc::Sender<SessionCommand>,
        state: SharedSessionState,
        sink: Arc<TestSink>,
        tracker: Arc<Mutex<IdentityTracker>>,
        task: tokio::task::JoinHandle<()>,
    }

    fn spawn_session(config: SessionConfig) -> Harness {
        let channel = MockChannel::new();
        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
        let factory = MockFactory::new(Arc::clone(&channel), events_rx);
        let state = new_shared_state();
        let sink = TestSink::new();

        let coordinator = SessionCoordinator::new(
            config,
            Arc::clone(&state),
            factory,
            Arc::new(FixedVideo),
            Arc::new(SilentCapture),
            Arc::clone(&sink) as Arc<dyn OutputSink>,
        );
        let tracker = coordinator.tracker();

        let (commands_tx, commands_rx) = mpsc::channel(8);
        let task = tokio::spawn(coordinator.run(commands_rx));

        Harness {
            channel,
            events_tx,
            commands_tx,
            state,
            sink,
            tracker,
            task,
        }
    }

    fn connection(state: &SharedSessionState) -> ConnectionState {
        state.lock().unwrap().connection
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    /// Config with timers slowed down so they do not interleave with the
    /// events under test.
    fn quiet_config() -> SessionConfig {
        let mut cfg = SessionConfig::default();
        cfg.frame_interval_ms = 60_000;
        cfg.prune_interval_ms = 60_000;
        cfg
    }

    // -----------------------------------------------------------------------
    // Tests
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn start_then_opened_reaches_connected() {
        let h = spawn_session(quiet_config());

        h.commands_tx.send(SessionCommand::Start).await.unwrap();
        h.events_tx.send(ChannelEvent::Opened).await.unwrap();
        settle().await;

        assert_eq!(connection(&h.state), ConnectionState::Connected);

        drop(h.events_tx);
        drop(h.commands_tx);
        h.task.await.unwrap();
        assert_eq!(connection(&h.state), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn channel_open_failure_sets_error() {
        let state = new_shared_state();
        let coordinator = SessionCoordinator::new(
            quiet_config(),
            Arc::clone(&state),
            Arc::new(RefusingFactory),
            Arc::new(FixedVideo),
            Arc::new(SilentCapture),
            Arc::new(NullSink) as Arc<dyn OutputSink>,
        );

        let (tx, rx) = mpsc::channel(8);
        let task = tokio::spawn(coordinator.run(rx));

        tx.send(SessionCommand::Start).await.unwrap();
        drop(tx);
        task.await.unwrap();

        let st = state.lock().unwrap();
        assert_eq!(st.connection, ConnectionState::Error);
        assert!(st.error_message.as_deref().unwrap().contains("refused"));
    }

    #[tokio::test]
    async fn device_failure_sets_error() {
        let (_events_tx, events_rx) = mpsc::channel(4);
        let state = new_shared_state();
        let coordinator = SessionCoordinator::new(
            quiet_config(),
            Arc::clone(&state),
            MockFactory::new(MockChannel::new(), events_rx),
            Arc::new(FixedVideo),
            Arc::new(NoMic),
            Arc::new(NullSink) as Arc<dyn OutputSink>,
        );

        let (tx, rx) = mpsc::channel(8);
        let task = tokio::spawn(coordinator.run(rx));

        tx.send(SessionCommand::Start).await.unwrap();
        drop(tx);
        task.await.unwrap();

        assert_eq!(connection(&state), ConnectionState::Error);
    }

    #[tokio::test]
    async fn double_stop_is_idempotent() {
        let h = spawn_session(quiet_config());

        h.commands_tx.send(SessionCommand::Stop).await.unwrap();
        settle().await;
        assert_eq!(connection(&h.state), ConnectionState::Disconnected);

        h.commands_tx.send(SessionCommand::Stop).await.unwrap();
        settle().await;
        assert_eq!(connection(&h.state), ConnectionState::Disconnected);

        drop(h.commands_tx);
        h.task.await.unwrap();
    }

    #[tokio::test]
    async fn stop_tears_down_live_session() {
        let h = spawn_session(quiet_config());

        h.commands_tx.send(SessionCommand::Start).await.unwrap();
        h.events_tx.send(ChannelEvent::Opened).await.unwrap();
        settle().await;

        h.commands_tx.send(SessionCommand::Stop).await.unwrap();
        settle().await;

        assert_eq!(connection(&h.state), ConnectionState::Disconnected);
        assert_eq!(h.channel.closed.load(Ordering::SeqCst), 1);
        // Teardown stops playback via the sink flush.
        assert_eq!(h.sink.flushes.load(Ordering::SeqCst), 1);

        drop(h.events_tx);
        drop(h.commands_tx);
        h.task.await.unwrap();
    }

    #[tokio::test]
    async fn output_deltas_feed_parser_tracker_and_transcript() {
        let h = spawn_session(quiet_config());

        h.commands_tx.send(SessionCommand::Start).await.unwrap();
        h.events_tx.send(ChannelEvent::Opened).await.unwrap();
        h.events_tx
            .send(ChannelEvent::InputTranscriptDelta("what do ".into()))
            .await
            .unwrap();
        h.events_tx
            .send(ChannelEvent::InputTranscriptDelta("you see?".into()))
            .await
            .unwrap();
        // Detection split across two deltas.
        h.events_tx
            .send(ChannelEvent::OutputTranscriptDelta("a cup [100, 1".into()))
            .await
            .unwrap();
        h.events_tx
            .send(ChannelEvent::OutputTranscriptDelta("00, 200, 200]".into()))
            .await
            .unwrap();
        settle().await;

        // Tracker sees exactly one object while the session is live.
        assert_eq!(h.tracker.lock().unwrap().len(), 1);

        h.events_tx.send(ChannelEvent::TurnComplete).await.unwrap();
        settle().await;

        {
            let st = h.state.lock().unwrap();
            let transcript = st.transcript_snapshot();
            assert_eq!(transcript.len(), 2);
            assert_eq!(transcript[0].role, Role::User);
            assert_eq!(transcript[0].text, "what do you see?");
            assert_eq!(transcript[1].role, Role::Model);
            assert_eq!(transcript[1].text, "a cup [100, 100, 200, 200]");
        }

        drop(h.events_tx);
        drop(h.commands_tx);
        h.task.await.unwrap();

        // Teardown clears the tracked set.
        assert!(h.tracker.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn turn_complete_without_text_adds_nothing() {
        let h = spawn_session(quiet_config());

        h.commands_tx.send(SessionCommand::Start).await.unwrap();
        h.events_tx.send(ChannelEvent::Opened).await.unwrap();
        h.events_tx.send(ChannelEvent::TurnComplete).await.unwrap();
        settle().await;

        assert_eq!(h.state.lock().unwrap().transcript_len(), 0);

        drop(h.events_tx);
        drop(h.commands_tx);
        h.task.await.unwrap();
    }

    #[tokio::test]
    async fn interrupted_event_flushes_playback() {
        let h = spawn_session(quiet_config());

        h.commands_tx.send(SessionCommand::Start).await.unwrap();
        h.events_tx.send(ChannelEvent::Opened).await.unwrap();
        h.events_tx
            .send(ChannelEvent::AudioSegment {
                data: vec![0u8; 4_800],
                sample_rate: 24_000,
                channels: 1,
            })
            .await
            .unwrap();
        h.events_tx.send(ChannelEvent::Interrupted).await.unwrap();
        settle().await;

        // One flush for the barge-in; a second comes with teardown.
        assert_eq!(h.sink.flushes.load(Ordering::SeqCst), 1);

        drop(h.events_tx);
        drop(h.commands_tx);
        h.task.await.unwrap();
        assert_eq!(h.sink.flushes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn undecodable_segment_is_dropped_not_fatal() {
        let h = spawn_session(quiet_config());

        h.commands_tx.send(SessionCommand::Start).await.unwrap();
        h.events_tx.send(ChannelEvent::Opened).await.unwrap();
        h.events_tx
            .send(ChannelEvent::AudioSegment {
                data: vec![0u8; 3], // odd byte count
                sample_rate: 24_000,
                channels: 1,
            })
            .await
            .unwrap();
        settle().await;

        assert_eq!(connection(&h.state), ConnectionState::Connected);

        drop(h.events_tx);
        drop(h.commands_tx);
        h.task.await.unwrap();
    }

    #[tokio::test]
    async fn channel_error_event_tears_down_to_error() {
        let h = spawn_session(quiet_config());

        h.commands_tx.send(SessionCommand::Start).await.unwrap();
        h.events_tx.send(ChannelEvent::Opened).await.unwrap();
        h.events_tx
            .send(ChannelEvent::Error("socket reset".into()))
            .await
            .unwrap();
        settle().await;

        {
            let st = h.state.lock().unwrap();
            assert_eq!(st.connection, ConnectionState::Error);
            assert!(st.error_message.as_deref().unwrap().contains("socket reset"));
        }
        assert_eq!(h.channel.closed.load(Ordering::SeqCst), 1);

        drop(h.events_tx);
        drop(h.commands_tx);
        h.task.await.unwrap();
    }

    #[tokio::test]
    async fn capture_chunks_forwarded_after_open() {
        let (slot_tx, slot_rx) = std::sync::mpsc::channel();
        let channel = MockChannel::new();
        let (events_tx, events_rx) = mpsc::channel(16);
        let state = new_shared_state();
        let coordinator = SessionCoordinator::new(
            quiet_config(),
            Arc::clone(&state),
            MockFactory::new(Arc::clone(&channel), events_rx),
            Arc::new(FixedVideo),
            ManualCapture::new(slot_tx),
            Arc::new(NullSink) as Arc<dyn OutputSink>,
        );
        let (commands_tx, commands_rx) = mpsc::channel(8);
        let task = tokio::spawn(coordinator.run(commands_rx));

        commands_tx.send(SessionCommand::Start).await.unwrap();
        events_tx.send(ChannelEvent::Opened).await.unwrap();
        settle().await;

        let audio_tx = slot_rx.recv().unwrap();
        audio_tx.send(vec![1u8, 2, 3, 4]).unwrap();
        settle().await;

        assert_eq!(channel.audio_sent.load(Ordering::SeqCst), 1);

        drop(events_tx);
        drop(commands_tx);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn periodic_video_frames_sent_while_connected() {
        let mut cfg = quiet_config();
        cfg.frame_interval_ms = 10;
        let h = spawn_session(cfg);

        h.commands_tx.send(SessionCommand::Start).await.unwrap();
        h.events_tx.send(ChannelEvent::Opened).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(h.channel.video_sent.load(Ordering::SeqCst) >= 2);

        drop(h.events_tx);
        drop(h.commands_tx);
        h.task.await.unwrap();
    }

    #[tokio::test]
    async fn restart_after_remote_close_is_accepted() {
        let h = spawn_session(quiet_config());

        h.commands_tx.send(SessionCommand::Start).await.unwrap();
        h.events_tx.send(ChannelEvent::Opened).await.unwrap();
        h.events_tx.send(ChannelEvent::Closed).await.unwrap();
        settle().await;
        assert_eq!(connection(&h.state), ConnectionState::Disconnected);

        // A fresh Start is accepted and attempts a new connect.  The mock
        // factory is single-shot, so the attempt fails at open — which is
        // exactly the no-auto-retry Error path.
        h.commands_tx.send(SessionCommand::Start).await.unwrap();
        settle().await;
        assert_eq!(connection(&h.state), ConnectionState::Error);

        drop(h.events_tx);
        drop(h.commands_tx);
        h.task.await.unwrap();
    }
}
