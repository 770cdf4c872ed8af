//! Stream lifecycle and the capture-encode-upload tick
//!
//! [`StreamController`] owns the current [`StreamSession`]. `start` probes the
//! server, then hands a fresh schedule to a background loop that spawns one
//! [`StreamController::tick`] per scheduled tick. Every status change is
//! published on a watch channel for display.

use crate::config::StreamConfig;
use crate::encoder::{FrameEncoder, JpegFrameEncoder};
use crate::errors::StreamError;
use crate::frame_source::FrameSource;
use crate::scheduler::{IntervalSchedulerFactory, SchedulerFactory, TickScheduler};
use crate::session::{SessionStats, StreamSession};
use crate::transport::{FrameTransport, HttpTransport, StreamEndpoints};
use crate::types::{EncodedFrame, SkipReason, StreamState, StreamStatus, TickOutcome};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Message shown before anything was started
pub const READY_MESSAGE: &str = "Ready - enter server URL";

#[derive(Debug)]
struct StatusBoard {
    message: String,
    updates: u64,
}

impl StatusBoard {
    fn set(&mut self, message: String) {
        self.message = message;
        self.updates += 1;
    }
}

/// Everything guarded by the controller lock. Never held across an await.
#[derive(Debug)]
struct Shared {
    session: StreamSession,
    board: StatusBoard,
    run: Option<CancellationToken>,
}

struct ControllerInner {
    config: StreamConfig,
    source: Arc<dyn FrameSource>,
    transport: Arc<dyn FrameTransport>,
    encoder: Arc<dyn FrameEncoder>,
    schedulers: Arc<dyn SchedulerFactory>,
    shared: Mutex<Shared>,
    camera_index: AtomicU32,
    status_tx: watch::Sender<StreamStatus>,
}

impl Drop for ControllerInner {
    fn drop(&mut self) {
        let shared = self.shared.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(token) = shared.run.take() {
            token.cancel();
        }
    }
}

/// Builder for [`StreamController`]; unset parts get production defaults
pub struct StreamControllerBuilder {
    config: StreamConfig,
    source: Arc<dyn FrameSource>,
    transport: Option<Arc<dyn FrameTransport>>,
    encoder: Option<Arc<dyn FrameEncoder>>,
    schedulers: Option<Arc<dyn SchedulerFactory>>,
}

impl StreamControllerBuilder {
    pub fn transport(mut self, transport: Arc<dyn FrameTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn encoder(mut self, encoder: Arc<dyn FrameEncoder>) -> Self {
        self.encoder = Some(encoder);
        self
    }

    pub fn scheduler(mut self, schedulers: Arc<dyn SchedulerFactory>) -> Self {
        self.schedulers = Some(schedulers);
        self
    }

    /// Fails only if the default HTTP client cannot be created
    pub fn build(self) -> Result<StreamController, StreamError> {
        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new(&self.config.server)?),
        };
        let encoder = self.encoder.unwrap_or_else(|| {
            Arc::new(JpegFrameEncoder::new(self.config.capture.jpeg_quality))
        });
        let schedulers = self
            .schedulers
            .unwrap_or_else(|| Arc::new(IntervalSchedulerFactory));

        Ok(StreamController::assemble(
            self.config,
            self.source,
            transport,
            encoder,
            schedulers,
        ))
    }
}

/// Drives one stream at a time from a frame source to the ingestion server.
///
/// Cheap to clone; clones share the same session.
#[derive(Clone)]
pub struct StreamController {
    inner: Arc<ControllerInner>,
}

impl fmt::Debug for StreamController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shared = self.lock();
        f.debug_struct("StreamController")
            .field("state", &shared.session.state)
            .field("frames_sent", &shared.session.frames_sent)
            .field("message", &shared.board.message)
            .finish()
    }
}

impl StreamController {
    pub fn builder(config: StreamConfig, source: Arc<dyn FrameSource>) -> StreamControllerBuilder {
        StreamControllerBuilder {
            config,
            source,
            transport: None,
            encoder: None,
            schedulers: None,
        }
    }

    /// Controller with a JPEG encoder and a fixed-rate tick schedule
    pub fn new(
        config: StreamConfig,
        source: Arc<dyn FrameSource>,
        transport: Arc<dyn FrameTransport>,
    ) -> Self {
        let encoder = Arc::new(JpegFrameEncoder::new(config.capture.jpeg_quality));
        Self::assemble(
            config,
            source,
            transport,
            encoder,
            Arc::new(IntervalSchedulerFactory),
        )
    }

    /// Controller talking HTTP to the server
    pub fn with_http(
        config: StreamConfig,
        source: Arc<dyn FrameSource>,
    ) -> Result<Self, StreamError> {
        Self::builder(config, source).build()
    }

    fn assemble(
        config: StreamConfig,
        source: Arc<dyn FrameSource>,
        transport: Arc<dyn FrameTransport>,
        encoder: Arc<dyn FrameEncoder>,
        schedulers: Arc<dyn SchedulerFactory>,
    ) -> Self {
        let shared = Shared {
            session: StreamSession::idle(),
            board: StatusBoard {
                message: READY_MESSAGE.to_string(),
                updates: 0,
            },
            run: None,
        };
        let (status_tx, _) = watch::channel(snapshot(&shared));
        let camera_index = AtomicU32::new(config.capture.camera_indices[0]);

        Self {
            inner: Arc::new(ControllerInner {
                config,
                source,
                transport,
                encoder,
                schedulers,
                shared: Mutex::new(shared),
                camera_index,
                status_tx,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.inner
            .shared
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, shared: &Shared) -> StreamStatus {
        let status = snapshot(shared);
        self.inner.status_tx.send_replace(status.clone());
        status
    }

    /// Validate the URL, probe the server, and go live.
    ///
    /// A malformed URL leaves the state untouched. A failed probe moves the
    /// controller to `Error`. On success a new session starts at zero frames
    /// and the tick schedule begins.
    pub async fn start(&self, server_url: &str) -> Result<StreamStatus, StreamError> {
        let (endpoints, mut connecting) = {
            let mut shared = self.lock();
            if !shared.session.state.can_start() {
                return Err(StreamError::AlreadyActive);
            }

            let endpoints = match StreamEndpoints::parse(server_url, &self.inner.config.server) {
                Ok(endpoints) => endpoints,
                Err(e) => {
                    log::warn!("Not starting stream: {}", e);
                    shared.board.set(e.status_message());
                    self.publish(&shared);
                    return Err(e);
                }
            };

            let guard = ConnectingGuard {
                inner: &self.inner,
                previous_state: shared.session.state,
                previous_message: shared.board.message.clone(),
                armed: true,
            };
            shared.session.state = StreamState::Connecting;
            shared
                .board
                .set(format!("CONNECTING: {}", endpoints.base_url));
            self.publish(&shared);
            (endpoints, guard)
        };

        log::info!("Checking server status at {}", endpoints.status_url);
        let probe = self.inner.transport.check_status(&endpoints.status_url).await;
        let failure = match probe {
            Ok(200) => None,
            Ok(code) => Some(StreamError::PreflightError {
                status: Some(code),
                reason: format!("server returned HTTP {}", code),
            }),
            Err(StreamError::TransportError(reason)) => Some(StreamError::PreflightError {
                status: None,
                reason,
            }),
            Err(other) => Some(StreamError::PreflightError {
                status: None,
                reason: other.to_string(),
            }),
        };

        connecting.armed = false;
        drop(connecting);

        let mut shared = self.lock();
        if let Some(err) = failure {
            log::warn!("Server {} not ready: {}", endpoints.base_url, err);
            shared.session.state = StreamState::Error;
            shared.session.last_error = Some(err.to_string());
            shared.board.set(err.status_message());
            self.publish(&shared);
            return Err(err);
        }

        let session = StreamSession::live(endpoints);
        log::info!(
            "Stream {} live, uploading to {}",
            session.id(),
            session
                .endpoints()
                .map(|e| e.upload_url.as_str())
                .unwrap_or_default()
        );
        shared.session = session;
        shared.board.set("LIVE: 0 frames".to_string());

        let cancel = CancellationToken::new();
        let scheduler = self
            .inner
            .schedulers
            .create(self.inner.config.capture.tick_period());
        tokio::spawn(run_schedule(
            Arc::downgrade(&self.inner),
            scheduler,
            cancel.clone(),
        ));
        shared.run = Some(cancel);

        Ok(self.publish(&shared))
    }

    /// End the live session and return its final frame count.
    ///
    /// No further ticks are processed once this returns. Uploads already in
    /// flight may still complete but their results are discarded.
    pub fn stop(&self) -> Result<u64, StreamError> {
        let mut shared = self.lock();
        if !shared.session.state.is_live() {
            return Err(StreamError::NotLive);
        }

        if let Some(cancel) = shared.run.take() {
            cancel.cancel();
        }
        shared.session.mark_stopped();
        let final_count = shared.session.frames_sent;
        shared
            .board
            .set(format!("STOPPED: {} frames sent", final_count));
        log::info!(
            "Stream {} stopped after {} frames",
            shared.session.id(),
            final_count
        );
        self.publish(&shared);
        Ok(final_count)
    }

    /// Start/stop button
    pub async fn toggle(&self, server_url: &str) -> Result<StreamStatus, StreamError> {
        if self.state().is_live() {
            self.stop()?;
            Ok(self.status())
        } else {
            self.start(server_url).await
        }
    }

    /// Switch between the two configured cameras and restart capture.
    ///
    /// Returns the newly selected index. Does not touch the stream state.
    pub fn flip(&self) -> u32 {
        let [primary, secondary] = self.inner.config.capture.camera_indices;
        let swap = |current: u32| if current == primary { secondary } else { primary };
        let previous = self
            .inner
            .camera_index
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some(swap(current))
            })
            .unwrap_or_else(|current| current);
        let next = swap(previous);

        self.inner.source.set_camera_index(next);
        self.inner.source.resume();
        log::info!("Switched to camera {}", next);
        next
    }

    /// One capture-encode-upload cycle.
    ///
    /// Skips when not live or when the previous upload has not finished.
    /// Results that arrive after the session ended are discarded.
    pub async fn tick(&self) -> TickOutcome {
        let (session_id, upload_url) = {
            let mut shared = self.lock();
            let session = &mut shared.session;
            if !session.state.is_live() {
                return TickOutcome::Skipped(SkipReason::NotLive);
            }
            session.stats.ticks += 1;
            if session.upload_in_flight {
                session.stats.skipped_busy += 1;
                log::trace!("Previous upload still in flight");
                return TickOutcome::Skipped(SkipReason::Busy);
            }
            let Some(endpoints) = session.endpoints() else {
                return TickOutcome::Skipped(SkipReason::NotLive);
            };
            let upload_url = endpoints.upload_url.clone();
            session.upload_in_flight = true;
            (session.id(), upload_url)
        };
        let _in_flight = InFlightGuard {
            inner: &self.inner,
            session_id,
        };

        let Some(sample) = self.inner.source.current_frame() else {
            self.record(session_id, |stats| stats.skipped_no_frame += 1);
            return TickOutcome::Skipped(SkipReason::NoFrame);
        };

        let encoder = Arc::clone(&self.inner.encoder);
        let encoded = tokio::task::spawn_blocking(move || encoder.encode(&sample))
            .await
            .unwrap_or_else(|e| {
                Err(StreamError::EncodeError(format!(
                    "encoder task failed: {}",
                    e
                )))
            });
        let frame = match encoded {
            Ok(frame) => frame,
            Err(e) => {
                log::debug!("Skipping frame: {}", e);
                self.record(session_id, |stats| stats.skipped_encode += 1);
                return TickOutcome::Skipped(SkipReason::EncodeFailed(e.to_string()));
            }
        };

        if !self.is_live_session(session_id) {
            return TickOutcome::Skipped(SkipReason::NotLive);
        }

        let result = self.inner.transport.upload_frame(&upload_url, &frame).await;
        self.finish_upload(session_id, &frame, result)
    }

    fn finish_upload(
        &self,
        session_id: Uuid,
        frame: &EncodedFrame,
        result: Result<u16, StreamError>,
    ) -> TickOutcome {
        let mut shared = self.lock();
        if shared.session.id() != session_id || !shared.session.state.is_live() {
            log::debug!("Discarding upload result of ended session {}", session_id);
            return TickOutcome::Skipped(SkipReason::NotLive);
        }

        let outcome = match result {
            Ok(200) => {
                let session = &mut shared.session;
                session.frames_sent += 1;
                session.stats.delivered += 1;
                session.stats.bytes_sent += frame.len() as u64;
                let frames_sent = session.frames_sent;

                let refresh_every = self.inner.config.capture.status_refresh_every.max(1);
                if frames_sent % refresh_every == 0 {
                    shared.board.set(format!("LIVE: {} frames", frames_sent));
                }
                TickOutcome::Delivered { frames_sent }
            }
            Ok(status) => {
                let err = StreamError::UploadRejected(status);
                log::warn!("{}", err);
                shared.session.stats.rejected += 1;
                shared.session.last_error = Some(err.to_string());
                shared.board.set(err.status_message());
                TickOutcome::Rejected { status }
            }
            Err(e) => {
                log::debug!("Frame dropped: {}", e);
                shared.session.stats.dropped += 1;
                return TickOutcome::Dropped {
                    reason: e.to_string(),
                };
            }
        };

        self.publish(&shared);
        outcome
    }

    fn record(&self, session_id: Uuid, update: impl FnOnce(&mut SessionStats)) {
        let mut shared = self.lock();
        if shared.session.id() == session_id {
            update(&mut shared.session.stats);
        }
    }

    fn is_live_session(&self, session_id: Uuid) -> bool {
        let shared = self.lock();
        shared.session.id() == session_id && shared.session.state.is_live()
    }

    /// Snapshot for display
    pub fn status(&self) -> StreamStatus {
        snapshot(&self.lock())
    }

    pub fn state(&self) -> StreamState {
        self.lock().session.state
    }

    pub fn frames_sent(&self) -> u64 {
        self.lock().session.frames_sent
    }

    /// Copy of the current (or most recent) session
    pub fn session(&self) -> StreamSession {
        self.lock().session.clone()
    }

    pub fn stats(&self) -> SessionStats {
        self.lock().session.stats()
    }

    /// Receive every status change from now on
    pub fn subscribe(&self) -> watch::Receiver<StreamStatus> {
        self.inner.status_tx.subscribe()
    }

    pub fn config(&self) -> &StreamConfig {
        &self.inner.config
    }

    /// Currently selected camera
    pub fn camera_index(&self) -> u32 {
        self.inner.camera_index.load(Ordering::Acquire)
    }
}

fn snapshot(shared: &Shared) -> StreamStatus {
    StreamStatus {
        state: shared.session.state,
        frames_sent: shared.session.frames_sent,
        last_message: shared.board.message.clone(),
        message_updates: shared.board.updates,
        last_error: shared.session.last_error.clone(),
        session_id: shared.session.session_id(),
    }
}

/// Clears the busy flag when a tick ends, however it ends
struct InFlightGuard<'a> {
    inner: &'a ControllerInner,
    session_id: Uuid,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let mut shared = self
            .inner
            .shared
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if shared.session.id() == self.session_id {
            shared.session.upload_in_flight = false;
        }
    }
}

/// Rolls a pre-flight back to the state it started from if `start` is
/// dropped before the probe answers.
struct ConnectingGuard<'a> {
    inner: &'a ControllerInner,
    previous_state: StreamState,
    previous_message: String,
    armed: bool,
}

impl Drop for ConnectingGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut shared = self
            .inner
            .shared
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if shared.session.state != StreamState::Connecting {
            return;
        }
        log::warn!("Pre-flight check abandoned, back to {}", self.previous_state);
        shared.session.state = self.previous_state;
        shared.board.set(std::mem::take(&mut self.previous_message));
        self.inner.status_tx.send_replace(snapshot(&shared));
    }
}

async fn run_schedule(
    controller: Weak<ControllerInner>,
    mut scheduler: Box<dyn TickScheduler>,
    cancel: CancellationToken,
) {
    log::debug!("Tick schedule started");
    loop {
        let more = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            more = scheduler.next_tick() => more,
        };
        if !more {
            log::debug!("Tick schedule exhausted");
            break;
        }

        let Some(inner) = controller.upgrade() else {
            break;
        };
        let controller = StreamController { inner };
        tokio::spawn(async move {
            let outcome = controller.tick().await;
            log::trace!("Tick: {:?}", outcome);
        });
    }
    log::debug!("Tick schedule ended");
}
