use crate::timing::{rate_over, ThroughputClock};
use crate::transport::StreamEndpoints;
use crate::types::StreamState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Counters collected over the life of one session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    pub ticks: u64,
    pub delivered: u64,
    pub rejected: u64,
    pub dropped: u64,
    pub skipped_busy: u64,
    pub skipped_no_frame: u64,
    pub skipped_encode: u64,
    pub bytes_sent: u64,
    /// Seconds since the session went live
    pub elapsed_secs: f64,
    /// Delivered frames per second since the session went live
    pub average_fps: f64,
}

/// The streaming context the controller owns.
///
/// A fresh session is created on every successful start; stopping keeps the
/// last one around so its final count stays readable.
#[derive(Debug, Clone)]
pub struct StreamSession {
    id: Uuid,
    endpoints: Option<StreamEndpoints>,
    pub(crate) state: StreamState,
    pub(crate) frames_sent: u64,
    pub(crate) last_error: Option<String>,
    pub(crate) upload_in_flight: bool,
    pub(crate) stats: SessionStats,
    started_at: Option<DateTime<Utc>>,
    stopped_at: Option<DateTime<Utc>>,
    clock: Option<ThroughputClock>,
}

impl Default for StreamSession {
    fn default() -> Self {
        Self::idle()
    }
}

impl StreamSession {
    /// Placeholder before anything was started
    pub fn idle() -> Self {
        Self {
            id: Uuid::nil(),
            endpoints: None,
            state: StreamState::Idle,
            frames_sent: 0,
            last_error: None,
            upload_in_flight: false,
            stats: SessionStats::default(),
            started_at: None,
            stopped_at: None,
            clock: None,
        }
    }

    /// New live session with its counter at zero
    pub fn live(endpoints: StreamEndpoints) -> Self {
        Self {
            id: Uuid::new_v4(),
            endpoints: Some(endpoints),
            state: StreamState::Live,
            frames_sent: 0,
            last_error: None,
            upload_in_flight: false,
            stats: SessionStats::default(),
            started_at: Some(Utc::now()),
            stopped_at: None,
            clock: Some(ThroughputClock::new()),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// `None` for the idle placeholder
    pub fn session_id(&self) -> Option<String> {
        (!self.id.is_nil()).then(|| self.id.to_string())
    }

    pub fn server_base_url(&self) -> Option<&str> {
        self.endpoints.as_ref().map(|e| e.base_url.as_str())
    }

    pub fn endpoints(&self) -> Option<&StreamEndpoints> {
        self.endpoints.as_ref()
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn stopped_at(&self) -> Option<DateTime<Utc>> {
        self.stopped_at
    }

    pub(crate) fn mark_stopped(&mut self) {
        self.state = StreamState::Stopped;
        self.stopped_at = Some(Utc::now());
        self.stats = self.stats();
        // Freeze throughput at the moment of stop.
        self.clock = None;
    }

    /// Counters plus throughput up to now (or up to stop)
    pub fn stats(&self) -> SessionStats {
        let mut stats = self.stats.clone();
        if let Some(clock) = &self.clock {
            let elapsed = clock.elapsed();
            stats.elapsed_secs = elapsed.as_secs_f64();
            stats.average_fps = rate_over(stats.delivered, elapsed);
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StreamConfig;

    fn endpoints() -> StreamEndpoints {
        StreamEndpoints::parse("http://127.0.0.1:8888", &StreamConfig::default().server).unwrap()
    }

    #[test]
    fn test_idle_session_has_no_identity() {
        let session = StreamSession::idle();
        assert_eq!(session.state(), StreamState::Idle);
        assert!(session.session_id().is_none());
        assert!(session.server_base_url().is_none());
        assert_eq!(session.frames_sent(), 0);
    }

    #[test]
    fn test_live_sessions_are_distinct() {
        let a = StreamSession::live(endpoints());
        let b = StreamSession::live(endpoints());
        assert_ne!(a.id(), b.id());
        assert_eq!(a.state(), StreamState::Live);
        assert_eq!(a.server_base_url(), Some("http://127.0.0.1:8888"));
        assert!(a.started_at().is_some());
    }

    #[test]
    fn test_stop_freezes_stats() {
        let mut session = StreamSession::live(endpoints());
        session.frames_sent = 5;
        session.stats.delivered = 5;
        session.mark_stopped();

        assert_eq!(session.state(), StreamState::Stopped);
        assert!(session.stopped_at().is_some());
        let first = session.stats();
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert_eq!(session.stats(), first);
        assert_eq!(first.delivered, 5);
    }
}
