//! Scripted transport and encoder doubles

use crate::encoder::FrameEncoder;
use crate::errors::StreamError;
use crate::transport::FrameTransport;
use crate::types::{EncodedFrame, FrameSample};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;

/// How the scripted server answers one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedResponse {
    /// An HTTP response with this status code
    Status(u16),
    /// No response at all (refused, reset, timed out)
    Fail(String),
}

impl ScriptedResponse {
    fn into_result(self) -> Result<u16, StreamError> {
        match self {
            ScriptedResponse::Status(code) => Ok(code),
            ScriptedResponse::Fail(reason) => Err(StreamError::TransportError(reason)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub method: &'static str,
    pub url: String,
    pub content_type: Option<&'static str>,
    pub body_len: usize,
}

/// In-memory ingestion server.
///
/// Answers status probes and uploads from a script, records every request,
/// and can hold uploads open to simulate a slow network.
#[derive(Debug)]
pub struct ScriptedTransport {
    status_response: Mutex<ScriptedResponse>,
    upload_default: Mutex<ScriptedResponse>,
    upload_queue: Mutex<VecDeque<ScriptedResponse>>,
    latency: Mutex<Duration>,
    gate: watch::Sender<bool>,
    requests: Mutex<Vec<RecordedRequest>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedTransport {
    /// Server that answers everything with 200
    pub fn new() -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            status_response: Mutex::new(ScriptedResponse::Status(200)),
            upload_default: Mutex::new(ScriptedResponse::Status(200)),
            upload_queue: Mutex::new(VecDeque::new()),
            latency: Mutex::new(Duration::ZERO),
            gate,
            requests: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn set_status_response(&self, response: ScriptedResponse) {
        *lock(&self.status_response) = response;
    }

    /// Answer for every upload once the queue is empty
    pub fn set_upload_response(&self, response: ScriptedResponse) {
        *lock(&self.upload_default) = response;
    }

    /// One-shot answer for the next upload
    pub fn push_upload_response(&self, response: ScriptedResponse) {
        lock(&self.upload_queue).push_back(response);
    }

    pub fn set_latency(&self, latency: Duration) {
        *lock(&self.latency) = latency;
    }

    /// Keep uploads waiting until [`ScriptedTransport::release_uploads`]
    pub fn hold_uploads(&self) {
        self.gate.send_replace(false);
    }

    pub fn release_uploads(&self) {
        self.gate.send_replace(true);
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        lock(&self.requests).clone()
    }

    pub fn status_checks(&self) -> usize {
        self.count("GET")
    }

    pub fn uploads(&self) -> usize {
        self.count("POST")
    }

    pub fn request_count(&self) -> usize {
        lock(&self.requests).len()
    }

    /// Uploads currently waiting on the server
    pub fn uploads_in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Highest number of concurrent uploads seen
    pub fn max_concurrent_uploads(&self) -> usize {
        self.max_in_flight.load(Ordering::Acquire)
    }

    fn count(&self, method: &str) -> usize {
        lock(&self.requests)
            .iter()
            .filter(|r| r.method == method)
            .count()
    }

    fn record(&self, request: RecordedRequest) {
        lock(&self.requests).push(request);
    }

    async fn delay(&self) {
        let latency = *lock(&self.latency);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl FrameTransport for ScriptedTransport {
    async fn check_status(&self, url: &str) -> Result<u16, StreamError> {
        self.record(RecordedRequest {
            method: "GET",
            url: url.to_string(),
            content_type: None,
            body_len: 0,
        });
        self.delay().await;
        lock(&self.status_response).clone().into_result()
    }

    async fn upload_frame(&self, url: &str, frame: &EncodedFrame) -> Result<u16, StreamError> {
        self.record(RecordedRequest {
            method: "POST",
            url: url.to_string(),
            content_type: Some(EncodedFrame::CONTENT_TYPE),
            body_len: frame.len(),
        });
        let now = self.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        self.max_in_flight.fetch_max(now, Ordering::AcqRel);

        self.delay().await;
        let mut gate = self.gate.subscribe();
        // The sender lives in self, so this only ends when the gate opens
        let _ = gate.wait_for(|open| *open).await;

        self.in_flight.fetch_sub(1, Ordering::AcqRel);
        let next = lock(&self.upload_queue).pop_front();
        next.unwrap_or_else(|| lock(&self.upload_default).clone())
            .into_result()
    }
}

/// Encoder that always produces the same payload size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedPayloadEncoder {
    len: usize,
}

impl FixedPayloadEncoder {
    pub fn new(len: usize) -> Self {
        Self { len }
    }
}

impl FrameEncoder for FixedPayloadEncoder {
    fn encode(&self, sample: &FrameSample) -> Result<EncodedFrame, StreamError> {
        if !sample.is_complete() {
            return Err(StreamError::EncodeError(
                "Pixel buffer too short".to_string(),
            ));
        }
        Ok(EncodedFrame {
            data: Bytes::from(vec![0xAB; self.len]),
            width: sample.width,
            height: sample.height,
            quality: 85,
        })
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
