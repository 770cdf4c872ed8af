//! Testing utilities for snapstream
//!
//! Synthetic frames plus scripted stand-ins for the camera, the encoder and
//! the ingestion server, so the controller can be exercised offline.

pub mod scripted;
pub mod synthetic_data;

pub use scripted::{FixedPayloadEncoder, RecordedRequest, ScriptedResponse, ScriptedTransport};
pub use synthetic_data::{synthetic_rgba_frame, SyntheticFrameSource, SyntheticMode};
