//! snapstream: push camera snapshots to an HTTP ingestion server
//!
//! A [`StreamController`] checks that the server is up, then on every tick
//! takes the latest frame from a [`FrameSource`], encodes it as JPEG and POSTs
//! it to the server. Failed frames are dropped; the stream keeps going.
//!
//! # Features
//! - Pre-flight server check before a session goes live
//! - Fixed-rate capture with skip-if-busy uploads
//! - Operator status line (LIVE / WARNING / OFFLINE / ERROR / STOPPED)
//! - Two-camera flip
//! - Optional local camera capture (`camera` feature)
//! - Optional Tauri plugin surface (`tauri-plugin` feature)
//!
//! # Usage
//! ```rust,no_run
//! use snapstream::{SharedFrameSource, StreamConfig, StreamController};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), snapstream::StreamError> {
//! let frames = SharedFrameSource::new();
//! let controller = StreamController::with_http(StreamConfig::default(), Arc::new(frames.clone()))?;
//! controller.start("http://127.0.0.1:8888").await?;
//! // ... the GUI keeps calling frames.publish(...)
//! let sent = controller.stop()?;
//! println!("{} frames sent", sent);
//! # Ok(())
//! # }
//! ```
//!
//! With the `tauri-plugin` feature:
//! ```rust,ignore
//! fn main() {
//!     tauri::Builder::default()
//!         .plugin(snapstream::init())
//!         .run(tauri::generate_context!())
//!         .expect("error while running tauri application");
//! }
//! ```
#[cfg(feature = "camera")]
pub mod camera;
#[cfg(feature = "tauri-plugin")]
pub mod commands;
pub mod config;
pub mod controller;
pub mod encoder;
pub mod errors;
pub mod frame_source;
pub mod scheduler;
pub mod session;
pub mod timing;
pub mod transport;
pub mod types;

// Testing utilities - synthetic frames and scripted doubles for offline testing
pub mod testing;

// Re-exports for convenience
#[cfg(feature = "camera")]
pub use camera::CameraFrameSource;
pub use config::StreamConfig;
pub use controller::{StreamController, StreamControllerBuilder};
pub use encoder::{FrameEncoder, JpegFrameEncoder};
pub use errors::StreamError;
pub use frame_source::{FrameSource, SharedFrameSource};
pub use scheduler::{IntervalSchedulerFactory, ManualClock, SchedulerFactory, TickScheduler};
pub use session::{SessionStats, StreamSession};
pub use transport::{FrameTransport, HttpTransport, StreamEndpoints};
pub use types::{
    EncodedFrame, FrameSample, PixelLayout, SkipReason, StreamState, StreamStatus, TickOutcome,
};

#[cfg(feature = "tauri-plugin")]
use tauri::{
    plugin::{Builder, TauriPlugin},
    Manager, Runtime,
};

/// Initialize the snapstream plugin with all commands
#[cfg(feature = "tauri-plugin")]
pub fn init<R: Runtime>() -> TauriPlugin<R> {
    Builder::new("snapstream")
        .invoke_handler(tauri::generate_handler![
            commands::stream::start_stream,
            commands::stream::stop_stream,
            commands::stream::toggle_stream,
            commands::stream::flip_camera,
            commands::stream::get_stream_status,
            commands::stream::get_stream_stats,
            commands::stream::push_frame,
        ])
        .setup(|app, _api| {
            let config = StreamConfig::load_or_default();
            let frames = SharedFrameSource::new();
            let controller = StreamController::with_http(config, std::sync::Arc::new(frames.clone()))?;
            app.manage(commands::stream::StreamPluginState { frames, controller });
            Ok(())
        })
        .build()
}

/// Initialize logging for the streaming system
pub fn init_logging() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "snapstream=info");
    }
    let _ = env_logger::try_init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Get crate information
pub fn get_info() -> CrateInfo {
    CrateInfo {
        name: NAME.to_string(),
        version: VERSION.to_string(),
        description: DESCRIPTION.to_string(),
        features: enabled_features(),
    }
}

fn enabled_features() -> Vec<String> {
    let mut features = Vec::new();
    if cfg!(feature = "camera") {
        features.push("camera".to_string());
    }
    if cfg!(feature = "tauri-plugin") {
        features.push("tauri-plugin".to_string());
    }
    features
}

/// Crate information structure
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CrateInfo {
    pub name: String,
    pub version: String,
    pub description: String,
    pub features: Vec<String>,
}

#[cfg(test)]
mod lib_tests {
    use super::*;

    #[test]
    fn test_crate_info() {
        let info = get_info();
        assert_eq!(info.name, "snapstream");
        assert!(!info.version.is_empty());
        assert!(!info.description.is_empty());
    }

    #[test]
    fn test_init_logging_is_idempotent() {
        init_logging();
        init_logging();
        assert!(std::env::var("RUST_LOG").is_ok());
    }
}
