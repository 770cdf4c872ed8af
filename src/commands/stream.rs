use crate::controller::StreamController;
use crate::frame_source::SharedFrameSource;
use crate::session::SessionStats;
use crate::types::{FrameSample, PixelLayout, StreamStatus};
use tauri::{command, State};

/// Managed plugin state: the frame slot the GUI fills and the controller that
/// drains it
pub struct StreamPluginState {
    pub frames: SharedFrameSource,
    pub controller: StreamController,
}

fn server_url(controller: &StreamController, server_url: Option<String>) -> String {
    server_url.unwrap_or_else(|| controller.config().server.default_url.clone())
}

/// Probe the server and start streaming
#[command]
pub async fn start_stream(
    state: State<'_, StreamPluginState>,
    server_url: Option<String>,
) -> Result<StreamStatus, String> {
    let controller = state.controller.clone();
    let url = self::server_url(&controller, server_url);
    match controller.start(&url).await {
        Ok(status) => Ok(status),
        Err(e) => {
            log::error!("Failed to start stream to {}: {}", url, e);
            Err(e.status_message())
        }
    }
}

/// Stop streaming and return the final frame count
#[command]
pub async fn stop_stream(state: State<'_, StreamPluginState>) -> Result<u64, String> {
    state.controller.stop().map_err(|e| e.to_string())
}

/// Start when idle, stop when live
#[command]
pub async fn toggle_stream(
    state: State<'_, StreamPluginState>,
    server_url: Option<String>,
) -> Result<StreamStatus, String> {
    let controller = state.controller.clone();
    let url = self::server_url(&controller, server_url);
    controller
        .toggle(&url)
        .await
        .map_err(|e| e.status_message())
}

/// Switch to the other camera; returns the new index
#[command]
pub async fn flip_camera(state: State<'_, StreamPluginState>) -> Result<u32, String> {
    Ok(state.controller.flip())
}

#[command]
pub async fn get_stream_status(
    state: State<'_, StreamPluginState>,
) -> Result<StreamStatus, String> {
    Ok(state.controller.status())
}

#[command]
pub async fn get_stream_stats(
    state: State<'_, StreamPluginState>,
) -> Result<SessionStats, String> {
    Ok(state.controller.stats())
}

/// Hand the latest rendered frame to the controller
#[command]
pub async fn push_frame(
    state: State<'_, StreamPluginState>,
    pixels: Vec<u8>,
    width: u32,
    height: u32,
    bgra: Option<bool>,
) -> Result<(), String> {
    let layout = if bgra.unwrap_or(false) {
        PixelLayout::Bgra8
    } else {
        PixelLayout::Rgba8
    };
    let sample = FrameSample::new(pixels, width, height).with_layout(layout);
    if !sample.is_complete() {
        return Err(format!(
            "Frame buffer too short for {}x{}: {} bytes",
            width,
            height,
            sample.pixels.len()
        ));
    }
    state.frames.publish(sample);
    Ok(())
}
