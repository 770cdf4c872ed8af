//! Local camera capture through nokhwa

use crate::errors::StreamError;
use crate::frame_source::{FrameSource, SharedFrameSource};
use crate::types::FrameSample;
use nokhwa::pixel_format::RgbAFormat;
use nokhwa::utils::{CameraIndex, RequestedFormat, RequestedFormatType};
use nokhwa::{Buffer, CallbackCamera};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Default)]
struct CameraHandle(Mutex<Option<CallbackCamera>>);

impl CameraHandle {
    fn lock(&self) -> MutexGuard<'_, Option<CallbackCamera>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for CameraHandle {
    fn drop(&mut self) {
        let camera = self.0.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(camera) = camera.as_mut() {
            let _ = camera.stop_stream();
        }
    }
}

// SAFETY: the camera is only touched while holding the handle's lock and the
// capture callback only writes into the thread-safe slot.
unsafe impl Send for CameraHandle {}
unsafe impl Sync for CameraHandle {}

/// Frame source backed by a physical camera.
///
/// Captured frames are decoded to RGBA and published into a
/// [`SharedFrameSource`]. `resume` reopens the camera at the most recently
/// requested index on a background thread, so callers never wait on the
/// device.
pub struct CameraFrameSource {
    slot: SharedFrameSource,
    camera: Arc<CameraHandle>,
}

impl CameraFrameSource {
    /// Open the camera at `index` and start capturing
    pub fn open(index: u32) -> Result<Self, StreamError> {
        let source = Self::closed();
        source.slot.set_camera_index(index);
        reopen(&source.camera, &source.slot)?;
        Ok(source)
    }

    fn closed() -> Self {
        Self {
            slot: SharedFrameSource::new(),
            camera: Arc::new(CameraHandle::default()),
        }
    }

    /// The slot frames land in
    pub fn slot(&self) -> &SharedFrameSource {
        &self.slot
    }
}

/// Swap the running camera for the most recently requested index
fn reopen(camera: &CameraHandle, slot: &SharedFrameSource) -> Result<(), StreamError> {
    let mut guard = camera.lock();
    // Read under the lock so that after queued reopens the last request wins
    let index = slot.requested_camera_index();
    if let Some(mut previous) = guard.take() {
        if let Err(e) = previous.stop_stream() {
            log::warn!("Failed to stop previous camera: {}", e);
        }
    }

    let publish_into = slot.clone();
    let requested =
        RequestedFormat::new::<RgbAFormat>(RequestedFormatType::AbsoluteHighestFrameRate);
    let mut opened = CallbackCamera::new(
        CameraIndex::Index(index),
        requested,
        move |buffer: Buffer| match buffer.decode_image::<RgbAFormat>() {
            Ok(image) => {
                let (width, height) = (image.width(), image.height());
                publish_into.publish(FrameSample::new(image.into_raw(), width, height));
            }
            Err(e) => log::debug!("Dropping undecodable camera frame: {}", e),
        },
    )
    .map_err(|e| StreamError::CameraError(format!("Failed to open camera {}: {}", index, e)))?;

    opened.open_stream().map_err(|e| {
        StreamError::CameraError(format!("Failed to start camera {}: {}", index, e))
    })?;

    log::info!("Camera {} streaming", index);
    *guard = Some(opened);
    Ok(())
}

impl FrameSource for CameraFrameSource {
    fn current_frame(&self) -> Option<FrameSample> {
        self.slot.current_frame()
    }

    fn set_camera_index(&self, index: u32) {
        self.slot.set_camera_index(index);
    }

    fn resume(&self) {
        self.slot.resume();
        let camera = Arc::clone(&self.camera);
        let slot = self.slot.clone();
        let spawned = std::thread::Builder::new()
            .name("snapstream-camera".to_string())
            .spawn(move || {
                if let Err(e) = reopen(&camera, &slot) {
                    log::error!("{}", e);
                }
            });
        if let Err(e) = spawned {
            log::error!("Failed to spawn camera thread: {}", e);
        }
    }
}
