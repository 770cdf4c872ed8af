//! Frame Source boundary
//!
//! The GUI shell owns the camera; the controller only pulls the latest frame
//! and forwards camera selection requests.

use crate::types::FrameSample;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

/// Provider of the most recently rendered camera frame
pub trait FrameSource: Send + Sync {
    /// Latest frame, or `None` while the camera is not producing frames yet
    fn current_frame(&self) -> Option<FrameSample>;

    /// Select the camera to capture from
    fn set_camera_index(&self, index: u32);

    /// Ask the source to (re)start capture
    fn resume(&self);
}

/// Latest-frame slot shared between a GUI shell and the controller.
///
/// The shell calls [`SharedFrameSource::publish`] whenever it renders a new
/// frame; the controller reads it on each tick. Clones share the same slot.
#[derive(Debug, Clone, Default)]
pub struct SharedFrameSource {
    inner: Arc<SlotInner>,
}

#[derive(Debug, Default)]
struct SlotInner {
    frame: RwLock<Option<FrameSample>>,
    camera_index: AtomicU32,
    resume_requests: AtomicU64,
}

impl SharedFrameSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current frame
    pub fn publish(&self, sample: FrameSample) {
        *self
            .inner
            .frame
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(sample);
    }

    /// Forget the current frame (e.g. the camera went away)
    pub fn clear(&self) {
        *self
            .inner
            .frame
            .write()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Camera index most recently requested through `set_camera_index`
    pub fn requested_camera_index(&self) -> u32 {
        self.inner.camera_index.load(Ordering::Acquire)
    }

    /// How many times capture was asked to resume
    pub fn resume_requests(&self) -> u64 {
        self.inner.resume_requests.load(Ordering::Acquire)
    }
}

impl FrameSource for SharedFrameSource {
    fn current_frame(&self) -> Option<FrameSample> {
        self.inner
            .frame
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_camera_index(&self, index: u32) {
        let previous = self.inner.camera_index.swap(index, Ordering::AcqRel);
        if previous != index {
            // Frames from the old camera are stale.
            self.clear();
        }
    }

    fn resume(&self) {
        self.inner.resume_requests.fetch_add(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_slot_has_no_frame() {
        let source = SharedFrameSource::new();
        assert!(source.current_frame().is_none());
    }

    #[test]
    fn test_publish_replaces_frame() {
        let source = SharedFrameSource::new();
        source.publish(FrameSample::new(vec![1u8; 16], 2, 2));
        source.publish(FrameSample::new(vec![2u8; 16], 2, 2));

        let frame = source.current_frame().unwrap();
        assert_eq!(frame.pixels[0], 2);
    }

    #[test]
    fn test_reader_copy_survives_overwrite() {
        let source = SharedFrameSource::new();
        source.publish(FrameSample::new(vec![7u8; 16], 2, 2));
        let held = source.current_frame().unwrap();

        source.publish(FrameSample::new(vec![9u8; 16], 2, 2));
        assert!(held.pixels.iter().all(|&b| b == 7));
    }

    #[test]
    fn test_camera_change_clears_stale_frame() {
        let source = SharedFrameSource::new();
        source.publish(FrameSample::new(vec![1u8; 16], 2, 2));

        source.set_camera_index(0);
        assert!(source.current_frame().is_some());

        source.set_camera_index(1);
        assert!(source.current_frame().is_none());
        assert_eq!(source.requested_camera_index(), 1);
    }

    #[test]
    fn test_resume_is_counted() {
        let source = SharedFrameSource::new();
        source.resume();
        source.resume();
        assert_eq!(source.resume_requests(), 2);
    }

    #[test]
    fn test_clones_share_slot() {
        let gui_side = SharedFrameSource::new();
        let controller_side = gui_side.clone();
        gui_side.publish(FrameSample::new(vec![3u8; 16], 2, 2));
        assert!(controller_side.current_frame().is_some());
    }
}
