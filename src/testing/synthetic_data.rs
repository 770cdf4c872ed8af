//! Generated camera frames
//!
//! Frames vary with the frame number and the selected camera, which is enough
//! to tell successive uploads and the two cameras apart.

use crate::frame_source::FrameSource;
use crate::types::FrameSample;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

/// Create an RGBA gradient frame that shifts with `frame_number`
pub fn synthetic_rgba_frame(frame_number: u64, width: u32, height: u32) -> FrameSample {
    let mut data = vec![0u8; (width * height * 4) as usize];

    let base = (frame_number % 256) as u8;
    for y in 0..height {
        for x in 0..width {
            let idx = ((y * width + x) * 4) as usize;
            data[idx] = base.wrapping_add((x % 256) as u8);
            data[idx + 1] = base.wrapping_add((y % 256) as u8);
            data[idx + 2] = base.wrapping_add(((x + y) % 256) as u8);
            data[idx + 3] = 255;
        }
    }

    FrameSample::new(data, width, height)
}

/// What a [`SyntheticFrameSource`] hands out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntheticMode {
    /// A fresh gradient on every read
    Frames,
    /// No frame yet, as while a camera is still opening
    Empty,
    /// A frame whose buffer is too short for its dimensions
    Corrupt,
}

/// Frame source that renders synthetic frames on demand
#[derive(Debug)]
pub struct SyntheticFrameSource {
    width: u32,
    height: u32,
    mode: Mutex<SyntheticMode>,
    frames: AtomicU64,
    camera_index: AtomicU32,
    resumes: AtomicU64,
}

impl SyntheticFrameSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            mode: Mutex::new(SyntheticMode::Frames),
            frames: AtomicU64::new(0),
            camera_index: AtomicU32::new(0),
            resumes: AtomicU64::new(0),
        }
    }

    pub fn with_mode(self, mode: SyntheticMode) -> Self {
        self.set_mode(mode);
        self
    }

    pub fn set_mode(&self, mode: SyntheticMode) {
        *self.mode.lock().unwrap_or_else(PoisonError::into_inner) = mode;
    }

    pub fn mode(&self) -> SyntheticMode {
        *self.mode.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Frames handed out so far
    pub fn frames_generated(&self) -> u64 {
        self.frames.load(Ordering::Acquire)
    }

    pub fn camera_index(&self) -> u32 {
        self.camera_index.load(Ordering::Acquire)
    }

    pub fn resume_count(&self) -> u64 {
        self.resumes.load(Ordering::Acquire)
    }
}

impl FrameSource for SyntheticFrameSource {
    fn current_frame(&self) -> Option<FrameSample> {
        match self.mode() {
            SyntheticMode::Empty => None,
            SyntheticMode::Corrupt => {
                self.frames.fetch_add(1, Ordering::AcqRel);
                Some(FrameSample::new(vec![0u8; 7], self.width, self.height))
            }
            SyntheticMode::Frames => {
                let n = self.frames.fetch_add(1, Ordering::AcqRel);
                // Offset the pattern per camera so a flip is visible
                let shift = u64::from(self.camera_index()) * 128;
                Some(synthetic_rgba_frame(n + shift, self.width, self.height))
            }
        }
    }

    fn set_camera_index(&self, index: u32) {
        self.camera_index.store(index, Ordering::Release);
    }

    fn resume(&self) {
        self.resumes.fetch_add(1, Ordering::AcqRel);
    }
}
