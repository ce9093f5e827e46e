//! Process-wide camera handle
//!
//! The physical camera is opened once and kept open for the lifetime of the
//! process, so screens can enable and disable detection without hitting
//! "device busy" on reopen. Readers share the most recently captured frame.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use image::imageops::FilterType;

use super::GrayFrame;
use crate::{Error, Result};

/// A device (or stand-in) producing grayscale detection frames
pub trait FrameSource: Send {
    /// Acquire the device
    ///
    /// # Errors
    ///
    /// Returns error if the device cannot be opened
    fn open(&mut self) -> Result<()>;

    /// Capture one frame at detection resolution
    ///
    /// # Errors
    ///
    /// Returns error if capture fails
    fn capture(&mut self) -> Result<GrayFrame>;

    /// Release the device
    fn close(&mut self);
}

/// Owns one frame source and tracks whether it is running
pub struct Camera {
    source: Mutex<Box<dyn FrameSource>>,
    running: AtomicBool,
    last_frame: Mutex<Option<Arc<GrayFrame>>>,
}

impl Camera {
    #[must_use]
    pub fn new(source: Box<dyn FrameSource>) -> Self {
        Self {
            source: Mutex::new(source),
            running: AtomicBool::new(false),
            last_frame: Mutex::new(None),
        }
    }

    /// Open the source; a running camera is left untouched
    ///
    /// # Errors
    ///
    /// Returns error if the source cannot be opened
    pub fn start(&self) -> Result<()> {
        let mut source = self.source.lock().unwrap_or_else(PoisonError::into_inner);
        if self.running.load(Ordering::Acquire) {
            tracing::debug!("camera already running");
            return Ok(());
        }

        source.open().inspect_err(|e| {
            tracing::warn!(error = %e, "camera start failed");
        })?;
        self.running.store(true, Ordering::Release);
        tracing::info!("camera started");
        Ok(())
    }

    /// Capture a fresh frame and remember it as the latest
    ///
    /// # Errors
    ///
    /// Returns error if the camera is not running or capture fails
    pub fn grab(&self) -> Result<Arc<GrayFrame>> {
        if !self.is_running() {
            return Err(Error::Camera("camera not running".to_string()));
        }

        let frame = Arc::new(
            self.source
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .capture()?,
        );
        *self
            .last_frame
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&frame));
        Ok(frame)
    }

    /// Most recently captured frame, if any
    #[must_use]
    pub fn last_frame(&self) -> Option<Arc<GrayFrame>> {
        self.last_frame
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Close the source; only meant for process exit
    pub fn shutdown(&self) {
        let mut source = self.source.lock().unwrap_or_else(PoisonError::into_inner);
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        source.close();
        *self
            .last_frame
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
        tracing::info!("camera shutdown complete");
    }
}

static GLOBAL: OnceLock<Arc<Camera>> = OnceLock::new();

/// Return the process-wide camera, creating it from `make_source` on first use
///
/// Later calls ignore `make_source` and return the existing camera.
pub fn install_global(make_source: impl FnOnce() -> Box<dyn FrameSource>) -> Arc<Camera> {
    Arc::clone(GLOBAL.get_or_init(|| Arc::new(Camera::new(make_source()))))
}

/// The process-wide camera, if one was installed
#[must_use]
pub fn global() -> Option<Arc<Camera>> {
    GLOBAL.get().cloned()
}

/// Shut down the process-wide camera, if any
pub fn shutdown_global() {
    if let Some(camera) = GLOBAL.get() {
        camera.shutdown();
    }
}

/// Replays a directory of still images as camera frames, looping forever
///
/// Frames are converted to grayscale and resized to the detection size.
pub struct ImageSequenceSource {
    dir: PathBuf,
    size: (u32, u32),
    frames: Vec<PathBuf>,
    next: usize,
}

const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

impl ImageSequenceSource {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, size: (u32, u32)) -> Self {
        Self {
            dir: dir.into(),
            size,
            frames: Vec::new(),
            next: 0,
        }
    }

    /// Number of frames found by [`open`](FrameSource::open)
    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
}

impl FrameSource for ImageSequenceSource {
    fn open(&mut self) -> Result<()> {
        let mut frames: Vec<PathBuf> = std::fs::read_dir(&self.dir)
            .map_err(|e| Error::Camera(format!("{}: {e}", self.dir.display())))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| is_image(p))
            .collect();
        frames.sort();

        if frames.is_empty() {
            return Err(Error::Camera(format!(
                "no frames found in {}",
                self.dir.display()
            )));
        }

        tracing::debug!(dir = %self.dir.display(), frames = frames.len(), "replay source opened");
        self.frames = frames;
        self.next = 0;
        Ok(())
    }

    fn capture(&mut self) -> Result<GrayFrame> {
        let path = self
            .frames
            .get(self.next)
            .ok_or_else(|| Error::Camera("replay source not opened".to_string()))?;
        self.next = (self.next + 1) % self.frames.len();

        let (width, height) = self.size;
        let gray = image::open(path)?.to_luma8();
        let gray = if gray.dimensions() == self.size {
            gray
        } else {
            image::imageops::resize(&gray, width, height, FilterType::Triangle)
        };

        GrayFrame::new(width, height, gray.into_raw())
    }

    fn close(&mut self) {
        self.frames.clear();
        self.next = 0;
    }
}
