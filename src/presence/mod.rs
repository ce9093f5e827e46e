//! Presence detection
//!
//! Wakes the mascot when someone steps up to the kiosk. A face counts as
//! "addressing the kiosk" when its bounding box covers at least
//! `face_area_threshold` of the detection frame; presence is confirmed once
//! such a face has been seen continuously for `time_to_trigger`.
//!
//! ```text
//!  Camera ──grab──▶ FaceLocator ──boxes──▶ PresenceTracker ──fire──▶ callback
//!  (shared)          (cascade)              (dwell episode)
//! ```

pub mod camera;
#[cfg(feature = "camera")]
pub mod opencv;

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

pub use camera::{Camera, FrameSource, ImageSequenceSource};

use crate::config::PresenceConfig;
use crate::{Error, Result};

/// Minimum face area ratio to count as addressing the kiosk
pub const FACE_AREA_THRESHOLD: f64 = 0.20;

/// Continuous dwell time before presence is confirmed
pub const TIME_TO_TRIGGER: Duration = Duration::from_secs(1);

/// Detection poll interval (~30 Hz)
pub const POLL_INTERVAL: Duration = Duration::from_millis(33);

/// How long `stop` waits for the poll thread before detaching it
pub const STOP_TIMEOUT: Duration = Duration::from_millis(500);

/// Detection frame size
pub const DETECT_SIZE: (u32, u32) = (320, 240);

/// Standard install locations of the frontal-face Haar cascade
pub const CASCADE_PATHS: [&str; 3] = [
    "/usr/share/opencv4/haarcascades/haarcascade_frontalface_default.xml",
    "/usr/share/opencv/haarcascades/haarcascade_frontalface_default.xml",
    "haarcascade_frontalface_default.xml",
];

/// A face bounding box in detection-frame coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaceBox {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl FaceBox {
    #[must_use]
    pub const fn new(x: u32, y: u32, w: u32, h: u32) -> Self {
        Self { x, y, w, h }
    }

    /// Face area divided by the frame area
    #[must_use]
    pub fn area_ratio(&self, frame_width: u32, frame_height: u32) -> f64 {
        let frame_area = f64::from(frame_width) * f64::from(frame_height);
        if frame_area <= 0.0 {
            return 0.0;
        }
        f64::from(self.w) * f64::from(self.h) / frame_area
    }
}

/// An 8-bit grayscale detection frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrayFrame {
    pub width: u32,
    pub height: u32,
    /// Row-major pixels, `width * height` bytes
    pub data: Vec<u8>,
}

impl GrayFrame {
    /// Create a frame, checking the buffer length
    ///
    /// # Errors
    ///
    /// Returns error if `data` does not hold `width * height` bytes
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize;
        if data.len() != expected {
            return Err(Error::Camera(format!(
                "frame buffer is {} bytes, expected {expected} for {width}x{height}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// A uniformly black frame
    #[must_use]
    pub fn blank(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; width as usize * height as usize],
        }
    }
}

/// Locates faces in a grayscale frame
///
/// Implementations may keep internal state, hence `&mut self`.
pub trait FaceLocator: Send {
    /// Return the bounding boxes of all faces in `frame`
    ///
    /// # Errors
    ///
    /// Returns error if the classifier fails
    fn locate(&mut self, frame: &GrayFrame) -> Result<Vec<FaceBox>>;
}

/// Largest area ratio among `faces`, if any
#[must_use]
pub fn max_area_ratio(faces: &[FaceBox], frame_width: u32, frame_height: u32) -> Option<f64> {
    faces
        .iter()
        .map(|f| f.area_ratio(frame_width, frame_height))
        .reduce(f64::max)
}

/// Dwell/trigger state of one presence episode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PresenceSession {
    /// When the current run of qualifying frames started
    pub dwell_start: Option<Instant>,

    /// Whether the callback already fired for this episode
    pub triggered: bool,
}

impl PresenceSession {
    /// Feed one frame's verdict; returns true exactly when the callback must fire
    ///
    /// A non-qualifying frame ends the episode: the dwell timer and the
    /// trigger latch both reset.
    pub fn observe(&mut self, qualifying: bool, now: Instant, time_to_trigger: Duration) -> bool {
        if !qualifying {
            self.reset();
            return false;
        }

        let start = *self.dwell_start.get_or_insert(now);
        if !self.triggered && now.saturating_duration_since(start) >= time_to_trigger {
            self.triggered = true;
            return true;
        }

        false
    }

    pub const fn reset(&mut self) {
        self.dwell_start = None;
        self.triggered = false;
    }

    #[must_use]
    pub const fn status(&self) -> PresenceStatus {
        match (self.dwell_start, self.triggered) {
            (_, true) => PresenceStatus::Triggered,
            (Some(_), false) => PresenceStatus::Dwelling,
            (None, false) => PresenceStatus::Idle,
        }
    }
}

/// Coarse detector status, used for the on-screen indicator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PresenceStatus {
    /// No qualifying face
    #[default]
    Idle,
    /// Qualifying face present, dwell timer running
    Dwelling,
    /// Presence confirmed for the current episode
    Triggered,
}

/// Thresholds for the dwell rule
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PresenceThresholds {
    pub face_area_threshold: f64,
    pub time_to_trigger: Duration,
}

impl Default for PresenceThresholds {
    fn default() -> Self {
        Self {
            face_area_threshold: FACE_AREA_THRESHOLD,
            time_to_trigger: TIME_TO_TRIGGER,
        }
    }
}

impl From<&PresenceConfig> for PresenceThresholds {
    fn from(config: &PresenceConfig) -> Self {
        Self {
            face_area_threshold: config.face_area_threshold,
            time_to_trigger: config.time_to_trigger,
        }
    }
}

/// Applies the dwell rule to per-frame detections
#[derive(Debug, Clone, Default)]
pub struct PresenceTracker {
    thresholds: PresenceThresholds,
    session: PresenceSession,
}

impl PresenceTracker {
    #[must_use]
    pub fn new(thresholds: PresenceThresholds) -> Self {
        Self {
            thresholds,
            session: PresenceSession::default(),
        }
    }

    /// Process the faces found in one frame; returns true when presence is confirmed
    pub fn observe_faces(
        &mut self,
        faces: &[FaceBox],
        frame_width: u32,
        frame_height: u32,
        now: Instant,
    ) -> bool {
        let qualifying = max_area_ratio(faces, frame_width, frame_height)
            .is_some_and(|ratio| ratio >= self.thresholds.face_area_threshold);
        self.session
            .observe(qualifying, now, self.thresholds.time_to_trigger)
    }

    /// Record a frame where capture or detection failed
    pub fn observe_failure(&mut self, now: Instant) {
        self.session
            .observe(false, now, self.thresholds.time_to_trigger);
    }

    #[must_use]
    pub const fn session(&self) -> &PresenceSession {
        &self.session
    }

    #[must_use]
    pub const fn status(&self) -> PresenceStatus {
        self.session.status()
    }

    pub const fn reset(&mut self) {
        self.session.reset();
    }
}

/// Callback fired once per confirmed presence episode
pub type DetectCallback = Arc<dyn Fn() + Send + Sync>;

/// State shared between the detector handle and one run of its poll thread
///
/// Every `start` gets a fresh instance, so a thread detached by `stop` can
/// never observe the flag of a later run.
#[derive(Default)]
struct Shared {
    active: AtomicBool,
    faces: Mutex<Vec<FaceBox>>,
    status: Mutex<PresenceStatus>,
}

/// Polls the shared camera and fires a callback when presence is confirmed
///
/// Starting and stopping only toggles detection; the camera stays open so
/// screens can switch without reopening the device.
pub struct PresenceDetector {
    camera: Arc<Camera>,
    locator: Arc<Mutex<Box<dyn FaceLocator>>>,
    thresholds: PresenceThresholds,
    poll_interval: Duration,
    on_detect: DetectCallback,
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
}

impl PresenceDetector {
    /// Create a detector; nothing runs until [`start`](Self::start)
    pub fn new(
        camera: Arc<Camera>,
        locator: Box<dyn FaceLocator>,
        thresholds: PresenceThresholds,
        poll_interval: Duration,
        on_detect: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        Self {
            camera,
            locator: Arc::new(Mutex::new(locator)),
            thresholds,
            poll_interval,
            on_detect: Arc::new(on_detect),
            shared: Arc::new(Shared::default()),
            thread: None,
        }
    }

    /// Begin polling frames
    ///
    /// Opens the shared camera if it is not running yet. Calling this on an
    /// active detector does nothing.
    ///
    /// # Errors
    ///
    /// Returns error if the camera cannot be opened
    pub fn start(&mut self) -> Result<()> {
        if self.is_active() {
            tracing::debug!("detection already active");
            return Ok(());
        }

        self.camera.start()?;

        let shared = Arc::new(Shared::default());
        shared.active.store(true, Ordering::Release);
        self.shared = Arc::clone(&shared);

        let camera = Arc::clone(&self.camera);
        let locator = Arc::clone(&self.locator);
        let on_detect = Arc::clone(&self.on_detect);
        let thresholds = self.thresholds;
        let poll_interval = self.poll_interval;

        let handle = std::thread::Builder::new()
            .name("presence".to_string())
            .spawn(move || {
                detection_loop(
                    &camera,
                    &locator,
                    &shared,
                    on_detect.as_ref(),
                    thresholds,
                    poll_interval,
                );
            })
            .map_err(|e| {
                self.shared.active.store(false, Ordering::Release);
                Error::Detector(format!("failed to spawn detection thread: {e}"))
            })?;

        self.thread = Some(handle);
        tracing::info!(
            threshold = thresholds.face_area_threshold,
            dwell_ms = thresholds.time_to_trigger.as_millis(),
            "detection started"
        );
        Ok(())
    }

    /// Halt detection; the camera keeps running
    pub fn stop(&mut self) {
        if !self.shared.active.swap(false, Ordering::AcqRel) && self.thread.is_none() {
            return;
        }

        if let Some(handle) = self.thread.take() {
            // The callback may stop its own detector from the poll thread
            if handle.thread().id() == std::thread::current().id() {
                tracing::debug!("stop requested from detection thread, not joining");
            } else {
                join_bounded(handle, STOP_TIMEOUT);
            }
        }

        // Leave the finished run's snapshot behind
        self.shared = Arc::new(Shared::default());
        tracing::info!("detection stopped (camera still running)");
    }

    /// Alias for [`stop`](Self::stop)
    pub fn pause(&mut self) {
        self.stop();
    }

    /// Alias for [`start`](Self::start)
    ///
    /// # Errors
    ///
    /// Returns error if the camera cannot be opened
    pub fn resume(&mut self) -> Result<()> {
        self.start()
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.shared.active.load(Ordering::Acquire)
    }

    /// Faces found in the most recent frame
    #[must_use]
    pub fn faces(&self) -> Vec<FaceBox> {
        lock(&self.shared.faces).clone()
    }

    #[must_use]
    pub fn status(&self) -> PresenceStatus {
        *lock(&self.shared.status)
    }
}

impl Drop for PresenceDetector {
    fn drop(&mut self) {
        self.stop();
    }
}

fn detection_loop(
    camera: &Camera,
    locator: &Mutex<Box<dyn FaceLocator>>,
    shared: &Shared,
    on_detect: &(dyn Fn() + Send + Sync),
    thresholds: PresenceThresholds,
    poll_interval: Duration,
) {
    tracing::debug!("detection loop started");
    let mut tracker = PresenceTracker::new(thresholds);

    while shared.active.load(Ordering::Acquire) {
        let now = Instant::now();
        let detection = camera
            .grab()
            .and_then(|frame| {
                let faces = lock(locator).locate(&frame)?;
                Ok((faces, frame.width, frame.height))
            });

        let fired = match detection {
            Ok((faces, width, height)) => {
                let fired = tracker.observe_faces(&faces, width, height, now);
                *lock(&shared.faces) = faces;
                fired
            }
            Err(e) => {
                tracing::debug!(error = %e, "frame skipped");
                tracker.observe_failure(now);
                lock(&shared.faces).clear();
                false
            }
        };
        *lock(&shared.status) = tracker.status();

        // A detached run must not fire after its detector was stopped
        if fired && shared.active.load(Ordering::Acquire) {
            tracing::info!("presence confirmed");
            if std::panic::catch_unwind(AssertUnwindSafe(on_detect)).is_err() {
                tracing::warn!("presence callback panicked");
            }
        }

        std::thread::sleep(poll_interval);
    }

    tracing::debug!("detection loop stopped");
}

/// Join `handle` if it finishes within `timeout`, otherwise detach it
fn join_bounded(handle: JoinHandle<()>, timeout: Duration) {
    let deadline = Instant::now() + timeout;
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            tracing::warn!(
                timeout_ms = timeout.as_millis(),
                "detection thread still busy, detaching it"
            );
            return;
        }
        std::thread::sleep(Duration::from_millis(5));
    }

    if handle.join().is_err() {
        tracing::warn!("detection thread panicked");
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
