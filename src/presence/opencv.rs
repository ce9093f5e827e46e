//! Camera device and Haar cascade backends (feature `camera`)

use std::path::Path;

use opencv::core::{self, Mat, Rect, Size, Vector};
use opencv::prelude::*;
use opencv::{imgproc, objdetect, videoio};

use super::camera::FrameSource;
use super::{FaceBox, FaceLocator, GrayFrame};
use crate::{Error, Result};

/// Capture resolution requested from the device
const CAPTURE_SIZE: (f64, f64) = (640.0, 480.0);

fn camera_err(e: &opencv::Error) -> Error {
    Error::Camera(e.to_string())
}

/// Log a rejected capture property; returns whether the device took it
fn capture_size_applied(name: &str, value: f64, result: opencv::Result<bool>) -> bool {
    match result {
        Ok(true) => true,
        Ok(false) => {
            tracing::debug!(property = name, value, "camera ignored capture size");
            false
        }
        Err(e) => {
            tracing::debug!(property = name, value, error = %e, "failed to set capture size");
            false
        }
    }
}

/// A V4L (or any OpenCV-supported) video device
pub struct DeviceSource {
    index: i32,
    size: (u32, u32),
    capture: Option<videoio::VideoCapture>,
    frame: Mat,
}

impl DeviceSource {
    /// Source for device `index`, producing frames of `size`
    #[must_use]
    pub fn new(index: i32, size: (u32, u32)) -> Self {
        Self {
            index,
            size,
            capture: None,
            frame: Mat::default(),
        }
    }
}

impl FrameSource for DeviceSource {
    fn open(&mut self) -> Result<()> {
        let mut capture =
            videoio::VideoCapture::new(self.index, videoio::CAP_ANY).map_err(|e| camera_err(&e))?;
        if !capture.is_opened().map_err(|e| camera_err(&e))? {
            return Err(Error::Camera(format!(
                "could not open camera device {}",
                self.index
            )));
        }

        for (property, name, value) in [
            (videoio::CAP_PROP_FRAME_WIDTH, "width", CAPTURE_SIZE.0),
            (videoio::CAP_PROP_FRAME_HEIGHT, "height", CAPTURE_SIZE.1),
        ] {
            capture_size_applied(name, value, capture.set(property, value));
        }

        tracing::info!(index = self.index, "camera device opened");
        self.capture = Some(capture);
        Ok(())
    }

    fn capture(&mut self) -> Result<GrayFrame> {
        let capture = self
            .capture
            .as_mut()
            .ok_or_else(|| Error::Camera("device not opened".to_string()))?;

        if !capture.read(&mut self.frame).map_err(|e| camera_err(&e))? || self.frame.empty() {
            return Err(Error::Camera("empty frame".to_string()));
        }

        let mut gray = Mat::default();
        imgproc::cvt_color(&self.frame, &mut gray, imgproc::COLOR_BGR2GRAY, 0)
            .map_err(|e| camera_err(&e))?;

        let (width, height) = self.size;
        let target = Size::new(
            i32::try_from(width).unwrap_or(i32::MAX),
            i32::try_from(height).unwrap_or(i32::MAX),
        );
        let mut small = Mat::default();
        imgproc::resize(&gray, &mut small, target, 0.0, 0.0, imgproc::INTER_LINEAR)
            .map_err(|e| camera_err(&e))?;

        let data = small.data_bytes().map_err(|e| camera_err(&e))?.to_vec();
        GrayFrame::new(width, height, data)
    }

    fn close(&mut self) {
        if let Some(mut capture) = self.capture.take() {
            if let Err(e) = capture.release() {
                tracing::warn!(error = %e, "camera release failed");
            }
        }
    }
}

/// Frontal-face Haar cascade
pub struct CascadeLocator {
    classifier: objdetect::CascadeClassifier,
    scale_factor: f64,
    min_neighbors: i32,
}

impl CascadeLocator {
    /// Load the first cascade file that exists in `paths`
    ///
    /// # Errors
    ///
    /// Returns error if no path holds a loadable cascade
    pub fn load<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
        for path in paths {
            let path = path.as_ref();
            if !path.exists() {
                continue;
            }

            let Some(path_str) = path.to_str() else {
                continue;
            };

            match objdetect::CascadeClassifier::new(path_str) {
                Ok(classifier) if !classifier.empty().unwrap_or(true) => {
                    tracing::info!(path = %path.display(), "face cascade loaded");
                    return Ok(Self {
                        classifier,
                        scale_factor: 1.1,
                        min_neighbors: 5,
                    });
                }
                Ok(_) => tracing::warn!(path = %path.display(), "face cascade is empty"),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "face cascade failed to load");
                }
            }
        }

        Err(Error::Detector("no usable face cascade found".to_string()))
    }
}

impl FaceLocator for CascadeLocator {
    fn locate(&mut self, frame: &GrayFrame) -> Result<Vec<FaceBox>> {
        let detector_err = |e: opencv::Error| Error::Detector(e.to_string());

        let rows = i32::try_from(frame.height).map_err(|e| Error::Detector(e.to_string()))?;
        let cols = i32::try_from(frame.width).map_err(|e| Error::Detector(e.to_string()))?;
        let mut gray =
            Mat::new_rows_cols_with_default(rows, cols, core::CV_8UC1, core::Scalar::all(0.0))
                .map_err(detector_err)?;
        gray.data_bytes_mut().map_err(detector_err)?.copy_from_slice(&frame.data);

        let mut faces = Vector::<Rect>::new();
        self.classifier
            .detect_multi_scale(
                &gray,
                &mut faces,
                self.scale_factor,
                self.min_neighbors,
                0,
                Size::new(30, 30),
                Size::new(0, 0),
            )
            .map_err(detector_err)?;

        let to_u32 = |v: i32| u32::try_from(v).unwrap_or(0);
        Ok(faces
            .iter()
            .map(|r| FaceBox::new(to_u32(r.x), to_u32(r.y), to_u32(r.width), to_u32(r.height)))
            .collect())
    }
}
