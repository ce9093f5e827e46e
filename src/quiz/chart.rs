//! Compass charts
//!
//! The plane spans -11..=11 on both axes. Quadrant backgrounds are shaded
//! within the -10..=10 score range and the axes are drawn dashed. The
//! result chart marks one student with a cross; the collective chart plots
//! every logged result as a translucent dot.

use std::io::Cursor;
use std::path::Path;

use image::{ImageFormat, Rgb, RgbImage};

use super::{AXIS_LIMIT, Coordinate, Quadrant};
use crate::Result;

/// Result chart file written next to the quiz log
pub const RESULT_CHART: &str = "quiz_result.png";

/// Collective chart file written next to the quiz log
pub const COLLECTIVE_CHART: &str = "quiz_collective.png";

/// Result chart size in pixels
pub const RESULT_CHART_SIZE: (u32, u32) = (720, 720);

/// Collective chart size in pixels
pub const COLLECTIVE_CHART_SIZE: (u32, u32) = (800, 550);

/// Visible range on each side of the origin
const VIEW_LIMIT: f64 = 11.0;

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const AXIS: Rgb<u8> = Rgb([0x54, 0x6E, 0x7A]);
const EDGE: Rgb<u8> = Rgb([255, 255, 255]);
const RESULT_MARK: Rgb<u8> = Rgb([0xD3, 0x2F, 0x2F]);
const CROWD_MARK: Rgb<u8> = Rgb([0x1F, 0x6A, 0xA5]);

const SHADE_ALPHA: f64 = 0.6;
const CROWD_ALPHA: f64 = 0.6;

/// Dash and gap length of the axes, in pixels
const DASH: u32 = 8;

const CROSS_HALF: f64 = 14.0;
const CROSS_WIDTH: f64 = 3.0;
const DOT_RADIUS: f64 = 8.0;
const EDGE_WIDTH: f64 = 1.5;

/// Background shade of a quadrant
#[must_use]
pub const fn shade(quadrant: Quadrant) -> Rgb<u8> {
    match quadrant {
        Quadrant::Cti => Rgb([0xE3, 0xF2, 0xFD]),
        Quadrant::Aia => Rgb([0xF3, 0xE5, 0xF5]),
        Quadrant::Etti => Rgb([0xE0, 0xF2, 0xF1]),
        Quadrant::Electrical => Rgb([0xFF, 0xF3, 0xE0]),
    }
}

/// One student's position on the compass
#[must_use]
pub fn result_chart(point: Coordinate) -> RgbImage {
    let mut canvas = Canvas::plane(RESULT_CHART_SIZE);
    canvas.cross(point, RESULT_MARK);
    canvas.image
}

/// Every logged position on one compass
#[must_use]
pub fn collective_chart(points: &[Coordinate]) -> RgbImage {
    let mut canvas = Canvas::plane(COLLECTIVE_CHART_SIZE);
    for &point in points {
        canvas.dot(point, CROWD_MARK, CROWD_ALPHA);
    }
    canvas.image
}

/// Encode a chart as PNG bytes
///
/// # Errors
///
/// Returns error if encoding fails
pub fn encode_png(chart: &RgbImage) -> Result<Vec<u8>> {
    let mut bytes = Cursor::new(Vec::new());
    chart.write_to(&mut bytes, ImageFormat::Png)?;
    Ok(bytes.into_inner())
}

/// Write a chart to `path` as PNG
///
/// # Errors
///
/// Returns error if the directory or file cannot be written
pub fn save(chart: &RgbImage, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    chart.save_with_format(path, ImageFormat::Png)?;
    tracing::debug!(path = %path.display(), "chart written");
    Ok(())
}

/// Pixel position of a plane coordinate in a chart of `size`
#[must_use]
pub fn to_pixel(size: (u32, u32), point: Coordinate) -> (f64, f64) {
    let span = 2.0 * VIEW_LIMIT;
    (
        (point.x + VIEW_LIMIT) / span * f64::from(size.0),
        (VIEW_LIMIT - point.y) / span * f64::from(size.1),
    )
}

struct Canvas {
    image: RgbImage,
}

impl Canvas {
    /// Blank plane with shaded quadrants and dashed axes
    fn plane(size: (u32, u32)) -> Self {
        let mut canvas = Self {
            image: RgbImage::from_pixel(size.0, size.1, BACKGROUND),
        };

        for (quadrant, x, y) in [
            (Quadrant::Cti, 0.0, 0.0),
            (Quadrant::Aia, -AXIS_LIMIT, 0.0),
            (Quadrant::Etti, 0.0, -AXIS_LIMIT),
            (Quadrant::Electrical, -AXIS_LIMIT, -AXIS_LIMIT),
        ] {
            canvas.shade_square(x, y, shade(quadrant));
        }

        canvas.dashed_axes();
        canvas
    }

    fn size(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Shade the `AXIS_LIMIT` square whose lower-left corner is (`x`, `y`)
    fn shade_square(&mut self, x: f64, y: f64, color: Rgb<u8>) {
        let size = self.size();
        let (left, top) = to_pixel(size, Coordinate { x, y: y + AXIS_LIMIT });
        let (right, bottom) = to_pixel(size, Coordinate { x: x + AXIS_LIMIT, y });

        for py in round(top)..round(bottom) {
            for px in round(left)..round(right) {
                self.blend(px, py, color, SHADE_ALPHA);
            }
        }
    }

    fn dashed_axes(&mut self) {
        let (width, height) = self.size();
        let (ox, oy) = to_pixel((width, height), Coordinate { x: 0.0, y: 0.0 });
        let (ox, oy) = (round(ox), round(oy));

        for x in (0..width).filter(|x| (x / DASH) % 2 == 0) {
            self.blend(i64::from(x), oy, AXIS, 1.0);
        }
        for y in (0..height).filter(|y| (y / DASH) % 2 == 0) {
            self.blend(ox, i64::from(y), AXIS, 1.0);
        }
    }

    /// Diagonal cross with a white outline
    fn cross(&mut self, point: Coordinate, color: Rgb<u8>) {
        let on_cross = |dx: f64, dy: f64, width: f64| {
            let reach = CROSS_HALF + width - CROSS_WIDTH;
            dx.abs() <= reach
                && dy.abs() <= reach
                && ((dx - dy).abs() <= width * std::f64::consts::SQRT_2
                    || (dx + dy).abs() <= width * std::f64::consts::SQRT_2)
        };

        let outline = CROSS_WIDTH + EDGE_WIDTH;
        self.stamp(point, CROSS_HALF + outline, |dx, dy| {
            if on_cross(dx, dy, CROSS_WIDTH) {
                Some(color)
            } else if on_cross(dx, dy, outline) {
                Some(EDGE)
            } else {
                None
            }
        });
    }

    /// Filled disc with a white rim
    fn dot(&mut self, point: Coordinate, color: Rgb<u8>, alpha: f64) {
        let size = self.size();
        let (cx, cy) = to_pixel(size, point);
        let reach = DOT_RADIUS + EDGE_WIDTH;

        for py in round(cy - reach)..=round(cy + reach) {
            for px in round(cx - reach)..=round(cx + reach) {
                #[allow(clippy::cast_precision_loss)]
                let d = (px as f64 - cx).hypot(py as f64 - cy);
                if d <= DOT_RADIUS {
                    self.blend(px, py, color, alpha);
                } else if d <= reach {
                    self.blend(px, py, EDGE, alpha);
                }
            }
        }
    }

    /// Paint every pixel within `reach` of `point` that `paint` colors
    fn stamp(
        &mut self,
        point: Coordinate,
        reach: f64,
        paint: impl Fn(f64, f64) -> Option<Rgb<u8>>,
    ) {
        let (cx, cy) = to_pixel(self.size(), point);
        for py in round(cy - reach)..=round(cy + reach) {
            for px in round(cx - reach)..=round(cx + reach) {
                #[allow(clippy::cast_precision_loss)]
                let (dx, dy) = (px as f64 - cx, py as f64 - cy);
                if let Some(color) = paint(dx, dy) {
                    self.blend(px, py, color, 1.0);
                }
            }
        }
    }

    /// Mix `color` into the pixel at (`x`, `y`); off-canvas writes are dropped
    fn blend(&mut self, x: i64, y: i64, color: Rgb<u8>, alpha: f64) {
        let (Ok(x), Ok(y)) = (u32::try_from(x), u32::try_from(y)) else {
            return;
        };
        let (width, height) = self.size();
        if x >= width || y >= height {
            return;
        }

        let pixel = self.image.get_pixel_mut(x, y);
        for (channel, target) in pixel.0.iter_mut().zip(color.0) {
            *channel = mix(*channel, target, alpha);
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
fn round(v: f64) -> i64 {
    v.round() as i64
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn mix(base: u8, top: u8, alpha: f64) -> u8 {
    let alpha = alpha.clamp(0.0, 1.0);
    (f64::from(base) * (1.0 - alpha) + f64::from(top) * alpha)
        .round()
        .clamp(0.0, 255.0) as u8
}
