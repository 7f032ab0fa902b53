// THEORY:
// A small lane-region detector, used by the `lane_tuner` binary so that a
// tuning run can be exercised end to end without an external pipeline. Painted lane
// markings are the brightest things on a road surface, so it thresholds luminance
// below a horizon line and spans a trapezoid from the narrowest bright row at the top
// to the widest bright row at the bottom.
//
// All of its knobs are read from the live configuration on every frame, which makes
// them tunable:
// - `luma_threshold`: minimum Rec. 601 luminance (0..255) of a marking pixel.
// - `min_area_fraction`: share of the searched area that must be bright before
//   anything is reported.
// - `horizon_fraction`: rows above `height * horizon_fraction` are ignored.

use crate::core_modules::frame_pipeline::Frame;
use crate::core_modules::live_config::LiveConfig;
use crate::core_modules::quality::Quad;
use crate::scoring::Detector;

pub const LUMA_THRESHOLD_KEY: &str = "luma_threshold";
pub const MIN_AREA_FRACTION_KEY: &str = "min_area_fraction";
pub const HORIZON_FRACTION_KEY: &str = "horizon_fraction";

/// Defaults used for any knob the live configuration does not hold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BrightRegionDetector {
    pub luma_threshold: f64,
    pub min_area_fraction: f64,
    pub horizon_fraction: f64,
}

impl Default for BrightRegionDetector {
    fn default() -> Self {
        Self {
            luma_threshold: 200.0,
            min_area_fraction: 0.002,
            horizon_fraction: 0.5,
        }
    }
}

/// Extent of the bright pixels found on one row.
#[derive(Debug, Clone, Copy)]
struct RowSpan {
    y: u32,
    left: u32,
    right: u32,
}

fn luminance(r: u8, g: u8, b: u8) -> f64 {
    0.299 * r as f64 + 0.587 * g as f64 + 0.114 * b as f64
}

impl Detector for BrightRegionDetector {
    fn detect(&mut self, frame: &Frame, config: &LiveConfig) -> Option<Quad> {
        let threshold = config.get_or(LUMA_THRESHOLD_KEY, self.luma_threshold);
        let min_fraction = config.get_or(MIN_AREA_FRACTION_KEY, self.min_area_fraction);
        let horizon = config.get_or(HORIZON_FRACTION_KEY, self.horizon_fraction).clamp(0.0, 1.0);

        let (width, height) = frame.dimensions();
        let start_row = ((height as f64 * horizon) as u32).min(height);
        let searched = width as u64 * (height - start_row) as u64;
        if searched == 0 {
            return None;
        }

        let mut bright = 0u64;
        let mut top: Option<RowSpan> = None;
        let mut bottom: Option<RowSpan> = None;
        for y in start_row..height {
            let mut span: Option<RowSpan> = None;
            for x in 0..width {
                let p = frame.get_pixel(x, y);
                if luminance(p[0], p[1], p[2]) < threshold {
                    continue;
                }
                bright += 1;
                span = Some(match span {
                    Some(s) => RowSpan { right: x, ..s },
                    None => RowSpan { y, left: x, right: x },
                });
            }
            if let Some(s) = span {
                if top.is_none() {
                    top = Some(s);
                }
                bottom = Some(s);
            }
        }

        if (bright as f64) < min_fraction * searched as f64 {
            return None;
        }
        let (top, bottom) = (top?, bottom?);
        Some(Quad::new([
            (top.left as f64, top.y as f64),
            (top.right as f64, top.y as f64),
            (bottom.right as f64, bottom.y as f64),
            (bottom.left as f64, bottom.y as f64),
        ]))
    }
}
