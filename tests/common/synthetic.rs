use image::{Rgba, RgbaImage};
use lane_tuner::{Detection, DetectionResult, Frame, FrameSource, LiveConfig, Quad};
use lane_tuner::sources::MemorySource;
use lane_tuner::Result;

/// A dark road with one bright rectangular marking covering `x0..x1` by `y0..y1`.
pub fn road_frame(width: u32, height: u32, marking: (u32, u32, u32, u32)) -> Frame {
    let (x0, y0, x1, y1) = marking;
    assert!(x1 <= width && y1 <= height, "marking must fit in the frame");
    let mut frame = RgbaImage::from_pixel(width, height, Rgba([40, 40, 40, 255]));
    for y in y0..y1 {
        for x in x0..x1 {
            frame.put_pixel(x, y, Rgba([240, 240, 240, 255]));
        }
    }
    frame
}

/// `count` blank frames in one boxed source.
pub fn blank_source(name: &str, count: usize) -> Box<dyn FrameSource> {
    Box::new(MemorySource::new(name, vec![RgbaImage::new(4, 4); count]))
}

/// A scorer that detects on every frame with a quality that peaks at `peaks`.
///
/// Quality is `100 - sum((value - peak)^2)` over the named live values.
pub fn peak_scorer(peaks: Vec<(&'static str, f64)>) -> impl FnMut(&Frame, &LiveConfig) -> DetectionResult {
    move |_frame, config| {
        let penalty: f64 = peaks
            .iter()
            .map(|(name, peak)| {
                let value = config.get(name).unwrap_or(0.0);
                (value - peak) * (value - peak)
            })
            .sum();
        Some(Detection {
            shape: Quad::new([(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)]),
            quality: 100.0 - penalty,
        })
    }
}

/// A scorer whose quality equals the live value of `name`.
pub fn rising_scorer(name: &'static str) -> impl FnMut(&Frame, &LiveConfig) -> DetectionResult {
    move |_frame, config| {
        Some(Detection {
            shape: Quad::new([(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)]),
            quality: config.get(name).unwrap_or(0.0),
        })
    }
}

/// Announces `announced` frames but only ever yields `yields` blank ones.
pub struct ShortSource {
    pub announced: u64,
    pub yields: u64,
    pub next: u64,
}

impl FrameSource for ShortSource {
    fn name(&self) -> &str {
        "short"
    }

    fn frame_count(&self) -> u64 {
        self.announced
    }

    fn rewind(&mut self) -> Result<()> {
        self.next = 0;
        Ok(())
    }

    fn read_frame(&mut self) -> Result<Option<Frame>> {
        if self.next >= self.yields {
            return Ok(None);
        }
        self.next += 1;
        Ok(Some(RgbaImage::new(4, 4)))
    }
}
