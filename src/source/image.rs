use super::{FrameSample, FrameSource};
use crate::frame::{PixelFormat, Resolution, VideoFrame};
use anyhow::{Context, Result};
use std::path::Path;
use std::time::Instant;
use tracing::info;

/// A single image shown forever, with a wall clock as driving time.
pub struct ImageSource {
    frame: VideoFrame,
    started: Instant,
    loop_after: Option<f64>,
}

impl ImageSource {
    pub fn open(path: &Path, loop_after: Option<f64>) -> Result<Self> {
        let image = ::image::open(path)
            .with_context(|| format!("Failed to open image {:?}", path))?
            .to_rgba8();
        let (width, height) = image.dimensions();
        info!("Image source: {}x{} from {:?}", width, height, path);
        Ok(Self::from_frame(
            VideoFrame::from_data(width, height, PixelFormat::Rgba, image.into_raw()),
            loop_after,
        ))
    }

    pub fn from_frame(frame: VideoFrame, loop_after: Option<f64>) -> Self {
        Self {
            frame,
            started: Instant::now(),
            loop_after: loop_after.filter(|period| *period > 0.0),
        }
    }
}

/// Elapsed seconds, wrapped to the loop period when there is one.
fn playback_time(elapsed: f64, loop_after: Option<f64>) -> f64 {
    match loop_after {
        Some(period) => elapsed % period,
        None => elapsed,
    }
}

impl FrameSource for ImageSource {
    fn resolution(&self) -> Resolution {
        self.frame.resolution()
    }

    fn next_frame(&mut self) -> Option<FrameSample<'_>> {
        let elapsed = self.started.elapsed().as_secs_f64();
        Some(FrameSample {
            frame: &self.frame,
            time: playback_time(elapsed, self.loop_after),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loop_period_wraps_time() {
        assert_eq!(playback_time(2.5, None), 2.5);
        assert_eq!(playback_time(2.5, Some(1.0)), 0.5);
        assert_eq!(playback_time(0.75, Some(1.0)), 0.75);
    }

    #[test]
    fn non_positive_period_disables_looping() {
        let source = ImageSource::from_frame(VideoFrame::new(1, 1, PixelFormat::Rgba), Some(0.0));
        assert_eq!(source.loop_after, None);
    }

    #[test]
    fn opens_png_as_rgba() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.png");
        ::image::RgbImage::from_pixel(3, 2, ::image::Rgb([10, 20, 30])).save(&path).unwrap();

        let mut source = ImageSource::open(&path, None).unwrap();
        assert_eq!(source.resolution(), Resolution::new(3, 2));
        let sample = source.next_frame().unwrap();
        assert_eq!(sample.frame.format, PixelFormat::Rgba);
        assert_eq!(&sample.frame.data[0..4], &[10, 20, 30, 255]);
        assert!(sample.time >= 0.0);
    }
}
