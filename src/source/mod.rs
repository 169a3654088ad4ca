//! Frame sources that drive the pipeline: a frame plus its playback time.

mod image;
mod video;

pub use self::image::ImageSource;
pub use self::video::VideoSource;

use crate::frame::{Resolution, VideoFrame};
use anyhow::Result;
use std::path::Path;

/// A frame to render and the playback time it belongs to.
#[derive(Debug, Clone, Copy)]
pub struct FrameSample<'a> {
    pub frame: &'a VideoFrame,
    /// Seconds since the source (re)started; goes back to zero when it loops.
    pub time: f64,
}

pub trait FrameSource {
    fn resolution(&self) -> Resolution;

    /// Latest frame due for display, or `None` before the first one arrives.
    fn next_frame(&mut self) -> Option<FrameSample<'_>>;
}

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "bmp"];

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

/// Opens a still image or, for anything else, a video via ffmpeg.
pub fn open(path: &Path, loop_after: Option<f64>) -> Result<Box<dyn FrameSource>> {
    if is_image(path) {
        Ok(Box::new(ImageSource::open(path, loop_after)?))
    } else {
        Ok(Box::new(VideoSource::open(path)?))
    }
}
