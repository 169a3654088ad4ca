//! Video decoding through the `ffmpeg` command-line tool.

use super::{FrameSample, FrameSource};
use crate::frame::{PixelFormat, Resolution, VideoFrame};
use anyhow::{anyhow, bail, Context, Result};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Stream properties reported by ffprobe.
#[derive(Debug, Clone, PartialEq)]
struct ProbeInfo {
    width: u32,
    height: u32,
    fps: f64,
    duration: Option<f64>,
}

/// Parses `key=value` lines from `ffprobe -of default=noprint_wrappers=1`.
fn parse_probe(output: &str) -> Result<ProbeInfo> {
    let mut width = None;
    let mut height = None;
    let mut fps = 30.0;
    let mut duration = None;

    for line in output.lines() {
        let Some((key, value)) = line.trim().split_once('=') else {
            continue;
        };
        match key {
            "width" => width = value.parse().ok(),
            "height" => height = value.parse().ok(),
            "r_frame_rate" => fps = parse_fps(value),
            "duration" => duration = value.parse().ok(),
            _ => {}
        }
    }

    match (width, height) {
        (Some(width), Some(height)) if width > 0 && height > 0 => Ok(ProbeInfo {
            width,
            height,
            fps: if fps > 0.0 { fps } else { 30.0 },
            duration,
        }),
        _ => Err(anyhow!("ffprobe reported no video size: {}", output.trim())),
    }
}

fn parse_fps(s: &str) -> f64 {
    if let Some((num, den)) = s.split_once('/') {
        let n: f64 = num.parse().unwrap_or(0.0);
        let d: f64 = den.parse().unwrap_or(1.0);
        if d == 0.0 {
            0.0
        } else {
            n / d
        }
    } else {
        s.parse().unwrap_or(30.0)
    }
}

struct DecodedFrame {
    frame: VideoFrame,
    /// Seconds from the start of this pass over the file.
    timestamp: f64,
    /// Incremented each time ffmpeg restarts the file.
    generation: u64,
}

/// Plays a video file in a loop, paced by the wall clock.
pub struct VideoSource {
    frame_rx: Receiver<DecodedFrame>,
    current: Option<DecodedFrame>,
    pending: Option<DecodedFrame>,
    resolution: Resolution,
    /// Wall-clock start of the generation currently playing.
    clock: Option<(Instant, u64)>,
    stop: Arc<AtomicBool>,
    _thread: JoinHandle<()>,
}

impl VideoSource {
    /// Probes the file and starts decoding in a background thread.
    pub fn open(path: &Path) -> Result<Self> {
        let path = path.to_path_buf();
        info!("Opening video via ffmpeg CLI: {:?}", path);

        let output = Command::new("ffprobe")
            .args([
                "-v",
                "error",
                "-select_streams",
                "v:0",
                "-show_entries",
                "stream=width,height,r_frame_rate,duration",
                "-of",
                "default=noprint_wrappers=1",
            ])
            .arg(&path)
            .output()
            .context("Failed to run ffprobe")?;
        if !output.status.success() {
            bail!("ffprobe failed: {}", String::from_utf8_lossy(&output.stderr));
        }

        let probe = parse_probe(&String::from_utf8(output.stdout)?)?;
        info!(
            "Video: {}x{}, {:.1}s, {:.1} fps",
            probe.width,
            probe.height,
            probe.duration.unwrap_or(0.0),
            probe.fps
        );

        // Bounded so decoding cannot run ahead of playback
        let (frame_tx, frame_rx) = mpsc::sync_channel(5);
        let stop = Arc::new(AtomicBool::new(false));
        let stop_signal = stop.clone();
        let decode_probe = probe.clone();
        let thread = thread::spawn(move || decode_loop(path, decode_probe, frame_tx, stop_signal));

        Ok(Self {
            frame_rx,
            current: None,
            pending: None,
            resolution: Resolution::new(probe.width, probe.height),
            clock: None,
            stop,
            _thread: thread,
        })
    }
}

fn decode_loop(path: PathBuf, probe: ProbeInfo, tx: SyncSender<DecodedFrame>, stop: Arc<AtomicBool>) {
    let frame_size = (probe.width * probe.height * 4) as usize;
    let frame_duration = 1.0 / probe.fps;
    let mut generation = 0u64;

    while !stop.load(Ordering::Relaxed) {
        info!("Starting ffmpeg process");

        // ffmpeg -i <file> -f image2pipe -pix_fmt rgba -vcodec rawvideo -
        let spawned = Command::new("ffmpeg")
            .arg("-i")
            .arg(&path)
            .args(["-f", "image2pipe", "-pix_fmt", "rgba", "-vcodec", "rawvideo", "-"])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn();
        let mut child = match spawned {
            Ok(c) => c,
            Err(e) => {
                error!("Failed to spawn ffmpeg: {}", e);
                thread::sleep(Duration::from_secs(1));
                continue;
            }
        };

        if let Some(mut stderr) = child.stderr.take() {
            thread::spawn(move || {
                let mut buf = [0u8; 1024];
                while let Ok(n) = stderr.read(&mut buf) {
                    if n == 0 {
                        break;
                    }
                    let msg = String::from_utf8_lossy(&buf[..n]);
                    for line in msg.lines().filter(|l| l.contains("Error") || l.contains("error")) {
                        error!("ffmpeg: {}", line);
                    }
                }
            });
        }

        let Some(mut stdout) = child.stdout.take() else {
            error!("ffmpeg has no stdout");
            let _ = child.kill();
            return;
        };

        let mut buffer = vec![0u8; frame_size];
        let mut frame_count = 0u64;
        loop {
            if stop.load(Ordering::Relaxed) {
                let _ = child.kill();
                return;
            }

            if let Err(e) = stdout.read_exact(&mut buffer) {
                if e.kind() != std::io::ErrorKind::UnexpectedEof {
                    warn!("Error reading from ffmpeg: {}", e);
                }
                break;
            }

            let decoded = DecodedFrame {
                frame: VideoFrame::from_data(probe.width, probe.height, PixelFormat::Rgba, buffer.clone()),
                timestamp: frame_count as f64 * frame_duration,
                generation,
            };
            frame_count += 1;

            if tx.send(decoded).is_err() {
                let _ = child.kill();
                return;
            }
        }

        let _ = child.wait();
        if frame_count == 0 {
            error!("ffmpeg produced no frames, retrying");
            thread::sleep(Duration::from_secs(1));
        } else {
            info!("Video loop restarting");
        }
        generation += 1;
    }
}

impl FrameSource for VideoSource {
    fn resolution(&self) -> Resolution {
        self.resolution
    }

    fn next_frame(&mut self) -> Option<FrameSample<'_>> {
        let now = Instant::now();

        loop {
            let candidate = match self.pending.take() {
                Some(frame) => frame,
                None => match self.frame_rx.try_recv() {
                    Ok(frame) => frame,
                    Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
                },
            };

            let started = match self.clock {
                Some((started, generation)) if generation == candidate.generation => started,
                _ => {
                    self.clock = Some((now, candidate.generation));
                    now
                }
            };

            let playback = now.duration_since(started).as_secs_f64();
            if candidate.timestamp <= playback {
                // Late frames are skipped in favour of newer ones
                self.current = Some(candidate);
            } else {
                self.pending = Some(candidate);
                break;
            }
        }

        self.current.as_ref().map(|decoded| FrameSample {
            frame: &decoded.frame,
            time: decoded.timestamp,
        })
    }
}

impl Drop for VideoSource {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fractional_frame_rates() {
        assert_eq!(parse_fps("30/1"), 30.0);
        assert!((parse_fps("30000/1001") - 29.97).abs() < 0.01);
        assert_eq!(parse_fps("25"), 25.0);
        assert_eq!(parse_fps("0/0"), 0.0);
    }

    #[test]
    fn parses_probe_output() {
        let probe = parse_probe("width=1920\nheight=1080\nr_frame_rate=24/1\nduration=12.5\n").unwrap();
        assert_eq!(
            probe,
            ProbeInfo {
                width: 1920,
                height: 1080,
                fps: 24.0,
                duration: Some(12.5),
            }
        );
    }

    #[test]
    fn probe_tolerates_missing_duration() {
        let probe = parse_probe("width=640\nheight=480\nr_frame_rate=0/0\nduration=N/A\n").unwrap();
        assert_eq!(probe.duration, None);
        assert_eq!(probe.fps, 30.0);
    }

    #[test]
    fn probe_without_size_is_an_error() {
        assert!(parse_probe("r_frame_rate=30/1\n").is_err());
    }
}
