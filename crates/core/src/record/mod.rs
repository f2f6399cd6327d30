//! Frame capture for offline runs.

use std::{
    fs,
    path::{Path, PathBuf},
};

use image::RgbaImage;
use serde::{Deserialize, Serialize};

use crate::{canvas::CanvasHandle, Result, VizError};

/// Configuration options for the recording subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingSettings {
    /// Directory that receives one image per captured frame.
    pub output_dir: String,
    /// Tick rate used when driving the loop offline.
    pub fps: u32,
    /// Capture every n-th frame.
    pub every_n_frames: u32,
}

impl Default for RecordingSettings {
    fn default() -> Self {
        Self {
            output_dir: "frames".to_string(),
            fps: 60,
            every_n_frames: 1,
        }
    }
}

impl RecordingSettings {
    pub fn validate(&self) -> Result<()> {
        if self.fps == 0 {
            return Err(VizError::Config("recording fps must be non-zero".into()));
        }
        if self.every_n_frames == 0 {
            return Err(VizError::Config("every_n_frames must be at least 1".into()));
        }
        Ok(())
    }
}

/// Writes surface snapshots as RGBA PNG images.
#[derive(Debug)]
pub struct FrameRecorder {
    settings: RecordingSettings,
    is_recording: bool,
    frames_written: u64,
}

impl FrameRecorder {
    pub fn new(settings: RecordingSettings) -> Self {
        Self {
            settings,
            is_recording: false,
            frames_written: 0,
        }
    }

    pub fn output_dir(&self) -> &Path {
        Path::new(&self.settings.output_dir)
    }

    pub fn start(&mut self) -> Result<()> {
        self.settings.validate()?;
        fs::create_dir_all(self.output_dir())?;
        self.is_recording = true;
        tracing::info!(dir = %self.settings.output_dir, every = self.settings.every_n_frames, "recording started");
        Ok(())
    }

    pub fn stop(&mut self) -> Result<()> {
        if self.is_recording {
            tracing::info!(frames = self.frames_written, "recording stopped");
        }
        self.is_recording = false;
        Ok(())
    }

    pub fn is_recording(&self) -> bool {
        self.is_recording
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Writes `canvas` if recording and `frame` (one-based) falls on the
    /// capture interval. Returns the written path.
    pub fn capture(&mut self, frame: u64, canvas: &CanvasHandle) -> Result<Option<PathBuf>> {
        if !self.is_recording || frame == 0 || frame % self.settings.every_n_frames as u64 != 0 {
            return Ok(None);
        }
        let path = self.output_dir().join(format!("frame_{frame:06}.png"));
        save_png(&path, canvas)?;
        self.frames_written += 1;
        tracing::trace!(path = %path.display(), "frame captured");
        Ok(Some(path))
    }
}

fn save_png(path: &Path, canvas: &CanvasHandle) -> Result<()> {
    let surface = canvas.surface();
    let image = RgbaImage::from_raw(surface.width(), surface.height(), surface.as_rgba().to_vec())
        .ok_or(VizError::InvalidInput("surface pixels do not match its size"))?;
    image.save(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Rgba;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("promptviz-{name}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn writes_png_on_the_capture_interval() {
        let dir = temp_dir("record");
        let mut recorder = FrameRecorder::new(RecordingSettings {
            output_dir: dir.display().to_string(),
            every_n_frames: 2,
            ..Default::default()
        });
        let canvas = CanvasHandle::new(2, 1);
        canvas.surface_mut().fill(Rgba::rgb(255, 0, 0));

        assert_eq!(recorder.capture(2, &canvas).unwrap(), None);
        recorder.start().unwrap();
        assert_eq!(recorder.capture(1, &canvas).unwrap(), None);
        let path = recorder.capture(2, &canvas).unwrap().unwrap();
        assert_eq!(path.file_name().unwrap(), "frame_000002.png");

        let image = image::open(&path).unwrap().to_rgba8();
        assert_eq!(image.dimensions(), (2, 1));
        assert_eq!(image.get_pixel(1, 0).0, [255, 0, 0, 255]);
        assert_eq!(recorder.frames_written(), 1);

        recorder.stop().unwrap();
        assert_eq!(recorder.capture(4, &canvas).unwrap(), None);
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn transparent_pixels_keep_their_alpha() {
        let dir = temp_dir("transparent");
        let mut recorder = FrameRecorder::new(RecordingSettings {
            output_dir: dir.display().to_string(),
            ..Default::default()
        });
        recorder.start().unwrap();
        let path = recorder.capture(1, &CanvasHandle::new(1, 1)).unwrap().unwrap();
        let image = image::open(path).unwrap().to_rgba8();
        assert_eq!(image.get_pixel(0, 0).0, [0, 0, 0, 0]);
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn zero_interval_is_rejected() {
        let mut recorder = FrameRecorder::new(RecordingSettings {
            every_n_frames: 0,
            ..Default::default()
        });
        assert!(recorder.start().is_err());
        assert!(!recorder.is_recording());
    }
}
