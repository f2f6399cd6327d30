use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{RecordingSettings, Result, VizError};

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub audio: AudioConfig,
    pub render: RenderConfig,
    pub recording: RecordingSettings,
}

impl AppConfig {
    /// Reads a JSON configuration file. Missing fields fall back to defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: AppConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        tracing::debug!(path = %path.as_ref().display(), "loaded configuration");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.audio.validate()?;
        self.render.validate()?;
        self.recording.validate()
    }
}

/// Configuration specific to the audio subsystem.
///
/// The analyser fields follow the Web Audio `AnalyserNode` model so that
/// generated code sees the byte ranges it was written against.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    /// Time-domain window length. The frequency buffer holds half as many bins.
    pub fft_size: usize,
    pub smoothing_time_constant: f32,
    pub min_decibels: f32,
    pub max_decibels: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            fft_size: 256,
            smoothing_time_constant: 0.8,
            min_decibels: -100.0,
            max_decibels: -30.0,
        }
    }
}

pub const MIN_FFT_SIZE: usize = 32;
pub const MAX_FFT_SIZE: usize = 32_768;

impl AudioConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.fft_size.is_power_of_two()
            || !(MIN_FFT_SIZE..=MAX_FFT_SIZE).contains(&self.fft_size)
        {
            return Err(VizError::Config(format!(
                "fft_size must be a power of two between {MIN_FFT_SIZE} and {MAX_FFT_SIZE}, got {}",
                self.fft_size
            )));
        }
        if self.sample_rate == 0 {
            return Err(VizError::Config("sample_rate must be non-zero".into()));
        }
        if !(0.0..=1.0).contains(&self.smoothing_time_constant) {
            return Err(VizError::Config(format!(
                "smoothing_time_constant must be within 0..=1, got {}",
                self.smoothing_time_constant
            )));
        }
        if self.min_decibels >= self.max_decibels {
            return Err(VizError::Config(format!(
                "min_decibels ({}) must be below max_decibels ({})",
                self.min_decibels, self.max_decibels
            )));
        }
        Ok(())
    }

    pub fn frequency_bin_count(&self) -> usize {
        self.fft_size / 2
    }
}

/// Knobs for surfaces, renderers and script execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Surface size used while the container has not been measured yet.
    pub default_width: u32,
    pub default_height: u32,
    pub pixel_ratio: f32,
    pub antialias: bool,
    pub alpha: bool,
    /// Clear the canvas before each 2D invocation.
    pub clear_each_frame: bool,
    /// How many leading characters the mode detector inspects.
    pub mode_probe_chars: usize,
    /// Rhai operation budget per invocation. Zero disables the limit.
    pub max_operations: u64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            default_width: 300,
            default_height: 150,
            pixel_ratio: 1.0,
            antialias: true,
            alpha: true,
            clear_each_frame: true,
            mode_probe_chars: crate::mode::DEFAULT_PROBE_CHARS,
            max_operations: 0,
        }
    }
}

impl RenderConfig {
    pub fn validate(&self) -> Result<()> {
        if self.default_width == 0 || self.default_height == 0 {
            return Err(VizError::Config(
                "default surface dimensions must be non-zero".into(),
            ));
        }
        if !(self.pixel_ratio.is_finite() && self.pixel_ratio > 0.0) {
            return Err(VizError::Config(format!(
                "pixel_ratio must be positive, got {}",
                self.pixel_ratio
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_browser_analyser() {
        let config = AppConfig::default();
        assert_eq!(config.audio.fft_size, 256);
        assert_eq!(config.audio.frequency_bin_count(), 128);
        assert_eq!(config.render.default_width, 300);
        assert_eq!(config.render.default_height, 150);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{ "audio": { "fft_size": 1024 } }"#).unwrap();
        assert_eq!(config.audio.fft_size, 1024);
        assert_eq!(config.audio.sample_rate, 48_000);
        assert!(config.render.clear_each_frame);
    }

    #[test]
    fn rejects_non_power_of_two_fft() {
        let audio = AudioConfig {
            fft_size: 300,
            ..Default::default()
        };
        let err = audio.validate().unwrap_err();
        assert!(format!("{err}").contains("fft_size"));
    }

    #[test]
    fn rejects_inverted_decibel_range() {
        let audio = AudioConfig {
            min_decibels: -10.0,
            max_decibels: -20.0,
            ..Default::default()
        };
        assert!(audio.validate().is_err());
    }

    #[test]
    fn loads_from_file() {
        let path = std::env::temp_dir().join(format!("promptviz-config-{}.json", std::process::id()));
        std::fs::write(&path, r#"{ "render": { "default_width": 640, "default_height": 360 } }"#)
            .unwrap();
        let config = AppConfig::load(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(config.render.default_width, 640);
        assert_eq!(config.render.default_height, 360);
    }
}
