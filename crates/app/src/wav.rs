use std::path::Path;

use hound::{SampleFormat, WavReader};
use promptviz_core::{Result, VizError};

/// A WAV file downmixed to mono `f32` samples.
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    pub sample_rate: u32,
    pub samples: Vec<f32>,
}

impl DecodedAudio {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let mut reader = WavReader::open(path.as_ref()).map_err(wav_error)?;
        let spec = reader.spec();
        let channels = spec.channels as usize;
        if channels == 0 {
            return Err(VizError::InvalidInput("WAV file declares zero channels"));
        }

        let interleaved: Vec<f32> = match spec.sample_format {
            SampleFormat::Float => reader
                .samples::<f32>()
                .collect::<std::result::Result<_, _>>()
                .map_err(wav_error)?,
            SampleFormat::Int => {
                let scale = (1_i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<std::result::Result<_, _>>()
                    .map_err(wav_error)?
            }
        };

        let samples = interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect();

        Ok(Self {
            sample_rate: spec.sample_rate,
            samples,
        })
    }

    pub fn duration_seconds(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate.max(1) as f64
    }

    /// Samples covering frame `index` at `fps`, empty past the end.
    ///
    /// Boundaries are computed per frame, so rates that do not divide the
    /// sample rate stay aligned with the audio.
    pub fn frame_block(&self, index: u64, fps: u32) -> &[f32] {
        let boundary = |frame: u64| {
            let sample = frame.saturating_mul(self.sample_rate as u64) / fps.max(1) as u64;
            usize::try_from(sample)
                .unwrap_or(usize::MAX)
                .min(self.samples.len())
        };
        let start = boundary(index);
        let end = boundary(index.saturating_add(1)).max(start);
        &self.samples[start..end]
    }
}

fn wav_error(err: hound::Error) -> VizError {
    match err {
        hound::Error::IoError(io) => VizError::Io(io),
        other => VizError::msg(format!("failed to decode WAV: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_stereo(path: &Path) {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for _ in 0..800 {
            writer.write_sample(i16::MAX).unwrap();
            writer.write_sample(0_i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn stereo_is_downmixed_and_split_into_frames() {
        let path = std::env::temp_dir().join(format!("promptviz-wav-{}.wav", std::process::id()));
        write_stereo(&path);
        let audio = DecodedAudio::load(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(audio.sample_rate, 8000);
        assert_eq!(audio.samples.len(), 800);
        assert!((audio.samples[0] - 0.5).abs() < 1e-3);
        assert!((audio.duration_seconds() - 0.1).abs() < 1e-9);

        assert_eq!(audio.frame_block(0, 40).len(), 200);
        assert_eq!(audio.frame_block(3, 40).len(), 200);
        assert!(audio.frame_block(4, 40).is_empty());
    }

    #[test]
    fn frame_blocks_stay_aligned_when_fps_does_not_divide_the_rate() {
        let audio = DecodedAudio {
            sample_rate: 44_100,
            samples: vec![0.0; 44_100],
        };
        let total: usize = (0..144).map(|i| audio.frame_block(i, 144).len()).sum();
        assert_eq!(total, 44_100);
        assert_eq!(audio.frame_block(0, 144).len(), 306);
        assert_eq!(audio.frame_block(1, 144).len(), 306);
        assert_eq!(audio.frame_block(2, 144).len(), 306);
        assert_eq!(audio.frame_block(3, 144).len(), 307);
        assert!(audio.frame_block(144, 144).is_empty());
    }
}
