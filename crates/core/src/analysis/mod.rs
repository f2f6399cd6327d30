use std::{f32::consts::PI, fmt, sync::Arc};

use realfft::{num_complex::Complex32, RealFftPlanner, RealToComplex};

use crate::{AudioConfig, Result};

/// Byte value the time-domain buffer reports for silence.
pub const SILENCE_BYTE: u8 = 128;

/// Live spectrum analyser with the byte-level semantics of the Web Audio
/// `AnalyserNode`: a window of the latest `fft_size` samples, Blackman
/// windowing, temporal smoothing across reads and a decibel range mapped
/// onto `0..=255`.
pub struct Analyser {
    fft_size: usize,
    smoothing: f32,
    min_decibels: f32,
    max_decibels: f32,
    ring: Vec<f32>,
    write_pos: usize,
    window: Vec<f32>,
    smoothed: Vec<f32>,
    fft_planner: RealFftPlanner<f32>,
    fft: Option<FftResources>,
}

impl Analyser {
    pub fn new(config: &AudioConfig) -> Result<Self> {
        config.validate()?;
        let fft_size = config.fft_size;
        Ok(Self {
            fft_size,
            smoothing: config.smoothing_time_constant,
            min_decibels: config.min_decibels,
            max_decibels: config.max_decibels,
            ring: vec![0.0; fft_size],
            write_pos: 0,
            window: (0..fft_size).map(|i| blackman_value(i, fft_size)).collect(),
            smoothed: vec![0.0; fft_size / 2],
            fft_planner: RealFftPlanner::new(),
            fft: None,
        })
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    pub fn frequency_bin_count(&self) -> usize {
        self.fft_size / 2
    }

    /// Forgets captured audio and smoothing history.
    pub fn reset(&mut self) {
        self.ring.fill(0.0);
        self.write_pos = 0;
        self.smoothed.fill(0.0);
    }

    /// Appends mono samples; only the latest `fft_size` are retained.
    pub fn push_samples(&mut self, samples: &[f32]) {
        let skip = samples.len().saturating_sub(self.fft_size);
        for &sample in &samples[skip..] {
            self.ring[self.write_pos] = if sample.is_finite() { sample } else { 0.0 };
            self.write_pos = (self.write_pos + 1) % self.fft_size;
        }
    }

    /// Copies the retained window, oldest sample first.
    pub fn float_time_domain(&self, out: &mut [f32]) {
        for (i, slot) in out.iter_mut().take(self.fft_size).enumerate() {
            *slot = self.ring[(self.write_pos + i) % self.fft_size];
        }
    }

    /// Waveform bytes: `128 * (1 + sample)`, clamped.
    pub fn byte_time_domain(&self, out: &mut [u8]) {
        for (i, slot) in out.iter_mut().take(self.fft_size).enumerate() {
            let sample = self.ring[(self.write_pos + i) % self.fft_size];
            *slot = (128.0 * (1.0 + sample)).floor().clamp(0.0, 255.0) as u8;
        }
    }

    /// Smoothed spectrum in decibels. Every call advances the smoothing.
    pub fn float_frequency(&mut self, out: &mut [f32]) -> Result<()> {
        self.update_spectrum()?;
        for (slot, magnitude) in out.iter_mut().zip(&self.smoothed) {
            *slot = to_decibels(*magnitude);
        }
        Ok(())
    }

    /// Spectrum bytes: the decibel range mapped linearly onto `0..=255`.
    pub fn byte_frequency(&mut self, out: &mut [u8]) -> Result<()> {
        self.update_spectrum()?;
        let range = self.max_decibels - self.min_decibels;
        for (slot, magnitude) in out.iter_mut().zip(&self.smoothed) {
            let db = to_decibels(*magnitude);
            let scaled = 255.0 / range * (db - self.min_decibels);
            *slot = if scaled.is_finite() {
                scaled.floor().clamp(0.0, 255.0) as u8
            } else {
                0
            };
        }
        Ok(())
    }

    fn update_spectrum(&mut self) -> Result<()> {
        let size = self.fft_size;
        let smoothing = self.smoothing;
        let start = self.write_pos;
        self.prepare_fft(size)?;
        let Some(fft) = self.fft.as_mut() else {
            return Err(crate::VizError::msg("fft resources missing after planning"));
        };

        for i in 0..size {
            fft.input[i] = self.ring[(start + i) % size] * self.window[i];
        }

        fft.plan
            .process_with_scratch(&mut fft.input, &mut fft.spectrum, &mut fft.scratch)?;

        let norm = 1.0 / size as f32;
        for (smoothed, bin) in self.smoothed.iter_mut().zip(&fft.spectrum) {
            let magnitude = bin.norm() * norm;
            let next = smoothing * *smoothed + (1.0 - smoothing) * magnitude;
            *smoothed = if next.is_finite() { next } else { 0.0 };
        }
        Ok(())
    }

    fn prepare_fft(&mut self, size: usize) -> Result<()> {
        let rebuild = self
            .fft
            .as_ref()
            .map(|fft| fft.size != size)
            .unwrap_or(true);

        if rebuild {
            let plan = self.fft_planner.plan_fft_forward(size);
            let scratch = plan.make_scratch_vec();
            let spectrum = plan.make_output_vec();
            let input = plan.make_input_vec();
            self.fft = Some(FftResources {
                size,
                plan,
                scratch,
                spectrum,
                input,
            });
        }

        Ok(())
    }
}

struct FftResources {
    size: usize,
    plan: Arc<dyn RealToComplex<f32>>,
    scratch: Vec<Complex32>,
    spectrum: Vec<Complex32>,
    input: Vec<f32>,
}

impl fmt::Debug for Analyser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Analyser")
            .field("fft_size", &self.fft_size)
            .field("smoothing", &self.smoothing)
            .field("min_decibels", &self.min_decibels)
            .field("max_decibels", &self.max_decibels)
            .field("planned", &self.fft.as_ref().map(|fft| fft.size))
            .finish()
    }
}

fn to_decibels(magnitude: f32) -> f32 {
    if magnitude <= 0.0 {
        f32::NEG_INFINITY
    } else {
        20.0 * magnitude.log10()
    }
}

fn blackman_value(index: usize, len: usize) -> f32 {
    if len <= 1 {
        return 1.0;
    }

    const ALPHA: f32 = 0.16;
    let a0 = 0.5 * (1.0 - ALPHA);
    let a1 = 0.5;
    let a2 = 0.5 * ALPHA;
    let x = index as f32 / len as f32;
    a0 - a1 * (2.0 * PI * x).cos() + a2 * (4.0 * PI * x).cos()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(fft_size: usize, smoothing: f32) -> Analyser {
        Analyser::new(&AudioConfig {
            fft_size,
            smoothing_time_constant: smoothing,
            ..Default::default()
        })
        .unwrap()
    }

    fn sine(bin: usize, fft_size: usize, amplitude: f32) -> Vec<f32> {
        (0..fft_size)
            .map(|n| amplitude * (2.0 * PI * bin as f32 * n as f32 / fft_size as f32).sin())
            .collect()
    }

    #[test]
    fn silence_reads_as_midline_and_empty_spectrum() {
        let mut analyser = build(256, 0.8);
        let mut time = vec![0u8; 256];
        let mut freq = vec![255u8; 128];
        analyser.byte_time_domain(&mut time);
        analyser.byte_frequency(&mut freq).unwrap();
        assert!(time.iter().all(|b| *b == SILENCE_BYTE));
        assert!(freq.iter().all(|b| *b == 0));
    }

    #[test]
    fn time_domain_bytes_follow_the_waveform() {
        let mut analyser = build(32, 0.0);
        analyser.push_samples(&[1.0; 16]);
        analyser.push_samples(&[-1.0; 16]);
        let mut time = vec![0u8; 32];
        analyser.byte_time_domain(&mut time);
        assert_eq!(time[0], 255);
        assert_eq!(time[31], 0);
    }

    #[test]
    fn only_the_latest_window_is_kept() {
        let mut analyser = build(32, 0.0);
        let samples: Vec<f32> = (0..100).map(|i| i as f32 / 100.0).collect();
        analyser.push_samples(&samples);
        let mut window = vec![0.0; 32];
        analyser.float_time_domain(&mut window);
        assert!((window[0] - 0.68).abs() < 1e-6);
        assert!((window[31] - 0.99).abs() < 1e-6);
    }

    #[test]
    fn sine_peaks_at_its_bin() {
        let mut analyser = build(256, 0.0);
        analyser.push_samples(&sine(20, 256, 0.01));
        let mut freq = vec![0u8; 128];
        analyser.byte_frequency(&mut freq).unwrap();
        let peak = freq
            .iter()
            .enumerate()
            .max_by_key(|(_, v)| **v)
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(peak, 20);
        assert!(freq[20] > 150);
        assert!(freq[100] < freq[20]);
    }

    #[test]
    fn smoothing_carries_energy_across_reads() {
        let mut analyser = build(256, 0.8);
        analyser.push_samples(&sine(10, 256, 0.9));
        let mut first = vec![0.0f32; 128];
        analyser.float_frequency(&mut first).unwrap();

        analyser.reset();
        analyser.push_samples(&sine(10, 256, 0.9));
        let mut again = vec![0.0f32; 128];
        analyser.float_frequency(&mut again).unwrap();
        let mut settled = vec![0.0f32; 128];
        for _ in 0..20 {
            analyser.float_frequency(&mut settled).unwrap();
        }
        assert!((first[10] - again[10]).abs() < 1e-3);
        assert!(settled[10] > again[10]);
    }

    #[test]
    fn short_output_buffers_are_filled_partially() {
        let mut analyser = build(64, 0.0);
        let mut time = vec![7u8; 8];
        analyser.byte_time_domain(&mut time);
        assert!(time.iter().all(|b| *b == SILENCE_BYTE));
    }

    #[test]
    fn rejects_invalid_fft_size() {
        let result = Analyser::new(&AudioConfig {
            fft_size: 100,
            ..Default::default()
        });
        assert!(result.is_err());
    }
}
