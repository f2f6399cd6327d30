use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard,
    },
};

use serde::{Deserialize, Serialize};

use crate::{Analyser, AudioConfig, Result, VizError};

/// Where captured audio comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioSource {
    Microphone,
    /// Audio shared alongside a screen capture.
    Screen,
    /// Decoded audio fed by the host, e.g. a WAV file.
    File,
}

/// Read side of a live analyser, as consumed by the frame engine.
///
/// Implementations fill caller-owned buffers; the caller sizes them from
/// [`fft_size`](Self::fft_size) and
/// [`frequency_bin_count`](Self::frequency_bin_count).
pub trait AnalysisSource {
    fn fft_size(&self) -> usize;

    fn frequency_bin_count(&self) -> usize {
        self.fft_size() / 2
    }

    fn time_domain_bytes(&self, out: &mut [u8]) -> Result<()>;

    fn frequency_bytes(&self, out: &mut [u8]) -> Result<()>;

    /// False once capture has stopped, even though the handle is still attached.
    fn is_active(&self) -> bool;
}

/// High level audio engine façade. Device capture pushes blocks in; the
/// visualizer reads through an [`AnalysisHandle`].
#[derive(Debug)]
pub struct AudioEngine {
    config: AudioConfig,
    analysis: Arc<Mutex<Analyser>>,
    active: Arc<AtomicBool>,
    source: Mutex<Option<AudioSource>>,
}

impl AudioEngine {
    pub fn new(config: AudioConfig) -> Result<Self> {
        let analysis = Analyser::new(&config)?;
        Ok(Self {
            config,
            analysis: Arc::new(Mutex::new(analysis)),
            active: Arc::new(AtomicBool::new(false)),
            source: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &AudioConfig {
        &self.config
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    /// Starts (or restarts) capture from `source` and returns a handle to
    /// the analysis pipeline. Restarting clears previously captured audio.
    pub fn start(&self, source: AudioSource) -> Result<AnalysisHandle> {
        self.lock_analysis()?.reset();
        *self.lock_source()? = Some(source);
        self.active.store(true, Ordering::SeqCst);
        tracing::info!(?source, fft_size = self.config.fft_size, "audio capture started");
        Ok(self.handle())
    }

    /// Stops capture. Existing handles stay attached but report inactive.
    pub fn stop(&self) -> Result<()> {
        self.active.store(false, Ordering::SeqCst);
        let previous = self.lock_source()?.take();
        if previous.is_some() {
            tracing::info!(source = ?previous, "audio capture stopped");
        }
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn source(&self) -> Result<Option<AudioSource>> {
        Ok(*self.lock_source()?)
    }

    /// Returns another handle to the shared analyser.
    pub fn handle(&self) -> AnalysisHandle {
        AnalysisHandle {
            shared: self.analysis.clone(),
            active: self.active.clone(),
        }
    }

    /// Feeds a block of mono samples. Ignored while capture is stopped.
    pub fn push_samples(&self, samples: &[f32]) -> Result<()> {
        if samples.is_empty() || !self.is_active() {
            return Ok(());
        }

        self.lock_analysis()?.push_samples(samples);
        Ok(())
    }

    fn lock_analysis(&self) -> Result<MutexGuard<'_, Analyser>> {
        self.analysis
            .lock()
            .map_err(|_| VizError::Poisoned("analysis pipeline"))
    }

    fn lock_source(&self) -> Result<MutexGuard<'_, Option<AudioSource>>> {
        self.source
            .lock()
            .map_err(|_| VizError::Poisoned("audio source"))
    }
}

/// Shared, thread-safe view over the analyser managed by [`AudioEngine`].
#[derive(Clone)]
pub struct AnalysisHandle {
    shared: Arc<Mutex<Analyser>>,
    active: Arc<AtomicBool>,
}

impl AnalysisHandle {
    fn lock(&self) -> Result<MutexGuard<'_, Analyser>> {
        self.shared
            .lock()
            .map_err(|_| VizError::Poisoned("analysis pipeline"))
    }

    /// True when both handles read the same analyser.
    pub fn same_source(&self, other: &AnalysisHandle) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl AnalysisSource for AnalysisHandle {
    fn fft_size(&self) -> usize {
        self.lock().map(|a| a.fft_size()).unwrap_or(0)
    }

    fn frequency_bin_count(&self) -> usize {
        self.lock().map(|a| a.frequency_bin_count()).unwrap_or(0)
    }

    fn time_domain_bytes(&self, out: &mut [u8]) -> Result<()> {
        self.lock()?.byte_time_domain(out);
        Ok(())
    }

    fn frequency_bytes(&self, out: &mut [u8]) -> Result<()> {
        self.lock()?.byte_frequency(out)
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for AnalysisHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisHandle")
            .field("active", &self.active.load(Ordering::Relaxed))
            .finish()
    }
}
