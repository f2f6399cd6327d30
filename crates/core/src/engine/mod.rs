//! Per-tick execution of the active program.

use rhai::Blob;

use crate::{
    audio::AnalysisSource,
    backend::BackendResources,
    config::RenderConfig,
    mode::RenderMode,
    script::{FrameInvocation, FrameProgram, ScriptHost},
    scene::SceneContext,
    Result, VizError,
};

/// Reusable byte buffers for one attached analysis source, sized from it
/// when attached and refreshed in place every tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioSampleBuffers {
    pub time_domain: Vec<u8>,
    pub frequency: Vec<u8>,
}

impl AudioSampleBuffers {
    pub fn for_source(source: &dyn AnalysisSource) -> Self {
        Self {
            time_domain: vec![crate::analysis::SILENCE_BYTE; source.fft_size()],
            frequency: vec![0; source.frequency_bin_count()],
        }
    }
}

/// The optional analysis source and its buffers.
#[derive(Default)]
pub struct AudioInput {
    source: Option<Box<dyn AnalysisSource>>,
    buffers: Option<AudioSampleBuffers>,
    active: bool,
}

impl AudioInput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the source. Buffers are reallocated only here.
    pub fn attach(&mut self, source: Option<Box<dyn AnalysisSource>>) {
        self.buffers = source
            .as_deref()
            .map(AudioSampleBuffers::for_source);
        tracing::debug!(
            attached = source.is_some(),
            bins = self.buffers.as_ref().map(|b| b.frequency.len()),
            "analysis source attached"
        );
        self.source = source;
        self.active = false;
    }

    pub fn is_attached(&self) -> bool {
        self.source.is_some()
    }

    /// Active as of the last [`refresh`](Self::refresh).
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn buffers(&self) -> Option<&AudioSampleBuffers> {
        self.buffers.as_ref()
    }

    /// Pulls the latest analysis into the buffers. A failing read marks
    /// audio inactive for this tick instead of failing the frame.
    pub fn refresh(&mut self) -> bool {
        let (Some(source), Some(buffers)) = (self.source.as_deref(), self.buffers.as_mut()) else {
            self.active = false;
            return false;
        };
        if !source.is_active() {
            self.active = false;
            return false;
        }
        let read = source
            .time_domain_bytes(&mut buffers.time_domain)
            .and_then(|()| source.frequency_bytes(&mut buffers.frequency));
        self.active = match read {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(error = %err, "analysis read failed; treating audio as inactive");
                false
            }
        };
        self.active
    }

    /// Byte buffers to hand to the program, or `None` for each when inactive.
    fn snapshot(&self) -> (Option<Blob>, Option<Blob>) {
        match (&self.buffers, self.active) {
            (Some(buffers), true) => (
                Some(buffers.time_domain.clone()),
                Some(buffers.frequency.clone()),
            ),
            _ => (None, None),
        }
    }
}

impl std::fmt::Debug for AudioInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioInput")
            .field("attached", &self.source.is_some())
            .field("active", &self.active)
            .finish()
    }
}

/// What a completed tick did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickReport {
    /// One-based count of ticks run by the current program.
    pub tick: u64,
    pub elapsed_seconds: f64,
    pub audio_active: bool,
}

/// Runs the loaded program against the backend once per tick.
#[derive(Debug)]
pub struct FrameEngine {
    scripts: ScriptHost,
    clear_each_frame: bool,
    program: Option<FrameProgram>,
    ticks: u64,
}

impl FrameEngine {
    pub fn new(config: &RenderConfig) -> Self {
        Self {
            scripts: ScriptHost::new(config),
            clear_each_frame: config.clear_each_frame,
            program: None,
            ticks: 0,
        }
    }

    pub fn compile(&self, code: &str, mode: RenderMode, revision: u64) -> Result<FrameProgram> {
        self.scripts.compile(code, mode, revision)
    }

    /// Installs `program` and restarts the tick count.
    pub fn load(&mut self, program: FrameProgram) {
        self.program = Some(program);
        self.ticks = 0;
    }

    pub fn unload(&mut self) {
        self.program = None;
        self.ticks = 0;
    }

    pub fn program(&self) -> Option<&FrameProgram> {
        self.program.as_ref()
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn tick(
        &mut self,
        backend: &BackendResources,
        scene: &SceneContext,
        audio: &mut AudioInput,
        elapsed_seconds: f64,
    ) -> Result<TickReport> {
        let Some(program) = self.program.as_ref() else {
            return Err(VizError::msg("no program loaded"));
        };
        if backend.is_released() {
            return Err(VizError::backend("backend resources were released"));
        }
        let tick = self.ticks + 1;

        let audio_active = audio.refresh();
        let (time_domain, frequency) = audio.snapshot();

        let context = backend.context().cloned();
        if let Some(context) = &context {
            context.borrow_mut().clear_log();
            if self.clear_each_frame {
                backend.canvas().surface_mut().clear();
            }
        }

        let invocation = FrameInvocation {
            tick,
            mode: backend.mode(),
            canvas: backend.canvas().clone(),
            context,
            time_domain,
            frequency,
            audio_active,
            elapsed_seconds,
            scene: scene.clone(),
            renderer: backend.renderer().cloned(),
        };
        self.scripts.invoke(program, &invocation)?;

        if let Some(renderer) = backend.renderer() {
            renderer
                .borrow_mut()
                .render(&scene.scene, &scene.camera)
                .map_err(|err| VizError::Frame {
                    tick,
                    message: err.to_string(),
                })?;
        }

        self.ticks = tick;
        tracing::trace!(tick, elapsed_seconds, audio_active, "frame rendered");
        Ok(TickReport {
            tick,
            elapsed_seconds,
            audio_active,
        })
    }
}
