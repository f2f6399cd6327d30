//! The renderer component: owns one code revision at a time, the backend
//! built for it and the loop that ticks it.
//!
//! Lifecycle: [`mount`](Visualizer::mount) creates the shared scene context,
//! [`set_code`](Visualizer::set_code) tears down the previous backend and
//! builds a new one for the detected mode, and every
//! [`tick`](Visualizer::tick) runs the program once against a pending frame
//! request. A failure at any step is terminal until the next `set_code`.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::{
    audio::AnalysisSource,
    backend::{BackendResources, Bootstrapper, ContainerSize, GraphicsHost, ResourceLedger, SoftwareHost},
    canvas::DrawCommand,
    config::RenderConfig,
    engine::{AudioInput, FrameEngine, TickReport},
    fault::{ErrorState, ErrorView, FaultIsolator, FaultStage, RendererState},
    mode::{detect_mode_within, RenderMode, DEFAULT_PROBE_CHARS},
    scene::SceneContext,
    timeline::{FrameClock, FrameScheduler},
    Result,
};

/// A snippet produced by the code generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedCode {
    #[serde(alias = "componentCode")]
    pub code: String,
    #[serde(default)]
    pub description: String,
}

impl GeneratedCode {
    pub fn new(code: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            description: description.into(),
        }
    }

    /// Parses a generation response: `{"code" | "componentCode": ..., "description": ...}`.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Mode declared by the marker comment, probing the default prefix length.
    pub fn mode(&self) -> RenderMode {
        detect_mode_within(&self.code, DEFAULT_PROBE_CHARS)
    }

    pub fn is_blank(&self) -> bool {
        self.code.trim().is_empty()
    }
}

/// Result of one call to [`Visualizer::tick`].
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Rendered(TickReport),
    /// Nothing ran: no pending frame, not running, or not mounted.
    Idle,
    /// This tick failed; the loop has stopped and the backend is released.
    Faulted(String),
}

pub struct Visualizer {
    config: RenderConfig,
    bootstrapper: Bootstrapper,
    engine: FrameEngine,
    fault: FaultIsolator,
    scheduler: FrameScheduler,
    clock: FrameClock,
    audio: AudioInput,
    container: ContainerSize,
    scene: Option<SceneContext>,
    code: Option<GeneratedCode>,
    mode: Option<RenderMode>,
    backend: Option<BackendResources>,
    revision: u64,
}

impl Visualizer {
    pub fn new(config: RenderConfig) -> Self {
        Self::with_host(config, Box::new(SoftwareHost))
    }

    pub fn with_host(config: RenderConfig, host: Box<dyn GraphicsHost>) -> Self {
        Self {
            bootstrapper: Bootstrapper::new(host, config.clone()),
            engine: FrameEngine::new(&config),
            config,
            fault: FaultIsolator::new(),
            scheduler: FrameScheduler::new(),
            clock: FrameClock::start(),
            audio: AudioInput::new(),
            container: ContainerSize::UNMEASURED,
            scene: None,
            code: None,
            mode: None,
            backend: None,
            revision: 0,
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.scene.is_some()
    }

    /// Attaches to a container. The scene context is created here and kept
    /// until [`unmount`](Self::unmount).
    pub fn mount(&mut self, container: ContainerSize) {
        self.container = container;
        if self.scene.is_none() {
            self.scene = Some(SceneContext::new());
            tracing::debug!("scene context created");
        }
        if self.backend.is_none() && self.fault.state() != RendererState::Error {
            self.restart();
        }
    }

    /// Stops the loop, releases the backend and drops the scene context.
    pub fn unmount(&mut self) {
        self.teardown();
        self.engine.unload();
        self.fault.pause();
        if self.scene.take().is_some() {
            tracing::debug!("scene context dropped");
        }
    }

    /// Replaces the active code. Any previous fault is cleared, the old
    /// backend is released before the new one is built, and the tick count
    /// and clock start over.
    pub fn set_code(&mut self, code: GeneratedCode) {
        self.revision += 1;
        let mode = detect_mode_within(&code.code, self.config.mode_probe_chars);
        tracing::info!(
            revision = self.revision,
            %mode,
            description = %code.description,
            "new generated code"
        );
        self.code = Some(code);
        self.mode = Some(mode);
        self.fault.reset();
        self.restart();
    }

    /// Replaces the analysis source. The loop keeps running either way.
    pub fn attach_audio(&mut self, source: Option<Box<dyn AnalysisSource>>) {
        self.audio.attach(source);
    }

    /// Applies a new container size to the live backend.
    pub fn resize(&mut self, container: ContainerSize) {
        self.container = container;
        let (width, height) = self.bootstrapper.surface_size(container);
        if let (Some(backend), Some(scene)) = (self.backend.as_mut(), self.scene.as_ref()) {
            backend.resize(width, height, &scene.camera);
        }
    }

    pub fn tick(&mut self) -> TickOutcome {
        self.tick_at(Instant::now())
    }

    /// Runs one frame if one is pending, with `time` measured at `now`.
    pub fn tick_at(&mut self, now: Instant) -> TickOutcome {
        if !self.fault.is_running() {
            return TickOutcome::Idle;
        }
        if self.scheduler.take().is_none() {
            return TickOutcome::Idle;
        }
        let (Some(backend), Some(scene)) = (self.backend.as_ref(), self.scene.as_ref()) else {
            return TickOutcome::Idle;
        };

        let elapsed = self.clock.elapsed_seconds(now);
        match self.engine.tick(backend, scene, &mut self.audio, elapsed) {
            Ok(report) => {
                self.scheduler.request();
                TickOutcome::Rendered(report)
            }
            Err(err) => {
                self.fault.record(FaultStage::Frame, &err);
                self.teardown();
                TickOutcome::Faulted(err.to_string())
            }
        }
    }

    pub fn state(&self) -> RendererState {
        self.fault.state()
    }

    pub fn error(&self) -> Option<&ErrorState> {
        self.fault.error()
    }

    /// The error display, with the offending code when `show_code` is set.
    pub fn error_view(&self, show_code: bool) -> Option<ErrorView> {
        let code = self
            .code
            .as_ref()
            .filter(|_| show_code)
            .map(|code| code.code.as_str());
        self.fault.view(code)
    }

    /// Mode of the current code, if any.
    pub fn mode(&self) -> Option<RenderMode> {
        self.mode
    }

    pub fn code(&self) -> Option<&GeneratedCode> {
        self.code.as_ref()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Ticks completed by the current revision.
    pub fn ticks(&self) -> u64 {
        self.engine.ticks()
    }

    pub fn is_frame_pending(&self) -> bool {
        self.scheduler.is_pending()
    }

    /// Drawing calls made by the last canvas-mode tick.
    pub fn draw_log(&self) -> Vec<DrawCommand> {
        self.backend
            .as_ref()
            .and_then(|backend| backend.context())
            .map(|context| context.borrow().draw_log().to_vec())
            .unwrap_or_default()
    }

    pub fn backend(&self) -> Option<&BackendResources> {
        self.backend.as_ref()
    }

    pub fn scene_context(&self) -> Option<&SceneContext> {
        self.scene.as_ref()
    }

    pub fn ledger(&self) -> &ResourceLedger {
        self.bootstrapper.ledger()
    }

    pub fn clock(&self) -> &FrameClock {
        &self.clock
    }

    /// Cancels the pending frame and releases the backend.
    fn teardown(&mut self) {
        self.scheduler.cancel_pending();
        if let Some(mut backend) = self.backend.take() {
            backend.dispose();
        }
    }

    /// Rebuilds everything for the current code. Failures land in the
    /// fault isolator and leave the loop stopped.
    fn restart(&mut self) {
        self.teardown();
        self.engine.unload();
        self.fault.pause();

        let (Some(code), Some(mode), Some(scene)) = (self.code.as_ref(), self.mode, self.scene.as_ref())
        else {
            return;
        };
        if code.is_blank() {
            tracing::debug!("blank code; loop not started");
            return;
        }

        let bootstrapper = &self.bootstrapper;
        let container = self.container;
        let Some(backend) = self
            .fault
            .guard(FaultStage::Bootstrap, || bootstrapper.build(mode, container, scene))
        else {
            return;
        };

        let engine = &self.engine;
        let revision = self.revision;
        let Some(program) = self
            .fault
            .guard(FaultStage::Compile, || engine.compile(&code.code, mode, revision))
        else {
            drop(backend);
            return;
        };

        self.backend = Some(backend);
        self.engine.load(program);
        self.clock.restart();
        self.fault.start();
        self.scheduler.request();
        tracing::info!(revision, %mode, "visualization loop started");
    }
}

impl std::fmt::Debug for Visualizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Visualizer")
            .field("state", &self.fault.state())
            .field("mode", &self.mode)
            .field("revision", &self.revision)
            .field("ticks", &self.engine.ticks())
            .field("backend", &self.backend)
            .field("audio", &self.audio)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc, time::Duration};

    use super::*;
    use crate::{
        audio::{AudioEngine, AudioSource},
        backend::LedgerCounts,
        canvas::{CanvasHandle, Context2d},
        render::{RendererOptions, SceneRenderer},
        AudioConfig, VizError,
    };

    const CANVAS_FILL: &str = "// MODE: CANVAS\nctx.fillRect(0,0,10,10);";
    const SCENE_CUBE: &str = r#"// mode: three.js
        if type_of(objects["cube"]) == "()" {
            objects["cube"] = THREE.Mesh(THREE.BoxGeometry(1, 1, 1));
            scene.add(objects["cube"]);
        }
        objects["cube"].rotation.y = time;
    "#;

    fn mounted(code: &str) -> Visualizer {
        let mut vis = Visualizer::new(RenderConfig::default());
        vis.mount(ContainerSize::new(120, 80));
        vis.set_code(GeneratedCode::new(code, "test"));
        vis
    }

    fn rendered(outcome: TickOutcome) -> TickReport {
        match outcome {
            TickOutcome::Rendered(report) => report,
            other => panic!("expected a rendered frame, got {other:?}"),
        }
    }

    /// Records how many resources were live whenever the host is asked for a new one.
    struct WatchingHost {
        ledger: Rc<RefCell<Option<ResourceLedger>>>,
        live_at_build: Rc<RefCell<Vec<u64>>>,
    }

    impl WatchingHost {
        fn observe(&self) {
            if let Some(ledger) = self.ledger.borrow().as_ref() {
                self.live_at_build.borrow_mut().push(ledger.counts().live());
            }
        }
    }

    impl GraphicsHost for WatchingHost {
        fn context_2d(&self, canvas: &CanvasHandle) -> Result<Context2d> {
            self.observe();
            Ok(Context2d::new(canvas.clone()))
        }

        fn renderer(&self, canvas: &CanvasHandle, options: RendererOptions) -> Result<SceneRenderer> {
            self.observe();
            Ok(SceneRenderer::new(canvas.clone(), options))
        }
    }

    struct NoContextHost;

    impl GraphicsHost for NoContextHost {
        fn context_2d(&self, _canvas: &CanvasHandle) -> Result<Context2d> {
            Err(VizError::backend("Failed to get 2D canvas context"))
        }

        fn renderer(&self, _canvas: &CanvasHandle, _options: RendererOptions) -> Result<SceneRenderer> {
            Err(VizError::backend("Failed to initialize Three.js renderer"))
        }
    }

    #[test]
    fn canvas_code_draws_on_the_first_tick() {
        let mut vis = mounted(CANVAS_FILL);
        assert_eq!(vis.mode(), Some(RenderMode::Canvas));
        assert_eq!(vis.state(), RendererState::Running);

        let report = rendered(vis.tick());
        assert_eq!(report.tick, 1);
        assert!(matches!(
            vis.draw_log().as_slice(),
            [DrawCommand::FillRect { x, y, width, height, .. }]
                if (*x, *y, *width, *height) == (0.0, 0.0, 10.0, 10.0)
        ));
        assert!(vis.is_frame_pending());
    }

    #[test]
    fn code_waits_for_mount() {
        let mut vis = Visualizer::new(RenderConfig::default());
        vis.set_code(GeneratedCode::new(CANVAS_FILL, ""));
        assert_eq!(vis.state(), RendererState::Idle);
        assert_eq!(vis.tick(), TickOutcome::Idle);

        vis.mount(ContainerSize::UNMEASURED);
        assert_eq!(vis.state(), RendererState::Running);
        assert_eq!(vis.backend().unwrap().canvas().size(), (300, 150));
        rendered(vis.tick());
    }

    #[test]
    fn no_audio_means_inactive_and_absent_buffers() {
        let mut vis = mounted(
            r#"
            if isAudioActive { throw "active without audio"; }
            if type_of(audioData) != "()" || type_of(frequencyData) != "()" { throw "buffers present"; }
            "#,
        );
        assert!(!rendered(vis.tick()).audio_active);
    }

    #[test]
    fn live_audio_reaches_the_snippet_and_stopping_keeps_rendering() {
        let audio = AudioEngine::new(AudioConfig::default()).unwrap();
        let handle = audio.start(AudioSource::Microphone).unwrap();
        let mut vis = mounted(
            r#"
            if isAudioActive {
                if frequencyData.len() != 128 { throw "bins"; }
                if audioData[0] != 192 { throw "waveform"; }
            }
            "#,
        );
        vis.attach_audio(Some(Box::new(handle)));
        audio.push_samples(&[0.5; 256]).unwrap();
        assert!(rendered(vis.tick()).audio_active);

        audio.stop().unwrap();
        let report = rendered(vis.tick());
        assert!(!report.audio_active);
        assert_eq!(report.tick, 2);
    }

    #[test]
    fn frame_fault_stops_the_loop_until_new_code() {
        let code = r#"
            let n = objects["n"];
            if type_of(n) == "()" { n = 0; }
            n += 1;
            objects["n"] = n;
            if n == 5 { throw "tick five"; }
        "#;
        let mut vis = mounted(code);
        for _ in 0..4 {
            rendered(vis.tick());
        }
        match vis.tick() {
            TickOutcome::Faulted(message) => assert!(message.contains("tick five")),
            other => panic!("expected a fault, got {other:?}"),
        }
        assert_eq!(vis.tick(), TickOutcome::Idle);
        assert_eq!(vis.state(), RendererState::Error);
        assert_eq!(vis.ticks(), 4);
        assert!(!vis.is_frame_pending());
        assert_eq!(vis.ledger().counts().live(), 0);

        let view = vis.error_view(true).unwrap();
        assert!(view.message.contains("tick five"));
        assert_eq!(view.code.as_deref(), Some(code));
        assert!(vis.error_view(false).unwrap().code.is_none());

        vis.set_code(GeneratedCode::new("ctx.fillRect(0, 0, 1, 1);", "recovery"));
        assert_eq!(vis.state(), RendererState::Running);
        assert!(vis.error().is_none());
        assert_eq!(vis.ticks(), 0);
        let origin = vis.clock().origin();
        let report = rendered(vis.tick_at(origin));
        assert_eq!(report.tick, 1);
        assert_eq!(report.elapsed_seconds, 0.0);

        let objects = &vis.scene_context().unwrap().objects;
        assert_eq!(objects.get("n").as_int().unwrap(), 5);
    }

    #[test]
    fn time_is_measured_from_the_current_revision() {
        let mut vis = mounted(CANVAS_FILL);
        let origin = vis.clock().origin();
        let report = rendered(vis.tick_at(origin + Duration::from_millis(250)));
        assert!((report.elapsed_seconds - 0.25).abs() < 1e-9);
    }

    #[test]
    fn mode_switches_release_before_building() {
        let ledger_slot = Rc::new(RefCell::new(None));
        let live_at_build = Rc::new(RefCell::new(Vec::new()));
        let mut vis = Visualizer::with_host(
            RenderConfig::default(),
            Box::new(WatchingHost {
                ledger: ledger_slot.clone(),
                live_at_build: live_at_build.clone(),
            }),
        );
        ledger_slot.replace(Some(vis.ledger().clone()));
        vis.mount(ContainerSize::new(64, 64));

        for i in 0..6 {
            let code = if i % 2 == 0 { CANVAS_FILL } else { SCENE_CUBE };
            vis.set_code(GeneratedCode::new(code, ""));
            rendered(vis.tick());
            assert!(vis.ledger().counts().live() <= 1);
        }

        assert_eq!(live_at_build.borrow().as_slice(), &[0; 6]);
        let counts = vis.ledger().counts();
        assert_eq!(counts.contexts_created, 3);
        assert_eq!(counts.renderers_created, 3);
        assert_eq!(counts.live(), 1);
        assert_eq!(vis.scene_context().unwrap().scene.borrow().len(), 1);
    }

    #[test]
    fn resize_keeps_the_scene_backend_consistent() {
        let mut vis = mounted(SCENE_CUBE);
        rendered(vis.tick());
        vis.resize(ContainerSize::new(640, 480));

        let backend = vis.backend().unwrap();
        assert_eq!(backend.canvas().size(), (640, 480));
        assert_eq!(backend.renderer().unwrap().borrow().size(), (640, 480));
        let aspect = vis.scene_context().unwrap().camera.borrow().aspect;
        assert!((aspect - 640.0 / 480.0).abs() < 1e-12);
        rendered(vis.tick());
    }

    #[test]
    fn bootstrap_failure_never_starts_the_loop() {
        let mut vis = Visualizer::with_host(RenderConfig::default(), Box::new(NoContextHost));
        vis.mount(ContainerSize::new(10, 10));
        vis.set_code(GeneratedCode::new(CANVAS_FILL, ""));

        assert_eq!(vis.state(), RendererState::Error);
        let error = vis.error().unwrap();
        assert_eq!(error.stage, FaultStage::Bootstrap);
        assert_eq!(error.message, "Failed to get 2D canvas context");
        assert!(!vis.is_frame_pending());
        assert_eq!(vis.tick(), TickOutcome::Idle);
        assert_eq!(vis.ledger().counts(), LedgerCounts::default());
    }

    #[test]
    fn compile_failure_releases_the_fresh_backend() {
        let mut vis = mounted("let = ;");
        assert_eq!(vis.state(), RendererState::Error);
        assert_eq!(vis.error().unwrap().stage, FaultStage::Compile);
        assert!(vis.backend().is_none());
        assert_eq!(vis.ledger().counts().live(), 0);
    }

    #[test]
    fn blank_code_stays_idle() {
        let mut vis = mounted("   \n  ");
        assert_eq!(vis.state(), RendererState::Idle);
        assert!(vis.backend().is_none());
        assert_eq!(vis.tick(), TickOutcome::Idle);
    }

    #[test]
    fn unmount_drops_the_scene_and_remount_starts_fresh() {
        let mut vis = mounted(SCENE_CUBE);
        rendered(vis.tick());
        vis.unmount();
        assert!(!vis.is_mounted());
        assert_eq!(vis.ledger().counts().live(), 0);
        assert_eq!(vis.tick(), TickOutcome::Idle);

        vis.mount(ContainerSize::new(120, 80));
        assert_eq!(vis.state(), RendererState::Running);
        assert!(vis.scene_context().unwrap().objects.is_empty());
        rendered(vis.tick());
        assert_eq!(vis.scene_context().unwrap().scene.borrow().len(), 1);
    }

    #[test]
    fn generation_responses_parse_either_field_name() {
        let code = GeneratedCode::from_json(
            r#"{"componentCode": "// mode: threejs\nscene.clear();", "description": "spin"}"#,
        )
        .unwrap();
        assert_eq!(code.mode(), RenderMode::Scene3d);
        assert_eq!(code.description, "spin");

        let plain = GeneratedCode::from_json(r#"{"code": "ctx.save();"}"#).unwrap();
        assert_eq!(plain.mode(), RenderMode::Canvas);
        assert!(plain.description.is_empty());
    }
}
