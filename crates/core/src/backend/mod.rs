//! Builds and tears down the drawing resources a render mode needs.

use std::{cell::Cell, fmt, rc::Rc};

use crate::{
    canvas::{CanvasHandle, Context2d, Context2dHandle},
    config::RenderConfig,
    mode::RenderMode,
    render::{RendererHandle, RendererOptions, SceneRenderer},
    scene::{CameraHandle, SceneContext},
    Result,
};

/// Pixel size of the element hosting the surface. Zero means "not measured yet".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ContainerSize {
    pub width: u32,
    pub height: u32,
}

impl ContainerSize {
    pub const UNMEASURED: ContainerSize = ContainerSize {
        width: 0,
        height: 0,
    };

    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_measured(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

/// Factory for drawing surfaces, 2D contexts and renderers.
pub trait GraphicsHost {
    fn create_canvas(&self, width: u32, height: u32) -> Result<CanvasHandle> {
        Ok(CanvasHandle::new(width, height))
    }

    fn context_2d(&self, canvas: &CanvasHandle) -> Result<Context2d>;

    fn renderer(&self, canvas: &CanvasHandle, options: RendererOptions) -> Result<SceneRenderer>;
}

/// In-process software rasteriser. Never fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct SoftwareHost;

impl GraphicsHost for SoftwareHost {
    fn context_2d(&self, canvas: &CanvasHandle) -> Result<Context2d> {
        Ok(Context2d::new(canvas.clone()))
    }

    fn renderer(&self, canvas: &CanvasHandle, options: RendererOptions) -> Result<SceneRenderer> {
        Ok(SceneRenderer::new(canvas.clone(), options))
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LedgerCounts {
    pub contexts_created: u64,
    pub contexts_disposed: u64,
    pub renderers_created: u64,
    pub renderers_disposed: u64,
}

impl LedgerCounts {
    pub fn live_contexts(&self) -> u64 {
        self.contexts_created - self.contexts_disposed
    }

    pub fn live_renderers(&self) -> u64 {
        self.renderers_created - self.renderers_disposed
    }

    pub fn live(&self) -> u64 {
        self.live_contexts() + self.live_renderers()
    }
}

/// Tally of backend resources handed out and released.
#[derive(Clone, Debug, Default)]
pub struct ResourceLedger {
    counts: Rc<Cell<LedgerCounts>>,
}

impl ResourceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counts(&self) -> LedgerCounts {
        self.counts.get()
    }

    fn update(&self, f: impl FnOnce(&mut LedgerCounts)) {
        let mut counts = self.counts.get();
        f(&mut counts);
        self.counts.set(counts);
    }
}

enum Surfaces {
    Canvas(Context2dHandle),
    Scene3d(RendererHandle),
}

/// Drawing resources for exactly one render mode.
///
/// Released exactly once, either through [`dispose`](Self::dispose) or on
/// drop. A disposed renderer refuses to render even if a script kept a
/// handle to it.
pub struct BackendResources {
    canvas: CanvasHandle,
    surfaces: Surfaces,
    ledger: ResourceLedger,
    released: bool,
}

impl BackendResources {
    pub fn mode(&self) -> RenderMode {
        match self.surfaces {
            Surfaces::Canvas(_) => RenderMode::Canvas,
            Surfaces::Scene3d(_) => RenderMode::Scene3d,
        }
    }

    pub fn canvas(&self) -> &CanvasHandle {
        &self.canvas
    }

    pub fn context(&self) -> Option<&Context2dHandle> {
        match &self.surfaces {
            Surfaces::Canvas(context) => Some(context),
            Surfaces::Scene3d(_) => None,
        }
    }

    pub fn renderer(&self) -> Option<&RendererHandle> {
        match &self.surfaces {
            Surfaces::Scene3d(renderer) => Some(renderer),
            Surfaces::Canvas(_) => None,
        }
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Resizes the surface and, in 3D mode, the renderer and camera aspect
    /// together so the next tick sees one consistent size.
    pub fn resize(&mut self, width: u32, height: u32, camera: &CameraHandle) {
        match &self.surfaces {
            Surfaces::Canvas(context) => {
                self.canvas.set_size(width, height);
                context.borrow_mut().reset();
            }
            Surfaces::Scene3d(renderer) => {
                renderer.borrow_mut().set_size(width, height);
                camera
                    .borrow_mut()
                    .set_aspect(width as f64 / height as f64);
            }
        }
        tracing::debug!(width, height, mode = %self.mode(), "backend resized");
    }

    pub fn dispose(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        match &self.surfaces {
            Surfaces::Canvas(context) => {
                context.borrow_mut().clear_log();
                self.ledger.update(|c| c.contexts_disposed += 1);
            }
            Surfaces::Scene3d(renderer) => {
                renderer.borrow_mut().dispose();
                self.ledger.update(|c| c.renderers_disposed += 1);
            }
        }
        tracing::debug!(mode = %self.mode(), "backend disposed");
    }
}

impl Drop for BackendResources {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for BackendResources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendResources")
            .field("mode", &self.mode())
            .field("size", &self.canvas.size())
            .field("released", &self.released)
            .finish()
    }
}

/// Produces [`BackendResources`] sized to the container.
pub struct Bootstrapper {
    host: Box<dyn GraphicsHost>,
    config: RenderConfig,
    ledger: ResourceLedger,
}

impl Bootstrapper {
    pub fn new(host: Box<dyn GraphicsHost>, config: RenderConfig) -> Self {
        Self {
            host,
            config,
            ledger: ResourceLedger::new(),
        }
    }

    pub fn ledger(&self) -> &ResourceLedger {
        &self.ledger
    }

    /// Container size, or the configured default while it is unmeasured.
    pub fn surface_size(&self, container: ContainerSize) -> (u32, u32) {
        if container.is_measured() {
            (container.width, container.height)
        } else {
            (self.config.default_width, self.config.default_height)
        }
    }

    pub fn build(
        &self,
        mode: RenderMode,
        container: ContainerSize,
        scene: &SceneContext,
    ) -> Result<BackendResources> {
        let (width, height) = self.surface_size(container);
        let canvas = self.host.create_canvas(width, height)?;

        let surfaces = match mode {
            RenderMode::Canvas => {
                let context = self.host.context_2d(&canvas)?;
                self.ledger.update(|c| c.contexts_created += 1);
                Surfaces::Canvas(Context2dHandle::new(context))
            }
            RenderMode::Scene3d => {
                let options = RendererOptions {
                    antialias: self.config.antialias,
                    alpha: self.config.alpha,
                };
                let mut renderer = self.host.renderer(&canvas, options)?;
                renderer.set_size(width, height);
                renderer.set_pixel_ratio(self.config.pixel_ratio);
                scene
                    .camera
                    .borrow_mut()
                    .set_aspect(width as f64 / height as f64);
                self.ledger.update(|c| c.renderers_created += 1);
                Surfaces::Scene3d(RendererHandle::new(renderer))
            }
        };

        tracing::info!(%mode, width, height, "backend built");
        Ok(BackendResources {
            canvas,
            surfaces,
            ledger: self.ledger.clone(),
            released: false,
        })
    }
}

impl fmt::Debug for Bootstrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bootstrapper")
            .field("config", &self.config)
            .field("ledger", &self.ledger.counts())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::VizError;

    fn bootstrapper() -> Bootstrapper {
        Bootstrapper::new(Box::new(SoftwareHost), RenderConfig::default())
    }

    struct NoContextHost;

    impl GraphicsHost for NoContextHost {
        fn context_2d(&self, _canvas: &CanvasHandle) -> Result<Context2d> {
            Err(VizError::backend("Failed to get 2D canvas context"))
        }

        fn renderer(&self, _canvas: &CanvasHandle, _options: RendererOptions) -> Result<SceneRenderer> {
            Err(VizError::backend("Failed to initialize renderer"))
        }
    }

    #[test]
    fn unmeasured_container_uses_default_size() {
        let backend = bootstrapper()
            .build(RenderMode::Canvas, ContainerSize::UNMEASURED, &SceneContext::new())
            .unwrap();
        assert_eq!(backend.canvas().size(), (300, 150));
        assert!(backend.context().is_some());
        assert!(backend.renderer().is_none());
    }

    #[test]
    fn scene_backend_sets_camera_aspect() {
        let scene = SceneContext::new();
        let backend = bootstrapper()
            .build(RenderMode::Scene3d, ContainerSize::new(800, 400), &scene)
            .unwrap();
        assert_eq!(backend.canvas().size(), (800, 400));
        assert_eq!(backend.renderer().unwrap().borrow().size(), (800, 400));
        assert_eq!(scene.camera.borrow().aspect, 2.0);
    }

    #[test]
    fn pixel_ratio_applies_to_the_surface() {
        let config = RenderConfig {
            pixel_ratio: 2.0,
            ..Default::default()
        };
        let bootstrapper = Bootstrapper::new(Box::new(SoftwareHost), config);
        let backend = bootstrapper
            .build(RenderMode::Scene3d, ContainerSize::new(100, 100), &SceneContext::new())
            .unwrap();
        assert_eq!(backend.canvas().size(), (200, 200));
    }

    #[test]
    fn construction_failures_are_reported_and_not_counted() {
        let bootstrapper = Bootstrapper::new(Box::new(NoContextHost), RenderConfig::default());
        let err = bootstrapper
            .build(RenderMode::Canvas, ContainerSize::new(10, 10), &SceneContext::new())
            .unwrap_err();
        assert!(format!("{err}").contains("2D canvas context"));
        assert_eq!(bootstrapper.ledger().counts(), LedgerCounts::default());
    }

    #[test]
    fn dispose_is_idempotent_and_drop_releases() {
        let bootstrapper = bootstrapper();
        let scene = SceneContext::new();
        let mut backend = bootstrapper
            .build(RenderMode::Scene3d, ContainerSize::new(10, 10), &scene)
            .unwrap();
        let renderer = backend.renderer().cloned().unwrap();
        backend.dispose();
        backend.dispose();
        assert!(renderer.borrow().is_disposed());
        assert_eq!(bootstrapper.ledger().counts().renderers_disposed, 1);

        {
            let _dropped = bootstrapper
                .build(RenderMode::Canvas, ContainerSize::new(10, 10), &scene)
                .unwrap();
        }
        assert_eq!(bootstrapper.ledger().counts().live(), 0);
    }

    #[test]
    fn resize_keeps_renderer_surface_and_camera_in_lockstep() {
        let scene = SceneContext::new();
        let mut backend = bootstrapper()
            .build(RenderMode::Scene3d, ContainerSize::new(300, 150), &scene)
            .unwrap();
        backend.resize(640, 480, &scene.camera);
        assert_eq!(backend.canvas().size(), (640, 480));
        assert_eq!(backend.renderer().unwrap().borrow().drawing_buffer_size(), (640, 480));
        assert!((scene.camera.borrow().aspect - 640.0 / 480.0).abs() < 1e-12);
    }
}
