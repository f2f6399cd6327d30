use std::{
    cell::{Ref, RefCell, RefMut},
    rc::Rc,
};

use glam::DVec4;

use crate::{
    canvas::{CanvasHandle, Rgba},
    scene::{CameraHandle, LightKind, MaterialKind, ObjectKind, SceneHandle},
    Result, VizError,
};

/// Construction options for a [`SceneRenderer`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RendererOptions {
    pub antialias: bool,
    /// Transparent clear colour when set.
    pub alpha: bool,
}

impl Default for RendererOptions {
    fn default() -> Self {
        Self {
            antialias: true,
            alpha: true,
        }
    }
}

/// Counters from the most recent render pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderInfo {
    pub render_calls: u64,
    pub meshes: usize,
    pub lines: usize,
}

/// Software wireframe renderer that rasterises a scene graph into a canvas.
#[derive(Debug)]
pub struct SceneRenderer {
    canvas: CanvasHandle,
    options: RendererOptions,
    width: u32,
    height: u32,
    pixel_ratio: f32,
    clear_color: Rgba,
    disposed: bool,
    info: RenderInfo,
}

impl SceneRenderer {
    /// Binds a renderer to `canvas`, adopting the canvas's current size.
    pub fn new(canvas: CanvasHandle, options: RendererOptions) -> Self {
        let (width, height) = canvas.size();
        Self {
            canvas,
            options,
            width,
            height,
            pixel_ratio: 1.0,
            clear_color: Rgba::BLACK,
            disposed: false,
            info: RenderInfo::default(),
        }
    }

    pub fn options(&self) -> RendererOptions {
        self.options
    }

    pub fn canvas(&self) -> &CanvasHandle {
        &self.canvas
    }

    /// Logical (CSS pixel) size.
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn pixel_ratio(&self) -> f32 {
        self.pixel_ratio
    }

    /// Size of the backing pixel buffer: logical size times pixel ratio.
    pub fn drawing_buffer_size(&self) -> (u32, u32) {
        let scale = |v: u32| ((v as f32 * self.pixel_ratio).round() as u32).max(1);
        (scale(self.width), scale(self.height))
    }

    /// Resizes the renderer and its canvas together.
    pub fn set_size(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        let (w, h) = self.drawing_buffer_size();
        self.canvas.set_size(w, h);
    }

    pub fn set_pixel_ratio(&mut self, ratio: f32) {
        if ratio.is_finite() && ratio > 0.0 {
            self.pixel_ratio = ratio;
            self.set_size(self.width, self.height);
        }
    }

    pub fn clear_color(&self) -> Rgba {
        self.clear_color
    }

    pub fn set_clear_color(&mut self, color: Rgba) {
        self.clear_color = color;
    }

    pub fn info(&self) -> RenderInfo {
        self.info
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn dispose(&mut self) {
        self.disposed = true;
    }

    /// Draws every visible object of `scene` as seen from `camera`.
    pub fn render(&mut self, scene: &SceneHandle, camera: &CameraHandle) -> Result<()> {
        if self.disposed {
            return Err(VizError::backend("render called on a disposed renderer"));
        }
        let expected = self.drawing_buffer_size();
        let actual = self.canvas.size();
        if expected != actual {
            return Err(VizError::backend(format!(
                "surface is {}x{} but the renderer was configured for {}x{}",
                actual.0, actual.1, expected.0, expected.1
            )));
        }

        let scene = scene.borrow();
        let camera = camera.borrow();
        let view_proj = camera.projection_matrix() * camera.view_matrix();
        let light_level = light_level(&scene);
        let (width, height) = (actual.0 as f64, actual.1 as f64);

        let mut surface = self.canvas.surface_mut();
        let background = scene.background.unwrap_or(if self.options.alpha {
            self.clear_color.with_alpha(0.0)
        } else {
            self.clear_color
        });
        surface.clear();
        if background.a > 0.0 {
            surface.fill(background);
        }

        let mut info = RenderInfo {
            render_calls: self.info.render_calls + 1,
            ..Default::default()
        };
        let line_width = self.pixel_ratio as f64;

        for child in scene.children() {
            let object = child.borrow();
            if !object.visible {
                continue;
            }
            let ObjectKind::Mesh { geometry, material } = &object.kind else {
                continue;
            };
            let color = match material.kind {
                MaterialKind::Basic => material.color,
                MaterialKind::Standard => {
                    let lit = material.color.scaled(light_level);
                    let glow = material.emissive;
                    Rgba::rgb(
                        lit.r.saturating_add(glow.r),
                        lit.g.saturating_add(glow.g),
                        lit.b.saturating_add(glow.b),
                    )
                }
            }
            .with_alpha(material.opacity.clamp(0.0, 1.0) as f32);

            let mvp = view_proj * object.model_matrix();
            let (vertices, edges) = geometry.wireframe();
            let projected: Vec<Option<(f64, f64)>> = vertices
                .iter()
                .map(|v| {
                    let clip = mvp * DVec4::new(v.x, v.y, v.z, 1.0);
                    // Behind the camera; dropping the edge avoids wrap-around.
                    if clip.w <= camera.near * 0.5 {
                        return None;
                    }
                    let ndc = clip.truncate() / clip.w;
                    Some((
                        (ndc.x + 1.0) * 0.5 * width,
                        (1.0 - ndc.y) * 0.5 * height,
                    ))
                })
                .collect();

            info.meshes += 1;
            for (a, b) in edges {
                if let (Some(from), Some(to)) = (projected[a], projected[b]) {
                    surface.draw_line(from, to, line_width, color);
                    info.lines += 1;
                }
            }
        }

        self.info = info;
        Ok(())
    }
}

/// Brightness multiplier for lit materials. An unlit scene stays faintly
/// visible rather than black.
fn light_level(scene: &crate::scene::Scene) -> f32 {
    let mut level = 0.0;
    for child in scene.children() {
        let object = child.borrow();
        if !object.visible {
            continue;
        }
        if let ObjectKind::Light(light) = &object.kind {
            level += match light.kind {
                LightKind::Ambient => light.intensity,
                LightKind::Directional | LightKind::Point => light.intensity * 0.6,
            };
        }
    }
    (level as f32).clamp(0.15, 1.0)
}

/// Shared handle to a [`SceneRenderer`]; scripts receive it as `renderer`.
#[derive(Clone, Debug)]
pub struct RendererHandle {
    inner: Rc<RefCell<SceneRenderer>>,
}

impl RendererHandle {
    pub fn new(renderer: SceneRenderer) -> Self {
        Self {
            inner: Rc::new(RefCell::new(renderer)),
        }
    }

    pub fn borrow(&self) -> Ref<'_, SceneRenderer> {
        self.inner.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, SceneRenderer> {
        self.inner.borrow_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{Geometry, Material, Object3d, Object3dHandle, SceneContext};

    fn scene_with_cube() -> SceneContext {
        let context = SceneContext::new();
        let mut material = Material::new(MaterialKind::Basic);
        material.color = Rgba::rgb(255, 0, 0);
        let cube = Object3d::new(ObjectKind::Mesh {
            geometry: Geometry::Box {
                width: 2.0,
                height: 2.0,
                depth: 2.0,
            },
            material,
        });
        context.scene.borrow_mut().add(Object3dHandle::new(cube));
        context
    }

    #[test]
    fn renders_a_cube_in_front_of_the_default_camera() {
        let context = scene_with_cube();
        let canvas = CanvasHandle::new(64, 64);
        let mut renderer = SceneRenderer::new(canvas.clone(), RendererOptions::default());
        renderer.render(&context.scene, &context.camera).unwrap();

        let info = renderer.info();
        assert_eq!(info.render_calls, 1);
        assert_eq!(info.meshes, 1);
        assert_eq!(info.lines, 12);
        let surface = canvas.surface();
        assert!(surface.as_rgba().chunks_exact(4).any(|px| px[0] == 255 && px[3] == 255));
    }

    #[test]
    fn hidden_objects_are_skipped() {
        let context = scene_with_cube();
        context.scene.borrow().children()[0].borrow_mut().visible = false;
        let mut renderer = SceneRenderer::new(CanvasHandle::new(16, 16), RendererOptions::default());
        renderer.render(&context.scene, &context.camera).unwrap();
        assert_eq!(renderer.info().meshes, 0);
    }

    #[test]
    fn disposed_renderer_refuses_to_render() {
        let context = SceneContext::new();
        let mut renderer = SceneRenderer::new(CanvasHandle::new(8, 8), RendererOptions::default());
        renderer.dispose();
        let err = renderer.render(&context.scene, &context.camera).unwrap_err();
        assert!(format!("{err}").contains("disposed"));
    }

    #[test]
    fn size_mismatch_is_reported() {
        let context = SceneContext::new();
        let canvas = CanvasHandle::new(8, 8);
        let mut renderer = SceneRenderer::new(canvas.clone(), RendererOptions::default());
        canvas.set_size(10, 10);
        assert!(renderer.render(&context.scene, &context.camera).is_err());
        renderer.set_size(10, 10);
        assert!(renderer.render(&context.scene, &context.camera).is_ok());
    }

    #[test]
    fn pixel_ratio_scales_the_drawing_buffer() {
        let canvas = CanvasHandle::new(100, 50);
        let mut renderer = SceneRenderer::new(canvas.clone(), RendererOptions::default());
        renderer.set_pixel_ratio(2.0);
        assert_eq!(renderer.size(), (100, 50));
        assert_eq!(canvas.size(), (200, 100));
    }
}
