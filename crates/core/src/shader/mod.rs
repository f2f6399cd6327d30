//! Full-surface fragment shading.
//!
//! Every pixel of the canvas is produced by a [`FragmentShader`] from its
//! `uv` coordinate and a small set of [`ShaderUniforms`]: elapsed time, the
//! surface resolution and a 128-texel audio texture filled from the
//! analyser's frequency bytes. [`DefaultShader`] is the built-in
//! visualization shown before anything has been generated; [`ScriptShader`]
//! runs a Rhai `fragment` function per pixel.

use std::time::Instant;

use glam::{DVec2, DVec3, DVec4};
use rhai::{Array, CallFnOptions, Dynamic, Engine, Scope, AST};

use crate::{
    audio::AnalysisSource,
    canvas::CanvasHandle,
    config::RenderConfig,
    engine::{AudioInput, TickReport},
    script::as_number,
    timeline::FrameClock,
    Result, VizError,
};

/// Width of the audio texture in texels.
pub const AUDIO_TEXTURE_WIDTH: usize = 128;

/// Name and arity of the function a script shader must define.
pub const FRAGMENT_ENTRY: &str = "fragment";
const FRAGMENT_PARAMS: usize = 5;

pub const DEFAULT_DESCRIPTION: &str = "A default audio visualizer that displays a pulsing circle \
that reacts to bass frequencies, with ripples that respond to midrange frequencies, and a color \
gradient affected by treble.";

/// One row of frequency bytes sampled with nearest filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioTexture {
    texels: [u8; AUDIO_TEXTURE_WIDTH],
}

impl Default for AudioTexture {
    fn default() -> Self {
        Self {
            texels: [0; AUDIO_TEXTURE_WIDTH],
        }
    }
}

impl AudioTexture {
    pub fn texels(&self) -> &[u8] {
        &self.texels
    }

    /// Copies the leading bins; texels past the end of `frequency` read zero.
    pub fn update_from(&mut self, frequency: &[u8]) {
        let len = frequency.len().min(AUDIO_TEXTURE_WIDTH);
        self.texels[..len].copy_from_slice(&frequency[..len]);
        self.texels[len..].fill(0);
    }

    pub fn clear(&mut self) {
        self.texels.fill(0);
    }

    /// Red channel at horizontal texture coordinate `u`, in `0.0..=1.0`.
    pub fn sample(&self, u: f64) -> f64 {
        let index = if u.is_finite() {
            ((u * AUDIO_TEXTURE_WIDTH as f64).floor().max(0.0) as usize).min(AUDIO_TEXTURE_WIDTH - 1)
        } else {
            0
        };
        self.texels[index] as f64 / 255.0
    }
}

#[derive(Debug, Clone, Default)]
pub struct ShaderUniforms {
    /// Seconds since the shader was loaded.
    pub time: f64,
    /// Surface size in pixels.
    pub resolution: DVec2,
    pub audio: AudioTexture,
}

pub trait FragmentShader {
    /// Colour for `uv` (origin bottom-left) as RGBA in `0.0..=1.0`.
    /// Components outside that range are clamped when written.
    fn shade(&self, uv: DVec2, uniforms: &ShaderUniforms) -> Result<DVec4>;
}

/// Pulsing circle on a gradient: bass drives the radius, midrange the
/// ripples and treble the gradient offset.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultShader;

impl FragmentShader for DefaultShader {
    fn shade(&self, uv: DVec2, uniforms: &ShaderUniforms) -> Result<DVec4> {
        let level = |index: f64| uniforms.audio.sample(index / AUDIO_TEXTURE_WIDTH as f64);
        let bass = level(0.05);
        let midrange = level(0.3);
        let treble = level(0.8);
        let time = uniforms.time;

        let dist = (uv - DVec2::splat(0.5)).length();
        let circle = smoothstep(0.3 + bass * 0.2, 0.29 + bass * 0.2, dist);
        let ripple = ((dist * 50.0 - time * 2.0).sin() * 0.5 + 0.5) * midrange * 0.2;

        let mut color = mix(DVec3::new(0.0, 0.5, 1.0), DVec3::new(1.0, 0.0, 0.5), dist + treble * 0.5);
        color = mix(color, DVec3::ONE, circle);
        color += DVec3::splat(ripple);
        color += DVec3::splat(0.05 * (time + uv.x * 10.0).sin() * (time + uv.y * 10.0).sin());

        Ok(color.extend(1.0))
    }
}

fn smoothstep(edge0: f64, edge1: f64, x: f64) -> f64 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

fn mix(a: DVec3, b: DVec3, t: f64) -> DVec3 {
    a + (b - a) * t
}

/// A Rhai script defining `fn fragment(u, v, time, audio, resolution)`.
///
/// `audio` is the texture as a blob, `resolution` a `[width, height]`
/// array. The function returns `[r, g, b]` or `[r, g, b, a]`.
pub struct ScriptShader {
    engine: Engine,
    ast: AST,
}

impl ScriptShader {
    pub fn compile(code: &str, config: &RenderConfig) -> Result<Self> {
        let mut engine = Engine::new();
        engine.set_max_operations(config.max_operations);
        engine.on_print(|text| tracing::info!(target: "script", "{text}"));

        let ast = engine
            .compile(code)
            .map_err(|err| VizError::Compile(format!("Failed to compile shader: {err}")))?;
        let has_entry = ast
            .iter_functions()
            .any(|f| f.name == FRAGMENT_ENTRY && f.params.len() == FRAGMENT_PARAMS);
        if !has_entry {
            return Err(VizError::Compile(format!(
                "shader must define fn {FRAGMENT_ENTRY}(u, v, time, audio, resolution)"
            )));
        }
        tracing::info!("compiled script shader");
        Ok(Self { engine, ast })
    }
}

impl FragmentShader for ScriptShader {
    fn shade(&self, uv: DVec2, uniforms: &ShaderUniforms) -> Result<DVec4> {
        let mut scope = Scope::new();
        let resolution: Array = vec![
            Dynamic::from_float(uniforms.resolution.x),
            Dynamic::from_float(uniforms.resolution.y),
        ];
        let out: Dynamic = self
            .engine
            .call_fn_with_options(
                CallFnOptions::new().eval_ast(false),
                &mut scope,
                &self.ast,
                FRAGMENT_ENTRY,
                (uv.x, uv.y, uniforms.time, uniforms.audio.texels().to_vec(), resolution),
            )
            .map_err(|err| VizError::msg(err.to_string()))?;
        color_from(out)
    }
}

impl std::fmt::Debug for ScriptShader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptShader").finish()
    }
}

fn color_from(value: Dynamic) -> Result<DVec4> {
    let type_name = value.type_name();
    let Some(parts) = value.try_cast::<Array>() else {
        return Err(VizError::msg(format!(
            "{FRAGMENT_ENTRY} must return an array of 3 or 4 numbers, got {type_name}"
        )));
    };
    let channels: Option<Vec<f64>> = parts.iter().map(as_number).collect();
    match channels.as_deref() {
        Some(&[r, g, b]) => Ok(DVec4::new(r, g, b, 1.0)),
        Some(&[r, g, b, a]) => Ok(DVec4::new(r, g, b, a)),
        _ => Err(VizError::msg(format!(
            "{FRAGMENT_ENTRY} must return an array of 3 or 4 numbers"
        ))),
    }
}

fn to_bytes(color: DVec4) -> [u8; 4] {
    color
        .to_array()
        .map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8)
}

/// Drives a fragment shader over a canvas once per tick.
pub struct ShaderVisualizer {
    canvas: CanvasHandle,
    shader: Box<dyn FragmentShader>,
    audio: AudioInput,
    uniforms: ShaderUniforms,
    clock: FrameClock,
    ticks: u64,
}

impl ShaderVisualizer {
    /// Starts with [`DefaultShader`].
    pub fn new(canvas: CanvasHandle) -> Self {
        Self::with_shader(canvas, Box::new(DefaultShader))
    }

    pub fn with_shader(canvas: CanvasHandle, shader: Box<dyn FragmentShader>) -> Self {
        Self {
            canvas,
            shader,
            audio: AudioInput::new(),
            uniforms: ShaderUniforms::default(),
            clock: FrameClock::start(),
            ticks: 0,
        }
    }

    /// Swaps the shader and restarts time.
    pub fn set_shader(&mut self, shader: Box<dyn FragmentShader>) {
        self.shader = shader;
        self.clock.restart();
        self.ticks = 0;
    }

    pub fn attach_audio(&mut self, source: Option<Box<dyn AnalysisSource>>) {
        self.audio.attach(source);
    }

    pub fn canvas(&self) -> &CanvasHandle {
        &self.canvas
    }

    pub fn uniforms(&self) -> &ShaderUniforms {
        &self.uniforms
    }

    pub fn clock(&self) -> &FrameClock {
        &self.clock
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn tick(&mut self) -> Result<TickReport> {
        self.tick_at(Instant::now())
    }

    /// Refreshes the uniforms and shades every pixel. A failing shader
    /// leaves the previous frame on the canvas.
    pub fn tick_at(&mut self, now: Instant) -> Result<TickReport> {
        let tick = self.ticks + 1;
        let audio_active = self.audio.refresh();
        match (audio_active, self.audio.buffers()) {
            (true, Some(buffers)) => self.uniforms.audio.update_from(&buffers.frequency),
            _ => self.uniforms.audio.clear(),
        }
        let (width, height) = self.canvas.size();
        self.uniforms.time = self.clock.elapsed_seconds(now);
        self.uniforms.resolution = DVec2::new(width as f64, height as f64);

        self.render(width, height).map_err(|err| VizError::Frame {
            tick,
            message: err.to_string(),
        })?;
        self.ticks = tick;
        Ok(TickReport {
            tick,
            elapsed_seconds: self.uniforms.time,
            audio_active,
        })
    }

    fn render(&self, width: u32, height: u32) -> Result<()> {
        let mut pixels = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                let uv = DVec2::new(
                    (x as f64 + 0.5) / width as f64,
                    1.0 - (y as f64 + 0.5) / height as f64,
                );
                pixels.push(to_bytes(self.shader.shade(uv, &self.uniforms)?));
            }
        }
        let mut surface = self.canvas.surface_mut();
        for (i, rgba) in pixels.into_iter().enumerate() {
            let (x, y) = (i as u32 % width, i as u32 / width);
            surface.put_pixel(x, y, rgba);
        }
        Ok(())
    }
}

impl std::fmt::Debug for ShaderVisualizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShaderVisualizer")
            .field("size", &self.canvas.size())
            .field("audio", &self.audio)
            .field("ticks", &self.ticks)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        cell::Cell,
        rc::Rc,
        time::Duration,
    };

    use super::*;

    struct LevelSource {
        level: u8,
        active: Rc<Cell<bool>>,
    }

    impl AnalysisSource for LevelSource {
        fn fft_size(&self) -> usize {
            256
        }

        fn time_domain_bytes(&self, out: &mut [u8]) -> Result<()> {
            out.fill(128);
            Ok(())
        }

        fn frequency_bytes(&self, out: &mut [u8]) -> Result<()> {
            out.fill(self.level);
            Ok(())
        }

        fn is_active(&self) -> bool {
            self.active.get()
        }
    }

    fn uniforms(time: f64, level: u8) -> ShaderUniforms {
        let mut uniforms = ShaderUniforms {
            time,
            resolution: DVec2::new(100.0, 100.0),
            ..Default::default()
        };
        uniforms.audio.update_from(&[level; AUDIO_TEXTURE_WIDTH]);
        uniforms
    }

    #[test]
    fn audio_texture_keeps_leading_bins_and_zero_fills() {
        let mut texture = AudioTexture::default();
        let bins: Vec<u8> = (0..200).map(|i| i as u8).collect();
        texture.update_from(&bins);
        assert_eq!(texture.texels()[127], 127);

        texture.update_from(&[255; 4]);
        assert_eq!(&texture.texels()[..5], &[255, 255, 255, 255, 0]);
        assert_eq!(texture.sample(0.0), 1.0);
        assert_eq!(texture.sample(5.0 / 128.0), 0.0);
        assert_eq!(texture.sample(-3.0), 1.0);

        texture.clear();
        assert!(texture.texels().iter().all(|t| *t == 0));
    }

    #[test]
    fn default_shader_paints_a_white_core_on_a_gradient() {
        let silent = uniforms(0.0, 0);
        let core = DefaultShader.shade(DVec2::splat(0.5), &silent).unwrap();
        assert_eq!(to_bytes(core), [255, 255, 255, 255]);

        let corner = DefaultShader.shade(DVec2::ZERO, &silent).unwrap();
        let dist = 0.5_f64.hypot(0.5);
        assert!((corner.x - dist).abs() < 1e-9);
        assert!((corner.y - 0.5 * (1.0 - dist)).abs() < 1e-9);
        assert!((corner.z - (1.0 - 0.5 * dist)).abs() < 1e-9);
    }

    #[test]
    fn bass_widens_the_circle() {
        let uv = DVec2::new(0.9, 0.5);
        let quiet = DefaultShader.shade(uv, &uniforms(0.0, 0)).unwrap();
        let loud = DefaultShader.shade(uv, &uniforms(0.0, 255)).unwrap();
        assert!(quiet.y < 0.5);
        assert!(loud.x >= 0.99 && loud.y >= 0.99 && loud.z >= 0.99);
    }

    #[test]
    fn silent_run_fills_every_pixel_and_measures_time() {
        let canvas = CanvasHandle::new(6, 4);
        let mut viz = ShaderVisualizer::new(canvas.clone());
        let origin = viz.clock().origin();

        let report = viz.tick_at(origin + Duration::from_millis(500)).unwrap();
        assert_eq!(report.tick, 1);
        assert!(!report.audio_active);
        assert!((report.elapsed_seconds - 0.5).abs() < 1e-9);
        assert_eq!(viz.uniforms().resolution, DVec2::new(6.0, 4.0));
        assert!(canvas.surface().as_rgba().chunks_exact(4).all(|px| px[3] == 255));
    }

    #[test]
    fn live_audio_fills_the_texture_and_stopping_clears_it() {
        let active = Rc::new(Cell::new(true));
        let mut viz = ShaderVisualizer::new(CanvasHandle::new(2, 2));
        viz.attach_audio(Some(Box::new(LevelSource {
            level: 200,
            active: active.clone(),
        })));

        assert!(viz.tick().unwrap().audio_active);
        assert!(viz.uniforms().audio.texels().iter().all(|t| *t == 200));

        active.set(false);
        let report = viz.tick().unwrap();
        assert!(!report.audio_active);
        assert_eq!(report.tick, 2);
        assert!(viz.uniforms().audio.texels().iter().all(|t| *t == 0));
    }

    #[test]
    fn script_shader_receives_uv_and_audio() {
        let shader = ScriptShader::compile(
            "fn fragment(u, v, time, audio, resolution) { [u, v, audio[0] / 255.0] }",
            &RenderConfig::default(),
        )
        .unwrap();
        let canvas = CanvasHandle::new(2, 2);
        let mut viz = ShaderVisualizer::with_shader(canvas.clone(), Box::new(shader));
        viz.attach_audio(Some(Box::new(LevelSource {
            level: 255,
            active: Rc::new(Cell::new(true)),
        })));
        viz.tick().unwrap();

        assert_eq!(canvas.surface().pixel(0, 0), Some([64, 191, 255, 255]));
        assert_eq!(canvas.surface().pixel(1, 1), Some([191, 64, 255, 255]));
    }

    #[test]
    fn script_shader_requires_the_entry_point() {
        let err = ScriptShader::compile("fn paint() { 1 }", &RenderConfig::default()).unwrap_err();
        assert!(matches!(err, VizError::Compile(message) if message.contains("fn fragment")));

        let err = ScriptShader::compile("fn fragment(u, v) {", &RenderConfig::default()).unwrap_err();
        assert!(matches!(err, VizError::Compile(message) if message.starts_with("Failed to compile shader")));
    }

    #[test]
    fn failing_shader_keeps_the_previous_frame() {
        let canvas = CanvasHandle::new(3, 3);
        let mut viz = ShaderVisualizer::new(canvas.clone());
        viz.tick().unwrap();
        let before = canvas.surface().as_rgba().to_vec();

        let shader = ScriptShader::compile(
            r#"fn fragment(u, v, time, audio, resolution) { if u > 0.5 { throw "too far"; } [0, 0, 0] }"#,
            &RenderConfig::default(),
        )
        .unwrap();
        viz.set_shader(Box::new(shader));
        let err = viz.tick().unwrap_err();

        assert!(matches!(err, VizError::Frame { tick: 1, ref message } if message.contains("too far")));
        assert_eq!(viz.ticks(), 0);
        assert_eq!(canvas.surface().as_rgba(), &before[..]);
    }

    #[test]
    fn non_colour_return_is_an_error() {
        let shader = ScriptShader::compile(
            r#"fn fragment(u, v, time, audio, resolution) { "red" }"#,
            &RenderConfig::default(),
        )
        .unwrap();
        let err = shader.shade(DVec2::ZERO, &ShaderUniforms::default()).unwrap_err();
        assert!(err.to_string().contains("got string"));
    }
}
