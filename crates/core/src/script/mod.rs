//! Compiles generated code once per revision and runs it once per tick.
//!
//! Snippets are Rhai scripts. Each invocation gets a fresh scope holding the
//! frame arguments, bound by name in a fixed order; that name list is the
//! contract the code generator is prompted with.

mod canvas_api;
mod three_api;

use rhai::{Blob, Dynamic, Engine, EvalAltResult, Scope, AST};

use crate::{
    canvas::{CanvasHandle, Context2dHandle},
    config::RenderConfig,
    mode::RenderMode,
    render::RendererHandle,
    scene::SceneContext,
    Result, VizError,
};

pub use three_api::ThreeNamespace;

pub(crate) type ScriptResult<T> = std::result::Result<T, Box<EvalAltResult>>;

/// Arguments bound for canvas snippets, in order.
pub const CANVAS_PARAMETERS: [&str; 9] = [
    "canvas",
    "ctx",
    "audioData",
    "frequencyData",
    "isAudioActive",
    "time",
    "THREE",
    "scene",
    "camera",
];

/// Arguments bound for scene snippets, in order.
pub const SCENE_PARAMETERS: [&str; 9] = [
    "canvas",
    "audioData",
    "frequencyData",
    "isAudioActive",
    "time",
    "THREE",
    "scene",
    "camera",
    "renderer",
];

/// Extra binding after the fixed arguments in both modes: the shared
/// object registry used for create-once guards.
pub const REGISTRY_BINDING: &str = "objects";

pub fn parameters(mode: RenderMode) -> &'static [&'static str] {
    match mode {
        RenderMode::Canvas => &CANVAS_PARAMETERS,
        RenderMode::Scene3d => &SCENE_PARAMETERS,
    }
}

/// A compiled code revision.
#[derive(Debug, Clone)]
pub struct FrameProgram {
    ast: AST,
    mode: RenderMode,
    revision: u64,
}

impl FrameProgram {
    pub fn mode(&self) -> RenderMode {
        self.mode
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }
}

/// Everything one call of the generated code receives.
#[derive(Debug, Clone)]
pub struct FrameInvocation {
    pub tick: u64,
    pub mode: RenderMode,
    pub canvas: CanvasHandle,
    /// Present in canvas mode only.
    pub context: Option<Context2dHandle>,
    pub time_domain: Option<Blob>,
    pub frequency: Option<Blob>,
    pub audio_active: bool,
    pub elapsed_seconds: f64,
    pub scene: SceneContext,
    /// Present in scene mode only.
    pub renderer: Option<RendererHandle>,
}

impl FrameInvocation {
    fn argument(&self, name: &str) -> Dynamic {
        fn optional<T: Clone + 'static>(value: &Option<T>) -> Dynamic {
            value.clone().map(Dynamic::from).unwrap_or(Dynamic::UNIT)
        }

        match name {
            "canvas" => Dynamic::from(self.canvas.clone()),
            "ctx" => optional(&self.context),
            "audioData" => self
                .time_domain
                .clone()
                .map(Dynamic::from_blob)
                .unwrap_or(Dynamic::UNIT),
            "frequencyData" => self
                .frequency
                .clone()
                .map(Dynamic::from_blob)
                .unwrap_or(Dynamic::UNIT),
            "isAudioActive" => Dynamic::from_bool(self.audio_active),
            "time" => Dynamic::from_float(self.elapsed_seconds),
            "THREE" => Dynamic::from(ThreeNamespace),
            "scene" => Dynamic::from(self.scene.scene.clone()),
            "camera" => Dynamic::from(self.scene.camera.clone()),
            "renderer" => optional(&self.renderer),
            REGISTRY_BINDING => Dynamic::from(self.scene.objects.clone()),
            _ => Dynamic::UNIT,
        }
    }

    /// Binds the arguments for this invocation's mode into a new scope.
    pub fn to_scope(&self) -> Scope<'static> {
        let mut scope = Scope::new();
        for name in parameters(self.mode) {
            scope.push_dynamic(*name, self.argument(name));
        }
        scope.push_dynamic(REGISTRY_BINDING, self.argument(REGISTRY_BINDING));
        scope
    }
}

/// Owns the Rhai engine with the drawing and scene APIs registered.
pub struct ScriptHost {
    engine: Engine,
}

impl ScriptHost {
    pub fn new(config: &RenderConfig) -> Self {
        let mut engine = Engine::new();

        // Zero leaves the engine unbounded: a snippet that never returns
        // blocks the loop.
        engine.set_max_operations(config.max_operations);

        engine.on_print(|text| tracing::info!(target: "script", "{text}"));
        engine.on_debug(|text, source, pos| {
            tracing::debug!(target: "script", source = source.unwrap_or(""), %pos, "{text}")
        });

        canvas_api::register(&mut engine);
        three_api::register(&mut engine);

        Self { engine }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Parses `code` into a program for `mode`.
    pub fn compile(&self, code: &str, mode: RenderMode, revision: u64) -> Result<FrameProgram> {
        let ast = self
            .engine
            .compile(code)
            .map_err(|err| VizError::Compile(format!("Failed to compile visualization: {err}")))?;
        tracing::info!(%mode, revision, "compiled generated code");
        Ok(FrameProgram {
            ast,
            mode,
            revision,
        })
    }

    /// Runs `program` once against `invocation`.
    pub fn invoke(&self, program: &FrameProgram, invocation: &FrameInvocation) -> Result<()> {
        if program.mode != invocation.mode {
            return Err(VizError::Frame {
                tick: invocation.tick,
                message: format!(
                    "program compiled for {} but invoked in {} mode",
                    program.mode, invocation.mode
                ),
            });
        }
        let mut scope = invocation.to_scope();
        self.engine
            .run_ast_with_scope(&mut scope, &program.ast)
            .map_err(|err| VizError::Frame {
                tick: invocation.tick,
                message: err.to_string(),
            })
    }
}

impl std::fmt::Debug for ScriptHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptHost").finish()
    }
}

/// Reads an int or float argument.
pub(crate) fn number(call: &str, value: &Dynamic) -> ScriptResult<f64> {
    as_number(value)
        .ok_or_else(|| format!("{call} expects a number, got {}", value.type_name()).into())
}

pub(crate) fn as_number(value: &Dynamic) -> Option<f64> {
    value
        .as_float()
        .ok()
        .or_else(|| value.as_int().ok().map(|v| v as f64))
}

pub(crate) fn numbers<const N: usize>(call: &str, values: [&Dynamic; N]) -> ScriptResult<[f64; N]> {
    let mut out = [0.0; N];
    for (slot, value) in out.iter_mut().zip(values) {
        *slot = number(call, value)?;
    }
    Ok(out)
}
