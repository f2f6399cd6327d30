//! Core library for Promptviz.
//!
//! Generated visualisation snippets are compiled once per revision and run
//! once per frame against a drawing backend chosen from the snippet's mode
//! marker, with live audio analysis passed in as byte buffers. Each module
//! owns one subsystem (mode detection, backend bootstrap, frame execution,
//! fault isolation, audio analysis, etc.); [`Visualizer`] ties them together.
//! [`ShaderVisualizer`] is the per-pixel alternative, and it shows a built-in
//! visualization before any code has been generated.

pub mod analysis;
pub mod audio;
pub mod backend;
pub mod canvas;
pub mod config;
pub mod engine;
pub mod error;
pub mod fault;
pub mod mode;
pub mod record;
pub mod render;
pub mod scene;
pub mod script;
pub mod shader;
pub mod timeline;
pub mod visualizer;

pub use analysis::Analyser;
pub use audio::{AnalysisHandle, AnalysisSource, AudioEngine, AudioSource};
pub use backend::{BackendResources, Bootstrapper, ContainerSize, GraphicsHost, ResourceLedger, SoftwareHost};
pub use canvas::{CanvasHandle, Context2d, DrawCommand, Rgba};
pub use config::{AppConfig, AudioConfig, RenderConfig};
pub use engine::{FrameEngine, TickReport};
pub use error::{Result, VizError};
pub use fault::{ErrorState, ErrorView, FaultIsolator, RendererState};
pub use mode::{detect_mode, RenderMode};
pub use record::{FrameRecorder, RecordingSettings};
pub use render::SceneRenderer;
pub use scene::SceneContext;
pub use script::{FrameInvocation, FrameProgram, ScriptHost};
pub use shader::{DefaultShader, FragmentShader, ScriptShader, ShaderVisualizer};
pub use timeline::{FrameClock, FrameScheduler};
pub use visualizer::{GeneratedCode, TickOutcome, Visualizer};
