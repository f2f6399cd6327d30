mod wav;

use std::{
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use clap::{Parser, Subcommand};
use promptviz_core::{
    shader::DEFAULT_DESCRIPTION, AppConfig, AudioEngine, AudioSource, CanvasHandle, ContainerSize,
    FaultIsolator, FrameRecorder, GeneratedCode, RendererState, ScriptShader, ShaderVisualizer,
    TickOutcome, Visualizer, VizError,
};
use tracing_subscriber::EnvFilter;

use crate::wav::DecodedAudio;

fn main() -> promptviz_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => run(args),
        Commands::Shader(args) => shader(args),
        Commands::Detect { code } => detect(&code),
    }
}

fn run(args: RunArgs) -> promptviz_core::Result<()> {
    let playback = &args.playback;
    let config = playback.config()?;
    let code = load_code(&args.code)?;
    let fps = config.recording.fps;
    tracing::info!(code = %args.code.display(), mode = %code.mode(), frames = playback.frames, fps, "starting run");

    let audio = playback.audio(&config)?;

    let mut visualizer = Visualizer::new(config.render.clone());
    visualizer.mount(ContainerSize::new(playback.width, playback.height));
    if let Some(feed) = &audio {
        visualizer.attach_audio(Some(Box::new(feed.engine.start(AudioSource::File)?)));
    }
    visualizer.set_code(code);

    let mut recorder = playback.recorder(&config)?;
    let origin = visualizer.clock().origin();
    let mut rendered = 0;

    for frame in 0..playback.frames {
        if let Some(feed) = &audio {
            feed.push(frame, fps)?;
        }

        let outcome = if playback.realtime {
            std::thread::sleep(frame_offset(1, fps));
            visualizer.tick()
        } else {
            visualizer.tick_at(origin + frame_offset(frame, fps))
        };

        match outcome {
            TickOutcome::Rendered(report) => {
                rendered += 1;
                if let Some(backend) = visualizer.backend() {
                    recorder.capture(report.tick, backend.canvas())?;
                }
            }
            TickOutcome::Faulted(_) => return fail(&visualizer, args.show_code),
            TickOutcome::Idle => break,
        }
    }

    recorder.stop()?;
    if visualizer.state() == RendererState::Error {
        return fail(&visualizer, args.show_code);
    }

    tracing::info!(
        rendered,
        captured = recorder.frames_written(),
        state = ?visualizer.state(),
        "run finished"
    );
    println!("rendered {rendered} frame(s) in {} mode", code_mode(&visualizer));
    Ok(())
}

fn shader(args: ShaderArgs) -> promptviz_core::Result<()> {
    let playback = &args.playback;
    let config = playback.config()?;
    let fps = config.recording.fps;

    let width = if playback.width == 0 { config.render.default_width } else { playback.width };
    let height = if playback.height == 0 { config.render.default_height } else { playback.height };
    let mut visualizer = ShaderVisualizer::new(CanvasHandle::new(width, height));
    match &args.script {
        Some(path) => {
            let code = std::fs::read_to_string(path)?;
            let compiled = ScriptShader::compile(&code, &config.render)
                .map_err(|err| report_error(err, args.show_code.then_some(code.as_str())))?;
            visualizer.set_shader(Box::new(compiled));
            tracing::info!(script = %path.display(), "shader loaded");
        }
        None => tracing::info!(description = DEFAULT_DESCRIPTION, "using the default shader"),
    }

    let audio = playback.audio(&config)?;
    if let Some(feed) = &audio {
        visualizer.attach_audio(Some(Box::new(feed.engine.start(AudioSource::File)?)));
    }

    let mut recorder = playback.recorder(&config)?;
    let origin = visualizer.clock().origin();

    for frame in 0..playback.frames {
        if let Some(feed) = &audio {
            feed.push(frame, fps)?;
        }

        let now = if playback.realtime {
            std::thread::sleep(frame_offset(1, fps));
            Instant::now()
        } else {
            origin + frame_offset(frame, fps)
        };
        let report = visualizer.tick_at(now).map_err(|err| report_error(err, None))?;
        recorder.capture(report.tick, visualizer.canvas())?;
    }

    recorder.stop()?;
    tracing::info!(rendered = visualizer.ticks(), captured = recorder.frames_written(), "shader run finished");
    println!("shaded {} frame(s) at {width}x{height}", visualizer.ticks());
    Ok(())
}

fn detect(path: &Path) -> promptviz_core::Result<()> {
    let code = load_code(path)?;
    println!("{}", code.mode());
    Ok(())
}

/// Reads raw code, or a generation response when the file is JSON.
fn load_code(path: &Path) -> promptviz_core::Result<GeneratedCode> {
    let raw = std::fs::read_to_string(path)?;
    let is_json = path.extension().is_some_and(|ext| ext == "json");
    if is_json {
        GeneratedCode::from_json(&raw)
    } else {
        Ok(GeneratedCode::new(raw, ""))
    }
}

fn fail(visualizer: &Visualizer, show_code: bool) -> promptviz_core::Result<()> {
    let Some(view) = visualizer.error_view(show_code) else {
        return Err(VizError::msg("visualization stopped without an error"));
    };
    eprintln!("{view}");
    Err(VizError::msg(view.message))
}

fn report_error(err: VizError, code: Option<&str>) -> VizError {
    eprintln!("{}\n{err}", FaultIsolator::ERROR_TITLE);
    if let Some(code) = code {
        eprintln!("\n{code}");
    }
    err
}

/// Simulated time of `frame` at `fps`.
fn frame_offset(frame: u64, fps: u32) -> Duration {
    Duration::from_secs_f64(frame as f64 / fps.max(1) as f64)
}

fn code_mode(visualizer: &Visualizer) -> String {
    visualizer
        .mode()
        .map(|mode| mode.to_string())
        .unwrap_or_else(|| "no".to_string())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

/// A decoded WAV file pushed into an analysis engine a frame at a time.
struct AudioFeed {
    engine: AudioEngine,
    decoded: DecodedAudio,
}

impl AudioFeed {
    fn push(&self, frame: u64, fps: u32) -> promptviz_core::Result<()> {
        let block = self.decoded.frame_block(frame, fps);
        if block.is_empty() && self.engine.is_active() {
            tracing::info!(frame, "audio exhausted");
            self.engine.stop()?;
        }
        self.engine.push_samples(block)
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Runs generated audio-reactive visualisations", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a snippet for a number of frames.
    Run(RunArgs),
    /// Run a per-pixel shader, or the built-in default visualization.
    Shader(ShaderArgs),
    /// Print the render mode a snippet declares.
    Detect {
        /// Snippet file, or a JSON generation response.
        code: PathBuf,
    },
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    /// Snippet file, or a JSON generation response.
    code: PathBuf,
    /// Include the snippet in error output.
    #[arg(long)]
    show_code: bool,
    #[command(flatten)]
    playback: PlaybackArgs,
}

#[derive(clap::Args, Debug)]
struct ShaderArgs {
    /// Rhai file defining `fn fragment(u, v, time, audio, resolution)`.
    script: Option<PathBuf>,
    /// Include the script in error output.
    #[arg(long)]
    show_code: bool,
    #[command(flatten)]
    playback: PlaybackArgs,
}

#[derive(clap::Args, Debug)]
struct PlaybackArgs {
    /// WAV file to analyse while rendering.
    #[arg(short, long)]
    audio: Option<PathBuf>,
    #[arg(short = 'n', long, default_value_t = 120)]
    frames: u64,
    /// Overrides the configured frame rate.
    #[arg(long)]
    fps: Option<u32>,
    /// Container width; 0 uses the configured default.
    #[arg(long, default_value_t = 0)]
    width: u32,
    #[arg(long, default_value_t = 0)]
    height: u32,
    /// JSON configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Write captured frames to this directory.
    #[arg(long)]
    record: Option<PathBuf>,
    /// Pace frames with the wall clock instead of simulated time.
    #[arg(long)]
    realtime: bool,
}

impl PlaybackArgs {
    fn config(&self) -> promptviz_core::Result<AppConfig> {
        let mut config = match &self.config {
            Some(path) => AppConfig::load(path)?,
            None => AppConfig::default(),
        };
        if let Some(fps) = self.fps {
            config.recording.fps = fps;
        }
        if let Some(dir) = &self.record {
            config.recording.output_dir = dir.display().to_string();
        }
        config.validate()?;
        Ok(config)
    }

    fn audio(&self, config: &AppConfig) -> promptviz_core::Result<Option<AudioFeed>> {
        let Some(path) = &self.audio else {
            return Ok(None);
        };
        let decoded = DecodedAudio::load(path)?;
        tracing::info!(
            path = %path.display(),
            sample_rate = decoded.sample_rate,
            seconds = decoded.duration_seconds(),
            "audio loaded"
        );
        let mut audio_config = config.audio.clone();
        audio_config.sample_rate = decoded.sample_rate;
        let engine = AudioEngine::new(audio_config)?;
        Ok(Some(AudioFeed { engine, decoded }))
    }

    fn recorder(&self, config: &AppConfig) -> promptviz_core::Result<FrameRecorder> {
        let mut recorder = FrameRecorder::new(config.recording.clone());
        if self.record.is_some() {
            recorder.start()?;
        }
        Ok(recorder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_offset_does_not_wrap_past_u32() {
        let frame = u32::MAX as u64 + 60;
        let offset = frame_offset(frame, 60);
        assert!((offset.as_secs_f64() - frame as f64 / 60.0).abs() < 1e-3);
        assert_eq!(frame_offset(90, 60), Duration::from_millis(1500));
    }

    #[test]
    fn shader_command_parses_without_a_script() {
        let cli = Cli::try_parse_from(["promptviz", "shader", "-n", "3", "--width", "32"]).unwrap();
        let Commands::Shader(args) = cli.command else {
            panic!("expected the shader command");
        };
        assert!(args.script.is_none());
        assert_eq!(args.playback.frames, 3);
        assert_eq!(args.playback.width, 32);
    }
}
