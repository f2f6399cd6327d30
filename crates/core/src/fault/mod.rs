//! Containment of bootstrap, compile and frame failures.
//!
//! A failure is terminal for the code revision that caused it: the isolator
//! records it once, stops the loop and stays in [`RendererState::Error`]
//! until new code arrives.

use std::fmt;

use serde::Serialize;

use crate::VizError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RendererState {
    /// No code, not mounted, or waiting for the first bootstrap.
    #[default]
    Idle,
    Running,
    Error,
}

/// Where a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FaultStage {
    Bootstrap,
    Compile,
    Frame,
}

impl fmt::Display for FaultStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FaultStage::Bootstrap => "bootstrap",
            FaultStage::Compile => "compile",
            FaultStage::Frame => "frame",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorState {
    pub message: String,
    pub stage: FaultStage,
    /// Always true: nothing retries a failed revision.
    pub terminal: bool,
}

/// What the host shows in place of the visualization after a fault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorView {
    pub title: &'static str,
    pub message: String,
    /// The offending code, only when the caller asked for it.
    pub code: Option<String>,
}

impl fmt::Display for ErrorView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.title)?;
        write!(f, "{}", self.message)?;
        if let Some(code) = &self.code {
            write!(f, "\n\n{code}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct FaultIsolator {
    state: RendererState,
    error: Option<ErrorState>,
}

impl FaultIsolator {
    pub const ERROR_TITLE: &'static str = "Visualization Error";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> RendererState {
        self.state
    }

    pub fn error(&self) -> Option<&ErrorState> {
        self.error.as_ref()
    }

    pub fn is_running(&self) -> bool {
        self.state == RendererState::Running
    }

    /// Back to idle for a new revision; the previous error is forgotten.
    pub fn reset(&mut self) {
        self.state = RendererState::Idle;
        self.error = None;
    }

    /// Marks the loop as running. Refused while a fault is recorded.
    pub fn start(&mut self) -> bool {
        if self.state == RendererState::Error {
            return false;
        }
        self.state = RendererState::Running;
        true
    }

    /// Back to idle without touching a recorded fault.
    pub fn pause(&mut self) {
        if self.state == RendererState::Running {
            self.state = RendererState::Idle;
        }
    }

    /// Records `err`. Only the first fault of a revision is kept.
    pub fn record(&mut self, stage: FaultStage, err: &VizError) {
        if self.state == RendererState::Error {
            tracing::debug!(%stage, error = %err, "fault after terminal error ignored");
            return;
        }
        let message = err.to_string();
        tracing::error!(%stage, error = %message, "visualization fault");
        self.state = RendererState::Error;
        self.error = Some(ErrorState {
            message,
            stage,
            terminal: true,
        });
    }

    /// Runs `f`, recording its error. `None` means it failed.
    pub fn guard<T>(&mut self, stage: FaultStage, f: impl FnOnce() -> crate::Result<T>) -> Option<T> {
        match f() {
            Ok(value) => Some(value),
            Err(err) => {
                self.record(stage, &err);
                None
            }
        }
    }

    pub fn view(&self, code: Option<&str>) -> Option<ErrorView> {
        self.error.as_ref().map(|error| ErrorView {
            title: Self::ERROR_TITLE,
            message: error.message.clone(),
            code: code.map(str::to_string),
        })
    }
}
