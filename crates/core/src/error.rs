/// Result alias that carries the custom [`VizError`] type.
pub type Result<T> = std::result::Result<T, VizError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum VizError {
    /// Free-form message for failures that do not warrant their own variant.
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// A caller handed the core data it cannot work with.
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    /// Configuration failed validation.
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("{0}")]
    Json(#[from] serde_json::Error),
    #[error("fft failure: {0}")]
    Fft(#[from] realfft::FftError),
    #[error("image encoding failed: {0}")]
    Image(#[from] image::ImageError),
    /// A drawing surface, 2D context or renderer could not be built or used.
    #[error("{0}")]
    Backend(String),
    /// The generated code did not parse.
    #[error("{0}")]
    Compile(String),
    /// The generated code (or the render pass after it) failed during a tick.
    #[error("{message}")]
    Frame { tick: u64, message: String },
    /// A shared lock was poisoned by a panicking writer.
    #[error("{0} has been poisoned")]
    Poisoned(&'static str),
}

impl VizError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    pub fn backend<T: Into<String>>(msg: T) -> Self {
        Self::Backend(msg.into())
    }
}

impl From<&str> for VizError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for VizError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
