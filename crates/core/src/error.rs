/// Result alias that carries the custom [`LightsError`] type.
pub type Result<T> = std::result::Result<T, LightsError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum LightsError {
    /// Free-form message for conditions that do not warrant their own variant.
    #[error("{0}")]
    Message(String),
    /// A scene index outside the catalog. This is a caller bug, never a
    /// runtime condition, so it is never clamped.
    #[error("scene index {index} is out of range for a catalog of {len} scenes")]
    SceneOutOfRange { index: usize, len: usize },
    /// Opening or writing one of the serial links failed.
    #[error("transport error: {0}")]
    Transport(String),
    /// A sensor line that does not belong to the protocol.
    #[error("unrecognised sensor line `{0}`")]
    Parse(String),
    /// Loading or playing an audio track failed.
    #[error("playback error: {0}")]
    Playback(String),
    /// Invalid configuration values.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// Wrapper around configuration (de)serialisation errors.
    #[error("{0}")]
    Json(#[from] serde_json::Error),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
}

impl LightsError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    /// Returns true for errors that must stop the control loop.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::SceneOutOfRange { .. } | Self::Transport(_) | Self::Io(_) | Self::Config(_)
        )
    }
}

impl From<&str> for LightsError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for LightsError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
