#![forbid(unsafe_code)]

//! Runtime errors: configuration and wire decoding.

/// Errors from runtime configuration and message decoding.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// An unrecognized host name.
    #[error("unknown host kind '{0}'")]
    UnknownHost(String),

    /// A configuration variable held an unusable value.
    #[error("invalid value '{value}' for {key}")]
    InvalidConfig { key: &'static str, value: String },

    /// An inbound message did not have the expected shape.
    #[error("malformed wire message: {0}")]
    Wire(String),

    /// A binding operation failed while setting up a widget.
    #[error(transparent)]
    Bind(#[from] nbwire_core::Error),

    /// The global tracing subscriber could not be installed.
    #[error("logging init failed: {0}")]
    Logging(String),
}
