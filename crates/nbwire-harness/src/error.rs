#![forbid(unsafe_code)]

/// Harness setup failures.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    /// No comm target is registered under this name.
    #[error("no comm target '{0}'")]
    NoTarget(String),

    /// A comm operation was requested on a broadcast session.
    #[error("session is not connected over comm")]
    NotComm,

    #[error(transparent)]
    Runtime(#[from] nbwire_runtime::RuntimeError),
}
