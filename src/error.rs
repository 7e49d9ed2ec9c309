//! Error types for the pipeline.
//!
//! Almost nothing in the per-frame path returns an error: invalid geometry is rejected as
//! "no mesh", a missing texture draws untextured, an unavailable backend disables the
//! feature. Errors exist for startup (device creation, worker spawn) and configuration.

use thiserror::Error;

/// Errors reported by a native backend.
#[derive(Error, Debug)]
pub enum BackendError {
    /// A native entry point or symbol is missing. Treated as "feature disabled".
    #[error("backend entry point unavailable: {0}")]
    Unavailable(String),
    /// The backend refused a particular request (bad buffer, allocation failure).
    #[error("backend rejected request: {0}")]
    Rejected(String),
    /// The device itself could not be created. The only failure allowed to abort startup.
    #[error("failed to create backend device: {0}")]
    DeviceCreationFailed(String),
}

/// Result alias for backend calls.
pub type BackendResult<T> = Result<T, BackendError>;

/// Errors surfaced while constructing or configuring the pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Backend device creation failed.
    #[error(transparent)]
    Backend(#[from] BackendError),
    /// A background worker thread could not be started.
    #[error("failed to spawn worker thread: {0}")]
    WorkerSpawn(#[from] std::io::Error),
    /// The configuration document could not be parsed.
    #[error("invalid pipeline configuration: {0}")]
    InvalidConfig(#[from] serde_json::Error),
    /// A configuration value named a render category that does not exist.
    #[error("unknown render category '{0}'")]
    UnknownCategory(String),
}

/// Result alias for pipeline construction.
pub type PipelineResult<T> = Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = BackendError::Unavailable("nBeginPass".to_string());
        assert_eq!(err.to_string(), "backend entry point unavailable: nBeginPass");

        let err: PipelineError = BackendError::DeviceCreationFailed("no adapter".into()).into();
        assert_eq!(err.to_string(), "failed to create backend device: no adapter");

        let err = PipelineError::UnknownCategory("lava".into());
        assert_eq!(err.to_string(), "unknown render category 'lava'");
    }
}
