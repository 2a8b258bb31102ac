use thiserror::Error;

/// Failures reported by an [`crate::AstronomyEngine`] implementation.
///
/// Callers degrade on these: the calculator logs and serves an empty time
/// set ("no events today") rather than propagating.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("astronomy engine failure: {0}")]
    Computation(String),
    #[error("invalid location: latitude {0}, longitude {1}")]
    InvalidLocation(f64, f64),
}

impl EngineError {
    pub fn computation(message: impl Into<String>) -> Self {
        EngineError::Computation(message.into())
    }
}
