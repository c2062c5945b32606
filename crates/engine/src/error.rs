//! Engine-level error model.

use thiserror::Error;

use wayfare_core::DomainError;
use wayfare_infra::DispatchError;

/// Error returned by the reservation engine's trigger surface.
///
/// Domain rejections keep their reason codes so callers can surface them;
/// everything else is an infrastructure failure.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("infrastructure failure: {0}")]
    Infra(String),
}

impl From<DispatchError> for EngineError {
    fn from(value: DispatchError) -> Self {
        match value {
            DispatchError::Domain(e) => EngineError::Domain(e),
            other => EngineError::Infra(format!("{other:?}")),
        }
    }
}

impl EngineError {
    /// The domain rejection, if this is one.
    pub fn as_domain(&self) -> Option<&DomainError> {
        match self {
            EngineError::Domain(e) => Some(e),
            EngineError::Infra(_) => None,
        }
    }
}
