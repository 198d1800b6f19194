//! Umbrella error type

use crate::config::ConfigError;
use crate::link::LinkError;
use crate::mirror::MirrorError;
use crate::object::RuntimeError;
use crate::pool::PoolError;
use crate::proxy::ProxyError;
use crate::verify::{BytecodeAccessViolation, VerifyError};
use thiserror::Error;

/// Any failure of the retargeting engine
#[derive(Debug, Error)]
pub enum RetargetError {
    /// Unit resolution or definition failed
    #[error(transparent)]
    Pool(#[from] PoolError),

    /// Mirror synthesis failed
    #[error(transparent)]
    Mirror(#[from] MirrorError),

    /// A synthesized unit does not link
    #[error(transparent)]
    Link(#[from] LinkError),

    /// Generation code accesses a non-public member
    #[error(transparent)]
    Violation(#[from] BytecodeAccessViolation),

    /// Verification could not complete
    #[error(transparent)]
    Verify(VerifyError),

    /// Proxy synthesis failed
    #[error(transparent)]
    Proxy(#[from] ProxyError),

    /// A call on a runtime object failed
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    /// Configuration could not be loaded
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl From<VerifyError> for RetargetError {
    fn from(err: VerifyError) -> Self {
        match err {
            VerifyError::Violation(violation) => RetargetError::Violation(violation),
            other => RetargetError::Verify(other),
        }
    }
}

/// Result alias for engine operations
pub type Result<T> = std::result::Result<T, RetargetError>;
