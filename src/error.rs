use thiserror::Error;

/// Failure taxonomy for operator creation and binding.
///
/// Every failure is detected synchronously at the violated precondition and
/// returned immediately; nothing partially constructed survives an error.
/// A human-readable diagnostic naming the offending parameter is logged
/// before the error value is produced.
#[derive(Debug, Error)]
pub enum OperatorError {
    /// The kernel context has not completed capability discovery.
    #[error("kernel context is not initialized")]
    Uninitialized,
    /// A caller-supplied value is outside its valid domain.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    /// A value is in-domain but violates a numeric precondition of the
    /// fixed-point requantization path.
    #[error("unsupported parameter: {0}")]
    UnsupportedParameter(String),
    /// Allocation of the packed weight buffer failed.
    #[error("out of memory: {0}")]
    OutOfMemory(String),
}

pub type OperatorResult<T> = Result<T, OperatorError>;
