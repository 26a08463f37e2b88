use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failure categories surfaced by the virtual machine.
///
/// Integrity warnings (non-unitary matrices in debug mode, deallocation of an
/// entangled qubit, collapse on a near-null branch) are not errors: they are
/// reported through [`log::warn!`] and never abort an operation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error("capacity exceeded: {0}")]
    CapacityExceeded(String),

    #[error("invalid qubit reference: {0}")]
    InvalidQubitReference(String),

    #[error("invalid bytecode at offset {offset}: {reason}")]
    InvalidBytecode { offset: usize, reason: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("numeric failure: {0}")]
    NumericFailure(String),

    #[error("classical address {0} was never stored")]
    UnsetAddress(u8),

    #[error("wall-clock limit of {0} ms reached")]
    Timeout(u64),

    #[error("instruction limit of {0} reached")]
    InstructionLimit(u64),
}

impl Error {
    pub(crate) fn bytecode(offset: usize, reason: impl Into<String>) -> Self {
        Self::InvalidBytecode {
            offset,
            reason: reason.into(),
        }
    }
}
