use thiserror::Error;

/// Crate-wide error type. Transient channel faults (drop, corrupt, reorder)
/// are repaired in-band by the state machines and never surface as a value
/// of this type — only protocol- and host-level faults do.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("frame too short: got {got} bytes, need {want}")]
    FrameTooShort { got: usize, want: usize },

    #[error("unexpected flag {0:#x} for this state")]
    UnexpectedFlag(u8),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

pub type TransferResult<T> = Result<T, TransferError>;
