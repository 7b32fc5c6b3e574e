use crate::{Command, EncoderStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Bus(#[from] flexenc_io::Error),

    #[error("encoder address {0:#04x} is out of range")]
    OutOfRange(u8),

    #[error("{0} cannot be sent as a sync request")]
    NotSyncCommand(Command),

    #[error("frame error: command echo or CRC mismatch")]
    Frame,

    #[error("encoder reports {0:?}")]
    Encoder(EncoderStatus),

    #[error("{errors} of {slots} encoder responses failed")]
    Failed { errors: usize, slots: usize },

    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
