use crate::Baudrate;

/// Transport-level failures reported synchronously by [`crate::Bus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("transmitter is busy")]
    TxBusy,

    #[error("receiver is busy")]
    RxBusy,

    #[error("timed out waiting for the shifter")]
    Timeout,

    #[error("no transfer in progress")]
    NoTransferInProgress,

    #[error("{baudrate} is not reachable from a {src_clock_hz} Hz source clock")]
    BaudrateNotSupported {
        baudrate: Baudrate,
        src_clock_hz: u32,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
