#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Bus(#[from] flexenc_io::Error),

    #[error("frame error: control field echo or CRC mismatch")]
    Frame,

    #[error("One revolution data is deviated by any malfunction or defect at main power-on")]
    CountingError,

    #[error("Logic-OR of Over-heat, Multi-turn error, Battery error and Battery alarm")]
    LogicOr,

    #[error("Parity error in Request frame occurs")]
    ParityError,

    #[error("Delimiter error in Request frame occurs")]
    DelimiterError,

    #[error("EEPROM is busy")]
    EepromBusy,

    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
