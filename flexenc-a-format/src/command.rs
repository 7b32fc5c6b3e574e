use std::fmt::Display;

use strum::VariantArray;

use crate::{Error, Result};

pub const MAX_ENCODERS: u8 = 8;

/// Command code (CC) of a command data frame.
///
/// `It*` commands address one encoder, `Mt*` commands make every encoder
/// from address 0 up to the given one answer in turn.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, VariantArray, strum::Display)]
pub enum Command {
    ItAbsFull = 0,
    ItAbsLower24 = 1,
    ItAbsUpper24 = 2,
    ItEncoderStatus = 3,
    MtAbsFull = 4,
    MtAbsLower24 = 5,
    MtAbsUpper24 = 6,
    MtEncoderStatus = 7,
    ClearStatus = 8,
    ClearMultiTurn = 9,
    ClearStatusMultiTurn = 10,
    SetAddressOneToOne = 11,
    PresetSingleTurnZero = 12,
    MemoryRead = 13,
    MemoryWrite = 14,
    Temperature = 15,
    IdRead = 16,
    IdReadOneToOne = 17,
    IdWrite = 18,
    IdWriteOneToOne = 19,
    SetAddressMatchingId = 20,
    ItAbsLower17 = 21,
    MtAbsLower17 = 22,
    ItAbsLower24Status = 27,
    MtAbsLower24Status = 28,
    ItAbsLower24Temperature = 29,
    MtAbsLower24Temperature = 30,
}

impl Command {
    pub const fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::VARIANTS.iter().copied().find(|c| c.code() == code)
    }

    pub const fn is_multi(self) -> bool {
        matches!(
            self,
            Self::MtAbsFull
                | Self::MtAbsLower24
                | Self::MtAbsUpper24
                | Self::MtEncoderStatus
                | Self::MtAbsLower17
                | Self::MtAbsLower24Status
                | Self::MtAbsLower24Temperature
        )
    }

    /// Commands that need memory data frames after the command data frame
    /// cannot be retriggered by the sync input.
    pub const fn supports_sync(self) -> bool {
        !matches!(
            self,
            Self::MemoryRead | Self::MemoryWrite | Self::IdWrite | Self::IdWriteOneToOne
        )
    }

    /// Halfwords answered by one encoder: the information field, the data
    /// fields and the CRC in the high byte of the last one.
    pub const fn words_per_slot(self) -> usize {
        match self {
            Self::ItAbsFull
            | Self::MtAbsFull
            | Self::ItAbsLower24Status
            | Self::MtAbsLower24Status
            | Self::ItAbsLower24Temperature
            | Self::MtAbsLower24Temperature => 4,
            Self::ItAbsLower17 | Self::MtAbsLower17 => 2,
            _ => 3,
        }
    }

    /// Frames sent for one request, which sizes the DR window.
    pub const fn request_frames(self) -> usize {
        match self {
            Self::MemoryRead => 2,
            Self::MemoryWrite
            | Self::IdWrite
            | Self::IdWriteOneToOne
            | Self::SetAddressMatchingId => 4,
            _ => 1,
        }
    }
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, VariantArray, strum::Display)]
pub enum ClearKind {
    Status = 8,
    MultiTurn = 9,
    StatusMultiTurn = 10,
    SingleTurnZero = 12,
}

impl ClearKind {
    pub const fn command(self) -> Command {
        match self {
            Self::Status => Command::ClearStatus,
            Self::MultiTurn => Command::ClearMultiTurn,
            Self::StatusMultiTurn => Command::ClearStatusMultiTurn,
            Self::SingleTurnZero => Command::PresetSingleTurnZero,
        }
    }
}

/// Encoder address (EA) with the multi-transmission flag in bit 7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address(u8);

impl Address {
    const MULTI: u8 = 0x80;

    pub const fn single(index: u8) -> Self {
        Self(index & 0x7)
    }

    /// Encoders `0..=index` answer.
    pub const fn multi(index: u8) -> Self {
        Self((index & 0x7) | Self::MULTI)
    }

    pub fn from_raw(raw: u8) -> Result<Self> {
        if raw & !Self::MULTI >= MAX_ENCODERS {
            return Err(Error::OutOfRange(raw));
        }
        Ok(Self(raw))
    }

    pub const fn raw(self) -> u8 {
        self.0
    }

    pub const fn index(self) -> u8 {
        self.0 & 0x7
    }

    pub const fn is_multi(self) -> bool {
        self.0 & Self::MULTI != 0
    }

    pub const fn encoders(self) -> usize {
        if self.is_multi() {
            self.index() as usize + 1
        } else {
            1
        }
    }

    /// Pick the individual or multiple transmission variant of a command.
    pub const fn pick(self, it: Command, mt: Command) -> Command {
        if self.is_multi() { mt } else { it }
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_multi() {
            write!(f, "0..={}", self.index())
        } else {
            write!(f, "{}", self.index())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_unique() {
        for command in Command::VARIANTS {
            assert_eq!(Command::from_code(command.code()), Some(*command));
        }
        for code in 23..27 {
            assert_eq!(Command::from_code(code), None);
        }
        assert_eq!(Command::from_code(31), None);
    }

    #[test]
    fn sync_rejected_for_memory_frames() {
        let rejected: Vec<_> = Command::VARIANTS
            .iter()
            .filter(|c| !c.supports_sync())
            .map(|c| c.code())
            .collect();
        assert_eq!(rejected, [13, 14, 18, 19]);
    }

    #[test]
    fn clear_kinds_match_codes() {
        for kind in ClearKind::VARIANTS {
            assert_eq!(kind.command().code(), *kind as u8);
        }
    }

    #[test]
    fn addresses() {
        assert_eq!(Address::from_raw(7), Ok(Address::single(7)));
        assert_eq!(Address::from_raw(0x83), Ok(Address::multi(3)));
        assert_eq!(Address::from_raw(8), Err(Error::OutOfRange(8)));
        assert_eq!(Address::from_raw(0x88), Err(Error::OutOfRange(0x88)));

        assert_eq!(Address::single(5).encoders(), 1);
        assert_eq!(Address::multi(5).encoders(), 6);
        assert_eq!(
            Address::multi(2).pick(Command::ItAbsFull, Command::MtAbsFull),
            Command::MtAbsFull
        );
        assert_eq!(Address::multi(2).to_string(), "0..=2");
    }
}
