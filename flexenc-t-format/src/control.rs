use strum::VariantArray;

use crate::{Error, Result};

const SINK_CODE: u8 = 2;
const MASK_SINK_CODE: u8 = 0x07;
const MASK_DATA_ID: u8 = 0x78;

/// Control field (CF), the first byte of every request and response.
///
/// ```text
/// [7]   data ID parity
/// [6:3] data ID
/// [2:0] sink code (2)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ControlField(u8);

impl ControlField {
    pub const fn new(data_id: u8) -> Self {
        let id = data_id & 0xf;
        let parity = (id.count_ones() & 1) as u8;
        Self(SINK_CODE | (id << 3) | (parity << 7))
    }

    pub fn from_raw(raw: u8) -> Result<Self> {
        let field = Self::new((raw & MASK_DATA_ID) >> 3);
        if raw & MASK_SINK_CODE != SINK_CODE || field.0 != raw {
            return Err(Error::Frame);
        }
        Ok(field)
    }

    pub const fn raw(self) -> u8 {
        self.0
    }

    pub const fn data_id(self) -> u8 {
        (self.0 & MASK_DATA_ID) >> 3
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, VariantArray, strum::Display)]
pub enum Command {
    GetAbs,
    GetAbm,
    GetEncoderId,
    GetAll,
    ResetAllError,
    ResetAbs,
    ResetAbmError,
    EepromWrite,
    EepromRead,
}

impl Command {
    pub const fn data_id(self) -> u8 {
        match self {
            Self::GetAbs => 0x0,
            Self::GetAbm => 0x1,
            Self::GetEncoderId => 0x2,
            Self::GetAll => 0x3,
            Self::ResetAllError => 0x7,
            Self::ResetAbs => 0x8,
            Self::ResetAbmError => 0xc,
            Self::EepromWrite => 0x6,
            Self::EepromRead => 0xd,
        }
    }

    pub const fn control(self) -> ControlField {
        ControlField::new(self.data_id())
    }

    pub fn from_control(cf: ControlField) -> Option<Self> {
        Self::VARIANTS
            .iter()
            .copied()
            .find(|c| c.data_id() == cf.data_id())
    }

    /// Request bytes, CRC included.
    pub const fn request_len(self) -> usize {
        match self {
            Self::EepromWrite => 4,
            Self::EepromRead => 3,
            _ => 1,
        }
    }

    /// Response bytes, CRC included.
    pub const fn response_len(self) -> usize {
        match self {
            Self::GetEncoderId | Self::EepromWrite | Self::EepromRead => 4,
            Self::GetAll => 11,
            Self::GetAbs
            | Self::GetAbm
            | Self::ResetAllError
            | Self::ResetAbs
            | Self::ResetAbmError => 6,
        }
    }

    pub const fn is_eeprom(self) -> bool {
        matches!(self, Self::EepromWrite | Self::EepromRead)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, VariantArray, strum::Display)]
pub enum ResetKind {
    /// Clear every error flag.
    AllErrors,
    /// Zero the one-revolution data.
    SingleTurn,
    /// Zero the multi-turn data and clear every error flag.
    MultiTurnAndErrors,
}

impl ResetKind {
    pub const fn command(self) -> Command {
        match self {
            Self::AllErrors => Command::ResetAllError,
            Self::SingleTurn => Command::ResetAbs,
            Self::MultiTurnAndErrors => Command::ResetAbmError,
        }
    }
}
