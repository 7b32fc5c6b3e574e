//! A-format frame layouts.
//!
//! Every frame is 16 data bits on the wire. Request frames carry a CRC3 over
//! bits 3..=12 in their top three bits, response slots end in a CRC8 over the
//! whole slot.

use flexenc_io::Crc;

use crate::{Command, EncoderStatus, Error, Result};

pub const CRC3: Crc = Crc::new(0x03, 3, true, true);
pub const CRC8: Crc = Crc::new(0x1d, 8, true, true);

const SYNC_CODE_CMD: u16 = 2;
const SYNC_CODE_IF: u16 = 4;
const FRAME_CODE_CDF: u16 = 0;

const MASK_SYNC_CODE: u16 = 0x0007;
const MASK_FRAME_CODE: u16 = 0x0018;
const MASK_CRC_RANGE: u16 = 0x1ff8;

fn crc3(raw: u16) -> u16 {
    let data = (raw & MASK_CRC_RANGE) << 3;
    u16::from(CRC3.compute(&data.to_le_bytes()))
}

fn check_header(raw: u16) -> Result<u16> {
    if raw & MASK_SYNC_CODE != SYNC_CODE_CMD || raw >> 13 != crc3(raw) {
        return Err(Error::Frame);
    }
    Ok((raw & MASK_FRAME_CODE) >> 3)
}

/// Command data frame (CDF).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandFrame {
    pub address: u8,
    pub command: Command,
}

impl CommandFrame {
    pub const fn new(address: u8, command: Command) -> Self {
        Self {
            address: address & 0x7,
            command,
        }
    }

    /// ```text
    /// [15:13] crc3
    /// [12: 8] command code
    /// [ 7: 5] encoder address
    /// [ 4: 3] frame code (0)
    /// [ 2: 0] sync code (2)
    /// ```
    pub fn to_raw(self) -> u16 {
        let raw = SYNC_CODE_CMD
            | (FRAME_CODE_CDF << 3)
            | (u16::from(self.address & 0x7) << 5)
            | (u16::from(self.command.code()) << 8);
        raw | (crc3(raw) << 13)
    }

    pub fn from_raw(raw: u16) -> Result<Self> {
        if check_header(raw)? != FRAME_CODE_CDF {
            return Err(Error::Frame);
        }
        let command = Command::from_code(((raw >> 8) & 0x1f) as u8).ok_or(Error::Frame)?;
        Ok(Self {
            address: ((raw >> 5) & 0x7) as u8,
            command,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::VariantArray)]
pub enum MemoryField {
    Mdf0,
    Mdf1,
    Mdf2,
}

impl MemoryField {
    const fn frame_code(self) -> u16 {
        match self {
            Self::Mdf0 => 1,
            Self::Mdf1 => 2,
            Self::Mdf2 => 3,
        }
    }
}

/// Memory data frame (MDF), sent after a CDF to carry 8 bits of address,
/// data or ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryFrame {
    pub field: MemoryField,
    pub data: u8,
}

impl MemoryFrame {
    pub const fn new(field: MemoryField, data: u8) -> Self {
        Self { field, data }
    }

    /// ```text
    /// [15:13] crc3
    /// [12: 5] data
    /// [ 4: 3] frame code (1..=3)
    /// [ 2: 0] sync code (2)
    /// ```
    pub fn to_raw(self) -> u16 {
        let raw = SYNC_CODE_CMD | (self.field.frame_code() << 3) | (u16::from(self.data) << 5);
        raw | (crc3(raw) << 13)
    }

    pub fn from_raw(raw: u16) -> Result<Self> {
        let field = match check_header(raw)? {
            1 => MemoryField::Mdf0,
            2 => MemoryField::Mdf1,
            3 => MemoryField::Mdf2,
            _ => return Err(Error::Frame),
        };
        Ok(Self {
            field,
            data: (raw >> 5) as u8,
        })
    }

    /// Three frames carrying the low 24 bits of `value`, least significant
    /// byte first.
    pub fn split(value: u32) -> [Self; 3] {
        let [b0, b1, b2, _] = value.to_le_bytes();
        [
            Self::new(MemoryField::Mdf0, b0),
            Self::new(MemoryField::Mdf1, b1),
            Self::new(MemoryField::Mdf2, b2),
        ]
    }
}

/// Information field (IF), the first halfword of every response slot.
///
/// ```text
/// [15:12] encoder status
/// [10: 6] command code echo
/// [ 5: 3] encoder address
/// [ 2: 0] sync code (4)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InfoField(pub u16);

impl InfoField {
    pub fn new(address: u8, command: Command, status: EncoderStatus) -> Self {
        Self(
            SYNC_CODE_IF
                | (u16::from(address & 0x7) << 3)
                | (u16::from(command.code()) << 6)
                | (u16::from(status.bits() & 0xf) << 12),
        )
    }

    pub const fn address(self) -> u8 {
        ((self.0 & 0x0038) >> 3) as u8
    }

    pub const fn command_code(self) -> u8 {
        ((self.0 & 0x07c0) >> 6) as u8
    }

    pub const fn status(self) -> EncoderStatus {
        EncoderStatus::from_bits_truncate(((self.0 & 0xf000) >> 12) as u8)
    }

    /// The error bit of a 17-bit single-turn response, which reuses the low
    /// command bit.
    pub const fn any_error(self) -> bool {
        self.0 & 0x0040 != 0
    }
}

fn slot_bytes(slot: &[u16]) -> impl Iterator<Item = u8> + '_ {
    slot.iter().flat_map(|w| w.to_le_bytes())
}

/// A slot is valid when the CRC8 over all its bytes, trailer included, is 0.
pub fn slot_crc_valid(slot: &[u16]) -> bool {
    CRC8.compute_iter(slot_bytes(slot)) == 0
}

/// Fill the high byte of the last halfword with the CRC8 of the rest.
pub fn seal_slot(slot: &mut [u16]) {
    let Some(last) = slot.len().checked_sub(1) else {
        return;
    };
    let code = CRC8.compute_iter(slot_bytes(slot).take(slot.len() * 2 - 1));
    slot[last] = (slot[last] & 0x00ff) | (u16::from(CRC8.trailer(code)) << 8);
}
