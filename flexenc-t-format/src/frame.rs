//! T-format response layouts, decoded with nom once the CRC and control
//! field echo have been checked.
//!
//! ```text
//! ABS, ABM, reset  CF SF D0 D1 D2 CRC
//! ENCID            CF SF ENID CRC
//! ALL              CF SF ABS0 ABS1 ABS2 ENID ABM0 ABM1 ABM2 ALMC CRC
//! EEPROM           CF ADF EDF CRC
//! ```

use flexenc_io::{Crc, SpaceHex};
use nom::{
    IResult, Parser,
    combinator::map,
    number::complete::{le_u24, u8 as byte},
};
use tracing::warn;

use crate::{Alarms, Command, Error, Result, StatusField};

pub const CRC8: Crc = Crc::new(0x01, 8, false, false);

/// EEPROM address selecting the page.
pub const PAGE_ADDRESS: u8 = 127;
pub(crate) const MASK_ADDRESS: u8 = 0x7f;
pub(crate) const MASK_BUSY: u8 = 0x80;

/// Append the CRC8 of `bytes`.
pub fn seal(mut bytes: Vec<u8>) -> Vec<u8> {
    let code = CRC8.compute(&bytes);
    bytes.push(CRC8.trailer(code));
    bytes
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DataFrame {
    pub status: StatusField,
    pub value: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct IdFrame {
    pub status: StatusField,
    pub encoder_id: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct AllFrame {
    pub status: StatusField,
    pub single_turn: u32,
    pub encoder_id: u8,
    pub multi_turn: u32,
    pub alarms: Alarms,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct EepromFrame {
    pub address: u8,
    pub busy: bool,
    pub data: u8,
}

fn status(input: &[u8]) -> IResult<&[u8], StatusField> {
    map(byte, StatusField).parse(input)
}

pub(crate) fn data_frame(input: &[u8]) -> IResult<&[u8], DataFrame> {
    map((byte, status, le_u24, byte), |(_, status, value, _)| DataFrame {
        status,
        value,
    })
    .parse(input)
}

pub(crate) fn id_frame(input: &[u8]) -> IResult<&[u8], IdFrame> {
    map((byte, status, byte, byte), |(_, status, encoder_id, _)| IdFrame {
        status,
        encoder_id,
    })
    .parse(input)
}

pub(crate) fn all_frame(input: &[u8]) -> IResult<&[u8], AllFrame> {
    map(
        (byte, status, le_u24, byte, le_u24, byte, byte),
        |(_, status, single_turn, encoder_id, multi_turn, almc, _)| AllFrame {
            status,
            single_turn,
            encoder_id,
            multi_turn,
            alarms: Alarms::from_bits_retain(almc),
        },
    )
    .parse(input)
}

pub(crate) fn eeprom_frame(input: &[u8]) -> IResult<&[u8], EepromFrame> {
    map((byte, byte, byte, byte), |(_, adf, data, _)| EepromFrame {
        address: adf & MASK_ADDRESS,
        busy: adf & MASK_BUSY != 0,
        data,
    })
    .parse(input)
}

/// Check the CRC and control field echo of the response to `command`, then
/// decode it.
pub(crate) fn decode<O>(
    command: Command,
    bytes: &[u8],
    parser: impl Fn(&[u8]) -> IResult<&[u8], O>,
) -> Result<O> {
    let Some(frame) = bytes.get(..command.response_len()) else {
        warn!(%command, len = bytes.len(), "short response");
        return Err(Error::Frame);
    };
    if !CRC8.check(frame) {
        warn!(%command, data = %SpaceHex(frame), "CRC mismatch");
        return Err(Error::Frame);
    }
    if frame[0] != command.control().raw() {
        warn!(%command, data = %SpaceHex(frame), "control field echo mismatch");
        return Err(Error::Frame);
    }
    let (_, out) = parser(frame).map_err(|_| Error::Frame)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sealed_frames_check() {
        let frame = seal(vec![0x02, 0x00, 0x34, 0x12, 0x01]);
        assert_eq!(frame.len(), 6);
        assert!(CRC8.check(&frame));
        let mut bad = frame.clone();
        bad[2] ^= 0x04;
        assert!(!CRC8.check(&bad));
    }

    #[test]
    fn abs_is_little_endian() {
        let frame = seal(vec![0x02, 0x00, 0x34, 0x12, 0x01]);
        let decoded = decode(Command::GetAbs, &frame, data_frame).unwrap();
        assert_eq!(decoded.value, 0x01_1234);
        assert_eq!(decoded.status, StatusField(0));
    }

    #[test]
    fn all_fields() {
        let frame = seal(vec![0x1a, 0x20, 0x01, 0x02, 0x03, 0x17, 0x0a, 0x0b, 0x0c, 0x90]);
        let all = decode(Command::GetAll, &frame, all_frame).unwrap();
        assert_eq!(
            all,
            AllFrame {
                status: StatusField(0x20),
                single_turn: 0x03_0201,
                encoder_id: 0x17,
                multi_turn: 0x0c_0b0a,
                alarms: Alarms::BATTERY_ALARM | Alarms::OVERHEAT,
            }
        );
    }

    #[test]
    fn rejects_echo_and_length() {
        let frame = seal(vec![0x8a, 0x00, 0x00, 0x00, 0x00]);
        assert_eq!(decode(Command::GetAbs, &frame, data_frame), Err(Error::Frame));
        assert!(decode(Command::GetAbm, &frame, data_frame).is_ok());
        assert_eq!(decode(Command::GetAbm, &frame[..5], data_frame), Err(Error::Frame));
    }

    #[test]
    fn eeprom_busy_bit() {
        let frame = seal(vec![0xea, 0x85, 0x42]);
        let eeprom = decode(Command::EepromRead, &frame, eeprom_frame).unwrap();
        assert_eq!(
            eeprom,
            EepromFrame {
                address: 5,
                busy: true,
                data: 0x42
            }
        );
    }
}
