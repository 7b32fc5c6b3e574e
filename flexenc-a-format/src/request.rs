use flexenc_io::SpaceHex;
use tracing::warn;

use crate::{
    Address, Command, Encoder, EncoderStatus, Error, Result,
    frame::{CommandFrame, InfoField, slot_crc_valid},
    response::{
        Payload, Position, Reply, Response, Slot, WithStatus, WithTemperature, temperature,
    },
};

const LOWER_17_MASK: u32 = 0x1_ffff;
const ID_MASK: u32 = 0xff_ffff;

fn dword(lo: u16, hi: u16) -> u32 {
    u32::from(lo) | (u32::from(hi) << 16)
}

/// Everything needed to build one request and parse its response, so a
/// receive completing later in interrupt context can still be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Request {
    command: Command,
    address: Address,
    encoder: Encoder,
}

impl Request {
    pub fn new(command: Command, address: Address, encoder: Encoder) -> Self {
        Self {
            command,
            address,
            encoder,
        }
    }

    pub fn command(&self) -> Command {
        self.command
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn frame(&self) -> u16 {
        CommandFrame::new(self.address.index(), self.command).to_raw()
    }

    /// Number of encoders expected to answer.
    pub fn encoders(&self) -> usize {
        if self.command.is_multi() {
            usize::from(self.address.index()) + 1
        } else {
            1
        }
    }

    /// Halfwords of the whole response.
    pub fn response_len(&self) -> usize {
        self.encoders() * self.command.words_per_slot()
    }

    /// Decode a complete response into the payload matching the command.
    pub fn parse(&self, units: &[u16]) -> Reply {
        use Command::*;
        let payload = match self.command {
            ItAbsFull | MtAbsFull => Payload::Full(self.parse_full(units)),
            ItAbsLower24 | MtAbsLower24 => Payload::SingleTurn(self.parse_single_turn(units)),
            ItAbsUpper24 | MtAbsUpper24 => Payload::MultiTurn(self.parse_multi_turn(units)),
            ItEncoderStatus | MtEncoderStatus => Payload::Status(self.parse_status(units)),
            ItAbsLower17 | MtAbsLower17 => {
                Payload::SingleTurn(self.parse_single_turn_17bit(units))
            }
            ItAbsLower24Status | MtAbsLower24Status => {
                Payload::SingleTurnWithStatus(self.parse_with_status(units))
            }
            ItAbsLower24Temperature | MtAbsLower24Temperature => {
                Payload::SingleTurnWithTemperature(self.parse_with_temperature(units))
            }
            Temperature => Payload::Temperature(self.parse_temperature(units)),
            IdRead | IdReadOneToOne => Payload::Id(self.parse_id(units)),
            ClearStatus | ClearMultiTurn | ClearStatusMultiTurn | SetAddressOneToOne
            | PresetSingleTurnZero | MemoryRead | MemoryWrite | IdWrite | IdWriteOneToOne
            | SetAddressMatchingId => Payload::Ack(self.checked(units).map(|_| ())),
        };
        Reply {
            command: self.command,
            payload,
        }
    }

    fn slots<T: Default>(
        &self,
        units: &[u16],
        extract: impl Fn(InfoField, &[u16]) -> T,
    ) -> Response<T> {
        let words = self.command.words_per_slot();
        let lower_17 = matches!(self.command, Command::ItAbsLower17 | Command::MtAbsLower17);
        let mut response = Response {
            slots: Vec::with_capacity(self.encoders()),
            errors: 0,
        };

        for i in 0..self.encoders() {
            let slot = units.get(i * words..(i + 1) * words).unwrap_or_default();
            let info = InfoField(slot.first().copied().unwrap_or_default());
            let echo_ok = lower_17 || info.command_code() == self.command.code();
            if slot.is_empty() || !echo_ok || !slot_crc_valid(slot) {
                warn!(slot = i, data = %SpaceHex(slot), "frame error");
                response.errors += 1;
                response.slots.push(Slot {
                    address: i as u8,
                    status: EncoderStatus::FRAME,
                    data: T::default(),
                });
                continue;
            }

            let status = if lower_17 {
                if info.any_error() { EncoderStatus::ANY } else { EncoderStatus::empty() }
            } else {
                info.status()
            };
            if !status.is_empty() {
                response.errors += 1;
            }
            response.slots.push(Slot {
                address: info.address(),
                status,
                data: extract(info, slot),
            });
        }
        response
    }

    /// The single slot of an individual transmission, after the echo and CRC
    /// checks.
    pub(crate) fn checked<'a>(&self, units: &'a [u16]) -> Result<&'a [u16]> {
        let slot = units
            .get(..self.command.words_per_slot())
            .ok_or(Error::Frame)?;
        if InfoField(slot[0]).command_code() != self.command.code() || !slot_crc_valid(slot) {
            warn!(command = %self.command, data = %SpaceHex(slot), "frame error");
            return Err(Error::Frame);
        }
        Ok(slot)
    }

    pub fn parse_full(&self, units: &[u16]) -> Response<Position> {
        let enc = self.encoder;
        self.slots(units, |_, s| Position {
            single_turn: dword(s[1], s[2]) & enc.single_turn_mask(),
            multi_turn: ((dword(s[2], s[3]) >> enc.multi_turn_shift()) & enc.multi_turn_mask())
                as u16,
        })
    }

    pub fn parse_single_turn(&self, units: &[u16]) -> Response<u32> {
        let mask = self.encoder.single_turn_mask();
        self.slots(units, |_, s| dword(s[1], s[2]) & mask)
    }

    pub fn parse_multi_turn(&self, units: &[u16]) -> Response<u16> {
        let enc = self.encoder;
        self.slots(units, |_, s| {
            ((dword(s[1], s[2]) >> enc.multi_turn_shift()) & enc.multi_turn_mask()) as u16
        })
    }

    pub fn parse_status(&self, units: &[u16]) -> Response<u16> {
        self.slots(units, |_, s| s[1])
    }

    /// Nine bits of the position ride in the information field.
    pub fn parse_single_turn_17bit(&self, units: &[u16]) -> Response<u32> {
        let mask = self.encoder.single_turn_mask() & LOWER_17_MASK;
        self.slots(units, |info, s| {
            ((u32::from(s[1]) << 9) | u32::from(info.0 >> 7)) & mask
        })
    }

    pub fn parse_with_status(&self, units: &[u16]) -> Response<WithStatus> {
        let mask = self.encoder.single_turn_mask();
        self.slots(units, |_, s| WithStatus {
            single_turn: dword(s[1], s[2]) & mask,
            alarm: (s[3] << 8) | (s[2] >> 8),
        })
    }

    pub fn parse_with_temperature(&self, units: &[u16]) -> Response<WithTemperature> {
        let mask = self.encoder.single_turn_mask();
        self.slots(units, |_, s| WithTemperature {
            single_turn: dword(s[1], s[2]) & mask,
            temperature: temperature((s[3] << 8) | (s[2] >> 8)),
        })
    }

    pub fn parse_temperature(&self, units: &[u16]) -> Result<f32> {
        self.checked(units).map(|s| temperature(s[1]))
    }

    pub fn parse_id(&self, units: &[u16]) -> Result<u32> {
        self.checked(units).map(|s| dword(s[1], s[2]) & ID_MASK)
    }
}
