use crate::{Command, EncoderStatus, Error, Result};

/// One encoder's part of a response.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Slot<T> {
    /// Address reported by the encoder, or the slot's position in the chain
    /// when the frame was rejected.
    pub address: u8,
    pub status: EncoderStatus,
    /// Left at the default when `status` has `FRAME` set.
    pub data: T,
}

impl<T: Copy> Slot<T> {
    pub fn value(&self) -> Result<T> {
        if self.status.contains(EncoderStatus::FRAME) {
            Err(Error::Frame)
        } else if !self.status.is_empty() {
            Err(Error::Encoder(self.status))
        } else {
            Ok(self.data)
        }
    }
}

/// Every slot of a single or multiple transmission. All slots are present
/// even when some of them failed.
#[derive(Debug, Clone, PartialEq)]
pub struct Response<T> {
    pub slots: Vec<Slot<T>>,
    /// Slots rejected as frame errors or reporting a non-zero status.
    pub errors: usize,
}

impl<T> Response<T> {
    pub fn is_ok(&self) -> bool {
        self.errors == 0
    }

    pub fn check(&self) -> Result<()> {
        if self.is_ok() {
            Ok(())
        } else {
            Err(Error::Failed {
                errors: self.errors,
                slots: self.slots.len(),
            })
        }
    }

    pub fn first(&self) -> Option<&Slot<T>> {
        self.slots.first()
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub single_turn: u32,
    pub multi_turn: u16,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WithStatus {
    pub single_turn: u32,
    pub alarm: u16,
}

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct WithTemperature {
    pub single_turn: u32,
    /// Degrees Celsius.
    pub temperature: f32,
}

/// Decode a 10-bit two's complement temperature in quarter degrees.
pub fn temperature(raw: u16) -> f32 {
    let data = (raw & 0x1ff) as i16;
    let value = if raw & 0x200 != 0 { data - 512 } else { data };
    f32::from(value) * 0.25
}

/// Inverse of [`temperature`], saturating at the representable range.
pub fn temperature_raw(celsius: f32) -> u16 {
    let quarters = (celsius * 4.0).round().clamp(-512.0, 511.0) as i16;
    (quarters as u16) & 0x3ff
}

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Full(Response<Position>),
    SingleTurn(Response<u32>),
    MultiTurn(Response<u16>),
    Status(Response<u16>),
    SingleTurnWithStatus(Response<WithStatus>),
    SingleTurnWithTemperature(Response<WithTemperature>),
    Temperature(Result<f32>),
    Id(Result<u32>),
    /// Clear, address and memory commands, whose reply only needs to echo
    /// the request.
    Ack(Result<()>),
}

/// Parsed completion of a command receive.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub command: Command,
    pub payload: Payload,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temperature_quarters() {
        assert_eq!(temperature(0x000), 0.0);
        assert_eq!(temperature(0x064), 25.0);
        assert_eq!(temperature(0x1ff), 127.75);
        assert_eq!(temperature(0x3fc), -1.0);
        assert_eq!(temperature(0x200), -128.0);
        for raw in 0..0x400 {
            assert_eq!(temperature_raw(temperature(raw)), raw);
        }
    }

    #[test]
    fn slot_value() {
        let ok = Slot {
            address: 1,
            status: EncoderStatus::empty(),
            data: 7u32,
        };
        assert_eq!(ok.value(), Ok(7));
        let busy = Slot {
            status: EncoderStatus::BUSY,
            ..ok
        };
        assert_eq!(busy.value(), Err(Error::Encoder(EncoderStatus::BUSY)));
        let frame = Slot {
            status: EncoderStatus::FRAME,
            ..ok
        };
        assert_eq!(frame.value(), Err(Error::Frame));
    }

    #[test]
    fn aggregate() {
        let slot = Slot {
            address: 0,
            status: EncoderStatus::empty(),
            data: 0u16,
        };
        let response = Response {
            slots: vec![slot; 3],
            errors: 1,
        };
        assert_eq!(response.check(), Err(Error::Failed { errors: 1, slots: 3 }));
        let response = Response {
            slots: vec![slot],
            errors: 0,
        };
        assert!(response.check().is_ok());
    }
}
