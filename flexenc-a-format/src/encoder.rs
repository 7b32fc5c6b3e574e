use crate::{Error, Result};

/// Resolution of the encoders on one bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Encoder {
    single_turn_bits: u8,
    multi_turn_bits: u8,
}

impl Default for Encoder {
    fn default() -> Self {
        Self {
            single_turn_bits: 23,
            multi_turn_bits: 16,
        }
    }
}

impl Encoder {
    /// The full position read carries 40 bits, so the two resolutions
    /// together must fit in that.
    pub fn new(single_turn_bits: u8, multi_turn_bits: u8) -> Result<Self> {
        if !(16..=24).contains(&single_turn_bits) {
            return Err(Error::InvalidArgument(
                "single-turn resolution must be 16 to 24 bits",
            ));
        }
        if multi_turn_bits > 16 || single_turn_bits + multi_turn_bits > 40 {
            return Err(Error::InvalidArgument(
                "multi-turn resolution does not fit the position frame",
            ));
        }
        Ok(Self {
            single_turn_bits,
            multi_turn_bits,
        })
    }

    pub const fn single_turn_bits(self) -> u8 {
        self.single_turn_bits
    }

    pub const fn multi_turn_bits(self) -> u8 {
        self.multi_turn_bits
    }

    pub const fn single_turn_mask(self) -> u32 {
        (1 << self.single_turn_bits) - 1
    }

    pub const fn multi_turn_mask(self) -> u32 {
        (1 << self.multi_turn_bits) - 1
    }

    /// Offset of the multi-turn count within the upper 24 position bits.
    pub(crate) const fn multi_turn_shift(self) -> u8 {
        self.single_turn_bits - 16
    }

    pub const fn sign_extend_multi_turn(self, value: u16) -> i16 {
        if self.multi_turn_bits == 0 {
            return 0;
        }
        let shift = 16 - self.multi_turn_bits as u32;
        ((value << shift) as i16) >> shift
    }
}
