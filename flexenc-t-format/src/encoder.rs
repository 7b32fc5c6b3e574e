use crate::{Error, Result};

/// Resolution of the encoder. ABS and ABM are 24-bit fields, the bits above
/// the resolution are cleared on read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Encoder {
    single_turn_bits: u8,
    multi_turn_bits: u8,
}

impl Default for Encoder {
    fn default() -> Self {
        Self {
            single_turn_bits: 17,
            multi_turn_bits: 16,
        }
    }
}

impl Encoder {
    pub fn new(single_turn_bits: u8, multi_turn_bits: u8) -> Result<Self> {
        if !(1..=24).contains(&single_turn_bits) || multi_turn_bits > 24 {
            return Err(Error::InvalidArgument("resolution must fit a 24-bit field"));
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

    pub const fn sign_extend_multi_turn(self, value: u32) -> i32 {
        if self.multi_turn_bits == 0 {
            return 0;
        }
        let shift = 32 - self.multi_turn_bits as u32;
        ((value << shift) as i32) >> shift
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks() {
        let enc = Encoder::default();
        assert_eq!(enc.single_turn_mask(), 0x1_ffff);
        assert_eq!(enc.multi_turn_mask(), 0xffff);
        assert_eq!(Encoder::new(24, 0).unwrap().multi_turn_mask(), 0);
        assert!(Encoder::new(0, 16).is_err());
        assert!(Encoder::new(23, 25).is_err());
    }

    #[test]
    fn multi_turn_is_signed() {
        let enc = Encoder::default();
        assert_eq!(enc.sign_extend_multi_turn(0xffff), -1);
        assert_eq!(enc.sign_extend_multi_turn(0x7fff), 0x7fff);
    }
}
