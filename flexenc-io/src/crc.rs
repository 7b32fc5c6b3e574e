/// Bit-at-a-time CRC of up to 8 bits, MSB first.
///
/// The polynomial is placed at bit `8 - width` of the remainder register and
/// the register starts at zero. With `reflect_in` every message byte is
/// bit-reversed before it is shifted in; with `reflect_out` the whole register
/// is bit-reversed at the end, otherwise it is shifted down to `width` bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Crc {
    pub poly: u8,
    pub width: u8,
    pub reflect_in: bool,
    pub reflect_out: bool,
}

impl Crc {
    pub const fn new(poly: u8, width: u8, reflect_in: bool, reflect_out: bool) -> Self {
        assert!(width >= 1 && width <= 8);
        Self {
            poly,
            width,
            reflect_in,
            reflect_out,
        }
    }

    pub fn compute(&self, message: &[u8]) -> u8 {
        self.compute_iter(message.iter().copied())
    }

    pub fn compute_iter(&self, message: impl IntoIterator<Item = u8>) -> u8 {
        let poly = self.poly << (8 - self.width);
        let mut rem = 0u8;
        for byte in message {
            rem ^= if self.reflect_in {
                byte.reverse_bits()
            } else {
                byte
            };
            for _ in 0..8 {
                rem = if rem & 0x80 != 0 {
                    (rem << 1) ^ poly
                } else {
                    rem << 1
                };
            }
        }

        if self.reflect_out {
            rem.reverse_bits()
        } else {
            rem >> (8 - self.width)
        }
    }

    /// A message whose trailing check code is included validates to zero.
    pub fn check(&self, message: &[u8]) -> bool {
        self.compute(message) == 0
    }

    /// The byte that, appended to a message with CRC `code`, makes
    /// [`Crc::check`] succeed.
    pub const fn trailer(&self, code: u8) -> u8 {
        if self.reflect_in {
            code
        } else {
            code << (8 - self.width)
        }
    }
}
