use std::fmt::Display;

use crate::Unit;

pub struct Hex<T>(pub T);
impl<T: Unit> Display for Hex<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let width = std::mem::size_of::<T>() * 2;
        write!(f, "{:0width$X}", self.0.to_raw())
    }
}

const MAX_DISPLAY: usize = 16;

/// Units back to back, no separators.
pub struct ShortHex<'a, T>(pub &'a [T]);
impl<T: Unit> Display for ShortHex<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        for e in self.0.iter().take(MAX_DISPLAY) {
            write!(f, "{}", Hex(*e))?;
        }
        if self.0.len() > MAX_DISPLAY {
            write!(f, "...")?;
        }
        Ok(())
    }
}

pub struct SpaceHex<'a, T>(pub &'a [T]);
impl<T: Unit> Display for SpaceHex<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        for e in self.0.iter().take(MAX_DISPLAY) {
            write!(f, "{} ", Hex(*e))?;
        }
        if self.0.len() > MAX_DISPLAY {
            write!(f, "...")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widths() {
        assert_eq!(Hex(0x0au8).to_string(), "0A");
        assert_eq!(Hex(0x6162u16).to_string(), "6162");
        assert_eq!(SpaceHex(&[1u16, 0xfffe][..]).to_string(), "0001 FFFE ");
        assert_eq!(ShortHex(&[0x0au8, 0xbc][..]).to_string(), "0ABC");
        let long = [0u8; 20];
        assert!(SpaceHex(&long[..]).to_string().ends_with("..."));
    }
}
