use std::{
    fmt::{Display, Formatter},
    str::FromStr,
};

use color_eyre::eyre::{OptionExt, bail};
use flexenc_a_format::{Address, MAX_ENCODERS};
use flexenc_io::Baudrate;
use strum::VariantArray;

/// Baudrate in MHz, one of the fixed set.
#[derive(Debug, Clone, Copy, Default)]
pub struct BaudrateArg(pub Baudrate);

impl FromStr for BaudrateArg {
    type Err = eyre::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim().trim_end_matches("MHz").trim();
        Baudrate::VARIANTS
            .iter()
            .find(|b| b.to_string().trim_end_matches(" MHz") == s)
            .map(|b| Self(*b))
            .ok_or_eyre("expected one of 2.5, 4, 6.67, 8, 16")
    }
}

impl Display for BaudrateArg {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_string().trim_end_matches(" MHz"))
    }
}

/// `n` addresses encoder `n`, `0..=n` every encoder up to `n`.
#[derive(Debug, Clone, Copy)]
pub struct AddressArg(pub Address);

impl FromStr for AddressArg {
    type Err = eyre::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (multi, n) = match s.strip_prefix("0..=") {
            Some(n) => (true, n),
            None => (false, s),
        };
        let n: u8 = n.parse()?;
        if n >= MAX_ENCODERS {
            bail!("address {n} out of range, at most {} encoders", MAX_ENCODERS);
        }
        Ok(Self(if multi {
            Address::multi(n)
        } else {
            Address::single(n)
        }))
    }
}

impl Display for AddressArg {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Integer with an optional `0x` prefix.
pub fn parse_int<T: TryFrom<u32>>(s: &str) -> color_eyre::Result<T> {
    let value = match s.strip_prefix("0x") {
        Some(hex) => u32::from_str_radix(hex, 16)?,
        None => s.parse()?,
    };
    T::try_from(value).map_err(|_| color_eyre::eyre::eyre!("{s} is out of range"))
}
