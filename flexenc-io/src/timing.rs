use crate::{Error, Result};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, strum::VariantArray, strum::Display)]
pub enum Baudrate {
    #[default]
    #[strum(to_string = "2.5 MHz")]
    Mhz2_5,
    #[strum(to_string = "4 MHz")]
    Mhz4,
    #[strum(to_string = "6.67 MHz")]
    Mhz6_67,
    #[strum(to_string = "8 MHz")]
    Mhz8,
    #[strum(to_string = "16 MHz")]
    Mhz16,
}

impl Baudrate {
    pub const fn bps(self) -> u32 {
        match self {
            Baudrate::Mhz2_5 => 2_500_000,
            Baudrate::Mhz4 => 4_000_000,
            Baudrate::Mhz6_67 => 20_000_000 / 3,
            Baudrate::Mhz8 => 8_000_000,
            Baudrate::Mhz16 => 16_000_000,
        }
    }
}

/// How requests are started.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Every request is written by software.
    #[default]
    Oneshot,
    /// The transmitter is retriggered by an external trigger input.
    Sync,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    pub baudrate: Baudrate,
    pub mode: Mode,
    pub src_clock_hz: u32,
    /// Poll budget of one blocking call. Zero polls forever.
    pub retry: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            baudrate: Baudrate::default(),
            mode: Mode::default(),
            src_clock_hz: 480_000_000,
            retry: 0,
        }
    }
}

/// Timer parameters derived from the baudrate and the source clock, all in
/// source clock ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    pub baudrate: Baudrate,
    pub timer_div: u16,
    pub tx_dr_offset: u16,
    pub interval: u16,
    /// Bits on the wire per frame, start and stop included.
    pub bits_per_frame: u16,
    /// Value for the shifter clock timer compare register.
    pub shift_compare: u16,
}

const A_FORMAT_DATA_BITS: u16 = 16;
const T_FORMAT_DATA_BITS: u16 = 8;

/// ```text
/// [15:8] data bits * 2 - 1
/// [ 7:0] baud compare
/// ```
const fn shift_compare(data_bits: u16, cmp: u16) -> u16 {
    ((data_bits * 2 - 1) << 8) | cmp
}

fn ticks(value: u64, baudrate: Baudrate, src_clock_hz: u32) -> Result<u16> {
    u16::try_from(value).map_err(|_| Error::BaudrateNotSupported {
        baudrate,
        src_clock_hz,
    })
}

/// Derive the baud compare from `timer_div`, rejecting it when it does not
/// fit the timer or the achieved rate deviates by more than
/// `limit_percent_x3 / 3` percent.
fn baud_compare(
    baudrate: Baudrate,
    src_clock_hz: u32,
    timer_div: u16,
    limit_percent_x3: u32,
) -> Result<u16> {
    let unsupported = Error::BaudrateNotSupported {
        baudrate,
        src_clock_hz,
    };
    let cmp = (timer_div / 2).checked_sub(1).ok_or(unsupported)?;
    if cmp > 0xff {
        return Err(unsupported);
    }

    let bps = baudrate.bps();
    let calculated = src_clock_hz / ((u32::from(cmp) + 1) * 2);
    match calculated.checked_sub(bps) {
        Some(diff) if diff <= bps / 100 * limit_percent_x3 / 3 => Ok(cmp),
        _ => Err(unsupported),
    }
}

impl Timing {
    /// 16 data bits per frame, 18 on the wire.
    pub fn a_format(baudrate: Baudrate, src_clock_hz: u32) -> Result<Self> {
        let clk = u64::from(src_clock_hz);
        let t = |value| ticks(value, baudrate, src_clock_hz);
        let bits_per_frame = A_FORMAT_DATA_BITS + 2;

        if baudrate == Baudrate::Mhz16 {
            return Ok(Self {
                baudrate,
                timer_div: 3,
                tx_dr_offset: 34,
                interval: 480,
                bits_per_frame,
                shift_compare: A_FORMAT_DATA_BITS * 2 - 1,
            });
        }

        let timer_div = match baudrate {
            Baudrate::Mhz6_67 => t(clk * 3 / 20 / 1_000_000)?,
            _ => t(clk / u64::from(baudrate.bps()))?,
        };
        // 1.667%
        let cmp = baud_compare(baudrate, src_clock_hz, timer_div, 5)?;
        let tx_dr_offset = match baudrate {
            Baudrate::Mhz2_5 => t(clk * 3 / 2_000_000)?,
            Baudrate::Mhz8 => t(clk / 10_000_000 * 7)?,
            _ => t(clk / 1_000_000)?,
        };

        Ok(Self {
            baudrate,
            timer_div,
            tx_dr_offset,
            interval: t(clk * 3 / 1_000_000)?,
            bits_per_frame,
            shift_compare: shift_compare(A_FORMAT_DATA_BITS, cmp),
        })
    }

    /// 8 data bits per frame, 10 on the wire. Only 2.5 MHz is defined.
    pub fn t_format(baudrate: Baudrate, src_clock_hz: u32) -> Result<Self> {
        if baudrate != Baudrate::Mhz2_5 {
            return Err(Error::BaudrateNotSupported {
                baudrate,
                src_clock_hz,
            });
        }

        let clk = u64::from(src_clock_hz);
        let t = |value| ticks(value, baudrate, src_clock_hz);
        let timer_div = t(clk / u64::from(baudrate.bps()))?;
        // 3%
        let cmp = baud_compare(baudrate, src_clock_hz, timer_div, 9)?;

        Ok(Self {
            baudrate,
            timer_div,
            tx_dr_offset: t(clk / 2_000_000)?,
            interval: 0,
            bits_per_frame: T_FORMAT_DATA_BITS + 2,
            shift_compare: shift_compare(T_FORMAT_DATA_BITS, cmp),
        })
    }

    /// DR timer compare covering `frames` back-to-back request frames.
    pub fn window(&self, frames: usize) -> u16 {
        let frames = frames.max(1) as u32;
        let ticks = u32::from(self.bits_per_frame) * frames * u32::from(self.timer_div)
            + u32::from(self.interval) * (frames - 1)
            + u32::from(self.tx_dr_offset);
        (ticks - 1) as u16
    }
}

#[cfg(test)]
mod tests {
    use strum::VariantArray;

    use super::*;

    #[test]
    fn a_format_table() {
        let t = Timing::a_format(Baudrate::Mhz2_5, 480_000_000).unwrap();
        assert_eq!(t.timer_div, 192);
        assert_eq!(t.shift_compare, 0x1f5f);
        assert_eq!(t.tx_dr_offset, 720);
        assert_eq!(t.interval, 1440);
        assert_eq!(t.window(1), 4175);
        assert_eq!(t.window(4), 18863);

        let t = Timing::a_format(Baudrate::Mhz16, 480_000_000).unwrap();
        assert_eq!(t.shift_compare, 31);
        assert_eq!(t.window(1), 87);
    }

    #[test]
    fn a_format_all_rates_at_480mhz() {
        for baudrate in Baudrate::VARIANTS {
            let t = Timing::a_format(*baudrate, 480_000_000);
            assert!(t.is_ok(), "{baudrate}: {t:?}");
        }
    }

    #[test]
    fn deviation_rejected() {
        let err = Timing::a_format(Baudrate::Mhz8, 50_000_000).unwrap_err();
        assert_eq!(
            err,
            Error::BaudrateNotSupported {
                baudrate: Baudrate::Mhz8,
                src_clock_hz: 50_000_000
            }
        );
        // divider too small to derive a compare value
        assert!(Timing::a_format(Baudrate::Mhz4, 4_000_000).is_err());
    }

    #[test]
    fn t_format_table() {
        let t = Timing::t_format(Baudrate::Mhz2_5, 480_000_000).unwrap();
        assert_eq!(t.shift_compare, 0x0f5f);
        assert_eq!(t.tx_dr_offset, 240);
        assert_eq!(t.window(1), 2159);
        assert_eq!(t.window(4), 7919);

        for baudrate in Baudrate::VARIANTS {
            if *baudrate != Baudrate::Mhz2_5 {
                assert!(Timing::t_format(*baudrate, 480_000_000).is_err());
            }
        }
    }
}
