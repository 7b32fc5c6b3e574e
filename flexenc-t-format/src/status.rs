use tracing::{debug, warn};

use crate::{Error, Result};

const MASK_ENCODER_ERROR: u8 = 0x30;
const MASK_COMMUNICATION_ALARM: u8 = 0xc0;

pub const NO_ERROR: &str = "No error occurs";

/// Status field (SF) of a response.
///
/// ```text
/// [7:6] communication alarm (CA1, CA0)
/// [5:4] encoder error (EA1, EA0)
/// ```
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusField(pub u8);

impl StatusField {
    pub const fn communication_alarm(self) -> u8 {
        (self.0 & MASK_COMMUNICATION_ALARM) >> 6
    }

    pub const fn encoder_error(self) -> u8 {
        (self.0 & MASK_ENCODER_ERROR) >> 4
    }

    /// A communication alarm takes priority over an encoder error.
    pub fn check(self) -> Result<()> {
        match (self.communication_alarm(), self.encoder_error()) {
            (0, 0) => Ok(()),
            (0, ea) if ea & 1 != 0 => Err(Error::CountingError),
            (0, _) => Err(Error::LogicOr),
            (ca, _) if ca & 1 != 0 => Err(Error::ParityError),
            _ => Err(Error::DelimiterError),
        }
    }

    pub fn description(self) -> &'static str {
        match self.check() {
            Ok(()) => NO_ERROR,
            Err(Error::CountingError) => {
                "One revolution data is deviated by any malfunction or defect at main power-on"
            }
            Err(Error::LogicOr) => {
                "Logic-OR of Over-heat, Multi-turn error, Battery error and Battery alarm"
            }
            Err(Error::ParityError) => "Parity error in Request frame occurs",
            Err(_) => "Delimiter error in Request frame occurs",
        }
    }
}

bitflags::bitflags! {
    /// Alarm bits (ALMC) of a GET_ALL response.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Alarms: u8 {
        const OVERSPEED     = 1 << 0;
        const FULL_ABSOLUTE = 1 << 1;
        const COUNTING      = 1 << 2;
        const OVERFLOW      = 1 << 3;
        const OVERHEAT      = 1 << 4;
        const MULTITURN     = 1 << 5;
        const BATTERY_ERROR = 1 << 6;
        const BATTERY_ALARM = 1 << 7;
    }
}

impl Alarms {
    /// Description of a single flag.
    pub fn description(self) -> Option<&'static str> {
        let desc = match self {
            Self::OVERSPEED => "The rotate speed is over 6000r/min in the Power-off mode",
            Self::FULL_ABSOLUTE => {
                "While the rotate speed is 100r/min or more, main power supply is turned on"
            }
            Self::COUNTING => {
                "One revolution data is deviated by any malfunction or defect at main power-on"
            }
            Self::OVERFLOW => "The multi-turn counter is overflowed",
            Self::OVERHEAT => {
                "The temperature of the encoder substrate exceeds overheating detection temperature"
            }
            Self::MULTITURN => "Any bit-jump occurs in the multi-turn signal",
            Self::BATTERY_ERROR => {
                "The external battery voltage is 3.1±0.1 V or less during main power-on"
            }
            Self::BATTERY_ALARM => {
                "The external battery voltage is 2.75±0.25V or less during main power-off"
            }
            _ => return None,
        };
        Some(desc)
    }

    pub fn descriptions(self) -> impl Iterator<Item = &'static str> {
        self.iter().filter_map(Self::description)
    }

    pub fn log(self) {
        if self.is_empty() {
            debug!("no alarm in ALMC");
            return;
        }
        for desc in self.descriptions() {
            warn!(almc = self.bits(), "{desc}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_priority() {
        assert_eq!(StatusField(0x00).check(), Ok(()));
        // bits outside both fields are ignored
        assert_eq!(StatusField(0x0f).check(), Ok(()));
        assert_eq!(StatusField(0x10).check(), Err(Error::CountingError));
        assert_eq!(StatusField(0x20).check(), Err(Error::LogicOr));
        assert_eq!(StatusField(0x30).check(), Err(Error::CountingError));
        assert_eq!(StatusField(0x40).check(), Err(Error::ParityError));
        assert_eq!(StatusField(0x80).check(), Err(Error::DelimiterError));
        assert_eq!(StatusField(0xc0).check(), Err(Error::ParityError));
        assert_eq!(StatusField(0xb0).check(), Err(Error::DelimiterError));
    }

    #[test]
    fn descriptions_match_errors() {
        for raw in [0x10, 0x20, 0x40, 0x80] {
            let sf = StatusField(raw);
            let err = sf.check().unwrap_err();
            assert_eq!(sf.description(), err.to_string());
        }
        assert_eq!(StatusField(0).description(), NO_ERROR);
    }

    #[test]
    fn every_alarm_described() {
        for (name, flag) in Alarms::all().iter_names() {
            assert!(flag.description().is_some(), "{name}");
        }
        let almc = Alarms::BATTERY_ALARM | Alarms::OVERSPEED;
        assert_eq!(almc.descriptions().count(), 2);
        assert_eq!(Alarms::from_bits_retain(0x10), Alarms::OVERHEAT);
    }
}
