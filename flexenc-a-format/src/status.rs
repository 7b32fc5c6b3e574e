use tracing::{debug, warn};

bitflags::bitflags! {
    /// Encoder status (ES) of one response slot.
    ///
    /// The low four bits come from the information field. `FRAME` and `ANY`
    /// are set by the driver.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EncoderStatus: u8 {
        const BUSY      = 1 << 0;
        const BATTERY   = 1 << 1;
        const OVERSPEED = 1 << 2;
        const COUNTING  = 1 << 3;
        /// Command echo or CRC of the slot did not match.
        const FRAME     = 1 << 4;
        /// A 17-bit response flagged an error without saying which.
        const ANY       = 1 << 5;
    }
}

impl EncoderStatus {
    /// Description of a single flag.
    pub fn description(self) -> Option<&'static str> {
        let desc = match self {
            Self::BUSY => "encoder or memory is busy",
            Self::BATTERY => "battery error",
            Self::OVERSPEED => "over speed, memory error, temperature warning or overflow",
            Self::COUNTING => "single-turn, preset, multi-turn or incremental signal error",
            Self::FRAME => "encoder frame error",
            Self::ANY => "one or more of all errors",
            _ => return None,
        };
        Some(desc)
    }

    pub fn descriptions(self) -> impl Iterator<Item = &'static str> {
        self.iter().filter_map(Self::description)
    }

    pub fn log(self) {
        if self.is_empty() {
            debug!("no error in the ES field");
            return;
        }
        for desc in self.descriptions() {
            warn!(es = self.bits(), "{desc}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_flag_described() {
        for (name, flag) in EncoderStatus::all().iter_names() {
            assert!(flag.description().is_some(), "{name}");
        }
        assert_eq!(EncoderStatus::empty().description(), None);
        assert_eq!((EncoderStatus::BUSY | EncoderStatus::BATTERY).description(), None);
    }

    #[test]
    fn descriptions_in_bit_order() {
        let es = EncoderStatus::FRAME | EncoderStatus::BUSY;
        let descs: Vec<_> = es.descriptions().collect();
        assert_eq!(descs, ["encoder or memory is busy", "encoder frame error"]);
    }
}
