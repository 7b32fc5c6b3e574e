use crate::{
    Alarms, Command, Encoder, Error, Result,
    frame::{all_frame, data_frame, decode, eeprom_frame, id_frame},
};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AllInfo {
    pub single_turn: u32,
    pub multi_turn: u32,
    pub encoder_id: u8,
    pub alarms: Alarms,
}

/// A GET_ALL response captured in sync mode. The alarms are reported even
/// when the status field carries an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    pub alarms: Alarms,
    pub info: Result<AllInfo>,
}

/// Parsed completion of a command receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    All(Result<AllInfo>),
    SingleTurn(Result<u32>),
    MultiTurn(Result<u32>),
    EncoderId(Result<u8>),
    Eeprom(Result<u8>),
}

/// A command and the resolution its response is decoded with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Request {
    command: Command,
    encoder: Encoder,
}

impl Request {
    pub fn new(command: Command, encoder: Encoder) -> Self {
        Self { command, encoder }
    }

    pub fn command(&self) -> Command {
        self.command
    }

    pub fn control(&self) -> u8 {
        self.command.control().raw()
    }

    pub fn response_len(&self) -> usize {
        self.command.response_len()
    }

    pub fn parse(&self, bytes: &[u8]) -> Reply {
        match self.command {
            Command::GetAll => Reply::All(self.parse_all(bytes)),
            Command::GetAbm => Reply::MultiTurn(self.parse_multi_turn(bytes)),
            Command::GetEncoderId => Reply::EncoderId(self.parse_encoder_id(bytes)),
            Command::GetAbs
            | Command::ResetAllError
            | Command::ResetAbs
            | Command::ResetAbmError => Reply::SingleTurn(self.parse_single_turn(bytes)),
            Command::EepromWrite | Command::EepromRead => Reply::Eeprom(self.parse_eeprom(bytes)),
        }
    }

    pub fn parse_sample(&self, bytes: &[u8]) -> Result<Sample> {
        let frame = decode(self.command, bytes, all_frame)?;
        let info = frame.status.check().map(|()| AllInfo {
            single_turn: frame.single_turn & self.encoder.single_turn_mask(),
            multi_turn: frame.multi_turn & self.encoder.multi_turn_mask(),
            encoder_id: frame.encoder_id,
            alarms: frame.alarms,
        });
        Ok(Sample {
            alarms: frame.alarms,
            info,
        })
    }

    pub fn parse_all(&self, bytes: &[u8]) -> Result<AllInfo> {
        self.parse_sample(bytes)?.info
    }

    pub fn parse_alarms(&self, bytes: &[u8]) -> Result<Alarms> {
        self.parse_all(bytes).map(|info| info.alarms)
    }

    pub fn parse_single_turn(&self, bytes: &[u8]) -> Result<u32> {
        let frame = decode(self.command, bytes, data_frame)?;
        frame.status.check()?;
        Ok(frame.value & self.encoder.single_turn_mask())
    }

    pub fn parse_multi_turn(&self, bytes: &[u8]) -> Result<u32> {
        let frame = decode(self.command, bytes, data_frame)?;
        frame.status.check()?;
        Ok(frame.value & self.encoder.multi_turn_mask())
    }

    pub fn parse_encoder_id(&self, bytes: &[u8]) -> Result<u8> {
        let frame = decode(self.command, bytes, id_frame)?;
        frame.status.check()?;
        Ok(frame.encoder_id)
    }

    /// EEPROM data byte of the response.
    pub fn parse_eeprom(&self, bytes: &[u8]) -> Result<u8> {
        let frame = decode(self.command, bytes, eeprom_frame)?;
        if frame.busy {
            return Err(Error::EepromBusy);
        }
        Ok(frame.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::seal;

    #[test]
    fn single_turn_masked() {
        let request = Request::new(Command::GetAbs, Encoder::default());
        let bytes = seal(vec![0x02, 0x00, 0xff, 0xff, 0xff]);
        assert_eq!(request.parse_single_turn(&bytes), Ok(0x1_ffff));
        assert_eq!(request.parse(&bytes), Reply::SingleTurn(Ok(0x1_ffff)));
    }

    #[test]
    fn status_error_after_crc() {
        let request = Request::new(Command::GetAbm, Encoder::default());
        let bytes = seal(vec![0x8a, 0x40, 0x01, 0x00, 0x00]);
        assert_eq!(request.parse_multi_turn(&bytes), Err(Error::ParityError));

        let mut corrupted = bytes.clone();
        corrupted[1] = 0;
        assert_eq!(request.parse_multi_turn(&corrupted), Err(Error::Frame));
    }

    #[test]
    fn sample_keeps_alarms() {
        let request = Request::new(Command::GetAll, Encoder::default());
        let bytes = seal(vec![0x1a, 0x20, 0, 0, 0, 0x17, 0, 0, 0, 0xc0]);
        let sample = request.parse_sample(&bytes).unwrap();
        assert_eq!(sample.alarms, Alarms::BATTERY_ERROR | Alarms::BATTERY_ALARM);
        assert_eq!(sample.info, Err(Error::LogicOr));
        assert_eq!(request.parse_all(&bytes), Err(Error::LogicOr));
        assert_eq!(request.parse_alarms(&bytes), Err(Error::LogicOr));
    }

    #[test]
    fn all_info() {
        let request = Request::new(Command::GetAll, Encoder::default());
        let bytes = seal(vec![0x1a, 0x00, 0x45, 0x23, 0x01, 0x17, 0x02, 0x00, 0x00, 0x00]);
        assert_eq!(
            request.parse(&bytes),
            Reply::All(Ok(AllInfo {
                single_turn: 0x1_2345,
                multi_turn: 2,
                encoder_id: 0x17,
                alarms: Alarms::empty(),
            }))
        );
    }

    #[test]
    fn eeprom_reply() {
        let request = Request::new(Command::EepromRead, Encoder::default());
        assert_eq!(request.parse(&seal(vec![0xea, 0x05, 0x33])), Reply::Eeprom(Ok(0x33)));
        assert_eq!(request.parse_eeprom(&seal(vec![0xea, 0x85, 0x33])), Err(Error::EepromBusy));
    }
}
