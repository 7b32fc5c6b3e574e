//! A simulated T-format encoder answering requests written to a
//! [`FakeBackend`](flexenc_io::fake_backend::FakeBackend).

use flexenc_io::fake_backend::Responder;
use tracing::debug;

use crate::{
    Alarms, Command, ControlField, StatusField,
    frame::{CRC8, MASK_ADDRESS, PAGE_ADDRESS, seal},
};

pub const PAGES: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoder {
    pub single_turn: u32,
    pub multi_turn: u32,
    pub id: u8,
    pub alarms: Alarms,
    /// Reported in every response until a reset clears it.
    pub status: StatusField,
    pub eeprom: Vec<[u8; 128]>,
    pub page: u8,
    /// Report the EEPROM as busy and ignore writes.
    pub busy: bool,
    /// Break the CRC of every response.
    pub corrupt_crc: bool,
    /// Reset requests received so far.
    pub resets: usize,
    pending: Vec<u8>,
}

impl Default for Encoder {
    fn default() -> Self {
        Self {
            single_turn: 0x1_2345,
            multi_turn: 7,
            id: 0x17,
            alarms: Alarms::empty(),
            status: StatusField::default(),
            eeprom: vec![[0; 128]; PAGES],
            page: 0,
            busy: false,
            corrupt_crc: false,
            resets: 0,
            pending: Vec::new(),
        }
    }
}

impl Encoder {
    /// Location of the substrate temperature.
    pub fn set_temperature(&mut self, celsius: i8) {
        self.eeprom[7][5] = celsius as u8;
    }

    fn eeprom_cell(&mut self, address: u8) -> Option<&mut u8> {
        self.eeprom
            .get_mut(usize::from(self.page))
            .and_then(|page| page.get_mut(usize::from(address)))
    }

    fn eeprom(&mut self, command: Command, request: &[u8]) -> Vec<u8> {
        let address = request[1] & MASK_ADDRESS;
        let busy = self.busy;
        let data = match (command, address) {
            (Command::EepromWrite, PAGE_ADDRESS) => {
                if !busy {
                    self.page = request[2];
                }
                self.page
            }
            (Command::EepromWrite, _) => {
                let value = request[2];
                match self.eeprom_cell(address) {
                    Some(cell) if !busy => {
                        *cell = value;
                        value
                    }
                    Some(cell) => *cell,
                    None => 0,
                }
            }
            (_, PAGE_ADDRESS) => self.page,
            _ => self.eeprom_cell(address).map_or(0, |cell| *cell),
        };
        let adf = address | if busy { 0x80 } else { 0 };
        vec![command.control().raw(), adf, data]
    }

    fn answer(&mut self, command: Command, request: &[u8]) -> Vec<u8> {
        let [a0, a1, a2, _] = self.single_turn.to_le_bytes();
        let [m0, m1, m2, _] = self.multi_turn.to_le_bytes();
        let cf = command.control().raw();

        match command {
            Command::ResetAllError => {
                self.resets += 1;
                self.alarms = Alarms::empty();
                self.status = StatusField::default();
            }
            Command::ResetAbs => {
                self.resets += 1;
                self.single_turn = 0;
            }
            Command::ResetAbmError => {
                self.resets += 1;
                self.multi_turn = 0;
                self.alarms = Alarms::empty();
                self.status = StatusField::default();
            }
            _ => {}
        }
        let sf = self.status.0;
        let [r0, r1, r2, _] = self.single_turn.to_le_bytes();

        let response = match command {
            Command::GetAbs => vec![cf, sf, a0, a1, a2],
            Command::GetAbm => vec![cf, sf, m0, m1, m2],
            Command::GetEncoderId => vec![cf, sf, self.id],
            Command::GetAll => vec![
                cf,
                sf,
                a0,
                a1,
                a2,
                self.id,
                m0,
                m1,
                m2,
                self.alarms.bits(),
            ],
            Command::ResetAllError | Command::ResetAbs | Command::ResetAbmError => {
                vec![cf, sf, r0, r1, r2]
            }
            Command::EepromWrite | Command::EepromRead => self.eeprom(command, request),
        };
        let mut response = seal(response);
        if self.corrupt_crc {
            if let Some(crc) = response.last_mut() {
                *crc ^= 0x01;
            }
        }
        debug!(%command, len = response.len(), "encoder answered");
        response
    }
}

impl Responder for Encoder {
    fn respond(&mut self, unit: u16) -> Vec<u16> {
        let byte = unit as u8;
        self.pending.push(byte);

        let Ok(command) = ControlField::from_raw(self.pending[0])
            .and_then(|cf| Command::from_control(cf).ok_or(crate::Error::Frame))
        else {
            self.pending.clear();
            return Vec::new();
        };
        if self.pending.len() < command.request_len() {
            return Vec::new();
        }

        let request = std::mem::take(&mut self.pending);
        if request.len() > 1 && !CRC8.check(&request) {
            return Vec::new();
        }
        self.answer(command, &request)
            .into_iter()
            .map(u16::from)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ask(encoder: &mut Encoder, request: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        for byte in request {
            out.extend(encoder.respond(u16::from(*byte)));
        }
        out.into_iter().map(|unit| unit as u8).collect()
    }

    #[test]
    fn answers_get_all() {
        let mut encoder = Encoder::default();
        encoder.alarms = Alarms::OVERHEAT;
        let response = ask(&mut encoder, &[Command::GetAll.control().raw()]);
        assert_eq!(response.len(), 11);
        assert!(CRC8.check(&response));
        assert_eq!(response[..10], [0x1a, 0, 0x45, 0x23, 0x01, 0x17, 7, 0, 0, 0x10]);
    }

    #[test]
    fn eeprom_paging() {
        let mut encoder = Encoder::default();
        let write = |address, data| seal(vec![Command::EepromWrite.control().raw(), address, data]);

        assert_eq!(ask(&mut encoder, &write(PAGE_ADDRESS, 3))[2], 3);
        assert_eq!(encoder.page, 3);
        ask(&mut encoder, &write(10, 0x5a));
        assert_eq!(encoder.eeprom[3][10], 0x5a);

        let read = seal(vec![Command::EepromRead.control().raw(), 10]);
        let response = ask(&mut encoder, &read);
        assert_eq!(response.len(), 4);
        assert_eq!(response[1..3], [10, 0x5a]);
    }

    #[test]
    fn ignores_bad_requests() {
        let mut encoder = Encoder::default();
        // parity error on the control field
        assert!(ask(&mut encoder, &[0x82]).is_empty());
        let mut read = seal(vec![Command::EepromRead.control().raw(), 10]);
        read[2] ^= 0xff;
        assert!(ask(&mut encoder, &read).is_empty());
        // state recovers for the next request
        assert_eq!(ask(&mut encoder, &[0x02]).len(), 6);
    }
}
