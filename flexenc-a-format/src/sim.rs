//! A chain of simulated A-format encoders, answering requests written to a
//! [`FakeBackend`](flexenc_io::fake_backend::FakeBackend).

use flexenc_io::fake_backend::Responder;
use tracing::debug;

use crate::{
    Command, Encoder, EncoderStatus,
    frame::{CommandFrame, InfoField, MemoryFrame, seal_slot},
    response::temperature_raw,
};

#[derive(Debug, Clone, PartialEq)]
pub struct SimEncoder {
    pub address: u8,
    pub id: u32,
    pub single_turn: u32,
    pub multi_turn: u16,
    pub status_word: u16,
    pub alarm: u16,
    pub temperature: f32,
    pub status: EncoderStatus,
    pub memory: Vec<u16>,
}

impl SimEncoder {
    pub fn new(address: u8) -> Self {
        Self {
            address,
            id: 0x00a0_0000 | u32::from(address),
            single_turn: 0x1000 * (u32::from(address) + 1),
            multi_turn: u16::from(address) + 1,
            status_word: 0,
            alarm: 0,
            temperature: 25.0,
            status: EncoderStatus::empty(),
            memory: vec![0; 256],
        }
    }
}

pub struct EncoderChain {
    pub encoders: Vec<SimEncoder>,
    pub encoder: Encoder,
    /// Break the CRC of the slot at this position in every response.
    pub corrupt_slot: Option<usize>,
    /// Echo memory writes with the low data bit flipped.
    pub mismatch_memory_echo: bool,
    /// Command frames answered so far.
    pub requests: usize,
    pending: Option<(CommandFrame, Vec<u8>)>,
}

impl EncoderChain {
    pub fn new(count: u8, encoder: Encoder) -> Self {
        Self {
            encoders: (0..count.min(8)).map(SimEncoder::new).collect(),
            encoder,
            corrupt_slot: None,
            mismatch_memory_echo: false,
            requests: 0,
            pending: None,
        }
    }

    fn responders(&self, frame: CommandFrame, mdfs: &[u8]) -> Vec<usize> {
        use Command::*;
        let mut found: Vec<usize> = match frame.command {
            SetAddressOneToOne | IdReadOneToOne | IdWriteOneToOne => {
                (!self.encoders.is_empty()).then_some(0).into_iter().collect()
            }
            SetAddressMatchingId => {
                let id = u32::from_le_bytes([mdfs[0], mdfs[1], mdfs[2], 0]);
                self.encoders.iter().position(|e| e.id == id).into_iter().collect()
            }
            command if command.is_multi() => (0..self.encoders.len())
                .filter(|i| self.encoders[*i].address <= frame.address)
                .collect(),
            _ => (0..self.encoders.len())
                .filter(|i| self.encoders[*i].address == frame.address)
                .collect(),
        };
        found.sort_by_key(|i| self.encoders[*i].address);
        found
    }

    fn slot(&mut self, index: usize, frame: CommandFrame, mdfs: &[u8]) -> Vec<u16> {
        use Command::*;
        let single_mask = self.encoder.single_turn_mask();
        let single_bits = self.encoder.single_turn_bits();
        let multi_mask = self.encoder.multi_turn_mask();
        let mismatch = self.mismatch_memory_echo;
        let enc = &mut self.encoders[index];

        let st = enc.single_turn & single_mask;
        let multi = u32::from(enc.multi_turn) & multi_mask;
        let full = u64::from(st) | (u64::from(multi) << single_bits);
        let lo24 = |v: u32| [v as u16, ((v >> 16) & 0xff) as u16];
        let id_bytes = || u32::from_le_bytes([mdfs[0], mdfs[1], mdfs[2], 0]);

        let data: Vec<u16> = match frame.command {
            ItAbsFull | MtAbsFull => {
                vec![full as u16, (full >> 16) as u16, ((full >> 32) & 0xff) as u16]
            }
            ItAbsLower24 | MtAbsLower24 => lo24(st).to_vec(),
            ItAbsUpper24 | MtAbsUpper24 => lo24((full >> 16) as u32).to_vec(),
            ItEncoderStatus | MtEncoderStatus => vec![enc.status_word, 0],
            ClearStatus => {
                enc.status = EncoderStatus::empty();
                vec![0, 0]
            }
            ClearMultiTurn => {
                enc.multi_turn = 0;
                vec![0, 0]
            }
            ClearStatusMultiTurn => {
                enc.status = EncoderStatus::empty();
                enc.multi_turn = 0;
                vec![0, 0]
            }
            PresetSingleTurnZero => {
                enc.single_turn = 0;
                vec![0, 0]
            }
            SetAddressOneToOne | SetAddressMatchingId => {
                enc.address = frame.address;
                if frame.command == SetAddressMatchingId {
                    lo24(enc.id).to_vec()
                } else {
                    vec![0, 0]
                }
            }
            MemoryRead => {
                let addr = mdfs[0];
                vec![enc.memory[usize::from(addr)], u16::from(addr)]
            }
            MemoryWrite => {
                let value = u16::from_le_bytes([mdfs[0], mdfs[1]]);
                let addr = mdfs[2];
                enc.memory[usize::from(addr)] = value;
                let echo = if mismatch { value ^ 1 } else { value };
                vec![echo, u16::from(addr)]
            }
            Temperature => vec![temperature_raw(enc.temperature), 0],
            IdRead | IdReadOneToOne => lo24(enc.id).to_vec(),
            IdWrite | IdWriteOneToOne => {
                enc.id = id_bytes();
                lo24(enc.id).to_vec()
            }
            ItAbsLower17 | MtAbsLower17 => {
                let st = st & 0x1_ffff;
                let mut info =
                    4 | (u16::from(enc.address & 0x7) << 3) | (((st & 0x1ff) as u16) << 7);
                if !enc.status.is_empty() {
                    info |= 0x0040;
                }
                let mut slot = vec![info, (st >> 9) as u16 & 0xff];
                seal_slot(&mut slot);
                return slot;
            }
            ItAbsLower24Status | MtAbsLower24Status => {
                let [lo, hi] = lo24(st);
                vec![lo, hi | (enc.alarm << 8), enc.alarm >> 8]
            }
            ItAbsLower24Temperature | MtAbsLower24Temperature => {
                let [lo, hi] = lo24(st);
                let temp = temperature_raw(enc.temperature);
                vec![lo, hi | (temp << 8), temp >> 8]
            }
        };

        let mut slot = vec![InfoField::new(enc.address, frame.command, enc.status).0];
        slot.extend(data);
        seal_slot(&mut slot);
        slot
    }

    fn answer(&mut self, frame: CommandFrame, mdfs: &[u8]) -> Vec<u16> {
        self.requests += 1;
        let mut out = Vec::new();
        for (position, index) in self.responders(frame, mdfs).into_iter().enumerate() {
            let mut slot = self.slot(index, frame, mdfs);
            if self.corrupt_slot == Some(position) {
                if let Some(last) = slot.last_mut() {
                    *last ^= 0x8000;
                }
            }
            out.extend(slot);
        }
        debug!(command = %frame.command, len = out.len(), "encoder chain answered");
        out
    }
}

impl Responder for EncoderChain {
    fn respond(&mut self, unit: u16) -> Vec<u16> {
        if let Some((frame, mut mdfs)) = self.pending.take() {
            let Ok(mdf) = MemoryFrame::from_raw(unit) else {
                return Vec::new();
            };
            mdfs.push(mdf.data);
            if mdfs.len() + 1 < frame.command.request_frames() {
                self.pending = Some((frame, mdfs));
                return Vec::new();
            }
            return self.answer(frame, &mdfs);
        }

        let Ok(frame) = CommandFrame::from_raw(unit) else {
            return Vec::new();
        };
        if frame.command.request_frames() > 1 {
            self.pending = Some((frame, Vec::new()));
            return Vec::new();
        }
        self.answer(frame, &[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::slot_crc_valid;

    #[test]
    fn multi_transmission_answers_in_address_order() {
        let mut chain = EncoderChain::new(4, Encoder::default());
        chain.encoders.swap(0, 3);
        let units = chain.respond(CommandFrame::new(2, Command::MtAbsLower24).to_raw());
        assert_eq!(units.len(), 9);
        for (i, slot) in units.chunks(3).enumerate() {
            assert!(slot_crc_valid(slot));
            assert_eq!(InfoField(slot[0]).address(), i as u8);
        }
    }

    #[test]
    fn ignores_bad_frames() {
        let mut chain = EncoderChain::new(1, Encoder::default());
        let raw = CommandFrame::new(0, Command::ItAbsFull).to_raw();
        assert!(chain.respond(raw ^ 0x2000).is_empty());
        assert!(chain.respond(CommandFrame::new(5, Command::ItAbsFull).to_raw()).is_empty());
        assert_eq!(chain.requests, 1);
    }

    #[test]
    fn memory_write_waits_for_all_frames() {
        let mut chain = EncoderChain::new(1, Encoder::default());
        assert!(chain.respond(CommandFrame::new(0, Command::MemoryWrite).to_raw()).is_empty());
        for mdf in MemoryFrame::split(0x12_beef) {
            let units = chain.respond(mdf.to_raw());
            if mdf.data == 0x12 {
                assert_eq!(units.len(), 3);
                assert_eq!(units[1], 0xbeef);
            } else {
                assert!(units.is_empty());
            }
        }
        assert_eq!(chain.encoders[0].memory[0x12], 0xbeef);
    }
}
