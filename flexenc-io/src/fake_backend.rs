use std::collections::VecDeque;

use crate::{Backend, Interrupts, Mode, Status, Timing};

/// Everything the engine asked of the peripheral, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Configure { shift_compare: u16, mode: Mode },
    Write(u16),
    Read(u16),
    Window(u16),
    Delay(u32),
    Enable(Interrupts),
    Disable(Interrupts),
}

/// The far end of the bus: answers written units with received ones.
pub trait Responder {
    fn respond(&mut self, unit: u16) -> Vec<u16>;
}

impl Responder for () {
    fn respond(&mut self, _unit: u16) -> Vec<u16> {
        Vec::new()
    }
}

pub struct FakeBackend<S = ()> {
    ops: Vec<Op>,
    rx: VecDeque<u16>,
    interrupts: Interrupts,
    overrun: bool,
    tx_stalled: bool,
    tx_credit: Option<usize>,
    responder: S,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::with_responder(())
    }
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// One signal drawn on two text rows, two columns per bit.
struct Trace {
    high: String,
    low: String,
    level: bool,
}

impl Trace {
    fn new(idle: bool) -> Self {
        Self {
            high: String::new(),
            low: String::new(),
            level: idle,
        }
    }

    fn push(&mut self, bit: bool) {
        let (high, low) = match (self.level, bit) {
            (true, true) => ("──", "  "),
            (true, false) => ("─┐", " └"),
            (false, true) => (" ┌", "─┘"),
            (false, false) => ("  ", "──"),
        };
        self.high.push_str(high);
        self.low.push_str(low);
        self.level = bit;
    }
}

impl<S: Responder> FakeBackend<S> {
    pub fn with_responder(responder: S) -> Self {
        Self {
            ops: Vec::new(),
            rx: VecDeque::new(),
            interrupts: Interrupts::empty(),
            overrun: false,
            tx_stalled: false,
            tx_credit: None,
            responder,
        }
    }

    pub fn responder(&self) -> &S {
        &self.responder
    }

    pub fn responder_mut(&mut self) -> &mut S {
        &mut self.responder
    }

    pub fn queue_rx(&mut self, units: impl IntoIterator<Item = u16>) {
        self.rx.extend(units);
    }

    pub fn pending_rx(&self) -> usize {
        self.rx.len()
    }

    /// Hold TX_EMPTY low, so blocking writes never make progress.
    pub fn stall_tx(&mut self, stalled: bool) {
        self.tx_stalled = stalled;
        self.tx_credit = None;
    }

    /// Accept `writes` more units, then stall like [`FakeBackend::stall_tx`].
    pub fn stall_tx_after(&mut self, writes: usize) {
        self.tx_credit = Some(writes);
    }

    pub fn inject_overrun(&mut self) {
        self.overrun = true;
    }

    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    pub fn consume_ops(&mut self) -> Vec<Op> {
        std::mem::take(&mut self.ops)
    }

    pub fn written(&self) -> Vec<u16> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                Op::Write(unit) => Some(*unit),
                _ => None,
            })
            .collect()
    }

    pub fn delays(&self) -> Vec<u32> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                Op::Delay(us) => Some(*us),
                _ => None,
            })
            .collect()
    }

    pub fn last_window(&self) -> Option<u16> {
        self.ops.iter().rev().find_map(|op| match op {
            Op::Window(compare) => Some(*compare),
            _ => None,
        })
    }

    /// Render the transmitted frames as TX/DR waveforms: start bit, `data_bits`
    /// bits LSB first, stop bit, one idle bit between frames. The top row
    /// labels each frame with its value.
    pub fn waveform(&self, data_bits: u8) -> String {
        let bits = usize::from(data_bits);
        let width = 2 * (bits + 3);
        let digits = bits.div_ceil(4);
        let mut label = String::new();
        let mut tx = Trace::new(true);
        let mut dr = Trace::new(false);
        for unit in self.written() {
            let value = format!("{unit:0digits$X}");
            label.push_str(&format!("{value:<width$}"));
            tx.push(false);
            for bit in 0..data_bits {
                tx.push((unit >> bit) & 1 == 1);
            }
            tx.push(true);
            tx.push(true);
            for _ in 0..bits + 2 {
                dr.push(true);
            }
            dr.push(false);
        }

        let mut out = format!("frame │{label}\n");
        for (name, trace) in [("tx", tx), ("dr", dr)] {
            out.push_str(&format!("{name:<5} │{}\n      │{}\n", trace.high, trace.low));
        }
        out
    }
}

impl<S: Responder> Backend for FakeBackend<S> {
    fn configure(&mut self, timing: &Timing, mode: Mode) {
        self.ops.push(Op::Configure {
            shift_compare: timing.shift_compare,
            mode,
        });
    }

    fn status(&mut self) -> Status {
        let mut status = Status::empty();
        status.set(Status::TX_EMPTY, !self.tx_stalled && self.tx_credit != Some(0));
        status.set(Status::RX_FULL, !self.rx.is_empty());
        status.set(Status::RX_OVERRUN, self.overrun);
        status
    }

    fn clear_status(&mut self, flags: Status) {
        if flags.contains(Status::RX_OVERRUN) {
            self.overrun = false;
        }
    }

    fn enable_interrupts(&mut self, mask: Interrupts) {
        self.interrupts |= mask;
        self.ops.push(Op::Enable(mask));
    }

    fn disable_interrupts(&mut self, mask: Interrupts) {
        self.interrupts &= !mask;
        self.ops.push(Op::Disable(mask));
    }

    fn interrupts(&self) -> Interrupts {
        self.interrupts
    }

    fn write(&mut self, unit: u16) {
        self.ops.push(Op::Write(unit));
        if let Some(credit) = &mut self.tx_credit {
            *credit = credit.saturating_sub(1);
        }
        let reply = self.responder.respond(unit);
        self.rx.extend(reply);
    }

    fn read(&mut self) -> u16 {
        let unit = self.rx.pop_front().unwrap_or(0xffff);
        self.ops.push(Op::Read(unit));
        unit
    }

    fn set_window(&mut self, compare: u16) {
        self.ops.push(Op::Window(compare));
    }

    fn delay_us(&mut self, us: u32) {
        self.ops.push(Op::Delay(us));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn echo_responder() {
        struct Echo;
        impl Responder for Echo {
            fn respond(&mut self, unit: u16) -> Vec<u16> {
                vec![unit, !unit]
            }
        }

        let mut fake = FakeBackend::with_responder(Echo);
        fake.write(0x1234);
        assert!(fake.status().contains(Status::RX_FULL));
        assert_eq!(fake.read(), 0x1234);
        assert_eq!(fake.read(), !0x1234);
        assert!(!fake.status().contains(Status::RX_FULL));
        assert_eq!(fake.written(), [0x1234]);
    }

    #[test]
    fn waveform_shape() {
        let mut fake = FakeBackend::new();
        fake.write(0b0101);
        fake.write(0b1111);
        let wave = fake.waveform(4);
        let lines: Vec<_> = wave.lines().collect();
        assert_eq!(lines.len(), 5);
        // start, 4 data bits, stop, idle per frame
        assert_eq!(lines[0], format!("frame │{:<14}{:<14}", "5", "F"));
        assert!(lines[1].starts_with("tx    │─┐ ┌─┐ ┌─┐"));
        assert_eq!(lines[1].chars().count(), "tx    │".chars().count() + 2 * 7 * 2);
        assert!(lines[3].starts_with("dr    │ ┌"));
    }

    #[test]
    fn stall_after_writes() {
        let mut fake = FakeBackend::new();
        fake.stall_tx_after(2);
        for unit in 0..2 {
            assert!(fake.status().contains(Status::TX_EMPTY));
            fake.write(unit);
        }
        assert!(!fake.status().contains(Status::TX_EMPTY));
        fake.stall_tx(false);
        assert!(fake.status().contains(Status::TX_EMPTY));
    }
}
