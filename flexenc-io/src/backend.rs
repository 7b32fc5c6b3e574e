use crate::{Mode, Timing};

bitflags::bitflags! {
    /// Shifter status as seen by the transfer engine.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Status: u8 {
        const TX_EMPTY   = 1 << 0;
        const RX_FULL    = 1 << 1;
        const RX_OVERRUN = 1 << 2;
    }
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Interrupts: u8 {
        const TX = 1 << 0;
        const RX = 1 << 1;
    }
}

/// A shift-register/timer peripheral able to clock encoder frames.
///
/// One transfer unit is moved per [`Backend::write`] / [`Backend::read`].
/// Byte protocols only use the low 8 bits.
pub trait Backend {
    /// Program the shifters and timers for `timing`.
    fn configure(&mut self, timing: &Timing, mode: Mode);

    fn status(&mut self) -> Status;
    fn clear_status(&mut self, flags: Status);

    fn enable_interrupts(&mut self, mask: Interrupts);
    fn disable_interrupts(&mut self, mask: Interrupts);
    fn interrupts(&self) -> Interrupts;

    fn write(&mut self, unit: u16);
    fn read(&mut self) -> u16;

    /// Set the compare value of the DR timer, bounding the window in which
    /// the transmitter drives the line.
    fn set_window(&mut self, compare: u16);

    /// Busy-wait for at least `us` microseconds.
    fn delay_us(&mut self, us: u32);
}

impl<B: Backend + ?Sized> Backend for Box<B> {
    fn configure(&mut self, timing: &Timing, mode: Mode) {
        B::configure(&mut *self, timing, mode)
    }

    fn status(&mut self) -> Status {
        B::status(&mut *self)
    }

    fn clear_status(&mut self, flags: Status) {
        B::clear_status(&mut *self, flags)
    }

    fn enable_interrupts(&mut self, mask: Interrupts) {
        B::enable_interrupts(&mut *self, mask)
    }

    fn disable_interrupts(&mut self, mask: Interrupts) {
        B::disable_interrupts(&mut *self, mask)
    }

    fn interrupts(&self) -> Interrupts {
        B::interrupts(&**self)
    }

    fn write(&mut self, unit: u16) {
        B::write(&mut *self, unit)
    }

    fn read(&mut self) -> u16 {
        B::read(&mut *self)
    }

    fn set_window(&mut self, compare: u16) {
        B::set_window(&mut *self, compare)
    }

    fn delay_us(&mut self, us: u32) {
        B::delay_us(&mut *self, us)
    }
}

/// A single element moved through the shifter buffer register.
pub trait Unit: Copy + Default + std::fmt::Debug + 'static {
    fn to_raw(self) -> u16;
    fn from_raw(raw: u16) -> Self;
}

impl Unit for u8 {
    fn to_raw(self) -> u16 {
        self as u16
    }

    fn from_raw(raw: u16) -> Self {
        raw as u8
    }
}

impl Unit for u16 {
    fn to_raw(self) -> u16 {
        self
    }

    fn from_raw(raw: u16) -> Self {
        raw
    }
}
