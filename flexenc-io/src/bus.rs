use tracing::{debug, instrument, warn};

use crate::{
    Backend, Error, Interrupts, Mode, Result, RingBuffer, SpaceHex, Status, Timing, Unit,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    Busy,
}

/// Turns the units of a completed receive into a typed result.
pub type Parser<W, R> = Box<dyn FnOnce(&[W]) -> R>;

/// Invoked from [`Bus::handle_irq`] (and from [`Bus::receive_non_blocking`]
/// when the ring already holds everything requested). Must not block.
pub type Callback<W, R> = Box<dyn FnMut(Event<'_, W, R>)>;

#[derive(Debug)]
pub enum Received<W, R> {
    /// A plain receive with no command context attached.
    Raw(Vec<W>),
    Parsed(R),
}

#[derive(Debug)]
pub enum Event<'a, W, R> {
    TxIdle,
    RxIdle(Received<W, R>),
    HardwareOverrun,
    /// The ring is full and the oldest unit is about to be overwritten,
    /// unless the observer drains it now.
    RingBufferOverrun(&'a mut RingBuffer<W>),
}

struct Tx<W> {
    data: Vec<W>,
    sent: usize,
}

struct Rx<W, R> {
    buf: Vec<W>,
    filled: usize,
    parse: Option<Parser<W, R>>,
}

/// Poll budget shared by every unit of one blocking call.
struct Budget(Option<u32>);

impl Budget {
    fn new(retry: u32) -> Self {
        Self((retry != 0).then_some(retry))
    }

    fn wait(&mut self, mut ready: impl FnMut() -> bool) -> Result<()> {
        loop {
            if ready() {
                return Ok(());
            }
            if let Some(left) = &mut self.0 {
                *left -= 1;
                if *left == 0 {
                    return Err(Error::Timeout);
                }
            }
        }
    }
}

/// Transfer handle for one encoder bus.
///
/// `W` is the transfer unit and `R` the result type command receives are
/// parsed into.
pub struct Bus<B, W, R> {
    backend: B,
    timing: Timing,
    retry: u32,
    tx: Option<Tx<W>>,
    rx: Option<Rx<W, R>>,
    ring: Option<RingBuffer<W>>,
    callback: Option<Callback<W, R>>,
}

impl<B: Backend, W: Unit, R> Bus<B, W, R> {
    pub fn new(mut backend: B, timing: Timing, mode: Mode, retry: u32) -> Self {
        backend.configure(&timing, mode);
        Self {
            backend,
            timing,
            retry,
            tx: None,
            rx: None,
            ring: None,
            callback: None,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn into_backend(self) -> B {
        self.backend
    }

    pub fn timing(&self) -> &Timing {
        &self.timing
    }

    pub fn set_callback(&mut self, callback: impl FnMut(Event<'_, W, R>) + 'static) {
        self.callback = Some(Box::new(callback));
    }

    pub fn clear_callback(&mut self) {
        self.callback = None;
    }

    pub fn tx_state(&self) -> State {
        if self.tx.is_some() { State::Busy } else { State::Idle }
    }

    pub fn rx_state(&self) -> State {
        if self.rx.is_some() { State::Busy } else { State::Idle }
    }

    /// Size the DR window for `frames` request frames.
    pub fn set_response_frames(&mut self, frames: usize) {
        let compare = self.timing.window(frames);
        self.backend.set_window(compare);
    }

    #[instrument(skip_all)]
    pub fn write_blocking(&mut self, data: &[W]) -> Result<()> {
        debug!(len = data.len(), data = %SpaceHex(data));
        let Self {
            backend, retry, ..
        } = self;
        let mut budget = Budget::new(*retry);
        for unit in data {
            budget.wait(|| backend.status().contains(Status::TX_EMPTY))?;
            backend.write(unit.to_raw());
        }
        Ok(())
    }

    #[instrument(skip_all)]
    pub fn read_blocking(&mut self, buf: &mut [W]) -> Result<()> {
        let Self {
            backend, retry, ..
        } = self;
        let mut budget = Budget::new(*retry);
        for unit in buf.iter_mut() {
            budget.wait(|| backend.status().contains(Status::RX_FULL))?;
            *unit = W::from_raw(backend.read());
        }
        debug!(len = buf.len(), data = %SpaceHex(buf));
        Ok(())
    }

    /// Write one unit without waiting for the transmitter, as used for
    /// externally triggered requests.
    pub fn write_now(&mut self, unit: W) {
        debug!(data = ?unit, "write");
        self.backend.write(unit.to_raw());
    }

    pub fn send_non_blocking(&mut self, data: Vec<W>) -> Result<()> {
        if data.is_empty() {
            return Err(Error::InvalidArgument("empty transmit buffer"));
        }
        if self.tx.is_some() {
            return Err(Error::TxBusy);
        }
        self.tx = Some(Tx { data, sent: 0 });
        self.backend.enable_interrupts(Interrupts::TX);
        Ok(())
    }

    pub fn abort_send(&mut self) {
        self.backend.disable_interrupts(Interrupts::TX);
        self.tx = None;
    }

    /// Units already moved to the transmitter.
    pub fn send_count(&self) -> Result<usize> {
        self.tx
            .as_ref()
            .map(|tx| tx.sent)
            .ok_or(Error::NoTransferInProgress)
    }

    /// Start receiving `len` units. Units already waiting in the ring buffer
    /// are taken first and their count is returned; when they cover the whole
    /// request the completion event fires before this returns.
    pub fn receive_non_blocking(
        &mut self,
        len: usize,
        parse: Option<Parser<W, R>>,
    ) -> Result<usize> {
        if len == 0 {
            return Err(Error::InvalidArgument("empty receive buffer"));
        }
        if self.rx.is_some() {
            return Err(Error::RxBusy);
        }

        let mut rx = Rx {
            buf: vec![W::default(); len],
            filled: 0,
            parse,
        };

        let Some(ring) = &mut self.ring else {
            self.rx = Some(rx);
            self.backend.enable_interrupts(Interrupts::RX);
            return Ok(0);
        };

        self.backend.disable_interrupts(Interrupts::RX);
        rx.filled = ring.drain_into(&mut rx.buf);
        let copied = rx.filled;
        if copied == len {
            self.backend.enable_interrupts(Interrupts::RX);
            self.complete(rx);
        } else {
            self.rx = Some(rx);
            self.backend.enable_interrupts(Interrupts::RX);
        }
        Ok(copied)
    }

    /// Drop the pending receive. A running ring buffer keeps capturing.
    pub fn abort_receive(&mut self) {
        if self.ring.is_none() {
            self.backend.disable_interrupts(Interrupts::RX);
        }
        self.rx = None;
    }

    pub fn receive_count(&self) -> Result<usize> {
        self.rx
            .as_ref()
            .map(|rx| rx.filled)
            .ok_or(Error::NoTransferInProgress)
    }

    /// Capture every unit no receive request is waiting for.
    pub fn start_ring_buffer(&mut self, capacity: usize) -> Result<()> {
        self.ring = Some(RingBuffer::new(capacity)?);
        self.backend.enable_interrupts(Interrupts::RX);
        Ok(())
    }

    /// Detach the ring buffer, handing back whatever it still holds.
    pub fn stop_ring_buffer(&mut self) -> Option<RingBuffer<W>> {
        if self.rx.is_none() {
            self.backend.disable_interrupts(Interrupts::RX);
        }
        self.ring.take()
    }

    pub fn ring(&self) -> Option<&RingBuffer<W>> {
        self.ring.as_ref()
    }

    pub fn ring_mut(&mut self) -> Option<&mut RingBuffer<W>> {
        self.ring.as_mut()
    }

    fn notify(callback: &mut Option<Callback<W, R>>, event: Event<'_, W, R>) {
        if let Some(callback) = callback {
            callback(event);
        }
    }

    fn complete(&mut self, rx: Rx<W, R>) {
        let received = match rx.parse {
            Some(parse) => Received::Parsed(parse(&rx.buf)),
            None => Received::Raw(rx.buf),
        };
        Self::notify(&mut self.callback, Event::RxIdle(received));
    }

    /// Service one interrupt of the bus's shifters.
    #[instrument(skip_all)]
    pub fn handle_irq(&mut self) {
        let status = self.backend.status();
        let enabled = self.backend.interrupts();

        if status.contains(Status::RX_OVERRUN) {
            self.backend.clear_status(Status::RX_OVERRUN);
            warn!("receiver overrun");
            Self::notify(&mut self.callback, Event::HardwareOverrun);
        }

        if status.contains(Status::RX_FULL) && enabled.contains(Interrupts::RX) {
            self.service_rx();
        }

        if status.contains(Status::TX_EMPTY) && enabled.contains(Interrupts::TX) {
            self.service_tx();
        }
    }

    fn service_rx(&mut self) {
        let consumed = match &mut self.rx {
            Some(rx) => {
                rx.buf[rx.filled] = W::from_raw(self.backend.read());
                rx.filled += 1;
                true
            }
            None => false,
        };

        let done = self
            .rx
            .as_ref()
            .is_some_and(|rx| rx.filled == rx.buf.len());
        if done {
            if let Some(rx) = self.rx.take() {
                debug!(len = rx.buf.len(), data = %SpaceHex(&rx.buf), "receive complete");
                self.complete(rx);
            }
        }

        let Self {
            backend,
            ring,
            callback,
            rx,
            ..
        } = self;
        match ring {
            Some(ring) if !consumed => {
                if ring.is_full() {
                    warn!(capacity = ring.capacity(), "ring buffer overrun");
                    Self::notify(callback, Event::RingBufferOverrun(&mut *ring));
                }
                ring.push_overwriting(W::from_raw(backend.read()));
            }
            Some(_) => {}
            None if rx.is_none() => backend.disable_interrupts(Interrupts::RX),
            None => {}
        }
    }

    fn service_tx(&mut self) {
        let Some(tx) = &mut self.tx else {
            return;
        };
        self.backend.write(tx.data[tx.sent].to_raw());
        tx.sent += 1;
        if tx.sent == tx.data.len() {
            self.tx = None;
            self.backend.disable_interrupts(Interrupts::TX);
            Self::notify(&mut self.callback, Event::TxIdle);
        }
    }
}
