use flexenc_io::{Backend, Bus, Config, Event, Mode, Timing};
use tracing::{debug, instrument};

use crate::{
    Address, ClearKind, Command, Encoder, Error, Result,
    frame::{MemoryFrame, MemoryField},
    request::Request,
    response::{Position, Reply, Response, WithStatus, WithTemperature},
};

/// Settling time between consecutive frames of one request.
const FRAME_DELAY_US: u32 = 7;
/// Clear and address requests take effect after this many repetitions.
const REPEATS: usize = 8;
const ID_MASK: u32 = 0xff_ffff;

pub struct Driver<B> {
    bus: Bus<B, u16, Reply>,
    encoder: Encoder,
    mode: Mode,
}

impl<B: Backend> Driver<B> {
    pub fn new(backend: B, config: &Config, encoder: Encoder) -> Result<Self> {
        let timing = Timing::a_format(config.baudrate, config.src_clock_hz)?;
        debug!(?timing, "a-format bus");
        Ok(Self {
            bus: Bus::new(backend, timing, config.mode, config.retry),
            encoder,
            mode: config.mode,
        })
    }

    pub fn bus(&self) -> &Bus<B, u16, Reply> {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut Bus<B, u16, Reply> {
        &mut self.bus
    }

    pub fn into_backend(self) -> B {
        self.bus.into_backend()
    }

    pub fn encoder(&self) -> Encoder {
        self.encoder
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn set_callback(&mut self, callback: impl FnMut(Event<'_, u16, Reply>) + 'static) {
        self.bus.set_callback(callback);
    }

    pub fn handle_irq(&mut self) {
        self.bus.handle_irq();
    }

    fn request(&self, command: Command, address: Address) -> Request {
        Request::new(command, address, self.encoder)
    }

    fn transact(&mut self, request: &Request) -> Result<Vec<u16>> {
        self.bus.set_response_frames(request.command().request_frames());
        self.bus.write_blocking(&[request.frame()])?;
        let mut units = vec![0; request.response_len()];
        self.bus.read_blocking(&mut units)?;
        Ok(units)
    }

    /// Arm a receive carrying `request` as its parse context, then send the
    /// command frame. The reply arrives through the callback.
    fn submit(&mut self, request: Request) -> Result<()> {
        self.bus.set_response_frames(1);
        let parse = Box::new(move |units: &[u16]| request.parse(units));
        self.bus
            .receive_non_blocking(request.response_len(), Some(parse))?;
        if let Err(e) = self.bus.write_blocking(&[request.frame()]) {
            self.bus.abort_receive();
            return Err(e.into());
        }
        Ok(())
    }

    /// Command frame followed by memory data frames, each after a settling
    /// delay.
    fn write_sequence(&mut self, request: &Request, mdfs: &[MemoryFrame]) -> Result<Vec<u16>> {
        self.bus.set_response_frames(1 + mdfs.len());
        self.bus.write_blocking(&[request.frame()])?;
        for mdf in mdfs {
            self.bus.backend_mut().delay_us(FRAME_DELAY_US);
            self.bus.write_blocking(&[mdf.to_raw()])?;
        }
        let mut units = vec![0; request.response_len()];
        self.bus.read_blocking(&mut units)?;
        Ok(units)
    }

    #[instrument(skip(self))]
    pub fn read_full(&mut self, address: Address) -> Result<Response<Position>> {
        let request = self.request(address.pick(Command::ItAbsFull, Command::MtAbsFull), address);
        let units = self.transact(&request)?;
        Ok(request.parse_full(&units))
    }

    #[instrument(skip(self))]
    pub fn read_full_irq(&mut self, address: Address) -> Result<()> {
        let request = self.request(address.pick(Command::ItAbsFull, Command::MtAbsFull), address);
        self.submit(request)
    }

    #[instrument(skip(self))]
    pub fn read_single_turn(&mut self, address: Address) -> Result<Response<u32>> {
        let request =
            self.request(address.pick(Command::ItAbsLower24, Command::MtAbsLower24), address);
        let units = self.transact(&request)?;
        Ok(request.parse_single_turn(&units))
    }

    #[instrument(skip(self))]
    pub fn read_single_turn_irq(&mut self, address: Address) -> Result<()> {
        let request =
            self.request(address.pick(Command::ItAbsLower24, Command::MtAbsLower24), address);
        self.submit(request)
    }

    #[instrument(skip(self))]
    pub fn read_multi_turn(&mut self, address: Address) -> Result<Response<u16>> {
        let request =
            self.request(address.pick(Command::ItAbsUpper24, Command::MtAbsUpper24), address);
        let units = self.transact(&request)?;
        Ok(request.parse_multi_turn(&units))
    }

    #[instrument(skip(self))]
    pub fn read_multi_turn_irq(&mut self, address: Address) -> Result<()> {
        let request =
            self.request(address.pick(Command::ItAbsUpper24, Command::MtAbsUpper24), address);
        self.submit(request)
    }

    #[instrument(skip(self))]
    pub fn read_status(&mut self, address: Address) -> Result<Response<u16>> {
        let request = self.request(
            address.pick(Command::ItEncoderStatus, Command::MtEncoderStatus),
            address,
        );
        let units = self.transact(&request)?;
        Ok(request.parse_status(&units))
    }

    #[instrument(skip(self))]
    pub fn read_status_irq(&mut self, address: Address) -> Result<()> {
        let request = self.request(
            address.pick(Command::ItEncoderStatus, Command::MtEncoderStatus),
            address,
        );
        self.submit(request)
    }

    /// Individual transmission only; the multi-transmission flag is ignored.
    #[instrument(skip(self))]
    pub fn read_temperature(&mut self, address: Address) -> Result<f32> {
        let request = self.request(Command::Temperature, Address::single(address.index()));
        let units = self.transact(&request)?;
        request.parse_temperature(&units)
    }

    #[instrument(skip(self))]
    pub fn read_temperature_irq(&mut self, address: Address) -> Result<()> {
        let request = self.request(Command::Temperature, Address::single(address.index()));
        self.submit(request)
    }

    /// Individual transmission only; the multi-transmission flag is ignored.
    #[instrument(skip(self))]
    pub fn read_id(&mut self, address: Address) -> Result<u32> {
        let request = self.request(Command::IdRead, Address::single(address.index()));
        let units = self.transact(&request)?;
        request.parse_id(&units)
    }

    #[instrument(skip(self))]
    pub fn read_id_irq(&mut self, address: Address) -> Result<()> {
        let request = self.request(Command::IdRead, Address::single(address.index()));
        self.submit(request)
    }

    /// ID of the only encoder on a 1-to-1 connection.
    #[instrument(skip(self))]
    pub fn read_id_one_to_one(&mut self) -> Result<u32> {
        let request = self.request(Command::IdReadOneToOne, Address::single(0));
        let units = self.transact(&request)?;
        request.parse_id(&units)
    }

    #[instrument(skip(self))]
    pub fn read_single_turn_17bit(&mut self, address: Address) -> Result<Response<u32>> {
        let request =
            self.request(address.pick(Command::ItAbsLower17, Command::MtAbsLower17), address);
        let units = self.transact(&request)?;
        Ok(request.parse_single_turn_17bit(&units))
    }

    #[instrument(skip(self))]
    pub fn read_single_turn_with_status(
        &mut self,
        address: Address,
    ) -> Result<Response<WithStatus>> {
        let request = self.request(
            address.pick(Command::ItAbsLower24Status, Command::MtAbsLower24Status),
            address,
        );
        let units = self.transact(&request)?;
        Ok(request.parse_with_status(&units))
    }

    #[instrument(skip(self))]
    pub fn read_single_turn_with_temperature(
        &mut self,
        address: Address,
    ) -> Result<Response<WithTemperature>> {
        let request = self.request(
            address.pick(
                Command::ItAbsLower24Temperature,
                Command::MtAbsLower24Temperature,
            ),
            address,
        );
        let units = self.transact(&request)?;
        Ok(request.parse_with_temperature(&units))
    }

    fn repeat(&mut self, request: &Request) -> Result<()> {
        for _ in 0..REPEATS {
            let units = self.transact(request)?;
            request.checked(&units)?;
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn clear(&mut self, address: Address, kind: ClearKind) -> Result<()> {
        let request = self.request(kind.command(), Address::single(address.index()));
        self.repeat(&request)
    }

    /// Assign `address` to the only encoder on a 1-to-1 connection.
    #[instrument(skip(self))]
    pub fn set_address_one_to_one(&mut self, address: Address) -> Result<()> {
        let request = self.request(Command::SetAddressOneToOne, Address::single(address.index()));
        self.repeat(&request)
    }

    #[instrument(skip(self))]
    pub fn memory_read(&mut self, address: Address, mem_addr: u8) -> Result<u16> {
        let request = self.request(Command::MemoryRead, Address::single(address.index()));
        let units =
            self.write_sequence(&request, &[MemoryFrame::new(MemoryField::Mdf2, mem_addr)])?;
        let slot = request.checked(&units)?;
        if slot[2] & 0xff != u16::from(mem_addr) {
            return Err(Error::Frame);
        }
        Ok(slot[1])
    }

    #[instrument(skip(self))]
    pub fn memory_write(&mut self, address: Address, mem_addr: u8, data: u16) -> Result<()> {
        let request = self.request(Command::MemoryWrite, Address::single(address.index()));
        let [lo, hi] = data.to_le_bytes();
        let mdfs = [
            MemoryFrame::new(MemoryField::Mdf0, lo),
            MemoryFrame::new(MemoryField::Mdf1, hi),
            MemoryFrame::new(MemoryField::Mdf2, mem_addr),
        ];
        let units = self.write_sequence(&request, &mdfs)?;
        let slot = request.checked(&units)?;
        if slot[1] != data || slot[2] & 0xff != u16::from(mem_addr) {
            return Err(Error::Frame);
        }
        Ok(())
    }

    fn id_sequence(&mut self, request: Request, id: u32) -> Result<()> {
        if id > ID_MASK {
            return Err(Error::InvalidArgument("encoder ID has 24 bits"));
        }
        let units = self.write_sequence(&request, &MemoryFrame::split(id))?;
        let slot = request.checked(&units)?;
        let echo = (u32::from(slot[1]) | (u32::from(slot[2]) << 16)) & ID_MASK;
        if echo != id {
            return Err(Error::Frame);
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn write_id(&mut self, address: Address, id: u32) -> Result<()> {
        let request = self.request(Command::IdWrite, Address::single(address.index()));
        self.id_sequence(request, id)
    }

    #[instrument(skip(self))]
    pub fn write_id_one_to_one(&mut self, id: u32) -> Result<()> {
        let request = self.request(Command::IdWriteOneToOne, Address::single(0));
        self.id_sequence(request, id)
    }

    /// Give `address` to whichever encoder on the bus has ID `id`.
    #[instrument(skip(self))]
    pub fn set_address_matching_id(&mut self, id: u32, address: Address) -> Result<()> {
        let request =
            self.request(Command::SetAddressMatchingId, Address::single(address.index()));
        self.id_sequence(request, id)
    }

    /// Load the command frame for the external trigger to retransmit. The
    /// returned request parses the frames captured afterwards.
    #[instrument(skip(self))]
    pub fn send_sync_request(&mut self, address: Address, command: Command) -> Result<Request> {
        if !command.supports_sync() {
            return Err(Error::NotSyncCommand(command));
        }
        let request = self.request(command, address);
        self.bus.set_response_frames(1);
        self.bus.write_now(request.frame());
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use flexenc_io::{
        Interrupts, Received, State,
        fake_backend::{FakeBackend, Op},
    };

    use super::*;
    use crate::{
        EncoderStatus, Payload,
        frame::{CommandFrame, slot_crc_valid},
        sim::EncoderChain,
    };

    fn driver(count: u8) -> Driver<FakeBackend<EncoderChain>> {
        let encoder = Encoder::new(17, 16).unwrap();
        let backend = FakeBackend::with_responder(EncoderChain::new(count, encoder));
        Driver::new(backend, &Config::default(), encoder).unwrap()
    }

    fn driver_with_retry(count: u8, retry: u32) -> Driver<FakeBackend<EncoderChain>> {
        let encoder = Encoder::new(17, 16).unwrap();
        let backend = FakeBackend::with_responder(EncoderChain::new(count, encoder));
        let config = Config {
            retry,
            ..Config::default()
        };
        Driver::new(backend, &config, encoder).unwrap()
    }

    fn chain(driver: &mut Driver<FakeBackend<EncoderChain>>) -> &mut EncoderChain {
        driver.bus_mut().backend_mut().responder_mut()
    }

    #[test]
    fn single_read_end_to_end() {
        let mut d = driver(4);
        chain(&mut d).encoders[3].single_turn = 0xf_1234;
        let response = d.read_single_turn(Address::single(3)).unwrap();
        response.check().unwrap();
        assert_eq!(d.bus().backend().written(), [0x6162]);
        assert_eq!(response.slots[0].address, 3);
        // masked to 17 bits
        assert_eq!(response.slots[0].data, 0x1_1234);
    }

    #[test]
    fn full_read_of_chain() {
        let mut d = driver(3);
        let response = d.read_full(Address::multi(2)).unwrap();
        response.check().unwrap();
        let got: Vec<_> = response.slots.iter().map(|s| s.data).collect();
        let want: Vec<_> = (0..3u32)
            .map(|i| Position {
                single_turn: 0x1000 * (i + 1),
                multi_turn: i as u16 + 1,
            })
            .collect();
        assert_eq!(got, want);
    }

    #[test]
    fn multi_read_with_corrupted_slot() {
        let mut d = driver(4);
        chain(&mut d).corrupt_slot = Some(2);
        let response = d.read_multi_turn(Address::multi(3)).unwrap();
        assert_eq!(response.check(), Err(Error::Failed { errors: 1, slots: 4 }));
        for (i, slot) in response.slots.iter().enumerate() {
            if i == 2 {
                assert_eq!(slot.status, EncoderStatus::FRAME);
            } else {
                assert_eq!(slot.value(), Ok(i as u16 + 1));
            }
        }
    }

    #[test]
    fn encoder_error_reported_per_slot() {
        let mut d = driver(2);
        chain(&mut d).encoders[1].status = EncoderStatus::BATTERY;
        chain(&mut d).encoders[1].status_word = 0x0202;
        let response = d.read_status(Address::multi(1)).unwrap();
        assert_eq!(response.errors, 1);
        assert_eq!(response.slots[0].value(), Ok(0));
        assert_eq!(response.slots[1].status, EncoderStatus::BATTERY);
        assert_eq!(response.slots[1].data, 0x0202);
    }

    #[test]
    fn memory_write_sequence() {
        let mut d = driver(1);
        d.memory_write(Address::single(0), 0x21, 0xa55a).unwrap();

        let written = d.bus().backend().written();
        assert_eq!(written.len(), 4);
        assert_eq!(
            CommandFrame::from_raw(written[0]).map(|f| f.command),
            Ok(Command::MemoryWrite)
        );
        let mdfs: Vec<_> = written[1..]
            .iter()
            .map(|raw| MemoryFrame::from_raw(*raw).unwrap())
            .collect();
        assert_eq!(
            mdfs,
            [
                MemoryFrame::new(MemoryField::Mdf0, 0x5a),
                MemoryFrame::new(MemoryField::Mdf1, 0xa5),
                MemoryFrame::new(MemoryField::Mdf2, 0x21),
            ]
        );

        // a delay before every memory frame, none after the last
        let ops: Vec<_> = d
            .bus()
            .backend()
            .ops()
            .iter()
            .filter(|op| matches!(op, Op::Write(_) | Op::Delay(_)))
            .copied()
            .collect();
        assert_eq!(
            ops,
            [
                Op::Write(written[0]),
                Op::Delay(7),
                Op::Write(written[1]),
                Op::Delay(7),
                Op::Write(written[2]),
                Op::Delay(7),
                Op::Write(written[3]),
            ]
        );
        let window = d.bus().timing().window(4);
        assert!(d.bus().backend().ops().contains(&Op::Window(window)));

        assert_eq!(d.memory_read(Address::single(0), 0x21), Ok(0xa55a));
    }

    #[test]
    fn memory_write_echo_mismatch() {
        let mut d = driver(1);
        chain(&mut d).mismatch_memory_echo = true;
        assert_eq!(d.memory_write(Address::single(0), 3, 0x1234), Err(Error::Frame));
    }

    #[test]
    fn clear_repeats() {
        let mut d = driver(1);
        chain(&mut d).encoders[0].multi_turn = 99;
        d.clear(Address::single(0), ClearKind::MultiTurn).unwrap();
        assert_eq!(d.bus().backend().written().len(), 8);
        assert_eq!(chain(&mut d).encoders[0].multi_turn, 0);

        // nobody at address 5
        let err = Driver::new(
            FakeBackend::with_responder(EncoderChain::new(1, Encoder::default())),
            &Config {
                retry: 10,
                ..Config::default()
            },
            Encoder::default(),
        )
        .unwrap()
        .clear(Address::single(5), ClearKind::Status);
        assert_eq!(err, Err(Error::Bus(flexenc_io::Error::Timeout)));
    }

    #[test]
    fn ids_and_addresses() {
        let mut d = driver(2);
        d.write_id(Address::single(1), 0x00c0_ffee).unwrap();
        assert_eq!(d.read_id(Address::single(1)), Ok(0x00c0_ffee));
        assert_eq!(
            d.write_id(Address::single(1), 0x0100_0000),
            Err(Error::InvalidArgument("encoder ID has 24 bits"))
        );

        d.set_address_matching_id(0x00c0_ffee, Address::single(6)).unwrap();
        assert_eq!(chain(&mut d).encoders[1].address, 6);
        assert_eq!(d.read_id(Address::single(6)), Ok(0x00c0_ffee));

        let mut d = driver(1);
        d.write_id_one_to_one(0x42).unwrap();
        assert_eq!(d.read_id_one_to_one(), Ok(0x42));
        d.set_address_one_to_one(Address::single(4)).unwrap();
        assert_eq!(chain(&mut d).encoders[0].address, 4);
    }

    #[test]
    fn feature_reads() {
        let mut d = driver(1);
        chain(&mut d).encoders[0].temperature = -12.5;
        chain(&mut d).encoders[0].alarm = 0x1234;
        assert_eq!(d.read_temperature(Address::single(0)), Ok(-12.5));

        let r = d.read_single_turn_with_status(Address::single(0)).unwrap();
        assert_eq!(
            r.slots[0].value(),
            Ok(WithStatus {
                single_turn: 0x1000,
                alarm: 0x1234
            })
        );

        let r = d.read_single_turn_with_temperature(Address::single(0)).unwrap();
        assert_eq!(r.slots[0].data.temperature, -12.5);

        chain(&mut d).encoders[0].single_turn = 0x1_abcd;
        let r = d.read_single_turn_17bit(Address::single(0)).unwrap();
        assert_eq!(r.slots[0].value(), Ok(0x1_abcd));
    }

    #[test]
    fn clear_times_out_midway() {
        let mut d = driver_with_retry(1, 3);
        d.bus_mut().backend_mut().stall_tx_after(3);
        assert_eq!(
            d.clear(Address::single(0), ClearKind::Status),
            Err(Error::Bus(flexenc_io::Error::Timeout))
        );
        assert_eq!(d.bus().backend().written().len(), 3);
        assert_eq!(d.bus().backend().pending_rx(), 0);

        d.bus_mut().backend_mut().stall_tx(false);
        d.clear(Address::single(0), ClearKind::Status).unwrap();
        assert_eq!(d.bus().backend().written().len(), 3 + 8);
    }

    #[test]
    fn failed_irq_request_releases_receiver() {
        let mut d = driver_with_retry(2, 3);
        let replies = Rc::new(RefCell::new(Vec::new()));
        let sink = replies.clone();
        d.set_callback(move |event| {
            if let Event::RxIdle(Received::Parsed(reply)) = event {
                sink.borrow_mut().push(reply);
            }
        });

        d.bus_mut().backend_mut().stall_tx(true);
        assert_eq!(
            d.read_full_irq(Address::multi(1)),
            Err(Error::Bus(flexenc_io::Error::Timeout))
        );
        assert_eq!(d.bus().rx_state(), State::Idle);
        assert!(!d.bus().backend().interrupts().contains(Interrupts::RX));

        d.bus_mut().backend_mut().stall_tx(false);
        d.read_single_turn_irq(Address::single(1)).unwrap();
        while d.bus().backend().pending_rx() > 0 {
            d.handle_irq();
        }
        let replies = replies.borrow();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].command, Command::ItAbsLower24);
    }

    #[test]
    fn irq_read_delivers_reply() {
        let mut d = driver(2);
        let replies = Rc::new(RefCell::new(Vec::new()));
        let sink = replies.clone();
        d.set_callback(move |event| {
            if let Event::RxIdle(Received::Parsed(reply)) = event {
                sink.borrow_mut().push(reply);
            }
        });

        d.read_single_turn_irq(Address::multi(1)).unwrap();
        assert!(replies.borrow().is_empty());
        while d.bus().backend().pending_rx() > 0 {
            d.handle_irq();
        }
        let replies = replies.borrow();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].command, Command::MtAbsLower24);
        let Payload::SingleTurn(response) = &replies[0].payload else {
            panic!("{:?}", replies[0].payload);
        };
        let got: Vec<_> = response.slots.iter().map(|s| s.data).collect();
        assert_eq!(got, [0x1000, 0x2000]);
    }

    #[test]
    fn irq_reads_of_each_kind() {
        let mut d = driver(1);
        let replies = Rc::new(RefCell::new(Vec::new()));
        let sink = replies.clone();
        d.set_callback(move |event| {
            if let Event::RxIdle(Received::Parsed(reply)) = event {
                sink.borrow_mut().push(reply.payload);
            }
        });
        let address = Address::single(0);
        let reads: [fn(&mut Driver<_>, Address) -> Result<()>; 6] = [
            Driver::read_full_irq,
            Driver::read_single_turn_irq,
            Driver::read_multi_turn_irq,
            Driver::read_status_irq,
            Driver::read_temperature_irq,
            Driver::read_id_irq,
        ];
        for read in reads {
            read(&mut d, address).unwrap();
            while d.bus().backend().pending_rx() > 0 {
                d.handle_irq();
            }
        }
        let replies = replies.borrow();
        assert!(matches!(&replies[0], Payload::Full(r) if r.is_ok()));
        assert!(matches!(&replies[1], Payload::SingleTurn(r) if r.is_ok()));
        assert!(matches!(&replies[2], Payload::MultiTurn(r) if r.is_ok()));
        assert!(matches!(&replies[3], Payload::Status(r) if r.is_ok()));
        assert_eq!(replies[4], Payload::Temperature(Ok(25.0)));
        assert_eq!(replies[5], Payload::Id(Ok(0x00a0_0000)));
    }

    #[test]
    fn sync_request() {
        let mut d = driver(3);
        assert_eq!(
            d.send_sync_request(Address::single(0), Command::MemoryWrite).unwrap_err(),
            Error::NotSyncCommand(Command::MemoryWrite)
        );

        let request = d.send_sync_request(Address::multi(2), Command::MtAbsFull).unwrap();
        let written = d.bus().backend().written();
        assert_eq!(written, [request.frame()]);

        let mut units = vec![0; request.response_len()];
        d.bus_mut().read_blocking(&mut units).unwrap();
        assert!(units.chunks(4).all(slot_crc_valid));
        let reply = request.parse(&units);
        assert!(matches!(reply.payload, Payload::Full(r) if r.slots.len() == 3 && r.is_ok()));
    }
}
