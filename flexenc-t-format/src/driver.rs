use flexenc_io::{Backend, Bus, Config, Event, Timing};
use tracing::{debug, instrument};

use crate::{
    Alarms, Command, Encoder, Error, ResetKind, Result,
    frame::{MASK_ADDRESS, PAGE_ADDRESS, seal},
    request::{AllInfo, Reply, Request},
};

const RESET_REPEATS: usize = 10;
const RESET_INTERVAL_US: u32 = 40;
/// The EEPROM cannot be accessed for this long after a page change.
const PAGE_SETTLE_US: u32 = 18_000;

const TEMPERATURE_PAGE: u8 = 7;
const OVERHEAT_ADDRESS: u8 = 4;
const TEMPERATURE_ADDRESS: u8 = 5;

pub struct Driver<B> {
    bus: Bus<B, u8, Reply>,
    encoder: Encoder,
    /// EEPROM page the encoder is known to be on.
    page: u8,
}

impl<B: Backend> Driver<B> {
    pub fn new(backend: B, config: &Config, encoder: Encoder) -> Result<Self> {
        let timing = Timing::t_format(config.baudrate, config.src_clock_hz)?;
        debug!(?timing, "t-format bus");
        Ok(Self {
            bus: Bus::new(backend, timing, config.mode, config.retry),
            encoder,
            page: 0,
        })
    }

    pub fn bus(&self) -> &Bus<B, u8, Reply> {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut Bus<B, u8, Reply> {
        &mut self.bus
    }

    pub fn into_backend(self) -> B {
        self.bus.into_backend()
    }

    pub fn encoder(&self) -> Encoder {
        self.encoder
    }

    pub fn page(&self) -> u8 {
        self.page
    }

    pub fn set_callback(&mut self, callback: impl FnMut(Event<'_, u8, Reply>) + 'static) {
        self.bus.set_callback(callback);
    }

    pub fn handle_irq(&mut self) {
        self.bus.handle_irq();
    }

    fn request(&self, command: Command) -> Request {
        Request::new(command, self.encoder)
    }

    fn transact(&mut self, request: &Request, frame: &[u8]) -> Result<Vec<u8>> {
        self.bus.set_response_frames(frame.len());
        self.bus.write_blocking(frame)?;
        let mut bytes = vec![0; request.response_len()];
        self.bus.read_blocking(&mut bytes)?;
        Ok(bytes)
    }

    fn query(&mut self, command: Command) -> Result<(Request, Vec<u8>)> {
        let request = self.request(command);
        let bytes = self.transact(&request, &[request.control()])?;
        Ok((request, bytes))
    }

    fn submit(&mut self, command: Command) -> Result<()> {
        let request = self.request(command);
        self.bus.set_response_frames(1);
        let parse = Box::new(move |bytes: &[u8]| request.parse(bytes));
        self.bus
            .receive_non_blocking(request.response_len(), Some(parse))?;
        if let Err(e) = self.bus.write_blocking(&[request.control()]) {
            self.bus.abort_receive();
            return Err(e.into());
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn read_all(&mut self) -> Result<AllInfo> {
        let (request, bytes) = self.query(Command::GetAll)?;
        request.parse_all(&bytes)
    }

    #[instrument(skip(self))]
    pub fn read_all_irq(&mut self) -> Result<()> {
        self.submit(Command::GetAll)
    }

    #[instrument(skip(self))]
    pub fn read_abs(&mut self) -> Result<u32> {
        let (request, bytes) = self.query(Command::GetAbs)?;
        request.parse_single_turn(&bytes)
    }

    #[instrument(skip(self))]
    pub fn read_abm(&mut self) -> Result<u32> {
        let (request, bytes) = self.query(Command::GetAbm)?;
        request.parse_multi_turn(&bytes)
    }

    #[instrument(skip(self))]
    pub fn read_alarms(&mut self) -> Result<Alarms> {
        let (request, bytes) = self.query(Command::GetAll)?;
        let alarms = request.parse_alarms(&bytes)?;
        alarms.log();
        Ok(alarms)
    }

    #[instrument(skip(self))]
    pub fn read_encoder_id(&mut self) -> Result<u8> {
        let (request, bytes) = self.query(Command::GetEncoderId)?;
        request.parse_encoder_id(&bytes)
    }

    #[instrument(skip(self))]
    pub fn read_encoder_id_irq(&mut self) -> Result<()> {
        self.submit(Command::GetEncoderId)
    }

    /// Returns the single-turn value of the last response.
    #[instrument(skip(self))]
    pub fn reset(&mut self, kind: ResetKind) -> Result<u32> {
        let request = self.request(kind.command());
        let mut bytes = Vec::new();
        for _ in 0..RESET_REPEATS {
            bytes = self.transact(&request, &[request.control()])?;
            self.bus.backend_mut().delay_us(RESET_INTERVAL_US);
        }
        request.parse_single_turn(&bytes)
    }

    fn eeprom_write(&mut self, address: u8, data: u8) -> Result<u8> {
        let request = self.request(Command::EepromWrite);
        let frame = seal(vec![request.control(), address & MASK_ADDRESS, data]);
        let bytes = self.transact(&request, &frame)?;
        request.parse_eeprom(&bytes)
    }

    /// Select the EEPROM page for subsequent accesses, then wait for the
    /// encoder to accept them again.
    #[instrument(skip(self))]
    pub fn set_page(&mut self, page: u8) -> Result<()> {
        self.eeprom_write(PAGE_ADDRESS, page)?;
        self.page = page;
        self.bus.backend_mut().delay_us(PAGE_SETTLE_US);
        Ok(())
    }

    fn select(&mut self, page: u8, address: u8) -> Result<()> {
        if address >= PAGE_ADDRESS {
            return Err(Error::InvalidArgument("EEPROM address 127 selects the page"));
        }
        if page != self.page {
            self.set_page(page)?;
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn memory_write(&mut self, page: u8, address: u8, data: u8) -> Result<()> {
        self.select(page, address)?;
        self.eeprom_write(address, data)?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn memory_read(&mut self, page: u8, address: u8) -> Result<u8> {
        self.select(page, address)?;
        let request = self.request(Command::EepromRead);
        let frame = seal(vec![request.control(), address]);
        let bytes = self.transact(&request, &frame)?;
        request.parse_eeprom(&bytes)
    }

    /// Overheat detection threshold in degrees Celsius, 0 disables it.
    #[instrument(skip(self))]
    pub fn set_overheat(&mut self, celsius: u8) -> Result<()> {
        let data = if celsius == 0 { 0 } else { 0x80 | celsius };
        self.memory_write(TEMPERATURE_PAGE, OVERHEAT_ADDRESS, data)
    }

    #[instrument(skip(self))]
    pub fn temperature(&mut self) -> Result<i8> {
        let data = self.memory_read(TEMPERATURE_PAGE, TEMPERATURE_ADDRESS)?;
        Ok(data as i8)
    }

    /// Load the control field for the external trigger to retransmit. The
    /// returned request parses the frames captured afterwards.
    #[instrument(skip(self))]
    pub fn send_sync_request(&mut self, command: Command) -> Result<Request> {
        if command.is_eeprom() {
            return Err(Error::InvalidArgument(
                "EEPROM access cannot be sent as a sync request",
            ));
        }
        let request = self.request(command);
        self.bus.set_response_frames(1);
        self.bus.write_now(request.control());
        Ok(request)
    }
}
