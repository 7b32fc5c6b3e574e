use std::{cell::RefCell, fmt::Debug, rc::Rc};

use clap::Parser;
use color_eyre::{
    Result,
    eyre::{OptionExt, eyre},
};
use facet::Facet;
use facet_pretty::FacetPretty;
use flexenc_a_format::{
    self as a_format, ClearKind, Command as ACommand, EncoderStatus, Payload, Response,
    sim::EncoderChain,
};
use flexenc_io::{
    Config, Event, Mode, Received,
    fake_backend::{FakeBackend, Responder},
};
use flexenc_t_format::{self as t_format, Alarms, ResetKind};
use tracing::warn;

use crate::cli_helpers::{AddressArg, BaudrateArg, parse_int};

mod cli_helpers;

type ADriver = a_format::Driver<FakeBackend<EncoderChain>>;
type TDriver = t_format::Driver<FakeBackend<t_format::sim::Encoder>>;

#[derive(clap::Parser)]
struct Args {
    #[command(flatten)]
    global: GlobalOpts,
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(clap::Args)]
struct GlobalOpts {
    /// Baudrate in MHz
    #[arg(long, default_value_t = BaudrateArg::default(), global = true)]
    baudrate: BaudrateArg,

    /// Shifter source clock in Hz
    #[arg(long, default_value_t = 480_000_000, global = true)]
    clock: u32,

    /// Poll budget of a blocking transfer, 0 waits forever
    #[arg(long, default_value_t = 10_000, global = true)]
    retry: u32,

    /// Complete reads from the interrupt handler
    #[arg(long, global = true, conflicts_with = "sync")]
    irq: bool,

    /// Load the request for external retriggering, then capture the response
    #[arg(long, global = true)]
    sync: bool,

    /// Dump the transmitted frames
    #[arg(long, global = true)]
    hex: bool,

    /// Draw the transmitted frames
    #[arg(long, global = true)]
    waveform: bool,

    /// Disable the progress bar
    #[arg(long, global = true)]
    no_progress_bar: bool,
}

impl GlobalOpts {
    fn config(&self) -> Config {
        Config {
            baudrate: self.baudrate.0,
            mode: if self.sync { Mode::Sync } else { Mode::Oneshot },
            src_clock_hz: self.clock,
            retry: self.retry,
        }
    }
}

#[derive(clap::Subcommand)]
enum CliCommand {
    AFormat(AFormat),
    TFormat(TFormat),
}

#[derive(clap::Args)]
struct AFormat {
    /// Encoders on the simulated bus
    #[arg(long, default_value_t = 1)]
    encoders: u8,

    #[arg(long, default_value_t = 23)]
    single_turn_bits: u8,

    #[arg(long, default_value_t = 16)]
    multi_turn_bits: u8,

    /// `n` or `0..=n`
    #[arg(long, default_value = "0")]
    address: AddressArg,

    #[command(subcommand)]
    command: ASub,
}

#[derive(clap::Subcommand)]
enum ASub {
    ReadFull,
    ReadSingle,
    ReadMulti,
    Status,
    Temperature,
    Id,
    Clear {
        kind: Clear,
    },
    MemoryRead {
        #[arg(value_parser = parse_int::<u8>)]
        mem_addr: u8,
    },
    MemoryWrite {
        #[arg(value_parser = parse_int::<u8>)]
        mem_addr: u8,
        #[arg(value_parser = parse_int::<u16>)]
        data: u16,
    },
    SetId {
        #[arg(value_parser = parse_int::<u32>)]
        id: u32,
    },
    Monitor {
        #[arg(long, default_value_t = 100)]
        count: u64,
    },
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum Clear {
    Status,
    MultiTurn,
    StatusMultiTurn,
    SingleTurnZero,
}

impl From<Clear> for ClearKind {
    fn from(value: Clear) -> Self {
        match value {
            Clear::Status => ClearKind::Status,
            Clear::MultiTurn => ClearKind::MultiTurn,
            Clear::StatusMultiTurn => ClearKind::StatusMultiTurn,
            Clear::SingleTurnZero => ClearKind::SingleTurnZero,
        }
    }
}

#[derive(clap::Args)]
struct TFormat {
    #[arg(long, default_value_t = 17)]
    single_turn_bits: u8,

    #[arg(long, default_value_t = 16)]
    multi_turn_bits: u8,

    #[command(subcommand)]
    command: TSub,
}

#[derive(clap::Subcommand)]
enum TSub {
    ReadAll,
    ReadAbs,
    ReadAbm,
    Alarms,
    Reset {
        kind: Reset,
    },
    Id,
    EepromRead {
        page: u8,
        #[arg(value_parser = parse_int::<u8>)]
        address: u8,
    },
    EepromWrite {
        page: u8,
        #[arg(value_parser = parse_int::<u8>)]
        address: u8,
        #[arg(value_parser = parse_int::<u8>)]
        data: u8,
    },
    Temperature,
    Monitor {
        #[arg(long, default_value_t = 100)]
        count: u64,
    },
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum Reset {
    AllErrors,
    SingleTurn,
    MultiTurnAndErrors,
}

impl From<Reset> for ResetKind {
    fn from(value: Reset) -> Self {
        match value {
            Reset::AllErrors => ResetKind::AllErrors,
            Reset::SingleTurn => ResetKind::SingleTurn,
            Reset::MultiTurnAndErrors => ResetKind::MultiTurnAndErrors,
        }
    }
}

#[derive(Facet)]
struct SlotReport {
    address: u8,
    errors: Vec<String>,
    value: String,
}

#[derive(Facet)]
struct ResponseReport {
    command: String,
    failed: u64,
    slots: Vec<SlotReport>,
}

#[derive(Facet)]
struct AllReport {
    single_turn: u32,
    multi_turn: i32,
    encoder_id: u8,
    alarms: Vec<String>,
}

fn main() -> Result<()> {
    init_logging()?;
    let Args { global, command } = Args::parse();

    match command {
        CliCommand::AFormat(args) => {
            let encoder = a_format::Encoder::new(args.single_turn_bits, args.multi_turn_bits)?;
            let backend = FakeBackend::with_responder(EncoderChain::new(args.encoders, encoder));
            let mut d = a_format::Driver::new(backend, &global.config(), encoder)?;
            run_a_format(&mut d, &global, args.address.0, args.command)?;
            dump_frames(&global, d.bus().backend(), 16);
        }
        CliCommand::TFormat(args) => {
            let encoder = t_format::Encoder::new(args.single_turn_bits, args.multi_turn_bits)?;
            let backend = FakeBackend::with_responder(t_format::sim::Encoder::default());
            let mut d = t_format::Driver::new(backend, &global.config(), encoder)?;
            run_t_format(&mut d, &global, args.command)?;
            dump_frames(&global, d.bus().backend(), 8);
        }
    }
    Ok(())
}

fn setup_progress_bar(count: u64) -> Result<indicatif::ProgressBar> {
    let template = "{spinner:.green} {elapsed:>3} {bar} {pos}/{len} {msg}";
    let style = indicatif::ProgressStyle::with_template(template)?;
    let pb = indicatif::ProgressBar::new(count)
        .with_finish(indicatif::ProgressFinish::Abandon)
        .with_style(style);
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    Ok(pb)
}

fn monitor(
    global: &GlobalOpts,
    count: u64,
    mut poll: impl FnMut() -> Result<String>,
) -> Result<()> {
    let pb = (!global.no_progress_bar)
        .then(|| setup_progress_bar(count))
        .transpose()?;
    let mut last = String::new();
    for _ in 0..count {
        last = poll()?;
        if let Some(pb) = &pb {
            pb.set_message(last.clone());
            pb.inc(1);
        }
    }
    println!("{last}");
    Ok(())
}

fn dump_frames<S: Responder>(global: &GlobalOpts, backend: &FakeBackend<S>, data_bits: u8) {
    if global.hex {
        let frames: Vec<_> = backend
            .written()
            .into_iter()
            .map(|unit| match data_bits {
                8 => hex::encode_upper([unit as u8]),
                _ => hex::encode_upper(unit.to_be_bytes()),
            })
            .collect();
        println!("tx: {}", frames.join(" "));
    }
    if global.waveform {
        println!("{}", backend.waveform(data_bits));
    }
}

fn response_report<T: Debug>(command: ACommand, response: &Response<T>) -> ResponseReport {
    let slots = response
        .slots
        .iter()
        .map(|slot| SlotReport {
            address: slot.address,
            errors: slot.status.descriptions().map(String::from).collect(),
            value: if slot.status.contains(EncoderStatus::FRAME) {
                String::from("-")
            } else {
                format!("{:?}", slot.data)
            },
        })
        .collect();
    ResponseReport {
        command: command.to_string(),
        failed: response.errors as u64,
        slots,
    }
}

fn print_payload(command: ACommand, payload: Payload) -> Result<()> {
    match payload {
        Payload::Full(r) => println!("{}", response_report(command, &r).pretty()),
        Payload::SingleTurn(r) => println!("{}", response_report(command, &r).pretty()),
        Payload::MultiTurn(r) => println!("{}", response_report(command, &r).pretty()),
        Payload::Status(r) => println!("{}", response_report(command, &r).pretty()),
        Payload::SingleTurnWithStatus(r) => {
            println!("{}", response_report(command, &r).pretty())
        }
        Payload::SingleTurnWithTemperature(r) => {
            println!("{}", response_report(command, &r).pretty())
        }
        Payload::Temperature(t) => println!("temperature: {:.2} C", t?),
        Payload::Id(id) => println!("id: {:06X}", id?),
        Payload::Ack(ack) => ack?,
    }
    Ok(())
}

#[derive(Clone, Copy)]
enum ARead {
    Full,
    Single,
    Multi,
    Status,
    Temperature,
    Id,
}

impl ARead {
    fn command(self, address: a_format::Address) -> ACommand {
        match self {
            Self::Full => address.pick(ACommand::ItAbsFull, ACommand::MtAbsFull),
            Self::Single => address.pick(ACommand::ItAbsLower24, ACommand::MtAbsLower24),
            Self::Multi => address.pick(ACommand::ItAbsUpper24, ACommand::MtAbsUpper24),
            Self::Status => address.pick(ACommand::ItEncoderStatus, ACommand::MtEncoderStatus),
            Self::Temperature => ACommand::Temperature,
            Self::Id => ACommand::IdRead,
        }
    }
}

fn a_read(
    d: &mut ADriver,
    global: &GlobalOpts,
    read: ARead,
    address: a_format::Address,
) -> Result<Payload> {
    let command = read.command(address);
    if global.sync {
        let request = d.send_sync_request(address, command)?;
        let mut units = vec![0; request.response_len()];
        d.bus_mut().read_blocking(&mut units)?;
        return Ok(request.parse(&units).payload);
    }

    if global.irq {
        let reply = Rc::new(RefCell::new(None));
        let sink = reply.clone();
        d.set_callback(move |event| match event {
            Event::RxIdle(Received::Parsed(r)) => *sink.borrow_mut() = Some(r),
            Event::HardwareOverrun => warn!("receiver overrun"),
            _ => {}
        });
        match read {
            ARead::Full => d.read_full_irq(address),
            ARead::Single => d.read_single_turn_irq(address),
            ARead::Multi => d.read_multi_turn_irq(address),
            ARead::Status => d.read_status_irq(address),
            ARead::Temperature => d.read_temperature_irq(address),
            ARead::Id => d.read_id_irq(address),
        }?;
        while d.bus().backend().pending_rx() > 0 {
            d.handle_irq();
        }
        let reply = reply.take().ok_or_eyre("no reply from encoder")?;
        return Ok(reply.payload);
    }

    let payload = match read {
        ARead::Full => Payload::Full(d.read_full(address)?),
        ARead::Single => Payload::SingleTurn(d.read_single_turn(address)?),
        ARead::Multi => Payload::MultiTurn(d.read_multi_turn(address)?),
        ARead::Status => Payload::Status(d.read_status(address)?),
        ARead::Temperature => Payload::Temperature(Ok(d.read_temperature(address)?)),
        ARead::Id => Payload::Id(Ok(d.read_id(address)?)),
    };
    Ok(payload)
}

fn run_a_format(
    d: &mut ADriver,
    global: &GlobalOpts,
    address: a_format::Address,
    command: ASub,
) -> Result<()> {
    let read = match command {
        ASub::ReadFull => ARead::Full,
        ASub::ReadSingle => ARead::Single,
        ASub::ReadMulti => ARead::Multi,
        ASub::Status => ARead::Status,
        ASub::Temperature => ARead::Temperature,
        ASub::Id => ARead::Id,
        ASub::Clear { kind } => {
            d.clear(address, kind.into())?;
            println!("cleared {address}");
            return Ok(());
        }
        ASub::MemoryRead { mem_addr } => {
            let data = d.memory_read(address, mem_addr)?;
            println!("{mem_addr:02X}: {data:04X}");
            return Ok(());
        }
        ASub::MemoryWrite { mem_addr, data } => {
            d.memory_write(address, mem_addr, data)?;
            println!("{mem_addr:02X} <- {data:04X}");
            return Ok(());
        }
        ASub::SetId { id } => {
            d.write_id(address, id)?;
            println!("id of {address}: {id:06X}");
            return Ok(());
        }
        ASub::Monitor { count } => {
            let encoder = d.encoder();
            return monitor(global, count, || {
                let response = d.read_full(address)?;
                let positions: Vec<_> = response
                    .slots
                    .iter()
                    .map(|slot| match slot.value() {
                        Ok(p) => format!(
                            "{}:{}",
                            encoder.sign_extend_multi_turn(p.multi_turn),
                            p.single_turn
                        ),
                        Err(e) => e.to_string(),
                    })
                    .collect();
                Ok(positions.join(" "))
            });
        }
    };

    let payload = a_read(d, global, read, address)?;
    print_payload(read.command(address), payload)
}

fn t_reply(
    d: &mut TDriver,
    start: fn(&mut TDriver) -> t_format::Result<()>,
) -> Result<t_format::Reply> {
    let reply = Rc::new(RefCell::new(None));
    let sink = reply.clone();
    d.set_callback(move |event| match event {
        Event::RxIdle(Received::Parsed(r)) => *sink.borrow_mut() = Some(r),
        Event::HardwareOverrun => warn!("receiver overrun"),
        _ => {}
    });
    start(d)?;
    while d.bus().backend().pending_rx() > 0 {
        d.handle_irq();
    }
    reply.take().ok_or_eyre("no reply from encoder")
}

fn alarm_names(alarms: Alarms) -> Vec<String> {
    alarms.iter_names().map(|(name, _)| name.to_lowercase()).collect()
}

fn all_report(encoder: t_format::Encoder, info: t_format::AllInfo) -> AllReport {
    AllReport {
        single_turn: info.single_turn,
        multi_turn: encoder.sign_extend_multi_turn(info.multi_turn),
        encoder_id: info.encoder_id,
        alarms: alarm_names(info.alarms),
    }
}

fn run_t_format(d: &mut TDriver, global: &GlobalOpts, command: TSub) -> Result<()> {
    let encoder = d.encoder();
    match command {
        TSub::ReadAll if global.sync => {
            let request = d.send_sync_request(t_format::Command::GetAll)?;
            let mut bytes = vec![0; request.response_len()];
            d.bus_mut().read_blocking(&mut bytes)?;
            let sample = request.parse_sample(&bytes)?;
            sample.alarms.log();
            println!("{}", all_report(encoder, sample.info?).pretty());
        }
        TSub::ReadAll if global.irq => {
            let t_format::Reply::All(info) = t_reply(d, TDriver::read_all_irq)? else {
                return Err(eyre!("unexpected reply"));
            };
            println!("{}", all_report(encoder, info?).pretty());
        }
        TSub::ReadAll => println!("{}", all_report(encoder, d.read_all()?).pretty()),
        TSub::ReadAbs => println!("abs: {}", d.read_abs()?),
        TSub::ReadAbm => {
            let abm = d.read_abm()?;
            println!("abm: {}", encoder.sign_extend_multi_turn(abm));
        }
        TSub::Alarms => {
            let alarms = d.read_alarms()?;
            for desc in alarms.descriptions() {
                println!("{desc}");
            }
            if alarms.is_empty() {
                println!("{}", t_format::NO_ERROR);
            }
        }
        TSub::Reset { kind } => {
            let abs = d.reset(kind.into())?;
            println!("abs: {abs}");
        }
        TSub::Id if global.irq => {
            let t_format::Reply::EncoderId(id) = t_reply(d, TDriver::read_encoder_id_irq)? else {
                return Err(eyre!("unexpected reply"));
            };
            println!("id: {:02X}", id?);
        }
        TSub::Id => println!("id: {:02X}", d.read_encoder_id()?),
        TSub::EepromRead { page, address } => {
            let data = d.memory_read(page, address)?;
            println!("{page}:{address:02X}: {data:02X}");
        }
        TSub::EepromWrite {
            page,
            address,
            data,
        } => {
            d.memory_write(page, address, data)?;
            println!("{page}:{address:02X} <- {data:02X}");
        }
        TSub::Temperature => println!("temperature: {} C", d.temperature()?),
        TSub::Monitor { count } => {
            monitor(global, count, || {
                let info = d.read_all()?;
                Ok(format!(
                    "{}:{}",
                    encoder.sign_extend_multi_turn(info.multi_turn),
                    info.single_turn
                ))
            })?;
        }
    }
    Ok(())
}

fn init_logging() -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .with(tracing_error::ErrorLayer::default())
        .init();
    color_eyre::install()?;
    Ok(())
}
