mod backend;
mod bus;
mod crc;
mod error;
pub mod fake_backend;
mod ring;
mod timing;
mod utils;

pub use crate::{
    backend::{Backend, Interrupts, Status, Unit},
    bus::{Bus, Callback, Event, Parser, Received, State},
    crc::Crc,
    error::{Error, Result},
    ring::RingBuffer,
    timing::{Baudrate, Config, Mode, Timing},
    utils::{Hex, ShortHex, SpaceHex},
};
