//! Driver for A-format encoder buses.
//!
//! Requests are single 16-bit command frames, optionally followed by memory
//! data frames. Encoders answer with one slot per addressed encoder, each
//! closed by a CRC8.

mod command;
mod driver;
mod encoder;
mod error;
pub mod frame;
mod request;
mod response;
pub mod sim;
mod status;

pub use crate::{
    command::{Address, ClearKind, Command, MAX_ENCODERS},
    driver::Driver,
    encoder::Encoder,
    error::{Error, Result},
    request::Request,
    response::{
        Payload, Position, Reply, Response, Slot, WithStatus, WithTemperature, temperature,
    },
    status::EncoderStatus,
};
