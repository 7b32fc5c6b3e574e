//! Driver for T-format encoders.
//!
//! Requests are a control field byte, EEPROM requests add an address, data
//! and CRC byte. The encoder answers with the echoed control field, a status
//! field and the requested data, closed by a CRC8.

mod control;
mod driver;
mod encoder;
mod error;
pub mod frame;
mod request;
pub mod sim;
mod status;

pub use crate::{
    control::{Command, ControlField, ResetKind},
    driver::Driver,
    encoder::Encoder,
    error::{Error, Result},
    request::{AllInfo, Reply, Request, Sample},
    status::{Alarms, NO_ERROR, StatusField},
};
