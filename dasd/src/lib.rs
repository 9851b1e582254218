//! This crate simulates a channel-attached CKD (count-key-data) disk
//! subsystem: the controller, its drives and the rotational position
//! of the data under each drive's heads.
#![crate_name = "dasd"]

mod changelog;
mod channel;
mod command;
mod config;
mod context;
mod controller;
mod decoder;
mod fault;
mod memory;
mod schedule;
mod status;
mod subsystem;
mod transfer;
mod unit;

pub use channel::{CommandWord, ControlWord};
pub use command::{seek_delay, CommandCode, UnknownCommandName};
pub use config::{ControllerConfiguration, UnitConfiguration};
pub use context::Context;
pub use controller::{DeviceError, DiskController, RegisterError};
pub use decoder::{Decoder, Step, TrackState, END_OF_TRACK_SETTLE};
pub use fault::{Fault, FaultKind, UnknownFaultName};
pub use memory::{HostMemory, MemoryOpFailure, VecMemory, ADDRESS_MASK};
pub use schedule::{PollQueue, Scheduler, UnitId};
pub use status::*;
pub use subsystem::DiskSubsystem;
pub use transfer::{ByteChannel, DataPair};
pub use unit::{BackingStore, DriveUnit, TrackBuffer};
