//! The channel protocol engine.
//!
//! [`DiskController`] owns the drives and the controller-wide channel
//! state.  The host drives it through four register operations
//! (read/write status-or-control, read/write data), and the host's
//! scheduler calls [`DiskController::service`] when a drive asked to
//! be called back.
//!
//! At most one command is in operation at a time.  A selected drive
//! stays selected across command-chained commands; the chain ends
//! when a command completes without command chaining, on any error,
//! or when the host releases the drive.
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::io::{Read, Seek, Write};
use std::time::Duration;

use tracing::{event, span, Level};

use base::image::{format_image, open_image, ImageError};

use super::changelog::ChangeIndex;
use super::channel::{ActiveCommand, ChannelContext, CommandWord, ControlWord};
use super::command::{self, CommandCode, Completion, Env, Operation, Progress, Started};
use super::config::ControllerConfiguration;
use super::context::Context;
use super::decoder::TrackState;
use super::fault::{Fault, FaultKind};
use super::memory::HostMemory;
use super::schedule::{Scheduler, UnitId};
use super::status::*;
use super::unit::{BackingStore, DriveUnit};

/// A register operation was addressed to some other device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterError {
    WrongDevice { controller: u8, addressed: u8 },
}

impl Display for RegisterError {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            RegisterError::WrongDevice {
                controller,
                addressed,
            } => write!(
                f,
                "register operation for device {addressed:02X} sent to the controller at {controller:02X}"
            ),
        }
    }
}

impl Error for RegisterError {}

/// Failure to attach or detach a drive's medium.
#[derive(Debug)]
pub enum DeviceError {
    UnknownUnit(u8),
    AlreadyAttached(u8),
    NotAttached(u8),
    Image(ImageError),
}

impl Display for DeviceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            DeviceError::UnknownUnit(addr) => write!(f, "there is no drive at address {addr:02X}"),
            DeviceError::AlreadyAttached(addr) => {
                write!(f, "the drive at address {addr:02X} already has a medium")
            }
            DeviceError::NotAttached(addr) => {
                write!(f, "the drive at address {addr:02X} has no medium")
            }
            DeviceError::Image(e) => write!(f, "disk image error: {e}"),
        }
    }
}

impl Error for DeviceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            DeviceError::Image(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ImageError> for DeviceError {
    fn from(e: ImageError) -> DeviceError {
        DeviceError::Image(e)
    }
}

#[derive(Debug)]
pub struct DiskController {
    device_address: u8,
    units: Vec<DriveUnit>,
    channel: ChannelContext,
    /// Addresses of drives which raised attention since the host last
    /// looked.
    attention: ChangeIndex<u8>,
}

impl DiskController {
    #[must_use]
    pub fn new(config: &ControllerConfiguration) -> DiskController {
        DiskController {
            device_address: config.device_address,
            units: config
                .units
                .iter()
                .map(|u| DriveUnit::new(u.address, u.drive_type))
                .collect(),
            channel: ChannelContext::default(),
            attention: ChangeIndex::default(),
        }
    }

    #[must_use]
    pub fn device_address(&self) -> u8 {
        self.device_address
    }

    #[must_use]
    pub fn units(&self) -> &[DriveUnit] {
        &self.units
    }

    /// Find a drive by its device address.
    #[must_use]
    pub fn unit_id(&self, address: u8) -> Option<UnitId> {
        self.units.iter().position(|u| u.address() == address)
    }

    fn unit_for(&self, address: u8) -> Result<UnitId, DeviceError> {
        self.unit_id(address)
            .ok_or(DeviceError::UnknownUnit(address))
    }

    /// Mount an existing disk image on the drive at `address`.
    pub fn attach(
        &mut self,
        ctx: &Context,
        address: u8,
        mut store: Box<dyn BackingStore>,
    ) -> Result<(), DeviceError> {
        let id = self.unit_for(address)?;
        let unit = &mut self.units[id];
        if unit.is_attached() {
            return Err(DeviceError::AlreadyAttached(address));
        }
        let header = open_image(&mut store, unit.geometry())?;
        unit.mount(ctx.simulated_time, store, header.highest_cylinder)
            .map_err(ImageError::from)?;
        event!(
            Level::INFO,
            "attached a {} image to unit {:02X} ({} cylinders)",
            unit.drive_type(),
            address,
            u32::from(header.highest_cylinder) + 1
        );
        Ok(())
    }

    /// Write a freshly formatted image to `store` and mount it on the
    /// drive at `address`.
    pub fn format_and_attach<S>(
        &mut self,
        ctx: &Context,
        address: u8,
        mut store: S,
    ) -> Result<(), DeviceError>
    where
        S: Read + Write + Seek + fmt::Debug + 'static,
    {
        let id = self.unit_for(address)?;
        if self.units[id].is_attached() {
            return Err(DeviceError::AlreadyAttached(address));
        }
        let geometry = self.units[id].geometry();
        format_image(&mut store, geometry)?;
        event!(
            Level::INFO,
            "formatted a {} image for unit {:02X}",
            geometry.name,
            address
        );
        self.attach(ctx, address, Box::new(store))
    }

    /// Remove the medium from the drive at `address`, giving back its
    /// backing store.  A command in operation on the drive ends with
    /// intervention required.
    pub fn detach(
        &mut self,
        ctx: &Context,
        address: u8,
        sched: &mut dyn Scheduler,
        mem: &mut dyn HostMemory,
    ) -> Result<Box<dyn BackingStore>, DeviceError> {
        let id = self.unit_for(address)?;
        if !self.units[id].is_attached() {
            return Err(DeviceError::NotAttached(address));
        }
        sched.cancel(id);
        if let Some(active) = self.channel.active.take_if(|a| a.unit == id) {
            event!(
                Level::WARN,
                "unit {:02X} detached while {} was in operation",
                address,
                active.code
            );
            let fault = Fault::new(
                FaultKind::InterventionRequired,
                format!("medium removed during {}", active.code),
            );
            self.finish_command(ctx, id, active.word, active.code, Err(fault), sched, mem);
        }
        if self.channel.selected == Some(id) {
            // An open chain cannot carry on to a different medium.
            self.release();
        }
        self.update_interrupt();
        if let Err(fault) = self.units[id].flush() {
            event!(Level::ERROR, "unit {:02X}: {}", address, fault);
        }
        let store = self.units[id]
            .unmount()
            .ok_or(DeviceError::NotAttached(address))?;
        event!(Level::INFO, "detached unit {:02X}", address);
        Ok(store)
    }

    /// Write back any modified cylinders.
    pub fn flush(&mut self) -> Result<(), Fault> {
        for unit in &mut self.units {
            unit.flush()?;
        }
        Ok(())
    }

    fn check_address(&self, addressed: u8) -> Result<(), RegisterError> {
        if addressed == self.device_address {
            Ok(())
        } else {
            Err(RegisterError::WrongDevice {
                controller: self.device_address,
                addressed,
            })
        }
    }

    fn live_status(&self) -> u32 {
        let mut live = 0;
        if self.channel.busy() {
            live |= STATUS_BUSY;
        }
        if self.channel.pending.is_some() {
            live |= STATUS_PENDING;
        }
        if self.channel.selected.is_some() {
            live |= STATUS_SELECTED;
        }
        live
    }

    /// Read the status register.  Has no side effects.
    pub fn read_status(&self, device: u8) -> Result<u32, RegisterError> {
        self.check_address(device)?;
        Ok(status_word(
            self.channel.conditions,
            self.live_status(),
            self.channel.status_device,
        ))
    }

    /// Read the current address register.  Has no side effects.
    pub fn read_data(&self, device: u8) -> Result<u32, RegisterError> {
        self.check_address(device)?;
        Ok(self.channel.transfer.current_address())
    }

    /// Load the address half of the pending address/count pair.
    pub fn write_data(&mut self, device: u8, word: u32) -> Result<(), RegisterError> {
        self.check_address(device)?;
        self.channel.transfer.load_address(word);
        Ok(())
    }

    pub fn write_control(
        &mut self,
        ctx: &Context,
        device: u8,
        word: u32,
        sched: &mut dyn Scheduler,
        mem: &mut dyn HostMemory,
    ) -> Result<(), RegisterError> {
        self.check_address(device)?;
        match ControlWord::decode(word) {
            ControlWord::Command(cmd) => self.store_command(ctx, cmd, sched, mem),
            ControlWord::LoadCount(n) => self.channel.transfer.load_count(n),
            ControlWord::Release => {
                if self.channel.busy() {
                    event!(Level::WARN, "release ignored while a command is in operation");
                } else {
                    self.release();
                }
            }
            ControlWord::Reset => self.reset(ctx, sched),
            ControlWord::InterruptControl { mask, priority } => {
                self.channel.interrupt_mask = mask;
                self.channel.interrupt_priority = priority;
            }
            ControlWord::Acknowledge(bits) => {
                self.channel.conditions &= !u32::from(bits);
            }
            ControlWord::Unknown { class } => {
                event!(
                    Level::WARN,
                    "ignoring control word {:08X} of unknown class {}",
                    word,
                    class
                );
            }
        }
        self.update_interrupt();
        Ok(())
    }

    /// The priority of the interrupt request, while one is raised.
    #[must_use]
    pub fn interrupt_request(&self) -> Option<u8> {
        self.channel
            .interrupt_raised
            .then_some(self.channel.interrupt_priority)
    }

    /// Addresses of the drives which raised attention since the last
    /// call.
    pub fn drain_attention(&mut self) -> BTreeSet<u8> {
        self.attention.drain()
    }

    #[must_use]
    pub fn has_attention(&self) -> bool {
        !self.attention.is_empty()
    }

    #[must_use]
    pub fn position(&self, address: u8) -> Option<(u16, u16)> {
        self.unit_id(address).map(|id| self.units[id].position())
    }

    #[must_use]
    pub fn sense(&self, address: u8) -> Option<SenseBytes> {
        self.unit_id(address).map(|id| self.units[id].sense)
    }

    #[must_use]
    pub fn track_state(&self, address: u8) -> Option<TrackState> {
        self.unit_id(address).map(|id| self.units[id].track_state())
    }

    /// Return the channel and every drive to idle.  Seeks in progress
    /// complete at once; modified cylinders stay cached.
    pub fn reset(&mut self, ctx: &Context, sched: &mut dyn Scheduler) {
        event!(Level::INFO, "controller reset");
        for (id, unit) in self.units.iter_mut().enumerate() {
            sched.cancel(id);
            unit.chain = Default::default();
            unit.sense.clear();
            if unit.seek.take().is_some() {
                unit.track.decoder.arrive();
                unit.position_time = ctx.simulated_time;
            }
        }
        self.channel = ChannelContext::default();
        self.update_interrupt();
    }

    fn post(&mut self, bits: u32, device: u8) {
        self.channel.conditions |= bits & CONDITION_BITS;
        self.channel.status_device = device;
    }

    fn update_interrupt(&mut self) {
        let level = self.channel.conditions & u32::from(self.channel.interrupt_mask) != 0;
        if level != self.channel.interrupt_raised {
            self.channel.interrupt_raised = level;
            event!(
                Level::DEBUG,
                "interrupt request {} (conditions {:03X}, mask {:03X})",
                if level { "raised" } else { "lowered" },
                self.channel.conditions,
                self.channel.interrupt_mask
            );
        }
    }

    fn release(&mut self) {
        if let Some(id) = self.channel.selected.take() {
            event!(Level::TRACE, "releasing unit {:02X}", self.units[id].address());
        }
        self.channel.chain_open = false;
        self.channel.chain_modifier = false;
    }

    fn store_command(
        &mut self,
        ctx: &Context,
        word: CommandWord,
        sched: &mut dyn Scheduler,
        mem: &mut dyn HostMemory,
    ) {
        if self.channel.busy() {
            if let Some(old) = self.channel.pending.replace(word) {
                event!(
                    Level::WARN,
                    "pending command {:08X} replaced by {:08X} before it started",
                    old.encode(),
                    word.encode()
                );
            }
            return;
        }
        let target = self.unit_id(word.device);
        match (self.channel.selected, target) {
            (Some(selected), Some(id)) if selected == id && self.channel.chain_open => {
                self.channel.chain_open = false;
                if skip_requested(&word, self.channel.chain_modifier) {
                    event!(
                        Level::DEBUG,
                        "skipping command {:08X} (status modifier {})",
                        word.encode(),
                        self.channel.chain_modifier
                    );
                    self.channel.chain_open = true;
                    return;
                }
                self.begin_command(ctx, id, word, sched, mem);
            }
            (_, None) => {
                self.release();
                event!(
                    Level::WARN,
                    "no drive at address {:02X}; selection error",
                    word.device
                );
                self.post(STATUS_SELECTION_ERROR, word.device);
            }
            (_, Some(id)) => {
                self.release();
                self.channel.selected = Some(id);
                self.units[id].chain = Default::default();
                self.begin_command(ctx, id, word, sched, mem);
            }
        }
    }

    fn begin_command(
        &mut self,
        ctx: &Context,
        id: UnitId,
        word: CommandWord,
        sched: &mut dyn Scheduler,
        mem: &mut dyn HostMemory,
    ) {
        let Some(code) = CommandCode::from_opcode(word.opcode) else {
            let fault = Fault::new(
                FaultKind::CommandReject,
                format!("command code {:02X} is not supported", word.opcode),
            );
            self.channel.transfer.begin_without_data();
            // No command ran, so there is nothing to sequence against.
            self.finish_command(ctx, id, word, CommandCode::NoOp, Err(fault), sched, mem);
            return;
        };
        let unit = &mut self.units[id];
        unit.catch_up(ctx.simulated_time);
        let started = {
            let mut env = Env {
                ctx,
                unit,
                transfer: &mut self.channel.transfer,
                mem: &mut *mem,
            };
            command::start(&mut env, code, &word)
        };
        match started {
            Ok(Started::Complete(completion)) => {
                self.finish_command(ctx, id, word, code, Ok(completion), sched, mem);
            }
            Ok(Started::Positional(op)) => {
                let unit = &self.units[id];
                if unit.seek.is_none() {
                    sched.schedule(ctx, id, unit.delay_until_position(ctx.simulated_time));
                }
                self.channel.active = Some(ActiveCommand {
                    unit: id,
                    word,
                    code,
                    op,
                    index_passes: 0,
                });
            }
            Ok(Started::Seeking { delay }) => {
                sched.schedule(ctx, id, delay);
                if word.command_chain {
                    self.channel.active = Some(ActiveCommand {
                        unit: id,
                        word,
                        code,
                        op: Operation::Seek,
                        index_passes: 0,
                    });
                } else {
                    // The seek carries on without the channel.
                    let address = self.units[id].address();
                    self.units[id].chain.last_command = Some(code);
                    self.post(STATUS_CHANNEL_END, address);
                    self.release();
                    self.start_pending(ctx, sched, mem);
                }
            }
            Err(fault) => self.finish_command(ctx, id, word, code, Err(fault), sched, mem),
        }
        self.update_interrupt();
    }

    /// The command is over; post its status and carry on with the
    /// chain (or end it).
    #[allow(clippy::too_many_arguments)]
    fn finish_command(
        &mut self,
        ctx: &Context,
        id: UnitId,
        word: CommandWord,
        code: CommandCode,
        result: Result<Completion, Fault>,
        sched: &mut dyn Scheduler,
        mem: &mut dyn HostMemory,
    ) {
        let flushed = self.channel.transfer.finish(ctx, &mut *mem);
        let result = match (result, flushed) {
            (Ok(_), Err(fault)) => Err(fault),
            (result, _) => result,
        };
        let address = self.units[id].address();
        match result {
            Ok(completion) => {
                let mut bits = STATUS_CHANNEL_END | STATUS_DEVICE_END;
                if completion.status_modifier {
                    bits |= STATUS_MODIFIER;
                }
                if completion.unit_exception {
                    bits |= STATUS_UNIT_EXCEPTION;
                }
                event!(
                    Level::DEBUG,
                    "unit {:02X} completed {} with status {:03X}",
                    address,
                    code,
                    bits
                );
                self.units[id].chain.last_command = Some(code);
                self.post(bits, address);
                if word.command_chain {
                    self.channel.chain_open = true;
                    self.channel.chain_modifier = completion.status_modifier;
                    if let Some(next) = self.channel.pending.take() {
                        self.store_command(ctx, next, sched, mem);
                    }
                } else {
                    self.release();
                    self.start_pending(ctx, sched, mem);
                }
            }
            Err(fault) => {
                event!(
                    Level::DEBUG,
                    "unit {:02X} terminated {}: {}",
                    address,
                    code,
                    fault
                );
                self.units[id].latch_fault(&fault);
                self.post(fault.kind.status_bits(), address);
                if let Some(dropped) = self.channel.pending.take() {
                    event!(
                        Level::DEBUG,
                        "discarding pending command {:08X} after an error",
                        dropped.encode()
                    );
                }
                self.release();
            }
        }
        self.update_interrupt();
    }

    /// A command word which arrived while the channel was busy, but
    /// not as part of the chain, starts now that the channel is free.
    fn start_pending(&mut self, ctx: &Context, sched: &mut dyn Scheduler, mem: &mut dyn HostMemory) {
        if let Some(next) = self.channel.pending.take() {
            self.store_command(ctx, next, sched, mem);
        }
    }

    /// The scheduler's callback for drive `id`.
    pub fn service(
        &mut self,
        ctx: &Context,
        id: UnitId,
        sched: &mut dyn Scheduler,
        mem: &mut dyn HostMemory,
    ) {
        let Some(unit) = self.units.get_mut(id) else {
            event!(Level::WARN, "callback for non-existent unit {}", id);
            return;
        };
        let span = span!(Level::TRACE, "service", unit = unit.address());
        let _enter = span.enter();

        if let Some(seek) = unit.seek.take() {
            unit.track.decoder.arrive();
            unit.position_time = ctx.simulated_time;
            let address = unit.address();
            event!(
                Level::DEBUG,
                "unit {:02X} arrived at cylinder {} head {}",
                address,
                seek.cylinder,
                seek.head
            );
            if seek.chained {
                if let Some(active) = self.channel.active.take_if(|a| a.unit == id) {
                    self.finish_command(ctx, id, active.word, active.code, Ok(Completion::default()), sched, mem);
                }
            } else {
                self.post(STATUS_ATTENTION | STATUS_DEVICE_END, address);
                self.attention.add(address);
                self.update_interrupt();
                if self.channel.active.as_ref().is_some_and(|a| a.unit == id) {
                    // A command was waiting for the heads to arrive.
                    sched.schedule(ctx, id, Duration::ZERO);
                }
            }
            return;
        }

        let Some(mut active) = self.channel.active.take_if(|a| a.unit == id) else {
            event!(Level::TRACE, "no command in operation; ignoring callback");
            return;
        };
        let progress = {
            let mut env = Env {
                ctx,
                unit,
                transfer: &mut self.channel.transfer,
                mem: &mut *mem,
            };
            active.op.tick(&mut env)
        };

        // The head moves on whatever the command did.
        let unit = &mut self.units[id];
        let dwell = unit.track.decoder.occupancy();
        let head = unit.head;
        let step = unit.track.step(head);
        unit.position_time += unit.geometry().byte_time() * dwell;
        if step.passed_index {
            active.index_passes += 1;
        }

        let outcome = match (progress, step.error) {
            (Err(fault), _) => Err(fault),
            (Ok(Progress::Done(completion)), _) => Ok(completion),
            (Ok(Progress::Continue), Some(e)) => Err(Fault::new(FaultKind::DataCheck, e.to_string())),
            (Ok(Progress::Continue), None) => {
                if active.op.waiting() && active.index_passes >= 2 {
                    Err(Fault::new(
                        FaultKind::RecordNotFound,
                        format!("{} found nothing in one revolution", active.code),
                    ))
                } else {
                    let delay = unit.delay_until_position(ctx.simulated_time);
                    sched.schedule(ctx, id, delay);
                    self.channel.active = Some(active);
                    return;
                }
            }
        };
        self.finish_command(ctx, id, active.word, active.code, outcome, sched, mem);
    }
}

fn skip_requested(word: &CommandWord, status_modifier: bool) -> bool {
    (word.skip_if_modifier && status_modifier) || (word.skip_unless_modifier && !status_modifier)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::memory::VecMemory;
    use crate::schedule::PollQueue;
    use base::geometry::DriveType;

    fn controller() -> DiskController {
        DiskController::new(&ControllerConfiguration::default())
    }

    fn ctx() -> Context {
        Context::at(Duration::ZERO)
    }

    #[test]
    fn test_wrong_device_is_refused() {
        let c = controller();
        assert_eq!(
            c.read_status(0x40),
            Err(RegisterError::WrongDevice {
                controller: 0x80,
                addressed: 0x40
            })
        );
        assert_eq!(c.read_status(0x80), Ok(0x0000_0000));
    }

    #[test]
    fn test_selection_error() {
        let mut c = controller();
        let mut q = PollQueue::new();
        let mut mem = VecMemory::new(16);
        let word = CommandWord::new(CommandCode::NoOp.opcode(), 0x90).encode();
        c.write_control(&ctx(), 0x80, word, &mut q, &mut mem)
            .expect("controller address");
        let status = c.read_status(0x80).expect("controller address");
        assert_eq!(status & CONDITION_BITS, STATUS_SELECTION_ERROR);
        assert_eq!(status >> STATUS_DEVICE_SHIFT, 0x90);
        assert!(q.is_empty());
    }

    #[test]
    fn test_interrupt_follows_mask() {
        let mut c = controller();
        let mut q = PollQueue::new();
        let mut mem = VecMemory::new(16);
        let nop = CommandWord::new(CommandCode::NoOp.opcode(), 0x82).encode();
        c.write_control(&ctx(), 0x80, nop, &mut q, &mut mem)
            .expect("controller address");
        assert_eq!(c.interrupt_request(), None);
        let enable = ControlWord::InterruptControl {
            mask: STATUS_DEVICE_END as u16,
            priority: 5,
        };
        c.write_control(&ctx(), 0x80, enable.encode(), &mut q, &mut mem)
            .expect("controller address");
        assert_eq!(c.interrupt_request(), Some(5));
        let ack = ControlWord::Acknowledge((STATUS_CHANNEL_END | STATUS_DEVICE_END) as u16);
        c.write_control(&ctx(), 0x80, ack.encode(), &mut q, &mut mem)
            .expect("controller address");
        assert_eq!(c.interrupt_request(), None);
        assert_eq!(c.read_status(0x80).expect("ok") & CONDITION_BITS, 0);
    }

    #[test]
    fn test_unattached_unit_needs_intervention() {
        let mut c = controller();
        let mut q = PollQueue::new();
        let mut mem = VecMemory::new(16);
        c.write_data(0x80, 0).expect("ok");
        c.write_control(&ctx(), 0x80, ControlWord::LoadCount(2).encode(), &mut q, &mut mem)
            .expect("ok");
        let read = CommandWord::new(CommandCode::ReadHomeAddress.opcode(), 0x81).encode();
        c.write_control(&ctx(), 0x80, read, &mut q, &mut mem)
            .expect("ok");
        let status = c.read_status(0x80).expect("ok");
        assert_ne!(status & STATUS_UNIT_CHECK, 0);
        assert_eq!(
            c.sense(0x81),
            Some(SenseBytes {
                byte0: SENSE0_INTERVENTION_REQUIRED,
                byte1: 0
            })
        );
        // The error released the drive.
        assert_eq!(status & STATUS_SELECTED, 0);
    }

    #[test]
    fn test_attach_rejects_wrong_geometry() {
        let mut c = controller();
        let mut image = Cursor::new(Vec::new());
        format_image(&mut image, DriveType::Ibm3330.geometry()).expect("format");
        match c.attach(&ctx(), 0x80, Box::new(image)) {
            Err(DeviceError::Image(ImageError::GeometryMismatch { .. })) => (),
            other => panic!("expected a geometry mismatch, got {other:?}"),
        }
        c.format_and_attach(&ctx(), 0x80, Cursor::new(Vec::new()))
            .expect("a fresh image attaches");
        assert!(matches!(
            c.format_and_attach(&ctx(), 0x80, Cursor::new(Vec::new())),
            Err(DeviceError::AlreadyAttached(0x80))
        ));
    }

    #[test]
    fn test_skip_flags() {
        let mut w = CommandWord::new(0x06, 0x80);
        assert!(!skip_requested(&w, true));
        w.skip_if_modifier = true;
        assert!(skip_requested(&w, true));
        assert!(!skip_requested(&w, false));
        w.skip_if_modifier = false;
        w.skip_unless_modifier = true;
        assert!(skip_requested(&w, false));
    }
}
