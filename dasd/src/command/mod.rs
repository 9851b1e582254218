//! Execution of CKD channel commands.
//!
//! Each command is started by [`start`], which performs the checks
//! common to all commands (medium present, file mask, command
//! sequence, address/count pair) and then either completes the
//! command at once or hands back an [`Operation`] which the
//! controller ticks once per byte time until it is done.
use std::error::Error;
use std::fmt::{self, Display, Formatter};

use tracing::{event, Level};

use super::channel::CommandWord;
use super::context::Context;
use super::fault::{Fault, FaultKind};
use super::memory::HostMemory;
use super::transfer::ByteChannel;
use super::unit::{ChainState, DriveUnit};

mod op_control;
mod op_read;
mod op_search;
mod op_seek;
mod op_write;

pub(crate) use op_read::{ReadOp, ReadTarget};
pub(crate) use op_search::{Comparison, SearchField, SearchOp};
pub use op_seek::seek_delay;
pub(crate) use op_write::{EraseOp, WriteOp, WriteTarget};

#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, PartialOrd, Ord)]
pub enum CommandCode {
    NoOp,
    Sense,
    Seek,
    SeekCylinder,
    SeekHead,
    Recalibrate,
    Restore,
    SetFileMask,
    SearchHomeAddressEqual,
    SearchIdEqual,
    SearchIdHigh,
    SearchIdEqualOrHigh,
    SearchKeyEqual,
    SearchKeyHigh,
    SearchKeyEqualOrHigh,
    ReadHomeAddress,
    ReadRecordZero,
    ReadCount,
    ReadData,
    ReadKeyAndData,
    ReadCountKeyAndData,
    WriteHomeAddress,
    WriteRecordZero,
    WriteCountKeyAndData,
    WriteData,
    WriteKeyAndData,
    Erase,
}

impl CommandCode {
    #[must_use]
    pub const fn all_command_codes() -> [CommandCode; 27] {
        [
            CommandCode::NoOp,
            CommandCode::Sense,
            CommandCode::Seek,
            CommandCode::SeekCylinder,
            CommandCode::SeekHead,
            CommandCode::Recalibrate,
            CommandCode::Restore,
            CommandCode::SetFileMask,
            CommandCode::SearchHomeAddressEqual,
            CommandCode::SearchIdEqual,
            CommandCode::SearchIdHigh,
            CommandCode::SearchIdEqualOrHigh,
            CommandCode::SearchKeyEqual,
            CommandCode::SearchKeyHigh,
            CommandCode::SearchKeyEqualOrHigh,
            CommandCode::ReadHomeAddress,
            CommandCode::ReadRecordZero,
            CommandCode::ReadCount,
            CommandCode::ReadData,
            CommandCode::ReadKeyAndData,
            CommandCode::ReadCountKeyAndData,
            CommandCode::WriteHomeAddress,
            CommandCode::WriteRecordZero,
            CommandCode::WriteCountKeyAndData,
            CommandCode::WriteData,
            CommandCode::WriteKeyAndData,
            CommandCode::Erase,
        ]
    }

    #[must_use]
    pub fn opcode(&self) -> u8 {
        match self {
            CommandCode::NoOp => 0x03,
            CommandCode::Sense => 0x04,
            CommandCode::Seek => 0x07,
            CommandCode::SeekCylinder => 0x0B,
            CommandCode::SeekHead => 0x1B,
            CommandCode::Recalibrate => 0x13,
            CommandCode::Restore => 0x17,
            CommandCode::SetFileMask => 0x1F,
            CommandCode::SearchHomeAddressEqual => 0x39,
            CommandCode::SearchIdEqual => 0x31,
            CommandCode::SearchIdHigh => 0x51,
            CommandCode::SearchIdEqualOrHigh => 0x71,
            CommandCode::SearchKeyEqual => 0x29,
            CommandCode::SearchKeyHigh => 0x49,
            CommandCode::SearchKeyEqualOrHigh => 0x69,
            CommandCode::ReadHomeAddress => 0x1A,
            CommandCode::ReadRecordZero => 0x16,
            CommandCode::ReadCount => 0x12,
            CommandCode::ReadData => 0x06,
            CommandCode::ReadKeyAndData => 0x0E,
            CommandCode::ReadCountKeyAndData => 0x1E,
            CommandCode::WriteHomeAddress => 0x19,
            CommandCode::WriteRecordZero => 0x15,
            CommandCode::WriteCountKeyAndData => 0x1D,
            CommandCode::WriteData => 0x05,
            CommandCode::WriteKeyAndData => 0x0D,
            CommandCode::Erase => 0x11,
        }
    }

    #[must_use]
    pub fn from_opcode(opcode: u8) -> Option<CommandCode> {
        CommandCode::all_command_codes()
            .into_iter()
            .find(|code| code.opcode() == opcode)
    }

    /// Commands which change the recorded data.  Erase counts as a
    /// write for the file mask but not for sequencing.
    #[must_use]
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            CommandCode::WriteHomeAddress
                | CommandCode::WriteRecordZero
                | CommandCode::WriteCountKeyAndData
                | CommandCode::WriteData
                | CommandCode::WriteKeyAndData
        )
    }

    #[must_use]
    pub fn is_seek(&self) -> bool {
        matches!(
            self,
            CommandCode::Seek
                | CommandCode::SeekCylinder
                | CommandCode::SeekHead
                | CommandCode::Recalibrate
        )
    }

    /// Commands which need an address/count pair.
    #[must_use]
    pub fn transfers_data(&self) -> bool {
        !matches!(
            self,
            CommandCode::NoOp | CommandCode::Restore | CommandCode::Recalibrate | CommandCode::Erase
        )
    }

    fn needs_medium(&self) -> bool {
        !matches!(self, CommandCode::NoOp | CommandCode::Sense)
    }
}

impl Display for CommandCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        f.write_str(match self {
            CommandCode::NoOp => "NOP",
            CommandCode::Sense => "SENSE",
            CommandCode::Seek => "SEEK",
            CommandCode::SeekCylinder => "SEEKCYL",
            CommandCode::SeekHead => "SEEKHD",
            CommandCode::Recalibrate => "RECAL",
            CommandCode::Restore => "RESTORE",
            CommandCode::SetFileMask => "SETMSK",
            CommandCode::SearchHomeAddressEqual => "SRCHHA",
            CommandCode::SearchIdEqual => "SRCHIDE",
            CommandCode::SearchIdHigh => "SRCHIDH",
            CommandCode::SearchIdEqualOrHigh => "SRCHIDEH",
            CommandCode::SearchKeyEqual => "SRCHKE",
            CommandCode::SearchKeyHigh => "SRCHKH",
            CommandCode::SearchKeyEqualOrHigh => "SRCHKEH",
            CommandCode::ReadHomeAddress => "RDHA",
            CommandCode::ReadRecordZero => "RDR0",
            CommandCode::ReadCount => "RDCNT",
            CommandCode::ReadData => "RDD",
            CommandCode::ReadKeyAndData => "RDKD",
            CommandCode::ReadCountKeyAndData => "RDCKD",
            CommandCode::WriteHomeAddress => "WRHA",
            CommandCode::WriteRecordZero => "WRR0",
            CommandCode::WriteCountKeyAndData => "WRCKD",
            CommandCode::WriteData => "WRD",
            CommandCode::WriteKeyAndData => "WRKD",
            CommandCode::Erase => "ERASE",
        })
    }
}

#[derive(Debug)]
pub struct UnknownCommandName(String);

impl Display for UnknownCommandName {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "unknown command mnemonic '{}'", self.0)
    }
}

impl Error for UnknownCommandName {}

impl TryFrom<&str> for CommandCode {
    type Error = UnknownCommandName;
    fn try_from(s: &str) -> Result<CommandCode, UnknownCommandName> {
        CommandCode::all_command_codes()
            .into_iter()
            .find(|code| code.to_string().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownCommandName(s.to_string()))
    }
}

/// Everything a command needs while it runs.
pub(crate) struct Env<'a> {
    pub(crate) ctx: &'a Context,
    pub(crate) unit: &'a mut DriveUnit,
    pub(crate) transfer: &'a mut ByteChannel,
    pub(crate) mem: &'a mut dyn HostMemory,
}

impl Env<'_> {
    /// Take the next byte the host supplies, if the channel has not
    /// ended.
    pub(crate) fn from_host(&mut self) -> Result<Option<u8>, Fault> {
        self.transfer.read_byte(self.ctx, &mut *self.mem)
    }

    pub(crate) fn to_host(&mut self, byte: u8) -> Result<bool, Fault> {
        self.transfer.write_byte(self.ctx, &mut *self.mem, byte)
    }

    /// Read up to `limit` bytes from the host.
    pub(crate) fn argument(&mut self, limit: usize) -> Result<Vec<u8>, Fault> {
        let mut arg = Vec::with_capacity(limit);
        while arg.len() < limit {
            match self.from_host()? {
                Some(b) => arg.push(b),
                None => break,
            }
        }
        Ok(arg)
    }
}

/// The status with which a command completed normally.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Completion {
    pub(crate) status_modifier: bool,
    pub(crate) unit_exception: bool,
}

impl Completion {
    pub(crate) fn modified() -> Completion {
        Completion {
            status_modifier: true,
            unit_exception: false,
        }
    }

    pub(crate) fn end_of_file() -> Completion {
        Completion {
            status_modifier: false,
            unit_exception: true,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Progress {
    Continue,
    Done(Completion),
}

#[derive(Debug)]
pub(crate) enum Started {
    /// The command needed no rotational positioning.
    Complete(Completion),
    /// The command runs as the disk turns.
    Positional(Operation),
    /// The heads are moving; the seek completes after `delay`.
    Seeking { delay: std::time::Duration },
}

/// A command which is waiting for, or working on, part of the track.
#[derive(Debug)]
pub(crate) enum Operation {
    /// A command-chained seek, which completes when the heads arrive.
    Seek,
    Search(SearchOp),
    Read(ReadOp),
    Write(WriteOp),
    Erase(EraseOp),
}

impl Operation {
    /// Deal with the position currently under the head.
    pub(crate) fn tick(&mut self, env: &mut Env) -> Result<Progress, Fault> {
        match self {
            Operation::Seek => Ok(Progress::Continue),
            Operation::Search(op) => op.tick(env),
            Operation::Read(op) => op.tick(env),
            Operation::Write(op) => op.tick(env),
            Operation::Erase(op) => op.tick(env),
        }
    }

    /// True while the command has not found the part of the track it
    /// works on.  Such a command fails once the index point has gone
    /// by twice.
    pub(crate) fn waiting(&self) -> bool {
        match self {
            Operation::Seek => false,
            Operation::Search(_) => true,
            Operation::Read(op) => op.waiting(),
            Operation::Write(op) => op.waiting(),
            Operation::Erase(op) => op.waiting(),
        }
    }
}

// File mask bits.
pub(crate) const MASK_WRITE_BITS: u8 = 0xC0;
pub(crate) const MASK_INHIBIT_HA_R0: u8 = 0x00;
pub(crate) const MASK_INHIBIT_WRITES: u8 = 0x40;
pub(crate) const MASK_INHIBIT_HA: u8 = 0x80;
pub(crate) const MASK_SEEK_BITS: u8 = 0x18;
pub(crate) const MASK_SEEK_CYLINDER_OR_HEAD: u8 = 0x08;
pub(crate) const MASK_SEEK_HEAD: u8 = 0x10;
pub(crate) const MASK_NO_SEEK: u8 = 0x18;
pub(crate) const MASK_VALID_BITS: u8 = MASK_WRITE_BITS | MASK_SEEK_BITS;

fn check_file_mask(chain: &ChainState, code: CommandCode) -> Result<(), Fault> {
    let forbidden = |why: &str| {
        Err(Fault::new(
            FaultKind::WriteProtect,
            format!("{code} is not permitted by the file mask ({why})"),
        ))
    };
    if code == CommandCode::SetFileMask && chain.mask_set {
        return Err(Fault::new(
            FaultKind::CommandReject,
            "the file mask has already been set in this chain",
        ));
    }
    let writes = chain.file_mask & MASK_WRITE_BITS;
    if code.is_write() || code == CommandCode::Erase {
        match writes {
            MASK_INHIBIT_WRITES => return forbidden("writes inhibited"),
            MASK_INHIBIT_HA_R0
                if matches!(
                    code,
                    CommandCode::WriteHomeAddress | CommandCode::WriteRecordZero
                ) =>
            {
                return forbidden("home address and R0 writes inhibited")
            }
            MASK_INHIBIT_HA if code == CommandCode::WriteHomeAddress => {
                return forbidden("home address writes inhibited")
            }
            _ => (),
        }
    }
    if code.is_seek() {
        let allowed = match chain.file_mask & MASK_SEEK_BITS {
            MASK_SEEK_CYLINDER_OR_HEAD => code != CommandCode::Seek,
            MASK_SEEK_HEAD => matches!(code, CommandCode::SeekHead | CommandCode::Recalibrate),
            MASK_NO_SEEK => false,
            _ => true,
        };
        if !allowed {
            return forbidden("seek inhibited");
        }
    }
    Ok(())
}

fn check_sequence(chain: &ChainState, code: CommandCode) -> Result<(), Fault> {
    use CommandCode::*;
    let last = chain.last_command;
    let found = |wanted: &[CommandCode]| chain.search_ok && last.is_some_and(|c| wanted.contains(&c));
    let ok = match code {
        WriteRecordZero => {
            found(&[SearchHomeAddressEqual]) || last == Some(WriteHomeAddress)
        }
        WriteCountKeyAndData => {
            found(&[SearchIdEqual, SearchKeyEqual])
                || matches!(last, Some(WriteRecordZero | WriteCountKeyAndData))
        }
        WriteData => found(&[SearchIdEqual, SearchKeyEqual]),
        WriteKeyAndData => found(&[SearchIdEqual]),
        Erase => last.is_some_and(|c| c.is_write()),
        _ => true,
    };
    if ok {
        Ok(())
    } else {
        Err(Fault::new(
            FaultKind::Sequence,
            match last {
                Some(prev) => format!("{code} may not follow {prev}"),
                None => format!("{code} may not begin a chain"),
            },
        ))
    }
}

/// Start a command on the unit in `env`.
pub(crate) fn start(env: &mut Env, code: CommandCode, word: &CommandWord) -> Result<Started, Fault> {
    if code.needs_medium() && !env.unit.is_attached() {
        return Err(Fault::new(
            FaultKind::InterventionRequired,
            format!("unit {:02X} has no medium", env.unit.address()),
        ));
    }
    check_file_mask(&env.unit.chain, code)?;
    check_sequence(&env.unit.chain, code)?;
    if code.transfers_data() {
        env.transfer.begin(word.byte_mode, word.data_chain)?;
    } else {
        env.transfer.begin_without_data();
    }
    if code != CommandCode::Sense {
        env.unit.sense.clear();
    }
    env.unit.chain.search_ok = false;
    event!(
        Level::DEBUG,
        "unit {:02X} starting {} at {:?}",
        env.unit.address(),
        code,
        env.unit.track_state()
    );

    use CommandCode::*;
    match code {
        NoOp | Restore => Ok(Started::Complete(Completion::default())),
        Sense => op_control::sense(env),
        SetFileMask => op_control::set_file_mask(env),
        Seek | SeekCylinder | SeekHead | Recalibrate => op_seek::start(env, code, word.command_chain),
        SearchHomeAddressEqual => op_search::start(env, SearchField::HomeAddress, Comparison::Equal),
        SearchIdEqual => op_search::start(env, SearchField::Id, Comparison::Equal),
        SearchIdHigh => op_search::start(env, SearchField::Id, Comparison::High),
        SearchIdEqualOrHigh => op_search::start(env, SearchField::Id, Comparison::EqualOrHigh),
        SearchKeyEqual => op_search::start(env, SearchField::Key, Comparison::Equal),
        SearchKeyHigh => op_search::start(env, SearchField::Key, Comparison::High),
        SearchKeyEqualOrHigh => op_search::start(env, SearchField::Key, Comparison::EqualOrHigh),
        ReadHomeAddress => Ok(ReadOp::started(ReadTarget::HomeAddress)),
        ReadRecordZero => Ok(ReadOp::started(ReadTarget::RecordZero)),
        ReadCount => Ok(ReadOp::started(ReadTarget::Count)),
        ReadData => Ok(ReadOp::started(ReadTarget::Data)),
        ReadKeyAndData => Ok(ReadOp::started(ReadTarget::KeyAndData)),
        ReadCountKeyAndData => Ok(ReadOp::started(ReadTarget::CountKeyAndData)),
        WriteHomeAddress => Ok(WriteOp::started(WriteTarget::HomeAddress)),
        WriteRecordZero => Ok(WriteOp::started(WriteTarget::RecordZero)),
        WriteCountKeyAndData => Ok(WriteOp::started(WriteTarget::CountKeyAndData)),
        WriteData => Ok(WriteOp::started(WriteTarget::Data)),
        WriteKeyAndData => Ok(WriteOp::started(WriteTarget::KeyAndData)),
        Erase => Ok(Started::Positional(Operation::Erase(EraseOp::default()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_code_round_trip() {
        for code in CommandCode::all_command_codes() {
            assert_eq!(CommandCode::from_opcode(code.opcode()), Some(code));
            let name = code.to_string();
            assert_eq!(CommandCode::try_from(name.as_str()).ok(), Some(code));
        }
    }

    #[test]
    fn test_unsupported_opcodes() {
        // Space count, write special, read IPL, read multiple CKD,
        // reserve and release.
        for opcode in [0x0F, 0x01, 0x02, 0x5E, 0xB4, 0x94] {
            assert_eq!(CommandCode::from_opcode(opcode), None);
        }
    }

    fn chain_with_mask(mask: u8) -> ChainState {
        ChainState {
            file_mask: mask,
            mask_set: true,
            ..ChainState::default()
        }
    }

    #[test]
    fn test_write_mask() {
        let kind = |mask, code| check_file_mask(&chain_with_mask(mask), code).map_err(|f| f.kind);
        assert_eq!(kind(0x00, CommandCode::WriteData), Ok(()));
        assert_eq!(
            kind(0x00, CommandCode::WriteRecordZero),
            Err(FaultKind::WriteProtect)
        );
        assert_eq!(kind(0x40, CommandCode::Erase), Err(FaultKind::WriteProtect));
        assert_eq!(kind(0x80, CommandCode::WriteRecordZero), Ok(()));
        assert_eq!(
            kind(0x80, CommandCode::WriteHomeAddress),
            Err(FaultKind::WriteProtect)
        );
        assert_eq!(kind(0xC0, CommandCode::WriteHomeAddress), Ok(()));
        assert_eq!(
            kind(0xC0, CommandCode::SetFileMask),
            Err(FaultKind::CommandReject)
        );
    }

    #[test]
    fn test_seek_mask() {
        let allowed = |mask, code| check_file_mask(&chain_with_mask(mask), code).is_ok();
        assert!(allowed(0x00, CommandCode::Seek));
        assert!(!allowed(0x08, CommandCode::Seek));
        assert!(allowed(0x08, CommandCode::SeekCylinder));
        assert!(!allowed(0x10, CommandCode::SeekCylinder));
        assert!(allowed(0x10, CommandCode::SeekHead));
        assert!(allowed(0x10, CommandCode::Recalibrate));
        assert!(!allowed(0x18, CommandCode::SeekHead));
        assert!(!allowed(0x18, CommandCode::Recalibrate));
    }

    #[test]
    fn test_write_sequencing() {
        let chain = |last: Option<CommandCode>, search_ok| ChainState {
            last_command: last,
            search_ok,
            ..ChainState::default()
        };
        let ok = |c: &ChainState, code| check_sequence(c, code).is_ok();

        assert!(!ok(&chain(None, false), CommandCode::WriteCountKeyAndData));
        assert!(!ok(
            &chain(Some(CommandCode::SearchIdEqual), false),
            CommandCode::WriteData
        ));
        assert!(ok(
            &chain(Some(CommandCode::SearchIdEqual), true),
            CommandCode::WriteData
        ));
        assert!(!ok(
            &chain(Some(CommandCode::SearchKeyEqual), true),
            CommandCode::WriteKeyAndData
        ));
        assert!(ok(
            &chain(Some(CommandCode::WriteHomeAddress), false),
            CommandCode::WriteRecordZero
        ));
        assert!(ok(
            &chain(Some(CommandCode::WriteRecordZero), false),
            CommandCode::WriteCountKeyAndData
        ));
        assert!(ok(
            &chain(Some(CommandCode::WriteCountKeyAndData), false),
            CommandCode::Erase
        ));
        assert!(!ok(
            &chain(Some(CommandCode::ReadData), false),
            CommandCode::Erase
        ));
    }
}
