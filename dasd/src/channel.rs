//! Channel control words and the controller-wide channel state.
//!
//! ## Control Word
//!
//! | Bits  | Field |
//! | ----- | ----- |
//! | 28-31 | class |
//! | 0-27  | operand, depending on class |
//!
//! | Class | Name              | Operand |
//! | ----- | ----------------- | ------- |
//! | 0     | Command           | see below |
//! | 1     | Load count        | bits 0-15 word count |
//! | 2     | Release           | |
//! | 3     | Reset             | |
//! | 4     | Interrupt control | bits 0-11 mask, bits 12-15 priority |
//! | 5     | Acknowledge       | bits 0-11 condition bits to clear |
//!
//! ## Command Word
//!
//! | Bits  | Field |
//! | ----- | ----- |
//! | 0-7   | CKD command code |
//! | 8-15  | device address (bits 8-10 select the unit) |
//! | 16    | data chain |
//! | 17    | command chain |
//! | 18    | byte mode |
//! | 19    | skip if status modifier |
//! | 20    | skip unless status modifier |
use super::command::{CommandCode, Operation};
use super::schedule::UnitId;
use super::transfer::ByteChannel;

const CLASS_SHIFT: u32 = 28;

const CMD_DATA_CHAIN: u32 = 1 << 16;
const CMD_COMMAND_CHAIN: u32 = 1 << 17;
const CMD_BYTE_MODE: u32 = 1 << 18;
const CMD_SKIP_IF_MODIFIER: u32 = 1 << 19;
const CMD_SKIP_UNLESS_MODIFIER: u32 = 1 << 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandWord {
    pub opcode: u8,
    pub device: u8,
    pub data_chain: bool,
    pub command_chain: bool,
    pub byte_mode: bool,
    pub skip_if_modifier: bool,
    pub skip_unless_modifier: bool,
}

impl CommandWord {
    /// A command word with no flags set.
    #[must_use]
    pub fn new(opcode: u8, device: u8) -> CommandWord {
        CommandWord {
            opcode,
            device,
            data_chain: false,
            command_chain: false,
            byte_mode: false,
            skip_if_modifier: false,
            skip_unless_modifier: false,
        }
    }

    #[must_use]
    pub fn chained(self) -> CommandWord {
        CommandWord {
            command_chain: true,
            ..self
        }
    }

    #[must_use]
    pub fn data_chained(self) -> CommandWord {
        CommandWord {
            data_chain: true,
            ..self
        }
    }

    #[must_use]
    pub fn in_byte_mode(self) -> CommandWord {
        CommandWord {
            byte_mode: true,
            ..self
        }
    }

    #[must_use]
    pub fn unit_select(&self) -> u8 {
        self.device & 0x07
    }

    #[must_use]
    pub fn encode(&self) -> u32 {
        let mut w = u32::from(self.opcode) | (u32::from(self.device) << 8);
        for (flag, bit) in [
            (self.data_chain, CMD_DATA_CHAIN),
            (self.command_chain, CMD_COMMAND_CHAIN),
            (self.byte_mode, CMD_BYTE_MODE),
            (self.skip_if_modifier, CMD_SKIP_IF_MODIFIER),
            (self.skip_unless_modifier, CMD_SKIP_UNLESS_MODIFIER),
        ] {
            if flag {
                w |= bit;
            }
        }
        w
    }

    fn decode(word: u32) -> CommandWord {
        CommandWord {
            opcode: (word & 0xFF) as u8,
            device: ((word >> 8) & 0xFF) as u8,
            data_chain: word & CMD_DATA_CHAIN != 0,
            command_chain: word & CMD_COMMAND_CHAIN != 0,
            byte_mode: word & CMD_BYTE_MODE != 0,
            skip_if_modifier: word & CMD_SKIP_IF_MODIFIER != 0,
            skip_unless_modifier: word & CMD_SKIP_UNLESS_MODIFIER != 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlWord {
    Command(CommandWord),
    LoadCount(u16),
    Release,
    Reset,
    InterruptControl { mask: u16, priority: u8 },
    Acknowledge(u16),
    Unknown { class: u8 },
}

impl ControlWord {
    #[must_use]
    pub fn decode(word: u32) -> ControlWord {
        match word >> CLASS_SHIFT {
            0 => ControlWord::Command(CommandWord::decode(word)),
            1 => ControlWord::LoadCount((word & 0xFFFF) as u16),
            2 => ControlWord::Release,
            3 => ControlWord::Reset,
            4 => ControlWord::InterruptControl {
                mask: (word & 0x0FFF) as u16,
                priority: ((word >> 12) & 0x0F) as u8,
            },
            5 => ControlWord::Acknowledge((word & 0x0FFF) as u16),
            class => ControlWord::Unknown { class: class as u8 },
        }
    }

    #[must_use]
    pub fn encode(&self) -> u32 {
        let class = |c: u32| c << CLASS_SHIFT;
        match self {
            ControlWord::Command(cmd) => cmd.encode(),
            ControlWord::LoadCount(n) => class(1) | u32::from(*n),
            ControlWord::Release => class(2),
            ControlWord::Reset => class(3),
            ControlWord::InterruptControl { mask, priority } => {
                class(4) | u32::from(mask & 0x0FFF) | (u32::from(priority & 0x0F) << 12)
            }
            ControlWord::Acknowledge(bits) => class(5) | u32::from(bits & 0x0FFF),
            ControlWord::Unknown { class: c } => class(u32::from(*c & 0x0F)),
        }
    }
}

/// A command which is in operation on a unit.
#[derive(Debug)]
pub(crate) struct ActiveCommand {
    pub(crate) unit: UnitId,
    pub(crate) word: CommandWord,
    pub(crate) code: CommandCode,
    pub(crate) op: Operation,
    /// Number of times the head has passed the index point since the
    /// command started.
    pub(crate) index_passes: u32,
}

/// State shared by all the units on the controller.
#[derive(Debug, Default)]
pub(crate) struct ChannelContext {
    pub(crate) selected: Option<UnitId>,
    /// The selected unit completed a command-chained command and is
    /// waiting for the next command of the chain.
    pub(crate) chain_open: bool,
    /// Whether the last command of the open chain posted status
    /// modifier.  Governs the skip flags of the next command.
    pub(crate) chain_modifier: bool,
    pub(crate) pending: Option<CommandWord>,
    pub(crate) active: Option<ActiveCommand>,
    pub(crate) transfer: ByteChannel,
    pub(crate) conditions: u32,
    pub(crate) status_device: u8,
    pub(crate) interrupt_mask: u16,
    pub(crate) interrupt_priority: u8,
    pub(crate) interrupt_raised: bool,
}

impl ChannelContext {
    pub(crate) fn busy(&self) -> bool {
        self.active.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_word_fields() {
        let w = CommandWord::new(0x1E, 0x85).chained().in_byte_mode();
        assert_eq!(w.encode(), 0x0006_851E);
        assert_eq!(w.unit_select(), 5);
        assert_eq!(ControlWord::decode(w.encode()), ControlWord::Command(w));
    }

    #[test]
    fn test_control_classes() {
        assert_eq!(ControlWord::decode(0x1000_0010), ControlWord::LoadCount(16));
        assert_eq!(ControlWord::decode(0x2000_0000), ControlWord::Release);
        assert_eq!(ControlWord::decode(0x3000_0000), ControlWord::Reset);
        assert_eq!(
            ControlWord::decode(0x4000_7003),
            ControlWord::InterruptControl {
                mask: 3,
                priority: 7
            }
        );
        assert_eq!(ControlWord::decode(0x5000_0001), ControlWord::Acknowledge(1));
        assert_eq!(
            ControlWord::decode(0xE000_0000),
            ControlWord::Unknown { class: 0xE }
        );
    }

    #[test]
    fn test_skip_flags() {
        let w = ControlWord::decode(0x0018_8006);
        match w {
            ControlWord::Command(cmd) => {
                assert!(cmd.skip_if_modifier);
                assert!(cmd.skip_unless_modifier);
                assert!(!cmd.command_chain);
                assert_eq!(cmd.opcode, 0x06);
                assert_eq!(cmd.device, 0x80);
            }
            other => panic!("expected a command, got {other:?}"),
        }
    }
}
