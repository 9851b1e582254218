//! Channel status and drive sense bytes.
//!
//! ## Status Word
//!
//! | Bit(s) | Meaning |
//! | ------ | ------- |
//! | 0      | channel end |
//! | 1      | device end |
//! | 2      | unit check |
//! | 3      | unit exception |
//! | 4      | status modifier |
//! | 5      | attention |
//! | 6      | selection error |
//! | 7      | chaining error |
//! | 8      | non-existent memory |
//! | 9      | busy |
//! | 10     | command pending |
//! | 11     | unit selected |
//! | 16-23  | device address |
//!
//! Bits 0-8 are condition bits.  They stay set until the host
//! acknowledges them (or the controller is reset) and they are the
//! bits to which the interrupt mask applies.  Bits 9-11 reflect the
//! current state of the channel.
use base::geometry::DiskGeometry;

pub const STATUS_CHANNEL_END: u32 = 1 << 0;
pub const STATUS_DEVICE_END: u32 = 1 << 1;
pub const STATUS_UNIT_CHECK: u32 = 1 << 2;
pub const STATUS_UNIT_EXCEPTION: u32 = 1 << 3;
pub const STATUS_MODIFIER: u32 = 1 << 4;
pub const STATUS_ATTENTION: u32 = 1 << 5;
pub const STATUS_SELECTION_ERROR: u32 = 1 << 6;
pub const STATUS_CHAINING_ERROR: u32 = 1 << 7;
pub const STATUS_NON_EXISTENT_MEMORY: u32 = 1 << 8;
pub const STATUS_BUSY: u32 = 1 << 9;
pub const STATUS_PENDING: u32 = 1 << 10;
pub const STATUS_SELECTED: u32 = 1 << 11;

/// The latched bits of the status word.
pub const CONDITION_BITS: u32 = 0x1FF;

pub const STATUS_DEVICE_SHIFT: u32 = 16;

// Sense byte 0.
pub const SENSE0_COMMAND_REJECT: u8 = 0x80;
pub const SENSE0_INTERVENTION_REQUIRED: u8 = 0x40;
pub const SENSE0_BUS_OUT_CHECK: u8 = 0x20;
pub const SENSE0_EQUIPMENT_CHECK: u8 = 0x10;
pub const SENSE0_DATA_CHECK: u8 = 0x08;
pub const SENSE0_OVERRUN: u8 = 0x04;
pub const SENSE0_SEEK_CHECK: u8 = 0x01;

// Sense byte 1.
pub const SENSE1_DATA_CHECK_IN_COUNT: u8 = 0x80;
pub const SENSE1_TRACK_OVERRUN: u8 = 0x40;
pub const SENSE1_END_OF_CYLINDER: u8 = 0x20;
pub const SENSE1_INVALID_SEQUENCE: u8 = 0x10;
pub const SENSE1_NO_RECORD_FOUND: u8 = 0x08;
pub const SENSE1_FILE_PROTECTED: u8 = 0x04;
pub const SENSE1_MISSING_ADDRESS_MARK: u8 = 0x02;

/// The error-describing sense bytes latched by a drive.  The other
/// bytes returned by the Sense command describe the drive itself and
/// are filled in by [`SenseBytes::render`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SenseBytes {
    pub byte0: u8,
    pub byte1: u8,
}

impl SenseBytes {
    /// Replace the latched error description.
    pub fn set(&mut self, byte0: u8, byte1: u8) {
        self.byte0 = byte0;
        self.byte1 = byte1;
    }

    pub fn clear(&mut self) {
        *self = SenseBytes::default();
    }

    #[must_use]
    pub fn is_clear(&self) -> bool {
        self.byte0 == 0 && self.byte1 == 0
    }

    /// Build the sense data returned to the host: `geometry.sense_bytes`
    /// long, with the unit number in byte 4 and (for the 24-byte
    /// format) the current cylinder in bytes 5 and 6.
    #[must_use]
    pub fn render(&self, geometry: &DiskGeometry, unit_number: u8, cylinder: u16) -> Vec<u8> {
        let mut out = vec![0_u8; geometry.sense_bytes];
        out[0] = self.byte0;
        out[1] = self.byte1;
        out[4] = unit_number;
        if geometry.sense_bytes >= 24 {
            out[5..7].copy_from_slice(&cylinder.to_be_bytes());
        }
        out
    }
}

/// Pack the condition bits, live bits and the device address into a
/// status word.
#[must_use]
pub fn status_word(conditions: u32, live: u32, device_address: u8) -> u32 {
    (conditions & CONDITION_BITS)
        | (live & !CONDITION_BITS & 0xFFFF)
        | (u32::from(device_address) << STATUS_DEVICE_SHIFT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use base::geometry::DriveType;

    #[test]
    fn test_short_sense_format() {
        let mut s = SenseBytes::default();
        s.set(SENSE0_COMMAND_REJECT, SENSE1_FILE_PROTECTED);
        let bytes = s.render(DriveType::Ibm2314.geometry(), 3, 77);
        assert_eq!(bytes, vec![0x80, 0x04, 0, 0, 3, 0]);
    }

    #[test]
    fn test_long_sense_format() {
        let s = SenseBytes::default();
        let bytes = s.render(DriveType::Ibm3330.geometry(), 5, 0x0123);
        assert_eq!(bytes.len(), 24);
        assert_eq!(&bytes[4..7], &[5, 0x01, 0x23]);
    }

    #[test]
    fn test_status_word_layout() {
        let w = status_word(
            STATUS_CHANNEL_END | STATUS_DEVICE_END,
            STATUS_SELECTED,
            0x83,
        );
        assert_eq!(w, 0x0083_0803);
        // Live bits cannot leak into the condition field.
        assert_eq!(status_word(0, STATUS_CHANNEL_END, 0), 0);
    }
}
