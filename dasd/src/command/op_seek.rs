//! Seek, Seek Cylinder, Seek Head and Recalibrate.
//!
//! The argument of the seeks is six bytes, `BB CC HH` as three
//! big-endian halfwords (bin, cylinder, head).  The bin must be zero.
use std::time::Duration;

use tracing::{event, Level};

use super::{CommandCode, Env, Started};
use crate::fault::{Fault, FaultKind};
use crate::unit::SeekInProgress;

const SEEK_ARGUMENT_LEN: usize = 6;

/// Cylinders crossed in one step of the access mechanism.
const CYLINDERS_PER_STEP: u32 = 16;
const STEP_TIME: Duration = Duration::from_millis(2);
const SETTLE_TIME: Duration = Duration::from_millis(1);

/// Time taken to move the heads from cylinder `from` to cylinder `to`.
#[must_use]
pub fn seek_delay(from: u16, to: u16) -> Duration {
    let distance = u32::from(from.abs_diff(to));
    STEP_TIME * distance.div_ceil(CYLINDERS_PER_STEP) + SETTLE_TIME
}

fn invalid(msg: String) -> Fault {
    Fault::new(FaultKind::InvalidSeek, msg)
}

pub(super) fn start(env: &mut Env, code: CommandCode, chained: bool) -> Result<Started, Fault> {
    let (cylinder, head) = if code == CommandCode::Recalibrate {
        (0, 0)
    } else {
        let arg = env.argument(SEEK_ARGUMENT_LEN)?;
        let halfword = |i: usize| u16::from_be_bytes([arg[i], arg[i + 1]]);
        if arg.len() < SEEK_ARGUMENT_LEN {
            return Err(invalid(format!(
                "{code} argument is {} bytes, needs {SEEK_ARGUMENT_LEN}",
                arg.len()
            )));
        }
        let (bin, cylinder, head) = (halfword(0), halfword(2), halfword(4));
        let geometry = env.unit.geometry();
        // Any one field out of range is enough to reject the seek.
        if bin != 0 || cylinder > env.unit.highest_cylinder || head >= geometry.heads {
            return Err(invalid(format!(
                "{code} to bin {bin} cylinder {cylinder} head {head} is outside the {} geometry",
                geometry.name
            )));
        }
        if code == CommandCode::SeekHead && cylinder != env.unit.cylinder {
            return Err(invalid(format!(
                "{code} to cylinder {cylinder} but the heads are at cylinder {}",
                env.unit.cylinder
            )));
        }
        (cylinder, head)
    };

    let delay = seek_delay(env.unit.cylinder, cylinder);
    env.unit.load_cylinder(cylinder)?;
    event!(
        Level::DEBUG,
        "unit {:02X} seeking from ({}, {}) to ({}, {}), {:?}",
        env.unit.address(),
        env.unit.cylinder,
        env.unit.head,
        cylinder,
        head,
        delay
    );
    env.unit.cylinder = cylinder;
    env.unit.head = head;
    env.unit.track.decoder.begin_seek();
    env.unit.seek = Some(SeekInProgress {
        cylinder,
        head,
        chained,
    });
    Ok(Started::Seeking { delay })
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_strategy::proptest;

    #[test]
    fn test_head_switch_only_settles() {
        assert_eq!(seek_delay(5, 5), SETTLE_TIME);
        assert_eq!(seek_delay(5, 6), STEP_TIME + SETTLE_TIME);
        assert_eq!(seek_delay(0, 16), STEP_TIME + SETTLE_TIME);
        assert_eq!(seek_delay(0, 17), STEP_TIME * 2 + SETTLE_TIME);
    }

    #[proptest]
    fn seek_time_grows_with_distance(from: u16, a: u16, b: u16) {
        let (near, far) = if from.abs_diff(a) <= from.abs_diff(b) {
            (a, b)
        } else {
            (b, a)
        };
        assert!(seek_delay(from, near) <= seek_delay(from, far));
        assert_eq!(seek_delay(from, a), seek_delay(a, from));
    }
}
