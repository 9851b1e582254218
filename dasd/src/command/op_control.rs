//! Commands which complete without waiting for the disk.
use tracing::{event, Level};

use super::{Completion, Env, Started, MASK_VALID_BITS};
use crate::fault::{Fault, FaultKind};

/// Transfer the sense bytes to the host and then forget them.
pub(super) fn sense(env: &mut Env) -> Result<Started, Fault> {
    let geometry = env.unit.geometry();
    let bytes = env
        .unit
        .sense
        .render(geometry, env.unit.address() & 0x07, env.unit.position().0);
    for b in bytes {
        if !env.to_host(b)? {
            break;
        }
    }
    env.unit.sense.clear();
    Ok(Started::Complete(Completion::default()))
}

pub(super) fn set_file_mask(env: &mut Env) -> Result<Started, Fault> {
    let mask = env.from_host()?.ok_or_else(|| {
        Fault::new(FaultKind::CommandReject, "set file mask without a mask byte")
    })?;
    if mask & !MASK_VALID_BITS != 0 {
        return Err(Fault::new(
            FaultKind::CommandReject,
            format!("file mask {mask:02X} has reserved bits set"),
        ));
    }
    event!(
        Level::TRACE,
        "unit {:02X} file mask is now {:02X}",
        env.unit.address(),
        mask
    );
    env.unit.chain.file_mask = mask;
    env.unit.chain.mask_set = true;
    Ok(Started::Complete(Completion::default()))
}
