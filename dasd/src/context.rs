//! This module manages the context in which the simulator is
//! performing a single operation.
//!
//! Every call into the disk subsystem (a register operation from the
//! host, or a scheduled callback for a drive) happens at some point
//! in simulated time.  The simulator is most concerned with that
//! time, because it determines where the heads are over the spinning
//! tracks.  But the caller also keeps track of the actual elapsed
//! time.
//!
//! In order to avoid confusion between these related quantities of
//! the same type, we keep them together in a struct so that we can
//! give them very clear names.
use core::time::Duration;

#[derive(Debug, Clone)]
pub struct Context {
    pub simulated_time: Duration,
    pub real_elapsed_time: Duration,
}

impl Context {
    #[must_use]
    pub fn new(simulated_time: Duration, real_elapsed_time: Duration) -> Context {
        Context {
            simulated_time,
            real_elapsed_time,
        }
    }

    /// A context for a caller which does not track real time
    /// separately (for example a test, or a batch tool).
    #[must_use]
    pub fn at(simulated_time: Duration) -> Context {
        Context::new(simulated_time, simulated_time)
    }
}
