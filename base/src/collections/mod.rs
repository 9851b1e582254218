//! Collections used by the simulator's event scheduling.
pub mod pq;
