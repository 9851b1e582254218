//! The `base` crate defines the disk-related things which are useful
//! both in the simulator and in associated tools.  A program which
//! only needs to create or examine disk image files depends on this
//! crate but not on the simulator library itself.

pub mod ckd;
pub mod collections;
pub mod geometry;
pub mod image;
pub mod prelude;
