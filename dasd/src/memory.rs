//! Access to host memory.
//!
//! The controller does not own host memory; every word it moves goes
//! through the [`HostMemory`] collaborator, which is also responsible
//! for deciding which addresses exist.  Addresses are 24-bit word
//! addresses.
use std::error;
use std::fmt::{self, Display, Formatter};

use super::context::Context;

pub const ADDRESS_MASK: u32 = 0x00FF_FFFF;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryOpFailure {
    NotMapped(u32),
}

impl Display for MemoryOpFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            MemoryOpFailure::NotMapped(addr) => {
                write!(f, "address {addr:06X} is not mapped to functioning memory")
            }
        }
    }
}

impl error::Error for MemoryOpFailure {}

pub trait HostMemory {
    /// Fetch a word.
    fn fetch(&mut self, ctx: &Context, addr: u32) -> Result<u32, MemoryOpFailure>;

    /// Store a word.
    fn store(&mut self, ctx: &Context, addr: u32, value: u32) -> Result<(), MemoryOpFailure>;
}

/// A simple host memory of contiguous words starting at address 0.
#[derive(Debug, Clone)]
pub struct VecMemory {
    words: Vec<u32>,
}

impl VecMemory {
    #[must_use]
    pub fn new(size: usize) -> VecMemory {
        VecMemory {
            words: vec![0; size],
        }
    }

    #[must_use]
    pub fn words(&self) -> &[u32] {
        &self.words
    }

    pub fn words_mut(&mut self) -> &mut [u32] {
        &mut self.words
    }
}

impl HostMemory for VecMemory {
    fn fetch(&mut self, _ctx: &Context, addr: u32) -> Result<u32, MemoryOpFailure> {
        self.words
            .get(addr as usize)
            .copied()
            .ok_or(MemoryOpFailure::NotMapped(addr))
    }

    fn store(&mut self, _ctx: &Context, addr: u32, value: u32) -> Result<(), MemoryOpFailure> {
        match self.words.get_mut(addr as usize) {
            Some(w) => {
                *w = value;
                Ok(())
            }
            None => Err(MemoryOpFailure::NotMapped(addr)),
        }
    }
}
