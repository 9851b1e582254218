//! The byte transfer channel.
//!
//! Commands move data one byte at a time, but host memory is made of
//! 32-bit words.  [`ByteChannel`] sits between the two: it fetches a
//! host word and hands out its bytes (most significant first), or
//! assembles bytes into a word and stores it when the word is full.
//! In byte mode each host word carries a single byte in bits 0-7.
//!
//! The transfer is described by an address/count pair.  When the
//! count runs out the channel ends, unless the command asked for data
//! chaining, in which case the next pair loaded by the host is taken
//! up.
use tracing::{event, Level};

use super::context::Context;
use super::fault::{Fault, FaultKind};
use super::memory::{HostMemory, MemoryOpFailure, ADDRESS_MASK};

/// An address and word count loaded by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DataPair {
    pub address: u32,
    pub count: u16,
}

#[derive(Debug, Default)]
pub struct ByteChannel {
    pending_address: Option<u32>,
    pending_count: Option<u16>,

    address: u32,
    count: u16,
    byte_mode: bool,
    data_chain: bool,
    ended: bool,

    /// Word fetched from memory and the number of its bytes already
    /// handed out.
    fetched: Option<(u32, usize)>,
    /// Word being assembled for storing, and how many bytes are in it.
    assembly: u32,
    assembled: usize,
}

fn nxm(e: MemoryOpFailure) -> Fault {
    Fault::new(FaultKind::NonExistentMemory, e.to_string())
}

impl ByteChannel {
    #[must_use]
    pub fn new() -> ByteChannel {
        ByteChannel::default()
    }

    pub fn load_address(&mut self, address: u32) {
        self.pending_address = Some(address & ADDRESS_MASK);
    }

    pub fn load_count(&mut self, count: u16) {
        self.pending_count = Some(count);
    }

    /// True when the host has loaded both halves of an address/count
    /// pair which no command has used yet.
    #[must_use]
    pub fn has_fresh_pair(&self) -> bool {
        self.pending_address.is_some() && self.pending_count.is_some()
    }

    fn take_pair(&mut self) -> Option<DataPair> {
        if self.has_fresh_pair() {
            let address = self.pending_address.take()?;
            let count = self.pending_count.take()?;
            Some(DataPair { address, count })
        } else {
            None
        }
    }

    /// Start a transfer using the fresh address/count pair.
    ///
    /// # Errors
    ///
    /// A chaining fault when there is no fresh pair.
    pub fn begin(&mut self, byte_mode: bool, data_chain: bool) -> Result<DataPair, Fault> {
        let pair = self.take_pair().ok_or_else(|| {
            Fault::new(
                FaultKind::Chaining,
                "data transfer command issued without a fresh address/count pair",
            )
        })?;
        self.byte_mode = byte_mode;
        self.data_chain = data_chain;
        self.fetched = None;
        self.assembly = 0;
        self.assembled = 0;
        self.use_pair(pair);
        Ok(pair)
    }

    /// Start a command which moves no data.
    pub fn begin_without_data(&mut self) {
        self.fetched = None;
        self.assembly = 0;
        self.assembled = 0;
        self.count = 0;
        self.data_chain = false;
        self.ended = true;
    }

    fn use_pair(&mut self, pair: DataPair) {
        self.address = pair.address;
        self.count = pair.count;
        self.ended = pair.count == 0 && !self.data_chain;
    }

    /// The current word count is exhausted; take up the next pair if
    /// data chaining, otherwise end.  Returns true if there is more
    /// room to transfer.
    fn exhausted(&mut self) -> Result<bool, Fault> {
        if !self.data_chain {
            self.ended = true;
            return Ok(false);
        }
        match self.take_pair() {
            Some(pair) => {
                event!(
                    Level::TRACE,
                    "data chaining to address {:06X} count {}",
                    pair.address,
                    pair.count
                );
                self.use_pair(pair);
                Ok(pair.count > 0 || self.exhausted()?)
            }
            None => Err(Fault::new(
                FaultKind::Chaining,
                "data chaining requested but no fresh address/count pair was loaded",
            )),
        }
    }

    fn quantum(&self) -> usize {
        if self.byte_mode {
            1
        } else {
            4
        }
    }

    fn advance_address(&mut self) {
        self.address = (self.address + 1) & ADDRESS_MASK;
        self.count -= 1;
    }

    #[must_use]
    pub fn current_address(&self) -> u32 {
        self.address
    }

    #[must_use]
    pub fn remaining_count(&self) -> u16 {
        self.count
    }

    #[must_use]
    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// Take the next byte from host memory.  Returns `None` once the
    /// channel has ended.
    pub fn read_byte(&mut self, ctx: &Context, mem: &mut dyn HostMemory) -> Result<Option<u8>, Fault> {
        if self.ended {
            return Ok(None);
        }
        let (word, used) = match self.fetched {
            Some(latched) => latched,
            None => {
                if self.count == 0 && !self.exhausted()? {
                    return Ok(None);
                }
                let word = mem.fetch(ctx, self.address).map_err(nxm)?;
                self.advance_address();
                (word, 0)
            }
        };
        let byte = if self.byte_mode {
            word & 0xFF
        } else {
            (word >> (24 - 8 * used)) & 0xFF
        };
        let used = used + 1;
        if used == self.quantum() {
            self.fetched = None;
            if self.count == 0 && !self.data_chain {
                self.ended = true;
            }
        } else {
            self.fetched = Some((word, used));
        }
        Ok(Some(byte as u8))
    }

    /// Pass a byte to host memory.  Returns false if the channel had
    /// already ended and the byte was discarded.
    pub fn write_byte(
        &mut self,
        ctx: &Context,
        mem: &mut dyn HostMemory,
        byte: u8,
    ) -> Result<bool, Fault> {
        if self.ended {
            return Ok(false);
        }
        if self.count == 0 && !self.exhausted()? {
            return Ok(false);
        }
        if self.byte_mode {
            self.assembly = u32::from(byte);
        } else {
            self.assembly |= u32::from(byte) << (24 - 8 * self.assembled);
        }
        self.assembled += 1;
        if self.assembled == self.quantum() {
            self.store_assembly(ctx, mem)?;
            if self.count == 0 && !self.data_chain {
                self.ended = true;
            }
        }
        Ok(true)
    }

    fn store_assembly(&mut self, ctx: &Context, mem: &mut dyn HostMemory) -> Result<(), Fault> {
        mem.store(ctx, self.address, self.assembly).map_err(nxm)?;
        self.advance_address();
        self.assembly = 0;
        self.assembled = 0;
        Ok(())
    }

    /// The command is over.  Store any partially assembled word.
    pub fn finish(&mut self, ctx: &Context, mem: &mut dyn HostMemory) -> Result<(), Fault> {
        self.fetched = None;
        let result = if self.assembled > 0 && self.count > 0 {
            self.store_assembly(ctx, mem)
        } else {
            Ok(())
        };
        self.assembly = 0;
        self.assembled = 0;
        self.ended = true;
        result
    }

    /// Forget everything, including any pending pair.
    pub fn reset(&mut self) {
        *self = ByteChannel::default();
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::time::Duration;

    use super::*;
    use crate::memory::VecMemory;

    fn ctx() -> Context {
        Context::at(Duration::ZERO)
    }

    fn start(chan: &mut ByteChannel, address: u32, count: u16, byte_mode: bool, dc: bool) {
        chan.load_address(address);
        chan.load_count(count);
        chan.begin(byte_mode, dc).expect("pair was loaded");
    }

    /// A sparse memory covering the whole address space.
    #[derive(Default)]
    struct SparseMemory {
        words: BTreeMap<u32, u32>,
    }

    impl HostMemory for SparseMemory {
        fn fetch(&mut self, _ctx: &Context, addr: u32) -> Result<u32, MemoryOpFailure> {
            Ok(self.words.get(&addr).copied().unwrap_or(0))
        }
        fn store(&mut self, _ctx: &Context, addr: u32, value: u32) -> Result<(), MemoryOpFailure> {
            self.words.insert(addr, value);
            Ok(())
        }
    }

    #[test]
    fn test_word_mode_read_is_big_endian() {
        let mut mem = VecMemory::new(4);
        mem.words_mut()[1] = 0x0102_0304;
        mem.words_mut()[2] = 0x0506_0708;
        let mut chan = ByteChannel::new();
        start(&mut chan, 1, 2, false, false);
        let mut got = Vec::new();
        while let Some(b) = chan.read_byte(&ctx(), &mut mem).expect("memory exists") {
            got.push(b);
        }
        assert_eq!(got, vec![1, 2, 3, 4, 5, 6, 7, 8]);
        assert!(chan.is_ended());
        assert_eq!(chan.current_address(), 3);
    }

    #[test]
    fn test_partial_word_is_stored_on_finish() {
        let mut mem = VecMemory::new(4);
        let mut chan = ByteChannel::new();
        start(&mut chan, 0, 3, false, false);
        for b in [0xA1, 0xA2, 0xA3, 0xA4, 0xB1, 0xB2] {
            assert!(chan.write_byte(&ctx(), &mut mem, b).expect("memory exists"));
        }
        chan.finish(&ctx(), &mut mem).expect("memory exists");
        assert_eq!(mem.words(), &[0xA1A2_A3A4, 0xB1B2_0000, 0, 0]);
    }

    #[test]
    fn test_byte_mode_uses_low_bits() {
        let mut mem = VecMemory::new(3);
        let mut chan = ByteChannel::new();
        start(&mut chan, 0, 2, true, false);
        assert!(chan.write_byte(&ctx(), &mut mem, 0x11).expect("ok"));
        assert!(chan.write_byte(&ctx(), &mut mem, 0x22).expect("ok"));
        // Count exhausted: further bytes are discarded.
        assert!(!chan.write_byte(&ctx(), &mut mem, 0x33).expect("ok"));
        assert_eq!(mem.words(), &[0x11, 0x22, 0]);
    }

    #[test]
    fn test_address_wraps() {
        let mut mem = SparseMemory::default();
        let mut chan = ByteChannel::new();
        start(&mut chan, 0x00FF_FFFF, 2, true, false);
        chan.write_byte(&ctx(), &mut mem, 7).expect("ok");
        chan.write_byte(&ctx(), &mut mem, 8).expect("ok");
        assert_eq!(mem.words.get(&0x00FF_FFFF), Some(&7));
        assert_eq!(mem.words.get(&0), Some(&8));
        assert_eq!(chan.current_address(), 1);
    }

    #[test]
    fn test_non_existent_memory() {
        let mut mem = VecMemory::new(1);
        let mut chan = ByteChannel::new();
        start(&mut chan, 5, 1, false, false);
        match chan.read_byte(&ctx(), &mut mem) {
            Err(f) => assert_eq!(f.kind, FaultKind::NonExistentMemory),
            Ok(b) => panic!("expected a memory fault, got {b:?}"),
        }
    }

    #[test]
    fn test_data_chaining() {
        let mut mem = VecMemory::new(8);
        mem.words_mut()[0] = 0x41;
        mem.words_mut()[6] = 0x42;
        let mut chan = ByteChannel::new();
        start(&mut chan, 0, 1, true, true);
        assert_eq!(chan.read_byte(&ctx(), &mut mem).expect("ok"), Some(0x41));
        assert!(!chan.is_ended());
        // No second pair yet.
        match chan.read_byte(&ctx(), &mut mem) {
            Err(f) => assert_eq!(f.kind, FaultKind::Chaining),
            Ok(b) => panic!("expected a chaining fault, got {b:?}"),
        }
        chan.load_address(6);
        chan.load_count(1);
        assert_eq!(chan.read_byte(&ctx(), &mut mem).expect("ok"), Some(0x42));
    }

    #[test]
    fn test_begin_needs_fresh_pair() {
        let mut chan = ByteChannel::new();
        chan.load_count(4);
        assert!(!chan.has_fresh_pair());
        assert_eq!(
            chan.begin(false, false).map_err(|f| f.kind),
            Err(FaultKind::Chaining)
        );
        chan.load_address(0);
        assert!(chan.has_fresh_pair());
        assert!(chan.begin(false, false).is_ok());
        assert!(!chan.has_fresh_pair());
    }
}
