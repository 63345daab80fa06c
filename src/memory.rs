//! Flat byte-addressable memory with little-endian word/doubleword accessors.

use thiserror::Error;

/// 2 MiB address space.
pub const CAPACITY: usize = 1 << 21;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum MemoryError {
    #[error("access at address {address:#x} of length {len} exceeds memory capacity ({CAPACITY:#x})")]
    OutOfBounds { address: u32, len: u32 },
}

#[derive(Debug)]
pub struct Memory {
    data: Vec<u8>,
}

impl Default for Memory {
    fn default() -> Self {
        Self {
            data: vec![0; CAPACITY],
        }
    }
}

fn bounds_check(address: u32, len: u32) -> Result<(), MemoryError> {
    let end = (address as u64) + (len as u64);
    if end > CAPACITY as u64 {
        Err(MemoryError::OutOfBounds { address, len })
    } else {
        Ok(())
    }
}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }

    fn read_bytes(&self, address: u32, len: u32) -> Result<&[u8], MemoryError> {
        bounds_check(address, len)?;
        let start = address as usize;
        Ok(&self.data[start..start + len as usize])
    }

    fn write_bytes(&mut self, address: u32, bytes: &[u8]) -> Result<(), MemoryError> {
        bounds_check(address, bytes.len() as u32)?;
        let start = address as usize;
        self.data[start..start + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    pub fn load32(&self, address: u32) -> Result<u32, MemoryError> {
        let bytes = self.read_bytes(address, 4)?;
        Ok(u32::from_le_bytes(bytes.try_into().unwrap()))
    }

    pub fn load64(&self, address: u32) -> Result<u64, MemoryError> {
        let bytes = self.read_bytes(address, 8)?;
        Ok(u64::from_le_bytes(bytes.try_into().unwrap()))
    }

    pub fn store32(&mut self, address: u32, value: u32) -> Result<(), MemoryError> {
        self.write_bytes(address, &value.to_le_bytes())
    }

    pub fn store64(&mut self, address: u32, value: u64) -> Result<(), MemoryError> {
        self.write_bytes(address, &value.to_le_bytes())
    }

    /// Copy `bytes` verbatim starting at address 0, as the emulator's image loader does.
    pub fn load_image(&mut self, bytes: &[u8]) -> Result<(), MemoryError> {
        self.write_bytes(0, bytes)
    }

    /// Non-zero 4-byte-aligned words, in ascending address order, for the dump format.
    pub fn non_zero_words(&self) -> Vec<(u32, u32)> {
        let mut out = Vec::new();
        let mut addr = 0u32;
        while (addr as usize) + 4 <= self.data.len() {
            let word = self.load32(addr).expect("in-bounds by loop condition");
            if word != 0 {
                out.push((addr, word));
            }
            addr += 4;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_initialised() {
        let mem = Memory::new();
        assert_eq!(mem.load32(0).unwrap(), 0);
        assert_eq!(mem.load64(100).unwrap(), 0);
    }

    #[test]
    fn word_round_trip_including_unaligned() {
        for addr in [0u32, 1, 3, 4, 17, (CAPACITY - 4) as u32] {
            let mut mem = Memory::new();
            mem.store32(addr, 0xdead_beef).unwrap();
            assert_eq!(mem.load32(addr).unwrap(), 0xdead_beef);
        }
    }

    #[test]
    fn doubleword_round_trip() {
        let mut mem = Memory::new();
        mem.store64(8, 0x0123_4567_89ab_cdef).unwrap();
        assert_eq!(mem.load64(8).unwrap(), 0x0123_4567_89ab_cdef);
    }

    #[test]
    fn store32_does_not_disturb_later_bytes() {
        let mut mem = Memory::new();
        mem.store64(0, u64::MAX).unwrap();
        mem.store32(0, 0).unwrap();
        assert_eq!(mem.load32(4).unwrap(), 0xffff_ffff);
    }

    #[test]
    fn last_byte_out_of_range_is_an_error() {
        let mem = Memory::new();
        let addr = (CAPACITY - 3) as u32;
        assert_eq!(
            mem.load32(addr),
            Err(MemoryError::OutOfBounds { address: addr, len: 4 })
        );
    }

    #[test]
    fn load_image_copies_from_zero() {
        let mut mem = Memory::new();
        mem.load_image(&[0x01, 0x02, 0x03, 0x04]).unwrap();
        assert_eq!(mem.load32(0).unwrap(), 0x0403_0201);
    }

    #[test]
    fn non_zero_words_lists_only_set_words_in_order() {
        let mut mem = Memory::new();
        mem.store32(0, 0x8a00_0000).unwrap();
        mem.store32(100, 0x42).unwrap();
        assert_eq!(
            mem.non_zero_words(),
            vec![(0, 0x8a00_0000), (100, 0x42)]
        );
    }
}
