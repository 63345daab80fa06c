//! The general-purpose register file and the program counter.

use thiserror::Error;

/// Index of the zero register (`xzr`/`wzr`/`rzr`) in a result/source
/// position: reads as 0, writes discarded.
pub const ZERO_REG: u8 = 31;

/// The same index, in a load/store base-register position, denotes the
/// stack pointer rather than the zero register: it may be read but never
/// written (see [`RegisterFile::write_base`]).
pub const STACK_POINTER: u8 = 31;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RegisterError {
    #[error("register index {0} is out of range (0..=31)")]
    InvalidIndex(u8),
    #[error("the stack pointer is not assignable")]
    StackPointerWrite,
}

/// 31 general registers plus the zero register plus a dedicated PC.
///
/// Register index 31 is overloaded, as in the real ISA: in a result or
/// source-operand position it is the zero register (`write` silently
/// discards), but in a load/store base-register position it is the stack
/// pointer, which exists but cannot be assigned (`write_base` fails).
#[derive(Debug, Default)]
pub struct RegisterFile {
    registers: [u64; 31],
    pc: u64,
}

impl RegisterFile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the full 64-bit value of register `i`. Index 31 always reads 0.
    pub fn read64(&self, i: u8) -> Result<u64, RegisterError> {
        if i == ZERO_REG {
            Ok(0)
        } else if i > ZERO_REG {
            Err(RegisterError::InvalidIndex(i))
        } else {
            Ok(self.registers[i as usize])
        }
    }

    /// Read the low 32 bits of register `i`.
    pub fn read32(&self, i: u8) -> Result<u32, RegisterError> {
        self.read64(i).map(|v| v as u32)
    }

    /// Write the full 64-bit value of register `i`. A write to index 31 is
    /// silently discarded.
    pub fn write(&mut self, i: u8, value: u64) -> Result<(), RegisterError> {
        if i == ZERO_REG {
            Ok(())
        } else if i > ZERO_REG {
            Err(RegisterError::InvalidIndex(i))
        } else {
            self.registers[i as usize] = value;
            Ok(())
        }
    }

    /// Write a 32-bit-mode result, zero-extending into the full register.
    pub fn write32(&mut self, i: u8, value: u32) -> Result<(), RegisterError> {
        self.write(i, value as u64)
    }

    /// Write back a computed address to a load/store base register (pre-
    /// and post-index addressing). Index 31 in this position is the stack
    /// pointer, not the zero register, and is not assignable.
    pub fn write_base(&mut self, i: u8, value: u64) -> Result<(), RegisterError> {
        if i == STACK_POINTER {
            Err(RegisterError::StackPointerWrite)
        } else {
            self.write(i, value)
        }
    }

    pub fn pc(&self) -> u64 {
        self.pc
    }

    pub fn set_pc(&mut self, value: u64) {
        self.pc = value;
    }

    pub fn inc_pc4(&mut self) {
        self.pc = self.pc.wrapping_add(4);
    }

    pub fn add_pc_offset(&mut self, offset: i64) {
        self.pc = self.pc.wrapping_add(offset as u64);
    }

    /// Iterate the 31 addressable registers in order 0..=30, for dumping.
    pub fn iter(&self) -> impl Iterator<Item = (u8, u64)> + '_ {
        self.registers.iter().enumerate().map(|(i, v)| (i as u8, *v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_initialised_to_zero() {
        let regs = RegisterFile::new();
        for i in 0..=31 {
            assert_eq!(regs.read64(i).unwrap(), 0);
        }
    }

    #[test]
    fn write_then_read() {
        let mut regs = RegisterFile::new();
        for i in 0..31 {
            regs.write(i, (i as u64) * 2 + 1).unwrap();
        }
        for i in 0..31 {
            assert_eq!(regs.read64(i).unwrap(), (i as u64) * 2 + 1);
        }
    }

    #[test]
    fn zero_register_reads_zero_and_ignores_writes() {
        let mut regs = RegisterFile::new();
        regs.write(ZERO_REG, 0xdead_beef).unwrap();
        assert_eq!(regs.read64(ZERO_REG).unwrap(), 0);
    }

    #[test]
    fn out_of_range_index_is_an_error() {
        let mut regs = RegisterFile::new();
        assert_eq!(regs.read64(32), Err(RegisterError::InvalidIndex(32)));
        assert_eq!(regs.write(32, 1), Err(RegisterError::InvalidIndex(32)));
    }

    #[test]
    fn read32_masks_to_low_half() {
        let mut regs = RegisterFile::new();
        regs.write(3, 0xffff_ffff_0000_0001).unwrap();
        assert_eq!(regs.read32(3).unwrap(), 1);
    }

    #[test]
    fn base_register_writeback_to_the_stack_pointer_fails() {
        let mut regs = RegisterFile::new();
        assert_eq!(
            regs.write_base(STACK_POINTER, 0x1000),
            Err(RegisterError::StackPointerWrite)
        );
    }

    #[test]
    fn base_register_writeback_to_an_ordinary_register_succeeds() {
        let mut regs = RegisterFile::new();
        regs.write_base(2, 0x1000).unwrap();
        assert_eq!(regs.read64(2).unwrap(), 0x1000);
    }

    #[test]
    fn pc_helpers() {
        let mut regs = RegisterFile::new();
        assert_eq!(regs.pc(), 0);
        regs.inc_pc4();
        assert_eq!(regs.pc(), 4);
        regs.add_pc_offset(-4);
        assert_eq!(regs.pc(), 0);
        regs.set_pc(0x1000);
        assert_eq!(regs.pc(), 0x1000);
    }
}
