//! The executor: applies a decoded [`Instruction`] to a [`RegisterFile`],
//! [`Memory`] and [`PState`], and the fetch/decode/execute loop driver.

use crate::decode::{self, DecodeError};
use crate::fields::sign_extend;
use crate::instr::*;
use crate::memory::{Memory, MemoryError};
use crate::pstate::PState;
use crate::registers::{RegisterError, RegisterFile};
use thiserror::Error;

/// Bit-identical to `and x0, x0, x0`; observing it in the fetch stage halts
/// the loop driver before any decode is attempted.
pub const HALT: u32 = 0x8a00_0000;

#[derive(Error, Debug)]
pub enum ExecError {
    #[error(transparent)]
    Memory(#[from] MemoryError),
    #[error(transparent)]
    Register(#[from] RegisterError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("execution did not halt within {limit} steps")]
    MaxStepsExceeded { limit: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Halted,
    Continued,
}

fn width_mask(sf: Sf) -> u64 {
    if sf {
        u64::MAX
    } else {
        0xffff_ffff
    }
}

fn sign_bit(value: u64, sf: Sf) -> bool {
    let high_bit = if sf { 63 } else { 31 };
    (value >> high_bit) & 1 == 1
}

/// `LSL`/`LSR` are logical, `ASR` preserves sign via signed-domain shift,
/// `ROR` rotates by `amount mod width`.
fn apply_shift(value: u64, shift: Shift, amount: u32, sf: Sf) -> u64 {
    let width = if sf { 64 } else { 32 };
    let wm = width_mask(sf);
    let v = value & wm;
    let amt = amount % width;
    match shift {
        Shift::Lsl => v.wrapping_shl(amt) & wm,
        Shift::Lsr => {
            if amt == 0 {
                v
            } else {
                v >> amt
            }
        }
        Shift::Asr => {
            if sf {
                ((v as i64) >> amt) as u64
            } else {
                let narrow = (v as u32 as i32) >> amt;
                narrow as u32 as u64
            }
        }
        Shift::Ror => {
            if amt == 0 {
                v
            } else {
                (v >> amt) | ((v << (width - amt)) & wm)
            }
        }
    }
}

/// Textbook signed-overflow detection, computed from operand and result
/// signs rather than the source's always-false unsigned comparison (see
/// the open question in the design notes).
fn apply_arith(a: u64, b: u64, sf: Sf, op: ArithOp) -> (u64, bool, bool) {
    let wm = width_mask(sf);
    let a = a & wm;
    let b = b & wm;
    match op {
        ArithOp::Add => {
            let sum = a as u128 + b as u128;
            let result = (sum & wm as u128) as u64;
            let carry = sum > wm as u128;
            let overflow = sign_bit(a, sf) == sign_bit(b, sf) && sign_bit(result, sf) != sign_bit(a, sf);
            (result, carry, overflow)
        }
        ArithOp::Sub => {
            let result = a.wrapping_sub(b) & wm;
            let carry = a >= b;
            let overflow = sign_bit(a, sf) != sign_bit(b, sf) && sign_bit(result, sf) != sign_bit(a, sf);
            (result, carry, overflow)
        }
    }
}

fn write_result(regs: &mut RegisterFile, rd: u8, value: u64, sf: Sf) -> Result<(), RegisterError> {
    if sf {
        regs.write(rd, value)
    } else {
        regs.write32(rd, value as u32)
    }
}

/// A flat 32-bit address truncated from a 64-bit register value, matching
/// the 32-bit address space of [`Memory`].
fn addr_of(value: u64) -> u32 {
    value as u32
}

fn execute(
    instr: &Instruction,
    regs: &mut RegisterFile,
    mem: &mut Memory,
    pstate: &mut PState,
) -> Result<(), ExecError> {
    match instr {
        Instruction::ImmArith(a) => {
            let lhs = regs.read64(a.rn)?;
            let op2 = if a.sh {
                (a.imm12 as u64) << 12
            } else {
                a.imm12 as u64
            };
            let (result, c, v) = apply_arith(lhs, op2, a.sf, a.op);
            if a.set_flags {
                pstate.n = sign_bit(result, a.sf);
                pstate.z = (result & width_mask(a.sf)) == 0;
                pstate.c = c;
                pstate.v = v;
            }
            write_result(regs, a.rd, result, a.sf)?;
        }
        Instruction::RegArith(a) => {
            let lhs = regs.read64(a.rn)?;
            let rhs = apply_shift(regs.read64(a.rm)?, a.shift, a.operand, a.sf);
            let (result, c, v) = apply_arith(lhs, rhs, a.sf, a.op);
            if a.set_flags {
                pstate.n = sign_bit(result, a.sf);
                pstate.z = (result & width_mask(a.sf)) == 0;
                pstate.c = c;
                pstate.v = v;
            }
            write_result(regs, a.rd, result, a.sf)?;
        }
        Instruction::RegLogic(l) => {
            let lhs = regs.read64(l.rn)?;
            let mut rhs = apply_shift(regs.read64(l.rm)?, l.shift, l.operand, l.sf);
            if l.invert {
                rhs = !rhs & width_mask(l.sf);
            }
            let result = match l.opc {
                LogicOp::And | LogicOp::AndSetFlags => lhs & rhs,
                LogicOp::Or => lhs | rhs,
                LogicOp::Xor => lhs ^ rhs,
            } & width_mask(l.sf);
            if matches!(l.opc, LogicOp::AndSetFlags) {
                pstate.n = sign_bit(result, l.sf);
                pstate.z = result == 0;
                pstate.c = false;
                pstate.v = false;
            }
            write_result(regs, l.rd, result, l.sf)?;
        }
        Instruction::RegMultiply(m) => {
            let rn = regs.read64(m.rn)?;
            let rm = regs.read64(m.rm)?;
            let ra = regs.read64(m.ra)?;
            let product = rn.wrapping_mul(rm);
            let result = if m.subtract {
                ra.wrapping_sub(product)
            } else {
                ra.wrapping_add(product)
            } & width_mask(m.sf);
            write_result(regs, m.rd, result, m.sf)?;
        }
        Instruction::ImmWide(iw) => {
            let shift_amt = iw.hw * 16;
            let insert = (iw.imm16 as u64) << shift_amt;
            let result = match iw.opc {
                WideOp::Movn => !insert,
                WideOp::Movz => insert,
                WideOp::Movk => {
                    let current = regs.read64(iw.rd)?;
                    let clear_mask = !(0xffffu64 << shift_amt);
                    (current & clear_mask) | insert
                }
            };
            write_result(regs, iw.rd, result, iw.sf)?;
        }
        Instruction::DtImmOffset(d) => {
            let access_size: u32 = if d.sf { 8 } else { 4 };
            let base = addr_of(regs.read64(d.xn)?);
            let addr = base.wrapping_add(d.imm12 * access_size);
            do_access(regs, mem, d.load, d.sf, addr, d.rt)?;
        }
        Instruction::DtRegOffset(d) => {
            let base = addr_of(regs.read64(d.xn)?);
            let addr = base.wrapping_add(addr_of(regs.read64(d.xm)?));
            do_access(regs, mem, d.load, d.sf, addr, d.rt)?;
        }
        Instruction::DtLoadLiteral(l) => {
            let offset = sign_extend(l.simm19, 19) * 4;
            let addr = (regs.pc() as i64).wrapping_add(offset) as u32;
            do_access(regs, mem, true, l.sf, addr, l.rt)?;
        }
        Instruction::DtPrePostIndex(d) => {
            let offset = sign_extend(d.simm9, 9);
            let base = addr_of(regs.read64(d.xn)?);
            let writeback = (base as i64).wrapping_add(offset) as u32;
            if d.pre {
                regs.write_base(d.xn, writeback as u64)?;
                do_access(regs, mem, d.load, d.sf, writeback, d.rt)?;
            } else {
                do_access(regs, mem, d.load, d.sf, base, d.rt)?;
                regs.write_base(d.xn, writeback as u64)?;
            }
        }
        Instruction::BranchUncond(b) => {
            regs.add_pc_offset(sign_extend(b.simm26, 26) * 4);
        }
        Instruction::BranchCond(b) => {
            if b.cond.holds(pstate) {
                regs.add_pc_offset(sign_extend(b.simm19, 19) * 4);
            } else {
                regs.inc_pc4();
            }
        }
        Instruction::BranchReg(b) => {
            regs.set_pc(regs.read64(b.xn)?);
        }
    }
    Ok(())
}

fn do_access(
    regs: &mut RegisterFile,
    mem: &mut Memory,
    load: bool,
    sf: Sf,
    addr: u32,
    rt: u8,
) -> Result<(), ExecError> {
    if load {
        let value = if sf { mem.load64(addr)? } else { mem.load32(addr)? as u64 };
        write_result(regs, rt, value, sf)?;
    } else {
        let value = regs.read64(rt)?;
        if sf {
            mem.store64(addr, value)?;
        } else {
            mem.store32(addr, value as u32)?;
        }
    }
    Ok(())
}

/// Owns the register file, memory, and processor state for the lifetime of
/// a run, per §5's single-owner resource model.
#[derive(Debug, Default)]
pub struct Emulator {
    regs: RegisterFile,
    mem: Memory,
    pstate: PState,
}

impl Emulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load_image(&mut self, bytes: &[u8]) -> Result<(), ExecError> {
        Ok(self.mem.load_image(bytes)?)
    }

    pub fn registers(&self) -> &RegisterFile {
        &self.regs
    }

    pub fn memory(&self) -> &Memory {
        &self.mem
    }

    pub fn pstate(&self) -> &PState {
        &self.pstate
    }

    pub fn pc(&self) -> u64 {
        self.regs.pc()
    }

    /// Fetch the word at PC, halt if it is the sentinel, otherwise decode,
    /// execute, and auto-advance PC unless the instruction was a branch.
    pub fn step(&mut self) -> Result<StepOutcome, ExecError> {
        let word = self.mem.load32(self.regs.pc() as u32)?;
        if word == HALT {
            return Ok(StepOutcome::Halted);
        }
        let instr = decode::decode(word)?;
        let is_branch = instr.is_branch();
        execute(&instr, &mut self.regs, &mut self.mem, &mut self.pstate)?;
        if !is_branch {
            self.regs.inc_pc4();
        }
        Ok(StepOutcome::Continued)
    }

    /// Run to completion. `max_steps`, when set, is a non-spec safety valve
    /// against a malformed program with no `HALT` (a correct program always
    /// reaches one); it never changes documented semantics.
    pub fn run(&mut self, max_steps: Option<u64>) -> Result<(), ExecError> {
        let mut steps = 0u64;
        loop {
            if self.step()? == StepOutcome::Halted {
                return Ok(());
            }
            steps += 1;
            if let Some(limit) = max_steps {
                if steps >= limit {
                    return Err(ExecError::MaxStepsExceeded { limit });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::assemble;

    #[test]
    fn adds_sets_carry_on_unsigned_overflow() {
        let (result, c, v) = apply_arith(u64::MAX, 1, true, ArithOp::Add);
        assert_eq!(result, 0);
        assert!(c);
        assert!(!v);
    }

    #[test]
    fn adds_sets_overflow_on_signed_overflow() {
        // i64::MAX + 1 overflows into the sign bit without a carry.
        let (result, c, v) = apply_arith(i64::MAX as u64, 1, true, ArithOp::Add);
        assert_eq!(result, i64::MIN as u64);
        assert!(!c);
        assert!(v);
    }

    #[test]
    fn subs_carry_means_no_borrow() {
        let (_, c, _) = apply_arith(5, 5, true, ArithOp::Sub);
        assert!(c);
        let (_, c, _) = apply_arith(3, 5, true, ArithOp::Sub);
        assert!(!c);
    }

    #[test]
    fn thirty_two_bit_arithmetic_ignores_the_upper_half() {
        let (result, c, _) = apply_arith(0xffff_ffff, 1, false, ArithOp::Add);
        assert_eq!(result, 0);
        assert!(c);
    }

    #[test]
    fn shift_boundaries() {
        assert_eq!(apply_shift(0xff, Shift::Lsl, 0, true), 0xff);
        assert_eq!(apply_shift(1, Shift::Lsr, 63, true), 0);
        assert_eq!(apply_shift(1u64 << 63, Shift::Lsr, 63, true), 1);
        assert_eq!(apply_shift(1u64 << 63, Shift::Asr, 63, true), u64::MAX);
        assert_eq!(apply_shift(0x1234_5678, Shift::Ror, 32, false), 0x1234_5678);
    }

    #[test]
    fn max_steps_guard_fires_on_missing_halt() {
        let words = assemble("loop:\nb loop\n").unwrap();
        let mut bytes = Vec::new();
        for w in words {
            bytes.extend_from_slice(&w.to_le_bytes());
        }
        let mut emu = Emulator::new();
        emu.load_image(&bytes).unwrap();
        let err = emu.run(Some(10)).unwrap_err();
        assert!(matches!(err, ExecError::MaxStepsExceeded { limit: 10 }));
    }
}
