//! The external-collaborator-facing API a TUI debugger front-end is built
//! against. No front-end lives here — this is the seam, exercised directly
//! by the tests below in its place.

use crate::encode::{Assembler as CoreAssembler, EncodeError};
use crate::exec::{Emulator, ExecError, StepOutcome};
use crate::memory::Memory;
use crate::pstate::PState;
use crate::registers::RegisterFile;
use std::collections::{BTreeMap, BTreeSet};

/// Wraps the batch [`encode::Assembler`](crate::encode::Assembler), additionally
/// recording an address → source-line map as it encodes, so a front-end can
/// show the source line a breakpoint address came from.
#[derive(Debug, Default)]
pub struct Assembler {
    inner: CoreAssembler,
    next_line: usize,
    line_map: BTreeMap<u32, usize>,
}

impl Assembler {
    pub fn new() -> Self {
        Self {
            inner: CoreAssembler::new(),
            next_line: 1,
            line_map: BTreeMap::new(),
        }
    }

    pub fn current_address(&self) -> u32 {
        self.inner.current_address()
    }

    /// Address → 1-based source line number, for every line that emitted at
    /// least one word (label-only and blank lines emit nothing and are
    /// absent from the map).
    pub fn line_map(&self) -> &BTreeMap<u32, usize> {
        &self.line_map
    }

    pub fn assemble_line(&mut self, line: &str) -> Result<(), EncodeError> {
        let line_no = self.next_line;
        self.next_line += 1;
        let addr = self.inner.current_address();
        let words_before = self.inner.words().len();
        self.inner.encode_line(line_no, line)?;
        if self.inner.words().len() > words_before {
            self.line_map.insert(addr, line_no);
        }
        Ok(())
    }

    /// Consume the assembler, failing on unresolved labels, and return the
    /// emitted words alongside the accumulated line map.
    pub fn finish(self) -> Result<(Vec<u32>, BTreeMap<u32, usize>), EncodeError> {
        let line_map = self.line_map;
        let words = self.inner.finish()?;
        Ok((words, line_map))
    }
}

/// Composes an [`Emulator`] with a breakpoint set and a single-step entry
/// point, the shape a terminal debugger drives directly.
#[derive(Debug)]
pub struct Session {
    emulator: Emulator,
    breakpoints: BTreeSet<u32>,
}

impl Session {
    pub fn new(image: Vec<u8>) -> Result<Self, ExecError> {
        let mut emulator = Emulator::new();
        emulator.load_image(&image)?;
        Ok(Self {
            emulator,
            breakpoints: BTreeSet::new(),
        })
    }

    /// Run exactly one fetch/decode/execute step.
    pub fn step_instruction(&mut self) -> Result<StepOutcome, ExecError> {
        self.emulator.step()
    }

    pub fn set_breakpoint(&mut self, addr: u32) {
        self.breakpoints.insert(addr);
    }

    pub fn clear_breakpoint(&mut self, addr: u32) {
        self.breakpoints.remove(&addr);
    }

    pub fn breakpoints(&self) -> &BTreeSet<u32> {
        &self.breakpoints
    }

    pub fn at_breakpoint(&self) -> bool {
        self.breakpoints.contains(&(self.pc() as u32))
    }

    pub fn registers(&self) -> &RegisterFile {
        self.emulator.registers()
    }

    pub fn memory(&self) -> &Memory {
        self.emulator.memory()
    }

    pub fn pstate(&self) -> &PState {
        self.emulator.pstate()
    }

    pub fn pc(&self) -> u64 {
        self.emulator.pc()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_map_skips_labels_and_blank_lines() {
        let mut asm = Assembler::new();
        asm.assemble_line("start:").unwrap();
        asm.assemble_line("").unwrap();
        asm.assemble_line("movz x0, #1").unwrap();
        asm.assemble_line("and x0,x0,x0").unwrap();
        let (words, line_map) = asm.finish().unwrap();
        assert_eq!(words.len(), 2);
        assert_eq!(line_map.get(&0), Some(&3));
        assert_eq!(line_map.get(&4), Some(&4));
        assert_eq!(line_map.len(), 2);
    }

    #[test]
    fn session_steps_and_reports_halt() {
        let words = crate::encode::assemble("movz x0, #9\nand x0,x0,x0\n").unwrap();
        let mut bytes = Vec::new();
        for w in words {
            bytes.extend_from_slice(&w.to_le_bytes());
        }
        let mut session = Session::new(bytes).unwrap();
        assert_eq!(session.step_instruction().unwrap(), StepOutcome::Continued);
        assert_eq!(session.registers().read64(0).unwrap(), 9);
        assert_eq!(session.step_instruction().unwrap(), StepOutcome::Halted);
    }

    #[test]
    fn breakpoints_are_tracked() {
        let mut session = Session::new(vec![0, 0, 0, 0]).unwrap();
        session.set_breakpoint(0x10);
        assert!(session.breakpoints().contains(&0x10));
        session.clear_breakpoint(0x10);
        assert!(session.breakpoints().is_empty());
    }
}
