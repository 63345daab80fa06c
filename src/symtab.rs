//! Two-mapping symbol table: defined labels and deferred (forward) references.
//!
//! Mirrors the state machine of the spec: a label starts in neither map,
//! moves into `pending` on its first reference, and moves from `pending`
//! into `defined` on its definition, at which point every previously
//! emitted referring word is back-patched in place.

use crate::fields::mask;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SymbolError {
    #[error("label '{0}' is defined more than once")]
    Redefined(String),
    #[error("unresolved label(s) at end of assembly: {0:?}")]
    Unresolved(Vec<String>),
}

/// Which displacement field a deferred reference needs back-patched, and at
/// what bit range, once its label is defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKind {
    /// `simm26` at bits `[25:0]`.
    BranchUncond,
    /// `simm19` at bits `[23:5]`.
    BranchCond,
    /// `simm19` at bits `[23:5]`.
    LoadLiteral,
}

impl RefKind {
    fn bit_range(self) -> (u32, u32) {
        match self {
            RefKind::BranchUncond => (25, 0),
            RefKind::BranchCond | RefKind::LoadLiteral => (23, 5),
        }
    }

    fn field_width(self) -> u32 {
        match self {
            RefKind::BranchUncond => 26,
            RefKind::BranchCond | RefKind::LoadLiteral => 19,
        }
    }
}

#[derive(Debug, Default)]
pub struct SymbolTable {
    defined: HashMap<String, u32>,
    pending: HashMap<String, Vec<(u32, RefKind)>>,
}

fn patch_word(word: u32, kind: RefKind, displacement: i64) -> u32 {
    let (end, start) = kind.bit_range();
    let width = kind.field_width();
    let field_mask = mask(width);
    let encoded = (displacement as u32) & field_mask;
    let cleared = word & !(field_mask << start);
    cleared | (encoded << start)
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define `name` at `addr`, back-patching every deferred reference to it
    /// in `instructions` (indexed by word, i.e. `addr / 4`).
    pub fn define(
        &mut self,
        instructions: &mut [u32],
        addr: u32,
        name: &str,
    ) -> Result<(), SymbolError> {
        if self.defined.contains_key(name) {
            return Err(SymbolError::Redefined(name.to_string()));
        }
        self.defined.insert(name.to_string(), addr);
        if let Some(refs) = self.pending.remove(name) {
            for (ref_addr, kind) in refs {
                let index = (ref_addr / 4) as usize;
                let displacement = (addr as i64 - ref_addr as i64) / 4;
                instructions[index] = patch_word(instructions[index], kind, displacement);
            }
        }
        Ok(())
    }

    /// Resolve `name` relative to `current_addr`, or defer it as `kind` if
    /// not yet defined. Returns the displacement in words (0 when deferred).
    pub fn lookup_or_defer(&mut self, current_addr: u32, name: &str, kind: RefKind) -> i64 {
        if let Some(&addr) = self.defined.get(name) {
            (addr as i64 - current_addr as i64) / 4
        } else {
            self.pending
                .entry(name.to_string())
                .or_default()
                .push((current_addr, kind));
            0
        }
    }

    /// Fail if any label was referenced but never defined.
    pub fn finish(self) -> Result<(), SymbolError> {
        if self.pending.is_empty() {
            Ok(())
        } else {
            let mut names: Vec<String> = self.pending.into_keys().collect();
            names.sort();
            Err(SymbolError::Unresolved(names))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::extract_field;

    #[test]
    fn backward_reference_resolves_immediately() {
        let mut table = SymbolTable::new();
        let mut words = vec![0u32; 4];
        table.define(&mut words, 0, "start").unwrap();
        let disp = table.lookup_or_defer(12, "start", RefKind::BranchUncond);
        assert_eq!(disp, -3);
    }

    #[test]
    fn forward_reference_is_backpatched_on_definition() {
        let mut table = SymbolTable::new();
        let mut words = vec![0u32; 4];
        let disp = table.lookup_or_defer(0, "end", RefKind::BranchUncond);
        assert_eq!(disp, 0);
        words[0] = 0b101 << 26; // placeholder branch-uncond encoding, zero displacement
        table.define(&mut words, 12, "end").unwrap();
        let patched_disp = ((words[0] & mask(26)) as i32) as i64;
        // sign bit of a 26-bit field is bit 25; 3 is positive so no extension needed
        assert_eq!(patched_disp, 3);
    }

    #[test]
    fn branch_cond_and_load_literal_patch_the_19_bit_field() {
        let mut table = SymbolTable::new();
        let mut words = vec![0u32; 4];
        table.lookup_or_defer(4, "data", RefKind::LoadLiteral);
        words[1] = 0b110 << 26;
        table.define(&mut words, 20, "data").unwrap();
        let disp = extract_field(words[1], 23, 5) as i64;
        assert_eq!(disp, 4);
    }

    #[test]
    fn redefinition_is_rejected() {
        let mut table = SymbolTable::new();
        let mut words = vec![0u32; 1];
        table.define(&mut words, 0, "loop").unwrap();
        assert_eq!(
            table.define(&mut words, 4, "loop"),
            Err(SymbolError::Redefined("loop".to_string()))
        );
    }

    #[test]
    fn unresolved_label_fails_at_end_of_pass() {
        let mut table = SymbolTable::new();
        table.lookup_or_defer(0, "nowhere", RefKind::BranchUncond);
        assert_eq!(
            table.finish(),
            Err(SymbolError::Unresolved(vec!["nowhere".to_string()]))
        );
    }

    #[test]
    fn resolved_table_finishes_cleanly() {
        let mut table = SymbolTable::new();
        let mut words = vec![0u32; 1];
        table.lookup_or_defer(0, "here", RefKind::BranchUncond);
        table.define(&mut words, 4, "here").unwrap();
        assert_eq!(table.finish(), Ok(()));
    }
}
