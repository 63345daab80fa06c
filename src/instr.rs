//! The decoded instruction representation: a tagged union over the
//! supported AArch64 instruction groups, each carrying only the fields its
//! encoding needs, per §3/§4.3 of the instruction-set subset.

/// Width selector carried by most variants: `false` selects 32-bit (`w`)
/// operation, `true` selects 64-bit (`x`).
pub type Sf = bool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicOp {
    And,
    Or,
    Xor,
    AndSetFlags,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WideOp {
    Movn,
    Movz,
    Movk,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shift {
    Lsl,
    Lsr,
    Asr,
    Ror,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImmArith {
    pub sf: Sf,
    pub set_flags: bool,
    pub op: ArithOp,
    pub sh: bool,
    pub imm12: u32,
    pub rn: u8,
    pub rd: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImmWide {
    pub sf: Sf,
    pub opc: WideOp,
    pub hw: u32,
    pub imm16: u32,
    pub rd: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegArith {
    pub sf: Sf,
    pub set_flags: bool,
    pub op: ArithOp,
    pub shift: Shift,
    pub rm: u8,
    pub operand: u32,
    pub rn: u8,
    pub rd: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegLogic {
    pub sf: Sf,
    pub opc: LogicOp,
    pub invert: bool,
    pub shift: Shift,
    pub rm: u8,
    pub operand: u32,
    pub rn: u8,
    pub rd: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegMultiply {
    pub sf: Sf,
    /// `false` = madd (add), `true` = msub (subtract).
    pub subtract: bool,
    pub rm: u8,
    pub ra: u8,
    pub rn: u8,
    pub rd: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DtImmOffset {
    pub sf: Sf,
    /// `true` = load, `false` = store.
    pub load: bool,
    pub imm12: u32,
    pub xn: u8,
    pub rt: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DtRegOffset {
    pub sf: Sf,
    pub load: bool,
    pub xm: u8,
    pub xn: u8,
    pub rt: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DtLoadLiteral {
    pub sf: Sf,
    pub simm19: u32,
    pub rt: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DtPrePostIndex {
    pub sf: Sf,
    pub load: bool,
    /// `true` = pre-index, `false` = post-index.
    pub pre: bool,
    pub simm9: u32,
    pub xn: u8,
    pub rt: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BranchUncond {
    pub simm26: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BranchCond {
    pub cond: crate::pstate::Condition,
    pub simm19: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BranchReg {
    pub xn: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    ImmArith(ImmArith),
    ImmWide(ImmWide),
    RegArith(RegArith),
    RegLogic(RegLogic),
    RegMultiply(RegMultiply),
    DtImmOffset(DtImmOffset),
    DtRegOffset(DtRegOffset),
    DtLoadLiteral(DtLoadLiteral),
    DtPrePostIndex(DtPrePostIndex),
    BranchUncond(BranchUncond),
    BranchCond(BranchCond),
    BranchReg(BranchReg),
}

impl Instruction {
    /// True for the three variants whose execution mutates the PC directly,
    /// meaning the fetch/decode/execute loop must not auto-advance it.
    pub fn is_branch(&self) -> bool {
        matches!(
            self,
            Instruction::BranchUncond(_) | Instruction::BranchCond(_) | Instruction::BranchReg(_)
        )
    }
}
