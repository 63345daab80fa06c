//! Text assembly → encoded instructions: lexing, alias normalisation,
//! operand parsing and per-variant bit-packing.

use crate::fields::mask;
use crate::instr::*;
use crate::pstate::Condition;
use crate::symtab::{RefKind, SymbolError, SymbolTable};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("line {line}: unknown mnemonic '{token}'")]
    UnknownMnemonic { line: usize, token: String },
    #[error("line {line}: wrong number of operands for '{token}'")]
    WrongArity { line: usize, token: String },
    #[error("line {line}: invalid register '{token}'")]
    InvalidRegister { line: usize, token: String },
    #[error("line {line}: invalid immediate '{token}'")]
    InvalidImmediate { line: usize, token: String },
    #[error("line {line}: invalid shift '{token}'")]
    InvalidShift { line: usize, token: String },
    #[error("line {line}: invalid condition '{token}'")]
    InvalidCondition { line: usize, token: String },
    #[error("line {line}: invalid memory operand '{token}'")]
    InvalidMemoryOperand { line: usize, token: String },
    #[error("line {line}: unknown directive '{token}'")]
    UnknownDirective { line: usize, token: String },
    #[error(transparent)]
    Symbol(#[from] SymbolError),
}

/// Strip a trailing `/ ...` comment; lines are otherwise taken verbatim.
fn strip_comment(line: &str) -> &str {
    &line[0..line.find('/').unwrap_or(line.len())]
}

/// Split on commas and whitespace. A memory operand like `[x1, #8]!` comes
/// out as two tokens (`[x1`, `#8]!`) by construction, which is exactly the
/// shape the bracket-aware operand parser expects.
fn tokenize(line: &str) -> Vec<String> {
    strip_comment(line)
        .replace(',', " ")
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

fn is_label_definition(token: &str) -> bool {
    token.len() > 1 && token.ends_with(':')
}

/// Rewrite the documented aliases onto their canonical mnemonic/operands.
/// Applied once, before any per-variant parsing.
fn expand_alias(mnemonic: &str, operands: Vec<String>) -> (String, Vec<String>) {
    match mnemonic {
        "neg" | "negs" => {
            let mut out = vec![operands[0].clone(), "rzr".to_string()];
            out.extend(operands[1..].iter().cloned());
            let canonical = if mnemonic == "neg" { "sub" } else { "subs" };
            (canonical.to_string(), out)
        }
        "cmp" | "cmn" | "tst" => {
            let mut out = vec!["rzr".to_string(), operands[0].clone()];
            out.extend(operands[1..].iter().cloned());
            let canonical = match mnemonic {
                "cmp" => "subs",
                "cmn" => "adds",
                _ => "ands",
            };
            (canonical.to_string(), out)
        }
        "mvn" => {
            let mut out = vec![operands[0].clone(), "rzr".to_string()];
            out.extend(operands[1..].iter().cloned());
            ("orn".to_string(), out)
        }
        "mov" => (
            "orr".to_string(),
            vec![operands[0].clone(), "rzr".to_string(), operands[1].clone()],
        ),
        "mul" => (
            "madd".to_string(),
            vec![
                operands[0].clone(),
                operands[1].clone(),
                operands[2].clone(),
                "rzr".to_string(),
            ],
        ),
        "mneg" => (
            "msub".to_string(),
            vec![
                operands[0].clone(),
                operands[1].clone(),
                operands[2].clone(),
                "rzr".to_string(),
            ],
        ),
        other => (other.to_string(), operands),
    }
}

fn parse_reg(line: usize, token: &str) -> Result<(u8, Option<bool>), EncodeError> {
    let err = || EncodeError::InvalidRegister {
        line,
        token: token.to_string(),
    };
    if token == "rzr" {
        return Ok((31, None));
    }
    if token == "xzr" {
        return Ok((31, Some(true)));
    }
    if token == "wzr" {
        return Ok((31, Some(false)));
    }
    let (sf, digits) = if let Some(rest) = token.strip_prefix('x') {
        (true, rest)
    } else if let Some(rest) = token.strip_prefix('w') {
        (false, rest)
    } else {
        return Err(err());
    };
    let index: u8 = digits.parse().map_err(|_| err())?;
    if index > 30 {
        return Err(err());
    }
    Ok((index, Some(sf)))
}

fn resolve_sf(line: usize, op1: Option<bool>, op2: Option<bool>) -> Result<bool, EncodeError> {
    op1.or(op2).ok_or(EncodeError::InvalidRegister {
        line,
        token: "rzr".to_string(),
    })
}

fn parse_immediate(line: usize, token: &str) -> Result<i64, EncodeError> {
    let err = || EncodeError::InvalidImmediate {
        line,
        token: token.to_string(),
    };
    let mut s = token.strip_prefix('#').unwrap_or(token);
    let negative = s.starts_with('-');
    if negative {
        s = &s[1..];
    }
    let value: i64 = if let Some(hex) = s.strip_prefix("0x") {
        i64::from_str_radix(hex, 16).map_err(|_| err())?
    } else {
        s.parse().map_err(|_| err())?
    };
    Ok(if negative { -value } else { value })
}

fn looks_like_immediate(token: &str) -> bool {
    let t = token.strip_prefix('#').unwrap_or(token);
    t.starts_with('-') || t.chars().next().map(|c| c.is_ascii_digit()).unwrap_or(false)
}

fn parse_shift(line: usize, token: &str) -> Result<Shift, EncodeError> {
    match token {
        "lsl" => Ok(Shift::Lsl),
        "lsr" => Ok(Shift::Lsr),
        "asr" => Ok(Shift::Asr),
        "ror" => Ok(Shift::Ror),
        _ => Err(EncodeError::InvalidShift {
            line,
            token: token.to_string(),
        }),
    }
}

#[derive(Debug, Clone, Copy)]
enum MemOperand {
    ImmOffset { xn: u8, imm: i64 },
    RegOffset { xn: u8, xm: u8 },
    PreIndex { xn: u8, imm: i64 },
    PostIndex { xn: u8, imm: i64 },
}

fn parse_memory_operand(
    line: usize,
    tokens: &[String],
) -> Result<(MemOperand, usize), EncodeError> {
    let invalid = |token: &str| EncodeError::InvalidMemoryOperand {
        line,
        token: token.to_string(),
    };
    let t0 = tokens.first().ok_or_else(|| invalid(""))?;
    if !t0.starts_with('[') {
        return Err(invalid(t0));
    }
    if let Some(inner) = t0.strip_suffix(']') {
        let (xn, _) = parse_reg(line, &inner[1..])?;
        if let Some(next) = tokens.get(1) {
            if looks_like_immediate(next) {
                let imm = parse_immediate(line, next)?;
                return Ok((MemOperand::PostIndex { xn, imm }, 2));
            }
        }
        return Ok((MemOperand::ImmOffset { xn, imm: 0 }, 1));
    }
    let xn_tok = &t0[1..];
    let (xn, _) = parse_reg(line, xn_tok)?;
    let t1 = tokens.get(1).ok_or_else(|| invalid(t0))?;
    let pre = t1.ends_with("]!");
    let closing = if pre {
        &t1[..t1.len() - 2]
    } else {
        t1.strip_suffix(']').ok_or_else(|| invalid(t1))?
    };
    if looks_like_immediate(closing) {
        let imm = parse_immediate(line, closing)?;
        if pre {
            Ok((MemOperand::PreIndex { xn, imm }, 2))
        } else {
            Ok((MemOperand::ImmOffset { xn, imm }, 2))
        }
    } else {
        let (xm, _) = parse_reg(line, closing)?;
        Ok((MemOperand::RegOffset { xn, xm }, 2))
    }
}

fn expect_arity(
    line: usize,
    mnemonic: &str,
    operands: &[String],
    allowed: &[usize],
) -> Result<(), EncodeError> {
    if allowed.contains(&operands.len()) {
        Ok(())
    } else {
        Err(EncodeError::WrongArity {
            line,
            token: mnemonic.to_string(),
        })
    }
}

/// Parse the trailing `<shift> #<amount>` pair that several register-operand
/// forms accept (e.g. `add rd, rn, rm, lsl #3`). Returns `(shift, amount)`,
/// defaulting to `(Lsl, 0)` when absent.
fn parse_optional_shift_suffix(
    line: usize,
    operands: &[String],
    at: usize,
) -> Result<(Shift, u32), EncodeError> {
    if operands.len() > at {
        let shift = parse_shift(line, &operands[at])?;
        let amount = operands
            .get(at + 1)
            .ok_or(EncodeError::WrongArity {
                line,
                token: operands[at].clone(),
            })
            .and_then(|tok| parse_immediate(line, tok))?;
        Ok((shift, amount as u32))
    } else {
        Ok((Shift::Lsl, 0))
    }
}

/// Streams source lines into encoded words, resolving labels as it goes.
/// The batch `assemble` function and the debugger's line-oriented front end
/// both build on this.
#[derive(Debug, Default)]
pub struct Assembler {
    pub symtab: SymbolTable,
    words: Vec<u32>,
}

impl Assembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_address(&self) -> u32 {
        (self.words.len() as u32) * 4
    }

    pub fn words(&self) -> &[u32] {
        &self.words
    }

    pub fn encode_line(&mut self, line_no: usize, raw_line: &str) -> Result<(), EncodeError> {
        let tokens = tokenize(raw_line);
        let Some(first) = tokens.first() else {
            return Ok(());
        };
        if is_label_definition(first) {
            let name = &first[..first.len() - 1];
            let addr = self.current_address();
            self.symtab.define(&mut self.words, addr, name)?;
            return Ok(());
        }
        let mnemonic = first.to_lowercase();
        let operands: Vec<String> = tokens[1..].to_vec();

        if mnemonic == ".int" {
            expect_arity(line_no, &mnemonic, &operands, &[1])?;
            let value = parse_immediate(line_no, &operands[0])?;
            self.words.push(value as u32);
            return Ok(());
        }
        if mnemonic.starts_with('.') {
            return Err(EncodeError::UnknownDirective {
                line: line_no,
                token: mnemonic,
            });
        }

        let (mnemonic, operands) = expand_alias(&mnemonic, operands);
        let addr = self.current_address();
        let instr = self.build_instruction(line_no, &mnemonic, &operands, addr)?;
        self.words.push(encode_instruction(&instr));
        Ok(())
    }

    fn build_instruction(
        &mut self,
        line: usize,
        mnemonic: &str,
        operands: &[String],
        addr: u32,
    ) -> Result<Instruction, EncodeError> {
        match mnemonic {
            "add" | "adds" | "sub" | "subs" => {
                expect_arity(line, mnemonic, operands, &[3, 5])?;
                let (rd, rd_sf) = parse_reg(line, &operands[0])?;
                let (rn, rn_sf) = parse_reg(line, &operands[1])?;
                let sf = resolve_sf(line, rd_sf, rn_sf)?;
                let op = if mnemonic.starts_with("sub") {
                    ArithOp::Sub
                } else {
                    ArithOp::Add
                };
                let set_flags = mnemonic.ends_with('s');
                if looks_like_immediate(&operands[2]) {
                    let mut imm = parse_immediate(line, &operands[2])?;
                    let (shift, amount) = parse_optional_shift_suffix(line, operands, 3)?;
                    if !matches!(shift, Shift::Lsl) || (amount != 0 && amount != 12) {
                        return Err(EncodeError::InvalidShift {
                            line,
                            token: operands[3].clone(),
                        });
                    }
                    let sh = amount == 12;
                    if sh {
                        imm >>= 12;
                    }
                    Ok(Instruction::ImmArith(ImmArith {
                        sf,
                        set_flags,
                        op,
                        sh,
                        imm12: (imm as u32) & mask(12),
                        rn,
                        rd,
                    }))
                } else {
                    let (rm, _) = parse_reg(line, &operands[2])?;
                    let (shift, amount) = parse_optional_shift_suffix(line, operands, 3)?;
                    Ok(Instruction::RegArith(RegArith {
                        sf,
                        set_flags,
                        op,
                        shift,
                        rm,
                        operand: amount & mask(6),
                        rn,
                        rd,
                    }))
                }
            }
            "and" | "ands" | "orr" | "orn" | "eor" => {
                expect_arity(line, mnemonic, operands, &[3, 5])?;
                let (rd, rd_sf) = parse_reg(line, &operands[0])?;
                let (rn, rn_sf) = parse_reg(line, &operands[1])?;
                let (rm, _) = parse_reg(line, &operands[2])?;
                let sf = resolve_sf(line, rd_sf, rn_sf)?;
                let (shift, amount) = parse_optional_shift_suffix(line, operands, 3)?;
                let (opc, invert) = match mnemonic {
                    "and" => (LogicOp::And, false),
                    "ands" => (LogicOp::AndSetFlags, false),
                    "orr" => (LogicOp::Or, false),
                    "orn" => (LogicOp::Or, true),
                    _ => (LogicOp::Xor, false),
                };
                Ok(Instruction::RegLogic(RegLogic {
                    sf,
                    opc,
                    invert,
                    shift,
                    rm,
                    operand: amount & mask(6),
                    rn,
                    rd,
                }))
            }
            "madd" | "msub" => {
                expect_arity(line, mnemonic, operands, &[4])?;
                let (rd, rd_sf) = parse_reg(line, &operands[0])?;
                let (rn, rn_sf) = parse_reg(line, &operands[1])?;
                let (rm, _) = parse_reg(line, &operands[2])?;
                let (ra, _) = parse_reg(line, &operands[3])?;
                let sf = resolve_sf(line, rd_sf, rn_sf)?;
                Ok(Instruction::RegMultiply(RegMultiply {
                    sf,
                    subtract: mnemonic == "msub",
                    rm,
                    ra,
                    rn,
                    rd,
                }))
            }
            "movz" | "movn" | "movk" => {
                expect_arity(line, mnemonic, operands, &[2, 4])?;
                let (rd, rd_sf) = parse_reg(line, &operands[0])?;
                let sf = rd_sf.unwrap_or(true);
                let imm = parse_immediate(line, &operands[1])?;
                let (shift, amount) = parse_optional_shift_suffix(line, operands, 2)?;
                if !matches!(shift, Shift::Lsl) || amount % 16 != 0 || amount > 48 {
                    return Err(EncodeError::InvalidShift {
                        line,
                        token: operands.get(2).cloned().unwrap_or_default(),
                    });
                }
                let opc = match mnemonic {
                    "movn" => WideOp::Movn,
                    "movz" => WideOp::Movz,
                    _ => WideOp::Movk,
                };
                Ok(Instruction::ImmWide(ImmWide {
                    sf,
                    opc,
                    hw: amount / 16,
                    imm16: (imm as u32) & mask(16),
                    rd,
                }))
            }
            "ldr" | "str" => {
                expect_arity(line, mnemonic, operands, &[2])?;
                let (rt, rt_sf) = parse_reg(line, &operands[0])?;
                let sf = rt_sf.unwrap_or(true);
                if mnemonic == "ldr" && !operands[1].starts_with('[') {
                    let name = &operands[1];
                    let disp = self
                        .symtab
                        .lookup_or_defer(addr, name, RefKind::LoadLiteral);
                    return Ok(Instruction::DtLoadLiteral(DtLoadLiteral {
                        sf,
                        simm19: (disp as u32) & mask(19),
                        rt,
                    }));
                }
                let (mem, consumed) = parse_memory_operand(line, &operands[1..])?;
                if consumed + 1 != operands.len() {
                    return Err(EncodeError::WrongArity {
                        line,
                        token: mnemonic.to_string(),
                    });
                }
                let load = mnemonic == "ldr";
                let access_size: i64 = if sf { 8 } else { 4 };
                Ok(match mem {
                    MemOperand::ImmOffset { xn, imm } => Instruction::DtImmOffset(DtImmOffset {
                        sf,
                        load,
                        imm12: ((imm / access_size) as u32) & mask(12),
                        xn,
                        rt,
                    }),
                    MemOperand::RegOffset { xn, xm } => Instruction::DtRegOffset(DtRegOffset {
                        sf,
                        load,
                        xm,
                        xn,
                        rt,
                    }),
                    MemOperand::PreIndex { xn, imm } => {
                        Instruction::DtPrePostIndex(DtPrePostIndex {
                            sf,
                            load,
                            pre: true,
                            simm9: (imm as u32) & mask(9),
                            xn,
                            rt,
                        })
                    }
                    MemOperand::PostIndex { xn, imm } => {
                        Instruction::DtPrePostIndex(DtPrePostIndex {
                            sf,
                            load,
                            pre: false,
                            simm9: (imm as u32) & mask(9),
                            xn,
                            rt,
                        })
                    }
                })
            }
            "b" => {
                expect_arity(line, mnemonic, operands, &[1])?;
                let disp = self
                    .symtab
                    .lookup_or_defer(addr, &operands[0], RefKind::BranchUncond);
                Ok(Instruction::BranchUncond(BranchUncond {
                    simm26: (disp as u32) & mask(26),
                }))
            }
            "br" => {
                expect_arity(line, mnemonic, operands, &[1])?;
                let (xn, _) = parse_reg(line, &operands[0])?;
                Ok(Instruction::BranchReg(BranchReg { xn }))
            }
            _ if mnemonic.starts_with("b.") => {
                expect_arity(line, mnemonic, operands, &[1])?;
                let suffix = &mnemonic[2..];
                let cond = Condition::from_mnemonic(suffix).ok_or(EncodeError::InvalidCondition {
                    line,
                    token: mnemonic.to_string(),
                })?;
                let disp = self
                    .symtab
                    .lookup_or_defer(addr, &operands[0], RefKind::BranchCond);
                Ok(Instruction::BranchCond(BranchCond {
                    cond,
                    simm19: (disp as u32) & mask(19),
                }))
            }
            _ => Err(EncodeError::UnknownMnemonic {
                line,
                token: mnemonic.to_string(),
            }),
        }
    }

    /// Consume the assembler, failing if any label remains unresolved, and
    /// return the emitted words.
    pub fn finish(self) -> Result<Vec<u32>, EncodeError> {
        self.symtab.finish()?;
        Ok(self.words)
    }
}

pub fn assemble(source: &str) -> Result<Vec<u32>, EncodeError> {
    let mut assembler = Assembler::new();
    for (i, line) in source.lines().enumerate() {
        assembler.encode_line(i + 1, line)?;
    }
    assembler.finish()
}

fn shift_bits(shift: Shift) -> u32 {
    match shift {
        Shift::Lsl => 0,
        Shift::Lsr => 1,
        Shift::Asr => 2,
        Shift::Ror => 3,
    }
}

/// Pack a decoded instruction back into its 32-bit encoding, per the bit
/// layout documented at the top of `decode.rs`.
pub fn encode_instruction(instr: &Instruction) -> u32 {
    match instr {
        Instruction::ImmArith(a) => {
            let mut w = 0u32;
            if a.sf {
                w |= 1 << 31;
            }
            if matches!(a.op, ArithOp::Sub) {
                w |= 1 << 30;
            }
            if a.set_flags {
                w |= 1 << 29;
            }
            w |= 0b100 << 26;
            if a.sh {
                w |= 1 << 22;
            }
            w |= (a.imm12 & mask(12)) << 10;
            w |= (a.rn as u32 & mask(5)) << 5;
            w |= a.rd as u32 & mask(5);
            w
        }
        Instruction::ImmWide(iw) => {
            let mut w = 0u32;
            if iw.sf {
                w |= 1 << 31;
            }
            let opc = match iw.opc {
                WideOp::Movn => 0u32,
                WideOp::Movz => 2,
                WideOp::Movk => 3,
            };
            w |= opc << 29;
            w |= 0b100 << 26;
            w |= 0b010 << 23;
            w |= (iw.hw & mask(2)) << 21;
            w |= (iw.imm16 & mask(16)) << 5;
            w |= iw.rd as u32 & mask(5);
            w
        }
        Instruction::RegArith(a) => {
            let mut w = 0u32;
            if a.sf {
                w |= 1 << 31;
            }
            if matches!(a.op, ArithOp::Sub) {
                w |= 1 << 30;
            }
            if a.set_flags {
                w |= 1 << 29;
            }
            w |= 0b010 << 26;
            w |= shift_bits(a.shift) << 21;
            w |= (a.rm as u32 & mask(5)) << 16;
            w |= (a.operand & mask(6)) << 10;
            w |= (a.rn as u32 & mask(5)) << 5;
            w |= a.rd as u32 & mask(5);
            w
        }
        Instruction::RegLogic(l) => {
            let mut w = 0u32;
            if l.sf {
                w |= 1 << 31;
            }
            let opc = match l.opc {
                LogicOp::And => 0u32,
                LogicOp::Or => 1,
                LogicOp::Xor => 2,
                LogicOp::AndSetFlags => 3,
            };
            w |= opc << 29;
            w |= 0b010 << 26;
            w |= 0b10 << 24;
            if l.invert {
                w |= 1 << 23;
            }
            w |= shift_bits(l.shift) << 21;
            w |= (l.rm as u32 & mask(5)) << 16;
            w |= (l.operand & mask(6)) << 10;
            w |= (l.rn as u32 & mask(5)) << 5;
            w |= l.rd as u32 & mask(5);
            w
        }
        Instruction::RegMultiply(m) => {
            let mut w = 0u32;
            if m.sf {
                w |= 1 << 31;
            }
            w |= 0b010 << 26;
            w |= 0b01 << 24;
            w |= (m.rm as u32 & mask(5)) << 16;
            if m.subtract {
                w |= 1 << 15;
            }
            w |= (m.ra as u32 & mask(5)) << 10;
            w |= (m.rn as u32 & mask(5)) << 5;
            w |= m.rd as u32 & mask(5);
            w
        }
        Instruction::DtLoadLiteral(l) => {
            let mut w = 0u32;
            if l.sf {
                w |= 1 << 31;
            }
            w |= 0b110 << 26;
            w |= (l.simm19 & mask(19)) << 5;
            w |= l.rt as u32 & mask(5);
            w
        }
        Instruction::DtImmOffset(d) => {
            let mut w = 0u32;
            if d.sf {
                w |= 1 << 31;
            }
            if d.load {
                w |= 1 << 30;
            }
            w |= 0b110 << 26;
            w |= 0b01 << 24;
            w |= (d.imm12 & mask(12)) << 10;
            w |= (d.xn as u32 & mask(5)) << 5;
            w |= d.rt as u32 & mask(5);
            w
        }
        Instruction::DtRegOffset(d) => {
            let mut w = 0u32;
            if d.sf {
                w |= 1 << 31;
            }
            if d.load {
                w |= 1 << 30;
            }
            w |= 0b110 << 26;
            w |= 0b10 << 24;
            w |= (d.xm as u32 & mask(5)) << 16;
            w |= (d.xn as u32 & mask(5)) << 5;
            w |= d.rt as u32 & mask(5);
            w
        }
        Instruction::DtPrePostIndex(d) => {
            let mut w = 0u32;
            if d.sf {
                w |= 1 << 31;
            }
            if d.load {
                w |= 1 << 30;
            }
            if d.pre {
                w |= 1 << 29;
            }
            w |= 0b110 << 26;
            w |= 0b11 << 24;
            w |= (d.simm9 & mask(9)) << 12;
            w |= (d.xn as u32 & mask(5)) << 5;
            w |= d.rt as u32 & mask(5);
            w
        }
        Instruction::BranchUncond(b) => {
            let mut w = 0u32;
            w |= 0b101 << 26;
            w |= b.simm26 & mask(26);
            w
        }
        Instruction::BranchCond(b) => {
            let mut w = 0u32;
            w |= 1 << 30;
            w |= 0b101 << 26;
            w |= (b.simm19 & mask(19)) << 5;
            w |= b.cond.to_bits();
            w
        }
        Instruction::BranchReg(b) => {
            let mut w = 0u32;
            w |= 0b10 << 30;
            w |= 0b101 << 26;
            w |= (b.xn as u32 & mask(5)) << 5;
            w
        }
    }
}
