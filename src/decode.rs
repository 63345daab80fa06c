//! `u32` → [`Instruction`] decoding.
//!
//! Bit layout (canonical for both the encoder and the decoder). The
//! top-level group lives at bits `[28:26]`, with a secondary `subop`
//! selector at `[25:24]` for the immediate/register groups. This is not a
//! claim of full AArch64 bit-compatibility (an explicit non-goal): it is an
//! internally-consistent scheme for exactly the subset below, chosen so
//! that the `HALT` sentinel `0x8a00_0000` decodes as `and x0, x0, x0` and a
//! zero-offset unconditional branch decodes as `0x1400_0000`, matching the
//! real ISA for those two cases.
//!
//! ```text
//! Branch group        bits[28:26] = 101, bits[31:30] = id
//!   id=00  BranchUncond    bits[25:0]  = simm26
//!   id=01  BranchCond      bits[23:5]  = simm19, bits[3:0] = cond
//!   id=10  BranchReg       bits[9:5]   = xn
//!
//! DP-immediate group  bits[28:26] = 100, bits[25:23] = opi
//!   opi=000  ImmArith   bit22=sh, bits[21:10]=imm12, bits[9:5]=rn, bits[4:0]=rd
//!   opi=010  ImmWide    bits[22:21]=hw, bits[20:5]=imm16, bits[4:0]=rd
//!
//! DP-register group   bits[28:26] = 010, bits[25:24] = subop
//!   subop=00  RegArith     bits[22:21]=shift, bits[20:16]=rm, bits[15:10]=operand, bits[9:5]=rn, bits[4:0]=rd
//!   subop=10  RegLogic     bit23=N, bits[22:21]=shift, bits[20:16]=rm, bits[15:10]=operand, bits[9:5]=rn, bits[4:0]=rd
//!   subop=01  RegMultiply  bits[20:16]=rm, bit15=x, bits[14:10]=ra, bits[9:5]=rn, bits[4:0]=rd
//!
//! DT group            bits[28:26] = 110, bits[25:24] = subop
//!   subop=00  DtLoadLiteral   bits[23:5]=simm19, bits[4:0]=rt
//!   subop=01  DtImmOffset     bits[21:10]=imm12, bits[9:5]=xn, bits[4:0]=rt
//!   subop=10  DtRegOffset     bits[20:16]=xm, bits[9:5]=xn, bits[4:0]=rt
//!   subop=11  DtPrePostIndex  bits[20:12]=simm9, bits[9:5]=xn, bits[4:0]=rt
//! ```
//!
//! `sf` is always bit 31. `op`/`L`/`I`/`opc` sit at bits 30/29 as documented
//! per variant below.

use crate::fields::extract_field;
use crate::instr::*;
use crate::pstate::Condition;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DecodeError {
    #[error("word {word:#010x} does not match any known encoding")]
    UnknownEncoding { word: u32 },
}

fn bit(word: u32, n: u32) -> bool {
    extract_field(word, n, n) == 1
}

fn field(word: u32, end: u32, start: u32) -> u32 {
    extract_field(word, end, start)
}

pub fn decode(word: u32) -> Result<Instruction, DecodeError> {
    let group = field(word, 28, 26);
    match group {
        0b101 => decode_branch(word),
        0b100 => decode_dp_immediate(word),
        0b010 => decode_dp_register(word),
        0b110 => decode_dt(word),
        _ => Err(DecodeError::UnknownEncoding { word }),
    }
}

fn decode_branch(word: u32) -> Result<Instruction, DecodeError> {
    match field(word, 31, 30) {
        0b00 => Ok(Instruction::BranchUncond(BranchUncond {
            simm26: field(word, 25, 0),
        })),
        0b01 => {
            let cond_bits = field(word, 3, 0);
            let cond = Condition::from_bits(cond_bits)
                .ok_or(DecodeError::UnknownEncoding { word })?;
            Ok(Instruction::BranchCond(BranchCond {
                cond,
                simm19: field(word, 23, 5),
            }))
        }
        0b10 => Ok(Instruction::BranchReg(BranchReg {
            xn: field(word, 9, 5) as u8,
        })),
        _ => Err(DecodeError::UnknownEncoding { word }),
    }
}

fn decode_dp_immediate(word: u32) -> Result<Instruction, DecodeError> {
    let sf = bit(word, 31);
    match field(word, 25, 23) {
        0b000 => Ok(Instruction::ImmArith(ImmArith {
            sf,
            op: if bit(word, 30) { ArithOp::Sub } else { ArithOp::Add },
            set_flags: bit(word, 29),
            sh: bit(word, 22),
            imm12: field(word, 21, 10),
            rn: field(word, 9, 5) as u8,
            rd: field(word, 4, 0) as u8,
        })),
        0b010 => {
            let opc = field(word, 30, 29);
            let opc = match opc {
                0b00 => WideOp::Movn,
                0b10 => WideOp::Movz,
                0b11 => WideOp::Movk,
                _ => return Err(DecodeError::UnknownEncoding { word }),
            };
            Ok(Instruction::ImmWide(ImmWide {
                sf,
                opc,
                hw: field(word, 22, 21),
                imm16: field(word, 20, 5),
                rd: field(word, 4, 0) as u8,
            }))
        }
        _ => Err(DecodeError::UnknownEncoding { word }),
    }
}

fn decode_shift(bits: u32) -> Shift {
    match bits {
        0b00 => Shift::Lsl,
        0b01 => Shift::Lsr,
        0b10 => Shift::Asr,
        _ => Shift::Ror,
    }
}

fn decode_dp_register(word: u32) -> Result<Instruction, DecodeError> {
    let sf = bit(word, 31);
    match field(word, 25, 24) {
        0b00 => Ok(Instruction::RegArith(RegArith {
            sf,
            op: if bit(word, 30) { ArithOp::Sub } else { ArithOp::Add },
            set_flags: bit(word, 29),
            shift: decode_shift(field(word, 22, 21)),
            rm: field(word, 20, 16) as u8,
            operand: field(word, 15, 10),
            rn: field(word, 9, 5) as u8,
            rd: field(word, 4, 0) as u8,
        })),
        0b10 => {
            let opc = match field(word, 30, 29) {
                0b00 => LogicOp::And,
                0b01 => LogicOp::Or,
                0b10 => LogicOp::Xor,
                _ => LogicOp::AndSetFlags,
            };
            Ok(Instruction::RegLogic(RegLogic {
                sf,
                opc,
                invert: bit(word, 23),
                shift: decode_shift(field(word, 22, 21)),
                rm: field(word, 20, 16) as u8,
                operand: field(word, 15, 10),
                rn: field(word, 9, 5) as u8,
                rd: field(word, 4, 0) as u8,
            }))
        }
        0b01 => Ok(Instruction::RegMultiply(RegMultiply {
            sf,
            rm: field(word, 20, 16) as u8,
            subtract: bit(word, 15),
            ra: field(word, 14, 10) as u8,
            rn: field(word, 9, 5) as u8,
            rd: field(word, 4, 0) as u8,
        })),
        _ => Err(DecodeError::UnknownEncoding { word }),
    }
}

fn decode_dt(word: u32) -> Result<Instruction, DecodeError> {
    let sf = bit(word, 31);
    match field(word, 25, 24) {
        0b00 => Ok(Instruction::DtLoadLiteral(DtLoadLiteral {
            sf,
            simm19: field(word, 23, 5),
            rt: field(word, 4, 0) as u8,
        })),
        0b01 => Ok(Instruction::DtImmOffset(DtImmOffset {
            sf,
            load: bit(word, 30),
            imm12: field(word, 21, 10),
            xn: field(word, 9, 5) as u8,
            rt: field(word, 4, 0) as u8,
        })),
        0b10 => Ok(Instruction::DtRegOffset(DtRegOffset {
            sf,
            load: bit(word, 30),
            xm: field(word, 20, 16) as u8,
            xn: field(word, 9, 5) as u8,
            rt: field(word, 4, 0) as u8,
        })),
        0b11 => Ok(Instruction::DtPrePostIndex(DtPrePostIndex {
            sf,
            load: bit(word, 30),
            pre: bit(word, 29),
            simm9: field(word, 20, 12),
            xn: field(word, 9, 5) as u8,
            rt: field(word, 4, 0) as u8,
        })),
        _ => Err(DecodeError::UnknownEncoding { word }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::encode_instruction;

    #[test]
    fn halt_sentinel_is_and_x0_x0_x0() {
        let instr = decode(0x8a00_0000).unwrap();
        assert_eq!(
            instr,
            Instruction::RegLogic(RegLogic {
                sf: true,
                opc: LogicOp::And,
                invert: false,
                shift: Shift::Lsl,
                rm: 0,
                operand: 0,
                rn: 0,
                rd: 0,
            })
        );
    }

    #[test]
    fn zero_offset_branch_matches_real_encoding() {
        let instr = decode(0x1400_0000).unwrap();
        assert_eq!(instr, Instruction::BranchUncond(BranchUncond { simm26: 0 }));
    }

    #[test]
    fn unknown_word_is_an_error() {
        assert_eq!(decode(0xffff_ffff), Err(DecodeError::UnknownEncoding { word: 0xffff_ffff }));
    }

    #[test]
    fn round_trip_every_variant_shape() {
        let samples = [
            Instruction::ImmArith(ImmArith {
                sf: true,
                set_flags: true,
                op: ArithOp::Add,
                sh: false,
                imm12: 5,
                rn: 1,
                rd: 2,
            }),
            Instruction::ImmWide(ImmWide {
                sf: false,
                opc: WideOp::Movz,
                hw: 0,
                imm16: 7,
                rd: 0,
            }),
            Instruction::RegArith(RegArith {
                sf: true,
                set_flags: false,
                op: ArithOp::Sub,
                shift: Shift::Asr,
                rm: 3,
                operand: 4,
                rn: 5,
                rd: 6,
            }),
            Instruction::RegMultiply(RegMultiply {
                sf: true,
                subtract: true,
                rm: 1,
                ra: 31,
                rn: 2,
                rd: 3,
            }),
            Instruction::DtImmOffset(DtImmOffset {
                sf: true,
                load: true,
                imm12: 9,
                xn: 1,
                rt: 0,
            }),
            Instruction::DtPrePostIndex(DtPrePostIndex {
                sf: true,
                load: false,
                pre: true,
                simm9: 8,
                xn: 1,
                rt: 0,
            }),
            Instruction::BranchCond(BranchCond {
                cond: Condition::Gt,
                simm19: 12,
            }),
            Instruction::BranchReg(BranchReg { xn: 30 }),
        ];
        for instr in samples {
            let word = encode_instruction(&instr);
            assert_eq!(decode(word).unwrap(), instr);
        }
    }
}
