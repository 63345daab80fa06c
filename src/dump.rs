//! The bit-exact register/memory dump format (§6). Written directly via
//! `io::Write` rather than through the `log` facade, so its layout can
//! never be perturbed by log formatting or level filtering.

use crate::exec::Emulator;
use std::io::{self, Write};

pub fn write_dump<W: Write>(out: &mut W, emulator: &Emulator) -> io::Result<()> {
    writeln!(out, "Registers:")?;
    for (index, value) in emulator.registers().iter() {
        writeln!(out, "X{index:02}    = {value:016x}")?;
    }
    writeln!(out, "PC     = {:016x}", emulator.pc())?;
    writeln!(out, "PSTATE : {}", emulator.pstate())?;
    writeln!(out, "Non-Zero Memory:")?;
    for (addr, word) in emulator.memory().non_zero_words() {
        writeln!(out, "0x{addr:08x}: {word:08x}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::assemble;

    #[test]
    fn dump_matches_the_documented_layout() {
        let words = assemble("movz x0, #5\nand x0,x0,x0\n").unwrap();
        let mut bytes = Vec::new();
        for w in words {
            bytes.extend_from_slice(&w.to_le_bytes());
        }
        let mut emu = Emulator::new();
        emu.load_image(&bytes).unwrap();
        emu.run(Some(100)).unwrap();

        let mut out = Vec::new();
        write_dump(&mut out, &emu).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.starts_with("Registers:\n"));
        assert!(text.contains("X00    = 0000000000000005\n"));
        assert!(text.contains("X30    = 0000000000000000\n"));
        assert!(text.contains("PC     = 0000000000000004\n"));
        assert!(text.contains("PSTATE : ----\n"));
        assert!(text.contains("Non-Zero Memory:\n"));
        assert!(text.contains("0x00000004: 8a000000\n"));
    }
}
