//! End-to-end scenarios: assemble a literal source string, run it to HALT,
//! and assert on the resulting register file / PSTATE / memory. These
//! exercise the public crate surface the way a downstream consumer would,
//! independent of the CLI binaries' file I/O.

use a64emu::encode::assemble;
use a64emu::exec::Emulator;

fn run_to_halt(source: &str) -> Emulator {
    let words = assemble(source).expect("source should assemble");
    let mut bytes = Vec::with_capacity(words.len() * 4);
    for word in words {
        bytes.extend_from_slice(&word.to_le_bytes());
    }
    let mut emulator = Emulator::new();
    emulator.load_image(&bytes).expect("image fits in memory");
    emulator
        .run(Some(1_000))
        .expect("program should reach HALT");
    emulator
}

#[test]
fn movz_then_halt() {
    let emu = run_to_halt("movz x0, #5\nand x0,x0,x0\n");
    assert_eq!(emu.registers().read64(0).unwrap(), 5);
    assert_eq!(emu.pc(), 4);
    assert_eq!(emu.pstate().to_string(), "----");
}

#[test]
fn adds_two_registers() {
    let emu = run_to_halt("movz x0, #1\nmovz x1, #2\nadds x2, x0, x1\nand x0,x0,x0\n");
    assert_eq!(emu.registers().read64(2).unwrap(), 3);
    assert_eq!(emu.pstate().to_string(), "----");
}

#[test]
fn subs_all_ones_from_itself_sets_zero_and_carry() {
    let emu = run_to_halt("movn x0, #0\nsubs x1, x0, x0\nand x0,x0,x0\n");
    assert_eq!(emu.registers().read64(0).unwrap(), u64::MAX);
    assert_eq!(emu.registers().read64(1).unwrap(), 0);
    assert_eq!(emu.pstate().to_string(), "-ZC-");
}

#[test]
fn forward_branch_over_a_skipped_instruction() {
    let emu = run_to_halt("b end\nmovz x0,#7\nend:\nand x0,x0,x0\n");
    assert_eq!(emu.registers().read64(0).unwrap(), 0);
}

#[test]
fn load_literal_reads_an_int_directive() {
    let emu = run_to_halt("ldr x0, data\nand x0,x0,x0\ndata:\n.int 0xDEADBEEF\n");
    assert_eq!(emu.registers().read64(0).unwrap(), 0x0000_0000_DEAD_BEEF);
}

#[test]
fn pre_index_store_then_load_round_trips() {
    let emu = run_to_halt(
        "movz x1,#0x100\nmovz x0,#0x42\nstr x0,[x1,#8]!\nldr x2,[x1]\nand x0,x0,x0\n",
    );
    assert_eq!(emu.registers().read64(1).unwrap(), 0x108);
    assert_eq!(emu.registers().read64(2).unwrap(), 0x42);
    assert_eq!(emu.memory().load32(0x108).unwrap(), 0x42);
}
