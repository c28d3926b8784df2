/*!
test_utils.rs - Shared guest-program builders for in-module tests.

Programs are assembled as raw big-endian words at `PROG_BASE` inside one
RAM window that also leaves room below for data (loads/stores in tests
use addresses in the 0x1000..0x2000 range). The CPU starts at the
program with LR pointed at `STOP_PC`, so a final `blr` parks the PC on a
recognizable sentinel.
*/

use crate::cpu::state::CpuState;
use crate::cpu::table::decode;
use crate::mem::{FlatMem, GuestMem};

/// Guest address test programs are assembled at.
pub(crate) const PROG_BASE: u32 = 0x2000;

/// Where a final `blr` parks the PC (never fetched).
pub(crate) const STOP_PC: u32 = 0x4000_0000;

/// Build a zeroed RAM window with `words` assembled at `PROG_BASE`, and
/// a CPU about to execute the first of them.
pub(crate) fn setup(words: &[u32]) -> (CpuState, FlatMem) {
    let mut mem = FlatMem::new(0x1000, 0x4000);
    for (i, word) in words.iter().enumerate() {
        mem.write32(PROG_BASE + 4 * i as u32, *word);
    }
    let mut cpu = CpuState::new();
    cpu.pc = PROG_BASE;
    cpu.lr = STOP_PC;
    (cpu, mem)
}

/// Reference execution: interpret instruction by instruction until the
/// PC reaches `stop`.
pub(crate) fn interp_run(cpu: &mut CpuState, mem: &mut FlatMem, stop: u32) {
    let mut guard = 0u32;
    while cpu.pc != stop {
        let op = mem.read32(cpu.pc);
        (decode(op).exec)(cpu, mem, op).expect("interpreter step");
        guard += 1;
        assert!(guard < 10_000, "interpreter runaway");
    }
}
