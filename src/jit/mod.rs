/*!
jit - Dynamic translation: block compiler, emitter backend, block cache.

Overview
========
`Jit` owns the three pieces a dispatcher needs: the bounded code buffer
behind the `Emitter` façade, the `BlockCache`, and the translation
configuration. `compile_block` is the public compile operation (always
succeeds; overflow is handled internally); `step` is the minimal
lookup-or-compile-then-execute round the scenarios drive.

The full dispatcher loop, disassembly, and profiling stay outside this
crate.
*/

use log::debug;

use crate::cpu::state::CpuState;
use crate::interp::{Exception, InterpFn};
use crate::mem::GuestMem;

pub mod block;
pub(crate) mod compile;
pub(crate) mod emit;

pub use block::{BlockCache, BlockInfo};

use emit::Emitter;

/// Default code buffer bound, in cells.
pub const DEFAULT_CODE_CAPACITY: usize = 64 * 1024;

/// Special-purpose-register model (see the `misc` family handler).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SprModel {
    /// Only XER/LR/CTR are architected; anything else is illegal.
    Standalone,
    /// Supervisor-extended: SDR1/PVR read fixed values, unknown SPRs
    /// read 0 and writes to them are dropped.
    Supervisor { pvr: u32 },
}

/// Translator construction parameters.
#[derive(Clone, Copy)]
pub struct JitConfig {
    pub spr: SprModel,
    /// Code buffer bound, in cells.
    pub code_capacity: usize,
    /// Optional per-instruction trace hook, called with the raw opcode
    /// before each translated instruction. Off by default.
    pub record_step: Option<InterpFn>,
}

impl Default for JitConfig {
    fn default() -> Self {
        Self {
            spr: SprModel::Standalone,
            code_capacity: DEFAULT_CODE_CAPACITY,
            record_step: None,
        }
    }
}

pub struct Jit {
    config: JitConfig,
    emitter: Emitter,
    cache: BlockCache,
}

impl Default for Jit {
    fn default() -> Self {
        Self::new(JitConfig::default())
    }
}

impl Jit {
    pub fn new(config: JitConfig) -> Self {
        Self {
            emitter: Emitter::new(config.code_capacity),
            cache: BlockCache::new(),
            config,
        }
    }

    /// Compile the basic block at `entry_pc` and register it. Infallible;
    /// code buffer exhaustion invalidates the cache and restarts
    /// internally.
    pub fn compile_block(&mut self, mem: &dyn GuestMem, entry_pc: u32) -> BlockInfo {
        compile::compile_block(&mut self.emitter, &mut self.cache, &self.config, mem, entry_pc)
    }

    /// Execute one block at the current `cpu.pc`, compiling on a cache
    /// miss. Returns when the block hands control back (its terminating
    /// instruction has updated `cpu.pc`).
    pub fn step(
        &mut self,
        cpu: &mut CpuState,
        mem: &mut dyn GuestMem,
    ) -> Result<(), Exception> {
        let entry = cpu.pc;
        let block = match self.cache.find(entry) {
            Some(b) => *b,
            None => {
                debug!("cache miss at {entry:#010x}");
                self.compile_block(&*mem, entry)
            }
        };
        self.emitter.run(block.host_entry, cpu, mem)
    }

    pub fn cache(&self) -> &BlockCache {
        &self.cache
    }

    /// Invalidation hook for guest writes over translated code.
    pub fn invalidate_range(&mut self, lo: u32, hi: u32) {
        self.cache.invalidate_range(lo, hi);
    }

    /// The emitted cells of a registered block (test introspection).
    #[cfg(test)]
    pub(crate) fn block_ops(&self, block: &BlockInfo) -> &[emit::HostOp] {
        &self.emitter.ops()[block.host_entry..block.host_entry + block.host_size]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::state::{CR_GT, CR_SO};
    use crate::jit::emit::HostOp;
    use crate::test_utils::{STOP_PC, interp_run, setup};
    use proptest::prelude::*;

    #[test]
    fn s1_li_addi_chain() {
        // li r3,42 ; addi r3,r3,1 ; blr
        let (mut cpu, mut mem) = setup(&[0x3860_002A, 0x3863_0001, 0x4E80_0020]);
        let mut jit = Jit::default();
        let block = jit.compile_block(&mem, cpu.pc);
        assert_eq!(block.entry_pc, 0x2000);
        assert_eq!(block.end_pc, 0x2008);
        assert_eq!((block.end_pc - block.entry_pc) % 4, 0);
        assert!(block.host_size > 0);
        jit.step(&mut cpu, &mut mem).unwrap();
        assert_eq!(cpu.gpr[3], 43);
        assert_eq!(cpu.pc, STOP_PC);
    }

    #[test]
    fn s4_lwzu_updates_base() {
        // lwzu r5,8(r6) ; blr
        let (mut cpu, mut mem) = setup(&[0x84A6_0008, 0x4E80_0020]);
        cpu.gpr[6] = 0x1000;
        mem.write32(0x1008, 0x1122_3344);
        let mut jit = Jit::default();
        jit.step(&mut cpu, &mut mem).unwrap();
        assert_eq!(cpu.gpr[5], 0x1122_3344);
        assert_eq!(cpu.gpr[6], 0x1008);
    }

    #[test]
    fn s5_conditional_branch_taken() {
        // cmpwi cr0,r3,0 ; beq +8 ; li r3,1 ; li r3,2 ; blr
        let (mut cpu, mut mem) = setup(&[
            0x2C03_0000,
            0x4182_0008,
            0x3860_0001,
            0x3860_0002,
            0x4E80_0020,
        ]);
        cpu.gpr[3] = 0;
        let mut jit = Jit::default();
        let block = jit.compile_block(&mem, cpu.pc);
        // Terminates at the beq; nothing earlier ends the block.
        assert_eq!(block.end_pc, 0x2004);
        jit.step(&mut cpu, &mut mem).unwrap();
        assert_eq!(cpu.pc, 0x200C); // taken, over the li r3,1
        jit.step(&mut cpu, &mut mem).unwrap();
        assert_eq!(cpu.pc, STOP_PC);
        assert_eq!(cpu.gpr[3], 2);
    }

    #[test]
    fn s6_overflow_invalidates_once_and_restarts() {
        let (mut cpu, mut mem) = setup(&[0x3860_002A, 0x3863_0001, 0x4E80_0020]);
        // blr-only filler block at 0x3000.
        mem.write32(0x3000, 0x4E80_0020);
        // Filler (3 cells) + S1 (8 cells) crosses the 10-cell bound
        // mid-block; S1 alone fits.
        let mut jit = Jit::new(JitConfig {
            code_capacity: 10,
            ..JitConfig::default()
        });
        jit.compile_block(&mem, 0x3000);
        assert_eq!(jit.cache().len(), 1);
        let block = jit.compile_block(&mem, 0x2000);
        assert_eq!(jit.cache().bulk_invalidations(), 1);
        // The filler block did not survive the bulk invalidation.
        assert_eq!(jit.cache().len(), 1);
        assert!(jit.cache().find(0x3000).is_none());
        // Identical semantics to the no-overflow compile.
        jit.step(&mut cpu, &mut mem).unwrap();
        assert_eq!(cpu.gpr[3], 43);
        assert_eq!(block.host_entry, 0);
    }

    #[test]
    fn spr_supervisor_model_folds_reads_to_immediates() {
        // mfspr r3,PVR ; mfspr r4,SDR1 ; mtspr SDR1,r3 ; blr
        let words = [0x7C7F_42A6, 0x7C99_02A6, 0x7C79_03A6, 0x4E80_0020];
        let (mut cpu, mut mem) = setup(&words);
        let mut jit = Jit::new(JitConfig {
            spr: SprModel::Supervisor { pvr: 0x000C_0000 },
            ..JitConfig::default()
        });
        jit.step(&mut cpu, &mut mem).unwrap();
        assert_eq!(cpu.gpr[3], 0x000C_0000);
        assert_eq!(cpu.gpr[4], 0xDEAD_001F);
        assert_eq!(cpu.pc, STOP_PC);
    }

    #[test]
    fn spr_standalone_model_raises_illegal() {
        let (mut cpu, mut mem) = setup(&[0x7C7F_42A6, 0x4E80_0020]);
        let mut jit = Jit::default();
        let err = jit.step(&mut cpu, &mut mem).unwrap_err();
        assert!(matches!(err, Exception::IllegalInstruction { pc: 0x2000, .. }));
    }

    #[test]
    fn illegal_mid_block_reports_its_own_pc() {
        // li r3,1 ; fadd (illegal here) ; blr
        let (mut cpu, mut mem) = setup(&[0x3860_0001, 0xFC22_182A, 0x4E80_0020]);
        let mut jit = Jit::default();
        let err = jit.step(&mut cpu, &mut mem).unwrap_err();
        // The flushed pc_offset must point at the faulting instruction.
        assert_eq!(
            err,
            Exception::IllegalInstruction {
                opcode: 0xFC22_182A,
                pc: 0x2004
            }
        );
        assert_eq!(cpu.gpr[3], 1);
    }

    #[test]
    fn sc_terminates_block_and_surfaces_syscall() {
        let (mut cpu, mut mem) = setup(&[0x3860_0007, 0x4400_0002]);
        let mut jit = Jit::default();
        let block = jit.compile_block(&mem, cpu.pc);
        assert_eq!(block.end_pc, 0x2004);
        let err = jit.step(&mut cpu, &mut mem).unwrap_err();
        assert_eq!(err, Exception::Syscall { pc: 0x2004 });
        assert_eq!(cpu.gpr[3], 7);
    }

    #[test]
    fn ctr_branch_falls_back_but_behaves() {
        // li r3,0 ; mtctr r4 ; loop: addi r3,r3,1 ; bdnz loop ; blr
        let (mut cpu, mut mem) = setup(&[
            0x3860_0000,
            0x7C89_03A6, // mtspr CTR,r4
            0x3863_0001,
            0x4200_FFFC, // bdnz -4
            0x4E80_0020,
        ]);
        cpu.gpr[4] = 5;
        let mut jit = Jit::default();
        let mut guard = 0;
        while cpu.pc != STOP_PC {
            jit.step(&mut cpu, &mut mem).unwrap();
            guard += 1;
            assert!(guard < 100);
        }
        assert_eq!(cpu.gpr[3], 5);
        assert_eq!(cpu.ctr, 0);
    }

    #[test]
    fn recompile_after_range_invalidation() {
        let (mut cpu, mut mem) = setup(&[0x3860_002A, 0x4E80_0020]);
        let mut jit = Jit::default();
        jit.step(&mut cpu, &mut mem).unwrap();
        assert_eq!(cpu.gpr[3], 42);
        assert!(jit.cache().find(0x2000).is_some());
        // Patch the immediate and drop the stale block.
        mem.write32(0x2000, 0x3860_0007);
        jit.invalidate_range(0x2000, 0x2004);
        assert!(jit.cache().find(0x2000).is_none());
        cpu.pc = 0x2000;
        jit.step(&mut cpu, &mut mem).unwrap();
        assert_eq!(cpu.gpr[3], 7);
    }

    #[test]
    fn cr0_record_is_committed_before_mfcr_reads() {
        // add. r3,r4,r5 ; mfcr r6 ; blr
        let (mut cpu, mut mem) = setup(&[0x7C64_2A15, 0x7CC0_0026, 0x4E80_0020]);
        cpu.gpr[4] = 5;
        cpu.gpr[5] = 3;
        let mut jit = Jit::default();
        let block = jit.compile_block(&mem, cpu.pc);
        let ops = jit.block_ops(&block);
        let record = ops
            .iter()
            .position(|o| matches!(o, HostOp::RecordCr0T0))
            .expect("record");
        let load_cr = ops
            .iter()
            .position(|o| matches!(o, HostOp::LoadT0Cr))
            .expect("mfcr load");
        assert!(
            ops[record..load_cr]
                .iter()
                .any(|o| matches!(o, HostOp::CommitCr)),
            "commit must sit between the record and the CR read"
        );
        jit.step(&mut cpu, &mut mem).unwrap();
        assert_eq!(cpu.gpr[3], 8);
        assert_eq!(cpu.gpr[6] >> 28, CR_GT);
    }

    #[test]
    fn addo_sets_summary_overflow_into_cr0() {
        // addo. r3,r4,r5 ; blr
        let (mut cpu, mut mem) = setup(&[0x7C64_2E15, 0x4E80_0020]);
        cpu.gpr[4] = 0x7FFF_FFFF;
        cpu.gpr[5] = 1;
        let mut jit = Jit::default();
        jit.step(&mut cpu, &mut mem).unwrap();
        assert_eq!(cpu.gpr[3], 0x8000_0000);
        assert!(cpu.xer_so());
        assert_eq!(cpu.cr_field(0), CR_SO | 8); // LT from the sign, SO latched
    }

    // -----------------------------------------------------------------
    // Round-trip: translated blocks match interpreter-only execution.
    // -----------------------------------------------------------------

    fn reg() -> impl Strategy<Value = u32> {
        3u32..10
    }

    /// Straight-line instruction words safe for differential execution.
    fn alu_word() -> impl Strategy<Value = u32> {
        prop_oneof![
            // addi / addis
            (reg(), reg(), any::<u16>())
                .prop_map(|(d, a, i)| (14 << 26) | (d << 21) | (a << 16) | u32::from(i)),
            (reg(), reg(), any::<u16>())
                .prop_map(|(d, a, i)| (15 << 26) | (d << 21) | (a << 16) | u32::from(i)),
            // add / addc / adde / subf with random OE/Rc
            (reg(), reg(), reg(), any::<bool>(), any::<bool>(), 0u32..4).prop_map(
                |(d, a, b, oe, rc, which)| {
                    let xo = [266u32, 10, 138, 40][which as usize];
                    (31 << 26)
                        | (d << 21)
                        | (a << 16)
                        | (b << 11)
                        | ((oe as u32) << 10)
                        | (xo << 1)
                        | rc as u32
                }
            ),
            // ori / xori / andi.
            (reg(), reg(), any::<u16>(), 0u32..3).prop_map(|(s, a, i, which)| {
                let primary = [24u32, 26, 28][which as usize];
                (primary << 26) | (s << 21) | (a << 16) | u32::from(i)
            }),
            // rlwinm with random sh/mb/me and Rc
            (reg(), reg(), 0u32..32, 0u32..32, 0u32..32, any::<bool>()).prop_map(
                |(s, a, sh, mb, me, rc)| {
                    (21 << 26)
                        | (s << 21)
                        | (a << 16)
                        | (sh << 11)
                        | (mb << 6)
                        | (me << 1)
                        | rc as u32
                }
            ),
            // srawi
            (reg(), reg(), 0u32..32, any::<bool>()).prop_map(|(s, a, sh, rc)| {
                (31 << 26) | (s << 21) | (a << 16) | (sh << 11) | (824 << 1) | rc as u32
            }),
            // neg (with OE/Rc)
            (reg(), reg(), any::<bool>(), any::<bool>()).prop_map(|(d, a, oe, rc)| {
                (31 << 26) | (d << 21) | (a << 16) | ((oe as u32) << 10) | (104 << 1) | rc as u32
            }),
            // cmpwi into a random field
            (0u32..8, reg(), any::<u16>())
                .prop_map(|(crf, a, i)| (11 << 26) | (crf << 23) | (a << 16) | u32::from(i)),
            // stw / lwz through r2 (pinned to the data window)
            (reg(), 0u32..0x40).prop_map(|(s, off)| {
                (36 << 26) | (s << 21) | (2 << 16) | (off * 4)
            }),
            (reg(), 0u32..0x40).prop_map(|(d, off)| {
                (32 << 26) | (d << 21) | (2 << 16) | (off * 4)
            }),
        ]
    }

    proptest! {
        #[test]
        fn translated_blocks_match_interpreter(words in prop::collection::vec(alu_word(), 1..24)) {
            let mut program = words.clone();
            program.push(0x4E80_0020); // blr
            let (mut cpu_jit, mut mem_jit) = setup(&program);
            cpu_jit.gpr[2] = 0x1100; // data window base
            for r in 3usize..10 {
                cpu_jit.gpr[r] = 0x1234_5678u32.wrapping_mul(r as u32);
            }
            let mut cpu_ref = cpu_jit;
            let mut mem_ref = setup(&program).1;

            let mut jit = Jit::default();
            jit.step(&mut cpu_jit, &mut mem_jit).unwrap();
            interp_run(&mut cpu_ref, &mut mem_ref, STOP_PC);

            prop_assert_eq!(cpu_jit, cpu_ref);
            for addr in (0x1100u32..0x1200).step_by(4) {
                prop_assert_eq!(mem_jit.read32(addr), mem_ref.read32(addr));
            }
        }
    }
}
