/*!
compile - The block compiler: guest basic block -> host cell run.

Overview
========
`compile_block` drives one compilation:
1. Take a `start` handle from the emitter.
2. Fetch, decode, and dispatch each guest instruction to the family
   handlers below; every handler returns whether it claimed the
   instruction, and unclaimed ones go through the generic interpreter
   fallback.
3. Stop at the first END_BLOCK instruction, commit any deferred CR state,
   emit the dispatcher return, and register the block.

If the code buffer saturates mid-block the whole cache is invalidated,
the buffer reset, and compilation restarts from scratch at the same entry
PC; no partial block survives, so every registered `host_entry` points
into the current buffer lifetime.

Handler chain
=============
Family modules mirror the instruction families: `load_store`, `branches`,
`compare`, `logical` (bitwise + CR logical), `arithmetic`, `rotate`
(rotate/shift/count), `misc` (sign extension, negate, CR/SPR moves) and
the shared `fallback` glue. Handlers never fetch or advance the PC; the
loop here owns `dpc` and the `pc_offset` accumulation.

Deferred CR
===========
`CodegenContext::cr_dirty` tracks whether a `record_cr0` has been emitted
since the last commit; `commit_cr` lazily emits the commit cell before
any CR-bit-level read and at block termination.
*/

use log::{debug, trace};

use crate::cpu::fields;
use crate::cpu::table::{CFlow, InstrInfo, decode, illegal_descriptor};
use crate::jit::JitConfig;
use crate::jit::block::{BlockCache, BlockInfo};
use crate::jit::emit::Emitter;
use crate::mem::GuestMem;

pub(crate) mod arithmetic;
pub(crate) mod branches;
pub(crate) mod compare;
pub(crate) mod fallback;
pub(crate) mod load_store;
pub(crate) mod logical;
pub(crate) mod misc;
pub(crate) mod rotate;

/// Per-block scratch state shared by the family handlers.
pub(crate) struct CodegenContext<'a> {
    pub(crate) entry_pc: u32,
    /// Guest PC of the instruction being translated.
    pub(crate) dpc: u32,
    pub(crate) opcode: u32,
    pub(crate) ii: &'static InstrInfo,
    /// Emitted-but-uncommitted guest bytes since the last `inc_PC`.
    pub(crate) pc_offset: i32,
    /// A `record_cr0` cell is pending commit.
    pub(crate) cr_dirty: bool,
    pub(crate) config: &'a JitConfig,
}

impl CodegenContext<'_> {
    /// Emit a CR0 record and remember that a commit is owed.
    pub(crate) fn record_cr0(&mut self, em: &mut Emitter) {
        em.record_cr0_t0();
        self.cr_dirty = true;
    }

    /// Emit a CR0 record when the instruction's Rc bit is set.
    pub(crate) fn rc_record(&mut self, em: &mut Emitter) {
        if fields::rc(self.opcode) {
            self.record_cr0(em);
        }
    }

    /// Lazily emit the deferred-CR commit. Required before any CR
    /// bit-level read and before leaving the block.
    pub(crate) fn commit_cr(&mut self, em: &mut Emitter) {
        if self.cr_dirty {
            em.commit_cr();
            self.cr_dirty = false;
        }
    }
}

/// Compile the basic block starting at `entry_pc`. Always succeeds;
/// buffer overflow is handled internally by invalidate-and-restart.
pub(crate) fn compile_block(
    em: &mut Emitter,
    cache: &mut BlockCache,
    config: &JitConfig,
    mem: &dyn GuestMem,
    entry_pc: u32,
) -> BlockInfo {
    'restart: loop {
        let host_entry = em.start();
        let mut ctx = CodegenContext {
            entry_pc,
            dpc: entry_pc.wrapping_sub(4),
            opcode: 0,
            ii: illegal_descriptor(),
            pc_offset: 0,
            cr_dirty: false,
            config,
        };

        loop {
            ctx.dpc = ctx.dpc.wrapping_add(4);
            ctx.opcode = mem.read32(ctx.dpc);
            ctx.ii = decode(ctx.opcode);
            if let Some(hook) = config.record_step {
                em.invoke_cpu_im(hook, ctx.opcode);
            }
            ctx.pc_offset += 4;

            let handled = load_store::handle(&mut ctx, em)
                || arithmetic::handle(&mut ctx, em)
                || logical::handle(&mut ctx, em)
                || rotate::handle(&mut ctx, em)
                || compare::handle(&mut ctx, em)
                || branches::handle(&mut ctx, em)
                || misc::handle(&mut ctx, em);
            if !handled {
                trace!(
                    "fallback for {:?} at {:#010x}",
                    ctx.ii.mnemo,
                    ctx.dpc
                );
                fallback::emit_generic(&mut ctx, em);
            }

            if em.full() {
                debug!(
                    "code buffer full at {:#010x}; invalidating cache and restarting",
                    ctx.dpc
                );
                cache.invalidate_all();
                em.reset();
                continue 'restart;
            }

            if ctx.ii.cflow.contains(CFlow::END_BLOCK) {
                break;
            }
        }

        ctx.commit_cr(em);
        em.exec_return();
        em.end();

        let block = BlockInfo {
            entry_pc,
            end_pc: ctx.dpc,
            host_entry,
            host_size: em.code_ptr() - host_entry,
        };
        trace!(
            "block {:#010x}..={:#010x} -> {} cells at {}",
            block.entry_pc, block.end_pc, block.host_size, block.host_entry
        );
        cache.insert(block);
        return block;
    }
}

#[cfg(test)]
mod tests {
    use crate::cpu::state::CpuState;
    use crate::interp::Exception;
    use crate::jit::emit::HostOp;
    use crate::jit::{Jit, JitConfig};
    use crate::mem::GuestMem;
    use crate::test_utils::{STOP_PC, setup};

    #[test]
    fn mr_fold_omits_the_or() {
        // or r5,r4,r4 (mr) ; blr
        let (mut cpu, mut mem) = setup(&[0x7C85_2378, 0x4E80_0020]);
        cpu.gpr[4] = 0xDEAD_BEEF;
        let mut jit = Jit::default();
        let block = jit.compile_block(&mem, cpu.pc);
        let ops = jit.block_ops(&block);
        assert!(!ops.iter().any(|o| matches!(o, HostOp::OrT0T1)));
        assert!(!ops.iter().any(|o| matches!(o, HostOp::LoadT1Gpr(_))));
        jit.step(&mut cpu, &mut mem).unwrap();
        assert_eq!(cpu.gpr[5], 0xDEAD_BEEF);
        assert_eq!(cpu.gpr[4], 0xDEAD_BEEF);
    }

    #[test]
    fn ori_zero_to_same_register_emits_nothing() {
        // ori r0,r0,0 (the architected NOP) ; blr
        let (_, mem) = setup(&[0x6000_0000, 0x4E80_0020]);
        let mut jit = Jit::default();
        let block = jit.compile_block(&mem, 0x2000);
        // Only the blr cells and the return remain.
        assert_eq!(
            jit.block_ops(&block),
            [
                HostOp::LoadA0Lr,
                HostOp::BcA0 {
                    bo: crate::cpu::fields::BO_ALWAYS,
                    bi: 0,
                    npc: 0x2008
                },
                HostOp::ExecReturn
            ]
        );
    }

    #[test]
    fn ori_zero_to_other_register_is_a_plain_move() {
        // ori r4,r3,0 ; blr
        let (mut cpu, mut mem) = setup(&[0x6064_0000, 0x4E80_0020]);
        cpu.gpr[3] = 0xCAFE_F00D;
        let mut jit = Jit::default();
        let block = jit.compile_block(&mem, cpu.pc);
        let ops = jit.block_ops(&block);
        assert!(ops.contains(&HostOp::LoadT0Gpr(3)));
        assert!(ops.contains(&HostOp::StoreT0Gpr(4)));
        assert!(!ops.iter().any(|o| matches!(o, HostOp::OrT0Im(_))));
        jit.step(&mut cpu, &mut mem).unwrap();
        assert_eq!(cpu.gpr[4], 0xCAFE_F00D);
    }

    #[test]
    fn slwi_idiom_folds_to_a_shift() {
        // rlwinm r3,r4,4,0,27 (slwi r3,r4,4) ; blr
        let (mut cpu, mut mem) = setup(&[0x5483_2036, 0x4E80_0020]);
        cpu.gpr[4] = 0x0102_0304;
        let mut jit = Jit::default();
        let block = jit.compile_block(&mem, cpu.pc);
        let ops = jit.block_ops(&block);
        assert!(ops.contains(&HostOp::LslT0Im(4)));
        assert!(!ops.iter().any(|o| matches!(o, HostOp::Rlwinm { .. })));
        jit.step(&mut cpu, &mut mem).unwrap();
        assert_eq!(cpu.gpr[3], 0x1020_3040);
    }

    #[test]
    fn rotlwi_and_mask_idioms() {
        // rlwinm r3,r4,8,0,31 (rotlwi) ; rlwinm r5,r4,0,24,31 (andi 0xFF) ; blr
        let (mut cpu, mut mem) = setup(&[0x5483_403E, 0x5485_063E, 0x4E80_0020]);
        cpu.gpr[4] = 0x1234_5678;
        let mut jit = Jit::default();
        let block = jit.compile_block(&mem, cpu.pc);
        let ops = jit.block_ops(&block);
        assert!(ops.contains(&HostOp::RolT0Im(8)));
        assert!(ops.contains(&HostOp::AndT0Im(0xFF)));
        assert!(!ops.iter().any(|o| matches!(o, HostOp::Rlwinm { .. })));
        jit.step(&mut cpu, &mut mem).unwrap();
        assert_eq!(cpu.gpr[3], 0x3456_7812);
        assert_eq!(cpu.gpr[5], 0x78);
    }

    #[test]
    fn rotlwi_by_zero_is_a_pure_move() {
        // rlwinm r3,r4,0,0,31 ; blr
        let (_, mem) = setup(&[0x5483_003E, 0x4E80_0020]);
        let mut jit = Jit::default();
        let block = jit.compile_block(&mem, 0x2000);
        let ops = jit.block_ops(&block);
        assert_eq!(ops[0], HostOp::LoadT0Gpr(4));
        assert_eq!(ops[1], HostOp::StoreT0Gpr(3));
    }

    #[test]
    fn ra0_load_uses_zero_base_in_translated_code() {
        // lwz r3,0x1010(0) ; blr
        let (mut cpu, mut mem) = setup(&[0x8060_1010, 0x4E80_0020]);
        cpu.gpr[0] = 0xDEAD_0000; // must be ignored
        mem.write32(0x1010, 0xCAFE_0000);
        let mut jit = Jit::default();
        let block = jit.compile_block(&mem, cpu.pc);
        assert!(jit.block_ops(&block).contains(&HostOp::MovA0Im(0)));
        jit.step(&mut cpu, &mut mem).unwrap();
        assert_eq!(cpu.gpr[3], 0xCAFE_0000);
    }

    #[test]
    fn rlwimi_inserts_under_the_mask() {
        // rlwimi r3,r4,8,16,23 ; blr
        let (mut cpu, mut mem) = setup(&[0x5083_442E, 0x4E80_0020]);
        cpu.gpr[3] = 0xAAAA_AAAA;
        cpu.gpr[4] = 0x1122_3344;
        let mut jit = Jit::default();
        jit.step(&mut cpu, &mut mem).unwrap();
        assert_eq!(cpu.gpr[3], 0xAAAA_44AA);
    }

    #[test]
    fn rlwnm_rotates_by_register_amount() {
        // rlwnm r3,r4,r5,0,31 ; blr
        let (mut cpu, mut mem) = setup(&[0x5C83_283E, 0x4E80_0020]);
        cpu.gpr[4] = 0x8000_0001;
        cpu.gpr[5] = 1;
        let mut jit = Jit::default();
        jit.step(&mut cpu, &mut mem).unwrap();
        assert_eq!(cpu.gpr[3], 3);
    }

    #[test]
    fn fallback_flushes_accumulated_pc_offset_once() {
        // lis r3,0xF000 ; mtcrf 0x80,r3 (interpreter path) ; blr
        let (mut cpu, mut mem) = setup(&[0x3C60_F000, 0x7C68_0120, 0x4E80_0020]);
        let mut jit = Jit::default();
        let block = jit.compile_block(&mem, cpu.pc);
        let ops = jit.block_ops(&block);
        let flushes: Vec<_> = ops
            .iter()
            .filter(|o| matches!(o, HostOp::IncPc(_)))
            .collect();
        assert_eq!(flushes, [&HostOp::IncPc(4)]);
        jit.step(&mut cpu, &mut mem).unwrap();
        assert_eq!(cpu.cr >> 28, 0xF);
        assert_eq!(cpu.pc, STOP_PC);
    }

    #[test]
    fn record_step_hook_precedes_every_instruction() {
        fn hook(_: &mut CpuState, _: &mut dyn GuestMem, _: u32) -> Result<(), Exception> {
            Ok(())
        }
        let (_, mem) = setup(&[0x3860_002A, 0x4E80_0020]);
        let mut jit = Jit::new(JitConfig {
            record_step: Some(hook),
            ..JitConfig::default()
        });
        let block = jit.compile_block(&mem, 0x2000);
        let hooks = jit
            .block_ops(&block)
            .iter()
            .filter(|o| matches!(o, HostOp::InvokeCpu { .. }))
            .count();
        assert_eq!(hooks, 2);
    }
}
