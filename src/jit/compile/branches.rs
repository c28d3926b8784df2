/*!
branches.rs - Branch family handler (B, BC, BCCTR, BCLR).

Overview
========
Every branch terminates the block, so these handlers only decide where A0
points and whether LR is written:

- `b`: resolve the target statically, route it through A0, and emit an
  always-taken conditional cell.
- `bc`: resolve the target statically into A0, then share the
  conditional path.
- `bcctr` / `bclr`: load A0 from CTR / LR, then share the conditional
  path.

Decrement-CTR BO forms are not translated: they take the generic
interpreter path instead. That is a known pessimization kept on purpose
until the inline decrement is verified; the interpreter's `bc` handler
carries the full semantics meanwhile.
*/

use crate::cpu::fields;
use crate::cpu::fields::BO_ALWAYS;
use crate::cpu::table::Mnemo;
use crate::jit::compile::{CodegenContext, fallback};
use crate::jit::emit::Emitter;

pub(super) fn handle(ctx: &mut CodegenContext, em: &mut Emitter) -> bool {
    let op = ctx.opcode;
    match ctx.ii.mnemo {
        Mnemo::B => {
            // TODO: follow constant branches into the successor block.
            let npc = ctx.dpc.wrapping_add(4);
            if fields::lk(op) {
                em.store_im_lr(npc);
            }
            let base = if fields::aa(op) { 0 } else { ctx.dpc };
            let tpc = base.wrapping_add(fields::li(op) as u32) & !3;
            em.mov_32_a0_im(tpc);
            // BO encodes branch-always; the fallthrough PC is never used.
            em.bc_a0(BO_ALWAYS, 0, 0);
            true
        }
        Mnemo::Bc => {
            let base = if fields::aa(op) { 0 } else { ctx.dpc };
            em.mov_32_a0_im(base.wrapping_add(fields::bd(op) as u32) & !3);
            conditional(ctx, em)
        }
        Mnemo::Bcctr => {
            em.load_a0_ctr();
            conditional(ctx, em)
        }
        Mnemo::Bclr => {
            em.load_a0_lr();
            conditional(ctx, em)
        }
        _ => false,
    }
}

/// Shared conditional path: branch to A0 when the BO/BI condition holds,
/// fall through to the next instruction otherwise.
fn conditional(ctx: &mut CodegenContext, em: &mut Emitter) -> bool {
    let op = ctx.opcode;
    let bo = fields::bo(op);
    if fields::bo_decrements_ctr(bo) {
        fallback::emit_generic(ctx, em);
        return true;
    }

    let npc = ctx.dpc.wrapping_add(4);
    if fields::lk(op) {
        em.store_im_lr(npc);
    }
    em.bc_a0(bo, fields::bi(op), npc);
    true
}
