/*!
fallback.rs - Generic interpreter fallback glue.

Overview
========
Any instruction no family handler claims is deferred to its descriptor's
interpreter handler at run time. The emitted shape is always:

1. Flush the accumulated `pc_offset` with an `inc_PC` cell (minus the
   current instruction: the handler expects `pc` at its own address and
   advances it itself), then clear the accumulator.
2. Commit deferred CR state, so the handler sees an architectural CR.
3. Call the handler with the raw opcode.

`emit_illegal` is the same shape with the illegal-instruction handler
substituted; the SPR policy uses it for unknown SPR numbers in the
standalone model.
*/

use crate::interp;
use crate::interp::InterpFn;
use crate::jit::compile::CodegenContext;
use crate::jit::emit::Emitter;

/// Defer the current instruction to its descriptor's handler.
pub(super) fn emit_generic(ctx: &mut CodegenContext, em: &mut Emitter) {
    emit_invoke(ctx, em, ctx.ii.exec);
}

/// Defer the current instruction to the illegal-instruction handler.
pub(super) fn emit_illegal(ctx: &mut CodegenContext, em: &mut Emitter) {
    emit_invoke(ctx, em, interp::illegal);
}

fn emit_invoke(ctx: &mut CodegenContext, em: &mut Emitter, exec: InterpFn) {
    // pc_offset counts through the current instruction; the handler wants
    // the PC *at* it.
    ctx.pc_offset -= 4;
    if ctx.pc_offset != 0 {
        em.inc_pc(ctx.pc_offset);
        ctx.pc_offset = 0;
    }
    ctx.commit_cr(em);
    em.invoke_cpu_im(exec, ctx.opcode);
}
