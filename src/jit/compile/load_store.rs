/*!
load_store.rs - Load / store family handler.

Overview
========
All integer loads and stores decompose into four orthogonal flags:
size (1/2/4), signedness (half-word loads only), update, and indexed.
One emit path per direction handles every form:

- Effective-address base: 0 when `rA == 0` on a non-update form,
  `GPR[rA]` otherwise, placed in A0.
- Displacement: `GPR[rB]` in T1 for indexed forms, the sign-extended D
  field as an immediate otherwise.
- Update forms add the displacement into A0 afterwards and write it back
  to rA. Guest-illegal combinations (`rA == 0` or `rA == rD` with
  update) are not diagnosed; emitted code just does what the cells say.

Return contract
===============
`handle` returns true when the mnemonic belongs to this family and its
cells were emitted; false otherwise.
*/

use crate::cpu::fields;
use crate::cpu::table::Mnemo;
use crate::jit::compile::CodegenContext;
use crate::jit::emit::Emitter;

struct MemForm {
    size: u8,
    signed: bool,
    update: bool,
    indexed: bool,
}

impl MemForm {
    const fn new(size: u8, signed: bool, update: bool, indexed: bool) -> Self {
        Self {
            size,
            signed,
            update,
            indexed,
        }
    }
}

pub(super) fn handle(ctx: &mut CodegenContext, em: &mut Emitter) -> bool {
    use Mnemo::*;
    match ctx.ii.mnemo {
        Lbz => load(ctx, em, MemForm::new(1, false, false, false)),
        Lbzu => load(ctx, em, MemForm::new(1, false, true, false)),
        Lbzux => load(ctx, em, MemForm::new(1, false, true, true)),
        Lbzx => load(ctx, em, MemForm::new(1, false, false, true)),
        Lha => load(ctx, em, MemForm::new(2, true, false, false)),
        Lhau => load(ctx, em, MemForm::new(2, true, true, false)),
        Lhaux => load(ctx, em, MemForm::new(2, true, true, true)),
        Lhax => load(ctx, em, MemForm::new(2, true, false, true)),
        Lhz => load(ctx, em, MemForm::new(2, false, false, false)),
        Lhzu => load(ctx, em, MemForm::new(2, false, true, false)),
        Lhzux => load(ctx, em, MemForm::new(2, false, true, true)),
        Lhzx => load(ctx, em, MemForm::new(2, false, false, true)),
        Lwz => load(ctx, em, MemForm::new(4, false, false, false)),
        Lwzu => load(ctx, em, MemForm::new(4, false, true, false)),
        Lwzux => load(ctx, em, MemForm::new(4, false, true, true)),
        Lwzx => load(ctx, em, MemForm::new(4, false, false, true)),
        Stb => store(ctx, em, MemForm::new(1, false, false, false)),
        Stbu => store(ctx, em, MemForm::new(1, false, true, false)),
        Stbux => store(ctx, em, MemForm::new(1, false, true, true)),
        Stbx => store(ctx, em, MemForm::new(1, false, false, true)),
        Sth => store(ctx, em, MemForm::new(2, false, false, false)),
        Sthu => store(ctx, em, MemForm::new(2, false, true, false)),
        Sthux => store(ctx, em, MemForm::new(2, false, true, true)),
        Sthx => store(ctx, em, MemForm::new(2, false, false, true)),
        Stw => store(ctx, em, MemForm::new(4, false, false, false)),
        Stwu => store(ctx, em, MemForm::new(4, false, true, false)),
        Stwux => store(ctx, em, MemForm::new(4, false, true, true)),
        Stwx => store(ctx, em, MemForm::new(4, false, false, true)),
        _ => return false,
    }
    true
}

/// Shared base/index setup: A0 <- base, T1 <- rB for indexed forms.
fn ea_prologue(ctx: &CodegenContext, em: &mut Emitter, form: &MemForm) {
    let ra = fields::ra(ctx.opcode);
    if ra == 0 && !form.update {
        em.mov_32_a0_im(0);
    } else {
        em.load_a0_gpr(ra);
    }
    if form.indexed {
        em.load_t1_gpr(fields::rb(ctx.opcode));
    }
}

/// Update-form epilogue: fold the displacement into A0, write back rA.
fn ea_update(ctx: &CodegenContext, em: &mut Emitter, form: &MemForm) {
    if form.indexed {
        em.add_32_a0_t1();
    } else {
        em.add_32_a0_im(fields::simm(ctx.opcode) as u32);
    }
    em.store_a0_gpr(fields::ra(ctx.opcode));
}

fn load(ctx: &mut CodegenContext, em: &mut Emitter, form: MemForm) {
    ea_prologue(ctx, em, &form);
    let off = fields::simm(ctx.opcode);
    match (form.size, form.indexed, form.signed) {
        (1, false, _) => em.load_u8_t0_a0_im(off),
        (1, true, _) => em.load_u8_t0_a0_t1(),
        (2, false, false) => em.load_u16_t0_a0_im(off),
        (2, false, true) => em.load_s16_t0_a0_im(off),
        (2, true, false) => em.load_u16_t0_a0_t1(),
        (2, true, true) => em.load_s16_t0_a0_t1(),
        (4, false, _) => em.load_u32_t0_a0_im(off),
        (4, true, _) => em.load_u32_t0_a0_t1(),
        _ => unreachable!("load form {}", form.size),
    }
    em.store_t0_gpr(fields::rd(ctx.opcode));
    if form.update {
        ea_update(ctx, em, &form);
    }
}

fn store(ctx: &mut CodegenContext, em: &mut Emitter, form: MemForm) {
    ea_prologue(ctx, em, &form);
    em.load_t0_gpr(fields::rs(ctx.opcode));
    let off = fields::simm(ctx.opcode);
    match (form.size, form.indexed) {
        (1, false) => em.store_8_t0_a0_im(off),
        (1, true) => em.store_8_t0_a0_t1(),
        (2, false) => em.store_16_t0_a0_im(off),
        (2, true) => em.store_16_t0_a0_t1(),
        (4, false) => em.store_32_t0_a0_im(off),
        (4, true) => em.store_32_t0_a0_t1(),
        _ => unreachable!("store form {}", form.size),
    }
    if form.update {
        ea_update(ctx, em, &form);
    }
}
