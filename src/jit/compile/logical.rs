/*!
logical.rs - Bitwise and condition-register-logical family handler.

Overview
========
Three shapes share this module:

- Register-register booleans (AND, ANDC, EQV, NAND, NOR, ORC, XOR) in the
  generic load/op/store pattern, with OR folding the `mr` idiom: when
  `rS == rB` the T1 load and the OR are omitted entirely.
- Immediate forms. `ori` recognizes the canonical idioms: `ori 0,0` is
  the architected NOP and emits nothing; a zero immediate with distinct
  registers is a plain move. `andi.`/`andis.` always record CR0 (the
  forms are inherently Rc=1).
- CR-bit booleans (CRAND..CRXOR): a deferred-CR commit first, then two
  bit loads, the boolean on the temporaries, and the bit store.
*/

use crate::cpu::fields;
use crate::cpu::table::Mnemo;
use crate::jit::compile::CodegenContext;
use crate::jit::emit::Emitter;

pub(super) fn handle(ctx: &mut CodegenContext, em: &mut Emitter) -> bool {
    use Mnemo::*;
    let op = ctx.opcode;
    match ctx.ii.mnemo {
        And | Andc | Eqv | Nand | Nor | Orc | Xor => {
            em.load_t0_gpr(fields::rs(op));
            em.load_t1_gpr(fields::rb(op));
            emit_bool(ctx.ii.mnemo, em);
            em.store_t0_gpr(fields::ra(op));
            ctx.rc_record(em);
        }
        Or => {
            let rs = fields::rs(op);
            let rb = fields::rb(op);
            em.load_t0_gpr(rs);
            if rs != rb {
                // Not the mr case.
                em.load_t1_gpr(rb);
                em.or_32_t0_t1();
            }
            em.store_t0_gpr(fields::ra(op));
            ctx.rc_record(em);
        }
        Ori => {
            let rs = fields::rs(op);
            let ra = fields::ra(op);
            let val = fields::uimm(op);
            if val == 0 {
                if ra != rs {
                    // Skip the NOP form, keep the register move.
                    em.load_t0_gpr(rs);
                    em.store_t0_gpr(ra);
                }
            } else {
                em.load_t0_gpr(rs);
                em.or_32_t0_im(val);
                em.store_t0_gpr(ra);
            }
        }
        Oris => {
            em.load_t0_gpr(fields::rs(op));
            em.or_32_t0_im(fields::uimm(op) << 16);
            em.store_t0_gpr(fields::ra(op));
        }
        Xori => {
            em.load_t0_gpr(fields::rs(op));
            em.xor_32_t0_im(fields::uimm(op));
            em.store_t0_gpr(fields::ra(op));
        }
        Xoris => {
            em.load_t0_gpr(fields::rs(op));
            em.xor_32_t0_im(fields::uimm(op) << 16);
            em.store_t0_gpr(fields::ra(op));
        }
        Andi => {
            em.load_t0_gpr(fields::rs(op));
            em.and_32_t0_im(fields::uimm(op));
            em.store_t0_gpr(fields::ra(op));
            ctx.record_cr0(em);
        }
        Andis => {
            em.load_t0_gpr(fields::rs(op));
            em.and_32_t0_im(fields::uimm(op) << 16);
            em.store_t0_gpr(fields::ra(op));
            ctx.record_cr0(em);
        }
        Crand | Crandc | Creqv | Crnand | Crnor | Cror | Crorc | Crxor => {
            // CR bits are about to be read individually.
            ctx.commit_cr(em);
            em.load_t0_crb(fields::crba(op));
            em.load_t1_crb(fields::crbb(op));
            match ctx.ii.mnemo {
                Crand => em.and_32_t0_t1(),
                Crandc => em.andc_32_t0_t1(),
                Creqv => em.eqv_32_t0_t1(),
                Crnand => em.nand_32_t0_t1(),
                Crnor => em.nor_32_t0_t1(),
                Cror => em.or_32_t0_t1(),
                Crorc => em.orc_32_t0_t1(),
                Crxor => em.xor_32_t0_t1(),
                _ => unreachable!(),
            }
            em.store_t0_crb(fields::crbd(op));
        }
        _ => return false,
    }
    true
}

fn emit_bool(mnemo: Mnemo, em: &mut Emitter) {
    match mnemo {
        Mnemo::And => em.and_32_t0_t1(),
        Mnemo::Andc => em.andc_32_t0_t1(),
        Mnemo::Eqv => em.eqv_32_t0_t1(),
        Mnemo::Nand => em.nand_32_t0_t1(),
        Mnemo::Nor => em.nor_32_t0_t1(),
        Mnemo::Orc => em.orc_32_t0_t1(),
        Mnemo::Xor => em.xor_32_t0_t1(),
        _ => unreachable!(),
    }
}
