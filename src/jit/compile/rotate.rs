/*!
rotate.rs - Rotate, shift, and count family handler.

Overview
========
`rlwinm` is where idiom recognition pays off; the recognized shapes and
the cells they fold to:

```text
MB==0, ME==31          rotlwi (nothing at all when SH==0)
MB==0, ME==31-SH       slwi
SH==0                  AND with the mask immediate
otherwise              general rotate-then-mask
```

`rlwimi` and `rlwnm` always take their general forms. The rotate masks
use the wrap-aware `mask32` rule. SLW/SRW/SRAW/SRAWI and CNTLZW share
the plain load/op/store pattern.
*/

use crate::cpu::fields;
use crate::cpu::fields::mask32;
use crate::cpu::table::Mnemo;
use crate::jit::compile::CodegenContext;
use crate::jit::emit::Emitter;

pub(super) fn handle(ctx: &mut CodegenContext, em: &mut Emitter) -> bool {
    let op = ctx.opcode;
    match ctx.ii.mnemo {
        Mnemo::Rlwimi => {
            let ra = fields::ra(op);
            let sh = fields::sh(op);
            let m = mask32(fields::mb(op), fields::me(op));
            em.load_t0_gpr(ra);
            em.load_t1_gpr(fields::rs(op));
            em.rlwimi_t0_t1(sh, m);
            em.store_t0_gpr(ra);
            ctx.rc_record(em);
        }
        Mnemo::Rlwinm => {
            let sh = fields::sh(op);
            let mb = fields::mb(op);
            let me = fields::me(op);
            em.load_t0_gpr(fields::rs(op));
            if mb == 0 && me == 31 {
                // rotlwi rA,rS,SH
                if sh > 0 {
                    em.rol_32_t0_im(sh);
                }
            } else if mb == 0 && me == 31 - sh {
                // slwi rA,rS,SH
                em.lsl_32_t0_im(sh);
            } else {
                let m = mask32(mb, me);
                if sh == 0 {
                    // andi rA,rS,MASK(MB,ME)
                    em.and_32_t0_im(m);
                } else {
                    em.rlwinm_t0_t1(sh, m);
                }
            }
            em.store_t0_gpr(fields::ra(op));
            ctx.rc_record(em);
        }
        Mnemo::Rlwnm => {
            let m = mask32(fields::mb(op), fields::me(op));
            em.load_t0_gpr(fields::rs(op));
            em.load_t1_gpr(fields::rb(op));
            em.rlwnm_t0_t1(m);
            em.store_t0_gpr(fields::ra(op));
            ctx.rc_record(em);
        }
        Mnemo::Slw => {
            em.load_t0_gpr(fields::rs(op));
            em.load_t1_gpr(fields::rb(op));
            em.slw_t0_t1();
            em.store_t0_gpr(fields::ra(op));
            ctx.rc_record(em);
        }
        Mnemo::Srw => {
            em.load_t0_gpr(fields::rs(op));
            em.load_t1_gpr(fields::rb(op));
            em.srw_t0_t1();
            em.store_t0_gpr(fields::ra(op));
            ctx.rc_record(em);
        }
        Mnemo::Sraw => {
            em.load_t0_gpr(fields::rs(op));
            em.load_t1_gpr(fields::rb(op));
            em.sraw_t0_t1();
            em.store_t0_gpr(fields::ra(op));
            ctx.rc_record(em);
        }
        Mnemo::Srawi => {
            em.load_t0_gpr(fields::rs(op));
            em.sraw_t0_im(fields::sh(op));
            em.store_t0_gpr(fields::ra(op));
            ctx.rc_record(em);
        }
        Mnemo::Cntlzw => {
            em.load_t0_gpr(fields::rs(op));
            em.cntlzw_32_t0();
            em.store_t0_gpr(fields::ra(op));
            ctx.rc_record(em);
        }
        _ => return false,
    }
    true
}
