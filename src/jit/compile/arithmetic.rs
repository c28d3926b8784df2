/*!
arithmetic.rs - Integer arithmetic family handler.

Overview
========
Covers the register-register group (ADD/ADDC/ADDE/SUBF/SUBFC/SUBFE/
MULLW/DIVW/DIVWU) with its OE split, the extended group (ADDME/ADDZE/
SUBFME/SUBFZE), the carrying immediates (ADDIC/ADDIC./SUBFIC), the
`li`/`lis` folds of ADDI/ADDIS, and the multiplies without an OE form
(MULHW/MULHWU/MULLI).

The OE bit selects the overflow-recording emit variant; the Rc bit adds a
deferred CR0 record. Both are re-read from the opcode here because the
OE-capable descriptors are shared between the plain and `o` encodings.
*/

use crate::cpu::fields;
use crate::cpu::table::Mnemo;
use crate::jit::compile::CodegenContext;
use crate::jit::emit::Emitter;

pub(super) fn handle(ctx: &mut CodegenContext, em: &mut Emitter) -> bool {
    use Mnemo::*;
    let op = ctx.opcode;
    match ctx.ii.mnemo {
        Add | Addc | Adde | Subf | Subfc | Subfe | Mullw | Divw | Divwu => {
            em.load_t0_gpr(fields::ra(op));
            em.load_t1_gpr(fields::rb(op));
            if fields::oe(op) {
                match ctx.ii.mnemo {
                    Add => em.addo_t0_t1(),
                    Addc => em.addco_t0_t1(),
                    Adde => em.addeo_t0_t1(),
                    Subf => em.subfo_t0_t1(),
                    Subfc => em.subfco_t0_t1(),
                    Subfe => em.subfeo_t0_t1(),
                    Mullw => em.mullwo_t0_t1(),
                    Divw => em.divwo_t0_t1(),
                    Divwu => em.divwuo_t0_t1(),
                    _ => unreachable!(),
                }
            } else {
                match ctx.ii.mnemo {
                    Add => em.add_32_t0_t1(),
                    Addc => em.addc_t0_t1(),
                    Adde => em.adde_t0_t1(),
                    Subf => em.subf_t0_t1(),
                    Subfc => em.subfc_t0_t1(),
                    Subfe => em.subfe_t0_t1(),
                    Mullw => em.umul_32_t0_t1(),
                    Divw => em.divw_t0_t1(),
                    Divwu => em.divwu_t0_t1(),
                    _ => unreachable!(),
                }
            }
            ctx.rc_record(em);
            em.store_t0_gpr(fields::rd(op));
        }
        Addme | Addze | Subfme | Subfze => {
            em.load_t0_gpr(fields::ra(op));
            if fields::oe(op) {
                match ctx.ii.mnemo {
                    Addme => em.addmeo_t0(),
                    Addze => em.addzeo_t0(),
                    Subfme => em.subfmeo_t0(),
                    Subfze => em.subfzeo_t0(),
                    _ => unreachable!(),
                }
            } else {
                match ctx.ii.mnemo {
                    Addme => em.addme_t0(),
                    Addze => em.addze_t0(),
                    Subfme => em.subfme_t0(),
                    Subfze => em.subfze_t0(),
                    _ => unreachable!(),
                }
            }
            ctx.rc_record(em);
            em.store_t0_gpr(fields::rd(op));
        }
        Addic | AddicRc | Subfic => {
            em.load_t0_gpr(fields::ra(op));
            let val = fields::simm(op) as u32;
            match ctx.ii.mnemo {
                Addic => em.addc_t0_im(val),
                AddicRc => {
                    em.addc_t0_im(val);
                    ctx.record_cr0(em);
                }
                Subfic => em.subfc_t0_im(val),
                _ => unreachable!(),
            }
            em.store_t0_gpr(fields::rd(op));
        }
        Addi => {
            let ra = fields::ra(op);
            if ra == 0 {
                // li rD,value
                em.mov_32_t0_im(fields::simm(op) as u32);
            } else {
                em.load_t0_gpr(ra);
                em.add_32_t0_im(fields::simm(op) as u32);
            }
            em.store_t0_gpr(fields::rd(op));
        }
        Addis => {
            let ra = fields::ra(op);
            let val = (fields::simm(op) as u32) << 16;
            if ra == 0 {
                // lis rD,value
                em.mov_32_t0_im(val);
            } else {
                em.load_t0_gpr(ra);
                em.add_32_t0_im(val);
            }
            em.store_t0_gpr(fields::rd(op));
        }
        Mulhw | Mulhwu => {
            em.load_t0_gpr(fields::ra(op));
            em.load_t1_gpr(fields::rb(op));
            if ctx.ii.mnemo == Mulhw {
                em.mulhw_t0_t1();
            } else {
                em.mulhwu_t0_t1();
            }
            em.store_t0_gpr(fields::rd(op));
            ctx.rc_record(em);
        }
        Mulli => {
            em.load_t0_gpr(fields::ra(op));
            em.mulli_t0_im(fields::simm(op) as u32);
            em.store_t0_gpr(fields::rd(op));
        }
        _ => return false,
    }
    true
}
