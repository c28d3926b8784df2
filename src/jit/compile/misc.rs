/*!
misc.rs - Sign extension, negate, and CR/SPR move handler.

SPR policy
==========
XER, LR, and CTR always translate to their dedicated cells. Everything
else depends on the configured SPR model:

- Supervisor-extended: SDR1 reads a fixed magic value, PVR reads the
  process-wide constant injected at construction, all other SPRs read 0;
  writes to other SPRs emit nothing.
- Standalone: any other SPR routes to the illegal-instruction fallback.

`mfcr` commits deferred CR state first: it reads the whole register.
*/

use crate::cpu::fields;
use crate::cpu::table::Mnemo;
use crate::interp::{SPR_CTR, SPR_LR, SPR_XER};
use crate::jit::SprModel;
use crate::jit::compile::{CodegenContext, fallback};
use crate::jit::emit::Emitter;

const SPR_SDR1: u32 = 25;
const SPR_PVR: u32 = 287;

/// SDR1 read-back in the supervisor-extended model.
const SDR1_MAGIC: u32 = 0xDEAD_001F;

pub(super) fn handle(ctx: &mut CodegenContext, em: &mut Emitter) -> bool {
    let op = ctx.opcode;
    match ctx.ii.mnemo {
        Mnemo::Extsb | Mnemo::Extsh => {
            em.load_t0_gpr(fields::rs(op));
            if ctx.ii.mnemo == Mnemo::Extsb {
                em.se_8_32_t0();
            } else {
                em.se_16_32_t0();
            }
            em.store_t0_gpr(fields::ra(op));
            ctx.rc_record(em);
        }
        Mnemo::Neg => {
            em.load_t0_gpr(fields::ra(op));
            if fields::oe(op) {
                em.record_nego_t0();
            }
            em.neg_32_t0();
            ctx.rc_record(em);
            em.store_t0_gpr(fields::rd(op));
        }
        Mnemo::Mfcr => {
            ctx.commit_cr(em);
            em.load_t0_cr();
            em.store_t0_gpr(fields::rd(op));
        }
        Mnemo::Mfspr => {
            match fields::spr(op) {
                SPR_XER => em.load_t0_xer(),
                SPR_LR => em.load_t0_lr(),
                SPR_CTR => em.load_t0_ctr(),
                other => match ctx.config.spr {
                    SprModel::Supervisor { pvr } => match other {
                        SPR_SDR1 => em.mov_32_t0_im(SDR1_MAGIC),
                        SPR_PVR => em.mov_32_t0_im(pvr),
                        _ => em.mov_32_t0_im(0),
                    },
                    SprModel::Standalone => {
                        fallback::emit_illegal(ctx, em);
                        return true;
                    }
                },
            }
            em.store_t0_gpr(fields::rd(op));
        }
        Mnemo::Mtspr => {
            em.load_t0_gpr(fields::rs(op));
            match fields::spr(op) {
                SPR_XER => em.store_t0_xer(),
                SPR_LR => em.store_t0_lr(),
                SPR_CTR => em.store_t0_ctr(),
                _ => match ctx.config.spr {
                    // Writes to other SPRs are silently dropped.
                    SprModel::Supervisor { .. } => {}
                    SprModel::Standalone => {
                        fallback::emit_illegal(ctx, em);
                        return true;
                    }
                },
            }
        }
        _ => return false,
    }
    true
}
