/*!
compare.rs - Compare family handler (CMP, CMPI, CMPL, CMPLI).

Loads the operands and emits the signed or unsigned three-operand compare
into the named CR field. No deferred-CR interaction: compares write their
field directly.
*/

use crate::cpu::fields;
use crate::cpu::table::Mnemo;
use crate::jit::compile::CodegenContext;
use crate::jit::emit::Emitter;

pub(super) fn handle(ctx: &mut CodegenContext, em: &mut Emitter) -> bool {
    let op = ctx.opcode;
    let crf = fields::crfd(op);
    match ctx.ii.mnemo {
        Mnemo::Cmp => {
            em.load_t0_gpr(fields::ra(op));
            em.load_t1_gpr(fields::rb(op));
            em.compare_t0_t1(crf);
        }
        Mnemo::Cmpi => {
            em.load_t0_gpr(fields::ra(op));
            em.compare_t0_im(crf, fields::simm(op));
        }
        Mnemo::Cmpl => {
            em.load_t0_gpr(fields::ra(op));
            em.load_t1_gpr(fields::rb(op));
            em.compare_logical_t0_t1(crf);
        }
        Mnemo::Cmpli => {
            em.load_t0_gpr(fields::ra(op));
            em.compare_logical_t0_im(crf, fields::uimm(op));
        }
        _ => return false,
    }
    true
}
