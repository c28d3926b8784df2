/*!
emit.rs - Emitter façade and the threaded-code block runtime.

Overview
========
The block compiler drives a fixed vocabulary of typed emit operations; this
module is their sink. Each call appends one `HostOp` cell to a bounded,
contiguous code buffer. A compiled block is a run of cells starting at its
`host_entry` offset and ending at `ExecReturn`; the `run` executor walks
the cells against `CpuState`/`GuestMem`.

The abstract temporaries `T0`, `T1` and the address temporary `A0` are
locals of the executor. The translator only names them; nothing outside
this module decides how they are realized.

Deferred CR0
============
`record_cr0_t0` does not touch CR at run time: it latches the result value
together with the summary-overflow bit sampled at that moment. `commit_cr`
folds the latch into CR0. A compare written to CR0 supersedes an
uncommitted latch, and the conditional-branch op folds the latch before
testing, matching the ordering contract the compiler maintains.
*/

use crate::cpu::alu;
use crate::cpu::fields;
use crate::cpu::state::CpuState;
use crate::interp::{Exception, InterpFn};
use crate::mem::GuestMem;

/// Displacement source of a memory cell: immediate offset or `T1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Idx {
    Im(i32),
    T1,
}

/// One host cell. Variant names mirror the emit-operation vocabulary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum HostOp {
    // Register moves
    LoadT0Gpr(u32),
    LoadT1Gpr(u32),
    StoreT0Gpr(u32),
    LoadA0Gpr(u32),
    StoreA0Gpr(u32),
    MovT0Im(u32),
    MovA0Im(u32),
    // Plain adds (address arithmetic included)
    AddT0T1,
    AddT0Im(u32),
    AddA0T1,
    AddA0Im(u32),
    // Carrying / extended arithmetic
    AddcT0T1,
    AddeT0T1,
    SubfT0T1,
    SubfcT0T1,
    SubfeT0T1,
    AddmeT0,
    AddzeT0,
    SubfmeT0,
    SubfzeT0,
    AddcT0Im(u32),
    SubfcT0Im(u32),
    // Overflow-recording variants
    AddoT0T1,
    AddcoT0T1,
    AddeoT0T1,
    SubfoT0T1,
    SubfcoT0T1,
    SubfeoT0T1,
    AddmeoT0,
    AddzeoT0,
    SubfmeoT0,
    SubfzeoT0,
    MullwoT0T1,
    DivwoT0T1,
    DivwuoT0T1,
    // Multiply / divide
    UmulT0T1,
    MulhwT0T1,
    MulhwuT0T1,
    MulliT0Im(u32),
    DivwT0T1,
    DivwuT0T1,
    // Negate
    NegT0,
    RecordNegoT0,
    // Bitwise
    AndT0T1,
    AndcT0T1,
    EqvT0T1,
    NandT0T1,
    NorT0T1,
    OrT0T1,
    OrcT0T1,
    XorT0T1,
    AndT0Im(u32),
    OrT0Im(u32),
    XorT0Im(u32),
    // Shifts and rotates
    SlwT0T1,
    SrwT0T1,
    SrawT0T1,
    SrawT0Im(u32),
    LslT0Im(u32),
    RolT0Im(u32),
    Rlwimi { sh: u32, mask: u32 },
    Rlwinm { sh: u32, mask: u32 },
    Rlwnm { mask: u32 },
    CntlzwT0,
    Se8T0,
    Se16T0,
    // Memory
    Load { width: u8, signed: bool, idx: Idx },
    Store { width: u8, idx: Idx },
    // Compares and CR plumbing
    CmpT0T1(u32),
    CmpT0Im(u32, i32),
    CmplT0T1(u32),
    CmplT0Im(u32, u32),
    LoadT0Crb(u32),
    LoadT1Crb(u32),
    StoreT0Crb(u32),
    LoadT0Cr,
    CommitCr,
    RecordCr0T0,
    // SPR plumbing
    LoadT0Xer,
    StoreT0Xer,
    LoadT0Lr,
    StoreT0Lr,
    LoadT0Ctr,
    StoreT0Ctr,
    LoadA0Lr,
    LoadA0Ctr,
    StoreImLr(u32),
    // Control
    BcA0 { bo: u32, bi: u32, npc: u32 },
    IncPc(i32),
    InvokeCpu { exec: InterpFn, opcode: u32 },
    ExecReturn,
}

/// Typed emit sink over the bounded code buffer.
pub(crate) struct Emitter {
    buf: Vec<HostOp>,
    capacity: usize,
}

impl Emitter {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity.min(4096)),
            capacity,
        }
    }

    #[inline]
    fn push(&mut self, op: HostOp) {
        self.buf.push(op);
    }

    // -----------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------

    /// Begin a block; the returned offset is its host entry point.
    pub(crate) fn start(&mut self) -> usize {
        self.buf.len()
    }

    /// Seal the current block. The cell stream is complete once the
    /// return op is in; nothing to patch in this backend.
    pub(crate) fn end(&mut self) {
        debug_assert!(matches!(self.buf.last(), Some(HostOp::ExecReturn)));
    }

    /// Current append position.
    pub(crate) fn code_ptr(&self) -> usize {
        self.buf.len()
    }

    /// Saturation check, polled by the compiler after every guest
    /// instruction (the buffer itself never rejects a push).
    pub(crate) fn full(&self) -> bool {
        self.buf.len() >= self.capacity
    }

    /// Drop all emitted code. Only valid together with a cache-wide block
    /// invalidation; see the overflow path in the compiler.
    pub(crate) fn reset(&mut self) {
        self.buf.clear();
    }

    #[cfg(test)]
    pub(crate) fn ops(&self) -> &[HostOp] {
        &self.buf
    }

    pub(crate) fn inc_pc(&mut self, bytes: i32) {
        self.push(HostOp::IncPc(bytes));
    }

    pub(crate) fn exec_return(&mut self) {
        self.push(HostOp::ExecReturn);
    }

    // -----------------------------------------------------------------
    // Register moves
    // -----------------------------------------------------------------

    pub(crate) fn load_t0_gpr(&mut self, r: u32) {
        self.push(HostOp::LoadT0Gpr(r));
    }

    pub(crate) fn load_t1_gpr(&mut self, r: u32) {
        self.push(HostOp::LoadT1Gpr(r));
    }

    pub(crate) fn store_t0_gpr(&mut self, r: u32) {
        self.push(HostOp::StoreT0Gpr(r));
    }

    pub(crate) fn load_a0_gpr(&mut self, r: u32) {
        self.push(HostOp::LoadA0Gpr(r));
    }

    pub(crate) fn store_a0_gpr(&mut self, r: u32) {
        self.push(HostOp::StoreA0Gpr(r));
    }

    pub(crate) fn mov_32_t0_im(&mut self, v: u32) {
        self.push(HostOp::MovT0Im(v));
    }

    pub(crate) fn mov_32_a0_im(&mut self, v: u32) {
        self.push(HostOp::MovA0Im(v));
    }

    // -----------------------------------------------------------------
    // ALU on temporaries
    // -----------------------------------------------------------------

    pub(crate) fn add_32_t0_t1(&mut self) {
        self.push(HostOp::AddT0T1);
    }

    pub(crate) fn add_32_t0_im(&mut self, v: u32) {
        self.push(HostOp::AddT0Im(v));
    }

    pub(crate) fn add_32_a0_t1(&mut self) {
        self.push(HostOp::AddA0T1);
    }

    pub(crate) fn add_32_a0_im(&mut self, v: u32) {
        self.push(HostOp::AddA0Im(v));
    }

    pub(crate) fn addc_t0_t1(&mut self) {
        self.push(HostOp::AddcT0T1);
    }

    pub(crate) fn adde_t0_t1(&mut self) {
        self.push(HostOp::AddeT0T1);
    }

    pub(crate) fn subf_t0_t1(&mut self) {
        self.push(HostOp::SubfT0T1);
    }

    pub(crate) fn subfc_t0_t1(&mut self) {
        self.push(HostOp::SubfcT0T1);
    }

    pub(crate) fn subfe_t0_t1(&mut self) {
        self.push(HostOp::SubfeT0T1);
    }

    pub(crate) fn addme_t0(&mut self) {
        self.push(HostOp::AddmeT0);
    }

    pub(crate) fn addze_t0(&mut self) {
        self.push(HostOp::AddzeT0);
    }

    pub(crate) fn subfme_t0(&mut self) {
        self.push(HostOp::SubfmeT0);
    }

    pub(crate) fn subfze_t0(&mut self) {
        self.push(HostOp::SubfzeT0);
    }

    pub(crate) fn addc_t0_im(&mut self, v: u32) {
        self.push(HostOp::AddcT0Im(v));
    }

    pub(crate) fn subfc_t0_im(&mut self, v: u32) {
        self.push(HostOp::SubfcT0Im(v));
    }

    pub(crate) fn addo_t0_t1(&mut self) {
        self.push(HostOp::AddoT0T1);
    }

    pub(crate) fn addco_t0_t1(&mut self) {
        self.push(HostOp::AddcoT0T1);
    }

    pub(crate) fn addeo_t0_t1(&mut self) {
        self.push(HostOp::AddeoT0T1);
    }

    pub(crate) fn subfo_t0_t1(&mut self) {
        self.push(HostOp::SubfoT0T1);
    }

    pub(crate) fn subfco_t0_t1(&mut self) {
        self.push(HostOp::SubfcoT0T1);
    }

    pub(crate) fn subfeo_t0_t1(&mut self) {
        self.push(HostOp::SubfeoT0T1);
    }

    pub(crate) fn addmeo_t0(&mut self) {
        self.push(HostOp::AddmeoT0);
    }

    pub(crate) fn addzeo_t0(&mut self) {
        self.push(HostOp::AddzeoT0);
    }

    pub(crate) fn subfmeo_t0(&mut self) {
        self.push(HostOp::SubfmeoT0);
    }

    pub(crate) fn subfzeo_t0(&mut self) {
        self.push(HostOp::SubfzeoT0);
    }

    pub(crate) fn umul_32_t0_t1(&mut self) {
        self.push(HostOp::UmulT0T1);
    }

    pub(crate) fn mulhw_t0_t1(&mut self) {
        self.push(HostOp::MulhwT0T1);
    }

    pub(crate) fn mulhwu_t0_t1(&mut self) {
        self.push(HostOp::MulhwuT0T1);
    }

    pub(crate) fn mullwo_t0_t1(&mut self) {
        self.push(HostOp::MullwoT0T1);
    }

    pub(crate) fn mulli_t0_im(&mut self, v: u32) {
        self.push(HostOp::MulliT0Im(v));
    }

    pub(crate) fn divw_t0_t1(&mut self) {
        self.push(HostOp::DivwT0T1);
    }

    pub(crate) fn divwu_t0_t1(&mut self) {
        self.push(HostOp::DivwuT0T1);
    }

    pub(crate) fn divwo_t0_t1(&mut self) {
        self.push(HostOp::DivwoT0T1);
    }

    pub(crate) fn divwuo_t0_t1(&mut self) {
        self.push(HostOp::DivwuoT0T1);
    }

    pub(crate) fn neg_32_t0(&mut self) {
        self.push(HostOp::NegT0);
    }

    pub(crate) fn record_nego_t0(&mut self) {
        self.push(HostOp::RecordNegoT0);
    }

    // -----------------------------------------------------------------
    // Bitwise
    // -----------------------------------------------------------------

    pub(crate) fn and_32_t0_t1(&mut self) {
        self.push(HostOp::AndT0T1);
    }

    pub(crate) fn andc_32_t0_t1(&mut self) {
        self.push(HostOp::AndcT0T1);
    }

    pub(crate) fn eqv_32_t0_t1(&mut self) {
        self.push(HostOp::EqvT0T1);
    }

    pub(crate) fn nand_32_t0_t1(&mut self) {
        self.push(HostOp::NandT0T1);
    }

    pub(crate) fn nor_32_t0_t1(&mut self) {
        self.push(HostOp::NorT0T1);
    }

    pub(crate) fn or_32_t0_t1(&mut self) {
        self.push(HostOp::OrT0T1);
    }

    pub(crate) fn orc_32_t0_t1(&mut self) {
        self.push(HostOp::OrcT0T1);
    }

    pub(crate) fn xor_32_t0_t1(&mut self) {
        self.push(HostOp::XorT0T1);
    }

    pub(crate) fn and_32_t0_im(&mut self, v: u32) {
        self.push(HostOp::AndT0Im(v));
    }

    pub(crate) fn or_32_t0_im(&mut self, v: u32) {
        self.push(HostOp::OrT0Im(v));
    }

    pub(crate) fn xor_32_t0_im(&mut self, v: u32) {
        self.push(HostOp::XorT0Im(v));
    }

    // -----------------------------------------------------------------
    // Shifts / rotates
    // -----------------------------------------------------------------

    pub(crate) fn slw_t0_t1(&mut self) {
        self.push(HostOp::SlwT0T1);
    }

    pub(crate) fn srw_t0_t1(&mut self) {
        self.push(HostOp::SrwT0T1);
    }

    pub(crate) fn sraw_t0_t1(&mut self) {
        self.push(HostOp::SrawT0T1);
    }

    pub(crate) fn sraw_t0_im(&mut self, sh: u32) {
        self.push(HostOp::SrawT0Im(sh));
    }

    pub(crate) fn lsl_32_t0_im(&mut self, sh: u32) {
        self.push(HostOp::LslT0Im(sh));
    }

    pub(crate) fn rol_32_t0_im(&mut self, sh: u32) {
        self.push(HostOp::RolT0Im(sh));
    }

    pub(crate) fn rlwimi_t0_t1(&mut self, sh: u32, mask: u32) {
        self.push(HostOp::Rlwimi { sh, mask });
    }

    pub(crate) fn rlwinm_t0_t1(&mut self, sh: u32, mask: u32) {
        self.push(HostOp::Rlwinm { sh, mask });
    }

    pub(crate) fn rlwnm_t0_t1(&mut self, mask: u32) {
        self.push(HostOp::Rlwnm { mask });
    }

    pub(crate) fn cntlzw_32_t0(&mut self) {
        self.push(HostOp::CntlzwT0);
    }

    pub(crate) fn se_8_32_t0(&mut self) {
        self.push(HostOp::Se8T0);
    }

    pub(crate) fn se_16_32_t0(&mut self) {
        self.push(HostOp::Se16T0);
    }

    // -----------------------------------------------------------------
    // Memory
    // -----------------------------------------------------------------

    pub(crate) fn load_u8_t0_a0_im(&mut self, off: i32) {
        self.push(HostOp::Load { width: 1, signed: false, idx: Idx::Im(off) });
    }

    pub(crate) fn load_u8_t0_a0_t1(&mut self) {
        self.push(HostOp::Load { width: 1, signed: false, idx: Idx::T1 });
    }

    pub(crate) fn load_u16_t0_a0_im(&mut self, off: i32) {
        self.push(HostOp::Load { width: 2, signed: false, idx: Idx::Im(off) });
    }

    pub(crate) fn load_u16_t0_a0_t1(&mut self) {
        self.push(HostOp::Load { width: 2, signed: false, idx: Idx::T1 });
    }

    pub(crate) fn load_s16_t0_a0_im(&mut self, off: i32) {
        self.push(HostOp::Load { width: 2, signed: true, idx: Idx::Im(off) });
    }

    pub(crate) fn load_s16_t0_a0_t1(&mut self) {
        self.push(HostOp::Load { width: 2, signed: true, idx: Idx::T1 });
    }

    pub(crate) fn load_u32_t0_a0_im(&mut self, off: i32) {
        self.push(HostOp::Load { width: 4, signed: false, idx: Idx::Im(off) });
    }

    pub(crate) fn load_u32_t0_a0_t1(&mut self) {
        self.push(HostOp::Load { width: 4, signed: false, idx: Idx::T1 });
    }

    pub(crate) fn store_8_t0_a0_im(&mut self, off: i32) {
        self.push(HostOp::Store { width: 1, idx: Idx::Im(off) });
    }

    pub(crate) fn store_8_t0_a0_t1(&mut self) {
        self.push(HostOp::Store { width: 1, idx: Idx::T1 });
    }

    pub(crate) fn store_16_t0_a0_im(&mut self, off: i32) {
        self.push(HostOp::Store { width: 2, idx: Idx::Im(off) });
    }

    pub(crate) fn store_16_t0_a0_t1(&mut self) {
        self.push(HostOp::Store { width: 2, idx: Idx::T1 });
    }

    pub(crate) fn store_32_t0_a0_im(&mut self, off: i32) {
        self.push(HostOp::Store { width: 4, idx: Idx::Im(off) });
    }

    pub(crate) fn store_32_t0_a0_t1(&mut self) {
        self.push(HostOp::Store { width: 4, idx: Idx::T1 });
    }

    // -----------------------------------------------------------------
    // Compares / CR / SPR
    // -----------------------------------------------------------------

    pub(crate) fn compare_t0_t1(&mut self, crf: u32) {
        self.push(HostOp::CmpT0T1(crf));
    }

    pub(crate) fn compare_t0_im(&mut self, crf: u32, v: i32) {
        self.push(HostOp::CmpT0Im(crf, v));
    }

    pub(crate) fn compare_logical_t0_t1(&mut self, crf: u32) {
        self.push(HostOp::CmplT0T1(crf));
    }

    pub(crate) fn compare_logical_t0_im(&mut self, crf: u32, v: u32) {
        self.push(HostOp::CmplT0Im(crf, v));
    }

    pub(crate) fn load_t0_crb(&mut self, i: u32) {
        self.push(HostOp::LoadT0Crb(i));
    }

    pub(crate) fn load_t1_crb(&mut self, i: u32) {
        self.push(HostOp::LoadT1Crb(i));
    }

    pub(crate) fn store_t0_crb(&mut self, i: u32) {
        self.push(HostOp::StoreT0Crb(i));
    }

    pub(crate) fn load_t0_cr(&mut self) {
        self.push(HostOp::LoadT0Cr);
    }

    pub(crate) fn commit_cr(&mut self) {
        self.push(HostOp::CommitCr);
    }

    pub(crate) fn record_cr0_t0(&mut self) {
        self.push(HostOp::RecordCr0T0);
    }

    pub(crate) fn load_t0_xer(&mut self) {
        self.push(HostOp::LoadT0Xer);
    }

    pub(crate) fn store_t0_xer(&mut self) {
        self.push(HostOp::StoreT0Xer);
    }

    pub(crate) fn load_t0_lr(&mut self) {
        self.push(HostOp::LoadT0Lr);
    }

    pub(crate) fn store_t0_lr(&mut self) {
        self.push(HostOp::StoreT0Lr);
    }

    pub(crate) fn load_t0_ctr(&mut self) {
        self.push(HostOp::LoadT0Ctr);
    }

    pub(crate) fn store_t0_ctr(&mut self) {
        self.push(HostOp::StoreT0Ctr);
    }

    pub(crate) fn load_a0_lr(&mut self) {
        self.push(HostOp::LoadA0Lr);
    }

    pub(crate) fn load_a0_ctr(&mut self) {
        self.push(HostOp::LoadA0Ctr);
    }

    pub(crate) fn store_im_lr(&mut self, v: u32) {
        self.push(HostOp::StoreImLr(v));
    }

    // -----------------------------------------------------------------
    // Control
    // -----------------------------------------------------------------

    pub(crate) fn bc_a0(&mut self, bo: u32, bi: u32, npc: u32) {
        self.push(HostOp::BcA0 { bo, bi, npc });
    }

    pub(crate) fn invoke_cpu_im(&mut self, exec: InterpFn, opcode: u32) {
        self.push(HostOp::InvokeCpu { exec, opcode });
    }

    // -----------------------------------------------------------------
    // Execution
    // -----------------------------------------------------------------

    /// Execute the cell run starting at `entry` until its return op.
    pub(crate) fn run(
        &self,
        entry: usize,
        cpu: &mut CpuState,
        mem: &mut dyn GuestMem,
    ) -> Result<(), Exception> {
        let mut t0: u32 = 0;
        let mut t1: u32 = 0;
        let mut a0: u32 = 0;
        // Uncommitted CR0 record: result value + SO sampled at record time.
        let mut pending: Option<(u32, bool)> = None;

        let commit = |cpu: &mut CpuState, pending: &mut Option<(u32, bool)>| {
            if let Some((value, so)) = pending.take() {
                cpu.record_cr0(value, so);
            }
        };

        for op in &self.buf[entry..] {
            match *op {
                HostOp::LoadT0Gpr(r) => t0 = cpu.gpr[r as usize],
                HostOp::LoadT1Gpr(r) => t1 = cpu.gpr[r as usize],
                HostOp::StoreT0Gpr(r) => cpu.gpr[r as usize] = t0,
                HostOp::LoadA0Gpr(r) => a0 = cpu.gpr[r as usize],
                HostOp::StoreA0Gpr(r) => cpu.gpr[r as usize] = a0,
                HostOp::MovT0Im(v) => t0 = v,
                HostOp::MovA0Im(v) => a0 = v,

                HostOp::AddT0T1 => t0 = t0.wrapping_add(t1),
                HostOp::AddT0Im(v) => t0 = t0.wrapping_add(v),
                HostOp::AddA0T1 => a0 = a0.wrapping_add(t1),
                HostOp::AddA0Im(v) => a0 = a0.wrapping_add(v),

                HostOp::AddcT0T1 => {
                    let (res, ca, _) = alu::addc(t0, t1);
                    cpu.set_xer_ca(ca);
                    t0 = res;
                }
                HostOp::AddeT0T1 => {
                    let (res, ca, _) = alu::adde(t0, t1, cpu.xer_ca());
                    cpu.set_xer_ca(ca);
                    t0 = res;
                }
                HostOp::SubfT0T1 => t0 = alu::subf(t0, t1).0,
                HostOp::SubfcT0T1 => {
                    let (res, ca, _) = alu::subfc(t0, t1);
                    cpu.set_xer_ca(ca);
                    t0 = res;
                }
                HostOp::SubfeT0T1 => {
                    let (res, ca, _) = alu::subfe(t0, t1, cpu.xer_ca());
                    cpu.set_xer_ca(ca);
                    t0 = res;
                }
                HostOp::AddmeT0 => {
                    let (res, ca, _) = alu::addme(t0, cpu.xer_ca());
                    cpu.set_xer_ca(ca);
                    t0 = res;
                }
                HostOp::AddzeT0 => {
                    let (res, ca, _) = alu::addze(t0, cpu.xer_ca());
                    cpu.set_xer_ca(ca);
                    t0 = res;
                }
                HostOp::SubfmeT0 => {
                    let (res, ca, _) = alu::subfme(t0, cpu.xer_ca());
                    cpu.set_xer_ca(ca);
                    t0 = res;
                }
                HostOp::SubfzeT0 => {
                    let (res, ca, _) = alu::subfze(t0, cpu.xer_ca());
                    cpu.set_xer_ca(ca);
                    t0 = res;
                }
                HostOp::AddcT0Im(v) => {
                    let (res, ca, _) = alu::addc(t0, v);
                    cpu.set_xer_ca(ca);
                    t0 = res;
                }
                HostOp::SubfcT0Im(v) => {
                    let (res, ca, _) = alu::subfc(t0, v);
                    cpu.set_xer_ca(ca);
                    t0 = res;
                }

                HostOp::AddoT0T1 => {
                    let (res, _, ov) = alu::addc(t0, t1);
                    cpu.record_ov(ov);
                    t0 = res;
                }
                HostOp::AddcoT0T1 => {
                    let (res, ca, ov) = alu::addc(t0, t1);
                    cpu.set_xer_ca(ca);
                    cpu.record_ov(ov);
                    t0 = res;
                }
                HostOp::AddeoT0T1 => {
                    let (res, ca, ov) = alu::adde(t0, t1, cpu.xer_ca());
                    cpu.set_xer_ca(ca);
                    cpu.record_ov(ov);
                    t0 = res;
                }
                HostOp::SubfoT0T1 => {
                    let (res, ov) = alu::subf(t0, t1);
                    cpu.record_ov(ov);
                    t0 = res;
                }
                HostOp::SubfcoT0T1 => {
                    let (res, ca, ov) = alu::subfc(t0, t1);
                    cpu.set_xer_ca(ca);
                    cpu.record_ov(ov);
                    t0 = res;
                }
                HostOp::SubfeoT0T1 => {
                    let (res, ca, ov) = alu::subfe(t0, t1, cpu.xer_ca());
                    cpu.set_xer_ca(ca);
                    cpu.record_ov(ov);
                    t0 = res;
                }
                HostOp::AddmeoT0 => {
                    let (res, ca, ov) = alu::addme(t0, cpu.xer_ca());
                    cpu.set_xer_ca(ca);
                    cpu.record_ov(ov);
                    t0 = res;
                }
                HostOp::AddzeoT0 => {
                    let (res, ca, ov) = alu::addze(t0, cpu.xer_ca());
                    cpu.set_xer_ca(ca);
                    cpu.record_ov(ov);
                    t0 = res;
                }
                HostOp::SubfmeoT0 => {
                    let (res, ca, ov) = alu::subfme(t0, cpu.xer_ca());
                    cpu.set_xer_ca(ca);
                    cpu.record_ov(ov);
                    t0 = res;
                }
                HostOp::SubfzeoT0 => {
                    let (res, ca, ov) = alu::subfze(t0, cpu.xer_ca());
                    cpu.set_xer_ca(ca);
                    cpu.record_ov(ov);
                    t0 = res;
                }
                HostOp::MullwoT0T1 => {
                    let (res, ov) = alu::mullw(t0, t1);
                    cpu.record_ov(ov);
                    t0 = res;
                }
                HostOp::DivwoT0T1 => {
                    let (res, ov) = alu::divw(t0, t1);
                    cpu.record_ov(ov);
                    t0 = res;
                }
                HostOp::DivwuoT0T1 => {
                    let (res, ov) = alu::divwu(t0, t1);
                    cpu.record_ov(ov);
                    t0 = res;
                }

                HostOp::UmulT0T1 => t0 = t0.wrapping_mul(t1),
                HostOp::MulhwT0T1 => t0 = alu::mulhw(t0, t1),
                HostOp::MulhwuT0T1 => t0 = alu::mulhwu(t0, t1),
                HostOp::MulliT0Im(v) => t0 = t0.wrapping_mul(v),
                HostOp::DivwT0T1 => t0 = alu::divw(t0, t1).0,
                HostOp::DivwuT0T1 => t0 = alu::divwu(t0, t1).0,

                HostOp::NegT0 => t0 = t0.wrapping_neg(),
                HostOp::RecordNegoT0 => {
                    let (_, ov) = alu::neg(t0);
                    cpu.record_ov(ov);
                }

                HostOp::AndT0T1 => t0 &= t1,
                HostOp::AndcT0T1 => t0 &= !t1,
                HostOp::EqvT0T1 => t0 = !(t0 ^ t1),
                HostOp::NandT0T1 => t0 = !(t0 & t1),
                HostOp::NorT0T1 => t0 = !(t0 | t1),
                HostOp::OrT0T1 => t0 |= t1,
                HostOp::OrcT0T1 => t0 |= !t1,
                HostOp::XorT0T1 => t0 ^= t1,
                HostOp::AndT0Im(v) => t0 &= v,
                HostOp::OrT0Im(v) => t0 |= v,
                HostOp::XorT0Im(v) => t0 ^= v,

                HostOp::SlwT0T1 => t0 = alu::slw(t0, t1),
                HostOp::SrwT0T1 => t0 = alu::srw(t0, t1),
                HostOp::SrawT0T1 => {
                    let (res, ca) = alu::sraw(t0, t1);
                    cpu.set_xer_ca(ca);
                    t0 = res;
                }
                HostOp::SrawT0Im(sh) => {
                    let (res, ca) = alu::sraw(t0, sh);
                    cpu.set_xer_ca(ca);
                    t0 = res;
                }
                HostOp::LslT0Im(sh) => t0 <<= sh,
                HostOp::RolT0Im(sh) => t0 = alu::rotl(t0, sh),
                HostOp::Rlwimi { sh, mask } => {
                    t0 = (alu::rotl(t1, sh) & mask) | (t0 & !mask);
                }
                HostOp::Rlwinm { sh, mask } => t0 = alu::rotl(t0, sh) & mask,
                HostOp::Rlwnm { mask } => t0 = alu::rotl(t0, t1) & mask,
                HostOp::CntlzwT0 => t0 = t0.leading_zeros(),
                HostOp::Se8T0 => t0 = t0 as u8 as i8 as i32 as u32,
                HostOp::Se16T0 => t0 = t0 as u16 as i16 as i32 as u32,

                HostOp::Load { width, signed, idx } => {
                    let ea = match idx {
                        Idx::Im(off) => a0.wrapping_add(off as u32),
                        Idx::T1 => a0.wrapping_add(t1),
                    };
                    t0 = match (width, signed) {
                        (1, _) => u32::from(mem.read8(ea)),
                        (2, false) => u32::from(mem.read16(ea)),
                        (2, true) => mem.read16(ea) as i16 as i32 as u32,
                        (4, _) => mem.read32(ea),
                        _ => unreachable!("load width {width}"),
                    };
                }
                HostOp::Store { width, idx } => {
                    let ea = match idx {
                        Idx::Im(off) => a0.wrapping_add(off as u32),
                        Idx::T1 => a0.wrapping_add(t1),
                    };
                    match width {
                        1 => mem.write8(ea, t0 as u8),
                        2 => mem.write16(ea, t0 as u16),
                        4 => mem.write32(ea, t0),
                        _ => unreachable!("store width {width}"),
                    }
                }

                HostOp::CmpT0T1(crf) => {
                    if crf == 0 {
                        pending = None;
                    }
                    cpu.compare_signed(crf, t0 as i32, t1 as i32);
                }
                HostOp::CmpT0Im(crf, v) => {
                    if crf == 0 {
                        pending = None;
                    }
                    cpu.compare_signed(crf, t0 as i32, v);
                }
                HostOp::CmplT0T1(crf) => {
                    if crf == 0 {
                        pending = None;
                    }
                    cpu.compare_unsigned(crf, t0, t1);
                }
                HostOp::CmplT0Im(crf, v) => {
                    if crf == 0 {
                        pending = None;
                    }
                    cpu.compare_unsigned(crf, t0, v);
                }
                HostOp::LoadT0Crb(i) => t0 = cpu.crb(i),
                HostOp::LoadT1Crb(i) => t1 = cpu.crb(i),
                HostOp::StoreT0Crb(i) => cpu.set_crb(i, t0),
                HostOp::LoadT0Cr => t0 = cpu.cr,
                HostOp::CommitCr => commit(cpu, &mut pending),
                HostOp::RecordCr0T0 => pending = Some((t0, cpu.xer_so())),

                HostOp::LoadT0Xer => t0 = cpu.xer,
                HostOp::StoreT0Xer => cpu.xer = t0,
                HostOp::LoadT0Lr => t0 = cpu.lr,
                HostOp::StoreT0Lr => cpu.lr = t0,
                HostOp::LoadT0Ctr => t0 = cpu.ctr,
                HostOp::StoreT0Ctr => cpu.ctr = t0,
                HostOp::LoadA0Lr => a0 = cpu.lr,
                HostOp::LoadA0Ctr => a0 = cpu.ctr,
                HostOp::StoreImLr(v) => cpu.lr = v,

                HostOp::BcA0 { bo, bi, npc } => {
                    commit(cpu, &mut pending);
                    let taken = fields::bo_cond_ok(bo, bi, cpu.cr);
                    cpu.pc = if taken { a0 } else { npc };
                }
                HostOp::IncPc(bytes) => cpu.pc = cpu.pc.wrapping_add(bytes as u32),
                HostOp::InvokeCpu { exec, opcode } => exec(cpu, mem, opcode)?,
                HostOp::ExecReturn => return Ok(()),
            }
        }
        unreachable!("block ran off the end of the code buffer");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::state::{CR_EQ, CR_GT};
    use crate::mem::FlatMem;

    fn setup() -> (Emitter, CpuState, FlatMem) {
        (Emitter::new(1024), CpuState::new(), FlatMem::new(0, 0x1000))
    }

    #[test]
    fn hand_emitted_add_sequence_runs() {
        let (mut em, mut cpu, mut mem) = setup();
        cpu.gpr[4] = 40;
        cpu.gpr[5] = 2;
        let entry = em.start();
        em.load_t0_gpr(4);
        em.load_t1_gpr(5);
        em.add_32_t0_t1();
        em.store_t0_gpr(3);
        em.exec_return();
        em.end();
        em.run(entry, &mut cpu, &mut mem).unwrap();
        assert_eq!(cpu.gpr[3], 42);
    }

    #[test]
    fn record_cr0_is_deferred_until_commit() {
        let (mut em, mut cpu, mut mem) = setup();
        cpu.gpr[3] = 7;
        let entry = em.start();
        em.load_t0_gpr(3);
        em.record_cr0_t0();
        em.exec_return(); // no commit emitted
        em.run(entry, &mut cpu, &mut mem).unwrap();
        assert_eq!(cpu.cr, 0, "uncommitted record must not reach CR");

        let entry = em.start();
        em.load_t0_gpr(3);
        em.record_cr0_t0();
        em.commit_cr();
        em.exec_return();
        em.run(entry, &mut cpu, &mut mem).unwrap();
        assert_eq!(cpu.cr_field(0), CR_GT);
    }

    #[test]
    fn compare_to_cr0_supersedes_pending_record() {
        let (mut em, mut cpu, mut mem) = setup();
        cpu.gpr[3] = 0xFFFF_FFFF; // record would set LT
        let entry = em.start();
        em.load_t0_gpr(3);
        em.record_cr0_t0();
        em.mov_32_t0_im(5);
        em.compare_t0_im(0, 5); // EQ
        em.commit_cr();
        em.exec_return();
        em.run(entry, &mut cpu, &mut mem).unwrap();
        assert_eq!(cpu.cr_field(0), CR_EQ);
    }

    #[test]
    fn bc_a0_folds_pending_record_before_testing() {
        let (mut em, mut cpu, mut mem) = setup();
        cpu.gpr[3] = 0;
        let entry = em.start();
        em.load_t0_gpr(3);
        em.record_cr0_t0(); // EQ, still pending
        em.mov_32_a0_im(0x3000);
        em.bc_a0(0b01100, 2, 0x2004); // beq
        em.exec_return();
        em.run(entry, &mut cpu, &mut mem).unwrap();
        assert_eq!(cpu.pc, 0x3000);
        assert_eq!(cpu.cr_field(0), CR_EQ);
    }

    #[test]
    fn update_form_address_arithmetic() {
        let (mut em, mut cpu, mut mem) = setup();
        cpu.gpr[6] = 0x100;
        mem.write32(0x108, 0xAABB_CCDD);
        let entry = em.start();
        em.load_a0_gpr(6);
        em.load_u32_t0_a0_im(8);
        em.store_t0_gpr(5);
        em.add_32_a0_im(8);
        em.store_a0_gpr(6);
        em.exec_return();
        em.run(entry, &mut cpu, &mut mem).unwrap();
        assert_eq!(cpu.gpr[5], 0xAABB_CCDD);
        assert_eq!(cpu.gpr[6], 0x108);
    }

    #[test]
    fn full_reports_saturation_and_reset_clears() {
        let mut em = Emitter::new(4);
        assert!(!em.full());
        for _ in 0..4 {
            em.mov_32_t0_im(0);
        }
        assert!(em.full());
        em.reset();
        assert!(!em.full());
        assert_eq!(em.code_ptr(), 0);
    }

    #[test]
    fn invoke_cpu_propagates_exceptions() {
        let (mut em, mut cpu, mut mem) = setup();
        cpu.pc = 0x2000;
        let entry = em.start();
        em.commit_cr();
        em.invoke_cpu_im(crate::interp::illegal, 0xDEAD_BEEF);
        em.exec_return();
        assert!(em.run(entry, &mut cpu, &mut mem).is_err());
    }
}
