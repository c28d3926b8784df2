/*!
interp.rs - Per-opcode interpreter handlers.

Overview
========
One handler per decode-table entry, in the `InterpFn` shape the instruction
descriptors carry. The block compiler's generic fallback emits calls to
these; they are also the reference semantics the translated blocks are
tested against.

Calling convention
==================
Handlers receive the CPU state, guest memory, and the raw instruction
word, with `cpu.pc` at the instruction's own address. On success the
handler advances `pc` itself (branch handlers set the target); on error it
leaves `pc` at the faulting instruction and returns the exception.

Families (loads, stores, CR logical, bitwise, carrying arithmetic) share
one executor parameterized by the same `{size, signed, update, indexed}`
and operator bundles the block compiler dispatches on, so the two paths
cannot disagree. Pure value semantics live in `cpu::alu`.
*/

use crate::cpu::alu;
use crate::cpu::fields;
use crate::cpu::state::{CpuState, XER_CA, XER_OV, XER_SO};
use crate::mem::GuestMem;

/// Run-time exception surfaced by a handler (and through block execution).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Exception {
    #[error("illegal instruction {opcode:#010x} at {pc:#010x}")]
    IllegalInstruction { opcode: u32, pc: u32 },
    #[error("system call at {pc:#010x}")]
    Syscall { pc: u32 },
    #[error("trap at {pc:#010x}")]
    Trap { pc: u32 },
}

/// Handler signature stored in instruction descriptors.
pub type InterpFn = fn(&mut CpuState, &mut dyn GuestMem, u32) -> Result<(), Exception>;

#[inline]
fn step(cpu: &mut CpuState) -> Result<(), Exception> {
    cpu.pc = cpu.pc.wrapping_add(4);
    Ok(())
}

#[inline]
fn rc_record(cpu: &mut CpuState, op: u32, res: u32) {
    if fields::rc(op) {
        let so = cpu.xer_so();
        cpu.record_cr0(res, so);
    }
}

// ---------------------------------------------------------------------------
// Loads and stores
// ---------------------------------------------------------------------------

/// Effective address shared by all memory forms: base is 0 for `rA == 0`
/// non-update forms, `GPR[rA]` otherwise; displacement is `GPR[rB]` for the
/// indexed forms and the sign-extended D field otherwise.
#[inline]
fn effective_addr(cpu: &CpuState, op: u32, update: bool, indexed: bool) -> u32 {
    let ra = fields::ra(op) as usize;
    let base = if ra == 0 && !update { 0 } else { cpu.gpr[ra] };
    let disp = if indexed {
        cpu.gpr[fields::rb(op) as usize]
    } else {
        fields::simm(op) as u32
    };
    base.wrapping_add(disp)
}

fn load(
    cpu: &mut CpuState,
    mem: &mut dyn GuestMem,
    op: u32,
    size: u32,
    signed: bool,
    update: bool,
    indexed: bool,
) -> Result<(), Exception> {
    let ea = effective_addr(cpu, op, update, indexed);
    let value = match size {
        1 => u32::from(mem.read8(ea)),
        2 => {
            let half = mem.read16(ea);
            if signed {
                half as i16 as i32 as u32
            } else {
                u32::from(half)
            }
        }
        4 => mem.read32(ea),
        _ => unreachable!("load width {size}"),
    };
    cpu.gpr[fields::rd(op) as usize] = value;
    if update {
        cpu.gpr[fields::ra(op) as usize] = ea;
    }
    step(cpu)
}

fn store(
    cpu: &mut CpuState,
    mem: &mut dyn GuestMem,
    op: u32,
    size: u32,
    update: bool,
    indexed: bool,
) -> Result<(), Exception> {
    let ea = effective_addr(cpu, op, update, indexed);
    let value = cpu.gpr[fields::rs(op) as usize];
    match size {
        1 => mem.write8(ea, value as u8),
        2 => mem.write16(ea, value as u16),
        4 => mem.write32(ea, value),
        _ => unreachable!("store width {size}"),
    }
    if update {
        cpu.gpr[fields::ra(op) as usize] = ea;
    }
    step(cpu)
}

macro_rules! load_forms {
    ($($name:ident: $size:literal, $signed:literal, $update:literal, $indexed:literal;)*) => {
        $(pub(crate) fn $name(
            cpu: &mut CpuState,
            mem: &mut dyn GuestMem,
            op: u32,
        ) -> Result<(), Exception> {
            load(cpu, mem, op, $size, $signed, $update, $indexed)
        })*
    };
}

macro_rules! store_forms {
    ($($name:ident: $size:literal, $update:literal, $indexed:literal;)*) => {
        $(pub(crate) fn $name(
            cpu: &mut CpuState,
            mem: &mut dyn GuestMem,
            op: u32,
        ) -> Result<(), Exception> {
            store(cpu, mem, op, $size, $update, $indexed)
        })*
    };
}

load_forms! {
    lbz: 1, false, false, false;
    lbzu: 1, false, true, false;
    lbzux: 1, false, true, true;
    lbzx: 1, false, false, true;
    lha: 2, true, false, false;
    lhau: 2, true, true, false;
    lhaux: 2, true, true, true;
    lhax: 2, true, false, true;
    lhz: 2, false, false, false;
    lhzu: 2, false, true, false;
    lhzux: 2, false, true, true;
    lhzx: 2, false, false, true;
    lwz: 4, false, false, false;
    lwzu: 4, false, true, false;
    lwzux: 4, false, true, true;
    lwzx: 4, false, false, true;
}

store_forms! {
    stb: 1, false, false;
    stbu: 1, true, false;
    stbux: 1, true, true;
    stbx: 1, false, true;
    sth: 2, false, false;
    sthu: 2, true, false;
    sthux: 2, true, true;
    sthx: 2, false, true;
    stw: 4, false, false;
    stwu: 4, true, false;
    stwux: 4, true, true;
    stwx: 4, false, true;
}

// ---------------------------------------------------------------------------
// Branches
// ---------------------------------------------------------------------------

/// Full BO semantics, CTR decrement included.
fn branch_cond(cpu: &mut CpuState, bo: u32, bi: u32) -> bool {
    let ctr_ok = if fields::bo_decrements_ctr(bo) {
        cpu.ctr = cpu.ctr.wrapping_sub(1);
        if bo & 0b00010 != 0 {
            cpu.ctr == 0
        } else {
            cpu.ctr != 0
        }
    } else {
        true
    };
    ctr_ok && fields::bo_cond_ok(bo, bi, cpu.cr)
}

pub(crate) fn b(cpu: &mut CpuState, _mem: &mut dyn GuestMem, op: u32) -> Result<(), Exception> {
    let base = if fields::aa(op) { 0 } else { cpu.pc };
    if fields::lk(op) {
        cpu.lr = cpu.pc.wrapping_add(4);
    }
    cpu.pc = base.wrapping_add(fields::li(op) as u32) & !3;
    Ok(())
}

pub(crate) fn bc(cpu: &mut CpuState, _mem: &mut dyn GuestMem, op: u32) -> Result<(), Exception> {
    let base = if fields::aa(op) { 0 } else { cpu.pc };
    let target = base.wrapping_add(fields::bd(op) as u32) & !3;
    branch_to(cpu, op, target)
}

pub(crate) fn bclr(cpu: &mut CpuState, _mem: &mut dyn GuestMem, op: u32) -> Result<(), Exception> {
    let target = cpu.lr & !3;
    branch_to(cpu, op, target)
}

pub(crate) fn bcctr(cpu: &mut CpuState, _mem: &mut dyn GuestMem, op: u32) -> Result<(), Exception> {
    let target = cpu.ctr & !3;
    branch_to(cpu, op, target)
}

#[inline]
fn branch_to(cpu: &mut CpuState, op: u32, target: u32) -> Result<(), Exception> {
    let taken = branch_cond(cpu, fields::bo(op), fields::bi(op));
    if fields::lk(op) {
        cpu.lr = cpu.pc.wrapping_add(4);
    }
    cpu.pc = if taken { target } else { cpu.pc.wrapping_add(4) };
    Ok(())
}

// ---------------------------------------------------------------------------
// Compares
// ---------------------------------------------------------------------------

pub(crate) fn cmp(cpu: &mut CpuState, _mem: &mut dyn GuestMem, op: u32) -> Result<(), Exception> {
    let a = cpu.gpr[fields::ra(op) as usize] as i32;
    let b = cpu.gpr[fields::rb(op) as usize] as i32;
    cpu.compare_signed(fields::crfd(op), a, b);
    step(cpu)
}

pub(crate) fn cmpi(cpu: &mut CpuState, _mem: &mut dyn GuestMem, op: u32) -> Result<(), Exception> {
    let a = cpu.gpr[fields::ra(op) as usize] as i32;
    cpu.compare_signed(fields::crfd(op), a, fields::simm(op));
    step(cpu)
}

pub(crate) fn cmpl(cpu: &mut CpuState, _mem: &mut dyn GuestMem, op: u32) -> Result<(), Exception> {
    let a = cpu.gpr[fields::ra(op) as usize];
    let b = cpu.gpr[fields::rb(op) as usize];
    cpu.compare_unsigned(fields::crfd(op), a, b);
    step(cpu)
}

pub(crate) fn cmpli(cpu: &mut CpuState, _mem: &mut dyn GuestMem, op: u32) -> Result<(), Exception> {
    let a = cpu.gpr[fields::ra(op) as usize];
    cpu.compare_unsigned(fields::crfd(op), a, fields::uimm(op));
    step(cpu)
}

// ---------------------------------------------------------------------------
// Condition-register logical
// ---------------------------------------------------------------------------

#[inline]
fn cr_logical(
    cpu: &mut CpuState,
    op: u32,
    f: fn(u32, u32) -> u32,
) -> Result<(), Exception> {
    let a = cpu.crb(fields::crba(op));
    let b = cpu.crb(fields::crbb(op));
    cpu.set_crb(fields::crbd(op), f(a, b));
    step(cpu)
}

pub(crate) fn crand(cpu: &mut CpuState, _m: &mut dyn GuestMem, op: u32) -> Result<(), Exception> {
    cr_logical(cpu, op, |a, b| a & b)
}

pub(crate) fn crandc(cpu: &mut CpuState, _m: &mut dyn GuestMem, op: u32) -> Result<(), Exception> {
    cr_logical(cpu, op, |a, b| a & !b)
}

pub(crate) fn creqv(cpu: &mut CpuState, _m: &mut dyn GuestMem, op: u32) -> Result<(), Exception> {
    cr_logical(cpu, op, |a, b| !(a ^ b))
}

pub(crate) fn crnand(cpu: &mut CpuState, _m: &mut dyn GuestMem, op: u32) -> Result<(), Exception> {
    cr_logical(cpu, op, |a, b| !(a & b))
}

pub(crate) fn crnor(cpu: &mut CpuState, _m: &mut dyn GuestMem, op: u32) -> Result<(), Exception> {
    cr_logical(cpu, op, |a, b| !(a | b))
}

pub(crate) fn cror(cpu: &mut CpuState, _m: &mut dyn GuestMem, op: u32) -> Result<(), Exception> {
    cr_logical(cpu, op, |a, b| a | b)
}

pub(crate) fn crorc(cpu: &mut CpuState, _m: &mut dyn GuestMem, op: u32) -> Result<(), Exception> {
    cr_logical(cpu, op, |a, b| a | !b)
}

pub(crate) fn crxor(cpu: &mut CpuState, _m: &mut dyn GuestMem, op: u32) -> Result<(), Exception> {
    cr_logical(cpu, op, |a, b| a ^ b)
}

pub(crate) fn mcrf(cpu: &mut CpuState, _m: &mut dyn GuestMem, op: u32) -> Result<(), Exception> {
    let bits = cpu.cr_field(fields::crfs(op));
    cpu.set_cr_field(fields::crfd(op), bits);
    step(cpu)
}

pub(crate) fn mcrxr(cpu: &mut CpuState, _m: &mut dyn GuestMem, op: u32) -> Result<(), Exception> {
    cpu.set_cr_field(fields::crfd(op), cpu.xer >> 28);
    cpu.xer &= !(XER_SO | XER_OV | XER_CA);
    step(cpu)
}

pub(crate) fn mfcr(cpu: &mut CpuState, _m: &mut dyn GuestMem, op: u32) -> Result<(), Exception> {
    cpu.gpr[fields::rd(op) as usize] = cpu.cr;
    step(cpu)
}

pub(crate) fn mtcrf(cpu: &mut CpuState, _m: &mut dyn GuestMem, op: u32) -> Result<(), Exception> {
    let crm = fields::crm(op);
    let value = cpu.gpr[fields::rs(op) as usize];
    for field in 0..8 {
        if crm & (0x80 >> field) != 0 {
            cpu.set_cr_field(field, value >> ((7 - field) * 4));
        }
    }
    step(cpu)
}

// ---------------------------------------------------------------------------
// Bitwise
// ---------------------------------------------------------------------------

#[inline]
fn logical_rr(cpu: &mut CpuState, op: u32, f: fn(u32, u32) -> u32) -> Result<(), Exception> {
    let res = f(
        cpu.gpr[fields::rs(op) as usize],
        cpu.gpr[fields::rb(op) as usize],
    );
    cpu.gpr[fields::ra(op) as usize] = res;
    rc_record(cpu, op, res);
    step(cpu)
}

pub(crate) fn and(cpu: &mut CpuState, _m: &mut dyn GuestMem, op: u32) -> Result<(), Exception> {
    logical_rr(cpu, op, |a, b| a & b)
}

pub(crate) fn andc(cpu: &mut CpuState, _m: &mut dyn GuestMem, op: u32) -> Result<(), Exception> {
    logical_rr(cpu, op, |a, b| a & !b)
}

pub(crate) fn eqv(cpu: &mut CpuState, _m: &mut dyn GuestMem, op: u32) -> Result<(), Exception> {
    logical_rr(cpu, op, |a, b| !(a ^ b))
}

pub(crate) fn nand(cpu: &mut CpuState, _m: &mut dyn GuestMem, op: u32) -> Result<(), Exception> {
    logical_rr(cpu, op, |a, b| !(a & b))
}

pub(crate) fn nor(cpu: &mut CpuState, _m: &mut dyn GuestMem, op: u32) -> Result<(), Exception> {
    logical_rr(cpu, op, |a, b| !(a | b))
}

pub(crate) fn or(cpu: &mut CpuState, _m: &mut dyn GuestMem, op: u32) -> Result<(), Exception> {
    logical_rr(cpu, op, |a, b| a | b)
}

pub(crate) fn orc(cpu: &mut CpuState, _m: &mut dyn GuestMem, op: u32) -> Result<(), Exception> {
    logical_rr(cpu, op, |a, b| a | !b)
}

pub(crate) fn xor(cpu: &mut CpuState, _m: &mut dyn GuestMem, op: u32) -> Result<(), Exception> {
    logical_rr(cpu, op, |a, b| a ^ b)
}

pub(crate) fn ori(cpu: &mut CpuState, _m: &mut dyn GuestMem, op: u32) -> Result<(), Exception> {
    cpu.gpr[fields::ra(op) as usize] = cpu.gpr[fields::rs(op) as usize] | fields::uimm(op);
    step(cpu)
}

pub(crate) fn oris(cpu: &mut CpuState, _m: &mut dyn GuestMem, op: u32) -> Result<(), Exception> {
    cpu.gpr[fields::ra(op) as usize] = cpu.gpr[fields::rs(op) as usize] | (fields::uimm(op) << 16);
    step(cpu)
}

pub(crate) fn xori(cpu: &mut CpuState, _m: &mut dyn GuestMem, op: u32) -> Result<(), Exception> {
    cpu.gpr[fields::ra(op) as usize] = cpu.gpr[fields::rs(op) as usize] ^ fields::uimm(op);
    step(cpu)
}

pub(crate) fn xoris(cpu: &mut CpuState, _m: &mut dyn GuestMem, op: u32) -> Result<(), Exception> {
    cpu.gpr[fields::ra(op) as usize] = cpu.gpr[fields::rs(op) as usize] ^ (fields::uimm(op) << 16);
    step(cpu)
}

pub(crate) fn andi(cpu: &mut CpuState, _m: &mut dyn GuestMem, op: u32) -> Result<(), Exception> {
    let res = cpu.gpr[fields::rs(op) as usize] & fields::uimm(op);
    cpu.gpr[fields::ra(op) as usize] = res;
    let so = cpu.xer_so();
    cpu.record_cr0(res, so);
    step(cpu)
}

pub(crate) fn andis(cpu: &mut CpuState, _m: &mut dyn GuestMem, op: u32) -> Result<(), Exception> {
    let res = cpu.gpr[fields::rs(op) as usize] & (fields::uimm(op) << 16);
    cpu.gpr[fields::ra(op) as usize] = res;
    let so = cpu.xer_so();
    cpu.record_cr0(res, so);
    step(cpu)
}

pub(crate) fn extsb(cpu: &mut CpuState, _m: &mut dyn GuestMem, op: u32) -> Result<(), Exception> {
    let res = cpu.gpr[fields::rs(op) as usize] as u8 as i8 as i32 as u32;
    cpu.gpr[fields::ra(op) as usize] = res;
    rc_record(cpu, op, res);
    step(cpu)
}

pub(crate) fn extsh(cpu: &mut CpuState, _m: &mut dyn GuestMem, op: u32) -> Result<(), Exception> {
    let res = cpu.gpr[fields::rs(op) as usize] as u16 as i16 as i32 as u32;
    cpu.gpr[fields::ra(op) as usize] = res;
    rc_record(cpu, op, res);
    step(cpu)
}

pub(crate) fn cntlzw(cpu: &mut CpuState, _m: &mut dyn GuestMem, op: u32) -> Result<(), Exception> {
    let res = cpu.gpr[fields::rs(op) as usize].leading_zeros();
    cpu.gpr[fields::ra(op) as usize] = res;
    rc_record(cpu, op, res);
    step(cpu)
}

pub(crate) fn neg(cpu: &mut CpuState, _m: &mut dyn GuestMem, op: u32) -> Result<(), Exception> {
    let (res, ov) = alu::neg(cpu.gpr[fields::ra(op) as usize]);
    if fields::oe(op) {
        cpu.record_ov(ov);
    }
    cpu.gpr[fields::rd(op) as usize] = res;
    rc_record(cpu, op, res);
    step(cpu)
}

// ---------------------------------------------------------------------------
// SPR moves (standalone policy: only XER/LR/CTR are architected here)
// ---------------------------------------------------------------------------

pub(crate) const SPR_XER: u32 = 1;
pub(crate) const SPR_LR: u32 = 8;
pub(crate) const SPR_CTR: u32 = 9;

pub(crate) fn mfspr(cpu: &mut CpuState, mem: &mut dyn GuestMem, op: u32) -> Result<(), Exception> {
    let value = match fields::spr(op) {
        SPR_XER => cpu.xer,
        SPR_LR => cpu.lr,
        SPR_CTR => cpu.ctr,
        _ => return illegal(cpu, mem, op),
    };
    cpu.gpr[fields::rd(op) as usize] = value;
    step(cpu)
}

pub(crate) fn mtspr(cpu: &mut CpuState, mem: &mut dyn GuestMem, op: u32) -> Result<(), Exception> {
    let value = cpu.gpr[fields::rs(op) as usize];
    match fields::spr(op) {
        SPR_XER => cpu.xer = value,
        SPR_LR => cpu.lr = value,
        SPR_CTR => cpu.ctr = value,
        _ => return illegal(cpu, mem, op),
    }
    step(cpu)
}

// ---------------------------------------------------------------------------
// Arithmetic
// ---------------------------------------------------------------------------

#[inline]
fn finish_arith(cpu: &mut CpuState, op: u32, res: u32, ov: bool) -> Result<(), Exception> {
    if fields::oe(op) {
        cpu.record_ov(ov);
    }
    cpu.gpr[fields::rd(op) as usize] = res;
    rc_record(cpu, op, res);
    step(cpu)
}

#[inline]
fn operands(cpu: &CpuState, op: u32) -> (u32, u32) {
    (
        cpu.gpr[fields::ra(op) as usize],
        cpu.gpr[fields::rb(op) as usize],
    )
}

pub(crate) fn add(cpu: &mut CpuState, _m: &mut dyn GuestMem, op: u32) -> Result<(), Exception> {
    let (a, b) = operands(cpu, op);
    let (res, _, ov) = alu::addc(a, b);
    finish_arith(cpu, op, res, ov)
}

pub(crate) fn addc(cpu: &mut CpuState, _m: &mut dyn GuestMem, op: u32) -> Result<(), Exception> {
    let (a, b) = operands(cpu, op);
    let (res, ca, ov) = alu::addc(a, b);
    cpu.set_xer_ca(ca);
    finish_arith(cpu, op, res, ov)
}

pub(crate) fn adde(cpu: &mut CpuState, _m: &mut dyn GuestMem, op: u32) -> Result<(), Exception> {
    let (a, b) = operands(cpu, op);
    let (res, ca, ov) = alu::adde(a, b, cpu.xer_ca());
    cpu.set_xer_ca(ca);
    finish_arith(cpu, op, res, ov)
}

pub(crate) fn addme(cpu: &mut CpuState, _m: &mut dyn GuestMem, op: u32) -> Result<(), Exception> {
    let a = cpu.gpr[fields::ra(op) as usize];
    let (res, ca, ov) = alu::addme(a, cpu.xer_ca());
    cpu.set_xer_ca(ca);
    finish_arith(cpu, op, res, ov)
}

pub(crate) fn addze(cpu: &mut CpuState, _m: &mut dyn GuestMem, op: u32) -> Result<(), Exception> {
    let a = cpu.gpr[fields::ra(op) as usize];
    let (res, ca, ov) = alu::addze(a, cpu.xer_ca());
    cpu.set_xer_ca(ca);
    finish_arith(cpu, op, res, ov)
}

pub(crate) fn subf(cpu: &mut CpuState, _m: &mut dyn GuestMem, op: u32) -> Result<(), Exception> {
    let (a, b) = operands(cpu, op);
    let (res, ov) = alu::subf(a, b);
    finish_arith(cpu, op, res, ov)
}

pub(crate) fn subfc(cpu: &mut CpuState, _m: &mut dyn GuestMem, op: u32) -> Result<(), Exception> {
    let (a, b) = operands(cpu, op);
    let (res, ca, ov) = alu::subfc(a, b);
    cpu.set_xer_ca(ca);
    finish_arith(cpu, op, res, ov)
}

pub(crate) fn subfe(cpu: &mut CpuState, _m: &mut dyn GuestMem, op: u32) -> Result<(), Exception> {
    let (a, b) = operands(cpu, op);
    let (res, ca, ov) = alu::subfe(a, b, cpu.xer_ca());
    cpu.set_xer_ca(ca);
    finish_arith(cpu, op, res, ov)
}

pub(crate) fn subfme(cpu: &mut CpuState, _m: &mut dyn GuestMem, op: u32) -> Result<(), Exception> {
    let a = cpu.gpr[fields::ra(op) as usize];
    let (res, ca, ov) = alu::subfme(a, cpu.xer_ca());
    cpu.set_xer_ca(ca);
    finish_arith(cpu, op, res, ov)
}

pub(crate) fn subfze(cpu: &mut CpuState, _m: &mut dyn GuestMem, op: u32) -> Result<(), Exception> {
    let a = cpu.gpr[fields::ra(op) as usize];
    let (res, ca, ov) = alu::subfze(a, cpu.xer_ca());
    cpu.set_xer_ca(ca);
    finish_arith(cpu, op, res, ov)
}

pub(crate) fn mullw(cpu: &mut CpuState, _m: &mut dyn GuestMem, op: u32) -> Result<(), Exception> {
    let (a, b) = operands(cpu, op);
    let (res, ov) = alu::mullw(a, b);
    finish_arith(cpu, op, res, ov)
}

pub(crate) fn mulhw(cpu: &mut CpuState, _m: &mut dyn GuestMem, op: u32) -> Result<(), Exception> {
    let (a, b) = operands(cpu, op);
    let res = alu::mulhw(a, b);
    cpu.gpr[fields::rd(op) as usize] = res;
    rc_record(cpu, op, res);
    step(cpu)
}

pub(crate) fn mulhwu(cpu: &mut CpuState, _m: &mut dyn GuestMem, op: u32) -> Result<(), Exception> {
    let (a, b) = operands(cpu, op);
    let res = alu::mulhwu(a, b);
    cpu.gpr[fields::rd(op) as usize] = res;
    rc_record(cpu, op, res);
    step(cpu)
}

pub(crate) fn mulli(cpu: &mut CpuState, _m: &mut dyn GuestMem, op: u32) -> Result<(), Exception> {
    let a = cpu.gpr[fields::ra(op) as usize];
    cpu.gpr[fields::rd(op) as usize] = a.wrapping_mul(fields::simm(op) as u32);
    step(cpu)
}

pub(crate) fn divw(cpu: &mut CpuState, _m: &mut dyn GuestMem, op: u32) -> Result<(), Exception> {
    let (a, b) = operands(cpu, op);
    let (res, ov) = alu::divw(a, b);
    finish_arith(cpu, op, res, ov)
}

pub(crate) fn divwu(cpu: &mut CpuState, _m: &mut dyn GuestMem, op: u32) -> Result<(), Exception> {
    let (a, b) = operands(cpu, op);
    let (res, ov) = alu::divwu(a, b);
    finish_arith(cpu, op, res, ov)
}

pub(crate) fn addi(cpu: &mut CpuState, _m: &mut dyn GuestMem, op: u32) -> Result<(), Exception> {
    let ra = fields::ra(op) as usize;
    let imm = fields::simm(op) as u32;
    cpu.gpr[fields::rd(op) as usize] = if ra == 0 {
        imm
    } else {
        cpu.gpr[ra].wrapping_add(imm)
    };
    step(cpu)
}

pub(crate) fn addis(cpu: &mut CpuState, _m: &mut dyn GuestMem, op: u32) -> Result<(), Exception> {
    let ra = fields::ra(op) as usize;
    let imm = (fields::simm(op) as u32) << 16;
    cpu.gpr[fields::rd(op) as usize] = if ra == 0 {
        imm
    } else {
        cpu.gpr[ra].wrapping_add(imm)
    };
    step(cpu)
}

pub(crate) fn addic(cpu: &mut CpuState, _m: &mut dyn GuestMem, op: u32) -> Result<(), Exception> {
    let a = cpu.gpr[fields::ra(op) as usize];
    let (res, ca, _) = alu::addc(a, fields::simm(op) as u32);
    cpu.set_xer_ca(ca);
    cpu.gpr[fields::rd(op) as usize] = res;
    step(cpu)
}

pub(crate) fn addic_rc(cpu: &mut CpuState, _m: &mut dyn GuestMem, op: u32) -> Result<(), Exception> {
    let a = cpu.gpr[fields::ra(op) as usize];
    let (res, ca, _) = alu::addc(a, fields::simm(op) as u32);
    cpu.set_xer_ca(ca);
    cpu.gpr[fields::rd(op) as usize] = res;
    let so = cpu.xer_so();
    cpu.record_cr0(res, so);
    step(cpu)
}

pub(crate) fn subfic(cpu: &mut CpuState, _m: &mut dyn GuestMem, op: u32) -> Result<(), Exception> {
    let a = cpu.gpr[fields::ra(op) as usize];
    let (res, ca, _) = alu::subfc(a, fields::simm(op) as u32);
    cpu.set_xer_ca(ca);
    cpu.gpr[fields::rd(op) as usize] = res;
    step(cpu)
}

// ---------------------------------------------------------------------------
// Rotates and shifts
// ---------------------------------------------------------------------------

pub(crate) fn rlwimi(cpu: &mut CpuState, _m: &mut dyn GuestMem, op: u32) -> Result<(), Exception> {
    let m = fields::mask32(fields::mb(op), fields::me(op));
    let src = cpu.gpr[fields::rs(op) as usize];
    let ra = fields::ra(op) as usize;
    let res = (alu::rotl(src, fields::sh(op)) & m) | (cpu.gpr[ra] & !m);
    cpu.gpr[ra] = res;
    rc_record(cpu, op, res);
    step(cpu)
}

pub(crate) fn rlwinm(cpu: &mut CpuState, _m: &mut dyn GuestMem, op: u32) -> Result<(), Exception> {
    let m = fields::mask32(fields::mb(op), fields::me(op));
    let res = alu::rotl(cpu.gpr[fields::rs(op) as usize], fields::sh(op)) & m;
    cpu.gpr[fields::ra(op) as usize] = res;
    rc_record(cpu, op, res);
    step(cpu)
}

pub(crate) fn rlwnm(cpu: &mut CpuState, _m: &mut dyn GuestMem, op: u32) -> Result<(), Exception> {
    let m = fields::mask32(fields::mb(op), fields::me(op));
    let amount = cpu.gpr[fields::rb(op) as usize];
    let res = alu::rotl(cpu.gpr[fields::rs(op) as usize], amount) & m;
    cpu.gpr[fields::ra(op) as usize] = res;
    rc_record(cpu, op, res);
    step(cpu)
}

pub(crate) fn slw(cpu: &mut CpuState, _m: &mut dyn GuestMem, op: u32) -> Result<(), Exception> {
    let amount = cpu.gpr[fields::rb(op) as usize];
    let res = alu::slw(cpu.gpr[fields::rs(op) as usize], amount);
    cpu.gpr[fields::ra(op) as usize] = res;
    rc_record(cpu, op, res);
    step(cpu)
}

pub(crate) fn srw(cpu: &mut CpuState, _m: &mut dyn GuestMem, op: u32) -> Result<(), Exception> {
    let amount = cpu.gpr[fields::rb(op) as usize];
    let res = alu::srw(cpu.gpr[fields::rs(op) as usize], amount);
    cpu.gpr[fields::ra(op) as usize] = res;
    rc_record(cpu, op, res);
    step(cpu)
}

pub(crate) fn sraw(cpu: &mut CpuState, _m: &mut dyn GuestMem, op: u32) -> Result<(), Exception> {
    let amount = cpu.gpr[fields::rb(op) as usize];
    let (res, ca) = alu::sraw(cpu.gpr[fields::rs(op) as usize], amount);
    cpu.set_xer_ca(ca);
    cpu.gpr[fields::ra(op) as usize] = res;
    rc_record(cpu, op, res);
    step(cpu)
}

pub(crate) fn srawi(cpu: &mut CpuState, _m: &mut dyn GuestMem, op: u32) -> Result<(), Exception> {
    let (res, ca) = alu::sraw(cpu.gpr[fields::rs(op) as usize], fields::sh(op));
    cpu.set_xer_ca(ca);
    cpu.gpr[fields::ra(op) as usize] = res;
    rc_record(cpu, op, res);
    step(cpu)
}

// ---------------------------------------------------------------------------
// System
// ---------------------------------------------------------------------------

pub(crate) fn sc(cpu: &mut CpuState, _m: &mut dyn GuestMem, _op: u32) -> Result<(), Exception> {
    Err(Exception::Syscall { pc: cpu.pc })
}

#[inline]
fn trap_taken(to: u32, a: u32, b: u32) -> bool {
    let (sa, sb) = (a as i32, b as i32);
    (to & 0b10000 != 0 && sa < sb)
        || (to & 0b01000 != 0 && sa > sb)
        || (to & 0b00100 != 0 && a == b)
        || (to & 0b00010 != 0 && a < b)
        || (to & 0b00001 != 0 && a > b)
}

pub(crate) fn twi(cpu: &mut CpuState, _m: &mut dyn GuestMem, op: u32) -> Result<(), Exception> {
    let a = cpu.gpr[fields::ra(op) as usize];
    if trap_taken(fields::rd(op), a, fields::simm(op) as u32) {
        Err(Exception::Trap { pc: cpu.pc })
    } else {
        step(cpu)
    }
}

pub(crate) fn tw(cpu: &mut CpuState, _m: &mut dyn GuestMem, op: u32) -> Result<(), Exception> {
    let (a, b) = operands(cpu, op);
    if trap_taken(fields::rd(op), a, b) {
        Err(Exception::Trap { pc: cpu.pc })
    } else {
        step(cpu)
    }
}

pub(crate) fn sync(cpu: &mut CpuState, _m: &mut dyn GuestMem, _op: u32) -> Result<(), Exception> {
    step(cpu)
}

pub(crate) fn isync(cpu: &mut CpuState, _m: &mut dyn GuestMem, _op: u32) -> Result<(), Exception> {
    step(cpu)
}

pub(crate) fn eieio(cpu: &mut CpuState, _m: &mut dyn GuestMem, _op: u32) -> Result<(), Exception> {
    step(cpu)
}

pub(crate) fn illegal(cpu: &mut CpuState, _m: &mut dyn GuestMem, op: u32) -> Result<(), Exception> {
    Err(Exception::IllegalInstruction {
        opcode: op,
        pc: cpu.pc,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::table::decode;
    use crate::mem::FlatMem;

    fn exec(cpu: &mut CpuState, mem: &mut FlatMem, op: u32) -> Result<(), Exception> {
        (decode(op).exec)(cpu, mem, op)
    }

    fn setup() -> (CpuState, FlatMem) {
        (CpuState::new(), FlatMem::new(0x1000, 0x1000))
    }

    #[test]
    fn lwzu_writes_back_effective_address() {
        let (mut cpu, mut mem) = setup();
        cpu.gpr[6] = 0x1000;
        mem.write32(0x1008, 0x1122_3344);
        exec(&mut cpu, &mut mem, 0x84A6_0008).unwrap(); // lwzu r5,8(r6)
        assert_eq!(cpu.gpr[5], 0x1122_3344);
        assert_eq!(cpu.gpr[6], 0x1008);
    }

    #[test]
    fn ra0_base_is_zero_for_non_update_loads() {
        let (mut cpu, mut mem) = setup();
        cpu.gpr[0] = 0xDEAD_0000; // must be ignored
        mem.write32(0x1010, 7);
        exec(&mut cpu, &mut mem, 0x8060_1010).unwrap(); // lwz r3,0x1010(0)
        assert_eq!(cpu.gpr[3], 7);
    }

    #[test]
    fn addic_sets_carry() {
        let (mut cpu, mut mem) = setup();
        cpu.gpr[4] = 0xFFFF_FFFF;
        exec(&mut cpu, &mut mem, 0x3064_0001).unwrap(); // addic r3,r4,1
        assert_eq!(cpu.gpr[3], 0);
        assert!(cpu.xer_ca());
    }

    #[test]
    fn bdnz_decrements_and_loops() {
        let (mut cpu, mut mem) = setup();
        cpu.pc = 0x2000;
        cpu.ctr = 2;
        // bdnz -4 : BO=10000(16 dec), BD=-4
        exec(&mut cpu, &mut mem, 0x4200_FFFC).unwrap();
        assert_eq!(cpu.ctr, 1);
        assert_eq!(cpu.pc, 0x1FFC);
        cpu.pc = 0x2000;
        exec(&mut cpu, &mut mem, 0x4200_FFFC).unwrap();
        assert_eq!(cpu.ctr, 0);
        assert_eq!(cpu.pc, 0x2004); // fell through
    }

    #[test]
    fn blr_returns_to_link_register() {
        let (mut cpu, mut mem) = setup();
        cpu.pc = 0x2000;
        cpu.lr = 0x3000;
        exec(&mut cpu, &mut mem, 0x4E80_0020).unwrap();
        assert_eq!(cpu.pc, 0x3000);
    }

    #[test]
    fn bl_records_return_address() {
        let (mut cpu, mut mem) = setup();
        cpu.pc = 0x2000;
        exec(&mut cpu, &mut mem, 0x4800_0101).unwrap(); // bl +0x100
        assert_eq!(cpu.pc, 0x2100);
        assert_eq!(cpu.lr, 0x2004);
    }

    #[test]
    fn sc_raises_syscall() {
        let (mut cpu, mut mem) = setup();
        cpu.pc = 0x2000;
        assert_eq!(
            exec(&mut cpu, &mut mem, 0x4400_0002),
            Err(Exception::Syscall { pc: 0x2000 })
        );
    }

    #[test]
    fn twi_traps_only_when_condition_met() {
        let (mut cpu, mut mem) = setup();
        cpu.pc = 0x2000;
        cpu.gpr[3] = 5;
        // twi 16,r3,10 : trap if r3 < 10 signed
        assert!(exec(&mut cpu, &mut mem, 0x0E03_000A).is_err());
        cpu.gpr[3] = 11;
        assert!(exec(&mut cpu, &mut mem, 0x0E03_000A).is_ok());
        assert_eq!(cpu.pc, 0x2004);
    }

    #[test]
    fn mtcrf_masks_fields() {
        let (mut cpu, mut mem) = setup();
        cpu.gpr[3] = 0xFFFF_FFFF;
        // mtcrf 0x80,r3 : only CR0
        exec(&mut cpu, &mut mem, 0x7C68_0120).unwrap();
        assert_eq!(cpu.cr, 0xF000_0000);
    }

    #[test]
    fn unknown_spr_is_illegal_here() {
        let (mut cpu, mut mem) = setup();
        cpu.pc = 0x2000;
        // mfspr r3, 287 (PVR)
        let op = 0x7C7F_42A6;
        assert!(matches!(
            exec(&mut cpu, &mut mem, op),
            Err(Exception::IllegalInstruction { .. })
        ));
    }
}
