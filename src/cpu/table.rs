/*!
table.rs - Instruction descriptors and the opcode decoder.

Overview
========
Maps a raw 32-bit instruction word to a static `InstrInfo` descriptor:
mnemonic tag, control-flow class, and the interpreter handler used by the
generic fallback. Decoding never fails; anything unrecognized (including
the deliberately unsupported classes: floating point, AltiVec, lmw/stmw,
string moves, lwarx/stwcx.) resolves to the illegal-instruction
descriptor, whose handler raises the exception at run time.

Layout
======
PowerPC splits the space on the 6-bit primary opcode, with two extended
groups keyed by bits 21..30: group 19 (branch-to-register and CR logical)
and group 31 (register-register ALU, indexed memory, SPR moves). The
OE-capable group-31 instructions occupy two 10-bit slots (XO and XO+512);
both alias to one descriptor and the translator re-reads the OE bit.
*/

use crate::cpu::fields;
use crate::interp;
use crate::interp::InterpFn;
use bitflags::bitflags;

bitflags! {
    /// Control-flow class of an instruction descriptor.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CFlow: u8 {
        /// Transfers control (branch family).
        const BRANCH = 1 << 0;
        /// Terminates a basic block.
        const END_BLOCK = 1 << 1;
        /// May raise a synchronous exception (sc/trap).
        const TRAP = 1 << 2;
    }
}

/// Mnemonic tag dispatched on by the block compiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mnemo {
    // Loads
    Lbz,
    Lbzu,
    Lbzux,
    Lbzx,
    Lha,
    Lhau,
    Lhaux,
    Lhax,
    Lhz,
    Lhzu,
    Lhzux,
    Lhzx,
    Lwz,
    Lwzu,
    Lwzux,
    Lwzx,
    // Stores
    Stb,
    Stbu,
    Stbux,
    Stbx,
    Sth,
    Sthu,
    Sthux,
    Sthx,
    Stw,
    Stwu,
    Stwux,
    Stwx,
    // Branches
    B,
    Bc,
    Bcctr,
    Bclr,
    // Compares
    Cmp,
    Cmpi,
    Cmpl,
    Cmpli,
    // Condition register
    Crand,
    Crandc,
    Creqv,
    Crnand,
    Crnor,
    Cror,
    Crorc,
    Crxor,
    Mcrf,
    Mcrxr,
    Mfcr,
    Mtcrf,
    // Bitwise
    And,
    Andc,
    Eqv,
    Nand,
    Nor,
    Or,
    Orc,
    Xor,
    Ori,
    Oris,
    Xori,
    Xoris,
    Andi,
    Andis,
    // Sign extension and friends
    Extsb,
    Extsh,
    Neg,
    Cntlzw,
    // SPR moves
    Mfspr,
    Mtspr,
    // Arithmetic
    Add,
    Addc,
    Adde,
    Addme,
    Addze,
    Subf,
    Subfc,
    Subfe,
    Subfme,
    Subfze,
    Mullw,
    Mulhw,
    Mulhwu,
    Mulli,
    Divw,
    Divwu,
    Addi,
    Addis,
    Addic,
    AddicRc,
    Subfic,
    // Rotates and shifts
    Rlwimi,
    Rlwinm,
    Rlwnm,
    Slw,
    Srw,
    Sraw,
    Srawi,
    // System
    Sc,
    Twi,
    Tw,
    Sync,
    Isync,
    Eieio,
    /// Unknown or unsupported word.
    Illegal,
}

/// Static per-instruction descriptor.
pub struct InstrInfo {
    pub mnemo: Mnemo,
    pub cflow: CFlow,
    pub exec: InterpFn,
}

macro_rules! descriptors {
    ($($name:ident: $mnemo:ident, $cflow:expr, $exec:path;)*) => {
        $(static $name: InstrInfo = InstrInfo {
            mnemo: Mnemo::$mnemo,
            cflow: $cflow,
            exec: $exec,
        };)*
    };
}

const NONE: CFlow = CFlow::empty();
const BR: CFlow = CFlow::BRANCH.union(CFlow::END_BLOCK);
const TRAP: CFlow = CFlow::TRAP.union(CFlow::END_BLOCK);

descriptors! {
    I_LBZ: Lbz, NONE, interp::lbz;
    I_LBZU: Lbzu, NONE, interp::lbzu;
    I_LBZUX: Lbzux, NONE, interp::lbzux;
    I_LBZX: Lbzx, NONE, interp::lbzx;
    I_LHA: Lha, NONE, interp::lha;
    I_LHAU: Lhau, NONE, interp::lhau;
    I_LHAUX: Lhaux, NONE, interp::lhaux;
    I_LHAX: Lhax, NONE, interp::lhax;
    I_LHZ: Lhz, NONE, interp::lhz;
    I_LHZU: Lhzu, NONE, interp::lhzu;
    I_LHZUX: Lhzux, NONE, interp::lhzux;
    I_LHZX: Lhzx, NONE, interp::lhzx;
    I_LWZ: Lwz, NONE, interp::lwz;
    I_LWZU: Lwzu, NONE, interp::lwzu;
    I_LWZUX: Lwzux, NONE, interp::lwzux;
    I_LWZX: Lwzx, NONE, interp::lwzx;
    I_STB: Stb, NONE, interp::stb;
    I_STBU: Stbu, NONE, interp::stbu;
    I_STBUX: Stbux, NONE, interp::stbux;
    I_STBX: Stbx, NONE, interp::stbx;
    I_STH: Sth, NONE, interp::sth;
    I_STHU: Sthu, NONE, interp::sthu;
    I_STHUX: Sthux, NONE, interp::sthux;
    I_STHX: Sthx, NONE, interp::sthx;
    I_STW: Stw, NONE, interp::stw;
    I_STWU: Stwu, NONE, interp::stwu;
    I_STWUX: Stwux, NONE, interp::stwux;
    I_STWX: Stwx, NONE, interp::stwx;
    I_B: B, BR, interp::b;
    I_BC: Bc, BR, interp::bc;
    I_BCCTR: Bcctr, BR, interp::bcctr;
    I_BCLR: Bclr, BR, interp::bclr;
    I_CMP: Cmp, NONE, interp::cmp;
    I_CMPI: Cmpi, NONE, interp::cmpi;
    I_CMPL: Cmpl, NONE, interp::cmpl;
    I_CMPLI: Cmpli, NONE, interp::cmpli;
    I_CRAND: Crand, NONE, interp::crand;
    I_CRANDC: Crandc, NONE, interp::crandc;
    I_CREQV: Creqv, NONE, interp::creqv;
    I_CRNAND: Crnand, NONE, interp::crnand;
    I_CRNOR: Crnor, NONE, interp::crnor;
    I_CROR: Cror, NONE, interp::cror;
    I_CRORC: Crorc, NONE, interp::crorc;
    I_CRXOR: Crxor, NONE, interp::crxor;
    I_MCRF: Mcrf, NONE, interp::mcrf;
    I_MCRXR: Mcrxr, NONE, interp::mcrxr;
    I_MFCR: Mfcr, NONE, interp::mfcr;
    I_MTCRF: Mtcrf, NONE, interp::mtcrf;
    I_AND: And, NONE, interp::and;
    I_ANDC: Andc, NONE, interp::andc;
    I_EQV: Eqv, NONE, interp::eqv;
    I_NAND: Nand, NONE, interp::nand;
    I_NOR: Nor, NONE, interp::nor;
    I_OR: Or, NONE, interp::or;
    I_ORC: Orc, NONE, interp::orc;
    I_XOR: Xor, NONE, interp::xor;
    I_ORI: Ori, NONE, interp::ori;
    I_ORIS: Oris, NONE, interp::oris;
    I_XORI: Xori, NONE, interp::xori;
    I_XORIS: Xoris, NONE, interp::xoris;
    I_ANDI: Andi, NONE, interp::andi;
    I_ANDIS: Andis, NONE, interp::andis;
    I_EXTSB: Extsb, NONE, interp::extsb;
    I_EXTSH: Extsh, NONE, interp::extsh;
    I_NEG: Neg, NONE, interp::neg;
    I_CNTLZW: Cntlzw, NONE, interp::cntlzw;
    I_MFSPR: Mfspr, NONE, interp::mfspr;
    I_MTSPR: Mtspr, NONE, interp::mtspr;
    I_ADD: Add, NONE, interp::add;
    I_ADDC: Addc, NONE, interp::addc;
    I_ADDE: Adde, NONE, interp::adde;
    I_ADDME: Addme, NONE, interp::addme;
    I_ADDZE: Addze, NONE, interp::addze;
    I_SUBF: Subf, NONE, interp::subf;
    I_SUBFC: Subfc, NONE, interp::subfc;
    I_SUBFE: Subfe, NONE, interp::subfe;
    I_SUBFME: Subfme, NONE, interp::subfme;
    I_SUBFZE: Subfze, NONE, interp::subfze;
    I_MULLW: Mullw, NONE, interp::mullw;
    I_MULHW: Mulhw, NONE, interp::mulhw;
    I_MULHWU: Mulhwu, NONE, interp::mulhwu;
    I_MULLI: Mulli, NONE, interp::mulli;
    I_DIVW: Divw, NONE, interp::divw;
    I_DIVWU: Divwu, NONE, interp::divwu;
    I_ADDI: Addi, NONE, interp::addi;
    I_ADDIS: Addis, NONE, interp::addis;
    I_ADDIC: Addic, NONE, interp::addic;
    I_ADDIC_RC: AddicRc, NONE, interp::addic_rc;
    I_SUBFIC: Subfic, NONE, interp::subfic;
    I_RLWIMI: Rlwimi, NONE, interp::rlwimi;
    I_RLWINM: Rlwinm, NONE, interp::rlwinm;
    I_RLWNM: Rlwnm, NONE, interp::rlwnm;
    I_SLW: Slw, NONE, interp::slw;
    I_SRW: Srw, NONE, interp::srw;
    I_SRAW: Sraw, NONE, interp::sraw;
    I_SRAWI: Srawi, NONE, interp::srawi;
    I_SC: Sc, TRAP, interp::sc;
    I_TWI: Twi, TRAP, interp::twi;
    I_TW: Tw, TRAP, interp::tw;
    I_SYNC: Sync, NONE, interp::sync;
    I_ISYNC: Isync, NONE, interp::isync;
    I_EIEIO: Eieio, NONE, interp::eieio;
    I_ILLEGAL: Illegal, NONE, interp::illegal;
}

/// The descriptor unknown words resolve to.
pub fn illegal_descriptor() -> &'static InstrInfo {
    &I_ILLEGAL
}

/// Decode one instruction word. Never fails; see `illegal_descriptor`.
pub fn decode(op: u32) -> &'static InstrInfo {
    match fields::opcd(op) {
        3 => &I_TWI,
        7 => &I_MULLI,
        8 => &I_SUBFIC,
        10 => &I_CMPLI,
        11 => &I_CMPI,
        12 => &I_ADDIC,
        13 => &I_ADDIC_RC,
        14 => &I_ADDI,
        15 => &I_ADDIS,
        16 => &I_BC,
        17 => &I_SC,
        18 => &I_B,
        19 => decode_19(op),
        20 => &I_RLWIMI,
        21 => &I_RLWINM,
        23 => &I_RLWNM,
        24 => &I_ORI,
        25 => &I_ORIS,
        26 => &I_XORI,
        27 => &I_XORIS,
        28 => &I_ANDI,
        29 => &I_ANDIS,
        31 => decode_31(op),
        32 => &I_LWZ,
        33 => &I_LWZU,
        34 => &I_LBZ,
        35 => &I_LBZU,
        36 => &I_STW,
        37 => &I_STWU,
        38 => &I_STB,
        39 => &I_STBU,
        40 => &I_LHZ,
        41 => &I_LHZU,
        42 => &I_LHA,
        43 => &I_LHAU,
        44 => &I_STH,
        45 => &I_STHU,
        _ => &I_ILLEGAL,
    }
}

fn decode_19(op: u32) -> &'static InstrInfo {
    match fields::xo(op) {
        0 => &I_MCRF,
        16 => &I_BCLR,
        33 => &I_CRNOR,
        129 => &I_CRANDC,
        150 => &I_ISYNC,
        193 => &I_CRXOR,
        225 => &I_CRNAND,
        257 => &I_CRAND,
        289 => &I_CREQV,
        417 => &I_CRORC,
        449 => &I_CROR,
        528 => &I_BCCTR,
        _ => &I_ILLEGAL,
    }
}

fn decode_31(op: u32) -> &'static InstrInfo {
    // OE-capable instructions are listed twice: XO and XO | 512.
    match fields::xo(op) {
        0 => &I_CMP,
        4 => &I_TW,
        8 | 520 => &I_SUBFC,
        10 | 522 => &I_ADDC,
        11 | 523 => &I_MULHWU,
        19 => &I_MFCR,
        23 => &I_LWZX,
        24 => &I_SLW,
        26 => &I_CNTLZW,
        28 => &I_AND,
        32 => &I_CMPL,
        40 | 552 => &I_SUBF,
        55 => &I_LWZUX,
        60 => &I_ANDC,
        75 | 587 => &I_MULHW,
        87 => &I_LBZX,
        104 | 616 => &I_NEG,
        119 => &I_LBZUX,
        124 => &I_NOR,
        136 | 648 => &I_SUBFE,
        138 | 650 => &I_ADDE,
        144 => &I_MTCRF,
        151 => &I_STWX,
        183 => &I_STWUX,
        200 | 712 => &I_SUBFZE,
        202 | 714 => &I_ADDZE,
        215 => &I_STBX,
        232 | 744 => &I_SUBFME,
        234 | 746 => &I_ADDME,
        235 | 747 => &I_MULLW,
        247 => &I_STBUX,
        266 | 778 => &I_ADD,
        279 => &I_LHZX,
        284 => &I_EQV,
        311 => &I_LHZUX,
        316 => &I_XOR,
        339 => &I_MFSPR,
        343 => &I_LHAX,
        375 => &I_LHAUX,
        407 => &I_STHX,
        412 => &I_ORC,
        439 => &I_STHUX,
        444 => &I_OR,
        459 | 971 => &I_DIVWU,
        467 => &I_MTSPR,
        476 => &I_NAND,
        491 | 1003 => &I_DIVW,
        512 => &I_MCRXR,
        536 => &I_SRW,
        598 => &I_SYNC,
        792 => &I_SRAW,
        824 => &I_SRAWI,
        854 => &I_EIEIO,
        922 => &I_EXTSH,
        954 => &I_EXTSB,
        _ => &I_ILLEGAL,
    }
}
