#![doc = r#"
ppcgen library crate.

Dynamic binary translation core for a 32-bit user-mode PowerPC emulator:
reads guest instructions, compiles one basic block at a time into a
bounded host code buffer, and hands the finished block back to the
dispatcher. Unhandled instructions defer to a per-opcode interpreter at
run time.

Modules:
- cpu: architectural state (GPR/CR/XER/LR/CTR/PC), opcode field
  extractors, shared ALU semantics, and the instruction decoder
- interp: per-opcode interpreter handlers used by the generic fallback
  and as the reference semantics in tests
- jit: the block compiler, the typed emitter facade over the code
  buffer, and the block cache
- mem: the guest memory trait (big-endian accessors) and a flat RAM
  implementation

In tests, shared program builders are available under
`crate::test_utils`.
"#]

pub mod cpu;
pub mod interp;
pub mod jit;
pub mod mem;

// Re-export commonly used types at the crate root for convenience.
pub use cpu::CpuState;
pub use cpu::table::{CFlow, InstrInfo, Mnemo, decode};
pub use interp::Exception;
pub use jit::{BlockCache, BlockInfo, Jit, JitConfig, SprModel};
pub use mem::{FlatMem, GuestMem};

// Shared test utilities (only compiled for tests)
#[cfg(test)]
pub(crate) mod test_utils;
