//! wasm-ssa — SSA intermediate representation builder and optimizer for a
//! WebAssembly ahead-of-time compilation backend.
//!
//! This crate owns one stage of a larger AOT pipeline: turning a decoded
//! function body into an optimized, laid-out SSA-form IR a code generator
//! can walk linearly. It does not decode WebAssembly bytecode and it does
//! not emit machine code — both sides are external collaborators.
//!
//! The pipeline, end to end:
//!
//! ```no_run
//! use wasm_ssa::{Builder, Signature, SignatureId, Type};
//!
//! let mut b = Builder::new();
//! b.init(Signature { id: SignatureId(0), params: vec![], results: vec![Type::I32], used: false });
//!
//! let entry = b.alloc_basic_block();
//! b.set_current_block(entry);
//! let zero = b.new_value(Type::I32);
//! let h = b.alloc_instruction();
//! b.instr_mut(h).as_iconst(zero, 0);
//! b.insert_instruction(h);
//! let ret = b.alloc_instruction();
//! b.instr_mut(ret).as_return(&[zero]);
//! b.insert_instruction(ret);
//! b.seal(entry);
//!
//! b.run_passes().unwrap();
//! let order = b.layout_blocks().unwrap();
//! assert!(!order.is_empty());
//! ```

pub mod block;
pub mod builder;
pub mod debug;
pub mod instr;
pub mod layout;
pub mod opcode;
pub mod passes;
pub mod tail_duplication;
pub mod types;

pub use anyhow::{Error, Result};
pub use block::{BasicBlock, BlockHandle, Predecessor, RETURN_BLOCK};
pub use builder::{dominates, dominator_lca, enclosing_loop, loop_children, Builder};
pub use debug::dump_function;
pub use instr::{InstrHandle, Instruction};
pub use opcode::{Opcode, ReturnRule, SideEffect};
pub use types::{Signature, SignatureId, Type, Value, ValueId, Variable};
