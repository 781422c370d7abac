//! The debug textual format (§6): a line-oriented dump of a function's IR,
//! used for tests and diagnostics. Not consumed by the backend — this is the
//! one place in the crate that exists purely for humans reading a failing
//! test's output.
//!
//! Each block gets a header line naming its parameters and predecessors:
//!
//! ```text
//! blk0: () <-- ()
//!     v0 = iconst 3
//!     store v0 v0
//! blk1: (v2) <-- (blk0)
//!     return v2
//! ```
//!
//! followed by its instructions, one per line, indented and prefixed with
//! the result(s) they define (nothing, for instructions with no result).

use crate::block::BlockHandle;
use crate::builder::core::Builder;
use crate::instr::Instruction;
use crate::opcode::Opcode;
use crate::types::Value;
use std::fmt::Write as _;

/// Dump every live block of `b`'s current function in block-allocation
/// order. Invalid (dead-eliminated) blocks are skipped — they carry nothing
/// a reader of the dump would want to see.
pub fn dump_function(b: &Builder) -> String {
    let mut out = String::new();
    for handle in b.block_handles() {
        let block = b.block(handle);
        if block.invalid {
            continue;
        }
        write_block_header(&mut out, b, handle);
        for (_, instr) in block.instructions(&b.instructions) {
            write_instruction(&mut out, instr);
        }
    }
    out
}

fn write_block_header(out: &mut String, b: &Builder, handle: BlockHandle) {
    let block = b.block(handle);
    let params = join(block.params.iter().map(|v| v.to_string()));
    let preds = join(block.preds.iter().map(|p| p.block.to_string()));
    let _ = writeln!(out, "{handle}: ({params}) <-- ({preds})");
}

fn write_instruction(out: &mut String, instr: &Instruction) {
    let mut results: Vec<Value> = Vec::new();
    if instr.r_value.is_valid() {
        results.push(instr.r_value);
    }
    results.extend(instr.r_values.iter().copied());

    let lhs = if results.is_empty() {
        String::new()
    } else {
        format!("{} = ", join(results.iter().map(|v| v.to_string())))
    };

    let _ = write!(out, "    {lhs}{}", instr.opcode);
    for operand in operands(instr) {
        let _ = write!(out, " {operand}");
    }
    if let Some(target) = instr.target {
        let _ = write!(out, " -> {target}");
    }
    if !instr.br_table_targets.is_empty() {
        let _ = write!(out, " -> [{}]", join(instr.br_table_targets.iter().map(|t| t.to_string())));
    }
    let _ = writeln!(out);
}

/// The scalar and overflow operands worth printing, in the order an
/// instruction's setters fill them — `vs` holds either a variadic argument
/// list (call args, branch args) or nothing, so scalar slots and `vs` never
/// overlap meaningfully for any single opcode.
fn operands(instr: &Instruction) -> Vec<Value> {
    let mut out = Vec::new();
    if instr.opcode == Opcode::BrTable {
        if instr.v.is_valid() {
            out.push(instr.v);
        }
        return out;
    }
    for v in [instr.v, instr.v2, instr.v3] {
        if v.is_valid() {
            out.push(v);
        }
    }
    out.extend(instr.vs.iter().copied());
    out
}

fn join<I: IntoIterator<Item = String>>(items: I) -> String {
    items.into_iter().collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Signature, SignatureId, Type, ValueId};

    fn builder() -> Builder {
        let mut b = Builder::new();
        b.init(Signature { id: SignatureId(0), params: vec![], results: vec![Type::I32], used: false });
        b
    }

    #[test]
    fn block_header_lists_params_and_preds() {
        let mut b = builder();
        let entry = b.alloc_basic_block();
        let exit = b.alloc_basic_block();

        b.set_current_block(entry);
        let zero = b.new_value(Type::I32);
        let h = b.alloc_instruction();
        b.instr_mut(h).as_iconst(zero, 0);
        b.insert_instruction(h);
        let jump = b.alloc_instruction();
        b.instr_mut(jump).as_jump(exit, &[zero]);
        b.insert_instruction(jump);
        b.seal(entry);

        b.set_current_block(exit);
        let param = b.add_param(exit, Type::I32);
        let ret = b.alloc_instruction();
        b.instr_mut(ret).as_return(&[param]);
        b.insert_instruction(ret);
        b.seal(exit);

        let dump = dump_function(&b);
        assert!(dump.contains("blk0: () <-- ()"));
        assert!(dump.contains(&format!("blk1: ({param}) <-- (blk0)")));
    }

    #[test]
    fn instruction_line_shows_result_and_operands() {
        let mut b = builder();
        let entry = b.alloc_basic_block();
        b.set_current_block(entry);
        let lhs = Value::new(ValueId(0), Type::I32);
        let rhs = Value::new(ValueId(1), Type::I32);
        let result = Value::new(ValueId(2), Type::I32);
        let h = b.alloc_instruction();
        b.instr_mut(h).as_iadd(result, lhs, rhs);
        b.insert_instruction(h);
        let ret = b.alloc_instruction();
        b.instr_mut(ret).as_return(&[result]);
        b.insert_instruction(ret);
        b.seal(entry);

        let dump = dump_function(&b);
        assert!(dump.contains(&format!("    {result} = Iadd {lhs} {rhs}")));
    }

    #[test]
    fn dead_blocks_are_skipped() {
        let mut b = builder();
        let entry = b.alloc_basic_block();
        let dead = b.alloc_basic_block();
        b.set_current_block(entry);
        let ret = b.alloc_instruction();
        b.instr_mut(ret).as_return(&[]);
        b.insert_instruction(ret);
        b.seal(entry);
        b.block_mut(dead).invalid = true;

        let dump = dump_function(&b);
        assert!(!dump.contains("blk1"));
    }
}
