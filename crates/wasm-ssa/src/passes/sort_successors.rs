//! First pass in the pipeline (§4.3): recompute every live block's `succs`
//! list from its tail branch instructions, then sort it so the return-block
//! sentinel always sorts last and otherwise the successor whose first
//! instruction has the larger `InstrHandle` sorts first. `succs`'s order is
//! what `compute_rpo`'s DFS and the layout heuristics that follow treat as
//! "natural program order" — this is the one place that order is decided.
//!
//! `Builder::insert_instruction` already maintains `succs` incrementally as
//! branches are built, but later passes (and anything that mutates branch
//! targets directly, like critical-edge splitting) should not have to keep
//! that bookkeeping — or this ordering — in sync by hand, so this pass
//! rebuilds and re-sorts it from scratch every time it runs.

use crate::block::{BlockHandle, RETURN_BLOCK};
use crate::builder::core::Builder;
use crate::opcode::Opcode;
use std::cmp::Reverse;

pub fn run(b: &mut Builder) {
    for i in 0..b.blocks.len() {
        let handle = BlockHandle(i as u32);
        if b.block(handle).invalid {
            continue;
        }
        let branches = b.block(handle).tail_branches(&b.instructions);
        let mut succs = Vec::new();
        for (_, instr) in branches {
            if instr.opcode == Opcode::BrTable {
                succs.extend(instr.br_table_targets.iter().copied());
            } else if let Some(target) = instr.target {
                succs.push(target);
            }
        }
        // Stable sort: blocks that tie (same key — e.g. two empty,
        // instruction-less blocks built by a test harness with a nil root)
        // keep their relative program order.
        succs.sort_by_key(|&target| sort_key(b, target));
        b.block_mut(handle).succs = succs;
    }
}

/// `(is_return, Reverse(first_instr_id))`, ascending: the return-block
/// sentinel always sorts greatest (last); among regular blocks, the one
/// whose first instruction has the larger id sorts first. A block with no
/// instructions yet sorts as if its first id were `i64::MIN`, placing it
/// after any block that does have one — and, being a tie among such
/// blocks, stably after whichever came first in program order.
fn sort_key(b: &Builder, target: BlockHandle) -> (bool, Reverse<i64>) {
    if target == RETURN_BLOCK {
        return (true, Reverse(i64::MIN));
    }
    let first_id = b.block(target).head.map(|h| h.0 as i64).unwrap_or(i64::MIN);
    (false, Reverse(first_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Signature, SignatureId, Type, Value, ValueId};

    fn builder() -> Builder {
        let mut b = Builder::new();
        b.init(Signature { id: SignatureId(0), params: vec![], results: vec![], used: false });
        b
    }

    #[test]
    fn succs_reflects_conditional_then_fallthrough_order() {
        let mut b = builder();
        let entry = b.alloc_basic_block();
        let left = b.alloc_basic_block();
        let right = b.alloc_basic_block();

        b.set_current_block(entry);
        let cond = Value::new(ValueId(0), Type::I32);
        let h1 = b.alloc_instruction();
        b.instr_mut(h1).as_brnz(cond, left, &[]);
        b.insert_instruction(h1);
        let h2 = b.alloc_instruction();
        b.instr_mut(h2).as_jump(right, &[]);
        b.insert_instruction(h2);

        b.block_mut(entry).succs.clear(); // simulate drift
        run(&mut b);
        assert_eq!(b.block(entry).succs, vec![left, right]);
    }

    #[test]
    fn br_table_contributes_every_target() {
        let mut b = builder();
        let entry = b.alloc_basic_block();
        let t0 = b.alloc_basic_block();
        let t1 = b.alloc_basic_block();
        let default = b.alloc_basic_block();

        b.set_current_block(entry);
        let idx = Value::new(ValueId(0), Type::I32);
        let h = b.alloc_instruction();
        b.instr_mut(h).as_br_table(idx, vec![t0, t1, default]);
        b.insert_instruction(h);

        run(&mut b);
        assert_eq!(b.block(entry).succs, vec![t0, t1, default]);
    }
}
