//! Tail duplication (§4.3's last layout step): a block reached from many
//! predecessors, ending in a plain jump, is a join point that's cheap to
//! eliminate by copying its body into each predecessor directly — trading
//! code size for one fewer branch on every path through it.
//!
//! A block is a candidate when it (a) isn't the return block, (b) has at
//! least 5 predecessors, (c) has at least one block parameter, (d) has at
//! most 10 instructions, each with at most one result, (e) references at
//! least 10 operand values across its body, (f) ends in an unconditional
//! jump to a non-return target, and (g) has exactly one successor.
//!
//! Duplicating is safe without renaming every operand: a value used inside
//! the block that the block didn't itself define must — by the ordinary
//! SSA rule that a definition dominates all its uses — dominate the block,
//! and dominating the block means dominating every one of its predecessors
//! too (any path to a predecessor extends to a path to the block along the
//! predecessor's edge). So only two kinds of value need a fresh identity
//! per copy: the block's own parameters (resolved per-predecessor from
//! that predecessor's branch arguments) and the block's locally-defined
//! results (resolved to a fresh value in each copy, since after
//! duplication there's more than one place that "defines" them). If any
//! locally-defined value is still referenced from outside the block — only
//! possible when the block dominates its jump target, since otherwise no
//! definition inside it could dominate a use past that target — the target
//! gains a fresh block parameter for it, fed by each duplicate's own copy.

use crate::block::BlockHandle;
use crate::builder::analysis;
use crate::builder::core::Builder;
use crate::instr::{InstrHandle, Instruction};
use crate::opcode::Opcode;
use crate::passes::alias;
use crate::types::{Value, ValueId};
use anyhow::Result;
use smallvec::SmallVec;
use std::collections::{HashMap, HashSet};

pub fn run(b: &mut Builder) -> Result<()> {
    loop {
        crate::passes::sort_successors::run(b);
        analysis::compute_rpo(b);
        analysis::compute_dominators(b)?;
        if !try_duplicate_one(b)? {
            return Ok(());
        }
    }
}

fn try_duplicate_one(b: &mut Builder) -> Result<bool> {
    for i in 0..b.blocks.len() {
        let handle = BlockHandle(i as u32);
        if is_candidate(b, handle) {
            duplicate(b, handle)?;
            return Ok(true);
        }
    }
    Ok(false)
}

fn is_candidate(b: &Builder, handle: BlockHandle) -> bool {
    let block = b.block(handle);
    if block.invalid || block.preds.len() < 5 || block.params.is_empty() {
        return false;
    }
    let body: Vec<(InstrHandle, &Instruction)> = block.instructions(&b.instructions).collect();
    if body.len() > 10 || body.iter().any(|(_, i)| !i.r_values.is_empty()) {
        return false;
    }
    let operand_refs: usize = body
        .iter()
        .map(|(_, i)| {
            [i.v, i.v2, i.v3].iter().filter(|v| v.is_valid()).count() + i.vs.len()
        })
        .sum();
    if operand_refs < 10 {
        return false;
    }
    let Some((_, tail)) = body.last() else { return false };
    tail.opcode == Opcode::Jump
        && tail.target.is_some_and(|t| t != crate::block::RETURN_BLOCK)
        && block.succs.len() == 1
}

fn duplicate(b: &mut Builder, handle: BlockHandle) -> Result<()> {
    let preds = b.block(handle).preds.clone();
    let params = b.block(handle).params.clone();
    let body: Vec<(InstrHandle, Instruction)> = b
        .block(handle)
        .instructions(&b.instructions)
        .map(|(h, i)| (h, i.clone()))
        .collect();
    let own_instrs: HashSet<InstrHandle> = body.iter().map(|(h, _)| *h).collect();

    let (_, tail) = body.last().expect("candidate has at least one instruction").clone();
    let dest = tail.target.expect("candidate ends in a jump");
    let jump_args = tail.vs.clone();
    let dest_dominated = analysis::dominates(b, handle, dest);

    let locally_defined: HashSet<ValueId> = body[..body.len() - 1]
        .iter()
        .filter(|(_, i)| i.r_value.is_valid())
        .map(|(_, i)| i.r_value.id())
        .collect();

    let externally_used: Vec<Value> = if dest_dominated {
        find_externally_used(b, &own_instrs, &locally_defined)
    } else {
        Vec::new()
    };

    let mut dest_params_added: Vec<(ValueId, Value)> = Vec::new();
    for original in &externally_used {
        let new_param = b.add_param(dest, original.ty());
        alias::set(b, *original, new_param);
        dest_params_added.push((original.id(), new_param));
    }

    for pred in &preds {
        let pred_args = b.instr(pred.branch).branch_args().to_vec();
        let mut value_map: HashMap<ValueId, Value> = HashMap::new();
        for (param, arg) in params.iter().zip(pred_args.iter()) {
            value_map.insert(param.id(), *arg);
        }

        unlink_branch(b, pred.block, pred.branch, handle);
        b.set_current_block(pred.block);

        for (_, instr) in &body[..body.len() - 1] {
            let mut cloned = instr.clone();
            remap_operands(&mut cloned, &value_map);
            if cloned.r_value.is_valid() {
                let fresh = b.new_value(cloned.r_value.ty());
                value_map.insert(cloned.r_value.id(), fresh);
                cloned.r_value = fresh;
            }
            cloned.prev = None;
            cloned.next = None;
            cloned.group = 0;
            cloned.live = false;
            cloned.is_fallthrough = false;

            let new_h = b.alloc_instruction();
            *b.instr_mut(new_h) = cloned;
            b.insert_instruction(new_h);
        }

        let mut new_args: SmallVec<[Value; 4]> =
            jump_args.iter().map(|&a| remap(a, &value_map)).collect();
        for (original_id, _) in &dest_params_added {
            let mapped = value_map
                .get(original_id)
                .copied()
                .expect("every locally-defined live-out value was remapped while cloning the body");
            new_args.push(mapped);
        }

        let jump_h = b.alloc_instruction();
        b.instr_mut(jump_h).as_jump(dest, &new_args);
        b.insert_instruction(jump_h);
    }

    b.block_mut(handle).invalid = true;
    b.block_mut(handle).preds.clear();
    Ok(())
}

fn remap_operands(instr: &mut Instruction, value_map: &HashMap<ValueId, Value>) {
    instr.v = remap(instr.v, value_map);
    instr.v2 = remap(instr.v2, value_map);
    instr.v3 = remap(instr.v3, value_map);
    for v in instr.vs.iter_mut() {
        *v = remap(*v, value_map);
    }
}

fn remap(v: Value, value_map: &HashMap<ValueId, Value>) -> Value {
    if !v.is_valid() {
        return v;
    }
    value_map.get(&v.id()).copied().unwrap_or(v)
}

/// Values defined inside the duplicated block's body that are referenced by
/// some instruction outside it — the live-out set that must become fresh
/// parameters on the jump's destination instead of being silently dropped.
fn find_externally_used(
    b: &Builder,
    own_instrs: &HashSet<InstrHandle>,
    locally_defined: &HashSet<ValueId>,
) -> Vec<Value> {
    let mut seen = HashSet::new();
    let mut found = Vec::new();
    for (i, instr) in b.instructions.iter().enumerate() {
        if own_instrs.contains(&InstrHandle(i as u32)) {
            continue;
        }
        for operand in [instr.v, instr.v2, instr.v3].into_iter().chain(instr.vs.iter().copied()) {
            if operand.is_valid() && locally_defined.contains(&operand.id()) && seen.insert(operand.id()) {
                found.push(operand);
            }
        }
    }
    found
}

/// Detach `branch` from `owner`'s instruction list and drop the stale
/// successor edge it used to contribute — the predecessor's control flow
/// now continues through the duplicated body and a fresh jump instead.
fn unlink_branch(b: &mut Builder, owner: BlockHandle, branch: InstrHandle, old_target: BlockHandle) {
    let prev = b.instr(branch).prev;
    let next = b.instr(branch).next;
    match prev {
        Some(p) => b.instr_mut(p).next = next,
        None => b.block_mut(owner).head = next,
    }
    match next {
        Some(n) => b.instr_mut(n).prev = prev,
        None => b.block_mut(owner).tail = prev,
    }
    b.block_mut(owner).succs.retain(|&s| s != old_target);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Signature, SignatureId, Type};

    fn builder() -> Builder {
        let mut b = Builder::new();
        b.init(Signature { id: SignatureId(0), params: vec![], results: vec![], used: false });
        b
    }

    /// Build a chain `pred -> join` where `join` is given one parameter and
    /// a body wide/long enough to satisfy the size and operand-count gates,
    /// ending in an unconditional jump to `dest`.
    fn wire_predecessor(b: &mut Builder, join: BlockHandle, seed: u64) -> BlockHandle {
        let pred = b.alloc_basic_block();
        b.set_current_block(pred);
        let arg = Value::new(ValueId(1_000_000 + seed as u32), Type::I32);
        let h = b.alloc_instruction();
        b.instr_mut(h).as_iconst(arg, seed);
        b.insert_instruction(h);
        let jump = b.alloc_instruction();
        b.instr_mut(jump).as_jump(join, &[arg]);
        b.insert_instruction(jump);
        b.seal(pred);
        pred
    }

    #[test]
    fn a_wide_join_block_is_duplicated_into_every_predecessor() {
        let mut b = builder();
        let join = b.alloc_basic_block();
        let dest = b.alloc_basic_block();

        let preds: Vec<BlockHandle> = (0..5).map(|i| wire_predecessor(&mut b, join, i)).collect();

        b.set_current_block(join);
        let param = b.add_param(join, Type::I32);
        let mut last = param;
        for i in 0..9u64 {
            let result = Value::new(ValueId(2_000_000 + i as u32), Type::I32);
            let h = b.alloc_instruction();
            b.instr_mut(h).as_iadd(result, last, last);
            b.insert_instruction(h);
            last = result;
        }
        let jump = b.alloc_instruction();
        b.instr_mut(jump).as_jump(dest, &[]);
        b.insert_instruction(jump);
        b.seal(join);
        b.seal(dest);

        run(&mut b).unwrap();

        assert!(b.block(join).invalid);
        for pred in &preds {
            assert!(b.block(*pred).succs.contains(&dest));
        }
    }

    #[test]
    fn a_block_with_too_few_predecessors_is_left_alone() {
        let mut b = builder();
        let join = b.alloc_basic_block();
        let dest = b.alloc_basic_block();

        let _preds: Vec<BlockHandle> = (0..2).map(|i| wire_predecessor(&mut b, join, i)).collect();

        b.set_current_block(join);
        let param = b.add_param(join, Type::I32);
        let mut last = param;
        for i in 0..9u64 {
            let result = Value::new(ValueId(3_000_000 + i as u32), Type::I32);
            let h = b.alloc_instruction();
            b.instr_mut(h).as_iadd(result, last, last);
            b.insert_instruction(h);
            last = result;
        }
        let jump = b.alloc_instruction();
        b.instr_mut(jump).as_jump(dest, &[]);
        b.insert_instruction(jump);
        b.seal(join);
        b.seal(dest);

        run(&mut b).unwrap();
        assert!(!b.block(join).invalid);
    }
}
