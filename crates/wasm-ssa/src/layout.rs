//! Block layout (§4.3's tail): decide a physical order for the function's
//! blocks, split critical edges so layout always has somewhere safe to put
//! edge-specific work, invert conditional branches where doing so lets the
//! chosen order fall through instead of jump, and mark the jumps that
//! layout made free. `Builder::layout_blocks` runs this, then
//! `tail_duplication`, and returns the final order.

use crate::block::BlockHandle;
use crate::builder::analysis;
use crate::builder::core::Builder;
use crate::instr::InstrHandle;
use crate::opcode::Opcode;
use crate::passes::sort_successors;
use anyhow::Result;
use std::collections::HashMap;

pub fn layout_blocks(b: &mut Builder) -> Result<Vec<BlockHandle>> {
    sort_successors::run(b);
    analysis::compute_rpo(b);
    let pre_split_order = b.rpo.clone();

    invert_branches_for_fallthrough(b, &pre_split_order);
    sort_successors::run(b);

    let order = place_blocks_with_trampolines(b, &pre_split_order);
    mark_fallthrough_jumps(b, &order);

    crate::tail_duplication::run(b)?;

    sort_successors::run(b);
    analysis::compute_rpo(b);
    analysis::compute_dominators(b)?;
    analysis::compute_loop_headers(b);
    analysis::compute_loop_nesting(b);
    mark_fallthrough_jumps(b, &b.rpo.clone());
    Ok(b.rpo.clone())
}

/// Walk blocks in their pre-split reverse-postorder. For each one, first
/// emit any trampolines that were deferred waiting for it, then the block
/// itself, then split every critical edge leaving it. A split trampoline is
/// placed immediately (right after its source) when it carries the block's
/// tail jump or targets something at or before the source in the original
/// order (a back edge); otherwise it's deferred until its destination comes
/// up for emission, so it still lands immediately before that destination.
fn place_blocks_with_trampolines(b: &mut Builder, pre_split_order: &[BlockHandle]) -> Vec<BlockHandle> {
    let rpo_index: HashMap<BlockHandle, u32> =
        pre_split_order.iter().enumerate().map(|(i, &h)| (h, i as u32)).collect();
    let mut order: Vec<BlockHandle> = Vec::with_capacity(pre_split_order.len());
    let mut pending_before: HashMap<BlockHandle, Vec<BlockHandle>> = HashMap::new();

    for &u in pre_split_order {
        if b.block(u).invalid {
            continue;
        }
        if let Some(waiting) = pending_before.remove(&u) {
            order.extend(waiting);
        }
        order.push(u);

        let branches: Vec<InstrHandle> =
            b.block(u).tail_branches(&b.instructions).into_iter().map(|(h, _)| h).collect();
        let tail_jump = branches.last().copied().filter(|&h| b.instr(h).opcode == Opcode::Jump);

        for &h in &branches {
            let opcode = b.instr(h).opcode;
            let mut targets: Vec<BlockHandle> = if opcode == Opcode::BrTable {
                b.instr(h).br_table_targets.clone()
            } else {
                b.instr(h).target.into_iter().collect()
            };
            targets.sort();
            targets.dedup();

            for v in targets {
                if b.block(u).succs.len() < 2 || b.block(v).preds.len() < 2 {
                    continue;
                }
                let w = split_one_edge(b, u, h, v);
                let u_idx = rpo_index[&u];
                let v_idx = rpo_index.get(&v).copied().unwrap_or(u32::MAX);
                let emit_now = Some(h) == tail_jump || v_idx <= u_idx;
                if emit_now {
                    order.push(w);
                } else {
                    pending_before.entry(v).or_default().push(w);
                }
            }
        }
    }

    order
}

/// Split the edge `u -> v` carried by `u`'s tail branch `branch_h`: allocate
/// a trampoline block holding only an unconditional jump to `v`, rewrite
/// `branch_h` to target the trampoline instead (preserving its own
/// condition — only the destination changes), and fix up predecessor and
/// successor bookkeeping on both ends.
fn split_one_edge(b: &mut Builder, u: BlockHandle, branch_h: InstrHandle, v: BlockHandle) -> BlockHandle {
    let w = b.alloc_basic_block();

    {
        let instr = b.instr_mut(branch_h);
        if instr.opcode == Opcode::BrTable {
            for target in instr.br_table_targets.iter_mut() {
                if *target == v {
                    *target = w;
                }
            }
        } else {
            instr.target = Some(w);
        }
    }

    let args = if b.instr(branch_h).opcode == Opcode::BrTable {
        Vec::new()
    } else {
        b.instr(branch_h).branch_args().to_vec()
    };
    b.set_current_block(w);
    let jump: InstrHandle = b.alloc_instruction();
    b.instr_mut(jump).as_jump(v, &args);
    b.insert_instruction(jump);
    b.seal(w);

    b.block_mut(v).preds.retain(|p| !(p.block == u && p.branch == branch_h));
    for succ in b.block_mut(u).succs.iter_mut() {
        if *succ == v {
            *succ = w;
        }
    }
    w
}

/// For a block whose tail is a conditional branch followed by an
/// unconditional jump, swap which one is "taken" when doing so lets the
/// unconditional jump's target become the block placed immediately after
/// this one in `order` — turning what would be a jump into a fallthrough.
///
/// Besides the literal "conditional target is `next`" case, a conditional
/// target that is a loop header is also worth inverting onto: a loop
/// header's incoming edges are all critical by construction (a header has
/// more than one predecessor once there's a back edge), so every edge into
/// one gets a trampoline from `place_blocks_with_trampolines` and that
/// trampoline is what layout actually places next to its source, not the
/// header itself — inverting here still buys the fallthrough once that
/// trampoline lands, whether or not the jump arm currently happens to sit
/// next. A jump target that's already a loop header and not the conditional
/// target is never worth inverting away from for the same reason: its own
/// edge will be split and land a trampoline in `next` regardless of which
/// branch carries it.
fn invert_branches_for_fallthrough(b: &mut Builder, order: &[BlockHandle]) {
    for (i, &blk) in order.iter().enumerate() {
        if b.block(blk).invalid {
            continue;
        }
        let next = order.get(i + 1).copied();
        let branches: Vec<InstrHandle> =
            b.block(blk).tail_branches(&b.instructions).into_iter().map(|(h, _)| h).collect();
        if branches.len() != 2 {
            continue;
        }
        let (cond_h, jump_h) = (branches[0], branches[1]);
        let cond_opcode = b.instr(cond_h).opcode;
        if !matches!(cond_opcode, Opcode::Brz | Opcode::Brnz) {
            continue;
        }
        let cond_target = b.instr(cond_h).target;
        let jump_target = b.instr(jump_h).target;
        if cond_target == jump_target {
            continue; // both arms agree, nothing to gain either way
        }
        let cond_is_header = cond_target.is_some_and(|t| b.block(t).loop_header);
        if cond_target == next || cond_is_header {
            invert_branch_pair(b, blk, cond_h, jump_h);
        }
        // Otherwise leave it: either the jump already falls through, or
        // neither arm stands to gain from swapping.
    }
}

fn invert_branch_pair(b: &mut Builder, blk: BlockHandle, cond_h: InstrHandle, jump_h: InstrHandle) {
    let (cond_opcode, cond_target, cond_args) = {
        let i = b.instr(cond_h);
        (i.opcode, i.target, i.vs.clone())
    };
    let (jump_target, jump_args) = {
        let i = b.instr(jump_h);
        (i.target, i.vs.clone())
    };
    let inverted = match cond_opcode {
        Opcode::Brz => Opcode::Brnz,
        Opcode::Brnz => Opcode::Brz,
        _ => unreachable!("invert_branch_pair: {cond_h} is not a conditional branch"),
    };
    {
        let i = b.instr_mut(cond_h);
        i.opcode = inverted;
        i.target = jump_target;
        i.vs = jump_args;
    }
    {
        let i = b.instr_mut(jump_h);
        i.target = cond_target;
        i.vs = cond_args;
    }

    // The targets' predecessor lists still record the pre-swap branch
    // handle for this edge; re-point each to the instruction that now
    // actually carries it.
    if let Some(t) = jump_target {
        for p in b.block_mut(t).preds.iter_mut() {
            if p.block == blk && p.branch == jump_h {
                p.branch = cond_h;
            }
        }
    }
    if let Some(t) = cond_target {
        for p in b.block_mut(t).preds.iter_mut() {
            if p.block == blk && p.branch == cond_h {
                p.branch = jump_h;
            }
        }
    }
}

/// Flag every tail `jump` (never a conditional branch or `br_table`) whose
/// target is the literally next block in `order` — the one case the
/// backend can emit with no branch instruction at all.
fn mark_fallthrough_jumps(b: &mut Builder, order: &[BlockHandle]) {
    for (i, &blk) in order.iter().enumerate() {
        if b.block(blk).invalid {
            continue;
        }
        let next = order.get(i + 1).copied();
        let branches: Vec<InstrHandle> =
            b.block(blk).tail_branches(&b.instructions).into_iter().map(|(h, _)| h).collect();
        for h in branches {
            let instr = b.instr_mut(h);
            instr.is_fallthrough = instr.opcode == Opcode::Jump && instr.target == next;
        }
    }
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
    fn a_diamond_with_no_critical_edges_gains_no_trampolines() {
        let mut b = builder();
        let entry = b.alloc_basic_block();
        let left = b.alloc_basic_block();
        let right = b.alloc_basic_block();
        let join = b.alloc_basic_block();

        b.set_current_block(entry);
        let cond = Value::new(ValueId(0), Type::I32);
        let h = b.alloc_instruction();
        b.instr_mut(h).as_brnz(cond, left, &[]);
        b.insert_instruction(h);
        let h2 = b.alloc_instruction();
        b.instr_mut(h2).as_jump(right, &[]);
        b.insert_instruction(h2);
        b.seal(entry);

        b.set_current_block(left);
        let h3 = b.alloc_instruction();
        b.instr_mut(h3).as_jump(join, &[]);
        b.insert_instruction(h3);
        b.seal(left);

        b.set_current_block(right);
        let h4 = b.alloc_instruction();
        b.instr_mut(h4).as_jump(join, &[]);
        b.insert_instruction(h4);
        b.seal(right);
        b.seal(join);

        // entry has two successors, but neither left nor right has more
        // than one predecessor, so no edge here is actually critical.
        layout_blocks(&mut b).unwrap();
        assert_eq!(b.blocks.len(), 4);
    }

    #[test]
    fn fallthrough_jump_is_marked_when_its_target_is_next_in_order() {
        let mut b = builder();
        let entry = b.alloc_basic_block();
        let next = b.alloc_basic_block();
        b.set_current_block(entry);
        let h = b.alloc_instruction();
        b.instr_mut(h).as_jump(next, &[]);
        b.insert_instruction(h);
        b.seal(entry);
        b.seal(next);

        let order = vec![entry, next];
        mark_fallthrough_jumps(&mut b, &order);
        assert!(b.instr(h).is_fallthrough);
    }

    #[test]
    fn conditional_branches_are_never_marked_fallthrough() {
        let mut b = builder();
        let entry = b.alloc_basic_block();
        let taken = b.alloc_basic_block();
        let other = b.alloc_basic_block();

        b.set_current_block(entry);
        let cond = Value::new(ValueId(0), Type::I32);
        let cond_h = b.alloc_instruction();
        b.instr_mut(cond_h).as_brnz(cond, taken, &[]);
        b.insert_instruction(cond_h);
        let jump_h = b.alloc_instruction();
        b.instr_mut(jump_h).as_jump(other, &[]);
        b.insert_instruction(jump_h);
        b.seal(entry);
        b.seal(taken);
        b.seal(other);

        // `taken` sits right after `entry` in this order, so the conditional
        // branch's target is literally next — but it must never be marked
        // fallthrough, since only an unconditional jump can be.
        let order = vec![entry, taken, other];
        mark_fallthrough_jumps(&mut b, &order);
        assert!(!b.instr(cond_h).is_fallthrough);
    }

    #[test]
    fn branch_inversion_turns_the_taken_target_into_the_fallthrough() {
        let mut b = builder();
        let entry = b.alloc_basic_block();
        let taken = b.alloc_basic_block();
        let other = b.alloc_basic_block();

        b.set_current_block(entry);
        let cond = Value::new(ValueId(0), Type::I32);
        let cond_h = b.alloc_instruction();
        b.instr_mut(cond_h).as_brnz(cond, taken, &[]);
        b.insert_instruction(cond_h);
        let jump_h = b.alloc_instruction();
        b.instr_mut(jump_h).as_jump(other, &[]);
        b.insert_instruction(jump_h);
        b.seal(entry);
        b.seal(taken);
        b.seal(other);

        // Layout places `taken` immediately after `entry` — the opposite
        // of what the branch currently falls through to.
        let order = vec![entry, taken, other];
        invert_branches_for_fallthrough(&mut b, &order);

        assert_eq!(b.instr(cond_h).opcode, Opcode::Brz);
        assert_eq!(b.instr(cond_h).target, Some(other));
        assert_eq!(b.instr(jump_h).target, Some(taken));
    }
}
