//! Dead-code elimination and instruction grouping (§4.3, §4.4) — the last
//! pass before block layout.
//!
//! Two things happen in one walk:
//!
//! - **Grouping**: every instruction gets a `group` id. The id bumps after
//!   each `SideEffect::Strict` instruction in reverse-postorder block
//!   order, so two instructions share a group only if no Strict boundary
//!   separates them — the unit later passes (and a backend's scheduler)
//!   may freely reorder within.
//! - **Liveness**: a mark/sweep starting from every `Strict`/`Trap`
//!   instruction (which must stay regardless of whether anything
//!   references their result) and every other instruction transitively
//!   reachable through operands. This is also where the alias table gets
//!   flushed: each operand is resolved to its canonical value and written
//!   back before the defining instruction is pushed onto the worklist —
//!   the one place a deferred alias finally turns into a real rewrite.

use crate::block::BlockHandle;
use crate::builder::core::Builder;
use crate::instr::InstrHandle;
use crate::opcode::SideEffect;
use crate::passes::alias;
use crate::types::{Value, ValueId};
use smallvec::SmallVec;
use std::collections::HashMap;

pub fn run(b: &mut Builder) -> anyhow::Result<()> {
    assign_groups(b);

    let value_defs = build_value_defs(b);
    let mut live = vec![false; b.instructions.len()];
    let mut worklist = Vec::new();

    for i in 0..b.blocks.len() {
        let handle = BlockHandle(i as u32);
        if b.block(handle).invalid {
            continue;
        }
        let instrs: Vec<InstrHandle> =
            b.block(handle).instructions(&b.instructions).map(|(h, _)| h).collect();
        for ih in instrs {
            if b.instr(ih).opcode.side_effect() != SideEffect::None && !live[ih.0 as usize] {
                live[ih.0 as usize] = true;
                worklist.push(ih);
            }
        }
    }

    while let Some(ih) = worklist.pop() {
        resolve_and_mark_operands(b, ih, &value_defs, &mut live, &mut worklist);
    }

    for (i, instr) in b.instructions.iter_mut().enumerate() {
        instr.live = live[i];
    }

    b.value_ref_counts = count_value_refs(b, &live);

    for i in 0..b.blocks.len() {
        let handle = BlockHandle(i as u32);
        if !b.block(handle).invalid {
            relink_live_instructions(b, handle);
        }
    }

    Ok(())
}

fn assign_groups(b: &mut Builder) {
    let mut group = 0u32;
    let order = b.rpo.clone();
    for blk in order {
        if b.block(blk).invalid {
            continue;
        }
        let instrs: Vec<InstrHandle> =
            b.block(blk).instructions(&b.instructions).map(|(h, _)| h).collect();
        for ih in instrs {
            b.instr_mut(ih).group = group;
            if b.instr(ih).opcode.side_effect() == SideEffect::Strict {
                group += 1;
            }
        }
    }
}

fn build_value_defs(b: &Builder) -> HashMap<ValueId, InstrHandle> {
    let mut defs = HashMap::new();
    for (i, instr) in b.instructions.iter().enumerate() {
        if instr.r_value.is_valid() {
            defs.insert(instr.r_value.id(), InstrHandle(i as u32));
        }
        for rv in &instr.r_values {
            if rv.is_valid() {
                defs.insert(rv.id(), InstrHandle(i as u32));
            }
        }
    }
    defs
}

fn resolve_and_mark_operands(
    b: &mut Builder,
    ih: InstrHandle,
    value_defs: &HashMap<ValueId, InstrHandle>,
    live: &mut [bool],
    worklist: &mut Vec<InstrHandle>,
) {
    let (v, v2, v3, vs): (Value, Value, Value, SmallVec<[Value; 4]>) = {
        let instr = b.instr(ih);
        (instr.v, instr.v2, instr.v3, instr.vs.clone())
    };

    let rv = mark_operand(b, v, value_defs, live, worklist);
    let rv2 = mark_operand(b, v2, value_defs, live, worklist);
    let rv3 = mark_operand(b, v3, value_defs, live, worklist);
    let rvs: SmallVec<[Value; 4]> =
        vs.iter().map(|&val| mark_operand(b, val, value_defs, live, worklist)).collect();

    let instr = b.instr_mut(ih);
    instr.v = rv;
    instr.v2 = rv2;
    instr.v3 = rv3;
    instr.vs = rvs;
}

/// Resolve `operand` to its canonical value and, the first time it's seen,
/// mark its defining instruction live and push it onto the worklist.
/// Returns the canonical value, to be written back into the operand slot
/// that referenced it.
fn mark_operand(
    b: &Builder,
    operand: Value,
    value_defs: &HashMap<ValueId, InstrHandle>,
    live: &mut [bool],
    worklist: &mut Vec<InstrHandle>,
) -> Value {
    if !operand.is_valid() {
        return operand;
    }
    let canonical = alias::resolve(b, operand);
    if let Some(&def) = value_defs.get(&canonical.id()) {
        if !live[def.0 as usize] {
            live[def.0 as usize] = true;
            worklist.push(def);
        }
    }
    canonical
}

/// Reference count per `ValueId`, one increment per operand use on a
/// surviving instruction (§4.3 step 6, §6's "value reference-count array").
/// Operands have already been rewritten to their canonical (alias-resolved)
/// values by `resolve_and_mark_operands` by the time this runs.
fn count_value_refs(b: &Builder, live: &[bool]) -> Vec<u32> {
    let mut counts = vec![0u32; b.value_count() as usize];
    for (i, instr) in b.instructions.iter().enumerate() {
        if !live[i] {
            continue;
        }
        for operand in [instr.v, instr.v2, instr.v3].into_iter().chain(instr.vs.iter().copied()) {
            if operand.is_valid() {
                counts[operand.id().0 as usize] += 1;
            }
        }
    }
    counts
}

fn relink_live_instructions(b: &mut Builder, handle: BlockHandle) {
    let chain: Vec<InstrHandle> = b
        .block(handle)
        .instructions(&b.instructions)
        .filter(|(_, instr)| instr.live)
        .map(|(h, _)| h)
        .collect();

    let mut prev = None;
    for &h in &chain {
        b.instr_mut(h).prev = prev;
        if let Some(p) = prev {
            b.instr_mut(p).next = Some(h);
        }
        prev = Some(h);
    }
    if let Some(&last) = chain.last() {
        b.instr_mut(last).next = None;
    }
    b.block_mut(handle).head = chain.first().copied();
    b.block_mut(handle).tail = chain.last().copied();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::analysis::compute_rpo;
    use crate::opcode::Opcode;
    use crate::types::{Signature, SignatureId, Type, ValueId};

    fn builder() -> Builder {
        let mut b = Builder::new();
        b.init(Signature { id: SignatureId(0), params: vec![], results: vec![], used: false });
        b
    }

    // ── Liveness ─────────────────────────────────────────────────────────

    #[test]
    fn an_unused_pure_instruction_is_swept() {
        let mut b = builder();
        let entry = b.alloc_basic_block();
        b.set_current_block(entry);

        let unused_result = Value::new(ValueId(0), Type::I32);
        let h = b.alloc_instruction();
        b.instr_mut(h).as_iconst(unused_result, 7);
        b.insert_instruction(h);

        let exit_code = Value::new(ValueId(1), Type::I32);
        let h2 = b.alloc_instruction();
        b.instr_mut(h2).as_iconst(exit_code, 0);
        b.insert_instruction(h2);
        let h3 = b.alloc_instruction();
        b.instr_mut(h3).as_return(&[exit_code]);
        b.insert_instruction(h3);
        b.seal(entry);

        compute_rpo(&mut b);
        run(&mut b).unwrap();

        assert!(!b.instr(h).live);
        assert!(b.instr(h2).live);
        assert!(b.instr(h3).live);
        assert_eq!(b.block(entry).instructions(&b.instructions).count(), 2);
    }

    #[test]
    fn a_trapping_instruction_stays_live_even_if_unused() {
        let mut b = builder();
        let entry = b.alloc_basic_block();
        b.set_current_block(entry);

        let lhs = Value::new(ValueId(0), Type::I32);
        let rhs = Value::new(ValueId(1), Type::I32);
        let h0 = b.alloc_instruction();
        b.instr_mut(h0).as_iconst(lhs, 10);
        b.insert_instruction(h0);
        let h1 = b.alloc_instruction();
        b.instr_mut(h1).as_iconst(rhs, 2);
        b.insert_instruction(h1);

        let result = Value::new(ValueId(2), Type::I32);
        let div = b.alloc_instruction();
        b.instr_mut(div).as_binop(Opcode::Sdiv, result, lhs, rhs);
        b.insert_instruction(div);

        let h2 = b.alloc_instruction();
        b.instr_mut(h2).as_return(&[]);
        b.insert_instruction(h2);
        b.seal(entry);

        compute_rpo(&mut b);
        run(&mut b).unwrap();
        assert!(b.instr(div).live);
    }

    // ── Aliases get flushed ──────────────────────────────────────────────

    #[test]
    fn an_aliased_operand_is_rewritten_to_its_canonical_value() {
        let mut b = builder();
        let entry = b.alloc_basic_block();
        b.set_current_block(entry);

        let original = Value::new(ValueId(0), Type::I32);
        let canonical = Value::new(ValueId(1), Type::I32);
        alias::set(&mut b, original, canonical);

        let h = b.alloc_instruction();
        b.instr_mut(h).as_return(&[original]);
        b.insert_instruction(h);
        b.seal(entry);

        compute_rpo(&mut b);
        run(&mut b).unwrap();
        assert_eq!(b.instr(h).vs.as_slice(), &[canonical]);
    }

    // ── Grouping ─────────────────────────────────────────────────────────

    #[test]
    fn a_strict_instruction_starts_a_new_group_after_itself() {
        let mut b = builder();
        let entry = b.alloc_basic_block();
        b.set_current_block(entry);

        let addr = Value::new(ValueId(0), Type::I32);
        let value = Value::new(ValueId(1), Type::I32);
        let h0 = b.alloc_instruction();
        b.instr_mut(h0).as_iconst(addr, 0);
        b.insert_instruction(h0);
        let store = b.alloc_instruction();
        b.instr_mut(store).as_store(addr, value, 0);
        b.insert_instruction(store);
        let h1 = b.alloc_instruction();
        b.instr_mut(h1).as_iconst(value, 1);
        b.insert_instruction(h1);
        let ret = b.alloc_instruction();
        b.instr_mut(ret).as_return(&[]);
        b.insert_instruction(ret);
        b.seal(entry);

        compute_rpo(&mut b);
        run(&mut b).unwrap();
        assert_eq!(b.instr(h0).group, b.instr(store).group);
        assert!(b.instr(h1).group > b.instr(store).group);
    }

    // ── §8's worked dead-code-elimination scenario ──────────────────────

    #[test]
    fn the_worked_example_removes_the_unused_constant_and_counts_refs() {
        let mut b = builder();
        let entry = b.alloc_basic_block();
        let end = b.alloc_basic_block();

        let v0 = Value::new(ValueId(0), Type::I32);
        let v1 = Value::new(ValueId(1), Type::I32); // unused
        let v2 = Value::new(ValueId(2), Type::I32);
        let v3 = Value::new(ValueId(3), Type::I32); // alias of v2, never defined
        let v4 = Value::new(ValueId(4), Type::I32);
        alias::set(&mut b, v3, v2);

        b.set_current_block(entry);
        let h0 = b.alloc_instruction();
        b.instr_mut(h0).as_iconst(v0, 3);
        b.insert_instruction(h0);
        let store = b.alloc_instruction();
        b.instr_mut(store).as_store(v0, v0, 0);
        b.insert_instruction(store);
        let h1 = b.alloc_instruction();
        b.instr_mut(h1).as_iconst(v1, 0);
        b.insert_instruction(h1);
        let h2 = b.alloc_instruction();
        b.instr_mut(h2).as_iconst(v2, 1);
        b.insert_instruction(h2);
        let jump = b.alloc_instruction();
        b.instr_mut(jump).as_jump(end, &[]);
        b.insert_instruction(jump);
        b.seal(entry);

        b.set_current_block(end);
        let iadd = b.alloc_instruction();
        b.instr_mut(iadd).as_iadd(v4, v3, v0);
        b.insert_instruction(iadd);
        let ret = b.alloc_instruction();
        b.instr_mut(ret).as_return(&[v4]);
        b.insert_instruction(ret);
        b.seal(end);

        compute_rpo(&mut b);
        run(&mut b).unwrap();

        assert!(!b.instr(h1).live);
        assert_eq!(b.block(entry).instructions(&b.instructions).count(), 4);

        assert_eq!(b.value_ref_count(v0.id()), 3);
        assert_eq!(b.value_ref_count(v2.id()), 1);
        assert_eq!(b.value_ref_count(v4.id()), 1);

        assert_eq!(b.instr(h0).group, b.instr(store).group);
        assert_eq!(b.instr(h2).group, b.instr(jump).group);
        assert!(b.instr(h2).group > b.instr(store).group);
        assert_eq!(b.instr(iadd).group, b.instr(ret).group);
        assert!(b.instr(iadd).group > b.instr(jump).group);
    }
}
