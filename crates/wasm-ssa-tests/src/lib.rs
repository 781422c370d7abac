//! Shared CFG fixtures for `wasm-ssa`'s integration tests and benchmark.
//!
//! Each fixture drives `Builder` purely through its public API — the same
//! surface a WebAssembly-bytecode frontend would use — so these tests
//! exercise construction, optimization, and layout the way a real caller
//! would, rather than poking at pass internals directly.

use anyhow::Result;
use wasm_ssa::{Builder, Signature, SignatureId, Type};

fn void_to_i32() -> Signature {
    Signature { id: SignatureId(0), params: vec![], results: vec![Type::I32], used: false }
}

/// `if (cond) { x = 1 } else { x = 2 }; return x` — the textbook on-the-fly
/// SSA merge: `x` is never resolved until `join` seals, at which point it
/// becomes a genuine block parameter fed by both arms.
pub fn diamond_function() -> Result<Builder> {
    let mut b = Builder::new();
    b.init(void_to_i32());

    let entry = b.alloc_basic_block();
    let left = b.alloc_basic_block();
    let right = b.alloc_basic_block();
    let join = b.alloc_basic_block();

    let x = b.declare_variable(Type::I32);

    b.set_current_block(entry);
    let cond = b.new_value(Type::I32);
    let cond_const = b.alloc_instruction();
    b.instr_mut(cond_const).as_iconst(cond, 1);
    b.insert_instruction(cond_const);
    let branch = b.alloc_instruction();
    b.instr_mut(branch).as_brnz(cond, left, &[]);
    b.insert_instruction(branch);
    let fallthrough = b.alloc_instruction();
    b.instr_mut(fallthrough).as_jump(right, &[]);
    b.insert_instruction(fallthrough);
    b.seal(entry);

    b.set_current_block(left);
    let one = b.new_value(Type::I32);
    let h = b.alloc_instruction();
    b.instr_mut(h).as_iconst(one, 1);
    b.insert_instruction(h);
    b.define_variable(x, one, left);
    let j = b.alloc_instruction();
    b.instr_mut(j).as_jump(join, &[]);
    b.insert_instruction(j);
    b.seal(left);

    b.set_current_block(right);
    let two = b.new_value(Type::I32);
    let h = b.alloc_instruction();
    b.instr_mut(h).as_iconst(two, 2);
    b.insert_instruction(h);
    b.define_variable(x, two, right);
    let j = b.alloc_instruction();
    b.instr_mut(j).as_jump(join, &[]);
    b.insert_instruction(j);
    b.seal(right);

    b.set_current_block(join);
    let merged = b.find_value(x, join);
    let ret = b.alloc_instruction();
    b.instr_mut(ret).as_return(&[merged]);
    b.insert_instruction(ret);
    b.seal(join);

    Ok(b)
}

/// `for (i = 0; i < n; i++) {}` — a counting loop whose header is reached
/// by a back edge, forcing the body predecessor to be wired before the
/// header can seal. The loop test lives in `body`, not `header`, so
/// `body -> header` is the back edge and also the critical edge: `body` has
/// two successors (back to `header`, on to `exit`) and `header` has two
/// predecessors (`entry`, and that back edge). Returns the accumulator.
pub fn loop_function(n: i64) -> Result<Builder> {
    let mut b = Builder::new();
    b.init(void_to_i32());

    let entry = b.alloc_basic_block();
    let header = b.alloc_basic_block();
    let body = b.alloc_basic_block();
    let exit = b.alloc_basic_block();

    let i = b.declare_variable(Type::I32);

    b.set_current_block(entry);
    let zero = b.new_value(Type::I32);
    let h = b.alloc_instruction();
    b.instr_mut(h).as_iconst(zero, 0);
    b.insert_instruction(h);
    b.define_variable(i, zero, entry);
    let j = b.alloc_instruction();
    b.instr_mut(j).as_jump(header, &[]);
    b.insert_instruction(j);
    b.seal(entry);

    // `header` has two predecessors — `entry` and `body`'s back edge — so
    // it cannot seal until the back edge through `body` is wired. It's a
    // plain single-successor merge: the loop test happens in `body`.
    b.set_current_block(header);
    let j = b.alloc_instruction();
    b.instr_mut(j).as_jump(body, &[]);
    b.insert_instruction(j);

    b.set_current_block(body);
    let i_body = b.find_value(i, header);
    let one = b.new_value(Type::I32);
    let h = b.alloc_instruction();
    b.instr_mut(h).as_iconst(one, 1);
    b.insert_instruction(h);
    let next = b.new_value(Type::I32);
    let h = b.alloc_instruction();
    b.instr_mut(h).as_iadd(next, i_body, one);
    b.insert_instruction(h);
    b.define_variable(i, next, body);
    let limit = b.new_value(Type::I32);
    let h = b.alloc_instruction();
    b.instr_mut(h).as_iconst(limit, n as u64);
    b.insert_instruction(h);
    let cmp = b.new_value(Type::I32);
    let h = b.alloc_instruction();
    b.instr_mut(h).as_icmp(cmp, 0, next, limit);
    b.insert_instruction(h);
    let back = b.alloc_instruction();
    b.instr_mut(back).as_brnz(cmp, header, &[]);
    b.insert_instruction(back);
    let leave = b.alloc_instruction();
    b.instr_mut(leave).as_jump(exit, &[]);
    b.insert_instruction(leave);
    b.seal(body);
    b.seal(header);

    b.set_current_block(exit);
    let i_exit = b.find_value(i, exit);
    let ret = b.alloc_instruction();
    b.instr_mut(ret).as_return(&[i_exit]);
    b.insert_instruction(ret);
    b.seal(exit);

    Ok(b)
}

/// An entry block reaching `width` predecessors via a `br_table`, each
/// feeding a different constant into a shared join block's one parameter,
/// with a body long and wide enough to clear tail duplication's size and
/// operand-count gates before jumping on to a shared `dest`. Returns
/// `(builder, dest)`.
pub fn wide_join_function(width: u32) -> Result<(Builder, wasm_ssa::BlockHandle)> {
    let mut b = Builder::new();
    b.init(void_to_i32());

    let entry = b.alloc_basic_block();
    let join = b.alloc_basic_block();
    let dest = b.alloc_basic_block();

    let mut preds = Vec::with_capacity(width as usize);
    for i in 0..width {
        let pred = b.alloc_basic_block();
        preds.push(pred);
        b.set_current_block(pred);
        let seed = b.new_value(Type::I32);
        let h = b.alloc_instruction();
        b.instr_mut(h).as_iconst(seed, i as u64);
        b.insert_instruction(h);
        let j = b.alloc_instruction();
        b.instr_mut(j).as_jump(join, &[seed]);
        b.insert_instruction(j);
        b.seal(pred);
    }

    // `br_table` never carries args, so it's a clean way to reach every pred
    // from entry without touching their own jump into `join`.
    b.set_current_block(entry);
    let index = b.new_value(Type::I32);
    let h = b.alloc_instruction();
    b.instr_mut(h).as_iconst(index, 0);
    b.insert_instruction(h);
    let switch = b.alloc_instruction();
    b.instr_mut(switch).as_br_table(index, preds);
    b.insert_instruction(switch);
    b.seal(entry);

    b.set_current_block(join);
    let param = b.add_param(join, Type::I32);
    let mut last = param;
    for _ in 0..9 {
        let r = b.new_value(Type::I32);
        let h = b.alloc_instruction();
        b.instr_mut(h).as_iadd(r, last, last);
        b.insert_instruction(h);
        last = r;
    }
    let j = b.alloc_instruction();
    b.instr_mut(j).as_jump(dest, &[]);
    b.insert_instruction(j);
    b.seal(join);

    b.set_current_block(dest);
    b.seal(dest);

    Ok((b, dest))
}
