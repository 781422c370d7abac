//! No-op instruction elimination (§4.3): fold away instructions whose
//! result is provably identical to one of their operands — a shift by a
//! multiple of the type's bit width, an add/or/xor with a zero operand, a
//! multiply by one, a bitcast to the operand's own type — by aliasing the
//! result to that operand instead of removing the instruction outright.
//! `dead_code` removes the now-unreferenced instruction itself once it
//! resolves the alias during its operand walk.
//!
//! To recognize a zero shift amount, this needs the shift amount's
//! defining instruction. It looks that defining instruction up by the
//! amount's own `ValueId` directly, without first resolving it through
//! the alias table — the one asymmetry worth calling out, since every
//! other operand lookup in this pass goes through `alias::resolve` first.
//! A shift amount that is itself an alias of a constant is left alone
//! here; it becomes eligible once `dead_code`'s walk has rewritten it to
//! its canonical form, or on this pass's next run.

use crate::builder::core::Builder;
use crate::instr::InstrHandle;
use crate::opcode::Opcode;
use crate::passes::alias;
use crate::types::{Type, Value, ValueId};
use std::collections::HashMap;

pub fn run(b: &mut Builder) {
    let mut value_defs: HashMap<ValueId, InstrHandle> = HashMap::new();
    for (i, instr) in b.instructions.iter().enumerate() {
        if instr.r_value.is_valid() {
            value_defs.insert(instr.r_value.id(), InstrHandle(i as u32));
        }
    }

    for i in 0..b.instructions.len() {
        let handle = InstrHandle(i as u32);
        let instr = b.instr(handle);
        let opcode = instr.opcode;
        let v = alias::resolve(b, instr.v);
        let v2 = alias::resolve(b, instr.v2);
        let r_value = instr.r_value;
        if !r_value.is_valid() {
            continue;
        }

        let replacement = match opcode {
            Opcode::Ishl | Opcode::Sshr | Opcode::Ushr | Opcode::Rotl | Opcode::Rotr => {
                if shift_amount_is_nop(b, &value_defs, instr.v2) {
                    Some(v)
                } else {
                    None
                }
            }
            Opcode::Iadd | Opcode::Bor | Opcode::Bxor => {
                identity_operand(b, &value_defs, v, v2, 0)
            }
            Opcode::Imul => identity_operand(b, &value_defs, v, v2, 1),
            Opcode::Bitcast | Opcode::Ireduce if v.ty() == r_value.ty() => Some(v),
            _ => None,
        };

        if let Some(replacement) = replacement {
            if replacement != r_value {
                alias::set(b, r_value, replacement);
            }
        }
    }
}

/// Whether `amount`'s defining instruction is an integer constant whose
/// value is a multiple of the shifted type's bit width (so the shift is a
/// no-op). Looks `amount` up directly — see the module doc comment.
fn shift_amount_is_nop(b: &Builder, defs: &HashMap<ValueId, InstrHandle>, amount: Value) -> bool {
    let Some(&h) = defs.get(&amount.id()) else { return false };
    let instr = b.instr(h);
    if instr.opcode != Opcode::Iconst {
        return false;
    }
    let bits = (instr.u1 as u64) | ((instr.u2 as u64) << 32);
    let width = amount.ty().bits() as u64;
    bits % width == 0
}

fn identity_operand(
    b: &Builder,
    defs: &HashMap<ValueId, InstrHandle>,
    lhs: Value,
    rhs: Value,
    identity: u64,
) -> Option<Value> {
    if is_const(b, defs, rhs, identity) {
        Some(lhs)
    } else if is_const(b, defs, lhs, identity) {
        Some(rhs)
    } else {
        None
    }
}

fn is_const(b: &Builder, defs: &HashMap<ValueId, InstrHandle>, v: Value, expect: u64) -> bool {
    let Some(&h) = defs.get(&v.id()) else { return false };
    let instr = b.instr(h);
    if instr.opcode != Opcode::Iconst {
        return false;
    }
    let bits = (instr.u1 as u64) | ((instr.u2 as u64) << 32);
    let mask = if v.ty() == Type::I32 { 0xFFFF_FFFFu64 } else { u64::MAX };
    (bits & mask) == (expect & mask)
}
