//! The value-alias table (§4.4): when a pass determines a value is
//! equivalent to another (a trivial block parameter, a no-op instruction's
//! result), it records the equivalence here instead of eagerly rewriting
//! every instruction that might reference it. Consumers resolve lazily —
//! `dead_code`'s operand walk is the one place that actually rewrites
//! operand fields, once, as it decides liveness.

use crate::builder::core::Builder;
use crate::types::Value;

/// Follow `value`'s alias chain to its canonical representative. A value
/// with no entry in the table is already canonical.
pub fn resolve(b: &Builder, value: Value) -> Value {
    let mut cur = value;
    loop {
        match b.value_aliases.get(&cur.id()) {
            Some(&next) if next != cur => cur = next,
            _ => return cur,
        }
    }
}

pub fn set(b: &mut Builder, from: Value, to: Value) {
    b.value_aliases.insert(from.id(), to);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SignatureId, Signature, Type, ValueId};

    fn builder() -> Builder {
        let mut b = Builder::new();
        b.init(Signature { id: SignatureId(0), params: vec![], results: vec![], used: false });
        b
    }

    #[test]
    fn unaliased_value_resolves_to_itself() {
        let b = builder();
        let v = Value::new(ValueId(5), Type::I32);
        assert_eq!(resolve(&b, v), v);
    }

    #[test]
    fn chained_aliases_resolve_to_the_final_representative() {
        let mut b = builder();
        let a = Value::new(ValueId(0), Type::I32);
        let c = Value::new(ValueId(1), Type::I32);
        let final_value = Value::new(ValueId(2), Type::I32);
        set(&mut b, a, c);
        set(&mut b, c, final_value);
        assert_eq!(resolve(&b, a), final_value);
        assert_eq!(resolve(&b, c), final_value);
    }
}
