//! [`Instruction`]: the flat, pool-allocated instruction record (§3).
//!
//! Following §9's design note, an instruction's place in its owning block's
//! doubly-linked list is expressed as `prev`/`next` handles into the
//! instruction pool, not as an owning pointer — the same handle-over-pointer
//! choice the teacher makes for `BlockId`/`VarId` everywhere.

use crate::block::BlockHandle;
use crate::opcode::Opcode;
use crate::types::{SignatureId, Type, Value};
use smallvec::SmallVec;
use std::fmt;

/// Dense pool index for an [`Instruction`]. Never reused within a function's
/// lifetime; the backing storage is reused only across `Builder::init` calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstrHandle(pub u32);

impl fmt::Display for InstrHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "instr{}", self.0)
    }
}

/// A single IR instruction: opcode, operand slots, immediates, result(s),
/// and the bookkeeping passes need (liveness, instruction group).
///
/// Only a branch's tail instruction carries a `target`/`br_table_targets`;
/// every other opcode leaves those empty. §3's invariant that branches only
/// appear at a block's tail is enforced by `Builder::insert_instruction`, not
/// by this type — `Instruction` itself has no notion of "the current block".
#[derive(Debug, Clone)]
pub struct Instruction {
    pub opcode: Opcode,

    /// Up to three inline scalar operands. Unused slots are `Value::INVALID`.
    pub v: Value,
    pub v2: Value,
    pub v3: Value,
    /// Overflow operand list (e.g. call arguments, br_table arguments).
    pub vs: SmallVec<[Value; 4]>,

    /// Opcode-specific immediate words: memory offsets/sizes, the low and
    /// high halves of a 64-bit constant, condition codes, extend
    /// from/to widths, exit codes.
    pub u1: u32,
    pub u2: u32,

    /// First result value (`Value::INVALID` if the opcode has no return).
    pub r_value: Value,
    /// Overflow result list, for opcodes with more than one result. Empty
    /// for every opcode in the current table (none are currently
    /// multi-result) but kept per §3's data model.
    pub r_values: SmallVec<[Value; 1]>,

    /// Explicit result type, used when the return-type rule can't derive it
    /// from an operand (conversions, extensions — see [`crate::opcode::ReturnRule`]).
    pub ty: Type,

    /// Signature referenced by `call`/`call_indirect`.
    pub signature: Option<SignatureId>,

    /// Single branch target (`jump`, `brz`, `brnz`). `None` for `br_table`,
    /// which instead uses `br_table_targets`, and for non-branches.
    pub target: Option<BlockHandle>,
    /// Jump targets for `br_table`: one per case plus the default as the
    /// last entry. Empty for every other opcode.
    pub br_table_targets: Vec<BlockHandle>,

    /// Doubly-linked position within the owning block's instruction list.
    pub prev: Option<InstrHandle>,
    pub next: Option<InstrHandle>,

    /// Instruction-group id assigned by dead-code elimination (§4.3, §4.4).
    pub group: u32,
    /// Liveness flag assigned by dead-code elimination.
    pub live: bool,
    /// Set by block layout when this branch's target is the block placed
    /// immediately after the branch's own block — a backend can skip
    /// emitting a physical jump for it.
    pub is_fallthrough: bool,
}

impl Instruction {
    /// A zeroed instruction ready to be filled in by an opcode-specific
    /// setter. Returned by `Builder::alloc_instruction`.
    pub(crate) fn zeroed() -> Instruction {
        Instruction {
            opcode: Opcode::Iconst,
            v: Value::INVALID,
            v2: Value::INVALID,
            v3: Value::INVALID,
            vs: SmallVec::new(),
            u1: 0,
            u2: 0,
            r_value: Value::INVALID,
            r_values: SmallVec::new(),
            ty: Type::Invalid,
            signature: None,
            target: None,
            br_table_targets: Vec::new(),
            prev: None,
            next: None,
            group: 0,
            live: false,
            is_fallthrough: false,
        }
    }

    /// Whether this instruction is a branch (appears only at block tails,
    /// per §3's invariant).
    pub fn is_branch(&self) -> bool {
        matches!(
            self.opcode,
            Opcode::Jump | Opcode::Brz | Opcode::Brnz | Opcode::BrTable
        )
    }

    /// Whether this is a conditional branch that can fall through to the
    /// instruction after it within the same block (`brz`/`brnz` followed by
    /// an unconditional `jump`, per §3).
    pub fn is_conditional_branch(&self) -> bool {
        matches!(self.opcode, Opcode::Brz | Opcode::Brnz)
    }

    /// The branch arguments supplied to `target`'s block parameters.
    /// Panics if this instruction is not a single-target branch — callers
    /// must check [`Instruction::is_branch`] first (§7: branch introspection
    /// on a non-branch is a frontend bug).
    pub fn branch_args(&self) -> &[Value] {
        match self.opcode {
            Opcode::Jump | Opcode::Brz | Opcode::Brnz => &self.vs,
            _ => panic!("branch_args called on non-single-target branch {:?}", self.opcode),
        }
    }

    pub fn branch_args_mut(&mut self) -> &mut SmallVec<[Value; 4]> {
        match self.opcode {
            Opcode::Jump | Opcode::Brz | Opcode::Brnz => &mut self.vs,
            _ => panic!("branch_args_mut called on non-single-target branch {:?}", self.opcode),
        }
    }

    // ── Opcode-specific setters ──────────────────────────────────────────
    //
    // Each setter fills in the fields a given opcode needs and leaves the
    // rest at their zeroed defaults. Setters that need side effects beyond
    // this instruction (recording predecessors, marking a signature used)
    // are exposed on `Builder` instead, which calls these first.

    pub fn as_iconst(&mut self, result: Value, bits: u64) {
        self.opcode = Opcode::Iconst;
        self.r_value = result;
        self.u1 = bits as u32;
        self.u2 = (bits >> 32) as u32;
    }

    pub fn as_f32const(&mut self, result: Value, bits: u32) {
        self.opcode = Opcode::F32const;
        self.r_value = result;
        self.u1 = bits;
    }

    pub fn as_f64const(&mut self, result: Value, bits: u64) {
        self.opcode = Opcode::F64const;
        self.r_value = result;
        self.u1 = bits as u32;
        self.u2 = (bits >> 32) as u32;
    }

    pub fn as_binop(&mut self, opcode: Opcode, result: Value, lhs: Value, rhs: Value) {
        self.opcode = opcode;
        self.r_value = result;
        self.v = lhs;
        self.v2 = rhs;
    }

    pub fn as_iadd(&mut self, result: Value, lhs: Value, rhs: Value) {
        self.as_binop(Opcode::Iadd, result, lhs, rhs);
    }

    pub fn as_unop(&mut self, opcode: Opcode, result: Value, operand: Value) {
        self.opcode = opcode;
        self.r_value = result;
        self.v = operand;
    }

    /// `ishl`/`sshr`/`ushr`/`rotl`/`rotr` — value to shift, shift amount.
    pub fn as_shift(&mut self, opcode: Opcode, result: Value, value: Value, amount: Value) {
        self.as_binop(opcode, result, value, amount);
    }

    pub fn as_icmp(&mut self, result: Value, cond: u32, lhs: Value, rhs: Value) {
        self.opcode = Opcode::Icmp;
        self.r_value = result;
        self.u1 = cond;
        self.v = lhs;
        self.v2 = rhs;
    }

    pub fn as_fcmp(&mut self, result: Value, cond: u32, lhs: Value, rhs: Value) {
        self.opcode = Opcode::Fcmp;
        self.r_value = result;
        self.u1 = cond;
        self.v = lhs;
        self.v2 = rhs;
    }

    pub fn as_load(&mut self, result: Value, ty: Type, addr: Value, offset: u32) {
        self.opcode = Opcode::Load;
        self.r_value = result;
        self.ty = ty;
        self.v = addr;
        self.u1 = offset;
    }

    pub fn as_store(&mut self, addr: Value, value: Value, offset: u32) {
        self.opcode = Opcode::Store;
        self.v = addr;
        self.v2 = value;
        self.u1 = offset;
    }

    pub fn as_extend(&mut self, opcode: Opcode, result: Value, operand: Value, from: u32, to: u32) {
        self.opcode = opcode;
        self.r_value = result;
        self.v = operand;
        self.ty = result.ty();
        self.u1 = from;
        self.u2 = to;
    }

    pub fn as_convert(&mut self, opcode: Opcode, result: Value, operand: Value) {
        self.opcode = opcode;
        self.r_value = result;
        self.v = operand;
        self.ty = result.ty();
    }

    pub fn as_select(&mut self, result: Value, val1: Value, val2: Value, condition: Value) {
        self.opcode = Opcode::Select;
        self.r_value = result;
        self.v = val1;
        self.v2 = val2;
        self.v3 = condition;
    }

    /// Unconditional jump. `args` are the block-parameter arguments
    /// positionally matching the target's parameter list (§3).
    pub fn as_jump(&mut self, target: BlockHandle, args: &[Value]) {
        self.opcode = Opcode::Jump;
        self.target = Some(target);
        self.vs = args.iter().copied().collect();
    }

    pub fn as_brz(&mut self, cond: Value, target: BlockHandle, args: &[Value]) {
        self.opcode = Opcode::Brz;
        self.v = cond;
        self.target = Some(target);
        self.vs = args.iter().copied().collect();
    }

    pub fn as_brnz(&mut self, cond: Value, target: BlockHandle, args: &[Value]) {
        self.opcode = Opcode::Brnz;
        self.v = cond;
        self.target = Some(target);
        self.vs = args.iter().copied().collect();
    }

    /// `br_table`: `index` selects among `targets`, the last entry of
    /// `targets` being the default case (taken when `index` is out of
    /// range). `br_table` never carries per-target arguments (§3).
    pub fn as_br_table(&mut self, index: Value, targets: Vec<BlockHandle>) {
        self.opcode = Opcode::BrTable;
        self.v = index;
        self.br_table_targets = targets;
    }

    pub fn as_return(&mut self, values: &[Value]) {
        self.opcode = Opcode::Return;
        self.vs = values.iter().copied().collect();
    }

    pub fn as_call(&mut self, result: Value, signature: SignatureId, args: &[Value]) {
        self.opcode = Opcode::Call;
        self.r_value = result;
        self.signature = Some(signature);
        self.vs = args.iter().copied().collect();
    }

    pub fn as_call_indirect(
        &mut self,
        result: Value,
        signature: SignatureId,
        table_index: Value,
        args: &[Value],
    ) {
        self.opcode = Opcode::CallIndirect;
        self.r_value = result;
        self.signature = Some(signature);
        self.v = table_index;
        self.vs = args.iter().copied().collect();
    }

    pub fn as_exit(&mut self, code: u32) {
        self.opcode = Opcode::Exit;
        self.u1 = code;
    }

    pub fn as_exit_if_true(&mut self, condition: Value, code: u32) {
        self.opcode = Opcode::ExitIfTrue;
        self.v = condition;
        self.u1 = code;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ValueId;

    #[test]
    fn zeroed_instruction_has_invalid_operands() {
        let i = Instruction::zeroed();
        assert_eq!(i.v, Value::INVALID);
        assert_eq!(i.r_value, Value::INVALID);
        assert!(i.vs.is_empty());
        assert!(!i.live);
    }

    #[test]
    fn jump_is_branch_with_args() {
        let mut i = Instruction::zeroed();
        let a = Value::new(ValueId(1), Type::I32);
        i.as_jump(BlockHandle(3), &[a]);
        assert!(i.is_branch());
        assert!(!i.is_conditional_branch());
        assert_eq!(i.target, Some(BlockHandle(3)));
        assert_eq!(i.branch_args(), &[a]);
    }

    #[test]
    fn brz_is_conditional_branch() {
        let mut i = Instruction::zeroed();
        let cond = Value::new(ValueId(0), Type::I32);
        i.as_brz(cond, BlockHandle(1), &[]);
        assert!(i.is_branch());
        assert!(i.is_conditional_branch());
    }

    #[test]
    #[should_panic(expected = "branch_args called")]
    fn branch_args_panics_on_non_branch() {
        let mut i = Instruction::zeroed();
        i.as_iadd(
            Value::new(ValueId(0), Type::I32),
            Value::new(ValueId(1), Type::I32),
            Value::new(ValueId(2), Type::I32),
        );
        i.branch_args();
    }

    #[test]
    fn iconst_packs_64_bit_immediate() {
        let mut i = Instruction::zeroed();
        let bits: u64 = 0xDEAD_BEEF_0000_0001;
        i.as_iconst(Value::new(ValueId(0), Type::I64), bits);
        let reassembled = (i.u1 as u64) | ((i.u2 as u64) << 32);
        assert_eq!(reassembled, bits);
    }

    #[test]
    fn br_table_carries_target_list() {
        let mut i = Instruction::zeroed();
        let idx = Value::new(ValueId(0), Type::I32);
        i.as_br_table(idx, vec![BlockHandle(1), BlockHandle(2), BlockHandle(3)]);
        assert!(i.is_branch());
        assert_eq!(i.target, None);
        assert_eq!(i.br_table_targets.len(), 3);
    }
}
