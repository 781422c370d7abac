//! [`BasicBlock`]: a doubly-linked instruction list plus predecessor/successor
//! bookkeeping and the per-variable maps on-the-fly SSA construction needs (§3).

use crate::instr::{InstrHandle, Instruction};
use crate::types::{Value, Variable};
use std::collections::HashMap;
use std::fmt;

/// Dense pool index for a [`BasicBlock`]. [`RETURN_BLOCK`] is a reserved
/// sentinel handle, not a dense index — it is allocated once by
/// `Builder::init` and is never counted among "reachable, regular" blocks by
/// CFG analysis (§3: "never traversed through").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockHandle(pub u32);

/// The sentinel return block. All `return` control flow in a function
/// targets this handle; it is preallocated by `Builder::init` and is not a
/// normal member of the block pool's dense id space.
pub const RETURN_BLOCK: BlockHandle = BlockHandle(u32::MAX);

impl fmt::Display for BlockHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == RETURN_BLOCK {
            write!(f, "blk_return")
        } else {
            write!(f, "blk{}", self.0)
        }
    }
}

/// A predecessor edge: which block it comes from, and which of that block's
/// (at most two) tail branch instructions is the one targeting here. A
/// predecessor may appear twice if both of its tail branches target this
/// block (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Predecessor {
    pub block: BlockHandle,
    pub branch: InstrHandle,
}

/// A basic block: head/tail of its instruction list, its block parameters,
/// predecessor/successor tables, and the per-variable maps the Braun et al.
/// algorithm needs while the block is still under construction.
#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub id: BlockHandle,

    /// Block parameters (the SSA-paper alternative to phi nodes, §9):
    /// predecessors supply arguments positionally through their branch
    /// instructions, not through entries owned by this block.
    pub params: Vec<Value>,

    pub head: Option<InstrHandle>,
    pub tail: Option<InstrHandle>,

    pub preds: Vec<Predecessor>,
    pub succs: Vec<BlockHandle>,

    /// Most recent definition of each `Variable` within this block, per
    /// Braun et al. Updated by `Builder::define_variable` and by `seal`
    /// converting pending placeholders into real parameters.
    pub last_definitions: HashMap<Variable, Value>,
    /// Placeholders promised before this block was sealed: a `Variable`
    /// whose value couldn't yet be resolved because not all predecessors
    /// were known. Resolved into real block parameters at seal time.
    pub unknown_values: HashMap<Variable, Value>,

    /// Set by an optimization pass that determined this block is dead code.
    pub invalid: bool,
    /// Set once no more predecessors will be added (§4.1).
    pub sealed: bool,
    /// Set by dominator computation: this block dominates one of its own
    /// predecessors (§4.2).
    pub loop_header: bool,

    /// Position in reverse postorder, assigned by CFG analysis. `None`
    /// until analysis has run, or for blocks found unreachable.
    pub reverse_postorder: Option<u32>,

    /// Populated at seal time when this block turns out to have exactly one
    /// predecessor — the fast path in `find_value` (§4.1 step 3).
    pub single_pred: Option<BlockHandle>,
}

impl BasicBlock {
    pub(crate) fn new(id: BlockHandle) -> BasicBlock {
        BasicBlock {
            id,
            params: Vec::new(),
            head: None,
            tail: None,
            preds: Vec::new(),
            succs: Vec::new(),
            last_definitions: HashMap::new(),
            unknown_values: HashMap::new(),
            invalid: false,
            sealed: false,
            loop_header: false,
            reverse_postorder: None,
            single_pred: None,
        }
    }

    /// Iterate this block's instructions head-to-tail, given the owning
    /// function's instruction pool. Handle-based traversal: the block owns
    /// no instruction storage itself (§9).
    pub fn instructions<'a>(
        &self,
        pool: &'a [Instruction],
    ) -> impl Iterator<Item = (InstrHandle, &'a Instruction)> + 'a {
        let mut cur = self.head;
        std::iter::from_fn(move || {
            let h = cur?;
            let instr = &pool[h.0 as usize];
            cur = instr.next;
            Some((h, instr))
        })
    }

    /// The block's tail branch instructions, in program order (the
    /// conditional one first, if present, then the unconditional one) —
    /// at most two, per §3's invariant.
    pub fn tail_branches<'a>(&self, pool: &'a [Instruction]) -> Vec<(InstrHandle, &'a Instruction)> {
        self.instructions(pool)
            .filter(|(_, i)| i.is_branch())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn return_block_is_not_a_dense_index() {
        assert_ne!(RETURN_BLOCK, BlockHandle(0));
        assert_eq!(RETURN_BLOCK.0, u32::MAX);
    }

    #[test]
    fn new_block_starts_unsealed_and_empty() {
        let b = BasicBlock::new(BlockHandle(0));
        assert!(!b.sealed);
        assert!(!b.invalid);
        assert!(b.preds.is_empty());
        assert!(b.params.is_empty());
        assert_eq!(b.head, None);
    }

    #[test]
    fn block_handle_display() {
        assert_eq!(BlockHandle(5).to_string(), "blk5");
        assert_eq!(RETURN_BLOCK.to_string(), "blk_return");
    }
}
