//! [`Builder`]: the frontend-facing construction API (§4.1).
//!
//! A `Builder` owns one function's worth of state: the block and instruction
//! pools, the per-variable type table, and the scratch structures the
//! optimization passes reuse so they don't allocate fresh collections on
//! every run. `init` resets all of it and is the only way to move from one
//! function to the next — there is no per-function `Builder::new`, matching
//! the teacher's `IrBuilder`, which is built once per module and reset
//! between functions rather than reconstructed.
//!
//! ```text
//!        Init(sig)
//!            |
//!            v
//!   +-----------------+        AllocateBasicBlock / SetCurrentBlock
//!   |  entry block 0   |<-----------------------------------------+
//!   +-----------------+                                           |
//!            |                                                    |
//!    DeclareVariable / DefineVariable / FindValue ------- Seal ----+
//!            |
//!            v
//!     RunPasses()  ->  LayoutBlocks()
//! ```

use crate::block::{BasicBlock, BlockHandle, Predecessor, RETURN_BLOCK};
use crate::instr::{InstrHandle, Instruction};
use crate::opcode::Opcode;
use crate::types::{Signature, SignatureId, Type, Value, ValueId, Variable};
use anyhow::{bail, Result};
use std::collections::HashMap;

/// Owns one function's IR under construction: block and instruction pools,
/// the variable-to-type table, and scratch state reused across passes.
///
/// Blocks are referenced by [`BlockHandle`], instructions by [`InstrHandle`] —
/// dense indices into `blocks`/`instructions`, not owning references, per
/// §9's design note. [`RETURN_BLOCK`] is the one exception: it lives in its
/// own field rather than in the dense pool, since its id is a sentinel, not
/// an index.
pub struct Builder {
    pub(crate) blocks: Vec<BasicBlock>,
    pub(crate) return_block: BasicBlock,
    pub(crate) instructions: Vec<Instruction>,

    pub(crate) current_block: Option<BlockHandle>,
    pub(crate) entry_block: Option<BlockHandle>,

    pub(crate) variable_types: Vec<Type>,
    next_value_id: u32,

    pub(crate) signatures: Vec<Signature>,
    pub(crate) function_signature: Option<Signature>,

    pub(crate) value_annotations: HashMap<ValueId, String>,
    /// Alias table maintained by the optimizer (§4.4): a value that was
    /// folded into another still has a `ValueId`, but nothing needs it as
    /// an operand any more — passes consult this instead of rewriting every
    /// operand immediately.
    pub(crate) value_aliases: HashMap<ValueId, Value>,

    /// Reverse postorder, assigned by `analysis::compute_rpo` and consumed
    /// by `layout` and the dominator computation. Empty until analysis runs.
    pub(crate) rpo: Vec<BlockHandle>,
    /// Immediate dominator of each block, indexed by `BlockHandle.0`.
    /// `None` for the entry block and for unreachable blocks.
    pub(crate) idom: Vec<Option<BlockHandle>>,
    /// Binary-lifting ancestor table over the dominator tree, `up[k][b]` =
    /// the 2^k-th dominator-tree ancestor of `b`. Built by
    /// `analysis::compute_dominators`, consumed by `analysis::dominator_lca`.
    pub(crate) idom_up: Vec<Vec<Option<BlockHandle>>>,
    /// Depth of each block in the dominator tree (entry block is 0).
    pub(crate) dom_depth: Vec<u32>,
    /// For a loop header, the nearest enclosing loop's header (`None` if
    /// top-level). `None` for non-header blocks.
    pub(crate) loop_parent: Vec<Option<BlockHandle>>,
    /// For any block, the header of the innermost natural loop whose body
    /// contains it (`None` for the block itself when it is that header, and
    /// for anything outside every loop). Built by `analysis::compute_loop_nesting`
    /// from the same body sets `loop_parent` is derived from, indexed by
    /// `BlockHandle.0`.
    pub(crate) enclosing_loop: Vec<Option<BlockHandle>>,

    /// Per-`ValueId` use count, populated by `passes::dead_code` (§4.3 step
    /// 6, §6's backend-facing "value reference-count array"). Indexed by
    /// `ValueId.0`; empty until dead-code elimination has run.
    pub(crate) value_ref_counts: Vec<u32>,
}

impl Default for Builder {
    fn default() -> Builder {
        Builder::new()
    }
}

impl Builder {
    pub fn new() -> Builder {
        Builder {
            blocks: Vec::new(),
            return_block: BasicBlock::new(RETURN_BLOCK),
            instructions: Vec::new(),
            current_block: None,
            entry_block: None,
            variable_types: Vec::new(),
            next_value_id: 0,
            signatures: Vec::new(),
            function_signature: None,
            value_annotations: HashMap::new(),
            value_aliases: HashMap::new(),
            rpo: Vec::new(),
            idom: Vec::new(),
            idom_up: Vec::new(),
            dom_depth: Vec::new(),
            loop_parent: Vec::new(),
            enclosing_loop: Vec::new(),
            value_ref_counts: Vec::new(),
        }
    }

    /// Reset all per-function state and begin constructing a function with
    /// the given signature. The signature table (`declare_signature`) is
    /// function-scoped too — callee signatures referenced by `call`/
    /// `call_indirect` are declared fresh for each function that uses them.
    pub fn init(&mut self, signature: Signature) {
        self.blocks.clear();
        self.return_block = BasicBlock::new(RETURN_BLOCK);
        self.return_block.sealed = true;
        self.instructions.clear();
        self.current_block = None;
        self.entry_block = None;
        self.variable_types.clear();
        self.next_value_id = 0;
        self.signatures.clear();
        self.function_signature = Some(signature);
        self.value_annotations.clear();
        self.value_aliases.clear();
        self.rpo.clear();
        self.idom.clear();
        self.idom_up.clear();
        self.dom_depth.clear();
        self.loop_parent.clear();
        self.enclosing_loop.clear();
        self.value_ref_counts.clear();
    }

    pub fn function_signature(&self) -> &Signature {
        self.function_signature
            .as_ref()
            .expect("Builder::init must be called before the function signature is read")
    }

    // ── Block access ─────────────────────────────────────────────────────

    pub fn block(&self, handle: BlockHandle) -> &BasicBlock {
        if handle == RETURN_BLOCK {
            &self.return_block
        } else {
            &self.blocks[handle.0 as usize]
        }
    }

    pub fn block_mut(&mut self, handle: BlockHandle) -> &mut BasicBlock {
        if handle == RETURN_BLOCK {
            &mut self.return_block
        } else {
            &mut self.blocks[handle.0 as usize]
        }
    }

    pub fn instr(&self, handle: InstrHandle) -> &Instruction {
        &self.instructions[handle.0 as usize]
    }

    pub fn instr_mut(&mut self, handle: InstrHandle) -> &mut Instruction {
        &mut self.instructions[handle.0 as usize]
    }

    pub fn entry_block(&self) -> BlockHandle {
        self.entry_block
            .expect("at least one block must be allocated before entry_block is read")
    }

    /// All regular (non-`RETURN_BLOCK`) block handles currently in the pool,
    /// in allocation order. Includes blocks later marked `invalid` — callers
    /// wanting only live blocks should filter on `block.invalid`.
    pub fn block_handles(&self) -> impl Iterator<Item = BlockHandle> + '_ {
        (0..self.blocks.len() as u32).map(BlockHandle)
    }

    /// Allocate a fresh [`Value`] identity of the given type. A frontend
    /// calls this for every new result it's about to define — the value
    /// returned carries no definition of its own until some instruction's
    /// `r_value`/`r_values` or a block parameter claims it.
    pub fn new_value(&mut self, ty: Type) -> Value {
        let id = ValueId(self.next_value_id);
        self.next_value_id += 1;
        Value::new(id, ty)
    }

    /// Total number of values allocated so far — the size side tables
    /// indexed by `ValueId` (e.g. reference counts) must be allocated to.
    pub fn value_count(&self) -> u32 {
        self.next_value_id
    }

    /// The dense value reference-count table (§6's backend-facing API),
    /// populated by `passes::dead_code`. Empty until that pass has run.
    pub fn value_ref_counts(&self) -> &[u32] {
        &self.value_ref_counts
    }

    /// Reference count for a single value. `0` for a value dead-code
    /// elimination found unused, or for any value before that pass runs.
    pub fn value_ref_count(&self, id: ValueId) -> u32 {
        self.value_ref_counts.get(id.0 as usize).copied().unwrap_or(0)
    }

    // ── Construction API (§4.1) ─────────────────────────────────────────

    /// Allocate a new, empty, unsealed block. The first block allocated
    /// after `init` becomes the entry block.
    pub fn alloc_basic_block(&mut self) -> BlockHandle {
        let handle = BlockHandle(self.blocks.len() as u32);
        self.blocks.push(BasicBlock::new(handle));
        if self.entry_block.is_none() {
            self.entry_block = Some(handle);
        }
        handle
    }

    pub fn set_current_block(&mut self, block: BlockHandle) {
        self.current_block = Some(block);
    }

    pub fn current_block(&self) -> BlockHandle {
        self.current_block
            .expect("set_current_block must be called before instructions can be inserted")
    }

    /// Allocate a fresh, opcode-less instruction in the pool. Callers fill
    /// it in with one of `Instruction`'s `as_*` setters before calling
    /// `insert_instruction`.
    pub fn alloc_instruction(&mut self) -> InstrHandle {
        let handle = InstrHandle(self.instructions.len() as u32);
        self.instructions.push(Instruction::zeroed());
        handle
    }

    /// Append `handle` to the current block's instruction list. If it is a
    /// branch, this also wires up the target block(s)' predecessor lists
    /// and the current block's successor list — §3's invariant that a
    /// branch only ever appears at a block's tail means this is the one
    /// place predecessor/successor bookkeeping needs to happen.
    pub fn insert_instruction(&mut self, handle: InstrHandle) {
        let cur = self.current_block();
        let tail = self.block(cur).tail;
        self.instructions[handle.0 as usize].prev = tail;
        self.instructions[handle.0 as usize].next = None;
        match tail {
            Some(t) => self.instructions[t.0 as usize].next = Some(handle),
            None => self.block_mut(cur).head = Some(handle),
        }
        self.block_mut(cur).tail = Some(handle);

        let instr = &self.instructions[handle.0 as usize];
        if !instr.is_branch() {
            return;
        }
        let targets: Vec<BlockHandle> = if instr.opcode == Opcode::BrTable {
            instr.br_table_targets.clone()
        } else {
            instr.target.into_iter().collect()
        };
        for target in targets {
            self.block_mut(cur).succs.push(target);
            self.block_mut(target)
                .preds
                .push(Predecessor { block: cur, branch: handle });
        }
    }

    /// Declare a new source-level variable of the given type. Returns a
    /// dense `Variable` id; the type is recorded once and never changes.
    pub fn declare_variable(&mut self, ty: Type) -> Variable {
        let var = Variable(self.variable_types.len() as u32);
        self.variable_types.push(ty);
        var
    }

    /// Record `value` as `var`'s current definition at the end of `block`.
    pub fn define_variable(&mut self, var: Variable, value: Value, block: BlockHandle) {
        debug_assert!(
            (var.0 as usize) < self.variable_types.len(),
            "define_variable: {var} was never declared"
        );
        self.block_mut(block).last_definitions.insert(var, value);
    }

    /// Add an explicit block parameter of the given type, returning its
    /// value. Used directly by frontends (e.g. to seed a function's entry
    /// parameters) and internally by `find_value`'s unsealed and
    /// multiple-predecessor cases.
    pub fn add_param(&mut self, block: BlockHandle, ty: Type) -> Value {
        let v = self.new_value(ty);
        self.block_mut(block).params.push(v);
        v
    }

    /// Resolve `var`'s current value at `block`, implementing on-the-fly
    /// SSA construction (Braun et al., §4.1):
    ///
    /// 1. If `block` already has a local definition for `var`, return it.
    /// 2. If `block` is not yet sealed, allocate a placeholder value, record
    ///    it as both the local definition and a pending entry in
    ///    `unknown_values`, and return it without visiting predecessors —
    ///    `seal` resolves it later, once every predecessor is known.
    /// 3. If `block` is sealed and has exactly one predecessor, the value is
    ///    whatever that predecessor resolves to; no block parameter is
    ///    needed.
    /// 4. Otherwise, add a real block parameter up front (so a cycle back
    ///    to `block` during step 4's recursion hits step 1, not infinite
    ///    recursion), then resolve `var` in every predecessor and append
    ///    each result as that predecessor's branch argument at the matching
    ///    positional index.
    pub fn find_value(&mut self, var: Variable, block: BlockHandle) -> Value {
        if let Some(&v) = self.block(block).last_definitions.get(&var) {
            return v;
        }

        if !self.block(block).sealed {
            let ty = self.variable_types[var.0 as usize];
            let placeholder = self.new_value(ty);
            self.block_mut(block).last_definitions.insert(var, placeholder);
            self.block_mut(block).unknown_values.insert(var, placeholder);
            return placeholder;
        }

        if let Some(single) = self.block(block).single_pred {
            // Deliberately not cached into `last_definitions` here (§4.1
            // step 3): the source doesn't cache this case either, and a
            // later `define_variable` in `single` must be visible on the
            // next lookup rather than returning a value resolved before it.
            return self.find_value(var, single);
        }

        let ty = self.variable_types[var.0 as usize];
        let param = self.add_param(block, ty);
        self.block_mut(block).last_definitions.insert(var, param);

        let preds = self.block(block).preds.clone();
        for pred in preds {
            let arg = self.find_value(var, pred.block);
            self.instr_mut(pred.branch).branch_args_mut().push(arg);
        }
        param
    }

    /// Seal `block`: no further predecessors will ever be added to it.
    /// Resolves every pending `unknown_values` entry left over from calls
    /// to `find_value` made while `block` was unsealed, converting each
    /// placeholder into a real block parameter and propagating it into
    /// every predecessor's branch arguments — unconditionally, even when
    /// `block` turns out to have exactly one predecessor. (A single-pred
    /// block with a pending placeholder gets a trivially-redundant
    /// parameter this way; `redundant_phi` elimination cleans those up
    /// later, the same tradeoff Braun et al. describe.)
    pub fn seal(&mut self, block: BlockHandle) {
        assert!(!self.block(block).sealed, "seal({block}) called twice");

        let preds = self.block(block).preds.clone();
        if preds.len() == 1 {
            self.block_mut(block).single_pred = Some(preds[0].block);
        }
        self.block_mut(block).sealed = true;

        let pending: Vec<(Variable, Value)> =
            self.block_mut(block).unknown_values.drain().collect();
        for (var, placeholder) in pending {
            self.block_mut(block).params.push(placeholder);
            let preds = self.block(block).preds.clone();
            for pred in preds {
                let arg = self.find_value(var, pred.block);
                self.instr_mut(pred.branch).branch_args_mut().push(arg);
            }
        }
    }

    pub fn annotate_value(&mut self, value: Value, name: impl Into<String>) {
        self.value_annotations.insert(value.id(), name.into());
    }

    pub fn value_annotation(&self, value: Value) -> Option<&str> {
        self.value_annotations.get(&value.id()).map(String::as_str)
    }

    /// Register a callee signature, returning the id `call`/`call_indirect`
    /// reference it by. Does not mark it used — that happens the first time
    /// a `call`/`call_indirect` instruction is built against it.
    pub fn declare_signature(&mut self, params: Vec<Type>, results: Vec<Type>) -> SignatureId {
        let id = SignatureId(self.signatures.len() as u32);
        self.signatures.push(Signature { id, params, results, used: false });
        id
    }

    pub fn resolve_signature(&self, id: SignatureId) -> Result<&Signature> {
        self.signatures
            .get(id.0 as usize)
            .ok_or_else(|| anyhow::anyhow!("resolve_signature: unregistered signature {}", id.0))
    }

    /// Mark a signature used (called through `call`/`call_indirect`).
    pub fn mark_signature_used(&mut self, id: SignatureId) -> Result<()> {
        match self.signatures.get_mut(id.0 as usize) {
            Some(sig) => {
                sig.used = true;
                Ok(())
            }
            None => bail!("mark_signature_used: unregistered signature {}", id.0),
        }
    }

    /// Build a `call` instruction against `signature`, marking it used.
    pub fn build_call(
        &mut self,
        result: Value,
        signature: SignatureId,
        args: &[Value],
    ) -> Result<InstrHandle> {
        self.mark_signature_used(signature)?;
        let handle = self.alloc_instruction();
        self.instr_mut(handle).as_call(result, signature, args);
        self.insert_instruction(handle);
        Ok(handle)
    }

    /// Build a `call_indirect` instruction against `signature`, marking it
    /// used.
    pub fn build_call_indirect(
        &mut self,
        result: Value,
        signature: SignatureId,
        table_index: Value,
        args: &[Value],
    ) -> Result<InstrHandle> {
        self.mark_signature_used(signature)?;
        let handle = self.alloc_instruction();
        self.instr_mut(handle)
            .as_call_indirect(result, signature, table_index, args);
        self.insert_instruction(handle);
        Ok(handle)
    }

    /// Run the full optimization pipeline (§4.3) followed by block layout
    /// (§4.3 tail). The fixed pass order is load-bearing — see
    /// `crate::passes::run_passes`.
    pub fn run_passes(&mut self) -> Result<()> {
        crate::passes::run_passes(self)
    }

    pub fn layout_blocks(&mut self) -> Result<Vec<BlockHandle>> {
        crate::layout::layout_blocks(self)
    }
}
