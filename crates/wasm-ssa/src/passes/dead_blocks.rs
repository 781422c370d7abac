//! Dead-block elimination (§4.3): mark every block unreachable from the
//! entry block as `invalid`, and prune stale predecessor entries pointing
//! at blocks that turn out to be unreachable.
//!
//! Grounded directly on the teacher's `optimizer::dead_blocks` pass: a BFS
//! from the entry over successors, a `HashSet` of reachable blocks, then a
//! sweep over the pool — the same two-phase mark/sweep shape, generalized
//! from `Vec<IrBlock>::retain` (the teacher owns its blocks directly) to
//! flipping `invalid` on a pooled block (here, blocks are handles into a
//! pool shared with other data, so nothing can be physically removed
//! without invalidating every handle referencing it).

use crate::block::BlockHandle;
use crate::builder::core::Builder;
use anyhow::{bail, Result};
use std::collections::HashSet;

pub fn run(b: &mut Builder) -> Result<()> {
    let n = b.blocks.len();
    if n == 0 {
        return Ok(());
    }
    let entry = b.entry_block();

    let mut reachable = HashSet::new();
    reachable.insert(entry);
    let mut stack = vec![entry];
    while let Some(cur) = stack.pop() {
        for &succ in &b.block(cur).succs.clone() {
            if reachable.insert(succ) {
                stack.push(succ);
            }
        }
    }

    for i in 0..n {
        let handle = BlockHandle(i as u32);
        if reachable.contains(&handle) {
            if !b.block(handle).sealed {
                bail!("dead_block_elimination: reachable block {handle} was never sealed");
            }
        } else {
            b.block_mut(handle).invalid = true;
        }
    }

    for i in 0..n {
        let handle = BlockHandle(i as u32);
        if reachable.contains(&handle) {
            b.block_mut(handle).preds.retain(|p| reachable.contains(&p.block));
        }
    }

    Ok(())
}
