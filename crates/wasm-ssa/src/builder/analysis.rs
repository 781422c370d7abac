//! CFG analysis: reverse postorder, dominators, loop headers, and the loop
//! nesting forest (§4.2).
//!
//! Runs once per function, after construction and before the optimization
//! pipeline — `sort_successors` and later passes rely on reverse postorder
//! and dominance already being in place (§4.3's fixed pass order).

use crate::block::BlockHandle;
use crate::builder::core::Builder;
use anyhow::{bail, Result};
use std::collections::{HashMap, HashSet, VecDeque};

/// Run the full analysis stage: reverse postorder, immediate dominators
/// (and the dominator-tree ancestor tables that make `dominator_lca`
/// cheap), loop headers, and the loop nesting forest. Order matters —
/// dominators need reverse postorder numbers, loop headers need
/// dominance, and loop nesting needs loop headers.
pub fn analyze(b: &mut Builder) -> Result<()> {
    compute_rpo(b);
    compute_dominators(b)?;
    compute_loop_headers(b);
    compute_loop_nesting(b);
    Ok(())
}

/// Number every block reachable from the entry block with its position in
/// reverse postorder, via an iterative DFS over `succs` in program order
/// (the conditional branch's target before the fallthrough/unconditional
/// one, since that's the order they were pushed during construction).
/// Unreachable blocks are left with `reverse_postorder: None`.
pub fn compute_rpo(b: &mut Builder) {
    let n = b.blocks.len();
    for blk in &mut b.blocks {
        blk.reverse_postorder = None;
    }
    if n == 0 {
        b.rpo.clear();
        return;
    }
    let entry = b.entry_block();
    let mut visited = vec![false; n];
    let mut postorder = Vec::with_capacity(n);
    let mut stack: Vec<(BlockHandle, usize)> = Vec::new();

    visited[entry.0 as usize] = true;
    stack.push((entry, 0));
    while let Some(top) = stack.last_mut() {
        let (blk, idx) = *top;
        let succs = b.block(blk).succs.clone();
        if idx < succs.len() {
            top.1 += 1;
            let next = succs[idx];
            if next == crate::block::RETURN_BLOCK || b.block(next).invalid {
                continue;
            }
            if !visited[next.0 as usize] {
                visited[next.0 as usize] = true;
                stack.push((next, 0));
            }
        } else {
            postorder.push(blk);
            stack.pop();
        }
    }

    postorder.reverse();
    for (i, &blk) in postorder.iter().enumerate() {
        b.block_mut(blk).reverse_postorder = Some(i as u32);
    }
    b.rpo = postorder;
}

/// Cooper, Harvey & Kennedy's iterative immediate-dominator algorithm,
/// driven by the reverse postorder numbers `compute_rpo` assigns. Also
/// builds the binary-lifting ancestor table `dominator_lca` walks.
pub fn compute_dominators(b: &mut Builder) -> Result<()> {
    if b.rpo.is_empty() && !b.blocks.is_empty() {
        bail!("compute_dominators: compute_rpo must run first");
    }
    let n = b.blocks.len();
    if n == 0 {
        b.idom.clear();
        b.idom_up.clear();
        b.dom_depth.clear();
        return Ok(());
    }
    let entry = b.entry_block();
    let order = b.rpo.clone();

    let mut idom: Vec<Option<BlockHandle>> = vec![None; n];
    idom[entry.0 as usize] = Some(entry);

    let mut changed = true;
    while changed {
        changed = false;
        for &node in order.iter().skip(1) {
            let preds = b.block(node).preds.clone();
            let mut new_idom: Option<BlockHandle> = None;
            for p in &preds {
                if idom[p.block.0 as usize].is_none() {
                    continue;
                }
                new_idom = Some(match new_idom {
                    None => p.block,
                    Some(cur) => intersect(b, &idom, cur, p.block),
                });
            }
            if idom[node.0 as usize] != new_idom {
                idom[node.0 as usize] = new_idom;
                changed = true;
            }
        }
    }
    idom[entry.0 as usize] = None;
    b.idom = idom;

    build_dominator_tree_tables(b);
    Ok(())
}

fn intersect(
    b: &Builder,
    idom: &[Option<BlockHandle>],
    mut a: BlockHandle,
    mut other: BlockHandle,
) -> BlockHandle {
    loop {
        let ra = b.block(a).reverse_postorder.expect("intersect: unreachable block in dom chain");
        let rb = b
            .block(other)
            .reverse_postorder
            .expect("intersect: unreachable block in dom chain");
        match ra.cmp(&rb) {
            std::cmp::Ordering::Greater => a = idom[a.0 as usize].expect("intersect: walked past entry"),
            std::cmp::Ordering::Less => {
                other = idom[other.0 as usize].expect("intersect: walked past entry")
            }
            std::cmp::Ordering::Equal => return a,
        }
    }
}

fn build_dominator_tree_tables(b: &mut Builder) {
    let n = b.blocks.len();
    let entry = b.entry_block();

    let mut children: Vec<Vec<BlockHandle>> = vec![Vec::new(); n];
    for i in 0..n {
        if let Some(parent) = b.idom[i] {
            children[parent.0 as usize].push(BlockHandle(i as u32));
        }
    }

    let mut depth = vec![0u32; n];
    let mut queue = VecDeque::new();
    queue.push_back(entry);
    while let Some(node) = queue.pop_front() {
        for &child in &children[node.0 as usize] {
            depth[child.0 as usize] = depth[node.0 as usize] + 1;
            queue.push_back(child);
        }
    }
    b.dom_depth = depth;

    let levels = (usize::BITS - n.max(1).leading_zeros()) as usize + 1;
    let mut up = vec![vec![None; n]; levels];
    up[0].clone_from(&b.idom);
    for k in 1..levels {
        for i in 0..n {
            up[k][i] = match up[k - 1][i] {
                Some(mid) => up[k - 1][mid.0 as usize],
                None => None,
            };
        }
    }
    b.idom_up = up;
}

/// Lowest common ancestor of `x` and `y` in the dominator tree, via binary
/// lifting over `Builder::idom_up`. Requires `compute_dominators` to have
/// run.
pub fn dominator_lca(b: &Builder, mut x: BlockHandle, mut y: BlockHandle) -> BlockHandle {
    if b.dom_depth[x.0 as usize] < b.dom_depth[y.0 as usize] {
        std::mem::swap(&mut x, &mut y);
    }
    let mut diff = b.dom_depth[x.0 as usize] - b.dom_depth[y.0 as usize];
    let mut level = 0;
    while diff > 0 {
        if diff & 1 == 1 {
            x = b.idom_up[level][x.0 as usize].expect("dominator_lca: ancestor table underflow");
        }
        diff >>= 1;
        level += 1;
    }
    if x == y {
        return x;
    }
    for lvl in (0..b.idom_up.len()).rev() {
        let ax = b.idom_up[lvl][x.0 as usize];
        let ay = b.idom_up[lvl][y.0 as usize];
        if ax != ay {
            x = ax.expect("dominator_lca: x and y diverge below the entry block");
            y = ay.expect("dominator_lca: x and y diverge below the entry block");
        }
    }
    b.idom_up[0][x.0 as usize].expect("dominator_lca: x and y share no common ancestor")
}

/// Whether `x` dominates `y` (every path from the entry to `y` passes
/// through `x`). A block dominates itself.
pub fn dominates(b: &Builder, x: BlockHandle, y: BlockHandle) -> bool {
    if x == y {
        return true;
    }
    let mut cur = y;
    while let Some(parent) = b.idom.get(cur.0 as usize).copied().flatten() {
        if parent == x {
            return true;
        }
        cur = parent;
    }
    false
}

/// Mark every loop header: a block `h` reached by a back edge `n -> h`
/// where `h` dominates `n` (§4.2).
pub fn compute_loop_headers(b: &mut Builder) {
    for blk in &mut b.blocks {
        blk.loop_header = false;
    }
    let n = b.blocks.len();
    for i in 0..n {
        let node = BlockHandle(i as u32);
        let succs = b.block(node).succs.clone();
        for &target in &succs {
            if dominates(b, target, node) {
                b.block_mut(target).loop_header = true;
            }
        }
    }
}

/// Build the loop nesting forest: for each loop header, its immediately
/// enclosing loop's header (`None` at the top level). A loop's body is the
/// natural loop of its back edge(s) — if a header has several back edges,
/// their bodies are unioned (§4.2's "loop-nesting forest").
pub fn compute_loop_nesting(b: &mut Builder) {
    let n = b.blocks.len();
    let mut bodies: HashMap<BlockHandle, HashSet<BlockHandle>> = HashMap::new();

    for i in 0..n {
        let node = BlockHandle(i as u32);
        let succs = b.block(node).succs.clone();
        for &header in &succs {
            if !dominates(b, header, node) {
                continue;
            }
            let mut body = HashSet::new();
            body.insert(header);
            body.insert(node);
            let mut worklist = vec![node];
            while let Some(cur) = worklist.pop() {
                if cur == header {
                    continue;
                }
                for pred in &b.block(cur).preds.clone() {
                    if body.insert(pred.block) {
                        worklist.push(pred.block);
                    }
                }
            }
            bodies.entry(header).or_default().extend(body);
        }
    }

    b.loop_parent = vec![None; n];
    let headers: Vec<BlockHandle> = bodies.keys().copied().collect();
    for &header in &headers {
        let mut innermost: Option<(usize, BlockHandle)> = None;
        for &other in &headers {
            if other == header {
                continue;
            }
            let Some(other_body) = bodies.get(&other) else { continue };
            if !other_body.contains(&header) {
                continue;
            }
            let size = other_body.len();
            if innermost.map_or(true, |(best, _)| size < best) {
                innermost = Some((size, other));
            }
        }
        b.loop_parent[header.0 as usize] = innermost.map(|(_, other)| other);
    }

    // For every block (header or not), the smallest body that contains it,
    // excluding its own body when the block is itself that body's header —
    // a loop never encloses its own header, only whatever outer loop exists.
    let mut enclosing: Vec<Option<BlockHandle>> = vec![None; n];
    for i in 0..n {
        let blk = BlockHandle(i as u32);
        let mut innermost: Option<(usize, BlockHandle)> = None;
        for (&header, body) in &bodies {
            if header == blk || !body.contains(&blk) {
                continue;
            }
            let size = body.len();
            if innermost.map_or(true, |(best, _)| size < best) {
                innermost = Some((size, header));
            }
        }
        enclosing[i] = innermost.map(|(_, header)| header);
    }
    b.enclosing_loop = enclosing;
}

/// The header of the innermost natural loop that actually contains `block`
/// in its body — not merely whatever loop header happens to be the nearest
/// dominator, since a block can be dominated by a header it was never part
/// of (a loop's exit, for instance). `None` means `block` isn't nested in
/// any loop; the forest's implicit root. Requires `compute_loop_nesting` to
/// have run.
pub fn enclosing_loop(b: &Builder, block: BlockHandle) -> Option<BlockHandle> {
    b.enclosing_loop.get(block.0 as usize).copied().flatten()
}

/// The loop headers directly nested under `header` (`None` for the forest
/// root, i.e. the top-level loops) — the complement of `enclosing_loop`
/// restricted to header blocks.
pub fn loop_children(b: &Builder, header: Option<BlockHandle>) -> Vec<BlockHandle> {
    (0..b.blocks.len())
        .map(|i| BlockHandle(i as u32))
        .filter(|&h| b.block(h).loop_header && b.loop_parent[h.0 as usize] == header)
        .collect()
}
