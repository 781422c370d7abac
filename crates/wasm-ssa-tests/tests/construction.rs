//! End-to-end tests for on-the-fly SSA construction, driven purely through
//! `Builder`'s public API.
//!
//! These verify that:
//! 1. A variable defined differently on two incoming arms resolves to a
//!    genuine merged block parameter, not a stale single definition.
//! 2. A variable read inside a loop header before the back edge is wired
//!    still resolves correctly once the header seals.

use wasm_ssa_tests::{diamond_function, loop_function};

#[test]
fn diamond_merge_produces_one_join_parameter() {
    let b = diamond_function().unwrap();
    // `join` is the 4th block allocated (entry, left, right, join).
    let join = wasm_ssa::BlockHandle(3);
    assert_eq!(b.block(join).params.len(), 1);
    assert_eq!(b.block(join).preds.len(), 2);
}

#[test]
fn diamond_survives_the_full_pipeline() {
    let mut b = diamond_function().unwrap();
    b.run_passes().unwrap();
    let order = b.layout_blocks().unwrap();
    assert!(!order.is_empty());
    let dump = wasm_ssa::dump_function(&b);
    assert!(dump.contains("return"));
}

#[test]
fn loop_header_resolves_its_placeholder_once_sealed() {
    let mut b = loop_function(10).unwrap();
    // The header block is the 2nd allocated (entry, header, body, exit).
    let header = wasm_ssa::BlockHandle(1);
    assert!(b.block(header).sealed);
    assert!(b.block(header).unknown_values.is_empty());
    assert_eq!(b.block(header).params.len(), 1, "the loop counter becomes a header parameter");
}

#[test]
fn loop_function_runs_through_passes_and_layout() {
    let mut b = loop_function(3).unwrap();
    b.run_passes().unwrap();
    let order = b.layout_blocks().unwrap();
    assert!(order.len() >= 4, "entry, header, body, exit, plus any split trampolines");
}
