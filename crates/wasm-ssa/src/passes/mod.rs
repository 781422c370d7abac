//! The optimization pipeline (§4.3): a fixed sequence of passes run once,
//! in order, over a function that's done with construction. The order is
//! load-bearing — later passes assume earlier ones already ran (dominance
//! needs reverse postorder, dead-code elimination needs the alias table
//! settled by redundant-phi and no-op elimination first) — so this is the
//! one place that orchestrates them, the same role the teacher's
//! `optimizer::run_passes` plays for its (much shorter) pipeline.

pub mod alias;
pub mod dead_blocks;
pub mod dead_code;
pub mod nop_elim;
pub mod redundant_phi;
pub mod sort_successors;

use crate::builder::analysis;
use crate::builder::core::Builder;
use anyhow::Result;

pub fn run_passes(b: &mut Builder) -> Result<()> {
    sort_successors::run(b);
    dead_blocks::run(b)?;
    redundant_phi::run(b);

    // "calculateImmediateDominators" in the pipeline's own terms: dominance
    // needs reverse postorder numbers, loop headers need dominance, and the
    // loop-nesting forest needs loop headers, so all four run as one unit.
    analysis::compute_rpo(b);
    analysis::compute_dominators(b)?;
    analysis::compute_loop_headers(b);
    analysis::compute_loop_nesting(b);

    nop_elim::run(b);
    dead_code::run(b)?;
    Ok(())
}
