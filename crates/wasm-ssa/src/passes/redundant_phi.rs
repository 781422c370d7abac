//! Redundant (trivial) block-parameter elimination (§4.3).
//!
//! On-the-fly construction deliberately produces some parameters that turn
//! out not to carry any real choice — most commonly a single-predecessor
//! block sealed while a variable lookup was still pending (`Builder::seal`
//! always promotes a pending placeholder to a real parameter, even when
//! there's exactly one predecessor to resolve it against). A parameter is
//! trivial when every incoming argument is either the same value, or the
//! parameter feeding back into itself (a loop carrying its own prior
//! value with no other definition). Either way the parameter can be
//! replaced by that one distinct value everywhere, via the alias table.
//!
//! Removing one parameter shifts the index of every later one, and an
//! argument list shrinking can make another previously-non-trivial
//! parameter trivial (its lone holdout was itself redundant), so this
//! runs to a fixpoint: find one removable parameter, remove it, restart.

use crate::block::BlockHandle;
use crate::builder::core::Builder;
use crate::passes::alias;
use crate::types::Value;

pub fn run(b: &mut Builder) {
    loop {
        if !remove_one_trivial_param(b) {
            break;
        }
    }
}

fn remove_one_trivial_param(b: &mut Builder) -> bool {
    for i in 0..b.blocks.len() {
        let handle = BlockHandle(i as u32);
        if b.block(handle).invalid {
            continue;
        }
        let preds = b.block(handle).preds.clone();
        if preds.is_empty() {
            continue;
        }
        let param_count = b.block(handle).params.len();
        for idx in 0..param_count {
            let param = b.block(handle).params[idx];
            let mut distinct: Option<Value> = None;
            let mut trivial = true;
            for pred in &preds {
                let arg = b.instr(pred.branch).branch_args()[idx];
                if arg == param {
                    continue;
                }
                match distinct {
                    None => distinct = Some(arg),
                    Some(seen) if seen == arg => {}
                    Some(_) => {
                        trivial = false;
                        break;
                    }
                }
            }
            if trivial {
                let replacement = distinct.unwrap_or(param);
                if replacement != param {
                    remove_param(b, handle, idx, param, replacement);
                    return true;
                }
            }
        }
    }
    false
}

fn remove_param(
    b: &mut Builder,
    block: BlockHandle,
    idx: usize,
    param: Value,
    replacement: Value,
) {
    b.block_mut(block).params.remove(idx);
    let preds = b.block(block).preds.clone();
    for pred in &preds {
        b.instr_mut(pred.branch).branch_args_mut().remove(idx);
    }
    alias::set(b, param, replacement);
}
