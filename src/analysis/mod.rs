//! Dominator engine: builds the reversed CFG of a code object and computes
//! immediate post-dominators via Lengauer–Tarjan.

mod cfg;
mod dominators;

pub use dominators::DominatorInfo;

use crate::bytecode::CodeObject;

/// Run the full analysis pipeline for one code object under one value of
/// `include_exception_edges`. Called lazily by [`CodeObject::analysis`] and
/// cached there; callers should not need to invoke this directly.
pub fn analyze(code: &CodeObject, include_exception_edges: bool) -> DominatorInfo {
    let _span = tracing::debug_span!(
        "analyze_code_object",
        code_object = %code.id,
        include_exception_edges
    )
    .entered();
    let graph = cfg::build(code, include_exception_edges);
    dominators::compute(&graph)
}
