//! Lengauer–Tarjan immediate post-dominator computation plus the
//! loop-containment precomputation.
//!
//! Implemented over the *reversed* CFG built by [`crate::analysis::cfg`], so
//! "dominators of the reversed graph rooted at SEN" are exactly
//! "post-dominators of the original graph". The DFS is an explicit
//! work-stack iteration rather than recursion, to avoid host-stack overflow
//! on deeply nested or very long code objects.

use super::cfg::ReversedCfg;

/// Immediate post-dominator table plus loop metadata for one code object
/// under one value of `include_exception_edges`.
#[derive(Debug, Clone)]
pub struct DominatorInfo {
    /// `idom[v]` is the immediate post-dominator of `v`, or `None` for the
    /// root (SEN) and for any node the reversed DFS never reached (dead
    /// code that cannot reach the function's exit).
    idom: Vec<Option<u32>>,
    /// `loop_flag[t]` true iff `t` is the target of a back-edge.
    loop_flag: Vec<bool>,
    /// `contains_loop[i]` answers "does the branch at `i` enclose a loop?"
    /// in O(1): true iff the source-order interval `[i, idom[i]]` contains
    /// a loop-back-edge target.
    contains_loop: Vec<bool>,
    sen: u32,
}

impl DominatorInfo {
    #[inline]
    pub fn ipd(&self, node: u32) -> Option<u32> {
        self.idom.get(node as usize).copied().flatten()
    }

    #[inline]
    pub fn is_loop_target(&self, node: u32) -> bool {
        self.loop_flag.get(node as usize).copied().unwrap_or(false)
    }

    #[inline]
    pub fn contains_loop(&self, node: u32) -> bool {
        self.contains_loop.get(node as usize).copied().unwrap_or(false)
    }

    #[inline]
    pub fn sen(&self) -> u32 {
        self.sen
    }
}

pub fn compute(cfg: &ReversedCfg) -> DominatorInfo {
    let node_count = cfg.reversed_succ.len();
    let sen = cfg.sen;

    // --- Step 3a: iterative DFS from SEN over the reversed graph's
    // successor function (= original-CFG predecessors). ---
    let mut dfnum: Vec<Option<u32>> = vec![None; node_count];
    let mut vertex: Vec<u32> = Vec::with_capacity(node_count);
    let mut parent: Vec<Option<u32>> = vec![None; node_count];

    {
        // (node, next child index to visit)
        let mut work: Vec<(u32, usize)> = vec![(sen, 0)];
        dfnum[sen as usize] = Some(0);
        vertex.push(sen);

        while let Some((node, idx)) = work.last().copied() {
            let succs = &cfg.reversed_succ[node as usize];
            if idx >= succs.len() {
                work.pop();
                continue;
            }
            work.last_mut().unwrap().1 += 1;
            let child = succs[idx];
            if dfnum[child as usize].is_none() {
                dfnum[child as usize] = Some(vertex.len() as u32);
                vertex.push(child);
                parent[child as usize] = Some(node);
                work.push((child, 0));
            }
        }
    }

    let n = vertex.len(); // number of reached vertices, including SEN

    // `semi[v]` holds the DFS-number of v's current semidominator estimate
    // (not `v` itself); unreached nodes get a sentinel larger than any real
    // DFS number so they never win a semidominator comparison.
    let unreached_semi = node_count as u32;
    let mut semi: Vec<u32> = (0..node_count as u32)
        .map(|v| dfnum[v as usize].unwrap_or(unreached_semi))
        .collect();
    let mut label: Vec<u32> = (0..node_count as u32).collect();
    let mut ancestor: Vec<Option<u32>> = vec![None; node_count];
    let mut idom: Vec<Option<u32>> = vec![None; node_count];
    let mut bucket: Vec<Vec<u32>> = vec![Vec::new(); node_count];

    // Path-compressing EVAL. `compress` is the textbook recursive
    // definition: it only has work to do (and only recurses) when `v`'s
    // ancestor itself has an ancestor, so its recursion depth is bounded by
    // the current length of the compressed ancestor chain, not by CFG
    // depth — the traversal that *is* sized by CFG depth (the DFS above)
    // is already iterative.
    fn eval(v: u32, ancestor: &mut [Option<u32>], label: &mut [u32], semi: &[u32]) -> u32 {
        if ancestor[v as usize].is_none() {
            return v;
        }
        compress(v, ancestor, label, semi);
        label[v as usize]
    }

    fn compress(v: u32, ancestor: &mut [Option<u32>], label: &mut [u32], semi: &[u32]) {
        let a = ancestor[v as usize].expect("compress called with no ancestor");
        if ancestor[a as usize].is_some() {
            compress(a, ancestor, label, semi);
            if semi[label[a as usize] as usize] < semi[label[v as usize] as usize] {
                label[v as usize] = label[a as usize];
            }
            ancestor[v as usize] = ancestor[a as usize];
        }
    }

    // --- Step 3b/3c: process vertices in decreasing DFS order. ---
    if n >= 2 {
        for i in (1..n).rev() {
            let w = vertex[i];

            // Semidominator computation: examine predecessors of w in the
            // reversed graph, which are w's *successors* in the original
            // CFG.
            for &u in &cfg.original_succ[w as usize] {
                if dfnum[u as usize].is_none() {
                    continue; // unreached in this analysis variant
                }
                let u_eval = eval(u, &mut ancestor, &mut label, &semi);
                if semi[u_eval as usize] < semi[w as usize] {
                    semi[w as usize] = semi[u_eval as usize];
                }
            }

            let semi_w = semi[w as usize];
            bucket[vertex[semi_w as usize] as usize].push(w);

            // LINK(parent[w], w)
            let p = parent[w as usize].expect("non-root vertex has a DFS parent");
            ancestor[w as usize] = Some(p);

            // Process w's parent's bucket now that LINK has happened.
            let pending: Vec<u32> = std::mem::take(&mut bucket[p as usize]);
            for v in pending {
                let u = eval(v, &mut ancestor, &mut label, &semi);
                idom[v as usize] = Some(if semi[u as usize] < semi[v as usize] { u } else { p });
            }
        }

        for i in 1..n {
            let w = vertex[i];
            let semi_w_vertex = vertex[semi[w as usize] as usize];
            if let Some(cur) = idom[w as usize] {
                if cur != semi_w_vertex {
                    idom[w as usize] = idom[cur as usize];
                }
            }
        }
    }
    idom[sen as usize] = None;

    // --- Step 4: loop-containment precomputation. ---
    let mut contains_loop = vec![false; node_count];
    for i in 0..node_count as u32 {
        if let Some(id) = idom[i as usize] {
            let (lo, hi) = if i <= id { (i, id) } else { (id, i) };
            let mut found = false;
            for t in lo..=hi {
                if cfg.loop_flag.get(t as usize).copied().unwrap_or(false) {
                    found = true;
                    break;
                }
            }
            contains_loop[i as usize] = found;
        }
    }

    DominatorInfo {
        idom,
        loop_flag: cfg.loop_flag.clone(),
        contains_loop,
        sen,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::cfg;
    use crate::bytecode::{CodeObject, CodeObjectId, Instruction, Opcode, Operand};

    fn ins(opcode: Opcode, operands: Vec<Operand>) -> Instruction {
        Instruction {
            opcode,
            operands,
            line: 0,
        }
    }

    /// `r ← 0; end r` — two straight-line instructions.
    fn straight_line() -> CodeObject {
        let code = vec![
            ins(Opcode::Move, vec![Operand::Register(0), Operand::Register(0), Operand::Register(0)]),
            ins(Opcode::End, vec![Operand::Register(0)]),
        ];
        CodeObject::new(CodeObjectId(0), code)
    }

    /// `jtrue r0, +2; r1 <- move; end r1` — a diamond with no explicit else.
    fn simple_branch() -> CodeObject {
        let code = vec![
            ins(Opcode::JTrue, vec![Operand::Register(0), Operand::JumpOffset(2)]),
            ins(Opcode::Move, vec![Operand::Register(1), Operand::Register(1), Operand::Register(1)]),
            ins(Opcode::End, vec![Operand::Register(1)]),
        ];
        CodeObject::new(CodeObjectId(0), code)
    }

    /// A two-instruction loop: `loop_if_true r0, -1 (back to self); end`.
    fn tiny_loop() -> CodeObject {
        let code = vec![
            ins(Opcode::LoopIfTrue, vec![Operand::Register(0), Operand::JumpOffset(0)]),
            ins(Opcode::End, vec![Operand::Register(0)]),
        ];
        CodeObject::new(CodeObjectId(0), code)
    }

    #[test]
    fn straight_line_ipd_is_next_instruction() {
        let co = straight_line();
        let g = cfg::build(&co, false);
        let info = compute(&g);
        assert_eq!(info.ipd(0), Some(1));
        assert_eq!(info.ipd(1), Some(2)); // SEN
        assert_eq!(info.ipd(2), None); // SEN has no ipd
    }

    #[test]
    fn branch_ipd_is_join_point() {
        let co = simple_branch();
        let g = cfg::build(&co, false);
        let info = compute(&g);
        // jtrue at 0 post-dominated by instruction 2 (the `end`, where both
        // branches converge).
        assert_eq!(info.ipd(0), Some(2));
    }

    #[test]
    fn back_edge_is_flagged_and_branch_contains_loop() {
        let co = tiny_loop();
        let g = cfg::build(&co, false);
        assert!(g.loop_flag[0]);
        let info = compute(&g);
        assert!(info.is_loop_target(0));
        // idom[0] should be the `end` at offset 1 (or SEN); either way the
        // interval from 0 to idom(0) contains the loop target 0 itself.
        assert!(info.contains_loop(0));
    }

    /// `switch (r0) { case 0: loop_if_true r0, self; } end r0` — the
    /// switch's case-0 arm loops in place before falling through to the
    /// join point, exercising a multi-way branch enclosing a nested loop.
    fn switch_with_nested_loop() -> CodeObject {
        let mut co = CodeObject::new(
            CodeObjectId(0),
            vec![
                ins(Opcode::SwitchImm, vec![Operand::Register(0), Operand::Inline(0), Operand::JumpOffset(3)]),
                ins(Opcode::LoopIfTrue, vec![Operand::Register(0), Operand::JumpOffset(0)]),
                ins(Opcode::Jmp, vec![Operand::JumpOffset(1)]),
                ins(Opcode::End, vec![Operand::Register(0)]),
            ],
        );
        co.jump_tables.immediate = vec![vec![(0, 1)]];
        co
    }

    #[test]
    fn switch_case_enclosing_a_loop_post_dominates_at_the_join_point() {
        let co = switch_with_nested_loop();
        let g = cfg::build(&co, false);
        assert!(g.loop_flag[1], "the loop's self-edge must be flagged");
        let info = compute(&g);
        // Both the default arm (straight to `end`) and the case-0 arm
        // (through the loop, then a plain jump) converge at offset 3.
        assert_eq!(info.ipd(0), Some(3));
        assert!(info.is_loop_target(1));
        assert!(info.contains_loop(0), "the switch's dominated interval encloses the loop target");
    }

    #[test]
    fn sen_postdominates_every_reachable_node() {
        for co in [straight_line(), simple_branch(), tiny_loop()] {
            let g = cfg::build(&co, false);
            let info = compute(&g);
            for i in 0..co.len() as u32 {
                // Every reachable real instruction eventually post-dominates
                // to SEN by walking idom repeatedly.
                let mut cur = i;
                let mut steps = 0;
                while let Some(next) = info.ipd(cur) {
                    cur = next;
                    steps += 1;
                    assert!(steps < 100, "idom chain did not terminate at SEN");
                }
                assert_eq!(cur, info.sen());
            }
        }
    }
}
