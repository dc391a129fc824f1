//! Reversed control-flow graph construction.
//!
//! Builds the forward CFG of a code object instruction-by-instruction (by
//! opcode class), then records it in reversed form: for each node `v`, its
//! list of predecessors-in-the-original-CFG, which is exactly `v`'s
//! successor list in the reversed graph.

use crate::bytecode::{CodeObject, Opcode, OpcodeClass};

/// Reversed CFG over `n+1` nodes (`0..n-1` real instructions, node `n` the
/// synthetic exit). `reversed_succ[v]` holds `v`'s original-CFG
/// predecessors; `original_succ[v]` holds `v`'s original-CFG successors
/// (needed by the dominator engine when computing semidominators by
/// examining predecessors, which in the reversed graph are successors).
pub struct ReversedCfg {
    pub sen: u32,
    pub reversed_succ: Vec<Vec<u32>>,
    pub original_succ: Vec<Vec<u32>>,
    /// `loop_flag[t]` is true iff `t` is the target of some back-edge.
    pub loop_flag: Vec<bool>,
}

fn add_forward_edge(
    reversed_succ: &mut [Vec<u32>],
    original_succ: &mut [Vec<u32>],
    p: u32,
    q: u32,
) {
    reversed_succ[q as usize].push(p);
    original_succ[p as usize].push(q);
}

pub fn build(code: &CodeObject, include_exception_edges: bool) -> ReversedCfg {
    let n = code.len() as u32;
    let sen = n;
    let node_count = (n + 1) as usize;
    let mut reversed_succ: Vec<Vec<u32>> = vec![Vec::new(); node_count];
    let mut original_succ: Vec<Vec<u32>> = vec![Vec::new(); node_count];
    let mut loop_flag = vec![false; node_count];

    // Find the canonical final return: the last Ret/RetObjectOrThis in
    // source order, used as the single exit edge target for every other
    // return in the same code object.
    let canonical_return: Option<u32> = code
        .instructions
        .iter()
        .enumerate()
        .rev()
        .find(|(_, ins)| matches!(ins.opcode.class(), OpcodeClass::Return | OpcodeClass::ReturnObjectOrThis))
        .map(|(i, _)| i as u32);

    for (offset, ins) in code.instructions.iter().enumerate() {
        let p = offset as u32;
        // Instructions are addressed by sequence index, not raw byte/word
        // offset (DESIGN.md: offset-addressing simplification); fallthrough
        // is always the next instruction in sequence. `opcode.length()`
        // describes operand-slot count for decode metadata only.
        let fallthrough = p + 1;

        let mut mark_back_edge = |target: u32, loop_flag: &mut Vec<bool>| {
            if target <= p {
                loop_flag[target as usize] = true;
            }
        };

        match ins.opcode.class() {
            OpcodeClass::Unconditional => {
                let off = ins.opcode.offset_field_index().and_then(|i| ins.operands.get(i)).and_then(|o| o.as_jump_offset()).unwrap_or(0);
                let target = (p as i64 + off as i64) as u32;
                add_forward_edge(&mut reversed_succ, &mut original_succ, p, target);
                mark_back_edge(target, &mut loop_flag);
            }
            OpcodeClass::Conditional => {
                let off = ins.opcode.offset_field_index().and_then(|i| ins.operands.get(i)).and_then(|o| o.as_jump_offset()).unwrap_or(0);
                let taken = (p as i64 + off as i64) as u32;
                add_forward_edge(&mut reversed_succ, &mut original_succ, p, taken);
                add_forward_edge(&mut reversed_succ, &mut original_succ, p, fallthrough.min(sen));
                mark_back_edge(taken, &mut loop_flag);
                if fallthrough <= p {
                    loop_flag[fallthrough.min(sen) as usize] = true;
                }
            }
            OpcodeClass::SwitchImmediate | OpcodeClass::SwitchChar | OpcodeClass::SwitchString => {
                let table_index = ins
                    .operands
                    .get(1)
                    .and_then(|o| o.as_inline())
                    .unwrap_or(0) as usize;
                let default_off = ins.opcode.offset_field_index().and_then(|i| ins.operands.get(i)).and_then(|o| o.as_jump_offset()).unwrap_or(0);
                let default_target = (p as i64 + default_off as i64) as u32;
                add_forward_edge(&mut reversed_succ, &mut original_succ, p, default_target);
                mark_back_edge(default_target, &mut loop_flag);

                let case_offsets: Vec<i64> = match ins.opcode.class() {
                    OpcodeClass::SwitchImmediate => code
                        .jump_tables
                        .immediate
                        .get(table_index)
                        .map(|rows| rows.iter().map(|(_, off)| *off as i64).collect())
                        .unwrap_or_default(),
                    OpcodeClass::SwitchChar => code
                        .jump_tables
                        .character
                        .get(table_index)
                        .map(|rows| rows.iter().map(|(_, off)| *off as i64).collect())
                        .unwrap_or_default(),
                    OpcodeClass::SwitchString => code
                        .jump_tables
                        .string
                        .get(table_index)
                        .map(|rows| rows.iter().map(|(_, off)| *off as i64).collect())
                        .unwrap_or_default(),
                    _ => unreachable!(),
                };
                for off in case_offsets {
                    let target = (p as i64 + off) as u32;
                    add_forward_edge(&mut reversed_succ, &mut original_succ, p, target);
                    mark_back_edge(target, &mut loop_flag);
                }
            }
            OpcodeClass::Return | OpcodeClass::ReturnObjectOrThis => {
                let is_last_return = canonical_return == Some(p);
                if is_last_return {
                    add_forward_edge(&mut reversed_succ, &mut original_succ, p, sen);
                } else if let Some(canon) = canonical_return {
                    add_forward_edge(&mut reversed_succ, &mut original_succ, p, canon);
                } else {
                    add_forward_edge(&mut reversed_succ, &mut original_succ, p, sen);
                }
            }
            OpcodeClass::End => {
                add_forward_edge(&mut reversed_succ, &mut original_succ, p, sen);
            }
            _ => {
                // Family 3/4/5/6/8/9/10 and Pure all fall through by default.
                add_forward_edge(&mut reversed_succ, &mut original_succ, p, fallthrough.min(sen));
            }
        }

        if include_exception_edges && ins.opcode.may_throw() {
            match code.innermost_handler_at(p) {
                Some(handler) => {
                    add_forward_edge(&mut reversed_succ, &mut original_succ, p, handler.target);
                    mark_back_edge(handler.target, &mut loop_flag);
                }
                None => {
                    add_forward_edge(&mut reversed_succ, &mut original_succ, p, sen);
                }
            }
        }
    }

    ReversedCfg {
        sen,
        reversed_succ,
        original_succ,
        loop_flag,
    }
}
