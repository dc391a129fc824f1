//! Family 2 — branches: `jtrue`/`jfalse`, loop-with-condition, typed
//! switches, the finally-replay jump, and the for-in iterator step.
//!
//! Plain unconditional jumps carry no guard operand and so never touch
//! the PC stack — there is nothing data-dependent about where control
//! goes, only the typed/conditional forms are "a branch" in the PC-stack
//! sense.

use crate::bytecode::{Instruction, Opcode};
use crate::error::IfcError;
use crate::host::{HostCalls, ObjectModel};
use crate::label::Label;
use crate::pcstack::FrameMarker;
use crate::value::RawValue;
use crate::vm::{StepOutcome, Transaction};

fn is_truthy(v: &RawValue) -> bool {
    match v {
        RawValue::Undefined => false,
        RawValue::Bool(b) => *b,
        RawValue::Number(n) => *n != 0.0,
        RawValue::Str(s) => !s.is_empty(),
        RawValue::Object(_) => true,
    }
}

/// PC-stack discipline for a branch with guard label `l_g` at offset `p`
/// of `frame_marker` ("let `I_p = idom[p]`; if the stack is non-empty and
/// (`I_p == SEN` or (`I == I_p` and `F == F_top`)), join; else push").
fn push_or_join_guard<O: ObjectModel, H: HostCalls>(
    txn: &mut Transaction<O, H>,
    frame_marker: FrameMarker,
    p: u32,
    l_g: Label,
    exc_flag: bool,
) {
    let frame = txn.current_frame();
    let code = txn
        .code_objects
        .get(frame.code_object)
        .expect("current frame references a live code object");
    let ip = code.analysis(exc_flag).ipd(p).unwrap_or_else(|| code.sen());
    let sen = code.sen();

    let merge = match txn.pcstack.head() {
        Some(head) => ip == sen || (head.ipd == ip && head.frame == frame_marker),
        None => false,
    };

    if merge {
        let _ = txn.pcstack.join(l_g, None, None);
    } else {
        txn.pcstack.push(l_g, ip, frame_marker, exc_flag, true);
    }
}

pub(super) fn step<O: ObjectModel, H: HostCalls>(
    txn: &mut Transaction<O, H>,
    ins: &Instruction,
) -> StepOutcome {
    let guard_reg = ins.operands[0]
        .as_register()
        .expect("conditional branches read their guard from a register");
    let l_g = txn.current_frame().registers.label_of(guard_reg);

    if l_g.taint() {
        let location = txn.current_location();
        return StepOutcome::FatalAbort(IfcError::BranchOnTaint { location });
    }

    let frame = txn.current_frame();
    let frame_marker = frame.marker;
    let p = frame.pc;
    let exc_flag = frame.exc_handler_present;
    push_or_join_guard(txn, frame_marker, p, l_g, exc_flag);

    let offset_idx = ins
        .opcode
        .offset_field_index()
        .expect("conditional opcodes carry an offset operand");
    let offset = ins.operands[offset_idx]
        .as_jump_offset()
        .expect("offset field is a JumpOffset operand");
    let guard_val = txn.raw_value(guard_reg);
    let take = match ins.opcode {
        Opcode::JTrue | Opcode::LoopIfTrue | Opcode::ForInNext => is_truthy(&guard_val),
        Opcode::JFalse => !is_truthy(&guard_val),
        other => unreachable!("{other:?} is not a conditional opcode"),
    };

    if take {
        StepOutcome::Jump((p as i32 + offset) as u32)
    } else {
        StepOutcome::Continue
    }
}

pub(super) fn step_unconditional<O: ObjectModel, H: HostCalls>(
    txn: &mut Transaction<O, H>,
    ins: &Instruction,
) -> StepOutcome {
    let p = txn.current_frame().pc;
    let offset_idx = ins
        .opcode
        .offset_field_index()
        .expect("unconditional opcodes carry an offset operand");
    let offset = ins.operands[offset_idx]
        .as_jump_offset()
        .expect("offset field is a JumpOffset operand");
    StepOutcome::Jump((p as i32 + offset) as u32)
}

fn switch_step<O: ObjectModel, H: HostCalls>(
    txn: &mut Transaction<O, H>,
    ins: &Instruction,
    resolve_target: impl FnOnce(&Transaction<O, H>, u32, u32) -> Option<u32>,
) -> StepOutcome {
    let selector_reg = ins.operands[0]
        .as_register()
        .expect("switches read their selector from a register");
    let l_g = txn.current_frame().registers.label_of(selector_reg);
    if l_g.taint() {
        let location = txn.current_location();
        return StepOutcome::FatalAbort(IfcError::BranchOnTaint { location });
    }

    let frame = txn.current_frame();
    let frame_marker = frame.marker;
    let p = frame.pc;
    let exc_flag = frame.exc_handler_present;
    push_or_join_guard(txn, frame_marker, p, l_g, exc_flag);

    let table_index = ins.operands[1].as_inline().expect("switch table index operand");
    let default_offset = ins.operands[2]
        .as_jump_offset()
        .expect("switch default offset operand");

    let target = resolve_target(&*txn, table_index, p).unwrap_or((p as i32 + default_offset) as u32);
    StepOutcome::Jump(target)
}

pub(super) fn step_switch_immediate<O: ObjectModel, H: HostCalls>(
    txn: &mut Transaction<O, H>,
    ins: &Instruction,
) -> StepOutcome {
    let selector_reg = ins.operands[0].as_register().unwrap();
    let selector = txn.raw_value(selector_reg);
    switch_step(txn, ins, move |txn, table_index, p| {
        let RawValue::Number(n) = selector else { return None };
        let key = n as i64;
        let frame = txn.current_frame();
        let code = txn.code_objects.get(frame.code_object)?;
        let table = code.jump_tables.immediate.get(table_index as usize)?;
        table
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, off)| (p as i32 + *off as i32) as u32)
    })
}

pub(super) fn step_switch_char<O: ObjectModel, H: HostCalls>(
    txn: &mut Transaction<O, H>,
    ins: &Instruction,
) -> StepOutcome {
    let selector_reg = ins.operands[0].as_register().unwrap();
    let selector = txn.raw_value(selector_reg);
    switch_step(txn, ins, move |txn, table_index, p| {
        let RawValue::Str(s) = selector else { return None };
        let ch = s.chars().next()?;
        let frame = txn.current_frame();
        let code = txn.code_objects.get(frame.code_object)?;
        let table = code.jump_tables.character.get(table_index as usize)?;
        table
            .iter()
            .find(|(k, _)| *k == ch)
            .map(|(_, off)| (p as i32 + *off as i32) as u32)
    })
}

pub(super) fn step_switch_string<O: ObjectModel, H: HostCalls>(
    txn: &mut Transaction<O, H>,
    ins: &Instruction,
) -> StepOutcome {
    let selector_reg = ins.operands[0].as_register().unwrap();
    let selector = txn.raw_value(selector_reg);
    switch_step(txn, ins, move |txn, table_index, p| {
        let RawValue::Str(s) = selector else { return None };
        let frame = txn.current_frame();
        let code = txn.code_objects.get(frame.code_object)?;
        let table = code.jump_tables.string.get(table_index as usize)?;
        table
            .iter()
            .find(|(k, _)| *k == s)
            .map(|(_, off)| (p as i32 + *off as i32) as u32)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{CodeObjectId, CodeObjectTable, Operand};
    use crate::config::VmConfig;
    use crate::error::IfcError;
    use crate::host::{HeapObjectModel, NullHost};
    use crate::origin::OriginRegistry;
    use crate::value::LabeledValue;
    use crate::vm::FunctionInfo;
    use std::collections::HashMap;

    #[test]
    fn truthiness_matches_common_dynamic_language_rules() {
        assert!(!is_truthy(&RawValue::Undefined));
        assert!(!is_truthy(&RawValue::Number(0.0)));
        assert!(is_truthy(&RawValue::Number(1.0)));
        assert!(!is_truthy(&RawValue::Str(String::new())));
        assert!(is_truthy(&RawValue::Object(crate::value::ObjectId(0))));
    }

    fn run(table: &CodeObjectTable, entry: CodeObjectId, args: &[LabeledValue]) -> Result<LabeledValue, IfcError> {
        let functions: HashMap<crate::value::ObjectId, FunctionInfo> = HashMap::new();
        let mut objects = HeapObjectModel::new();
        let mut host = NullHost;
        let origins = OriginRegistry::new(VmConfig::default().origin_registry_capacity);
        let mut txn = Transaction::new(table, &functions, &mut objects, &mut host, &origins, VmConfig::default());
        txn.run(entry, args)
    }

    /// A value only reachable by branching on a confidential guard must
    /// leave the branch at or above the guard's confidentiality, even
    /// though the branch itself never reads or writes that value directly
    /// — the PC-stack join during the branch, not the guard register
    /// itself, is what carries the label into the written destination.
    #[test]
    fn implicit_flow_through_branch_taints_the_result_at_or_above_h() {
        let mut table = CodeObjectTable::default();
        let entry = table.insert(vec![
            Instruction { opcode: Opcode::JFalse, operands: vec![Operand::Register(0), Operand::JumpOffset(2)], line: 0 },
            Instruction { opcode: Opcode::Move, operands: vec![Operand::Register(1), Operand::Register(1), Operand::Register(1)], line: 0 },
            Instruction { opcode: Opcode::End, operands: vec![Operand::Register(1)], line: 0 },
        ]);
        let h = Label::confidential(5);
        let args = vec![LabeledValue::new(RawValue::Bool(true), h), LabeledValue::undefined()];
        let result = run(&table, entry, &args).expect("a taken guard is not itself a taint source");
        assert!(Label::leq(h, result.label()));
    }
}
