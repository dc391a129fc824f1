//! Family 6 — `call`/`construct`/`call_host`.
//!
//! JS calls resolve the callee object to a compiled function (via
//! `Transaction::functions`), derive its origin label from the origin
//! registry joined with the object's header label, and hand off frame
//! construction to `Transaction::enter_call` through `StepOutcome::Call`.
//! Host calls never push a frame — they run to completion inline and join
//! the returned label straight into the destination register.
//!
//! Operand layout (a simplification of the compiler's real calling
//! convention, which is out of scope): `[dst, callee, argc]` for `Call`/
//! `Construct`, with arguments occupying the contiguous registers
//! `dst+1 ..= dst+argc`; `[dst, host_ident, argc]` for `CallHost`.

use super::family1_pure;
use crate::bytecode::{Instruction, Opcode};
use crate::host::{HostCallContext, HostCalls, ObjectModel};
use crate::label::Label;
use crate::value::{LabeledValue, RawValue};
use crate::vm::{StepOutcome, Transaction};

fn gather_args<O: ObjectModel, H: HostCalls>(txn: &Transaction<O, H>, dst: u32, argc: u32) -> Vec<LabeledValue> {
    (0..argc).map(|i| txn.current_frame().registers.get(dst + 1 + i)).collect()
}

pub(super) fn step<O: ObjectModel, H: HostCalls>(
    txn: &mut Transaction<O, H>,
    ins: &Instruction,
) -> StepOutcome {
    match ins.opcode {
        Opcode::Call | Opcode::Construct => step_js_call(txn, ins),
        Opcode::CallHost => step_host_call(txn, ins),
        other => unreachable!("{other:?} is not a family 6 opcode"),
    }
}

fn step_js_call<O: ObjectModel, H: HostCalls>(txn: &mut Transaction<O, H>, ins: &Instruction) -> StepOutcome {
    let dst = ins.operands[0].as_register().expect("family 6 destination is always a register");
    let callee_reg = ins.operands[1].as_register().expect("family 6 callee is always a register");
    let argc = ins.operands[2].as_inline().unwrap_or(0);

    let callee_label = txn.current_frame().registers.label_of(callee_reg);
    let callee_value = txn.raw_value(callee_reg);

    let RawValue::Object(callee_id) = callee_value else {
        let l_obs = Label::join(txn.pc_label(), callee_label);
        let exc = LabeledValue::new(RawValue::Str("call target is not callable".into()), l_obs);
        return StepOutcome::Throw(exc);
    };

    let Some(func) = txn.functions.get(&callee_id).cloned() else {
        let l_obs = Label::join(txn.pc_label(), callee_label);
        let exc = LabeledValue::new(RawValue::Str("call target has no compiled body".into()), l_obs);
        return StepOutcome::Throw(exc);
    };

    let origin = txn.origins.label_for(&func.source_url);
    let header = txn.objects.header_label(callee_id);
    let l_f = Label::join(origin, header);
    let context_label = Label::join(l_f, callee_label);

    let args = gather_args(txn, dst, argc);
    StepOutcome::Call {
        callee: func.code_object,
        context_label,
        args,
        return_register: dst,
    }
}

fn step_host_call<O: ObjectModel, H: HostCalls>(txn: &mut Transaction<O, H>, ins: &Instruction) -> StepOutcome {
    let dst = ins.operands[0].as_register().expect("family 6 destination is always a register");
    let host_ident = ins.operands[1].as_inline().expect("host calls name their target inline");
    let argc = ins.operands[2].as_inline().unwrap_or(0);

    let arg_labels: Vec<Label> = (0..argc)
        .map(|i| txn.current_frame().registers.label_of(dst + 1 + i))
        .collect();
    let pc_global = txn.pc_label();
    let max_args = txn.config.max_host_call_args;
    let mut ctx = HostCallContext::new(pc_global, &arg_labels, max_args);

    let raw = txn.host.call(host_ident, &mut ctx);
    if ctx.abort {
        txn.abort = true;
    }

    let l_obs = Label::join(pc_global, ctx.return_label);
    family1_pure::apply_write(txn, dst, raw, l_obs);
    StepOutcome::Continue
}

