//! Orchestrator for a single dispatcher step: reads the current
//! instruction, computes the observable label, and delegates to the
//! matching family handler.
//!
//! A thin per-step orchestrator plus one handler module per opcode family,
//! each generic over the state type (`Transaction<O, H>`).

mod family1_pure;
mod family10_activation;
mod family11_end;
mod family2_branch;
mod family3_property_read;
mod family4_property_write;
mod family5_delete;
mod family6_call;
mod family7_return;
mod family8_throw_catch;
mod family9_scope;

use super::{StepOutcome, Transaction};
use crate::bytecode::{Instruction, OpcodeClass};
use crate::host::{HostCalls, ObjectModel};
use crate::label::Label;

/// Join of `pc` and every register operand's label, per the dispatcher
/// contract step 3 ("the observable label").
pub(super) fn observable_label<O: ObjectModel, H: HostCalls>(
    txn: &Transaction<O, H>,
    ins: &Instruction,
    register_operands: &[u32],
) -> Label {
    let mut l = txn.pc_label();
    for &r in register_operands {
        l.join_with(txn.current_frame().registers.label_of(r));
    }
    l
}

/// Execute exactly one instruction of the current frame's code object at
/// its current pc, applying the family rule matching its opcode class.
pub(super) fn step<O: ObjectModel, H: HostCalls>(txn: &mut Transaction<O, H>) -> StepOutcome {
    let frame = txn.current_frame();
    let code = txn
        .code_objects
        .get(frame.code_object)
        .expect("current frame references a live code object");
    let p = frame.pc;
    let ins = code
        .instruction_at(p)
        .expect("pc is always within bounds for well-formed bytecode")
        .clone();

    use OpcodeClass::*;
    match ins.opcode.class() {
        Pure => family1_pure::step(txn, &ins),
        Conditional => family2_branch::step(txn, &ins),
        Unconditional => family2_branch::step_unconditional(txn, &ins),
        SwitchImmediate => family2_branch::step_switch_immediate(txn, &ins),
        SwitchChar => family2_branch::step_switch_char(txn, &ins),
        SwitchString => family2_branch::step_switch_string(txn, &ins),
        PropertyRead => family3_property_read::step(txn, &ins),
        PropertyWrite => family4_property_write::step(txn, &ins),
        Delete => family5_delete::step(txn, &ins),
        Call => family6_call::step(txn, &ins),
        Return | ReturnObjectOrThis => family7_return::step(txn, &ins),
        Throw => family8_throw_catch::step_throw(txn, &ins),
        Catch => family8_throw_catch::step_catch(txn, &ins),
        ScopeOp => family9_scope::step(txn, &ins),
        Activation => family10_activation::step(txn, &ins),
        End => family11_end::step(txn, &ins),
    }
}
