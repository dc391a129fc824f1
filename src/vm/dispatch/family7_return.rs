//! Family 7 — `ret`/`ret_object_or_this`. The post-call PC join and the
//! write into the caller's destination register both happen centrally in
//! `Transaction::finish_frame`; this family only has to pick the value.

use crate::bytecode::{Instruction, Opcode};
use crate::host::{HostCalls, ObjectModel};
use crate::value::RawValue;
use crate::vm::{StepOutcome, Transaction};

/// Register conventionally bound to the constructor's `this` (register 0),
/// consulted by `ret_object_or_this` when the function's own return value
/// isn't an object. `ret_object_or_this` carries only one operand (the
/// computed value), so there is no separate slot naming `this` explicitly.
const THIS_REGISTER: u32 = 0;

pub(super) fn step<O: ObjectModel, H: HostCalls>(
    txn: &mut Transaction<O, H>,
    ins: &Instruction,
) -> StepOutcome {
    let value_reg = ins.operands[0].as_register().expect("family 7 value is always a register");
    let value = txn.current_frame().registers.get(value_reg);

    match ins.opcode {
        Opcode::Ret => StepOutcome::Return(value),
        Opcode::RetObjectOrThis => {
            if matches!(value.value, RawValue::Object(_)) {
                StepOutcome::Return(value)
            } else {
                StepOutcome::Return(txn.current_frame().registers.get(THIS_REGISTER))
            }
        }
        other => unreachable!("{other:?} is not a family 7 opcode"),
    }
}

#[cfg(test)]
mod tests {
    use crate::label::Label;
    use crate::value::{LabeledValue, ObjectId, RawValue};

    #[test]
    fn ret_object_or_this_fallback_condition_matches_object_values_only() {
        let obj = LabeledValue::new(RawValue::Object(ObjectId(3)), Label::bottom());
        let num = LabeledValue::new(RawValue::Number(1.0), Label::bottom());
        assert!(matches!(obj.value, RawValue::Object(_)));
        assert!(!matches!(num.value, RawValue::Object(_)));
    }
}
