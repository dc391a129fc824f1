//! Family 8 — `throw`/`throw_reference_error`/`catch`. Unwinding itself
//! (innermost-handler search, PC-stack push/join, surfacing
//! `IfcError::Throwable` to the host once no frame in the call stack
//! catches it) lives in `Transaction::unwind_to_handler`/`step_once` since
//! it has to walk call frames the dispatch layer can't see; this module
//! only picks the thrown value and writes the caught one back.

use super::family1_pure;
use crate::bytecode::{Instruction, Opcode};
use crate::host::{HostCalls, ObjectModel};
use crate::label::Label;
use crate::value::{LabeledValue, RawValue};
use crate::vm::{StepOutcome, Transaction};

pub(super) fn step_throw<O: ObjectModel, H: HostCalls>(
    txn: &mut Transaction<O, H>,
    ins: &Instruction,
) -> StepOutcome {
    let value = match ins.opcode {
        Opcode::Throw => {
            let reg = ins.operands[0].as_register().expect("throw reads its value from a register");
            txn.current_frame().registers.get(reg)
        }
        Opcode::ThrowReferenceError => {
            let l_obs = txn.pc_label();
            LabeledValue::new(RawValue::Str("reference to an unresolved binding".into()), l_obs)
        }
        other => unreachable!("{other:?} is not a throw opcode"),
    };
    StepOutcome::Throw(value)
}

pub(super) fn step_catch<O: ObjectModel, H: HostCalls>(
    txn: &mut Transaction<O, H>,
    ins: &Instruction,
) -> StepOutcome {
    let dst = ins.operands[0].as_register().expect("catch destination is always a register");
    let caught = txn.take_pending_exception().unwrap_or_else(LabeledValue::undefined);
    let l_obs = Label::join(txn.pc_label(), caught.label());
    family1_pure::apply_write(txn, dst, caught.value, l_obs);
    StepOutcome::Continue
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{CodeObjectTable, ExceptionHandler, Operand};
    use crate::config::VmConfig;
    use crate::error::IfcError;
    use crate::origin::OriginRegistry;
    use crate::vm::FunctionInfo;
    use std::collections::HashMap;

    /// A value thrown under a confidential label must still carry that
    /// label once caught, even though the `catch` destination register
    /// never observed the throw site directly — the unwind path joins the
    /// thrown label into the PC stack on its way to the handler.
    #[test]
    fn exception_carried_flow_joins_the_thrown_labels_pc_into_the_catch_result() {
        let mut table = CodeObjectTable::default();
        let entry = table.insert(vec![
            Instruction { opcode: Opcode::JFalse, operands: vec![Operand::Register(0), Operand::JumpOffset(2)], line: 0 },
            Instruction { opcode: Opcode::Throw, operands: vec![Operand::Register(1)], line: 0 },
            Instruction { opcode: Opcode::Catch, operands: vec![Operand::Register(2)], line: 0 },
            Instruction { opcode: Opcode::End, operands: vec![Operand::Register(2)], line: 0 },
        ]);
        table.get_mut(entry).unwrap().exception_handlers =
            vec![ExceptionHandler { start: 1, end: 2, target: 2 }];

        let h = Label::confidential(6);
        let args = vec![
            LabeledValue::new(RawValue::Bool(true), Label::bottom()),
            LabeledValue::new(RawValue::Str("boom".into()), h),
        ];

        let functions: HashMap<crate::value::ObjectId, FunctionInfo> = HashMap::new();
        let mut objects = crate::host::HeapObjectModel::new();
        let mut host = crate::host::NullHost;
        let origins = OriginRegistry::new(VmConfig::default().origin_registry_capacity);
        let mut txn = Transaction::new(&table, &functions, &mut objects, &mut host, &origins, VmConfig::default());
        let result: Result<LabeledValue, IfcError> = txn.run(entry, &args);

        let result = result.expect("the handler covers the throw site, so this never escapes");
        assert!(Label::leq(h, result.label()));
    }
}
