//! Family 5 — delete: `del_by_id`/`del_by_val`. Strict NSU on the object
//! header, same shape as Family 4's slot check.

use crate::bytecode::{Instruction, Opcode, Operand};
use crate::error::IfcError;
use crate::host::{HostCalls, ObjectModel};
use crate::label::Label;
use crate::value::{LabeledValue, RawValue};
use crate::vm::{StepOutcome, Transaction};

fn resolve_ident<O: ObjectModel, H: HostCalls>(txn: &Transaction<O, H>, ins: &Instruction) -> u32 {
    match ins.opcode {
        Opcode::DelById => match ins.operands[1] {
            Operand::Identifier(id) => id,
            _ => 0,
        },
        Opcode::DelByVal => {
            let key_reg = ins.operands[1].as_register().unwrap_or(0);
            match txn.raw_value(key_reg) {
                RawValue::Number(n) => n as u32,
                RawValue::Str(s) => {
                    let frame = txn.current_frame();
                    txn.code_objects
                        .get(frame.code_object)
                        .and_then(|c| c.identifiers.iter().position(|i| *i == s))
                        .map(|p| p as u32)
                        .unwrap_or(u32::MAX)
                }
                _ => 0,
            }
        }
        other => unreachable!("{other:?} is not a family 5 opcode"),
    }
}

pub(super) fn step<O: ObjectModel, H: HostCalls>(
    txn: &mut Transaction<O, H>,
    ins: &Instruction,
) -> StepOutcome {
    let obj_reg = ins.operands[0]
        .as_register()
        .expect("family 5 base object is always a register");
    let obj_value = txn.raw_value(obj_reg);
    let RawValue::Object(obj_id) = obj_value else {
        let l_obs = Label::join(txn.pc_label(), txn.current_frame().registers.label_of(obj_reg));
        let exc = LabeledValue::new(RawValue::Str("delete on a non-object value".into()), l_obs);
        return StepOutcome::Throw(exc);
    };

    let ident = resolve_ident(txn, ins);
    let mut accumulated = txn.pc_label();
    let mut abort_flag = false;
    txn.objects.delete_ifc(obj_id, ident, &mut accumulated, &mut abort_flag);

    if abort_flag {
        let location = txn.current_location();
        return StepOutcome::FatalAbort(IfcError::NsuViolation { location });
    }
    StepOutcome::Continue
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::CodeObjectTable;
    use crate::config::VmConfig;
    use crate::host::{HeapObjectModel, NullHost};
    use crate::origin::OriginRegistry;
    use crate::vm::FunctionInfo;
    use std::collections::HashMap;

    fn ins(opcode: Opcode, operands: Vec<Operand>) -> Instruction {
        Instruction { opcode, operands, line: 0 }
    }

    fn run(
        table: &CodeObjectTable,
        entry: crate::bytecode::CodeObjectId,
        objects: &mut HeapObjectModel,
        args: &[LabeledValue],
    ) -> Result<LabeledValue, IfcError> {
        let functions: HashMap<crate::value::ObjectId, FunctionInfo> = HashMap::new();
        let mut host = NullHost;
        let origins = OriginRegistry::new(VmConfig::default().origin_registry_capacity);
        let mut txn = Transaction::new(table, &functions, objects, &mut host, &origins, VmConfig::default());
        txn.run(entry, args)
    }

    #[test]
    fn deleting_an_existing_low_slot_under_a_high_pc_aborts() {
        let mut table = CodeObjectTable::default();
        let entry = table.insert(vec![
            ins(Opcode::JFalse, vec![Operand::Register(0), Operand::JumpOffset(2)]),
            ins(Opcode::DelById, vec![Operand::Register(1), Operand::Identifier(3)]),
            ins(Opcode::End, vec![Operand::Register(1)]),
        ]);
        let mut objects = HeapObjectModel::new();
        let obj = objects.create_object(Label::bottom(), None);
        objects.set_own_slot(obj, 3, LabeledValue::new(RawValue::Number(0.0), Label::bottom()));

        let args = vec![
            LabeledValue::new(RawValue::Number(1.0), Label::confidential(0)),
            LabeledValue::new(RawValue::Object(obj), Label::bottom()),
        ];
        let err = run(&table, entry, &mut objects, &args).expect_err("strict NSU must abort this delete");
        assert!(matches!(err, IfcError::NsuViolation { .. }));
    }

    #[test]
    fn deleting_a_slot_that_is_already_absent_is_a_no_op_not_an_abort() {
        let mut table = CodeObjectTable::default();
        let entry = table.insert(vec![
            ins(Opcode::DelById, vec![Operand::Register(0), Operand::Identifier(3)]),
            ins(Opcode::End, vec![Operand::Register(0)]),
        ]);
        let mut objects = HeapObjectModel::new();
        let obj = objects.create_object(Label::bottom(), None);
        let args = vec![LabeledValue::new(RawValue::Object(obj), Label::bottom())];
        run(&table, entry, &mut objects, &args).expect("nothing to delete, nothing to abort on");
    }
}
