//! Family 4 — property writes: `put_by_id`/`put_by_val`/`put_by_index`.
//! Strict NSU on the existing slot; new properties absorb the write
//! context into the object's header and the caller's base-register label.

use crate::bytecode::{Instruction, Opcode, Operand};
use crate::error::IfcError;
use crate::host::{HostCalls, ObjectModel};
use crate::label::Label;
use crate::value::{LabeledValue, RawValue};
use crate::vm::{StepOutcome, Transaction};

fn resolve_ident<O: ObjectModel, H: HostCalls>(txn: &Transaction<O, H>, ins: &Instruction) -> u32 {
    match ins.opcode {
        Opcode::PutById => match ins.operands[1] {
            Operand::Identifier(id) => id,
            _ => 0,
        },
        Opcode::PutByIndex => match ins.operands[1] {
            Operand::Inline(i) => i,
            _ => 0,
        },
        Opcode::PutByVal => {
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
        other => unreachable!("{other:?} is not a family 4 opcode"),
    }
}

pub(super) fn step<O: ObjectModel, H: HostCalls>(
    txn: &mut Transaction<O, H>,
    ins: &Instruction,
) -> StepOutcome {
    let obj_reg = ins.operands[0]
        .as_register()
        .expect("family 4 base object is always a register");
    let value_reg = ins.operands[2]
        .as_register()
        .expect("family 4 value operand is always a register");

    let obj_value = txn.raw_value(obj_reg);
    let RawValue::Object(obj_id) = obj_value else {
        let l_obs = Label::join(txn.pc_label(), txn.current_frame().registers.label_of(obj_reg));
        let exc = LabeledValue::new(RawValue::Str("write to a property of a non-object value".into()), l_obs);
        return StepOutcome::Throw(exc);
    };

    let value = txn.current_frame().registers.get(value_reg);
    let ident = resolve_ident(txn, ins);

    let mut accumulated = txn.pc_label();
    let mut abort_flag = false;
    let mut structure_changed = false;
    txn.objects
        .put_ifc(obj_id, ident, value, &mut accumulated, &mut abort_flag, &mut structure_changed);

    if abort_flag {
        let location = txn.current_location();
        return StepOutcome::FatalAbort(IfcError::NsuViolation { location });
    }

    if structure_changed {
        let new_header = txn.objects.header_label(obj_id);
        let frame = txn.current_frame_mut();
        let old = frame.registers.label_of(obj_reg);
        frame.registers.set(
            obj_reg,
            LabeledValue::new(RawValue::Object(obj_id), Label::join(old, new_header)),
        );
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
    fn writing_an_existing_low_slot_under_a_high_pc_aborts() {
        let mut table = CodeObjectTable::default();
        let entry = table.insert(vec![
            ins(Opcode::JFalse, vec![Operand::Register(0), Operand::JumpOffset(2)]),
            ins(Opcode::PutById, vec![Operand::Register(1), Operand::Identifier(3), Operand::Register(2)]),
            ins(Opcode::End, vec![Operand::Register(1)]),
        ]);
        let mut objects = HeapObjectModel::new();
        let obj = objects.create_object(Label::bottom(), None);
        objects.set_own_slot(obj, 3, LabeledValue::new(RawValue::Number(0.0), Label::bottom()));

        let args = vec![
            LabeledValue::new(RawValue::Number(1.0), Label::confidential(0)),
            LabeledValue::new(RawValue::Object(obj), Label::bottom()),
            LabeledValue::new(RawValue::Number(9.0), Label::bottom()),
        ];
        let err = run(&table, entry, &mut objects, &args).expect_err("strict NSU must abort this write");
        assert!(matches!(err, IfcError::NsuViolation { .. }));
    }

    #[test]
    fn writing_a_fresh_property_succeeds_and_absorbs_into_the_base_register() {
        let mut table = CodeObjectTable::default();
        let entry = table.insert(vec![
            ins(Opcode::PutById, vec![Operand::Register(0), Operand::Identifier(3), Operand::Register(1)]),
            ins(Opcode::End, vec![Operand::Register(0)]),
        ]);
        let mut objects = HeapObjectModel::new();
        let obj = objects.create_object(Label::bottom(), None);

        let args = vec![
            LabeledValue::new(RawValue::Object(obj), Label::bottom()),
            LabeledValue::new(RawValue::Number(9.0), Label::confidential(1)),
        ];
        let result = run(&table, entry, &mut objects, &args).expect("a fresh slot never hits NSU");
        assert!(Label::leq(Label::confidential(1), result.label()));
        assert!(Label::leq(Label::confidential(1), objects.header_label(obj)));
    }

    #[test]
    fn resolve_ident_reads_the_identifier_operand_for_put_by_id() {
        let ins = ins(Opcode::PutById, vec![Operand::Register(0), Operand::Identifier(42), Operand::Register(1)]);
        let mut table = CodeObjectTable::default();
        let entry = table.insert(vec![ins.clone(), ins.clone()]);
        let mut objects = HeapObjectModel::new();
        let functions: HashMap<crate::value::ObjectId, FunctionInfo> = HashMap::new();
        let mut host = NullHost;
        let origins = OriginRegistry::new(VmConfig::default().origin_registry_capacity);
        let txn = Transaction::new(&table, &functions, &mut objects, &mut host, &origins, VmConfig::default());
        let _ = entry;
        assert_eq!(resolve_ident(&txn, &ins), 42);
    }
}
