//! Family 3 — property reads: `get_by_id`/`get_by_val`/`get_pname`/
//! `get_arguments_length`/`resolve*`.
//!
//! All five forms share the same accumulator-and-promote shape described
//! for property lookup; they differ only in how the property identifier is
//! derived from their operands, handled by `resolve_ident` below.

use super::family1_pure;
use crate::bytecode::{Instruction, Opcode, Operand};
use crate::host::{HostCalls, ObjectModel};
use crate::label::Label;
use crate::value::{LabeledValue, RawValue};
use crate::vm::{StepOutcome, Transaction};

/// Sentinel identifier for `get_arguments_length`'s pseudo-property — there
/// is no real slot to look up, so the read degenerates to the object's own
/// header label plus whatever the host already attached to the arguments
/// count.
const ARGUMENTS_LENGTH_IDENT: u32 = u32::MAX;

fn resolve_ident<O: ObjectModel, H: HostCalls>(txn: &Transaction<O, H>, ins: &Instruction) -> u32 {
    match ins.opcode {
        Opcode::GetById | Opcode::Resolve => match ins.operands[2] {
            Operand::Identifier(id) => id,
            _ => 0,
        },
        Opcode::GetPname => match ins.operands[2] {
            Operand::Inline(i) => i,
            _ => 0,
        },
        Opcode::GetArgumentsLength => ARGUMENTS_LENGTH_IDENT,
        Opcode::GetByVal => {
            let key_reg = ins.operands[2].as_register().unwrap_or(0);
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
        other => unreachable!("{other:?} is not a family 3 opcode"),
    }
}

pub(super) fn step<O: ObjectModel, H: HostCalls>(
    txn: &mut Transaction<O, H>,
    ins: &Instruction,
) -> StepOutcome {
    let dst = ins.operands[0]
        .as_register()
        .expect("family 3 destination is always a register");
    let obj_reg = ins.operands[1]
        .as_register()
        .expect("family 3 base object is always a register");
    let obj_value = txn.raw_value(obj_reg);
    let obj_label = txn.current_frame().registers.label_of(obj_reg);

    let RawValue::Object(obj_id) = obj_value else {
        let l_obs = Label::join(txn.pc_label(), obj_label);
        let exc = LabeledValue::new(RawValue::Str("property access on a non-object value".into()), l_obs);
        return StepOutcome::Throw(exc);
    };

    let ident = resolve_ident(txn, ins);
    let pc_at_entry = txn.pc_label();
    let mut accumulated = pc_at_entry;
    let found = txn.objects.get_property_ifc(obj_id, ident, &mut accumulated);
    let value = found.map(|v| v.value).unwrap_or(RawValue::Undefined);

    // If the accumulated label ever differs from the current pc at entry,
    // this frame's registers need the per-frame back-fill — independent of
    // whether some other frame already flipped the transaction-global flag.
    if accumulated != pc_at_entry {
        txn.require_labeling();
    }

    family1_pure::apply_write(txn, dst, value, accumulated);
    StepOutcome::Continue
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::CodeObjectTable;
    use crate::config::VmConfig;
    use crate::error::IfcError;
    use crate::host::HeapObjectModel;
    use crate::origin::OriginRegistry;
    use crate::vm::FunctionInfo;
    use std::collections::HashMap;

    #[test]
    fn arguments_length_sentinel_is_distinct_from_any_real_identifier() {
        assert_eq!(ARGUMENTS_LENGTH_IDENT, u32::MAX);
    }

    /// Reading a property that only exists on the prototype must join every
    /// hop walked on the way there — both objects' header labels, the
    /// prototype link's own label, and the slot's label — into the
    /// destination register, exercised through the full dispatcher rather
    /// than `ObjectModel::get_property_ifc` directly.
    #[test]
    fn property_read_up_the_prototype_chain_joins_every_hop() {
        let mut objects = HeapObjectModel::new();
        let proto = objects.create_object(Label::confidential(0), None);
        objects.set_own_slot(proto, 7, LabeledValue::new(RawValue::Number(1.0), Label::confidential(1)));
        let child = objects.create_object(Label::confidential(2), Some(proto));
        objects.set_proto_label(child, Label::confidential(3));

        let mut table = CodeObjectTable::default();
        let entry = table.insert(vec![
            Instruction {
                opcode: Opcode::GetById,
                operands: vec![crate::bytecode::Operand::Register(1), crate::bytecode::Operand::Register(0), crate::bytecode::Operand::Identifier(7)],
                line: 0,
            },
            Instruction { opcode: Opcode::End, operands: vec![crate::bytecode::Operand::Register(1)], line: 0 },
        ]);
        let args = vec![LabeledValue::new(RawValue::Object(child), Label::bottom())];

        let functions: HashMap<crate::value::ObjectId, FunctionInfo> = HashMap::new();
        let mut host = crate::host::NullHost;
        let origins = OriginRegistry::new(VmConfig::default().origin_registry_capacity);
        let mut txn = Transaction::new(&table, &functions, &mut objects, &mut host, &origins, VmConfig::default());
        let result: Result<LabeledValue, IfcError> = txn.run(entry, &args);

        let result = result.expect("reading an existing property never aborts");
        for bit in 0..4 {
            assert!(Label::leq(Label::confidential(bit), result.label()));
        }
    }
}
