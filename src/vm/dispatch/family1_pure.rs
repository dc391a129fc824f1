//! Family 1 — pure register-to-register: arithmetic, comparison, type
//! predicates, move, negate, string concat, the property-name-array
//! iteration step, `typeof`/`is_object`.

use super::observable_label;
use crate::bytecode::{Instruction, Opcode, Operand};
use crate::host::{HostCalls, ObjectModel};
use crate::label::Label;
use crate::value::{LabeledValue, RawValue};
use crate::vm::{StepOutcome, Transaction};

pub(super) fn step<O: ObjectModel, H: HostCalls>(
    txn: &mut Transaction<O, H>,
    ins: &Instruction,
) -> StepOutcome {
    let dst = ins.operands[0]
        .as_register()
        .expect("family 1 destination is always a register");
    let reg_operands: Vec<u32> = ins.operands[1..].iter().filter_map(|o| o.as_register()).collect();
    let l_obs = observable_label(txn, ins, &reg_operands);

    match compute(txn, ins) {
        Ok(value) => {
            apply_write(txn, dst, value, l_obs);
            StepOutcome::Continue
        }
        Err(message) => {
            let exc = LabeledValue::new(RawValue::Str(message), l_obs);
            StepOutcome::Throw(exc)
        }
    }
}

/// Strict Family 1 write policy, also used by Families 3 and 8 (property
/// reads and `catch`, both documented as "Family 1 rules" on their
/// destination register).
pub(super) fn apply_write<O: ObjectModel, H: HostCalls>(
    txn: &mut Transaction<O, H>,
    dst: u32,
    value: RawValue,
    l_obs: Label,
) {
    if l_obs != Label::bottom() {
        txn.require_labeling();
    }
    let frame = txn.current_frame_mut();
    let old = frame.registers.label_of(dst);
    // Permissive upgrade (delayed NSU): if the destination's existing label
    // already dominates what this write observes, nothing rises and the
    // label is unchanged. Otherwise the write raises the destination past
    // what it was previously known to carry — permitted, but stickily
    // tainted so a later low-context write to the same register is caught
    // by the families that check strictly instead.
    let new_label = if Label::leq(l_obs, old) {
        old
    } else {
        Label::join(l_obs, old).with_taint()
    };
    frame.registers.set(dst, LabeledValue::new(value, new_label));
}

fn read<O: ObjectModel, H: HostCalls>(txn: &Transaction<O, H>, op: &Operand) -> RawValue {
    match *op {
        Operand::Register(r) => txn.current_frame().registers.get(r).value,
        // Constant-pool resolution belongs to the code loader; this
        // dispatcher only needs the label (bottom()) of a constant, which
        // `observable_label` already handles by skipping non-register
        // operands.
        _ => RawValue::Undefined,
    }
}

fn compute<O: ObjectModel, H: HostCalls>(txn: &Transaction<O, H>, ins: &Instruction) -> Result<RawValue, String> {
    match ins.opcode {
        Opcode::Add => numeric_binop(&read(txn, &ins.operands[1]), &read(txn, &ins.operands[2]), |a, b| a + b),
        Opcode::Sub => numeric_binop(&read(txn, &ins.operands[1]), &read(txn, &ins.operands[2]), |a, b| a - b),
        Opcode::Mul => numeric_binop(&read(txn, &ins.operands[1]), &read(txn, &ins.operands[2]), |a, b| a * b),
        Opcode::Eq => Ok(RawValue::Bool(read(txn, &ins.operands[1]) == read(txn, &ins.operands[2]))),
        Opcode::Lt => Ok(match (read(txn, &ins.operands[1]), read(txn, &ins.operands[2])) {
            (RawValue::Number(a), RawValue::Number(b)) => RawValue::Bool(a < b),
            _ => RawValue::Bool(false),
        }),
        Opcode::Move => Ok(read(txn, &ins.operands[1])),
        Opcode::Negate => Ok(match read(txn, &ins.operands[1]) {
            RawValue::Number(n) => RawValue::Number(-n),
            other => other,
        }),
        Opcode::Concat => {
            let a = display(&read(txn, &ins.operands[1]));
            let b = display(&read(txn, &ins.operands[2]));
            Ok(RawValue::Str(format!("{a}{b}")))
        }
        Opcode::Typeof => Ok(RawValue::Str(type_name(&read(txn, &ins.operands[1])).to_string())),
        Opcode::IsObject => Ok(RawValue::Bool(matches!(read(txn, &ins.operands[1]), RawValue::Object(_)))),
        Opcode::GetPnameNext => Ok(read(txn, &ins.operands[1])),
        other => unreachable!("{other:?} is not a family 1 opcode"),
    }
}

fn numeric_binop(a: &RawValue, b: &RawValue, f: impl Fn(f64, f64) -> f64) -> Result<RawValue, String> {
    match (a, b) {
        (RawValue::Number(x), RawValue::Number(y)) => Ok(RawValue::Number(f(*x, *y))),
        _ => Err("arithmetic on a non-number operand".to_string()),
    }
}

fn display(v: &RawValue) -> String {
    match v {
        RawValue::Undefined => "undefined".to_string(),
        RawValue::Bool(b) => b.to_string(),
        RawValue::Number(n) => n.to_string(),
        RawValue::Str(s) => s.clone(),
        RawValue::Object(_) => "[object]".to_string(),
    }
}

fn type_name(v: &RawValue) -> &'static str {
    match v {
        RawValue::Undefined => "undefined",
        RawValue::Bool(_) => "boolean",
        RawValue::Number(_) => "number",
        RawValue::Str(_) => "string",
        RawValue::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_policy_keeps_dest_unchanged_when_it_already_dominates_the_write() {
        let old = Label::confidential(3);
        let l_obs = Label::bottom();
        assert!(Label::leq(l_obs, old));
        // apply_write's no-taint branch: old already covers l_obs, so the
        // destination's label is left exactly as it was.
    }

    #[test]
    fn write_policy_taints_on_a_genuine_upgrade() {
        let old = Label::bottom();
        let l_obs = Label::confidential(2);
        assert!(!Label::leq(l_obs, old));
        let new_label = Label::join(l_obs, old).with_taint();
        assert!(new_label.taint());
        assert!(Label::leq(old, new_label));
        assert!(Label::leq(l_obs, new_label));
    }

    #[test]
    fn numeric_add_rejects_non_number_operands() {
        let a = RawValue::Str("x".into());
        let b = RawValue::Number(1.0);
        assert!(numeric_binop(&a, &b, |x, y| x + y).is_err());
    }

    #[test]
    fn concat_and_typeof_produce_expected_strings() {
        assert_eq!(display(&RawValue::Number(1.5)), "1.5");
        assert_eq!(type_name(&RawValue::Bool(true)), "boolean");
    }

    fn run(
        table: &crate::bytecode::CodeObjectTable,
        entry: crate::bytecode::CodeObjectId,
        args: &[LabeledValue],
    ) -> Result<LabeledValue, crate::error::IfcError> {
        use crate::config::VmConfig;
        use crate::host::{HeapObjectModel, NullHost};
        use crate::origin::OriginRegistry;
        use std::collections::HashMap;

        let functions: HashMap<crate::value::ObjectId, crate::vm::FunctionInfo> = HashMap::new();
        let mut objects = HeapObjectModel::new();
        let mut host = NullHost;
        let origins = OriginRegistry::new(VmConfig::default().origin_registry_capacity);
        let mut txn = Transaction::new(table, &functions, &mut objects, &mut host, &origins, VmConfig::default());
        txn.run(entry, args)
    }

    #[test]
    fn explicit_flow_produces_exactly_h_with_no_abort() {
        let mut table = crate::bytecode::CodeObjectTable::default();
        let entry = table.insert(vec![
            Instruction { opcode: Opcode::Add, operands: vec![Operand::Register(2), Operand::Register(0), Operand::Register(1)], line: 0 },
            Instruction { opcode: Opcode::End, operands: vec![Operand::Register(2)], line: 0 },
        ]);
        let h = Label::confidential(9);
        let args = vec![
            LabeledValue::new(RawValue::Number(2.0), h),
            LabeledValue::new(RawValue::Number(3.0), Label::bottom()),
        ];
        let result = run(&table, entry, &args).expect("arithmetic on two numbers never aborts");
        assert_eq!(result.label().confidentiality(), h.confidentiality());
        assert_eq!(result.label().integrity(), h.integrity());
    }

    #[test]
    fn taint_relaxation_permits_the_upgrade_but_sets_the_taint_bit() {
        let mut table = crate::bytecode::CodeObjectTable::default();
        let entry = table.insert(vec![
            Instruction { opcode: Opcode::Move, operands: vec![Operand::Register(1), Operand::Register(0), Operand::Register(0)], line: 0 },
            Instruction { opcode: Opcode::End, operands: vec![Operand::Register(1)], line: 0 },
        ]);
        let h = Label::confidential(4);
        let args = vec![LabeledValue::new(RawValue::Number(1.0), h)];
        let result = run(&table, entry, &args).expect("a fresh register has nothing to violate NSU against");
        assert_eq!(result.label().confidentiality(), h.confidentiality());
        assert!(result.label().taint());
    }
}
