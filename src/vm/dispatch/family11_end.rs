//! Family 11 — `end`: the code object's implicit final return, reached by
//! falling off the bottom of a function body with no explicit `ret`.

use crate::bytecode::Instruction;
use crate::host::{HostCalls, ObjectModel};
use crate::vm::{StepOutcome, Transaction};

pub(super) fn step<O: ObjectModel, H: HostCalls>(
    txn: &mut Transaction<O, H>,
    ins: &Instruction,
) -> StepOutcome {
    let reg = ins.operands[0].as_register().expect("end reads its result from a register");
    let value = txn.current_frame().registers.get(reg);
    StepOutcome::Return(value)
}
