//! Family 9 — scope-chain manipulation: `push_scope`/`pop_scope`/
//! `jmp_scopes`/`push_new_scope`. Every opcode in this family carries
//! exactly one register operand (see `Opcode::length`); the chain itself is
//! tracked as part of the active `Frame` (`scope_chain`/`scope_chain_label`)
//! rather than addressed through a register, since there is nowhere else to
//! keep an identity that must survive across the whole function body.
//!
//! Strict NSU here means "a tainted link cannot be unwound unless the
//! current pc already dominates it" — `structural_abort` returns `true`
//! exactly in that case, mirroring `put_ifc`/`delete_ifc`'s taint-vs-context
//! comparison without a value payload to carry it. The check only guards
//! `pop_scope`/`jmp_scopes`, which discard an existing link; `push_scope`/
//! `push_new_scope` build a brand-new link onto the chain and have nothing
//! existing to protect, so they are never gated by it.

use crate::bytecode::{Instruction, Opcode};
use crate::error::IfcError;
use crate::host::{HostCalls, ObjectModel};
use crate::label::Label;
use crate::value::{LabeledValue, RawValue};
use crate::vm::{StepOutcome, Transaction};

fn structural_abort(existing: Label, ctx: Label) -> bool {
    existing.taint() && !Label::leq(existing, ctx)
}

pub(super) fn step<O: ObjectModel, H: HostCalls>(
    txn: &mut Transaction<O, H>,
    ins: &Instruction,
) -> StepOutcome {
    match ins.opcode {
        Opcode::PushScope => push_scope(txn, ins),
        Opcode::PopScope => pop_scope(txn, ins),
        Opcode::PushNewScope => push_new_scope(txn, ins),
        Opcode::JmpScopes => jmp_scopes(txn, ins),
        other => unreachable!("{other:?} is not a family 9 opcode"),
    }
}

/// Link a new scope onto the frame's chain, built from `outer` and labeled
/// `ctx`. Shared by `push_scope` (the link wraps an existing value) and
/// `push_new_scope` (the link wraps a freshly created empty object).
fn link_scope<O: ObjectModel, H: HostCalls>(txn: &mut Transaction<O, H>, ctx: Label) {
    let outer = txn.current_frame().scope_chain;
    let link = txn.objects.create_object(ctx, outer);
    let frame = txn.current_frame_mut();
    frame.scope_chain = Some(link);
    frame.scope_chain_label = ctx;
}

fn push_scope<O: ObjectModel, H: HostCalls>(txn: &mut Transaction<O, H>, ins: &Instruction) -> StepOutcome {
    let value_reg = ins.operands[0].as_register().expect("push_scope value is always a register");
    let scope_value = txn.current_frame().registers.get(value_reg);
    let ctx = Label::join(txn.pc_label(), scope_value.label());

    link_scope(txn, ctx);
    StepOutcome::Continue
}

fn push_new_scope<O: ObjectModel, H: HostCalls>(txn: &mut Transaction<O, H>, ins: &Instruction) -> StepOutcome {
    let dst = ins.operands[0].as_register().expect("push_new_scope handle is always a register");
    let ctx = txn.pc_label();

    link_scope(txn, ctx);
    let link = txn.current_frame().scope_chain.expect("link_scope just set it");
    txn.current_frame_mut()
        .registers
        .set(dst, LabeledValue::new(RawValue::Object(link), ctx));
    StepOutcome::Continue
}

/// Pop the innermost scope link, writing the chain's new head (or
/// `undefined` if the chain is now empty) into `dst`.
fn pop_scope<O: ObjectModel, H: HostCalls>(txn: &mut Transaction<O, H>, ins: &Instruction) -> StepOutcome {
    let dst = ins.operands[0].as_register().expect("pop_scope destination is always a register");
    let existing = txn.current_frame().scope_chain_label;
    let pc = txn.pc_label();

    if structural_abort(existing, pc) {
        let location = txn.current_location();
        return StepOutcome::FatalAbort(IfcError::NsuViolation { location });
    }

    let (proto, proto_label) = match txn.current_frame().scope_chain {
        Some(id) => (txn.objects.proto_of(id), txn.objects.proto_label(id)),
        None => (None, Label::bottom()),
    };
    let new_label = Label::join(pc, proto_label);
    let frame = txn.current_frame_mut();
    frame.scope_chain = proto;
    frame.scope_chain_label = new_label;
    let new_value = proto.map(RawValue::Object).unwrap_or(RawValue::Undefined);
    frame.registers.set(dst, LabeledValue::new(new_value, new_label));
    StepOutcome::Continue
}

/// Pop the innermost scope link (ignoring whatever it resolves to) and
/// jump, used at block/loop exit points that also close a scope. Unlike
/// `pop_scope`, there is no destination register to report the new head to
/// — the only operand is the jump offset.
fn jmp_scopes<O: ObjectModel, H: HostCalls>(txn: &mut Transaction<O, H>, ins: &Instruction) -> StepOutcome {
    let offset = ins.operands[0].as_jump_offset().expect("jmp_scopes carries an offset operand");
    let existing = txn.current_frame().scope_chain_label;
    let pc = txn.pc_label();

    if structural_abort(existing, pc) {
        let location = txn.current_location();
        return StepOutcome::FatalAbort(IfcError::NsuViolation { location });
    }

    if let Some(id) = txn.current_frame().scope_chain {
        let proto = txn.objects.proto_of(id);
        let proto_label = txn.objects.proto_label(id);
        let frame = txn.current_frame_mut();
        frame.scope_chain = proto;
        frame.scope_chain_label = Label::join(pc, proto_label);
    }

    let p = txn.current_frame().pc;
    StepOutcome::Jump((p as i32 + offset) as u32)
}
