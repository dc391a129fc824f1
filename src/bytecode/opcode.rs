//! The closed opcode set and its static metadata table.
//!
//! Every opcode has a known static length, a known set of operand kinds,
//! and a known [`OpcodeClass`]. `opcode_length`, `opcode_class`, and
//! `opcode_offset_field_index` are the external interface the dominator
//! engine and dispatcher consume. The opcode set is closed, so this is
//! implemented as a plain enum `match`, not open virtual dispatch.

use serde::{Deserialize, Serialize};

/// How an opcode's successors are computed when building the reversed CFG,
/// and how the dispatcher applies the matching IFC family.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum OpcodeClass {
    /// Single fallthrough edge; Family 1 pure register-to-register rule.
    Pure,
    /// Unconditional jump: one successor, the embedded target offset.
    Unconditional,
    /// Two-way conditional: taken (`p + offset_field`) and fallthrough.
    Conditional,
    /// Dense integer switch: per-case offsets plus a default.
    SwitchImmediate,
    /// Character-keyed switch: per-case offsets plus a default.
    SwitchChar,
    /// String-keyed switch: per-case offsets plus a default.
    SwitchString,
    /// `ret`/`ret_object_or_this`: edges to SEN or the canonical return.
    Return,
    /// Alias of `Return` kept distinct for clarity at call sites: the
    /// return family has two opcodes, `ret` and `ret_object_or_this`.
    ReturnObjectOrThis,
    /// Property read family (3): get_by_id/get_by_val/get_pname/resolve*.
    PropertyRead,
    /// Property write family (4): put_by_id/put_by_val/put_by_index.
    PropertyWrite,
    /// Delete family (5): del_by_id/del_by_val.
    Delete,
    /// Call/construct family (6).
    Call,
    /// Throw/catch family (8).
    Throw,
    Catch,
    /// Scope manipulation family (9).
    ScopeOp,
    /// Activation/arguments/this/function-creation family (10).
    Activation,
    /// `end` — family 11.
    End,
}

/// The closed opcode set. Operand slots are carried on [`Instruction`], not
/// here; this enum exists purely to key the static metadata table below.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[allow(non_camel_case_types)]
pub enum Opcode {
    // Family 1 — pure register-to-register
    Add,
    Sub,
    Mul,
    Eq,
    Lt,
    Move,
    Negate,
    Concat,
    Typeof,
    IsObject,
    GetPnameNext,
    // Family 2 — branches
    JTrue,
    JFalse,
    LoopIfTrue,
    SwitchImm,
    SwitchChar,
    SwitchString,
    FinallyReplay,
    ForInNext,
    // unconditional jump (also classed Conditional-free for CFG purposes)
    Jmp,
    // Family 3 — property reads
    GetById,
    GetByVal,
    GetPname,
    GetArgumentsLength,
    Resolve,
    // Family 4 — property writes
    PutById,
    PutByVal,
    PutByIndex,
    // Family 5 — delete
    DelById,
    DelByVal,
    // Family 6 — call/construct
    Call,
    Construct,
    CallHost,
    // Family 7 — return
    Ret,
    RetObjectOrThis,
    // Family 8 — throw/catch
    Throw,
    ThrowReferenceError,
    Catch,
    // Family 9 — scope
    PushScope,
    PopScope,
    JmpScopes,
    PushNewScope,
    // Family 10 — activation/arguments
    CreateActivation,
    CreateThis,
    TearOffActivation,
    NewFunction,
    // Family 11
    End,
}

impl Opcode {
    /// Static operand-tuple length, including the opcode tag itself.
    /// Instructions in this crate are addressed by sequence index rather
    /// than raw byte/word offset (see DESIGN.md), so this value is
    /// decode/validation metadata — it is not
    /// added to an instruction's index to compute its successor; the next
    /// instruction in sequence always follows at index `p + 1`.
    pub const fn length(self) -> u32 {
        use Opcode::*;
        match self {
            Add | Sub | Mul | Eq | Lt | Move | Negate | Concat | Typeof | IsObject => 4, // op, dst, src1, src2
            GetPnameNext => 3,
            JTrue | JFalse | LoopIfTrue => 3, // op, guard_reg, offset
            SwitchImm | SwitchChar | SwitchString => 4, // op, selector_reg, table_index, default_offset
            FinallyReplay => 2,
            ForInNext => 4,
            Jmp => 2,
            GetById | GetByVal | GetPname | GetArgumentsLength | Resolve => 4,
            PutById | PutByVal | PutByIndex => 4,
            DelById | DelByVal => 3,
            Call | Construct | CallHost => 4,
            Ret | RetObjectOrThis => 2,
            Throw | ThrowReferenceError => 2,
            Catch => 2,
            PushScope | PopScope | JmpScopes | PushNewScope => 2,
            CreateActivation | CreateThis | TearOffActivation | NewFunction => 2,
            End => 2,
        }
    }

    pub const fn class(self) -> OpcodeClass {
        use Opcode::*;
        use OpcodeClass as C;
        match self {
            Add | Sub | Mul | Eq | Lt | Move | Negate | Concat | Typeof | IsObject
            | GetPnameNext => C::Pure,
            JTrue | JFalse | LoopIfTrue | ForInNext => C::Conditional,
            SwitchImm => C::SwitchImmediate,
            SwitchChar => C::SwitchChar,
            SwitchString => C::SwitchString,
            FinallyReplay => C::Unconditional,
            Jmp => C::Unconditional,
            GetById | GetByVal | GetPname | GetArgumentsLength | Resolve => C::PropertyRead,
            PutById | PutByVal | PutByIndex => C::PropertyWrite,
            DelById | DelByVal => C::Delete,
            Call | Construct | CallHost => C::Call,
            Ret => C::Return,
            RetObjectOrThis => C::ReturnObjectOrThis,
            Throw | ThrowReferenceError => C::Throw,
            Catch => C::Catch,
            PushScope | PopScope | JmpScopes | PushNewScope => C::ScopeOp,
            CreateActivation | CreateThis | TearOffActivation | NewFunction => C::Activation,
            End => C::End,
        }
    }

    /// Whether this opcode may raise an exception: explicit throws, and
    /// anything in the property/call/arithmetic families that can fail at
    /// the host level.
    pub const fn may_throw(self) -> bool {
        use Opcode::*;
        matches!(
            self,
            Add | Sub
                | Mul
                | GetById
                | GetByVal
                | GetPname
                | Resolve
                | PutById
                | PutByVal
                | PutByIndex
                | DelById
                | DelByVal
                | Call
                | Construct
                | CallHost
                | Throw
                | ThrowReferenceError
                | CreateThis
                | TearOffActivation
        )
    }

    /// Which operand slot (1-indexed within the instruction's own slots,
    /// i.e. slot 0 is the first operand after the opcode tag) carries the
    /// branch/jump offset, by opcode class.
    pub const fn offset_field_index(self) -> Option<usize> {
        use Opcode::*;
        match self {
            JTrue | JFalse | LoopIfTrue => Some(1),
            Jmp => Some(0),
            FinallyReplay => Some(0),
            ForInNext => Some(2),
            SwitchImm | SwitchChar | SwitchString => Some(2), // default offset slot
            JmpScopes => Some(0),
            _ => None,
        }
    }
}
