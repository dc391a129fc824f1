//! Instrumented dispatcher: owns the PC stack and the call-frame/register
//! state for one top-level execution, and drives the family handlers under
//! `dispatch/` one instruction at a time.
//!
//! Split between an orchestrator (`Transaction::run`) and per-family
//! handler modules generic over a state trait (`Transaction<O, H>`) — see
//! `dispatch/mod.rs`.

pub mod dispatch;

use crate::bytecode::{CodeObject, CodeObjectId, CodeObjectTable, Opcode};
use crate::config::VmConfig;
use crate::error::{IfcError, SourceLocation};
use crate::host::{HostCalls, ObjectModel};
use crate::label::Label;
use crate::origin::OriginRegistry;
use crate::pcstack::{FrameMarker, PcStack};
use crate::value::{LabeledValue, ObjectId, RawValue};
use std::collections::HashMap;

/// A call frame's register file. Grows on demand; a read past the high
/// water mark returns `undefined` at `bottom()` rather than panicking —
/// register allocation is a property of the (out-of-scope) compiler, not
/// of this dispatcher.
#[derive(Default, Clone)]
pub struct RegisterFile {
    slots: Vec<LabeledValue>,
}

impl RegisterFile {
    pub fn get(&self, r: u32) -> LabeledValue {
        self.slots.get(r as usize).cloned().unwrap_or_default()
    }

    pub fn label_of(&self, r: u32) -> Label {
        self.get(r).label()
    }

    pub fn set(&mut self, r: u32, v: LabeledValue) {
        let idx = r as usize;
        if idx >= self.slots.len() {
            self.slots.resize(idx + 1, LabeledValue::undefined());
        }
        self.slots[idx] = v;
    }

    /// First-branch labelling promotion: join `pc` into every live
    /// register. Monotonic — never lowers a label already above `pc`.
    pub fn label_all_with(&mut self, pc: Label) {
        for slot in &mut self.slots {
            slot.label.join_with(pc);
        }
    }
}

/// What a function object points at: its compiled body and the source URL
/// the origin registry keys on. Closures/captured scopes are out of scope;
/// kept minimal to exercise Family 6.
#[derive(Clone)]
pub struct FunctionInfo {
    pub code_object: CodeObjectId,
    pub source_url: String,
}

/// One active call frame.
pub struct Frame {
    pub code_object: CodeObjectId,
    pub pc: u32,
    pub registers: RegisterFile,
    pub marker: FrameMarker,
    pub exc_handler_present: bool,
    /// Whether this frame's registers have already been back-filled with
    /// the pc by `require_labeling`. Per-frame, not tied to the
    /// transaction-global `labelReq` flag — each frame earns its own
    /// back-fill the first time it is on top when promotion is required.
    pub fully_labeled: bool,
    /// Where the return value lands in the caller: `(register, caller's
    /// frame marker)`. `None` for the outermost frame of a transaction.
    pub return_slot: Option<(u32, FrameMarker)>,
    /// Innermost scope-chain link (Family 9). `None` at function entry,
    /// before any `push_scope`/`push_new_scope`.
    pub scope_chain: Option<ObjectId>,
    /// Label on `scope_chain`'s innermost link, tracked outside the object
    /// model since an empty chain has no object to carry it.
    pub scope_chain_label: Label,
}

impl Frame {
    fn new(code_object: CodeObjectId, marker: FrameMarker, exc_handler_present: bool) -> Self {
        Self {
            code_object,
            pc: 0,
            registers: RegisterFile::default(),
            marker,
            exc_handler_present,
            fully_labeled: false,
            return_slot: None,
            scope_chain: None,
            scope_chain_label: Label::bottom(),
        }
    }
}

/// Internal result of executing one instruction's family rule, consumed by
/// `Transaction::step_once`.
pub(crate) enum StepOutcome {
    /// Fall through to `pc + 1`.
    Continue,
    /// Unconditional control transfer within the current frame.
    Jump(u32),
    /// Enter a new callee frame.
    Call {
        callee: CodeObjectId,
        /// `join(L_f, caller-slot-label)`, already combining the callee's
        /// origin label and the caller's label on the callee register —
        /// `enter_call` joins this with the current pc to form the pushed
        /// frame's label per Family 6 step 2.
        context_label: Label,
        args: Vec<LabeledValue>,
        return_register: u32,
    },
    /// The current frame is finished; `value` is its return value.
    Return(LabeledValue),
    /// A language-level error is being thrown; `value` is the exception
    /// payload.
    Throw(LabeledValue),
    /// Fatal to the whole transaction: strict NSU violation or branch on a
    /// tainted guard.
    FatalAbort(IfcError),
}

/// What happened to the whole transaction after one instruction.
enum RunSignal {
    Running,
    Finished(LabeledValue),
}

/// Result of an unhandled-exception unwind search (Family 8).
enum UnwindOutcome {
    Handled,
    Unhandled(LabeledValue),
}

/// Owns every mutable piece of state touched while running one top-level
/// execution ("the dispatcher is the sole mutator" of the PC stack, the
/// IPD cache, and every label it touches during one transaction).
pub struct Transaction<'a, O: ObjectModel, H: HostCalls> {
    pub code_objects: &'a CodeObjectTable,
    pub functions: &'a HashMap<ObjectId, FunctionInfo>,
    pub objects: &'a mut O,
    pub host: &'a mut H,
    pub origins: &'a OriginRegistry,
    pub config: VmConfig,

    pub pcstack: PcStack,
    frames: Vec<Frame>,
    next_marker: u32,
    /// Global `labelReq` flag: once any operand or the PC rises above
    /// `bottom()`, every destination write attaches labels explicitly
    /// rather than deferring.
    label_req: bool,
    tick_budget: u32,
    pub abort: bool,
    /// The exception value a just-entered `catch` should pick up, set by
    /// `unwind_to_handler` immediately before transferring control.
    pending_exception: Option<LabeledValue>,
}

impl<'a, O: ObjectModel, H: HostCalls> Transaction<'a, O, H> {
    pub fn new(
        code_objects: &'a CodeObjectTable,
        functions: &'a HashMap<ObjectId, FunctionInfo>,
        objects: &'a mut O,
        host: &'a mut H,
        origins: &'a OriginRegistry,
        config: VmConfig,
    ) -> Self {
        let tick_budget = config.tick_budget;
        Self {
            code_objects,
            functions,
            objects,
            host,
            origins,
            config,
            pcstack: PcStack::new(),
            frames: Vec::new(),
            next_marker: 0,
            label_req: false,
            tick_budget,
            abort: false,
            pending_exception: None,
        }
    }

    fn fresh_marker(&mut self) -> FrameMarker {
        let m = FrameMarker(self.next_marker);
        self.next_marker += 1;
        m
    }

    #[inline]
    pub fn labeling_required(&self) -> bool {
        self.label_req
    }

    /// Two independent promotions live behind this call. The `labelReq`
    /// flag is transaction-global and flips exactly once, the first time
    /// any write observes a label above `bottom()`. The register back-fill
    /// is per-frame: every frame gets it the first time this is called
    /// while that frame is on top, regardless of whether some other frame
    /// already flipped the global flag earlier in the transaction —
    /// otherwise a callee entered after the first promotion would keep
    /// registers unlabeled under a high pc.
    pub(crate) fn require_labeling(&mut self) {
        self.label_req = true;
        let pc = self.pcstack.loc();
        if let Some(top) = self.frames.last_mut() {
            if !top.fully_labeled {
                top.registers.label_all_with(pc);
                top.fully_labeled = true;
            }
        }
    }

    fn code(&self, id: CodeObjectId) -> &CodeObject {
        self.code_objects
            .get(id)
            .expect("dispatcher holds a CodeObjectId for an object not in the table")
    }

    fn location(&self, frame: &Frame, offset: u32) -> SourceLocation {
        let line = self
            .code(frame.code_object)
            .instruction_at(offset)
            .map(|i| i.line)
            .unwrap_or(0);
        SourceLocation {
            line,
            offset,
            code_object: frame.code_object,
        }
    }

    /// Current PC label, or `bottom()` outside any branch context.
    pub fn pc_label(&self) -> Label {
        self.pcstack.loc()
    }

    /// Run `entry` to completion with `args` as its initial registers.
    /// Returns the final result on normal completion, or the error that
    /// ended the transaction — a strict NSU violation, a branch on a
    /// tainted guard, or an exception with no matching handler anywhere in
    /// the call-frame stack.
    pub fn run(&mut self, entry: CodeObjectId, args: &[LabeledValue]) -> Result<LabeledValue, IfcError> {
        let marker = self.fresh_marker();
        let exc_handler_present = !self.code(entry).exception_handlers.is_empty();
        let mut frame = Frame::new(entry, marker, exc_handler_present);
        for (i, a) in args.iter().enumerate() {
            frame.registers.set(i as u32, a.clone());
        }
        self.frames.push(frame);

        loop {
            if self.abort {
                let location = self.current_location();
                return self.fatal_unwind(IfcError::NsuViolation { location });
            }
            match self.step_once()? {
                RunSignal::Running => continue,
                RunSignal::Finished(value) => return Ok(value),
            }
        }
    }

    pub(crate) fn current_location(&self) -> SourceLocation {
        match self.frames.last() {
            Some(f) => self.location(f, f.pc),
            None => SourceLocation {
                line: 0,
                offset: 0,
                code_object: CodeObjectId(u32::MAX),
            },
        }
    }

    /// Fatal-abort sequence: unwind every PC frame and call frame, return
    /// the triggering error.
    fn fatal_unwind(&mut self, err: IfcError) -> Result<LabeledValue, IfcError> {
        tracing::warn!(location = %err.location(), "fatal IFC violation, unwinding transaction");
        self.pcstack.clear();
        self.frames.clear();
        Err(err)
    }

    /// Execute exactly one instruction of the top frame, applying IPD
    /// auto-pop first.
    fn step_once(&mut self) -> Result<RunSignal, IfcError> {
        let Some(top) = self.frames.last() else {
            return Ok(RunSignal::Finished(LabeledValue::undefined()));
        };
        let frame_marker = top.marker;
        let p = top.pc;

        // IPD auto-pop (PC-stack discipline: "if p == ipd and F == F_top,
        // pop first").
        if let Some(head) = self.pcstack.head() {
            if head.frame == frame_marker && head.ipd == p {
                self.pcstack.pop().expect("head() just confirmed non-empty");
            }
        }

        self.maybe_tick(p);

        let outcome = dispatch::step(self);

        match outcome {
            StepOutcome::Continue => {
                self.advance_pc(frame_marker, |pc| pc + 1);
                Ok(RunSignal::Running)
            }
            StepOutcome::Jump(target) => {
                self.advance_pc(frame_marker, |_| target);
                Ok(RunSignal::Running)
            }
            StepOutcome::Call {
                callee,
                context_label,
                args,
                return_register,
            } => {
                self.enter_call(callee, context_label, args, return_register);
                Ok(RunSignal::Running)
            }
            StepOutcome::Return(value) => Ok(self.finish_frame(value)),
            StepOutcome::Throw(value) => {
                let location = self.current_location();
                match self.unwind_to_handler(value) {
                    UnwindOutcome::Handled => Ok(RunSignal::Running),
                    UnwindOutcome::Unhandled(exc) => {
                        let message = format!("{:?}", exc.value);
                        Err(IfcError::Throwable { location, message })
                    }
                }
            }
            StepOutcome::FatalAbort(err) => {
                self.fatal_unwind(err)?;
                unreachable!("fatal_unwind always returns Err")
            }
        }
    }

    fn advance_pc(&mut self, marker: FrameMarker, f: impl FnOnce(u32) -> u32) {
        if let Some(top) = self.frames.last_mut() {
            debug_assert_eq!(top.marker, marker);
            top.pc = f(top.pc);
        }
    }

    fn maybe_tick(&mut self, p: u32) {
        let is_loop_class = self
            .frames
            .last()
            .and_then(|f| self.code_objects.get(f.code_object).map(|c| (c, f.pc)))
            .and_then(|(c, pc)| c.instruction_at(pc))
            .map(|i| matches!(i.opcode, Opcode::LoopIfTrue))
            .unwrap_or(false);
        let _ = p;
        if is_loop_class {
            self.tick_budget = self.tick_budget.saturating_sub(1);
            if self.tick_budget == 0 {
                self.tick_budget = self.config.tick_budget;
                self.abort = self.abort || self.host_requests_abort();
            }
        }
    }

    fn host_requests_abort(&self) -> bool {
        // Timeout refill/raise is a host policy decision; this crate only
        // exposes the hook point. The reference hosts never time out on
        // their own.
        false
    }

    /// Family 6, JS-function leg: push a callee frame and its matching PC
    /// frame.
    fn enter_call(
        &mut self,
        callee: CodeObjectId,
        context_label: Label,
        args: Vec<LabeledValue>,
        return_register: u32,
    ) {
        let caller_marker = self.frames.last().map(|f| f.marker);
        let pc_at_call = self.pcstack.loc();
        let call_site = self.frames.last().map(|f| f.pc).unwrap_or(0);
        let call_site_code = self.frames.last().map(|f| f.code_object);

        let exc_flag = !self.code(callee).exception_handlers.is_empty() || self.pcstack.exc_handler();

        let ipd = call_site_code
            .and_then(|c| self.code_objects.get(c))
            .map(|c| c.analysis(exc_flag).ipd(call_site).unwrap_or(c.sen()))
            .unwrap_or(0);

        let pushed_label = Label::join(pc_at_call, context_label);
        let new_marker = self.fresh_marker();

        self.pcstack.push(pushed_label, ipd, new_marker, exc_flag, false);

        // Warm the analyzer cache for this (callee, exc-flag) combination
        // now; the cache's own lazy init is idempotent (UNANALYZED ->
        // ANALYZING -> READY).
        let _ = self.code(callee).analysis(exc_flag);

        let mut frame = Frame::new(callee, new_marker, exc_flag);
        for (i, a) in args.into_iter().enumerate() {
            frame.registers.set(i as u32, a);
        }
        frame.return_slot = caller_marker.map(|m| (return_register, m));
        self.frames.push(frame);
    }

    /// Family 7: pop the completed frame, join its return value into the
    /// post-call PC, and write it into the caller's destination register
    /// (if any). Returns `Finished` once the outermost frame completes.
    fn finish_frame(&mut self, value: LabeledValue) -> RunSignal {
        let finished = self.frames.pop().expect("finish_frame called with an empty frame stack");
        self.pcstack.unwind_frame(finished.marker);

        let post_call_pc = self.pcstack.loc();
        let mut result = value;
        result.set_label(Label::join(result.label(), post_call_pc));

        if let Some((reg, _caller_marker)) = finished.return_slot {
            if let Some(caller) = self.frames.last_mut() {
                caller.registers.set(reg, result.clone());
            }
        }
        if self.frames.is_empty() {
            RunSignal::Finished(result)
        } else {
            RunSignal::Running
        }
    }

    /// Family 8: unwind call frames looking for a handler for `exc_value`.
    /// `Handled` once dispatched into a handler (the caller keeps running);
    /// `Unhandled` if no handler existed anywhere in the transaction, which
    /// `step_once` turns into an `IfcError::Throwable` returned to the host.
    fn unwind_to_handler(&mut self, exc_value: LabeledValue) -> UnwindOutcome {
        loop {
            let Some(top_marker) = self.frames.last().map(|f| f.marker) else {
                self.pcstack.clear();
                return UnwindOutcome::Unhandled(exc_value);
            };
            let top_code = self.frames.last().map(|f| f.code_object).unwrap();
            let top_pc = self.frames.last().map(|f| f.pc).unwrap();
            let handler = self.code(top_code).innermost_handler_at(top_pc).copied();

            if let Some(handler) = handler {
                let target = handler.target;
                let top_is_head = self.pcstack.head().map(|h| h.frame == top_marker).unwrap_or(false);
                if top_is_head {
                    let _ = self.pcstack.join(exc_value.label(), Some(true), None);
                } else {
                    self.pcstack.push(exc_value.label(), target, top_marker, true, false);
                }
                self.advance_pc(top_marker, |_| target);
                self.pending_exception = Some(exc_value);
                return UnwindOutcome::Handled;
            }

            let finished = self.frames.pop().expect("loop guard just confirmed non-empty");
            self.pcstack.unwind_frame(finished.marker);
        }
    }

    pub(crate) fn take_pending_exception(&mut self) -> Option<LabeledValue> {
        self.pending_exception.take()
    }

    pub(crate) fn current_frame(&self) -> &Frame {
        self.frames.last().expect("dispatch called with no active frame")
    }

    pub(crate) fn current_frame_mut(&mut self) -> &mut Frame {
        self.frames.last_mut().expect("dispatch called with no active frame")
    }

    pub(crate) fn raw_value(&self, r: u32) -> RawValue {
        self.current_frame().registers.get(r).value
    }
}
