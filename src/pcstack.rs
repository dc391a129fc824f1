//! PC stack: a LIFO of frames encoding the join of every guard label
//! controlling reaching the current instruction.

use crate::label::Label;

/// Opaque identity of the call frame that owns a [`PcFrame`]. A raw counter
/// is enough here since the dispatcher hands out one per call and never
/// recycles it within a transaction.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub struct FrameMarker(pub u32);

/// One PC-stack entry.
#[derive(Clone, Copy, Debug)]
pub struct PcFrame {
    pub label: Label,
    /// Immediate post-dominator of the branch/call that pushed this frame;
    /// reaching this offset in the owning frame is what triggers auto-pop.
    pub ipd: u32,
    pub frame: FrameMarker,
    /// Whether some enclosing function has an active exception handler.
    pub exc_handler: bool,
    /// Whether this frame was pushed by an actual branch (vs. a join of an
    /// already-present label at the same IPD).
    pub branch_flag: bool,
}

#[cfg(feature = "trace_pc_stack")]
#[derive(Clone, Copy, Debug)]
pub enum PcStackEvent {
    Push(PcFrame),
    Pop(PcFrame),
    Join(Label),
}

/// Contract violation in the PC stack: every precondition here is
/// contract-checked rather than allowed to fail silently. Only raised by
/// misuse from within this crate — it never reaches a released build's
/// public API, since `Transaction` never calls `pop`/`join` on an empty
/// stack during correctly-generated bytecode.
#[derive(Debug, thiserror::Error)]
#[error("PC stack contract violation: {0}")]
pub struct PcStackContractError(pub &'static str);

/// The PC stack itself: owned by the dispatcher for the lifetime of one
/// top-level execution.
#[derive(Default)]
pub struct PcStack {
    frames: Vec<PcFrame>,
    #[cfg(feature = "trace_pc_stack")]
    events: Vec<PcStackEvent>,
}

impl PcStack {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn push(&mut self, label: Label, ipd: u32, frame: FrameMarker, exc_handler: bool, branch_flag: bool) {
        let f = PcFrame {
            label,
            ipd,
            frame,
            exc_handler,
            branch_flag,
        };
        self.frames.push(f);
        #[cfg(feature = "trace_pc_stack")]
        self.events.push(PcStackEvent::Push(f));
    }

    /// Discard the top frame. A contract violation on an empty stack.
    pub fn pop(&mut self) -> Result<PcFrame, PcStackContractError> {
        match self.frames.pop() {
            Some(f) => {
                #[cfg(feature = "trace_pc_stack")]
                self.events.push(PcStackEvent::Pop(f));
                Ok(f)
            }
            None => Err(PcStackContractError("pop on empty PC stack")),
        }
    }

    /// `join(label [, newExc, newFun])`: update the top frame's label,
    /// optionally its exception/branch flags. Does not change `ipd`.
    pub fn join(
        &mut self,
        label: Label,
        new_exc: Option<bool>,
        new_branch: Option<bool>,
    ) -> Result<(), PcStackContractError> {
        let top = self
            .frames
            .last_mut()
            .ok_or(PcStackContractError("join on empty PC stack"))?;
        top.label.join_with(label);
        if let Some(e) = new_exc {
            top.exc_handler = e;
        }
        if let Some(b) = new_branch {
            top.branch_flag = b;
        }
        #[cfg(feature = "trace_pc_stack")]
        self.events.push(PcStackEvent::Join(label));
        Ok(())
    }

    pub fn head(&self) -> Option<&PcFrame> {
        self.frames.last()
    }

    /// The join label at the top of the stack, or `Label::bottom()` if the
    /// stack is empty (no active guard context).
    pub fn loc(&self) -> Label {
        self.frames.last().map(|f| f.label).unwrap_or_else(Label::bottom)
    }

    pub fn len_frames(&self) -> usize {
        self.frames.len()
    }

    pub fn reg(&self) -> Option<FrameMarker> {
        self.frames.last().map(|f| f.frame)
    }

    pub fn exc_handler(&self) -> bool {
        self.frames.last().map(|f| f.exc_handler).unwrap_or(false)
    }

    pub fn branch_flag(&self) -> bool {
        self.frames.last().map(|f| f.branch_flag).unwrap_or(false)
    }

    #[cfg(feature = "trace_pc_stack")]
    pub fn events(&self) -> &[PcStackEvent] {
        &self.events
    }

    /// Pop frames until (and including) one owned by `frame`, used when
    /// unwinding a call frame on return or fatal abort. Returns the number
    /// of frames popped.
    pub fn unwind_frame(&mut self, frame: FrameMarker) -> usize {
        let mut popped = 0;
        while let Some(top) = self.frames.last() {
            if top.frame == frame {
                self.frames.pop();
                popped += 1;
            } else {
                break;
            }
        }
        popped
    }

    /// Unwind everything; used on a fatal, whole-transaction abort.
    pub fn clear(&mut self) {
        self.frames.clear();
    }
}
