//! [`CodeObject`]: an ordered instruction sequence plus the side tables the
//! dominator engine and dispatcher consult.

use super::opcode::Opcode;
use crate::analysis::DominatorInfo;
use serde::{Deserialize, Serialize};
use std::cell::OnceCell;
use std::collections::HashMap;

/// Stable identifier for a code object, used verbatim in diagnostics.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct CodeObjectId(pub u32);

impl std::fmt::Display for CodeObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A single instruction operand.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum Operand {
    Register(u32),
    Constant(u32),
    /// A relative jump offset, in instruction-index units from the
    /// instruction that carries it (e.g. `JumpOffset(2)` at index `p`
    /// targets index `p + 2`). See DESIGN.md for the offset-addressing
    /// simplification.
    JumpOffset(i32),
    Identifier(u32),
    /// An inline structure pointer (e.g. a switch-table index, or a nested
    /// code-object index for `new_function`).
    Inline(u32),
}

impl Operand {
    pub fn as_register(self) -> Option<u32> {
        match self {
            Operand::Register(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_jump_offset(self) -> Option<i32> {
        match self {
            Operand::JumpOffset(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_inline(self) -> Option<u32> {
        match self {
            Operand::Inline(i) => Some(i),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Instruction {
    pub opcode: Opcode,
    pub operands: Vec<Operand>,
    /// Source line, carried through for diagnostics only.
    pub line: u32,
}

/// A half-open bytecode range covered by an exception handler.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct ExceptionHandler {
    pub start: u32,
    pub end: u32,
    pub target: u32,
}

impl ExceptionHandler {
    #[inline]
    pub fn covers(&self, offset: u32) -> bool {
        offset >= self.start && offset < self.end
    }

    /// Range width; used to find the innermost of several overlapping
    /// handlers when more than one covers the same offset.
    #[inline]
    fn width(&self) -> u32 {
        self.end - self.start
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct JumpTables {
    pub immediate: Vec<Vec<(i64, u32)>>,
    pub character: Vec<Vec<(char, u32)>>,
    pub string: Vec<Vec<(String, u32)>>,
}

/// An ordered instruction sequence plus the identifier/constant/jump-table/
/// exception-handler side tables.
#[derive(Debug, Serialize, Deserialize)]
pub struct CodeObject {
    pub id: CodeObjectId,
    pub source_url: Option<String>,
    pub instructions: Vec<Instruction>,
    pub identifiers: Vec<String>,
    pub constants: Vec<ConstantValue>,
    pub jump_tables: JumpTables,
    pub exception_handlers: Vec<ExceptionHandler>,

    /// Cached dominator analyses, one per value of `include_exception_edges`.
    /// Index 0 = without exception edges, index 1 = with.
    #[serde(skip)]
    analysis_cache: [OnceCell<DominatorInfo>; 2],
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ConstantValue {
    Undefined,
    Number(f64),
    Str(String),
    Bool(bool),
}

impl CodeObject {
    pub fn new(id: CodeObjectId, instructions: Vec<Instruction>) -> Self {
        Self {
            id,
            source_url: None,
            instructions,
            identifiers: Vec::new(),
            constants: Vec::new(),
            jump_tables: JumpTables::default(),
            exception_handlers: Vec::new(),
            analysis_cache: [OnceCell::new(), OnceCell::new()],
        }
    }

    pub fn with_source_url(mut self, url: impl Into<String>) -> Self {
        self.source_url = Some(url.into());
        self
    }

    pub fn with_exception_handlers(mut self, handlers: Vec<ExceptionHandler>) -> Self {
        self.exception_handlers = handlers;
        self
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Synthetic exit node index: `n`, one past the last real instruction.
    #[inline]
    pub fn sen(&self) -> u32 {
        self.len() as u32
    }

    /// The innermost exception handler whose range covers `offset`, if any.
    pub fn innermost_handler_at(&self, offset: u32) -> Option<&ExceptionHandler> {
        self.exception_handlers
            .iter()
            .filter(|h| h.covers(offset))
            .min_by_key(|h| h.width())
    }

    /// Lazily computed, cached immediate-post-dominator analysis for this
    /// code object. Stable for the object's lifetime once computed for a
    /// given value of `include_exception_edges`.
    pub fn analysis(&self, include_exception_edges: bool) -> &DominatorInfo {
        let idx = include_exception_edges as usize;
        self.analysis_cache[idx]
            .get_or_init(|| crate::analysis::analyze(self, include_exception_edges))
    }

    pub fn has_analysis(&self, include_exception_edges: bool) -> bool {
        self.analysis_cache[include_exception_edges as usize]
            .get()
            .is_some()
    }

    pub fn instruction_at(&self, offset: u32) -> Option<&Instruction> {
        self.instructions.get(offset as usize)
    }
}

/// Helper retained for hosts that load code objects by numeric id.
#[derive(Default, Serialize, Deserialize)]
pub struct CodeObjectTable {
    objects: HashMap<u32, CodeObject>,
    next_id: u32,
}

impl CodeObjectTable {
    pub fn insert(&mut self, instructions: Vec<Instruction>) -> CodeObjectId {
        let id = CodeObjectId(self.next_id);
        self.next_id += 1;
        self.objects.insert(id.0, CodeObject::new(id, instructions));
        id
    }

    pub fn get(&self, id: CodeObjectId) -> Option<&CodeObject> {
        self.objects.get(&id.0)
    }

    pub fn get_mut(&mut self, id: CodeObjectId) -> Option<&mut CodeObject> {
        self.objects.get_mut(&id.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn innermost_handler_wins_on_overlap() {
        let mut co = CodeObject::new(CodeObjectId(0), Vec::new());
        co.exception_handlers = vec![
            ExceptionHandler {
                start: 0,
                end: 10,
                target: 100,
            },
            ExceptionHandler {
                start: 2,
                end: 6,
                target: 200,
            },
        ];
        let h = co.innermost_handler_at(3).unwrap();
        assert_eq!(h.target, 200);
        let h = co.innermost_handler_at(8).unwrap();
        assert_eq!(h.target, 100);
        assert!(co.innermost_handler_at(20).is_none());
    }
}
