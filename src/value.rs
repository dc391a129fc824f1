//! Runtime value representation. The *unlabeled* value produced by the
//! host runtime (arithmetic results, property lookups, ...) is out of
//! scope here; this module only defines the shape a value takes so the
//! dispatcher has something concrete to attach a [`Label`] to.

use crate::label::Label;
use serde::{Deserialize, Serialize};

/// Opaque object identity, indexing into a host [`crate::host::ObjectModel`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct ObjectId(pub u32);

/// The unlabeled runtime value. Concrete host runtimes will have a much
/// richer value representation (strings, closures, typed arrays, ...); this
/// crate only needs enough structure to exercise every IFC family.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub enum RawValue {
    Undefined,
    Bool(bool),
    Number(f64),
    Str(String),
    Object(ObjectId),
}

impl Default for RawValue {
    fn default() -> Self {
        RawValue::Undefined
    }
}

/// A value paired with its label.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct LabeledValue {
    pub value: RawValue,
    pub label: Label,
}

impl LabeledValue {
    pub fn new(value: RawValue, label: Label) -> Self {
        Self { value, label }
    }

    pub fn undefined() -> Self {
        Self::default()
    }

    #[inline]
    pub fn label(&self) -> Label {
        self.label
    }

    #[inline]
    pub fn set_label(&mut self, label: Label) {
        self.label = label;
    }
}
