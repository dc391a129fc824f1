//! External collaborators: the object/value model and the host-call
//! interface. Both are genuinely out of scope as *runtime semantics* — the
//! object model's internals are the host's business — but the dispatcher
//! needs concrete trait boundaries to call through, so this module defines
//! those boundaries plus one reference implementation of each, following
//! the pattern of keeping hot-path code generic over a small trait rather
//! than a concrete type.

use crate::label::Label;
use crate::value::{LabeledValue, ObjectId, RawValue};
use smallvec::SmallVec;
use std::collections::HashMap;

/// The trait boundary to the value/object model.
///
/// `get_property_ifc`/`put_ifc`/`delete_ifc` carry default implementations
/// of the prototype-chain walk (Family 3) and the strict-NSU writes
/// (Families 4/5) so a host only has to supply the low-level slot/label
/// accessors; callers seed `accumulated` with the current PC label before
/// invoking any of the three (`L_obs = join(pc, ...)`).
pub trait ObjectModel {
    fn header_label(&self, obj: ObjectId) -> Label;
    fn set_header_label(&mut self, obj: ObjectId, label: Label);
    fn proto_label(&self, obj: ObjectId) -> Label;
    #[allow(dead_code)]
    fn set_proto_label(&mut self, obj: ObjectId, label: Label);
    fn proto_of(&self, obj: ObjectId) -> Option<ObjectId>;
    fn own_slot(&self, obj: ObjectId, ident: u32) -> Option<LabeledValue>;
    fn set_own_slot(&mut self, obj: ObjectId, ident: u32, value: LabeledValue);
    fn remove_own_slot(&mut self, obj: ObjectId, ident: u32) -> Option<LabeledValue>;
    fn create_object(&mut self, header_label: Label, proto: Option<ObjectId>) -> ObjectId;

    /// Walk `obj`'s own slots then its prototype chain, folding every hop's
    /// label into `accumulated`.
    fn get_property_ifc(&self, obj: ObjectId, ident: u32, accumulated: &mut Label) -> Option<LabeledValue> {
        let mut current = obj;
        accumulated.join_with(self.header_label(current));
        loop {
            if let Some(v) = self.own_slot(current, ident) {
                accumulated.join_with(v.label());
                return Some(v);
            }
            match self.proto_of(current) {
                Some(next) => {
                    accumulated.join_with(self.proto_label(current));
                    current = next;
                    accumulated.join_with(self.header_label(current));
                }
                None => return None,
            }
        }
    }

    /// Strict-NSU structural write. `accumulated` must already contain the
    /// PC label on entry; this joins in the base object's and the value's
    /// labels to form `L_ctx` before checking the existing slot.
    fn put_ifc(
        &mut self,
        obj: ObjectId,
        ident: u32,
        mut value: LabeledValue,
        accumulated: &mut Label,
        abort_flag: &mut bool,
        structure_changed: &mut bool,
    ) {
        accumulated.join_with(self.header_label(obj));
        accumulated.join_with(value.label());
        let ctx = *accumulated;
        match self.own_slot(obj, ident) {
            Some(existing) => {
                // Strict NSU: the write is only safe if the writing context
                // is already covered by what the slot's current label
                // demands — otherwise this write would silently raise the
                // slot's label under the current context, a sensitive
                // upgrade.
                if Label::leq(ctx, existing.label()) {
                    value.set_label(ctx);
                    self.set_own_slot(obj, ident, value);
                    *structure_changed = false;
                } else {
                    *abort_flag = true;
                }
            }
            None => {
                value.set_label(ctx);
                self.set_own_slot(obj, ident, value);
                let new_header = Label::join(self.header_label(obj), ctx);
                self.set_header_label(obj, new_header);
                *structure_changed = true;
            }
        }
    }

    /// Strict-NSU delete.
    fn delete_ifc(&mut self, obj: ObjectId, ident: u32, accumulated: &mut Label, abort_flag: &mut bool) {
        accumulated.join_with(self.header_label(obj));
        let ctx = *accumulated;
        if let Some(existing) = self.own_slot(obj, ident) {
            if Label::leq(ctx, existing.label()) {
                self.remove_own_slot(obj, ident);
                let new_header = Label::join(self.header_label(obj), ctx);
                self.set_header_label(obj, new_header);
            } else {
                *abort_flag = true;
            }
        }
    }
}

struct ObjectRecord {
    header_label: Label,
    proto_label: Label,
    proto: Option<ObjectId>,
    slots: HashMap<u32, LabeledValue>,
}

/// Reference [`ObjectModel`]: a slotted heap with explicit prototype links.
/// Sufficient to exercise every property-family rule and to back the
/// crate's integration tests; a host embedding a real object/GC model
/// supplies its own implementation instead.
#[derive(Default)]
pub struct HeapObjectModel {
    objects: Vec<ObjectRecord>,
}

impl HeapObjectModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_proto(&mut self, obj: ObjectId, proto: Option<ObjectId>) {
        self.objects[obj.0 as usize].proto = proto;
    }
}

impl ObjectModel for HeapObjectModel {
    fn header_label(&self, obj: ObjectId) -> Label {
        self.objects[obj.0 as usize].header_label
    }

    fn set_header_label(&mut self, obj: ObjectId, label: Label) {
        self.objects[obj.0 as usize].header_label = label;
    }

    fn proto_label(&self, obj: ObjectId) -> Label {
        self.objects[obj.0 as usize].proto_label
    }

    fn set_proto_label(&mut self, obj: ObjectId, label: Label) {
        self.objects[obj.0 as usize].proto_label = label;
    }

    fn proto_of(&self, obj: ObjectId) -> Option<ObjectId> {
        self.objects[obj.0 as usize].proto
    }

    fn own_slot(&self, obj: ObjectId, ident: u32) -> Option<LabeledValue> {
        self.objects[obj.0 as usize].slots.get(&ident).cloned()
    }

    fn set_own_slot(&mut self, obj: ObjectId, ident: u32, value: LabeledValue) {
        self.objects[obj.0 as usize].slots.insert(ident, value);
    }

    fn remove_own_slot(&mut self, obj: ObjectId, ident: u32) -> Option<LabeledValue> {
        self.objects[obj.0 as usize].slots.remove(&ident)
    }

    fn create_object(&mut self, header_label: Label, proto: Option<ObjectId>) -> ObjectId {
        let id = ObjectId(self.objects.len() as u32);
        self.objects.push(ObjectRecord {
            header_label,
            proto_label: Label::bottom(),
            proto,
            slots: HashMap::new(),
        });
        id
    }
}

/// Per-call context handed to [`HostCalls::call`].
pub struct HostCallContext {
    pub arg_labels: SmallVec<[Label; 8]>,
    pub pc_global: Label,
    pub return_label: Label,
    pub abort: bool,
}

impl HostCallContext {
    pub fn new(pc_global: Label, args: &[Label], max_args: usize) -> Self {
        if args.len() > max_args {
            tracing::warn!(
                requested = args.len(),
                max = max_args,
                "host call argument labels truncated"
            );
        }
        let arg_labels = args.iter().take(max_args).copied().collect();
        Self {
            arg_labels,
            pc_global,
            return_label: Label::bottom(),
            abort: false,
        }
    }
}

/// The trait boundary to the host call interface.
pub trait HostCalls {
    /// Execute a native call. Implementations may read `ctx.pc_global` and
    /// `ctx.arg_labels` to apply their own IFC checks, may set `ctx.abort`
    /// to force a transaction-wide abort, and must set `ctx.return_label`
    /// before returning.
    fn call(&mut self, ident: u32, ctx: &mut HostCallContext) -> RawValue;
}

/// A host with no native calls: always returns `undefined` at `bottom()`.
pub struct NullHost;

impl HostCalls for NullHost {
    fn call(&mut self, _ident: u32, ctx: &mut HostCallContext) -> RawValue {
        ctx.return_label = Label::bottom();
        RawValue::Undefined
    }
}
