//! Process-wide origin registry: maps a source URL (or equivalent origin
//! identifier) to the [`Label`] assigned to code loaded from it.
//!
//! A fixed-capacity table consulted whenever a new code object enters and
//! never mutated mid-transaction. Rather than a fixed array that simply
//! refuses insertions once full, this registry evicts the oldest entry to
//! make room: a long-running host keeps loading new scripts for its whole
//! lifetime, so silently refusing new origins would eventually wedge every
//! subsequent load at `bottom()`.

use crate::label::Label;
use std::collections::VecDeque;
use std::collections::HashMap;

/// Bounded, insertion-ordered `url -> Label` table.
///
/// Read-mostly: `label_for` is the hot path (consulted on every code-object
/// load), `assign`/`remove` are cold (host setup, or an explicit
/// `setLabel`-style declassification registering a fresh origin).
pub struct OriginRegistry {
    capacity: usize,
    labels: HashMap<String, Label>,
    insertion_order: VecDeque<String>,
}

impl OriginRegistry {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "origin registry capacity must be nonzero");
        Self {
            capacity,
            labels: HashMap::new(),
            insertion_order: VecDeque::new(),
        }
    }

    /// Look up the label assigned to `url`, or `Label::bottom()` if the
    /// origin has never been assigned one.
    pub fn label_for(&self, url: &str) -> Label {
        self.labels.get(url).copied().unwrap_or_else(Label::bottom)
    }

    /// Assign (or overwrite) the label for `url`. Overwriting an existing
    /// entry does not change its position in the eviction order.
    pub fn assign(&mut self, url: impl Into<String>, label: Label) {
        let url = url.into();
        if self.labels.contains_key(&url) {
            self.labels.insert(url, label);
            return;
        }
        if self.labels.len() >= self.capacity {
            if let Some(oldest) = self.insertion_order.pop_front() {
                self.labels.remove(&oldest);
            }
        }
        self.insertion_order.push_back(url.clone());
        self.labels.insert(url, label);
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unassigned_origin_is_bottom() {
        let reg = OriginRegistry::new(4);
        assert_eq!(reg.label_for("https://example.com/a.js"), Label::bottom());
    }

    #[test]
    fn assign_then_lookup_round_trips() {
        let mut reg = OriginRegistry::new(4);
        let l = Label::confidential(2);
        reg.assign("https://example.com/a.js", l);
        assert_eq!(reg.label_for("https://example.com/a.js"), l);
    }

    #[test]
    fn eviction_is_oldest_first_once_full() {
        let mut reg = OriginRegistry::new(2);
        reg.assign("a", Label::confidential(0));
        reg.assign("b", Label::confidential(1));
        reg.assign("c", Label::confidential(2));

        assert_eq!(reg.label_for("a"), Label::bottom(), "a should be evicted");
        assert_eq!(reg.label_for("b"), Label::confidential(1));
        assert_eq!(reg.label_for("c"), Label::confidential(2));
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn overwrite_does_not_trigger_eviction() {
        let mut reg = OriginRegistry::new(2);
        reg.assign("a", Label::confidential(0));
        reg.assign("b", Label::confidential(1));
        reg.assign("a", Label::confidential(5));
        assert_eq!(reg.label_for("a"), Label::confidential(5));
        assert_eq!(reg.label_for("b"), Label::confidential(1));
    }
}
