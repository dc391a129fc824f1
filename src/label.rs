//! Label algebra (component A).
//!
//! A [`Label`] is a confidentiality/integrity pair of 64-bit principal
//! bitmasks plus a sticky taint ("star") bit. The lattice order is subset
//! ordering on confidentiality, reverse-subset ordering on integrity; `join`
//! is componentwise union/intersection and `bottom` is the lattice's least
//! element. Every operation here is pure, total, and constant-time in the
//! bitmask width.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A confidentiality/integrity label with a sticky taint bit.
///
/// `confidentiality` is a bitset of principals the value is sensitive to;
/// `integrity` is a bitset of principals that vouch for the value (so a
/// *lower* integrity label at the join means *fewer* principals vouch for
/// the result, hence integrity join is intersection, not union).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Label {
    confidentiality: u64,
    integrity: u64,
    taint: bool,
}

impl Label {
    /// The least element of the lattice: no confidentiality principals, all
    /// integrity principals (maximally trusted), not tainted.
    #[inline]
    pub const fn bottom() -> Self {
        Self {
            confidentiality: 0,
            integrity: u64::MAX,
            taint: false,
        }
    }

    /// Construct a label from explicit bitmasks, untainted.
    #[inline]
    pub const fn new(confidentiality: u64, integrity: u64) -> Self {
        Self {
            confidentiality,
            integrity,
            taint: false,
        }
    }

    /// A label naming a single confidentiality principal, full integrity.
    #[inline]
    pub const fn confidential(principal_bit: u32) -> Self {
        Self::new(1u64 << principal_bit, u64::MAX)
    }

    #[inline]
    pub const fn confidentiality(&self) -> u64 {
        self.confidentiality
    }

    #[inline]
    pub const fn integrity(&self) -> u64 {
        self.integrity
    }

    /// Componentwise join: union of confidentiality, intersection of
    /// integrity, taint is sticky (true if either operand is tainted).
    #[inline]
    pub const fn join(a: Label, b: Label) -> Label {
        Label {
            confidentiality: a.confidentiality | b.confidentiality,
            integrity: a.integrity & b.integrity,
            taint: a.taint || b.taint,
        }
    }

    /// Join in place; equivalent to `*self = Label::join(*self, other)`.
    #[inline]
    pub fn join_with(&mut self, other: Label) {
        *self = Label::join(*self, other);
    }

    /// `a <= b` iff `a.confidentiality` is a subset of `b.confidentiality`
    /// and `a.integrity` is a superset of `b.integrity`. The taint bit does
    /// not participate in the ordering: it is a history flag, not a
    /// confidentiality/integrity level.
    #[inline]
    pub const fn leq(a: Label, b: Label) -> bool {
        (a.confidentiality & !b.confidentiality) == 0 && (b.integrity & !a.integrity) == 0
    }

    /// Return a copy of `self` with the taint bit set.
    #[inline]
    pub const fn with_taint(&self) -> Label {
        Label {
            taint: true,
            ..*self
        }
    }

    #[inline]
    pub const fn taint(&self) -> bool {
        self.taint
    }

    /// Structural equality ignoring nothing — `Label` derives `Eq`, but this
    /// is kept as an explicit method for callers that prefer a named
    /// comparison over an operator.
    #[inline]
    pub fn equals(a: Label, b: Label) -> bool {
        a == b
    }
}

impl Default for Label {
    #[inline]
    fn default() -> Self {
        Label::bottom()
    }
}

impl fmt::Debug for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Label(conf=0x{:x}, integ=0x{:x}{})",
            self.confidentiality,
            self.integrity,
            if self.taint { ", taint" } else { "" }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_is_commutative_associative_idempotent() {
        let a = Label::confidential(3);
        let b = Label::confidential(7).with_taint();
        let c = Label::new(0x5, 0xf0);

        assert_eq!(Label::join(a, b), Label::join(b, a));
        assert_eq!(
            Label::join(Label::join(a, b), c),
            Label::join(a, Label::join(b, c))
        );
        assert_eq!(Label::join(a, a), a);
    }

    #[test]
    fn bottom_is_join_unit() {
        let a = Label::new(0x1234, 0x0f0f).with_taint();
        assert_eq!(Label::join(a, Label::bottom()), a);
        assert_eq!(Label::join(Label::bottom(), a), a);
    }

    #[test]
    fn taint_bit_is_sticky_across_join_but_not_ordered() {
        let low = Label::bottom();
        let tainted_low = low.with_taint();
        assert!(tainted_low.taint());
        assert_eq!(Label::join(low, Label::bottom()).taint(), low.taint());

        let joined = Label::join(tainted_low, Label::bottom());
        assert!(joined.taint());

        // Taint does not move a label in the lattice: a tainted bottom is
        // still <= an untainted confidential label.
        let hi = Label::confidential(1);
        assert!(Label::leq(tainted_low, hi));
    }

    #[test]
    fn leq_respects_reversed_integrity_order() {
        let full_integrity = Label::new(0, u64::MAX);
        let partial_integrity = Label::new(0, 0xff);
        // partial_integrity has *fewer* vouching principals, so it is
        // "higher" (less trusted) than full_integrity in the lattice.
        assert!(Label::leq(full_integrity, partial_integrity));
        assert!(!Label::leq(partial_integrity, full_integrity));
    }

    #[test]
    fn leq_respects_confidentiality_subset_order() {
        let low = Label::new(0b001, u64::MAX);
        let high = Label::new(0b011, u64::MAX);
        assert!(Label::leq(low, high));
        assert!(!Label::leq(high, low));
    }
}
