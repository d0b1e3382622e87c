//! Bit-level presence masks.
//!
//! [`Signature`] is the fixed 64-bit mask used to tag archetypes and compile query
//! specifications (at most 64 distinct component types are supported, per the registry
//! in `component.rs`).

use crate::component::ComponentTag;

/// A 64-bit component-presence mask: bit `t` set means component tag `t` is present.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Signature(u64);

impl Signature {
    pub const EMPTY: Signature = Signature(0);

    pub fn single(tag: ComponentTag) -> Self {
        Signature(1u64 << tag.0)
    }

    pub fn with(mut self, tag: ComponentTag) -> Self {
        self.0 |= 1u64 << tag.0;
        self
    }

    pub fn set(&mut self, tag: ComponentTag) {
        self.0 |= 1u64 << tag.0;
    }

    pub fn clear(&mut self, tag: ComponentTag) {
        self.0 &= !(1u64 << tag.0);
    }

    pub fn contains(&self, tag: ComponentTag) -> bool {
        (self.0 & (1u64 << tag.0)) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn bits(&self) -> u64 {
        self.0
    }

    pub fn from_bits(bits: u64) -> Self {
        Signature(bits)
    }

    pub fn union(&self, other: &Signature) -> Signature {
        Signature(self.0 | other.0)
    }

    pub fn intersects(&self, other: &Signature) -> bool {
        (self.0 & other.0) != 0
    }

    /// `self` viewed as `A`, matching the bitset-filter rule from the specification:
    /// `(A & required) == required ∧ (A & excluded) == 0 ∧ (optional == 0 ∨ A & optional != 0)`.
    pub fn matches(&self, required: Signature, excluded: Signature, optional: Signature) -> bool {
        (self.0 & required.0) == required.0
            && (self.0 & excluded.0) == 0
            && (optional.0 == 0 || (self.0 & optional.0) != 0)
    }

    pub fn iter_tags(&self) -> impl Iterator<Item = ComponentTag> + '_ {
        (0..64).filter(move |i| (self.0 & (1u64 << i)) != 0).map(|i| ComponentTag(i as u8))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_matches_required_excluded_optional() {
        let a = ComponentTag(0);
        let b = ComponentTag(1);
        let c = ComponentTag(2);

        let sig = Signature::single(a).with(b);
        assert!(sig.matches(Signature::single(a), Signature::EMPTY, Signature::EMPTY));
        assert!(!sig.matches(Signature::single(c), Signature::EMPTY, Signature::EMPTY));
        assert!(!sig.matches(Signature::EMPTY, Signature::single(b), Signature::EMPTY));
        assert!(sig.matches(Signature::EMPTY, Signature::EMPTY, Signature::single(a)));
    }
}
