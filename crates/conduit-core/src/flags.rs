//! Bit sets for per-node state and per-edge state.
//!
//! Both are plain `u8` newtypes with associated constants and the usual
//! bitwise operators, so flag arithmetic reads the same as in the rest of
//! the engine: `flags & EdgeFlags::NO_MERGE != EdgeFlags::NONE`.

use serde::{Deserialize, Serialize};
use std::ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign, BitXor, Not};

macro_rules! bit_set {
    ($name:ident) => {
        impl $name {
            /// Raw bit representation.
            pub const fn bits(self) -> u8 {
                self.0
            }

            /// Build from raw bits, dropping bits outside [`Self::ALL`].
            pub const fn from_bits_truncate(bits: u8) -> Self {
                Self(bits & Self::ALL.0)
            }

            /// True if every bit of `other` is set in `self`.
            pub const fn contains(self, other: Self) -> bool {
                self.0 & other.0 == other.0
            }

            /// True if any bit of `other` is set in `self`.
            pub const fn intersects(self, other: Self) -> bool {
                self.0 & other.0 != 0
            }

            pub const fn is_empty(self) -> bool {
                self.0 == 0
            }

            pub fn insert(&mut self, other: Self) {
                self.0 |= other.0;
            }

            pub fn remove(&mut self, other: Self) {
                self.0 &= !other.0;
            }
        }

        impl BitOr for $name {
            type Output = Self;
            fn bitor(self, rhs: Self) -> Self {
                Self(self.0 | rhs.0)
            }
        }

        impl BitOrAssign for $name {
            fn bitor_assign(&mut self, rhs: Self) {
                self.0 |= rhs.0;
            }
        }

        impl BitAnd for $name {
            type Output = Self;
            fn bitand(self, rhs: Self) -> Self {
                Self(self.0 & rhs.0)
            }
        }

        impl BitAndAssign for $name {
            fn bitand_assign(&mut self, rhs: Self) {
                self.0 &= rhs.0;
            }
        }

        impl BitXor for $name {
            type Output = Self;
            fn bitxor(self, rhs: Self) -> Self {
                Self(self.0 ^ rhs.0)
            }
        }

        impl Not for $name {
            type Output = Self;
            fn not(self) -> Self {
                Self(!self.0 & Self::ALL.0)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Node flags
// ---------------------------------------------------------------------------

/// Pending-work flags carried by a [`GraphNode`](crate::node::GraphNode).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeFlags(u8);

impl NodeFlags {
    pub const NONE: Self = Self(0);
    /// The node is waiting for its first graph.
    pub const INIT: Self = Self(1 << 0);
    /// The node's edges must be reconciled against the adjacency collaborator.
    pub const EDGES_DIRTY: Self = Self(1 << 1);
    /// The node may touch a different graph of its prototype.
    pub const MERGE: Self = Self(1 << 2);
    /// The node may have lost connectivity inside its graph.
    pub const SPLIT: Self = Self(1 << 3);
    pub const ALL: Self = Self(0b1111);
}

bit_set!(NodeFlags);

// ---------------------------------------------------------------------------
// Edge flags
// ---------------------------------------------------------------------------

/// Per-edge state, as seen from the node storing the half edge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EdgeFlags(u8);

impl EdgeFlags {
    pub const NONE: Self = Self(0);
    /// The storing node wants this edge.
    pub const OUT: Self = Self(1 << 0);
    /// The other node wants this edge.
    pub const IN: Self = Self(1 << 1);
    pub const DIRECTION_MASK: Self = Self(Self::OUT.0 | Self::IN.0);
    /// Topologically present, but never unions two graphs.
    pub const NO_MERGE: Self = Self(1 << 2);
    /// Maintained by edge reconciliation.
    pub const AUTO: Self = Self(1 << 3);
    /// Maintained by explicit API calls; reconciliation leaves it alone.
    pub const MANUAL: Self = Self(1 << 4);
    pub const SOURCE_MASK: Self = Self(Self::AUTO.0 | Self::MANUAL.0);
    /// Bits a collaborator may supply for an edge it wants.
    pub const USER_MASK: Self = Self::NO_MERGE;
    pub const ALL: Self = Self(0b1_1111);

    /// Flags an edge gets when the collaborator supplies none.
    pub const DEFAULT_FLAGS: Self = Self::NONE;
    /// How a missing edge behaves: it never merges anything.
    pub const NULL_FLAGS: Self = Self::NO_MERGE;

    /// The same edge as seen from the other endpoint: `IN` and `OUT` swap,
    /// everything else is shared.
    pub const fn invert(self) -> Self {
        let dir = self.0 & Self::DIRECTION_MASK.0;
        let swapped = ((dir & Self::OUT.0) << 1) | ((dir & Self::IN.0) >> 1);
        Self((self.0 & !Self::DIRECTION_MASK.0) | swapped)
    }

    /// Whether the edge can be used to union graphs.
    pub const fn is_mergeable(self) -> bool {
        !self.intersects(Self::NO_MERGE)
    }
}

bit_set!(EdgeFlags);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invert_swaps_direction() {
        assert_eq!(EdgeFlags::OUT.invert(), EdgeFlags::IN);
        assert_eq!(EdgeFlags::IN.invert(), EdgeFlags::OUT);
        assert_eq!(EdgeFlags::DIRECTION_MASK.invert(), EdgeFlags::DIRECTION_MASK);
        assert_eq!(EdgeFlags::NONE.invert(), EdgeFlags::NONE);
    }

    #[test]
    fn invert_preserves_other_bits() {
        let flags = EdgeFlags::OUT | EdgeFlags::NO_MERGE | EdgeFlags::MANUAL;
        assert_eq!(
            flags.invert(),
            EdgeFlags::IN | EdgeFlags::NO_MERGE | EdgeFlags::MANUAL
        );
    }

    #[test]
    fn invert_is_an_involution() {
        for bits in 0..=EdgeFlags::ALL.bits() {
            let flags = EdgeFlags::from_bits_truncate(bits);
            assert_eq!(flags.invert().invert(), flags);
        }
    }

    #[test]
    fn null_flags_never_merge() {
        assert!(!EdgeFlags::NULL_FLAGS.is_mergeable());
        assert!(EdgeFlags::DEFAULT_FLAGS.is_mergeable());
        assert!((EdgeFlags::OUT | EdgeFlags::AUTO).is_mergeable());
    }

    #[test]
    fn node_flag_insert_remove() {
        let mut flags = NodeFlags::NONE;
        flags.insert(NodeFlags::MERGE | NodeFlags::SPLIT);
        assert!(flags.contains(NodeFlags::MERGE));
        assert!(flags.intersects(NodeFlags::SPLIT | NodeFlags::INIT));
        flags.remove(NodeFlags::MERGE);
        assert!(!flags.contains(NodeFlags::MERGE));
        assert_eq!(flags, NodeFlags::SPLIT);
    }

    #[test]
    fn not_stays_within_known_bits() {
        assert_eq!(!EdgeFlags::NONE, EdgeFlags::ALL);
        assert_eq!(!NodeFlags::ALL, NodeFlags::NONE);
        assert_eq!(EdgeFlags::from_bits_truncate(0xFF), EdgeFlags::ALL);
    }
}
