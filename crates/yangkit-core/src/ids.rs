//! Index types for arena storage.
//!
//! Using `NonZeroU32` enables `Option<T>` niche optimization (no extra space),
//! which matters for the sibling half-ring where every node carries four
//! optional links.

use core::num::NonZeroU32;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        pub struct $name(NonZeroU32);

        impl $name {
            /// Create from a raw index (1-based).
            #[must_use]
            pub const fn from_raw(raw: u32) -> Option<Self> {
                match NonZeroU32::new(raw) {
                    Some(n) => Some(Self(n)),
                    None => None,
                }
            }

            /// Create from a 0-based index.
            #[must_use]
            pub fn from_index(index: usize) -> Option<Self> {
                let raw = (index + 1) as u32;
                Self::from_raw(raw)
            }

            /// Get the raw value (1-based).
            #[must_use]
            pub const fn to_raw(self) -> u32 {
                self.0.get()
            }

            /// Get the 0-based index.
            #[must_use]
            pub const fn to_index(self) -> usize {
                (self.0.get() - 1) as usize
            }
        }
    };
}

define_id!(
    /// Interned string identifier. Equality of two `StrId`s is equality of
    /// the strings they name; the dictionary guarantees canonicalization.
    StrId
);

define_id!(
    /// XML element identifier within an [`XmlDoc`](crate::xml::XmlDoc) arena.
    ElemId
);

define_id!(
    /// Module identifier within a context.
    ModuleId
);

define_id!(
    /// Submodule identifier within a context.
    SubmoduleId
);

define_id!(
    /// Schema node identifier within a module's node arena.
    NodeId
);

define_id!(
    /// Typedef identifier within a typedef table.
    TpdfId
);

define_id!(
    /// Identity identifier within a module's identity table.
    IdentId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_raw_zero() {
        assert!(NodeId::from_raw(0).is_none());
    }

    #[test]
    fn test_from_index_round_trip() {
        let id = ElemId::from_index(0).unwrap();
        assert_eq!(id.to_raw(), 1);
        assert_eq!(id.to_index(), 0);

        let id = ElemId::from_index(41).unwrap();
        assert_eq!(id.to_index(), 41);
    }

    #[test]
    fn test_option_size() {
        // Option<NodeId> should be the same size as NodeId due to niche optimization
        assert_eq!(
            core::mem::size_of::<Option<NodeId>>(),
            core::mem::size_of::<NodeId>()
        );
    }
}
