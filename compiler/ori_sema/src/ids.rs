//! Dense arena indices for semantic entities.
//!
//! Every entity lives in a `Vec` owned by [`SemaContext`](crate::SemaContext)
//! and is referred to by a 32-bit index. Indices are 0-based in memory; the
//! module-file format adds one when it writes them so that 0 can mean
//! "absent" on disk.

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
        #[repr(transparent)]
        pub struct $name(u32);

        impl $name {
            /// Create an ID from a raw index.
            #[inline]
            pub fn new(raw: u32) -> Self {
                Self(raw)
            }

            /// Get the raw `u32` value.
            #[inline]
            pub fn raw(self) -> u32 {
                self.0
            }

            /// Get the index as `usize` (for indexing into `Vec`s).
            #[inline]
            pub fn index(self) -> usize {
                self.0 as usize
            }

            #[inline]
            pub(crate) fn from_len(len: usize) -> Self {
                // Arena sizes are bounded far below u32::MAX by the file
                // format's 32-bit ids.
                Self(len as u32)
            }
        }
    };
}

define_id! {
    /// A module known to a [`SemaContext`](crate::SemaContext).
    ModuleId
}

define_id! {
    /// A declaration in the context's declaration arena.
    DeclId
}

define_id! {
    /// A type in the context's type arena.
    ///
    /// Structural types are hash-consed, so equal `TypeId`s mean equal
    /// types. Archetypes are the exception: each allocation is distinct.
    TypeId
}

define_id! {
    /// A protocol conformance in the context's conformance arena.
    ConformanceId
}
