//! ID newtypes for IR entities.
//!
//! Module-level ids ([`FuncId`], [`GlobalId`], [`VTableId`],
//! [`WitnessTableId`]) index arenas in [`TirModule`](crate::TirModule).
//! Function-level ids ([`BlockId`], [`ValueId`]) index arenas in a
//! [`FunctionBody`](crate::FunctionBody).

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
                Self(len as u32)
            }
        }
    };
}

define_id! {
    /// An IR function.
    FuncId
}

define_id! {
    /// An IR global variable.
    GlobalId
}

define_id! {
    /// A class vtable.
    VTableId
}

define_id! {
    /// A protocol witness table.
    WitnessTableId
}

define_id! {
    /// A basic block within one function body.
    BlockId
}

define_id! {
    /// An SSA value within one function body.
    ValueId
}
