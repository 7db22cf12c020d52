//! Ori module files.
//!
//! A module file is the compiled form of one module: its declarations,
//! types, conformances and, optionally, IR. Later compilations load it
//! instead of re-checking the module's source.
//!
//! # Architecture
//!
//! - **Writer** (`writer/`): flattens a module of a [`SemaContext`] and its
//!   IR into a bitstream container
//! - **Module file** (`module_file.rs`): validates a container and parks a
//!   cursor in each lazily read block
//! - **Reader** (`reader/`): decodes single entities on demand, preserving
//!   identity across cyclic graphs
//! - **Loader** (`loader/`): discovery, dependency loading and the lookup
//!   API
//! - **Docs** (`doc.rs`): companion files with brief comments
//!
//! # Debugging
//!
//! - `RUST_LOG=ori_modfile=debug`: section-level events (files opened,
//!   modules loaded, bodies read)
//! - `RUST_LOG=ori_modfile=trace`: per-record events
//!
//! [`SemaContext`]: ori_sema::SemaContext

mod config;
mod diagnostic;
mod doc;
mod error;
pub mod format;
mod id_table;
mod loader;
mod module_file;
pub mod name_index;
pub mod on_disk_table;
mod reader;
mod writer;

pub use config::{IrBodies, LoaderConfig, WriterOptions};
pub use diagnostic::{ErrorCode, LoadDiagnostic};
pub use doc::{brief_of, serialize_module_doc, DocFile};
pub use error::{IrError, LoadError, SerializeError, TableError};
pub use loader::search::module_candidates;
pub use loader::{ModuleHandle, ModuleLoader};
pub use module_file::{FileStatus, ImportInfo, IndexKind, ModuleFile};
pub use name_index::IndexEntry;
pub use writer::{serialize_module, serialize_module_with_ir, write_module_to_path};

use std::sync::Once;

static TRACING_INIT: Once = Once::new();

/// Install a tracing subscriber filtered by `RUST_LOG`.
///
/// Does nothing unless `RUST_LOG` is set. Safe to call more than once.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        if std::env::var("RUST_LOG").is_ok() {
            tracing_subscriber::registry()
                .with(fmt::layer().with_target(true).with_level(true))
                .with(EnvFilter::from_default_env())
                .init();
        }
    });
}

/// Stack left before [`ensure_sufficient_stack`] grows it.
#[cfg(not(target_arch = "wasm32"))]
const RED_ZONE: usize = 100 * 1024;

/// Size of each new stack segment.
#[cfg(not(target_arch = "wasm32"))]
const STACK_PER_RECURSION: usize = 1024 * 1024;

/// Run `f`, first growing the stack if little of it is left. Reading a
/// declaration recurses through its context, its types and their
/// declarations, so deep nesting in a file becomes deep recursion.
#[inline]
#[cfg(not(target_arch = "wasm32"))]
pub(crate) fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(RED_ZONE, STACK_PER_RECURSION, f)
}

#[inline]
#[cfg(target_arch = "wasm32")]
pub(crate) fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    f()
}
