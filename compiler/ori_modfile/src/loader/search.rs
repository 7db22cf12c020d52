//! Module file discovery.
//!
//! Candidate paths are generated in priority order and probed one by one;
//! modules registered in memory are consulted before any of them.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::trace;

use crate::{LoadError, LoaderConfig};

/// Bytes of a discovered module file and where they came from.
pub(crate) struct Located {
    pub(crate) data: Arc<[u8]>,
    /// `None` for modules registered in memory.
    pub(crate) path: Option<PathBuf>,
}

/// Paths a module file named `name` may live at, most preferred first.
pub fn module_candidates(config: &LoaderConfig, name: &str) -> Vec<PathBuf> {
    let file_name = format!("{name}.{}", config.extension);
    let mut candidates =
        Vec::with_capacity(config.search_paths.len() + config.framework_paths.len() + 1);
    for dir in &config.search_paths {
        candidates.push(dir.join(&file_name));
    }
    for dir in &config.framework_paths {
        candidates.push(
            dir.join(format!("{name}.framework"))
                .join("Modules")
                .join(&file_name),
        );
    }
    if let Some(dir) = &config.runtime_path {
        candidates.push(dir.join(&file_name));
    }
    candidates
}

/// Find and read the module file for `name`.
pub(crate) fn locate_module(
    config: &LoaderConfig,
    name: &str,
) -> Result<Option<Located>, LoadError> {
    if let Some(data) = config.memory_modules.get(name) {
        trace!(module = name, "using in-memory module file");
        return Ok(Some(Located {
            data: Arc::clone(data),
            path: None,
        }));
    }
    for path in module_candidates(config, name) {
        if !path.is_file() {
            continue;
        }
        trace!(module = name, path = %path.display(), "found module file");
        let data = read_file(&path)?;
        return Ok(Some(Located {
            data,
            path: Some(path),
        }));
    }
    Ok(None)
}

/// Companion documentation file of the module file at `module_path`.
pub(crate) fn doc_path(config: &LoaderConfig, module_path: &Path) -> Option<PathBuf> {
    let path = module_path.with_extension(&config.doc_extension);
    path.is_file().then_some(path)
}

pub(crate) fn read_file(path: &Path) -> Result<Arc<[u8]>, LoadError> {
    std::fs::read(path)
        .map(Arc::from)
        .map_err(|e| LoadError::Io {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
}
