//! User-facing diagnostics for load failures.
//!
//! Module-file errors use the `E7xxx` range:
//!
//! | Code  | Error |
//! |-------|-------|
//! | E7001 | malformed module file |
//! | E7002 | format too new |
//! | E7003 | format too old |
//! | E7004 | missing dependency |
//! | E7005 | missing shadowed module |
//! | E7006 | module not found |
//! | E7007 | module not loaded |
//! | E7008 | I/O failure |

use std::fmt;
use std::path::{Path, PathBuf};

use crate::LoadError;

/// Error code of a module-file diagnostic.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum ErrorCode {
    /// Malformed module file
    E7001,
    /// Module file format too new
    E7002,
    /// Module file format too old
    E7003,
    /// Missing dependency
    E7004,
    /// Missing shadowed module
    E7005,
    /// Module not found
    E7006,
    /// Module not loaded
    E7007,
    /// I/O failure
    E7008,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::E7001 => "E7001",
            ErrorCode::E7002 => "E7002",
            ErrorCode::E7003 => "E7003",
            ErrorCode::E7004 => "E7004",
            ErrorCode::E7005 => "E7005",
            ErrorCode::E7006 => "E7006",
            ErrorCode::E7007 => "E7007",
            ErrorCode::E7008 => "E7008",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A load failure rendered for the user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadDiagnostic {
    pub code: ErrorCode,
    pub message: String,
    /// File the diagnostic is about, if known.
    pub path: Option<PathBuf>,
    pub notes: Vec<String>,
}

impl fmt::Display for LoadDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "error[{}]: {}", self.code, self.message)?;
        if let Some(path) = &self.path {
            write!(f, "\n  --> {}", path.display())?;
        }
        for note in &self.notes {
            write!(f, "\n  = note: {note}")?;
        }
        Ok(())
    }
}

impl LoadError {
    /// The diagnostic code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            LoadError::Malformed { .. } => ErrorCode::E7001,
            LoadError::FormatTooNew { .. } => ErrorCode::E7002,
            LoadError::FormatTooOld { .. } => ErrorCode::E7003,
            LoadError::MissingDependency { .. } => ErrorCode::E7004,
            LoadError::MissingShadowedModule { .. } => ErrorCode::E7005,
            LoadError::NotFound { .. } => ErrorCode::E7006,
            LoadError::NotLoaded { .. } => ErrorCode::E7007,
            LoadError::Io { .. } => ErrorCode::E7008,
        }
    }

    /// Render this error for the user. Several missing dependencies are
    /// reported in one message.
    pub fn diagnostic(&self, path: Option<&Path>) -> LoadDiagnostic {
        let mut notes = Vec::new();
        let message = match self {
            LoadError::MissingDependency { module, missing } => {
                notes.push(format!("required by module `{module}`"));
                match missing.as_slice() {
                    [one] => format!("missing required module `{one}`"),
                    many => format!(
                        "missing required modules: {}",
                        many.iter()
                            .map(|m| format!("`{m}`"))
                            .collect::<Vec<_>>()
                            .join(", ")
                    ),
                }
            }
            LoadError::FormatTooNew { major, minor } => {
                notes.push("the module was built by a newer compiler".to_owned());
                format!("module file format {major}.{minor} is too new")
            }
            LoadError::FormatTooOld { major, minor } => {
                notes.push("rebuild the module with this compiler".to_owned());
                format!("module file format {major}.{minor} is too old")
            }
            other => other.to_string(),
        };
        let path = match self {
            LoadError::Io { path, .. } => Some(path.clone()),
            _ => path.map(Path::to_path_buf),
        };
        LoadDiagnostic {
            code: self.code(),
            message,
            path,
            notes,
        }
    }
}

#[cfg(test)]
mod tests;
