//! Error taxonomy shared by every registry operation.

use std::{ffi::c_int, path::PathBuf};

/// Errors returned by the load/unload protocol.
///
/// Every variant has a stable numeric [`code`](ModuleError::code). The
/// negative codes are fixed so that C hosts can switch on them; plugin
/// statuses are passed through untouched.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ModuleError {
    /// The registry handle was null.
    #[error("registry handle is null")]
    IsNull,

    /// A required argument was missing.
    #[error("required argument is missing: {0}")]
    ArgNull(&'static str),

    /// The modules directory could not be opened for scanning.
    #[error("failed to open modules directory {}: {reason}", path.display())]
    OpenModulesDir { path: PathBuf, reason: String },

    /// Releasing the directory scan failed.
    #[error("failed to close modules directory {}: {reason}", path.display())]
    CloseModulesDir { path: PathBuf, reason: String },

    /// The module does not export the init symbol.
    #[error("module {} does not export init symbol `{symbol}`", path.display())]
    LocatingInitSymbol { path: PathBuf, symbol: String },

    /// The module does not export the exit symbol.
    #[error("module {} does not export exit symbol `{symbol}`", path.display())]
    LocatingExitSymbol { path: PathBuf, symbol: String },

    /// The module does not export the name symbol.
    #[error("module {} does not export name symbol `{symbol}`", path.display())]
    LocatingNameSymbol { path: PathBuf, symbol: String },

    /// The dynamic loader refused to open the module.
    #[error("failed to open module {}: {reason}", path.display())]
    OpeningModule { path: PathBuf, reason: String },

    /// The dynamic loader failed to close a module handle.
    #[error("failed to close module `{name}`: {reason}")]
    ClosingModule { name: String, reason: String },

    /// The registry could not grow to hold another module.
    #[error("failed to allocate registry storage")]
    AllocatingMemory,

    /// No module with this name is registered.
    #[error("module not registered: {0}")]
    NotRegistered(String),

    /// The module's init function returned a non-zero status.
    ///
    /// The module stays registered.
    #[error("module `{name}` init returned status {status}")]
    InitFailed { name: String, status: c_int },

    /// The module's exit function returned a non-zero status.
    ///
    /// The module has already been unloaded.
    #[error("module `{name}` exit returned status {status}")]
    ExitFailed { name: String, status: c_int },
}

impl ModuleError {
    /// Numeric code of this error.
    ///
    /// Plugin failures return the plugin's own status.
    #[must_use]
    pub fn code(&self) -> c_int {
        match self {
            Self::IsNull => -1,
            Self::OpenModulesDir { .. } => -2,
            Self::CloseModulesDir { .. } => -3,
            Self::LocatingInitSymbol { .. } => -4,
            Self::LocatingExitSymbol { .. } => -5,
            Self::LocatingNameSymbol { .. } => -6,
            Self::OpeningModule { .. } => -7,
            Self::ClosingModule { .. } => -8,
            Self::AllocatingMemory => -9,
            Self::NotRegistered(_) => -10,
            Self::ArgNull(_) => -11,
            Self::InitFailed { status, .. } | Self::ExitFailed { status, .. } => *status,
        }
    }
}
