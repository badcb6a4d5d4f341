//! Dynamic loader adapter.
//!
//! The registry never talks to the operating system directly. It opens
//! modules through a [`DynamicLoader`] and resolves/releases them through the
//! [`LoadedObject`] it gets back. [`NativeLoader`](crate::NativeLoader) is the
//! real implementation; tests script their own.

use std::{
    ffi::{CStr, c_void},
    path::Path,
    ptr::NonNull,
};

/// Errors reported by a [`DynamicLoader`] or [`LoadedObject`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum AdapterError {
    /// The shared object could not be opened.
    #[error("{0}")]
    Open(String),

    /// The shared object does not export the requested symbol.
    #[error("symbol `{0}` not found")]
    SymbolNotFound(String),

    /// The shared object could not be closed.
    #[error("{0}")]
    Close(String),
}

/// Non-null address of a resolved symbol.
///
/// The address is only meaningful while the object it was resolved from is
/// open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolAddr(NonNull<c_void>);

impl SymbolAddr {
    /// Wraps a raw symbol address. Returns `None` for a null address.
    #[must_use]
    pub fn new(ptr: *mut c_void) -> Option<Self> {
        NonNull::new(ptr).map(Self)
    }

    /// Returns the raw address.
    #[must_use]
    pub fn as_ptr(self) -> *mut c_void {
        self.0.as_ptr()
    }
}

/// Opens shared objects.
pub trait DynamicLoader {
    /// An open shared object.
    type Object: LoadedObject;

    /// Opens the shared object at `path`.
    ///
    /// With `isolate` set the object is opened into a fresh symbol namespace;
    /// otherwise it shares the caller's default namespace.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Open`] if the object cannot be opened.
    fn open(&self, path: &Path, isolate: bool) -> Result<Self::Object, AdapterError>;
}

/// An open shared object.
///
/// Objects are move-only: exactly one owner may resolve symbols from it and
/// close it.
pub trait LoadedObject {
    /// Resolves `symbol` to its address.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::SymbolNotFound`] if the object does not export
    /// `symbol`.
    fn resolve(&self, symbol: &CStr) -> Result<SymbolAddr, AdapterError>;

    /// Closes the object.
    ///
    /// A successful close invalidates every address resolved from this
    /// object and turns later calls into no-ops. After a failed close the
    /// object still owns its handle.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Close`] if the loader refuses to release the
    /// object.
    fn close(&mut self) -> Result<(), AdapterError>;
}
