//! Binding resolved addresses to the module contract.
//!
//! This is the only place where a symbol address is reinterpreted. Entry
//! points become [`ModuleFn`] with the fixed [`ModuleEntryFn`] signature and
//! the name is copied out of the module's memory at once, so nothing keeps
//! pointing into a module after it is closed.

use std::ffi::{CStr, c_int, c_void};

use micromod_abi::ModuleEntryFn;

use crate::adapter::SymbolAddr;

/// Opaque argument handed to a module's init and exit functions.
///
/// The registry never dereferences it. What it points to, and whether it may
/// be null, is agreed between the host and its modules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleArg(*mut c_void);

impl ModuleArg {
    /// A null argument.
    #[must_use]
    pub const fn null() -> Self {
        Self(std::ptr::null_mut())
    }

    /// Wraps a raw pointer.
    #[must_use]
    pub const fn new(ptr: *mut c_void) -> Self {
        Self(ptr)
    }

    /// Points the argument at `value`.
    ///
    /// The caller must keep `value` alive for as long as modules may use the
    /// pointer.
    #[must_use]
    pub fn from_mut<T>(value: &mut T) -> Self {
        Self(std::ptr::from_mut(value).cast())
    }

    /// Returns the raw pointer.
    #[must_use]
    pub const fn as_ptr(self) -> *mut c_void {
        self.0
    }
}

impl Default for ModuleArg {
    fn default() -> Self {
        Self::null()
    }
}

/// A module init or exit function.
///
/// Only ever stored next to the object it was resolved from, and only called
/// while that object is open.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ModuleFn(ModuleEntryFn);

impl ModuleFn {
    /// Binds a resolved address to the entry point signature.
    ///
    /// # Safety
    ///
    /// `addr` must be the address of a function with the [`ModuleEntryFn`]
    /// signature, and the object it was resolved from must stay open for as
    /// long as the returned value is called.
    pub(crate) unsafe fn bind(addr: SymbolAddr) -> Self {
        // SAFETY: guaranteed by the caller.
        Self(unsafe { std::mem::transmute::<*mut c_void, ModuleEntryFn>(addr.as_ptr()) })
    }

    /// Calls the entry point and returns its status.
    pub(crate) fn call(self, arg: ModuleArg) -> c_int {
        // SAFETY: `bind` requires the signature to match and the owning object
        // to be open.
        unsafe { (self.0)(arg.as_ptr()) }
    }
}

/// Copies the NUL-terminated module name at `addr`.
///
/// Invalid UTF-8 is replaced so the name can key the registry.
///
/// # Safety
///
/// `addr` must point to a NUL-terminated byte string inside an open object.
pub(crate) unsafe fn read_name(addr: SymbolAddr) -> String {
    // SAFETY: guaranteed by the caller.
    unsafe { CStr::from_ptr(addr.as_ptr().cast()) }
        .to_string_lossy()
        .into_owned()
}
