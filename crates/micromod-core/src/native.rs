//! [`DynamicLoader`] backed by the platform's `dl*` functions.
//!
//! On glibc Linux modules are opened with `dlmopen`, which can place each
//! module into a fresh link-map namespace. Other unix targets have no
//! equivalent and fall back to `dlopen`; isolation requests are logged and
//! ignored there.

use std::{
    ffi::{CStr, CString, c_int, c_void},
    os::unix::ffi::OsStrExt,
    path::{Path, PathBuf},
    ptr::NonNull,
};

use tracing::{debug, warn};

use crate::adapter::{AdapterError, DynamicLoader, LoadedObject, SymbolAddr};

const OPEN_FLAGS: c_int = libc::RTLD_LAZY | libc::RTLD_LOCAL;

#[cfg(all(target_os = "linux", target_env = "gnu"))]
mod link_map {
    use std::ffi::{c_char, c_int, c_long, c_void};

    /// Caller's own namespace.
    pub(super) const LM_ID_BASE: c_long = 0;
    /// A namespace created for this call.
    pub(super) const LM_ID_NEWLM: c_long = -1;

    unsafe extern "C" {
        pub(super) fn dlmopen(lmid: c_long, filename: *const c_char, flags: c_int)
        -> *mut c_void;
    }
}

/// Loader using `dlmopen`/`dlopen`, `dlsym` and `dlclose`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeLoader;

impl NativeLoader {
    /// Creates a native loader.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl DynamicLoader for NativeLoader {
    type Object = NativeObject;

    fn open(&self, path: &Path, isolate: bool) -> Result<NativeObject, AdapterError> {
        let c_path = CString::new(path.as_os_str().as_bytes()).map_err(|_| {
            AdapterError::Open(format!("{}: path contains a NUL byte", path.display()))
        })?;

        // SAFETY: `c_path` is a valid NUL-terminated string for the whole call.
        let raw = unsafe { open_raw(&c_path, isolate) };
        let handle = NonNull::new(raw).ok_or_else(|| AdapterError::Open(last_error()))?;

        debug!(path = %path.display(), isolate, "Opened shared object");
        Ok(NativeObject {
            handle,
            path: path.to_path_buf(),
            open: true,
        })
    }
}

#[cfg(all(target_os = "linux", target_env = "gnu"))]
unsafe fn open_raw(path: &CStr, isolate: bool) -> *mut c_void {
    let namespace = if isolate {
        link_map::LM_ID_NEWLM
    } else {
        link_map::LM_ID_BASE
    };
    // SAFETY: forwarded from the caller.
    unsafe { link_map::dlmopen(namespace, path.as_ptr(), OPEN_FLAGS) }
}

#[cfg(not(all(target_os = "linux", target_env = "gnu")))]
unsafe fn open_raw(path: &CStr, isolate: bool) -> *mut c_void {
    if isolate {
        warn!("Namespace isolation is not available on this platform");
    }
    // SAFETY: forwarded from the caller.
    unsafe { libc::dlopen(path.as_ptr(), OPEN_FLAGS) }
}

/// Reads and clears the thread's last `dl*` error.
fn last_error() -> String {
    // SAFETY: `dlerror` returns null or a NUL-terminated string that stays
    // valid until the next `dl*` call on this thread; it is copied at once.
    let message = unsafe { libc::dlerror() };
    if message.is_null() {
        return "unknown dynamic loader error".to_string();
    }
    // SAFETY: checked non-null above.
    unsafe { CStr::from_ptr(message) }
        .to_string_lossy()
        .into_owned()
}

/// A shared object opened by [`NativeLoader`].
///
/// Dropping an object that was never closed releases it, ignoring failures.
#[derive(Debug)]
pub struct NativeObject {
    handle: NonNull<c_void>,
    path: PathBuf,
    open: bool,
}

// SAFETY: `dl*` handles are process-wide and may be used from any thread.
unsafe impl Send for NativeObject {}

impl NativeObject {
    /// Path the object was opened from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LoadedObject for NativeObject {
    fn resolve(&self, symbol: &CStr) -> Result<SymbolAddr, AdapterError> {
        // Clear any stale error so a null result can be attributed to this
        // lookup.
        let _ = last_error();
        // SAFETY: the handle is open and `symbol` is NUL-terminated.
        let raw = unsafe { libc::dlsym(self.handle.as_ptr(), symbol.as_ptr()) };
        SymbolAddr::new(raw)
            .ok_or_else(|| AdapterError::SymbolNotFound(symbol.to_string_lossy().into_owned()))
    }

    fn close(&mut self) -> Result<(), AdapterError> {
        if !self.open {
            return Ok(());
        }
        // SAFETY: the handle came from `dlmopen`/`dlopen` and has not been
        // closed successfully yet.
        if unsafe { libc::dlclose(self.handle.as_ptr()) } != 0 {
            return Err(AdapterError::Close(last_error()));
        }
        self.open = false;
        debug!(path = %self.path.display(), "Closed shared object");
        Ok(())
    }
}

impl Drop for NativeObject {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(path = %self.path.display(), error = %err, "Failed to release shared object");
        }
    }
}
