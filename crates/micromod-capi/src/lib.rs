//! C ABI for the module registry.
//!
//! A C host creates a registry with [`micromod_setup`], drives it with the
//! load/unload calls and releases it with [`micromod_destroy`]. Every call
//! returns [`MICROMOD_OK`] or a `MICROMOD_ERROR_*` code; a module's own init
//! or exit status is returned unchanged.
//!
//! ```c
//! MicroModule *mm = micromod_setup("micro_module_name",
//!                                  "micro_module_init",
//!                                  "micro_module_exit",
//!                                  true);
//! assert(micromod_load_all(mm, "./modules", NULL) == MICROMOD_OK);
//! assert(micromod_unload(mm, "example_module1", NULL) == MICROMOD_OK);
//! micromod_destroy(mm);
//! ```
#![cfg(unix)]

use std::{
    ffi::{CStr, OsStr, c_char, c_int, c_void},
    os::unix::ffi::OsStrExt,
    path::Path,
};

use micromod_abi::STATUS_OK;
use micromod_core::{LoaderConfig, ModuleArg, ModuleError, NativeRegistry};
use tracing::debug;

pub const MICROMOD_OK: c_int = STATUS_OK;
pub const MICROMOD_ERROR_IS_NULL: c_int = -1;
pub const MICROMOD_ERROR_OPEN_MODULES_DIR: c_int = -2;
pub const MICROMOD_ERROR_CLOSE_MODULES_DIR: c_int = -3;
pub const MICROMOD_ERROR_LOCATING_INIT_SYMBOL: c_int = -4;
pub const MICROMOD_ERROR_LOCATING_EXIT_SYMBOL: c_int = -5;
pub const MICROMOD_ERROR_LOCATING_NAME_SYMBOL: c_int = -6;
pub const MICROMOD_ERROR_OPENING_MODULE: c_int = -7;
pub const MICROMOD_ERROR_CLOSING_MODULE: c_int = -8;
pub const MICROMOD_ERROR_ALLOCATING_MEMORY: c_int = -9;
pub const MICROMOD_ERROR_NOT_REGISTERED: c_int = -10;
pub const MICROMOD_ERROR_ARG_NULL: c_int = -11;

/// Opaque registry handle owned by the C host.
pub struct MicroModule {
    registry: NativeRegistry,
}

fn status(result: Result<(), ModuleError>) -> c_int {
    match result {
        Ok(()) => MICROMOD_OK,
        Err(err) => {
            debug!(error = %err, code = err.code(), "Registry call failed");
            err.code()
        }
    }
}

/// Borrows the registry behind `mm`, or reports a null handle.
///
/// # Safety
///
/// `mm` must be null or a live pointer returned by [`micromod_setup`].
unsafe fn registry<'a>(mm: *mut MicroModule) -> Result<&'a mut NativeRegistry, ModuleError> {
    // SAFETY: guaranteed by the caller.
    unsafe { mm.as_mut() }
        .map(|mm| &mut mm.registry)
        .ok_or(ModuleError::IsNull)
}

/// # Safety
///
/// `ptr` must be null or point to a NUL-terminated string that outlives
/// `'a`.
unsafe fn c_str<'a>(ptr: *const c_char, what: &'static str) -> Result<&'a CStr, ModuleError> {
    if ptr.is_null() {
        return Err(ModuleError::ArgNull(what));
    }
    // SAFETY: non-null and NUL-terminated per the caller.
    Ok(unsafe { CStr::from_ptr(ptr) })
}

fn c_path(path: &CStr) -> &Path {
    Path::new(OsStr::from_bytes(path.to_bytes()))
}

/// Creates a registry.
///
/// Modules export their name under `name_symbol` and their entry points
/// under `init_symbol` and `exit_symbol`. With `use_new_namespace` every
/// module is opened into its own symbol namespace.
///
/// Returns null if a symbol is null, empty or not valid UTF-8.
///
/// # Safety
///
/// Each symbol must be null or a NUL-terminated string. The strings are
/// copied and need not outlive the call.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn micromod_setup(
    name_symbol: *const c_char,
    init_symbol: *const c_char,
    exit_symbol: *const c_char,
    use_new_namespace: bool,
) -> *mut MicroModule {
    // SAFETY: forwarded from the caller.
    let symbols = unsafe {
        (
            c_str(name_symbol, "name symbol"),
            c_str(init_symbol, "init symbol"),
            c_str(exit_symbol, "exit symbol"),
        )
    };
    let (Ok(name), Ok(init), Ok(exit)) = symbols else {
        return std::ptr::null_mut();
    };
    let (Ok(name), Ok(init), Ok(exit)) = (name.to_str(), init.to_str(), exit.to_str()) else {
        return std::ptr::null_mut();
    };

    match LoaderConfig::new(name, init, exit, use_new_namespace) {
        Ok(config) => Box::into_raw(Box::new(MicroModule {
            registry: NativeRegistry::new(config),
        })),
        Err(err) => {
            debug!(error = %err, "Rejected loader configuration");
            std::ptr::null_mut()
        }
    }
}

/// Loads and initializes the module at `filename`, passing `arg` to its
/// init function. A loaded module with the same name is unloaded first.
///
/// # Safety
///
/// `mm` must be null or a live handle from [`micromod_setup`], `filename`
/// null or a NUL-terminated path.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn micromod_load(
    mm: *mut MicroModule,
    filename: *const c_char,
    arg: *mut c_void,
) -> c_int {
    // SAFETY: forwarded from the caller.
    status(unsafe { registry(mm) }.and_then(|registry| {
        let filename = unsafe { c_str(filename, "filename") }?;
        registry.load(c_path(filename), ModuleArg::new(arg))
    }))
}

/// Loads and initializes every module in `modules_dir`.
///
/// Stops at the first failure; modules loaded before it stay loaded.
///
/// # Safety
///
/// As for [`micromod_load`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn micromod_load_all(
    mm: *mut MicroModule,
    modules_dir: *const c_char,
    arg: *mut c_void,
) -> c_int {
    // SAFETY: forwarded from the caller.
    status(unsafe { registry(mm) }.and_then(|registry| {
        let dir = unsafe { c_str(modules_dir, "modules directory") }?;
        registry
            .load_all(c_path(dir), ModuleArg::new(arg))
            .map(|_| ())
    }))
}

/// Finalizes and unloads the module called `module_name`.
///
/// # Safety
///
/// `mm` must be null or a live handle from [`micromod_setup`],
/// `module_name` null or a NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn micromod_unload(
    mm: *mut MicroModule,
    module_name: *const c_char,
    arg: *mut c_void,
) -> c_int {
    // SAFETY: forwarded from the caller.
    status(unsafe { registry(mm) }.and_then(|registry| {
        let name = unsafe { c_str(module_name, "module name") }?;
        registry.unload(&name.to_string_lossy(), ModuleArg::new(arg))
    }))
}

/// Unloads every module, most recently loaded first.
///
/// # Safety
///
/// `mm` must be null or a live handle from [`micromod_setup`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn micromod_unload_all(mm: *mut MicroModule, arg: *mut c_void) -> c_int {
    // SAFETY: forwarded from the caller.
    status(unsafe { registry(mm) }.and_then(|registry| registry.unload_all(ModuleArg::new(arg))))
}

/// Number of loaded modules, or 0 for a null handle.
///
/// # Safety
///
/// `mm` must be null or a live handle from [`micromod_setup`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn micromod_count(mm: *const MicroModule) -> usize {
    // SAFETY: forwarded from the caller.
    unsafe { mm.as_ref() }.map_or(0, |mm| mm.registry.len())
}

/// Unloads every remaining module with a null argument and frees the
/// handle. Null is ignored.
///
/// # Safety
///
/// `mm` must be null or a live handle from [`micromod_setup`]; it must not
/// be used afterwards.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn micromod_destroy(mm: *mut MicroModule) {
    if !mm.is_null() {
        // SAFETY: allocated by `micromod_setup` and not yet freed.
        drop(unsafe { Box::from_raw(mm) });
    }
}

/// Static description of a status code.
#[unsafe(no_mangle)]
pub extern "C" fn micromod_strerror(code: c_int) -> *const c_char {
    let text: &'static CStr = match code {
        MICROMOD_OK => c"ok",
        MICROMOD_ERROR_IS_NULL => c"registry handle is null",
        MICROMOD_ERROR_OPEN_MODULES_DIR => c"failed to open modules directory",
        MICROMOD_ERROR_CLOSE_MODULES_DIR => c"failed to close modules directory",
        MICROMOD_ERROR_LOCATING_INIT_SYMBOL => c"module does not export init symbol",
        MICROMOD_ERROR_LOCATING_EXIT_SYMBOL => c"module does not export exit symbol",
        MICROMOD_ERROR_LOCATING_NAME_SYMBOL => c"module does not export name symbol",
        MICROMOD_ERROR_OPENING_MODULE => c"failed to open module",
        MICROMOD_ERROR_CLOSING_MODULE => c"failed to close module",
        MICROMOD_ERROR_ALLOCATING_MEMORY => c"failed to allocate registry storage",
        MICROMOD_ERROR_NOT_REGISTERED => c"module not registered",
        MICROMOD_ERROR_ARG_NULL => c"required argument is missing",
        _ => c"module returned an error status",
    };
    text.as_ptr()
}

#[cfg(test)]
mod tests {
    use std::ptr;

    use super::*;

    fn setup() -> *mut MicroModule {
        // SAFETY: static NUL-terminated symbols.
        unsafe {
            micromod_setup(
                c"micro_module_name".as_ptr(),
                c"micro_module_init".as_ptr(),
                c"micro_module_exit".as_ptr(),
                true,
            )
        }
    }

    #[test]
    fn test_null_handle_is_reported_on_every_call() {
        // SAFETY: null handles are accepted.
        unsafe {
            assert_eq!(
                micromod_load(ptr::null_mut(), c"a.so".as_ptr(), ptr::null_mut()),
                MICROMOD_ERROR_IS_NULL
            );
            assert_eq!(
                micromod_load_all(ptr::null_mut(), c"mods".as_ptr(), ptr::null_mut()),
                MICROMOD_ERROR_IS_NULL
            );
            assert_eq!(
                micromod_unload(ptr::null_mut(), c"a".as_ptr(), ptr::null_mut()),
                MICROMOD_ERROR_IS_NULL
            );
            assert_eq!(
                micromod_unload_all(ptr::null_mut(), ptr::null_mut()),
                MICROMOD_ERROR_IS_NULL
            );
            assert_eq!(micromod_count(ptr::null()), 0);
            micromod_destroy(ptr::null_mut());
        }
    }

    #[test]
    fn test_null_arguments_are_arg_null() {
        let mm = setup();
        assert!(!mm.is_null());

        // SAFETY: `mm` is live until destroyed below.
        unsafe {
            assert_eq!(
                micromod_load(mm, ptr::null(), ptr::null_mut()),
                MICROMOD_ERROR_ARG_NULL
            );
            assert_eq!(
                micromod_load_all(mm, ptr::null(), ptr::null_mut()),
                MICROMOD_ERROR_ARG_NULL
            );
            assert_eq!(
                micromod_unload(mm, ptr::null(), ptr::null_mut()),
                MICROMOD_ERROR_ARG_NULL
            );
            micromod_destroy(mm);
        }
    }

    #[test]
    fn test_failures_return_taxonomy_codes() {
        let mm = setup();

        // SAFETY: `mm` is live until destroyed below.
        unsafe {
            assert_eq!(
                micromod_load(mm, c"/nonexistent/micromod/a.so".as_ptr(), ptr::null_mut()),
                MICROMOD_ERROR_OPENING_MODULE
            );
            assert_eq!(
                micromod_load_all(mm, c"/nonexistent/micromod".as_ptr(), ptr::null_mut()),
                MICROMOD_ERROR_OPEN_MODULES_DIR
            );
            assert_eq!(
                micromod_unload(mm, c"a".as_ptr(), ptr::null_mut()),
                MICROMOD_ERROR_NOT_REGISTERED
            );
            assert_eq!(
                micromod_unload(mm, c"".as_ptr(), ptr::null_mut()),
                MICROMOD_ERROR_NOT_REGISTERED
            );
            assert_eq!(micromod_unload_all(mm, ptr::null_mut()), MICROMOD_OK);
            assert_eq!(micromod_count(mm), 0);
            micromod_destroy(mm);
        }
    }

    #[test]
    fn test_setup_rejects_missing_or_empty_symbols() {
        // SAFETY: static strings or null.
        unsafe {
            assert!(
                micromod_setup(
                    ptr::null(),
                    c"init".as_ptr(),
                    c"exit".as_ptr(),
                    false
                )
                .is_null()
            );
            assert!(
                micromod_setup(c"".as_ptr(), c"init".as_ptr(), c"exit".as_ptr(), false)
                    .is_null()
            );
        }
    }

    #[test]
    fn test_codes_agree_with_core_errors() {
        assert_eq!(ModuleError::IsNull.code(), MICROMOD_ERROR_IS_NULL);
        assert_eq!(ModuleError::AllocatingMemory.code(), MICROMOD_ERROR_ALLOCATING_MEMORY);
        assert_eq!(
            ModuleError::NotRegistered(String::new()).code(),
            MICROMOD_ERROR_NOT_REGISTERED
        );
        assert_eq!(ModuleError::ArgNull("x").code(), MICROMOD_ERROR_ARG_NULL);
    }

    #[test]
    fn test_strerror_describes_codes() {
        // SAFETY: `micromod_strerror` returns static NUL-terminated strings.
        let text = |code| unsafe { CStr::from_ptr(micromod_strerror(code)) }.to_str().unwrap();

        assert_eq!(text(MICROMOD_OK), "ok");
        assert_eq!(text(MICROMOD_ERROR_NOT_REGISTERED), "module not registered");
        assert_eq!(text(42), "module returned an error status");
    }
}
