//! C ABI contract between a micromod host and its loadable modules.
//!
//! A module is an ordinary shared library that exports three symbols:
//!
//! - a NUL-terminated byte string holding the module name, used by the host
//!   as the registry key
//! - an init function, called after the module has been registered
//! - an exit function, called before the module is unloaded
//!
//! Both functions share the [`ModuleEntryFn`] signature: they receive the
//! opaque argument the host passed to the load/unload call and return a
//! status, where [`STATUS_OK`] means success and anything else is reported to
//! the host verbatim.
//!
//! The symbol names are chosen by the host. The defaults below are the ones
//! [`declare_module!`] exports, so a Rust plugin and a host built with the
//! default configuration agree without further setup.
//!
//! # Writing a module in Rust
//!
//! ```ignore
//! use std::ffi::{c_int, c_void};
//!
//! fn init(_arg: *mut c_void) -> c_int {
//!     println!("hello");
//!     micromod_abi::STATUS_OK
//! }
//!
//! fn exit(_arg: *mut c_void) -> c_int {
//!     println!("bye");
//!     micromod_abi::STATUS_OK
//! }
//!
//! micromod_abi::declare_module!(name: "hello", init: init, exit: exit);
//! ```
//!
//! Build the crate with `crate-type = ["cdylib"]`.

use std::ffi::{c_int, c_void};

/// Signature shared by a module's init and exit functions.
pub type ModuleEntryFn = unsafe extern "C" fn(arg: *mut c_void) -> c_int;

/// Status returned by an entry function that completed successfully.
pub const STATUS_OK: c_int = 0;

/// Default symbol under which a module exports its name.
pub const DEFAULT_NAME_SYMBOL: &str = "micro_module_name";

/// Default symbol under which a module exports its init function.
pub const DEFAULT_INIT_SYMBOL: &str = "micro_module_init";

/// Default symbol under which a module exports its exit function.
pub const DEFAULT_EXIT_SYMBOL: &str = "micro_module_exit";

/// Copies `name` into a NUL-terminated byte array at compile time.
///
/// Used by [`declare_module!`] to build the exported name symbol. `N` must be
/// `name.len() + 1`; any other length fails const evaluation.
#[doc(hidden)]
#[must_use]
pub const fn nul_terminated<const N: usize>(name: &str) -> [u8; N] {
    let bytes = name.as_bytes();
    assert!(bytes.len() + 1 == N, "buffer must hold the name plus a NUL");

    let mut out = [0u8; N];
    let mut i = 0;
    while i < bytes.len() {
        assert!(bytes[i] != 0, "module name must not contain NUL bytes");
        out[i] = bytes[i];
        i += 1;
    }
    out
}

/// Emits the three module exports under the default symbol names.
///
/// `init` and `exit` are plain Rust functions of type
/// `fn(*mut c_void) -> c_int`. The macro wraps them in `extern "C"`
/// trampolines named [`DEFAULT_INIT_SYMBOL`] and [`DEFAULT_EXIT_SYMBOL`] and
/// exports `name` as [`DEFAULT_NAME_SYMBOL`].
///
/// Hosts configured with custom symbol names need modules that export those
/// names by hand.
#[macro_export]
macro_rules! declare_module {
    (name: $name:expr, init: $init:path, exit: $exit:path $(,)?) => {
        #[unsafe(no_mangle)]
        pub static micro_module_name: [u8; $name.len() + 1] =
            $crate::nul_terminated::<{ $name.len() + 1 }>($name);

        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn micro_module_init(
            arg: *mut ::std::ffi::c_void,
        ) -> ::std::ffi::c_int {
            $init(arg)
        }

        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn micro_module_exit(
            arg: *mut ::std::ffi::c_void,
        ) -> ::std::ffi::c_int {
            $exit(arg)
        }
    };
}
