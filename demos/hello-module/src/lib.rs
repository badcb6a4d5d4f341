//! Sample module.
//!
//! Build it and point the host at a directory holding only the library:
//!
//! ```bash
//! cargo build -p hello-module
//! mkdir -p modules && cp target/debug/libhello_module.so modules/
//! micromod run modules
//! ```
//!
//! When the host passes a non-null argument it must point to a `c_int`;
//! init increments it and exit decrements it.

use std::ffi::{c_int, c_void};

use micromod_abi::STATUS_OK;

/// Name the module registers under.
pub const NAME: &str = "hello_module";

fn counter<'a>(arg: *mut c_void) -> Option<&'a mut c_int> {
    // SAFETY: hosts of this module pass null or a valid `c_int`.
    unsafe { arg.cast::<c_int>().as_mut() }
}

fn init(arg: *mut c_void) -> c_int {
    println!("Hello from {NAME}");
    if let Some(count) = counter(arg) {
        *count += 1;
    }
    STATUS_OK
}

fn exit(arg: *mut c_void) -> c_int {
    println!("Bye from {NAME}");
    if let Some(count) = counter(arg) {
        *count -= 1;
    }
    STATUS_OK
}

micromod_abi::declare_module!(name: NAME, init: init, exit: exit);
