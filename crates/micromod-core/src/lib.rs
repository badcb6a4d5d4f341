//! Runtime loader for micromod plugin modules.
//!
//! A module is a shared object exporting three symbols: a NUL-terminated
//! name, an init function and an exit function (see [`micromod_abi`]). This
//! crate opens modules, binds those exports and keeps the loaded modules in
//! a [`ModuleRegistry`] keyed by name.
//!
//! # Key Components
//!
//! - **Configuration**: [`LoaderConfig`] fixes the symbol names and the
//!   namespace isolation policy; [`HostConfig`] reads it from `micromod.toml`
//! - **Registry**: [`ModuleRegistry`] owns every loaded module and drives the
//!   load/unload protocol
//! - **Adapters**: [`DynamicLoader`] and [`DirectoryScanner`] abstract the
//!   platform loader and directory listing; [`NativeLoader`] and
//!   [`WalkDirScanner`] are the real implementations
//!
//! # Example
//!
//! ```no_run
//! use micromod_core::{LoaderConfig, ModuleArg, ModuleRegistry};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut registry = ModuleRegistry::new(LoaderConfig::default());
//!
//! let loaded = registry.load_all("./modules", ModuleArg::null())?;
//! println!("loaded {loaded} modules: {:?}", registry.names());
//!
//! registry.unload_all(ModuleArg::null())?;
//! # Ok(())
//! # }
//! ```
//!
//! # Thread Safety
//!
//! [`ModuleRegistry`] takes `&mut self` for every mutation and does no
//! locking of its own. Wrap it in a `Mutex` to share it between threads.

mod adapter;
mod config;
mod error;
mod loader;
#[cfg(unix)]
mod native;
mod registry;
mod scanner;
mod symbol;

#[cfg(test)]
mod testing;

/// Platform loader seams.
pub use adapter::{AdapterError, DynamicLoader, LoadedObject, SymbolAddr};

/// Loader and host configuration.
pub use config::{CONFIG_FILE_NAME, CONFIG_PATH_ENV, ConfigError, HostConfig, LoaderConfig};

/// Error taxonomy and C status codes.
pub use error::ModuleError;

#[cfg(unix)]
pub use native::{NativeLoader, NativeObject};

pub use registry::{ModuleEntry, ModuleRegistry};

/// Directory scanning.
pub use scanner::{
    DirEntry, DirectoryScan, DirectoryScanner, EntryKind, ScanError, WalkDirScan, WalkDirScanner,
};

pub use symbol::ModuleArg;

/// Registry backed by the platform's dynamic loader.
#[cfg(unix)]
pub type NativeRegistry = ModuleRegistry<NativeLoader>;
