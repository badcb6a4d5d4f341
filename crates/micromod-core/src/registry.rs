//! Module registry.
//!
//! The registry owns every loaded module. Each [`ModuleEntry`] pairs the
//! module's name and entry points with the open object they were resolved
//! from; the object is closed exactly once, when the entry is replaced or
//! removed.
//!
//! # Ordering
//!
//! Entries are keyed by name. Iteration order is most-recently-inserted
//! first, which is the order [`ModuleRegistry::unload_all`] tears modules
//! down in.
//!
//! # Thread Safety
//!
//! A registry has no internal locking. Hosts sharing one across threads must
//! serialize every call themselves, for example by wrapping it in a
//! `Mutex`.

use std::{
    collections::HashMap,
    ffi::c_int,
    path::{Path, PathBuf},
};

use micromod_abi::STATUS_OK;
use tracing::{info, warn};

use crate::{
    adapter::{DynamicLoader, LoadedObject},
    config::LoaderConfig,
    error::ModuleError,
    symbol::{ModuleArg, ModuleFn},
};

/// One loaded module.
///
/// Built in one piece by the load protocol and never patched afterwards; a
/// reload replaces the whole entry.
#[derive(Debug)]
pub struct ModuleEntry<O> {
    name: String,
    path: PathBuf,
    init_fn: ModuleFn,
    exit_fn: ModuleFn,
    object: O,
    seq: u64,
}

impl<O> ModuleEntry<O> {
    pub(crate) fn new(
        name: String,
        path: PathBuf,
        init_fn: ModuleFn,
        exit_fn: ModuleFn,
        object: O,
    ) -> Self {
        Self {
            name,
            path,
            init_fn,
            exit_fn,
            object,
            seq: 0,
        }
    }

    /// Name the module exported.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path the module was loaded from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn init_fn(&self) -> ModuleFn {
        self.init_fn
    }

    pub(crate) fn into_object(self) -> O {
        self.object
    }
}

impl<O: LoadedObject> ModuleEntry<O> {
    fn finalize(&self, arg: ModuleArg) -> c_int {
        self.exit_fn.call(arg)
    }

    fn release(&mut self) -> Result<(), ModuleError> {
        self.object
            .close()
            .map_err(|e| ModuleError::ClosingModule {
                name: self.name.clone(),
                reason: e.to_string(),
            })
    }

    /// Closes an entry that never made it into the registry.
    pub(crate) fn discard(mut self) {
        if let Err(err) = self.object.close() {
            warn!(module = %self.name, error = %err, "Failed to close rejected module");
        }
    }
}

/// Registry of loaded modules, keyed by module name.
///
/// Holds at most one entry per name. Dropping the registry unloads every
/// remaining module with a null argument.
///
/// # Example
///
/// ```no_run
/// use micromod_core::{LoaderConfig, ModuleArg, ModuleRegistry};
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = LoaderConfig::new("mod_name", "mod_init", "mod_exit", true)?;
/// let mut registry = ModuleRegistry::new(config);
///
/// registry.load_all("./modules", ModuleArg::null())?;
/// registry.unload("a", ModuleArg::null())?;
/// registry.unload_all(ModuleArg::null())?;
/// # Ok(())
/// # }
/// ```
pub struct ModuleRegistry<L: DynamicLoader> {
    config: LoaderConfig,
    loader: L,
    entries: HashMap<String, ModuleEntry<L::Object>>,
    next_seq: u64,
}

#[cfg(unix)]
impl ModuleRegistry<crate::NativeLoader> {
    /// Creates an empty registry that loads modules with the platform's
    /// dynamic loader.
    #[must_use]
    pub fn new(config: LoaderConfig) -> Self {
        Self::with_loader(config, crate::NativeLoader::new())
    }
}

impl<L: DynamicLoader> ModuleRegistry<L> {
    /// Creates an empty registry backed by `loader`.
    #[must_use]
    pub fn with_loader(config: LoaderConfig, loader: L) -> Self {
        Self {
            config,
            loader,
            entries: HashMap::new(),
            next_seq: 0,
        }
    }

    /// Configuration every load against this registry uses.
    #[must_use]
    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    pub(crate) fn loader(&self) -> &L {
        &self.loader
    }

    /// Looks up a module by name.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<&ModuleEntry<L::Object>> {
        self.entries.get(name)
    }

    /// Returns `true` if a module with this name is loaded.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Number of loaded modules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no module is loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Names of the loaded modules, most recently loaded first.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut entries: Vec<_> = self.entries.values().collect();
        entries.sort_unstable_by(|a, b| b.seq.cmp(&a.seq));
        entries.into_iter().map(ModuleEntry::name).collect()
    }

    /// Inserts `entry`, replacing any module with the same name.
    ///
    /// A superseded module is finalized and closed first; its exit status is
    /// logged, not returned. If closing it fails, `entry` is closed as well
    /// and the registry keeps the old module.
    pub(crate) fn insert_or_replace(
        &mut self,
        mut entry: ModuleEntry<L::Object>,
        arg: ModuleArg,
    ) -> Result<(), ModuleError> {
        entry.seq = self.next_seq;

        if let Some(old) = self.entries.get_mut(&entry.name) {
            let status = old.finalize(arg);
            if status != STATUS_OK {
                warn!(module = %old.name, status, "Superseded module exit returned an error");
            }
            if let Err(err) = old.release() {
                entry.discard();
                return Err(err);
            }
            info!(module = %entry.name, path = %entry.path.display(), "Replaced module");
            *old = entry;
        } else {
            if self.entries.try_reserve(1).is_err() {
                entry.discard();
                return Err(ModuleError::AllocatingMemory);
            }
            info!(module = %entry.name, path = %entry.path.display(), "Registered module");
            self.entries.insert(entry.name.clone(), entry);
        }

        self.next_seq += 1;
        Ok(())
    }

    /// Finalizes, closes and removes the module called `name`.
    ///
    /// The entry leaves the registry even when closing fails; the close
    /// error is returned ahead of a failing exit status.
    pub(crate) fn remove(&mut self, name: &str, arg: ModuleArg) -> Result<(), ModuleError> {
        let Some(mut entry) = self.entries.remove(name) else {
            return Err(ModuleError::NotRegistered(name.to_string()));
        };

        let status = entry.finalize(arg);
        entry.release()?;
        info!(module = %entry.name, "Unloaded module");

        if status == STATUS_OK {
            Ok(())
        } else {
            Err(ModuleError::ExitFailed {
                name: entry.name,
                status,
            })
        }
    }

    /// Removes every module, most recently loaded first.
    ///
    /// Stops at the first failure; modules after it stay registered.
    pub(crate) fn remove_all(&mut self, arg: ModuleArg) -> Result<(), ModuleError> {
        let names: Vec<String> = self.names().into_iter().map(str::to_owned).collect();
        for name in names {
            self.remove(&name, arg)?;
        }
        Ok(())
    }
}

impl<L: DynamicLoader> Drop for ModuleRegistry<L> {
    fn drop(&mut self) {
        if self.entries.is_empty() {
            return;
        }
        let names: Vec<String> = self.names().into_iter().map(str::to_owned).collect();
        for name in names {
            if let Err(err) = self.remove(&name, ModuleArg::null()) {
                warn!(module = %name, error = %err, "Failed to unload module on drop");
            }
        }
    }
}

impl<L: DynamicLoader> std::fmt::Debug for ModuleRegistry<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("config", &self.config)
            .field("modules", &self.names())
            .finish_non_exhaustive()
    }
}
