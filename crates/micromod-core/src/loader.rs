//! Load/unload protocol.
//!
//! Loading opens a shared object, resolves the init, exit and name symbols
//! (in that order), registers the module and finally runs its init
//! function. A module missing any export is closed again and never
//! registered.
//!
//! Bulk operations are not transactional: [`ModuleRegistry::load_all`] and
//! [`ModuleRegistry::unload_all`] stop at the first failure and leave the
//! modules processed so far in place. Callers inspect the registry to decide
//! what to do next.

use std::path::Path;

use micromod_abi::STATUS_OK;
use tracing::{debug, info, instrument, warn};

use crate::{
    adapter::{AdapterError, DynamicLoader, LoadedObject},
    error::ModuleError,
    registry::{ModuleEntry, ModuleRegistry},
    scanner::{DirectoryScan, DirectoryScanner, WalkDirScanner},
    symbol::{self, ModuleArg, ModuleFn},
};

impl<L: DynamicLoader> ModuleRegistry<L> {
    /// Loads the module at `path` and runs its init function with `arg`.
    ///
    /// If a module with the same name is already loaded it is finalized and
    /// closed first, then replaced.
    ///
    /// # Errors
    ///
    /// - [`ModuleError::OpeningModule`] if the loader cannot open `path`
    /// - [`ModuleError::LocatingInitSymbol`], [`ModuleError::LocatingExitSymbol`]
    ///   or [`ModuleError::LocatingNameSymbol`] if an export is missing
    /// - [`ModuleError::ClosingModule`] if a superseded module cannot be
    ///   closed
    /// - [`ModuleError::AllocatingMemory`] if the registry cannot grow
    /// - [`ModuleError::InitFailed`] if init returns a non-zero status; the
    ///   module stays registered
    pub fn load(&mut self, path: impl AsRef<Path>, arg: ModuleArg) -> Result<(), ModuleError> {
        self.load_path(path.as_ref(), arg)
    }

    #[instrument(skip(self, path, arg), fields(path = %path.display()))]
    fn load_path(&mut self, path: &Path, arg: ModuleArg) -> Result<(), ModuleError> {
        let entry = self.open_module(path)?;
        let name = entry.name().to_string();
        let init_fn = entry.init_fn();

        self.insert_or_replace(entry, arg)?;

        let status = init_fn.call(arg);
        if status != STATUS_OK {
            warn!(module = %name, status, "Module init returned an error");
            return Err(ModuleError::InitFailed { name, status });
        }

        info!(module = %name, "Loaded module");
        Ok(())
    }

    /// Loads every direct entry of `dir` with the filesystem scanner.
    ///
    /// Returns the number of modules loaded. See
    /// [`load_all_with`](Self::load_all_with).
    ///
    /// # Errors
    ///
    /// See [`load_all_with`](Self::load_all_with).
    pub fn load_all(&mut self, dir: impl AsRef<Path>, arg: ModuleArg) -> Result<usize, ModuleError> {
        self.load_all_with(&WalkDirScanner, dir, arg)
    }

    /// Loads every direct entry of `dir` listed by `scanner`.
    ///
    /// Files, symbolic links and other non-directory entries are loaded in
    /// scan order; subdirectories are skipped. Stops at the first failure.
    /// The scan is always closed before returning.
    ///
    /// # Errors
    ///
    /// - [`ModuleError::OpenModulesDir`] if `dir` cannot be scanned
    /// - any error of [`load`](Self::load) for the first module that fails
    /// - [`ModuleError::CloseModulesDir`] if closing the scan fails and no
    ///   earlier error occurred
    #[instrument(skip(self, scanner, dir, arg), fields(dir = %dir.as_ref().display()))]
    pub fn load_all_with<S: DirectoryScanner>(
        &mut self,
        scanner: &S,
        dir: impl AsRef<Path>,
        arg: ModuleArg,
    ) -> Result<usize, ModuleError> {
        let dir = dir.as_ref();
        let mut scan = scanner
            .open(dir)
            .map_err(|e| ModuleError::OpenModulesDir {
                path: dir.to_path_buf(),
                reason: e.to_string(),
            })?;

        let outcome = self.load_scanned(&mut scan, dir, arg);
        let closed = scan.close();

        match (outcome, closed) {
            (Ok(loaded), Ok(())) => {
                info!(loaded, "Loaded modules directory");
                Ok(loaded)
            }
            (Ok(_), Err(e)) => Err(ModuleError::CloseModulesDir {
                path: dir.to_path_buf(),
                reason: e.to_string(),
            }),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(close_err)) => {
                warn!(error = %close_err, "Failed to close modules directory");
                Err(err)
            }
        }
    }

    fn load_scanned<T: DirectoryScan>(
        &mut self,
        scan: &mut T,
        dir: &Path,
        arg: ModuleArg,
    ) -> Result<usize, ModuleError> {
        let mut loaded = 0;
        for item in scan {
            let entry = item.map_err(|e| ModuleError::OpenModulesDir {
                path: dir.to_path_buf(),
                reason: e.to_string(),
            })?;
            if !entry.kind.is_loadable() {
                debug!(path = %entry.path.display(), "Skipping subdirectory");
                continue;
            }
            self.load_path(&entry.path, arg)?;
            loaded += 1;
        }
        Ok(loaded)
    }

    /// Loads the module called `name` again from the path it was loaded
    /// from.
    ///
    /// # Errors
    ///
    /// [`ModuleError::NotRegistered`] if no such module is loaded, otherwise
    /// any error of [`load`](Self::load).
    pub fn reload(&mut self, name: &str, arg: ModuleArg) -> Result<(), ModuleError> {
        let path = self
            .lookup(name)
            .ok_or_else(|| ModuleError::NotRegistered(name.to_string()))?
            .path()
            .to_path_buf();
        self.load_path(&path, arg)
    }

    /// Finalizes and unloads the module called `name`.
    ///
    /// # Errors
    ///
    /// - [`ModuleError::NotRegistered`] if no such module is loaded
    /// - [`ModuleError::ClosingModule`] if the module cannot be closed; it is
    ///   removed from the registry regardless
    /// - [`ModuleError::ExitFailed`] if exit returns a non-zero status; the
    ///   module has been unloaded
    #[instrument(skip(self, arg))]
    pub fn unload(&mut self, name: &str, arg: ModuleArg) -> Result<(), ModuleError> {
        if self.is_empty() {
            return Err(ModuleError::NotRegistered(name.to_string()));
        }
        self.remove(name, arg)
    }

    /// Unloads every module, most recently loaded first.
    ///
    /// # Errors
    ///
    /// Returns the first failure of [`unload`](Self::unload); modules not
    /// yet reached stay registered.
    #[instrument(skip(self, arg))]
    pub fn unload_all(&mut self, arg: ModuleArg) -> Result<(), ModuleError> {
        self.remove_all(arg)
    }

    /// Opens `path` and checks it exports the module contract, without
    /// registering it or calling its init function.
    ///
    /// Opening still runs the object's own load-time constructors.
    ///
    /// Returns the module's name.
    ///
    /// # Errors
    ///
    /// The open and symbol errors of [`load`](Self::load), or
    /// [`ModuleError::ClosingModule`] if the object cannot be closed again.
    pub fn inspect(&self, path: impl AsRef<Path>) -> Result<String, ModuleError> {
        let entry = self.open_module(path.as_ref())?;
        let name = entry.name().to_string();
        let mut object = entry.into_object();
        object.close().map_err(|e| ModuleError::ClosingModule {
            name: name.clone(),
            reason: e.to_string(),
        })?;
        Ok(name)
    }

    /// Opens `path` and binds its three exports into an entry.
    ///
    /// On any failure after opening, the object is closed before returning.
    pub(crate) fn open_module(&self, path: &Path) -> Result<ModuleEntry<L::Object>, ModuleError> {
        let config = self.config();
        let mut object = self
            .loader()
            .open(path, config.isolate_namespace())
            .map_err(|e| ModuleError::OpeningModule {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        let resolved = object
            .resolve(config.init_symbol())
            .map_err(|e| locate_error(e, path, Export::Init))
            .and_then(|init| {
                let exit = object
                    .resolve(config.exit_symbol())
                    .map_err(|e| locate_error(e, path, Export::Exit))?;
                let name = object
                    .resolve(config.name_symbol())
                    .map_err(|e| locate_error(e, path, Export::Name))?;
                Ok((init, exit, name))
            });

        let (init, exit, name) = match resolved {
            Ok(symbols) => symbols,
            Err(err) => {
                if let Err(close_err) = object.close() {
                    warn!(path = %path.display(), error = %close_err, "Failed to close rejected module");
                }
                return Err(err);
            }
        };

        // SAFETY: the module contract fixes the type of all three exports;
        // the entry keeps `object` open for as long as the bound functions
        // are reachable, and the name is copied before anything can close it.
        let (init_fn, exit_fn, name) = unsafe {
            (
                ModuleFn::bind(init),
                ModuleFn::bind(exit),
                symbol::read_name(name),
            )
        };

        debug!(module = %name, path = %path.display(), "Resolved module exports");
        Ok(ModuleEntry::new(
            name,
            path.to_path_buf(),
            init_fn,
            exit_fn,
            object,
        ))
    }
}

#[derive(Clone, Copy)]
enum Export {
    Init,
    Exit,
    Name,
}

fn locate_error(err: AdapterError, path: &Path, export: Export) -> ModuleError {
    let symbol = match err {
        AdapterError::SymbolNotFound(symbol) => symbol,
        other => other.to_string(),
    };
    let path = path.to_path_buf();
    match export {
        Export::Init => ModuleError::LocatingInitSymbol { path, symbol },
        Export::Exit => ModuleError::LocatingExitSymbol { path, symbol },
        Export::Name => ModuleError::LocatingNameSymbol { path, symbol },
    }
}
