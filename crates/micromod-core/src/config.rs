//! Loader and host configuration.
//!
//! - [`LoaderConfig`]: the three symbol names every module must export and
//!   the namespace isolation policy. Immutable once built; a registry owns
//!   one for its whole lifetime.
//! - [`HostConfig`]: the on-disk `micromod.toml` a host reads to build a
//!   [`LoaderConfig`] and to find its modules directory.
//!
//! # Resolution Algorithm
//!
//! [`HostConfig::resolve`] looks for `micromod.toml` in this order:
//!
//! 1. `MICROMOD_CONFIG_PATH` environment variable
//! 2. Current directory
//! 3. Parent directories (walk up to filesystem root)
//! 4. XDG config directory (`~/.config/micromod/`)
//!
//! # Example
//!
//! ```toml
//! modules_dir = "./modules"
//!
//! [loader]
//! name_symbol = "mod_name"
//! init_symbol = "mod_init"
//! exit_symbol = "mod_exit"
//! isolate_namespace = true
//! ```

use std::{
    ffi::{CStr, CString},
    fs,
    path::{Path, PathBuf},
};

use micromod_abi::{DEFAULT_EXIT_SYMBOL, DEFAULT_INIT_SYMBOL, DEFAULT_NAME_SYMBOL};
use serde::Deserialize;

/// File name looked up by [`HostConfig::resolve`].
pub const CONFIG_FILE_NAME: &str = "micromod.toml";

/// Environment variable overriding the config file location.
pub const CONFIG_PATH_ENV: &str = "MICROMOD_CONFIG_PATH";

/// Errors that can occur while building or loading configuration.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// I/O error when reading a config file.
    #[error("I/O error reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// TOML parsing error when a config file is malformed.
    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// A symbol name is empty.
    #[error("{kind} symbol name is empty")]
    EmptySymbol { kind: &'static str },

    /// A symbol name contains a NUL byte and cannot be passed to the loader.
    #[error("{kind} symbol name `{symbol}` contains a NUL byte")]
    NulInSymbol { kind: &'static str, symbol: String },
}

/// Symbol names and namespace policy used for every load against a registry.
///
/// Built once with [`LoaderConfig::new`] (or [`Default`]) and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawLoaderConfig")]
pub struct LoaderConfig {
    name_symbol: CString,
    init_symbol: CString,
    exit_symbol: CString,
    isolate_namespace: bool,
}

impl LoaderConfig {
    /// Builds a configuration from the three symbol names and the isolation
    /// policy.
    ///
    /// When `isolate_namespace` is set every module is opened into a fresh
    /// symbol namespace and cannot resolve symbols from the host or from
    /// other modules.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if a symbol name is empty or contains a NUL
    /// byte.
    pub fn new(
        name_symbol: &str,
        init_symbol: &str,
        exit_symbol: &str,
        isolate_namespace: bool,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            name_symbol: symbol("name", name_symbol)?,
            init_symbol: symbol("init", init_symbol)?,
            exit_symbol: symbol("exit", exit_symbol)?,
            isolate_namespace,
        })
    }

    /// Symbol under which modules export their name.
    #[must_use]
    pub fn name_symbol(&self) -> &CStr {
        &self.name_symbol
    }

    /// Symbol under which modules export their init function.
    #[must_use]
    pub fn init_symbol(&self) -> &CStr {
        &self.init_symbol
    }

    /// Symbol under which modules export their exit function.
    #[must_use]
    pub fn exit_symbol(&self) -> &CStr {
        &self.exit_symbol
    }

    /// Whether each module is opened into its own symbol namespace.
    #[must_use]
    pub fn isolate_namespace(&self) -> bool {
        self.isolate_namespace
    }
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            name_symbol: default_symbol(DEFAULT_NAME_SYMBOL),
            init_symbol: default_symbol(DEFAULT_INIT_SYMBOL),
            exit_symbol: default_symbol(DEFAULT_EXIT_SYMBOL),
            isolate_namespace: true,
        }
    }
}

/// `[loader]` table as written on disk, before validation.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawLoaderConfig {
    #[serde(default = "default_name_symbol")]
    name_symbol: String,
    #[serde(default = "default_init_symbol")]
    init_symbol: String,
    #[serde(default = "default_exit_symbol")]
    exit_symbol: String,
    #[serde(default = "default_isolate")]
    isolate_namespace: bool,
}

impl TryFrom<RawLoaderConfig> for LoaderConfig {
    type Error = ConfigError;

    fn try_from(raw: RawLoaderConfig) -> Result<Self, Self::Error> {
        Self::new(
            &raw.name_symbol,
            &raw.init_symbol,
            &raw.exit_symbol,
            raw.isolate_namespace,
        )
    }
}

/// Host configuration from `micromod.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HostConfig {
    /// Symbol names and namespace policy.
    #[serde(default)]
    pub loader: LoaderConfig,

    /// Directory whose direct entries are loaded as modules.
    ///
    /// Relative paths are resolved against the directory holding the config
    /// file by [`HostConfig::load`].
    pub modules_dir: Option<PathBuf>,
}

impl HostConfig {
    /// Loads and parses a host config file.
    ///
    /// # Errors
    ///
    /// Returns `Err(ConfigError)` if the file cannot be read, is not valid
    /// TOML, or names an invalid symbol.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mut config: HostConfig = toml::from_str(&contents)?;
        if let Some(base) = path.parent() {
            config.modules_dir = config
                .modules_dir
                .map(|dir| if dir.is_relative() { base.join(dir) } else { dir });
        }
        Ok(config)
    }

    /// Finds and loads `micromod.toml` using the resolution algorithm.
    ///
    /// # Returns
    ///
    /// - `Ok(Some((path, config)))` if a config file was found and loaded
    /// - `Ok(None)` if no config file exists anywhere in the search order
    /// - `Err(ConfigError)` if a file was found but could not be loaded
    ///
    /// # Errors
    ///
    /// See [`HostConfig::load`].
    pub fn resolve() -> Result<Option<(PathBuf, Self)>, ConfigError> {
        if let Some(path) = env_override() {
            let config = Self::load(&path)?;
            return Ok(Some((path, config)));
        }

        if let Ok(cwd) = std::env::current_dir() {
            for dir in cwd.ancestors() {
                let candidate = dir.join(CONFIG_FILE_NAME);
                if candidate.is_file() {
                    let config = Self::load(&candidate)?;
                    return Ok(Some((candidate, config)));
                }
            }
        }

        if let Some(candidate) = xdg_config_path().filter(|p| p.is_file()) {
            let config = Self::load(&candidate)?;
            return Ok(Some((candidate, config)));
        }

        Ok(None)
    }
}

fn symbol(kind: &'static str, name: &str) -> Result<CString, ConfigError> {
    if name.is_empty() {
        return Err(ConfigError::EmptySymbol { kind });
    }
    CString::new(name).map_err(|_| ConfigError::NulInSymbol {
        kind,
        symbol: name.replace('\0', "\\0"),
    })
}

fn default_symbol(name: &'static str) -> CString {
    // Defaults are compile-time constants without NUL bytes.
    CString::new(name).unwrap_or_default()
}

fn default_name_symbol() -> String {
    DEFAULT_NAME_SYMBOL.to_string()
}

fn default_init_symbol() -> String {
    DEFAULT_INIT_SYMBOL.to_string()
}

fn default_exit_symbol() -> String {
    DEFAULT_EXIT_SYMBOL.to_string()
}

fn default_isolate() -> bool {
    true
}

/// Gets the environment variable override, if set.
fn env_override() -> Option<PathBuf> {
    std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from)
}

/// Gets the XDG config path (`~/.config/micromod/micromod.toml`).
fn xdg_config_path() -> Option<PathBuf> {
    Some(dirs::config_dir()?.join("micromod").join(CONFIG_FILE_NAME))
}
