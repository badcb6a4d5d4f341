//! Loader settings from `micromod.toml` merged with command-line flags.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use micromod_core::{HostConfig, LoaderConfig};
use tracing::debug;

/// Flags overriding the resolved `micromod.toml`.
#[derive(Debug, Default, Args)]
pub struct LoaderArgs {
    /// Config file to use instead of searching for `micromod.toml`
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Symbol under which modules export their name
    #[arg(long)]
    pub name_symbol: Option<String>,

    /// Symbol of the module init function
    #[arg(long)]
    pub init_symbol: Option<String>,

    /// Symbol of the module exit function
    #[arg(long)]
    pub exit_symbol: Option<String>,

    /// Open modules in the host's symbol namespace instead of a fresh one
    #[arg(long)]
    pub shared_namespace: bool,
}

/// Effective settings for one invocation.
#[derive(Debug)]
pub struct Settings {
    pub loader: LoaderConfig,
    pub modules_dir: Option<PathBuf>,
}

impl LoaderArgs {
    /// Loads the host config (explicit path, or the usual search) and
    /// applies the flags on top of it.
    pub fn resolve(&self) -> Result<Settings> {
        let host = match &self.config {
            Some(path) => HostConfig::load(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => match HostConfig::resolve().context("failed to load micromod.toml")? {
                Some((path, host)) => {
                    debug!(path = %path.display(), "Using config file");
                    host
                }
                None => HostConfig::default(),
            },
        };
        self.apply(host)
    }

    fn apply(&self, host: HostConfig) -> Result<Settings> {
        let base = &host.loader;
        let name = self
            .name_symbol
            .clone()
            .unwrap_or_else(|| base.name_symbol().to_string_lossy().into_owned());
        let init = self
            .init_symbol
            .clone()
            .unwrap_or_else(|| base.init_symbol().to_string_lossy().into_owned());
        let exit = self
            .exit_symbol
            .clone()
            .unwrap_or_else(|| base.exit_symbol().to_string_lossy().into_owned());
        let isolate = base.isolate_namespace() && !self.shared_namespace;

        let loader = LoaderConfig::new(&name, &init, &exit, isolate)
            .context("invalid loader configuration")?;

        Ok(Settings {
            loader,
            modules_dir: host.modules_dir,
        })
    }
}
