//! Load a modules directory, list what was loaded, then unload it all.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use console::style;
use micromod_core::{DynamicLoader, ModuleArg, ModuleRegistry, NativeRegistry};
use tracing::info;

use crate::config::LoaderArgs;

/// Command-line arguments for the run command.
#[derive(Args)]
pub struct RunArgs {
    /// Modules directory (defaults to `modules_dir` from `micromod.toml`)
    pub dir: Option<PathBuf>,

    /// Module file to load again after the directory has been loaded
    #[arg(long, value_name = "PATH")]
    pub reload: Option<PathBuf>,

    /// Module to unload by name before the rest (repeatable)
    #[arg(long, value_name = "NAME")]
    pub unload: Vec<String>,

    #[command(flatten)]
    pub loader: LoaderArgs,
}

/// Executes the run command.
///
/// Every module receives a null argument. The first failure aborts the run;
/// modules still loaded at that point are unloaded when the registry is
/// dropped.
pub fn run(args: &RunArgs) -> Result<()> {
    let settings = args.loader.resolve()?;
    let dir = args
        .dir
        .clone()
        .or(settings.modules_dir)
        .context("no modules directory given and none configured in micromod.toml")?;

    let mut registry = NativeRegistry::new(settings.loader);

    let loaded = registry
        .load_all(&dir, ModuleArg::null())
        .with_context(|| format!("failed to load modules from {}", dir.display()))?;
    println!(
        "{} Loaded {loaded} module(s) from {}",
        style("✓").green(),
        dir.display()
    );

    if let Some(path) = &args.reload {
        registry
            .load(path, ModuleArg::null())
            .with_context(|| format!("failed to reload {}", path.display()))?;
        println!("{} Reloaded {}", style("✓").green(), path.display());
    }

    for name in &args.unload {
        registry
            .unload(name, ModuleArg::null())
            .with_context(|| format!("failed to unload module `{name}`"))?;
        println!("{} Unloaded {name}", style("✓").green());
    }

    print_modules(&registry);

    let remaining = registry.len();
    registry
        .unload_all(ModuleArg::null())
        .context("failed to unload modules")?;
    info!(unloaded = remaining, "Unloaded all modules");

    Ok(())
}

fn print_modules<L: DynamicLoader>(registry: &ModuleRegistry<L>) {
    if registry.is_empty() {
        println!("No modules loaded");
        return;
    }

    println!("{:<30} {}", style("MODULE").bold(), style("PATH").bold());
    println!("{}", "-".repeat(80));
    for name in registry.names() {
        if let Some(entry) = registry.lookup(name) {
            println!("{name:<30} {}", entry.path().display());
        }
    }
}
