//! Check a module file without calling its init function.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use console::style;
use micromod_core::NativeRegistry;

use crate::config::LoaderArgs;

/// Command-line arguments for the inspect command.
#[derive(Args)]
pub struct InspectArgs {
    /// Path to the module's shared object
    pub path: PathBuf,

    #[command(flatten)]
    pub loader: LoaderArgs,
}

/// Opens the module, resolves its three exports, prints its name and closes
/// it again. The init function is never called; the loader still runs the
/// object's load-time constructors.
pub fn run(args: &InspectArgs) -> Result<()> {
    let settings = args.loader.resolve()?;
    let registry = NativeRegistry::new(settings.loader);

    let name = registry
        .inspect(&args.path)
        .with_context(|| format!("{} is not a loadable module", args.path.display()))?;

    println!("{} {name}", style("✓").green());
    println!(
        "  exports {:?}, {:?} and {:?}",
        registry.config().name_symbol(),
        registry.config().init_symbol(),
        registry.config().exit_symbol()
    );
    Ok(())
}
