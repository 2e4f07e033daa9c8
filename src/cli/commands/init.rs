//! Init Command
//!
//! Initialize docweave in the current directory.

use crate::cli::ui::Output;
use crate::cli::util::{data_dir, open_store};
use crate::config::{Config, ConfigLoader};
use crate::types::{DocError, Result};

pub fn run(force: bool) -> Result<()> {
    let root = std::env::current_dir()?;
    let data_dir = data_dir();

    if data_dir.exists() && !force {
        return Err(DocError::Config(
            "Already initialized. Use --force to overwrite.".to_string(),
        ));
    }

    let project_name = root
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("project")
        .to_string();

    ConfigLoader::init_project(&data_dir, Some(&project_name))?;

    // Never overwrite an existing global config from here
    if let Err(e) = ConfigLoader::init_global(false) {
        tracing::debug!("Global config init skipped: {}", e);
    }

    open_store(&data_dir, &Config::default())?;

    let output = Output::new();
    output.success(&format!("Initialized docweave in {}/", data_dir.display()));
    println!("  Project: {}", project_name);
    println!();
    println!("Next steps:");
    println!("  1. Review {}", ConfigLoader::project_config_path().display());
    println!("  2. Run 'docweave generate' to write the first documents");

    Ok(())
}
