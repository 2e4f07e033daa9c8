//! Verify Command
//!
//! Runs the registry/history consistency check on demand.

use crate::cli::ui::Output;
use crate::cli::util::{CommandContext, OutputFormat, print_json};
use crate::types::Result;

pub fn run(format: OutputFormat) -> Result<()> {
    // Opening the store runs the check and rebuilds on mismatch
    let (_, report) = CommandContext::load_with_report()?;

    if format == OutputFormat::Json {
        return print_json(&report);
    }

    let output = Output::new();
    if report.is_consistent() {
        output.success(&format!(
            "Registry matches history ({} live documents)",
            report.live_documents
        ));
        return Ok(());
    }

    output.list("Mismatches", &report.mismatches);
    if report.rebuilt {
        output.warning("Registry rebuilt from version history");
    }
    Ok(())
}
