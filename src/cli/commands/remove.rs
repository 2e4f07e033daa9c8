//! Remove Command

use crate::cli::ui::Output;
use crate::cli::util::CommandContext;
use crate::regen::Operator;
use crate::types::{DocumentId, Result};

pub fn run(id: &str, force: bool) -> Result<()> {
    let id = DocumentId::parse(id)?;
    let ctx = CommandContext::load()?;
    let removal = Operator::new(ctx.store.clone(), ctx.output_dir()).remove(&id, force)?;

    let output = Output::new();
    output.success(&format!(
        "Removed {} (tombstone #{})",
        id, removal.record.seq
    ));
    if !removal.file_deleted {
        output.info("No file was on disk");
    }
    Ok(())
}
