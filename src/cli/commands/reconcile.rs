//! Reconcile Command
//!
//! Settles a document whose human edit blocked a regeneration.

use crate::cli::ui::Output;
use crate::cli::util::CommandContext;
use crate::regen::{Operator, Resolution};
use crate::types::{DocumentId, Result};

pub fn run(id: &str, resolution: Resolution) -> Result<()> {
    let id = DocumentId::parse(id)?;
    let ctx = CommandContext::load()?;
    let record = Operator::new(ctx.store.clone(), ctx.output_dir()).reconcile(&id, resolution)?;

    let message = match resolution {
        Resolution::Accept => format!("{}: generated version #{} is live", id, record.seq),
        Resolution::Keep => format!("{}: human edit adopted as version #{}", id, record.seq),
    };
    Output::new().success(&message);
    Ok(())
}
