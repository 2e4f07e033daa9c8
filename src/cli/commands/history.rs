//! History and Show Commands
//!
//! Read-only views over a document's version history.

use console::style;

use crate::cli::ui::Output;
use crate::cli::util::{CommandContext, OutputFormat, print_json};
use crate::regen::{Operator, strip_trailer};
use crate::types::{DocumentId, Result, format_timestamp};

pub fn history(id: &str, format: OutputFormat) -> Result<()> {
    let id = DocumentId::parse(id)?;
    let ctx = CommandContext::load()?;
    let records = Operator::new(ctx.store.clone(), ctx.output_dir()).history(&id)?;

    if format == OutputFormat::Json {
        return print_json(&records);
    }

    Output::new().header(&format!("History of {}", id));
    for record in &records {
        println!(
            "  #{:<4} {}  {:<28} {:<12} {}",
            record.seq,
            format_timestamp(&record.created_at),
            record.reason.to_string(),
            record.revision.get(..12).unwrap_or(&record.revision),
            style(record.content_hash.get(..12).unwrap_or(&record.content_hash)).dim()
        );
    }
    Ok(())
}

/// Print one stored version; the latest when `seq` is `None`.
pub fn show(id: &str, seq: Option<i64>, body_only: bool) -> Result<()> {
    let id = DocumentId::parse(id)?;
    let ctx = CommandContext::load()?;
    let record = Operator::new(ctx.store.clone(), ctx.output_dir()).show(&id, seq)?;

    let content = if body_only {
        strip_trailer(&record.content)
    } else {
        record.content.as_str()
    };
    println!("{}", content);
    Ok(())
}
