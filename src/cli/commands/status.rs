//! Status Command
//!
//! Registry listing with each document's revision, hash and edit state.

use console::style;

use crate::cli::ui::Output;
use crate::cli::util::{CommandContext, OutputFormat, is_initialized, print_json};
use crate::regen::{DocumentStatus, Operator, Verdict};
use crate::types::Result;

pub fn run(format: OutputFormat) -> Result<()> {
    let json_output = format == OutputFormat::Json;

    if !is_initialized() {
        if json_output {
            print_json(&serde_json::json!({ "status": "not_initialized" }))?;
        } else {
            Output::new().info("Not initialized. Run 'docweave init' first.");
        }
        // Informational; not an error
        return Ok(());
    }

    let ctx = CommandContext::load()?;
    let documents = Operator::new(ctx.store.clone(), ctx.output_dir()).status()?;

    if json_output {
        return print_json(&serde_json::json!({
            "status": "initialized",
            "project": ctx.config.project.name,
            "output_dir": ctx.output_dir(),
            "documents": documents,
        }));
    }

    let output = Output::new();
    output.header("docweave status");
    if let Some(name) = &ctx.config.project.name {
        output.field("Project", name);
    }
    output.field("Output", ctx.output_dir().display());
    output.field("Documents", documents.len());

    if documents.is_empty() {
        println!();
        output.info("No documents yet. Run 'docweave generate'.");
        return Ok(());
    }

    output.section("Documents");
    for doc in &documents {
        println!(
            "  {:<40} {:<14} {} {}{}",
            doc.id.to_string(),
            doc.doc_type,
            style(short_revision(&doc.revision)).dim(),
            style(&doc.hash).dim(),
            marker(doc)
        );
    }

    let conflicted = documents
        .iter()
        .filter(|d| d.pending_conflict.is_some())
        .count();
    if conflicted > 0 {
        println!();
        output.warning(&format!(
            "{} document(s) have a pending proposal; see 'docweave reconcile'",
            conflicted
        ));
    }
    Ok(())
}

fn short_revision(revision: &str) -> &str {
    revision.get(..12).unwrap_or(revision)
}

fn marker(doc: &DocumentStatus) -> String {
    let mut marks = Vec::new();
    if let Some(seq) = doc.pending_conflict {
        marks.push(style(format!("conflict #{}", seq)).yellow().to_string());
    } else if doc.human_edited {
        marks.push(style("edited").yellow().to_string());
    }
    match doc.disk {
        Verdict::Missing => marks.push(style("missing on disk").red().to_string()),
        Verdict::Edited { .. } if doc.pending_conflict.is_none() && !doc.human_edited => {
            marks.push(style("edited on disk").yellow().to_string())
        }
        _ => {}
    }
    if marks.is_empty() {
        String::new()
    } else {
        format!("  [{}]", marks.join(", "))
    }
}
