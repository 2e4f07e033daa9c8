//! Generate Command
//!
//! Runs one regeneration pass over the current repository: new documents
//! from the plan, stale documents rewritten, human edits left alone.

use std::collections::BTreeSet;

use console::style;
use tracing::info;

use crate::agents::Agents;
use crate::ai::build_provider;
use crate::cli::ui::Output;
use crate::cli::util::{CommandContext, OutputFormat, print_json};
use crate::regen::{ForceSet, Orchestrator, RegenerateOutcome, RegenerateRequest, RunOptions};
use crate::types::{DocumentId, Result};

#[derive(Debug, Clone)]
pub struct GenerateOptions {
    /// Overrides `generation.collection`
    pub collection: Option<String>,
    pub doc_type: Option<String>,
    pub force: Vec<String>,
    pub force_all: bool,
    pub format: OutputFormat,
}

impl GenerateOptions {
    fn force_set(&self) -> Result<ForceSet> {
        if self.force_all {
            return Ok(ForceSet::All);
        }
        if self.force.is_empty() {
            return Ok(ForceSet::None);
        }
        let ids = self
            .force
            .iter()
            .map(|raw| DocumentId::parse(raw))
            .collect::<Result<BTreeSet<_>>>()?;
        Ok(ForceSet::Ids(ids))
    }
}

pub async fn run(options: GenerateOptions) -> Result<()> {
    let ctx = CommandContext::load()?;
    let request = RegenerateRequest {
        collection_prefix: options
            .collection
            .clone()
            .unwrap_or_else(|| ctx.config.generation.collection.clone()),
        doc_type_filter: options.doc_type.clone(),
        force: options.force_set()?,
    };

    let provider = build_provider(&ctx.config.llm)?;
    let orchestrator = Orchestrator::new(
        ctx.store.clone(),
        ctx.repository()?,
        Agents::from_provider(provider),
        RunOptions::from_config(&ctx.config, ctx.output_dir()),
    );
    orchestrator.cancel_signal().cancel_on_ctrl_c();

    info!(
        run_id = %orchestrator.run_id(),
        output = %ctx.output_dir().display(),
        "Starting regeneration"
    );
    let outcome = match orchestrator.regenerate(&request).await {
        Ok(outcome) => outcome,
        Err(e) => {
            // Aborted runs may leave locks behind on failed commits
            if let Err(cleanup) = ctx.store.locks.release_all(orchestrator.run_id()) {
                tracing::warn!("Failed to release commit locks: {}", cleanup);
            }
            return Err(e);
        }
    };

    match options.format {
        OutputFormat::Json => print_json(&outcome),
        OutputFormat::Text => {
            print_summary(&outcome);
            Ok(())
        }
    }
}

fn print_summary(outcome: &RegenerateOutcome) {
    let output = Output::new();
    output.header(&format!("Regeneration at {}", outcome.head_revision));
    output.field("Run", &outcome.run_id);
    output.field("Written", outcome.written.len());
    output.field("Unchanged", outcome.unchanged.len());
    output.field("Conflicts", outcome.skipped_conflicts.len());

    output.list("Written", &outcome.written);

    if !outcome.conflicts.is_empty() {
        output.section(&format!("Human edits preserved ({})", outcome.conflicts.len()));
        for conflict in &outcome.conflicts {
            println!(
                "  • {} {}",
                conflict.document_id,
                style(format!(
                    "(proposal kept as version #{})",
                    conflict.superseded_seq
                ))
                .dim()
            );
        }
        output.info("Settle with 'docweave reconcile <id> accept|keep'");
    }

    if !outcome.warnings.is_empty() {
        output.section(&format!("Warnings ({})", outcome.warnings.len()));
        for warning in &outcome.warnings {
            output.warning(warning);
        }
    }
}
