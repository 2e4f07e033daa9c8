//! LLM-backed agent implementations.

use std::collections::BTreeSet;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::prompts;
use super::{
    PlanEntry, PlanRequest, Planner, Scout, ScoutReport, ScoutRequest, WriteRequest, Writer,
    WriterOutput,
};
use crate::ai::SharedProvider;
use crate::types::{DocError, DocumentId, Result, validate_collection};

/// One provider call; any failure or unparsable payload is an
/// `AgentInvocationFailure` for `target`.
async fn invoke<T: for<'de> Deserialize<'de>>(
    provider: &SharedProvider,
    stage: &'static str,
    target: &str,
    prompt: &str,
    schema: &Value,
) -> Result<T> {
    debug!(stage, target, prompt_chars = prompt.len(), "Invoking agent");
    let response = provider
        .generate(prompt, schema)
        .await
        .map_err(|e| DocError::agent(stage, target, e.to_string()))?;
    serde_json::from_value(response.content)
        .map_err(|e| DocError::agent(stage, target, format!("unusable output: {}", e)))
}

fn clean_paths(paths: Vec<String>) -> BTreeSet<String> {
    paths
        .into_iter()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

// =============================================================================
// Scout
// =============================================================================

pub struct LlmScout {
    provider: SharedProvider,
}

impl LlmScout {
    pub fn new(provider: SharedProvider) -> Self {
        Self { provider }
    }
}

#[derive(Deserialize)]
struct ScoutPayload {
    report: String,
    #[serde(default)]
    source_dependencies: Vec<String>,
}

#[async_trait]
impl Scout for LlmScout {
    async fn explore(&self, request: &ScoutRequest) -> Result<ScoutReport> {
        let payload: ScoutPayload = invoke(
            &self.provider,
            "scout",
            &request.focus,
            &prompts::scout_prompt(request),
            &prompts::scout_schema(),
        )
        .await?;

        if payload.report.trim().is_empty() {
            return Err(DocError::agent("scout", &request.focus, "empty report"));
        }

        Ok(ScoutReport {
            focus: request.focus.clone(),
            report: payload.report,
            source_dependencies: clean_paths(payload.source_dependencies),
        })
    }
}

// =============================================================================
// Planner
// =============================================================================

pub struct LlmPlanner {
    provider: SharedProvider,
}

impl LlmPlanner {
    pub fn new(provider: SharedProvider) -> Self {
        Self { provider }
    }
}

#[derive(Deserialize)]
struct Blueprint {
    documents: Vec<BlueprintEntry>,
}

#[derive(Deserialize)]
struct BlueprintEntry {
    title: String,
    doc_type: String,
    #[serde(default)]
    folder: String,
    #[serde(default)]
    outline: String,
    #[serde(default)]
    references: Vec<String>,
    #[serde(default)]
    key_files: Vec<String>,
}

impl BlueprintEntry {
    fn into_plan_entry(self, prefix: &str) -> Result<PlanEntry> {
        let folder = validate_collection(self.folder.trim().trim_matches('/'))?;
        let collection = match (prefix.is_empty(), folder.is_empty()) {
            (_, true) => prefix.to_string(),
            (true, false) => folder,
            (false, false) => format!("{}/{}", prefix, folder),
        };
        let document_id = DocumentId::from_parts(&collection, &self.title)?;
        Ok(PlanEntry {
            document_id,
            title: self.title.trim().to_string(),
            doc_type: self.doc_type.trim().to_lowercase(),
            collection,
            outline: self.outline,
            references: self.references,
            key_files: self.key_files,
        })
    }
}

#[async_trait]
impl Planner for LlmPlanner {
    async fn plan(&self, request: &PlanRequest) -> Result<Vec<PlanEntry>> {
        let blueprint: Blueprint = invoke(
            &self.provider,
            "planner",
            "plan",
            &prompts::planner_prompt(request),
            &prompts::planner_schema(),
        )
        .await?;

        let prefix = validate_collection(&request.collection_prefix)?;
        let mut seen = BTreeSet::new();
        let mut entries = Vec::with_capacity(blueprint.documents.len());

        for raw in blueprint.documents {
            let title = raw.title.clone();
            match raw.into_plan_entry(&prefix) {
                Ok(entry) if seen.insert(entry.document_id.clone()) => entries.push(entry),
                Ok(entry) => warn!(document = %entry.document_id, "Planner listed document twice"),
                Err(e) => warn!(title = %title, "Dropping plan entry: {}", e),
            }
        }

        if entries.is_empty() {
            return Err(DocError::agent("planner", "plan", "blueprint has no usable documents"));
        }
        Ok(entries)
    }
}

// =============================================================================
// Writer
// =============================================================================

pub struct LlmWriter {
    provider: SharedProvider,
}

impl LlmWriter {
    pub fn new(provider: SharedProvider) -> Self {
        Self { provider }
    }
}

#[derive(Deserialize)]
struct WriterPayload {
    body: String,
    #[serde(default)]
    source_dependencies: Vec<String>,
}

#[async_trait]
impl Writer for LlmWriter {
    async fn write(&self, request: &WriteRequest) -> Result<WriterOutput> {
        let target = request.document_id.as_str();
        let payload: WriterPayload = invoke(
            &self.provider,
            "writer",
            target,
            &prompts::writer_prompt(request),
            &prompts::writer_schema(),
        )
        .await?;

        let body = payload.body.trim();
        if body.is_empty() {
            return Err(DocError::agent("writer", target, "empty body"));
        }

        Ok(WriterOutput {
            body: format!("{}\n", body),
            source_dependencies: clean_paths(payload.source_dependencies),
        })
    }
}
