//! Regeneration pipeline: staleness assessment, agent orchestration,
//! conflict-aware commits and operator reconciliation.

pub mod cancel;
pub mod commit;
pub mod conflict;
pub mod operator;
pub mod orchestrator;
pub mod planner;
pub mod trailer;


pub use cancel::CancelSignal;
pub use commit::{CommitOutcome, Committer, Proposal};
pub use conflict::{ConflictReport, ConflictResolver, Verdict};
pub use operator::{DocumentStatus, Operator, Removal, Resolution};
pub use orchestrator::{Orchestrator, RegenerateOutcome, RegenerateRequest, RunOptions};
pub use planner::{
    ForceSet, RegenerationPlanner, Scope, StaleDocument, StaleReason, StalenessReport, order_work,
};
pub use trailer::{Trailer, parse_trailer, strip_trailer};
