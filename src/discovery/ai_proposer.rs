//! AI-proposed hypotheses (§4.2, source 3): dispatches a training summary to
//! the optional `ai_reasoning` collector and folds any structurally valid
//! predicate it proposes into the same candidate pipeline as template
//! hypotheses. Absence of this collaborator — disabled config, collector
//! not registered, or a malformed proposal — never blocks a run.

use tracing::{info, warn};

use crate::catalog::predicate::{parse_proposed, Predicate};
use crate::orchestrator::collectors::CollectorRequest;
use crate::orchestrator::priority_queue::Priority;
use crate::orchestrator::Orchestrator;

/// Ask the AI reasoning collector for one candidate predicate given a plain
/// English summary of the current training set. Returns `None` whenever the
/// collector is unavailable, errors, or proposes something that fails to
/// parse — callers treat this identically to the feature being disabled.
///
/// The structured predicate grammar carries no notion of wager side, so the
/// caller validates an AI-proposed predicate against every side rather than
/// guessing one from the proposal.
pub async fn propose(orchestrator: &Orchestrator, training_summary: &str) -> Option<Predicate> {
    let request = CollectorRequest::new().with("training_summary", training_summary);
    let outcome = match orchestrator.dispatch("ai_reasoning", request, Priority::Low).await {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!(error = %e, "ai_reasoning dispatch failed, continuing without an AI proposal");
            return None;
        }
    };

    let proposed = outcome.value.get("proposed")?;
    if proposed.is_null() {
        return None;
    }

    let predicate = parse_proposed(proposed)?;
    info!(predicate = %predicate.canonical_form(), "ai reasoning proposed a candidate predicate");
    Some(predicate)
}
