//! Phase bookkeeping on a [`RunResult`].

use chrono::Utc;
use mapscrape_core::{RunPhase, RunResult};

/// Moves the run into `phase`. Terminal phases are final.
pub(super) fn enter(result: &mut RunResult, phase: RunPhase) {
    let from = result.phase();
    if from.is_terminal() {
        tracing::warn!(run_id = %result.run_id, %from, to = %phase, "ignoring transition out of terminal phase");
        return;
    }
    tracing::debug!(run_id = %result.run_id, %from, to = %phase, "phase transition");
    result.phases.push(phase);
}

/// Enters `terminal` and stamps the finish time.
pub(super) fn finish(result: &mut RunResult, terminal: RunPhase) {
    enter(result, terminal);
    result.finished_at = Some(Utc::now());
}
