//! Candidate pruning via a second model call
//!
//! Sampled candidates are often near-duplicates. The model is shown the
//! changed fragment of each and asked which ones differ from each other.
//! Whatever it answers, the result is never empty and never reordered.

use crate::gateway::Gateway;
use crate::prompts::build_pruning_prompt;
use crate::types::{CandidateMutation, CheckMessage, ConversationTurn};
use std::collections::BTreeSet;
use tracing::{info, warn};

/// Ask the model for mutually distinct candidates and filter down to them.
/// Any failure of the pruning call keeps the full list.
pub async fn prune_candidates(
    gateway: &Gateway,
    transcript: &[ConversationTurn],
    candidates: Vec<CandidateMutation>,
) -> Vec<CandidateMutation> {
    let prompt = build_pruning_prompt(&candidates);

    let indices = match gateway
        .complete::<CheckMessage>(transcript, &prompt.instruction, &prompt.schema, 1)
        .await
    {
        Ok(mut answers) => answers.pop().map(|check| check.different_indices),
        Err(e) => {
            warn!("Pruning call failed, keeping all {} candidates: {}", candidates.len(), e);
            None
        }
    };

    apply_pruning(candidates, indices.as_deref())
}

/// Project `candidates` onto `indices`, preserving original order.
///
/// Falls back to the unpruned list when `indices` is missing, empty, or has
/// no entry inside `[0, len)`.
pub fn apply_pruning(candidates: Vec<CandidateMutation>, indices: Option<&[i64]>) -> Vec<CandidateMutation> {
    let total = candidates.len();
    let indices = match indices {
        Some(indices) if !indices.is_empty() => indices,
        _ => {
            info!("Pruning returned no indices, keeping all {} candidates", total);
            return candidates;
        }
    };

    let keep: BTreeSet<usize> = indices
        .iter()
        .filter_map(|&idx| usize::try_from(idx).ok())
        .filter(|&idx| idx < total)
        .collect();

    if keep.is_empty() {
        warn!(
            "Pruning indices {:?} all out of range for {} candidates, keeping all",
            indices, total
        );
        return candidates;
    }

    info!("Pruning kept candidates {:?} of {}", keep, total);

    candidates
        .into_iter()
        .enumerate()
        .filter(|(idx, _)| keep.contains(idx))
        .map(|(_, cand)| cand)
        .collect()
}
