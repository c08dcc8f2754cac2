//! Stage controller for a single user turn
//!
//! Explain: idle -> explaining -> idle, one gateway call.
//! Change:  idle -> suggestions -> pruning-suggestions -> idle, a sampled
//!          gateway call, a pruning call when there is something to prune,
//!          then formatting.
//!
//! At most one run is in flight; a second `run` is rejected with
//! `PipelineError::Busy` rather than interleaved.

use crate::formatter::format_candidates;
use crate::gateway::{Gateway, GatewayError};
use crate::prompts::{build_change_prompt, build_explain_prompt};
use crate::pruning::prune_candidates;
use crate::types::*;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

/// Completions sampled per change request
pub const CANDIDATE_COUNT: usize = 3;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("another request is already in progress")]
    Busy,
    #[error("{stage} stage failed: {source}")]
    Gateway {
        stage: PipelineStage,
        #[source]
        source: GatewayError,
    },
}

/// Receives every stage transition, before the corresponding call is made
pub trait StageObserver: Send + Sync {
    fn on_stage(&self, stage: PipelineStage);
}

impl<F> StageObserver for F
where
    F: Fn(PipelineStage) + Send + Sync,
{
    fn on_stage(&self, stage: PipelineStage) {
        (self)(stage)
    }
}

pub struct DocumentPipeline {
    gateway: Arc<Gateway>,
    in_flight: Mutex<()>,
}

pub type SharedPipeline = Arc<DocumentPipeline>;

impl DocumentPipeline {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self {
            gateway,
            in_flight: Mutex::new(()),
        }
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.try_lock().is_err()
    }

    /// Main entry point: run one turn to completion or failure
    pub async fn run(
        &self,
        request: &TurnRequest,
        observer: &dyn StageObserver,
    ) -> Result<PipelineResult, PipelineError> {
        let _permit = self.in_flight.try_lock().map_err(|_| {
            warn!("Rejecting {:?} request: a run is already in progress", request.kind);
            PipelineError::Busy
        })?;

        let start = Instant::now();
        info!(
            "Running {:?} request: input='{}', highlighted={}",
            request.kind,
            request.input,
            request.highlighted.is_some()
        );

        let mut transcript = request.history.clone();
        transcript.push(ConversationTurn::user(request.input.as_str()));

        let result = match request.kind {
            RequestKind::Explain => self.explain(request, &transcript, observer).await,
            RequestKind::Change => self.change(request, &transcript, observer).await,
        };

        observer.on_stage(PipelineStage::Idle);

        match &result {
            Ok(PipelineResult::Candidates { candidates }) => info!(
                "Change request produced {} candidate(s) in {}ms",
                candidates.len(),
                start.elapsed().as_millis()
            ),
            Ok(PipelineResult::Explanation { .. }) => {
                info!("Explain request answered in {}ms", start.elapsed().as_millis())
            }
            Err(e) => error!("Request failed after {}ms: {}", start.elapsed().as_millis(), e),
        }

        result
    }

    async fn explain(
        &self,
        request: &TurnRequest,
        transcript: &[ConversationTurn],
        observer: &dyn StageObserver,
    ) -> Result<PipelineResult, PipelineError> {
        observer.on_stage(PipelineStage::Explaining);
        let prompt = build_explain_prompt(&request.document, &request.input);

        let mut answers = self
            .gateway
            .complete::<ExplanationMessage>(transcript, &prompt.instruction, &prompt.schema, 1)
            .await
            .map_err(|source| PipelineError::Gateway {
                stage: PipelineStage::Explaining,
                source,
            })?;

        // gateway guarantees at least one element on success
        let text = answers.swap_remove(0).explanation;
        Ok(PipelineResult::Explanation { text })
    }

    async fn change(
        &self,
        request: &TurnRequest,
        transcript: &[ConversationTurn],
        observer: &dyn StageObserver,
    ) -> Result<PipelineResult, PipelineError> {
        let candidates = self.generate_candidates(request, transcript, observer).await?;

        let candidates = if candidates.len() > 1 {
            observer.on_stage(PipelineStage::PruningSuggestions);
            prune_candidates(&self.gateway, transcript, candidates).await
        } else {
            candidates
        };

        Ok(PipelineResult::Candidates {
            candidates: format_candidates(candidates),
        })
    }

    /// Sample `CANDIDATE_COUNT` raw (unformatted) candidates
    async fn generate_candidates(
        &self,
        request: &TurnRequest,
        transcript: &[ConversationTurn],
        observer: &dyn StageObserver,
    ) -> Result<Vec<CandidateMutation>, PipelineError> {
        observer.on_stage(PipelineStage::Suggestions);
        let prompt = build_change_prompt(
            &request.document,
            request.highlighted.as_deref(),
            &request.input,
        );

        self.gateway
            .complete::<CompletionMessage>(transcript, &prompt.instruction, &prompt.schema, CANDIDATE_COUNT)
            .await
            .map_err(|source| PipelineError::Gateway {
                stage: PipelineStage::Suggestions,
                source,
            })
    }
}
