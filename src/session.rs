//! Editor session: the pipeline's caller and owner of the history store
//!
//! Records conversational turns around each run, auto-applies a lone
//! surviving candidate, holds several for manual selection, and turns
//! pipeline failures into a visible assistant turn. The store is only
//! written once a run has finished.

use crate::history::{DocumentHistory, HistoryError, HistorySnapshot};
use crate::pipeline::{PipelineError, SharedPipeline, StageObserver};
use crate::tasks::find_preset;
use crate::types::*;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{watch, Mutex, MutexGuard};
use tracing::{info, warn};

pub const DISMISSED_MESSAGE: &str = "Suggestions dismissed, no changes were made. Please try again.";
const FAILURE_PREFIX: &str = "There was an error completing this request: ";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("another request is already in progress")]
    Busy,
    #[error("no candidates are waiting for a decision")]
    NoPendingCandidates,
    #[error("candidate {index} out of range ({len} pending)")]
    CandidateOutOfRange { index: usize, len: usize },
    #[error("unknown task preset '{0}'")]
    UnknownTask(String),
    #[error(transparent)]
    History(#[from] HistoryError),
}

/// How a submitted turn ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TurnOutcome {
    Explained { explanation: String },
    Applied { candidate: CandidateMutation },
    Pending { candidates: Vec<CandidateMutation> },
    Failed { reason: String },
}

/// Read-only view for the presentation layer
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub document: String,
    pub entries: Vec<HistoryEntry>,
    pub pending: Vec<CandidateMutation>,
    pub stage: PipelineStage,
    pub stage_label: &'static str,
    pub model_tier: ModelTier,
}

struct SessionState {
    history: DocumentHistory,
    pending: Vec<CandidateMutation>,
}

pub struct EditorSession {
    pipeline: SharedPipeline,
    state: Mutex<SessionState>,
    turn_lock: Mutex<()>,
    stage_tx: watch::Sender<PipelineStage>,
}

pub type SharedSession = Arc<EditorSession>;

impl EditorSession {
    pub fn new(pipeline: SharedPipeline, history: DocumentHistory) -> Self {
        let (stage_tx, _) = watch::channel(PipelineStage::Idle);
        Self {
            pipeline,
            state: Mutex::new(SessionState {
                history,
                pending: Vec::new(),
            }),
            turn_lock: Mutex::new(()),
            stage_tx,
        }
    }

    pub fn stage(&self) -> PipelineStage {
        *self.stage_tx.borrow()
    }

    pub fn subscribe_stage(&self) -> watch::Receiver<PipelineStage> {
        self.stage_tx.subscribe()
    }

    /// Run one user turn through the pipeline and record its outcome.
    ///
    /// Only `SessionError::Busy` is returned as an error; every other failure
    /// is recorded as an assistant turn and reported as `TurnOutcome::Failed`.
    pub async fn submit(
        &self,
        kind: RequestKind,
        input: impl Into<String>,
        highlighted: Option<String>,
        observer: Option<&dyn StageObserver>,
    ) -> Result<TurnOutcome, SessionError> {
        let _turn = self.exclusive()?;
        let input = input.into();

        let request = {
            let state = self.state.lock().await;
            TurnRequest {
                kind,
                input: input.clone(),
                document: state.history.current_document().to_string(),
                highlighted: highlighted.filter(|h| !h.trim().is_empty()),
                history: state.history.transcript(),
            }
        };

        let notify = |stage: PipelineStage| {
            self.stage_tx.send_replace(stage);
            if let Some(observer) = observer {
                observer.on_stage(stage);
            }
        };
        let result = self.pipeline.run(&request, &notify).await;

        if let Err(PipelineError::Busy) = result {
            return Err(SessionError::Busy);
        }

        // every completed turn supersedes candidates built from an older document
        let mut state = self.state.lock().await;
        state.pending.clear();
        let outcome = match result {
            Err(e) => {
                let reason = e.to_string();
                state.history.commit_turn(ConversationTurn::user(input), None);
                state
                    .history
                    .commit_turn(ConversationTurn::assistant(format!("{}{}", FAILURE_PREFIX, reason)), None);
                TurnOutcome::Failed { reason }
            }
            Ok(PipelineResult::Explanation { text }) => {
                state.history.commit_turn(ConversationTurn::user(input), None);
                state.history.commit_turn(ConversationTurn::assistant(text.as_str()), None);
                TurnOutcome::Explained { explanation: text }
            }
            Ok(PipelineResult::Candidates { mut candidates }) => {
                state.history.commit_turn(ConversationTurn::user(input), None);
                if candidates.len() == 1 {
                    let candidate = candidates.remove(0);
                    apply_candidate(&mut state.history, &candidate);
                    TurnOutcome::Applied { candidate }
                } else {
                    state.pending = candidates.clone();
                    TurnOutcome::Pending { candidates }
                }
            }
        };

        Ok(outcome)
    }

    /// Commit pending candidate `index` and drop the rest
    pub async fn accept(&self, index: usize) -> Result<CandidateMutation, SessionError> {
        let _turn = self.exclusive()?;
        let mut state = self.state.lock().await;

        let len = state.pending.len();
        if len == 0 {
            return Err(SessionError::NoPendingCandidates);
        }
        if index >= len {
            return Err(SessionError::CandidateOutOfRange { index, len });
        }

        let candidate = state.pending.swap_remove(index);
        state.pending.clear();
        apply_candidate(&mut state.history, &candidate);
        info!("Accepted candidate {} of {}", index, len);
        Ok(candidate)
    }

    /// Drop all pending candidates, leaving the document unchanged
    pub async fn dismiss(&self) -> Result<(), SessionError> {
        let _turn = self.exclusive()?;
        let mut state = self.state.lock().await;

        if state.pending.is_empty() {
            return Err(SessionError::NoPendingCandidates);
        }
        state.pending.clear();
        state
            .history
            .commit_turn(ConversationTurn::assistant(DISMISSED_MESSAGE), None);
        Ok(())
    }

    pub async fn revert_to(&self, index: usize) -> Result<(), SessionError> {
        let _turn = self.exclusive()?;
        let mut state = self.state.lock().await;
        state.history.revert_to(index)?;
        state.pending.clear();
        Ok(())
    }

    pub async fn reset(&self) -> Result<(), SessionError> {
        let _turn = self.exclusive()?;
        let mut state = self.state.lock().await;
        state.history.reset();
        state.pending.clear();
        Ok(())
    }

    /// Direct edit of the markup; no history entry. Pending candidates are
    /// dropped since they were built from the previous document.
    pub async fn set_document(&self, text: impl Into<String>) -> Result<(), SessionError> {
        let _turn = self.exclusive()?;
        let mut state = self.state.lock().await;
        state.history.set_document(text);
        if !state.pending.is_empty() {
            info!("Hand edit discarded {} pending candidate(s)", state.pending.len());
            state.pending.clear();
        }
        Ok(())
    }

    /// Switch to a task preset, loading its starting document if it has one
    pub async fn load_task(&self, key: &str) -> Result<(), SessionError> {
        let preset = find_preset(key).ok_or_else(|| SessionError::UnknownTask(key.to_string()))?;
        if let Some(document) = preset.document {
            self.set_document(document).await?;
        }
        info!("Loaded task preset '{}'", preset.key);
        Ok(())
    }

    pub async fn model_tier(&self) -> ModelTier {
        self.pipeline.gateway().model_tier().await
    }

    pub async fn set_model_tier(&self, tier: ModelTier) {
        self.pipeline.gateway().set_model_tier(tier).await;
    }

    pub async fn current_document(&self) -> String {
        self.state.lock().await.history.current_document().to_string()
    }

    pub async fn view(&self) -> SessionView {
        let model_tier = self.model_tier().await;
        let state = self.state.lock().await;
        let stage = self.stage();
        SessionView {
            document: state.history.current_document().to_string(),
            entries: state.history.entries().to_vec(),
            pending: state.pending.clone(),
            stage,
            stage_label: stage.label(),
            model_tier,
        }
    }

    /// Serialized history for an external persistence collaborator
    pub async fn export(&self) -> HistorySnapshot {
        self.state.lock().await.history.snapshot()
    }

    pub async fn import(&self, snapshot: HistorySnapshot) -> Result<(), SessionError> {
        let _turn = self.exclusive()?;
        let mut state = self.state.lock().await;
        state.history = DocumentHistory::restore(snapshot);
        state.pending.clear();
        Ok(())
    }

    fn exclusive(&self) -> Result<MutexGuard<'_, ()>, SessionError> {
        self.turn_lock.try_lock().map_err(|_| {
            warn!("Session busy, rejecting operation");
            SessionError::Busy
        })
    }
}

fn apply_candidate(history: &mut DocumentHistory, candidate: &CandidateMutation) {
    history.commit_turn(
        ConversationTurn::assistant(candidate.explanation.as_str()),
        Some(candidate.html.clone()),
    );
}
