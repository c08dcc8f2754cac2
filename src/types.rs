//! Core type definitions for document turns, snapshots and candidates

use serde::{Deserialize, Serialize};
use std::fmt;

/// Who authored a conversational turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One immutable message of the conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A committed (turn, document snapshot) pair; the unit of revert
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub turn: ConversationTurn,
    /// Full document right after `turn` was applied. `None` only for seed
    /// entries and means "unchanged from the previous entry".
    pub snapshot: Option<String>,
}

/// One proposed full replacement of the document, before acceptance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateMutation {
    pub html: String,        // the entire new document, never a diff
    #[serde(rename = "changed")]
    pub changed_fragment: String, // best-effort, used only for pruning
    pub explanation: String,
}

/// Progress marker reported to observers during a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum PipelineStage {
    #[default]
    Idle,
    Appropriateness,
    Completion,
    Formatting,
    Suggestions,
    PruningSuggestions,
    Explaining,
}

impl PipelineStage {
    /// Progress label shown next to the input while a run is outstanding
    pub fn label(&self) -> &'static str {
        match self {
            PipelineStage::Idle => "",
            PipelineStage::Appropriateness => "Checking appropriateness...",
            PipelineStage::Completion => "Writing code...",
            PipelineStage::Formatting => "Formatting code...",
            PipelineStage::Suggestions => "Generating suggestions...",
            PipelineStage::PruningSuggestions => "Pruning suggestions...",
            PipelineStage::Explaining => "Generating explanation...",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Idle => "idle",
            PipelineStage::Appropriateness => "appropriateness",
            PipelineStage::Completion => "completion",
            PipelineStage::Formatting => "formatting",
            PipelineStage::Suggestions => "suggestions",
            PipelineStage::PruningSuggestions => "pruning-suggestions",
            PipelineStage::Explaining => "explaining",
        };
        f.write_str(name)
    }
}

/// Which prompt family and pipeline path a user turn takes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestKind {
    Explain,
    Change,
}

/// Model selection; resolved to a concrete model name by configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    Fast,
    #[default]
    Accurate,
}

impl std::str::FromStr for ModelTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fast" => Ok(ModelTier::Fast),
            "accurate" => Ok(ModelTier::Accurate),
            other => Err(format!("unknown model tier '{}' (expected fast|accurate)", other)),
        }
    }
}

/// Input for a single pipeline run
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub kind: RequestKind,
    pub input: String,
    pub document: String,
    pub highlighted: Option<String>, // opaque markup of a selected element
    pub history: Vec<ConversationTurn>,
}

/// What a successful run produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineResult {
    Explanation { text: String },
    Candidates { candidates: Vec<CandidateMutation> },
}

/// Structured payload of a change completion
pub type CompletionMessage = CandidateMutation;

/// Structured payload of a pruning completion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckMessage {
    pub different_indices: Vec<i64>,
}

/// Structured payload of an explain completion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExplanationMessage {
    pub explanation: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_uses_changed_wire_name() {
        let json = r#"{"html":"<p></p>","changed":"<p></p>","explanation":"Added p."}"#;
        let cand: CandidateMutation = serde_json::from_str(json).unwrap();
        assert_eq!(cand.changed_fragment, "<p></p>");
    }

    #[test]
    fn test_stage_wire_names() {
        let s = serde_json::to_string(&PipelineStage::PruningSuggestions).unwrap();
        assert_eq!(s, "\"pruning-suggestions\"");
        assert_eq!(PipelineStage::PruningSuggestions.to_string(), "pruning-suggestions");
        assert_eq!(PipelineStage::default(), PipelineStage::Idle);
    }

    #[test]
    fn test_model_tier_parse() {
        assert_eq!("Fast".parse::<ModelTier>(), Ok(ModelTier::Fast));
        assert_eq!(" accurate ".parse::<ModelTier>(), Ok(ModelTier::Accurate));
        assert!("huge".parse::<ModelTier>().is_err());
    }
}
