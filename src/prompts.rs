//! Prompt builders for each request kind
//!
//! Pure functions: document text, optional highlighted fragment and user
//! input in, instruction text plus response schema out.

use crate::schema::ResponseSchema;
use crate::types::CandidateMutation;

/// Instruction text paired with the schema its answer must satisfy
#[derive(Debug, Clone)]
pub struct Prompt {
    pub instruction: String,
    pub schema: ResponseSchema,
}

/// Ask for a complete modified document plus explanation and changed part
pub fn build_change_prompt(document: &str, highlighted: Option<&str>, input: &str) -> Prompt {
    let location_hint = match highlighted.map(str::trim) {
        Some(fragment) if !fragment.is_empty() => {
            format!("\nThe change should be made around here: {}.", fragment)
        }
        _ => String::new(),
    };

    let instruction = format!(
        "Based on the following html code: {document}, suggest a way of making the following changes: {input}.
Make ONLY the changes the user asked for above.{location_hint}
Reply in the following JSON format: {{\"html\": \"...\", \"explanation\": \"...\", \"changed\": \"...\"}},
where the \"html\" field should contain the suggested HTML code and the \"explanation\" field should contain one sentence describing what was changed, followed by two sentences on how the generated code works.
The \"html\" field must contain the entire HTML code of the website, including ALL previous content and changes. UNDER NO CIRCUMSTANCES skip or abbreviate any part of the input HTML in your response.
Always return the entire code, even the unchanged parts.
The \"changed\" field should contain only the changed part of the HTML code.
ALL HTML code elements must have an id attribute.
Your answer must contain nothing other than the JSON object."
    );

    Prompt {
        instruction,
        schema: ResponseSchema::change(),
    }
}

/// Ask which candidates are mutually different, listing only their changed fragments
pub fn build_pruning_prompt(candidates: &[CandidateMutation]) -> Prompt {
    let listing = candidates
        .iter()
        .enumerate()
        .map(|(idx, cand)| format!("{}. {}", idx, cand.changed_fragment))
        .collect::<Vec<_>>()
        .join("\n");

    let instruction = format!(
        "Based on the following list of HTML code changes, keep only the ones that are different from each other.
Return the zero-based indices of the changes that are different from each other in the following JSON format: {{\"differentIndices\": [number, number, number]}}.
The array ALWAYS contains at least one number. DO NOT return an empty array.
UNDER NO CIRCUMSTANCES reply with anything other than the JSON object.

{listing}"
    );

    Prompt {
        instruction,
        schema: ResponseSchema::pruning(),
    }
}

/// Ask for a free-text answer, with the document as optional context
pub fn build_explain_prompt(document: &str, input: &str) -> Prompt {
    let instruction = format!(
        "Answer the following question: {input}.
The answer should be in the following JSON format: {{\"explanation\": \"...\"}}.

The question might be related to the previous messages, or to the following HTML code: {document}."
    );

    Prompt {
        instruction,
        schema: ResponseSchema::explain(),
    }
}
