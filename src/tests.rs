//! End-to-end tests for the pipeline and editor session

use crate::*;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const HELLO: &str = "<body><h1>Hello world!</h1></body>";

/// Helper to create a change completion payload
fn completion(html: &str, changed: &str, explanation: &str) -> String {
    serde_json::json!({
        "html": html,
        "changed": changed,
        "explanation": explanation,
    })
    .to_string()
}

fn pruning(indices: &[i64]) -> String {
    serde_json::json!({ "differentIndices": indices }).to_string()
}

fn build(backend: ScriptedBackend, history: DocumentHistory) -> (Arc<ScriptedBackend>, Arc<DocumentPipeline>, EditorSession) {
    let backend = Arc::new(backend);
    let gateway = Gateway::new(
        backend.clone(),
        ModelCatalog::default(),
        ModelTier::Accurate,
        Duration::from_secs(5),
    );
    let pipeline = Arc::new(DocumentPipeline::new(Arc::new(gateway)));
    let session = EditorSession::new(pipeline.clone(), history);
    (backend, pipeline, session)
}

/// Observer recording every stage it sees
#[derive(Default)]
struct StageRecorder {
    stages: Mutex<Vec<PipelineStage>>,
}

impl StageObserver for StageRecorder {
    fn on_stage(&self, stage: PipelineStage) {
        self.stages.lock().unwrap().push(stage);
    }
}

impl StageRecorder {
    fn stages(&self) -> Vec<PipelineStage> {
        self.stages.lock().unwrap().clone()
    }
}

#[tokio::test]
async fn test_end_to_end_italic_change() {
    let italic = "<body><h1><i>Hello world!</i></h1></body>";
    let emphasized = "<body><h1><em>Hello world!</em></h1></body>";
    let backend = ScriptedBackend::new()
        .push_payloads(vec![
            completion(italic, "<i>Hello world!</i>", "Wrapped the title in i."),
            completion(italic, "<i>Hello world!</i>", "Wrapped the title in i."),
            completion(emphasized, "<em>Hello world!</em>", "Wrapped the title in em."),
        ])
        .push_payloads(vec![pruning(&[0, 2])]);
    let (backend, _, session) = build(backend, DocumentHistory::new(HELLO));
    let recorder = StageRecorder::default();

    let outcome = session
        .submit(RequestKind::Change, "make this italic", None, Some(&recorder))
        .await
        .unwrap();

    let candidates = match outcome {
        TurnOutcome::Pending { candidates } => candidates,
        other => panic!("expected pending candidates, got {:?}", other),
    };
    assert_eq!(candidates.len(), 2);
    assert_eq!(candidates[0].html, "<body>\n  <h1><i>Hello world!</i></h1>\n</body>");
    assert_eq!(candidates[1].explanation, "Wrapped the title in em.");

    assert_eq!(
        recorder.stages(),
        vec![PipelineStage::Suggestions, PipelineStage::PruningSuggestions, PipelineStage::Idle]
    );

    let requests = backend.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].candidate_count, CANDIDATE_COUNT);
    assert_eq!(requests[1].candidate_count, 1);

    // only the user turn is recorded while candidates are pending
    let view = session.view().await;
    assert_eq!(view.entries.len(), 1);
    assert_eq!(view.document, HELLO);
    assert_eq!(view.pending.len(), 2);

    let accepted = session.accept(0).await.unwrap();
    let view = session.view().await;
    assert_eq!(view.entries.len(), 2);
    assert_eq!(view.entries[1].snapshot.as_deref(), Some(accepted.html.as_str()));
    assert_eq!(view.document, candidates[0].html);
    assert!(view.pending.is_empty());
}

#[tokio::test]
async fn test_stage_reported_before_call() {
    let backend = ScriptedBackend::new()
        .push_payloads(vec![
            completion("<p>a</p>", "a", "a"),
            completion("<p>b</p>", "b", "b"),
        ])
        .push_payloads(vec![pruning(&[0, 1])]);
    let (backend, pipeline, _) = build(backend, DocumentHistory::new(HELLO));

    let seen: Mutex<Vec<(PipelineStage, usize)>> = Mutex::new(Vec::new());
    let observer = |stage: PipelineStage| {
        seen.lock().unwrap().push((stage, backend.requests().len()));
    };

    let request = TurnRequest {
        kind: RequestKind::Change,
        input: "split".to_string(),
        document: HELLO.to_string(),
        highlighted: None,
        history: vec![],
    };
    pipeline.run(&request, &observer).await.unwrap();

    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            (PipelineStage::Suggestions, 0),
            (PipelineStage::PruningSuggestions, 1),
            (PipelineStage::Idle, 2),
        ]
    );
}

#[tokio::test]
async fn test_single_candidate_is_applied_without_pruning() {
    let backend = ScriptedBackend::new().push_payloads(vec![
        completion("<body><h1 id=\"t\">Hi</h1></body>", "<h1 id=\"t\">Hi</h1>", "Shortened the title."),
        "{\"html\": truncated".to_string(),
    ]);
    let (backend, _, session) = build(backend, DocumentHistory::new(HELLO));

    let outcome = session
        .submit(RequestKind::Change, "shorter title", None, None)
        .await
        .unwrap();

    assert!(matches!(outcome, TurnOutcome::Applied { .. }));
    assert_eq!(backend.requests().len(), 1);

    let view = session.view().await;
    assert_eq!(view.document, "<body>\n  <h1 id=\"t\">Hi</h1>\n</body>");
    assert_eq!(view.entries.len(), 2);
    assert_eq!(view.entries[0].turn, ConversationTurn::user("shorter title"));
    assert_eq!(view.entries[1].turn, ConversationTurn::assistant("Shortened the title."));
}

#[tokio::test]
async fn test_explain_never_changes_document() {
    let backend = ScriptedBackend::new().push_payloads(vec![r#"{"explanation": "It is the page title."}"#]);
    let (_, _, session) = build(backend, DocumentHistory::seeded());
    let before = session.view().await;
    let recorder = StageRecorder::default();

    let outcome = session
        .submit(RequestKind::Explain, "what is the h1?", None, Some(&recorder))
        .await
        .unwrap();

    assert_eq!(
        outcome,
        TurnOutcome::Explained {
            explanation: "It is the page title.".to_string()
        }
    );
    assert_eq!(recorder.stages(), vec![PipelineStage::Explaining, PipelineStage::Idle]);

    let after = session.view().await;
    assert_eq!(after.document, before.document);
    assert_eq!(after.entries.len(), before.entries.len() + 2);
    assert!(after.entries[before.entries.len()..]
        .iter()
        .all(|e| e.snapshot.as_deref() == Some(before.document.as_str())));
}

#[tokio::test]
async fn test_zero_parseable_completions_fail_cleanly() {
    let backend = ScriptedBackend::new().push_payloads(vec!["nope", "{}", "{\"html\": 1}"]);
    let (_, _, session) = build(backend, DocumentHistory::new(HELLO));

    let outcome = session
        .submit(RequestKind::Change, "make it red", None, None)
        .await
        .unwrap();

    let reason = match outcome {
        TurnOutcome::Failed { reason } => reason,
        other => panic!("expected failure, got {:?}", other),
    };
    assert!(reason.contains("no usable response"));

    let view = session.view().await;
    assert_eq!(view.document, HELLO);
    assert_eq!(view.stage, PipelineStage::Idle);
    assert_eq!(view.entries.len(), 2);
    assert!(view.entries[1]
        .turn
        .content
        .starts_with("There was an error completing this request: "));
}

#[tokio::test]
async fn test_pruning_failure_keeps_all_candidates() {
    let backend = ScriptedBackend::new()
        .push_payloads(vec![
            completion("<p>1</p>", "1", "one"),
            completion("<p>2</p>", "2", "two"),
            completion("<p>3</p>", "3", "three"),
        ])
        .push_payloads(vec![pruning(&[])]);
    let (_, _, session) = build(backend, DocumentHistory::new(HELLO));

    let outcome = session
        .submit(RequestKind::Change, "number it", None, None)
        .await
        .unwrap();

    match outcome {
        TurnOutcome::Pending { candidates } => assert_eq!(candidates.len(), 3),
        other => panic!("expected pending candidates, got {:?}", other),
    }
}

#[tokio::test]
async fn test_dismiss_records_turn_and_keeps_document() {
    let backend = ScriptedBackend::new()
        .push_payloads(vec![completion("<p>1</p>", "1", "one"), completion("<p>2</p>", "2", "two")])
        .push_payloads(vec![pruning(&[0, 1])]);
    let (_, _, session) = build(backend, DocumentHistory::new(HELLO));

    session.submit(RequestKind::Change, "number it", None, None).await.unwrap();
    session.dismiss().await.unwrap();

    let view = session.view().await;
    assert_eq!(view.document, HELLO);
    assert!(view.pending.is_empty());
    assert_eq!(view.entries.last().unwrap().turn.content, session::DISMISSED_MESSAGE);
    assert!(matches!(session.dismiss().await, Err(SessionError::NoPendingCandidates)));
}

#[tokio::test]
async fn test_transcript_and_highlight_reach_backend() {
    let backend = ScriptedBackend::new().push_payloads(vec![completion(HELLO, "", "Nothing to do.")]);
    let (backend, _, session) = build(backend, DocumentHistory::seeded());

    session
        .submit(
            RequestKind::Change,
            "make it bigger",
            Some("<h1>Hello world!</h1>".to_string()),
            None,
        )
        .await
        .unwrap();

    let messages = &backend.requests()[0].messages;
    assert_eq!(messages.len(), 4);
    assert_eq!(messages[0].content, "Add a title saying 'Hello world!' to the page.");
    assert_eq!(messages[2], ConversationTurn::user("make it bigger"));
    assert!(messages[3].content.contains(history::SEED_DOCUMENT));
    assert!(messages[3]
        .content
        .contains("The change should be made around here: <h1>Hello world!</h1>."));
}

#[tokio::test]
async fn test_concurrent_turn_is_rejected() {
    let backend = ScriptedBackend::new()
        .push_payloads(vec![r#"{"explanation": "first"}"#])
        .push_payloads(vec![r#"{"explanation": "second"}"#])
        .with_delay(Duration::from_millis(50));
    let (backend, _, session) = build(backend, DocumentHistory::new(HELLO));

    let (first, second) = tokio::join!(
        session.submit(RequestKind::Explain, "one", None, None),
        session.submit(RequestKind::Explain, "two", None, None),
    );

    assert!(matches!(first, Ok(TurnOutcome::Explained { .. })));
    assert!(matches!(second, Err(SessionError::Busy)));
    assert_eq!(backend.requests().len(), 1);
    // the rejected turn left no trace
    assert_eq!(session.view().await.entries.len(), 2);
}

#[tokio::test]
async fn test_pipeline_rejects_overlapping_runs() {
    let backend = ScriptedBackend::new()
        .push_payloads(vec![r#"{"explanation": "first"}"#])
        .with_delay(Duration::from_millis(50));
    let (_, pipeline, _) = build(backend, DocumentHistory::new(HELLO));
    let request = TurnRequest {
        kind: RequestKind::Explain,
        input: "why?".to_string(),
        document: HELLO.to_string(),
        highlighted: None,
        history: vec![],
    };
    let quiet = |_: PipelineStage| {};

    let (first, second) = tokio::join!(pipeline.run(&request, &quiet), pipeline.run(&request, &quiet));
    assert!(first.is_ok());
    assert!(matches!(second, Err(PipelineError::Busy)));
    assert!(!pipeline.is_busy());
}

#[tokio::test]
async fn test_revert_then_commit_through_session() {
    let backend = ScriptedBackend::new()
        .push_payloads(vec![completion("<p>v1</p>", "v1", "first")])
        .push_payloads(vec![completion("<p>v2</p>", "v2", "second")]);
    let (_, _, session) = build(backend, DocumentHistory::new(HELLO));

    session.submit(RequestKind::Change, "v1", None, None).await.unwrap();
    session.submit(RequestKind::Change, "v2", None, None).await.unwrap();
    assert_eq!(session.view().await.entries.len(), 4);

    session.revert_to(1).await.unwrap();
    let view = session.view().await;
    assert_eq!(view.entries.len(), 2);
    assert_eq!(view.document, "<p>v1</p>");

    assert!(matches!(session.revert_to(7).await, Err(SessionError::History(_))));

    session.set_document("<p>by hand</p>").await.unwrap();
    assert_eq!(session.view().await.entries.len(), 2);

    session.reset().await.unwrap();
    let view = session.view().await;
    assert!(view.entries.is_empty());
    assert_eq!(view.document, history::DEFAULT_DOCUMENT);
}

fn two_pending() -> ScriptedBackend {
    ScriptedBackend::new()
        .push_payloads(vec![completion("<p>1</p>", "1", "one"), completion("<p>2</p>", "2", "two")])
        .push_payloads(vec![pruning(&[0, 1])])
}

#[tokio::test]
async fn test_explain_turn_drops_pending_candidates() {
    let backend = two_pending().push_payloads(vec![r#"{"explanation": "A paragraph."}"#]);
    let (_, _, session) = build(backend, DocumentHistory::new(HELLO));

    session.submit(RequestKind::Change, "number it", None, None).await.unwrap();
    assert_eq!(session.view().await.pending.len(), 2);

    session.submit(RequestKind::Explain, "what is this?", None, None).await.unwrap();
    assert!(session.view().await.pending.is_empty());
    assert!(matches!(session.accept(0).await, Err(SessionError::NoPendingCandidates)));
    assert_eq!(session.current_document().await, HELLO);
}

#[tokio::test]
async fn test_hand_edit_drops_pending_candidates() {
    let (_, _, session) = build(two_pending(), DocumentHistory::new(HELLO));

    session.submit(RequestKind::Change, "number it", None, None).await.unwrap();
    session.set_document("<p>hand edit</p>").await.unwrap();

    assert!(session.view().await.pending.is_empty());
    assert!(matches!(session.accept(0).await, Err(SessionError::NoPendingCandidates)));
    assert_eq!(session.current_document().await, "<p>hand edit</p>");
}

#[tokio::test]
async fn test_loading_task_document_drops_pending_candidates() {
    let (_, _, session) = build(two_pending(), DocumentHistory::new(HELLO));

    session.submit(RequestKind::Change, "number it", None, None).await.unwrap();
    session.load_task("camera").await.unwrap();

    let view = session.view().await;
    assert!(view.pending.is_empty());
    assert_eq!(view.document, tasks::CAMERA_DOCUMENT);
}

#[tokio::test]
async fn test_failed_turn_drops_pending_candidates() {
    let backend = two_pending().push_error(GatewayError::Transport("connection reset".to_string()));
    let (_, _, session) = build(backend, DocumentHistory::new(HELLO));

    session.submit(RequestKind::Change, "number it", None, None).await.unwrap();
    let outcome = session.submit(RequestKind::Change, "again", None, None).await.unwrap();

    assert!(matches!(outcome, TurnOutcome::Failed { .. }));
    assert!(session.view().await.pending.is_empty());
    assert_eq!(session.current_document().await, HELLO);
}

#[tokio::test]
async fn test_applied_candidate_keeps_inline_text() {
    let html = "<body><p>Hello<b>world</b>!</p><script>const s = `a\n        b`;</script></body>";
    let backend = ScriptedBackend::new().push_payloads(vec![completion(html, "<b>world</b>", "Bolded.")]);
    let (_, _, session) = build(backend, DocumentHistory::new(HELLO));

    session.submit(RequestKind::Change, "bold world", None, None).await.unwrap();

    let document = session.current_document().await;
    assert_eq!(
        document,
        "<body>\n  <p>Hello<b>world</b>!</p>\n  <script>const s = `a\n        b`;</script>\n</body>"
    );
    assert_eq!(formatter::rendered_text(&document), formatter::rendered_text(html));
}
