//! Draft store contract tests.

mod common;

use std::sync::Arc;
use std::time::Duration;

use artifact_core::{ArtifactBackend, DraftId, EditorError, EditorSession, MemoryBackend, Mode, SubmissionKind};
use common::{image_file, model_file};

fn complete_session() -> EditorSession {
    let mut session = EditorSession::new();
    session.upload_2d(Some(image_file("image.png"))).unwrap();
    session.upload_3d(Some(model_file("model.glb"))).unwrap();
    session
}

#[tokio::test]
async fn browsing_with_no_drafts_shows_an_empty_list() {
    let backend = MemoryBackend::new();
    let mut session = EditorSession::new();

    let drafts = session.select_drafts(&backend).await.unwrap();

    assert!(drafts.is_empty());
    assert_eq!(session.mode(), Mode::BrowseDrafts);
    assert_eq!(backend.request_count(), 1);
}

#[tokio::test]
async fn awaited_save_is_visible_to_the_next_list() {
    let backend = MemoryBackend::new();
    let mut session = complete_session();

    assert!(session.save_draft(&backend).await.unwrap().applied().is_some());
    // saving keeps the composite for further editing
    assert!(session.composite().is_complete());

    let drafts = session.select_drafts(&backend).await.unwrap();
    assert_eq!(drafts.len(), 1);
    assert!(drafts[0].image_url.ends_with("image.png"));
    assert!(drafts[0].model_url.ends_with("model.glb"));
    assert!(drafts[0].transform().is_identity());
}

#[tokio::test]
async fn list_issued_before_a_save_completes_does_not_see_it() {
    let backend = Arc::new(MemoryBackend::with_latency(Duration::from_millis(50)));
    let mut session = complete_session();

    let ticket = session.begin_submission(SubmissionKind::SaveDraft).unwrap();
    let form = ticket.form().clone();
    let writer = Arc::clone(&backend);
    let save = tokio::spawn(async move { writer.save_draft(&form).await });

    assert!(backend.list_drafts().await.unwrap().is_empty());
    assert!(session.is_submitting());

    let outcome = save.await.unwrap();
    assert!(session.finish_save(ticket, outcome).unwrap().applied().is_some());
    assert_eq!(backend.list_drafts().await.unwrap().len(), 1);
}

#[tokio::test]
async fn failed_refresh_keeps_the_previous_snapshot() {
    let backend = MemoryBackend::new();
    let mut session = complete_session();
    session.save_draft(&backend).await.unwrap();
    session.select_drafts(&backend).await.unwrap();

    backend.set_offline(true);
    let err = session.select_drafts(&backend).await.unwrap_err();

    assert!(matches!(err, EditorError::Transport(_)));
    assert_eq!(session.mode(), Mode::BrowseDrafts);
    assert_eq!(session.drafts().len(), 1);
}

#[tokio::test]
async fn draft_preview_is_normalized_like_the_live_model() {
    let backend = MemoryBackend::new();
    let mut session = complete_session();
    let live_placement = session.composite().scene().unwrap().placement();

    session.save_draft(&backend).await.unwrap();
    let id = session.select_drafts(&backend).await.unwrap()[0].id.clone();

    let preview = session.open_draft(&id, &backend).await.unwrap();

    assert_eq!(preview.draft.id, id);
    assert_eq!(preview.scene.placement(), live_placement);
    assert!(preview.scene.bounds().center().length() < 1e-4);
}

#[tokio::test]
async fn unknown_draft_cannot_be_opened() {
    let backend = MemoryBackend::new();
    let mut session = EditorSession::new();
    session.select_drafts(&backend).await.unwrap();

    let err = session.open_draft(&DraftId("missing".to_string()), &backend).await.unwrap_err();
    assert!(matches!(err, EditorError::DraftNotFound(_)));
    assert_eq!(backend.request_count(), 1);
}
