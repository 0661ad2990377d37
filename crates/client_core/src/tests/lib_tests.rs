use super::*;
use std::time::Duration;

use axum::{http::StatusCode, routing::get, Json, Router};
use renderer_integration::InMemoryRenderer;
use shared::protocol::DocumentSnapshot;
use tokio::net::TcpListener;

async fn spawn_scene_server(app: Router) -> String {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{addr}")
}

fn scene_route(body: serde_json::Value) -> Router {
    Router::new().route("/scene", get(move || async move { Json(body) }))
}

fn session_against(server_url: &str, probe: &InMemoryRenderer) -> VolumeSession {
    let settings = SessionSettings {
        scene_service_url: Some(server_url.to_string()),
        ..SessionSettings::default()
    };
    VolumeSession::from_settings(probe.clone(), &settings).expect("session")
}

async fn wait_for_resolution(
    events: &mut broadcast::Receiver<SessionEvent>,
    job_id: &JobId,
) -> JobStatus {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await.expect("event stream") {
                SessionEvent::JobResolved { job_id: id, status } if &id == job_id => {
                    return status
                }
                _ => continue,
            }
        }
    })
    .await
    .expect("job did not resolve")
}

async fn submit_and_wait(session: &VolumeSession, tool: &str) -> (JobId, JobStatus) {
    let mut events = session.subscribe_events();
    let job_id = session.submit(Some(tool)).await.expect("submit");
    let status = wait_for_resolution(&mut events, &job_id).await;
    (job_id, status)
}

#[tokio::test]
async fn submitted_job_completes_with_processed_scene() {
    let server_url = spawn_scene_server(scene_route(serde_json::json!({
        "imageOptionsArray": [{"name": "seg.nii.gz", "url": "http://files/seg.nii.gz"}]
    })))
    .await;
    let probe = InMemoryRenderer::new();
    let session = session_against(&server_url, &probe);

    session.load_url("http://files/a.nii.gz").await.expect("load a");
    let b = session.load_url("http://files/b.nii.gz").await.expect("load b");
    assert!(session.toggle_selection(&b).await.expect("select b"));

    let mut events = session.subscribe_events();
    let job_id = session.submit(Some("segmentation")).await.expect("submit");

    let history = session.history().await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, job_id);
    assert_eq!(history[0].tool_name, "Segmentation");

    assert_eq!(
        wait_for_resolution(&mut events, &job_id).await,
        JobStatus::Completed
    );
    let record = session.record(&job_id).await.expect("record");
    assert_eq!(record.result().map(DocumentSnapshot::volume_count), Some(1));
    assert!(record.error().is_none());

    let remaining: Vec<_> = probe.volumes().into_iter().map(|v| v.id).collect();
    assert_eq!(remaining, vec![b], "unselected volume pruned from renderer");
}

#[tokio::test]
async fn service_error_marks_job_failed() {
    let app = Router::new().route(
        "/scene",
        get(|| async { (StatusCode::BAD_GATEWAY, "upstream unavailable") }),
    );
    let server_url = spawn_scene_server(app).await;
    let probe = InMemoryRenderer::new();
    let session = session_against(&server_url, &probe);

    let id = session.load_url("http://files/a.nii.gz").await.expect("load");
    session.toggle_selection(&id).await.expect("select");

    let (job_id, status) = submit_and_wait(&session, "denoise").await;
    assert_eq!(status, JobStatus::Failed);

    let record = session.record(&job_id).await.expect("record");
    assert!(record.result().is_none());
    assert!(!record.error().expect("error").is_empty());

    let err = session.view_result(&job_id).await.expect_err("no result");
    assert!(matches!(
        err,
        SessionError::View(ViewError::NoResult {
            status: JobStatus::Failed,
            error: Some(_),
            ..
        })
    ));
    assert!(probe.load_calls().is_empty());
}

#[tokio::test]
async fn empty_scene_is_not_loaded() {
    let server_url =
        spawn_scene_server(scene_route(serde_json::json!({ "imageOptionsArray": [] }))).await;
    let probe = InMemoryRenderer::new();
    let session = session_against(&server_url, &probe);

    let id = session.load_url("http://files/a.nii.gz").await.expect("load");
    session.toggle_selection(&id).await.expect("select");
    let (job_id, status) = submit_and_wait(&session, "segmentation").await;
    assert_eq!(status, JobStatus::Completed);

    let err = session.view_result(&job_id).await.expect_err("empty");
    assert!(matches!(err, SessionError::View(ViewError::EmptyResult(ref id)) if id == &job_id));
    assert!(probe.load_calls().is_empty());
}

#[tokio::test]
async fn viewing_a_completed_job_replaces_renderer_volumes() {
    let server_url = spawn_scene_server(scene_route(serde_json::json!({
        "imageOptionsArray": [
            {"name": "seg.nii.gz", "url": "http://files/seg.nii.gz"},
            {"name": "mask.nii.gz", "url": "http://files/mask.nii.gz"}
        ]
    })))
    .await;
    let probe = InMemoryRenderer::new();
    let session = session_against(&server_url, &probe);

    let id = session.load_url("http://files/a.nii.gz").await.expect("load");
    session.toggle_selection(&id).await.expect("select");
    let (job_id, _) = submit_and_wait(&session, "segmentation").await;

    let mut events = session.subscribe_events();
    let outcome = session.view_result(&job_id).await.expect("view");
    assert_eq!(outcome.volumes_loaded, 2);
    assert_eq!(probe.load_calls(), vec![2]);

    let names: Vec<_> = probe.volumes().into_iter().map(|v| v.name).collect();
    assert_eq!(names, vec!["seg.nii.gz", "mask.nii.gz"]);
    assert_eq!(
        events.recv().await.expect("event"),
        SessionEvent::ResultLoaded { job_id, volumes: 2 }
    );
    // The registry is not rewritten by a result load.
    assert_eq!(session.images().await.len(), 1);
}

#[tokio::test]
async fn resubmitting_after_viewing_keeps_loaded_result() {
    let server_url = spawn_scene_server(scene_route(serde_json::json!({
        "imageOptionsArray": [{"name": "seg.nii.gz", "url": "http://files/seg.nii.gz"}]
    })))
    .await;
    let probe = InMemoryRenderer::new();
    let session = session_against(&server_url, &probe);

    let id = session.load_url("http://files/a.nii.gz").await.expect("load");
    session.toggle_selection(&id).await.expect("select");
    let (first, _) = submit_and_wait(&session, "segmentation").await;
    session.view_result(&first).await.expect("view");
    assert_eq!(probe.volumes().len(), 1);

    let (second, _) = submit_and_wait(&session, "denoise").await;

    let names: Vec<_> = probe.volumes().into_iter().map(|v| v.name).collect();
    assert_eq!(names, vec!["seg.nii.gz"]);
    let record = session.record(&second).await.expect("record");
    assert_eq!(record.submitted_snapshot.volume_count(), 1);
}

#[tokio::test]
async fn renderer_load_failure_surfaces_as_view_error() {
    let server_url = spawn_scene_server(scene_route(serde_json::json!({
        "imageOptionsArray": [{"name": "seg.nii.gz"}]
    })))
    .await;
    let probe = InMemoryRenderer::failing_loads("decoder missing");
    let session = session_against(&server_url, &probe);

    let id = session.load_url("http://files/a.nii.gz").await.expect("load");
    session.toggle_selection(&id).await.expect("select");
    let (job_id, _) = submit_and_wait(&session, "segmentation").await;

    let err = session.view_result(&job_id).await.expect_err("load failure");
    match err {
        SessionError::View(ViewError::Load { message, .. }) => {
            assert!(message.contains("decoder missing"), "message: {message}")
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn view_result_rejects_pending_and_unknown_jobs() {
    let session = VolumeSession::new_with_dependencies(
        RendererHandle::new(InMemoryRenderer::new()),
        Arc::new(PendingSceneSource),
        OrchestratorOptions::default(),
    );
    let id = session.load_url("a.nii").await.expect("load");
    session.toggle_selection(&id).await.expect("select");
    let job_id = session.submit(Some("segmentation")).await.expect("submit");

    let err = session.view_result(&job_id).await.expect_err("pending");
    assert!(matches!(
        err,
        SessionError::View(ViewError::NoResult {
            status: JobStatus::Pending,
            error: None,
            ..
        })
    ));

    let missing = JobId::from("no-such-job");
    let err = session.view_result(&missing).await.expect_err("unknown");
    assert!(matches!(err, SessionError::View(ViewError::UnknownJob(ref id)) if id == &missing));
}

struct PendingSceneSource;

#[async_trait::async_trait]
impl SceneSource for PendingSceneSource {
    async fn fetch_scene(&self) -> Result<DocumentSnapshot, ResolutionError> {
        futures::future::pending().await
    }
}

#[tokio::test]
async fn unconfigured_service_fails_every_job() {
    let session = VolumeSession::new(InMemoryRenderer::new());
    let id = session.load_url("a.nii").await.expect("load");
    session.toggle_selection(&id).await.expect("select");

    let (job_id, status) = submit_and_wait(&session, "segmentation").await;
    assert_eq!(status, JobStatus::Failed);
    let record = session.record(&job_id).await.expect("record");
    assert!(record.error().expect("error").contains("not configured"));
}

#[tokio::test]
async fn submit_without_selection_records_nothing() {
    let probe = InMemoryRenderer::new();
    let session = VolumeSession::new(probe.clone());
    session.load_url("a.nii").await.expect("load");

    let err = session.submit(Some("segmentation")).await.expect_err("empty");
    assert!(matches!(
        err,
        SessionError::Validation(ValidationError::NoImagesSelected)
    ));
    assert!(session.history().await.is_empty());
    assert_eq!(probe.volumes().len(), 1);
}

#[tokio::test]
async fn duplicate_volume_is_rejected_without_touching_renderer() {
    let probe = InMemoryRenderer::new();
    let session = VolumeSession::new(probe.clone());
    let volume = Volume::from_url("http://files/a.nii.gz").expect("volume");

    session.load_volume(volume.clone()).await.expect("first");
    let err = session.load_volume(volume.clone()).await.expect_err("dup");
    assert!(matches!(
        err,
        SessionError::Registry(RegistryError::DuplicateId(ref id)) if id == &volume.id
    ));
    assert_eq!(probe.volumes().len(), 1);
    assert_eq!(session.images().await.len(), 1);
}

#[tokio::test]
async fn set_active_and_view_mode_drive_the_renderer() {
    let probe = InMemoryRenderer::new();
    let session = VolumeSession::new(probe.clone());
    let a = session.load_url("a.nii").await.expect("a");
    let b = session.load_url("b.nii").await.expect("b");

    session.set_active(1).await.expect("active");
    assert_eq!(session.active_index().await, Some(1));
    assert_eq!(probe.opacity_of(&a), Some(0.0));
    assert_eq!(probe.opacity_of(&b), Some(1.0));

    let err = session.set_active(2).await.expect_err("out of range");
    assert!(matches!(
        err,
        SessionError::Visibility(VisibilityError::IndexOutOfRange { index: 2, len: 2 })
    ));
    assert_eq!(session.active_index().await, Some(1));

    let code = session.set_view_mode(ViewMode::Render).await;
    assert_eq!(code, SliceTypeCode::RENDER);
    assert_eq!(probe.slice_type(), Some(SliceTypeCode::RENDER));
}

#[tokio::test]
async fn session_operations_emit_events() {
    let session = VolumeSession::new(InMemoryRenderer::new());
    let mut events = session.subscribe_events();

    let id = session.load_url("http://files/a.nii.gz").await.expect("load");
    session.toggle_selection(&id).await.expect("select");
    session.toggle_selection(&id).await.expect("deselect");
    session.set_view_mode(ViewMode::Coronal).await;
    let removed = session.clear_history().await;

    let mut received = Vec::new();
    while let Ok(event) = events.try_recv() {
        received.push(event);
    }
    assert_eq!(
        received,
        vec![
            SessionEvent::ImageLoaded {
                image_id: id.clone(),
                name: "a.nii.gz".into(),
            },
            SessionEvent::SelectionChanged {
                image_id: id.clone(),
                selected: true,
            },
            SessionEvent::SelectionChanged {
                image_id: id,
                selected: false,
            },
            SessionEvent::ViewModeChanged {
                mode: ViewMode::Coronal,
                code: SliceTypeCode::CORONAL,
            },
            SessionEvent::HistoryCleared { removed },
        ]
    );
    assert_eq!(removed, 0);
}

#[tokio::test]
async fn delete_and_clear_history_through_session() {
    let session = VolumeSession::new(InMemoryRenderer::new());
    let id = session.load_url("a.nii").await.expect("load");
    session.toggle_selection(&id).await.expect("select");

    let (first, _) = submit_and_wait(&session, "segmentation").await;
    let (second, _) = submit_and_wait(&session, "denoise").await;
    let (third, _) = submit_and_wait(&session, "registration").await;

    assert!(session.delete_record(&second).await);
    let order: Vec<_> = session.history().await.into_iter().map(|r| r.id).collect();
    assert_eq!(order, vec![third, first]);

    assert_eq!(session.clear_history().await, 2);
    assert!(session.history().await.is_empty());
}

#[test]
fn session_errors_render_their_source_message() {
    let err = SessionError::from(ValidationError::NoToolSelected);
    assert_eq!(err.to_string(), "choose a processing tool before submitting");
}

#[test]
#[should_panic]
fn session_construction_needs_a_tokio_runtime() {
    let _ = VolumeSession::new(InMemoryRenderer::new());
}
