use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt as _;
use pretty_assertions::assert_eq;
use tower::ServiceExt as _;

use crate::{
    api::router::new_router,
    service::{State, TaskStatus, UploadKind, UploadOutcome},
    tests::{STYLES_TSV, test_state, wait_for_terminal},
};

fn app() -> (State, Router) {
    let state = test_state();
    let router = new_router(state.clone());
    (state, router)
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health() {
    let (_state, router) = app();
    let response = router
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_unknown_task_is_404() {
    let (_state, router) = app();
    let response = router
        .oneshot(Request::get("/api/tasks/999").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["error"]["type"], "TaskNotFound");
}

#[tokio::test]
async fn test_unknown_upload_kind_is_404() {
    let (_state, router) = app();
    let response = router
        .oneshot(
            Request::post("/api/file/upload/catalog")
                .body(Body::from(STYLES_TSV))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_sync_upload_then_download_round_trip() {
    let (_state, router) = app();
    let response = router
        .clone()
        .oneshot(
            Request::post("/api/file/upload/styles")
                .body(Body::from(STYLES_TSV))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["recordCount"], 2);

    let response = router
        .oneshot(
            Request::get("/api/file/download/styles")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let content = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(content.starts_with("style\tbrand\tcategory\tsub_category\tmrp\tgender\n"));
    assert!(content.contains("STY1\tAcme\tShirts\tCasual\t499.99\tMen"));
}

#[tokio::test]
async fn test_sync_upload_header_mismatch_is_400() {
    let (state, router) = app();
    let response = router
        .oneshot(
            Request::post("/api/file/upload/styles")
                .body(Body::from("style\tbrand\nSTY1\tAcme\n"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["success"], false);
    assert!(state.store.list_styles().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_async_upload_returns_202_and_completes() {
    let (state, router) = app();
    let response = router
        .oneshot(
            Request::post("/api/file/upload/styles/async?fileName=styles.tsv")
                .body(Body::from(STYLES_TSV))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = body_json(response).await;
    assert_eq!(body["kind"], "STYLES_UPLOAD");
    assert_eq!(body["fileName"], "styles.tsv");
    let id = crate::service::tasks::TaskId::from(body["id"].as_i64().unwrap());

    let task = wait_for_terminal(&state, id).await;
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.processed_records, Some(2));
    assert_eq!(state.store.list_styles().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_cancel_terminal_task_is_400() {
    let (state, router) = app();
    match state
        .pipeline()
        .run(UploadKind::Styles, STYLES_TSV.as_bytes(), None)
        .await
        .unwrap()
    {
        UploadOutcome::Done(response) => assert!(response.success),
        UploadOutcome::Cancelled => panic!("unexpected cancellation"),
    }
    let submission = state
        .scheduler
        .submit(
            crate::service::tasks::NewTask::builder()
                .kind(crate::service::tasks::TaskKind::StylesUpload)
                .build(),
            |_handle| async move {
                Ok(crate::service::tasks::TaskOutcome::completed("done"))
            },
        )
        .await
        .unwrap();
    let task = wait_for_terminal(&state, submission.task().id).await;

    let response = router
        .oneshot(
            Request::post(format!("/api/tasks/{}/cancel", task.id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"]["type"], "TaskAlreadyTerminal");
}

#[tokio::test]
async fn test_task_stats_shape() {
    let (_state, router) = app();
    let response = router
        .oneshot(Request::get("/api/tasks/stats").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    for field in ["total", "running", "completed", "failed", "cancelled"] {
        assert_eq!(body[field], 0, "field {field}");
    }
}

#[tokio::test]
async fn test_noos_run_without_sales_fails_via_task() {
    let (state, router) = app();
    let response = router
        .oneshot(
            Request::post("/api/run/noos/async")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = body_json(response).await;
    let id = crate::service::tasks::TaskId::from(body["id"].as_i64().unwrap());

    let task = wait_for_terminal(&state, id).await;
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.error_message.as_deref(), Some("No sales data in range"));
}

#[tokio::test]
async fn test_parameter_set_crud_and_activation() {
    let (_state, router) = app();
    let put = serde_json::json!({
        "liquidationThreshold": 0.25,
        "bestsellerMultiplier": 1.5,
        "minVolumeThreshold": 30.0,
        "consistencyThreshold": 0.7,
    });
    let response = router
        .clone()
        .oneshot(
            Request::put("/api/algo/parameters/aggressive")
                .header(http::header::CONTENT_TYPE, "application/json")
                .body(Body::from(put.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["parameterSet"], "aggressive");
    assert_eq!(body["isActive"], false);

    let response = router
        .clone()
        .oneshot(
            Request::post("/api/algo/parameters/aggressive/activate")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["isActive"], true);

    let response = router
        .oneshot(
            Request::get("/api/algo/parameters")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["count"], 1);
}

#[tokio::test]
async fn test_clear_all_purges_business_data() {
    let (state, router) = app();
    match state
        .pipeline()
        .run(UploadKind::Styles, STYLES_TSV.as_bytes(), None)
        .await
        .unwrap()
    {
        UploadOutcome::Done(response) => assert!(response.success),
        UploadOutcome::Cancelled => panic!("unexpected cancellation"),
    }
    assert_eq!(state.store.list_styles().await.unwrap().len(), 2);

    let response = router
        .oneshot(
            Request::delete("/api/data/clear-all")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(state.store.list_styles().await.unwrap().is_empty());

    // The purge itself is auditable.
    let audit = state.store.list_audit(5).await.unwrap();
    assert_eq!(audit[0].action, crate::service::AuditAction::ClearAll);
}
