// Tests for the overlay and status server

use axum::body::Body;
use axum::http::{Request, StatusCode};
use rebuttal_agent::http::{create_router, AppState};
use rebuttal_agent::session::SessionState;
use tower::ServiceExt;

async fn body_text(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let app = create_router(AppState::default());

    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "OK");
}

#[tokio::test]
async fn test_overlay_page() {
    let app = create_router(AppState::default());

    let response = app
        .oneshot(Request::get("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let page = body_text(response).await;
    assert!(page.contains("EventSource(\"/events\")"));
}

#[tokio::test]
async fn test_status_reports_agent_state() {
    let state = AppState::default();
    {
        let mut status = state.status.write().unwrap();
        status.state = SessionState::Listening;
        status.sessions_started = 3;
    }
    let app = create_router(state);

    let response = app
        .oneshot(Request::get("/status").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(json["state"], "listening");
    assert_eq!(json["sessions_started"], 3);
}

#[tokio::test]
async fn test_shutdown_triggers_stop() {
    let state = AppState::default();
    let stop = state.stop.clone();
    let app = create_router(state);

    let response = app
        .oneshot(Request::post("/shutdown").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert!(stop.is_stopped());
}

#[tokio::test]
async fn test_events_stream_content_type() {
    let app = create_router(AppState::default());

    let response = app
        .oneshot(Request::get("/events").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["content-type"],
        "text/event-stream"
    );
}
