use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use beacon_db::{create_pool, run_migrations, DbRuntimeSettings};
use beacon_engine::{ChangeDetector, IncidentPolicy, StatusBus};
use beacon_server::{app, AppState};
use beacon_status::store::{create_organization, create_service, CreateServiceParams};
use beacon_types::ServiceStatus;
use serde_json::{json, Value};
use tower::ServiceExt;

fn setup_state() -> AppState {
    let pool = create_pool(
        ":memory:",
        DbRuntimeSettings {
            busy_timeout_ms: 5_000,
            pool_max_size: 1,
        },
    )
    .unwrap();
    {
        let conn = pool.get().unwrap();
        run_migrations(&conn).unwrap();
    }
    let detector = ChangeDetector::new(pool.clone(), StatusBus::default(), IncidentPolicy::Manual);
    AppState {
        pool,
        detector,
        incident_window_hours: 24,
    }
}

fn seed_service(state: &AppState) -> i64 {
    let conn = state.pool.get().unwrap();
    let org = create_organization(&conn, "acme").unwrap();
    create_service(
        &conn,
        &CreateServiceParams {
            organization_id: org.id,
            name: "api".to_string(),
            status: ServiceStatus::Operational,
            auto_check: false,
            check_url: None,
        },
    )
    .unwrap()
    .id
}

fn put_status_request(service_id: i64, status: &str) -> Request<Body> {
    Request::builder()
        .method("PUT")
        .uri(format!("/api/services/{service_id}/status"))
        .header("content-type", "application/json")
        .body(Body::from(json!({ "status": status }).to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn put_status_records_transition() {
    let state = setup_state();
    let service_id = seed_service(&state);
    let app = app(state);

    let response = app
        .oneshot(put_status_request(service_id, "Outage"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["changed"], true);
    assert_eq!(json["event"]["from"], "Operational");
    assert_eq!(json["event"]["to"], "Outage");
    assert_eq!(json["event"]["actor"], "operator");
    assert_eq!(json["event"]["service_id"], service_id);
}

#[tokio::test]
async fn put_same_status_is_noop() {
    let state = setup_state();
    let service_id = seed_service(&state);
    let app = app(state);

    let response = app
        .oneshot(put_status_request(service_id, "Operational"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["changed"], false);
    assert!(json.get("event").is_none());
}

#[tokio::test]
async fn put_invalid_status_is_unprocessable() {
    let state = setup_state();
    let service_id = seed_service(&state);
    let app = app(state);

    let response = app
        .oneshot(put_status_request(service_id, "Exploded"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn put_unknown_service_is_not_found() {
    let state = setup_state();
    let app = app(state);

    let response = app.oneshot(put_status_request(999, "Outage")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn transitions_come_back_newest_first() {
    let state = setup_state();
    let service_id = seed_service(&state);
    let app = app(state.clone());

    for status in ["Degraded", "Outage", "Operational"] {
        let response = app
            .clone()
            .oneshot(put_status_request(service_id, status))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/api/services/{service_id}/transitions?limit=2"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["count"], 2);
    let transitions = json["transitions"].as_array().unwrap();
    assert_eq!(transitions[0]["to"], "Operational");
    assert_eq!(transitions[0]["seq"], 3);
    assert_eq!(transitions[1]["to"], "Outage");
    assert_eq!(transitions[1]["seq"], 2);
}

#[tokio::test]
async fn transitions_unknown_service_is_not_found() {
    let state = setup_state();
    let app = app(state);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/services/999/transitions")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
