use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use beacon_db::{create_pool, run_migrations, DbRuntimeSettings};
use beacon_engine::{ChangeDetector, IncidentPolicy, StatusBus};
use beacon_server::{app, AppState};
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

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn organization_service_incident_lifecycle() {
    let state = setup_state();
    let app = app(state);

    // Organization
    let response = app
        .clone()
        .oneshot(post("/api/organizations", json!({ "name": "acme" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let org = body_json(response).await;
    let org_id = org["id"].as_i64().unwrap();

    // Service under it
    let response = app
        .clone()
        .oneshot(post(
            "/api/services",
            json!({
                "organization_id": org_id,
                "name": "api",
                "auto_check": true,
                "check_url": "http://localhost:9999/health"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let service = body_json(response).await;
    assert_eq!(service["status"], "Operational");
    assert_eq!(service["auto_check"], true);
    let service_id = service["id"].as_i64().unwrap();

    // Incident against the service
    let response = app
        .clone()
        .oneshot(post(
            "/api/incidents",
            json!({ "service_id": service_id, "description": "elevated latency" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let incident = body_json(response).await;
    assert_eq!(incident["status"], "Ongoing");
    assert_eq!(incident["resolved"], false);
    let incident_id = incident["id"].as_i64().unwrap();

    // Resolve it
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("PATCH")
                .uri(format!("/api/incidents/{incident_id}"))
                .header("content-type", "application/json")
                .body(Body::from(json!({ "status": "Resolved" }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let incident = body_json(response).await;
    assert_eq!(incident["resolved"], true);

    // Listing shows the one service
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/services")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let listing = body_json(response).await;
    assert_eq!(listing["count"], 1);

    // Deleting the organization cascades
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/organizations/{org_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/services")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let listing = body_json(response).await;
    assert_eq!(listing["count"], 0);
}

#[tokio::test]
async fn duplicate_organization_name_conflicts() {
    let state = setup_state();
    let app = app(state);

    let response = app
        .clone()
        .oneshot(post("/api/organizations", json!({ "name": "acme" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .oneshot(post("/api/organizations", json!({ "name": "acme" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn create_service_under_unknown_organization_is_not_found() {
    let state = setup_state();
    let app = app(state);

    let response = app
        .oneshot(post(
            "/api/services",
            json!({ "organization_id": 42, "name": "ghost" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn create_incident_with_bad_status_is_unprocessable() {
    let state = setup_state();
    let app = app(state);

    let response = app
        .oneshot(post(
            "/api/incidents",
            json!({ "service_id": 1, "status": "OnFire", "description": "?" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn empty_organization_name_is_bad_request() {
    let state = setup_state();
    let app = app(state);

    let response = app
        .oneshot(post("/api/organizations", json!({ "name": "" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn health_check_returns_ok() {
    let state = setup_state();
    let app = app(state);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
}
