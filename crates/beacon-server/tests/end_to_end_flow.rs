//! The full propagation loop: a failed health check recorded by the poller,
//! an operator recovery through the HTTP API, and a live subscriber
//! observing both changes in order over one bus subscription.

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use beacon_db::{create_pool, run_migrations, DbRuntimeSettings};
use beacon_engine::{
    ChangeDetector, HealthCheck, HealthCheckError, IncidentPolicy, StatusBus, UptimePoller,
};
use beacon_server::{app, AppState};
use beacon_status::store::{create_organization, create_service, CreateServiceParams};
use beacon_types::{ChangeActor, ServiceStatus};
use futures_util::future::BoxFuture;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

/// Health check with a fixed answer.
struct FixedCheck {
    answer: ServiceStatus,
}

impl HealthCheck for FixedCheck {
    fn check_health(
        &self,
        _service_id: i64,
    ) -> BoxFuture<'_, Result<ServiceStatus, HealthCheckError>> {
        let answer = self.answer;
        Box::pin(async move { Ok(answer) })
    }
}

#[tokio::test]
async fn poller_outage_then_operator_recovery() {
    let pool = create_pool(
        ":memory:",
        DbRuntimeSettings {
            busy_timeout_ms: 5_000,
            pool_max_size: 1,
        },
    )
    .unwrap();
    let service_id = {
        let conn = pool.get().unwrap();
        run_migrations(&conn).unwrap();
        let org = create_organization(&conn, "acme").unwrap();
        create_service(
            &conn,
            &CreateServiceParams {
                organization_id: org.id,
                name: "api".to_string(),
                status: ServiceStatus::Operational,
                auto_check: true,
                check_url: None,
            },
        )
        .unwrap()
        .id
    };

    let detector = ChangeDetector::new(pool.clone(), StatusBus::default(), IncidentPolicy::Manual);
    let mut subscriber = detector.bus().subscribe();
    let state = AppState {
        pool: pool.clone(),
        detector: detector.clone(),
        incident_window_hours: 24,
    };
    let app = app(state);

    // The health check starts failing.
    let checker = Arc::new(FixedCheck {
        answer: ServiceStatus::Outage,
    });
    let poller = UptimePoller::new(detector, pool.clone(), checker, Duration::from_millis(10));
    let handle = poller.spawn();

    // The subscriber sees the poller-recorded outage.
    let outage = tokio::time::timeout(Duration::from_secs(2), subscriber.recv())
        .await
        .expect("poller should record the outage")
        .expect("event expected");
    assert_eq!(outage.service_id, service_id);
    assert_eq!(outage.from, ServiceStatus::Operational);
    assert_eq!(outage.to, ServiceStatus::Outage);
    assert_eq!(outage.actor, ChangeActor::Poller);

    // Stop polling before the manual intervention so a tick cannot race
    // the operator's write.
    handle.shutdown().await;

    // Operator marks the service operational through the API.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri(format!("/api/services/{service_id}/status"))
                .header("content-type", "application/json")
                .body(Body::from(json!({ "status": "Operational" }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Same subscription observes the recovery, in order, after the outage.
    let recovery = tokio::time::timeout(Duration::from_secs(2), subscriber.recv())
        .await
        .expect("operator write should broadcast")
        .expect("event expected");
    assert_eq!(recovery.from, ServiceStatus::Outage);
    assert_eq!(recovery.to, ServiceStatus::Operational);
    assert_eq!(recovery.actor, ChangeActor::Operator);

    // The transition log chains without loss.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/services/{service_id}/transitions"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let history: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(history["count"], 2);
    let transitions = history["transitions"].as_array().unwrap();
    assert_eq!(transitions[0]["to"], "Operational");
    assert_eq!(transitions[0]["actor"], "operator");
    assert_eq!(transitions[1]["to"], "Outage");
    assert_eq!(transitions[1]["actor"], "poller");

    // And the status document reflects the recovered state.
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/status")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let doc: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(doc["overall_status"], "Operational");
}
