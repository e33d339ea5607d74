use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use actix_web::{test, web, App};
use base64::Engine;
use futures::future::{BoxFuture, FutureExt};
use serde_json::{json, Value};
use x402_failover::{
    FacilitatorClient, FacilitatorDescriptor, FacilitatorError, FacilitatorReply, Failover,
    PaymentRequest,
};
use x402_failover_server::{routes, AppState, ServerConfig};

const PAY_TO: &str = "0x209693Bc6afc0C5328bA36FaF03C514EF312287C";

/// What a scripted facilitator does for one operation.
#[derive(Clone)]
enum Step {
    Reply(u16, Value),
    Down,
}

impl Step {
    fn run(&self) -> Result<FacilitatorReply, FacilitatorError> {
        match self {
            Step::Reply(status, body) => Ok(FacilitatorReply::new(*status, body.clone())),
            Step::Down => Err(FacilitatorError::Network("connection refused".to_string())),
        }
    }
}

struct Scripted {
    verify: Step,
    settle: Step,
    calls: AtomicUsize,
}

impl Scripted {
    fn new(verify: Step, settle: Step) -> Arc<Self> {
        Arc::new(Self {
            verify,
            settle,
            calls: AtomicUsize::new(0),
        })
    }

    fn healthy() -> Arc<Self> {
        Self::new(
            Step::Reply(200, json!({"isValid": true, "payer": PAY_TO})),
            Step::Reply(
                200,
                json!({
                    "success": true,
                    "transaction": "0xfeed",
                    "network": "base-sepolia",
                    "payer": PAY_TO,
                }),
            ),
        )
    }

    fn down() -> Arc<Self> {
        Self::new(Step::Down, Step::Down)
    }

    fn step(&self, step: &Step) -> BoxFuture<'_, Result<FacilitatorReply, FacilitatorError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let result = step.run();
        async move { result }.boxed()
    }
}

impl FacilitatorClient for Scripted {
    fn verify<'a>(
        &'a self,
        _: &'a PaymentRequest,
    ) -> BoxFuture<'a, Result<FacilitatorReply, FacilitatorError>> {
        self.step(&self.verify)
    }

    fn settle<'a>(
        &'a self,
        _: &'a PaymentRequest,
    ) -> BoxFuture<'a, Result<FacilitatorReply, FacilitatorError>> {
        self.step(&self.settle)
    }

    fn supported(&self) -> BoxFuture<'_, Result<FacilitatorReply, FacilitatorError>> {
        async {
            Ok(FacilitatorReply::ok(
                json!({"kinds": [{"scheme": "exact", "network": "base-sepolia"}]}),
            ))
        }
        .boxed()
    }

    fn list(&self) -> BoxFuture<'_, Result<FacilitatorReply, FacilitatorError>> {
        async { Ok(FacilitatorReply::ok(json!({"items": []}))) }.boxed()
    }
}

fn config(extra: &[(&str, &str)]) -> ServerConfig {
    let mut vars: HashMap<String, String> = HashMap::new();
    vars.insert("EVM_ADDRESS".into(), PAY_TO.into());
    vars.insert("FACILITATOR_HEALTH_CHECK".into(), "false".into());
    for (k, v) in extra {
        vars.insert(k.to_string(), v.to_string());
    }
    ServerConfig::from_lookup(|key| vars.get(key).cloned()).unwrap()
}

fn state_with(config: ServerConfig, clients: Vec<(&str, Arc<Scripted>)>) -> web::Data<AppState> {
    let entries = clients
        .into_iter()
        .enumerate()
        .map(|(i, (id, client))| {
            let descriptor = FacilitatorDescriptor::new(
                id,
                format!("{id} facilitator"),
                i as i64 + 1,
                format!("https://{id}.example").parse().unwrap(),
            );
            let client: Arc<dyn FacilitatorClient> = client;
            (descriptor, client)
        })
        .collect();
    let failover = Failover::with_clients(config.failover.clone(), entries).unwrap();
    web::Data::new(AppState::new(config, failover).unwrap())
}

fn payment_header() -> String {
    let payload = json!({
        "x402Version": 1,
        "scheme": "exact",
        "network": "base-sepolia",
        "payload": {"signature": "0x00", "authorization": {"from": PAY_TO}},
    });
    base64::engine::general_purpose::STANDARD.encode(payload.to_string())
}

macro_rules! app {
    ($state:expr) => {
        test::init_service(
            App::new()
                .app_data($state.clone())
                .configure(routes::health::configure)
                .configure(routes::status::configure)
                .configure(routes::resources::configure),
        )
        .await
    };
}

#[actix_rt::test]
async fn test_unpaid_request_gets_402_with_requirements() {
    let state = state_with(config(&[]), vec![("primary", Scripted::healthy())]);
    let app = app!(state);

    let req = test::TestRequest::get().uri("/api/weather").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 402);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["x402Version"], 1);
    let accepts = &body["accepts"][0];
    assert_eq!(accepts["scheme"], "exact");
    assert_eq!(accepts["network"], "base-sepolia");
    assert_eq!(accepts["maxAmountRequired"], "1000");
    assert_eq!(accepts["resource"], "/api/weather");
}

#[actix_rt::test]
async fn test_paid_request_fails_over_to_secondary() {
    let primary = Scripted::down();
    let secondary = Scripted::healthy();
    let state = state_with(
        config(&[]),
        vec![("primary", primary.clone()), ("secondary", secondary.clone())],
    );
    let app = app!(state);

    let req = test::TestRequest::get()
        .uri("/api/weather")
        .insert_header(("X-PAYMENT", payment_header()))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    let header = resp
        .headers()
        .get("X-PAYMENT-RESPONSE")
        .expect("settlement header")
        .to_str()
        .unwrap()
        .to_string();
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(header)
        .unwrap();
    let settle: Value = serde_json::from_slice(&decoded).unwrap();
    assert_eq!(settle["transaction"], "0xfeed");

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["paid"], true);
    assert_eq!(body["service"], "x402-weather-api");
    assert_eq!(body["data"]["location"], "New York");

    // verify + settle each tried primary first
    assert_eq!(primary.calls.load(Ordering::SeqCst), 2);
    assert_eq!(secondary.calls.load(Ordering::SeqCst), 2);

    let stats = state.failover.log().stats("primary").unwrap();
    assert_eq!(stats.failure_count, 2);
    let stats = state.failover.log().stats("secondary").unwrap();
    assert_eq!(stats.operations.verify, 1);
    assert_eq!(stats.operations.settle, 1);
}

#[actix_rt::test]
async fn test_all_facilitators_down_returns_503() {
    let state = state_with(
        config(&[]),
        vec![("primary", Scripted::down()), ("secondary", Scripted::down())],
    );
    let app = app!(state);

    let req = test::TestRequest::get()
        .uri("/api/premium-data")
        .insert_header(("X-PAYMENT", payment_header()))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 503);
    assert_eq!(resp.headers().get("Retry-After").unwrap(), "60");

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(
        body["error"],
        "All payment facilitators are currently unavailable"
    );
    let details = body["details"].as_array().unwrap();
    assert_eq!(details.len(), 2);
    assert_eq!(details[0]["facilitator"], "primary facilitator");
    assert_eq!(details[1]["facilitator"], "secondary facilitator");
}

#[actix_rt::test]
async fn test_invalid_payment_is_402_with_reason() {
    let rejecting = Scripted::new(
        Step::Reply(200, json!({"isValid": false, "invalidReason": "insufficient_funds"})),
        Step::Down,
    );
    let state = state_with(config(&[]), vec![("primary", rejecting.clone())]);
    let app = app!(state);

    let req = test::TestRequest::get()
        .uri("/api/analytics")
        .insert_header(("X-PAYMENT", payment_header()))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 402);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "insufficient_funds");
    // settle never attempted
    assert_eq!(rejecting.calls.load(Ordering::SeqCst), 1);
}

#[actix_rt::test]
async fn test_client_error_reply_does_not_fail_over() {
    let primary = Scripted::new(
        Step::Reply(400, json!({"error": "malformed payload"})),
        Step::Down,
    );
    let secondary = Scripted::healthy();
    let state = state_with(
        config(&[]),
        vec![("primary", primary), ("secondary", secondary.clone())],
    );
    let app = app!(state);

    let req = test::TestRequest::get()
        .uri("/api/weather")
        .insert_header(("X-PAYMENT", payment_header()))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 402);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "malformed payload");
    assert_eq!(secondary.calls.load(Ordering::SeqCst), 0);
}

#[actix_rt::test]
async fn test_last_server_fault_is_replayed() {
    let faulty = Scripted::new(
        Step::Reply(502, json!({"error": "rpc unavailable"})),
        Step::Down,
    );
    let state = state_with(
        config(&[]),
        vec![("primary", Scripted::down()), ("secondary", faulty)],
    );
    let app = app!(state);

    let req = test::TestRequest::get()
        .uri("/api/weather")
        .insert_header(("X-PAYMENT", payment_header()))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 502);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "rpc unavailable");
}

#[actix_rt::test]
async fn test_garbage_payment_header_is_400() {
    let state = state_with(config(&[]), vec![("primary", Scripted::healthy())]);
    let app = app!(state);

    let req = test::TestRequest::get()
        .uri("/api/weather")
        .insert_header(("X-PAYMENT", "!!!"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
}

#[actix_rt::test]
async fn test_status_sections_selectable() {
    let state = state_with(
        config(&[]),
        vec![("primary", Scripted::healthy()), ("secondary", Scripted::healthy())],
    );
    let app = app!(state);

    let req = test::TestRequest::get()
        .uri("/facilitator-status?include=config")
        .to_request();
    let body: Value = test::read_body_json(test::call_service(&app, req).await).await;
    assert_eq!(body["enabled"], true);
    assert!(body.get("health").is_none());
    assert!(body.get("statistics").is_none());
    let facilitators = body["config"]["facilitators"].as_array().unwrap();
    assert_eq!(facilitators.len(), 2);
    assert_eq!(facilitators[0]["id"], "primary");
    assert_eq!(facilitators[0]["timeoutMs"], 5000);
    assert_eq!(facilitators[0]["hasAuth"], false);
    assert_eq!(body["config"]["settings"]["retries"], 1);

    let req = test::TestRequest::get().uri("/facilitator-status").to_request();
    let body: Value = test::read_body_json(test::call_service(&app, req).await).await;
    assert_eq!(body["health"]["summary"]["total"], 2);
    assert_eq!(body["health"]["facilitators"][0]["successRate"], "N/A");
    assert_eq!(body["statistics"]["summary"]["totalOperations"], 0);
    assert_eq!(body["statistics"]["window"]["windowMinutes"], 5);
    assert!(body["logs"].as_array().unwrap().is_empty());
}

#[actix_rt::test]
async fn test_log_limit_applies() {
    let state = state_with(
        config(&[]),
        vec![("primary", Scripted::down()), ("secondary", Scripted::healthy())],
    );
    let app = app!(state);
    for _ in 0..3 {
        state.failover.supported().await.unwrap();
    }

    let req = test::TestRequest::get()
        .uri("/facilitator-status?include=logs&logLimit=2")
        .to_request();
    let body: Value = test::read_body_json(test::call_service(&app, req).await).await;
    assert_eq!(body["logs"].as_array().unwrap().len(), 2);
}

#[actix_rt::test]
async fn test_disable_action_removes_facilitator_from_dispatch() {
    let primary = Scripted::healthy();
    let secondary = Scripted::healthy();
    let state = state_with(
        config(&[]),
        vec![("primary", primary.clone()), ("secondary", secondary.clone())],
    );
    let app = app!(state);

    let req = test::TestRequest::post()
        .uri("/facilitator-status")
        .set_json(json!({"action": "disable-facilitator", "facilitatorId": "primary"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    let req = test::TestRequest::get()
        .uri("/api/weather")
        .insert_header(("X-PAYMENT", payment_header()))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);
    assert_eq!(primary.calls.load(Ordering::SeqCst), 0);
    assert_eq!(secondary.calls.load(Ordering::SeqCst), 2);

    let req = test::TestRequest::post()
        .uri("/facilitator-status")
        .set_json(json!({"action": "enable-facilitator", "facilitatorId": "nobody"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);

    let req = test::TestRequest::post()
        .uri("/facilitator-status")
        .set_json(json!({"action": "enable-facilitator"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);
}

#[actix_rt::test]
async fn test_check_health_and_unknown_action() {
    let state = state_with(config(&[]), vec![("primary", Scripted::healthy())]);
    let app = app!(state);

    let req = test::TestRequest::post()
        .uri("/facilitator-status")
        .set_json(json!({"action": "check-health"}))
        .to_request();
    let body: Value = test::read_body_json(test::call_service(&app, req).await).await;
    assert_eq!(body["success"], true);
    let record = &body["health"]["facilitators"][0];
    assert_eq!(record["isHealthy"], true);
    assert_eq!(record["totalSuccesses"], 1);
    assert_eq!(record["successRate"], "100.00%");

    let req = test::TestRequest::post()
        .uri("/facilitator-status")
        .set_json(json!({"action": "explode"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "Unknown action");
    assert_eq!(body["validActions"].as_array().unwrap().len(), 4);
}

#[actix_rt::test]
async fn test_reset_stats_action() {
    let state = state_with(config(&[]), vec![("primary", Scripted::healthy())]);
    let app = app!(state);
    state.failover.supported().await.unwrap();
    state.failover.health().check_all().await;

    let req = test::TestRequest::post()
        .uri("/facilitator-status")
        .set_json(json!({"action": "reset-stats"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);

    let stats = state.failover.log().stats("primary").unwrap();
    assert_eq!(stats.success_count, 0);
    let health = state.failover.health().get_health("primary").unwrap();
    assert_eq!(health.total_successes, 0);
}

#[actix_rt::test]
async fn test_status_token_required_when_configured() {
    let state = state_with(
        config(&[("STATUS_TOKEN", "let-me-in")]),
        vec![("primary", Scripted::healthy())],
    );
    let app = app!(state);

    let req = test::TestRequest::get().uri("/facilitator-status").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 401);

    let req = test::TestRequest::get()
        .uri("/facilitator-status")
        .insert_header(("Authorization", "Bearer let-me-in"))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);
}

#[actix_rt::test]
async fn test_metrics_gating() {
    let state = state_with(config(&[]), vec![("primary", Scripted::healthy())]);
    let app = app!(state);
    let req = test::TestRequest::get().uri("/metrics").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 403);

    let state = state_with(
        config(&[("METRICS_TOKEN", "scrape")]),
        vec![("primary", Scripted::healthy())],
    );
    let app = app!(state);
    let req = test::TestRequest::get().uri("/metrics").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 401);
    let req = test::TestRequest::get()
        .uri("/metrics")
        .insert_header(("Authorization", "Bearer scrape"))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);

    let state = state_with(
        config(&[("X402_PUBLIC_METRICS", "true")]),
        vec![("primary", Scripted::healthy())],
    );
    let app = app!(state);
    let req = test::TestRequest::get().uri("/metrics").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);
}

#[actix_rt::test]
async fn test_health_reports_degraded_when_all_unhealthy() {
    let state = state_with(
        config(&[]),
        vec![("primary", Scripted::healthy()), ("secondary", Scripted::healthy())],
    );
    let app = app!(state);

    state.failover.health().check_all().await;
    let req = test::TestRequest::get().uri("/health").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "ok");
    assert!(body["healthiestFacilitator"]["id"].is_string());

    state.failover.health().set_health_status("primary", false);
    state.failover.health().set_health_status("secondary", false);
    let req = test::TestRequest::get().uri("/health").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 503);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "degraded");
    assert!(body["healthiestFacilitator"].is_null());
}
