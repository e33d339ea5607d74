use actix_web::{web, HttpRequest, HttpResponse};
use x402_failover::auth::bearer_matches;

use crate::metrics::metrics_output;
use crate::state::AppState;

/// GET /health - ok while any facilitator is healthy, degraded otherwise
pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    let monitor = state.failover.health();
    let summary = monitor.health_summary();
    let healthiest = monitor.healthiest_facilitator().map(|record| {
        let name = state
            .failover
            .registry()
            .get(&record.facilitator_id)
            .map(|f| f.name().to_string())
            .unwrap_or_else(|| record.facilitator_id.clone());
        serde_json::json!({
            "id": record.facilitator_id,
            "name": name,
            "averageResponseTimeMs": record.average_response_time_ms,
        })
    });

    let healthy = monitor.has_healthy_facilitator() || summary.total == 0;
    let response = serde_json::json!({
        "status": if healthy { "ok" } else { "degraded" },
        "service": "x402-failover-server",
        "version": env!("CARGO_PKG_VERSION"),
        "facilitators": {
            "total": summary.total,
            "healthy": summary.healthy,
            "unhealthy": summary.unhealthy,
        },
        "healthiestFacilitator": healthiest,
    });

    if healthy {
        HttpResponse::Ok().json(response)
    } else {
        HttpResponse::ServiceUnavailable().json(response)
    }
}

/// GET /metrics - Prometheus metrics endpoint (auth-gated)
pub async fn metrics(req: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
    match state.config.metrics_token {
        Some(ref expected_token) => {
            let header = req
                .headers()
                .get("authorization")
                .and_then(|v| v.to_str().ok());
            if !bearer_matches(header, expected_token) {
                return HttpResponse::Unauthorized().json(serde_json::json!({
                    "error": "unauthorized",
                    "message": "Valid Bearer token required for /metrics"
                }));
            }
        }
        None if !state.config.public_metrics => {
            return HttpResponse::Forbidden().json(serde_json::json!({
                "error": "forbidden",
                "message": "Set METRICS_TOKEN or X402_PUBLIC_METRICS=true to access /metrics"
            }));
        }
        None => {}
    }

    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(metrics_output())
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health))
        .route("/metrics", web::get().to(metrics));
}
