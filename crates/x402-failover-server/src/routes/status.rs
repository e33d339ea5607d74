//! Operator view of the facilitator pool: health, statistics, recent log
//! entries and configuration, plus a few runtime actions.

use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use x402_failover::auth::bearer_matches;
use x402_failover::{Failover, HealthRecord, StatsRecord};

use crate::error::ServerError;
use crate::state::AppState;

const DEFAULT_LOG_LIMIT: usize = 50;
const WINDOW_MINUTES: u64 = 5;
const VALID_ACTIONS: [&str; 4] = [
    "check-health",
    "enable-facilitator",
    "disable-facilitator",
    "reset-stats",
];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusQuery {
    /// `health`, `stats`, `logs`, `config` or `all`; comma-separated
    pub include: Option<String>,
    pub log_limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusAction {
    pub action: String,
    pub facilitator_id: Option<String>,
}

/// "97.50%", or "N/A" with nothing recorded.
pub fn format_rate(rate: Option<f64>) -> String {
    match rate {
        Some(rate) => format!("{rate:.2}%"),
        None => "N/A".to_string(),
    }
}

fn authorize(req: &HttpRequest, state: &AppState) -> Result<(), ServerError> {
    let Some(ref expected) = state.config.status_token else {
        return Ok(());
    };
    let header = req
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok());
    if bearer_matches(header, expected) {
        Ok(())
    } else {
        Err(ServerError::Unauthorized)
    }
}

fn facilitator_name(failover: &Failover, id: &str) -> String {
    failover
        .registry()
        .get(id)
        .map(|f| f.name().to_string())
        .unwrap_or_else(|| id.to_string())
}

fn health_json(failover: &Failover, record: &HealthRecord) -> Value {
    json!({
        "id": record.facilitator_id,
        "name": facilitator_name(failover, &record.facilitator_id),
        "isHealthy": record.is_healthy,
        "consecutiveFailures": record.consecutive_failures,
        "totalSuccesses": record.total_successes,
        "totalFailures": record.total_failures,
        "successRate": format_rate(record.success_rate()),
        "averageResponseTimeMs": record.average_response_time_ms.map(f64::round),
        "lastSuccessfulCheck": record.last_successful_check,
        "lastFailedCheck": record.last_failed_check,
        "lastError": record.last_error,
    })
}

fn health_section(failover: &Failover, records: &[HealthRecord]) -> Value {
    let summary = failover.health().health_summary();
    json!({
        "facilitators": records.iter().map(|r| health_json(failover, r)).collect::<Vec<_>>(),
        "summary": {
            "total": summary.total,
            "healthy": summary.healthy,
            "unhealthy": summary.unhealthy,
        },
    })
}

fn stats_json(stats: &StatsRecord) -> Value {
    json!({
        "id": stats.facilitator_id,
        "name": stats.facilitator_name,
        "operations": {
            "verify": stats.operations.verify,
            "settle": stats.operations.settle,
            "supported": stats.operations.supported,
            "list": stats.operations.list,
            "total": stats.operations.total(),
        },
        "successCount": stats.success_count,
        "failureCount": stats.failure_count,
        "successRate": format_rate(stats.success_rate()),
        "averageResponseTimeMs": stats.average_response_time_ms.map(f64::round),
        "lastUsed": stats.last_used,
    })
}

fn statistics_section(failover: &Failover) -> Value {
    let log = failover.log();
    let summary = log.overall_summary();
    let window = log.metrics_by_time_window(WINDOW_MINUTES);
    json!({
        "facilitators": log.all_stats().iter().map(stats_json).collect::<Vec<_>>(),
        "summary": {
            "totalOperations": summary.total_operations,
            "totalSuccesses": summary.total_successes,
            "totalFailures": summary.total_failures,
            "successRate": format_rate(Some(summary.success_rate)),
            "averageResponseTimeMs": summary.average_response_time_ms.map(f64::round),
            "facilitatorsTracked": summary.facilitators_tracked,
            "totalLogEntries": summary.total_log_entries,
        },
        "window": {
            "windowMinutes": window.window_minutes,
            "totalRequests": window.total_requests,
            "successfulRequests": window.successful_requests,
            "failedRequests": window.failed_requests,
            "successRate": format_rate(window.success_rate),
            "averageResponseTimeMs": window.average_response_time_ms.map(f64::round),
        },
    })
}

fn config_section(failover: &Failover) -> Value {
    let settings = failover.settings();
    let facilitators: Vec<Value> = failover
        .registry()
        .all()
        .iter()
        .map(|f| {
            let descriptor = f.descriptor();
            json!({
                "id": f.id(),
                "name": f.name(),
                "priority": f.priority(),
                "enabled": f.is_enabled(),
                "timeoutMs": f.timeout_or(settings.default_timeout).as_millis() as u64,
                "endpoint": descriptor.endpoint.as_str(),
                "hasAuth": descriptor.credentials.is_some(),
            })
        })
        .collect();
    json!({
        "facilitators": facilitators,
        "settings": settings,
    })
}

/// GET /facilitator-status
pub async fn status(
    req: HttpRequest,
    state: web::Data<AppState>,
    query: web::Query<StatusQuery>,
) -> Result<HttpResponse, ServerError> {
    authorize(&req, &state)?;
    let failover = &state.failover;

    let include = query.include.as_deref().unwrap_or("all");
    let wants = |section: &str| {
        include
            .split(',')
            .map(str::trim)
            .any(|s| s == section || s == "all")
    };

    let mut body = json!({
        "enabled": true,
        "timestamp": Utc::now(),
    });

    if wants("health") {
        body["health"] = health_section(failover, &failover.health().all_health());
    }
    if wants("stats") {
        body["statistics"] = statistics_section(failover);
    }
    if wants("logs") {
        let limit = query.log_limit.unwrap_or(DEFAULT_LOG_LIMIT);
        body["logs"] = json!(failover.log().recent_logs(limit));
    }
    if wants("config") {
        body["config"] = config_section(failover);
    }

    Ok(HttpResponse::Ok().json(body))
}

/// POST /facilitator-status
pub async fn action(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<StatusAction>,
) -> Result<HttpResponse, ServerError> {
    authorize(&req, &state)?;
    let failover = &state.failover;

    match body.action.as_str() {
        "check-health" => {
            let records = failover.health().check_all().await;
            Ok(HttpResponse::Ok().json(json!({
                "success": true,
                "message": "Health check completed",
                "health": health_section(failover, &records),
            })))
        }
        "enable-facilitator" | "disable-facilitator" => {
            let Some(ref id) = body.facilitator_id else {
                return Ok(HttpResponse::BadRequest().json(json!({
                    "error": "facilitatorId is required",
                })));
            };
            let enabled = body.action == "enable-facilitator";
            if !failover.registry().set_enabled(id, enabled) {
                return Err(ServerError::FacilitatorNotFound(id.clone()));
            }
            Ok(HttpResponse::Ok().json(json!({
                "success": true,
                "message": format!(
                    "Facilitator {id} {}",
                    if enabled { "enabled" } else { "disabled" }
                ),
            })))
        }
        "reset-stats" => {
            failover.log().clear_all_stats();
            failover.health().reset_all_stats();
            Ok(HttpResponse::Ok().json(json!({
                "success": true,
                "message": "Statistics reset",
            })))
        }
        other => {
            tracing::warn!(action = other, "Unknown facilitator-status action");
            Ok(HttpResponse::BadRequest().json(json!({
                "error": "Unknown action",
                "validActions": VALID_ACTIONS,
            })))
        }
    }
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/facilitator-status", web::get().to(status))
        .route("/facilitator-status", web::post().to(action));
}
