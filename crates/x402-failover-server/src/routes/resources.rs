//! Priced demo resources. Each handler runs only after the payment gate has
//! verified and settled the request's payment.

use actix_web::{web, HttpRequest, HttpResponse, ResponseError};
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use x402_failover::SettleResponse;

use crate::error::ServerError;
use crate::middleware::{payment_response_header, require_payment, PAYMENT_RESPONSE_HEADER};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct WeatherRequest {
    pub location: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsQuery {
    pub depth: Option<String>,
    pub focus: Option<String>,
    pub time_range: Option<String>,
}

/// Run the payment gate for the current method and path.
async fn gate(req: &HttpRequest, state: &AppState) -> Result<SettleResponse, HttpResponse> {
    let Some(route) = state
        .payments
        .get_route(req.method().as_str(), req.path())
    else {
        return Err(ServerError::Internal(format!(
            "no payment route for {} {}",
            req.method(),
            req.path()
        ))
        .error_response());
    };
    require_payment(req, route, &state.failover).await
}

fn paid(settle: &SettleResponse, service: &str, message: &str, data: Value) -> HttpResponse {
    HttpResponse::Ok()
        .insert_header((PAYMENT_RESPONSE_HEADER, payment_response_header(settle)))
        .json(json!({
            "success": true,
            "data": data,
            "message": message,
            "paid": true,
            "service": service,
        }))
}

fn weather_data(location: &str) -> Value {
    json!({
        "location": location,
        "temperature": 22,
        "conditions": "Partly Cloudy",
        "humidity": 55,
        "wind_speed": 12,
        "timestamp": Utc::now(),
        "unit": {
            "temperature": "celsius",
            "wind_speed": "km/h",
        },
    })
}

/// GET /api/weather
pub async fn weather(req: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
    let settle = match gate(&req, &state).await {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    paid(
        &settle,
        "x402-weather-api",
        "Weather data retrieved successfully",
        weather_data("New York"),
    )
}

/// POST /api/weather - `{"location": "..."}` overrides the default city
pub async fn weather_for(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: Option<web::Json<WeatherRequest>>,
) -> HttpResponse {
    let settle = match gate(&req, &state).await {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    let location = body
        .and_then(|b| b.into_inner().location)
        .unwrap_or_else(|| "New York".to_string());
    paid(
        &settle,
        "x402-weather-api",
        "Weather data retrieved successfully",
        weather_data(&location),
    )
}

/// GET /api/premium-data
pub async fn premium_data(req: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
    let settle = match gate(&req, &state).await {
        Ok(s) => s,
        Err(resp) => return resp,
    };

    let assets = [
        ("BTC", 64250.00, 1.84),
        ("ETH", 3120.50, -0.62),
        ("SOL", 148.20, 3.15),
        ("MATIC", 0.71, -1.20),
        ("ARB", 1.05, 0.48),
    ];
    let mut market_data = serde_json::Map::new();
    for (asset, price, change) in assets {
        market_data.insert(
            asset.to_string(),
            json!({
                "price": format!("{price:.2}"),
                "change_24h": format!("{change:.2}%"),
                "high_24h": format!("{:.2}", price * 1.05),
                "low_24h": format!("{:.2}", price * 0.95),
            }),
        );
    }
    let trends: Vec<Value> = assets
        .iter()
        .map(|(asset, _, change)| {
            json!({
                "asset": asset,
                "trend": if *change >= 0.0 { "Bullish" } else { "Bearish" },
                "timeframe": "1d",
            })
        })
        .collect();

    let now = Utc::now();
    paid(
        &settle,
        "x402-premium-data-api",
        "Premium market data retrieved successfully",
        json!({
            "market_data": market_data,
            "trends": trends,
            "timestamp": now,
            "data_quality": "premium",
            "update_frequency": "real-time",
            "next_update": now + Duration::minutes(5),
        }),
    )
}

/// GET /api/analytics?depth=&focus=&timeRange=
pub async fn analytics(
    req: HttpRequest,
    state: web::Data<AppState>,
    query: web::Query<AnalyticsQuery>,
) -> HttpResponse {
    let settle = match gate(&req, &state).await {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    let query = query.into_inner();

    paid(
        &settle,
        "x402-analytics-api",
        "Complex analytics generated successfully",
        json!({
            "analysis_depth": query.depth.unwrap_or_else(|| "comprehensive".to_string()),
            "focus_area": query.focus.unwrap_or_else(|| "general".to_string()),
            "time_range": query.time_range.unwrap_or_else(|| "30d".to_string()),
            "generated_at": Utc::now(),
            "analysis": {
                "user_segments": [
                    { "name": "Power Users", "percentage": 15, "value_contribution": 45 },
                    { "name": "Regular Users", "percentage": 35, "value_contribution": 35 },
                    { "name": "Casual Users", "percentage": 40, "value_contribution": 15 },
                    { "name": "Dormant Users", "percentage": 10, "value_contribution": 5 },
                ],
                "conversion_funnel": [
                    { "stage": "Landing", "users": 100000, "conversion_rate": "100%" },
                    { "stage": "Sign Up", "users": 35000, "conversion_rate": "35%" },
                    { "stage": "Activation", "users": 28000, "conversion_rate": "80%" },
                    { "stage": "First Purchase", "users": 14000, "conversion_rate": "50%" },
                ],
            },
        }),
    )
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/api/weather", web::get().to(weather))
        .route("/api/weather", web::post().to(weather_for))
        .route("/api/premium-data", web::get().to(premium_data))
        .route("/api/analytics", web::get().to(analytics));
}
