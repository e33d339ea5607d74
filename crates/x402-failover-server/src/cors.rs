use actix_cors::Cors;
use actix_web::http::header::{self, HeaderName};

/// CORS middleware for the configured origins. `*` admits any origin.
pub fn build_cors(allowed_origins: &[String]) -> Cors {
    let allowed = allowed_origins.to_vec();
    Cors::default()
        .allowed_origin_fn(move |origin, _req_head| {
            let origin = origin.to_str().unwrap_or("");
            allowed.iter().any(|a| a == "*" || a == origin)
        })
        .allowed_methods(vec!["GET", "POST", "OPTIONS"])
        .allowed_headers(vec![
            header::AUTHORIZATION,
            header::ACCEPT,
            header::CONTENT_TYPE,
            HeaderName::from_static("x-payment"),
            HeaderName::from_static("payment-signature"),
        ])
        .expose_headers(vec![
            HeaderName::from_static("x-payment-response"),
            HeaderName::from_static("payment-response"),
        ])
        .max_age(3600)
}
