//! The rated storefront endpoints.
//!
//! The payloads are stand-ins for the real storefront services; what
//! matters here is that each route sits behind the rate-limit layer.

use axum::Json;
use http::HeaderMap;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub(crate) struct SearchResponse {
    results: Vec<SearchHit>,
    total: usize,
}

#[derive(Debug, Serialize)]
pub(crate) struct SearchHit {
    sku: &'static str,
    name: &'static str,
    price_cents: u32,
}

pub(crate) async fn search() -> Json<SearchResponse> {
    let results = vec![
        SearchHit {
            sku: "SKU-1042",
            name: "Walnut desk organizer",
            price_cents: 3450,
        },
        SearchHit {
            sku: "SKU-2210",
            name: "Brass reading lamp",
            price_cents: 12900,
        },
    ];

    let total = results.len();

    Json(SearchResponse { results, total })
}

#[derive(Debug, Serialize)]
pub(crate) struct CheckoutResponse {
    status: &'static str,
    message: &'static str,
}

pub(crate) async fn checkout() -> Json<CheckoutResponse> {
    Json(CheckoutResponse {
        status: "accepted",
        message: "Order received",
    })
}

#[derive(Debug, Serialize)]
pub(crate) struct ProfileResponse {
    user: String,
    tier: String,
}

pub(crate) async fn profile(headers: HeaderMap) -> Json<ProfileResponse> {
    let user = headers
        .get("x-user-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("anonymous")
        .to_string();

    let tier = headers
        .get("x-user-tier")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("free")
        .to_string();

    Json(ProfileResponse { user, tier })
}
