//! Read-only admin HTTP surface

use axum::{
    extract::{Path, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use prometheus::{Encoder, Registry, TextEncoder};
use serde::Serialize;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::service::{EconomyReport, PricingService};

#[derive(Clone)]
pub struct AppState {
    pub service: PricingService,
    pub registry: Registry,
}

#[derive(Debug, Serialize)]
pub struct PriceView {
    pub item_id: String,
    pub price: f64,
    pub base_price: f64,
    pub ema_multiplier: f64,
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT]);

    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .route("/api/v1/prices", get(list_prices))
        .route("/api/v1/prices/:item_id", get(get_price))
        .route("/api/v1/admin/economy", get(economy))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "version": crate::VERSION,
    }))
}

pub async fn list_prices(State(state): State<AppState>) -> Json<Vec<PriceView>> {
    let book = state.service.snapshot();
    let prices = book
        .entries()
        .map(|(item, s)| PriceView {
            item_id: item.id().to_string(),
            price: s.current_price,
            base_price: item.base_price(),
            ema_multiplier: s.ema_multiplier,
        })
        .collect();
    Json(prices)
}

pub async fn get_price(
    State(state): State<AppState>,
    Path(item_id): Path<String>,
) -> Result<Json<PriceView>, (StatusCode, String)> {
    let book = state.service.snapshot();
    let item = book
        .catalog()
        .get(&item_id)
        .ok_or((StatusCode::NOT_FOUND, format!("Unknown item: {}", item_id)))?;
    let s = book
        .state(&item_id)
        .ok_or((StatusCode::NOT_FOUND, format!("Unknown item: {}", item_id)))?;

    Ok(Json(PriceView {
        item_id: item.id().to_string(),
        price: s.current_price,
        base_price: item.base_price(),
        ema_multiplier: s.ema_multiplier,
    }))
}

pub async fn economy(State(state): State<AppState>) -> Json<EconomyReport> {
    Json(state.service.economy_report())
}

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let mut buf = Vec::new();
    match encoder.encode(&state.registry.gather(), &mut buf) {
        Ok(()) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, encoder.format_type().to_string())],
            buf,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [(header::CONTENT_TYPE, "text/plain".to_string())],
            e.to_string().into_bytes(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Catalog, EngineParams, Item};
    use crate::infra::{InMemoryLedger, InMemoryStateStore};
    use crate::service::PricingMetrics;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use std::sync::Arc;
    use tower::ServiceExt;

    async fn state() -> AppState {
        let registry = Registry::new();
        let metrics = PricingMetrics::new().unwrap();
        metrics.register(&registry).unwrap();

        let catalog = Catalog::new(vec![
            Item::new("sword", 20.0, 0.5, 1.5).unwrap(),
            Item::new("bread", 2.0, 0.5, 2.0).unwrap(),
        ])
        .unwrap();
        let service = PricingService::builder(catalog, EngineParams::default())
            .ledger(Arc::new(InMemoryLedger::new()))
            .store(Arc::new(InMemoryStateStore::new()))
            .metrics(Arc::new(metrics))
            .start()
            .await
            .unwrap();

        AppState { service, registry }
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = get_json(router(state().await), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_list_and_get_prices() {
        let app = router(state().await);

        let (status, body) = get_json(app.clone(), "/api/v1/prices").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 2);

        let (status, body) = get_json(app.clone(), "/api/v1/prices/sword").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["price"], 20.0);
        assert_eq!(body["ema_multiplier"], 1.0);

        let (status, _) = get_json(app, "/api/v1/prices/dragon_egg").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_economy_reflects_cycles() {
        let state = state().await;
        state.service.run_cycle(50).await;

        let (status, body) = get_json(router(state), "/api/v1/admin/economy").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["cycle"], 1);
        assert!(body["last_update"].is_string());
        assert_eq!(body["items"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_metrics_exposition() {
        let state = state().await;
        state.service.run_cycle(50).await;

        let response = router(state)
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("bazaar_pricing_cycles_completed_total 1"));
    }
}
