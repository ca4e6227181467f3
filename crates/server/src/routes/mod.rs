pub mod external_search;
pub mod fhir;
pub mod health;
pub mod metrics;
pub mod settings;
pub mod user;

use axum::{
    Router,
    routing::{get, put},
};

use crate::state::AppState;

/// Routes that require a bearer token
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/user_info", get(user::user_info))
        .route("/fhir", get(fhir::page))
        .route("/fhir/{resource_type}", get(fhir::search).post(fhir::create))
        .route(
            "/fhir/{resource_type}/{id}",
            get(fhir::read).put(fhir::update).delete(fhir::delete),
        )
        .route("/fhir/Patient/{id}/$restore", put(fhir::restore_patient))
        .route(
            "/external_search/{resource_type}",
            get(external_search::search).put(external_search::search_and_restore),
        )
}

/// Routes open to anonymous callers
pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::check))
        .route("/metrics", get(metrics::render))
        .route("/settings", get(settings::all))
        .route("/settings/{key}", get(settings::one))
        .route("/validate_token", get(user::validate_token))
}
