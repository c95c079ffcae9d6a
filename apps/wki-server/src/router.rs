use axum::{
    routing::{get, post},
    Router,
};

use crate::{api, AppState};

pub(crate) mod paths {
    pub const HEALTH: &str = "/health";
    pub const SUGGEST_ARBEITEN: &str = "/api/suggest-arbeiten";
    pub const ESTIMATE_ZEIT: &str = "/api/estimate-zeit";
    pub const TEILE_BEDARF: &str = "/api/teile-bedarf";
    pub const RETRAIN: &str = "/api/retrain";
}

pub(crate) fn build(state: AppState) -> Router {
    Router::new()
        .route(paths::HEALTH, get(api::health))
        .route(paths::SUGGEST_ARBEITEN, post(api::suggest_arbeiten))
        .route(paths::ESTIMATE_ZEIT, post(api::estimate_zeit))
        .route(paths::TEILE_BEDARF, post(api::teile_bedarf))
        .route(paths::RETRAIN, post(api::retrain))
        .with_state(state)
}

pub(crate) fn attach_http_layers(router: Router) -> Router {
    use tower_http::trace::TraceLayer;

    router.layer(TraceLayer::new_for_http())
}
