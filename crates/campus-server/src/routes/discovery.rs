//! Public key discovery

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use campus_auth::{DiscoveryDocument, WELL_KNOWN_JWKS_PATH};

use crate::state::AppState;

/// `GET /.well-known/jwks.json`, served without authentication
pub fn routes() -> Router<AppState> {
    Router::new().route(WELL_KNOWN_JWKS_PATH, get(jwks))
}

async fn jwks(State(state): State<AppState>) -> Json<Arc<DiscoveryDocument>> {
    Json(state.discovery_document())
}
