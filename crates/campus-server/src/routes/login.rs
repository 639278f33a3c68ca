//! Login endpoints of the auth service
//!
//! The auth service keeps no users of its own. It looks the email up in the
//! owning service's records, fetched with an `AUTH_SERVICE` token, checks the
//! stored hash and issues a user token signed with its own key.

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::routing::post;
use axum::{Json, Router};
use campus_auth::middleware::correlation_id;
use campus_auth::{Role, RoleSet};
use http::HeaderMap;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{PASSWORD_FIELD, string_field};
use crate::config::PeerKind;
use crate::error::{ServerError, ServerResult};
use crate::state::AppState;
use crate::store::{Record, record_id};

/// `POST /auth/student` and `POST /auth/professor`
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/auth/student", post(student_login))
        .route("/auth/professor", post(professor_login))
}

/// Student credentials
#[derive(Debug, Deserialize)]
pub struct StudentLogin {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

/// Professor credentials
#[derive(Debug, Deserialize)]
pub struct ProfessorLogin {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    phone: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

/// Successful login
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    /// Signed user token
    pub access_token: String,
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

async fn student_login(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<StudentLogin>, JsonRejection>,
) -> ServerResult<Json<LoginResponse>> {
    let Json(body) = payload?;
    let (Some(email), Some(password)) = (present(body.email), present(body.password)) else {
        return Err(ServerError::BadRequest("Email and password are required".into()));
    };
    login(&state, PeerKind::Student, Role::Student, &email, password, &headers).await
}

async fn professor_login(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<ProfessorLogin>, JsonRejection>,
) -> ServerResult<Json<LoginResponse>> {
    let Json(body) = payload?;
    let (Some(email), Some(_phone), Some(password)) =
        (present(body.email), present(body.phone), present(body.password))
    else {
        return Err(ServerError::BadRequest(
            "Email, phone and password are required".into(),
        ));
    };
    login(&state, PeerKind::Professor, Role::Professor, &email, password, &headers).await
}

async fn login(
    state: &AppState,
    peer: PeerKind,
    role: Role,
    email: &str,
    password: String,
    headers: &HeaderMap,
) -> ServerResult<Json<LoginResponse>> {
    let endpoint = state.peer_url(peer)?;
    let records: Vec<Record> = state
        .client()
        .fetch_resource_correlated(&endpoint, correlation_id(headers).as_deref())
        .await?;

    let email = email.trim();
    let Some(record) = records
        .into_iter()
        .find(|record| string_field(record, "email") == Some(email))
    else {
        warn!(%peer, "Login for unknown email");
        return Err(ServerError::InvalidCredentials);
    };
    let Some(hash) = string_field(&record, PASSWORD_FIELD).map(str::to_string) else {
        warn!(%peer, "Login for record without password");
        return Err(ServerError::InvalidCredentials);
    };

    let passwords = state.passwords();
    let matches = tokio::task::spawn_blocking(move || passwords.verify(&password, &hash))
        .await
        .map_err(|e| ServerError::Internal(format!("password check panicked: {e}")))?;
    if !matches {
        warn!(%peer, "Login with wrong password");
        return Err(ServerError::InvalidCredentials);
    }

    let subject_id = record_id(&record)
        .ok_or_else(|| ServerError::Internal(format!("{peer} record without id")))?;
    let issued = state.issuer().issue_for(subject_id, RoleSet::from(role))?;
    info!(subject = %subject_id, %peer, "Login succeeded");

    Ok(Json(LoginResponse {
        access_token: issued.token.into_string(),
    }))
}
