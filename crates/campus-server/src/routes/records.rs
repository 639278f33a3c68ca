//! CRUD routes for the student, professor and course services
//!
//! All three share the same handlers; the service kind decides which fields a
//! new record needs and whether its password is hashed. Role and ownership
//! checks happen in the route layers, so a handler only ever runs for a
//! caller that passed them.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::routing::{delete, get, post, put};
use axum::{Extension, Json, Router};
use campus_auth::{Claims, Role, check_ownership};
use http::StatusCode;
use serde_json::{Value, json};
use tracing::info;

use super::{PASSWORD_FIELD, guard, guard_limited, guard_own, json_object, redact, string_field};
use crate::config::ServiceKind;
use crate::error::{ServerError, ServerResult};
use crate::state::AppState;
use crate::store::{Record, record_id};

/// Field stamped on courses with the creating subject
pub const CREATED_BY_FIELD: &str = "createdBy";

const EMAIL_FIELD: &str = "email";

/// Routes of the student service
pub fn student_routes(state: &AppState) -> Router<AppState> {
    let verifier = state.verifier();
    Router::new()
        .route(
            "/students",
            post(create).route_layer(guard(&verifier, [Role::Admin])).merge(
                get(list).route_layer(guard(
                    &verifier,
                    [
                        Role::Admin,
                        Role::Professor,
                        Role::AuthService,
                        Role::EnrollmentService,
                    ],
                )),
            ),
        )
        .route(
            "/students/{id}",
            get(read)
                .route_layer(guard_own(
                    &verifier,
                    [Role::Admin, Role::Professor, Role::Student],
                    Role::Student,
                ))
                .merge(put(update).route_layer(guard_own(
                    &verifier,
                    [Role::Admin, Role::Student],
                    Role::Student,
                )))
                .merge(delete(remove).route_layer(guard(&verifier, [Role::Admin]))),
        )
}

/// Routes of the professor service; the collection listing is rate limited
pub fn professor_routes(state: &AppState) -> Router<AppState> {
    let verifier = state.verifier();
    let owned = || guard_own(&verifier, [Role::Admin, Role::Professor], Role::Professor);
    Router::new()
        .route(
            "/professors",
            post(create).route_layer(guard(&verifier, [Role::Admin])).merge(
                get(list).route_layer(guard_limited(
                    &verifier,
                    [Role::Admin, Role::AuthService, Role::EnrollmentService],
                    state.rate_limiter(),
                )),
            ),
        )
        .route(
            "/professors/{id}",
            get(read)
                .route_layer(owned())
                .merge(put(update).route_layer(owned()))
                .merge(delete(remove).route_layer(owned())),
        )
}

/// Routes of the course service
pub fn course_routes(state: &AppState) -> Router<AppState> {
    let verifier = state.verifier();
    let writers = || guard(&verifier, [Role::Admin, Role::Professor]);
    let readers = || guard(&verifier, [Role::Admin, Role::Professor, Role::EnrollmentService]);
    Router::new()
        .route(
            "/courses",
            post(create)
                .route_layer(writers())
                .merge(get(list).route_layer(readers())),
        )
        .route(
            "/courses/{id}",
            get(read)
                .route_layer(readers())
                .merge(put(update).route_layer(writers()))
                .merge(delete(remove).route_layer(writers())),
        )
}

fn required_fields(kind: ServiceKind) -> &'static [&'static str] {
    match kind {
        ServiceKind::Student => &["name", "email", PASSWORD_FIELD],
        ServiceKind::Professor => &["name", "email", "phone", PASSWORD_FIELD],
        ServiceKind::Course => &["name"],
        ServiceKind::Auth | ServiceKind::Enrollment => &[],
    }
}

fn has_credentials(kind: ServiceKind) -> bool {
    matches!(kind, ServiceKind::Student | ServiceKind::Professor)
}

/// Professors may only change courses they created
fn check_course_owner(kind: ServiceKind, claims: &Claims, record: &Record) -> ServerResult<()> {
    if kind != ServiceKind::Course || claims.has_role(&Role::Admin) {
        return Ok(());
    }
    match string_field(record, CREATED_BY_FIELD) {
        Some(creator) => Ok(check_ownership(claims, &Role::Professor, creator)?),
        None => Ok(()),
    }
}

/// Replace a plaintext `password` field with its hash
async fn hash_password(state: &AppState, record: &mut Record) -> ServerResult<()> {
    let Some(Value::String(password)) = record.remove(PASSWORD_FIELD) else {
        return Ok(());
    };
    let passwords = state.passwords();
    let hash = tokio::task::spawn_blocking(move || passwords.hash(&password))
        .await
        .map_err(|e| ServerError::Internal(format!("password hashing panicked: {e}")))??;
    record.insert(PASSWORD_FIELD.to_string(), Value::String(hash));
    Ok(())
}

/// Store `email` trimmed and refuse one already held by another record
async fn claim_email(state: &AppState, fields: &mut Record, except: Option<&str>) -> ServerResult<()> {
    let Some(email) = string_field(fields, EMAIL_FIELD).map(str::to_owned) else {
        return Ok(());
    };
    let taken = state.store().list().await?.iter().any(|record| {
        string_field(record, EMAIL_FIELD) == Some(email.as_str())
            && (except.is_none() || record_id(record) != except)
    });
    if taken {
        return Err(ServerError::BadRequest(format!(
            "A {} with this email already exists",
            state.kind()
        )));
    }
    fields.insert(EMAIL_FIELD.to_string(), Value::String(email));
    Ok(())
}

async fn create(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ServerResult<(StatusCode, Json<Record>)> {
    let kind = state.kind();
    let mut record = json_object(payload)?;

    let required = required_fields(kind);
    if required.iter().any(|field| string_field(&record, field).is_none()) {
        return Err(ServerError::BadRequest(format!(
            "Provide {}",
            required.join(", ")
        )));
    }

    if has_credentials(kind) {
        claim_email(&state, &mut record, None).await?;
        hash_password(&state, &mut record).await?;
    }
    if kind == ServiceKind::Course {
        record.insert(
            CREATED_BY_FIELD.to_string(),
            Value::String(claims.subject_id.clone()),
        );
    }

    let saved = state.store().insert(record).await?;
    info!(
        service = %kind,
        id = record_id(&saved).unwrap_or_default(),
        subject = %claims.subject_id,
        "Record created"
    );
    Ok((StatusCode::CREATED, Json(redact(saved, &claims))))
}

async fn list(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ServerResult<Json<Vec<Record>>> {
    let records = state.store().list().await?;
    Ok(Json(
        records
            .into_iter()
            .map(|record| redact(record, &claims))
            .collect(),
    ))
}

async fn find(state: &AppState, id: &str) -> ServerResult<Record> {
    state
        .store()
        .get(id)
        .await?
        .ok_or_else(|| ServerError::NotFound(format!("No {} with id {id}", state.kind())))
}

async fn read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> ServerResult<Json<Record>> {
    let record = find(&state, &id).await?;
    Ok(Json(redact(record, &claims)))
}

async fn update(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ServerResult<Json<Record>> {
    let kind = state.kind();
    let mut fields = json_object(payload)?;
    check_course_owner(kind, &claims, &find(&state, &id).await?)?;

    fields.remove(CREATED_BY_FIELD);
    if has_credentials(kind) {
        claim_email(&state, &mut fields, Some(&id)).await?;
        hash_password(&state, &mut fields).await?;
    }

    let updated = state
        .store()
        .update(&id, fields)
        .await?
        .ok_or_else(|| ServerError::NotFound(format!("No {kind} with id {id}")))?;
    info!(service = %kind, %id, subject = %claims.subject_id, "Record updated");
    Ok(Json(redact(updated, &claims)))
}

async fn remove(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> ServerResult<Json<Value>> {
    let kind = state.kind();
    check_course_owner(kind, &claims, &find(&state, &id).await?)?;

    let removed = state
        .store()
        .delete(&id)
        .await?
        .ok_or_else(|| ServerError::NotFound(format!("No {kind} with id {id}")))?;
    info!(service = %kind, %id, subject = %claims.subject_id, "Record deleted");
    Ok(Json(json!({
        "message": format!("Deleted {kind} {id}"),
        "record": redact(removed, &claims),
    })))
}
