//! Enrollment service routes
//!
//! An enrollment links a student id to a course id. Both are checked against
//! their owning services, called with an `ENROLLMENT_SERVICE` token, before
//! the link is stored.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::routing::{delete, get, post};
use axum::{Extension, Json, Router};
use campus_auth::{Claims, Role};
use campus_auth::middleware::correlation_id;
use http::{HeaderMap, StatusCode};
use serde_json::{Value, json};
use tracing::{info, warn};

use super::{guard, guard_limited, guard_own, json_object, string_field};
use crate::config::PeerKind;
use crate::error::{ServerError, ServerResult};
use crate::state::AppState;
use crate::store::{Record, record_id};

const STUDENT_FIELD: &str = "student";
const COURSE_FIELD: &str = "course";

/// Routes of the enrollment service; the collection listing is rate limited
pub fn routes(state: &AppState) -> Router<AppState> {
    let verifier = state.verifier();
    let staff = || guard(&verifier, [Role::Admin, Role::Professor]);
    Router::new()
        .route(
            "/enrollments",
            post(create).route_layer(staff()).merge(get(list).route_layer(
                guard_limited(&verifier, [Role::Admin, Role::Professor], state.rate_limiter()),
            )),
        )
        .route(
            "/enrollments/{id}",
            get(read)
                .route_layer(staff())
                .merge(delete(remove).route_layer(staff())),
        )
        .route(
            "/enrollments/student/{id}",
            get(by_student).route_layer(guard_own(
                &verifier,
                [Role::Admin, Role::Professor, Role::Student],
                Role::Student,
            )),
        )
        .route("/enrollments/course/{id}", get(by_course).route_layer(staff()))
}

/// Record with `id` in a peer's collection
async fn peer_record(
    state: &AppState,
    peer: PeerKind,
    id: &str,
    correlation: Option<&str>,
) -> ServerResult<Option<Record>> {
    let endpoint = state.peer_url(peer)?;
    let records: Vec<Record> = state
        .client()
        .fetch_resource_correlated(&endpoint, correlation)
        .await?;
    Ok(records.into_iter().find(|record| record_id(record) == Some(id)))
}

async fn create(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    headers: HeaderMap,
    payload: Result<Json<Value>, JsonRejection>,
) -> ServerResult<(StatusCode, Json<Record>)> {
    let body = json_object(payload)?;
    let (Some(student), Some(course)) = (
        string_field(&body, STUDENT_FIELD),
        string_field(&body, COURSE_FIELD),
    ) else {
        return Err(ServerError::BadRequest(
            "Student and Course are required".into(),
        ));
    };
    let correlation = correlation_id(&headers);

    if peer_record(&state, PeerKind::Student, student, correlation.as_deref())
        .await?
        .is_none()
    {
        warn!(%student, "Enrollment for unknown student");
        return Err(ServerError::NotFound("Student does not exist".into()));
    }
    if peer_record(&state, PeerKind::Course, course, correlation.as_deref())
        .await?
        .is_none()
    {
        warn!(%course, "Enrollment for unknown course");
        return Err(ServerError::NotFound("Course does not exist".into()));
    }

    let mut record = Record::new();
    record.insert(STUDENT_FIELD.to_string(), Value::String(student.to_string()));
    record.insert(COURSE_FIELD.to_string(), Value::String(course.to_string()));
    let saved = state.store().insert(record).await?;
    info!(
        id = record_id(&saved).unwrap_or_default(),
        %student,
        %course,
        subject = %claims.subject_id,
        "Enrollment created"
    );
    Ok((StatusCode::CREATED, Json(saved)))
}

async fn list(State(state): State<AppState>) -> ServerResult<Json<Vec<Record>>> {
    Ok(Json(state.store().list().await?))
}

async fn read(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ServerResult<Json<Record>> {
    state
        .store()
        .get(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ServerError::NotFound("Enrollment not found".into()))
}

/// Enrollments of a student, each with its course record inlined
async fn by_student(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ServerResult<Json<Vec<Record>>> {
    let enrollments = state.store().find_by(STUDENT_FIELD, &id).await?;
    if enrollments.is_empty() {
        return Err(ServerError::NotFound(
            "No enrollments found for this student".into(),
        ));
    }

    let endpoint = state.peer_url(PeerKind::Course)?;
    let courses: Vec<Record> = state
        .client()
        .fetch_resource_correlated(&endpoint, correlation_id(&headers).as_deref())
        .await?;

    Ok(Json(
        enrollments
            .into_iter()
            .map(|mut enrollment| {
                let course = string_field(&enrollment, COURSE_FIELD).and_then(|course_id| {
                    courses
                        .iter()
                        .find(|course| record_id(course) == Some(course_id))
                        .cloned()
                });
                if let Some(course) = course {
                    enrollment.insert(COURSE_FIELD.to_string(), Value::Object(course));
                }
                enrollment
            })
            .collect(),
    ))
}

async fn by_course(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ServerResult<Json<Vec<Record>>> {
    let enrollments = state.store().find_by(COURSE_FIELD, &id).await?;
    if enrollments.is_empty() {
        return Err(ServerError::NotFound(
            "No enrollments found for the course".into(),
        ));
    }
    Ok(Json(enrollments))
}

async fn remove(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> ServerResult<Json<Value>> {
    let removed = state
        .store()
        .delete(&id)
        .await?
        .ok_or_else(|| ServerError::NotFound("Enrollment not found".into()))?;
    info!(%id, subject = %claims.subject_id, "Enrollment deleted");
    Ok(Json(json!({
        "message": "Enrollment deleted successfully",
        "enrollment": removed,
    })))
}
