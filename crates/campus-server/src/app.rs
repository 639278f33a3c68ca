//! Router assembly

use axum::Router;
use axum::middleware::from_fn;
use campus_auth::CORRELATION_ID_HEADER;
use campus_auth::middleware::attach_correlation_id;
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::config::ServiceKind;
use crate::routes::{discovery, enrollments, login, records};
use crate::state::AppState;

/// Full router of the service `state` belongs to
///
/// Every request gets a correlation id (taken from `x-correlation-id` or
/// generated), echoed on the response and in error bodies, and recorded on
/// the request span.
pub fn build_router(state: AppState) -> Router {
    let routes = match state.kind() {
        ServiceKind::Auth => login::routes(),
        ServiceKind::Student => records::student_routes(&state),
        ServiceKind::Professor => records::professor_routes(&state),
        ServiceKind::Course => records::course_routes(&state),
        ServiceKind::Enrollment => enrollments::routes(&state),
    };

    let service = state.kind();
    let trace_layer =
        TraceLayer::new_for_http().make_span_with(move |request: &axum::http::Request<_>| {
            let correlation_id = request
                .headers()
                .get(&CORRELATION_ID_HEADER)
                .and_then(|value| value.to_str().ok())
                .unwrap_or_default();
            tracing::info_span!(
                "http.request",
                %service,
                method = %request.method(),
                uri = %request.uri(),
                correlation_id,
            )
        });

    Router::new()
        .merge(discovery::routes())
        .merge(routes)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(
                    CORRELATION_ID_HEADER,
                    MakeRequestUuid,
                ))
                .layer(PropagateRequestIdLayer::new(CORRELATION_ID_HEADER))
                .layer(trace_layer)
                .layer(from_fn(attach_correlation_id)),
        )
        .with_state(state)
}
