//! JSON API and health endpoints.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};

use super::super::AppState;

/// Liveness probe.
pub async fn live() -> impl IntoResponse {
    StatusCode::OK
}

/// Readiness probe: the database must answer.
pub async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    match state.db.test_connection().await {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            tracing::warn!("Readiness check failed: {}", e);
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

/// Current session snapshot.
pub async fn api_session(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.session.status())
}

/// Label counts by value and by user.
pub async fn api_stats(State(state): State<AppState>) -> impl IntoResponse {
    let total = state.labels.count_labels().await;
    let by_label = state.labels.label_counts().await;
    let by_user = state.labels.user_counts().await;

    match (total, by_label, by_user) {
        (Ok(total), Ok(by_label), Ok(by_user)) => {
            let by_label: Vec<_> = by_label
                .into_iter()
                .map(|c| serde_json::json!({ "label": c.key, "count": c.count }))
                .collect();
            let by_user: Vec<_> = by_user
                .into_iter()
                .map(|c| serde_json::json!({ "user_id": c.key, "count": c.count }))
                .collect();
            Json(serde_json::json!({
                "total": total,
                "by_label": by_label,
                "by_user": by_user,
            }))
            .into_response()
        }
        (Err(e), _, _) | (_, Err(e), _) | (_, _, Err(e)) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}
