//! Labeling page and form actions.

use askama::Template;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    Form,
};
use serde::Deserialize;

use photolabel::services::LabelingError;

use super::super::template_structs::LabelTemplate;
use super::super::AppState;

#[derive(Debug, Deserialize)]
pub struct NewSearchForm {
    pub search_text: String,
    /// Blank when the form field is left empty.
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LabelForm {
    pub label: i64,
}

fn render_page(state: &AppState, status_code: StatusCode, error: Option<String>) -> Response {
    let status = state.session.status();
    let template = LabelTemplate::from_status(&status, error);
    let html = template
        .render()
        .unwrap_or_else(|e| format!("Template error: {}", e));
    (status_code, Html(html)).into_response()
}

fn error_status(err: &LabelingError) -> StatusCode {
    match err {
        LabelingError::SearchMismatch { .. } | LabelingError::Busy => StatusCode::CONFLICT,
        LabelingError::InvalidSearch(_) | LabelingError::NoActiveImage => StatusCode::BAD_REQUEST,
        _ => StatusCode::SERVICE_UNAVAILABLE,
    }
}

fn render_error(state: &AppState, err: LabelingError) -> Response {
    if !err.is_user_visible() {
        tracing::warn!("Labeling request failed: {}", err);
    }
    render_page(state, error_status(&err), Some(err.to_string()))
}

/// The labeling page.
pub async fn label_page(State(state): State<AppState>) -> Response {
    render_page(&state, StatusCode::OK, None)
}

/// Start (or resume) a search.
pub async fn new_search(State(state): State<AppState>, Form(form): Form<NewSearchForm>) -> Response {
    let user_id = match form.user_id.as_deref().map(str::trim) {
        None | Some("") => state.default_user_id,
        Some(raw) => match raw.parse::<i64>() {
            Ok(id) => id,
            Err(_) => {
                return render_page(
                    &state,
                    StatusCode::BAD_REQUEST,
                    Some(format!("Invalid user id: {}", raw)),
                )
            }
        },
    };

    match state.session.start(&form.search_text, user_id).await {
        Ok(_) => Redirect::to("/").into_response(),
        Err(e) => render_error(&state, e),
    }
}

async fn apply_label(state: &AppState, value: i64) -> Response {
    match state.session.label(value).await {
        Ok(outcome) => {
            if !outcome.newly_labeled {
                tracing::info!("{} was already labeled by another session", outcome.photo_id);
            }
            Redirect::to("/").into_response()
        }
        Err(e) => render_error(state, e),
    }
}

/// Label the current photo from the page's buttons.
pub async fn label_image_form(State(state): State<AppState>, Form(form): Form<LabelForm>) -> Response {
    apply_label(&state, form.label).await
}

/// Label the current photo via `?label=`, for keyboard-driven links.
pub async fn label_image_query(
    State(state): State<AppState>,
    Query(form): Query<LabelForm>,
) -> Response {
    apply_label(&state, form.label).await
}

/// End the current session.
pub async fn end_session(State(state): State<AppState>) -> impl IntoResponse {
    state.session.end().await;
    Redirect::to("/")
}
