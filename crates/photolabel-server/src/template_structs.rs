//! Askama template structs for the web interface.
//!
//! Each struct corresponds to an HTML template in the templates/ directory.

use askama::Template;

use photolabel::services::{SessionState, SessionStatus};

/// The labeling page.
#[derive(Template)]
#[template(path = "label.html")]
pub struct LabelTemplate<'a> {
    pub title: &'a str,
    pub state: &'a str,
    pub query: Option<String>,
    pub photo_id: Option<String>,
    pub image_url: Option<String>,
    pub cursor: Option<String>,
    pub labeled: u64,
    pub buffered: usize,
    /// Auto-refresh while waiting for an image.
    pub loading: bool,
    /// Transient fill problem, shown as a note while loading.
    pub note: Option<String>,
    pub error: Option<String>,
}

impl<'a> LabelTemplate<'a> {
    pub fn from_status(status: &'a SessionStatus, error: Option<String>) -> Self {
        let head = status.head.as_ref();
        let loading = status.state == SessionState::Loading;
        Self {
            title: "photolabel",
            state: status.state.as_str(),
            query: status.query.clone(),
            photo_id: head.map(|c| c.photo_id.clone()),
            image_url: head.map(|c| format!("/files/{}", c.logical_path)),
            cursor: head.map(|c| c.position.to_string()),
            labeled: status.labeled,
            buffered: status.buffered,
            loading,
            note: if loading { status.last_error.clone() } else { None },
            error,
        }
    }
}
