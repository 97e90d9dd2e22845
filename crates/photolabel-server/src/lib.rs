//! Web server for labeling photos.
//!
//! Serves a single labeling page driven by one [`LabelingSession`], plus a
//! small JSON API and the images of the local mirror.

mod handlers;
mod routes;
mod template_structs;

pub use routes::create_router;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use photolabel::config::Settings;
use photolabel::repository::{DbContext, DieselLabelRepository};
use photolabel::services::LabelingSession;

/// Shared state for the web server.
#[derive(Clone)]
pub struct AppState {
    pub session: Arc<LabelingSession>,
    pub labels: DieselLabelRepository,
    pub db: DbContext,
    /// Root of the local image mirror, served under `/files`.
    pub images_dir: PathBuf,
    /// User id recorded when the search form leaves it blank.
    pub default_user_id: i64,
}

impl AppState {
    pub fn new(settings: &Settings) -> anyhow::Result<Self> {
        let db = settings.create_db_context()?;
        let session = LabelingSession::from_settings(settings, db.progress())?;

        Ok(Self {
            session: Arc::new(session),
            labels: db.labels(),
            db,
            images_dir: settings.images_dir.clone(),
            default_user_id: settings.labeling.default_user_id,
        })
    }
}

/// Start the web server.
pub async fn serve(settings: &Settings, host: &str, port: u16) -> anyhow::Result<()> {
    let state = AppState::new(settings)?;
    let app = create_router(state.clone());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    tracing::info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    state.session.end().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use tempfile::tempdir;
    use tower::ServiceExt;

    use photolabel::config::LabelingConfig;
    use photolabel::repository::run_migrations;
    use photolabel::services::{ImageDownloader, SessionState};
    use photolabel::storage::LocalMirror;
    use photolabel::testing::FakeSource;

    async fn setup_test_app() -> (axum::Router, AppState, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let url = format!("sqlite:{}", dir.path().join("test.db").display());
        let images_dir = dir.path().join("images");
        std::fs::create_dir_all(&images_dir).unwrap();
        run_migrations(&url).await.unwrap();

        let db = DbContext::from_url(&url).unwrap();
        let source = Arc::new(FakeSource::new(&[&["A", "B"], &["C"]]));
        let downloader = ImageDownloader::new(
            source,
            Arc::new(LocalMirror::new(&images_dir)),
            None,
            "Original",
        );
        let config = LabelingConfig {
            page_size: 2,
            buffer_size: 2,
            retry_delay_ms: 5,
            ..LabelingConfig::default()
        };
        let session = LabelingSession::new(db.progress(), Arc::new(downloader), config);

        let state = AppState {
            session: Arc::new(session),
            labels: db.labels(),
            db,
            images_dir,
            default_user_id: 1,
        };

        (create_router(state.clone()), state, dir)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_form(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_string(response: axum::response::Response) -> String {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(body.to_vec()).unwrap()
    }

    async fn start_and_wait(app: &axum::Router, state: &AppState, query: &str) {
        let response = app
            .clone()
            .oneshot(post_form("/new-search", &format!("search_text={}&user_id=", query)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(state.session.wait_for_head().await, SessionState::Active);
    }

    #[tokio::test]
    async fn test_health_probes() {
        let (app, _state, _dir) = setup_test_app().await;

        let response = app.clone().oneshot(get("/live")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let response = app.oneshot(get("/ready")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_idle_page() {
        let (app, _state, _dir) = setup_test_app().await;

        let response = app.oneshot(get("/")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let html = body_string(response).await;
        assert!(html.contains("<!DOCTYPE html>"));
        assert!(html.contains("Enter a search"));
    }

    #[tokio::test]
    async fn test_label_flow() {
        let (app, state, _dir) = setup_test_app().await;
        start_and_wait(&app, &state, "Cats").await;

        let html = body_string(app.clone().oneshot(get("/")).await.unwrap()).await;
        assert!(html.contains("/files/cats/images/A_Original.jpg"));

        let response = app
            .clone()
            .oneshot(get("/files/cats/images/A_Original.jpg"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "image/jpeg"
        );
        assert_eq!(body_string(response).await, "image-A");

        let response = app
            .clone()
            .oneshot(post_form("/label-image", "label=1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);

        let response = app.clone().oneshot(get("/api/stats")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(json["total"], 1);
        assert_eq!(json["by_label"][0]["label"], 1);
        assert_eq!(json["by_user"][0]["user_id"], 1);

        state.session.wait_for_head().await;
        let response = app.oneshot(get("/api/session")).await.unwrap();
        let json: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(json["state"], "active");
        assert_eq!(json["query"], "cats");
        assert_eq!(json["labeled"], 1);
        assert_eq!(json["head"]["photo_id"], "B");
    }

    #[tokio::test]
    async fn test_label_via_query_string() {
        let (app, state, _dir) = setup_test_app().await;
        start_and_wait(&app, &state, "cats").await;

        let response = app.oneshot(get("/label-image?label=0")).await.unwrap();

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(state.labels.count_labels().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_label_without_session_is_rejected() {
        let (app, _state, _dir) = setup_test_app().await;

        let response = app
            .oneshot(post_form("/label-image", "label=1"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_string(response).await.contains("no image is ready"));
    }

    #[tokio::test]
    async fn test_page_size_mismatch_is_conflict() {
        let (app, state, _dir) = setup_test_app().await;
        state
            .db
            .progress()
            .resolve_or_create_search("dogs", 5, 0)
            .await
            .unwrap();

        let response = app
            .oneshot(post_form("/new-search", "search_text=dogs"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert!(body_string(response).await.contains("page size 5"));
        assert_eq!(state.session.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_end_session() {
        let (app, state, _dir) = setup_test_app().await;
        start_and_wait(&app, &state, "cats").await;

        let response = app
            .oneshot(post_form("/end-session", ""))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(state.session.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_file_traversal_rejected() {
        let (app, _state, _dir) = setup_test_app().await;

        let response = app
            .clone()
            .oneshot(get("/files/../test.db"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app.oneshot(get("/files/missing.jpg")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
