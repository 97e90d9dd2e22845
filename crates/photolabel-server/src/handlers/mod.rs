//! HTTP request handlers for the web server.

mod api;
mod label;
mod static_files;

// Re-export handlers for use by the router
pub use api::{api_session, api_stats, live, ready};
pub use label::{end_session, label_image_form, label_image_query, label_page, new_search};
pub use static_files::serve_file;
