//! Customer and dashboard pages, embedded into the binary from `public/`.

use axum::{
    http::{header, StatusCode, Uri},
    response::{Html, IntoResponse, Response},
};
use rust_embed::RustEmbed;

#[derive(RustEmbed)]
#[folder = "public/"]
struct PublicAssets;

fn page(path: &str) -> Response {
    match PublicAssets::get(path) {
        Some(file) => Html(file.data).into_response(),
        None => not_found(),
    }
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Html("<h1>404 Not Found</h1>")).into_response()
}

/// GET /: booking page for customers.
pub async fn handle_index() -> Response {
    page("index.html")
}

/// GET /dashboard: staff dashboard.
pub async fn handle_dashboard() -> Response {
    page("dashboard.html")
}

/// GET /today: today's bookings board.
pub async fn handle_today() -> Response {
    page("today.html")
}

/// Any other path: serve a matching embedded file, or 404.
pub async fn handle_static(uri: Uri) -> Response {
    let path = uri.path().trim_start_matches('/');
    if path.is_empty() || path.starts_with("api/") {
        return not_found();
    }
    match PublicAssets::get(path) {
        Some(file) => {
            let mime = mime_guess::from_path(path).first_or_octet_stream();
            ([(header::CONTENT_TYPE, mime.as_ref().to_string())], file.data).into_response()
        }
        None => not_found(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pages_are_embedded() {
        for response in [handle_index().await, handle_dashboard().await, handle_today().await] {
            assert_eq!(response.status(), StatusCode::OK);
            assert!(response.headers()[header::CONTENT_TYPE]
                .to_str()
                .unwrap()
                .starts_with("text/html"));
        }
    }

    #[tokio::test]
    async fn static_files_get_a_content_type() {
        let response = handle_static(Uri::from_static("/styles.css")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/css");
    }

    #[tokio::test]
    async fn unknown_paths_are_not_found() {
        let response = handle_static(Uri::from_static("/nope.html")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = handle_static(Uri::from_static("/api/unknown")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
