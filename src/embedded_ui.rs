use axum::{
    body::Body,
    http::{header, HeaderName, Request, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use rust_embed::Embed;

#[derive(Embed)]
#[folder = "static/"]
#[prefix = ""]
struct EmbeddedUi;

fn mime_for(path: &str) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .to_string()
}

fn lookup(path: &str) -> Option<Response> {
    let content = EmbeddedUi::get(path)?;
    let headers: [(HeaderName, String); 2] = [
        (header::CONTENT_TYPE, mime_for(path)),
        (header::CACHE_CONTROL, "public, max-age=3600".to_string()),
    ];
    Some((headers, content.data.into_owned()).into_response())
}

fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Html(
            r#"<!DOCTYPE html>
<html>
<head><title>404 Not Found</title></head>
<body>
<h1>404 - Not Found</h1>
<p>The requested file was not found.</p>
<p><a href="/">Go to Home</a></p>
</body>
</html>"#,
        ),
    )
        .into_response()
}

async fn serve_embedded_file(req: Request<Body>) -> Response {
    let path = req.uri().path().trim_start_matches('/');

    let file_path = if path.is_empty() { "index.html" } else { path };

    let try_paths = [
        file_path.to_string(),
        format!("{}/index.html", file_path.trim_end_matches('/')),
        format!("{}.html", file_path),
    ];

    for try_path in &try_paths {
        if let Some(response) = lookup(try_path) {
            return response;
        }
    }

    not_found()
}

/// POST /login is a routed path, so the router fallback never serves the
/// page itself; this backs the explicit GET route.
pub async fn serve_login_page() -> Response {
    lookup("login.html").unwrap_or_else(not_found)
}

pub fn embedded_ui_router() -> Router {
    Router::new().fallback(get(serve_embedded_file))
}

pub fn has_embedded_ui() -> bool {
    EmbeddedUi::get("index.html").is_some()
}

pub fn list_embedded_files() -> Vec<String> {
    EmbeddedUi::iter().map(|f| f.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shell_pages_are_embedded() {
        assert!(has_embedded_ui());
        let files = list_embedded_files();
        assert!(files.iter().any(|f| f == "login.html"));
    }

    #[test]
    fn mime_detection_covers_shell_assets() {
        assert_eq!(mime_for("index.html"), "text/html");
        assert_eq!(mime_for("css/app.css"), "text/css");
    }
}
