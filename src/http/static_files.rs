//! Static file serving for the active project and the dashboard.

use std::path::Path;

use axum::body::Body;
use axum::http::uri::PathAndQuery;
use axum::http::{header, HeaderValue, Method, Request, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use tower::ServiceExt;
use tower_http::services::ServeDir;

use crate::routing::RELOAD_SCRIPT;

/// Pages larger than this are served without the reload client.
const MAX_INJECT_BYTES: usize = 8 * 1024 * 1024;

/// Serve `request` from the directory `root`.
///
/// Directory requests fall back to their `index.html`; paths escaping
/// `root` are answered with 404 by `ServeDir`. Browsers are told to
/// revalidate every time so a reload always sees fresh files.
pub async fn serve_dir(root: &Path, request: Request<Body>) -> Response {
    let service = ServeDir::new(root).append_index_html_on_directories(true);
    let mut response = match service.oneshot(request).await {
        Ok(response) => response.map(Body::new),
        Err(never) => match never {},
    };
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    response
}

/// Serve the active project from `root`, adding the live-reload client to
/// every full HTML page.
///
/// The script tag goes before the last `</body>`, or at the end of the
/// document when there is none. `Content-Length` is adjusted to match.
pub async fn serve_project(root: &Path, request: Request<Body>) -> Response {
    let head_only = request.method() == Method::HEAD;
    let response = serve_dir(root, request).await;
    if response.status() != StatusCode::OK || !is_html(&response) {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let tag = reload_tag();
    let length = parts
        .headers
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<usize>().ok());

    match length {
        Some(length) if length > MAX_INJECT_BYTES => Response::from_parts(parts, body),
        Some(length) if head_only => {
            parts.headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length + tag.len()));
            Response::from_parts(parts, body)
        }
        None if head_only => Response::from_parts(parts, body),
        _ => match axum::body::to_bytes(body, MAX_INJECT_BYTES).await {
            Ok(page) => {
                let page = inject_before_body_end(&page, tag.as_bytes());
                parts.headers.insert(header::CONTENT_LENGTH, HeaderValue::from(page.len()));
                Response::from_parts(parts, Body::from(page))
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read page for reload injection");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        },
    }
}

fn is_html(response: &Response) -> bool {
    response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("text/html"))
}

fn reload_tag() -> String {
    format!("<script src=\"{RELOAD_SCRIPT}\"></script>")
}

fn inject_before_body_end(page: &[u8], tag: &[u8]) -> Vec<u8> {
    const BODY_END: &[u8] = b"</body>";
    let at = page
        .windows(BODY_END.len())
        .rposition(|window| window.eq_ignore_ascii_case(BODY_END))
        .unwrap_or(page.len());

    let mut out = Vec::with_capacity(page.len() + tag.len());
    out.extend_from_slice(&page[..at]);
    out.extend_from_slice(tag);
    out.extend_from_slice(&page[at..]);
    out
}

/// Serve from `root` a request whose path starts with `mount`.
pub async fn serve_mounted(root: &Path, mount: &str, request: Request<Body>) -> Response {
    let (mut parts, body) = request.into_parts();
    match strip_mount(&parts.uri, mount) {
        Some(uri) => parts.uri = uri,
        None => return StatusCode::NOT_FOUND.into_response(),
    }
    serve_dir(root, Request::from_parts(parts, body)).await
}

fn strip_mount(uri: &Uri, mount: &str) -> Option<Uri> {
    let rest = uri.path().strip_prefix(mount)?;
    let path = if rest.is_empty() { "/" } else { rest };
    if !path.starts_with('/') {
        return None;
    }
    let path_and_query = match uri.query() {
        Some(query) => format!("{path}?{query}"),
        None => path.to_string(),
    };
    let path_and_query: PathAndQuery = path_and_query.parse().ok()?;
    Uri::builder().path_and_query(path_and_query).build().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_string(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), 1 << 20).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn mount_is_stripped_and_query_kept() {
        let uri: Uri = "/_/index.html?ver=1".parse().unwrap();
        assert_eq!(strip_mount(&uri, "/_").unwrap(), "/index.html?ver=1");
        assert!(strip_mount(&"/_x/a".parse().unwrap(), "/_").is_none());
        assert!(strip_mount(&"/other".parse().unwrap(), "/_").is_none());
    }

    #[tokio::test]
    async fn serves_files_without_caching() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<h1>site</h1>").unwrap();
        std::fs::create_dir(dir.path().join("docs")).unwrap();
        std::fs::write(dir.path().join("docs").join("index.html"), "docs").unwrap();

        let response = serve_dir(dir.path(), get("/index.html")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CACHE_CONTROL], "no-cache");
        assert_eq!(body_string(response).await, "<h1>site</h1>");

        let response = serve_dir(dir.path(), get("/docs/")).await;
        assert_eq!(body_string(response).await, "docs");

        let response = serve_dir(dir.path(), get("/missing.css")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn refuses_traversal() {
        let parent = tempfile::tempdir().unwrap();
        let root = parent.path().join("site");
        std::fs::create_dir(&root).unwrap();
        std::fs::write(parent.path().join("secret.txt"), "secret").unwrap();

        let response = serve_dir(&root, get("/../secret.txt")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn reload_tag_lands_before_the_last_body_end() {
        let tag = reload_tag();
        let page = inject_before_body_end(b"<html><BODY><p>x</p></Body></html>", tag.as_bytes());
        assert_eq!(
            String::from_utf8(page).unwrap(),
            format!("<html><BODY><p>x</p>{tag}</Body></html>")
        );

        let page = inject_before_body_end(b"<p>fragment</p>", tag.as_bytes());
        assert_eq!(String::from_utf8(page).unwrap(), format!("<p>fragment</p>{tag}"));
    }

    #[tokio::test]
    async fn project_pages_carry_the_reload_client() {
        let dir = tempfile::tempdir().unwrap();
        let page = "<html><body><p>site</p></body></html>";
        std::fs::write(dir.path().join("index.html"), page).unwrap();
        std::fs::write(dir.path().join("app.css"), "body{}").unwrap();

        let response = serve_project(dir.path(), get("/index.html")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CACHE_CONTROL], "no-cache");
        let expected = format!("<html><body><p>site</p>{}</body></html>", reload_tag());
        assert_eq!(response.headers()[header::CONTENT_LENGTH], expected.len().to_string().as_str());
        assert_eq!(body_string(response).await, expected);

        let head = Request::builder()
            .method(Method::HEAD)
            .uri("/index.html")
            .body(Body::empty())
            .unwrap();
        let response = serve_project(dir.path(), head).await;
        assert_eq!(response.headers()[header::CONTENT_LENGTH], expected.len().to_string().as_str());

        let response = serve_project(dir.path(), get("/app.css")).await;
        assert_eq!(body_string(response).await, "body{}");
    }

    #[tokio::test]
    async fn mounted_dashboard_resources() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("reload.js"), "poll()").unwrap();

        let response = serve_mounted(dir.path(), "/_", get("/_/reload.js")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "poll()");
    }
}
