use axum::{
    body::Body,
    http::{StatusCode, Uri, header},
    response::{IntoResponse, Response},
};
use rust_embed::RustEmbed;

#[derive(RustEmbed)]
#[folder = "web/"]
#[include = "*"]
pub struct Assets;

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "404 Not Found").into_response()
}

fn asset_response(path: &str, content_type: &str) -> Option<Response> {
    let content = Assets::get(path)?;
    Some(
        (
            StatusCode::OK,
            [(header::CONTENT_TYPE, content_type.to_string())],
            Body::from(content.data.into_owned()),
        )
            .into_response(),
    )
}

/// Serve the embedded dashboard. Extension-less paths fall back to `index.html`.
pub async fn static_handler(uri: Uri) -> Response {
    let path = uri.path().trim_start_matches('/');

    if !path.is_empty() {
        let mime = mime_guess::from_path(path).first_or_octet_stream();
        if let Some(response) = asset_response(path, mime.as_ref()) {
            return response;
        }
    }

    if path.is_empty() || !path.contains('.') {
        return asset_response("index.html", "text/html; charset=utf-8").unwrap_or_else(not_found);
    }
    not_found()
}
