//! Minimal HTML status pages returned for every upload outcome.

use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};

/// Renders `status` and `message` as a small HTML document.
///
/// The message is escaped, so client-influenced text can be echoed safely.
pub fn render_status_page(status: StatusCode, message: &str) -> String {
    let title = format!(
        "{} - {}",
        status.as_u16(),
        status.canonical_reason().unwrap_or("Unknown")
    );
    format!(
        "<!DOCTYPE html>\n<html><head><title>{title}</title></head><body><header><h1>{title}</h1></header><section><p>{}</p></section></body></html>",
        escape_html(message)
    )
}

pub fn escape_html(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// Builds a `text/html` response with the rendered status page as body.
pub fn html_response(status: StatusCode, headers: HeaderMap, message: &str) -> Response {
    let mut response = (status, headers, render_status_page(status, message)).into_response();
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/html; charset=utf-8"),
    );
    response
}
