use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;

use crate::metrics::{HTTP_REQUESTS_TOTAL, HTTP_REQUEST_DURATION_SECONDS};

/// Records request count and latency per (method, path, status).
/// Paths are normalized so that ids do not explode label cardinality.
pub async fn track_metrics(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let path = normalize_path(request.uri().path());

    let response = next.run(request).await;

    let status = response.status().as_u16().to_string();
    let elapsed = start.elapsed().as_secs_f64();

    HTTP_REQUESTS_TOTAL
        .with_label_values(&[&method, &path, &status])
        .inc();
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[&method, &path])
        .observe(elapsed);

    response
}

/// Replaces numeric path segments with `:id`.
fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if !segment.is_empty() && segment.chars().all(|c| c.is_ascii_digit()) {
                ":id"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_numeric_segments() {
        assert_eq!(
            normalize_path("/api/v1/quizzes/42/start"),
            "/api/v1/quizzes/:id/start"
        );
        assert_eq!(
            normalize_path("/api/v1/quizzes/7/refresh/19"),
            "/api/v1/quizzes/:id/refresh/:id"
        );
    }

    #[test]
    fn leaves_named_segments_alone() {
        assert_eq!(
            normalize_path("/api/v1/quizzes/sample"),
            "/api/v1/quizzes/sample"
        );
        assert_eq!(normalize_path("/health"), "/health");
    }
}
