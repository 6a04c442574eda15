use axum::{
    extract::Request,
    http::{header, HeaderValue, Method},
    middleware::{self, Next},
    response::Response,
    routing::{get, patch, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod cache;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middlewares;
pub mod models;
pub mod services;
pub mod store;

pub use config::Config;
pub use services::AppState;

/// CSP middleware adds Content-Security-Policy header to all responses
async fn csp_middleware(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    response.headers_mut().insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static(
            "default-src 'self'; \
             script-src 'self' 'unsafe-inline'; \
             style-src 'self' 'unsafe-inline'; \
             img-src 'self' data: https:; \
             connect-src 'self'",
        ),
    );
    response
}

pub fn create_router(app_state: std::sync::Arc<services::AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_origin(tower_http::cors::Any); // TODO: restrict to specific origins in production

    Router::new()
        // Public endpoints (no auth required)
        .route("/health", get(handlers::health_check))
        // Metrics endpoint with Basic Auth protection
        .route(
            "/metrics",
            get(handlers::metrics_handler)
                .layer(middleware::from_fn(handlers::metrics_auth_middleware)),
        )
        .nest("/api/v1/quizzes", quiz_routes())
        .with_state(app_state)
        .layer(cors)
        .layer(middleware::from_fn(csp_middleware))
        .layer(middleware::from_fn(middlewares::metrics::track_metrics))
        .layer(TraceLayer::new_for_http())
}

fn quiz_routes() -> Router<std::sync::Arc<services::AppState>> {
    Router::new()
        // Catalog and authoring
        .route(
            "/",
            get(handlers::quizzes::list_quizzes).post(handlers::quizzes::create_quiz),
        )
        .route("/sample", post(handlers::quizzes::sample_quiz))
        .route("/statuses", get(handlers::quizzes::quiz_statuses))
        .route(
            "/questions/{question_id}/choices",
            post(handlers::quizzes::create_choice),
        )
        .route(
            "/{quiz_id}",
            get(handlers::quizzes::get_quiz).put(handlers::quizzes::update_quiz),
        )
        .route(
            "/{quiz_id}/questions",
            get(handlers::quizzes::list_questions).post(handlers::quizzes::create_question),
        )
        .route("/{quiz_id}/register", post(handlers::quizzes::register_quiz))
        .route("/{quiz_id}/attempt", post(handlers::quizzes::attempt_quiz))
        .route("/{quiz_id}/validate", get(handlers::quizzes::validate_quiz))
        // Attempt session flow
        .route("/{quiz_id}/start", get(handlers::attempts::start_attempt))
        .route("/{quiz_id}/answer", patch(handlers::attempts::record_answer))
        .route(
            "/{quiz_id}/refresh/{attempt_id}",
            get(handlers::attempts::resume_attempt),
        )
        .route("/{quiz_id}/submit", post(handlers::attempts::submit_attempt))
}
