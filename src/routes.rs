// src/routes.rs

use std::sync::Arc;

use axum::{
    Router, http::Method, middleware,
    routing::{get, post, put},
};
use tower_governor::{GovernorLayer, governor::GovernorConfigBuilder};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{admin, center_admin, secure_exam, student_exam},
    state::AppState,
    utils::jwt::{admin_middleware, auth_middleware, center_middleware},
};

/// Assembles the main application router.
///
/// * Merges all sub-routers (secure-exam, center-admin, student-exam, admin).
/// * Applies global middleware (Trace, CORS).
/// * Injects global state (pool, config, paper cache, connectivity).
pub fn create_router(state: AppState) -> Router {
    let origins = [
        "http://localhost:3000".parse().unwrap(),
        "http://127.0.0.1:3000".parse().unwrap(),
    ];

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
        ]);

    // Brute-force guard on the operator login, keyed by peer IP.
    let governor_conf = GovernorConfigBuilder::default()
        .per_second(2)
        .burst_size(5)
        .finish()
        .unwrap();
    let governor_conf = Arc::new(governor_conf);

    // Central surface for lockdown clients, gated by the center access
    // token carried in each request rather than a JWT.
    let secure_exam_routes = Router::new()
        .route("/validate-token/{token}", get(secure_exam::validate_token))
        .route("/start-session", post(secure_exam::start_session))
        .route("/heartbeat", post(secure_exam::heartbeat))
        .route("/end-session", post(secure_exam::end_session))
        .route("/package/{token}", get(secure_exam::download_package));

    let center_admin_routes = Router::new()
        .route(
            "/login",
            post(center_admin::login).layer(GovernorLayer::new(governor_conf)),
        )
        .merge(
            Router::new()
                .route("/student-login", post(center_admin::student_login))
                .route("/unlock-paper", post(center_admin::unlock_paper))
                .route("/terminate-student", post(center_admin::terminate_student))
                .route("/sync-to-main", post(center_admin::sync_to_main))
                .route("/connectivity", put(center_admin::set_connectivity))
                .route("/local-sessions", get(center_admin::local_sessions))
                // Auth first, then center-scope check
                .layer(middleware::from_fn(center_middleware))
                .layer(middleware::from_fn_with_state(
                    state.clone(),
                    auth_middleware,
                )),
        );

    // Candidate machines hold only their session token.
    let student_exam_routes = Router::new()
        .route(
            "/{session_token}/questions",
            get(student_exam::get_questions),
        )
        .route(
            "/{session_token}/save-response",
            post(student_exam::save_responses),
        )
        .route("/{session_token}/submit", post(student_exam::submit_exam));

    let admin_routes = Router::new()
        .route("/exams", post(admin::create_exam))
        .route("/exams/{id}/candidates", post(admin::upload_roster))
        .route(
            "/center-links",
            get(admin::list_links).post(admin::issue_link),
        )
        .route("/center-links/{id}/rotate", post(admin::rotate_link))
        .route("/center-links/{id}/status", put(admin::update_link_status))
        .route("/papers", post(admin::create_paper))
        .route("/papers/{id}/decrypt", post(admin::decrypt_paper))
        .route(
            "/packages",
            get(admin::list_packages).post(admin::build_package),
        )
        .route("/sessions", get(admin::monitor_sessions))
        .route(
            "/sessions/{session_token}/terminate",
            post(admin::terminate_session),
        )
        .route("/sync-logs", get(admin::list_sync_logs))
        // Double middleware protection: Auth first, then Admin check
        .layer(middleware::from_fn(admin_middleware))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .nest("/api/secure-exam", secure_exam_routes)
        .nest("/api/center-admin", center_admin_routes)
        .nest("/api/student-exam", student_exam_routes)
        .nest("/api/admin", admin_routes)
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
