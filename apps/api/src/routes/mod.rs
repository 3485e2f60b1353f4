pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, post},
    Router,
};

use crate::auth::{admin, handlers as auth_handlers};
use crate::content::handlers as content_handlers;
use crate::errors::AppError;
use crate::rate_limit::enforce_rate_limit;
use crate::state::AppState;

/// Multipart resume uploads are the largest bodies we accept.
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

async fn route_not_found() -> AppError {
    AppError::NotFound("Route not found".to_string())
}

pub fn build_router(state: AppState) -> Router {
    let auth_routes = Router::new()
        .route("/register", post(auth_handlers::handle_register))
        .route("/login", post(auth_handlers::handle_login))
        .route("/logout", post(auth_handlers::handle_logout))
        .route(
            "/profile",
            get(auth_handlers::handle_get_profile).put(auth_handlers::handle_update_profile),
        )
        .route("/verify", get(auth_handlers::handle_verify_session))
        .route(
            "/verify-email/:token",
            get(auth_handlers::handle_verify_email),
        )
        .route(
            "/resend-verification",
            post(auth_handlers::handle_resend_verification),
        )
        .route_layer(middleware::from_fn_with_state(
            state.auth_limiter.clone(),
            enforce_rate_limit,
        ));

    let api_routes = Router::new()
        // AI features
        .route("/api/improve-text", post(content_handlers::handle_improve_text))
        .route(
            "/api/analyze-resume",
            post(content_handlers::handle_analyze_resume),
        )
        .route("/api/parse-pdf", post(content_handlers::handle_parse_pdf))
        .route("/api/generate-pdf", post(content_handlers::handle_generate_pdf))
        .route(
            "/api/generate-templates",
            post(content_handlers::handle_generate_templates),
        )
        .route("/api/get-templates", get(content_handlers::handle_get_templates))
        .route(
            "/api/generate-work-suggestions",
            post(content_handlers::handle_work_suggestions),
        )
        .route(
            "/api/generate-cover-letter",
            post(content_handlers::handle_cover_letter),
        )
        // Admin
        .route("/api/admin/users", get(admin::handle_list_users))
        .route("/api/admin/users/:id", delete(admin::handle_delete_user))
        .route("/api/admin/analytics", get(admin::handle_list_analytics))
        .route_layer(middleware::from_fn_with_state(
            state.api_limiter.clone(),
            enforce_rate_limit,
        ));

    Router::new()
        .route("/api/health", get(health::health_handler))
        .nest("/api/auth", auth_routes)
        .merge(api_routes)
        .fallback(route_not_found)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
        response::Response,
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::models::user::{NewUser, Role};
    use crate::rate_limit::{MemoryRateLimitStore, RateLimitPolicy, RateLimiter};
    use crate::analytics::track;
    use crate::models::analytics::NewAnalyticsEvent;
    use crate::test_support::{signed_in_user, test_state, verification_token_for, ChatStub};

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn authed_get(uri: &str, token: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn registration(email: &str) -> Value {
        json!({ "name": "Grace Hopper", "email": email, "password": "cobol-1959" })
    }

    #[tokio::test]
    async fn test_health() {
        let (state, _dir, _mailer) = test_state().await;
        let app = build_router(state);

        let response = app
            .oneshot(Request::builder().uri("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["store"], "json");
    }

    #[tokio::test]
    async fn test_register_then_duplicate_conflicts() {
        let (state, _dir, _mailer) = test_state().await;
        let app = build_router(state);

        let first = app
            .clone()
            .oneshot(json_request("POST", "/api/auth/register", registration("grace@navy.mil")))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::CREATED);
        let body = body_json(first).await;
        assert_eq!(body["user"]["email"], "grace@navy.mil");
        assert_eq!(body["user"]["emailVerified"], false);
        assert!(body["user"].get("passwordHash").is_none());

        let second = app
            .oneshot(json_request("POST", "/api/auth/register", registration("Grace@Navy.mil")))
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::CONFLICT);
        assert_eq!(body_json(second).await["success"], false);
    }

    #[tokio::test]
    async fn test_register_rejects_short_password() {
        let (state, _dir, _mailer) = test_state().await;
        let app = build_router(state);

        let response = app
            .oneshot(json_request(
                "POST",
                "/api/auth/register",
                json!({ "name": "Grace", "email": "grace@navy.mil", "password": "short" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unverified_login_requires_verification() {
        let (state, _dir, _mailer) = test_state().await;
        let app = build_router(state);

        app.clone()
            .oneshot(json_request("POST", "/api/auth/register", registration("grace@navy.mil")))
            .await
            .unwrap();

        let response = app
            .oneshot(json_request(
                "POST",
                "/api/auth/login",
                json!({ "email": "grace@navy.mil", "password": "cobol-1959" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_json(response).await["requiresVerification"], true);
    }

    #[tokio::test]
    async fn test_verify_email_once_then_login() {
        let (state, _dir, _mailer) = test_state().await;
        let app = build_router(state.clone());

        app.clone()
            .oneshot(json_request("POST", "/api/auth/register", registration("grace@navy.mil")))
            .await
            .unwrap();
        let token = verification_token_for(&state, "grace@navy.mil").await;
        let verify_uri = format!("/api/auth/verify-email/{token}");

        let first = app
            .clone()
            .oneshot(Request::builder().uri(&verify_uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let reused = app
            .clone()
            .oneshot(Request::builder().uri(&verify_uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(reused.status(), StatusCode::BAD_REQUEST);

        let login = app
            .oneshot(json_request(
                "POST",
                "/api/auth/login",
                json!({ "email": "grace@navy.mil", "password": "cobol-1959" }),
            ))
            .await
            .unwrap();
        assert_eq!(login.status(), StatusCode::OK);
        let body = body_json(login).await;
        assert!(body["token"].as_str().is_some_and(|t| !t.is_empty()));
        assert_eq!(body["user"]["emailVerified"], true);
    }

    #[tokio::test]
    async fn test_profile_requires_token() {
        let (state, _dir, _mailer) = test_state().await;
        let app = build_router(state);

        let missing = app
            .clone()
            .oneshot(Request::builder().uri("/api/auth/profile").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

        let garbage = app
            .oneshot(authed_get("/api/auth/profile", "not-a-jwt"))
            .await
            .unwrap();
        assert_eq!(garbage.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_partial_profile_update() {
        let (state, _dir, _mailer) = test_state().await;
        let (user, token) = signed_in_user(&state, "grace@navy.mil", Role::User).await;
        let app = build_router(state);

        let request = Request::builder()
            .method("PUT")
            .uri("/api/auth/profile")
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::from(json!({ "name": "Rear Admiral Hopper" }).to_string()))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["user"]["name"], "Rear Admiral Hopper");
        assert_eq!(body["user"]["email"], user.email);
        assert_eq!(body["user"]["emailVerified"], true);
    }

    #[tokio::test]
    async fn test_auth_rate_limit_rejects_after_cap() {
        let (mut state, _dir, _mailer) = test_state().await;
        state.auth_limiter = RateLimiter::new(
            Arc::new(MemoryRateLimitStore::new()),
            RateLimitPolicy {
                group: "auth",
                max_requests: 2,
                window: Duration::from_secs(60),
            },
        );
        let app = build_router(state);

        let from_ip = |ip: &str| {
            Request::builder()
                .uri("/api/auth/profile")
                .header("x-forwarded-for", ip)
                .body(Body::empty())
                .unwrap()
        };

        for _ in 0..2 {
            let response = app.clone().oneshot(from_ip("203.0.113.7")).await.unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        }

        let limited = app.clone().oneshot(from_ip("203.0.113.7")).await.unwrap();
        assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(limited.headers().contains_key(header::RETRY_AFTER));
        assert_eq!(body_json(limited).await["success"], false);

        let other_client = app.clone().oneshot(from_ip("198.51.100.2")).await.unwrap();
        assert_eq!(other_client.status(), StatusCode::UNAUTHORIZED);

        // The api group keeps its own counter.
        let templates = app
            .oneshot(
                Request::builder()
                    .uri("/api/get-templates")
                    .header("x-forwarded-for", "203.0.113.7")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(templates.status(), StatusCode::OK);
        assert!(templates.headers().contains_key("x-ratelimit-remaining"));
    }

    #[tokio::test]
    async fn test_health_is_not_rate_limited() {
        let (mut state, _dir, _mailer) = test_state().await;
        state.api_limiter = RateLimiter::new(
            Arc::new(MemoryRateLimitStore::new()),
            RateLimitPolicy {
                group: "api",
                max_requests: 1,
                window: Duration::from_secs(60),
            },
        );
        let app = build_router(state);

        for _ in 0..3 {
            let response = app
                .clone()
                .oneshot(Request::builder().uri("/api/health").body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
    }

    #[tokio::test]
    async fn test_admin_routes_require_admin_role() {
        let (state, _dir, _mailer) = test_state().await;
        let (_user, user_token) = signed_in_user(&state, "grace@navy.mil", Role::User).await;
        let (_admin, admin_token) = signed_in_user(&state, "root@navy.mil", Role::Admin).await;
        let app = build_router(state);

        let forbidden = app
            .clone()
            .oneshot(authed_get("/api/admin/users", &user_token))
            .await
            .unwrap();
        assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);

        let allowed = app
            .oneshot(authed_get("/api/admin/users", &admin_token))
            .await
            .unwrap();
        assert_eq!(allowed.status(), StatusCode::OK);
        assert_eq!(body_json(allowed).await["count"], 2);
    }

    #[tokio::test]
    async fn test_unverified_admin_must_verify_first() {
        let (state, _dir, _mailer) = test_state().await;
        let admin = state
            .users
            .create(NewUser {
                email: "root@navy.mil".to_string(),
                password_hash: "not-a-real-hash".to_string(),
                name: "Root".to_string(),
                role: Role::Admin,
            })
            .await
            .unwrap();
        let token = state.tokens.issue(&admin).unwrap().token;
        let app = build_router(state);

        let response = app
            .oneshot(authed_get("/api/admin/analytics", &token))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_json(response).await["requiresVerification"], true);
    }

    #[tokio::test]
    async fn test_admin_delete_user() {
        let (state, _dir, _mailer) = test_state().await;
        let (user, _) = signed_in_user(&state, "grace@navy.mil", Role::User).await;
        let (_admin, admin_token) = signed_in_user(&state, "root@navy.mil", Role::Admin).await;
        let app = build_router(state.clone());

        let request = Request::builder()
            .method("DELETE")
            .uri(format!("/api/admin/users/{}", user.id))
            .header(header::AUTHORIZATION, format!("Bearer {admin_token}"))
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(state.users.find_by_id(user.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_generate_templates_falls_back_without_api_key() {
        let (state, _dir, _mailer) = test_state().await;
        let app = build_router(state);

        let response = app
            .clone()
            .oneshot(json_request("POST", "/api/generate-templates", json!({ "count": 2 })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["source"], "fallback");
        assert_eq!(body["templates"].as_array().unwrap().len(), 2);

        let catalog = app
            .oneshot(Request::builder().uri("/api/get-templates").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = body_json(catalog).await;
        assert_eq!(body["templates"].as_array().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_ai_route_without_api_key_is_unavailable() {
        let (state, _dir, _mailer) = test_state().await;
        let app = build_router(state);

        let response = app
            .oneshot(json_request("POST", "/api/improve-text", json!({ "text": "did stuff" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_generate_pdf_returns_attachment() {
        let (state, _dir, _mailer) = test_state().await;
        let app = build_router(state);

        let response = app
            .oneshot(json_request(
                "POST",
                "/api/generate-pdf",
                json!({ "personalInfo": { "fullName": "Grace Hopper" }, "skills": ["COBOL"] }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/pdf");
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"grace-hopper-resume.pdf\""
        );
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(bytes.starts_with(b"%PDF-"));
    }

    #[tokio::test]
    async fn test_unknown_route_is_json_404() {
        let (state, _dir, _mailer) = test_state().await;
        let app = build_router(state);

        let response = app
            .oneshot(Request::builder().uri("/api/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["success"], false);
    }

    async fn post_generate_templates(app: &Router, body: Value) -> (StatusCode, Value) {
        let response = app
            .clone()
            .oneshot(json_request("POST", "/api/generate-templates", body))
            .await
            .unwrap();
        let status = response.status();
        (status, body_json(response).await)
    }

    #[tokio::test]
    async fn test_generate_templates_clamps_out_of_range_counts() {
        let (state, _dir, _mailer) = test_state().await;
        let app = build_router(state);

        let (status, body) = post_generate_templates(&app, json!({ "count": 1000 })).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["templates"].as_array().unwrap().len(), 6);

        let (status, body) = post_generate_templates(&app, json!({ "count": -5 })).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["templates"].as_array().unwrap().len(), 1);

        let empty = Request::builder()
            .method("POST")
            .uri("/api/generate-templates")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(empty).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["templates"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_generate_templates_rejects_malformed_body() {
        let (state, _dir, _mailer) = test_state().await;
        let app = build_router(state);

        let request = Request::builder()
            .method("POST")
            .uri("/api/generate-templates")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{\"count\": 2"))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let (status, _) = post_generate_templates(&app, json!({ "count": "lots" })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_admin_analytics_uses_camel_case() {
        let (state, _dir, _mailer) = test_state().await;
        let (user, _) = signed_in_user(&state, "grace@navy.mil", Role::User).await;
        let (_admin, admin_token) = signed_in_user(&state, "root@navy.mil", Role::Admin).await;
        track(
            state.analytics.as_ref(),
            NewAnalyticsEvent::new(Some(user.id), "improve_text", "used"),
        )
        .await;
        let app = build_router(state);

        let response = app
            .oneshot(authed_get("/api/admin/analytics", &admin_token))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        let event = &body["events"][0];
        assert_eq!(event["featureName"], "improve_text");
        assert_eq!(event["userId"], user.id.to_string());
        assert!(event.get("createdAt").is_some());
        assert!(event.get("feature_name").is_none());
    }

    #[tokio::test]
    async fn test_generate_templates_uses_model_output() {
        let generated = json!([
            { "name": "Bold", "fontFamily": "Lato", "primaryColor": "#112233",
              "accentColor": "#445566", "sectionOrder": ["skills", "summary", "skills"] },
            { "name": "Calm", "fontFamily": "Inter", "primaryColor": "#000000",
              "accentColor": "#ffffff", "sectionOrder": ["summary"], "layout": "sidebar" },
            { "name": "Extra", "fontFamily": "Georgia", "primaryColor": "#abcdef",
              "accentColor": "#fedcba", "sectionOrder": ["education"] }
        ]);
        let stub = ChatStub::replying(&generated.to_string()).await;
        let (mut state, _dir, _mailer) = test_state().await;
        state.llm = stub.client();
        let app = build_router(state);

        let (status, body) = post_generate_templates(&app, json!({ "count": 2 })).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["source"], "ai");
        let templates = body["templates"].as_array().unwrap();
        assert_eq!(templates.len(), 2);
        assert_eq!(templates[0]["name"], "Bold");
        assert_eq!(templates[0]["sectionOrder"], json!(["skills", "summary"]));
        assert!(templates[0]["id"].as_str().unwrap().starts_with("ai-"));
        assert_eq!(stub.hits(), 1);
    }

    #[tokio::test]
    async fn test_generate_templates_falls_back_on_unusable_output() {
        let stub = ChatStub::replying("Here are some nice templates for you!").await;
        let (mut state, _dir, _mailer) = test_state().await;
        state.llm = stub.client();
        let app = build_router(state);

        let (status, body) = post_generate_templates(&app, json!({ "count": 4 })).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["source"], "fallback");
        assert_eq!(body["templates"].as_array().unwrap().len(), 4);
        assert_eq!(stub.hits(), 1);
    }

    #[tokio::test]
    async fn test_work_suggestions_are_split_into_bullets() {
        let stub =
            ChatStub::replying("1. Led a team of 5 engineers\n\n- Cut build times by 40%\n* Mentored interns")
                .await;
        let (mut state, _dir, _mailer) = test_state().await;
        state.llm = stub.client();
        let app = build_router(state);

        let response = app
            .oneshot(json_request(
                "POST",
                "/api/generate-work-suggestions",
                json!({ "jobTitle": "Engineering Manager", "company": "Acme" }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await["suggestions"],
            json!([
                "Led a team of 5 engineers",
                "Cut build times by 40%",
                "Mentored interns"
            ])
        );
    }

    #[tokio::test]
    async fn test_improve_text_reports_upstream_failure() {
        let stub = ChatStub::spawn(vec![(
            StatusCode::BAD_REQUEST,
            json!({ "error": { "message": "context length exceeded" } }),
        )])
        .await;
        let (mut state, _dir, _mailer) = test_state().await;
        state.llm = stub.client();
        let app = build_router(state);

        let response = app
            .oneshot(json_request("POST", "/api/improve-text", json!({ "text": "did stuff" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
