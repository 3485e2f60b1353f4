//! Shared fixtures: an `AppState` over a JSON store in a temp directory, with
//! in-memory rate limiting and a mailer that records instead of sending, plus a
//! local stand-in for the chat-completions endpoint.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde_json::{json, Value};
use tempfile::TempDir;

use crate::auth::tokens::TokenService;
use crate::config::{Config, RateLimitSettings};
use crate::content::templates::TemplateCatalog;
use crate::llm_client::{LlmClient, DEFAULT_MODEL};
use crate::mail::testing::RecordingMailer;
use crate::mail::Mailer;
use crate::models::user::{NewUser, Role, User, UserUpdate};
use crate::rate_limit::{MemoryRateLimitStore, RateLimitPolicy, RateLimiter};
use crate::state::AppState;
use crate::store::JsonFileStore;

pub const TEST_JWT_SECRET: &str = "test-secret-that-is-long-enough";

pub fn test_config(dir: &TempDir) -> Config {
    Config {
        port: 0,
        cors_origin: "http://localhost:5173".to_string(),
        frontend_url: "http://localhost:5173".to_string(),
        jwt_secret: TEST_JWT_SECRET.to_string(),
        database_url: None,
        data_dir: dir.path().to_path_buf(),
        redis_url: None,
        openai_api_key: None,
        openai_model: DEFAULT_MODEL.to_string(),
        openai_base_url: None,
        smtp: None,
        rate_limit: RateLimitSettings::default(),
        rust_log: "debug".to_string(),
    }
}

pub async fn test_state_with_mailer(mailer: Arc<dyn Mailer>) -> (AppState, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir);
    let store = Arc::new(JsonFileStore::open(dir.path()).await.unwrap());
    let counters = Arc::new(MemoryRateLimitStore::new());

    let state = AppState {
        users: store.clone(),
        analytics: store,
        tokens: TokenService::new(&config.jwt_secret),
        mailer,
        llm: LlmClient::new(None, config.openai_model.clone()).unwrap(),
        templates: TemplateCatalog::new(),
        api_limiter: RateLimiter::new(counters.clone(), RateLimitPolicy::api(&config.rate_limit)),
        auth_limiter: RateLimiter::new(counters, RateLimitPolicy::auth(&config.rate_limit)),
        config,
        store_backend: "json",
    };
    (state, dir)
}

pub async fn test_state() -> (AppState, TempDir, Arc<RecordingMailer>) {
    let mailer = Arc::new(RecordingMailer::default());
    let (state, dir) = test_state_with_mailer(mailer.clone()).await;
    (state, dir, mailer)
}

/// Reads the pending verification token straight from the store.
pub async fn verification_token_for(state: &AppState, email: &str) -> String {
    state
        .users
        .find_by_email(email)
        .await
        .unwrap()
        .and_then(|u| u.verification_token)
        .expect("user has a pending verification token")
}

/// Creates a verified user with the given role and returns it with a session token.
pub async fn signed_in_user(state: &AppState, email: &str, role: Role) -> (User, String) {
    let user = state
        .users
        .create(NewUser {
            email: email.to_string(),
            password_hash: "not-a-real-hash".to_string(),
            name: "Test User".to_string(),
            role,
        })
        .await
        .unwrap();
    let user = state
        .users
        .update(
            user.id,
            UserUpdate {
                email_verified: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .unwrap();
    let session = state.tokens.issue(&user).unwrap();
    (user, session.token)
}

/// Local chat-completions server. Answers with `replies` in order and repeats
/// the last one once they run out.
pub struct ChatStub {
    pub url: String,
    pub hits: Arc<AtomicUsize>,
}

impl ChatStub {
    pub async fn spawn(replies: Vec<(StatusCode, Value)>) -> Self {
        assert!(!replies.is_empty());
        let hits = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route("/v1/chat/completions", post(stub_reply))
            .with_state((Arc::new(replies), hits.clone()));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            url: format!("http://{addr}/v1/chat/completions"),
            hits,
        }
    }

    /// Answers every request with `content` as the model's message.
    pub async fn replying(content: &str) -> Self {
        Self::spawn(vec![(StatusCode::OK, chat_completion(content))]).await
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    /// A configured client that talks to this stub.
    pub fn client(&self) -> LlmClient {
        LlmClient::new(Some("test-key".to_string()), DEFAULT_MODEL.to_string())
            .unwrap()
            .with_base_url(&self.url)
    }
}

async fn stub_reply(
    State((replies, hits)): State<(Arc<Vec<(StatusCode, Value)>>, Arc<AtomicUsize>)>,
) -> (StatusCode, Json<Value>) {
    let n = hits.fetch_add(1, Ordering::SeqCst);
    let (status, body) = replies[n.min(replies.len() - 1)].clone();
    (status, Json(body))
}

/// Body of a successful chat completion whose first choice says `content`.
pub fn chat_completion(content: &str) -> Value {
    json!({
        "choices": [{ "message": { "role": "assistant", "content": content } }],
        "usage": { "prompt_tokens": 12, "completion_tokens": 34 }
    })
}
