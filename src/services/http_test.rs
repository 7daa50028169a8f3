use std::sync::Mutex;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post, put};
use axum::{Json, Router};

use super::*;
use crate::services::NoU2fDevice;
use crate::services::storage::{BearerToken, MemoryTokenStorage};

// =============================================================================
// HELPERS
// =============================================================================

/// Request bodies seen by the fake proxy, tagged with the route.
#[derive(Clone, Default)]
struct Recorder {
    seen: Arc<Mutex<Vec<(&'static str, Value)>>>,
}

impl Recorder {
    fn push(&self, route: &'static str, body: Value) {
        self.seen.lock().unwrap().push((route, body));
    }

    fn bodies(&self, route: &str) -> Vec<Value> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .filter(|(r, _)| *r == route)
            .map(|(_, b)| b.clone())
            .collect()
    }
}

struct EchoSigner;

#[async_trait::async_trait]
impl U2fSigner for EchoSigner {
    async fn register(&self, challenge: &Value) -> Result<Value, AuthError> {
        Ok(json!({ "registered": challenge }))
    }

    async fn sign(&self, challenge: &Value) -> Result<Value, AuthError> {
        Ok(json!({ "signed": challenge }))
    }
}

async fn login_ok(State(rec): State<Recorder>, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    let ok = body.get("pass").and_then(Value::as_str) == Some("secret");
    rec.push("login", body);
    if ok {
        (StatusCode::OK, Json(json!({ "type": "bearer", "token": "tok-1", "expires_in": 60 })))
    } else {
        (StatusCode::FORBIDDEN, Json(json!({ "message": "bad username or password" })))
    }
}

async fn sites(headers: HeaderMap) -> (StatusCode, Json<Value>) {
    let authorized = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == "Bearer tok-1");
    if authorized {
        (StatusCode::OK, Json(json!({ "sites": [] })))
    } else {
        (StatusCode::UNAUTHORIZED, Json(json!({ "error": { "message": "access denied" } })))
    }
}

async fn u2f_challenge(State(rec): State<Recorder>, Json(body): Json<Value>) -> Json<Value> {
    rec.push("u2f_challenge", body);
    Json(json!({ "challenge": "c-42" }))
}

async fn u2f_session(State(rec): State<Recorder>, Json(body): Json<Value>) -> Json<Value> {
    rec.push("u2f_session", body);
    Json(json!({ "token": "tok-u2f" }))
}

async fn signup_challenge() -> Json<Value> {
    Json(json!({ "challenge": "reg-1" }))
}

async fn record_users(State(rec): State<Recorder>, Json(body): Json<Value>) -> StatusCode {
    rec.push("users", body);
    StatusCode::OK
}

async fn record_u2f_users(State(rec): State<Recorder>, Json(body): Json<Value>) -> StatusCode {
    rec.push("u2f_users", body);
    StatusCode::OK
}

async fn record_password(State(rec): State<Recorder>, Json(body): Json<Value>) -> StatusCode {
    rec.push("password", body);
    StatusCode::OK
}

async fn record_logout(State(rec): State<Recorder>) -> StatusCode {
    rec.push("logout", Value::Null);
    StatusCode::OK
}

async fn invite() -> Json<Value> {
    Json(json!({ "user": "alice", "qr": "cXI=" }))
}

async fn plain_error() -> (StatusCode, &'static str) {
    (StatusCode::BAD_REQUEST, "invite expired\n")
}

fn fake_proxy(rec: Recorder) -> Router {
    Router::new()
        .route(config::SESSION_PATH, post(login_ok).delete(record_logout))
        .route(config::SITES_PATH, get(sites))
        .route(config::U2F_SESSION_CHALLENGE_PATH, post(u2f_challenge))
        .route(config::U2F_CHANGE_PASSWORD_CHALLENGE_PATH, post(u2f_challenge))
        .route(config::U2F_SESSION_PATH, post(u2f_session))
        .route("/v1/webapi/u2f/signuptokens/{token}", get(signup_challenge))
        .route(config::CREATE_USER_PATH, post(record_users))
        .route(config::U2F_CREATE_USER_PATH, post(record_u2f_users))
        .route(config::CHANGE_PASSWORD_PATH, put(record_password))
        .route("/v1/webapi/users/invites/{token}", get(invite))
        .route("/v1/webapi/broken", get(plain_error))
        .with_state(rec)
}

async fn spawn_proxy(rec: Recorder) -> AuthConfig {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, fake_proxy(rec)).await.unwrap();
    });
    AuthConfig::new(&format!("http://{addr}")).unwrap()
}

async fn client_with(rec: Recorder, u2f: Arc<dyn U2fSigner>) -> (HttpClient, Arc<MemoryTokenStorage>) {
    let config = spawn_proxy(rec).await;
    let storage = Arc::new(MemoryTokenStorage::new());
    let client = HttpClient::new(config, storage.clone(), u2f).unwrap();
    (client, storage)
}

// =============================================================================
// rejection_message
// =============================================================================

#[test]
fn rejection_message_prefers_json_message() {
    let msg = rejection_message(StatusCode::FORBIDDEN, r#"{"message":"denied"}"#);
    assert_eq!(msg, "denied");
}

#[test]
fn rejection_message_reads_nested_error() {
    let msg = rejection_message(StatusCode::FORBIDDEN, r#"{"error":{"message":"nested"}}"#);
    assert_eq!(msg, "nested");
}

#[test]
fn rejection_message_falls_back_to_body_then_reason() {
    assert_eq!(rejection_message(StatusCode::BAD_REQUEST, " raw text \n"), "raw text");
    assert_eq!(rejection_message(StatusCode::NOT_FOUND, ""), "Not Found");
}

// =============================================================================
// AuthApi
// =============================================================================

#[tokio::test]
async fn login_posts_credentials() {
    let rec = Recorder::default();
    let (client, _) = client_with(rec.clone(), Arc::new(NoU2fDevice)).await;

    let response = client.login("alice", "secret", "123456").await.unwrap();
    assert_eq!(response.get("token").and_then(Value::as_str), Some("tok-1"));

    let bodies = rec.bodies("login");
    assert_eq!(bodies.len(), 1);
    assert_eq!(bodies[0], json!({ "user": "alice", "pass": "secret", "second_factor_token": "123456" }));
}

#[tokio::test]
async fn login_rejection_carries_server_message() {
    let (client, _) = client_with(Recorder::default(), Arc::new(NoU2fDevice)).await;
    let err = client.login("alice", "wrong", "").await.unwrap_err();
    assert_eq!(err, AuthError::Rejected { status: 403, message: "bad username or password".into() });
}

#[tokio::test]
async fn login_with_u2f_signs_challenge() {
    let rec = Recorder::default();
    let (client, _) = client_with(rec.clone(), Arc::new(EchoSigner)).await;

    let response = client.login_with_u2f("alice", "secret").await.unwrap();
    assert_eq!(response.get("token").and_then(Value::as_str), Some("tok-u2f"));

    assert_eq!(rec.bodies("u2f_challenge"), vec![json!({ "user": "alice", "pass": "secret" })]);
    let session = &rec.bodies("u2f_session")[0];
    assert_eq!(session["user"], "alice");
    assert_eq!(session["u2f_sign_response"], json!({ "signed": { "challenge": "c-42" } }));
}

#[tokio::test]
async fn login_with_u2f_without_device_fails() {
    let rec = Recorder::default();
    let (client, _) = client_with(rec.clone(), Arc::new(NoU2fDevice)).await;
    let err = client.login_with_u2f("alice", "secret").await.unwrap_err();
    assert!(matches!(err, AuthError::U2f(_)));
    assert!(rec.bodies("u2f_session").is_empty());
}

#[tokio::test]
async fn accept_invite_posts_new_user() {
    let rec = Recorder::default();
    let (client, _) = client_with(rec.clone(), Arc::new(NoU2fDevice)).await;
    client.accept_invite("bob", "pw", "otp", "inv-1").await.unwrap();
    assert_eq!(
        rec.bodies("users"),
        vec![json!({ "invite_token": "inv-1", "user": "bob", "pass": "pw", "second_factor_token": "otp" })]
    );
}

#[tokio::test]
async fn accept_invite_with_u2f_registers_device() {
    let rec = Recorder::default();
    let (client, _) = client_with(rec.clone(), Arc::new(EchoSigner)).await;
    client.accept_invite_with_u2f("bob", "pw", "inv-1").await.unwrap();
    let body = &rec.bodies("u2f_users")[0];
    assert_eq!(body["invite_token"], "inv-1");
    assert_eq!(body["u2f_register_response"], json!({ "registered": { "challenge": "reg-1" } }));
}

#[tokio::test]
async fn change_password_puts_passwords() {
    let rec = Recorder::default();
    let (client, _) = client_with(rec.clone(), Arc::new(NoU2fDevice)).await;
    client.change_password("old", "new", "otp").await.unwrap();
    assert_eq!(
        rec.bodies("password"),
        vec![json!({ "old_password": "old", "new_password": "new", "second_factor_token": "otp" })]
    );
}

#[tokio::test]
async fn change_password_with_u2f_signs_first() {
    let rec = Recorder::default();
    let (client, _) = client_with(rec.clone(), Arc::new(EchoSigner)).await;
    client.change_password_with_u2f("old", "new").await.unwrap();
    assert_eq!(rec.bodies("u2f_challenge"), vec![json!({ "pass": "old" })]);
    assert_eq!(rec.bodies("password")[0]["u2f_sign_response"], json!({ "signed": { "challenge": "c-42" } }));
}

// =============================================================================
// SessionApi / Api
// =============================================================================

#[tokio::test]
async fn ensure_session_unauthorized_is_session_invalid() {
    let (client, _) = client_with(Recorder::default(), Arc::new(NoU2fDevice)).await;
    assert_eq!(client.ensure_session().await, Err(AuthError::SessionInvalid));
}

#[tokio::test]
async fn ensure_session_sends_stored_bearer_token() {
    let (client, storage) = client_with(Recorder::default(), Arc::new(NoU2fDevice)).await;
    let token = BearerToken::from_login(&json!({ "token": "tok-1", "expires_in": 60 })).unwrap();
    storage.set_bearer_token(token).await.unwrap();
    assert_eq!(client.ensure_session().await, Ok(()));
}

#[tokio::test]
async fn expired_bearer_token_is_not_sent() {
    let (client, storage) = client_with(Recorder::default(), Arc::new(NoU2fDevice)).await;
    let mut token = BearerToken::from_login(&json!({ "token": "tok-1", "expires_in": 60 })).unwrap();
    token.created -= time::Duration::hours(1);
    storage.set_bearer_token(token).await.unwrap();

    assert_eq!(client.ensure_session().await, Err(AuthError::SessionInvalid));
    assert!(storage.bearer_token().await.unwrap().is_none());
}

#[tokio::test]
async fn logout_deletes_session_and_clears_token() {
    let rec = Recorder::default();
    let (client, storage) = client_with(rec.clone(), Arc::new(NoU2fDevice)).await;
    let token = BearerToken::from_login(&json!({ "token": "tok-1" })).unwrap();
    storage.set_bearer_token(token).await.unwrap();

    client.logout().await;
    assert_eq!(rec.bodies("logout").len(), 1);
    assert!(storage.bearer_token().await.unwrap().is_none());
}

#[tokio::test]
async fn api_get_returns_json() {
    let (client, _) = client_with(Recorder::default(), Arc::new(NoU2fDevice)).await;
    let invite = client.get(&client.config().invite_path("abc").unwrap()).await.unwrap();
    assert_eq!(invite["user"], "alice");
}

#[tokio::test]
async fn api_get_plain_text_error() {
    let (client, _) = client_with(Recorder::default(), Arc::new(NoU2fDevice)).await;
    let err = client.get("/v1/webapi/broken").await.unwrap_err();
    assert_eq!(err, AuthError::Rejected { status: 400, message: "invite expired".into() });
}

#[tokio::test]
async fn unreachable_server_is_transport_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let config = AuthConfig::new(&format!("http://{addr}")).unwrap();
    let client = HttpClient::new(config, Arc::new(MemoryTokenStorage::new()), Arc::new(NoU2fDevice)).unwrap();
    assert!(matches!(client.get("/v1/webapi/sites").await, Err(AuthError::Transport(_))));
}
