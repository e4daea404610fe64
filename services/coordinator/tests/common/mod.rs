#![allow(dead_code)]

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::routing::RouterIntoService;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use coordinator::app::{AppState, build_router};
use coordinator::notify::RecordingNotifier;
use coordinator::store::memory::InMemoryStore;
use loop_authz::{CredentialPolicy, Principal, UserUid};
use std::sync::Arc;
use tower::ServiceExt;

pub type App = RouterIntoService<Body, ()>;

pub async fn read_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json")
}

pub struct TestApp {
    pub app: App,
    pub store: InMemoryStore,
    pub notifier: Arc<RecordingNotifier>,
}

pub fn test_app() -> TestApp {
    let store = InMemoryStore::new();
    let notifier = Arc::new(RecordingNotifier::new());
    let state = AppState {
        store: Arc::new(store.clone()),
        notifier: notifier.clone(),
        credentials: CredentialPolicy::default(),
    };
    TestApp {
        app: build_router(state).into_service(),
        store,
        notifier,
    }
}

/// A logged-in user.
#[derive(Debug, Clone)]
pub struct Session {
    pub uid: String,
    pub email: String,
    pub token: String,
}

pub fn validate_uri(email: &str, code: &str, chain_uid: Option<&str>) -> String {
    let encoded = STANDARD
        .encode(email)
        .replace('+', "%2B")
        .replace('/', "%2F")
        .replace('=', "%3D");
    let mut uri = format!("/v2/login/validate?apiKey={code}&u={encoded}");
    if let Some(chain_uid) = chain_uid {
        uri.push_str(&format!("&c={chain_uid}"));
    }
    uri
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> axum::response::Response {
        self.app.clone().oneshot(request).await.expect("response")
    }

    /// Exchanges the latest emailed code for `email` into a session.
    pub async fn redeem(&self, email: &str, chain_uid: Option<&str>) -> axum::response::Response {
        let code = self.notifier.last_code_for(email).expect("code sent");
        self.send(crate::http_helpers::get(&validate_uri(email, &code, chain_uid), None))
            .await
    }

    pub async fn login(&self, email: &str) -> Session {
        let response = self
            .send(crate::http_helpers::json_request(
                "POST",
                "/v2/login/email",
                serde_json::json!({ "email": email }),
                None,
            ))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let response = self.redeem(email, None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await;
        Session {
            uid: body["user"]["uid"].as_str().expect("uid").to_string(),
            email: email.to_string(),
            token: body["token"].as_str().expect("token").to_string(),
        }
    }

    /// Registers `email`, optionally asking to join `chain_uid`, and logs in.
    pub async fn register(&self, name: &str, email: &str, chain_uid: Option<&str>) -> Session {
        let response = self
            .send(crate::http_helpers::json_request(
                "POST",
                "/v2/register/basic-user",
                serde_json::json!({ "name": name, "email": email, "chain_uid": chain_uid }),
                None,
            ))
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let response = self.redeem(email, None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await;
        Session {
            uid: body["user"]["uid"].as_str().expect("uid").to_string(),
            email: email.to_string(),
            token: body["token"].as_str().expect("token").to_string(),
        }
    }

    pub async fn root(&self) -> Session {
        let mut principal = Principal::new(UserUid::new("root"), "Root");
        principal.email = Some("root@example.org".to_string());
        principal.is_root_admin = true;
        principal.is_email_verified = true;
        principal.accepted_legal = true;
        self.store.seed_principal(principal).await;
        self.login("root@example.org").await
    }

    /// Creates a chain owned by `owner` and returns its uid.
    pub async fn create_chain(&self, owner: &Session, name: &str) -> String {
        let response = self
            .send(crate::http_helpers::json_request(
                "POST",
                "/v2/chain",
                serde_json::json!({ "name": name, "description": "test chain" }),
                Some(&owner.token),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        read_json(response).await["uid"]
            .as_str()
            .expect("chain uid")
            .to_string()
    }

    /// `member` asks to join and `admin` approves.
    pub async fn add_approved(&self, admin: &Session, member: &Session, chain_uid: &str) {
        let response = self
            .send(crate::http_helpers::json_request(
                "POST",
                "/v2/chain/join",
                serde_json::json!({ "chain_uid": chain_uid }),
                Some(&member.token),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let response = self
            .send(crate::http_helpers::json_request(
                "PATCH",
                "/v2/chain/approve-user",
                serde_json::json!({ "user_uid": member.uid, "chain_uid": chain_uid }),
                Some(&admin.token),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}
