// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # User Flows
//!
//! Each flow is one user action: a form submit or a button press. Flows run
//! their network calls one after another and never retry; a failure is
//! returned to the caller, who decides whether to start over.
//!
//! ## Flows
//!
//! - [`auth`] - register-or-authenticate by email, passkey signup
//! - [`email_auth`] - log in with an emailed credential bundle
//! - [`recovery`] - replace a lost passkey using an emailed recovery bundle
//! - [`wallet`] - send, faucet drop, export, logout
//!
//! ## Re-entrancy
//!
//! Flows that create sessions or credentials hold the
//! [`ClientState::begin`] guard, so a second submit while one is in flight
//! fails with [`ClientError::Busy`](crate::error::ClientError::Busy).

pub mod auth;
pub mod email_auth;
pub mod recovery;
pub mod wallet;

use tracing::{debug, info, warn};

use crate::config::BUNDLE_STORAGE_KEY;
use crate::error::ClientError;
use crate::frame::IframeStamper;
use crate::session::AuthState;
use crate::stamper::Stamper;
use crate::state::ClientState;

pub use auth::{authenticate, register_or_authenticate, signup, AuthOutcome};
pub use email_auth::{begin_email_auth, EmailAuth};
pub use recovery::{begin_recovery, Recovery};
pub use wallet::{export_wallet, logout, request_drop, send};

/// Pick the stamper for requests on behalf of `organization_id`.
///
/// The frame stamper is used when a stored credential bundle is still
/// within its TTL, injects into `frame` and passes a liveness check (a
/// stamped who-am-I relayed by the backend). Otherwise the passkey is used.
/// A bundle that fails injection or liveness is removed.
pub async fn current_stamper(
    state: &ClientState,
    frame: &IframeStamper,
    organization_id: &str,
) -> Stamper {
    let fallback = || Stamper::WebAuthn(state.webauthn_stamper());

    let bundle = match state.bundles.get(BUNDLE_STORAGE_KEY) {
        Ok(Some(bundle)) => bundle,
        Ok(None) => {
            debug!("No credential bundle stored, using passkey");
            return fallback();
        }
        Err(e) => {
            warn!(error = %e, "Failed to read credential bundle, using passkey");
            return fallback();
        }
    };

    if let Err(e) = frame.init().await {
        warn!(error = %e, "Frame unavailable, using passkey");
        return fallback();
    }

    if let Err(e) = frame.inject_credential_bundle(&bundle).await {
        warn!(error = %e, "Stored credential bundle rejected");
        discard_bundle(state);
        return fallback();
    }

    let stamper = Stamper::Iframe(frame.clone());
    let alive = match state.custody.stamp_get_whoami(&stamper, organization_id).await {
        Ok(signed) => state
            .api()
            .custody_whoami(&signed)
            .await
            .map(|_| ())
            .map_err(|e| e.to_string()),
        Err(e) => Err(e.to_string()),
    };

    match alive {
        Ok(()) => {
            info!(%organization_id, "Using stored credential bundle");
            stamper
        }
        Err(reason) => {
            warn!(%reason, "Credential bundle failed liveness check");
            discard_bundle(state);
            fallback()
        }
    }
}

/// Refresh the session after a login or signup call and require that the
/// backend now reports a logged-in user.
pub(crate) async fn established_session(state: &ClientState) -> Result<AuthState, ClientError> {
    let auth = state.session.refresh().await;
    if !auth.is_logged_in {
        return Err(ClientError::SessionNotEstablished);
    }
    Ok(auth)
}

fn discard_bundle(state: &ClientState) {
    if let Err(e) = state.bundles.remove(BUNDLE_STORAGE_KEY) {
        warn!(error = %e, "Failed to remove credential bundle");
    }
}

/// Fake backend and custody API for flow tests.
#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use axum::extract::{Path, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::response::{IntoResponse, Response};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use p256::ecdsa::SigningKey;
    use rand_core::OsRng;
    use serde_json::{json, Value};
    use url::Url;

    use crate::config::ClientConfig;
    use crate::frame::{seal_bundle, BundleKind, LocalFrameLauncher, RevealSink};
    use crate::state::ClientState;
    use crate::storage::{LocalStorage, MemoryStorage};
    use crate::webauthn::SoftwareAuthenticator;

    pub const SUB_ORG: &str = "sub-org-1";
    pub const USER_ID: &str = "user-1";
    pub const KNOWN_EMAIL: &str = "known@example.com";

    /// What the fake servers saw and how they should answer.
    #[derive(Default)]
    pub struct Backend {
        pub registered: Mutex<HashMap<String, String>>,
        pub calls: Mutex<Vec<String>>,
        pub bodies: Mutex<HashMap<String, Value>>,
        pub headers: Mutex<HashMap<String, HeaderMap>>,
        pub logged_in: Mutex<Option<String>>,
        /// Compressed hex public keys the custody side accepts for `X-Stamp`.
        pub live_api_keys: Mutex<Vec<String>>,
        /// Plaintext the next export bundle carries.
        pub export_secret: Mutex<String>,
        /// Status `recover_user` reports.
        pub recovery_status: Mutex<String>,
        pub registration_status: Mutex<Option<StatusCode>>,
        /// Session check reports nobody logged in.
        pub forget_sessions: Mutex<bool>,
    }

    impl Backend {
        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        pub fn body(&self, path: &str) -> Value {
            self.bodies.lock().unwrap().get(path).cloned().unwrap_or(Value::Null)
        }

        pub fn header(&self, path: &str, name: &str) -> Option<String> {
            self.headers
                .lock()
                .unwrap()
                .get(path)
                .and_then(|h| h.get(name))
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        }

        fn record(&self, path: &str, headers: &HeaderMap, body: Value) {
            self.calls.lock().unwrap().push(path.to_string());
            self.headers
                .lock()
                .unwrap()
                .insert(path.to_string(), headers.clone());
            self.bodies.lock().unwrap().insert(path.to_string(), body);
        }

        fn stamp_is_live(&self, signed: &Value) -> bool {
            let header = &signed["stamp"];
            if header["stampHeaderName"] != "X-Stamp" {
                return true;
            }
            let Some(value) = header["stampHeaderValue"].as_str() else {
                return false;
            };
            let Ok(decoded) = crate::webauthn::base64url_decode(value) else {
                return false;
            };
            let Ok(stamp) = serde_json::from_slice::<Value>(&decoded) else {
                return false;
            };
            let key = stamp["publicKey"].as_str().unwrap_or_default().to_string();
            self.live_api_keys.lock().unwrap().contains(&key)
        }
    }

    /// Issue a bundle of `kind` for `target` carrying a fresh credential key.
    /// Returns the bundle and the compressed hex public key of the credential.
    pub fn issue_credential(kind: BundleKind, target: &str) -> (String, String) {
        let key = SigningKey::random(&mut OsRng);
        let public = hex::encode(key.verifying_key().to_encoded_point(true).as_bytes());
        let bundle = seal_bundle(kind, target, &key.to_bytes()).unwrap();
        (bundle, public)
    }

    type Shared = Arc<Backend>;

    fn json_body(body: &str) -> Value {
        serde_json::from_str(body).unwrap_or(Value::Null)
    }

    async fn registration(
        State(backend): State<Shared>,
        Path(email): Path<String>,
    ) -> Response {
        backend.calls.lock().unwrap().push(format!("registration/{email}"));
        if let Some(status) = *backend.registration_status.lock().unwrap() {
            return (status, "registration lookup failed").into_response();
        }
        match backend.registered.lock().unwrap().get(&email) {
            Some(sub_org) => Json(json!({ "subOrganizationId": sub_org })).into_response(),
            None => StatusCode::NO_CONTENT.into_response(),
        }
    }

    async fn register(State(backend): State<Shared>, headers: HeaderMap, body: String) -> Response {
        let body = json_body(&body);
        backend.record("register", &headers, body.clone());
        let email = body["email"].as_str().unwrap_or_default().to_string();
        backend
            .registered
            .lock()
            .unwrap()
            .insert(email.clone(), SUB_ORG.to_string());
        *backend.logged_in.lock().unwrap() = Some(email);
        Json(json!({ "userId": 7, "subOrganizationId": SUB_ORG })).into_response()
    }

    async fn authenticate(
        State(backend): State<Shared>,
        headers: HeaderMap,
        body: String,
    ) -> Response {
        let body = json_body(&body);
        backend.record("authenticate", &headers, body.clone());
        if !backend.stamp_is_live(&body["signedWhoamiRequest"]) {
            return (StatusCode::UNAUTHORIZED, "stale stamp").into_response();
        }
        *backend.logged_in.lock().unwrap() = Some(KNOWN_EMAIL.to_string());
        StatusCode::OK.into_response()
    }

    async fn whoami(State(backend): State<Shared>) -> Response {
        if *backend.forget_sessions.lock().unwrap() {
            return StatusCode::NO_CONTENT.into_response();
        }
        match backend.logged_in.lock().unwrap().clone() {
            Some(email) => Json(json!({
                "userId": 7,
                "email": email,
                "subOrganizationId": SUB_ORG,
            }))
            .into_response(),
            None => StatusCode::NO_CONTENT.into_response(),
        }
    }

    async fn custody_whoami(
        State(backend): State<Shared>,
        headers: HeaderMap,
        body: String,
    ) -> Response {
        let body = json_body(&body);
        backend.record("turnkey-whoami", &headers, body.clone());
        if !backend.stamp_is_live(&body["signedWhoamiRequest"]) {
            return (StatusCode::INTERNAL_SERVER_ERROR, "invalid stamp").into_response();
        }
        Json(json!({
            "subOrganizationId": SUB_ORG,
            "subOrganizationName": "Known",
            "userId": USER_ID,
            "username": "known",
        }))
        .into_response()
    }

    async fn logout(State(backend): State<Shared>, headers: HeaderMap) -> Response {
        backend.record("logout", &headers, Value::Null);
        *backend.logged_in.lock().unwrap() = None;
        StatusCode::NO_CONTENT.into_response()
    }

    async fn wallet(State(backend): State<Shared>) -> Response {
        backend.calls.lock().unwrap().push("wallet".to_string());
        Json(json!({
            "address": "0xabc",
            "balance": "0.05",
            "dropsLeft": 2,
            "turnkeyUuid": "wallet-uuid",
        }))
        .into_response()
    }

    async fn construct_tx(
        State(backend): State<Shared>,
        headers: HeaderMap,
        body: String,
    ) -> Response {
        backend.record("construct-tx", &headers, json_body(&body));
        Json(json!({
            "unsignedTransaction": "02f0",
            "organizationId": SUB_ORG,
            "address": "0xabc",
        }))
        .into_response()
    }

    async fn send_tx(State(backend): State<Shared>, headers: HeaderMap, body: String) -> Response {
        backend.record("send-tx", &headers, json_body(&body));
        Json(json!({ "hash": "0xfeed" })).into_response()
    }

    async fn faucet_drop(State(backend): State<Shared>, headers: HeaderMap) -> Response {
        backend.record("drop", &headers, Value::Null);
        Json(json!({ "hash": "0xd00d" })).into_response()
    }

    async fn export(State(backend): State<Shared>, headers: HeaderMap, body: String) -> Response {
        let body = json_body(&body);
        backend.record("export", &headers, body.clone());
        let activity = json_body(body["signedExportRequest"]["body"].as_str().unwrap_or("null"));
        let target = activity["parameters"]["targetPublicKey"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        let secret = backend.export_secret.lock().unwrap().clone();
        match seal_bundle(BundleKind::WalletExport, &target, secret.as_bytes()) {
            Ok(bundle) => Json(json!(bundle)).into_response(),
            Err(e) => (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
        }
    }

    async fn email_auth(
        State(backend): State<Shared>,
        headers: HeaderMap,
        body: String,
    ) -> Response {
        let body = json_body(&body);
        backend.record("email-auth", &headers, body.clone());
        if body["email"] != KNOWN_EMAIL {
            return StatusCode::FORBIDDEN.into_response();
        }
        Json(json!({
            "userId": USER_ID,
            "apiKeyId": "api-key-1",
            "organizationId": SUB_ORG,
        }))
        .into_response()
    }

    async fn init_recovery(
        State(backend): State<Shared>,
        headers: HeaderMap,
        body: String,
    ) -> Response {
        let body = json_body(&body);
        backend.record("init-recovery", &headers, body.clone());
        if body["email"] != KNOWN_EMAIL {
            return StatusCode::FORBIDDEN.into_response();
        }
        Json(json!({ "userId": USER_ID, "organizationId": SUB_ORG })).into_response()
    }

    async fn custody_query_whoami(
        State(backend): State<Shared>,
        headers: HeaderMap,
        body: String,
    ) -> Response {
        let body = json_body(&body);
        backend.record("custody/whoami", &headers, body.clone());
        Json(json!({
            "organizationId": body["organizationId"],
            "organizationName": "Known",
            "userId": USER_ID,
            "username": "known",
        }))
        .into_response()
    }

    async fn custody_recover_user(
        State(backend): State<Shared>,
        headers: HeaderMap,
        body: String,
    ) -> Response {
        backend.record("custody/recover_user", &headers, json_body(&body));
        let status = backend.recovery_status.lock().unwrap().clone();
        Json(json!({ "activity": { "id": "activity-1", "status": status } })).into_response()
    }

    /// A running fake plus a [`ClientState`] wired to it.
    pub struct Harness {
        pub backend: Arc<Backend>,
        pub state: ClientState,
        pub storage: Arc<dyn LocalStorage>,
        pub authenticator: Arc<SoftwareAuthenticator>,
        pub revealed: Arc<Revealed>,
    }

    #[derive(Default)]
    pub struct Revealed(pub Mutex<Vec<String>>);

    impl RevealSink for Revealed {
        fn reveal(&self, secret: zeroize::Zeroizing<String>) {
            self.0.lock().unwrap().push(secret.to_string());
        }
    }

    pub async fn harness() -> Harness {
        let backend = Arc::new(Backend {
            export_secret: Mutex::new("test test test junk".to_string()),
            recovery_status: Mutex::new("ACTIVITY_STATUS_COMPLETED".to_string()),
            ..Backend::default()
        });
        backend
            .registered
            .lock()
            .unwrap()
            .insert(KNOWN_EMAIL.to_string(), SUB_ORG.to_string());

        let router = Router::new()
            .route("/api/registration/{email}", get(registration))
            .route("/api/register", post(register))
            .route("/api/authenticate", post(authenticate))
            .route("/api/whoami", get(whoami))
            .route("/api/turnkey-whoami", post(custody_whoami))
            .route("/api/logout", post(logout))
            .route("/api/wallet", get(wallet))
            .route("/api/wallet/construct-tx", post(construct_tx))
            .route("/api/wallet/send-tx", post(send_tx))
            .route("/api/wallet/drop", post(faucet_drop))
            .route("/api/wallet/export", post(export))
            .route("/api/email-auth", post(email_auth))
            .route("/api/init-recovery", post(init_recovery))
            .route("/public/v1/query/whoami", post(custody_query_whoami))
            .route("/public/v1/submit/recover_user", post(custody_recover_user))
            .with_state(backend.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        let mut config = ClientConfig::for_base_url(Url::parse(&format!("http://{addr}")).unwrap());
        config.frame_init_timeout = Duration::from_secs(2);

        let storage: Arc<dyn LocalStorage> = Arc::new(MemoryStorage::new());
        let authenticator = Arc::new(SoftwareAuthenticator::new("http://localhost"));
        let revealed = Arc::new(Revealed::default());
        let launcher = LocalFrameLauncher::new()
            .reveal_to(revealed.clone())
            .with_key_storage(Arc::new(MemoryStorage::new()));

        let state = ClientState::new(
            config,
            storage.clone(),
            authenticator.clone(),
            Arc::new(launcher),
        )
        .unwrap();

        Harness {
            backend,
            state,
            storage,
            authenticator,
            revealed,
        }
    }
}
