use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD as Engine};
use chrono::{DateTime, TimeDelta, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::{ConfigError, StorageError};
use crate::model::TokenResponse;

pub const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
// cached tokens are treated as expired this long before Google says so
const EXPIRY_SKEW_SECS: i64 = 60;

/// Where the service account JSON comes from, in priority order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialsSource {
    Json(String),
    Base64(String),
    File(PathBuf),
}

impl CredentialsSource {
    pub fn describe(&self) -> String {
        match self {
            CredentialsSource::Json(_) => "GOOGLE_CREDENTIALS_JSON".to_string(),
            CredentialsSource::Base64(_) => "GOOGLE_CREDENTIALS_BASE64".to_string(),
            CredentialsSource::File(path) => path.display().to_string(),
        }
    }

    pub fn is_available(&self) -> bool {
        match self {
            CredentialsSource::File(path) => path.exists(),
            CredentialsSource::Json(raw) | CredentialsSource::Base64(raw) => !raw.trim().is_empty(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    #[serde(rename = "type")]
    pub kind: String,
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl ServiceAccountKey {
    pub fn load(source: &CredentialsSource) -> Result<Self, ConfigError> {
        let raw = match source {
            CredentialsSource::Json(raw) => raw.clone(),
            CredentialsSource::Base64(encoded) => {
                let bytes = Engine
                    .decode(encoded.trim())
                    .map_err(|e| ConfigError::Credentials(format!("invalid base64: {e}")))?;
                String::from_utf8(bytes)
                    .map_err(|e| ConfigError::Credentials(format!("invalid utf-8: {e}")))?
            }
            CredentialsSource::File(path) => std::fs::read_to_string(path)
                .map_err(|e| ConfigError::Credentials(format!("{}: {e}", path.display())))?,
        };

        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let key: ServiceAccountKey =
            serde_json::from_str(raw).map_err(|e| ConfigError::Credentials(e.to_string()))?;

        if key.kind != "service_account" {
            return Err(ConfigError::Credentials(format!(
                "expected a service_account key, found '{}'",
                key.kind
            )));
        }

        Ok(key)
    }
}

/// Source of the bearer token sent with every Sheets request.
#[async_trait]
pub trait AccessToken: Send + Sync {
    async fn access_token(&self) -> Result<String, StorageError>;
}

/// A fixed token, for pre-issued credentials and tests.
#[async_trait]
impl AccessToken for String {
    async fn access_token(&self) -> Result<String, StorageError> {
        Ok(self.clone())
    }
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

/// Exchanges a signed service account assertion for an OAuth access token.
pub struct ServiceAccountAuth {
    key: ServiceAccountKey,
    encoding_key: EncodingKey,
    client: reqwest::Client,
    cached: Mutex<Option<CachedToken>>,
}

impl ServiceAccountAuth {
    pub fn new(key: ServiceAccountKey) -> Result<Self, ConfigError> {
        let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|e| ConfigError::Credentials(format!("invalid private key: {e}")))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ConfigError::Credentials(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            key,
            encoding_key,
            client,
            cached: Mutex::new(None),
        })
    }

    pub fn client_email(&self) -> &str {
        &self.key.client_email
    }

    pub fn project_id(&self) -> &str {
        self.key.project_id.as_deref().unwrap_or("unknown project")
    }

    fn sign_assertion(&self, now: DateTime<Utc>) -> Result<String, StorageError> {
        let iat = now.timestamp();
        let claims = AssertionClaims {
            iss: &self.key.client_email,
            scope: SHEETS_SCOPE,
            aud: &self.key.token_uri,
            iat,
            exp: iat + ASSERTION_LIFETIME_SECS,
        };

        Ok(jsonwebtoken::encode(
            &Header::new(Algorithm::RS256),
            &claims,
            &self.encoding_key,
        )?)
    }

    async fn fetch_token(&self, now: DateTime<Utc>) -> Result<CachedToken, StorageError> {
        let assertion = self.sign_assertion(now)?;

        let res = self
            .client
            .post(&self.key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await?;

        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(StorageError::Auth(format!("token endpoint returned {status}: {body}")));
        }

        let token: TokenResponse = res
            .json()
            .await
            .map_err(|e| StorageError::Auth(format!("unreadable token response: {e}")))?;

        log::debug!(
            "obtained Google access token for {} (expires in {}s)",
            self.key.client_email,
            token.expires_in
        );

        Ok(CachedToken {
            token: token.access_token,
            expires_at: now + TimeDelta::seconds(token.expires_in - EXPIRY_SKEW_SECS),
        })
    }
}

#[async_trait]
impl AccessToken for ServiceAccountAuth {
    async fn access_token(&self) -> Result<String, StorageError> {
        let mut cached = self.cached.lock().await;
        let now = Utc::now();

        if let Some(current) = cached.as_ref() {
            if current.expires_at > now {
                return Ok(current.token.clone());
            }
        }

        let fresh = self.fetch_token(now).await?;
        let token = fresh.token.clone();
        *cached = Some(fresh);

        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TEST_KEY_PEM: &str = include_str!("testdata/service_account_key.pem");

    fn key_json(token_uri: &str) -> String {
        serde_json::json!({
            "type": "service_account",
            "project_id": "point-bot",
            "client_email": "bot@point-bot.iam.gserviceaccount.com",
            "private_key": TEST_KEY_PEM,
            "token_uri": token_uri,
        })
        .to_string()
    }

    #[test]
    fn loads_credentials_from_every_source() {
        let raw = key_json("https://oauth2.example/token");

        let from_json = ServiceAccountKey::load(&CredentialsSource::Json(raw.clone())).unwrap();
        assert_eq!(from_json.client_email, "bot@point-bot.iam.gserviceaccount.com");

        let encoded = Engine.encode(raw.as_bytes());
        let from_b64 = ServiceAccountKey::load(&CredentialsSource::Base64(encoded)).unwrap();
        assert_eq!(from_b64.project_id.as_deref(), Some("point-bot"));

        let path = std::env::temp_dir().join(format!("sa-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&path, &raw).unwrap();
        let from_file = ServiceAccountKey::load(&CredentialsSource::File(path.clone())).unwrap();
        assert_eq!(from_file.token_uri, "https://oauth2.example/token");
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn rejects_non_service_account_credentials() {
        let raw = r#"{"type": "authorized_user", "client_email": "a", "private_key": "b"}"#;
        assert!(matches!(
            ServiceAccountKey::from_json(raw),
            Err(ConfigError::Credentials(_))
        ));

        let missing = CredentialsSource::File(PathBuf::from("/nonexistent/credentials.json"));
        assert!(!missing.is_available());
        assert!(ServiceAccountKey::load(&missing).is_err());

        assert!(ServiceAccountKey::load(&CredentialsSource::Base64("%%%".into())).is_err());
    }

    #[test]
    fn token_uri_defaults_to_google() {
        let raw = r#"{"type": "service_account", "client_email": "a", "private_key": "b"}"#;
        let key = ServiceAccountKey::from_json(raw).unwrap();
        assert_eq!(key.token_uri, DEFAULT_TOKEN_URI);
    }

    #[tokio::test]
    async fn exchanges_assertion_and_caches_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains(
                "grant_type=urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Ajwt-bearer",
            ))
            .and(body_string_contains("assertion=ey"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "ya29.test",
                "expires_in": 3600,
                "token_type": "Bearer",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let key = ServiceAccountKey::from_json(&key_json(&format!("{}/token", server.uri())))
            .unwrap();
        let auth = ServiceAccountAuth::new(key).unwrap();

        assert_eq!(auth.access_token().await.unwrap(), "ya29.test");
        assert_eq!(auth.access_token().await.unwrap(), "ya29.test");
    }

    #[tokio::test]
    async fn token_endpoint_rejection_is_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid_grant"))
            .mount(&server)
            .await;

        let key = ServiceAccountKey::from_json(&key_json(&format!("{}/token", server.uri())))
            .unwrap();
        let auth = ServiceAccountAuth::new(key).unwrap();

        let err = auth.access_token().await.unwrap_err();
        assert!(matches!(err, StorageError::Auth(msg) if msg.contains("invalid_grant")));
    }
}
