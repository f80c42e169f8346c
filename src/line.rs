use std::time::Duration;

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD as Engine};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::MessagingError;
use crate::model::{OutboundText, PushRequest, ReplyRequest};

pub const SIGNATURE_HEADER: &str = "X-Line-Signature";
const RETRY_KEY_HEADER: &str = "X-Line-Retry-Key";

type HmacSha256 = Hmac<Sha256>;

/// Checks `X-Line-Signature`: base64 of HMAC-SHA256 over the raw body, keyed by the channel
/// secret. Comparison is constant time.
pub fn verify_signature(channel_secret: &str, body: &[u8], signature: &str) -> bool {
    let Ok(expected) = Engine.decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(channel_secret.as_bytes()) else {
        return false;
    };

    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Outbound half of the chat platform.
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn reply(&self, reply_token: &str, text: &str) -> Result<(), MessagingError>;
    async fn push(&self, to: &str, text: &str) -> Result<(), MessagingError>;
}

pub struct LineClient {
    client: reqwest::Client,
    api_base: String,
    access_token: String,
}

impl LineClient {
    pub fn new(api_base: &str, access_token: &str) -> Result<Self, MessagingError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            access_token: access_token.to_string(),
        })
    }

    async fn send<T: serde::Serialize + Sync>(
        &self,
        endpoint: &str,
        body: &T,
        retry_key: Option<uuid::Uuid>,
    ) -> Result<(), MessagingError> {
        let mut req = self
            .client
            .post(format!("{}/v2/bot/message/{endpoint}", self.api_base))
            .bearer_auth(&self.access_token)
            .json(body);

        if let Some(key) = retry_key {
            req = req.header(RETRY_KEY_HEADER, key.to_string());
        }

        let res = req.send().await?;
        if !res.status().is_success() {
            let status = res.status().as_u16();
            let body = res.text().await.unwrap_or_default();
            return Err(MessagingError::Status { status, body });
        }

        Ok(())
    }
}

#[async_trait]
impl Messenger for LineClient {
    async fn reply(&self, reply_token: &str, text: &str) -> Result<(), MessagingError> {
        let body = ReplyRequest {
            reply_token,
            messages: vec![OutboundText::new(text)],
        };
        self.send("reply", &body, None).await
    }

    async fn push(&self, to: &str, text: &str) -> Result<(), MessagingError> {
        let body = PushRequest {
            to,
            messages: vec![OutboundText::new(text)],
        };
        self.send("push", &body, Some(uuid::Uuid::new_v4())).await
    }
}
