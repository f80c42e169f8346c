//! In-memory stand-ins for the spreadsheet and the messaging platform.

use std::sync::Mutex;

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD as Engine};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{MessagingError, StorageError};
use crate::line::Messenger;
use crate::model::PointRecord;
use crate::sheets::PointStore;

pub fn sign(channel_secret: &str, body: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(channel_secret.as_bytes()).unwrap();
    mac.update(body);
    Engine.encode(mac.finalize().into_bytes())
}

#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<Vec<PointRecord>>,
}

impl MemoryStore {
    pub fn records(&self) -> Vec<PointRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl PointStore for MemoryStore {
    async fn append(&self, record: &PointRecord) -> Result<(), StorageError> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn read_all(&self, user_id: &str) -> Result<Vec<PointRecord>, StorageError> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect())
    }
}

/// Fails every call, like a spreadsheet that is gone.
pub struct BrokenStore;

#[async_trait]
impl PointStore for BrokenStore {
    async fn append(&self, _: &PointRecord) -> Result<(), StorageError> {
        Err(StorageError::Auth("revoked".into()))
    }

    async fn read_all(&self, _: &str) -> Result<Vec<PointRecord>, StorageError> {
        Err(StorageError::Status {
            status: 404,
            body: "Requested entity was not found.".into(),
        })
    }

    async fn probe(&self) -> Result<(), StorageError> {
        Err(StorageError::Auth("revoked".into()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Reply { token: String, text: String },
    Push { to: String, text: String },
}

#[derive(Default)]
pub struct RecordingMessenger {
    sent: Mutex<Vec<Sent>>,
}

impl RecordingMessenger {
    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn reply(&self, reply_token: &str, text: &str) -> Result<(), MessagingError> {
        self.sent.lock().unwrap().push(Sent::Reply {
            token: reply_token.to_string(),
            text: text.to_string(),
        });
        Ok(())
    }

    async fn push(&self, to: &str, text: &str) -> Result<(), MessagingError> {
        self.sent.lock().unwrap().push(Sent::Push {
            to: to.to_string(),
            text: text.to_string(),
        });
        Ok(())
    }
}
