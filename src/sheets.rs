use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use reqwest::Url;
use serde_json::Value;

use crate::error::{ConfigError, StorageError};
use crate::google_auth::AccessToken;
use crate::model::{PointRecord, TIMESTAMP_FORMAT, ValueRange};

pub const HEADER_ROW: [&str; 5] = ["ユーザーID", "日時", "行動", "ポイント", "合計ポイント"];

/// Append-only ledger of point awards.
#[async_trait]
pub trait PointStore: Send + Sync {
    async fn append(&self, record: &PointRecord) -> Result<(), StorageError>;

    /// Every record for `user_id`, oldest first.
    async fn read_all(&self, user_id: &str) -> Result<Vec<PointRecord>, StorageError>;

    async fn probe(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

/// Google Sheets backed ledger. One worksheet, columns A:E.
pub struct SheetsGateway {
    client: reqwest::Client,
    base: Url,
    spreadsheet_id: String,
    worksheet: String,
    auth: Box<dyn AccessToken>,
}

impl SheetsGateway {
    pub fn new(
        api_base: &str,
        spreadsheet_id: &str,
        worksheet: &str,
        auth: Box<dyn AccessToken>,
    ) -> Result<Self, ConfigError> {
        let base = Url::parse(api_base)
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| ConfigError::Invalid {
                name: "SHEETS_API_BASE",
                value: api_base.to_string(),
            })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ConfigError::Invalid {
                name: "SHEETS_API_BASE",
                value: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            base,
            spreadsheet_id: spreadsheet_id.to_string(),
            worksheet: worksheet.to_string(),
            auth,
        })
    }

    pub fn worksheet(&self) -> &str {
        &self.worksheet
    }

    fn range(&self, cells: &str) -> String {
        format!("{}!{}", self.worksheet, cells)
    }

    fn values_url(&self, segment: &str) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["v4", "spreadsheets", self.spreadsheet_id.as_str(), "values"])
                .push(segment);
        }
        url
    }

    async fn get_values(&self, cells: &str) -> Result<ValueRange, StorageError> {
        let token = self.auth.access_token().await?;
        let res = self
            .client
            .get(self.values_url(&self.range(cells)))
            .bearer_auth(token)
            .send()
            .await?;

        Ok(check_status(res).await?.json::<ValueRange>().await?)
    }

    /// Writes the header row when the worksheet is empty. Returns whether it wrote anything.
    pub async fn initialize_sheet(&self) -> Result<bool, StorageError> {
        let existing = self.get_values("A:E").await?;
        if !existing.values.is_empty() {
            return Ok(false);
        }

        let token = self.auth.access_token().await?;
        let body = ValueRange {
            values: vec![HEADER_ROW.iter().map(|h| Value::from(*h)).collect()],
        };

        let res = self
            .client
            .put(self.values_url(&self.range("A1:E1")))
            .query(&[("valueInputOption", "RAW")])
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;
        check_status(res).await?;

        log::info!("initialized worksheet '{}' with header row", self.worksheet);
        Ok(true)
    }
}

#[async_trait]
impl PointStore for SheetsGateway {
    async fn append(&self, record: &PointRecord) -> Result<(), StorageError> {
        let token = self.auth.access_token().await?;
        let body = ValueRange {
            values: vec![to_row(record)],
        };

        let res = self
            .client
            .post(self.values_url(&format!("{}:append", self.range("A:E"))))
            .query(&[
                ("valueInputOption", "RAW"),
                ("insertDataOption", "INSERT_ROWS"),
            ])
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;
        check_status(res).await?;

        log::info!(
            "recorded '{}' (+{}pt, total {}pt) for {}",
            record.action,
            record.points,
            record.running_total,
            record.user_id
        );
        Ok(())
    }

    async fn read_all(&self, user_id: &str) -> Result<Vec<PointRecord>, StorageError> {
        let range = self.get_values("A:E").await?;

        Ok(range
            .values
            .iter()
            .filter_map(|row| from_row(row))
            .filter(|record| record.user_id == user_id)
            .collect())
    }

    async fn probe(&self) -> Result<(), StorageError> {
        self.get_values("A1").await.map(|_| ())
    }
}

async fn check_status(res: reqwest::Response) -> Result<reqwest::Response, StorageError> {
    if res.status().is_success() {
        return Ok(res);
    }

    let status = res.status().as_u16();
    let body = res.text().await.unwrap_or_default();
    Err(StorageError::Status { status, body })
}

fn to_row(record: &PointRecord) -> Vec<Value> {
    vec![
        Value::from(record.user_id.as_str()),
        Value::from(record.formatted_timestamp()),
        Value::from(record.action.as_str()),
        Value::from(record.points),
        Value::from(record.running_total),
    ]
}

fn cell(row: &[Value], idx: usize) -> Option<String> {
    match row.get(idx)? {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Header rows and hand-edited junk come back as `None`.
fn from_row(row: &[Value]) -> Option<PointRecord> {
    let points = cell(row, 3)?.parse::<i64>().ok()?;
    let running_total = cell(row, 4)?.parse::<i64>().ok()?;
    let timestamp = NaiveDateTime::parse_from_str(&cell(row, 1)?, TIMESTAMP_FORMAT).ok()?;

    Some(PointRecord {
        user_id: cell(row, 0)?,
        timestamp,
        action: cell(row, 2).unwrap_or_default(),
        points,
        running_total,
    })
}
