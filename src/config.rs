use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use crate::error::ConfigError;
use crate::google_auth::CredentialsSource;
use crate::points::DEFAULT_HISTORY_LIMIT;

const DEFAULT_WORKSHEET: &str = "ポイント記録";
const DEFAULT_CREDENTIALS_FILE: &str = "credentials.json";
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_LINE_API_BASE: &str = "https://api.line.me";
pub const DEFAULT_SHEETS_API_BASE: &str = "https://sheets.googleapis.com";
const PLACEHOLDER_SPREADSHEET_ID: &str = "your_spreadsheet_id_here";

#[derive(Clone)]
pub struct Config {
    pub line_channel_access_token: Option<String>,
    pub line_channel_secret: Option<String>,
    pub spreadsheet_id: Option<String>,
    pub worksheet_name: String,
    pub credentials: CredentialsSource,
    pub point_rules_file: Option<PathBuf>,
    pub host: String,
    pub port: u16,
    pub history_limit: usize,
    pub line_api_base: String,
    pub sheets_api_base: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from any variable source. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let credentials = if let Some(raw) = get("GOOGLE_CREDENTIALS_JSON") {
            CredentialsSource::Json(raw)
        } else if let Some(encoded) = get("GOOGLE_CREDENTIALS_BASE64") {
            CredentialsSource::Base64(encoded)
        } else {
            CredentialsSource::File(PathBuf::from(
                get("GOOGLE_SHEETS_CREDENTIALS_FILE")
                    .unwrap_or_else(|| DEFAULT_CREDENTIALS_FILE.to_string()),
            ))
        };

        Ok(Self {
            line_channel_access_token: get("LINE_CHANNEL_ACCESS_TOKEN"),
            line_channel_secret: get("LINE_CHANNEL_SECRET"),
            spreadsheet_id: get("SPREADSHEET_ID").filter(|id| id != PLACEHOLDER_SPREADSHEET_ID),
            worksheet_name: get("WORKSHEET_NAME").unwrap_or_else(|| DEFAULT_WORKSHEET.to_string()),
            credentials,
            point_rules_file: get("POINT_RULES_FILE").map(PathBuf::from),
            host: get("HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: parse_or("PORT", get("PORT"), DEFAULT_PORT)?,
            history_limit: parse_history_limit(get("HISTORY_LIMIT"))?,
            line_api_base: get("LINE_API_BASE").unwrap_or_else(|| DEFAULT_LINE_API_BASE.to_string()),
            sheets_api_base: get("SHEETS_API_BASE")
                .unwrap_or_else(|| DEFAULT_SHEETS_API_BASE.to_string()),
        })
    }

    /// Both LINE values are needed to do anything useful, so their absence is fatal.
    pub fn line_credentials(&self) -> Result<(&str, &str), ConfigError> {
        let token = self
            .line_channel_access_token
            .as_deref()
            .ok_or(ConfigError::Missing("LINE_CHANNEL_ACCESS_TOKEN"))?;
        let secret = self
            .line_channel_secret
            .as_deref()
            .ok_or(ConfigError::Missing("LINE_CHANNEL_SECRET"))?;
        Ok((token, secret))
    }

    pub fn sheets_configured(&self) -> bool {
        self.spreadsheet_id.is_some()
    }

    pub fn validate(&self) -> ConfigReport {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if self.line_channel_access_token.is_none() {
            errors.push(ConfigIssue::Missing {
                setting: "LINE_CHANNEL_ACCESS_TOKEN",
            });
        }
        if self.line_channel_secret.is_none() {
            errors.push(ConfigIssue::Missing {
                setting: "LINE_CHANNEL_SECRET",
            });
        }
        if self.spreadsheet_id.is_none() {
            errors.push(ConfigIssue::Missing {
                setting: "SPREADSHEET_ID",
            });
        }
        if !self.credentials.is_available() {
            errors.push(ConfigIssue::CredentialsUnavailable {
                source: self.credentials.describe(),
            });
        }

        if self.line_api_base != DEFAULT_LINE_API_BASE {
            warnings.push(ConfigIssue::ApiBaseOverridden {
                setting: "LINE_API_BASE",
            });
        }
        if self.sheets_api_base != DEFAULT_SHEETS_API_BASE {
            warnings.push(ConfigIssue::ApiBaseOverridden {
                setting: "SHEETS_API_BASE",
            });
        }

        ConfigReport {
            valid: errors.is_empty(),
            errors,
            warnings,
        }
    }

    /// Presence flags only. Secret values never leave this struct.
    pub fn summary(&self, point_rules_count: usize) -> ConfigSummary {
        ConfigSummary {
            host: self.host.clone(),
            port: self.port,
            worksheet_name: self.worksheet_name.clone(),
            credentials_source: self.credentials.describe(),
            line_configured: self.line_credentials().is_ok(),
            sheets_configured: self.sheets_configured(),
            history_limit: self.history_limit,
            point_rules_file: self
                .point_rules_file
                .as_ref()
                .map(|p| p.display().to_string()),
            point_rules_count,
        }
    }
}

fn parse_or<T: std::str::FromStr>(
    name: &'static str,
    value: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match value {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value: raw }),
    }
}

fn parse_history_limit(value: Option<String>) -> Result<usize, ConfigError> {
    match parse_or("HISTORY_LIMIT", value.clone(), DEFAULT_HISTORY_LIMIT)? {
        0 => Err(ConfigError::Invalid {
            name: "HISTORY_LIMIT",
            value: value.unwrap_or_default(),
        }),
        limit => Ok(limit),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConfigIssue {
    Missing { setting: &'static str },
    CredentialsUnavailable { source: String },
    ApiBaseOverridden { setting: &'static str },
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigIssue::Missing { setting } => write!(f, "{setting} is not set"),
            ConfigIssue::CredentialsUnavailable { source } => {
                write!(f, "Google credentials not found: {source}")
            }
            ConfigIssue::ApiBaseOverridden { setting } => {
                write!(f, "{setting} points away from the production API")
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfigReport {
    pub valid: bool,
    pub errors: Vec<ConfigIssue>,
    pub warnings: Vec<ConfigIssue>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfigSummary {
    pub host: String,
    pub port: u16,
    pub worksheet_name: String,
    pub credentials_source: String,
    pub line_configured: bool,
    pub sheets_configured: bool,
    pub history_limit: usize,
    pub point_rules_file: Option<String>,
    pub point_rules_count: usize,
}
