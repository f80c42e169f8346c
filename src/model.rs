use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointRule {
    pub keyword: String,
    pub points: i64,
    #[serde(rename = "message")]
    pub message_template: String,
    #[serde(default)]
    pub description: String,
}

impl PointRule {
    pub fn new(keyword: &str, points: i64, message_template: &str, description: &str) -> Self {
        Self {
            keyword: keyword.to_string(),
            points,
            message_template: message_template.to_string(),
            description: description.to_string(),
        }
    }

    /// Label written to the ledger's action column. Falls back to the keyword.
    pub fn action(&self) -> &str {
        if self.description.is_empty() {
            &self.keyword
        } else {
            &self.description
        }
    }

    pub fn render(&self, total: i64) -> String {
        self.message_template
            .replace("{points}", &self.points.to_string())
            .replace("{total}", &total.to_string())
    }
}

/// One ledger row. Never mutated once appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointRecord {
    pub user_id: String,
    pub timestamp: NaiveDateTime,
    pub action: String,
    pub points: i64,
    pub running_total: i64,
}

impl PointRecord {
    pub fn formatted_timestamp(&self) -> String {
        self.timestamp.format(TIMESTAMP_FORMAT).to_string()
    }
}

// ---
//  LINE webhook payload
// ---

#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub events: Vec<WebhookEvent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub reply_token: Option<String>,
    #[serde(default)]
    pub source: Option<EventSource>,
    #[serde(default)]
    pub message: Option<EventMessage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSource {
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EventMessage {
    Text { text: String },
    #[serde(other)]
    Other,
}

/// The parts of a text message event the evaluator and reply path need.
#[derive(Debug, PartialEq, Eq)]
pub struct TextMessage<'a> {
    pub user_id: &'a str,
    pub text: &'a str,
    pub reply_token: Option<&'a str>,
}

impl WebhookEvent {
    pub fn text_message(&self) -> Option<TextMessage<'_>> {
        if self.kind != "message" {
            return None;
        }

        let text = match self.message.as_ref()? {
            EventMessage::Text { text } => text.as_str(),
            EventMessage::Other => return None,
        };
        let user_id = self.source.as_ref()?.user_id.as_deref()?;

        Some(TextMessage {
            user_id,
            text,
            reply_token: self.reply_token.as_deref(),
        })
    }
}

// ---
//  LINE send API bodies
// ---

#[derive(Debug, Serialize)]
pub struct OutboundText<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub text: &'a str,
}

impl<'a> OutboundText<'a> {
    pub fn new(text: &'a str) -> Self {
        Self { kind: "text", text }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyRequest<'a> {
    pub reply_token: &'a str,
    pub messages: Vec<OutboundText<'a>>,
}

#[derive(Debug, Serialize)]
pub struct PushRequest<'a> {
    pub to: &'a str,
    pub messages: Vec<OutboundText<'a>>,
}

// ---
//  Sheets API bodies
// ---

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ValueRange {
    #[serde(default)]
    pub values: Vec<Vec<serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default = "default_expires_in")]
    pub expires_in: i64,
}

fn default_expires_in() -> i64 {
    3600
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_text_message_from_line_event() {
        let payload: WebhookPayload = serde_json::from_str(
            r##"{
                "destination": "Uxxxxxxxx",
                "events": [{
                    "type": "message",
                    "replyToken": "reply-1",
                    "timestamp": 1462629479859,
                    "mode": "active",
                    "source": { "type": "user", "userId": "U1" },
                    "message": { "type": "text", "id": "325708", "text": "#宿題" }
                }]
            }"##,
        )
        .unwrap();

        let message = payload.events[0].text_message().unwrap();
        assert_eq!(
            message,
            TextMessage {
                user_id: "U1",
                text: "#宿題",
                reply_token: Some("reply-1"),
            }
        );
    }

    #[test]
    fn non_text_events_yield_nothing() {
        let payload: WebhookPayload = serde_json::from_str(
            r#"{
                "events": [
                    {
                        "type": "message",
                        "replyToken": "r",
                        "source": { "type": "user", "userId": "U1" },
                        "message": { "type": "sticker", "id": "1", "packageId": "1", "stickerId": "1" }
                    },
                    { "type": "follow", "replyToken": "r", "source": { "type": "user", "userId": "U1" } },
                    {
                        "type": "message",
                        "replyToken": "r",
                        "source": { "type": "group", "groupId": "G1" },
                        "message": { "type": "text", "id": "2", "text": "hello" }
                    }
                ]
            }"#,
        )
        .unwrap();

        assert!(payload.events.iter().all(|e| e.text_message().is_none()));
    }

    #[test]
    fn rule_render_fills_placeholders() {
        let rule = PointRule::new("#a", 3, "{points}pt added, now {total}pt", "");
        assert_eq!(rule.render(10), "3pt added, now 10pt");
        assert_eq!(rule.action(), "#a");
    }

    #[test]
    fn reply_request_serializes_in_line_shape() {
        let body = ReplyRequest {
            reply_token: "tok",
            messages: vec![OutboundText::new("hi")],
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({
                "replyToken": "tok",
                "messages": [{ "type": "text", "text": "hi" }]
            })
        );
    }
}
