use std::sync::Arc;

use actix_web::{HttpRequest, HttpResponse, web};
use serde::Serialize;

use crate::config::Config;
use crate::error::WebhookError;
use crate::line::{Messenger, SIGNATURE_HEADER, verify_signature};
use crate::model::{TextMessage, WebhookPayload};
use crate::points::PointEvaluator;
use crate::rules::{HELP_ALIASES, HISTORY_ALIASES, TOTAL_ALIASES};

pub struct AppState {
    pub config: Config,
    pub channel_secret: String,
    pub evaluator: PointEvaluator,
    pub messenger: Arc<dyn Messenger>,
}

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/callback", web::post().to(handle_line_webhook))
        .route("/health", web::get().to(health_check))
        .route("/config", web::get().to(config_status))
        .route("/", web::get().to(index));
}

pub async fn health_check() -> actix_web::Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "message": "LINE Point System is running"
    })))
}

pub async fn handle_line_webhook(
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<AppState>,
) -> Result<HttpResponse, WebhookError> {
    let signature = req
        .headers()
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(WebhookError::MissingSignature)?;

    if !verify_signature(&state.channel_secret, &body, signature) {
        log::warn!("rejected webhook with invalid signature; check LINE_CHANNEL_SECRET");
        return Err(WebhookError::InvalidSignature);
    }

    let payload: WebhookPayload = serde_json::from_slice(&body)?;
    log::debug!(
        "webhook for {} with {} event(s)",
        payload.destination.as_deref().unwrap_or("unknown destination"),
        payload.events.len()
    );

    for event in &payload.events {
        match event.text_message() {
            Some(message) => handle_message(&state, message).await,
            None => log::debug!("ignoring non-text '{}' event", event.kind),
        }
    }

    Ok(HttpResponse::Ok().body("OK"))
}

async fn handle_message(state: &AppState, message: TextMessage<'_>) {
    log::info!("message from {}: {}", message.user_id, message.text);

    let evaluation = state
        .evaluator
        .evaluate(message.user_id, message.text)
        .await;

    match message.reply_token {
        Some(token) => {
            if let Err(e) = state.messenger.reply(token, &evaluation.reply).await {
                log::error!("failed to reply to {}: {e}", message.user_id);
            }
        }
        None => log::warn!("message from {} had no reply token", message.user_id),
    }

    if let Some(celebration) = evaluation.celebration {
        if let Err(e) = state.messenger.push(message.user_id, &celebration).await {
            log::error!("failed to push celebration to {}: {e}", message.user_id);
        }
    }
}

#[derive(Serialize)]
struct SheetsStatus {
    connected: bool,
    credentials_available: bool,
    spreadsheet_id_configured: bool,
    worksheet_name: String,
    connection_test: String,
}

pub async fn config_status(state: web::Data<AppState>) -> HttpResponse {
    let config = &state.config;

    let connection_test = match state.evaluator.store() {
        None => "not_initialized".to_string(),
        Some(store) => match store.probe().await {
            Ok(()) => "success".to_string(),
            Err(e) => format!("failed: {e}"),
        },
    };

    let sheets_status = SheetsStatus {
        connected: state.evaluator.store().is_some(),
        credentials_available: config.credentials.is_available(),
        spreadsheet_id_configured: config.sheets_configured(),
        worksheet_name: config.worksheet_name.clone(),
        connection_test,
    };

    HttpResponse::Ok().json(serde_json::json!({
        "validation": config.validate(),
        "summary": config.summary(state.evaluator.rules().len()),
        "sheets_status": sheets_status,
    }))
}

pub async fn index(state: web::Data<AppState>) -> HttpResponse {
    let mut items: Vec<String> = state
        .evaluator
        .rules()
        .rules()
        .iter()
        .map(|rule| {
            format!(
                "<li><code>{}</code> - {}で{}pt</li>",
                escape_html(&rule.keyword),
                escape_html(rule.action()),
                rule.points
            )
        })
        .collect();
    items.push(format!(
        "<li><code>{}</code> - 現在の合計ポイントを確認</li>",
        TOTAL_ALIASES[0]
    ));
    items.push(format!(
        "<li><code>{}</code> - 最近の行動履歴を確認</li>",
        HISTORY_ALIASES[0]
    ));
    items.push(format!(
        "<li><code>{}</code> - ヘルプを表示</li>",
        HELP_ALIASES[0]
    ));

    let page = format!(
        "<h1>LINE Point System</h1>\n\
         <p>LINEメッセージに応じてポイントを付与し、Googleスプレッドシートに記録するシステムです。</p>\n\
         <h2>使用方法</h2>\n<ul>\n{}\n</ul>\n\
         <h2>管理エンドポイント</h2>\n<ul>\n\
         <li><a href=\"/health\">/health</a> - ヘルスチェック</li>\n\
         <li><a href=\"/config\">/config</a> - 設定状況確認</li>\n</ul>\n",
        items.join("\n")
    );

    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(page)
}

fn escape_html(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
