use std::io;
use std::sync::Arc;

use actix_web::{App, HttpServer, middleware::Logger, web};

use crate::config::Config;
use crate::google_auth::{ServiceAccountAuth, ServiceAccountKey};
use crate::line::LineClient;
use crate::points::PointEvaluator;
use crate::rules::RuleTable;
use crate::server::{AppState, routes};
use crate::sheets::{PointStore, SheetsGateway};

mod config;
mod error;
mod google_auth;
mod line;
mod model;
mod points;
mod rules;
mod server;
mod sheets;
#[cfg(test)]
mod testing;

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from_env().map_err(io::Error::other)?;
    report_config(&config);

    let (access_token, channel_secret) = config
        .line_credentials()
        .map(|(token, secret)| (token.to_string(), secret.to_string()))
        .map_err(io::Error::other)?;

    let rules = match &config.point_rules_file {
        Some(path) => RuleTable::from_file(path).map_err(io::Error::other)?,
        None => RuleTable::default_rules(),
    };
    log::info!("loaded {} point rule(s)", rules.len());

    let store = connect_sheets(&config).await;
    if store.is_some() {
        log::info!("spreadsheet storage enabled");
    } else {
        log::warn!("spreadsheet storage disabled; point commands will reply with an error");
    }

    let messenger = LineClient::new(&config.line_api_base, &access_token).map_err(io::Error::other)?;
    let bind = (config.host.clone(), config.port);

    let state = web::Data::new(AppState {
        evaluator: PointEvaluator::new(Arc::new(rules), store, config.history_limit),
        config,
        channel_secret,
        messenger: Arc::new(messenger),
    });

    log::info!("LINE Point System starting on {}:{}", bind.0, bind.1);

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(Logger::default())
            .configure(routes)
    })
    .bind(bind)?
    .run()
    .await
}

fn report_config(config: &Config) {
    let report = config.validate();

    if report.valid {
        log::info!("configuration validated");
    }
    for issue in &report.errors {
        log::error!("config: {issue}");
    }
    for issue in &report.warnings {
        log::warn!("config: {issue}");
    }
}

/// Storage failures here are not fatal; the bot keeps answering help requests.
async fn connect_sheets(config: &Config) -> Option<Arc<dyn PointStore>> {
    let spreadsheet_id = config.spreadsheet_id.as_deref()?;

    log::info!(
        "spreadsheet {} / worksheet '{}' / credentials from {}",
        spreadsheet_id,
        config.worksheet_name,
        config.credentials.describe()
    );

    let auth = match ServiceAccountKey::load(&config.credentials).and_then(ServiceAccountAuth::new)
    {
        Ok(auth) => auth,
        Err(e) => {
            log::error!("{e}");
            return None;
        }
    };
    log::info!(
        "authenticating to Google as {} ({})",
        auth.client_email(),
        auth.project_id()
    );

    let gateway = match SheetsGateway::new(
        &config.sheets_api_base,
        spreadsheet_id,
        &config.worksheet_name,
        Box::new(auth),
    ) {
        Ok(gateway) => gateway,
        Err(e) => {
            log::error!("{e}");
            return None;
        }
    };

    if let Err(e) = gateway.initialize_sheet().await {
        log::error!("failed to initialize worksheet '{}': {e}", gateway.worksheet());
        return None;
    }
    if let Err(e) = gateway.probe().await {
        log::error!("spreadsheet connection test failed: {e}");
        return None;
    }

    Some(Arc::new(gateway))
}
