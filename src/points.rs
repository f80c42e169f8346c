use std::sync::Arc;

use chrono::{Local, SubsecRound};
use rand::seq::IndexedRandom;

use crate::error::StorageError;
use crate::model::{PointRecord, PointRule};
use crate::rules::{Command, RuleTable, celebration_messages, milestone_crossed};
use crate::sheets::PointStore;

pub const DEFAULT_HISTORY_LIMIT: usize = 10;

pub const NO_MATCH_MESSAGE: &str = "ポイント対象の行動が見つからなかったよ😅";
pub const STORAGE_UNAVAILABLE_MESSAGE: &str =
    "スプレッドシートに接続できません😅\n設定を確認してください。";
pub const EMPTY_HISTORY_MESSAGE: &str = "まだ行動履歴がありません😊";

/// What to send back for one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub reply: String,
    /// Pushed separately after the reply when a 100pt milestone is crossed.
    pub celebration: Option<String>,
}

impl Evaluation {
    fn reply(text: impl Into<String>) -> Self {
        Self {
            reply: text.into(),
            celebration: None,
        }
    }
}

pub struct PointEvaluator {
    rules: Arc<RuleTable>,
    store: Option<Arc<dyn PointStore>>,
    history_limit: usize,
}

impl PointEvaluator {
    pub fn new(
        rules: Arc<RuleTable>,
        store: Option<Arc<dyn PointStore>>,
        history_limit: usize,
    ) -> Self {
        Self {
            rules,
            store,
            history_limit,
        }
    }

    pub fn rules(&self) -> &RuleTable {
        &self.rules
    }

    pub fn store(&self) -> Option<&Arc<dyn PointStore>> {
        self.store.as_ref()
    }

    /// Never fails: storage problems become a user-facing apology and are logged here.
    pub async fn evaluate(&self, user_id: &str, text: &str) -> Evaluation {
        let outcome = match self.rules.classify(text) {
            Command::Help => return Evaluation::reply(self.rules.help_message()),
            Command::Unknown => {
                log::debug!("no point rule matched message from {user_id}");
                return Evaluation::reply(format!(
                    "{NO_MATCH_MESSAGE}\n\n{}",
                    self.rules.help_message()
                ));
            }
            Command::Total => self.total(user_id).await,
            Command::History => self.history(user_id).await,
            Command::Award(rule) => self.award(user_id, rule).await,
        };

        outcome.unwrap_or_else(|e| {
            log::error!("storage unavailable while handling message from {user_id}: {e}");
            Evaluation::reply(STORAGE_UNAVAILABLE_MESSAGE)
        })
    }

    fn ledger(&self) -> Result<&dyn PointStore, StorageError> {
        self.store.as_deref().ok_or(StorageError::NotConfigured)
    }

    async fn current_total(&self, user_id: &str) -> Result<i64, StorageError> {
        let records = self.ledger()?.read_all(user_id).await?;
        records
            .iter()
            .try_fold(0i64, |acc, r| acc.checked_add(r.points))
            .ok_or_else(|| StorageError::TotalOverflow {
                user_id: user_id.to_string(),
            })
    }

    async fn award(&self, user_id: &str, rule: &PointRule) -> Result<Evaluation, StorageError> {
        let previous = self.current_total(user_id).await?;
        let total = previous
            .checked_add(rule.points)
            .ok_or_else(|| StorageError::TotalOverflow {
                user_id: user_id.to_string(),
            })?;

        let record = PointRecord {
            user_id: user_id.to_string(),
            timestamp: Local::now().naive_local().trunc_subsecs(0),
            action: rule.action().to_string(),
            points: rule.points,
            running_total: total,
        };
        self.ledger()?.append(&record).await?;

        let celebration = milestone_crossed(previous, total).and_then(pick_celebration);
        if celebration.is_some() {
            log::info!("{user_id} reached {total}pt, sending celebration");
        }

        Ok(Evaluation {
            reply: format!("{}（合計：{total}pt）", rule.render(total)),
            celebration,
        })
    }

    async fn total(&self, user_id: &str) -> Result<Evaluation, StorageError> {
        let total = self.current_total(user_id).await?;
        Ok(Evaluation::reply(format!("現在の合計ポイント: {total}pt 🎯")))
    }

    async fn history(&self, user_id: &str) -> Result<Evaluation, StorageError> {
        let records = self.ledger()?.read_all(user_id).await?;
        if records.is_empty() {
            return Ok(Evaluation::reply(EMPTY_HISTORY_MESSAGE));
        }

        let skip = records.len().saturating_sub(self.history_limit);
        let mut lines = vec!["📋 最近の行動履歴：".to_string()];
        lines.extend(records[skip..].iter().map(|r| {
            format!(
                "• {} (+{}pt) - {}",
                r.action,
                r.points,
                r.formatted_timestamp()
            )
        }));

        Ok(Evaluation::reply(lines.join("\n")))
    }
}

fn pick_celebration(milestone: i64) -> Option<String> {
    celebration_messages(milestone)
        .choose(&mut rand::rng())
        .map(|msg| msg.to_string())
}
