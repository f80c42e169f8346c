use std::collections::HashMap;
use std::path::Path;

use crate::error::{ConfigError, RuleError};
use crate::model::PointRule;

pub const TOTAL_ALIASES: [&str; 4] = ["#ポイント", "#point", "ポイント", "point"];
pub const HISTORY_ALIASES: [&str; 4] = ["#履歴", "#history", "履歴", "history"];
pub const HELP_ALIASES: [&str; 4] = ["#ヘルプ", "#help", "ヘルプ", "help"];

/// Largest magnitude a single rule may award or deduct.
pub const MAX_RULE_POINTS: i64 = 10_000;

/// What an inbound message asks for.
#[derive(Debug, PartialEq, Eq)]
pub enum Command<'a> {
    Award(&'a PointRule),
    Total,
    History,
    Help,
    Unknown,
}

/// Keyword table, built once at startup and shared read-only.
#[derive(Debug, Clone)]
pub struct RuleTable {
    rules: Vec<PointRule>,
    index: HashMap<String, usize>,
}

impl RuleTable {
    pub fn new(mut rules: Vec<PointRule>) -> Result<Self, RuleError> {
        let mut index = HashMap::with_capacity(rules.len());

        for (i, rule) in rules.iter_mut().enumerate() {
            let keyword = rule.keyword.trim().to_string();
            if keyword.is_empty() {
                return Err(RuleError::EmptyKeyword);
            }
            if command_for(&keyword).is_some() {
                return Err(RuleError::ReservedKeyword(keyword));
            }
            if !(-MAX_RULE_POINTS..=MAX_RULE_POINTS).contains(&rule.points) {
                return Err(RuleError::PointsOutOfRange {
                    keyword,
                    points: rule.points,
                });
            }
            if index.insert(keyword.clone(), i).is_some() {
                return Err(RuleError::Duplicate(keyword));
            }
            rule.keyword = keyword;
        }

        Ok(Self { rules, index })
    }

    pub fn default_rules() -> Self {
        Self::new(vec![
            PointRule::new(
                "#宿題",
                1,
                "宿題がんばったね！{points}pt追加したよ✨",
                "宿題を完了",
            ),
            PointRule::new(
                "#スタスタ",
                3,
                "スタスタで運動できたね！{points}pt追加したよ💪",
                "スタスタを完了",
            ),
            PointRule::new(
                "#ごみ捨て",
                5,
                "ごみ捨てお疲れさま！{points}pt追加したよ🗑️",
                "ごみ捨てを完了",
            ),
        ])
        .unwrap_or_else(|_| unreachable!("built-in point rules are valid"))
    }

    /// Reads a JSON array of `{keyword, points, message, description}` objects.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Rules(format!("{}: {e}", path.display())))?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let rules: Vec<PointRule> =
            serde_json::from_str(raw).map_err(|e| ConfigError::Rules(e.to_string()))?;
        Self::new(rules).map_err(|e| ConfigError::Rules(e.to_string()))
    }

    /// Exact, case-sensitive lookup.
    pub fn get(&self, keyword: &str) -> Option<&PointRule> {
        self.index.get(keyword).map(|&i| &self.rules[i])
    }

    pub fn rules(&self) -> &[PointRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn classify<'a>(&'a self, message: &str) -> Command<'a> {
        let message = message.trim();
        if let Some(command) = command_for(message) {
            return command;
        }

        match self.get(message) {
            Some(rule) => Command::Award(rule),
            None => Command::Unknown,
        }
    }

    pub fn help_message(&self) -> String {
        let mut lines = Vec::with_capacity(self.rules.len() + 6);

        if self.rules.is_empty() {
            lines.push("現在、ポイント対象の行動は設定されていません。".to_string());
        } else {
            lines.push("📝 ポイント対象の行動一覧：".to_string());
            for rule in &self.rules {
                lines.push(format!(
                    "• {} → {}pt ({})",
                    rule.keyword,
                    rule.points,
                    rule.action()
                ));
            }
        }

        lines.push(String::new());
        lines.push("🔎 コマンド：".to_string());
        lines.push(format!("• {} → 現在の合計ポイントを確認", TOTAL_ALIASES[0]));
        lines.push(format!("• {} → 最近の行動履歴を確認", HISTORY_ALIASES[0]));
        lines.push(format!("• {} → このヘルプを表示", HELP_ALIASES[0]));

        lines.join("\n")
    }
}

fn command_for(message: &str) -> Option<Command<'static>> {
    let lowered = message.to_ascii_lowercase();
    let lowered = lowered.as_str();

    if TOTAL_ALIASES.contains(&lowered) {
        Some(Command::Total)
    } else if HISTORY_ALIASES.contains(&lowered) {
        Some(Command::History)
    } else if HELP_ALIASES.contains(&lowered) {
        Some(Command::Help)
    } else {
        None
    }
}

const CELEBRATE_100: &[&str] = &[
    "🎉 100pt達成おめでとう！君の努力が形になってるよ！✨",
    "🌟 100ptゲット！毎日コツコツがんばってるね！すごいぞ！💪",
    "🏆 100pt達成！君は本当に頑張り屋さんだね！この調子で続けよう！🎊",
];
const CELEBRATE_200: &[&str] = &[
    "🎉 200pt達成！すごいぞ！この調子でどんどんチャレンジしよう！",
    "🚀 200pt達成！君のやる気がどんどんパワーアップしてるね！",
    "🌈 200pt達成！毎日の積み重ねが力になってるよ！",
];
const CELEBRATE_300: &[&str] = &[
    "🏆 300pt達成！君の継続力は本当に素晴らしい！",
    "🎊 300pt達成！ここまで続けられる君は本当にすごい！",
    "💫 300pt達成！君の努力は必ず実を結ぶよ！",
];
const CELEBRATE_400: &[&str] = &[
    "🌟 400pt達成！毎日コツコツがんばってるね！",
    "🎉 400pt達成！君の成長が目に見えてるよ！素晴らしい！",
    "🚀 400pt達成！この調子でどんどん進もう！",
];
const CELEBRATE_500: &[&str] = &[
    "🚀 500pt達成！ここまで続けられる君は本当にすごい！",
    "🏅 500pt達成！君の継続力は本物だね！",
    "🎉 500pt達成！これからも一緒にがんばろう！",
];

/// Celebration lines for a milestone. Anything past 500 reuses the 500 set.
pub fn celebration_messages(milestone: i64) -> &'static [&'static str] {
    match milestone {
        100 => CELEBRATE_100,
        200 => CELEBRATE_200,
        300 => CELEBRATE_300,
        400 => CELEBRATE_400,
        _ => CELEBRATE_500,
    }
}

/// Highest multiple of 100 passed when the total moved from `previous` to `current`.
pub fn milestone_crossed(previous: i64, current: i64) -> Option<i64> {
    let before = previous.div_euclid(100);
    let after = current.div_euclid(100);

    if after > before && after >= 1 {
        Some(after * 100)
    } else {
        None
    }
}
