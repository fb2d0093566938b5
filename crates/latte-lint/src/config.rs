//! Lint configuration: one optional setting per rule.
//!
//! ```json
//! {"rules": {"empty-closing-tag": "off", "nesting-depth": {"level": "error", "max": 4}}}
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{LintSeverity, RuleId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleLevel {
    Off,
    Info,
    Warn,
    Error,
}

/// A rule's level and options. Written either as a bare level or as a table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "SettingForm")]
pub struct RuleSetting {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<RuleLevel>,
    /// Threshold for rules that count something.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<usize>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SettingForm {
    Level(RuleLevel),
    Table {
        #[serde(default)]
        level: Option<RuleLevel>,
        #[serde(default)]
        max: Option<usize>,
    },
}

impl From<SettingForm> for RuleSetting {
    fn from(form: SettingForm) -> Self {
        match form {
            SettingForm::Level(level) => Self {
                level: Some(level),
                max: None,
            },
            SettingForm::Table { level, max } => Self { level, max },
        }
    }
}

impl RuleSetting {
    /// The severity to report with, `None` when the rule is off.
    pub fn severity(&self, default: LintSeverity) -> Option<LintSeverity> {
        match self.level {
            None => Some(default),
            Some(RuleLevel::Off) => None,
            Some(RuleLevel::Info) => Some(LintSeverity::Info),
            Some(RuleLevel::Warn) => Some(LintSeverity::Warning),
            Some(RuleLevel::Error) => Some(LintSeverity::Error),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LintConfig {
    #[serde(default)]
    pub rules: HashMap<RuleId, RuleSetting>,
}

impl LintConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn setting(&self, rule: RuleId) -> RuleSetting {
        self.rules.get(&rule).cloned().unwrap_or_default()
    }
}
