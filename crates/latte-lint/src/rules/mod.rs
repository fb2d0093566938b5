//! Built-in lint rules.

mod auto_closed_block;
mod empty_closing_tag;
mod nesting_depth;
mod syntax_mode_value;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{LintSeverity, Rule, RuleSetting};

pub use auto_closed_block::AutoClosedBlock;
pub use empty_closing_tag::EmptyClosingTag;
pub use nesting_depth::NestingDepth;
pub use syntax_mode_value::SyntaxModeValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RuleId {
    /// `{syntax X}` or `n:syntax="X"` with an unknown `X`.
    SyntaxModeValue,
    /// Blocks nested deeper than a threshold.
    NestingDepth,
    /// Blocks closed only by the end of the file.
    AutoClosedBlock,
    /// Anonymous `{/}` closers.
    EmptyClosingTag,
}

impl RuleId {
    pub const ALL: [RuleId; 4] = [
        RuleId::SyntaxModeValue,
        RuleId::NestingDepth,
        RuleId::AutoClosedBlock,
        RuleId::EmptyClosingTag,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RuleId::SyntaxModeValue => "syntax-mode-value",
            RuleId::NestingDepth => "nesting-depth",
            RuleId::AutoClosedBlock => "auto-closed-block",
            RuleId::EmptyClosingTag => "empty-closing-tag",
        }
    }

    pub fn default_severity(self) -> LintSeverity {
        match self {
            RuleId::AutoClosedBlock => LintSeverity::Info,
            RuleId::SyntaxModeValue | RuleId::NestingDepth | RuleId::EmptyClosingTag => LintSeverity::Warning,
        }
    }

    pub(crate) fn build(self, setting: &RuleSetting) -> Box<dyn Rule> {
        match self {
            RuleId::SyntaxModeValue => Box::new(SyntaxModeValue),
            RuleId::NestingDepth => Box::new(setting.max.map_or_else(NestingDepth::default, NestingDepth::new)),
            RuleId::AutoClosedBlock => Box::new(AutoClosedBlock),
            RuleId::EmptyClosingTag => Box::new(EmptyClosingTag),
        }
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Run one rule over `text` parsed with `config`.
#[cfg(test)]
pub(crate) fn run_with(rule: &dyn Rule, config: &latte_core::EngineConfig, text: &str) -> Vec<crate::Finding> {
    let doc = latte_core::parse_document(text, config, &latte_core::ValidNames::default());
    let mut out = Vec::new();
    rule.check(&crate::LintContext::new(&doc, text), &mut out);
    out
}

#[cfg(test)]
pub(crate) fn run(rule: &dyn Rule, text: &str) -> Vec<crate::Finding> {
    run_with(rule, &latte_core::EngineConfig::default(), text)
}
