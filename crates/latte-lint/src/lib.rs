//! Opt-in lint rules over parsed Latte templates.
//!
//! The core validator tolerates several constructs silently (unknown
//! `{syntax}` modes, blocks closed by the end of the file, `{/}`). Each rule
//! here turns one of them into a diagnostic. Rules only report spans and
//! messages; the [`Linter`] attaches rule ids, severities and positions.

mod config;
mod rules;

use latte_core::{Document, LineIndex, Span};
use serde::{Deserialize, Serialize};

pub use config::{LintConfig, RuleLevel, RuleSetting};
pub use rules::{AutoClosedBlock, EmptyClosingTag, NestingDepth, RuleId, SyntaxModeValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LintSeverity {
    Error,
    Warning,
    Info,
}

/// A parsed template as the rules see it.
pub struct LintContext<'a> {
    pub doc: &'a Document,
    pub text: &'a str,
    lines: LineIndex,
}

impl<'a> LintContext<'a> {
    pub fn new(doc: &'a Document, text: &'a str) -> Self {
        Self {
            doc,
            text,
            lines: LineIndex::new(text),
        }
    }

    /// 1-based line and column of a byte offset.
    pub fn line_col(&self, offset: usize) -> (usize, usize) {
        self.lines.line_col(offset)
    }
}

/// One problem reported by a rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub span: Span,
    pub message: String,
}

impl Finding {
    pub fn new(span: Span, message: impl Into<String>) -> Self {
        Self {
            span,
            message: message.into(),
        }
    }
}

pub trait Rule: Send + Sync {
    fn check(&self, cx: &LintContext<'_>, out: &mut Vec<Finding>);
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LintDiagnostic {
    pub rule: RuleId,
    pub severity: LintSeverity,
    pub span: Span,
    pub line: usize,
    pub col: usize,
    pub message: String,
}

struct ActiveRule {
    id: RuleId,
    severity: LintSeverity,
    rule: Box<dyn Rule>,
}

/// The enabled rules of a [`LintConfig`], ready to run.
pub struct Linter {
    active: Vec<ActiveRule>,
}

impl Linter {
    pub fn new(config: &LintConfig) -> Self {
        let active = RuleId::ALL
            .iter()
            .filter_map(|&id| {
                let setting = config.setting(id);
                let severity = setting.severity(id.default_severity())?;
                Some(ActiveRule {
                    id,
                    severity,
                    rule: id.build(&setting),
                })
            })
            .collect();
        Self { active }
    }

    pub fn enabled(&self) -> impl Iterator<Item = RuleId> + '_ {
        self.active.iter().map(|a| a.id)
    }

    /// Findings of every enabled rule, ordered by position.
    pub fn lint(&self, doc: &Document, text: &str) -> Vec<LintDiagnostic> {
        let cx = LintContext::new(doc, text);
        let mut diagnostics = Vec::new();
        let mut findings = Vec::new();
        for active in &self.active {
            active.rule.check(&cx, &mut findings);
            diagnostics.extend(findings.drain(..).map(|finding| {
                let (line, col) = cx.line_col(finding.span.start);
                LintDiagnostic {
                    rule: active.id,
                    severity: active.severity,
                    span: finding.span,
                    line,
                    col,
                    message: finding.message,
                }
            }));
        }
        diagnostics.sort_by_key(|d| (d.span.start, d.rule));
        diagnostics
    }
}

impl Default for Linter {
    fn default() -> Self {
        Self::new(&LintConfig::default())
    }
}
