use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::budget::{Budget, CancelToken};
use crate::error::ConfigError;
use crate::types::{LatteVersion, ValidateOptions};

/// How `n:` attributes reach the lexer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AttributeTokenization {
    /// The host emits one `NAttribute` token and the attribute layer splits it.
    #[default]
    Layered,
    /// The host emits `n:` attributes as ordinary markup attribute tokens.
    Native,
}

/// How the reparse engine turns an edit into changed ranges.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DiffStrategy {
    /// Trim the common prefix/suffix, then split small middles into hunks.
    #[default]
    Precise,
    /// A single range between the common prefix and suffix.
    Whole,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Limits {
    /// Tokens produced in one lexing pass before the rest becomes plain text.
    pub max_tokens: u64,
    /// Steps for one boundary scan before falling back to the conservative answer.
    pub max_scan_steps: u64,
    /// Zero disables the deadline.
    pub parse_timeout_ms: u64,
    /// Zero disables the deadline.
    pub scan_timeout_ms: u64,
    /// Largest changed middle (in bytes) that is split with a character diff.
    pub precise_diff_limit: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_tokens: 1_000_000,
            max_scan_steps: 2_000_000,
            parse_timeout_ms: 5_000,
            scan_timeout_ms: 500,
            precise_diff_limit: 4_096,
        }
    }
}

fn timeout(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

impl Limits {
    pub fn parse_budget(&self, cancel: Option<CancelToken>) -> Budget {
        Budget::new(self.max_tokens, timeout(self.parse_timeout_ms), cancel)
    }

    pub fn scan_budget(&self, cancel: Option<CancelToken>) -> Budget {
        Budget::new(self.max_scan_steps, timeout(self.scan_timeout_ms), cancel)
    }

    pub fn scan_timeout(&self) -> Option<Duration> {
        timeout(self.scan_timeout_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    pub version: LatteVersion,
    pub attribute_tokenization: AttributeTokenization,
    pub diff: DiffStrategy,
    /// Report blocks that are only closed by the end of the file.
    pub strict: bool,
    pub limits: Limits,
}

impl EngineConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.check()?;
        Ok(config)
    }

    fn check(&self) -> Result<(), ConfigError> {
        if self.limits.max_tokens == 0 {
            return Err(ConfigError::ZeroLimit { name: "maxTokens" });
        }
        if self.limits.max_scan_steps == 0 {
            return Err(ConfigError::ZeroLimit {
                name: "maxScanSteps",
            });
        }
        Ok(())
    }

    pub fn validate_options(&self) -> ValidateOptions {
        ValidateOptions {
            strict: self.strict,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_is_default() {
        let config = EngineConfig::from_json("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn camel_case_fields() {
        let config = EngineConfig::from_json(
            r#"{
                "version": "v2",
                "attributeTokenization": "native",
                "diff": "whole",
                "strict": true,
                "limits": { "maxScanSteps": 10, "scanTimeoutMs": 0 }
            }"#,
        )
        .unwrap();
        assert_eq!(config.version, LatteVersion::V2);
        assert_eq!(config.attribute_tokenization, AttributeTokenization::Native);
        assert_eq!(config.diff, DiffStrategy::Whole);
        assert!(config.validate_options().strict);
        assert_eq!(config.limits.max_scan_steps, 10);
        assert_eq!(config.limits.scan_timeout(), None);
        assert_eq!(config.limits.max_tokens, Limits::default().max_tokens);
    }

    #[test]
    fn zero_step_limit_is_rejected() {
        let err = EngineConfig::from_json(r#"{"limits": {"maxTokens": 0}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::ZeroLimit { name: "maxTokens" }));
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        let err = EngineConfig::from_json("{").unwrap_err();
        assert!(matches!(err, ConfigError::Json(_)));
    }
}
