// =============================================================================
// Rule Engine — stateless compliance gate
// =============================================================================
//
// Every rule is evaluated on every call (no short-circuit) so the verdict
// carries the complete violation list.  A verdict fails iff at least one
// hard rule is violated; warn-severity violations are reported only.
//
// Internal problems (malformed portfolio context, a rule that cannot be
// evaluated) never pass silently: they surface as a synthetic hard-fail
// violation with id `rule_engine.internal_error`.
//
// The engine holds nothing but its immutable rule list, so it can be shared
// across tasks without locking and repeated calls return identical verdicts.
// =============================================================================

pub mod portfolio;
pub mod rule;

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ConfigError;
use crate::scanner::Candidate;
use crate::types::Symbol;

pub use portfolio::{OpenPosition, PortfolioContext};
pub use rule::{default_rules, Rule, RuleKind, Severity};

/// Id of the synthetic violation raised for internal evaluation errors.
pub const INTERNAL_ERROR_RULE_ID: &str = "rule_engine.internal_error";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleViolation {
    pub rule_id: String,
    pub severity: Severity,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleVerdict {
    pub symbol: Symbol,
    pub passed: bool,
    pub violations: Vec<RuleViolation>,
}

impl RuleVerdict {
    /// Verdict for a candidate that could not be evaluated at all.
    pub fn internal_error(symbol: impl Into<Symbol>, reason: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            passed: false,
            violations: vec![RuleViolation {
                rule_id: INTERNAL_ERROR_RULE_ID.to_string(),
                severity: Severity::Hard,
                reason: reason.into(),
            }],
        }
    }

    pub fn hard_failures(&self) -> impl Iterator<Item = &RuleViolation> {
        self.violations.iter().filter(|v| v.severity == Severity::Hard)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &RuleViolation> {
        self.violations.iter().filter(|v| v.severity == Severity::Warn)
    }

    /// `"id: reason; id: reason"` of the hard failures.
    pub fn summary(&self) -> String {
        self.hard_failures()
            .map(|v| format!("{}: {}", v.rule_id, v.reason))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone)]
pub struct RuleEngine {
    rules: Vec<Rule>,
}

impl RuleEngine {
    /// Build an engine, rejecting duplicate ids and bad parameters.
    pub fn new(rules: Vec<Rule>) -> Result<Self, ConfigError> {
        let mut seen = HashSet::new();
        for rule in &rules {
            rule.validate()?;
            if rule.id == INTERNAL_ERROR_RULE_ID || !seen.insert(rule.id.as_str()) {
                return Err(ConfigError::DuplicateRule(rule.id.clone()));
            }
        }
        Ok(Self { rules })
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn evaluate(&self, candidate: &Candidate, ctx: &PortfolioContext) -> RuleVerdict {
        if let Err(e) = ctx.validate() {
            warn!(symbol = %candidate.symbol, error = %e, "rule evaluation aborted — rejecting candidate");
            return RuleVerdict::internal_error(candidate.symbol.clone(), e.to_string());
        }

        let mut violations = Vec::new();
        for rule in &self.rules {
            match rule.check(candidate, ctx) {
                Ok(None) => {}
                Ok(Some(reason)) => violations.push(RuleViolation {
                    rule_id: rule.id.clone(),
                    severity: rule.severity,
                    reason,
                }),
                Err(e) => {
                    warn!(symbol = %candidate.symbol, rule = %rule.id, error = %e, "rule could not be evaluated");
                    violations.push(RuleViolation {
                        rule_id: INTERNAL_ERROR_RULE_ID.to_string(),
                        severity: Severity::Hard,
                        reason: format!("{}: {}", rule.id, e),
                    });
                }
            }
        }

        let passed = !violations.iter().any(|v| v.severity == Severity::Hard);
        debug!(
            symbol = %candidate.symbol,
            passed,
            violations = violations.len(),
            "rule verdict"
        );
        RuleVerdict {
            symbol: candidate.symbol.clone(),
            passed,
            violations,
        }
    }
}
