// =============================================================================
// Rule definitions
// =============================================================================
//
// Rule families:
//   - max_position_size        — proposed notional vs equity
//   - max_daily_loss           — loss since day start vs starting equity
//   - max_concurrent_positions — open position count
//   - max_consecutive_losses   — losing streak
//   - max_trades_per_day       — daily trade count
//   - price_bounds             — sanity range on the candidate's last price
//   - min_volume               — sanity floor on the candidate's last volume
//   - no_duplicate_position    — already holding the symbol
//
// Percent parameters are expressed in percent (3.0 = 3 %).
// =============================================================================

use serde::{Deserialize, Serialize};

use super::portfolio::PortfolioContext;
use crate::error::{ConfigError, RuleError};
use crate::scanner::Candidate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Violation fails the verdict.
    Hard,
    /// Violation is reported only.
    Warn,
}

impl Default for Severity {
    fn default() -> Self {
        Self::Hard
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hard => write!(f, "hard"),
            Self::Warn => write!(f, "warn"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleKind {
    MaxPositionSize { max_pct_of_equity: f64 },
    MaxDailyLoss { max_loss_pct: f64 },
    MaxConcurrentPositions { max_positions: usize },
    MaxConsecutiveLosses { max_losses: u32 },
    MaxTradesPerDay { max_trades: u32 },
    PriceBounds { min_price: f64, max_price: f64 },
    MinVolume { min_volume: f64 },
    NoDuplicatePosition,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    #[serde(default)]
    pub severity: Severity,
    #[serde(flatten)]
    pub kind: RuleKind,
}

impl Rule {
    pub fn hard(id: impl Into<String>, kind: RuleKind) -> Self {
        Self { id: id.into(), severity: Severity::Hard, kind }
    }

    pub fn warn(id: impl Into<String>, kind: RuleKind) -> Self {
        Self { id: id.into(), severity: Severity::Warn, kind }
    }

    /// Parameter sanity, checked once at engine construction.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidRule {
            rule: self.id.clone(),
            reason: reason.to_string(),
        };
        if self.id.trim().is_empty() {
            return Err(invalid("empty id"));
        }
        match &self.kind {
            RuleKind::MaxPositionSize { max_pct_of_equity: v }
            | RuleKind::MaxDailyLoss { max_loss_pct: v } => {
                if !(v.is_finite() && *v > 0.0 && *v <= 100.0) {
                    return Err(invalid("percentage must be in (0, 100]"));
                }
            }
            RuleKind::MaxConcurrentPositions { max_positions } => {
                if *max_positions == 0 {
                    return Err(invalid("max_positions must be at least 1"));
                }
            }
            RuleKind::MaxConsecutiveLosses { max_losses: n }
            | RuleKind::MaxTradesPerDay { max_trades: n } => {
                if *n == 0 {
                    return Err(invalid("limit must be at least 1"));
                }
            }
            RuleKind::PriceBounds { min_price, max_price } => {
                if !(min_price.is_finite() && max_price.is_finite() && *min_price >= 0.0 && min_price < max_price) {
                    return Err(invalid("need 0 <= min_price < max_price"));
                }
            }
            RuleKind::MinVolume { min_volume } => {
                if !(min_volume.is_finite() && *min_volume >= 0.0) {
                    return Err(invalid("min_volume must be finite and non-negative"));
                }
            }
            RuleKind::NoDuplicatePosition => {}
        }
        Ok(())
    }

    /// `Ok(Some(reason))` when violated, `Ok(None)` when satisfied.
    pub fn check(&self, candidate: &Candidate, ctx: &PortfolioContext) -> Result<Option<String>, RuleError> {
        let violation = match &self.kind {
            RuleKind::MaxPositionSize { max_pct_of_equity } => {
                let pct = ctx.proposed_notional / ctx.equity * 100.0;
                (pct > *max_pct_of_equity).then(|| {
                    format!("position size {:.2}% of equity exceeds {:.2}%", pct, max_pct_of_equity)
                })
            }
            RuleKind::MaxDailyLoss { max_loss_pct } => {
                let loss = ctx.daily_loss_pct();
                (loss >= *max_loss_pct)
                    .then(|| format!("daily loss {:.2}% reached limit {:.2}%", loss, max_loss_pct))
            }
            RuleKind::MaxConcurrentPositions { max_positions } => {
                let open = ctx.open_positions.len();
                (open >= *max_positions)
                    .then(|| format!("{} open positions (limit {})", open, max_positions))
            }
            RuleKind::MaxConsecutiveLosses { max_losses } => (ctx.consecutive_losses >= *max_losses)
                .then(|| format!("{} consecutive losses (limit {})", ctx.consecutive_losses, max_losses)),
            RuleKind::MaxTradesPerDay { max_trades } => (ctx.trades_today >= *max_trades)
                .then(|| format!("{} trades today (limit {})", ctx.trades_today, max_trades)),
            RuleKind::PriceBounds { min_price, max_price } => {
                let price = candidate.last_price().ok_or(RuleError::MissingSnapshot)?;
                (!(price >= *min_price && price <= *max_price)).then(|| {
                    format!("price {:.4} outside [{:.4}, {:.4}]", price, min_price, max_price)
                })
            }
            RuleKind::MinVolume { min_volume } => {
                let volume = candidate.last_volume().ok_or(RuleError::MissingSnapshot)?;
                (!(volume >= *min_volume))
                    .then(|| format!("volume {:.0} below sanity floor {:.0}", volume, min_volume))
            }
            RuleKind::NoDuplicatePosition => ctx
                .holds(&candidate.symbol)
                .then(|| format!("already holding {}", candidate.symbol)),
        };
        Ok(violation)
    }
}

/// Rule set carried from the circuit-breaker defaults.
pub fn default_rules() -> Vec<Rule> {
    vec![
        Rule::hard("position_size", RuleKind::MaxPositionSize { max_pct_of_equity: 10.0 }),
        Rule::hard("daily_loss", RuleKind::MaxDailyLoss { max_loss_pct: 3.0 }),
        Rule::hard("concurrent_positions", RuleKind::MaxConcurrentPositions { max_positions: 3 }),
        Rule::hard("consecutive_losses", RuleKind::MaxConsecutiveLosses { max_losses: 5 }),
        Rule::hard("trades_per_day", RuleKind::MaxTradesPerDay { max_trades: 50 }),
        Rule::hard("price_sanity", RuleKind::PriceBounds { min_price: 0.01, max_price: 1_000_000.0 }),
        Rule::warn("duplicate_position", RuleKind::NoDuplicatePosition),
    ]
}
