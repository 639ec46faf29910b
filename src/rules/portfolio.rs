// =============================================================================
// Portfolio context — read-only input to the rule engine
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::error::RuleError;
use crate::types::{Direction, Symbol};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenPosition {
    pub symbol: Symbol,
    pub direction: Direction,
    pub notional: f64,
}

/// Account state the rules are evaluated against. Never mutated by rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioContext {
    /// Current account equity.
    pub equity: f64,
    /// Equity at the start of the trading day.
    pub starting_equity: f64,
    /// Realised + unrealised PnL since the start of the day.
    #[serde(default)]
    pub daily_pnl: f64,
    #[serde(default)]
    pub open_positions: Vec<OpenPosition>,
    /// Notional size the candidate would be opened with.
    #[serde(default)]
    pub proposed_notional: f64,
    #[serde(default)]
    pub consecutive_losses: u32,
    #[serde(default)]
    pub trades_today: u32,
}

impl PortfolioContext {
    /// Flat book with `equity` and no activity today.
    pub fn flat(equity: f64) -> Self {
        Self {
            equity,
            starting_equity: equity,
            daily_pnl: 0.0,
            open_positions: Vec::new(),
            proposed_notional: 0.0,
            consecutive_losses: 0,
            trades_today: 0,
        }
    }

    /// Reject contexts the rules cannot reason about.
    pub fn validate(&self) -> Result<(), RuleError> {
        if !(self.equity.is_finite() && self.equity > 0.0) {
            return Err(RuleError::MalformedContext(format!("equity {}", self.equity)));
        }
        if !(self.starting_equity.is_finite() && self.starting_equity > 0.0) {
            return Err(RuleError::MalformedContext(format!(
                "starting equity {}",
                self.starting_equity
            )));
        }
        if !self.daily_pnl.is_finite() {
            return Err(RuleError::MalformedContext(format!("daily pnl {}", self.daily_pnl)));
        }
        if !(self.proposed_notional.is_finite() && self.proposed_notional >= 0.0) {
            return Err(RuleError::MalformedContext(format!(
                "proposed notional {}",
                self.proposed_notional
            )));
        }
        if let Some(p) = self.open_positions.iter().find(|p| !p.notional.is_finite()) {
            return Err(RuleError::MalformedContext(format!(
                "position {} notional {}",
                p.symbol, p.notional
            )));
        }
        Ok(())
    }

    /// Loss since the start of the day as a percentage of starting equity
    /// (positive = losing).
    pub fn daily_loss_pct(&self) -> f64 {
        -self.daily_pnl / self.starting_equity * 100.0
    }

    pub fn holds(&self, symbol: &str) -> bool {
        self.open_positions.iter().any(|p| p.symbol == symbol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_bad_numbers() {
        assert!(PortfolioContext::flat(10_000.0).validate().is_ok());
        assert!(PortfolioContext::flat(0.0).validate().is_err());
        assert!(PortfolioContext::flat(f64::NAN).validate().is_err());

        let mut ctx = PortfolioContext::flat(10_000.0);
        ctx.proposed_notional = -1.0;
        assert!(ctx.validate().is_err());

        let mut ctx = PortfolioContext::flat(10_000.0);
        ctx.open_positions.push(OpenPosition {
            symbol: "A".into(),
            direction: Direction::Long,
            notional: f64::INFINITY,
        });
        assert!(ctx.validate().is_err());
    }

    #[test]
    fn daily_loss_pct_sign() {
        let mut ctx = PortfolioContext::flat(10_000.0);
        ctx.daily_pnl = -250.0;
        assert!((ctx.daily_loss_pct() - 2.5).abs() < 1e-12);
    }
}
