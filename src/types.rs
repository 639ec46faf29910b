// =============================================================================
// Shared types used across the scanner, rule engine and coordinator
// =============================================================================

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque tradable identifier.
pub type Symbol = String;

/// Bar interval a snapshot (and a scan stage) is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "1d")]
    D1,
}

impl Default for Timeframe {
    fn default() -> Self {
        Self::M5
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::M1 => "1m",
            Self::M5 => "5m",
            Self::M15 => "15m",
            Self::H1 => "1h",
            Self::H4 => "4h",
            Self::D1 => "1d",
        };
        f.write_str(s)
    }
}

/// Directional bias of a signal or a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Long,
    Short,
    Neutral,
}

impl Default for Direction {
    fn default() -> Self {
        Self::Neutral
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Long => write!(f, "long"),
            Self::Short => write!(f, "short"),
            Self::Neutral => write!(f, "neutral"),
        }
    }
}

/// Tag describing what an evaluator observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalType {
    EmaCross,
    VwapBreak,
    VolumeSpike,
    RsiMomentum,
    SpoofDetected,
}

impl SignalType {
    /// Fixed ordering used when signal types are laid out as feature columns.
    pub const ALL: [SignalType; 5] = [
        SignalType::EmaCross,
        SignalType::VwapBreak,
        SignalType::VolumeSpike,
        SignalType::RsiMomentum,
        SignalType::SpoofDetected,
    ];
}

impl std::fmt::Display for SignalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::EmaCross => "ema_cross",
            Self::VwapBreak => "vwap_break",
            Self::VolumeSpike => "volume_spike",
            Self::RsiMomentum => "rsi_momentum",
            Self::SpoofDetected => "spoof_detected",
        };
        f.write_str(s)
    }
}

/// A single historical OHLCV bar (oldest-first inside a snapshot).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub open_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Aggregated order-book features at snapshot time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBookFeatures {
    /// Resting size on the bid side within the observed depth.
    pub bid_depth: f64,
    /// Resting size on the ask side within the observed depth.
    pub ask_depth: f64,
    /// Fraction of large resting orders cancelled before being filled.
    pub cancel_ratio: f64,
}

impl OrderBookFeatures {
    /// `(bid - ask) / (bid + ask)` in [-1, 1]; `0.0` when the book is empty.
    pub fn imbalance(&self) -> f64 {
        let total = self.bid_depth + self.ask_depth;
        if total > 0.0 {
            (self.bid_depth - self.ask_depth) / total
        } else {
            0.0
        }
    }
}

/// Immutable market observation for one symbol on one timeframe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub symbol: Symbol,
    pub timeframe: Timeframe,
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    /// Previous session close, used for the up-percent filter.
    #[serde(default)]
    pub prev_close: Option<f64>,
    /// Tradable float, used for rotation.
    #[serde(default)]
    pub float_shares: Option<f64>,
    /// Recent closed bars on the same timeframe, oldest first.
    #[serde(default)]
    pub bars: Vec<Bar>,
    #[serde(default)]
    pub order_book: Option<OrderBookFeatures>,
    /// Derived indicator values supplied by the provider.
    #[serde(default)]
    pub indicators: BTreeMap<String, f64>,
}

impl MarketSnapshot {
    /// Traded volume divided by float. `None` when the float is unknown or zero.
    pub fn rotation(&self) -> Option<f64> {
        match self.float_shares {
            Some(float) if float > 0.0 => Some(self.volume / float),
            _ => None,
        }
    }

    /// Percent change versus the previous close, or versus the open when no
    /// previous close is known.
    pub fn up_percent(&self) -> Option<f64> {
        let base = self.prev_close.unwrap_or(self.open);
        if base > 0.0 {
            Some((self.close - base) / base * 100.0)
        } else {
            None
        }
    }

    pub fn indicator(&self, name: &str) -> Option<f64> {
        self.indicators.get(name).copied()
    }

    /// Bar closes followed by the current close.
    pub fn closes(&self) -> Vec<f64> {
        let mut closes: Vec<f64> = self.bars.iter().map(|b| b.close).collect();
        closes.push(self.close);
        closes
    }
}

/// Output of a signal evaluator. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub evaluator_id: String,
    pub symbol: Symbol,
    pub timeframe: Timeframe,
    pub signal_type: SignalType,
    /// Always within [0, 1].
    pub confidence: f64,
    pub direction: Direction,
    pub timestamp: DateTime<Utc>,
}

impl Signal {
    /// Build a signal stamped with the snapshot's own timestamp, clamping
    /// confidence into [0, 1] (non-finite values become 0).
    pub fn from_snapshot(
        evaluator_id: &str,
        snapshot: &MarketSnapshot,
        signal_type: SignalType,
        direction: Direction,
        confidence: f64,
    ) -> Self {
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            evaluator_id: evaluator_id.to_string(),
            symbol: snapshot.symbol.clone(),
            timeframe: snapshot.timeframe,
            signal_type,
            confidence,
            direction,
            timestamp: snapshot.timestamp,
        }
    }
}

/// A signal tagged with the scan stage that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagedSignal {
    pub stage_index: usize,
    pub stage_name: String,
    pub signal: Signal,
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> MarketSnapshot {
        MarketSnapshot {
            symbol: "ACME".into(),
            timeframe: Timeframe::M5,
            timestamp: Utc::now(),
            open: 10.0,
            high: 11.0,
            low: 9.5,
            close: 10.5,
            volume: 2_000_000.0,
            prev_close: None,
            float_shares: Some(10_000_000.0),
            bars: Vec::new(),
            order_book: None,
            indicators: BTreeMap::new(),
        }
    }

    #[test]
    fn rotation_requires_known_float() {
        let mut s = snapshot();
        assert!((s.rotation().unwrap() - 0.2).abs() < 1e-12);
        s.float_shares = None;
        assert!(s.rotation().is_none());
        s.float_shares = Some(0.0);
        assert!(s.rotation().is_none());
    }

    #[test]
    fn up_percent_prefers_prev_close() {
        let mut s = snapshot();
        assert!((s.up_percent().unwrap() - 5.0).abs() < 1e-9);
        s.prev_close = Some(7.0);
        assert!((s.up_percent().unwrap() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn signal_confidence_is_clamped() {
        let s = snapshot();
        let sig = Signal::from_snapshot("t", &s, SignalType::EmaCross, Direction::Long, 1.7);
        assert_eq!(sig.confidence, 1.0);
        let sig = Signal::from_snapshot("t", &s, SignalType::EmaCross, Direction::Long, f64::NAN);
        assert_eq!(sig.confidence, 0.0);
    }

    #[test]
    fn timeframe_serde_uses_interval_names() {
        let json = serde_json::to_string(&Timeframe::M15).unwrap();
        assert_eq!(json, "\"15m\"");
        let tf: Timeframe = serde_json::from_str("\"1h\"").unwrap();
        assert_eq!(tf, Timeframe::H1);
    }

    #[test]
    fn order_book_imbalance_handles_empty_book() {
        let ob = OrderBookFeatures { bid_depth: 0.0, ask_depth: 0.0, cancel_ratio: 0.0 };
        assert_eq!(ob.imbalance(), 0.0);
        let ob = OrderBookFeatures { bid_depth: 300.0, ask_depth: 100.0, cancel_ratio: 0.0 };
        assert!((ob.imbalance() - 0.5).abs() < 1e-12);
    }
}
