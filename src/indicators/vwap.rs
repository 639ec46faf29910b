// =============================================================================
// Volume-Weighted Average Price (VWAP)
// =============================================================================
//
//   typical = (high + low + close) / 3
//   VWAP    = Σ(typical × volume) / Σ(volume)
// =============================================================================

use crate::types::Bar;

/// VWAP over `bars`. `None` when the bars carry no volume.
pub fn vwap(bars: &[Bar]) -> Option<f64> {
    let (pv, v) = bars.iter().fold((0.0_f64, 0.0_f64), |(pv, v), b| {
        let typical = (b.high + b.low + b.close) / 3.0;
        (pv + typical * b.volume, v + b.volume)
    });
    if v > 0.0 && pv.is_finite() {
        Some(pv / v)
    } else {
        None
    }
}

/// Mean volume of `bars`, `None` when empty.
pub fn mean_volume(bars: &[Bar]) -> Option<f64> {
    if bars.is_empty() {
        return None;
    }
    Some(bars.iter().map(|b| b.volume).sum::<f64>() / bars.len() as f64)
}
