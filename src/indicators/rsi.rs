// =============================================================================
// Relative Strength Index (RSI) — Wilder's smoothing
// =============================================================================
//
//   avg_gain = (prev_avg_gain * (period - 1) + gain) / period
//   avg_loss = (prev_avg_loss * (period - 1) + loss) / period
//   RSI      = 100 - 100 / (1 + avg_gain / avg_loss)
//
// Averages are seeded with the SMA of the first `period` deltas.
// =============================================================================

/// Latest RSI value, or `None` with fewer than `period + 1` closes.
pub fn rsi_last(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period + 1 {
        return None;
    }

    let p = period as f64;
    let mut deltas = closes.windows(2).map(|w| w[1] - w[0]);

    let (mut avg_gain, mut avg_loss) = (0.0_f64, 0.0_f64);
    for d in deltas.by_ref().take(period) {
        if d > 0.0 {
            avg_gain += d;
        } else {
            avg_loss -= d;
        }
    }
    avg_gain /= p;
    avg_loss /= p;

    for d in deltas {
        let (gain, loss) = if d > 0.0 { (d, 0.0) } else { (0.0, -d) };
        avg_gain = (avg_gain * (p - 1.0) + gain) / p;
        avg_loss = (avg_loss * (p - 1.0) + loss) / p;
    }

    let rsi = if avg_loss == 0.0 {
        if avg_gain == 0.0 {
            50.0
        } else {
            100.0
        }
    } else {
        100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
    };
    rsi.is_finite().then_some(rsi)
}
