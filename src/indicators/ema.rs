// =============================================================================
// Exponential Moving Average (EMA) and fast/slow crossovers
// =============================================================================
//
//   multiplier = 2 / (period + 1)
//   EMA_t      = close_t * multiplier + EMA_{t-1} * (1 - multiplier)
//
// The series is seeded with the SMA of the first `period` closes, so output
// index 0 lines up with input index `period - 1`.
// =============================================================================

use crate::types::Direction;

/// EMA series over `closes`. Empty when `period == 0` or there is not enough
/// data; truncated at the first non-finite value.
pub fn ema_series(closes: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || closes.len() < period {
        return Vec::new();
    }

    let k = 2.0 / (period as f64 + 1.0);
    let seed = closes[..period].iter().sum::<f64>() / period as f64;
    if !seed.is_finite() {
        return Vec::new();
    }

    let mut out = Vec::with_capacity(closes.len() - period + 1);
    out.push(seed);
    let mut prev = seed;
    for &close in &closes[period..] {
        let next = close * k + prev * (1.0 - k);
        if !next.is_finite() {
            break;
        }
        out.push(next);
        prev = next;
    }
    out
}

/// A fast EMA crossing the slow EMA within the recent look-back window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Crossover {
    pub direction: Direction,
    /// Bars since the cross (0 = crossed on the latest bar).
    pub bars_ago: usize,
    /// `(fast - slow) / slow` on the latest bar.
    pub separation: f64,
}

/// Detect the most recent fast/slow EMA cross within `lookback` bars.
///
/// Returns `None` when either series is not ready, when no cross happened in
/// the window, or when the cross has since been undone.
pub fn ema_crossover(closes: &[f64], fast: usize, slow: usize, lookback: usize) -> Option<Crossover> {
    if fast == 0 || fast >= slow {
        return None;
    }
    let fast_series = ema_series(closes, fast);
    let slow_series = ema_series(closes, slow);
    if slow_series.len() < 2 {
        return None;
    }

    // Align the faster series to the slower one (both end on the last close).
    let offset = fast_series.len().checked_sub(slow_series.len())?;
    let fast_aligned = &fast_series[offset..];
    let n = slow_series.len();
    if fast_aligned.len() != n {
        return None;
    }

    let last_fast = fast_aligned[n - 1];
    let last_slow = slow_series[n - 1];
    if last_slow == 0.0 {
        return None;
    }
    let separation = (last_fast - last_slow) / last_slow;

    let window = lookback.max(1).min(n - 1);
    for bars_ago in 0..window {
        let i = n - 1 - bars_ago;
        let diff_now = fast_aligned[i] - slow_series[i];
        let diff_prev = fast_aligned[i - 1] - slow_series[i - 1];

        let direction = if diff_prev <= 0.0 && diff_now > 0.0 {
            Direction::Long
        } else if diff_prev >= 0.0 && diff_now < 0.0 {
            Direction::Short
        } else {
            continue;
        };

        // The cross must still hold on the latest bar.
        let holds = match direction {
            Direction::Long => separation > 0.0,
            Direction::Short => separation < 0.0,
            Direction::Neutral => false,
        };
        if !holds {
            return None;
        }
        return Some(Crossover { direction, bars_ago, separation });
    }
    None
}
