// =============================================================================
// Technical Indicators Module
// =============================================================================
//
// Pure, side-effect-free indicator math consumed by the signal evaluators.
// Every public function returns `Option`/empty output on insufficient data.

pub mod ema;
pub mod rsi;
pub mod vwap;

pub use ema::{ema_crossover, ema_series, Crossover};
pub use rsi::rsi_last;
pub use vwap::{mean_volume, vwap};
