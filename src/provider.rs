// =============================================================================
// Market snapshot provider
// =============================================================================
//
// The scanner never fetches market data itself; it asks a `SnapshotProvider`
// for one `(symbol, timeframe)` snapshot at a time.  Failures are per call
// and only drop that symbol from the current stage.
// =============================================================================

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::ProviderError;
use crate::types::{MarketSnapshot, Timeframe};

#[async_trait]
pub trait SnapshotProvider: Send + Sync {
    async fn get_snapshot(
        &self,
        symbol: &str,
        timeframe: Timeframe,
    ) -> Result<MarketSnapshot, ProviderError>;
}

/// Serves pre-recorded snapshots keyed by `(symbol, timeframe)`.
///
/// Used by the binary to replay a captured tick, and by tests.
#[derive(Default)]
pub struct ReplayProvider {
    snapshots: RwLock<HashMap<(String, Timeframe), MarketSnapshot>>,
}

impl ReplayProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshots(snapshots: impl IntoIterator<Item = MarketSnapshot>) -> Self {
        let provider = Self::new();
        for snapshot in snapshots {
            provider.insert(snapshot);
        }
        provider
    }

    /// Insert or replace the snapshot for its `(symbol, timeframe)`.
    pub fn insert(&self, snapshot: MarketSnapshot) {
        let key = (snapshot.symbol.clone(), snapshot.timeframe);
        self.snapshots.write().insert(key, snapshot);
    }

    pub fn len(&self) -> usize {
        self.snapshots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.read().is_empty()
    }
}

#[async_trait]
impl SnapshotProvider for ReplayProvider {
    async fn get_snapshot(
        &self,
        symbol: &str,
        timeframe: Timeframe,
    ) -> Result<MarketSnapshot, ProviderError> {
        self.snapshots
            .read()
            .get(&(symbol.to_string(), timeframe))
            .cloned()
            .ok_or_else(|| ProviderError::NotFound {
                symbol: symbol.to_string(),
                timeframe,
            })
    }
}
