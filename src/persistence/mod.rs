//! Durable state: the set of open positions and the exposure ledger
//! aggregate, sufficient to resume after restart without replaying
//! the full event history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::domain::Position;
use crate::error::Result;
use crate::risk::LedgerState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub taken_at: DateTime<Utc>,
    pub positions: Vec<Position>,
    pub ledger: LedgerState,
}

impl Snapshot {
    /// Persist to pretty-printed JSON; Decimal fields serialize as
    /// strings, so sizes and prices round-trip exactly.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        info!(path = %path.display(), positions = self.positions.len(), "snapshot saved");
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let snapshot: Snapshot = serde_json::from_str(&json)?;
        info!(path = %path.display(), positions = snapshot.positions.len(), "snapshot loaded");
        Ok(snapshot)
    }
}
