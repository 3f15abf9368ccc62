use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::constant::{Polarity, Timeframe};
use crate::engine::EngineSnapshot;

/// 在 `timestamp` 这根 bar 上出现同向 MSB 的独立序列数。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfluenceScore {
    pub timestamp: DateTime<Utc>,
    pub polarity: Polarity,
    pub count: usize,
    pub series: Vec<(String, Timeframe)>,
}

impl ConfluenceScore {
    pub fn from_snapshots<'a>(
        snapshots: impl IntoIterator<Item = &'a EngineSnapshot>,
        timestamp: DateTime<Utc>,
        polarity: Polarity,
    ) -> Self {
        let series: BTreeSet<(String, Timeframe)> = snapshots
            .into_iter()
            .filter(|x| x.datetime == Some(timestamp) && x.has_msb(polarity))
            .map(|x| (x.symbol.clone(), x.timeframe))
            .collect();

        Self {
            timestamp,
            polarity,
            count: series.len(),
            series: series.into_iter().collect(),
        }
    }

    pub fn is_confluent(&self, min_count: usize) -> bool {
        self.count >= min_count
    }
}
