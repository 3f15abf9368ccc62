//! 按 (symbol, timeframe) 管理的独立引擎集合。
//!
//! 引擎之间不共享可变状态，跨序列的共振统计只读取各自的快照。

use std::collections::BTreeMap;
use std::fs::{File, create_dir_all};
use std::path::Path;

use chrono::{DateTime, Utc};
use polars::prelude::ParquetWriter;
use serde::Serialize;
use tracing::info;

use crate::bar::Bar;
use crate::config::{EngineConfig, EngineProfileConfig};
use crate::confluence::ConfluenceScore;
use crate::constant::{EngineError, EventType, Polarity, Timeframe};
use crate::engine::{EngineSnapshot, StructureEngine};
use crate::events::{EngineEvent, Observable, Subscriber};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SeriesKey {
    pub symbol: String,
    pub timeframe: Timeframe,
}

impl SeriesKey {
    pub fn new(symbol: impl Into<String>, timeframe: Timeframe) -> Self {
        Self {
            symbol: symbol.into(),
            timeframe,
        }
    }

    fn label(&self) -> String {
        format!("{}.{}", self.symbol, self.timeframe.as_str())
    }
}

#[derive(Default)]
pub struct MarketContext {
    engines: BTreeMap<SeriesKey, StructureEngine>,
    observable: Observable,
}

impl MarketContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册序列；重复注册保留已有引擎。
    pub fn register(
        &mut self,
        symbol: impl Into<String>,
        timeframe: Timeframe,
        config: EngineConfig,
    ) -> Result<(), EngineError> {
        let key = SeriesKey::new(symbol, timeframe);
        if self.engines.contains_key(&key) {
            return Ok(());
        }
        let engine = StructureEngine::new(key.symbol.clone(), timeframe, config)?;
        info!(series = key.label().as_str(), "series registered");
        self.engines.insert(key, engine);
        Ok(())
    }

    pub fn register_with_profile(
        &mut self,
        symbol: &str,
        timeframe: Timeframe,
        profile: &EngineProfileConfig,
    ) -> Result<(), EngineError> {
        let config = profile.resolve_for(symbol, timeframe)?;
        self.register(symbol, timeframe, config)
    }

    pub fn subscribe(&mut self, event_type: Option<EventType>, subscriber: Subscriber) {
        self.observable.subscribe(event_type, subscriber);
    }

    pub fn append(
        &mut self,
        symbol: &str,
        timeframe: Timeframe,
        bar: &Bar,
    ) -> Result<Vec<EngineEvent>, EngineError> {
        let key = SeriesKey::new(symbol, timeframe);
        let engine = self
            .engines
            .get_mut(&key)
            .ok_or_else(|| EngineError::UnknownSeries(key.label()))?;
        let events = engine.process_bar(bar)?;
        for event in &events {
            self.observable.notify(symbol, timeframe, event);
        }
        Ok(events)
    }

    pub fn engine(&self, symbol: &str, timeframe: Timeframe) -> Option<&StructureEngine> {
        self.engines.get(&SeriesKey::new(symbol, timeframe))
    }

    pub fn series(&self) -> impl Iterator<Item = &SeriesKey> {
        self.engines.keys()
    }

    pub fn snapshot(&self, symbol: &str, timeframe: Timeframe) -> Option<EngineSnapshot> {
        self.engine(symbol, timeframe).map(StructureEngine::snapshot)
    }

    pub fn snapshots(&self) -> Vec<EngineSnapshot> {
        self.engines.values().map(StructureEngine::snapshot).collect()
    }

    pub fn confluence(&self, timestamp: DateTime<Utc>, polarity: Polarity) -> ConfluenceScore {
        ConfluenceScore::from_snapshots(&self.snapshots(), timestamp, polarity)
    }

    pub fn write_parquet_snapshot(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        output_dir: impl AsRef<Path>,
    ) -> Result<(), EngineError> {
        let key = SeriesKey::new(symbol, timeframe);
        let engine = self
            .engines
            .get(&key)
            .ok_or_else(|| EngineError::UnknownSeries(key.label()))?;

        let output_dir = output_dir.as_ref();
        create_dir_all(output_dir)?;
        let stem = format!("{}_{}", key.symbol.to_ascii_lowercase(), timeframe.as_str());

        let mut levels_file = File::create(output_dir.join(format!("levels_{stem}.parquet")))?;
        let mut levels_df = engine.levels_dataframe()?;
        ParquetWriter::new(&mut levels_file).finish(&mut levels_df)?;

        let mut swings_file = File::create(output_dir.join(format!("swings_{stem}.parquet")))?;
        let mut swings_df = engine.swings_dataframe()?;
        ParquetWriter::new(&mut swings_file).finish(&mut swings_df)?;

        let mut zones_file = File::create(output_dir.join(format!("zones_{stem}.parquet")))?;
        let mut zones_df = engine.zones_dataframe()?;
        ParquetWriter::new(&mut zones_file).finish(&mut zones_df)?;

        info!(series = key.label().as_str(), dir = %output_dir.display(), "parquet snapshot written");
        Ok(())
    }
}
