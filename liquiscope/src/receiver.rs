use std::path::Path;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;

use crate::bar::Bar;
use crate::constant::{EngineError, Timeframe};
use crate::context::MarketContext;
use crate::events::EngineEvent;

/// 标准化的市场 bar 输入，尚未分配序号。
#[derive(Debug, Clone)]
pub struct MarketBarInput {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub datetime: DateTime<Utc>,
    pub open_price: f64,
    pub high_price: f64,
    pub low_price: f64,
    pub close_price: f64,
    pub tick_size: f64,
}

impl MarketBarInput {
    pub fn into_bar(self, index: u64) -> Bar {
        Bar {
            index,
            datetime: self.datetime,
            open_price: self.open_price,
            high_price: self.high_price,
            low_price: self.low_price,
            close_price: self.close_price,
            tick_size: self.tick_size,
        }
    }
}

/// 把输入写入 `MarketContext`，每个序列从其引擎的最后序号起连续编号。
pub struct DataReceiver {
    context: MarketContext,
}

impl DataReceiver {
    pub fn new(context: MarketContext) -> Self {
        Self { context }
    }

    pub fn ingest_bar(&mut self, input: MarketBarInput) -> Result<Vec<EngineEvent>, EngineError> {
        let index = self
            .context
            .engine(&input.symbol, input.timeframe)
            .and_then(|x| x.last_index())
            .map_or(0, |x| x + 1);
        let symbol = input.symbol.clone();
        let timeframe = input.timeframe;
        self.context.append(&symbol, timeframe, &input.into_bar(index))
    }

    pub fn ingest_batch(
        &mut self,
        inputs: Vec<MarketBarInput>,
    ) -> Result<Vec<EngineEvent>, EngineError> {
        let mut events = Vec::new();
        for input in inputs {
            events.extend(self.ingest_bar(input)?);
        }
        Ok(events)
    }

    pub fn ingest_csv(
        &mut self,
        file_path: impl AsRef<Path>,
        symbol: impl Into<String>,
        timeframe: Timeframe,
        tick_size: f64,
    ) -> Result<Vec<EngineEvent>, EngineError> {
        let inputs = load_market_bar_inputs(file_path, symbol, timeframe, tick_size)?;
        self.ingest_batch(inputs)
    }

    pub fn context(&self) -> &MarketContext {
        &self.context
    }

    pub fn into_context(self) -> MarketContext {
        self.context
    }
}

#[derive(Debug, Deserialize)]
struct CsvBarRow {
    #[serde(alias = "timestamp", alias = "time")]
    datetime: String,
    #[serde(alias = "open")]
    open_price: f64,
    #[serde(alias = "high")]
    high_price: f64,
    #[serde(alias = "low")]
    low_price: f64,
    #[serde(alias = "close")]
    close_price: f64,
}

pub fn load_market_bar_inputs(
    file_path: impl AsRef<Path>,
    symbol: impl Into<String>,
    timeframe: Timeframe,
    tick_size: f64,
) -> Result<Vec<MarketBarInput>, EngineError> {
    let symbol = symbol.into();

    let mut reader = csv::Reader::from_path(file_path)?;
    let mut out = Vec::new();

    for row in reader.deserialize::<CsvBarRow>() {
        let row = row?;
        let datetime = parse_datetime(&row.datetime)?;
        out.push(MarketBarInput {
            symbol: symbol.clone(),
            timeframe,
            datetime,
            open_price: row.open_price,
            high_price: row.high_price,
            low_price: row.low_price,
            close_price: row.close_price,
            tick_size,
        });
    }

    Ok(out)
}

pub fn load_bars(file_path: impl AsRef<Path>, tick_size: f64) -> Result<Vec<Bar>, EngineError> {
    let inputs = load_market_bar_inputs(file_path, "", Timeframe::M1, tick_size)?;
    Ok(inputs
        .into_iter()
        .zip(0u64..)
        .map(|(input, index)| input.into_bar(index))
        .collect())
}

pub fn parse_datetime(value: &str) -> Result<DateTime<Utc>, EngineError> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }

    let patterns = [
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y/%m/%d %H:%M:%S%.f",
        "%Y%m%d%H%M%S%.f",
        "%m/%d/%Y %H:%M:%S",
        "%m/%d/%Y %H:%M",
    ];

    for pattern in patterns {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, pattern) {
            return Ok(DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc));
        }
    }

    Err(EngineError::InvalidDatetime(value.to_string()))
}
