//! 每个 (symbol, timeframe) 一个引擎。
//!
//! 单根 bar 的处理顺序：swing 检测、level 登记、sweep 检测、结构状态迁移、
//! trap 评估、区间检测（order block / FVG / premium-discount）、trendline。
//! 被拒绝的 bar 在触及任何组件之前返回错误。

use chrono::{DateTime, Utc};
use polars::prelude::DataFrame;
use serde::Serialize;
use tracing::{info, warn};

use crate::bar::Bar;
use crate::config::EngineConfig;
use crate::constant::{EngineError, Polarity, Timeframe};
use crate::events::EngineEvent;
use crate::level::LevelRegistry;
use crate::structure::{StructureSignal, StructureState, StructureStateMachine};
use crate::swing::SwingDetector;
use crate::trap::TrapDetector;
use crate::trendline::TrendlineTracker;
use crate::zone::ZoneDetector;

/// 引擎处理完最新 bar 后的只读视图。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineSnapshot {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub bar_index: Option<u64>,
    pub datetime: Option<DateTime<Utc>>,
    pub events: Vec<EngineEvent>,
    pub structure: StructureState,
    pub active_levels: usize,
}

impl EngineSnapshot {
    pub fn has_msb(&self, polarity: Polarity) -> bool {
        self.events.iter().any(|x| {
            matches!(x, EngineEvent::MarketStructureBreak { polarity: p, .. } if *p == polarity)
        })
    }
}

pub struct StructureEngine {
    symbol: String,
    timeframe: Timeframe,
    config: EngineConfig,
    swings: SwingDetector,
    levels: LevelRegistry,
    structure: StructureStateMachine,
    traps: TrapDetector,
    zones: ZoneDetector,
    trendlines: TrendlineTracker,
    last_datetime: Option<DateTime<Utc>>,
    last_events: Vec<EngineEvent>,
    bar_count: u64,
}

impl StructureEngine {
    pub fn new(
        symbol: impl Into<String>,
        timeframe: Timeframe,
        config: EngineConfig,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let symbol = symbol.into();
        info!(
            symbol = symbol.as_str(),
            timeframe = timeframe.as_str(),
            strength = config.strength,
            "structure engine created"
        );
        Ok(Self {
            swings: SwingDetector::new(&config)?,
            levels: LevelRegistry::new(&config)?,
            structure: StructureStateMachine::new(&config)?,
            traps: TrapDetector::new(&config)?,
            zones: ZoneDetector::new(&config)?,
            trendlines: TrendlineTracker::new(&config)?,
            symbol,
            timeframe,
            config,
            last_datetime: None,
            last_events: Vec::new(),
            bar_count: 0,
        })
    }

    pub fn process_bar(&mut self, bar: &Bar) -> Result<Vec<EngineEvent>, EngineError> {
        let points = match self.swings.process_bar(bar) {
            Ok(points) => points,
            Err(err) => {
                warn!(
                    symbol = self.symbol.as_str(),
                    timeframe = self.timeframe.as_str(),
                    index = bar.index,
                    error = %err,
                    "bar rejected"
                );
                return Err(err);
            }
        };

        let mut events: Vec<EngineEvent> = points.iter().copied().map(EngineEvent::from).collect();

        for point in &points {
            let registration = self.levels.on_swing_point(point, bar.tick_size);
            events.push(EngineEvent::LevelRegistered {
                bar_index: bar.index,
                level: registration.level,
            });
            events.extend(registration.matches.into_iter().map(|cluster| {
                EngineEvent::LevelEqualCluster {
                    bar_index: bar.index,
                    cluster,
                }
            }));
        }

        let sweeps = self.levels.on_bar(bar);
        events.extend(sweeps.iter().cloned().map(EngineEvent::from));

        let mut structure: Vec<StructureSignal> = Vec::new();
        for point in &points {
            structure.extend(self.structure.on_swing_point(point, bar.tick_size));
        }
        structure.extend(self.structure.on_bar(bar));
        events.extend(structure.iter().cloned().map(EngineEvent::from));

        for sweep in &sweeps {
            let _ = self.traps.on_sweep_event(sweep);
        }
        events.extend(self.traps.on_bar(bar).into_iter().map(EngineEvent::from));

        events.extend(
            self.zones
                .on_bar(bar, &structure, self.structure.state())
                .into_iter()
                .map(EngineEvent::from),
        );

        for point in &points {
            if let Some(trendline) = self.trendlines.on_swing_point(point) {
                events.push(EngineEvent::TrendlineLiquidity {
                    bar_index: bar.index,
                    trendline,
                });
            }
        }

        self.bar_count += 1;
        self.last_datetime = Some(bar.datetime);
        self.last_events = events.clone();
        Ok(events)
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            symbol: self.symbol.clone(),
            timeframe: self.timeframe,
            bar_index: self.swings.last_index(),
            datetime: self.last_datetime,
            events: self.last_events.clone(),
            structure: self.structure.state().clone(),
            active_levels: self.levels.active().count(),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn swings(&self) -> &SwingDetector {
        &self.swings
    }

    pub fn levels(&self) -> &LevelRegistry {
        &self.levels
    }

    pub fn traps(&self) -> &TrapDetector {
        &self.traps
    }

    pub fn zones(&self) -> &ZoneDetector {
        &self.zones
    }

    pub fn trendlines(&self) -> &TrendlineTracker {
        &self.trendlines
    }

    pub fn structure_state(&self) -> &StructureState {
        self.structure.state()
    }

    pub fn last_events(&self) -> &[EngineEvent] {
        &self.last_events
    }

    pub fn last_index(&self) -> Option<u64> {
        self.swings.last_index()
    }

    pub fn bar_count(&self) -> u64 {
        self.bar_count
    }

    pub fn levels_dataframe(&self) -> Result<DataFrame, EngineError> {
        self.levels.dataframe()
    }

    pub fn swings_dataframe(&self) -> Result<DataFrame, EngineError> {
        self.swings.dataframe()
    }

    pub fn zones_dataframe(&self) -> Result<DataFrame, EngineError> {
        self.zones.dataframe()
    }
}
