use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::bar::Bar;
use crate::config::EngineConfig;
use crate::constant::{EngineError, LiquiditySide, Polarity, SwingKind};
use crate::level::{LiquidityLevel, SweepEvent};
use crate::utils::{beyond, within_tolerance};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrapCandidate {
    pub level: LiquidityLevel,
    pub breakout_bar_index: u64,
    pub resolved: bool,
    pub wick_rejected: bool,
}

impl TrapCandidate {
    /// 假突破的方向：被扫的 BSL 收回为 bearish，被扫的 SSL 收回为 bullish。
    pub fn trap_polarity(&self) -> Polarity {
        match self.level.side {
            LiquiditySide::Bsl => Polarity::Bearish,
            LiquiditySide::Ssl => Polarity::Bullish,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TrapSignal {
    BreakoutTrap {
        polarity: Polarity,
        level_id: u64,
        level_price: f64,
        sweep_bar_index: u64,
        bar_index: u64,
        close_price: f64,
    },
    RejectionWick {
        polarity: Polarity,
        level_id: u64,
        level_price: f64,
        sweep_bar_index: u64,
        bar_index: u64,
        wick_price: f64,
    },
}

/// 跟踪被扫过的 level 是否收回。候选按 level id 索引，
/// 在 sweep 之后存活 `trap_retest_bars` 根 bar。
pub struct TrapDetector {
    candidates: BTreeMap<u64, TrapCandidate>,
    equal_tolerance_ticks: u32,
    retest_bars: u64,
}

impl TrapDetector {
    pub fn new(config: &EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self {
            candidates: BTreeMap::new(),
            equal_tolerance_ticks: config.equal_tolerance_ticks,
            retest_bars: config.trap_retest_bars,
        })
    }

    pub fn on_sweep_event(&mut self, event: &SweepEvent) -> TrapCandidate {
        let candidate = self
            .candidates
            .entry(event.level_id)
            .or_insert_with(|| TrapCandidate {
                level: event.level.clone(),
                breakout_bar_index: event.bar_index,
                resolved: false,
                wick_rejected: false,
            });
        candidate.clone()
    }

    pub fn on_bar(&mut self, bar: &Bar) -> Vec<TrapSignal> {
        let tolerance = bar.ticks(self.equal_tolerance_ticks);
        let retest_bars = self.retest_bars;
        let mut signals = Vec::new();

        self.candidates
            .retain(|_, x| bar.index.saturating_sub(x.breakout_bar_index) <= retest_bars);

        for candidate in self.candidates.values_mut() {
            if bar.index <= candidate.breakout_bar_index {
                continue;
            }
            let polarity = candidate.trap_polarity();
            let level_price = candidate.level.price;
            let closes_against = match polarity {
                Polarity::Bearish => bar.is_bearish(),
                Polarity::Bullish => bar.is_bullish(),
            };

            if !candidate.resolved
                && closes_against
                && within_tolerance(bar.close_price, level_price, tolerance)
            {
                candidate.resolved = true;
                debug!(
                    polarity = polarity.as_str(),
                    level_id = candidate.level.id,
                    level_price,
                    bar_index = bar.index,
                    "breakout trap"
                );
                signals.push(TrapSignal::BreakoutTrap {
                    polarity,
                    level_id: candidate.level.id,
                    level_price,
                    sweep_bar_index: candidate.breakout_bar_index,
                    bar_index: bar.index,
                    close_price: bar.close_price,
                });
            }

            let kind = candidate.level.side.swing_kind();
            let wick_price = match kind {
                SwingKind::High => bar.high_price,
                SwingKind::Low => bar.low_price,
            };
            if !candidate.wick_rejected && closes_against && beyond(kind, wick_price, level_price, 0.0) {
                candidate.wick_rejected = true;
                debug!(
                    polarity = polarity.as_str(),
                    level_id = candidate.level.id,
                    wick_price,
                    bar_index = bar.index,
                    "rejection wick"
                );
                signals.push(TrapSignal::RejectionWick {
                    polarity,
                    level_id: candidate.level.id,
                    level_price,
                    sweep_bar_index: candidate.breakout_bar_index,
                    bar_index: bar.index,
                    wick_price,
                });
            }
        }

        signals
    }

    pub fn get(&self, level_id: u64) -> Option<&TrapCandidate> {
        self.candidates.get(&level_id)
    }

    pub fn candidates(&self) -> impl Iterator<Item = &TrapCandidate> {
        self.candidates.values()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}
