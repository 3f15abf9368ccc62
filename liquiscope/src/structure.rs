//! 单个序列的 BOS / CHoCH / MSB 跟踪。
//!
//! 多空共用同一套逻辑：由 swing kind 选择字段，由 `SwingKind::sign` 决定比较方向。

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::bar::Bar;
use crate::config::EngineConfig;
use crate::constant::{EngineError, Polarity, SwingKind};
use crate::swing::SwingPoint;
use crate::utils::beyond;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructureState {
    pub last_swing_high: Option<f64>,
    pub last_swing_low: Option<f64>,
    pub previous_swing_high: Option<f64>,
    pub previous_swing_low: Option<f64>,
    pub bullish_break_detected: bool,
    pub bearish_break_detected: bool,
    pub bullish_choch: bool,
    pub bearish_choch: bool,
    pub last_break: Option<Polarity>,
}

impl StructureState {
    pub fn last_swing(&self, kind: SwingKind) -> Option<f64> {
        match kind {
            SwingKind::High => self.last_swing_high,
            SwingKind::Low => self.last_swing_low,
        }
    }

    pub fn previous_swing(&self, kind: SwingKind) -> Option<f64> {
        match kind {
            SwingKind::High => self.previous_swing_high,
            SwingKind::Low => self.previous_swing_low,
        }
    }

    pub fn break_detected(&self, polarity: Polarity) -> bool {
        match polarity {
            Polarity::Bullish => self.bullish_break_detected,
            Polarity::Bearish => self.bearish_break_detected,
        }
    }

    pub fn choch_armed(&self, polarity: Polarity) -> bool {
        match polarity {
            Polarity::Bullish => self.bullish_choch,
            Polarity::Bearish => self.bearish_choch,
        }
    }

    /// 最近一次 BOS 或 MSB 的方向。
    pub fn bias(&self) -> Option<Polarity> {
        self.last_break
    }

    fn record_swing(&mut self, kind: SwingKind, price: f64) {
        let (last, previous) = match kind {
            SwingKind::High => (&mut self.last_swing_high, &mut self.previous_swing_high),
            SwingKind::Low => (&mut self.last_swing_low, &mut self.previous_swing_low),
        };
        *previous = *last;
        *last = Some(price);
    }

    fn set_break(&mut self, polarity: Polarity, value: bool) {
        match polarity {
            Polarity::Bullish => self.bullish_break_detected = value,
            Polarity::Bearish => self.bearish_break_detected = value,
        }
    }

    fn set_choch(&mut self, polarity: Polarity, value: bool) {
        match polarity {
            Polarity::Bullish => self.bullish_choch = value,
            Polarity::Bearish => self.bearish_choch = value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StructureSignal {
    Break {
        polarity: Polarity,
        bar_index: u64,
        level: f64,
        close_price: f64,
    },
    /// 新 pivot 落在前一个同类 pivot 的反侧（更低的高点或更高的低点）。
    ChangeOfCharacter {
        polarity: Polarity,
        bar_index: u64,
        swing_price: f64,
        previous_price: f64,
    },
    /// CHoCH 已武装后，收盘越过对侧 swing。
    MarketStructureBreak {
        polarity: Polarity,
        bar_index: u64,
        level: f64,
        close_price: f64,
    },
}

pub struct StructureStateMachine {
    state: StructureState,
    break_threshold_ticks: u32,
}

impl StructureStateMachine {
    pub fn new(config: &EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self {
            state: StructureState::default(),
            break_threshold_ticks: config.break_threshold_ticks,
        })
    }

    pub fn state(&self) -> &StructureState {
        &self.state
    }

    pub fn on_swing_point(&mut self, point: &SwingPoint, tick_size: f64) -> Vec<StructureSignal> {
        let threshold = f64::from(self.break_threshold_ticks) * tick_size;
        let kind = point.kind;
        let mut signals = Vec::new();

        // 更低的高点（或更高的低点）武装反向的 CHoCH
        if let Some(previous) = self.state.last_swing(kind) {
            if beyond(kind.opposite(), point.price, previous, threshold) {
                let polarity = kind.break_polarity().opposite();
                self.state.set_choch(polarity, true);
                debug!(
                    polarity = polarity.as_str(),
                    price = point.price,
                    previous,
                    "change of character armed"
                );
                signals.push(StructureSignal::ChangeOfCharacter {
                    polarity,
                    bar_index: point.confirmed_at_bar_index,
                    swing_price: point.price,
                    previous_price: previous,
                });
            }
        }

        self.state.record_swing(kind, point.price);
        self.state.set_break(kind.break_polarity(), false);
        signals
    }

    pub fn on_bar(&mut self, bar: &Bar) -> Vec<StructureSignal> {
        let threshold = bar.ticks(self.break_threshold_ticks);
        let close = bar.close_price;
        let mut signals = Vec::new();

        for kind in [SwingKind::High, SwingKind::Low] {
            let polarity = kind.break_polarity();
            let Some(level) = self.state.last_swing(kind) else {
                continue;
            };
            if self.state.break_detected(polarity) || !beyond(kind, close, level, threshold) {
                continue;
            }
            self.state.set_break(polarity, true);
            self.state.last_break = Some(polarity);
            debug!(polarity = polarity.as_str(), level, close, bar_index = bar.index, "break of structure");
            signals.push(StructureSignal::Break {
                polarity,
                bar_index: bar.index,
                level,
                close_price: close,
            });
        }

        for polarity in [Polarity::Bullish, Polarity::Bearish] {
            if !self.state.choch_armed(polarity) {
                continue;
            }
            let kind = polarity.break_kind();
            let Some(level) = self.state.last_swing(kind) else {
                continue;
            };
            if !beyond(kind, close, level, threshold) {
                continue;
            }
            self.state.set_choch(polarity, false);
            self.state.last_break = Some(polarity);
            debug!(polarity = polarity.as_str(), level, close, bar_index = bar.index, "market structure break");
            signals.push(StructureSignal::MarketStructureBreak {
                polarity,
                bar_index: bar.index,
                level,
                close_price: close,
            });
        }

        signals
    }
}
