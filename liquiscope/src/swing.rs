use std::collections::VecDeque;

use polars::df;
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::bar::Bar;
use crate::config::EngineConfig;
use crate::constant::{EngineError, PivotBoundary, SwingKind};
use crate::utils::beyond;

/// 已确认的 pivot，在其出现 `strength` 根 bar 之后才可知。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SwingPoint {
    pub kind: SwingKind,
    pub price: f64,
    pub bar_index: u64,
    pub confirmed_at_bar_index: u64,
}

impl SwingPoint {
    pub fn lag(&self) -> u64 {
        self.confirmed_at_bar_index - self.bar_index
    }
}

#[derive(Debug, Clone, Copy)]
struct WindowSlot {
    index: u64,
    high: f64,
    low: f64,
}

impl WindowSlot {
    fn price(&self, kind: SwingKind) -> f64 {
        match kind {
            SwingKind::High => self.high,
            SwingKind::Low => self.low,
        }
    }
}

pub struct SwingDetector {
    strength: usize,
    window_len: usize,
    boundary: PivotBoundary,
    horizon: u64,
    window: VecDeque<WindowSlot>,
    last_index: Option<u64>,
    running_high: Option<f64>,
    running_low: Option<f64>,
    history: VecDeque<SwingPoint>,
}

impl SwingDetector {
    pub fn new(config: &EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self {
            strength: config.strength,
            window_len: config.window_len(),
            boundary: config.pivot_boundary,
            horizon: config.lookback_horizon_bars,
            window: VecDeque::with_capacity(config.window_len()),
            last_index: None,
            running_high: None,
            running_low: None,
            history: VecDeque::new(),
        })
    }

    /// 输入一根 bar；被拒绝的 bar 不改变任何状态。
    pub fn process_bar(&mut self, bar: &Bar) -> Result<Vec<SwingPoint>, EngineError> {
        bar.validate()?;
        if let Some(last) = self.last_index {
            if bar.index <= last {
                return Err(EngineError::OutOfOrderBar {
                    last,
                    got: bar.index,
                });
            }
            let expected = last.checked_add(1).ok_or(EngineError::NonContiguousBar {
                expected: last,
                got: bar.index,
            })?;
            if bar.index != expected {
                return Err(EngineError::NonContiguousBar {
                    expected,
                    got: bar.index,
                });
            }
        }
        self.last_index = Some(bar.index);

        self.window.push_back(WindowSlot {
            index: bar.index,
            high: bar.high_price,
            low: bar.low_price,
        });
        while self.window.len() > self.window_len() {
            self.window.pop_front();
        }

        let mut confirmed = Vec::new();
        if self.window.len() == self.window_len() {
            for kind in [SwingKind::High, SwingKind::Low] {
                if let Some(price) = self.pivot_at_center(kind) {
                    let center = self.window[self.strength];
                    let point = SwingPoint {
                        kind,
                        price,
                        bar_index: center.index,
                        confirmed_at_bar_index: bar.index,
                    };
                    debug!(
                        kind = ?kind,
                        price,
                        bar_index = point.bar_index,
                        confirmed_at = point.confirmed_at_bar_index,
                        "swing confirmed"
                    );
                    confirmed.push(point);
                }
            }
        }

        self.update_running(SwingKind::High, bar, &confirmed);
        self.update_running(SwingKind::Low, bar, &confirmed);

        self.history.extend(confirmed.iter().copied());
        self.evict(bar.index);
        Ok(confirmed)
    }

    fn window_len(&self) -> usize {
        self.window_len
    }

    fn pivot_at_center(&self, kind: SwingKind) -> Option<f64> {
        let candidate = self.window[self.strength].price(kind);
        for (pos, slot) in self.window.iter().enumerate() {
            if pos == self.strength {
                continue;
            }
            let other = slot.price(kind);
            let must_beat = match self.boundary {
                PivotBoundary::Strict => true,
                PivotBoundary::Inclusive => false,
                PivotBoundary::LeftStrict => pos < self.strength,
            };
            let qualifies = if must_beat {
                beyond(kind, candidate, other, 0.0)
            } else {
                !beyond(kind, other, candidate, 0.0)
            };
            if !qualifies {
                return None;
            }
        }
        Some(candidate)
    }

    fn update_running(&mut self, kind: SwingKind, bar: &Bar, confirmed: &[SwingPoint]) {
        let slot = match kind {
            SwingKind::High => &mut self.running_high,
            SwingKind::Low => &mut self.running_low,
        };
        if let Some(point) = confirmed.iter().find(|x| x.kind == kind) {
            *slot = Some(point.price);
            return;
        }
        let traded_through = slot
            .map(|level| {
                let extreme = match kind {
                    SwingKind::High => bar.high_price,
                    SwingKind::Low => bar.low_price,
                };
                beyond(kind, extreme, level, 0.0)
            })
            .unwrap_or(false);
        if traded_through {
            *slot = None;
        }
    }

    fn evict(&mut self, current_index: u64) {
        if self.horizon == 0 {
            return;
        }
        while let Some(front) = self.history.front() {
            if current_index.saturating_sub(front.confirmed_at_bar_index) > self.horizon {
                self.history.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn strength(&self) -> usize {
        self.strength
    }

    pub fn last_index(&self) -> Option<u64> {
        self.last_index
    }

    /// 最近确认、且之后没有被任何 bar 上破的 swing high。
    pub fn running_high(&self) -> Option<f64> {
        self.running_high
    }

    pub fn running_low(&self) -> Option<f64> {
        self.running_low
    }

    pub fn last_n(&self, n: usize) -> Vec<SwingPoint> {
        let skip = self.history.len().saturating_sub(n);
        self.history.iter().skip(skip).copied().collect()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn dataframe(&self) -> Result<DataFrame, EngineError> {
        let kind: Vec<&str> = self
            .history
            .iter()
            .map(|x| match x.kind {
                SwingKind::High => "high",
                SwingKind::Low => "low",
            })
            .collect();
        let price: Vec<f64> = self.history.iter().map(|x| x.price).collect();
        let bar_index: Vec<u64> = self.history.iter().map(|x| x.bar_index).collect();
        let confirmed_at: Vec<u64> = self
            .history
            .iter()
            .map(|x| x.confirmed_at_bar_index)
            .collect();

        Ok(df!(
            "kind" => kind,
            "price" => price,
            "bar_index" => bar_index,
            "confirmed_at_bar_index" => confirmed_at
        )?)
    }
}
