use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::EngineConfig;
use crate::constant::{EngineError, LiquiditySide, SwingKind};
use crate::swing::SwingPoint;

/// 连接最近 `points` 个同类 swing 的首尾两点。高点连线之上是 BSL，
/// 低点连线之下是 SSL。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Trendline {
    pub side: LiquiditySide,
    pub anchor_bar_index: u64,
    pub anchor_price: f64,
    pub last_bar_index: u64,
    pub last_price: f64,
    pub points: usize,
    /// 每根 bar 的价格变化。
    pub slope: f64,
}

impl Trendline {
    fn through(side: LiquiditySide, anchor: &SwingPoint, last: &SwingPoint, points: usize) -> Self {
        let span = last.bar_index.saturating_sub(anchor.bar_index);
        let slope = if span == 0 {
            0.0
        } else {
            (last.price - anchor.price) / span as f64
        };
        Self {
            side,
            anchor_bar_index: anchor.bar_index,
            anchor_price: anchor.price,
            last_bar_index: last.bar_index,
            last_price: last.price,
            points,
            slope,
        }
    }

    pub fn price_at(&self, bar_index: u64) -> f64 {
        self.anchor_price + self.slope * (bar_index as f64 - self.anchor_bar_index as f64)
    }
}

pub struct TrendlineTracker {
    min_points: usize,
    highs: VecDeque<SwingPoint>,
    lows: VecDeque<SwingPoint>,
    latest_bsl: Option<Trendline>,
    latest_ssl: Option<Trendline>,
}

impl TrendlineTracker {
    pub fn new(config: &EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self {
            min_points: config.min_trendline_points,
            highs: VecDeque::with_capacity(config.min_trendline_points),
            lows: VecDeque::with_capacity(config.min_trendline_points),
            latest_bsl: None,
            latest_ssl: None,
        })
    }

    pub fn on_swing_point(&mut self, point: &SwingPoint) -> Option<Trendline> {
        let side = point.kind.liquidity_side();
        let (pivots, latest) = match point.kind {
            SwingKind::High => (&mut self.highs, &mut self.latest_bsl),
            SwingKind::Low => (&mut self.lows, &mut self.latest_ssl),
        };
        pivots.push_back(*point);
        while pivots.len() > self.min_points {
            pivots.pop_front();
        }
        if pivots.len() < self.min_points {
            return None;
        }

        let (anchor, last) = (pivots.front()?, pivots.back()?);
        let line = Trendline::through(side, anchor, last, pivots.len());
        debug!(
            side = side.as_str(),
            anchor_bar_index = line.anchor_bar_index,
            last_bar_index = line.last_bar_index,
            slope = line.slope,
            "trendline"
        );
        *latest = Some(line);
        Some(line)
    }

    pub fn latest(&self, side: LiquiditySide) -> Option<&Trendline> {
        match side {
            LiquiditySide::Bsl => self.latest_bsl.as_ref(),
            LiquiditySide::Ssl => self.latest_ssl.as_ref(),
        }
    }
}
