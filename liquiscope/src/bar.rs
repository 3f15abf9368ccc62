use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constant::EngineError;
use crate::utils::{approx_eq_f64, gt_eps, lt_eps};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub index: u64,
    pub datetime: DateTime<Utc>,
    pub open_price: f64,
    pub high_price: f64,
    pub low_price: f64,
    pub close_price: f64,
    pub tick_size: f64,
}

impl Bar {
    pub fn body(&self) -> f64 {
        (self.close_price - self.open_price).abs()
    }

    pub fn upper_shadow(&self) -> f64 {
        self.high_price - self.close_price.max(self.open_price)
    }

    pub fn lower_shadow(&self) -> f64 {
        self.close_price.min(self.open_price) - self.low_price
    }

    pub fn total_range(&self) -> f64 {
        self.high_price - self.low_price
    }

    pub fn is_bullish(&self) -> bool {
        gt_eps(self.close_price, self.open_price)
    }

    pub fn is_bearish(&self) -> bool {
        lt_eps(self.close_price, self.open_price)
    }

    pub fn is_doji(&self) -> bool {
        approx_eq_f64(self.close_price, self.open_price)
    }

    /// tick 数换算为该品种的价格距离。
    pub fn ticks(&self, count: u32) -> f64 {
        f64::from(count) * self.tick_size
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        let invalid = |reason: &str| EngineError::InvalidBar {
            index: self.index,
            reason: reason.to_string(),
        };

        if !(self.tick_size.is_finite() && self.tick_size > 0.0) {
            return Err(invalid("tick size must be positive"));
        }
        let prices = [
            self.open_price,
            self.high_price,
            self.low_price,
            self.close_price,
        ];
        if prices.iter().any(|x| !x.is_finite()) {
            return Err(invalid("prices must be finite"));
        }
        if self.high_price < self.low_price {
            return Err(invalid("high below low"));
        }
        let inside = |x: f64| !lt_eps(x, self.low_price) && !gt_eps(x, self.high_price);
        if !inside(self.open_price) {
            return Err(invalid("open outside high/low range"));
        }
        if !inside(self.close_price) {
            return Err(invalid("close outside high/low range"));
        }
        Ok(())
    }
}
