//! 由 bar 与结构信号派生的价格区间。
//!
//! - order block：BOS 之前最后一根反向 K 线的高低点；
//! - fair value gap：第一根与第三根 bar 之间未被成交覆盖的缺口；
//! - premium/discount：最近一组 swing high/low 之间的 Fibonacci 区间。

use std::collections::VecDeque;

use polars::df;
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::bar::Bar;
use crate::config::EngineConfig;
use crate::constant::{EngineError, Polarity, SwingKind};
use crate::structure::{StructureSignal, StructureState};
use crate::utils::{approx_eq_f64, gt_eps, lt_eps};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneOrigin {
    OrderBlock,
    FairValueGap,
    PremiumDiscount,
}

impl ZoneOrigin {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OrderBlock => "order_block",
            Self::FairValueGap => "fair_value_gap",
            Self::PremiumDiscount => "premium_discount",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceZone {
    pub id: u64,
    pub origin: ZoneOrigin,
    /// premium/discount 中 bullish 表示 discount 区间，bearish 表示 premium 区间。
    pub polarity: Polarity,
    pub upper: f64,
    pub lower: f64,
    /// order block 的 K 线、FVG 的中间 bar。
    pub source_bar_index: u64,
    pub created_at_bar_index: u64,
    pub retested_at_bar_index: Option<u64>,
}

impl PriceZone {
    pub fn mid(&self) -> f64 {
        (self.upper + self.lower) / 2.0
    }

    pub fn contains(&self, price: f64) -> bool {
        !lt_eps(price, self.lower) && !gt_eps(price, self.upper)
    }

    pub fn overlaps(&self, bar: &Bar) -> bool {
        !gt_eps(bar.low_price, self.upper) && !lt_eps(bar.high_price, self.lower)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ZoneSignal {
    OrderBlock(PriceZone),
    /// 价格首次回到最新 order block。
    OrderBlockRetest {
        polarity: Polarity,
        zone_id: u64,
        bar_index: u64,
        entry_price: f64,
    },
    FairValueGap(PriceZone),
    PremiumDiscount {
        zone: PriceZone,
        swing_high: f64,
        swing_low: f64,
    },
}

fn extreme(bar: &Bar, kind: SwingKind) -> f64 {
    match kind {
        SwingKind::High => bar.high_price,
        SwingKind::Low => bar.low_price,
    }
}

pub struct ZoneDetector {
    recent: VecDeque<Bar>,
    lookback: usize,
    fvg_min_gap_ticks: u32,
    fib_equilibrium: f64,
    fib_extreme: f64,
    max_resident: usize,
    rows: VecDeque<PriceZone>,
    premium_discount: Option<PriceZone>,
    id_cursor: u64,
}

impl ZoneDetector {
    pub fn new(config: &EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self {
            recent: VecDeque::with_capacity(config.order_block_lookback_bars.max(2)),
            lookback: config.order_block_lookback_bars,
            fvg_min_gap_ticks: config.fvg_min_gap_ticks,
            fib_equilibrium: config.fib_equilibrium,
            fib_extreme: config.fib_extreme,
            max_resident: config.max_resident_levels,
            rows: VecDeque::new(),
            premium_discount: None,
            id_cursor: 0,
        })
    }

    /// `structure` 为同一根 bar 上 structure 阶段产生的信号，`state` 为其处理后的状态。
    pub fn on_bar(
        &mut self,
        bar: &Bar,
        structure: &[StructureSignal],
        state: &StructureState,
    ) -> Vec<ZoneSignal> {
        let mut signals = Vec::new();

        for polarity in [Polarity::Bullish, Polarity::Bearish] {
            if let Some(signal) = self.retest_order_block(polarity, bar) {
                signals.push(signal);
            }
        }

        for signal in structure {
            if let StructureSignal::Break { polarity, .. } = signal {
                if let Some(zone) = self.order_block(*polarity, bar) {
                    signals.push(ZoneSignal::OrderBlock(zone));
                }
            }
        }

        if let Some(zone) = self.fair_value_gap(bar) {
            signals.push(ZoneSignal::FairValueGap(zone));
        }

        self.recent.push_back(bar.clone());
        while self.recent.len() > self.lookback.max(2) {
            self.recent.pop_front();
        }

        if let Some(signal) = self.premium_discount(bar, state) {
            signals.push(signal);
        }

        signals
    }

    fn retest_order_block(&mut self, polarity: Polarity, bar: &Bar) -> Option<ZoneSignal> {
        let zone = self
            .rows
            .iter_mut()
            .rev()
            .find(|x| x.origin == ZoneOrigin::OrderBlock && x.polarity == polarity)?;
        if zone.retested_at_bar_index.is_some()
            || bar.index <= zone.created_at_bar_index
            || !zone.overlaps(bar)
        {
            return None;
        }
        zone.retested_at_bar_index = Some(bar.index);
        let entry_price = (bar.high_price + bar.low_price) / 2.0;
        debug!(
            polarity = polarity.as_str(),
            zone_id = zone.id,
            bar_index = bar.index,
            entry_price,
            "order block retest"
        );
        Some(ZoneSignal::OrderBlockRetest {
            polarity,
            zone_id: zone.id,
            bar_index: bar.index,
            entry_price,
        })
    }

    /// 在 BOS bar 之前的 `lookback` 根 bar 中寻找最近一根反向 K 线。
    fn order_block(&mut self, polarity: Polarity, bar: &Bar) -> Option<PriceZone> {
        let candle = self
            .recent
            .iter()
            .rev()
            .take(self.lookback)
            .find(|x| match polarity {
                Polarity::Bullish => x.is_bearish(),
                Polarity::Bearish => x.is_bullish(),
            })?;
        let (upper, lower, source) = (candle.high_price, candle.low_price, candle.index);
        let zone = self.push_zone(ZoneOrigin::OrderBlock, polarity, upper, lower, source, bar.index);
        debug!(
            polarity = polarity.as_str(),
            upper,
            lower,
            source_bar_index = source,
            bar_index = bar.index,
            "order block"
        );
        Some(zone)
    }

    fn fair_value_gap(&mut self, bar: &Bar) -> Option<PriceZone> {
        let len = self.recent.len();
        if len < 2 {
            return None;
        }
        let first = &self.recent[len - 2];
        if first.index.checked_add(2) != Some(bar.index) {
            return None;
        }
        let (first_high, first_low) = (first.high_price, first.low_price);
        let source = self.recent[len - 1].index;

        let min_gap = bar.ticks(self.fvg_min_gap_ticks);
        for polarity in [Polarity::Bullish, Polarity::Bearish] {
            let kind = polarity.break_kind();
            let near = extreme(bar, kind.opposite());
            let far = match kind {
                SwingKind::High => first_high,
                SwingKind::Low => first_low,
            };
            let gap = kind.sign() * (near - far);
            if lt_eps(gap, min_gap) {
                continue;
            }
            let zone = self.push_zone(
                ZoneOrigin::FairValueGap,
                polarity,
                near.max(far),
                near.min(far),
                source,
                bar.index,
            );
            debug!(
                polarity = polarity.as_str(),
                upper = zone.upper,
                lower = zone.lower,
                bar_index = bar.index,
                "fair value gap"
            );
            return Some(zone);
        }
        None
    }

    /// 高点与低点同时抬高时给出 discount 区间，同时降低时给出 premium 区间；
    /// 区间不变时不重复发出。
    fn premium_discount(&mut self, bar: &Bar, state: &StructureState) -> Option<ZoneSignal> {
        let high = state.last_swing(SwingKind::High)?;
        let low = state.last_swing(SwingKind::Low)?;
        let previous_high = state.previous_swing(SwingKind::High)?;
        let previous_low = state.previous_swing(SwingKind::Low)?;

        let polarity = if gt_eps(high, previous_high) && gt_eps(low, previous_low) {
            Polarity::Bullish
        } else if lt_eps(high, previous_high) && lt_eps(low, previous_low) {
            Polarity::Bearish
        } else {
            return None;
        };
        if !gt_eps(high, low) {
            return None;
        }

        let range = high - low;
        let (upper, lower) = match polarity {
            Polarity::Bullish => (high - range * self.fib_equilibrium, high - range * self.fib_extreme),
            Polarity::Bearish => (low + range * self.fib_extreme, low + range * self.fib_equilibrium),
        };

        let unchanged = self.premium_discount.as_ref().is_some_and(|x| {
            x.polarity == polarity && approx_eq_f64(x.upper, upper) && approx_eq_f64(x.lower, lower)
        });
        if unchanged {
            return None;
        }

        self.id_cursor += 1;
        let zone = PriceZone {
            id: self.id_cursor,
            origin: ZoneOrigin::PremiumDiscount,
            polarity,
            upper,
            lower,
            source_bar_index: bar.index,
            created_at_bar_index: bar.index,
            retested_at_bar_index: None,
        };
        debug!(polarity = polarity.as_str(), upper, lower, bar_index = bar.index, "premium/discount zone");
        self.premium_discount = Some(zone.clone());
        Some(ZoneSignal::PremiumDiscount {
            zone,
            swing_high: high,
            swing_low: low,
        })
    }

    fn push_zone(
        &mut self,
        origin: ZoneOrigin,
        polarity: Polarity,
        upper: f64,
        lower: f64,
        source_bar_index: u64,
        created_at_bar_index: u64,
    ) -> PriceZone {
        self.id_cursor += 1;
        let zone = PriceZone {
            id: self.id_cursor,
            origin,
            polarity,
            upper,
            lower,
            source_bar_index,
            created_at_bar_index,
            retested_at_bar_index: None,
        };
        self.rows.push_back(zone.clone());
        while self.rows.len() > self.max_resident {
            self.rows.pop_front();
        }
        zone
    }

    pub fn rows(&self) -> impl Iterator<Item = &PriceZone> {
        self.rows.iter()
    }

    pub fn latest(&self, origin: ZoneOrigin, polarity: Polarity) -> Option<&PriceZone> {
        self.rows
            .iter()
            .rev()
            .find(|x| x.origin == origin && x.polarity == polarity)
    }

    pub fn premium_discount_zone(&self) -> Option<&PriceZone> {
        self.premium_discount.as_ref()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn dataframe(&self) -> Result<DataFrame, EngineError> {
        let zones: Vec<&PriceZone> = self.rows.iter().chain(self.premium_discount.iter()).collect();
        let id: Vec<u64> = zones.iter().map(|x| x.id).collect();
        let origin: Vec<&str> = zones.iter().map(|x| x.origin.as_str()).collect();
        let polarity: Vec<&str> = zones.iter().map(|x| x.polarity.as_str()).collect();
        let upper: Vec<f64> = zones.iter().map(|x| x.upper).collect();
        let lower: Vec<f64> = zones.iter().map(|x| x.lower).collect();
        let source: Vec<u64> = zones.iter().map(|x| x.source_bar_index).collect();
        let created: Vec<u64> = zones.iter().map(|x| x.created_at_bar_index).collect();
        let retested: Vec<Option<u64>> = zones.iter().map(|x| x.retested_at_bar_index).collect();

        Ok(df!(
            "id" => id,
            "origin" => origin,
            "polarity" => polarity,
            "upper" => upper,
            "lower" => lower,
            "source_bar_index" => source,
            "created_at_bar_index" => created,
            "retested_at_bar_index" => retested
        )?)
    }
}
