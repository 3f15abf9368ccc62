use polars::df;
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::bar::Bar;
use crate::config::EngineConfig;
use crate::constant::{EngineError, LiquiditySide, SwingKind};
use crate::swing::SwingPoint;
use crate::utils::{beyond, gt_eps, lt_eps, within_tolerance};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidityLevel {
    pub id: u64,
    pub side: LiquiditySide,
    pub price: f64,
    pub origin_bar_index: u64,
    pub registered_at_bar_index: u64,
    pub is_equal: bool,
    /// 所在 cluster 的 level 数（含自身）。
    pub equal_count: u32,
    pub is_swept: bool,
    pub swept_at_bar_index: Option<u64>,
    pub swept_price: Option<f64>,
    pub wick_sweep: bool,
}

impl LiquidityLevel {
    pub fn is_active(&self) -> bool {
        !self.is_swept
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepEvent {
    pub level_id: u64,
    pub side: LiquiditySide,
    pub level_price: f64,
    pub origin_bar_index: u64,
    pub bar_index: u64,
    pub swept_price: f64,
    pub close_price: f64,
    pub wick_sweep: bool,
    pub level: LiquidityLevel,
}

/// 新 level 落在已有 level 容差内时产生的配对。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EqualMatch {
    pub level_id: u64,
    pub matched_level_id: u64,
    pub side: LiquiditySide,
    pub price: f64,
    pub matched_price: f64,
    pub equal_count: u32,
    pub matched_equal_count: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Registration {
    pub level: LiquidityLevel,
    pub matches: Vec<EqualMatch>,
}

pub struct LevelRegistry {
    rows: Vec<LiquidityLevel>,
    id_cursor: u64,
    equal_tolerance_ticks: u32,
    sweep_buffer_ticks: u32,
    horizon: u64,
    max_resident: usize,
}

impl LevelRegistry {
    pub fn new(config: &EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self {
            rows: Vec::new(),
            id_cursor: 0,
            equal_tolerance_ticks: config.equal_tolerance_ticks,
            sweep_buffer_ticks: config.sweep_buffer_ticks,
            horizon: config.lookback_horizon_bars,
            max_resident: config.max_resident_levels,
        })
    }

    /// 登记 pivot 留下的 level，并与容差内所有同侧未扫 level 聚类。
    pub fn on_swing_point(&mut self, point: &SwingPoint, tick_size: f64) -> Registration {
        self.id_cursor += 1;
        let side = point.kind.liquidity_side();
        let tolerance = f64::from(self.equal_tolerance_ticks) * tick_size;

        let mut level = LiquidityLevel {
            id: self.id_cursor,
            side,
            price: point.price,
            origin_bar_index: point.bar_index,
            registered_at_bar_index: point.confirmed_at_bar_index,
            is_equal: false,
            equal_count: 1,
            is_swept: false,
            swept_at_bar_index: None,
            swept_price: None,
            wick_sweep: false,
        };

        let mut matches = Vec::new();
        for existing in self
            .rows
            .iter_mut()
            .filter(|x| x.side == side && x.is_active())
        {
            if !within_tolerance(existing.price, level.price, tolerance) {
                continue;
            }
            existing.is_equal = true;
            existing.equal_count += 1;
            level.is_equal = true;
            level.equal_count += 1;
            matches.push(EqualMatch {
                level_id: level.id,
                matched_level_id: existing.id,
                side,
                price: level.price,
                matched_price: existing.price,
                equal_count: level.equal_count,
                matched_equal_count: existing.equal_count,
            });
        }
        if !matches.is_empty() {
            debug!(
                level_id = level.id,
                side = side.as_str(),
                price = level.price,
                equal_count = level.equal_count,
                "equal level cluster"
            );
        }

        self.rows.push(level.clone());
        Registration { level, matches }
    }

    /// 标记被该 bar 穿越的 level，每个 level 最多被扫一次。
    pub fn on_bar(&mut self, bar: &Bar) -> Vec<SweepEvent> {
        let buffer = bar.ticks(self.sweep_buffer_ticks);
        let mut sweeps = Vec::new();

        for level in self.rows.iter_mut() {
            if level.is_swept || level.registered_at_bar_index >= bar.index {
                continue;
            }
            let kind = level.side.swing_kind();
            let extreme = match kind {
                SwingKind::High => bar.high_price,
                SwingKind::Low => bar.low_price,
            };
            if !beyond(kind, extreme, level.price, buffer) {
                continue;
            }

            level.is_swept = true;
            level.swept_at_bar_index = Some(bar.index);
            level.swept_price = Some(extreme);
            level.wick_sweep = match kind {
                SwingKind::High => lt_eps(bar.close_price, level.price),
                SwingKind::Low => gt_eps(bar.close_price, level.price),
            };
            debug!(
                level_id = level.id,
                side = level.side.as_str(),
                price = level.price,
                swept_price = extreme,
                wick = level.wick_sweep,
                bar_index = bar.index,
                "level swept"
            );
            sweeps.push(SweepEvent {
                level_id: level.id,
                side: level.side,
                level_price: level.price,
                origin_bar_index: level.origin_bar_index,
                bar_index: bar.index,
                swept_price: extreme,
                close_price: bar.close_price,
                wick_sweep: level.wick_sweep,
                level: level.clone(),
            });
        }

        self.evict(bar.index);
        sweeps
    }

    /// 常驻数量超过上限时，丢弃超出 horizon 的已扫 level；未扫 level 不会被丢弃。
    fn evict(&mut self, current_index: u64) {
        if self.horizon == 0 || self.rows.len() <= self.max_resident {
            return;
        }
        let horizon = self.horizon;
        let before = self.rows.len();
        self.rows.retain(|x| match x.swept_at_bar_index {
            Some(swept_at) => current_index.saturating_sub(swept_at) <= horizon,
            None => true,
        });
        debug!(evicted = before - self.rows.len(), resident = self.rows.len(), "levels evicted");
    }

    pub fn rows(&self) -> &[LiquidityLevel] {
        &self.rows
    }

    pub fn get(&self, id: u64) -> Option<&LiquidityLevel> {
        self.rows.iter().find(|x| x.id == id)
    }

    pub fn active(&self) -> impl Iterator<Item = &LiquidityLevel> {
        self.rows.iter().filter(|x| x.is_active())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn dataframe(&self) -> Result<DataFrame, EngineError> {
        let id: Vec<u64> = self.rows.iter().map(|x| x.id).collect();
        let side: Vec<&str> = self.rows.iter().map(|x| x.side.as_str()).collect();
        let price: Vec<f64> = self.rows.iter().map(|x| x.price).collect();
        let origin: Vec<u64> = self.rows.iter().map(|x| x.origin_bar_index).collect();
        let is_equal: Vec<bool> = self.rows.iter().map(|x| x.is_equal).collect();
        let equal_count: Vec<u32> = self.rows.iter().map(|x| x.equal_count).collect();
        let is_swept: Vec<bool> = self.rows.iter().map(|x| x.is_swept).collect();
        let swept_at: Vec<Option<u64>> = self.rows.iter().map(|x| x.swept_at_bar_index).collect();
        let swept_price: Vec<Option<f64>> = self.rows.iter().map(|x| x.swept_price).collect();
        let wick_sweep: Vec<bool> = self.rows.iter().map(|x| x.wick_sweep).collect();

        Ok(df!(
            "id" => id,
            "side" => side,
            "price" => price,
            "origin_bar_index" => origin,
            "is_equal" => is_equal,
            "equal_count" => equal_count,
            "is_swept" => is_swept,
            "swept_at_bar_index" => swept_at,
            "swept_price" => swept_price,
            "wick_sweep" => wick_sweep
        )?)
    }
}
